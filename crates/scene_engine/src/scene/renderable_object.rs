//! Renderable objects
//!
//! A renderable is data, not a class hierarchy: a [`RenderableKind`] says what
//! produces the draw operations, and the surrounding [`RenderableObject`]
//! carries the capabilities the scene manager needs (bounds, material key,
//! flags, queue placement). Objects are owned by the scene manager's object
//! arena; a node only references the objects attached to it.

use bitflags::bitflags;

use crate::foundation::collections::NodeId;
use crate::foundation::math::{Vec2, Vec3};
use crate::render::{IndexDataHandle, MaterialKey, MeshHandle, PrimitiveType, RenderOperation, VertexDataHandle};
use crate::scene::bounds::{Aabb, BoundingVolume, Sphere};
use crate::scene::render_queue::RenderQueueGroupId;

bitflags! {
    /// Masks used to include or exclude objects from scene queries
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueryFlags: u32 {
        /// Ordinary world geometry
        const WORLD = 1 << 0;
        /// Movable entities
        const ENTITY = 1 << 1;
        /// Effects such as billboards
        const FX = 1 << 2;
        /// User-defined category
        const USER = 1 << 31;
    }
}

impl Default for QueryFlags {
    fn default() -> Self {
        QueryFlags::all()
    }
}

/// Part of a mesh drawn with one material
#[derive(Debug, Clone, PartialEq)]
pub struct SubMesh {
    /// Geometry of this part
    pub operation: RenderOperation,
    /// Material used instead of the object's material
    pub material: Option<MaterialKey>,
}

impl SubMesh {
    /// Sub-mesh that uses the owning object's material
    pub fn new(operation: RenderOperation) -> Self {
        Self { operation, material: None }
    }

    /// Sub-mesh with its own material
    pub fn with_material(operation: RenderOperation, material: impl Into<MaterialKey>) -> Self {
        Self {
            operation,
            material: Some(material.into()),
        }
    }
}

/// One camera-facing quad of a billboard set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Billboard {
    /// Position relative to the owning node
    pub position: Vec3,
    /// Width and height, or `None` to use the set's default size
    pub size: Option<Vec2>,
}

/// Geometry source of a renderable
#[derive(Debug, Clone, PartialEq)]
pub enum RenderableKind {
    /// Instance of a shared mesh
    Mesh {
        /// Mesh resource
        mesh: MeshHandle,
        /// Parts, each queued separately
        sub_meshes: Vec<SubMesh>,
    },
    /// Set of quads drawn as one indexed triangle list
    BillboardSet {
        /// Quads in the set
        billboards: Vec<Billboard>,
        /// Size used by quads without their own size
        default_size: Vec2,
        /// Dynamic vertex buffer the quads are written into
        vertex_data: VertexDataHandle,
        /// Static quad index buffer
        index_data: IndexDataHandle,
    },
    /// Caller-built geometry
    Manual {
        /// The draw operation
        operation: RenderOperation,
    },
}

/// A drawable unit attached to at most one node
#[derive(Debug, Clone, PartialEq)]
pub struct RenderableObject {
    pub(crate) name: String,
    pub(crate) kind: RenderableKind,
    pub(crate) local_bounds: BoundingVolume,
    pub(crate) material: MaterialKey,
    pub(crate) parent: Option<NodeId>,

    /// Whether the object takes part in queue population
    pub visible: bool,
    /// Whether the object casts shadows
    pub cast_shadows: bool,
    /// Queue group the object is rendered in (`None` uses the scene default)
    pub queue_group: Option<RenderQueueGroupId>,
    /// Priority inside the queue group, lower draws first (`None` uses the scene default)
    pub priority: Option<u16>,
    /// Categories used by scene queries
    pub query_flags: QueryFlags,
}

impl RenderableObject {
    /// Create an unattached, visible object using the scene's default queue placement
    pub fn new(
        name: impl Into<String>,
        kind: RenderableKind,
        local_bounds: BoundingVolume,
        material: impl Into<MaterialKey>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            local_bounds,
            material: material.into(),
            parent: None,
            visible: true,
            cast_shadows: true,
            queue_group: None,
            priority: None,
            query_flags: QueryFlags::default(),
        }
    }

    /// Mesh instance whose bounds are given by the mesh resource
    pub fn mesh(
        name: impl Into<String>,
        mesh: MeshHandle,
        sub_meshes: Vec<SubMesh>,
        bounds: BoundingVolume,
        material: impl Into<MaterialKey>,
    ) -> Self {
        Self::new(name, RenderableKind::Mesh { mesh, sub_meshes }, bounds, material)
            .with_query_flags(QueryFlags::ENTITY)
    }

    /// Billboard set; bounds follow the billboards
    pub fn billboard_set(
        name: impl Into<String>,
        default_size: Vec2,
        vertex_data: VertexDataHandle,
        index_data: IndexDataHandle,
        material: impl Into<MaterialKey>,
    ) -> Self {
        let kind = RenderableKind::BillboardSet {
            billboards: Vec::new(),
            default_size,
            vertex_data,
            index_data,
        };
        let mut object = Self::new(name, kind, BoundingVolume::Box(Aabb::new(Vec3::zeros(), Vec3::zeros())), material)
            .with_query_flags(QueryFlags::FX);
        object.cast_shadows = false;
        object
    }

    /// Single caller-supplied operation with explicit bounds
    pub fn manual(
        name: impl Into<String>,
        operation: RenderOperation,
        bounds: BoundingVolume,
        material: impl Into<MaterialKey>,
    ) -> Self {
        Self::new(name, RenderableKind::Manual { operation }, bounds, material)
    }

    /// Place the object in a queue group (builder pattern)
    pub fn with_queue_group(mut self, group: RenderQueueGroupId) -> Self {
        self.queue_group = Some(group);
        self
    }

    /// Set the priority inside the queue group (builder pattern)
    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the query flags (builder pattern)
    pub fn with_query_flags(mut self, flags: QueryFlags) -> Self {
        self.query_flags = flags;
        self
    }

    /// Unique name within the scene manager
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Geometry source
    pub fn kind(&self) -> &RenderableKind {
        &self.kind
    }

    /// Node the object is attached to
    pub fn parent_node(&self) -> Option<NodeId> {
        self.parent
    }

    /// Whether the object is attached to a node
    pub fn is_attached(&self) -> bool {
        self.parent.is_some()
    }

    /// Opaque key used for queue grouping
    pub fn material_key(&self) -> &MaterialKey {
        &self.material
    }

    /// Change the object's material
    pub fn set_material(&mut self, material: impl Into<MaterialKey>) {
        self.material = material.into();
    }

    /// Bounding volume in the owning node's space
    pub fn local_bounds(&self) -> &BoundingVolume {
        &self.local_bounds
    }

    /// Replace the local bounding volume
    pub fn set_local_bounds(&mut self, bounds: BoundingVolume) {
        self.local_bounds = bounds;
    }

    /// Whether the object is visible
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether the object casts shadows
    pub fn casts_shadows(&self) -> bool {
        self.cast_shadows
    }

    /// Add a quad to a billboard set and grow the bounds; false for other kinds
    pub fn add_billboard(&mut self, position: Vec3, size: Option<Vec2>) -> bool {
        let RenderableKind::BillboardSet { billboards, .. } = &mut self.kind else {
            return false;
        };
        billboards.push(Billboard { position, size });
        self.refresh_billboard_bounds();
        true
    }

    /// Remove every quad from a billboard set
    pub fn clear_billboards(&mut self) {
        if let RenderableKind::BillboardSet { billboards, .. } = &mut self.kind {
            billboards.clear();
            self.refresh_billboard_bounds();
        }
    }

    fn refresh_billboard_bounds(&mut self) {
        let RenderableKind::BillboardSet { billboards, default_size, .. } = &self.kind else {
            return;
        };
        // A quad can face any direction, so each one is bounded by a sphere
        let aabb = billboards
            .iter()
            .map(|b| {
                let size = b.size.unwrap_or(*default_size);
                Sphere::new(b.position, size.magnitude() * 0.5).to_aabb()
            })
            .reduce(|acc, next| acc.merged(&next))
            .unwrap_or(Aabb::new(Vec3::zeros(), Vec3::zeros()));
        self.local_bounds = BoundingVolume::Box(aabb);
    }

    /// Number of separately queued parts
    pub fn sub_renderable_count(&self) -> usize {
        match &self.kind {
            RenderableKind::Mesh { sub_meshes, .. } => sub_meshes.len(),
            RenderableKind::BillboardSet { billboards, .. } => usize::from(!billboards.is_empty()),
            RenderableKind::Manual { .. } => 1,
        }
    }

    /// Draw operation and effective material of one part
    pub fn sub_renderable(&self, index: usize) -> Option<(RenderOperation, &MaterialKey)> {
        match &self.kind {
            RenderableKind::Mesh { sub_meshes, .. } => sub_meshes
                .get(index)
                .map(|sub| (sub.operation, sub.material.as_ref().unwrap_or(&self.material))),
            RenderableKind::BillboardSet { billboards, vertex_data, index_data, .. } => {
                if index != 0 || billboards.is_empty() {
                    return None;
                }
                let quads = u32::try_from(billboards.len()).unwrap_or(u32::MAX / 6);
                let operation = RenderOperation::new(*vertex_data, quads * 4, PrimitiveType::TriangleList)
                    .with_indices(*index_data, quads * 6);
                Some((operation, &self.material))
            }
            RenderableKind::Manual { operation } => (index == 0).then_some((*operation, &self.material)),
        }
    }

    /// Every part, in order
    pub fn sub_renderables(&self) -> impl Iterator<Item = (usize, RenderOperation, &MaterialKey)> + '_ {
        (0..self.sub_renderable_count())
            .filter_map(move |i| self.sub_renderable(i).map(|(op, key)| (i, op, key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn op(vertices: u32) -> RenderOperation {
        RenderOperation::new(VertexDataHandle(1), vertices, PrimitiveType::TriangleList)
    }

    #[test]
    fn test_mesh_sub_material_override() {
        let object = RenderableObject::mesh(
            "ship",
            MeshHandle(3),
            vec![SubMesh::new(op(3)), SubMesh::with_material(op(6), "Glass")],
            BoundingVolume::Sphere(Sphere::new(Vec3::zeros(), 1.0)),
            "Hull",
        );

        let parts: Vec<_> = object
            .sub_renderables()
            .map(|(i, op, key)| (i, op.vertex_count, key.as_str().to_string()))
            .collect();
        assert_eq!(parts, vec![(0, 3, "Hull".to_string()), (1, 6, "Glass".to_string())]);
        assert_eq!(object.query_flags, QueryFlags::ENTITY);
    }

    #[test]
    fn test_billboard_bounds_follow_quads() {
        let mut set = RenderableObject::billboard_set(
            "sparks",
            Vec2::new(2.0, 0.0),
            VertexDataHandle(10),
            IndexDataHandle(11),
            "Spark",
        );
        assert_eq!(set.sub_renderable_count(), 0);

        assert!(set.add_billboard(Vec3::new(5.0, 0.0, 0.0), None));
        assert!(set.add_billboard(Vec3::new(-5.0, 0.0, 0.0), Some(Vec2::new(4.0, 0.0))));

        let aabb = set.local_bounds().to_aabb();
        assert_relative_eq!(aabb.min, Vec3::new(-7.0, -2.0, -2.0));
        assert_relative_eq!(aabb.max, Vec3::new(6.0, 2.0, 2.0));

        let (operation, _) = set.sub_renderable(0).unwrap();
        assert_eq!(operation.vertex_count, 8);
        assert_eq!(operation.element_count(), 12);
        assert!(!set.cast_shadows);
    }

    #[test]
    fn test_manual_defaults() {
        let object = RenderableObject::manual(
            "debug_lines",
            RenderOperation::new(VertexDataHandle(4), 2, PrimitiveType::LineList),
            BoundingVolume::Box(Aabb::new(Vec3::zeros(), Vec3::repeat(1.0))),
            "Lines",
        );
        assert!(object.is_visible());
        assert!(!object.is_attached());
        assert_eq!(object.queue_group, None);
        assert_eq!(object.priority, None);
        let overlay = object.clone().with_queue_group(RenderQueueGroupId::OVERLAY).with_priority(7);
        assert_eq!(overlay.queue_group, Some(RenderQueueGroupId::OVERLAY));
        assert_eq!(overlay.priority, Some(7));
        assert_eq!(object.sub_renderable_count(), 1);
        assert!(object.sub_renderable(1).is_none());
        assert!(!object.clone().add_billboard(Vec3::zeros(), None));
    }
}
