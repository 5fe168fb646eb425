//! Spatial node stored in the scene tree arena
//!
//! A node only holds data. Anything that needs to see more than one node
//! (dirty propagation, world transform resolution, reparenting) goes through
//! [`SceneTree`](crate::scene::SceneTree), which owns the arena.

use crate::foundation::collections::{NodeId, ObjectId};
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};
use crate::scene::bounds::Aabb;

/// Coordinate space a relative transform is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformSpace {
    /// The node's own axes
    #[default]
    Local,
    /// The parent node's axes
    Parent,
    /// World axes
    World,
}

/// World-space values derived from the ancestor chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Derived {
    pub(crate) matrix: Mat4,
    pub(crate) position: Vec3,
    pub(crate) orientation: Quat,
    pub(crate) scale: Vec3,
}

impl Default for Derived {
    fn default() -> Self {
        Self {
            matrix: Mat4::identity(),
            position: Vec3::zeros(),
            orientation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

/// A node in the scene tree
#[derive(Debug, Clone)]
pub struct SpatialNode {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) objects: Vec<ObjectId>,

    pub(crate) local: Transform,
    pub(crate) initial: Transform,
    pub(crate) inherit_scale: bool,

    pub(crate) derived: Derived,
    pub(crate) dirty: bool,
    pub(crate) world_epoch: u64,
    pub(crate) world_bounds: Option<Aabb>,
}

impl SpatialNode {
    pub(crate) fn new(name: String, parent: Option<NodeId>) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            objects: Vec::new(),
            local: Transform::identity(),
            initial: Transform::identity(),
            inherit_scale: true,
            derived: Derived::default(),
            dirty: true,
            world_epoch: 0,
            world_bounds: None,
        }
    }

    /// Unique name within the owning tree
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent node (`None` only for the root)
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child nodes in creation order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Renderable objects attached to this node
    pub fn attached_objects(&self) -> &[ObjectId] {
        &self.objects
    }

    /// Whether the object is attached to this node
    pub fn has_object(&self, object: ObjectId) -> bool {
        self.objects.contains(&object)
    }

    /// Local position relative to the parent
    pub fn position(&self) -> Vec3 {
        self.local.position
    }

    /// Local orientation relative to the parent
    pub fn orientation(&self) -> Quat {
        self.local.rotation
    }

    /// Local scale
    pub fn scale(&self) -> Vec3 {
        self.local.scale
    }

    /// Full local transform
    pub fn local_transform(&self) -> &Transform {
        &self.local
    }

    /// Local transform as a matrix (translate * rotate * scale)
    pub fn local_matrix(&self) -> Mat4 {
        self.local.to_matrix()
    }

    /// Transform stored by `set_initial_state`
    pub fn initial_state(&self) -> &Transform {
        &self.initial
    }

    /// Whether this node's world scale includes the parent's scale
    pub fn inherit_scale(&self) -> bool {
        self.inherit_scale
    }

    /// Whether the cached world transform is stale
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Epoch stamped by the last world transform recomputation
    pub fn world_epoch(&self) -> u64 {
        self.world_epoch
    }

    /// Cached world matrix; only meaningful while the node is clean
    pub fn cached_world_transform(&self) -> &Mat4 {
        &self.derived.matrix
    }

    /// Box enclosing this node's objects and all descendants, as of the last
    /// scene update (`None` when the subtree holds nothing with bounds)
    pub fn world_bounds(&self) -> Option<&Aabb> {
        self.world_bounds.as_ref()
    }
}
