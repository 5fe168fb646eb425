//! Scene queries
//!
//! Ray, sphere and box queries over attached, visible objects. Each query
//! brings transforms and bounds up to date first, uses the spatial index for
//! the broad phase when one is active, then tests the exact world volume.

use crate::foundation::collections::ObjectId;
use crate::foundation::math::Vec3;
use crate::scene::bounds::{Aabb, BoundingVolume, Ray};
use crate::scene::renderable_object::QueryFlags;
use crate::scene::scene_manager::SceneManager;
use crate::spatial::SpatialIndex;

/// One object hit by a ray query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayQueryHit {
    /// The object hit
    pub object: ObjectId,
    /// Distance along the ray to the entry point of the object's bounds
    pub distance: f32,
}

fn ray_hits(volume: &BoundingVolume, ray: &Ray) -> Option<f32> {
    match volume {
        BoundingVolume::Box(aabb) => aabb.intersect_ray(ray),
        BoundingVolume::Sphere(sphere) => ray.intersect_sphere(sphere),
    }
}

impl SceneManager {
    /// Candidate objects for a query, either from the index or every attached object
    fn query_candidates(&mut self, broad_phase: impl Fn(&dyn SpatialIndex) -> Vec<ObjectId>) -> Vec<ObjectId> {
        self.update_scene_graph();
        let mut candidates = match self.spatial_index() {
            Some(index) => broad_phase(index),
            None => self
                .tree()
                .iter()
                .flat_map(|(_, node)| node.attached_objects().iter().copied())
                .collect(),
        };
        candidates.sort();
        candidates
    }

    /// World volumes of the candidates that are visible and match `mask`
    fn query_volumes(&self, candidates: Vec<ObjectId>, mask: QueryFlags) -> Vec<(ObjectId, BoundingVolume)> {
        candidates
            .into_iter()
            .filter_map(|id| {
                let object = self.object(id)?;
                if !object.is_visible() || !object.query_flags.intersects(mask) {
                    return None;
                }
                let node = self.tree().get(object.parent_node()?)?;
                Some((id, object.local_bounds().transformed(node.cached_world_transform())))
            })
            .collect()
    }

    /// Objects whose bounds a ray passes through, nearest first
    pub fn ray_query(&mut self, ray: &Ray, mask: QueryFlags) -> Vec<RayQueryHit> {
        let candidates = self.query_candidates(|index| index.query_ray(ray));
        let mut hits: Vec<RayQueryHit> = self
            .query_volumes(candidates, mask)
            .into_iter()
            .filter_map(|(object, volume)| {
                ray_hits(&volume, ray).map(|distance| RayQueryHit { object, distance })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.object.cmp(&b.object)));
        hits
    }

    /// Objects whose bounds touch a sphere
    pub fn sphere_query(&mut self, center: Vec3, radius: f32, mask: QueryFlags) -> Vec<ObjectId> {
        let candidates = self.query_candidates(|index| index.query_sphere(center, radius));
        self.query_volumes(candidates, mask)
            .into_iter()
            .filter(|(_, volume)| match volume {
                BoundingVolume::Box(aabb) => aabb.intersects_sphere(center, radius),
                BoundingVolume::Sphere(sphere) => {
                    (sphere.center - center).magnitude() <= sphere.radius + radius
                }
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Objects whose bounds overlap a box
    pub fn box_query(&mut self, query: &Aabb, mask: QueryFlags) -> Vec<ObjectId> {
        let candidates = self.query_candidates(|index| index.query_aabb(query));
        self.query_volumes(candidates, mask)
            .into_iter()
            .filter(|(_, volume)| match volume {
                BoundingVolume::Box(aabb) => aabb.intersects(query),
                BoundingVolume::Sphere(sphere) => query.intersects_sphere(sphere.center, sphere.radius),
            })
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{MaterialLibrary, MeshHandle, PrimitiveType, RenderOperation, VertexDataHandle};
    use crate::scene::{CullingMode, RenderableObject, SceneConfig, Sphere, SubMesh};

    fn sphere_object(name: &str) -> RenderableObject {
        let op = RenderOperation::new(VertexDataHandle(1), 3, PrimitiveType::TriangleList);
        RenderableObject::mesh(
            name,
            MeshHandle(1),
            vec![SubMesh::new(op)],
            BoundingVolume::Sphere(Sphere::new(Vec3::zeros(), 1.0)),
            MaterialLibrary::BASE_WHITE,
        )
    }

    fn scene_with_row(mode: CullingMode) -> (SceneManager, Vec<ObjectId>) {
        let config = SceneConfig {
            culling_mode: mode,
            ..SceneConfig::default()
        };
        let mut scene = SceneManager::new(config, Box::new(MaterialLibrary::with_defaults()));
        let root = scene.root_node();
        let mut ids = Vec::new();
        for i in 0..3u8 {
            let node = scene.create_child_node(root, None).unwrap();
            scene
                .tree_mut()
                .set_position(node, Vec3::new(f32::from(i) * 10.0, 0.0, 0.0))
                .unwrap();
            let id = scene.add_object(sphere_object(&format!("ball{i}"))).unwrap();
            scene.attach_object(node, id).unwrap();
            ids.push(id);
        }
        (scene, ids)
    }

    #[test]
    fn test_ray_query_sorted_by_distance() {
        for mode in [CullingMode::Hierarchy, CullingMode::Octree] {
            let (mut scene, ids) = scene_with_row(mode);
            let ray = Ray::new(Vec3::new(25.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0));
            let hits = scene.ray_query(&ray, QueryFlags::all());

            let order: Vec<ObjectId> = hits.iter().map(|h| h.object).collect();
            assert_eq!(order, vec![ids[2], ids[1], ids[0]]);
            approx::assert_relative_eq!(hits[0].distance, 4.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_query_masks_and_visibility() {
        let (mut scene, ids) = scene_with_row(CullingMode::Hierarchy);
        scene.object_mut(ids[1]).unwrap().visible = false;

        let everything = Aabb::new(Vec3::repeat(-100.0), Vec3::repeat(100.0));
        assert_eq!(scene.box_query(&everything, QueryFlags::all()), {
            let mut expected = vec![ids[0], ids[2]];
            expected.sort();
            expected
        });
        assert!(scene.box_query(&everything, QueryFlags::FX).is_empty());
    }

    #[test]
    fn test_sphere_query_follows_moved_node() {
        let (mut scene, ids) = scene_with_row(CullingMode::SimpleList);
        assert_eq!(scene.sphere_query(Vec3::new(10.0, 0.0, 0.0), 0.5, QueryFlags::all()), vec![ids[1]]);

        let node = scene.object(ids[1]).unwrap().parent_node().unwrap();
        scene.tree_mut().set_position(node, Vec3::new(0.0, 50.0, 0.0)).unwrap();
        assert!(scene.sphere_query(Vec3::new(10.0, 0.0, 0.0), 0.5, QueryFlags::all()).is_empty());
        assert_eq!(scene.sphere_query(Vec3::new(0.0, 50.0, 0.0), 0.5, QueryFlags::all()), vec![ids[1]]);
    }
}
