//! Linear spatial index

use crate::foundation::collections::ObjectId;
use crate::foundation::math::Vec3;
use crate::scene::{Aabb, Frustum, Ray};
use crate::spatial::SpatialIndex;

/// Simple list-based index (no spatial optimization)
///
/// Every query is a linear scan. Sufficient for small scenes and useful as a
/// reference for the octree.
#[derive(Debug, Default)]
pub struct SimpleListIndex {
    entries: Vec<(ObjectId, Aabb)>,
}

impl SimpleListIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    fn filter(&self, predicate: impl Fn(&Aabb) -> bool) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|(_, bounds)| predicate(bounds))
            .map(|(object, _)| *object)
            .collect()
    }
}

impl SpatialIndex for SimpleListIndex {
    fn name(&self) -> &'static str {
        "list"
    }

    fn insert(&mut self, object: ObjectId, bounds: Aabb) {
        match self.entries.iter_mut().find(|(o, _)| *o == object) {
            Some(entry) => entry.1 = bounds,
            None => self.entries.push((object, bounds)),
        }
    }

    fn remove(&mut self, object: ObjectId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(o, _)| *o != object);
        self.entries.len() != before
    }

    fn update(&mut self, object: ObjectId, bounds: Aabb) {
        self.insert(object, bounds);
    }

    fn bounds(&self, object: ObjectId) -> Option<Aabb> {
        self.entries.iter().find(|(o, _)| *o == object).map(|(_, b)| *b)
    }

    fn query_frustum(&self, frustum: &Frustum) -> Vec<ObjectId> {
        self.filter(|bounds| frustum.intersects_aabb(bounds))
    }

    fn query_sphere(&self, center: Vec3, radius: f32) -> Vec<ObjectId> {
        self.filter(|bounds| bounds.intersects_sphere(center, radius))
    }

    fn query_aabb(&self, query: &Aabb) -> Vec<ObjectId> {
        self.filter(|bounds| bounds.intersects(query))
    }

    fn query_ray(&self, ray: &Ray) -> Vec<ObjectId> {
        self.filter(|bounds| bounds.intersect_ray(ray).is_some())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}
