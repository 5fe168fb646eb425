//! Spatial partitioning data structures
//!
//! Acceleration structures the scene manager can use instead of walking the
//! node hierarchy when culling and answering scene queries. Indices store
//! world-space boxes keyed by object handle; the scene manager keeps them in
//! sync during the transform-update stage.

mod list;
mod octree;

pub use list::SimpleListIndex;
pub use octree::{OctreeConfig, OctreeIndex, OctreeNode};

use crate::foundation::collections::ObjectId;
use crate::foundation::math::Vec3;
use crate::scene::{Aabb, Frustum, Ray};

/// Trait for spatial data structures used in scene management
///
/// Allows pluggable implementations (list, octree, ...). Queries are
/// conservative: they may return objects whose exact volume misses the query
/// shape, never the other way round.
pub trait SpatialIndex: std::fmt::Debug + Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Add an object with its world-space bounds
    fn insert(&mut self, object: ObjectId, bounds: Aabb);

    /// Remove an object; false if it was not indexed
    fn remove(&mut self, object: ObjectId) -> bool;

    /// Update an object's bounds (after transform change)
    fn update(&mut self, object: ObjectId, bounds: Aabb) {
        self.remove(object);
        self.insert(object, bounds);
    }

    /// Bounds currently stored for an object
    fn bounds(&self, object: ObjectId) -> Option<Aabb>;

    /// Objects whose bounds intersect a frustum
    fn query_frustum(&self, frustum: &Frustum) -> Vec<ObjectId>;

    /// Objects whose bounds touch a sphere
    fn query_sphere(&self, center: Vec3, radius: f32) -> Vec<ObjectId>;

    /// Objects whose bounds intersect a box
    fn query_aabb(&self, bounds: &Aabb) -> Vec<ObjectId>;

    /// Objects whose bounds are hit by a ray
    fn query_ray(&self, ray: &Ray) -> Vec<ObjectId>;

    /// Number of indexed objects
    fn len(&self) -> usize;

    /// Whether nothing is indexed
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every object
    fn clear(&mut self);
}
