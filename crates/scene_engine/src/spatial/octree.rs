//! Octree spatial partitioning structure
//!
//! Divides the world cube into hierarchical octants. Each object is stored in
//! the deepest node whose box fully contains the object's box, so objects
//! straddling an octant boundary stay in the parent. Objects that do not fit
//! inside the world cube go to an overflow list that every query scans.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::foundation::collections::ObjectId;
use crate::foundation::math::Vec3;
use crate::scene::{Aabb, Frustum, Ray};
use crate::spatial::SpatialIndex;

/// Configuration for octree behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// Half size of the world cube centred on the origin
    pub world_half_extent: f32,

    /// Maximum objects per leaf before subdivision
    pub max_entries_per_node: usize,

    /// Maximum subdivision depth
    pub max_depth: u32,

    /// Minimum node half size (prevents excessive subdivision)
    pub min_node_size: f32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            world_half_extent: 1000.0,
            max_entries_per_node: 8,
            max_depth: 8,
            min_node_size: 1.0,
        }
    }
}

fn contains_box(outer: &Aabb, inner: &Aabb) -> bool {
    outer.min.x <= inner.min.x && outer.min.y <= inner.min.y && outer.min.z <= inner.min.z &&
    outer.max.x >= inner.max.x && outer.max.y >= inner.max.y && outer.max.z >= inner.max.z
}

/// Single node in the octree hierarchy
#[derive(Debug, Clone)]
pub struct OctreeNode {
    /// World-space bounds of this node
    pub bounds: Aabb,

    /// Objects stored at this level
    pub entries: Vec<(ObjectId, Aabb)>,

    /// Child nodes (8 octants), None if this is a leaf
    pub children: Option<Box<[OctreeNode; 8]>>,

    /// Depth in the tree (0 = root)
    pub depth: u32,
}

impl OctreeNode {
    /// Create a new leaf node
    pub fn new(bounds: Aabb, depth: u32) -> Self {
        Self {
            bounds,
            entries: Vec::new(),
            children: None,
            depth,
        }
    }

    /// Check if this node is a leaf (has no children)
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    fn child_bounds(&self, octant: usize) -> Aabb {
        let center = self.bounds.center();
        let quarter = self.bounds.extents() * 0.5;
        // Bit 0 selects +X, bit 1 +Y, bit 2 +Z
        let sign = |bit: usize| if octant & bit != 0 { 1.0 } else { -1.0 };
        let child_center = Vec3::new(
            center.x + quarter.x * sign(1),
            center.y + quarter.y * sign(2),
            center.z + quarter.z * sign(4),
        );
        Aabb::from_center_extents(child_center, quarter)
    }

    /// Octant that fully contains `bounds`, if any
    fn fitting_child(&self, bounds: &Aabb) -> Option<usize> {
        let children = self.children.as_ref()?;
        children.iter().position(|child| contains_box(&child.bounds, bounds))
    }

    fn subdivide(&mut self) {
        if self.children.is_some() {
            return;
        }
        let depth = self.depth + 1;
        let children: [OctreeNode; 8] = std::array::from_fn(|octant| OctreeNode::new(self.child_bounds(octant), depth));
        self.children = Some(Box::new(children));

        // Push down whatever now fits entirely inside one octant
        let entries = std::mem::take(&mut self.entries);
        for (object, bounds) in entries {
            match (self.fitting_child(&bounds), self.children.as_mut()) {
                (Some(octant), Some(children)) => children[octant].entries.push((object, bounds)),
                _ => self.entries.push((object, bounds)),
            }
        }
    }

    fn insert(&mut self, object: ObjectId, bounds: Aabb, config: &OctreeConfig) {
        if self.is_leaf() {
            let should_subdivide = self.entries.len() >= config.max_entries_per_node
                && self.depth < config.max_depth
                && self.bounds.extents().x * 0.5 >= config.min_node_size;
            if !should_subdivide {
                self.entries.push((object, bounds));
                return;
            }
            self.subdivide();
        }

        match (self.fitting_child(&bounds), self.children.as_mut()) {
            (Some(octant), Some(children)) => children[octant].insert(object, bounds, config),
            _ => self.entries.push((object, bounds)),
        }
    }

    fn remove(&mut self, object: ObjectId, bounds: &Aabb) -> bool {
        if let Some(index) = self.entries.iter().position(|(o, _)| *o == object) {
            self.entries.swap_remove(index);
            return true;
        }
        match (self.fitting_child(bounds), self.children.as_mut()) {
            (Some(octant), Some(children)) => children[octant].remove(object, bounds),
            _ => false,
        }
    }

    /// Collect objects whose bounds pass `test`, skipping subtrees whose node
    /// box fails `node_test`
    fn collect(
        &self,
        node_test: &dyn Fn(&Aabb) -> bool,
        test: &dyn Fn(&Aabb) -> bool,
        results: &mut Vec<ObjectId>,
    ) {
        // Entries always lie inside their node's box
        if !node_test(&self.bounds) {
            return;
        }
        results.extend(self.entries.iter().filter(|(_, b)| test(b)).map(|(o, _)| *o));
        if let Some(ref children) = self.children {
            for child in children.iter() {
                child.collect(node_test, test, results);
            }
        }
    }

    /// Get all leaf nodes (for visualization)
    pub fn get_all_leaves<'a>(&'a self, leaves: &mut Vec<&'a OctreeNode>) {
        if self.is_leaf() {
            leaves.push(self);
        } else if let Some(ref children) = self.children {
            for child in children.iter() {
                child.get_all_leaves(leaves);
            }
        }
    }

    /// Count total objects in this node and all children
    pub fn count_entries(&self) -> usize {
        let below: usize = self
            .children
            .as_ref()
            .map_or(0, |children| children.iter().map(OctreeNode::count_entries).sum());
        self.entries.len() + below
    }
}

/// Octree-backed [`SpatialIndex`]
#[derive(Debug, Clone)]
pub struct OctreeIndex {
    /// Root node containing the entire world space
    pub root: OctreeNode,

    /// Objects outside the world cube
    overflow: Vec<(ObjectId, Aabb)>,

    /// Stored bounds per object, used to find it again on removal
    locations: HashMap<ObjectId, Aabb>,

    config: OctreeConfig,
}

impl OctreeIndex {
    /// Create an octree covering the cube described by `config`
    pub fn new(config: OctreeConfig) -> Self {
        let half = config.world_half_extent;
        let world = Aabb::from_center_extents(Vec3::zeros(), Vec3::repeat(half));
        Self {
            root: OctreeNode::new(world, 0),
            overflow: Vec::new(),
            locations: HashMap::new(),
            config,
        }
    }

    /// Octree configuration
    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// Number of objects that did not fit in the world cube
    pub fn overflow_count(&self) -> usize {
        self.overflow.len()
    }

    /// Get all leaf nodes (for visualization)
    pub fn get_all_leaves(&self) -> Vec<&OctreeNode> {
        let mut leaves = Vec::new();
        self.root.get_all_leaves(&mut leaves);
        leaves
    }

    fn query(&self, node_test: &dyn Fn(&Aabb) -> bool, test: &dyn Fn(&Aabb) -> bool) -> Vec<ObjectId> {
        let mut results: Vec<ObjectId> = self
            .overflow
            .iter()
            .filter(|(_, b)| test(b))
            .map(|(o, _)| *o)
            .collect();
        self.root.collect(node_test, test, &mut results);
        results
    }
}

impl SpatialIndex for OctreeIndex {
    fn name(&self) -> &'static str {
        "octree"
    }

    fn insert(&mut self, object: ObjectId, bounds: Aabb) {
        if self.locations.contains_key(&object) {
            self.remove(object);
        }
        if contains_box(&self.root.bounds, &bounds) {
            self.root.insert(object, bounds, &self.config);
        } else {
            log::trace!("Object {:?} is outside the octree world bounds", object);
            self.overflow.push((object, bounds));
        }
        self.locations.insert(object, bounds);
    }

    fn remove(&mut self, object: ObjectId) -> bool {
        let Some(bounds) = self.locations.remove(&object) else {
            return false;
        };
        if let Some(index) = self.overflow.iter().position(|(o, _)| *o == object) {
            self.overflow.swap_remove(index);
            return true;
        }
        self.root.remove(object, &bounds)
    }

    fn bounds(&self, object: ObjectId) -> Option<Aabb> {
        self.locations.get(&object).copied()
    }

    fn query_frustum(&self, frustum: &Frustum) -> Vec<ObjectId> {
        let test = |b: &Aabb| frustum.intersects_aabb(b);
        self.query(&test, &test)
    }

    fn query_sphere(&self, center: Vec3, radius: f32) -> Vec<ObjectId> {
        let test = |b: &Aabb| b.intersects_sphere(center, radius);
        self.query(&test, &test)
    }

    fn query_aabb(&self, bounds: &Aabb) -> Vec<ObjectId> {
        let test = |b: &Aabb| b.intersects(bounds);
        self.query(&test, &test)
    }

    fn query_ray(&self, ray: &Ray) -> Vec<ObjectId> {
        let test = |b: &Aabb| b.intersect_ray(ray).is_some();
        self.query(&test, &test)
    }

    fn len(&self) -> usize {
        self.locations.len()
    }

    fn clear(&mut self) {
        self.root = OctreeNode::new(self.root.bounds, 0);
        self.overflow.clear();
        self.locations.clear();
    }
}
