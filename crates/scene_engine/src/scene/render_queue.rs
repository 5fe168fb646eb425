//! Render queue for batched rendering
//!
//! Holds one frame's visible renderables, organised as
//! group id -> priority -> {solids, transparents}. Groups and priorities are
//! drawn in ascending order. After [`RenderQueue::sort`]:
//!
//! - solids are ordered by material key, then front-to-back
//! - transparents are ordered strictly back-to-front, material ignored
//!
//! Remaining ties fall back to object id and sub-index, so the result does not
//! depend on the order renderables were added.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::foundation::collections::ObjectId;
use crate::foundation::math::{Mat4, Vec3};
use crate::render::{Material, MaterialKey, RenderLight, RenderOperation};

/// Identifier of a render queue group; lower ids draw first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderQueueGroupId(pub u8);

impl RenderQueueGroupId {
    /// Backdrops drawn before everything else
    pub const BACKGROUND: Self = Self(0);
    /// Skies drawn before world geometry
    pub const SKIES_EARLY: Self = Self(5);
    /// Numbered slot
    pub const QUEUE_1: Self = Self(10);
    /// Numbered slot
    pub const QUEUE_2: Self = Self(20);
    /// Early world geometry
    pub const WORLD_GEOMETRY_1: Self = Self(25);
    /// Numbered slot
    pub const QUEUE_3: Self = Self(30);
    /// Numbered slot
    pub const QUEUE_4: Self = Self(40);
    /// Default group for ordinary objects
    pub const MAIN: Self = Self(50);
    /// Numbered slot
    pub const QUEUE_6: Self = Self(60);
    /// Numbered slot
    pub const QUEUE_7: Self = Self(70);
    /// Late world geometry
    pub const WORLD_GEOMETRY_2: Self = Self(75);
    /// Numbered slot
    pub const QUEUE_8: Self = Self(80);
    /// Numbered slot
    pub const QUEUE_9: Self = Self(90);
    /// Skies drawn after world geometry
    pub const SKIES_LATE: Self = Self(95);
    /// Overlays drawn last
    pub const OVERLAY: Self = Self(100);
}

impl Default for RenderQueueGroupId {
    fn default() -> Self {
        Self::MAIN
    }
}

/// One queued draw: a renderable part plus everything resolved for it
#[derive(Debug, Clone)]
pub struct QueuedRenderable {
    /// Object the part belongs to
    pub object: ObjectId,
    /// Index of the part within the object
    pub sub_index: usize,
    /// Geometry to draw
    pub operation: RenderOperation,
    /// Resolved material
    pub material: Arc<Material>,
    /// World matrix of the owning node
    pub world_matrix: Mat4,
    /// World-space centre of the object's bounds
    pub world_center: Vec3,
    /// Distance from the camera to `world_center`
    pub depth: f32,
    /// Lights affecting the object, nearest first
    pub lights: Vec<RenderLight>,
}

impl QueuedRenderable {
    /// Key the entry is grouped under
    pub fn material_key(&self) -> &MaterialKey {
        &self.material.key
    }

    /// Whether the entry must be drawn back-to-front
    pub fn requires_depth_sort(&self) -> bool {
        self.material
            .best_technique()
            .is_some_and(|technique| technique.requires_depth_sort())
    }
}

/// Run of consecutive solid entries sharing a material
#[derive(Debug, Clone, Copy)]
pub struct RenderBatch<'a> {
    /// Material used by all entries in this batch
    pub material: &'a Arc<Material>,
    /// Entries in this batch
    pub entries: &'a [QueuedRenderable],
}

impl RenderBatch<'_> {
    /// Get the number of entries in this batch
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn solid_order(a: &QueuedRenderable, b: &QueuedRenderable) -> Ordering {
    a.material_key()
        .cmp(b.material_key())
        .then_with(|| a.depth.total_cmp(&b.depth))
        .then_with(|| a.object.cmp(&b.object))
        .then_with(|| a.sub_index.cmp(&b.sub_index))
}

fn transparent_order(a: &QueuedRenderable, b: &QueuedRenderable) -> Ordering {
    b.depth
        .total_cmp(&a.depth)
        .then_with(|| a.object.cmp(&b.object))
        .then_with(|| a.sub_index.cmp(&b.sub_index))
}

/// Entries of one priority inside a group
#[derive(Debug, Default)]
pub struct RenderPriorityGroup {
    solids: Vec<QueuedRenderable>,
    transparents: Vec<QueuedRenderable>,
}

impl RenderPriorityGroup {
    fn add(&mut self, entry: QueuedRenderable) {
        if entry.requires_depth_sort() {
            self.transparents.push(entry);
        } else {
            self.solids.push(entry);
        }
    }

    fn sort(&mut self) {
        self.solids.sort_by(solid_order);
        self.transparents.sort_by(transparent_order);
    }

    fn clear(&mut self) {
        self.solids.clear();
        self.transparents.clear();
    }

    /// Solid entries (sorted after [`RenderQueue::sort`])
    pub fn solids(&self) -> &[QueuedRenderable] {
        &self.solids
    }

    /// Entries that need back-to-front drawing
    pub fn transparents(&self) -> &[QueuedRenderable] {
        &self.transparents
    }

    /// Solid entries split into consecutive same-material runs
    pub fn solid_batches(&self) -> Vec<RenderBatch<'_>> {
        let mut batches = Vec::new();
        let mut start = 0;
        for i in 1..=self.solids.len() {
            let boundary = i == self.solids.len()
                || self.solids[i].material_key() != self.solids[start].material_key();
            if boundary {
                batches.push(RenderBatch {
                    material: &self.solids[start].material,
                    entries: &self.solids[start..i],
                });
                start = i;
            }
        }
        batches
    }

    /// Total entries
    pub fn len(&self) -> usize {
        self.solids.len() + self.transparents.len()
    }

    /// Whether the priority group holds nothing
    pub fn is_empty(&self) -> bool {
        self.solids.is_empty() && self.transparents.is_empty()
    }
}

/// All priorities of one group id
#[derive(Debug, Default)]
pub struct RenderQueueGroup {
    priorities: BTreeMap<u16, RenderPriorityGroup>,
}

impl RenderQueueGroup {
    /// Priority groups in draw order
    pub fn priority_groups(&self) -> impl Iterator<Item = (u16, &RenderPriorityGroup)> {
        self.priorities.iter().map(|(&priority, group)| (priority, group))
    }

    /// Total entries across priorities
    pub fn len(&self) -> usize {
        self.priorities.values().map(RenderPriorityGroup::len).sum()
    }

    /// Whether the group holds nothing
    pub fn is_empty(&self) -> bool {
        self.priorities.values().all(RenderPriorityGroup::is_empty)
    }
}

/// Per-frame collection of visible renderables, reused across frames
#[derive(Debug, Default)]
pub struct RenderQueue {
    groups: BTreeMap<RenderQueueGroupId, RenderQueueGroup>,
    sorted: bool,
}

impl RenderQueue {
    /// Priority used when an object does not ask for one
    pub const DEFAULT_PRIORITY: u16 = 100;

    /// Create an empty render queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry under `group` / `priority`
    ///
    /// Adding the same part twice yields two entries; both are drawn.
    pub fn add_renderable(&mut self, entry: QueuedRenderable, group: RenderQueueGroupId, priority: u16) {
        self.groups
            .entry(group)
            .or_default()
            .priorities
            .entry(priority)
            .or_default()
            .add(entry);
        self.sorted = false;
    }

    /// Sort every partition; calling it again without changes keeps the order
    pub fn sort(&mut self) {
        for group in self.groups.values_mut() {
            for priority_group in group.priorities.values_mut() {
                priority_group.sort();
            }
        }
        self.sorted = true;
    }

    /// Whether the queue is sorted since the last insertion
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Empty every group, keeping allocated groups and capacity
    pub fn clear(&mut self) {
        for group in self.groups.values_mut() {
            for priority_group in group.priorities.values_mut() {
                priority_group.clear();
            }
        }
        self.sorted = false;
    }

    /// Non-empty groups in draw order
    pub fn groups(&self) -> impl Iterator<Item = (RenderQueueGroupId, &RenderQueueGroup)> {
        self.groups
            .iter()
            .filter(|(_, group)| !group.is_empty())
            .map(|(&id, group)| (id, group))
    }

    /// Look up one group
    pub fn group(&self, id: RenderQueueGroupId) -> Option<&RenderQueueGroup> {
        self.groups.get(&id)
    }

    /// Every entry in draw order (solids before transparents in each priority)
    pub fn iter(&self) -> impl Iterator<Item = &QueuedRenderable> {
        self.groups.values().flat_map(|group| {
            group
                .priorities
                .values()
                .flat_map(|p| p.solids.iter().chain(p.transparents.iter()))
        })
    }

    /// Total entries
    pub fn len(&self) -> usize {
        self.groups.values().map(RenderQueueGroup::len).sum()
    }

    /// Whether the queue holds nothing
    pub fn is_empty(&self) -> bool {
        self.groups.values().all(RenderQueueGroup::is_empty)
    }

    /// Number of solid entries
    pub fn solid_count(&self) -> usize {
        self.groups
            .values()
            .flat_map(|g| g.priorities.values())
            .map(|p| p.solids.len())
            .sum()
    }

    /// Number of transparent entries
    pub fn transparent_count(&self) -> usize {
        self.groups
            .values()
            .flat_map(|g| g.priorities.values())
            .map(|p| p.transparents.len())
            .sum()
    }

    /// Allocated entry slots across all partitions
    pub fn capacity(&self) -> usize {
        self.groups
            .values()
            .flat_map(|g| g.priorities.values())
            .map(|p| p.solids.capacity() + p.transparents.capacity())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::SlotMap;
    use crate::render::{Pass, PrimitiveType, SceneBlend, VertexDataHandle};

    fn opaque(name: &str) -> Arc<Material> {
        Arc::new(Material::single_pass(name, Pass::new(name)))
    }

    fn glass(name: &str) -> Arc<Material> {
        Arc::new(Material::single_pass(
            name,
            Pass::new(name).with_blend(SceneBlend::AlphaBlend).with_depth_write(false),
        ))
    }

    fn entry(object: ObjectId, material: &Arc<Material>, depth: f32) -> QueuedRenderable {
        QueuedRenderable {
            object,
            sub_index: 0,
            operation: RenderOperation::new(VertexDataHandle(1), 3, PrimitiveType::TriangleList),
            material: Arc::clone(material),
            world_matrix: Mat4::identity(),
            world_center: Vec3::zeros(),
            depth,
            lights: Vec::new(),
        }
    }

    fn ids(n: usize) -> Vec<ObjectId> {
        let mut map: SlotMap<ObjectId, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    fn depths(entries: &[QueuedRenderable]) -> Vec<f32> {
        entries.iter().map(|e| e.depth).collect()
    }

    #[test]
    fn test_opaque_front_to_back_transparent_back_to_front() {
        let ids = ids(4);
        let rock = opaque("Rock");
        let water = glass("Water");
        let mut queue = RenderQueue::new();

        queue.add_renderable(entry(ids[0], &rock, 10.0), RenderQueueGroupId::MAIN, 100);
        queue.add_renderable(entry(ids[1], &rock, 5.0), RenderQueueGroupId::MAIN, 100);
        queue.add_renderable(entry(ids[2], &water, 5.0), RenderQueueGroupId::MAIN, 100);
        queue.add_renderable(entry(ids[3], &water, 10.0), RenderQueueGroupId::MAIN, 100);
        queue.sort();

        let (_, group) = queue.groups().next().unwrap();
        let (_, priority) = group.priority_groups().next().unwrap();
        assert_eq!(depths(priority.solids()), vec![5.0, 10.0]);
        assert_eq!(depths(priority.transparents()), vec![10.0, 5.0]);
    }

    #[test]
    fn test_solids_grouped_by_material_first() {
        let ids = ids(4);
        let a = opaque("A");
        let b = opaque("B");
        let mut queue = RenderQueue::new();

        queue.add_renderable(entry(ids[0], &b, 1.0), RenderQueueGroupId::MAIN, 100);
        queue.add_renderable(entry(ids[1], &a, 9.0), RenderQueueGroupId::MAIN, 100);
        queue.add_renderable(entry(ids[2], &b, 0.5), RenderQueueGroupId::MAIN, 100);
        queue.add_renderable(entry(ids[3], &a, 3.0), RenderQueueGroupId::MAIN, 100);
        queue.sort();

        let keys: Vec<_> = queue.iter().map(|e| (e.material_key().as_str().to_string(), e.depth)).collect();
        assert_eq!(
            keys,
            vec![
                ("A".to_string(), 3.0),
                ("A".to_string(), 9.0),
                ("B".to_string(), 0.5),
                ("B".to_string(), 1.0),
            ]
        );

        let (_, group) = queue.groups().next().unwrap();
        let (_, priority) = group.priority_groups().next().unwrap();
        let batches = priority.solid_batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].material.key.as_str(), "A");
        assert_eq!(batches[1].len(), 2);
    }

    #[test]
    fn test_sort_is_idempotent_and_order_independent() {
        let ids = ids(6);
        let rock = opaque("Rock");
        let water = glass("Water");

        let entries: Vec<_> = vec![
            entry(ids[0], &rock, 2.0),
            entry(ids[1], &water, 2.0),
            entry(ids[2], &rock, 2.0),
            entry(ids[3], &water, 2.0),
            entry(ids[4], &rock, 1.0),
            entry(ids[5], &water, 7.0),
        ];

        let mut forward = RenderQueue::new();
        for e in entries.iter().cloned() {
            forward.add_renderable(e, RenderQueueGroupId::MAIN, 100);
        }
        let mut backward = RenderQueue::new();
        for e in entries.iter().rev().cloned() {
            backward.add_renderable(e, RenderQueueGroupId::MAIN, 100);
        }

        forward.sort();
        let first: Vec<_> = forward.iter().map(|e| e.object).collect();
        forward.sort();
        let second: Vec<_> = forward.iter().map(|e| e.object).collect();
        assert_eq!(first, second);

        backward.sort();
        let other: Vec<_> = backward.iter().map(|e| e.object).collect();
        assert_eq!(first, other);
    }

    #[test]
    fn test_groups_and_priorities_in_ascending_order() {
        let ids = ids(3);
        let rock = opaque("Rock");
        let mut queue = RenderQueue::new();

        queue.add_renderable(entry(ids[0], &rock, 1.0), RenderQueueGroupId::OVERLAY, 100);
        queue.add_renderable(entry(ids[1], &rock, 1.0), RenderQueueGroupId::MAIN, 200);
        queue.add_renderable(entry(ids[2], &rock, 1.0), RenderQueueGroupId::MAIN, 10);
        queue.sort();

        let order: Vec<_> = queue.iter().map(|e| e.object).collect();
        assert_eq!(order, vec![ids[2], ids[1], ids[0]]);

        let group_ids: Vec<_> = queue.groups().map(|(id, _)| id).collect();
        assert_eq!(group_ids, vec![RenderQueueGroupId::MAIN, RenderQueueGroupId::OVERLAY]);
    }

    #[test]
    fn test_duplicates_kept_and_clear_retains_capacity() {
        let ids = ids(1);
        let rock = opaque("Rock");
        let mut queue = RenderQueue::new();

        queue.add_renderable(entry(ids[0], &rock, 1.0), RenderQueueGroupId::MAIN, 100);
        queue.add_renderable(entry(ids[0], &rock, 1.0), RenderQueueGroupId::MAIN, 100);
        assert_eq!(queue.len(), 2);

        let capacity = queue.capacity();
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), capacity);
        assert!(queue.group(RenderQueueGroupId::MAIN).is_some());
        assert_eq!(queue.groups().count(), 0);
    }
}
