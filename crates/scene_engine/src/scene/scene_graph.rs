//! Scene tree
//!
//! Nodes live in a generational arena and refer to each other by [`NodeId`].
//! World transforms are cached per node and resolved lazily:
//!
//! - a local transform change marks the node and its subtree dirty, stopping
//!   at nodes that are already dirty (a dirty node's descendants are always
//!   dirty too)
//! - a read walks up to the highest dirty ancestor and recomputes top-down
//!   along that path only; a read of a clean node is a cache hit
//!
//! Every recomputation stamps the node with a fresh epoch from a tree-wide
//! counter, so dependants can detect staleness by comparing one integer.

use std::collections::HashMap;

use crate::foundation::collections::{NodeId, ObjectId, SlotMap};
use crate::foundation::math::{utils, Mat4, Point3, Quat, Vec3};
use crate::scene::bounds::Aabb;
use crate::scene::error::{RenameStatus, SceneError, SceneResult};
use crate::scene::node::{Derived, SpatialNode, TransformSpace};

/// Callback used by [`SceneTree::walk`]
///
/// Nodes are visited in pre-order. Returning `false` from `visit` skips the
/// node's children.
pub trait TreeVisitor {
    /// Visit a node at the given depth (the start node has depth 0)
    fn visit(&mut self, id: NodeId, node: &SpatialNode, depth: usize) -> bool;
}

impl<F> TreeVisitor for F
where
    F: FnMut(NodeId, &SpatialNode, usize) -> bool,
{
    fn visit(&mut self, id: NodeId, node: &SpatialNode, depth: usize) -> bool {
        self(id, node, depth)
    }
}

/// What a destroy call removed from the tree
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemovedNodes {
    /// Nodes that no longer exist
    pub nodes: Vec<NodeId>,
    /// Objects that were attached to those nodes and are now detached
    pub objects: Vec<ObjectId>,
}

/// Arena-backed tree of [`SpatialNode`]s with a per-tree name namespace
#[derive(Debug)]
pub struct SceneTree {
    nodes: SlotMap<NodeId, SpatialNode>,
    names: HashMap<String, NodeId>,
    root: NodeId,
    epoch: u64,
    auto_name_counter: u64,
}

impl SceneTree {
    /// Create a tree containing only a root node
    pub fn new(root_name: &str) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(SpatialNode::new(root_name.to_string(), None));
        let mut names = HashMap::new();
        names.insert(root_name.to_string(), root);
        Self {
            nodes,
            names,
            root,
            epoch: 0,
            auto_name_counter: 0,
        }
    }

    /// The root node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes, including the root
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the handle refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Borrow a node
    pub fn get(&self, id: NodeId) -> Option<&SpatialNode> {
        self.nodes.get(id)
    }

    /// Borrow a node or fail with [`SceneError::NodeNotFound`]
    pub fn node(&self, id: NodeId) -> SceneResult<&SpatialNode> {
        self.nodes.get(id).ok_or(SceneError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> SceneResult<&mut SpatialNode> {
        self.nodes.get_mut(id).ok_or(SceneError::NodeNotFound(id))
    }

    /// Look a node up by name
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Iterate over all nodes in arena order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SpatialNode)> {
        self.nodes.iter()
    }

    /// Create a child node with an identity local transform
    ///
    /// Without a name, a unique `Unnamed_N` name is generated.
    pub fn create_child(&mut self, parent: NodeId, name: Option<&str>) -> SceneResult<NodeId> {
        if !self.nodes.contains_key(parent) {
            return Err(SceneError::NodeNotFound(parent));
        }

        let name = match name {
            Some(name) => {
                if self.names.contains_key(name) {
                    return Err(SceneError::DuplicateName {
                        kind: "node",
                        name: name.to_string(),
                    });
                }
                name.to_string()
            }
            None => self.generate_name(),
        };

        let id = self.nodes.insert(SpatialNode::new(name.clone(), Some(parent)));
        self.names.insert(name, id);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(id);
        }
        log::debug!("Created node '{}'", self.nodes[id].name);
        Ok(id)
    }

    fn generate_name(&mut self) -> String {
        loop {
            self.auto_name_counter += 1;
            let candidate = format!("Unnamed_{}", self.auto_name_counter);
            if !self.names.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Rename a node
    ///
    /// The old name stops resolving and the new one starts resolving in the
    /// same call. A taken name leaves everything unchanged.
    pub fn rename(&mut self, id: NodeId, new_name: &str) -> SceneResult<RenameStatus> {
        let old_name = self.node(id)?.name.clone();
        if old_name == new_name {
            return Ok(RenameStatus::Unchanged);
        }
        if self.names.contains_key(new_name) {
            log::debug!("Rename of node '{}' to '{}' refused: name in use", old_name, new_name);
            return Ok(RenameStatus::NameInUse);
        }

        self.names.remove(&old_name);
        self.names.insert(new_name.to_string(), id);
        self.node_mut(id)?.name = new_name.to_string();
        log::debug!("Renamed node '{}' to '{}'", old_name, new_name);
        Ok(RenameStatus::Renamed)
    }

    /// Whether `ancestor` is `node` or lies on the path from `node` to the root
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id).and_then(|n| n.parent);
        }
        false
    }

    /// Move a node (and its subtree) under a new parent
    ///
    /// Fails with [`SceneError::CyclicGraph`] when `new_parent` is the node
    /// itself or one of its descendants; the tree is untouched in that case.
    /// The local transform is kept, so the world transform generally changes.
    pub fn set_parent(&mut self, id: NodeId, new_parent: NodeId) -> SceneResult<()> {
        let old_parent = self.node(id)?.parent;
        self.node(new_parent)?;

        let Some(old_parent) = old_parent else {
            return Err(SceneError::InvalidOperation(
                "the root node cannot be reparented".to_string(),
            ));
        };

        if self.is_ancestor_or_self(id, new_parent) {
            return Err(SceneError::CyclicGraph {
                node: self.nodes[id].name.clone(),
                parent: self.nodes[new_parent].name.clone(),
            });
        }

        if old_parent == new_parent {
            return Ok(());
        }

        if let Some(parent) = self.nodes.get_mut(old_parent) {
            parent.children.retain(|&child| child != id);
        }
        if let Some(parent) = self.nodes.get_mut(new_parent) {
            parent.children.push(id);
        }
        self.node_mut(id)?.parent = Some(new_parent);
        self.mark_dirty(id);

        log::debug!(
            "Reparented node '{}' under '{}'",
            self.nodes[id].name,
            self.nodes[new_parent].name
        );
        Ok(())
    }

    /// Destroy a node
    ///
    /// When `recursive`, the whole subtree is removed. Otherwise the node's
    /// children move to its parent and keep their local transforms. Objects
    /// attached to removed nodes are detached, never destroyed; the caller
    /// gets them back in [`RemovedNodes::objects`].
    pub(crate) fn destroy(&mut self, id: NodeId, recursive: bool) -> SceneResult<RemovedNodes> {
        let parent = self.node(id)?.parent;
        let Some(parent) = parent else {
            return Err(SceneError::InvalidOperation(
                "the root node cannot be destroyed".to_string(),
            ));
        };

        let doomed = if recursive {
            self.descendants(id)
        } else {
            let children = std::mem::take(&mut self.node_mut(id)?.children);
            for &child in &children {
                if let Some(node) = self.nodes.get_mut(child) {
                    node.parent = Some(parent);
                }
                self.mark_dirty(child);
            }
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.extend(children);
            }
            vec![id]
        };

        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|&child| child != id);
        }

        let mut removed = RemovedNodes::default();
        for node_id in doomed {
            if let Some(node) = self.nodes.remove(node_id) {
                self.names.remove(&node.name);
                log::debug!("Destroyed node '{}'", node.name);
                removed.objects.extend(node.objects);
                removed.nodes.push(node_id);
            }
        }
        Ok(removed)
    }

    /// Pre-order list of `id` and all of its descendants
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                result.push(current);
                stack.extend(node.children.iter().rev());
            }
        }
        result
    }

    /// Append `id` and its descendants to `out` level by level
    ///
    /// Every node lands after its parent. `out` doubles as the work queue so a
    /// reused buffer makes the walk allocation free.
    pub fn breadth_first_into(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if !self.nodes.contains_key(id) {
            return;
        }
        let mut cursor = out.len();
        out.push(id);
        while let Some(&current) = out.get(cursor) {
            cursor += 1;
            if let Some(node) = self.nodes.get(current) {
                out.extend_from_slice(&node.children);
            }
        }
    }

    /// Walk the subtree rooted at `start` in pre-order
    pub fn walk<V: TreeVisitor + ?Sized>(&self, start: NodeId, visitor: &mut V) {
        let mut stack = vec![(start, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if visitor.visit(id, node, depth) {
                stack.extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
            }
        }
    }

    // ---- attachment bookkeeping (node side only) ----

    /// Add an object to a node's attachment set; false if it was already there
    pub(crate) fn link_object(&mut self, id: NodeId, object: ObjectId) -> SceneResult<bool> {
        let node = self.node_mut(id)?;
        if node.objects.contains(&object) {
            return Ok(false);
        }
        node.objects.push(object);
        Ok(true)
    }

    /// Remove an object from a node's attachment set; false if it was absent
    pub(crate) fn unlink_object(&mut self, id: NodeId, object: ObjectId) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                let before = node.objects.len();
                node.objects.retain(|&o| o != object);
                node.objects.len() != before
            }
            None => false,
        }
    }

    pub(crate) fn set_world_bounds(&mut self, id: NodeId, bounds: Option<Aabb>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.world_bounds = bounds;
        }
    }

    // ---- local transform mutation ----

    /// Mark a node and its subtree as needing a world transform update
    pub fn mark_dirty(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current) else {
                continue;
            };
            // Descendants of a dirty node are already dirty
            if node.dirty && current != id {
                continue;
            }
            node.dirty = true;
            stack.extend(node.children.iter().copied());
        }
    }

    fn modify_local(&mut self, id: NodeId, f: impl FnOnce(&mut SpatialNode)) -> SceneResult<()> {
        f(self.node_mut(id)?);
        self.mark_dirty(id);
        Ok(())
    }

    /// Set the local position
    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> SceneResult<()> {
        self.modify_local(id, |n| n.local.position = position)
    }

    /// Set the local orientation
    pub fn set_orientation(&mut self, id: NodeId, orientation: Quat) -> SceneResult<()> {
        self.modify_local(id, |n| n.local.rotation = orientation)
    }

    /// Set the local scale
    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) -> SceneResult<()> {
        self.modify_local(id, |n| n.local.scale = scale)
    }

    /// Multiply the local scale component-wise
    pub fn scale_by(&mut self, id: NodeId, factor: Vec3) -> SceneResult<()> {
        self.modify_local(id, |n| n.local.scale = n.local.scale.component_mul(&factor))
    }

    /// Reset the local orientation to identity
    pub fn reset_orientation(&mut self, id: NodeId) -> SceneResult<()> {
        self.set_orientation(id, Quat::identity())
    }

    /// Choose whether the node's world scale includes its parent's scale
    pub fn set_inherit_scale(&mut self, id: NodeId, inherit: bool) -> SceneResult<()> {
        self.modify_local(id, |n| n.inherit_scale = inherit)
    }

    /// Remember the current local transform as the initial state
    pub fn set_initial_state(&mut self, id: NodeId) -> SceneResult<()> {
        let node = self.node_mut(id)?;
        node.initial = node.local;
        Ok(())
    }

    /// Restore the local transform remembered by `set_initial_state`
    pub fn reset_to_initial_state(&mut self, id: NodeId) -> SceneResult<()> {
        self.modify_local(id, |n| n.local = n.initial)
    }

    /// Move the node by `delta` expressed in `space`
    pub fn translate(&mut self, id: NodeId, delta: Vec3, space: TransformSpace) -> SceneResult<()> {
        let offset = match space {
            TransformSpace::Local => self.node(id)?.local.rotation * delta,
            TransformSpace::Parent => delta,
            TransformSpace::World => match self.node(id)?.parent {
                Some(parent) => {
                    let derived = self.resolve(parent)?;
                    let mut local = derived.orientation.inverse() * delta;
                    // A collapsed parent axis cannot be moved along
                    let mut collapsed = false;
                    for (value, scale) in local.iter_mut().zip(derived.scale.iter()) {
                        if scale.abs() > f32::EPSILON {
                            *value /= scale;
                        } else {
                            *value = 0.0;
                            collapsed = true;
                        }
                    }
                    if collapsed {
                        log::debug!("World-space translate ignored on zero-scaled parent axes");
                    }
                    local
                }
                None => delta,
            },
        };
        self.modify_local(id, |n| n.local.position += offset)
    }

    /// Rotate the node around `axis` by `angle` radians, in `space`
    pub fn rotate(&mut self, id: NodeId, axis: Vec3, angle: f32, space: TransformSpace) -> SceneResult<()> {
        let Some(axis) = nalgebra::Unit::try_new(axis, f32::EPSILON) else {
            return Ok(());
        };
        let q = Quat::from_axis_angle(&axis, angle);
        let orientation = self.node(id)?.local.rotation;
        let rotated = match space {
            TransformSpace::Local => orientation * q,
            TransformSpace::Parent => q * orientation,
            TransformSpace::World => {
                let world = self.resolve(id)?.orientation;
                orientation * world.inverse() * q * world
            }
        };
        // Renormalise to keep drift from repeated small rotations in check
        self.set_orientation(id, Quat::new_normalize(rotated.into_inner()))
    }

    /// Rotate around the local Y axis
    pub fn yaw(&mut self, id: NodeId, angle: f32) -> SceneResult<()> {
        self.rotate(id, Vec3::y(), angle, TransformSpace::Local)
    }

    /// Rotate around the local X axis
    pub fn pitch(&mut self, id: NodeId, angle: f32) -> SceneResult<()> {
        self.rotate(id, Vec3::x(), angle, TransformSpace::Local)
    }

    /// Rotate around the local Z axis
    pub fn roll(&mut self, id: NodeId, angle: f32) -> SceneResult<()> {
        self.rotate(id, Vec3::z(), angle, TransformSpace::Local)
    }

    // ---- derived transform resolution ----

    /// World transform of a node, recomputed only if stale
    pub fn world_transform(&mut self, id: NodeId) -> SceneResult<Mat4> {
        Ok(self.resolve(id)?.matrix)
    }

    /// World-space position
    pub fn derived_position(&mut self, id: NodeId) -> SceneResult<Vec3> {
        Ok(self.resolve(id)?.position)
    }

    /// World-space orientation
    pub fn derived_orientation(&mut self, id: NodeId) -> SceneResult<Quat> {
        Ok(self.resolve(id)?.orientation)
    }

    /// World-space scale
    pub fn derived_scale(&mut self, id: NodeId) -> SceneResult<Vec3> {
        Ok(self.resolve(id)?.scale)
    }

    /// Epoch of the node's current world transform, resolving it first
    pub fn world_epoch(&mut self, id: NodeId) -> SceneResult<u64> {
        self.resolve(id)?;
        Ok(self.nodes[id].world_epoch)
    }

    /// Resolve every dirty node; returns how many were recomputed
    pub fn update(&mut self) -> usize {
        let mut updated = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            // Clean subtrees may still contain dirty nodes further down
            if node.dirty {
                self.recompute(id);
                updated += 1;
            }
            stack.extend(self.nodes[id].children.iter().copied());
        }
        if updated > 0 {
            log::trace!("Updated {} node transform(s)", updated);
        }
        updated
    }

    fn resolve(&mut self, id: NodeId) -> SceneResult<Derived> {
        let node = self.node(id)?;
        if !node.dirty {
            return Ok(node.derived);
        }

        // Collect the dirty chain up to the first clean ancestor
        let mut chain = vec![id];
        let mut current = node.parent;
        while let Some(parent) = current {
            let parent_node = &self.nodes[parent];
            if !parent_node.dirty {
                break;
            }
            chain.push(parent);
            current = parent_node.parent;
        }

        for &node_id in chain.iter().rev() {
            self.recompute(node_id);
        }
        Ok(self.nodes[id].derived)
    }

    /// Recompute one node; its parent must be clean
    fn recompute(&mut self, id: NodeId) {
        let parent_derived = self.nodes[id].parent.map(|p| self.nodes[p].derived);
        self.epoch += 1;
        let epoch = self.epoch;

        let node = &mut self.nodes[id];
        let local = node.local;
        node.derived = match parent_derived {
            None => Derived {
                matrix: local.to_matrix(),
                position: local.position,
                orientation: local.rotation,
                scale: local.scale,
            },
            Some(parent) => {
                let orientation = parent.orientation * local.rotation;
                if node.inherit_scale {
                    let matrix = parent.matrix * local.to_matrix();
                    Derived {
                        matrix,
                        position: utils::translation_of(&matrix),
                        orientation,
                        scale: parent.scale.component_mul(&local.scale),
                    }
                } else {
                    let position = parent
                        .matrix
                        .transform_point(&Point3::from(local.position))
                        .coords;
                    let matrix = Mat4::new_translation(&position)
                        * orientation.to_homogeneous()
                        * Mat4::new_nonuniform_scaling(&local.scale);
                    Derived {
                        matrix,
                        position,
                        orientation,
                        scale: local.scale,
                    }
                }
            }
        };
        node.dirty = false;
        node.world_epoch = epoch;
    }
}
