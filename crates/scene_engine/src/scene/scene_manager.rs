//! Scene Manager - owns the scene and drives frame rendering
//!
//! Following Game Engine Architecture Chapter 11.2.7 - Scene Graphs.
//!
//! The Scene Manager:
//! 1. Owns the node tree and the object, camera and light arenas
//! 2. Keeps derived transforms, node bounds and the spatial index current
//! 3. Culls objects against each active camera's frustum
//! 4. Builds and sorts the render queue, then submits it to a [`RenderSystem`]
//!
//! Per frame the manager moves through the [`FramePhase`] states
//! `Idle -> UpdatingTransforms -> Culling -> QueueBuilding -> Rendering -> Idle`.
//! Structural mutation needs `&mut SceneManager`, so it can only happen
//! between frames.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::foundation::collections::{CameraId, LightId, NodeId, ObjectId, SlotMap};
use crate::foundation::math::{Mat4, Vec3};
use crate::foundation::time::Stopwatch;
use crate::render::{Material, MaterialKey, MaterialSystem, Pass, RenderLight, RenderSystem};
use crate::scene::bounds::{Aabb, BoundingVolume};
use crate::scene::camera::{Camera, ParentFrame};
use crate::scene::error::{RenameStatus, SceneError, SceneResult};
use crate::scene::frustum::Frustum;
use crate::scene::light::{lights_affecting, Light, LightKind};
use crate::scene::node::SpatialNode;
use crate::scene::listener::{FrameStats, SceneListener};
use crate::scene::render_queue::{QueuedRenderable, RenderQueue, RenderQueueGroupId};
use crate::scene::renderable_object::RenderableObject;
use crate::scene::scene_graph::SceneTree;
use crate::spatial::{OctreeConfig, OctreeIndex, SimpleListIndex, SpatialIndex};

/// How visible objects are found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CullingMode {
    /// Walk the node tree, pruning subtrees whose bounds are off-screen
    #[default]
    Hierarchy,
    /// Linear spatial index
    SimpleList,
    /// Octree spatial index
    Octree,
}

/// Scene Manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Name of the root node
    pub root_node_name: String,

    /// Enable frustum culling (disabled: every attached visible object is queued)
    pub enable_culling: bool,

    /// Strategy used to find visible objects
    pub culling_mode: CullingMode,

    /// Queue group for objects that do not choose one
    pub default_queue_group: RenderQueueGroupId,

    /// Priority for objects that do not choose one
    pub default_priority: u16,

    /// How many extra times a listener may repeat one queue group per frame
    pub max_queue_repeats: u32,

    /// Upper bound on objects queued per camera (0 = unlimited)
    pub max_objects_per_frame: usize,

    /// Ambient colour handed to the backend at the start of every frame
    pub ambient_light: Vec3,

    /// Octree parameters, used with [`CullingMode::Octree`]
    pub octree: OctreeConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            root_node_name: "SceneRoot".to_string(),
            enable_culling: true,
            culling_mode: CullingMode::Hierarchy,
            default_queue_group: RenderQueueGroupId::MAIN,
            default_priority: RenderQueue::DEFAULT_PRIORITY,
            max_queue_repeats: 4,
            max_objects_per_frame: 0,
            ambient_light: Vec3::zeros(),
            octree: OctreeConfig::default(),
        }
    }
}

impl Config for SceneConfig {}

/// Stage of frame processing the manager is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Between frames; the scene may be mutated
    Idle,
    /// Resolving dirty transforms and bounds
    UpdatingTransforms,
    /// Testing objects against a camera frustum
    Culling,
    /// Resolving materials and filling the render queue
    QueueBuilding,
    /// Submitting the sorted queue to the backend
    Rendering,
}

/// Scene Manager - owns the scene graph and renders it
pub struct SceneManager {
    config: SceneConfig,
    tree: SceneTree,

    objects: SlotMap<ObjectId, RenderableObject>,
    object_names: HashMap<String, ObjectId>,
    cameras: SlotMap<CameraId, Camera>,
    camera_names: HashMap<String, CameraId>,
    lights: SlotMap<LightId, Light>,
    light_names: HashMap<String, LightId>,

    materials: Box<dyn MaterialSystem>,
    render_queue: RenderQueue,
    spatial_index: Option<Box<dyn SpatialIndex>>,
    listeners: Vec<Box<dyn SceneListener>>,

    phase: FramePhase,
    frame_count: u64,
    last_stats: FrameStats,

    // Per-frame scratch, cleared rather than reallocated
    bounds_order: Vec<NodeId>,
    subtree_bounds: HashMap<NodeId, Aabb>,
}

impl std::fmt::Debug for SceneManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneManager")
            .field("nodes", &self.tree.node_count())
            .field("objects", &self.objects.len())
            .field("cameras", &self.cameras.len())
            .field("lights", &self.lights.len())
            .field("phase", &self.phase)
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

fn make_index(config: &SceneConfig) -> Option<Box<dyn SpatialIndex>> {
    match config.culling_mode {
        CullingMode::Hierarchy => None,
        CullingMode::SimpleList => Some(Box::new(SimpleListIndex::new())),
        CullingMode::Octree => Some(Box::new(OctreeIndex::new(config.octree.clone()))),
    }
}

impl SceneManager {
    /// Create a scene manager with a material system and configuration
    pub fn new(config: SceneConfig, materials: Box<dyn MaterialSystem>) -> Self {
        let spatial_index = make_index(&config);
        log::info!(
            "Scene manager created (root '{}', culling {:?})",
            config.root_node_name,
            config.culling_mode
        );
        Self {
            tree: SceneTree::new(&config.root_node_name),
            config,
            objects: SlotMap::with_key(),
            object_names: HashMap::new(),
            cameras: SlotMap::with_key(),
            camera_names: HashMap::new(),
            lights: SlotMap::with_key(),
            light_names: HashMap::new(),
            materials,
            render_queue: RenderQueue::new(),
            spatial_index,
            listeners: Vec::new(),
            phase: FramePhase::Idle,
            frame_count: 0,
            last_stats: FrameStats::default(),
            bounds_order: Vec::new(),
            subtree_bounds: HashMap::new(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Switch culling strategy, rebuilding the spatial index on the next update
    pub fn set_culling_mode(&mut self, mode: CullingMode) {
        self.config.culling_mode = mode;
        self.spatial_index = make_index(&self.config);
    }

    /// Enable or disable frustum culling
    pub fn set_culling_enabled(&mut self, enabled: bool) {
        self.config.enable_culling = enabled;
    }

    /// Set the scene's ambient colour
    pub fn set_ambient_light(&mut self, colour: Vec3) {
        self.config.ambient_light = colour;
    }

    /// Current ambient colour
    pub fn ambient_light(&self) -> Vec3 {
        self.config.ambient_light
    }

    /// Replace the material system
    pub fn set_material_system(&mut self, materials: Box<dyn MaterialSystem>) {
        self.materials = materials;
    }

    /// Register a frame listener
    pub fn add_listener(&mut self, listener: Box<dyn SceneListener>) {
        self.listeners.push(listener);
    }

    /// Current frame phase
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Frames rendered so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Statistics of the last completed frame
    pub fn last_frame_stats(&self) -> &FrameStats {
        &self.last_stats
    }

    /// Box enclosing everything attached to the tree, as of the last update
    pub fn scene_bounds(&self) -> Option<Aabb> {
        self.tree.get(self.tree.root())?.world_bounds().copied()
    }

    /// The spatial index, when a non-hierarchical culling mode is active
    pub fn spatial_index(&self) -> Option<&dyn SpatialIndex> {
        self.spatial_index.as_deref()
    }

    // ---- nodes ----

    /// The node tree
    pub fn tree(&self) -> &SceneTree {
        &self.tree
    }

    /// Mutable node tree, for transforms, renames and reparenting
    pub fn tree_mut(&mut self) -> &mut SceneTree {
        &mut self.tree
    }

    /// The root node
    pub fn root_node(&self) -> NodeId {
        self.tree.root()
    }

    /// Create a child node under `parent`
    pub fn create_child_node(&mut self, parent: NodeId, name: Option<&str>) -> SceneResult<NodeId> {
        self.tree.create_child(parent, name)
    }

    /// Look a node up by name
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.tree.find(name)
    }

    /// Rename a node
    pub fn rename_node(&mut self, node: NodeId, name: &str) -> SceneResult<RenameStatus> {
        self.tree.rename(node, name)
    }

    /// Move a node under a new parent, rejecting cycles
    pub fn reparent_node(&mut self, node: NodeId, new_parent: NodeId) -> SceneResult<()> {
        self.tree.set_parent(node, new_parent)
    }

    /// World transform of a node
    pub fn node_world_transform(&mut self, node: NodeId) -> SceneResult<Mat4> {
        self.tree.world_transform(node)
    }

    /// Destroy a node
    ///
    /// With `recursive`, the whole subtree goes; otherwise the children move
    /// up to the node's parent. Objects, cameras and lights hanging off removed
    /// nodes are detached, not destroyed.
    pub fn destroy_node(&mut self, node: NodeId, recursive: bool) -> SceneResult<()> {
        let removed = self.tree.destroy(node, recursive)?;

        for object in removed.objects {
            if let Some(obj) = self.objects.get_mut(object) {
                obj.parent = None;
            }
            if let Some(index) = self.spatial_index.as_mut() {
                index.remove(object);
            }
        }
        for camera in self.cameras.values_mut() {
            if camera.parent.is_some_and(|p| removed.nodes.contains(&p)) {
                camera.parent = None;
                camera.notify_parent_frame(None);
            }
        }
        for light in self.lights.values_mut() {
            if light.parent.is_some_and(|p| removed.nodes.contains(&p)) {
                light.parent = None;
            }
        }
        Ok(())
    }

    // ---- renderable objects ----

    /// Take ownership of a renderable; it starts out detached
    pub fn add_object(&mut self, mut object: RenderableObject) -> SceneResult<ObjectId> {
        if self.object_names.contains_key(&object.name) {
            return Err(SceneError::DuplicateName {
                kind: "object",
                name: object.name,
            });
        }
        object.parent = None;
        let name = object.name.clone();
        let id = self.objects.insert(object);
        self.object_names.insert(name, id);
        Ok(id)
    }

    /// Borrow an object
    pub fn object(&self, id: ObjectId) -> Option<&RenderableObject> {
        self.objects.get(id)
    }

    /// Mutably borrow an object (flags, material, bounds)
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut RenderableObject> {
        self.objects.get_mut(id)
    }

    /// Look an object up by name
    pub fn find_object(&self, name: &str) -> Option<ObjectId> {
        self.object_names.get(name).copied()
    }

    /// Number of objects owned by the scene
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Rename an object; attachment is unaffected
    pub fn rename_object(&mut self, id: ObjectId, new_name: &str) -> SceneResult<RenameStatus> {
        let object = self.objects.get_mut(id).ok_or(SceneError::ObjectNotFound(id))?;
        if object.name == new_name {
            return Ok(RenameStatus::Unchanged);
        }
        if self.object_names.contains_key(new_name) {
            return Ok(RenameStatus::NameInUse);
        }
        let old_name = std::mem::replace(&mut object.name, new_name.to_string());
        self.object_names.remove(&old_name);
        self.object_names.insert(new_name.to_string(), id);
        log::debug!("Renamed object '{}' to '{}'", old_name, new_name);
        Ok(RenameStatus::Renamed)
    }

    /// Remove an object from the scene, detaching it first
    pub fn destroy_object(&mut self, id: ObjectId) -> SceneResult<RenderableObject> {
        if !self.objects.contains_key(id) {
            return Err(SceneError::ObjectNotFound(id));
        }
        self.detach_object_from_parent(id);
        let object = self.objects.remove(id).ok_or(SceneError::ObjectNotFound(id))?;
        self.object_names.remove(&object.name);
        Ok(object)
    }

    /// Attach an object to a node
    ///
    /// An object has at most one parent. Attaching an object that is attached
    /// anywhere (including to `node`) fails with [`SceneError::AlreadyAttached`];
    /// use [`SceneManager::reattach_object`] to move it.
    pub fn attach_object(&mut self, node: NodeId, id: ObjectId) -> SceneResult<()> {
        self.tree.node(node)?;
        let object = self.objects.get(id).ok_or(SceneError::ObjectNotFound(id))?;
        if let Some(current) = object.parent {
            let holder = self.tree.get(current).map_or_else(String::new, |n| n.name().to_string());
            return Err(SceneError::AlreadyAttached {
                object: object.name.clone(),
                node: holder,
            });
        }

        self.tree.link_object(node, id)?;
        if let Some(object) = self.objects.get_mut(id) {
            object.parent = Some(node);
            log::debug!("Attached object '{}' to node '{}'", object.name, self.tree.node(node)?.name());
        }
        Ok(())
    }

    /// Detach an object from a node
    ///
    /// Returns false, without failing, when the object is not attached to that
    /// node (or either handle is stale).
    pub fn detach_object(&mut self, node: NodeId, id: ObjectId) -> bool {
        let attached_here = self.objects.get(id).is_some_and(|o| o.parent == Some(node));
        if !attached_here {
            return false;
        }
        self.tree.unlink_object(node, id);
        if let Some(object) = self.objects.get_mut(id) {
            object.parent = None;
        }
        if let Some(index) = self.spatial_index.as_mut() {
            index.remove(id);
        }
        true
    }

    /// Detach an object from whatever node holds it; false if unattached
    pub fn detach_object_from_parent(&mut self, id: ObjectId) -> bool {
        match self.objects.get(id).and_then(|o| o.parent) {
            Some(node) => self.detach_object(node, id),
            None => false,
        }
    }

    /// Move an object to `node`, detaching it from its current parent first
    pub fn reattach_object(&mut self, id: ObjectId, node: NodeId) -> SceneResult<()> {
        self.tree.node(node)?;
        if !self.objects.contains_key(id) {
            return Err(SceneError::ObjectNotFound(id));
        }
        self.detach_object_from_parent(id);
        self.attach_object(node, id)
    }

    /// World transform of an object (identity when unattached)
    pub fn object_world_transform(&mut self, id: ObjectId) -> SceneResult<Mat4> {
        let parent = self.objects.get(id).ok_or(SceneError::ObjectNotFound(id))?.parent;
        match parent {
            Some(node) => self.tree.world_transform(node),
            None => Ok(Mat4::identity()),
        }
    }

    /// World bounding volume of an object, resolving its node's transform on demand
    pub fn object_world_bounds(&mut self, id: ObjectId) -> SceneResult<BoundingVolume> {
        let world = self.object_world_transform(id)?;
        let object = self.objects.get(id).ok_or(SceneError::ObjectNotFound(id))?;
        Ok(object.local_bounds.transformed(&world))
    }

    // ---- cameras ----

    /// Create an active, unattached camera
    pub fn create_camera(&mut self, name: &str) -> SceneResult<CameraId> {
        if self.camera_names.contains_key(name) {
            return Err(SceneError::DuplicateName {
                kind: "camera",
                name: name.to_string(),
            });
        }
        let id = self.cameras.insert(Camera::new(name));
        self.camera_names.insert(name.to_string(), id);
        log::debug!("Created camera '{}'", name);
        Ok(id)
    }

    /// Borrow a camera without synchronising it with its node
    pub fn camera(&self, id: CameraId) -> Option<&Camera> {
        self.cameras.get(id)
    }

    /// Mutably borrow a camera (projection, local placement, active flag)
    ///
    /// The parent frame is synced first so `look_at` and `set_direction`
    /// aim from where the camera currently is.
    pub fn camera_mut(&mut self, id: CameraId) -> Option<&mut Camera> {
        self.synced_camera(id).ok()
    }

    /// Look a camera up by name
    pub fn find_camera(&self, name: &str) -> Option<CameraId> {
        self.camera_names.get(name).copied()
    }

    /// Remove a camera
    pub fn destroy_camera(&mut self, id: CameraId) -> SceneResult<Camera> {
        let camera = self.cameras.remove(id).ok_or(SceneError::CameraNotFound(id))?;
        self.camera_names.remove(&camera.name);
        Ok(camera)
    }

    /// Attach a camera to a node; an attached camera is moved
    pub fn attach_camera(&mut self, id: CameraId, node: NodeId) -> SceneResult<()> {
        self.tree.node(node)?;
        let camera = self.cameras.get_mut(id).ok_or(SceneError::CameraNotFound(id))?;
        camera.parent = Some(node);
        Ok(())
    }

    /// Detach a camera from its node; false if it was unattached
    pub fn detach_camera(&mut self, id: CameraId) -> bool {
        match self.cameras.get_mut(id) {
            Some(camera) if camera.parent.is_some() => {
                camera.parent = None;
                camera.notify_parent_frame(None);
                true
            }
            _ => false,
        }
    }

    /// Camera with its parent frame brought up to date
    ///
    /// Resolves the parent node's transform and hands the camera the current
    /// epoch, so its view and frustum are never stale when read.
    pub fn synced_camera(&mut self, id: CameraId) -> SceneResult<&mut Camera> {
        let parent = self.cameras.get(id).ok_or(SceneError::CameraNotFound(id))?.parent;
        let frame = match parent {
            Some(node) => Some(ParentFrame {
                position: self.tree.derived_position(node)?,
                orientation: self.tree.derived_orientation(node)?,
                epoch: self.tree.world_epoch(node)?,
            }),
            None => None,
        };
        let camera = self.cameras.get_mut(id).ok_or(SceneError::CameraNotFound(id))?;
        camera.notify_parent_frame(frame);
        Ok(camera)
    }

    /// Up-to-date frustum of a camera
    pub fn camera_frustum(&mut self, id: CameraId) -> SceneResult<Frustum> {
        Ok(self.synced_camera(id)?.frustum().clone())
    }

    fn active_cameras(&self) -> Vec<CameraId> {
        self.cameras
            .iter()
            .filter(|(_, camera)| camera.is_active())
            .map(|(id, _)| id)
            .collect()
    }

    // ---- lights ----

    /// Create an unattached light
    pub fn create_light(&mut self, name: &str, kind: LightKind) -> SceneResult<LightId> {
        if self.light_names.contains_key(name) {
            return Err(SceneError::DuplicateName {
                kind: "light",
                name: name.to_string(),
            });
        }
        let id = self.lights.insert(Light::new(name, kind));
        self.light_names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Borrow a light
    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(id)
    }

    /// Mutably borrow a light
    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(id)
    }

    /// Look a light up by name
    pub fn find_light(&self, name: &str) -> Option<LightId> {
        self.light_names.get(name).copied()
    }

    /// Remove a light
    pub fn destroy_light(&mut self, id: LightId) -> SceneResult<Light> {
        let light = self.lights.remove(id).ok_or(SceneError::LightNotFound(id))?;
        self.light_names.remove(&light.name);
        Ok(light)
    }

    /// Attach a light to a node; an attached light is moved
    pub fn attach_light(&mut self, id: LightId, node: NodeId) -> SceneResult<()> {
        self.tree.node(node)?;
        let light = self.lights.get_mut(id).ok_or(SceneError::LightNotFound(id))?;
        light.parent = Some(node);
        Ok(())
    }

    /// Detach a light from its node; false if it was unattached
    pub fn detach_light(&mut self, id: LightId) -> bool {
        match self.lights.get_mut(id) {
            Some(light) => light.parent.take().is_some(),
            None => false,
        }
    }

    /// World-space parameters of every visible light; transforms must be current
    fn world_lights(&self) -> Vec<RenderLight> {
        self.lights
            .values()
            .filter(|light| light.visible)
            .map(|light| {
                let parent_world = light
                    .parent
                    .and_then(|node| self.tree.get(node))
                    .map(|node| node.cached_world_transform());
                light.to_render_light(parent_world)
            })
            .collect()
    }

    // ---- frame processing ----

    /// Resolve dirty transforms, rebuild node bounds and sync the spatial index
    ///
    /// Returns the number of nodes whose world transform was recomputed.
    pub fn update_scene_graph(&mut self) -> usize {
        self.phase = FramePhase::UpdatingTransforms;
        let updated = self.tree.update();
        self.update_bounds();
        self.phase = FramePhase::Idle;
        updated
    }

    fn world_box_of(&self, object: &RenderableObject) -> Option<Aabb> {
        let node = self.tree.get(object.parent?)?;
        Some(object.local_bounds.transformed(node.cached_world_transform()).to_aabb())
    }

    /// Post-order pass: node bounds are the union of their objects and children
    fn update_bounds(&mut self) {
        let mut order = std::mem::take(&mut self.bounds_order);
        let mut subtree_bounds = std::mem::take(&mut self.subtree_bounds);
        order.clear();
        subtree_bounds.clear();
        self.tree.breadth_first_into(self.tree.root(), &mut order);

        // Children sit after their parent, so reverse order sees them first
        for &node_id in order.iter().rev() {
            let Some(node) = self.tree.get(node_id) else {
                continue;
            };

            let mut bounds: Option<Aabb> = None;
            for &object_id in node.attached_objects() {
                let Some(object) = self.objects.get(object_id) else {
                    continue;
                };
                let Some(world_box) = self.world_box_of(object) else {
                    continue;
                };
                bounds = Some(bounds.map_or(world_box, |b| b.merged(&world_box)));

                if let Some(index) = self.spatial_index.as_mut() {
                    if index.bounds(object_id) != Some(world_box) {
                        index.update(object_id, world_box);
                    }
                }
            }
            for child in node.children() {
                if let Some(child_box) = subtree_bounds.get(child) {
                    bounds = Some(bounds.map_or(*child_box, |b| b.merged(child_box)));
                }
            }

            if let Some(b) = bounds {
                subtree_bounds.insert(node_id, b);
            }
            self.tree.set_world_bounds(node_id, bounds);
        }

        self.bounds_order = order;
        self.subtree_bounds = subtree_bounds;
    }

    /// Objects that pass culling for `frustum`, in deterministic order
    fn find_visible_objects(&self, frustum: &Frustum, stats: &mut FrameStats) -> Vec<ObjectId> {
        let culling = self.config.enable_culling;
        let mut candidates = Vec::new();

        match (&self.spatial_index, culling) {
            (Some(index), true) => candidates = index.query_frustum(frustum),
            _ => {
                self.tree.walk(self.tree.root(), &mut |_id, node: &SpatialNode, _depth| {
                    // Subtrees without any bounds hold no objects
                    let Some(bounds) = node.world_bounds() else {
                        return false;
                    };
                    if culling && !frustum.intersects_aabb(bounds) {
                        return false;
                    }
                    candidates.extend_from_slice(node.attached_objects());
                    true
                });
            }
        }
        candidates.sort();

        let mut visible = Vec::with_capacity(candidates.len());
        for id in candidates {
            let Some(object) = self.objects.get(id) else {
                continue;
            };
            let Some(node) = object.parent.and_then(|p| self.tree.get(p)) else {
                continue;
            };
            if !object.visible {
                continue;
            }
            if culling {
                stats.objects_tested += 1;
                let world = object.local_bounds.transformed(node.cached_world_transform());
                if !frustum.intersects(&world) {
                    stats.objects_culled += 1;
                    continue;
                }
            }
            visible.push(id);
        }
        visible
    }

    /// Clear the queue and fill it with what `camera` sees
    fn populate_queue(&mut self, camera: CameraId, stats: &mut FrameStats) -> SceneResult<()> {
        self.render_queue.clear();

        let (frustum, eye) = {
            let cam = self.synced_camera(camera)?;
            (cam.frustum().clone(), cam.derived_position())
        };

        self.phase = FramePhase::Culling;
        let mut visible = self.find_visible_objects(&frustum, stats);
        let limit = self.config.max_objects_per_frame;
        if limit > 0 && visible.len() > limit {
            log::debug!("Queue limited to {} of {} visible objects", limit, visible.len());
            visible.truncate(limit);
        }

        self.phase = FramePhase::QueueBuilding;
        let lights = self.world_lights();
        for id in visible {
            let Some(object) = self.objects.get(id) else {
                continue;
            };
            let Some(node) = object.parent.and_then(|p| self.tree.get(p)) else {
                continue;
            };
            let world_matrix = *node.cached_world_transform();
            let world_center = object.local_bounds.transformed(&world_matrix).center();
            let depth = (world_center - eye).magnitude();
            let group = object.queue_group.unwrap_or(self.config.default_queue_group);
            let priority = object.priority.unwrap_or(self.config.default_priority);

            for (sub_index, operation, key) in object.sub_renderables() {
                let material = match self.materials.resolve_material(key) {
                    Ok(material) => material,
                    Err(err) => {
                        log::warn!("Skipping '{}' part {}: {}", object.name, sub_index, err);
                        stats.materials_skipped += 1;
                        continue;
                    }
                };
                let Some(technique) = material.best_technique() else {
                    log::warn!("Skipping '{}' part {}: material '{}' has no usable technique", object.name, sub_index, key);
                    stats.materials_skipped += 1;
                    continue;
                };
                let max_lights = technique
                    .passes
                    .iter()
                    .filter(|pass| pass.lighting)
                    .map(|pass| pass.max_lights)
                    .max()
                    .unwrap_or(0);
                let entry_lights = if max_lights > 0 {
                    lights_affecting(&lights, world_center, max_lights)
                } else {
                    Vec::new()
                };

                self.render_queue.add_renderable(
                    QueuedRenderable {
                        object: id,
                        sub_index,
                        operation,
                        material,
                        world_matrix,
                        world_center,
                        depth,
                        lights: entry_lights,
                    },
                    group,
                    priority,
                );
                stats.renderables_queued += 1;
            }
        }

        self.render_queue.sort();
        Ok(())
    }

    /// Build and sort the render queue for one camera without rendering it
    ///
    /// The queue stays populated until the next frame or build call.
    pub fn build_render_queue(&mut self, camera: CameraId) -> SceneResult<&RenderQueue> {
        if !self.cameras.contains_key(camera) {
            return Err(SceneError::CameraNotFound(camera));
        }
        let mut stats = FrameStats::default();
        self.update_scene_graph();
        let result = self.populate_queue(camera, &mut stats);
        self.phase = FramePhase::Idle;
        result?;
        Ok(&self.render_queue)
    }

    /// Render one frame from every active camera
    ///
    /// Fails with [`SceneError::NoCamera`] (issuing no backend calls at all)
    /// when no camera is active. Objects whose material does not resolve are
    /// skipped with a warning. Backend errors abort the frame.
    pub fn render_one_frame(&mut self, renderer: &mut dyn RenderSystem) -> SceneResult<FrameStats> {
        let cameras = self.active_cameras();
        if cameras.is_empty() {
            log::warn!("render_one_frame called without an active camera");
            return Err(SceneError::NoCamera);
        }

        let stopwatch = Stopwatch::start_new();
        self.frame_count += 1;
        let mut stats = FrameStats {
            frame: self.frame_count,
            ..FrameStats::default()
        };

        stats.nodes_updated = self.update_scene_graph();
        let result = self.render_cameras(renderer, &cameras, &mut stats);
        self.render_queue.clear();
        self.phase = FramePhase::Idle;
        if let Err(err) = result {
            log::error!("Frame {} aborted on backend '{}': {}", stats.frame, renderer.name(), err);
            return Err(err);
        }

        stats.frame_time = stopwatch.elapsed();
        for listener in &mut self.listeners {
            listener.frame_ended(&stats);
        }
        log::debug!(
            "Frame {}: {} camera(s), {} queued, {} culled, {} draws, {} state changes",
            stats.frame,
            stats.cameras_rendered,
            stats.renderables_queued,
            stats.objects_culled,
            stats.draw_calls,
            stats.state_changes
        );
        self.last_stats = stats.clone();
        Ok(stats)
    }

    fn render_cameras(
        &mut self,
        renderer: &mut dyn RenderSystem,
        cameras: &[CameraId],
        stats: &mut FrameStats,
    ) -> SceneResult<()> {
        renderer.begin_frame()?;
        renderer.set_ambient_light(&self.config.ambient_light);
        for &camera in cameras {
            self.populate_queue(camera, stats)?;

            let (view, projection) = {
                let cam = self.synced_camera(camera)?;
                (cam.view_matrix(), cam.projection_matrix())
            };

            self.phase = FramePhase::Rendering;
            renderer.set_camera(&view, &projection)?;
            submit_queue(
                &self.render_queue,
                &mut self.listeners,
                renderer,
                self.config.max_queue_repeats,
                stats,
            )?;
            stats.cameras_rendered += 1;
        }
        renderer.end_frame()?;
        Ok(())
    }
}

/// Identity of the render state last sent to the backend
type PassState = (MaterialKey, usize);

fn apply_pass(
    renderer: &mut dyn RenderSystem,
    current: &mut Option<PassState>,
    material: &Material,
    pass_index: usize,
    stats: &mut FrameStats,
) -> SceneResult<()> {
    let wanted = (material.key.clone(), pass_index);
    if current.as_ref() != Some(&wanted) {
        if let Some(pass) = material.best_technique().and_then(|t| t.passes.get(pass_index)) {
            renderer.set_render_state(pass)?;
            stats.state_changes += 1;
        }
        *current = Some(wanted);
    }
    Ok(())
}

fn draw_entry(
    renderer: &mut dyn RenderSystem,
    entry: &QueuedRenderable,
    pass: &Pass,
    stats: &mut FrameStats,
) -> SceneResult<()> {
    renderer.set_world_matrix(&entry.world_matrix);
    if pass.lighting {
        let count = entry.lights.len().min(pass.max_lights);
        renderer.use_lights(&entry.lights[..count]);
    }
    renderer.draw(&entry.operation)?;
    stats.draw_calls += 1;
    stats.primitives += u64::from(entry.operation.primitive_count());
    Ok(())
}

/// Walk the sorted queue and submit it
///
/// Solids are drawn batch by batch, pass-major inside a batch, so a batch of
/// N objects with P passes costs P state changes. Transparents are drawn one
/// entry at a time with all of its passes, preserving back-to-front order.
fn submit_queue(
    queue: &RenderQueue,
    listeners: &mut [Box<dyn SceneListener>],
    renderer: &mut dyn RenderSystem,
    max_repeats: u32,
    stats: &mut FrameStats,
) -> SceneResult<()> {
    let mut current: Option<PassState> = None;

    for (group_id, group) in queue.groups() {
        let mut repeats = 0;
        loop {
            let mut skip = false;
            for listener in listeners.iter_mut() {
                skip |= listener.queue_started(group_id);
            }
            if skip {
                log::trace!("Queue group {:?} skipped by listener", group_id);
                break;
            }

            for (_, priority_group) in group.priority_groups() {
                for batch in priority_group.solid_batches() {
                    let Some(technique) = batch.material.best_technique() else {
                        continue;
                    };
                    stats.batches += 1;
                    for (pass_index, pass) in technique.passes.iter().enumerate() {
                        apply_pass(renderer, &mut current, batch.material, pass_index, stats)?;
                        for entry in batch.entries {
                            draw_entry(renderer, entry, pass, stats)?;
                        }
                    }
                }

                for entry in priority_group.transparents() {
                    let Some(technique) = entry.material.best_technique() else {
                        continue;
                    };
                    for (pass_index, pass) in technique.passes.iter().enumerate() {
                        apply_pass(renderer, &mut current, &entry.material, pass_index, stats)?;
                        draw_entry(renderer, entry, pass, stats)?;
                    }
                }
            }

            let mut repeat = false;
            for listener in listeners.iter_mut() {
                repeat |= listener.queue_ended(group_id);
            }
            if !repeat || repeats >= max_repeats {
                break;
            }
            repeats += 1;
        }
    }
    Ok(())
}
