//! Frame-level scenarios exercising the scene manager end to end

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_relative_eq;

use crate::config::{Config, ConfigError};
use crate::foundation::collections::{CameraId, NodeId, ObjectId};
use crate::foundation::math::{Mat4, Quat, Vec3};
use crate::render::{
    Material, MaterialLibrary, Pass, PrimitiveType, RecordingRenderSystem, RenderCommand,
    RenderOperation, SceneBlend, Technique, VertexDataHandle,
};
use crate::scene::{
    BoundingVolume, CullingMode, FramePhase, FrameStats, LightKind, RenameStatus,
    RenderQueueGroupId, RenderableObject, SceneConfig, SceneError, SceneListener, SceneManager,
    Sphere,
};
use crate::spatial::OctreeConfig;

fn materials() -> MaterialLibrary {
    let mut library = MaterialLibrary::with_defaults();
    library.register(Material::single_pass("Rock", Pass::new("rock")));
    library.register(Material::single_pass(
        "Glass",
        Pass::new("glass")
            .with_blend(SceneBlend::AlphaBlend)
            .with_depth_write(false),
    ));
    library.register(Material::new(
        "Layered",
        vec![Technique::new(
            "two_pass",
            vec![Pass::new("layered_base"), Pass::new("layered_detail").with_lighting(false)],
        )],
    ));
    library.register(Material::single_pass("Unlit", Pass::new("unlit").with_lighting(false)));
    library
}

fn new_scene(config: SceneConfig) -> SceneManager {
    SceneManager::new(config, Box::new(materials()))
}

fn unit_sphere(name: &str, material: &str) -> RenderableObject {
    let op = RenderOperation::new(VertexDataHandle(7), 3, PrimitiveType::TriangleList);
    RenderableObject::manual(name, op, BoundingVolume::Sphere(Sphere::new(Vec3::zeros(), 1.0)), material)
}

/// Node under the root at `position` holding a fresh unit-sphere object
fn place(scene: &mut SceneManager, name: &str, material: &str, position: Vec3) -> (NodeId, ObjectId) {
    let root = scene.root_node();
    let node = scene.create_child_node(root, Some(name)).unwrap();
    scene.tree_mut().set_position(node, position).unwrap();
    let object = scene.add_object(unit_sphere(name, material)).unwrap();
    scene.attach_object(node, object).unwrap();
    (node, object)
}

/// Camera at the origin looking down -Z
fn camera(scene: &mut SceneManager) -> CameraId {
    scene.create_camera("main").unwrap()
}

fn queued_objects(scene: &mut SceneManager, camera: CameraId) -> Vec<ObjectId> {
    scene
        .build_render_queue(camera)
        .unwrap()
        .iter()
        .map(|entry| entry.object)
        .collect()
}

#[test]
fn test_attach_then_detach_twice() {
    let mut scene = new_scene(SceneConfig::default());
    let (node, object) = place(&mut scene, "crate", "Rock", Vec3::zeros());

    assert!(scene.tree().node(node).unwrap().has_object(object));
    assert!(scene.object(object).unwrap().is_attached());

    assert!(scene.detach_object(node, object));
    assert!(!scene.tree().node(node).unwrap().has_object(object));
    assert!(!scene.object(object).unwrap().is_attached());

    assert!(!scene.detach_object(node, object));
    assert!(!scene.detach_object_from_parent(object));
}

#[test]
fn test_attach_refuses_second_owner() {
    let mut scene = new_scene(SceneConfig::default());
    let (first, object) = place(&mut scene, "a", "Rock", Vec3::zeros());
    let second = scene.create_child_node(scene.root_node(), Some("b")).unwrap();

    let err = scene.attach_object(second, object).unwrap_err();
    assert!(matches!(err, SceneError::AlreadyAttached { ref node, .. } if node == "a"));
    assert!(matches!(scene.attach_object(first, object), Err(SceneError::AlreadyAttached { .. })));

    assert_eq!(scene.tree().node(first).unwrap().attached_objects(), &[object]);
    assert!(scene.tree().node(second).unwrap().attached_objects().is_empty());
}

#[test]
fn test_world_transform_is_product_of_ancestors() {
    let mut scene = new_scene(SceneConfig::default());
    let root = scene.root_node();
    let a = scene.create_child_node(root, None).unwrap();
    let b = scene.create_child_node(a, None).unwrap();
    let c = scene.create_child_node(b, None).unwrap();

    let tree = scene.tree_mut();
    tree.set_position(root, Vec3::new(1.0, 0.0, 0.0)).unwrap();
    tree.set_orientation(a, Quat::from_axis_angle(&Vec3::y_axis(), 0.7)).unwrap();
    tree.set_scale(a, Vec3::new(2.0, 2.0, 2.0)).unwrap();
    tree.set_position(b, Vec3::new(0.0, 3.0, -1.0)).unwrap();
    tree.set_orientation(c, Quat::from_axis_angle(&Vec3::x_axis(), -0.3)).unwrap();
    tree.set_position(c, Vec3::new(4.0, 0.0, 0.0)).unwrap();

    // interleave a read with further mutation
    let _ = tree.world_transform(c).unwrap();
    tree.translate(b, Vec3::new(0.5, 0.0, 0.0), crate::scene::TransformSpace::Local).unwrap();

    let expected: Mat4 = [root, a, b, c]
        .iter()
        .map(|&id| tree.node(id).unwrap().local_matrix())
        .fold(Mat4::identity(), |acc, local| acc * local);
    assert_relative_eq!(scene.node_world_transform(c).unwrap(), expected, epsilon = 1e-4);
}

#[test]
fn test_moving_root_moves_object_bounds() {
    let mut scene = new_scene(SceneConfig::default());
    let root = scene.root_node();
    let (_, object) = place(&mut scene, "C", "Rock", Vec3::new(10.0, 0.0, 0.0));

    scene.tree_mut().set_position(root, Vec3::new(5.0, 0.0, 0.0)).unwrap();
    let bounds = scene.object_world_bounds(object).unwrap();

    assert_relative_eq!(bounds.center(), Vec3::new(15.0, 0.0, 0.0), epsilon = 1e-5);
    assert_relative_eq!(bounds.bounding_radius(), 1.0, epsilon = 1e-5);
}

#[test]
fn test_rename_node_and_attached_object() {
    let mut scene = new_scene(SceneConfig::default());
    let (node, object) = place(&mut scene, "A", "Rock", Vec3::zeros());

    assert_eq!(scene.rename_node(node, "B").unwrap(), RenameStatus::Renamed);
    assert_eq!(scene.find_node("A"), None);
    assert_eq!(scene.find_node("B"), Some(node));

    assert_eq!(scene.rename_object(object, "renamed").unwrap(), RenameStatus::Renamed);
    assert_eq!(scene.find_object("A"), None);
    assert_eq!(scene.find_object("renamed"), Some(object));
    assert_eq!(scene.object(object).unwrap().parent_node(), Some(node));
    assert!(scene.detach_object(node, object));

    let (_, other) = place(&mut scene, "other", "Rock", Vec3::zeros());
    assert_eq!(scene.rename_object(other, "renamed").unwrap(), RenameStatus::NameInUse);
    assert_eq!(scene.rename_object(other, "other").unwrap(), RenameStatus::Unchanged);
    assert_eq!(scene.find_object("other"), Some(other));
}

#[test]
fn test_duplicate_object_name_rejected() {
    let mut scene = new_scene(SceneConfig::default());
    scene.add_object(unit_sphere("dup", "Rock")).unwrap();
    let err = scene.add_object(unit_sphere("dup", "Rock")).unwrap_err();
    assert!(matches!(err, SceneError::DuplicateName { kind: "object", .. }));
    assert_eq!(scene.object_count(), 1);
}

#[test]
fn test_reattach_moves_bounds_to_new_owner() {
    let mut scene = new_scene(SceneConfig::default());
    let (first, object) = place(&mut scene, "first", "Rock", Vec3::new(1.0, 2.0, 3.0));
    let second = scene.create_child_node(scene.root_node(), Some("second")).unwrap();
    scene.tree_mut().set_position(second, Vec3::new(-4.0, 0.0, 0.0)).unwrap();

    assert!(scene.detach_object(first, object));
    scene.attach_object(second, object).unwrap();

    let owners: Vec<NodeId> = scene
        .tree()
        .iter()
        .filter(|(_, node)| node.has_object(object))
        .map(|(id, _)| id)
        .collect();
    assert_eq!(owners, vec![second]);
    assert_relative_eq!(
        scene.object_world_bounds(object).unwrap().center(),
        Vec3::new(-4.0, 0.0, 0.0),
        epsilon = 1e-5
    );

    scene.reattach_object(object, first).unwrap();
    assert_eq!(scene.object(object).unwrap().parent_node(), Some(first));
    assert!(!scene.tree().node(second).unwrap().has_object(object));
}

#[test]
fn test_cyclic_reparent_leaves_tree_unchanged() {
    let mut scene = new_scene(SceneConfig::default());
    let root = scene.root_node();
    let a = scene.create_child_node(root, Some("a")).unwrap();
    let b = scene.create_child_node(a, Some("b")).unwrap();
    let c = scene.create_child_node(b, Some("c")).unwrap();
    let before = scene.tree().descendants(root);

    let err = scene.reparent_node(a, c).unwrap_err();
    assert!(matches!(err, SceneError::CyclicGraph { .. }));
    assert!(matches!(scene.reparent_node(a, a), Err(SceneError::CyclicGraph { .. })));

    assert_eq!(scene.tree().descendants(root), before);
    assert_eq!(scene.tree().node(a).unwrap().parent(), Some(root));
    assert_eq!(scene.tree().node(c).unwrap().parent(), Some(b));
}

#[test]
fn test_no_camera_renders_nothing() {
    let mut scene = new_scene(SceneConfig::default());
    place(&mut scene, "crate", "Rock", Vec3::new(0.0, 0.0, -5.0));
    let mut backend = RecordingRenderSystem::new();

    assert!(matches!(scene.render_one_frame(&mut backend), Err(SceneError::NoCamera)));
    assert!(backend.commands().is_empty());

    let cam = camera(&mut scene);
    scene.camera_mut(cam).unwrap().set_active(false);
    assert!(matches!(scene.render_one_frame(&mut backend), Err(SceneError::NoCamera)));
    assert_eq!(backend.draw_count(), 0);
    assert_eq!(scene.frame_count(), 0);
}

#[test]
fn test_opaque_front_to_back_transparent_back_to_front() {
    let mut scene = new_scene(SceneConfig::default());
    let cam = camera(&mut scene);
    let (_, far_rock) = place(&mut scene, "far_rock", "Rock", Vec3::new(0.0, 0.0, -10.0));
    let (_, near_rock) = place(&mut scene, "near_rock", "Rock", Vec3::new(0.0, 0.0, -5.0));
    let (_, near_glass) = place(&mut scene, "near_glass", "Glass", Vec3::new(1.0, 0.0, -5.0));
    let (_, far_glass) = place(&mut scene, "far_glass", "Glass", Vec3::new(1.0, 0.0, -10.0));

    let queue = scene.build_render_queue(cam).unwrap();
    let group = queue.group(RenderQueueGroupId::MAIN).unwrap();
    let (_, priority) = group.priority_groups().next().unwrap();

    let solids: Vec<ObjectId> = priority.solids().iter().map(|e| e.object).collect();
    let transparents: Vec<ObjectId> = priority.transparents().iter().map(|e| e.object).collect();
    assert_eq!(solids, vec![near_rock, far_rock]);
    assert_eq!(transparents, vec![far_glass, near_glass]);
    assert_relative_eq!(priority.solids()[0].depth, 5.0, epsilon = 1e-4);

    let mut backend = RecordingRenderSystem::new();
    scene.render_one_frame(&mut backend).unwrap();
    let draw_z: Vec<f32> = backend.draw_world_matrices().iter().map(|m| m[(2, 3)]).collect();
    assert_eq!(draw_z, vec![-5.0, -10.0, -10.0, -5.0]);
}

#[test]
fn test_missing_material_skips_only_that_object() {
    let mut scene = new_scene(SceneConfig::default());
    camera(&mut scene);
    place(&mut scene, "good", "Rock", Vec3::new(0.0, 0.0, -5.0));
    place(&mut scene, "bad", "DoesNotExist", Vec3::new(0.0, 0.0, -6.0));

    let mut backend = RecordingRenderSystem::new();
    let stats = scene.render_one_frame(&mut backend).unwrap();

    assert_eq!(backend.draw_count(), 1);
    assert_eq!(stats.materials_skipped, 1);
    assert_eq!(stats.renderables_queued, 1);
    assert_eq!(backend.frames_completed(), 1);
}

#[test]
fn test_state_changes_only_on_material_boundaries() {
    let mut scene = new_scene(SceneConfig::default());
    camera(&mut scene);
    for i in 0..6u8 {
        let material = if i % 2 == 0 { "Rock" } else { MaterialLibrary::BASE_WHITE };
        place(&mut scene, &format!("obj{i}"), material, Vec3::new(f32::from(i), 0.0, -20.0));
    }

    let mut backend = RecordingRenderSystem::new();
    let stats = scene.render_one_frame(&mut backend).unwrap();

    assert_eq!(backend.draw_count(), 6);
    assert_eq!(backend.state_change_count(), 2);
    assert_eq!(stats.batches, 2);
    assert_eq!(stats.state_changes, 2);
    assert_eq!(stats.primitives, 6);
}

#[test]
fn test_multi_pass_batch_is_pass_major() {
    let mut scene = new_scene(SceneConfig::default());
    camera(&mut scene);
    for i in 0..3u8 {
        place(&mut scene, &format!("layer{i}"), "Layered", Vec3::new(f32::from(i), 0.0, -8.0));
    }

    let mut backend = RecordingRenderSystem::new();
    scene.render_one_frame(&mut backend).unwrap();

    assert_eq!(backend.draw_count(), 6);
    assert_eq!(backend.state_sequence(), vec!["layered_base", "layered_detail"]);
}

#[test]
fn test_invisible_object_excluded_without_detach() {
    let mut scene = new_scene(SceneConfig::default());
    let cam = camera(&mut scene);
    let (_, shown) = place(&mut scene, "shown", "Rock", Vec3::new(0.0, 0.0, -5.0));
    let (_, hidden) = place(&mut scene, "hidden", "Rock", Vec3::new(0.0, 1.0, -5.0));

    scene.object_mut(hidden).unwrap().visible = false;
    assert_eq!(queued_objects(&mut scene, cam), vec![shown]);

    scene.object_mut(hidden).unwrap().visible = true;
    assert_eq!(queued_objects(&mut scene, cam).len(), 2);
}

#[test]
fn test_frustum_culling_rejects_objects_behind_camera() {
    let mut scene = new_scene(SceneConfig::default());
    let cam = camera(&mut scene);
    let (_, ahead) = place(&mut scene, "ahead", "Rock", Vec3::new(0.0, 0.0, -5.0));
    place(&mut scene, "behind", "Rock", Vec3::new(0.0, 0.0, 5.0));
    place(&mut scene, "far_left", "Rock", Vec3::new(-500.0, 0.0, -5.0));

    let mut backend = RecordingRenderSystem::new();
    let stats = scene.render_one_frame(&mut backend).unwrap();
    assert_eq!(backend.draw_count(), 1);
    assert_eq!(queued_objects(&mut scene, cam), vec![ahead]);
    assert!(stats.objects_tested <= 3);

    scene.set_culling_enabled(false);
    assert_eq!(queued_objects(&mut scene, cam).len(), 3);
}

#[test]
fn test_camera_follows_parent_node() {
    let mut scene = new_scene(SceneConfig::default());
    let cam = camera(&mut scene);
    let rig = scene.create_child_node(scene.root_node(), Some("rig")).unwrap();
    scene.attach_camera(cam, rig).unwrap();
    let (_, behind) = place(&mut scene, "behind", "Rock", Vec3::new(0.0, 0.0, 10.0));

    assert!(queued_objects(&mut scene, cam).is_empty());

    scene.tree_mut().yaw(rig, std::f32::consts::PI).unwrap();
    assert_eq!(queued_objects(&mut scene, cam), vec![behind]);
    assert_relative_eq!(
        scene.synced_camera(cam).unwrap().direction(),
        Vec3::new(0.0, 0.0, 1.0),
        epsilon = 1e-5
    );

    assert!(scene.detach_camera(cam));
    assert!(!scene.detach_camera(cam));
    assert!(queued_objects(&mut scene, cam).is_empty());
}

#[test]
fn test_camera_aims_from_moved_parent() {
    let mut scene = new_scene(SceneConfig::default());
    let cam = camera(&mut scene);
    let rig = scene.create_child_node(scene.root_node(), Some("rig")).unwrap();
    scene.attach_camera(cam, rig).unwrap();
    scene.synced_camera(cam).unwrap();

    scene.tree_mut().set_position(rig, Vec3::new(100.0, 0.0, 0.0)).unwrap();
    scene.camera_mut(cam).unwrap().look_at(Vec3::new(100.0, 0.0, -10.0));

    let camera = scene.synced_camera(cam).unwrap();
    assert_relative_eq!(camera.derived_position(), Vec3::new(100.0, 0.0, 0.0), epsilon = 1e-5);
    assert_relative_eq!(camera.direction(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);

    scene.tree_mut().yaw(rig, std::f32::consts::FRAC_PI_2).unwrap();
    scene.camera_mut(cam).unwrap().set_direction(Vec3::new(1.0, 0.0, 0.0));
    assert_relative_eq!(
        scene.synced_camera(cam).unwrap().direction(),
        Vec3::new(1.0, 0.0, 0.0),
        epsilon = 1e-5
    );
}

#[test]
fn test_scene_bounds_shrink_across_updates() {
    let mut scene = new_scene(SceneConfig::default());
    let (near, _) = place(&mut scene, "near", "Rock", Vec3::new(0.0, 0.0, -5.0));
    let (far, _) = place(&mut scene, "far", "Rock", Vec3::new(10.0, 0.0, -5.0));

    scene.update_scene_graph();
    assert_relative_eq!(scene.scene_bounds().unwrap().max.x, 11.0, epsilon = 1e-5);

    scene.destroy_node(far, true).unwrap();
    scene.update_scene_graph();
    assert_relative_eq!(scene.scene_bounds().unwrap().max.x, 1.0, epsilon = 1e-5);

    scene.destroy_node(near, true).unwrap();
    scene.update_scene_graph();
    assert!(scene.scene_bounds().is_none());
}

#[test]
fn test_ambient_light_sent_each_frame() {
    let mut scene = new_scene(SceneConfig::default());
    camera(&mut scene);
    place(&mut scene, "a", "Rock", Vec3::new(0.0, 0.0, -5.0));
    scene.set_ambient_light(Vec3::new(0.1, 0.2, 0.3));

    let mut backend = RecordingRenderSystem::new();
    scene.render_one_frame(&mut backend).unwrap();
    scene.render_one_frame(&mut backend).unwrap();

    let ambient: Vec<Vec3> = backend
        .commands()
        .iter()
        .filter_map(|c| match c {
            RenderCommand::SetAmbientLight(colour) => Some(*colour),
            _ => None,
        })
        .collect();
    assert_eq!(ambient, vec![Vec3::new(0.1, 0.2, 0.3); 2]);
    assert_eq!(backend.commands()[1], RenderCommand::SetAmbientLight(Vec3::new(0.1, 0.2, 0.3)));
}

#[test]
fn test_queue_groups_and_priorities_drawn_in_order() {
    let mut scene = new_scene(SceneConfig::default());
    let cam = camera(&mut scene);
    let root = scene.root_node();
    let node = scene.create_child_node(root, None).unwrap();
    scene.tree_mut().set_position(node, Vec3::new(0.0, 0.0, -5.0)).unwrap();

    let overlay = scene
        .add_object(unit_sphere("overlay", "Rock").with_queue_group(RenderQueueGroupId::OVERLAY))
        .unwrap();
    let late = scene.add_object(unit_sphere("late", "Rock").with_priority(200)).unwrap();
    let main = scene.add_object(unit_sphere("main", "Rock")).unwrap();
    let sky = scene
        .add_object(unit_sphere("sky", "Rock").with_queue_group(RenderQueueGroupId::SKIES_EARLY))
        .unwrap();
    for object in [overlay, late, main, sky] {
        scene.attach_object(node, object).unwrap();
    }

    assert_eq!(queued_objects(&mut scene, cam), vec![sky, main, late, overlay]);
}

#[derive(Default)]
struct Recorded {
    started: Vec<RenderQueueGroupId>,
    ended: Vec<RenderQueueGroupId>,
    frames: Vec<FrameStats>,
}

struct ScriptedListener {
    log: Rc<RefCell<Recorded>>,
    skip: Option<RenderQueueGroupId>,
    repeat: Option<RenderQueueGroupId>,
    repeats_left: u32,
}

impl SceneListener for ScriptedListener {
    fn queue_started(&mut self, group: RenderQueueGroupId) -> bool {
        self.log.borrow_mut().started.push(group);
        self.skip == Some(group)
    }

    fn queue_ended(&mut self, group: RenderQueueGroupId) -> bool {
        self.log.borrow_mut().ended.push(group);
        if self.repeat == Some(group) && self.repeats_left > 0 {
            self.repeats_left -= 1;
            return true;
        }
        false
    }

    fn frame_ended(&mut self, stats: &FrameStats) {
        self.log.borrow_mut().frames.push(stats.clone());
    }
}

#[test]
fn test_listener_skips_and_repeats_groups() {
    let mut scene = new_scene(SceneConfig::default());
    camera(&mut scene);
    place(&mut scene, "world", "Rock", Vec3::new(0.0, 0.0, -5.0));
    let hud = scene
        .add_object(unit_sphere("hud", "Rock").with_queue_group(RenderQueueGroupId::OVERLAY))
        .unwrap();
    let hud_node = scene.find_node("world").unwrap();
    scene.attach_object(hud_node, hud).unwrap();

    let log = Rc::new(RefCell::new(Recorded::default()));
    scene.add_listener(Box::new(ScriptedListener {
        log: Rc::clone(&log),
        skip: Some(RenderQueueGroupId::OVERLAY),
        repeat: Some(RenderQueueGroupId::MAIN),
        repeats_left: 1,
    }));

    let mut backend = RecordingRenderSystem::new();
    let stats = scene.render_one_frame(&mut backend).unwrap();

    assert_eq!(backend.draw_count(), 2);
    let log = log.borrow();
    assert_eq!(
        log.started,
        vec![RenderQueueGroupId::MAIN, RenderQueueGroupId::MAIN, RenderQueueGroupId::OVERLAY]
    );
    assert_eq!(log.ended, vec![RenderQueueGroupId::MAIN, RenderQueueGroupId::MAIN]);
    assert_eq!(log.frames, vec![stats]);
}

#[test]
fn test_queue_repeats_are_capped() {
    let config = SceneConfig {
        max_queue_repeats: 2,
        ..SceneConfig::default()
    };
    let mut scene = new_scene(config);
    camera(&mut scene);
    place(&mut scene, "world", "Rock", Vec3::new(0.0, 0.0, -5.0));
    scene.add_listener(Box::new(ScriptedListener {
        log: Rc::default(),
        skip: None,
        repeat: Some(RenderQueueGroupId::MAIN),
        repeats_left: u32::MAX,
    }));

    let mut backend = RecordingRenderSystem::new();
    scene.render_one_frame(&mut backend).unwrap();
    assert_eq!(backend.draw_count(), 3);
}

#[test]
fn test_lights_only_sent_for_lit_passes() {
    let mut scene = new_scene(SceneConfig::default());
    camera(&mut scene);
    place(&mut scene, "lit", "Rock", Vec3::new(0.0, 0.0, -5.0));

    let lamp_node = scene.create_child_node(scene.root_node(), Some("lamp")).unwrap();
    scene.tree_mut().set_position(lamp_node, Vec3::new(0.0, 2.0, -5.0)).unwrap();
    let lamp = scene.create_light("lamp", LightKind::Point).unwrap();
    scene.light_mut(lamp).unwrap().range = 5.0;
    scene.attach_light(lamp, lamp_node).unwrap();
    let out_of_range = scene.create_light("distant", LightKind::Point).unwrap();
    scene.light_mut(out_of_range).unwrap().position = Vec3::new(0.0, 0.0, -500.0);
    scene.light_mut(out_of_range).unwrap().range = 1.0;

    let mut backend = RecordingRenderSystem::new();
    scene.render_one_frame(&mut backend).unwrap();

    let light_sets: Vec<&Vec<crate::render::RenderLight>> = backend
        .commands()
        .iter()
        .filter_map(|c| match c {
            RenderCommand::UseLights(lights) => Some(lights),
            _ => None,
        })
        .collect();
    assert_eq!(light_sets.len(), 1);
    assert_eq!(light_sets[0].len(), 1);
    assert_relative_eq!(light_sets[0][0].position, Vec3::new(0.0, 2.0, -5.0), epsilon = 1e-5);

    backend.clear();
    let unlit = scene.find_object("lit").unwrap();
    scene.object_mut(unlit).unwrap().set_material("Unlit");
    scene.render_one_frame(&mut backend).unwrap();
    assert!(!backend.commands().iter().any(|c| matches!(c, RenderCommand::UseLights(_))));
}

#[test]
fn test_destroy_node_detaches_but_keeps_objects() {
    let mut scene = new_scene(SceneConfig {
        culling_mode: CullingMode::Octree,
        ..SceneConfig::default()
    });
    let cam = camera(&mut scene);
    let (parent, a) = place(&mut scene, "parent", "Rock", Vec3::new(0.0, 0.0, -5.0));
    let child = scene.create_child_node(parent, Some("child")).unwrap();
    let b = scene.add_object(unit_sphere("b", "Rock")).unwrap();
    scene.attach_object(child, b).unwrap();
    assert_eq!(queued_objects(&mut scene, cam).len(), 2);
    scene.attach_camera(cam, child).unwrap();

    scene.destroy_node(parent, false).unwrap();
    assert_eq!(scene.tree().node(child).unwrap().parent(), Some(scene.root_node()));
    assert!(!scene.object(a).unwrap().is_attached());
    assert!(scene.object(b).unwrap().is_attached());

    scene.destroy_node(child, true).unwrap();
    assert!(scene.find_node("child").is_none());
    assert!(!scene.object(b).unwrap().is_attached());
    assert!(scene.camera(cam).unwrap().parent_node().is_none());
    assert_eq!(scene.object_count(), 2);
    assert_eq!(scene.spatial_index().map(|index| index.len()), Some(0));

    let root = scene.root_node();
    assert!(matches!(scene.destroy_node(root, true), Err(SceneError::InvalidOperation(_))));
}

#[test]
fn test_backend_failure_aborts_frame_and_resets() {
    let mut scene = new_scene(SceneConfig::default());
    camera(&mut scene);
    place(&mut scene, "crate", "Rock", Vec3::new(0.0, 0.0, -5.0));

    let mut backend = RecordingRenderSystem::new().with_failing_draws();
    let err = scene.render_one_frame(&mut backend).unwrap_err();
    assert!(matches!(err, SceneError::Render(_)));
    assert_eq!(scene.phase(), FramePhase::Idle);
    assert_eq!(backend.frames_completed(), 0);

    let mut good = RecordingRenderSystem::new();
    scene.render_one_frame(&mut good).unwrap();
    assert_eq!(good.draw_count(), 1);
}

#[test]
fn test_queue_is_cleared_after_frame_and_reused() {
    let mut scene = new_scene(SceneConfig::default());
    let cam = camera(&mut scene);
    place(&mut scene, "crate", "Rock", Vec3::new(0.0, 0.0, -5.0));

    assert_eq!(scene.build_render_queue(cam).unwrap().len(), 1);
    let mut backend = RecordingRenderSystem::new();
    scene.render_one_frame(&mut backend).unwrap();
    scene.render_one_frame(&mut backend).unwrap();

    assert_eq!(backend.draw_count(), 2);
    assert_eq!(scene.frame_count(), 2);
    assert_eq!(scene.last_frame_stats().frame, 2);
    assert_eq!(scene.phase(), FramePhase::Idle);
}

#[test]
fn test_index_modes_agree_with_hierarchy() {
    let names = |mode: CullingMode| -> Vec<String> {
        let mut scene = new_scene(SceneConfig {
            culling_mode: mode,
            ..SceneConfig::default()
        });
        let cam = camera(&mut scene);
        let mut index = 0;
        for x in -4..=4 {
            for z in -4..=4 {
                let material = if (x + z) % 3 == 0 { "Glass" } else { "Rock" };
                let position = Vec3::new(x as f32 * 15.0, 0.0, z as f32 * 15.0);
                place(&mut scene, &format!("o{index}"), material, position);
                index += 1;
            }
        }
        scene.camera_mut(cam).unwrap().look_at(Vec3::new(20.0, 0.0, -30.0));

        queued_objects(&mut scene, cam)
            .into_iter()
            .map(|id| scene.object(id).unwrap().name().to_string())
            .collect()
    };

    let hierarchy = names(CullingMode::Hierarchy);
    assert!(!hierarchy.is_empty());
    assert!(hierarchy.len() < 81);
    assert_eq!(names(CullingMode::SimpleList), hierarchy);
    assert_eq!(names(CullingMode::Octree), hierarchy);
}

fn scratch_path(file: &str) -> String {
    std::env::temp_dir()
        .join(format!("scene_engine_{}_{file}", std::process::id()))
        .to_string_lossy()
        .into_owned()
}

fn tuned_config() -> SceneConfig {
    SceneConfig {
        root_node_name: "World".to_string(),
        enable_culling: false,
        culling_mode: CullingMode::Octree,
        default_queue_group: RenderQueueGroupId::OVERLAY,
        default_priority: 7,
        max_queue_repeats: 1,
        max_objects_per_frame: 64,
        ambient_light: Vec3::new(0.25, 0.5, 0.75),
        octree: OctreeConfig {
            max_depth: 3,
            ..OctreeConfig::default()
        },
    }
}

#[test]
fn test_config_toml_round_trip() {
    let path = scratch_path("scene.toml");
    let config = tuned_config();
    config.save_to_file(&path).unwrap();
    let loaded = SceneConfig::load_from_file(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded, config);
    assert_eq!(loaded.culling_mode, CullingMode::Octree);
    assert_eq!(loaded.default_queue_group, RenderQueueGroupId::OVERLAY);
}

#[test]
fn test_config_ron_round_trip() {
    let path = scratch_path("scene.ron");
    let config = tuned_config();
    config.save_to_file(&path).unwrap();
    let loaded = SceneConfig::load_from_file(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded, config);
    assert_eq!(loaded.octree, config.octree);
}

#[test]
fn test_config_partial_toml_falls_back_to_defaults() {
    let loaded = SceneConfig::from_str_with_format("culling_mode = \"SimpleList\"\n", "scene.toml").unwrap();
    assert_eq!(loaded.culling_mode, CullingMode::SimpleList);
    assert_eq!(loaded.root_node_name, SceneConfig::default().root_node_name);
    assert_eq!(loaded.default_queue_group, RenderQueueGroupId::MAIN);
}

#[test]
fn test_config_unknown_extension_rejected() {
    let path = scratch_path("scene.yaml");
    assert!(matches!(
        SceneConfig::default().save_to_file(&path),
        Err(ConfigError::UnsupportedFormat(_))
    ));
    assert!(!std::path::Path::new(&path).exists());
    assert!(matches!(
        SceneConfig::from_str_with_format("", "scene.yaml"),
        Err(ConfigError::UnsupportedFormat(_))
    ));
}
