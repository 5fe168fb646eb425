//! Orbiting-asteroids scene demo
//!
//! Builds a small scene (a planet, a ring of asteroids, engine exhaust
//! billboards, lights, a HUD overlay and a camera rig), renders a fixed number
//! of frames into the recording backend and logs per-frame statistics.
//!
//! Usage: `scene_demo [config.toml|config.ron]`

use rand::Rng;
use scene_engine::foundation::logging;
use scene_engine::prelude::*;
use scene_engine::render::{IndexDataHandle, MeshHandle, RenderLightKind};
use scene_engine::scene::{Aabb, SubMesh};
use thiserror::Error;

const FRAMES: u64 = 120;
const FIXED_STEP: f32 = 1.0 / 60.0;
const ASTEROID_COUNT: usize = 48;
const STATS_EVERY: u64 = 30;

#[derive(Error, Debug)]
enum DemoError {
    #[error("scene error: {0}")]
    Scene(#[from] SceneError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Logs a summary line every few frames
struct StatsLogger;

impl SceneListener for StatsLogger {
    fn frame_ended(&mut self, stats: &FrameStats) {
        if stats.frame % STATS_EVERY == 0 {
            log::info!(
                "frame {:>4}: {} queued, {} culled, {} batches, {} state changes, {} draws, {} primitives ({:?})",
                stats.frame,
                stats.renderables_queued,
                stats.objects_culled,
                stats.batches,
                stats.state_changes,
                stats.draw_calls,
                stats.primitives,
                stats.frame_time
            );
        }
    }
}

fn demo_materials() -> MaterialLibrary {
    let mut library = MaterialLibrary::with_defaults();
    library.register(Material::single_pass(
        "Planet",
        Pass::new("planet").with_programs("planet.vert", "planet.frag").with_texture("planet_diffuse"),
    ));
    library.register(Material::new(
        "Asteroid",
        vec![Technique::new(
            "rock_two_pass",
            vec![
                Pass::new("asteroid_base").with_texture("rock_diffuse"),
                Pass::new("asteroid_detail")
                    .with_blend(SceneBlend::Modulate)
                    .with_lighting(false)
                    .with_texture("rock_detail"),
            ],
        )],
    ));
    library.register(Material::single_pass(
        "Exhaust",
        Pass::new("exhaust")
            .with_blend(SceneBlend::Add)
            .with_depth_write(false)
            .with_lighting(false),
    ));
    library.register(Material::single_pass(
        "Starfield",
        Pass::new("starfield").with_depth_write(false).with_lighting(false).with_texture("stars_cube"),
    ));
    library.register(Material::single_pass(
        "Hud",
        Pass::new("hud").with_blend(SceneBlend::AlphaBlend).with_depth_write(false).with_lighting(false),
    ));
    library
}

struct DemoApp {
    scene: SceneManager,
    backend: RecordingRenderSystem,
    timer: Timer,
    ring: NodeId,
    camera: CameraId,
    spinning: Vec<(NodeId, f32)>,
}

impl DemoApp {
    fn new(config: SceneConfig) -> Result<Self, DemoError> {
        log::info!("Creating scene demo (culling: {:?})", config.culling_mode);
        let mut scene = SceneManager::new(config, Box::new(demo_materials()));
        scene.add_listener(Box::new(StatsLogger));
        let root = scene.root_node();

        // Planet: two sub-meshes, one with the default material and one override
        let planet_node = scene.create_child_node(root, Some("planet"))?;
        let surface = RenderOperation::new(VertexDataHandle(1), 2400, PrimitiveType::TriangleList);
        let clouds = RenderOperation::new(VertexDataHandle(2), 2400, PrimitiveType::TriangleList);
        let planet = scene.add_object(RenderableObject::mesh(
            "planet",
            MeshHandle(1),
            vec![SubMesh::new(surface), SubMesh::with_material(clouds, "Exhaust")],
            BoundingVolume::Sphere(Sphere::new(Vec3::zeros(), 8.0)),
            "Planet",
        ))?;
        scene.attach_object(planet_node, planet)?;

        // Asteroid ring, rotated as a whole every frame
        let ring = scene.create_child_node(root, Some("ring"))?;
        let mut rng = rand::thread_rng();
        let mut spinning = Vec::with_capacity(ASTEROID_COUNT);
        for i in 0..ASTEROID_COUNT {
            let angle = i as f32 / ASTEROID_COUNT as f32 * std::f32::consts::TAU;
            let radius = rng.gen_range(18.0..26.0);
            let node = scene.create_child_node(ring, Some(&format!("asteroid_node_{i}")))?;
            let tree = scene.tree_mut();
            tree.set_position(node, Vec3::new(angle.cos() * radius, rng.gen_range(-1.5..1.5), angle.sin() * radius))?;
            tree.set_scale(node, Vec3::repeat(rng.gen_range(0.4..1.6)))?;
            spinning.push((node, rng.gen_range(-2.0..2.0)));

            let op = RenderOperation::new(VertexDataHandle(10), 360, PrimitiveType::TriangleList)
                .with_indices(IndexDataHandle(10), 720);
            let asteroid = scene.add_object(RenderableObject::manual(
                format!("asteroid_{i}"),
                op,
                BoundingVolume::Box(Aabb::from_center_extents(Vec3::zeros(), Vec3::repeat(1.0))),
                "Asteroid",
            ))?;
            scene.attach_object(node, asteroid)?;
        }

        // Exhaust plumes around the planet's pole
        let exhaust_node = scene.create_child_node(planet_node, Some("exhaust"))?;
        scene.tree_mut().set_position(exhaust_node, Vec3::new(0.0, 9.0, 0.0))?;
        let mut exhaust = RenderableObject::billboard_set(
            "exhaust",
            Vec2::new(1.0, 1.0),
            VertexDataHandle(20),
            IndexDataHandle(20),
            "Exhaust",
        );
        for _ in 0..16 {
            let offset = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(0.0..4.0), rng.gen_range(-1.0..1.0));
            exhaust.add_billboard(offset, Some(Vec2::new(rng.gen_range(0.5..1.5), rng.gen_range(0.5..1.5))));
        }
        let exhaust = scene.add_object(exhaust)?;
        scene.attach_object(exhaust_node, exhaust)?;

        // Lights: a distant sun and a lamp riding on the planet
        let sun = scene.create_light("sun", LightKind::Directional)?;
        if let Some(light) = scene.light_mut(sun) {
            light.direction = Vec3::new(-1.0, -0.5, -0.3);
            light.diffuse = Vec3::new(1.0, 0.95, 0.8);
        }
        let beacon = scene.create_light("beacon", LightKind::Point)?;
        if let Some(light) = scene.light_mut(beacon) {
            light.position = Vec3::new(0.0, 10.0, 0.0);
            light.range = 30.0;
            light.diffuse = Vec3::new(0.3, 0.6, 1.0);
        }
        scene.attach_light(beacon, planet_node)?;
        scene.set_ambient_light(Vec3::new(0.05, 0.05, 0.08));

        // Camera rig carrying a HUD quad in front of the lens
        let rig = scene.create_child_node(root, Some("camera_rig"))?;
        scene.tree_mut().set_position(rig, Vec3::new(0.0, 20.0, 60.0))?;
        let camera = scene.create_camera("main")?;
        scene.attach_camera(camera, rig)?;
        if let Some(cam) = scene.camera_mut(camera) {
            cam.set_aspect_ratio(16.0 / 9.0);
            cam.set_far_clip(500.0);
            cam.set_direction(Vec3::new(0.0, -20.0, -60.0));
        }
        // Starfield box drawn before everything else, riding with the rig
        let sky = scene.add_object(
            RenderableObject::manual(
                "starfield",
                RenderOperation::new(VertexDataHandle(40), 36, PrimitiveType::TriangleList),
                BoundingVolume::Box(Aabb::from_center_extents(Vec3::zeros(), Vec3::repeat(400.0))),
                "Starfield",
            )
            .with_queue_group(RenderQueueGroupId::SKIES_EARLY)
            .with_query_flags(QueryFlags::USER),
        )?;
        scene.attach_object(rig, sky)?;

        let hud_node = scene.create_child_node(rig, Some("hud"))?;
        scene.tree_mut().translate(hud_node, Vec3::new(0.0, -4.0, -12.0), TransformSpace::Local)?;
        let hud = scene.add_object(
            RenderableObject::manual(
                "hud",
                RenderOperation::new(VertexDataHandle(30), 6, PrimitiveType::TriangleList),
                BoundingVolume::Box(Aabb::from_center_extents(Vec3::zeros(), Vec3::new(2.0, 0.5, 0.01))),
                "Hud",
            )
            .with_queue_group(RenderQueueGroupId::OVERLAY)
            .with_query_flags(QueryFlags::USER),
        )?;
        scene.attach_object(hud_node, hud)?;

        log::info!(
            "Scene built: {} nodes, {} objects",
            scene.tree().node_count(),
            scene.object_count()
        );

        Ok(Self {
            scene,
            backend: RecordingRenderSystem::new(),
            timer: Timer::new(),
            ring,
            camera,
            spinning,
        })
    }

    fn update(&mut self) -> Result<(), DemoError> {
        let tree = self.scene.tree_mut();
        tree.yaw(self.ring, 0.2 * FIXED_STEP)?;
        for &(node, speed) in &self.spinning {
            tree.rotate(node, Vec3::new(1.0, 1.0, 0.0), speed * FIXED_STEP, TransformSpace::Local)?;
        }
        Ok(())
    }

    fn run(&mut self) -> Result<(), DemoError> {
        log::info!("Rendering {} frames...", FRAMES);
        for _ in 0..FRAMES {
            self.timer.update();
            self.update()?;
            self.backend.clear();
            self.scene.render_one_frame(&mut self.backend)?;
        }

        let totals = self.scene.last_frame_stats();
        log::info!(
            "Last frame: {} draws, {} lit draws, {} state changes",
            totals.draw_calls,
            self.backend
                .commands()
                .iter()
                .filter(|c| matches!(c, scene_engine::render::RenderCommand::UseLights(lights)
                    if lights.iter().any(|l| l.kind == RenderLightKind::Directional)))
                .count(),
            totals.state_changes
        );

        // Pick whatever sits in the middle of the screen
        let camera = self.scene.synced_camera(self.camera)?;
        let ray = Ray::new(camera.derived_position(), camera.direction());
        let hits = self.scene.ray_query(&ray, QueryFlags::ENTITY | QueryFlags::WORLD);
        match hits.first() {
            Some(hit) => {
                let name = self.scene.object(hit.object).map_or("?", RenderableObject::name);
                log::info!("Centre of screen: '{}' at {:.1} units", name, hit.distance);
            }
            None => log::info!("Centre of screen: nothing"),
        }

        log::info!(
            "Rendered {} frames in {:.3}s",
            self.scene.frame_count(),
            self.timer.total_time()
        );
        Ok(())
    }
}

fn main() -> Result<(), DemoError> {
    logging::init_with_filter("info");
    log::info!("Starting scene demo");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading scene config from {}", path);
            SceneConfig::load_from_file(&path)?
        }
        None => SceneConfig::default(),
    };

    let mut app = DemoApp::new(config)?;
    app.run()?;
    log::info!("Scene demo completed");
    Ok(())
}
