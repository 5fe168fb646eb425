//! # Scene Engine
//!
//! Scene-graph traversal and render-queue construction for real-time 3D.
//!
//! ## Features
//!
//! - **Scene Tree**: arena-backed node hierarchy with lazily resolved, cached world transforms
//! - **Culling**: frustum tests over the node hierarchy, a linear list or an octree
//! - **Render Queue**: grouped, prioritised and sorted draw lists (solids by material, transparents back-to-front)
//! - **Backend Agnostic**: draws go through the [`render::RenderSystem`] trait
//! - **Configurable**: scene settings load from TOML or RON
//!
//! ## Quick Start
//!
//! ```rust
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), SceneError> {
//!     let mut scene = SceneManager::new(SceneConfig::default(), Box::new(MaterialLibrary::with_defaults()));
//!     let camera = scene.create_camera("main")?;
//!     if let Some(camera) = scene.camera_mut(camera) {
//!         camera.set_position(Vec3::new(0.0, 0.0, 10.0));
//!     }
//!
//!     let node = scene.create_child_node(scene.root_node(), Some("ship"))?;
//!     let op = RenderOperation::new(VertexDataHandle(1), 36, PrimitiveType::TriangleList);
//!     let ship = scene.add_object(RenderableObject::manual(
//!         "ship",
//!         op,
//!         BoundingVolume::Sphere(Sphere::new(Vec3::zeros(), 1.0)),
//!         MaterialLibrary::BASE_WHITE,
//!     ))?;
//!     scene.attach_object(node, ship)?;
//!
//!     let mut backend = RecordingRenderSystem::new();
//!     let stats = scene.render_one_frame(&mut backend)?;
//!     assert_eq!(stats.draw_calls, 1);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;
pub mod spatial;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError},
        foundation::{
            collections::{CameraId, LightId, NodeId, ObjectId},
            math::{Mat4, Quat, Transform, Vec2, Vec3},
            time::{Stopwatch, Timer},
        },
        render::{
            Material, MaterialKey, MaterialLibrary, MaterialSystem, Pass, PrimitiveType,
            RecordingRenderSystem, RenderOperation, RenderSystem, SceneBlend, Technique,
            VertexDataHandle,
        },
        scene::{
            BoundingVolume, Camera, CullingMode, FrameStats, LightKind, QueryFlags, Ray,
            RenderQueueGroupId, RenderableObject, SceneConfig, SceneError, SceneListener,
            SceneManager, SceneResult, Sphere, TransformSpace,
        },
    };
}
