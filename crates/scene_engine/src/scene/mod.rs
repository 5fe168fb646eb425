//! Scene management system
//!
//! Maintains the spatial node tree and turns it into sorted draw calls each
//! frame. Following Game Engine Architecture Chapter 11.2.7 - Scene Graphs.
//!
//! ## Architecture
//!
//! ```text
//! SceneTree (nodes, lazy world transforms)
//!      ↓  update: transforms, node bounds, spatial index
//! Culling (camera frustum vs. hierarchy or index)
//!      ↓
//! RenderQueue (groups → priorities → solid/transparent, sorted)
//!      ↓
//! RenderSystem (backend)
//! ```
//!
//! The Scene Manager:
//! - Owns nodes, renderables, cameras and lights in generational arenas
//! - Resolves dirty world transforms lazily and caches them per node
//! - Culls against each active camera and builds the render queue
//! - Batches solids by material so render state only changes on boundaries

mod bounds;
mod camera;
mod error;
mod frustum;
mod light;
mod listener;
mod node;
mod query;
mod render_queue;
mod renderable_object;
mod scene_graph;
mod scene_manager;

#[cfg(test)]
mod tests;

pub use bounds::{Aabb, BoundingVolume, Ray, Sphere};
pub use camera::{Camera, ParentFrame, Projection};
pub use error::{RenameStatus, SceneError, SceneResult};
pub use frustum::{Frustum, FrustumPlane, Plane};
pub use light::{lights_affecting, Light, LightKind};
pub use listener::{FrameStats, SceneListener};
pub use node::{SpatialNode, TransformSpace};
pub use query::RayQueryHit;
pub use render_queue::{
    QueuedRenderable, RenderBatch, RenderPriorityGroup, RenderQueue, RenderQueueGroup,
    RenderQueueGroupId,
};
pub use renderable_object::{Billboard, QueryFlags, RenderableKind, RenderableObject, SubMesh};
pub use scene_graph::{RemovedNodes, SceneTree, TreeVisitor};
pub use scene_manager::{CullingMode, FramePhase, SceneConfig, SceneManager};
