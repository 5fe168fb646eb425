//! Rendering contracts consumed by the scene core
//!
//! The scene manager never talks to a graphics API directly. It resolves
//! materials through [`MaterialSystem`] and submits ordered draw operations
//! through [`RenderSystem`]; concrete backends implement the latter.

pub mod backend;
pub mod material;
pub mod operation;
pub mod recording;

pub use backend::{BackendResult, RenderError, RenderLight, RenderLightKind, RenderSystem};
pub use material::{Material, MaterialKey, MaterialLibrary, MaterialSystem, Pass, SceneBlend, Technique};
pub use operation::{
    IndexData, IndexDataHandle, MeshHandle, PrimitiveType, RenderOperation, VertexDataHandle,
};
pub use recording::{RecordingRenderSystem, RenderCommand};
