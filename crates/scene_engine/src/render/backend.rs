//! Backend abstraction traits for the rendering system
//!
//! The scene manager talks to graphics APIs only through [`RenderSystem`].
//! Concrete backends (Direct3D, OpenGL, Vulkan, a recorder for tests) live
//! behind this trait and translate the calls into device commands.

use thiserror::Error;

use crate::foundation::math::{Mat4, Vec3};
use crate::render::material::Pass;
use crate::render::operation::RenderOperation;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Rendering system error types
///
/// Backend-specific failures are flattened into these variants so the scene
/// layer never depends on a particular graphics API's error types.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Renderer initialization failed during setup
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// A rendering operation failed during execution
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// Resource creation or management failed
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Backend-specific error occurred
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Kind of light as seen by a backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderLightKind {
    /// Infinitely distant light; only `direction` is meaningful
    Directional,
    /// Omni-directional light at `position`
    Point,
    /// Cone light at `position` pointing along `direction`
    Spot {
        /// Inner cone angle in radians
        inner_angle: f32,
        /// Outer cone angle in radians
        outer_angle: f32,
    },
}

/// World-space light parameters handed to the backend for lit passes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderLight {
    /// Light kind
    pub kind: RenderLightKind,
    /// World-space position
    pub position: Vec3,
    /// World-space direction (normalized)
    pub direction: Vec3,
    /// Diffuse colour
    pub diffuse: Vec3,
    /// Attenuation range
    pub range: f32,
}

/// Main rendering backend trait
///
/// Calls arrive in this order for every frame:
/// `begin_frame` and `set_ambient_light`, then per camera `set_camera` followed by any number of
/// `set_render_state` / `set_world_matrix` / `use_lights` / `draw`, then
/// `end_frame`. The scene manager only calls `set_render_state` when the pass
/// actually changes.
pub trait RenderSystem {
    /// Human readable backend name (for logging)
    fn name(&self) -> &str;

    /// Begin a new frame
    fn begin_frame(&mut self) -> BackendResult<()>;

    /// Set the scene's ambient colour for the frame
    fn set_ambient_light(&mut self, colour: &Vec3);

    /// Set the view and projection matrices for subsequent draws
    fn set_camera(&mut self, view: &Mat4, projection: &Mat4) -> BackendResult<()>;

    /// Apply the GPU state described by a material pass
    fn set_render_state(&mut self, pass: &Pass) -> BackendResult<()>;

    /// Set the world matrix for subsequent draws
    fn set_world_matrix(&mut self, world: &Mat4);

    /// Set the lights affecting subsequent draws (lit passes only)
    fn use_lights(&mut self, lights: &[RenderLight]);

    /// Issue a draw call
    fn draw(&mut self, operation: &RenderOperation) -> BackendResult<()>;

    /// Finish the frame
    fn end_frame(&mut self) -> BackendResult<()>;
}
