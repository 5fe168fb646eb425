//! Command-recording backend
//!
//! Stands in for a GPU backend: every call is appended to a command list that
//! can be inspected afterwards. Used by the demo application and by tests to
//! assert draw ordering and state-change counts.

use crate::foundation::math::{Mat4, Vec3};
use crate::render::backend::{BackendResult, RenderError, RenderLight, RenderSystem};
use crate::render::material::Pass;
use crate::render::operation::RenderOperation;

/// A single recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    /// `begin_frame`
    BeginFrame,
    /// `set_ambient_light`
    SetAmbientLight(Vec3),
    /// `set_camera`
    SetCamera {
        /// View matrix
        view: Mat4,
        /// Projection matrix
        projection: Mat4,
    },
    /// `set_render_state`, identified by pass name
    SetRenderState(String),
    /// `set_world_matrix`
    SetWorldMatrix(Mat4),
    /// `use_lights`
    UseLights(Vec<RenderLight>),
    /// `draw`
    Draw(RenderOperation),
    /// `end_frame`
    EndFrame,
}

/// Backend that records every call instead of talking to a device
#[derive(Debug, Default)]
pub struct RecordingRenderSystem {
    commands: Vec<RenderCommand>,
    frames_completed: u64,
    fail_draws: bool,
}

impl RecordingRenderSystem {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `draw` call fail with [`RenderError::RenderingFailed`]
    pub fn with_failing_draws(mut self) -> Self {
        self.fail_draws = true;
        self
    }

    /// All commands recorded so far
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    /// Drop recorded commands (frame counter is kept)
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Number of completed frames
    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }

    /// Number of recorded draw calls
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::Draw(_)))
            .count()
    }

    /// Number of recorded render-state changes
    pub fn state_change_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::SetRenderState(_)))
            .count()
    }

    /// Pass names in the order they were applied
    pub fn state_sequence(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::SetRenderState(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// World matrices in the order draws were issued
    ///
    /// Each draw is paired with the most recent `SetWorldMatrix`.
    pub fn draw_world_matrices(&self) -> Vec<Mat4> {
        let mut current = Mat4::identity();
        let mut result = Vec::new();
        for command in &self.commands {
            match command {
                RenderCommand::SetWorldMatrix(m) => current = *m,
                RenderCommand::Draw(_) => result.push(current),
                _ => {}
            }
        }
        result
    }
}

impl RenderSystem for RecordingRenderSystem {
    fn name(&self) -> &str {
        "recording"
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        log::trace!("[recording] begin_frame");
        self.commands.push(RenderCommand::BeginFrame);
        Ok(())
    }

    fn set_ambient_light(&mut self, colour: &Vec3) {
        self.commands.push(RenderCommand::SetAmbientLight(*colour));
    }

    fn set_camera(&mut self, view: &Mat4, projection: &Mat4) -> BackendResult<()> {
        self.commands.push(RenderCommand::SetCamera {
            view: *view,
            projection: *projection,
        });
        Ok(())
    }

    fn set_render_state(&mut self, pass: &Pass) -> BackendResult<()> {
        log::trace!("[recording] set_render_state '{}'", pass.name);
        self.commands.push(RenderCommand::SetRenderState(pass.name.clone()));
        Ok(())
    }

    fn set_world_matrix(&mut self, world: &Mat4) {
        self.commands.push(RenderCommand::SetWorldMatrix(*world));
    }

    fn use_lights(&mut self, lights: &[RenderLight]) {
        self.commands.push(RenderCommand::UseLights(lights.to_vec()));
    }

    fn draw(&mut self, operation: &RenderOperation) -> BackendResult<()> {
        if self.fail_draws {
            return Err(RenderError::RenderingFailed("draw rejected by recorder".to_string()));
        }
        log::trace!(
            "[recording] draw {:?} x{} ({:?})",
            operation.vertex_data,
            operation.element_count(),
            operation.primitive
        );
        self.commands.push(RenderCommand::Draw(*operation));
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        log::trace!("[recording] end_frame");
        self.commands.push(RenderCommand::EndFrame);
        self.frames_completed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::operation::{PrimitiveType, VertexDataHandle};

    #[test]
    fn test_recorder_counts() {
        let mut recorder = RecordingRenderSystem::new();
        let op = RenderOperation::new(VertexDataHandle(7), 3, PrimitiveType::TriangleList);

        recorder.begin_frame().unwrap();
        recorder.set_render_state(&Pass::new("a")).unwrap();
        recorder.draw(&op).unwrap();
        recorder.draw(&op).unwrap();
        recorder.end_frame().unwrap();

        assert_eq!(recorder.draw_count(), 2);
        assert_eq!(recorder.state_change_count(), 1);
        assert_eq!(recorder.state_sequence(), vec!["a"]);
        assert_eq!(recorder.frames_completed(), 1);
    }

    #[test]
    fn test_failing_draws() {
        let mut recorder = RecordingRenderSystem::new().with_failing_draws();
        let op = RenderOperation::new(VertexDataHandle(1), 3, PrimitiveType::TriangleList);
        assert!(matches!(recorder.draw(&op), Err(RenderError::RenderingFailed(_))));
        assert_eq!(recorder.draw_count(), 0);
    }
}
