//! Frame hooks and per-frame statistics

use std::time::Duration;

use crate::scene::render_queue::RenderQueueGroupId;

/// Counters gathered while rendering one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Frame number, starting at 1
    pub frame: u64,
    /// Cameras the frame was rendered from
    pub cameras_rendered: usize,
    /// Nodes whose world transform was recomputed
    pub nodes_updated: usize,
    /// Objects tested against a frustum
    pub objects_tested: usize,
    /// Objects rejected by frustum culling
    pub objects_culled: usize,
    /// Entries added to the render queue
    pub renderables_queued: usize,
    /// Parts skipped because their material did not resolve
    pub materials_skipped: usize,
    /// Render state changes issued to the backend
    pub state_changes: usize,
    /// Solid material batches drawn
    pub batches: usize,
    /// Draw calls issued
    pub draw_calls: usize,
    /// Primitives submitted
    pub primitives: u64,
    /// Wall time spent in `render_one_frame`
    pub frame_time: Duration,
}

/// Observer of frame rendering
///
/// All methods have no-op defaults; implement only what you need.
pub trait SceneListener {
    /// Called before a queue group is drawn; return true to skip the group
    fn queue_started(&mut self, _group: RenderQueueGroupId) -> bool {
        false
    }

    /// Called after a queue group is drawn; return true to draw it again
    fn queue_ended(&mut self, _group: RenderQueueGroupId) -> bool {
        false
    }

    /// Called once the frame is complete and the queue has been cleared
    fn frame_ended(&mut self, _stats: &FrameStats) {}
}
