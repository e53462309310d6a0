//! Per-frame rendering context.
//!
//! [`RenderContext`] bundles everything a pass touches while recording a
//! frame: the device, the memory manager, the resource table, the command
//! recorder and the frame pipeline. The render pass manager drives it through
//! [`begin_frame`](RenderContext::begin_frame) /
//! [`end_frame`](RenderContext::end_frame); between the two, passes record
//! into [`recorder`](RenderContext::recorder) and look up shared textures in
//! [`resources`](RenderContext::resources).

use std::sync::Arc;

use crate::commands::CommandRecorder;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::memory::MemoryManager;
use crate::pass::ResourceTable;
use crate::pipeline::{FramePipeline, MAX_FRAMES_IN_FLIGHT};
use crate::scheduler::FrameSchedule;

/// Default number of back buffers the context rotates over.
pub const DEFAULT_BACK_BUFFER_COUNT: usize = 3;

/// Everything a pass needs while recording one frame.
///
/// Collaborator fields are public so a pass can borrow the recorder and the
/// resource table at the same time; frame bookkeeping stays private behind
/// accessors.
pub struct RenderContext {
    /// The device resources are created on.
    pub device: Arc<GraphicsDevice>,
    /// Owner of long-lived GPU allocations.
    pub memory: MemoryManager,
    /// Shared textures exported and imported by passes.
    pub resources: ResourceTable,
    /// The current frame's command recorder.
    pub recorder: CommandRecorder,

    frame_pipeline: FramePipeline,
    schedule: Option<FrameSchedule>,
    back_buffer_count: usize,
    back_buffer_index: usize,
    delta_time: f32,
}

impl RenderContext {
    /// Create a context with the default back-buffer count and frames in
    /// flight.
    pub fn new(device: Arc<GraphicsDevice>) -> Self {
        Self::with_config(device, DEFAULT_BACK_BUFFER_COUNT, MAX_FRAMES_IN_FLIGHT)
    }

    /// Create a context with explicit buffering parameters.
    ///
    /// # Panics
    ///
    /// Panics if `back_buffer_count` or `frames_in_flight` is zero.
    pub fn with_config(
        device: Arc<GraphicsDevice>,
        back_buffer_count: usize,
        frames_in_flight: usize,
    ) -> Self {
        assert!(back_buffer_count > 0, "back_buffer_count must be at least 1");

        log::info!(
            "RenderContext: {} back buffers, {} frames in flight",
            back_buffer_count,
            frames_in_flight
        );

        Self {
            memory: MemoryManager::new(Arc::clone(&device)),
            resources: ResourceTable::new(Arc::clone(&device), back_buffer_count),
            recorder: CommandRecorder::new(),
            frame_pipeline: FramePipeline::new(frames_in_flight),
            schedule: None,
            back_buffer_count,
            back_buffer_index: 0,
            delta_time: 0.0,
            device,
        }
    }

    /// Begin a new frame.
    ///
    /// Waits for the frame slot fence, ages the temp upload pool and opens a
    /// fresh submission schedule.
    ///
    /// # Panics
    ///
    /// Panics if the previous frame was not ended.
    pub fn begin_frame(&mut self) {
        assert!(
            self.schedule.is_none(),
            "begin_frame called while a frame is already open"
        );

        self.frame_pipeline.begin_frame();
        self.memory.tick_frame();
        self.schedule = Some(FrameSchedule::new(Arc::clone(self.device.backend())));
    }

    /// End the current frame.
    ///
    /// Submits everything the recorder collected, finishes the schedule and
    /// hands its fence to the frame pipeline, then advances to the next back
    /// buffer.
    ///
    /// # Panics
    ///
    /// Panics if no frame is open.
    pub fn end_frame(&mut self) -> Result<(), GraphicsError> {
        let Some(mut schedule) = self.schedule.take() else {
            panic!("end_frame called without begin_frame");
        };

        let commands = self.recorder.finish();
        let frame = schedule.submit("frame", &commands, &[])?;
        schedule.finish(&[frame])?;
        self.frame_pipeline.end_frame(schedule.take_fence());

        self.back_buffer_index = (self.back_buffer_index + 1) % self.back_buffer_count;
        Ok(())
    }

    /// The submission schedule of the open frame, for passes that need extra
    /// submissions (e.g. readback before frame end).
    ///
    /// # Panics
    ///
    /// Panics if no frame is open.
    pub fn schedule(&mut self) -> &mut FrameSchedule {
        match self.schedule.as_mut() {
            Some(schedule) => schedule,
            None => panic!("schedule accessed outside an open frame"),
        }
    }

    /// Check if a frame is currently open.
    pub fn is_frame_open(&self) -> bool {
        self.schedule.is_some()
    }

    /// Index of the back buffer the open frame renders into.
    pub fn back_buffer_index(&self) -> usize {
        self.back_buffer_index
    }

    /// Number of back buffers the context rotates over.
    pub fn back_buffer_count(&self) -> usize {
        self.back_buffer_count
    }

    /// The frame pipeline, for fence inspection and idle waits.
    pub fn frame_pipeline(&self) -> &FramePipeline {
        &self.frame_pipeline
    }

    /// Total frames started.
    pub fn frame_count(&self) -> u64 {
        self.frame_pipeline.frame_count()
    }

    /// Seconds since the previous frame, set by the render pass manager.
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Set the frame delta time.
    pub fn set_delta_time(&mut self, delta_time: f32) {
        self.delta_time = delta_time;
    }

    /// Wait for all in-flight GPU work to complete.
    ///
    /// Call before teardown so no released resource is still referenced by a
    /// pending submission.
    pub fn wait_idle(&self) {
        self.frame_pipeline.wait_idle();
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("back_buffer_index", &self.back_buffer_index)
            .field("back_buffer_count", &self.back_buffer_count)
            .field("frame_count", &self.frame_pipeline.frame_count())
            .field("frame_open", &self.schedule.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::GraphicsInstance;

    fn create_test_context() -> RenderContext {
        let instance = GraphicsInstance::new().unwrap();
        RenderContext::new(instance.create_device().unwrap())
    }

    #[test]
    fn test_frame_cycle() {
        let mut ctx = create_test_context();
        assert!(!ctx.is_frame_open());

        ctx.begin_frame();
        assert!(ctx.is_frame_open());
        assert_eq!(ctx.frame_count(), 1);

        ctx.end_frame().unwrap();
        assert!(!ctx.is_frame_open());
    }

    #[test]
    fn test_back_buffer_rotation() {
        let mut ctx = create_test_context();
        assert_eq!(ctx.back_buffer_count(), DEFAULT_BACK_BUFFER_COUNT);

        for expected in [1, 2, 0, 1] {
            ctx.begin_frame();
            ctx.end_frame().unwrap();
            assert_eq!(ctx.back_buffer_index(), expected);
        }
    }

    #[test]
    #[should_panic(expected = "frame is already open")]
    fn test_double_begin_panics() {
        let mut ctx = create_test_context();
        ctx.begin_frame();
        ctx.begin_frame();
    }

    #[test]
    #[should_panic(expected = "without begin_frame")]
    fn test_end_without_begin_panics() {
        let mut ctx = create_test_context();
        let _ = ctx.end_frame();
    }

    #[test]
    fn test_wait_idle_after_frames() {
        let mut ctx = create_test_context();
        ctx.begin_frame();
        ctx.end_frame().unwrap();
        // The dummy backend signals fences at submit, so this returns.
        ctx.wait_idle();
        assert!(ctx.frame_pipeline().is_idle());
    }
}
