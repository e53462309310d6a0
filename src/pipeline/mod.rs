//! Frame pipeline for managing multiple frames in flight.
//!
//! This module provides [`FramePipeline`], which coordinates CPU-GPU synchronization
//! across multiple frames, enabling efficient frame overlap (the CPU prepares frame N+1
//! while the GPU renders frame N).
//!
//! # Rendering Architecture Overview
//!
//! The rendering system is organized in layers, from high-level to low-level:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          FramePipeline                                  │
//! │  Manages multiple frames in flight. Handles CPU-GPU synchronization     │
//! │  via fences. Enables frame overlap for maximum throughput.              │
//! │                                                                         │
//! │  Responsibilities:                                                      │
//! │  - Track fences for N frames in flight                                  │
//! │  - Wait for frame slot availability (begin_frame)                       │
//! │  - Graceful shutdown (wait_idle)                                        │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                          FrameSchedule                                  │
//! │  Orchestrates multiple submissions within ONE frame. Enables            │
//! │  streaming submission (submit command lists as they're recorded).       │
//! │                                                                         │
//! │  Responsibilities:                                                      │
//! │  - Accept command lists and submit immediately to the GPU               │
//! │  - Track dependencies between submissions via semaphores                │
//! │  - Produce the fence for frame completion                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                         CommandRecorder                                 │
//! │  Records one frame's GPU work: barriers, render target scopes,          │
//! │  draws, dispatches and copies.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Synchronization Model
//!
//! Different synchronization primitives are used at different levels:
//!
//! | Level | Primitive | Purpose |
//! |-------|-----------|---------|
//! | Pass → Pass | Barriers | Resource state transitions within a frame |
//! | Submission → Submission | Semaphores | GPU-GPU sync within a frame |
//! | Frame → Frame | Fences | CPU-GPU sync across frames |
//!
//! # Frame Overlap (Pipelining)
//!
//! With 2 frames in flight, the CPU and GPU work in parallel:
//!
//! ```text
//! Frame 0: [CPU build] [submit] ─────────────────────────────────────────────►
//!                               [GPU execute frame 0] ───────────────────────►
//!
//! Frame 1:              [CPU build] [submit] ────────────────────────────────►
//!                                            [GPU execute frame 1] ──────────►
//!
//! Frame 2:                          [wait F0] [CPU build] [submit] ──────────►
//!                                                         [GPU execute F2] ──►
//!
//! Time ──────────────────────────────────────────────────────────────────────►
//! ```
//!
//! - CPU doesn't wait for GPU unless it's reusing a frame slot
//! - GPU processes frames in order via semaphores
//! - Fences ensure we don't overwrite in-use resources
//!
//! # Graceful Shutdown
//!
//! When the application exits (e.g., window close), call [`FramePipeline::wait_idle`]
//! to ensure all GPU work completes before destroying resources.
//!
//! # Choosing Frames in Flight
//!
//! | Count | Behavior |
//! |-------|----------|
//! | 1 | CPU waits for GPU every frame. Simple but slow. |
//! | 2 | Good balance. CPU can work on N+1 while GPU renders N. |
//! | 3 | More overlap, higher latency. Useful for VR or heavy CPU work. |
//!
//! More frames = more throughput but higher input latency and memory usage
//! (each frame needs its own resources like uniform buffers).

use crate::scheduler::Fence;
use std::time::Duration;

/// Default number of frames in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Manages multiple frames in flight for CPU-GPU parallelism.
///
/// `FramePipeline` coordinates the overlap between CPU frame preparation and
/// GPU frame execution. It tracks fences for each frame slot and ensures
/// the CPU doesn't overwrite resources that the GPU is still using.
///
/// # Frame Slots
///
/// With N frames in flight, there are N "slots". Each slot can hold one frame's
/// worth of work. When all slots are full, [`begin_frame`](Self::begin_frame)
/// blocks until the oldest frame completes.
///
/// ```text
/// frames_in_flight = 2
///
/// Slot 0: [Frame 0] ──► [Frame 2] ──► [Frame 4] ──►
/// Slot 1: [Frame 1] ──► [Frame 3] ──► [Frame 5] ──►
/// ```
///
/// # Thread Safety
///
/// `FramePipeline` is **not thread-safe**. It should be owned by a single
/// thread (typically the main/render thread).
#[derive(Debug)]
pub struct FramePipeline {
    /// Fences for each frame slot. `None` if slot hasn't been used yet.
    frame_fences: Vec<Option<Fence>>,

    /// Current frame slot index (0 to frames_in_flight - 1).
    current_slot: usize,

    /// Total number of frames in flight.
    frames_in_flight: usize,

    /// Total frames started (for debugging/profiling).
    frame_count: u64,
}

impl FramePipeline {
    /// Create a new frame pipeline.
    ///
    /// # Arguments
    ///
    /// * `frames_in_flight` - Number of frames that can be in flight simultaneously.
    ///   Typically 2 or 3. Must be at least 1.
    ///
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is 0.
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "frames_in_flight must be at least 1");

        Self {
            frame_fences: (0..frames_in_flight).map(|_| None).collect(),
            current_slot: 0,
            frames_in_flight,
            frame_count: 0,
        }
    }

    /// Begin a new frame.
    ///
    /// This waits for the current frame slot to become available. If the GPU
    /// is still processing a previous frame in this slot, this call blocks
    /// until that work completes.
    ///
    /// Call this at the start of each frame, before recording commands.
    pub fn begin_frame(&mut self) {
        // Wait for previous work in this slot to complete
        if let Some(fence) = &self.frame_fences[self.current_slot] {
            fence.wait();
        }

        self.frame_count += 1;

        log::trace!(
            "Begin frame {} (slot {})",
            self.frame_count,
            self.current_slot
        );
    }

    /// Begin a new frame with a timeout.
    ///
    /// Like [`begin_frame`](Self::begin_frame), but returns `false` if the
    /// timeout elapses before the frame slot becomes available.
    pub fn begin_frame_timeout(&mut self, timeout: Duration) -> bool {
        if let Some(fence) = &self.frame_fences[self.current_slot]
            && !fence.wait_timeout(timeout)
        {
            return false;
        }

        self.frame_count += 1;

        log::trace!(
            "Begin frame {} (slot {})",
            self.frame_count,
            self.current_slot
        );

        true
    }

    /// End the current frame.
    ///
    /// Records the fence for this frame and advances to the next frame slot.
    /// Call this after submitting all work for the frame.
    ///
    /// # Arguments
    ///
    /// * `fence` - The frame fence from [`FrameSchedule::take_fence`].
    ///
    /// [`FrameSchedule::take_fence`]: crate::scheduler::FrameSchedule::take_fence
    pub fn end_frame(&mut self, fence: Fence) {
        log::trace!(
            "End frame {} (slot {})",
            self.frame_count,
            self.current_slot
        );

        // Store fence for this slot
        self.frame_fences[self.current_slot] = Some(fence);

        // Advance to next slot
        self.current_slot = (self.current_slot + 1) % self.frames_in_flight;
    }

    /// Wait for all in-flight GPU work to complete.
    ///
    /// This blocks until every frame slot's fence is signaled. Call this
    /// before destroying GPU resources to ensure they're not in use.
    ///
    /// # When to Call
    ///
    /// - Application shutdown (window close)
    /// - Before resizing the swapchain
    /// - Any time you need to ensure GPU is completely idle
    pub fn wait_idle(&self) {
        log::trace!("Waiting for GPU idle ({} slots)", self.frames_in_flight);

        for (i, fence) in self.frame_fences.iter().enumerate() {
            if let Some(f) = fence {
                log::trace!("Waiting for slot {}...", i);
                f.wait();
            }
        }

        log::trace!("GPU idle");
    }

    /// Wait for all in-flight GPU work with a timeout.
    ///
    /// Like [`wait_idle`](Self::wait_idle), but returns `false` if the
    /// timeout elapses before all work completes.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let start = std::time::Instant::now();

        for fence in self.frame_fences.iter().flatten() {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return false;
            }

            let remaining = timeout - elapsed;
            if !fence.wait_timeout(remaining) {
                return false;
            }
        }

        true
    }

    /// Get the number of frames in flight.
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Get the current frame slot index.
    ///
    /// Returns a value from 0 to `frames_in_flight - 1`.
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Get the total number of frames started.
    ///
    /// This counter increments each time [`begin_frame`](Self::begin_frame) is called.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Check if a specific frame slot is ready (non-blocking).
    ///
    /// Returns `true` if the slot's fence is signaled or if the slot
    /// hasn't been used yet.
    pub fn is_slot_ready(&self, slot: usize) -> bool {
        assert!(slot < self.frames_in_flight, "Invalid slot index");

        match &self.frame_fences[slot] {
            Some(fence) => fence.is_signaled(),
            None => true, // Never used, so it's ready
        }
    }

    /// Check if all frame slots are ready (non-blocking).
    ///
    /// Returns `true` if [`wait_idle`](Self::wait_idle) would return immediately.
    pub fn is_idle(&self) -> bool {
        self.frame_fences
            .iter()
            .all(|f| f.as_ref().is_none_or(|fence| fence.is_signaled()))
    }
}

impl Default for FramePipeline {
    /// Creates a pipeline with [`MAX_FRAMES_IN_FLIGHT`] frames in flight.
    fn default() -> Self {
        Self::new(MAX_FRAMES_IN_FLIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use std::sync::Arc;

    fn test_fence(signaled: bool) -> Fence {
        Fence::new(Arc::new(DummyBackend::new()), signaled).unwrap()
    }

    #[test]
    fn test_new() {
        let pipeline = FramePipeline::new(2);
        assert_eq!(pipeline.frames_in_flight(), 2);
        assert_eq!(pipeline.current_slot(), 0);
        assert_eq!(pipeline.frame_count(), 0);
    }

    #[test]
    fn test_default() {
        let pipeline = FramePipeline::default();
        assert_eq!(pipeline.frames_in_flight(), MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    #[should_panic(expected = "frames_in_flight must be at least 1")]
    fn test_zero_frames_panics() {
        FramePipeline::new(0);
    }

    #[test]
    fn test_begin_frame_increments_count() {
        let mut pipeline = FramePipeline::new(2);
        assert_eq!(pipeline.frame_count(), 0);

        pipeline.begin_frame();
        assert_eq!(pipeline.frame_count(), 1);

        pipeline.begin_frame();
        assert_eq!(pipeline.frame_count(), 2);
    }

    #[test]
    fn test_end_frame_advances_slot() {
        let mut pipeline = FramePipeline::new(3);
        assert_eq!(pipeline.current_slot(), 0);

        pipeline.begin_frame();
        pipeline.end_frame(test_fence(true));
        assert_eq!(pipeline.current_slot(), 1);

        pipeline.begin_frame();
        pipeline.end_frame(test_fence(true));
        assert_eq!(pipeline.current_slot(), 2);

        pipeline.begin_frame();
        pipeline.end_frame(test_fence(true));
        assert_eq!(pipeline.current_slot(), 0); // Wraps around
    }

    #[test]
    fn test_is_slot_ready_unused() {
        let pipeline = FramePipeline::new(2);
        assert!(pipeline.is_slot_ready(0));
        assert!(pipeline.is_slot_ready(1));
    }

    #[test]
    fn test_is_idle_initial() {
        let pipeline = FramePipeline::new(2);
        assert!(pipeline.is_idle());
    }

    #[test]
    fn test_wait_idle_with_signaled_fences() {
        let mut pipeline = FramePipeline::new(2);

        pipeline.begin_frame();
        pipeline.end_frame(test_fence(true));

        pipeline.begin_frame();
        pipeline.end_frame(test_fence(true));

        // Should return immediately since fences are signaled
        pipeline.wait_idle();
        assert!(pipeline.is_idle());
    }

    #[test]
    fn test_slot_reuse_waits_for_fence() {
        let mut pipeline = FramePipeline::new(2);

        // Fill both slots; slot 0's fence stays unsignaled.
        let pending = test_fence(false);
        pipeline.begin_frame();
        pipeline.end_frame(pending.clone());
        pipeline.begin_frame();
        pipeline.end_frame(test_fence(true));

        // Frame 3 would reuse slot 0, whose work hasn't "completed".
        assert!(!pipeline.begin_frame_timeout(Duration::from_millis(10)));
        assert_eq!(pipeline.frame_count(), 2);

        // Once the GPU signals, the slot becomes available.
        pending.signal();
        assert!(pipeline.begin_frame_timeout(Duration::from_millis(10)));
        assert_eq!(pipeline.frame_count(), 3);
    }

    #[test]
    fn test_frame_lifecycle() {
        let mut pipeline = FramePipeline::new(2);

        // Frame 0
        pipeline.begin_frame();
        assert_eq!(pipeline.frame_count(), 1);
        pipeline.end_frame(test_fence(true));
        assert_eq!(pipeline.current_slot(), 1);

        // Frame 1
        pipeline.begin_frame();
        assert_eq!(pipeline.frame_count(), 2);
        pipeline.end_frame(test_fence(true));
        assert_eq!(pipeline.current_slot(), 0);

        // Frame 2 (reuses slot 0)
        pipeline.begin_frame(); // Would wait for frame 0's fence if not signaled
        assert_eq!(pipeline.frame_count(), 3);
        assert_eq!(pipeline.current_slot(), 0);
    }

    #[test]
    fn test_begin_frame_timeout_ready() {
        let mut pipeline = FramePipeline::new(2);

        // Should succeed immediately (no fence to wait on)
        assert!(pipeline.begin_frame_timeout(Duration::from_millis(1)));
        assert_eq!(pipeline.frame_count(), 1);
    }

    #[test]
    fn test_wait_idle_timeout_ready() {
        let pipeline = FramePipeline::new(2);

        // Should succeed immediately (no fences)
        assert!(pipeline.wait_idle_timeout(Duration::from_millis(1)));
    }

    #[test]
    #[should_panic(expected = "Invalid slot index")]
    fn test_is_slot_ready_invalid() {
        let pipeline = FramePipeline::new(2);
        pipeline.is_slot_ready(5); // Invalid
    }
}
