//! Frame scheduling and streaming command submission.
//!
//! The scheduler provides streaming submission of command lists to the GPU,
//! allowing work to start executing as soon as it's recorded while the CPU
//! continues building subsequent work.
//!
//! # Architecture
//!
//! `FrameSchedule` is the middle layer of the rendering architecture:
//!
//! | Layer | Type | Purpose |
//! |-------|------|---------|
//! | Pipeline | [`FramePipeline`](crate::pipeline::FramePipeline) | Multiple frames in flight |
//! | **Schedule** | [`FrameSchedule`] | Streaming submission (this module) |
//! | Commands | [`CommandRecorder`](crate::commands::CommandRecorder) | Recorded GPU work |
//!
//! # Module Contents
//!
//! - [`FrameSchedule`] - Manages streaming submission for a single frame
//! - [`SubmissionHandle`] - Handle to a submission, used for dependencies
//! - [`Semaphore`] - GPU synchronization primitive for submission ordering
//! - [`Fence`] - CPU-GPU synchronization for frame completion
//!
//! # Example
//!
//! ```ignore
//! let mut schedule = FrameSchedule::new(backend);
//!
//! // Submit shadow work immediately - GPU starts working
//! let shadows = schedule.submit("shadows", &shadow_commands, &[])?;
//!
//! // Main pass waits for shadows
//! let main = schedule.submit("main", &main_commands, &[shadows])?;
//!
//! // Mark the frame complete; the fence signals when all work finishes
//! schedule.finish(&[main])?;
//! pipeline.end_frame(schedule.take_fence());
//! ```

mod sync;

pub use sync::{Fence, FenceStatus, Semaphore};

use std::sync::Arc;

use crate::backend::GpuBackend;
use crate::commands::GpuCommand;
use crate::error::GraphicsError;

/// Handle to a submission in the frame schedule.
///
/// Used to declare dependencies between submissions. A submission can wait
/// for multiple other submissions to complete before starting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmissionHandle(u32);

impl SubmissionHandle {
    fn new(index: u32) -> Self {
        Self(index)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Information about a submission.
#[derive(Debug)]
struct Submission {
    /// Debug name for this submission.
    name: String,
    /// Semaphore signaled when this submission completes on GPU.
    completion: Semaphore,
    /// Handles of submissions this one waited for (for debugging).
    #[allow(dead_code)]
    waited_for: Vec<SubmissionHandle>,
}

/// Frame schedule for streaming command submission.
///
/// Allows submitting command lists immediately as they're recorded,
/// rather than batching all submissions at frame end. This maximizes
/// CPU-GPU parallelism.
///
/// # Lifecycle
///
/// ```ignore
/// // Each frame:
/// pipeline.begin_frame();
/// let mut schedule = FrameSchedule::new(backend);
///
/// // Submit work as it's ready
/// let a = schedule.submit("pass_a", &commands_a, &[])?;
/// let b = schedule.submit("pass_b", &commands_b, &[a])?;
///
/// // Mark the frame complete
/// schedule.finish(&[b])?;
///
/// // Return the frame fence to the pipeline
/// pipeline.end_frame(schedule.take_fence());
/// ```
pub struct FrameSchedule {
    /// Backend that receives submissions.
    backend: Arc<dyn GpuBackend>,
    /// Submissions with their completion semaphores.
    submitted: Vec<Submission>,
    /// Counter for generating semaphore IDs.
    semaphore_counter: u64,
    /// Fence signaled when the frame completes (set by `finish()`).
    fence: Option<Fence>,
}

impl FrameSchedule {
    /// Create a new frame schedule over a backend.
    pub(crate) fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self {
            backend,
            submitted: Vec::new(),
            semaphore_counter: 0,
            fence: None,
        }
    }

    /// Submit a command list for immediate execution.
    ///
    /// The commands are submitted to the GPU immediately. If `wait_for` is
    /// non-empty, the GPU waits for those submissions to complete before
    /// starting this one.
    ///
    /// Returns a handle that can be used as a dependency for subsequent
    /// submissions.
    ///
    /// # Panics
    ///
    /// Panics if a handle in `wait_for` does not belong to this schedule.
    pub fn submit(
        &mut self,
        name: impl Into<String>,
        commands: &[GpuCommand],
        wait_for: &[SubmissionHandle],
    ) -> Result<SubmissionHandle, GraphicsError> {
        let name = name.into();

        // Validate wait_for handles
        for &handle in wait_for {
            assert!(
                handle.index() < self.submitted.len(),
                "Invalid dependency handle"
            );
        }

        // Create completion semaphore for this submission
        let semaphore_id = self.next_semaphore_id();
        let completion = Semaphore::new(&self.backend, semaphore_id)?;

        // Collect semaphores to wait on
        let wait_semaphores: Vec<_> = wait_for
            .iter()
            .map(|h| self.submitted[h.index()].completion.gpu_handle())
            .collect();

        self.backend.submit(
            commands,
            &wait_semaphores,
            Some(completion.gpu_handle()),
            None,
        )?;

        log::trace!(
            "Submitted '{}': {} commands, wait={}, signal={}",
            name,
            commands.len(),
            wait_for.len(),
            completion.id()
        );

        let handle = SubmissionHandle::new(self.submitted.len() as u32);
        self.submitted.push(Submission {
            name,
            completion,
            waited_for: wait_for.to_vec(),
        });
        Ok(handle)
    }

    /// Get the number of submissions.
    pub fn submitted_count(&self) -> usize {
        self.submitted.len()
    }

    /// Check if any work has been submitted.
    pub fn is_empty(&self) -> bool {
        self.submitted.is_empty()
    }

    /// Check if the schedule has been finished.
    pub fn is_finished(&self) -> bool {
        self.fence.is_some()
    }

    /// Get debug names of all submissions in submission order.
    pub fn submitted_names(&self) -> impl Iterator<Item = &str> {
        self.submitted.iter().map(|s| s.name.as_str())
    }

    /// Mark the frame complete.
    ///
    /// Submits a fence-only submission that waits for the given dependencies;
    /// the fence signals when all of them have completed on the GPU. After
    /// calling this, the schedule should be returned to the pipeline via
    /// [`FramePipeline::end_frame`](crate::pipeline::FramePipeline::end_frame).
    ///
    /// # Panics
    ///
    /// Panics if `finish` has already been called on this schedule.
    pub fn finish(&mut self, wait_for: &[SubmissionHandle]) -> Result<(), GraphicsError> {
        assert!(
            self.fence.is_none(),
            "finish() has already been called on this schedule"
        );

        // Validate wait_for handles
        for &handle in wait_for {
            assert!(
                handle.index() < self.submitted.len(),
                "Invalid dependency handle"
            );
        }

        let fence = Fence::new(Arc::clone(&self.backend), false)?;

        // Fence-only submission: waits the dependencies, signals the fence.
        let wait_semaphores: Vec<_> = wait_for
            .iter()
            .map(|h| self.submitted[h.index()].completion.gpu_handle())
            .collect();

        self.backend
            .submit(&[], &wait_semaphores, None, Some(fence.gpu_handle()))?;

        log::trace!(
            "Finish schedule (waiting for {} dependencies)",
            wait_for.len()
        );

        self.fence = Some(fence);
        Ok(())
    }

    /// Extract the fence from this schedule.
    ///
    /// This is called by [`FramePipeline::end_frame`](crate::pipeline::FramePipeline::end_frame)
    /// integration code.
    ///
    /// # Panics
    ///
    /// Panics if `finish()` was not called.
    pub fn take_fence(&mut self) -> Fence {
        self.fence
            .take()
            .expect("finish() must be called before end_frame()")
    }

    /// Generate a unique semaphore ID.
    fn next_semaphore_id(&mut self) -> u64 {
        let id = self.semaphore_counter;
        self.semaphore_counter += 1;
        id
    }
}

impl std::fmt::Debug for FrameSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSchedule")
            .field("submitted", &self.submitted)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    fn make_schedule() -> FrameSchedule {
        FrameSchedule::new(Arc::new(DummyBackend::new()))
    }

    #[test]
    fn test_submit_single() {
        let mut schedule = make_schedule();

        let handle = schedule.submit("test", &[], &[]).unwrap();

        assert_eq!(schedule.submitted_count(), 1);
        assert_eq!(handle.index(), 0);
    }

    #[test]
    fn test_submit_with_dependencies() {
        let mut schedule = make_schedule();

        let shadow = schedule.submit("shadows", &[], &[]).unwrap();
        let depth = schedule.submit("depth", &[], &[]).unwrap();
        let main = schedule.submit("main", &[], &[shadow, depth]).unwrap();

        assert_eq!(schedule.submitted_count(), 3);
        assert_eq!(main.index(), 2);
    }

    #[test]
    fn test_finish() {
        let mut schedule = make_schedule();

        let main = schedule.submit("main", &[], &[]).unwrap();
        assert!(!schedule.is_finished());

        schedule.finish(&[main]).unwrap();
        assert!(schedule.is_finished());
    }

    #[test]
    fn test_take_fence() {
        let mut schedule = make_schedule();

        let main = schedule.submit("main", &[], &[]).unwrap();
        schedule.finish(&[main]).unwrap();

        let fence = schedule.take_fence();
        // The dummy backend signals fences at submit time.
        assert_eq!(fence.status(), FenceStatus::Signaled);
        assert!(!schedule.is_finished()); // Fence was taken
    }

    #[test]
    #[should_panic(expected = "finish() has already been called")]
    fn test_double_finish_panics() {
        let mut schedule = make_schedule();

        schedule.finish(&[]).unwrap();
        let _ = schedule.finish(&[]); // Panics
    }

    #[test]
    #[should_panic(expected = "finish() must be called before end_frame()")]
    fn test_take_fence_without_finish_panics() {
        let mut schedule = make_schedule();
        schedule.submit("main", &[], &[]).unwrap();
        schedule.take_fence(); // Panics
    }

    #[test]
    #[should_panic(expected = "Invalid dependency handle")]
    fn test_invalid_dependency_panics() {
        let mut schedule = make_schedule();

        // Try to depend on a non-existent submission
        let invalid_handle = SubmissionHandle::new(999);
        let _ = schedule.submit("test", &[], &[invalid_handle]);
    }

    #[test]
    fn test_submitted_names() {
        let mut schedule = make_schedule();

        schedule.submit("shadows", &[], &[]).unwrap();
        schedule.submit("main", &[], &[]).unwrap();
        schedule.finish(&[]).unwrap();

        let names: Vec<_> = schedule.submitted_names().collect();
        assert_eq!(names, vec!["shadows", "main"]);
    }

    #[test]
    fn test_diamond_dependencies() {
        let mut schedule = make_schedule();

        // shadows -> {depth, gbuffer} -> main
        let shadows = schedule.submit("shadows", &[], &[]).unwrap();
        let depth = schedule.submit("depth", &[], &[shadows]).unwrap();
        let gbuffer = schedule.submit("gbuffer", &[], &[shadows]).unwrap();
        let main = schedule.submit("main", &[], &[depth, gbuffer]).unwrap();
        schedule.finish(&[main]).unwrap();

        assert_eq!(schedule.submitted_count(), 4);
        assert!(schedule.is_finished());
    }

    #[test]
    fn test_completion_semaphore_ids_are_unique() {
        let mut schedule = make_schedule();

        schedule.submit("shadows", &[], &[]).unwrap();
        schedule.submit("depth", &[], &[]).unwrap();
        schedule.submit("main", &[], &[]).unwrap();

        let mut ids: Vec<_> = schedule.submitted.iter().map(|s| s.completion.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_debug_reports_progress() {
        let mut schedule = make_schedule();
        schedule.submit("main", &[], &[]).unwrap();

        let formatted = format!("{schedule:?}");
        assert!(formatted.contains("FrameSchedule"));
        assert!(formatted.contains("finished: false"));

        schedule.finish(&[]).unwrap();
        assert!(format!("{schedule:?}").contains("finished: true"));
    }
}
