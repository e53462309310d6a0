//! GPU synchronization primitives.
//!
//! This module provides synchronization types for coordinating work
//! between the CPU and GPU, and between different GPU operations.
//!
//! Both types wrap a backend handle: waits and status checks go through the
//! owning backend, so the same frontend type works over every backend.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{GpuBackend, GpuFence, GpuSemaphore};
use crate::error::GraphicsError;

/// GPU semaphore for synchronizing operations within a frame.
///
/// Semaphores are used for GPU-GPU synchronization:
/// - One submission signals the semaphore when complete
/// - Another submission waits on the semaphore before starting
///
/// Unlike fences, semaphores cannot be waited on from the CPU.
pub struct Semaphore {
    /// Unique identifier for debugging.
    id: u64,
    /// Backend semaphore handle.
    inner: Arc<GpuSemaphore>,
}

impl Semaphore {
    /// Create a new semaphore with the given ID.
    pub(crate) fn new(
        backend: &Arc<dyn GpuBackend>,
        id: u64,
    ) -> Result<Self, GraphicsError> {
        Ok(Self {
            id,
            inner: Arc::new(backend.create_semaphore()?),
        })
    }

    /// Get the semaphore's unique ID (for debugging).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the backend semaphore handle.
    pub(crate) fn gpu_handle(&self) -> &GpuSemaphore {
        &self.inner
    }
}

impl Clone for Semaphore {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore").field("id", &self.id).finish()
    }
}

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence has not yet been signaled.
    Unsignaled,
    /// The fence has been signaled (GPU work complete).
    Signaled,
}

/// CPU-GPU synchronization primitive.
///
/// Fences allow the CPU to wait for GPU work to complete.
/// Used to synchronize frame boundaries and ensure resources
/// are safe to reuse.
///
/// Cloning a fence shares the underlying handle: all clones observe the same
/// signal state.
///
/// # Example
///
/// ```ignore
/// let fence = device.create_fence(false)?;
/// backend.submit(&commands, &[], None, Some(fence.gpu_handle()))?;
///
/// // Later, before reusing frame resources:
/// fence.wait();
/// assert_eq!(fence.status(), FenceStatus::Signaled);
/// ```
pub struct Fence {
    /// Backend that owns the fence.
    backend: Arc<dyn GpuBackend>,
    /// Backend fence handle.
    inner: Arc<GpuFence>,
}

impl Fence {
    /// Create a new fence.
    pub(crate) fn new(
        backend: Arc<dyn GpuBackend>,
        signaled: bool,
    ) -> Result<Self, GraphicsError> {
        let inner = Arc::new(backend.create_fence(signaled)?);
        Ok(Self { backend, inner })
    }

    /// Get the backend fence handle.
    pub(crate) fn gpu_handle(&self) -> &GpuFence {
        &self.inner
    }

    /// Check the current status of the fence.
    pub fn status(&self) -> FenceStatus {
        if self.backend.is_fence_signaled(&self.inner) {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        }
    }

    /// Check if the fence is signaled (non-blocking).
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Wait for the fence to be signaled (blocking).
    ///
    /// This blocks the calling thread until the GPU signals the fence.
    /// Returns immediately if already signaled.
    pub fn wait(&self) {
        self.backend.wait_fence(&self.inner);
    }

    /// Wait for the fence with a timeout.
    ///
    /// Returns `true` if the fence was signaled, `false` if timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.backend.wait_fence_timeout(&self.inner, timeout)
    }

    /// Signal the fence from the CPU.
    ///
    /// Real GPU backends signal fences when submitted work completes; this
    /// marks completion manually for CPU-side work and tests.
    pub fn signal(&self) {
        self.backend.signal_fence(&self.inner);
    }
}

impl Clone for Fence {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence").field("status", &self.status()).finish()
    }
}

// Ensure sync primitives are Send + Sync
static_assertions::assert_impl_all!(Fence: Send, Sync);
static_assertions::assert_impl_all!(Semaphore: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    fn test_backend() -> Arc<dyn GpuBackend> {
        Arc::new(DummyBackend::new())
    }

    #[test]
    fn test_semaphore_id() {
        let sem = Semaphore::new(&test_backend(), 42).unwrap();
        assert_eq!(sem.id(), 42);
    }

    #[test]
    fn test_fence_unsignaled() {
        let fence = Fence::new(test_backend(), false).unwrap();
        assert_eq!(fence.status(), FenceStatus::Unsignaled);
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_fence_signaled() {
        let fence = Fence::new(test_backend(), true).unwrap();
        assert_eq!(fence.status(), FenceStatus::Signaled);
        assert!(fence.is_signaled());
    }

    #[test]
    fn test_fence_signal_and_wait() {
        let fence = Fence::new(test_backend(), false).unwrap();

        // Simulate GPU signaling from another thread
        let fence_clone = fence.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            fence_clone.signal();
        });

        fence.wait();
        assert!(fence.is_signaled());
    }

    #[test]
    fn test_fence_wait_timeout() {
        let fence = Fence::new(test_backend(), false).unwrap();

        // Should timeout since nothing signals it
        let result = fence.wait_timeout(Duration::from_millis(10));
        assert!(!result);
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_fence_clone_shares_state() {
        let fence1 = Fence::new(test_backend(), false).unwrap();
        let fence2 = fence1.clone();

        assert!(!fence1.is_signaled());
        assert!(!fence2.is_signaled());

        fence1.signal();

        assert!(fence1.is_signaled());
        assert!(fence2.is_signaled());
    }
}
