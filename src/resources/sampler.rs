//! GPU sampler resource.

use std::sync::Arc;

use crate::backend::GpuSampler;
use crate::device::GraphicsDevice;
use crate::types::SamplerDescriptor;

/// A GPU texture sampler.
///
/// Samplers are created by [`GraphicsDevice::create_sampler`] and are
/// reference-counted. Samplers are immutable and carry no state tracking.
pub struct Sampler {
    device: Arc<GraphicsDevice>,
    descriptor: SamplerDescriptor,
    gpu_handle: GpuSampler,
}

impl Sampler {
    /// Create a new sampler (called by GraphicsDevice).
    pub(crate) fn new(
        device: Arc<GraphicsDevice>,
        descriptor: SamplerDescriptor,
        gpu_handle: GpuSampler,
    ) -> Self {
        Self {
            device,
            descriptor,
            gpu_handle,
        }
    }

    /// Get the parent device.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Get the backend sampler handle.
    pub fn gpu_handle(&self) -> &GpuSampler {
        &self.gpu_handle
    }

    /// Get the sampler descriptor.
    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.descriptor
    }

    /// Get the sampler label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("mag_filter", &self.descriptor.mag_filter)
            .field("min_filter", &self.descriptor.min_filter)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Sampler is Send + Sync
static_assertions::assert_impl_all!(Sampler: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::GraphicsInstance;

    fn create_test_device() -> Arc<GraphicsDevice> {
        let instance = GraphicsInstance::new().unwrap();
        instance.create_device().unwrap()
    }

    #[test]
    fn test_sampler_label() {
        let device = create_test_device();
        let sampler = device
            .create_sampler(&SamplerDescriptor::linear().with_label("vt_atlas"))
            .unwrap();
        assert_eq!(sampler.label(), Some("vt_atlas"));
    }

    #[test]
    fn test_sampler_debug() {
        let device = create_test_device();
        let sampler = device.create_sampler(&SamplerDescriptor::linear()).unwrap();
        let debug = format!("{:?}", sampler);
        assert!(debug.contains("Linear"));
    }
}
