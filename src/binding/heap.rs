//! Per-pass descriptor heaps.

use std::sync::Arc;

use crate::error::GraphicsError;
use crate::pass::PassKind;
use crate::resources::{Buffer, Sampler, Texture};
use crate::types::TextureViewDescriptor;

/// A shader-visible view over a resource.
///
/// Each variant holds a strong reference, so a descriptor never outlives the
/// allocation it views.
#[derive(Debug, Clone)]
pub enum DescriptorView {
    /// Constant buffer view.
    ConstantBuffer(Arc<Buffer>),
    /// Structured (storage) buffer view.
    StructuredBuffer(Arc<Buffer>),
    /// Shader resource view over a texture subresource range.
    ShaderResource {
        texture: Arc<Texture>,
        view: TextureViewDescriptor,
    },
    /// Unordered access view.
    UnorderedAccess(Arc<Texture>),
    /// Render target view.
    RenderTarget(Arc<Texture>),
    /// Depth stencil view.
    DepthStencil(Arc<Texture>),
    /// Sampler.
    Sampler(Arc<Sampler>),
}

impl DescriptorView {
    /// Shader resource view over a whole texture.
    pub fn srv(texture: Arc<Texture>) -> Self {
        Self::ShaderResource {
            texture,
            view: TextureViewDescriptor::whole(),
        }
    }

    /// Shader resource view over a single mip level.
    pub fn srv_mip(texture: Arc<Texture>, level: u32) -> Self {
        Self::ShaderResource {
            texture,
            view: TextureViewDescriptor::single_mip(level),
        }
    }
}

/// A slot handed out by a [`DescriptorHeap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorAllocation {
    /// Index of the descriptor within its heap.
    pub heap_index: u32,
}

/// A descriptor bound to a shader register for one submission.
///
/// Recorded into the command stream by
/// [`CommandRecorder::bind_descriptors`](crate::commands::CommandRecorder::bind_descriptors).
#[derive(Debug, Clone)]
pub struct DescriptorBinding {
    /// Shader register index.
    pub register: u32,
    /// Register space.
    pub space: u32,
    /// The view to bind.
    pub view: DescriptorView,
}

/// Fixed-capacity descriptor storage owned by one pass.
///
/// Capacity is fixed by the pass kind at creation; running out is an error
/// (passes size their binding set at init time, so exhaustion means the pass
/// under-declared). A separate growable range backs bindless tables.
#[derive(Debug)]
pub struct DescriptorHeap {
    name: String,
    capacity: usize,
    views: Vec<DescriptorView>,
    bindless: Vec<DescriptorView>,
}

impl DescriptorHeap {
    /// Descriptor capacity for a pass kind.
    pub fn capacity_for(kind: PassKind) -> usize {
        match kind {
            PassKind::Graphics => 64,
            PassKind::Compute => 32,
            // Ray tracing passes bind whole-scene resource sets.
            PassKind::RayTracing => 256,
        }
    }

    /// Create a heap sized for the given pass kind.
    pub fn new(name: impl Into<String>, kind: PassKind) -> Self {
        Self::with_capacity(name, Self::capacity_for(kind))
    }

    /// Create a heap with an explicit capacity.
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            views: Vec::new(),
            bindless: Vec::new(),
        }
    }

    /// The heap name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of fixed-slot descriptors.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of allocated fixed-slot descriptors.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Check if no descriptors have been allocated.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Allocate a fixed descriptor slot for a view.
    ///
    /// # Errors
    ///
    /// Returns an error when the heap is full.
    pub fn allocate(&mut self, view: DescriptorView) -> Result<DescriptorAllocation, GraphicsError> {
        if self.views.len() >= self.capacity {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "descriptor heap '{}' exhausted (capacity {})",
                self.name, self.capacity
            )));
        }
        let heap_index = self.views.len() as u32;
        self.views.push(view);
        Ok(DescriptorAllocation { heap_index })
    }

    /// The view stored at a heap index.
    pub fn view(&self, allocation: DescriptorAllocation) -> Option<&DescriptorView> {
        self.views.get(allocation.heap_index as usize)
    }

    /// All fixed-slot views in allocation order.
    pub fn views(&self) -> &[DescriptorView] {
        &self.views
    }

    /// Append a view to the bindless range, returning its index within the
    /// range. The range grows without bound and is resolved at bind time.
    pub fn register_bindless(&mut self, view: DescriptorView) -> u32 {
        let index = self.bindless.len() as u32;
        self.bindless.push(view);
        index
    }

    /// The bindless range in registration order.
    pub fn bindless_views(&self) -> &[DescriptorView] {
        &self.bindless
    }

    /// Drop every descriptor, releasing the held resource references.
    pub fn clear(&mut self) {
        self.views.clear();
        self.bindless.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::GraphicsDevice;
    use crate::instance::GraphicsInstance;
    use crate::types::{TextureDescriptor, TextureFormat};

    fn create_test_device() -> Arc<GraphicsDevice> {
        let instance = GraphicsInstance::new().unwrap();
        instance.create_device().unwrap()
    }

    fn test_texture(device: &Arc<GraphicsDevice>) -> Arc<Texture> {
        device
            .create_texture(&TextureDescriptor::render_target(
                64,
                64,
                TextureFormat::Rgba8Unorm,
            ))
            .unwrap()
    }

    #[test]
    fn test_allocate_sequential_indices() {
        let device = create_test_device();
        let texture = test_texture(&device);

        let mut heap = DescriptorHeap::new("test", PassKind::Graphics);
        let a = heap.allocate(DescriptorView::srv(Arc::clone(&texture))).unwrap();
        let b = heap.allocate(DescriptorView::srv(texture)).unwrap();
        assert_eq!(a.heap_index, 0);
        assert_eq!(b.heap_index, 1);
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn test_exhaustion_is_error() {
        let device = create_test_device();
        let texture = test_texture(&device);

        let mut heap = DescriptorHeap::with_capacity("tiny", 2);
        heap.allocate(DescriptorView::srv(Arc::clone(&texture))).unwrap();
        heap.allocate(DescriptorView::srv(Arc::clone(&texture))).unwrap();
        let result = heap.allocate(DescriptorView::srv(texture));
        assert!(result.is_err());
    }

    #[test]
    fn test_descriptor_pins_resource() {
        let device = create_test_device();
        let mut heap = DescriptorHeap::new("pin", PassKind::Graphics);

        {
            let texture = test_texture(&device);
            heap.allocate(DescriptorView::srv(texture)).unwrap();
        }
        // The heap's strong reference keeps the texture alive.
        device.cleanup_dead_resources();
        assert_eq!(device.texture_count(), 1);

        heap.clear();
        device.cleanup_dead_resources();
        assert_eq!(device.texture_count(), 0);
    }

    #[test]
    fn test_bindless_range_grows() {
        let device = create_test_device();
        let mut heap = DescriptorHeap::new("bindless", PassKind::Graphics);

        for i in 0..100 {
            let index = heap.register_bindless(DescriptorView::srv(test_texture(&device)));
            assert_eq!(index, i);
        }
        assert_eq!(heap.bindless_views().len(), 100);
        // The fixed range is untouched.
        assert!(heap.is_empty());
    }
}
