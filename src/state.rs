//! Resource state tracking and barrier batching.
//!
//! Every buffer and texture carries a last-known [`ResourceState`]. Passes
//! never emit raw barriers; they request a target state through
//! [`BarrierBatch`] (usually via the command recorder), which compares against
//! the tracked state, skips redundant requests, and folds chains of
//! transitions recorded between flushes into a single barrier.
//!
//! # State Model
//!
//! States are explicit access categories rather than API-specific layouts.
//! Each backend translates them to its native representation (image layouts
//! and access masks on Vulkan, usage scopes on wgpu).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::commands::GpuCommand;
use crate::resources::{Buffer, Texture};
use crate::types::{BufferUsage, TextureUsage};

/// Access state of a GPU resource.
///
/// Resources are created in [`ResourceState::Common`] and transition between
/// states via barriers as passes read and write them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Initial state, no pending access.
    #[default]
    Common,
    /// Bound as a vertex or constant buffer.
    VertexAndConstantBuffer,
    /// Bound as an index buffer.
    IndexBuffer,
    /// Bound as a color render target.
    RenderTarget,
    /// Bound for unordered (read/write) shader access.
    UnorderedAccess,
    /// Bound as a writable depth attachment.
    DepthWrite,
    /// Bound as a read-only depth attachment.
    DepthRead,
    /// Sampled or read in a shader.
    ShaderResource,
    /// Source of a copy operation.
    CopySource,
    /// Destination of a copy operation.
    CopyDest,
    /// Ready for presentation to a surface.
    Present,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Common => "Common",
            Self::VertexAndConstantBuffer => "VertexAndConstantBuffer",
            Self::IndexBuffer => "IndexBuffer",
            Self::RenderTarget => "RenderTarget",
            Self::UnorderedAccess => "UnorderedAccess",
            Self::DepthWrite => "DepthWrite",
            Self::DepthRead => "DepthRead",
            Self::ShaderResource => "ShaderResource",
            Self::CopySource => "CopySource",
            Self::CopyDest => "CopyDest",
            Self::Present => "Present",
        };
        write!(f, "{name}")
    }
}

/// Check whether a texture with the given usage flags can enter a state.
pub fn texture_state_compatible(state: ResourceState, usage: TextureUsage) -> bool {
    match state {
        ResourceState::Common => true,
        ResourceState::RenderTarget => usage.contains(TextureUsage::RENDER_ATTACHMENT),
        ResourceState::DepthWrite | ResourceState::DepthRead => {
            usage.contains(TextureUsage::RENDER_ATTACHMENT)
        }
        ResourceState::ShaderResource => usage.contains(TextureUsage::TEXTURE_BINDING),
        ResourceState::UnorderedAccess => usage.contains(TextureUsage::STORAGE_BINDING),
        ResourceState::CopySource => usage.contains(TextureUsage::COPY_SRC),
        ResourceState::CopyDest => usage.contains(TextureUsage::COPY_DST),
        ResourceState::Present => usage.contains(TextureUsage::RENDER_ATTACHMENT),
        ResourceState::VertexAndConstantBuffer | ResourceState::IndexBuffer => false,
    }
}

/// Check whether a buffer with the given usage flags can enter a state.
pub fn buffer_state_compatible(state: ResourceState, usage: BufferUsage) -> bool {
    match state {
        ResourceState::Common => true,
        ResourceState::VertexAndConstantBuffer => {
            usage.intersects(BufferUsage::VERTEX | BufferUsage::UNIFORM)
        }
        ResourceState::IndexBuffer => usage.contains(BufferUsage::INDEX),
        ResourceState::ShaderResource => {
            usage.intersects(BufferUsage::STORAGE | BufferUsage::UNIFORM)
        }
        ResourceState::UnorderedAccess => usage.contains(BufferUsage::STORAGE),
        ResourceState::CopySource => usage.contains(BufferUsage::COPY_SRC),
        ResourceState::CopyDest => usage.contains(BufferUsage::COPY_DST),
        ResourceState::RenderTarget
        | ResourceState::DepthWrite
        | ResourceState::DepthRead
        | ResourceState::Present => false,
    }
}

/// A resource a barrier applies to.
#[derive(Debug, Clone)]
enum BarrierTarget {
    Texture(Arc<Texture>),
    Buffer(Arc<Buffer>),
}

impl BarrierTarget {
    fn id(&self) -> u64 {
        match self {
            Self::Texture(t) => t.id(),
            Self::Buffer(b) => b.id(),
        }
    }
}

/// A pending state transition.
#[derive(Debug, Clone)]
struct BarrierEntry {
    target: BarrierTarget,
    from: ResourceState,
    to: ResourceState,
}

/// A batch of resource transitions collected before a flush point.
///
/// Requests against the same resource fold into a single barrier: recording
/// `A -> B` then `B -> C` yields one `A -> C` transition, and a chain that
/// returns to its starting state disappears entirely. Requests matching the
/// resource's tracked state are skipped.
///
/// Adding a request updates the resource's tracked state immediately, so the
/// tracked state always reflects CPU recording order.
#[derive(Debug, Default)]
pub struct BarrierBatch {
    /// Pending transitions in first-request order. Entries folded away to
    /// no-ops keep their slot so a later request can reuse it.
    entries: Vec<Option<BarrierEntry>>,
    /// Resource id -> slot in `entries`.
    slots: HashMap<u64, usize>,
}

impl BarrierBatch {
    /// Create a new empty barrier batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a texture transition.
    pub fn request_texture(&mut self, texture: &Arc<Texture>, to: ResourceState) {
        debug_assert!(
            texture_state_compatible(to, texture.usage()),
            "texture {:?} cannot enter state {to} with usage {:?}",
            texture.label(),
            texture.usage()
        );
        self.request(BarrierTarget::Texture(Arc::clone(texture)), texture.current_state(), to);
        texture.set_current_state(to);
    }

    /// Request a buffer transition.
    pub fn request_buffer(&mut self, buffer: &Arc<Buffer>, to: ResourceState) {
        debug_assert!(
            buffer_state_compatible(to, buffer.usage()),
            "buffer {:?} cannot enter state {to} with usage {:?}",
            buffer.label(),
            buffer.usage()
        );
        self.request(BarrierTarget::Buffer(Arc::clone(buffer)), buffer.current_state(), to);
        buffer.set_current_state(to);
    }

    fn request(&mut self, target: BarrierTarget, from: ResourceState, to: ResourceState) {
        let id = target.id();

        if let Some(&slot) = self.slots.get(&id) {
            match &mut self.entries[slot] {
                Some(entry) => {
                    // Fold onto the existing transition. A chain that returns
                    // to its origin needs no barrier at all.
                    entry.to = to;
                    if entry.from == entry.to {
                        self.entries[slot] = None;
                    }
                }
                None => {
                    if from != to {
                        self.entries[slot] = Some(BarrierEntry { target, from, to });
                    }
                }
            }
            return;
        }

        if from == to {
            return;
        }

        let slot = self.entries.len();
        self.entries.push(Some(BarrierEntry { target, from, to }));
        self.slots.insert(id, slot);
    }

    /// Number of pending transitions.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Check if the batch has any pending transitions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Emit the pending transitions as commands, in first-request order,
    /// and clear the batch.
    pub fn drain_into(&mut self, out: &mut Vec<GpuCommand>) {
        for entry in self.entries.drain(..).flatten() {
            match entry.target {
                BarrierTarget::Texture(texture) => out.push(GpuCommand::TransitionTexture {
                    texture,
                    from: entry.from,
                    to: entry.to,
                }),
                BarrierTarget::Buffer(buffer) => out.push(GpuCommand::TransitionBuffer {
                    buffer,
                    from: entry.from,
                    to: entry.to,
                }),
            }
        }
        self.slots.clear();
    }

    /// Discard all pending transitions without emitting them.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.slots.clear();
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

    fn create_target_texture(device: &Arc<GraphicsDevice>) -> Arc<Texture> {
        device
            .create_texture(&TextureDescriptor::render_target(
                64,
                64,
                TextureFormat::Rgba8Unorm,
            ))
            .unwrap()
    }

    #[test]
    fn test_state_compatibility() {
        assert!(texture_state_compatible(
            ResourceState::RenderTarget,
            TextureUsage::RENDER_ATTACHMENT
        ));
        assert!(!texture_state_compatible(
            ResourceState::RenderTarget,
            TextureUsage::TEXTURE_BINDING
        ));
        assert!(buffer_state_compatible(
            ResourceState::IndexBuffer,
            BufferUsage::INDEX
        ));
        assert!(!buffer_state_compatible(
            ResourceState::RenderTarget,
            BufferUsage::VERTEX
        ));
    }

    #[test]
    fn test_barrier_batch_skips_same_state() {
        let device = create_test_device();
        let texture = create_target_texture(&device);

        let mut batch = BarrierBatch::new();
        batch.request_texture(&texture, ResourceState::Common);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_barrier_batch_records_transition() {
        let device = create_test_device();
        let texture = create_target_texture(&device);

        let mut batch = BarrierBatch::new();
        batch.request_texture(&texture, ResourceState::RenderTarget);
        assert_eq!(batch.len(), 1);
        assert_eq!(texture.current_state(), ResourceState::RenderTarget);

        let mut commands = Vec::new();
        batch.drain_into(&mut commands);
        assert!(batch.is_empty());

        match &commands[0] {
            GpuCommand::TransitionTexture { from, to, .. } => {
                assert_eq!(*from, ResourceState::Common);
                assert_eq!(*to, ResourceState::RenderTarget);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_barrier_batch_folds_chain() {
        let device = create_test_device();
        let texture = create_target_texture(&device);

        let mut batch = BarrierBatch::new();
        batch.request_texture(&texture, ResourceState::RenderTarget);
        batch.request_texture(&texture, ResourceState::ShaderResource);
        assert_eq!(batch.len(), 1);

        let mut commands = Vec::new();
        batch.drain_into(&mut commands);
        match &commands[0] {
            GpuCommand::TransitionTexture { from, to, .. } => {
                assert_eq!(*from, ResourceState::Common);
                assert_eq!(*to, ResourceState::ShaderResource);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_barrier_batch_chain_back_to_origin_is_noop() {
        let device = create_test_device();
        let texture = create_target_texture(&device);

        let mut batch = BarrierBatch::new();
        batch.request_texture(&texture, ResourceState::RenderTarget);
        batch.request_texture(&texture, ResourceState::Common);
        assert!(batch.is_empty());

        // The slot is still usable for a fresh transition.
        batch.request_texture(&texture, ResourceState::ShaderResource);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_barrier_batch_multiple_resources_keep_order() {
        let device = create_test_device();
        let a = create_target_texture(&device);
        let b = create_target_texture(&device);

        let mut batch = BarrierBatch::new();
        batch.request_texture(&a, ResourceState::RenderTarget);
        batch.request_texture(&b, ResourceState::ShaderResource);
        assert_eq!(batch.len(), 2);

        let mut commands = Vec::new();
        batch.drain_into(&mut commands);
        let ids: Vec<u64> = commands
            .iter()
            .map(|c| match c {
                GpuCommand::TransitionTexture { texture, .. } => texture.id(),
                other => panic!("unexpected command {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }
}
