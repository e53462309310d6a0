//! Pipeline state objects.
//!
//! A [`PipelineState`] bundles shader bytecode, the root signature, vertex
//! layout, blend state and attachment formats into one immutable GPU object.
//! It is created by [`GraphicsDevice::create_pipeline_state`] and bound by
//! passes through the command recorder.
//!
//! Root signatures and vertex layouts are stored as `Arc` so the renderer can
//! compare pointers to group draw calls that share pipeline variants.

use std::path::Path;
use std::sync::Arc;

use crate::backend::GpuPipeline;
use crate::binding::RootSignature;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::mesh::{PrimitiveTopology, VertexLayout};
use crate::types::TextureFormat;

/// Shader stage in the graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Fragment shader.
    Fragment,
    /// Compute shader.
    Compute,
}

/// Precompiled shader bytecode for one stage.
///
/// Shaders arrive as backend-consumable blobs (SPIR-V for Vulkan and wgpu);
/// no source compilation happens inside the engine.
#[derive(Debug, Clone)]
pub struct ShaderBlob {
    /// The shader stage.
    pub stage: ShaderStage,

    /// Compiled shader bytecode.
    pub bytecode: Vec<u8>,

    /// Entry point function name.
    pub entry_point: String,
}

impl ShaderBlob {
    /// Create a new shader blob.
    pub fn new(
        stage: ShaderStage,
        bytecode: impl Into<Vec<u8>>,
        entry_point: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            bytecode: bytecode.into(),
            entry_point: entry_point.into(),
        }
    }

    /// Create a vertex shader blob.
    pub fn vertex(bytecode: impl Into<Vec<u8>>, entry_point: impl Into<String>) -> Self {
        Self::new(ShaderStage::Vertex, bytecode, entry_point)
    }

    /// Create a fragment shader blob.
    pub fn fragment(bytecode: impl Into<Vec<u8>>, entry_point: impl Into<String>) -> Self {
        Self::new(ShaderStage::Fragment, bytecode, entry_point)
    }

    /// Create a compute shader blob.
    pub fn compute(bytecode: impl Into<Vec<u8>>, entry_point: impl Into<String>) -> Self {
        Self::new(ShaderStage::Compute, bytecode, entry_point)
    }

    /// Load a shader blob from a bytecode file on disk.
    pub fn from_file(
        stage: ShaderStage,
        path: impl AsRef<Path>,
        entry_point: impl Into<String>,
    ) -> Result<Self, GraphicsError> {
        let path = path.as_ref();
        let bytecode = std::fs::read(path).map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!(
                "failed to read shader bytecode from {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self::new(stage, bytecode, entry_point))
    }
}

/// Blend factor for blending operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFactor {
    /// 0.0
    #[default]
    Zero,
    /// 1.0
    One,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
}

/// Blend operation for combining colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    /// source + destination
    #[default]
    Add,
    /// source - destination
    Subtract,
    /// destination - source
    ReverseSubtract,
    /// min(source, destination)
    Min,
    /// max(source, destination)
    Max,
}

/// Blend component configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    /// Source factor.
    pub src_factor: BlendFactor,
    /// Destination factor.
    pub dst_factor: BlendFactor,
    /// Blend operation.
    pub operation: BlendOperation,
}

impl Default for BlendComponent {
    fn default() -> Self {
        Self {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
            operation: BlendOperation::Add,
        }
    }
}

impl BlendComponent {
    /// Create an over blending component (standard alpha blending).
    pub fn over() -> Self {
        Self {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        }
    }
}

/// Blend state for color blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlendState {
    /// Color blend component.
    pub color: BlendComponent,
    /// Alpha blend component.
    pub alpha: BlendComponent,
}

impl BlendState {
    /// Create a standard alpha blending state (src over dst).
    pub fn alpha_blending() -> Self {
        Self {
            color: BlendComponent::over(),
            alpha: BlendComponent::over(),
        }
    }

    /// Create an additive blending state.
    ///
    /// Used by light accumulation: each light's contribution adds onto the
    /// lighting target.
    pub fn additive() -> Self {
        let component = BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
            operation: BlendOperation::Add,
        };
        Self {
            color: component,
            alpha: component,
        }
    }
}

/// Descriptor for creating a pipeline state object.
#[derive(Debug, Clone)]
pub struct PipelineStateDesc {
    /// Shaders used by this pipeline.
    pub shaders: Vec<ShaderBlob>,

    /// Root signature describing the pipeline's binding contract.
    pub root_signature: Arc<RootSignature>,

    /// Expected vertex layout.
    /// Wrapped in `Arc` — same `Arc` pointer means same pipeline variant.
    pub vertex_layout: Arc<VertexLayout>,

    /// Blend state for color blending. If None, blending is disabled.
    pub blend_state: Option<BlendState>,

    /// Primitive topology (how vertices are assembled into primitives).
    pub topology: PrimitiveTopology,

    /// Color attachment formats for the render target scope.
    pub color_formats: Vec<TextureFormat>,

    /// Depth attachment format, if any.
    pub depth_format: Option<TextureFormat>,

    /// Optional label for debugging.
    pub label: Option<String>,
}

impl PipelineStateDesc {
    /// Create a new pipeline state descriptor over a root signature.
    pub fn new(root_signature: Arc<RootSignature>) -> Self {
        Self {
            shaders: Vec::new(),
            root_signature,
            vertex_layout: Arc::new(VertexLayout::new()),
            blend_state: None,
            topology: PrimitiveTopology::TriangleList,
            color_formats: Vec::new(),
            depth_format: None,
            label: None,
        }
    }

    /// Add a shader to the pipeline.
    pub fn with_shader(mut self, shader: ShaderBlob) -> Self {
        self.shaders.push(shader);
        self
    }

    /// Set the expected vertex layout.
    pub fn with_vertex_layout(mut self, layout: Arc<VertexLayout>) -> Self {
        self.vertex_layout = layout;
        self
    }

    /// Set the blend state for color blending.
    pub fn with_blend_state(mut self, blend_state: BlendState) -> Self {
        self.blend_state = Some(blend_state);
        self
    }

    /// Set the primitive topology.
    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Add a color attachment format.
    pub fn with_color_format(mut self, format: TextureFormat) -> Self {
        self.color_formats.push(format);
        self
    }

    /// Set the depth attachment format.
    pub fn with_depth_format(mut self, format: TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }

    /// Set a debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// An immutable pipeline state object.
///
/// Created by [`GraphicsDevice::create_pipeline_state`] and held by the pass
/// that owns it; holds a strong reference to its parent device.
pub struct PipelineState {
    device: Arc<GraphicsDevice>,
    descriptor: PipelineStateDesc,
    gpu_handle: GpuPipeline,
}

impl PipelineState {
    /// Create a new pipeline state (called by GraphicsDevice).
    pub(crate) fn new(
        device: Arc<GraphicsDevice>,
        descriptor: PipelineStateDesc,
        gpu_handle: GpuPipeline,
    ) -> Self {
        Self {
            device,
            descriptor,
            gpu_handle,
        }
    }

    /// Get the GPU pipeline handle.
    pub fn gpu_handle(&self) -> &GpuPipeline {
        &self.gpu_handle
    }

    /// Get the parent device.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Get the pipeline descriptor.
    pub fn descriptor(&self) -> &PipelineStateDesc {
        &self.descriptor
    }

    /// Get the pipeline label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Get the root signature.
    pub fn root_signature(&self) -> &Arc<RootSignature> {
        &self.descriptor.root_signature
    }

    /// Get the expected vertex layout.
    pub fn vertex_layout(&self) -> &Arc<VertexLayout> {
        &self.descriptor.vertex_layout
    }

    /// Get the shaders.
    pub fn shaders(&self) -> &[ShaderBlob] {
        &self.descriptor.shaders
    }

    /// Get the primitive topology.
    pub fn topology(&self) -> PrimitiveTopology {
        self.descriptor.topology
    }
}

impl std::fmt::Debug for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineState")
            .field("label", &self.descriptor.label)
            .field("shader_count", &self.descriptor.shaders.len())
            .field("color_formats", &self.descriptor.color_formats)
            .finish()
    }
}

// Ensure PipelineState is Send + Sync
static_assertions::assert_impl_all!(PipelineState: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::RootSignatureBuilder;
    use crate::instance::GraphicsInstance;

    fn create_test_device() -> Arc<GraphicsDevice> {
        let instance = GraphicsInstance::new().unwrap();
        instance.create_device().unwrap()
    }

    fn empty_root_signature() -> Arc<RootSignature> {
        Arc::new(RootSignatureBuilder::new("test").build())
    }

    #[test]
    fn test_shader_blob() {
        let vs = ShaderBlob::vertex(b"code".to_vec(), "vs_main");
        assert_eq!(vs.stage, ShaderStage::Vertex);
        assert_eq!(vs.entry_point, "vs_main");

        let fs = ShaderBlob::fragment(b"code".to_vec(), "fs_main");
        assert_eq!(fs.stage, ShaderStage::Fragment);
    }

    #[test]
    fn test_descriptor_builder() {
        let desc = PipelineStateDesc::new(empty_root_signature())
            .with_shader(ShaderBlob::vertex(b"vs_code".to_vec(), "main"))
            .with_shader(ShaderBlob::fragment(b"fs_code".to_vec(), "main"))
            .with_color_format(TextureFormat::Rgba8Unorm)
            .with_label("test_pipeline");

        assert_eq!(desc.shaders.len(), 2);
        assert_eq!(desc.color_formats, vec![TextureFormat::Rgba8Unorm]);
        assert_eq!(desc.label, Some("test_pipeline".to_string()));
    }

    #[test]
    fn test_pipeline_creation() {
        let device = create_test_device();
        let desc = PipelineStateDesc::new(empty_root_signature())
            .with_shader(ShaderBlob::vertex(b"vs".to_vec(), "main"))
            .with_color_format(TextureFormat::Rgba8Unorm)
            .with_label("test");

        let pipeline = device.create_pipeline_state(&desc).unwrap();
        assert_eq!(pipeline.label(), Some("test"));
        assert_eq!(pipeline.shaders().len(), 1);
    }

    #[test]
    fn test_additive_blend_state() {
        let blend = BlendState::additive();
        assert_eq!(blend.color.src_factor, BlendFactor::One);
        assert_eq!(blend.color.dst_factor, BlendFactor::One);
        assert_eq!(blend.color.operation, BlendOperation::Add);
    }
}
