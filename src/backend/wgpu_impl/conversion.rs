//! Conversions from engine types to wgpu types.

use crate::mesh::{
    PrimitiveTopology, VertexAttributeFormat, VertexLayout, VertexStepMode,
};
use crate::pipeline_state::{BlendComponent, BlendFactor, BlendOperation, BlendState};
use crate::types::{
    AddressMode, BufferDescriptor, BufferUsage, CompareFunction, FilterMode, MemoryLocation,
    SamplerDescriptor, TextureDescriptor, TextureFormat, TextureUsage,
};

/// Shader register to wgpu binding number.
///
/// Register kinds share a binding namespace per set in SPIR-V, so each kind
/// gets a fixed shift. Must match the `-fvk-*-shift` flags used when shaders
/// are compiled offline.
pub(crate) fn binding_shift(kind: crate::binding::RegisterKind) -> u32 {
    use crate::binding::RegisterKind;
    match kind {
        RegisterKind::ConstantBuffer => 0,
        RegisterKind::ShaderResource => 100,
        RegisterKind::UnorderedAccess => 200,
        RegisterKind::Sampler => 300,
    }
}

pub(crate) fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TextureFormat::R8Uint => wgpu::TextureFormat::R8Uint,
        TextureFormat::R16Unorm => wgpu::TextureFormat::R16Unorm,
        TextureFormat::R16Float => wgpu::TextureFormat::R16Float,
        TextureFormat::Rg8Unorm => wgpu::TextureFormat::Rg8Unorm,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::R32Uint => wgpu::TextureFormat::R32Uint,
        TextureFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Rgba8Uint => wgpu::TextureFormat::Rgba8Uint,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        TextureFormat::Rgb10a2Unorm => wgpu::TextureFormat::Rgb10a2Unorm,
        TextureFormat::Rg11b10Float => wgpu::TextureFormat::Rg11b10Float,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
        TextureFormat::Rg32Uint => wgpu::TextureFormat::Rg32Uint,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::Rgba32Uint => wgpu::TextureFormat::Rgba32Uint,
        TextureFormat::Depth16Unorm => wgpu::TextureFormat::Depth16Unorm,
        TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

pub(crate) fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::empty();
    if usage.contains(TextureUsage::COPY_SRC) {
        out |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        out |= wgpu::TextureUsages::COPY_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::STORAGE_BINDING) {
        out |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        out |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    out
}

pub(crate) fn convert_texture_descriptor(
    descriptor: &TextureDescriptor,
) -> wgpu::TextureDescriptor<'_> {
    wgpu::TextureDescriptor {
        label: descriptor.label.as_deref(),
        size: wgpu::Extent3d {
            width: descriptor.size.width,
            height: descriptor.size.height,
            depth_or_array_layers: descriptor.size.depth.max(1),
        },
        mip_level_count: descriptor.mip_level_count,
        sample_count: descriptor.sample_count,
        dimension: wgpu::TextureDimension::D2,
        format: convert_texture_format(descriptor.format),
        usage: convert_texture_usage(descriptor.usage),
        view_formats: &[],
    }
}

/// Buffer usage, adjusted for wgpu's mapping rules.
///
/// Upload-heap buffers are written through `Queue::write_buffer` rather than
/// persistent mapping, so `MAP_WRITE` is dropped and `COPY_DST` added.
pub(crate) fn convert_buffer_descriptor(
    descriptor: &BufferDescriptor,
) -> wgpu::BufferDescriptor<'_> {
    let mut usage = wgpu::BufferUsages::empty();
    if descriptor.usage.contains(BufferUsage::VERTEX) {
        usage |= wgpu::BufferUsages::VERTEX;
    }
    if descriptor.usage.contains(BufferUsage::INDEX) {
        usage |= wgpu::BufferUsages::INDEX;
    }
    if descriptor.usage.contains(BufferUsage::UNIFORM) {
        usage |= wgpu::BufferUsages::UNIFORM;
    }
    if descriptor.usage.contains(BufferUsage::STORAGE) {
        usage |= wgpu::BufferUsages::STORAGE;
    }
    if descriptor.usage.contains(BufferUsage::COPY_SRC) {
        usage |= wgpu::BufferUsages::COPY_SRC;
    }
    if descriptor.usage.contains(BufferUsage::COPY_DST) {
        usage |= wgpu::BufferUsages::COPY_DST;
    }
    match descriptor.location {
        MemoryLocation::Upload => {
            usage |= wgpu::BufferUsages::COPY_DST;
        }
        MemoryLocation::Readback => {
            usage |= wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST;
        }
        MemoryLocation::GpuOnly => {}
    }

    wgpu::BufferDescriptor {
        label: descriptor.label.as_deref(),
        size: descriptor.size,
        usage,
        mapped_at_creation: false,
    }
}

fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        AddressMode::ClampToBorder => wgpu::AddressMode::ClampToBorder,
    }
}

fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn convert_compare_function(function: CompareFunction) -> wgpu::CompareFunction {
    match function {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

pub(crate) fn convert_sampler_descriptor(
    descriptor: &SamplerDescriptor,
) -> wgpu::SamplerDescriptor<'_> {
    wgpu::SamplerDescriptor {
        label: descriptor.label.as_deref(),
        address_mode_u: convert_address_mode(descriptor.address_mode_u),
        address_mode_v: convert_address_mode(descriptor.address_mode_v),
        address_mode_w: convert_address_mode(descriptor.address_mode_w),
        mag_filter: convert_filter_mode(descriptor.mag_filter),
        min_filter: convert_filter_mode(descriptor.min_filter),
        mipmap_filter: convert_filter_mode(descriptor.mipmap_filter),
        lod_min_clamp: descriptor.lod_min_clamp,
        lod_max_clamp: descriptor.lod_max_clamp,
        compare: descriptor.compare.map(convert_compare_function),
        anisotropy_clamp: descriptor.anisotropy_clamp,
        border_color: None,
    }
}

pub(crate) fn convert_topology(topology: PrimitiveTopology) -> wgpu::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
        PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
        PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

fn convert_vertex_format(format: VertexAttributeFormat) -> wgpu::VertexFormat {
    match format {
        VertexAttributeFormat::Float => wgpu::VertexFormat::Float32,
        VertexAttributeFormat::Float2 => wgpu::VertexFormat::Float32x2,
        VertexAttributeFormat::Float3 => wgpu::VertexFormat::Float32x3,
        VertexAttributeFormat::Float4 => wgpu::VertexFormat::Float32x4,
        VertexAttributeFormat::Uint4 => wgpu::VertexFormat::Uint32x4,
        VertexAttributeFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
    }
}

/// Flatten a vertex layout into per-buffer wgpu attribute lists.
///
/// Shader locations are assigned in attribute declaration order, matching
/// the input order the offline shader compiler emits. The caller assembles
/// the `wgpu::VertexBufferLayout`s so the attribute slices can be borrowed.
pub(crate) fn convert_vertex_attributes(layout: &VertexLayout) -> Vec<Vec<wgpu::VertexAttribute>> {
    let mut per_buffer: Vec<Vec<wgpu::VertexAttribute>> = vec![Vec::new(); layout.buffers.len()];
    for (location, attribute) in layout.attributes.iter().enumerate() {
        per_buffer[attribute.buffer_index as usize].push(wgpu::VertexAttribute {
            format: convert_vertex_format(attribute.format),
            offset: u64::from(attribute.offset),
            shader_location: location as u32,
        });
    }
    per_buffer
}

pub(crate) fn convert_step_mode(mode: VertexStepMode) -> wgpu::VertexStepMode {
    match mode {
        VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
        VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
    }
}

fn convert_blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
    }
}

fn convert_blend_operation(operation: BlendOperation) -> wgpu::BlendOperation {
    match operation {
        BlendOperation::Add => wgpu::BlendOperation::Add,
        BlendOperation::Subtract => wgpu::BlendOperation::Subtract,
        BlendOperation::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendOperation::Min => wgpu::BlendOperation::Min,
        BlendOperation::Max => wgpu::BlendOperation::Max,
    }
}

fn convert_blend_component(component: BlendComponent) -> wgpu::BlendComponent {
    wgpu::BlendComponent {
        src_factor: convert_blend_factor(component.src_factor),
        dst_factor: convert_blend_factor(component.dst_factor),
        operation: convert_blend_operation(component.operation),
    }
}

pub(crate) fn convert_blend_state(state: BlendState) -> wgpu::BlendState {
    wgpu::BlendState {
        color: convert_blend_component(state.color),
        alpha: convert_blend_component(state.alpha),
    }
}
