//! Conversions from engine types to Vulkan types.

use ash::vk;

use crate::binding::{RegisterKind, RootParameter, RootParameterKind};
use crate::mesh::{PrimitiveTopology, VertexAttributeFormat, VertexLayout};
use crate::pipeline_state::{BlendFactor, BlendOperation, BlendState};
use crate::state::ResourceState;
use crate::types::{
    AddressMode, BufferUsage, CompareFunction, FilterMode, MemoryLocation, SamplerDescriptor,
    TextureFormat, TextureUsage,
};

/// Shader register to Vulkan binding number.
///
/// Register kinds share a binding namespace per set in SPIR-V, so each kind
/// gets a fixed shift. Must match the `-fvk-*-shift` flags used when shaders
/// are compiled offline.
pub(crate) fn binding_shift(kind: RegisterKind) -> u32 {
    match kind {
        RegisterKind::ConstantBuffer => 0,
        RegisterKind::ShaderResource => 100,
        RegisterKind::UnorderedAccess => 200,
        RegisterKind::Sampler => 300,
    }
}

pub(crate) fn convert_texture_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8Unorm => vk::Format::R8_UNORM,
        TextureFormat::R8Uint => vk::Format::R8_UINT,
        TextureFormat::R16Unorm => vk::Format::R16_UNORM,
        TextureFormat::R16Float => vk::Format::R16_SFLOAT,
        TextureFormat::Rg8Unorm => vk::Format::R8G8_UNORM,
        TextureFormat::R32Float => vk::Format::R32_SFLOAT,
        TextureFormat::R32Uint => vk::Format::R32_UINT,
        TextureFormat::Rg16Float => vk::Format::R16G16_SFLOAT,
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Rgba8Uint => vk::Format::R8G8B8A8_UINT,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::Rgb10a2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        TextureFormat::Rg11b10Float => vk::Format::B10G11R11_UFLOAT_PACK32,
        TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::Rg32Float => vk::Format::R32G32_SFLOAT,
        TextureFormat::Rg32Uint => vk::Format::R32G32_UINT,
        TextureFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::Rgba32Uint => vk::Format::R32G32B32A32_UINT,
        TextureFormat::Depth16Unorm => vk::Format::D16_UNORM,
        TextureFormat::Depth24PlusStencil8 => vk::Format::D24_UNORM_S8_UINT,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
    }
}

pub(crate) fn aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth_stencil() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub(crate) fn convert_texture_usage(
    usage: TextureUsage,
    format: TextureFormat,
) -> vk::ImageUsageFlags {
    let mut out = vk::ImageUsageFlags::empty();
    if usage.contains(TextureUsage::COPY_SRC) {
        out |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        out |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        out |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::STORAGE_BINDING) {
        out |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        out |= if format.is_depth_stencil() {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::ImageUsageFlags::COLOR_ATTACHMENT
        };
    }
    out
}

pub(crate) fn convert_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut out = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::VERTEX) {
        out |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        out |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        out |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        out |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        out |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        out |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    out
}

pub(crate) fn convert_memory_location(
    location: MemoryLocation,
) -> gpu_allocator::MemoryLocation {
    match location {
        MemoryLocation::GpuOnly => gpu_allocator::MemoryLocation::GpuOnly,
        MemoryLocation::Upload => gpu_allocator::MemoryLocation::CpuToGpu,
        MemoryLocation::Readback => gpu_allocator::MemoryLocation::GpuToCpu,
    }
}

/// Image layout a resource state maps to.
///
/// `is_source` distinguishes the "from" side of a barrier: a resource leaving
/// [`ResourceState::Common`] has undefined contents, so the old layout is
/// `UNDEFINED` rather than `GENERAL` and the driver may discard.
pub(crate) fn image_layout(state: ResourceState, is_source: bool) -> vk::ImageLayout {
    match state {
        ResourceState::Common => {
            if is_source {
                vk::ImageLayout::UNDEFINED
            } else {
                vk::ImageLayout::GENERAL
            }
        }
        ResourceState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ResourceState::DepthWrite => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ResourceState::DepthRead => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ResourceState::ShaderResource => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ResourceState::UnorderedAccess => vk::ImageLayout::GENERAL,
        ResourceState::CopySource => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ResourceState::CopyDest => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ResourceState::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        ResourceState::VertexAndConstantBuffer | ResourceState::IndexBuffer => {
            vk::ImageLayout::GENERAL
        }
    }
}

pub(crate) fn access_mask(state: ResourceState) -> vk::AccessFlags {
    match state {
        ResourceState::Common => vk::AccessFlags::empty(),
        ResourceState::VertexAndConstantBuffer => {
            vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::UNIFORM_READ
        }
        ResourceState::IndexBuffer => vk::AccessFlags::INDEX_READ,
        ResourceState::RenderTarget => {
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        }
        ResourceState::UnorderedAccess => {
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
        }
        ResourceState::DepthWrite => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        ResourceState::DepthRead => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
        ResourceState::ShaderResource => vk::AccessFlags::SHADER_READ,
        ResourceState::CopySource => vk::AccessFlags::TRANSFER_READ,
        ResourceState::CopyDest => vk::AccessFlags::TRANSFER_WRITE,
        ResourceState::Present => vk::AccessFlags::empty(),
    }
}

pub(crate) fn pipeline_stage(state: ResourceState) -> vk::PipelineStageFlags {
    match state {
        ResourceState::Common | ResourceState::Present => vk::PipelineStageFlags::ALL_COMMANDS,
        ResourceState::VertexAndConstantBuffer | ResourceState::IndexBuffer => {
            vk::PipelineStageFlags::VERTEX_INPUT
        }
        ResourceState::RenderTarget => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ResourceState::DepthWrite | ResourceState::DepthRead => {
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
        }
        ResourceState::UnorderedAccess | ResourceState::ShaderResource => {
            vk::PipelineStageFlags::VERTEX_SHADER
                | vk::PipelineStageFlags::FRAGMENT_SHADER
                | vk::PipelineStageFlags::COMPUTE_SHADER
        }
        ResourceState::CopySource | ResourceState::CopyDest => vk::PipelineStageFlags::TRANSFER,
    }
}

fn convert_address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

fn convert_filter_mode(mode: FilterMode) -> vk::Filter {
    match mode {
        FilterMode::Nearest => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

fn convert_mipmap_mode(mode: FilterMode) -> vk::SamplerMipmapMode {
    match mode {
        FilterMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        FilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

fn convert_compare_function(function: CompareFunction) -> vk::CompareOp {
    match function {
        CompareFunction::Never => vk::CompareOp::NEVER,
        CompareFunction::Less => vk::CompareOp::LESS,
        CompareFunction::Equal => vk::CompareOp::EQUAL,
        CompareFunction::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareFunction::Greater => vk::CompareOp::GREATER,
        CompareFunction::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareFunction::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareFunction::Always => vk::CompareOp::ALWAYS,
    }
}

pub(crate) fn convert_sampler_descriptor(
    descriptor: &SamplerDescriptor,
) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .address_mode_u(convert_address_mode(descriptor.address_mode_u))
        .address_mode_v(convert_address_mode(descriptor.address_mode_v))
        .address_mode_w(convert_address_mode(descriptor.address_mode_w))
        .mag_filter(convert_filter_mode(descriptor.mag_filter))
        .min_filter(convert_filter_mode(descriptor.min_filter))
        .mipmap_mode(convert_mipmap_mode(descriptor.mipmap_filter))
        .min_lod(descriptor.lod_min_clamp)
        .max_lod(descriptor.lod_max_clamp)
        .compare_enable(descriptor.compare.is_some())
        .compare_op(
            descriptor
                .compare
                .map(convert_compare_function)
                .unwrap_or(vk::CompareOp::NEVER),
        )
        .anisotropy_enable(descriptor.anisotropy_clamp > 1)
        .max_anisotropy(f32::from(descriptor.anisotropy_clamp.max(1)))
}

pub(crate) fn convert_topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

fn convert_vertex_format(format: VertexAttributeFormat) -> vk::Format {
    match format {
        VertexAttributeFormat::Float => vk::Format::R32_SFLOAT,
        VertexAttributeFormat::Float2 => vk::Format::R32G32_SFLOAT,
        VertexAttributeFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
        VertexAttributeFormat::Float4 => vk::Format::R32G32B32A32_SFLOAT,
        VertexAttributeFormat::Uint4 => vk::Format::R32G32B32A32_UINT,
        VertexAttributeFormat::Unorm8x4 => vk::Format::R8G8B8A8_UNORM,
    }
}

/// Flatten a vertex layout into Vulkan binding and attribute descriptions.
///
/// Shader locations are assigned in attribute declaration order, matching
/// the input order the offline shader compiler emits.
pub(crate) fn convert_vertex_layout(
    layout: &VertexLayout,
) -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let bindings = layout
        .buffers
        .iter()
        .enumerate()
        .map(|(index, buffer)| vk::VertexInputBindingDescription {
            binding: index as u32,
            stride: buffer.stride,
            input_rate: match buffer.step_mode {
                crate::mesh::VertexStepMode::Vertex => vk::VertexInputRate::VERTEX,
                crate::mesh::VertexStepMode::Instance => vk::VertexInputRate::INSTANCE,
            },
        })
        .collect();

    let attributes = layout
        .attributes
        .iter()
        .enumerate()
        .map(|(location, attribute)| vk::VertexInputAttributeDescription {
            location: location as u32,
            binding: attribute.buffer_index,
            format: convert_vertex_format(attribute.format),
            offset: attribute.offset,
        })
        .collect();

    (bindings, attributes)
}

fn convert_blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
    }
}

fn convert_blend_operation(operation: BlendOperation) -> vk::BlendOp {
    match operation {
        BlendOperation::Add => vk::BlendOp::ADD,
        BlendOperation::Subtract => vk::BlendOp::SUBTRACT,
        BlendOperation::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOperation::Min => vk::BlendOp::MIN,
        BlendOperation::Max => vk::BlendOp::MAX,
    }
}

pub(crate) fn convert_blend_state(
    state: Option<BlendState>,
) -> vk::PipelineColorBlendAttachmentState {
    let mut out = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA);
    if let Some(state) = state {
        out = out
            .blend_enable(true)
            .src_color_blend_factor(convert_blend_factor(state.color.src_factor))
            .dst_color_blend_factor(convert_blend_factor(state.color.dst_factor))
            .color_blend_op(convert_blend_operation(state.color.operation))
            .src_alpha_blend_factor(convert_blend_factor(state.alpha.src_factor))
            .dst_alpha_blend_factor(convert_blend_factor(state.alpha.dst_factor))
            .alpha_blend_op(convert_blend_operation(state.alpha.operation));
    }
    out
}

/// Descriptor type a root parameter's set-layout binding uses.
///
/// Returns `None` for parameters that do not occupy a descriptor binding
/// (inline root constants).
// TODO: derive buffer-vs-image SRV types from SPIR-V reflection so
// StructuredBuffer registers get STORAGE_BUFFER layouts matching DXC output.
pub(crate) fn descriptor_type(parameter: &RootParameter) -> Option<vk::DescriptorType> {
    match &parameter.kind {
        RootParameterKind::Cbv => Some(vk::DescriptorType::UNIFORM_BUFFER),
        RootParameterKind::Srv => Some(vk::DescriptorType::SAMPLED_IMAGE),
        RootParameterKind::Uav => Some(vk::DescriptorType::STORAGE_IMAGE),
        RootParameterKind::Table { range_type, .. } => Some(match range_type {
            RegisterKind::ConstantBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            RegisterKind::ShaderResource => vk::DescriptorType::SAMPLED_IMAGE,
            RegisterKind::UnorderedAccess => vk::DescriptorType::STORAGE_IMAGE,
            RegisterKind::Sampler => vk::DescriptorType::SAMPLER,
        }),
        RootParameterKind::StaticSampler { .. } => Some(vk::DescriptorType::SAMPLER),
        RootParameterKind::Constants { .. } => None,
    }
}
