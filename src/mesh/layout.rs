//! Vertex layout definitions.
//!
//! A layout describes vertex data across one or more buffer slots; each
//! attribute names the slot it reads from. Layouts are shared via `Arc` so
//! pipeline grouping can compare pointers instead of contents.

use std::sync::Arc;

/// Semantic meaning of a vertex attribute, matched against shader inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeSemantic {
    /// Vertex position (typically float3).
    Position,
    /// Vertex normal (typically float3).
    Normal,
    /// Vertex tangent (typically float4, w = handedness).
    Tangent,
    /// Texture coordinates (typically float2).
    TexCoord0,
    /// Vertex color (typically float4).
    Color,
}

/// Data format of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeFormat {
    /// Single 32-bit float.
    Float,
    /// Two 32-bit floats.
    Float2,
    /// Three 32-bit floats.
    Float3,
    /// Four 32-bit floats.
    Float4,
    /// Four 32-bit unsigned integers.
    Uint4,
    /// Four 8-bit unsigned integers, normalized.
    Unorm8x4,
}

impl VertexAttributeFormat {
    /// Size in bytes of this format.
    pub fn size(&self) -> u32 {
        match self {
            Self::Float => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
            Self::Uint4 => 16,
            Self::Unorm8x4 => 4,
        }
    }
}

/// How a vertex buffer advances: per-vertex or per-instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    /// Buffer advances once per vertex.
    #[default]
    Vertex,
    /// Buffer advances once per instance.
    Instance,
}

/// A single vertex buffer binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    /// Stride in bytes between consecutive elements.
    pub stride: u32,
    /// How the buffer advances.
    pub step_mode: VertexStepMode,
}

impl VertexBufferLayout {
    /// Create a per-vertex buffer layout with the given stride.
    pub fn new(stride: u32) -> Self {
        Self {
            stride,
            step_mode: VertexStepMode::Vertex,
        }
    }

    /// Create a per-instance buffer layout.
    pub fn per_instance(stride: u32) -> Self {
        Self {
            stride,
            step_mode: VertexStepMode::Instance,
        }
    }
}

/// A single vertex attribute description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Semantic meaning.
    pub semantic: VertexAttributeSemantic,
    /// Data format.
    pub format: VertexAttributeFormat,
    /// Byte offset within the vertex.
    pub offset: u32,
    /// Index of the buffer slot this attribute reads from.
    pub buffer_index: u32,
}

impl VertexAttribute {
    /// Create a new vertex attribute at buffer slot 0.
    pub fn new(semantic: VertexAttributeSemantic, format: VertexAttributeFormat, offset: u32) -> Self {
        Self {
            semantic,
            format,
            offset,
            buffer_index: 0,
        }
    }

    /// Position attribute (float3).
    pub fn position(offset: u32) -> Self {
        Self::new(VertexAttributeSemantic::Position, VertexAttributeFormat::Float3, offset)
    }

    /// Normal attribute (float3).
    pub fn normal(offset: u32) -> Self {
        Self::new(VertexAttributeSemantic::Normal, VertexAttributeFormat::Float3, offset)
    }

    /// Tangent attribute (float4).
    pub fn tangent(offset: u32) -> Self {
        Self::new(VertexAttributeSemantic::Tangent, VertexAttributeFormat::Float4, offset)
    }

    /// Texcoord attribute (float2).
    pub fn texcoord0(offset: u32) -> Self {
        Self::new(VertexAttributeSemantic::TexCoord0, VertexAttributeFormat::Float2, offset)
    }

    /// Color attribute (float4).
    pub fn color(offset: u32) -> Self {
        Self::new(VertexAttributeSemantic::Color, VertexAttributeFormat::Float4, offset)
    }

    /// Move the attribute to another buffer slot.
    pub fn at_buffer(mut self, buffer_index: u32) -> Self {
        self.buffer_index = buffer_index;
        self
    }
}

/// The layout of vertex data across one or more buffer slots.
///
/// # Example
///
/// ```ignore
/// let layout = Arc::new(
///     VertexLayout::new()
///         .with_buffer(VertexBufferLayout::new(32))
///         .with_attribute(VertexAttribute::position(0))
///         .with_attribute(VertexAttribute::normal(12))
///         .with_attribute(VertexAttribute::texcoord0(24)),
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    /// Buffer slot descriptions.
    pub buffers: Vec<VertexBufferLayout>,
    /// Attributes, each referencing a buffer slot.
    pub attributes: Vec<VertexAttribute>,
    /// Optional label for debugging.
    pub label: Option<String>,
}

impl VertexLayout {
    /// Create an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex buffer slot.
    pub fn with_buffer(mut self, buffer: VertexBufferLayout) -> Self {
        self.buffers.push(buffer);
        self
    }

    /// Add a vertex attribute.
    pub fn with_attribute(mut self, attribute: VertexAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Set a debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Number of buffer slots.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Stride of a buffer slot, zero if absent.
    pub fn buffer_stride(&self, buffer_index: usize) -> u32 {
        self.buffers
            .get(buffer_index)
            .map(|b| b.stride)
            .unwrap_or(0)
    }

    /// Check if the layout carries a semantic.
    pub fn has_semantic(&self, semantic: VertexAttributeSemantic) -> bool {
        self.attributes.iter().any(|a| a.semantic == semantic)
    }

    /// Attributes reading from a buffer slot.
    pub fn attributes_for_buffer(&self, buffer_index: u32) -> impl Iterator<Item = &VertexAttribute> {
        self.attributes
            .iter()
            .filter(move |a| a.buffer_index == buffer_index)
    }

    /// Validate that every attribute references an existing buffer slot and
    /// fits inside its stride.
    pub fn validate(&self) -> Result<(), String> {
        for attribute in &self.attributes {
            let Some(buffer) = self.buffers.get(attribute.buffer_index as usize) else {
                return Err(format!(
                    "attribute {:?} references buffer {} but only {} buffers defined",
                    attribute.semantic,
                    attribute.buffer_index,
                    self.buffers.len()
                ));
            };
            if attribute.offset + attribute.format.size() > buffer.stride {
                return Err(format!(
                    "attribute {:?} at offset {} overruns buffer stride {}",
                    attribute.semantic, attribute.offset, buffer.stride
                ));
            }
        }
        Ok(())
    }

    /// Position-only layout (12 bytes per vertex).
    pub fn position_only() -> Arc<Self> {
        Arc::new(
            Self::new()
                .with_buffer(VertexBufferLayout::new(12))
                .with_attribute(VertexAttribute::position(0))
                .with_label("position_only"),
        )
    }

    /// Position + texcoord layout (20 bytes per vertex), used by fullscreen
    /// geometry.
    pub fn position_uv() -> Arc<Self> {
        Arc::new(
            Self::new()
                .with_buffer(VertexBufferLayout::new(20))
                .with_attribute(VertexAttribute::position(0))
                .with_attribute(VertexAttribute::texcoord0(12))
                .with_label("position_uv"),
        )
    }

    /// Position + normal + texcoord layout (32 bytes per vertex), the
    /// G-buffer mesh layout.
    pub fn position_normal_uv() -> Arc<Self> {
        Arc::new(
            Self::new()
                .with_buffer(VertexBufferLayout::new(32))
                .with_attribute(VertexAttribute::position(0))
                .with_attribute(VertexAttribute::normal(12))
                .with_attribute(VertexAttribute::texcoord0(24))
                .with_label("position_normal_uv"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sizes() {
        assert_eq!(VertexAttributeFormat::Float.size(), 4);
        assert_eq!(VertexAttributeFormat::Float3.size(), 12);
        assert_eq!(VertexAttributeFormat::Unorm8x4.size(), 4);
    }

    #[test]
    fn test_single_buffer_layout() {
        let layout = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(24))
            .with_attribute(VertexAttribute::position(0))
            .with_attribute(VertexAttribute::normal(12));

        assert_eq!(layout.buffer_count(), 1);
        assert_eq!(layout.buffer_stride(0), 24);
        assert!(layout.has_semantic(VertexAttributeSemantic::Position));
        assert!(!layout.has_semantic(VertexAttributeSemantic::TexCoord0));
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_multi_buffer_layout() {
        let layout = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(8))
            .with_buffer(VertexBufferLayout::new(24))
            .with_attribute(VertexAttribute::texcoord0(0).at_buffer(0))
            .with_attribute(VertexAttribute::position(0).at_buffer(1))
            .with_attribute(VertexAttribute::normal(12).at_buffer(1));

        assert!(layout.validate().is_ok());
        assert_eq!(layout.attributes_for_buffer(1).count(), 2);
    }

    #[test]
    fn test_validation_rejects_missing_buffer() {
        let layout = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(12))
            .with_attribute(VertexAttribute::position(0).at_buffer(5));
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_stride_overrun() {
        let layout = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(12))
            .with_attribute(VertexAttribute::normal(8));
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_common_layouts() {
        let layout = VertexLayout::position_normal_uv();
        assert_eq!(layout.buffer_stride(0), 32);
        assert_eq!(layout.attributes.len(), 3);
    }
}
