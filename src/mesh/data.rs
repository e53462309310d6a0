//! Mesh definition with vertex/index buffers.

use std::sync::Arc;

use bytemuck::Pod;

use crate::error::GraphicsError;
use crate::memory::MemoryManager;
use crate::resources::Buffer;
use crate::types::{BufferDescriptor, BufferUsage};

use super::layout::VertexLayout;

/// How vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Each vertex is a point.
    PointList,
    /// Every two vertices form a line.
    LineList,
    /// Every three vertices form a triangle.
    #[default]
    TriangleList,
    /// Each vertex after the second extends the strip by one triangle.
    TriangleStrip,
}

/// A GPU mesh: vertex buffers, an optional 32-bit index buffer, and the
/// shared layout describing them.
///
/// Construct one from POD vertex slices with [`Mesh::from_vertices`], or
/// from prebuilt buffers with [`Mesh::new`] when the data is streamed in
/// some other way.
pub struct Mesh {
    layout: Arc<VertexLayout>,
    topology: PrimitiveTopology,
    vertex_buffers: Vec<Arc<Buffer>>,
    vertex_count: u32,
    index_buffer: Option<Arc<Buffer>>,
    index_count: u32,
    label: Option<String>,
}

impl Mesh {
    /// Create a mesh from prebuilt buffers.
    ///
    /// # Panics
    ///
    /// Panics if the buffer count does not match the layout's slot count.
    pub fn new(
        layout: Arc<VertexLayout>,
        topology: PrimitiveTopology,
        vertex_buffers: Vec<Arc<Buffer>>,
        vertex_count: u32,
        index_buffer: Option<Arc<Buffer>>,
        index_count: u32,
        label: Option<String>,
    ) -> Self {
        assert_eq!(
            vertex_buffers.len(),
            layout.buffer_count(),
            "mesh buffer count must match layout buffer count"
        );
        Self {
            layout,
            topology,
            vertex_buffers,
            vertex_count,
            index_buffer,
            index_count,
            label,
        }
    }

    /// Create a single-buffer mesh from a POD vertex slice, uploading the
    /// data through the memory manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout is invalid, the vertex type's size
    /// does not match the layout stride, or allocation fails.
    pub fn from_vertices<V: Pod>(
        memory: &mut MemoryManager,
        layout: Arc<VertexLayout>,
        topology: PrimitiveTopology,
        vertices: &[V],
        indices: Option<&[u32]>,
        label: Option<&str>,
    ) -> Result<Self, GraphicsError> {
        layout
            .validate()
            .map_err(GraphicsError::InvalidParameter)?;
        if layout.buffer_count() != 1 {
            return Err(GraphicsError::InvalidParameter(format!(
                "from_vertices needs a single-buffer layout, got {} buffers",
                layout.buffer_count()
            )));
        }
        let stride = layout.buffer_stride(0) as usize;
        if std::mem::size_of::<V>() != stride {
            return Err(GraphicsError::InvalidParameter(format!(
                "vertex type is {} bytes but layout stride is {stride}",
                std::mem::size_of::<V>()
            )));
        }
        if vertices.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "mesh needs at least one vertex".to_string(),
            ));
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let mut vertex_desc =
            BufferDescriptor::upload(vertex_bytes.len() as u64, BufferUsage::VERTEX);
        if let Some(label) = label {
            vertex_desc = vertex_desc.with_label(format!("{label}_vb"));
        }
        let vertex_buffer = memory.allocate_buffer(&vertex_desc)?;
        memory.upload_buffer_data(&vertex_buffer, 0, vertex_bytes)?;

        let (index_buffer, index_count) = match indices {
            Some(indices) if !indices.is_empty() => {
                let index_bytes: &[u8] = bytemuck::cast_slice(indices);
                let mut index_desc =
                    BufferDescriptor::upload(index_bytes.len() as u64, BufferUsage::INDEX);
                if let Some(label) = label {
                    index_desc = index_desc.with_label(format!("{label}_ib"));
                }
                let buffer = memory.allocate_buffer(&index_desc)?;
                memory.upload_buffer_data(&buffer, 0, index_bytes)?;
                (Some(buffer), indices.len() as u32)
            }
            _ => (None, 0),
        };

        Ok(Self::new(
            layout,
            topology,
            vec![vertex_buffer],
            vertices.len() as u32,
            index_buffer,
            index_count,
            label.map(String::from),
        ))
    }

    /// The vertex layout.
    pub fn layout(&self) -> &Arc<VertexLayout> {
        &self.layout
    }

    /// The primitive topology.
    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    /// A vertex buffer by slot index.
    pub fn vertex_buffer(&self, index: usize) -> Option<&Arc<Buffer>> {
        self.vertex_buffers.get(index)
    }

    /// All vertex buffers, by slot.
    pub fn vertex_buffers(&self) -> &[Arc<Buffer>] {
        &self.vertex_buffers
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// The index buffer, if indexed.
    pub fn index_buffer(&self) -> Option<&Arc<Buffer>> {
        self.index_buffer.as_ref()
    }

    /// Number of indices.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Check if this mesh draws indexed.
    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    /// The mesh label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Number of primitives drawn, from topology and vertex/index count.
    pub fn primitive_count(&self) -> u32 {
        let count = if self.is_indexed() {
            self.index_count
        } else {
            self.vertex_count
        };
        match self.topology {
            PrimitiveTopology::PointList => count,
            PrimitiveTopology::LineList => count / 2,
            PrimitiveTopology::TriangleList => count / 3,
            PrimitiveTopology::TriangleStrip => count.saturating_sub(2),
        }
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("label", &self.label)
            .field("topology", &self.topology)
            .field("vertex_count", &self.vertex_count)
            .field("index_count", &self.index_count)
            .field("layout", &self.layout.label)
            .finish()
    }
}

// Ensure Mesh is Send + Sync
static_assertions::assert_impl_all!(Mesh: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::GraphicsInstance;

    #[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct TestVertex {
        position: [f32; 3],
        normal: [f32; 3],
        uv: [f32; 2],
    }

    fn test_memory() -> MemoryManager {
        let instance = GraphicsInstance::new().unwrap();
        MemoryManager::new(instance.create_device().unwrap())
    }

    fn quad_vertices() -> Vec<TestVertex> {
        (0..4)
            .map(|i| TestVertex {
                position: [i as f32, 0.0, 0.0],
                normal: [0.0, 0.0, 1.0],
                uv: [0.0, 0.0],
            })
            .collect()
    }

    #[test]
    fn test_mesh_from_vertices() {
        let mut memory = test_memory();
        let mesh = Mesh::from_vertices(
            &mut memory,
            VertexLayout::position_normal_uv(),
            PrimitiveTopology::TriangleList,
            &quad_vertices(),
            Some(&[0u32, 1, 2, 2, 1, 3]),
            Some("quad"),
        )
        .unwrap();

        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.index_count(), 6);
        assert!(mesh.is_indexed());
        assert_eq!(mesh.primitive_count(), 2);
        assert_eq!(mesh.label(), Some("quad"));
    }

    #[test]
    fn test_mesh_rejects_stride_mismatch() {
        let mut memory = test_memory();
        // position_only expects 12-byte vertices; TestVertex is 32 bytes.
        let result = Mesh::from_vertices(
            &mut memory,
            VertexLayout::position_only(),
            PrimitiveTopology::TriangleList,
            &quad_vertices(),
            None,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_mesh_rejects_empty_vertices() {
        let mut memory = test_memory();
        let vertices: Vec<TestVertex> = Vec::new();
        let result = Mesh::from_vertices(
            &mut memory,
            VertexLayout::position_normal_uv(),
            PrimitiveTopology::TriangleList,
            &vertices,
            None,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_non_indexed_primitive_count() {
        let mut memory = test_memory();
        let mesh = Mesh::from_vertices(
            &mut memory,
            VertexLayout::position_normal_uv(),
            PrimitiveTopology::TriangleStrip,
            &quad_vertices(),
            None,
            None,
        )
        .unwrap();
        assert_eq!(mesh.primitive_count(), 2);
    }
}
