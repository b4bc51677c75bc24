//! GPU meshes
//!
//! A [`Mesh`] references vertex and index buffers that already live on the
//! device; the buffers themselves are owned by the application. Geometry
//! generation is left to callers.

use ash::vk;

use crate::render::api::GpuBackend;

/// Interleaved vertex matching `VertexInputState::position_normal_uv`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
}

unsafe impl bytemuck::Pod for Vertex {}
unsafe impl bytemuck::Zeroable for Vertex {}

/// Index buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBinding {
    /// Buffer holding the indices
    pub buffer: vk::Buffer,
    /// Byte offset of the first index
    pub offset: vk::DeviceSize,
    /// Number of indices
    pub count: u32,
    /// Index width
    pub index_type: vk::IndexType,
}

/// Vertex buffers plus optional indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mesh {
    vertex_buffers: Vec<vk::Buffer>,
    vertex_offsets: Vec<vk::DeviceSize>,
    vertex_count: u32,
    indices: Option<IndexBinding>,
}

impl Mesh {
    /// Non-indexed mesh reading `vertex_count` vertices from one buffer
    pub fn new(vertex_buffer: vk::Buffer, vertex_count: u32) -> Self {
        Self {
            vertex_buffers: vec![vertex_buffer],
            vertex_offsets: vec![0],
            vertex_count,
            indices: None,
        }
    }

    /// Bind an additional vertex buffer on the next binding slot
    pub fn with_vertex_buffer(mut self, buffer: vk::Buffer, offset: vk::DeviceSize) -> Self {
        self.vertex_buffers.push(buffer);
        self.vertex_offsets.push(offset);
        self
    }

    /// Draw through an index buffer
    pub fn with_indices(mut self, buffer: vk::Buffer, count: u32, index_type: vk::IndexType) -> Self {
        self.indices = Some(IndexBinding { buffer, offset: 0, count, index_type });
        self
    }

    /// Vertex count
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Index binding, if indexed
    pub fn indices(&self) -> Option<&IndexBinding> {
        self.indices.as_ref()
    }

    /// Bind buffers and record the draw
    pub fn record_draw(&self, backend: &mut dyn GpuBackend, command_buffer: vk::CommandBuffer, instance_count: u32) {
        backend.cmd_bind_vertex_buffers(command_buffer, &self.vertex_buffers, &self.vertex_offsets);
        match &self.indices {
            Some(indices) => {
                backend.cmd_bind_index_buffer(command_buffer, indices.buffer, indices.offset, indices.index_type);
                backend.cmd_draw_indexed(command_buffer, indices.count, instance_count);
            }
            None => backend.cmd_draw(command_buffer, self.vertex_count, instance_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, RecordingBackend};
    use ash::vk::Handle;

    #[test]
    fn vertex_matches_default_layout_stride() {
        let layout = crate::render::api::VertexInputState::position_normal_uv();
        assert_eq!(std::mem::size_of::<Vertex>() as u32, layout.bindings[0].stride);
    }

    #[test]
    fn indexed_mesh_draws_indices() {
        let backend = RecordingBackend::new();
        let mut gpu = backend.clone();
        let cmd = vk::CommandBuffer::from_raw(9);
        let mesh = Mesh::new(vk::Buffer::from_raw(1), 24).with_indices(vk::Buffer::from_raw(2), 36, vk::IndexType::UINT16);

        mesh.record_draw(&mut gpu, cmd, 2);
        assert_eq!(
            backend.calls(),
            vec![
                Call::BindVertexBuffers(cmd),
                Call::BindIndexBuffer(cmd),
                Call::DrawIndexed { command_buffer: cmd, index_count: 36, instance_count: 2 },
            ]
        );
    }
}
