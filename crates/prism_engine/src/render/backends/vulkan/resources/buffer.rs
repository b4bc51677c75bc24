//! Vulkan buffers and buffer views

use ash::{vk, Device};

use super::memory::{aligned_flush_range, allocate_and_bind, ResourceError, ResourceResult};
use crate::render::api::DescriptorResource;
use crate::render::backends::vulkan::{CommandPool, VulkanContext};

/// Buffer with dedicated memory
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    allocation_size: vk::DeviceSize,
    properties: vk::MemoryPropertyFlags,
    non_coherent_atom_size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and bind memory with `properties` to it
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> ResourceResult<Self> {
        let device = context.device().clone();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None) }
            .map_err(|result| ResourceError::Creation { kind: "buffer", result })?;

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory = match allocate_and_bind(
            &device,
            &context.physical_device().memory_properties,
            requirements,
            properties,
            "buffer",
            |memory| unsafe { device.bind_buffer_memory(buffer, memory, 0) },
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                log::error!("[RESOURCE] Buffer of {} bytes rolled back: {}", size, e);
                return Err(e);
            }
        };

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            allocation_size: requirements.size,
            properties,
            non_coherent_atom_size: context.limits().non_coherent_atom_size,
        })
    }

    /// Create a host-visible buffer and fill it with `data`
    pub fn with_data(context: &VulkanContext, data: &[u8], usage: vk::BufferUsageFlags) -> ResourceResult<Self> {
        let buffer = Self::new(
            context,
            data.len() as vk::DeviceSize,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.upload(data, 0)?;
        Ok(buffer)
    }

    /// Copy `data` into host-visible memory at `offset`
    ///
    /// Non-coherent memory is flushed over the written range expanded to the
    /// device's atom size.
    pub fn upload(&self, data: &[u8], offset: vk::DeviceSize) -> ResourceResult<()> {
        let size = data.len() as vk::DeviceSize;
        if offset + size > self.size {
            return Err(ResourceError::OutOfBounds { size, offset, capacity: self.size });
        }
        if !self.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(ResourceError::Map { kind: "buffer", result: vk::Result::ERROR_MEMORY_MAP_FAILED });
        }

        unsafe {
            let ptr = self.device
                .map_memory(self.memory, offset, size, vk::MemoryMapFlags::empty())
                .map_err(|result| ResourceError::Map { kind: "buffer", result })?
                .cast::<u8>();
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());

            if !self.properties.contains(vk::MemoryPropertyFlags::HOST_COHERENT) {
                let (flush_offset, flush_size) =
                    aligned_flush_range(offset, size, self.non_coherent_atom_size, self.allocation_size);
                let range = vk::MappedMemoryRange::builder()
                    .memory(self.memory)
                    .offset(flush_offset)
                    .size(flush_size);
                if let Err(result) = self.device.flush_mapped_memory_ranges(&[range.build()]) {
                    self.device.unmap_memory(self.memory);
                    return Err(ResourceError::Map { kind: "buffer", result });
                }
            }

            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Copy `size` bytes into `destination` on the GPU, waiting for completion
    pub fn copy_to(&self, pool: &CommandPool, destination: &Buffer, size: vk::DeviceSize) -> ResourceResult<()> {
        let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size };
        pool.submit_single(|device, command_buffer| unsafe {
            device.cmd_copy_buffer(command_buffer, self.buffer, destination.buffer, &[region]);
        })?;
        Ok(())
    }

    /// Create a typed view for texel-buffer descriptors
    pub fn create_view(&self, format: vk::Format) -> ResourceResult<BufferView> {
        let view_info = vk::BufferViewCreateInfo::builder()
            .buffer(self.buffer)
            .format(format)
            .offset(0)
            .range(vk::WHOLE_SIZE);

        let view = unsafe { self.device.create_buffer_view(&view_info, None) }
            .map_err(|result| ResourceError::Creation { kind: "buffer view", result })?;

        Ok(BufferView { device: self.device.clone(), view, format })
    }

    /// Descriptor covering the whole buffer
    pub fn descriptor(&self) -> DescriptorResource {
        DescriptorResource::Buffer { buffer: self.buffer, offset: 0, range: self.size }
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Requested size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Typed view over a buffer
pub struct BufferView {
    device: Device,
    view: vk::BufferView,
    format: vk::Format,
}

impl BufferView {
    /// View handle
    pub fn handle(&self) -> vk::BufferView {
        self.view
    }

    /// Texel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Descriptor for this view
    pub fn descriptor(&self) -> DescriptorResource {
        DescriptorResource::TexelBuffer(self.view)
    }
}

impl Drop for BufferView {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer_view(self.view, None);
        }
    }
}
