//! Command buffer management
//!
//! Command pool wrapper plus the single-use submit path used by uploads and
//! layout transitions that have no ambient command buffer to record into.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
}

impl CommandPool {
    /// Create a new command pool submitting to `queue`
    pub fn new(device: Device, queue_family_index: u32, queue: vk::Queue) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device.create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            command_pool,
            queue,
        })
    }

    /// Allocate one command buffer at `level`
    pub fn allocate(&self, level: vk::CommandBufferLevel) -> VulkanResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(level)
            .command_buffer_count(1);

        let command_buffers = unsafe {
            self.device.allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        command_buffers.into_iter().next().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "Driver returned no command buffer".to_string(),
        })
    }

    /// Return command buffers to the pool
    pub fn free(&self, command_buffers: &[vk::CommandBuffer]) {
        unsafe {
            self.device.free_command_buffers(self.command_pool, command_buffers);
        }
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Queue that single-use buffers are submitted to
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Record `record` into a fresh primary buffer, submit it and wait for the queue
    ///
    /// Blocks the calling thread until the device has finished the work.
    pub fn submit_single<R>(
        &self,
        record: impl FnOnce(&Device, vk::CommandBuffer) -> R,
    ) -> VulkanResult<R> {
        let command_buffer = self.allocate(vk::CommandBufferLevel::PRIMARY)?;
        let result = self.record_and_submit(command_buffer, record);
        self.free(&[command_buffer]);
        result
    }

    fn record_and_submit<R>(
        &self,
        command_buffer: vk::CommandBuffer,
        record: impl FnOnce(&Device, vk::CommandBuffer) -> R,
    ) -> VulkanResult<R> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device.begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        let output = record(&self.device, command_buffer);

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
        unsafe {
            self.device.end_command_buffer(command_buffer)
                .map_err(VulkanError::Api)?;
            self.device.queue_submit(self.queue, &[submit_info.build()], vk::Fence::null())
                .map_err(VulkanError::Api)?;
            self.device.queue_wait_idle(self.queue)
                .map_err(VulkanError::Api)?;
        }

        Ok(output)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Destroying the pool frees every buffer allocated from it
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
