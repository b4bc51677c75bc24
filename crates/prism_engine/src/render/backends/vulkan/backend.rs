//! Vulkan implementation of [`GpuBackend`]

use std::sync::Arc;

use ash::{vk, Device};

use super::rendering::pipeline;
use super::resources::descriptor_set::{self, DescriptorPool};
use super::resources::memory::ResourceError;
use super::resources::sampler::{SamplerPreset, StandardSamplers};
use super::{CommandPool, VulkanContext, VulkanError, VulkanResult};
use crate::core::RendererConfig;
use crate::render::api::{
    BackendError, BackendResult, CommandBufferBegin, ComputePipelineDesc, DescriptorWrite,
    GpuBackend, GraphicsPipelineDesc, LayoutBinding,
};

fn backend_error(operation: &'static str) -> impl Fn(VulkanError) -> BackendError {
    move |error| match error {
        VulkanError::Api(result) => BackendError::vulkan(operation, result),
        other => BackendError::InvalidOperation { reason: format!("{operation}: {other}") },
    }
}

/// Device-backed [`GpuBackend`]
///
/// Owns the command and descriptor pools used by materials and components.
pub struct VulkanBackend {
    command_pool: CommandPool,
    descriptor_pool: DescriptorPool,
    samplers: StandardSamplers,
    context: Arc<VulkanContext>,
}

impl VulkanBackend {
    /// Create pools and samplers on `context`
    pub fn new(context: Arc<VulkanContext>, config: &RendererConfig) -> VulkanResult<Self> {
        let device = context.device().clone();
        let command_pool = CommandPool::new(device.clone(), context.queue_family(), context.queue())?;
        let descriptor_pool = DescriptorPool::new(device.clone(), config.max_descriptor_sets, config.descriptors_per_set)?;
        let anisotropy = context.physical_device().features.sampler_anisotropy == vk::TRUE;
        let samplers = StandardSamplers::new(device, anisotropy).map_err(|e| match e {
            ResourceError::Creation { result, .. } => VulkanError::Api(result),
            other => VulkanError::InitializationFailed(other.to_string()),
        })?;

        Ok(Self {
            command_pool,
            descriptor_pool,
            samplers,
            context,
        })
    }

    /// Shared device context
    pub fn context(&self) -> &Arc<VulkanContext> {
        &self.context
    }

    /// Pool used for single-use uploads and transitions
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Preset sampler handle
    pub fn sampler(&self, preset: SamplerPreset) -> vk::Sampler {
        self.samplers.get(preset)
    }

    /// Submit a recorded primary command buffer and wait for it
    pub fn submit_and_wait(&self, command_buffer: vk::CommandBuffer) -> BackendResult<()> {
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
        unsafe {
            self.device()
                .queue_submit(self.context.queue(), &[submit_info.build()], vk::Fence::null())
                .map_err(|result| BackendError::vulkan("vkQueueSubmit", result))?;
            self.device()
                .queue_wait_idle(self.context.queue())
                .map_err(|result| BackendError::vulkan("vkQueueWaitIdle", result))
        }
    }

    fn device(&self) -> &Device {
        self.context.device()
    }
}

impl GpuBackend for VulkanBackend {
    fn create_shader_module(&mut self, code: &[u32]) -> BackendResult<vk::ShaderModule> {
        log::debug!("[SHADER] Creating shader module from {} words", code.len());
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe { self.device().create_shader_module(&create_info, None) }
            .map_err(|result| BackendError::vulkan("vkCreateShaderModule", result))
    }

    fn destroy_shader_module(&mut self, module: vk::ShaderModule) {
        unsafe { self.device().destroy_shader_module(module, None) };
    }

    fn create_descriptor_set_layout(&mut self, bindings: &[LayoutBinding]) -> BackendResult<vk::DescriptorSetLayout> {
        descriptor_set::create_set_layout(self.device(), bindings)
            .map_err(backend_error("vkCreateDescriptorSetLayout"))
    }

    fn destroy_descriptor_set_layout(&mut self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device().destroy_descriptor_set_layout(layout, None) };
    }

    fn allocate_descriptor_set(&mut self, layout: vk::DescriptorSetLayout) -> BackendResult<vk::DescriptorSet> {
        self.descriptor_pool
            .allocate(layout)
            .map_err(backend_error("vkAllocateDescriptorSets"))
    }

    fn free_descriptor_set(&mut self, set: vk::DescriptorSet) {
        if let Err(e) = self.descriptor_pool.free(set) {
            log::warn!("[VULKAN] Failed to free descriptor set {:?}: {}", set, e);
        }
    }

    fn update_descriptor_set(&mut self, write: &DescriptorWrite) {
        descriptor_set::write_descriptor(self.device(), write);
    }

    fn create_pipeline_layout(
        &mut self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> BackendResult<vk::PipelineLayout> {
        pipeline::create_pipeline_layout(self.device(), set_layouts, push_constants)
            .map_err(backend_error("vkCreatePipelineLayout"))
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        unsafe { self.device().destroy_pipeline_layout(layout, None) };
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc<'_>) -> BackendResult<vk::Pipeline> {
        pipeline::create_graphics_pipeline(self.device(), desc)
            .map_err(backend_error("vkCreateGraphicsPipelines"))
    }

    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc<'_>) -> BackendResult<vk::Pipeline> {
        pipeline::create_compute_pipeline(self.device(), desc)
            .map_err(backend_error("vkCreateComputePipelines"))
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe { self.device().destroy_pipeline(pipeline, None) };
    }

    fn allocate_command_buffer(&mut self, level: vk::CommandBufferLevel) -> BackendResult<vk::CommandBuffer> {
        self.command_pool
            .allocate(level)
            .map_err(backend_error("vkAllocateCommandBuffers"))
    }

    fn free_command_buffer(&mut self, command_buffer: vk::CommandBuffer) {
        self.command_pool.free(&[command_buffer]);
    }

    fn begin_command_buffer(&mut self, command_buffer: vk::CommandBuffer, begin: &CommandBufferBegin) -> BackendResult<()> {
        let inheritance = begin.inheritance.map(|inheritance| {
            vk::CommandBufferInheritanceInfo::builder()
                .render_pass(inheritance.render_pass)
                .subpass(inheritance.subpass)
                .build()
        });

        let mut begin_info = vk::CommandBufferBeginInfo::builder().flags(begin.usage);
        if let Some(inheritance) = inheritance.as_ref() {
            begin_info = begin_info.inheritance_info(inheritance);
        }

        unsafe { self.device().begin_command_buffer(command_buffer, &begin_info) }
            .map_err(|result| BackendError::vulkan("vkBeginCommandBuffer", result))
    }

    fn end_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> BackendResult<()> {
        unsafe { self.device().end_command_buffer(command_buffer) }
            .map_err(|result| BackendError::vulkan("vkEndCommandBuffer", result))
    }

    fn cmd_bind_pipeline(&mut self, command_buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device().cmd_bind_pipeline(command_buffer, bind_point, pipeline) };
    }

    fn cmd_bind_descriptor_sets(
        &mut self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe { self.device().cmd_bind_descriptor_sets(command_buffer, bind_point, layout, first_set, sets, &[]) };
    }

    fn cmd_push_constants(
        &mut self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe { self.device().cmd_push_constants(command_buffer, layout, stages, offset, data) };
    }

    fn cmd_bind_vertex_buffers(&mut self, command_buffer: vk::CommandBuffer, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        unsafe { self.device().cmd_bind_vertex_buffers(command_buffer, 0, buffers, offsets) };
    }

    fn cmd_bind_index_buffer(&mut self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        unsafe { self.device().cmd_bind_index_buffer(command_buffer, buffer, offset, index_type) };
    }

    fn cmd_draw(&mut self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        unsafe { self.device().cmd_draw(command_buffer, vertex_count, instance_count, 0, 0) };
    }

    fn cmd_draw_indexed(&mut self, command_buffer: vk::CommandBuffer, index_count: u32, instance_count: u32) {
        unsafe { self.device().cmd_draw_indexed(command_buffer, index_count, instance_count, 0, 0, 0) };
    }

    fn cmd_dispatch(&mut self, command_buffer: vk::CommandBuffer, group_x: u32, group_y: u32, group_z: u32) {
        unsafe { self.device().cmd_dispatch(command_buffer, group_x, group_y, group_z) };
    }

    fn cmd_execute_commands(&mut self, command_buffer: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]) {
        unsafe { self.device().cmd_execute_commands(command_buffer, secondaries) };
    }
}
