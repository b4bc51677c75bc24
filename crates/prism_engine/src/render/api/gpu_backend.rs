//! GPU backend abstraction
//!
//! Materials, components and the frame recorder issue every device call through
//! [`GpuBackend`]. The Vulkan implementation lives in
//! `render::backends::vulkan::VulkanBackend`.

use ash::vk;
use thiserror::Error;

use super::pipeline_state::PipelineState;

/// Errors raised by backend operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// A Vulkan call returned an error code
    #[error("{operation} failed: {result:?}")]
    Vulkan {
        /// Name of the failing operation
        operation: &'static str,
        /// Result code returned by the driver
        result: vk::Result,
    },

    /// The operation is invalid in the current state
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },
}

impl BackendError {
    /// Wrap a Vulkan result code for `operation`
    pub fn vulkan(operation: &'static str, result: vk::Result) -> Self {
        Self::Vulkan { operation, result }
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// One binding of a descriptor-set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    /// Binding index inside the set
    pub binding: u32,
    /// Descriptor type
    pub descriptor_type: vk::DescriptorType,
    /// Array length (1 for non-arrayed resources)
    pub count: u32,
    /// Stages that access the binding
    pub stages: vk::ShaderStageFlags,
}

/// Resource referenced by a descriptor write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    /// Uniform or storage buffer range
    Buffer {
        /// Buffer handle
        buffer: vk::Buffer,
        /// Byte offset
        offset: vk::DeviceSize,
        /// Byte range
        range: vk::DeviceSize,
    },
    /// Sampled or storage image view
    Image {
        /// Image view handle
        view: vk::ImageView,
        /// Layout the image is in when accessed
        layout: vk::ImageLayout,
    },
    /// Image view paired with a sampler
    CombinedImageSampler {
        /// Image view handle
        view: vk::ImageView,
        /// Layout the image is in when accessed
        layout: vk::ImageLayout,
        /// Sampler handle
        sampler: vk::Sampler,
    },
    /// Standalone sampler
    Sampler(vk::Sampler),
    /// Uniform or storage texel buffer view
    TexelBuffer(vk::BufferView),
}

/// Single-slot descriptor update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    /// Destination set
    pub set: vk::DescriptorSet,
    /// Destination binding
    pub binding: u32,
    /// Descriptor type of the binding
    pub descriptor_type: vk::DescriptorType,
    /// Resource to write
    pub resource: DescriptorResource,
}

/// Compiled shader stage ready for pipeline creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStageDesc {
    /// Pipeline stage
    pub stage: vk::ShaderStageFlags,
    /// Shader module
    pub module: vk::ShaderModule,
    /// Entry point name
    pub entry_point: String,
}

/// Graphics pipeline description
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
    /// Render pass the pipeline is compatible with
    pub render_pass: vk::RenderPass,
    /// Subpass index
    pub subpass: u32,
    /// Programmable stages
    pub stages: &'a [ShaderStageDesc],
    /// Fixed-function state
    pub state: &'a PipelineState,
}

/// Compute pipeline description
#[derive(Debug, Clone, Copy)]
pub struct ComputePipelineDesc<'a> {
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
    /// Compute stage
    pub stage: &'a ShaderStageDesc,
}

/// Render pass a secondary command buffer continues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Inheritance {
    /// Render pass, or null when the buffer executes outside a render pass
    pub render_pass: vk::RenderPass,
    /// Subpass index
    pub subpass: u32,
}

/// Options for beginning a command buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandBufferBegin {
    /// Usage flags
    pub usage: vk::CommandBufferUsageFlags,
    /// Inheritance info; required for secondary command buffers
    pub inheritance: Option<Inheritance>,
}

impl CommandBufferBegin {
    /// Reusable secondary buffer executed outside a render pass
    pub fn secondary() -> Self {
        Self {
            usage: vk::CommandBufferUsageFlags::SIMULTANEOUS_USE,
            inheritance: Some(Inheritance::default()),
        }
    }

    /// Primary buffer recorded once and submitted once
    pub fn one_time() -> Self {
        Self {
            usage: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            inheritance: None,
        }
    }
}

/// Device operations used by materials, components and frame recording
pub trait GpuBackend {
    /// Create a shader module from SPIR-V words
    fn create_shader_module(&mut self, code: &[u32]) -> BackendResult<vk::ShaderModule>;
    /// Destroy a shader module
    fn destroy_shader_module(&mut self, module: vk::ShaderModule);

    /// Create a descriptor-set layout
    fn create_descriptor_set_layout(&mut self, bindings: &[LayoutBinding]) -> BackendResult<vk::DescriptorSetLayout>;
    /// Destroy a descriptor-set layout
    fn destroy_descriptor_set_layout(&mut self, layout: vk::DescriptorSetLayout);
    /// Allocate one descriptor set with `layout`
    fn allocate_descriptor_set(&mut self, layout: vk::DescriptorSetLayout) -> BackendResult<vk::DescriptorSet>;
    /// Return a descriptor set to its pool
    fn free_descriptor_set(&mut self, set: vk::DescriptorSet);
    /// Write one descriptor slot
    fn update_descriptor_set(&mut self, write: &DescriptorWrite);

    /// Create a pipeline layout
    fn create_pipeline_layout(
        &mut self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> BackendResult<vk::PipelineLayout>;
    /// Destroy a pipeline layout
    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout);
    /// Create a graphics pipeline
    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc<'_>) -> BackendResult<vk::Pipeline>;
    /// Create a compute pipeline
    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc<'_>) -> BackendResult<vk::Pipeline>;
    /// Destroy a pipeline
    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline);

    /// Allocate a command buffer from the backend's pool
    fn allocate_command_buffer(&mut self, level: vk::CommandBufferLevel) -> BackendResult<vk::CommandBuffer>;
    /// Free a command buffer
    fn free_command_buffer(&mut self, command_buffer: vk::CommandBuffer);
    /// Begin recording
    fn begin_command_buffer(&mut self, command_buffer: vk::CommandBuffer, begin: &CommandBufferBegin) -> BackendResult<()>;
    /// Finish recording
    fn end_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> BackendResult<()>;

    /// Bind a pipeline
    fn cmd_bind_pipeline(&mut self, command_buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);
    /// Bind descriptor sets starting at `first_set`
    fn cmd_bind_descriptor_sets(
        &mut self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );
    /// Update push constants
    fn cmd_push_constants(
        &mut self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    /// Bind vertex buffers starting at binding 0
    fn cmd_bind_vertex_buffers(&mut self, command_buffer: vk::CommandBuffer, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]);
    /// Bind an index buffer
    fn cmd_bind_index_buffer(&mut self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType);
    /// Non-indexed draw
    fn cmd_draw(&mut self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32);
    /// Indexed draw
    fn cmd_draw_indexed(&mut self, command_buffer: vk::CommandBuffer, index_count: u32, instance_count: u32);
    /// Compute dispatch in work groups
    fn cmd_dispatch(&mut self, command_buffer: vk::CommandBuffer, group_x: u32, group_y: u32, group_z: u32);
    /// Execute secondary command buffers from a primary one
    fn cmd_execute_commands(&mut self, command_buffer: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]);
}
