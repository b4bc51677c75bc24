//! Backend-agnostic rendering interface
//!
//! Describes device work in plain data so higher layers never touch a
//! `vk::Device` directly.

pub mod gpu_backend;
pub mod pipeline_state;

pub use gpu_backend::{
    BackendError, BackendResult, CommandBufferBegin, ComputePipelineDesc, DescriptorResource,
    DescriptorWrite, GpuBackend, GraphicsPipelineDesc, Inheritance, LayoutBinding, ShaderStageDesc,
};
pub use pipeline_state::{
    ColorBlendState, DepthBias, DepthStencilState, InputAssemblyState, PipelineState,
    RasterizationState, VertexInputState,
};
