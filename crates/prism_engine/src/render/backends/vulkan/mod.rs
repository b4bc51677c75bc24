//! Vulkan backend implementation
//!
//! Organized into initialization, resources and rendering modules, plus the
//! [`VulkanBackend`] that implements the engine's GPU seam.

/// Vulkan initialization types (instance, device, context)
pub mod initialization;

/// Vulkan resource management (memory, buffers, images, samplers, descriptors)
pub mod resources;

/// Vulkan rendering operations (commands, pipelines)
pub mod rendering;

/// `GpuBackend` implementation
pub mod backend;

pub use backend::VulkanBackend;

pub use initialization::context::{LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanInstance, VulkanResult};

pub use resources::buffer::{Buffer, BufferView};
pub use resources::descriptor_set::DescriptorPool;
pub use resources::image::{Image, ImageDesc};
pub use resources::memory::{ResourceError, ResourceResult};
pub use resources::sampler::{SamplerPreset, StandardSamplers};

pub use rendering::commands::CommandPool;
