//! Vulkan resource management

/// Memory allocation and resource errors
pub mod memory;
/// Buffers and buffer views
pub mod buffer;
/// Images, layout transitions and mip generation
pub mod image;
/// Sampler presets
pub mod sampler;
/// Descriptor pools, layouts and writes
pub mod descriptor_set;
