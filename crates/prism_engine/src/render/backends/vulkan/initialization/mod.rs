//! Vulkan initialization

/// Instance, device selection and logical device
pub mod context;
