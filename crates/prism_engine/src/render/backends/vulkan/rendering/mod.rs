//! Vulkan command recording and pipeline construction

/// Command pools and single-use submission
pub mod commands;
/// Graphics and compute pipeline creation
pub mod pipeline;
