//! Core engine configuration
//!
//! Settings consumed at construction time by the shader compiler, the Vulkan
//! context and the logger.

pub mod config;

pub use config::{EngineConfig, RendererConfig, ShaderConfig};
