//! Engine-wide error type
//!
//! Subsystems keep their own error enums; [`EngineError`] collects them for
//! applications that want a single `?` target.

use thiserror::Error;

use crate::config::ConfigError;
use crate::render::api::BackendError;
use crate::render::backends::vulkan::{ResourceError, VulkanError};
use crate::render::material::MaterialError;
use crate::render::shader::{CompileError, ReflectionError, ShaderError};
use crate::scene::SceneError;

/// Any engine failure
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Vulkan initialization or API failure
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// GPU resource creation failed
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// The external shader compiler failed
    #[error("Shader compile error: {0}")]
    Compile(#[from] CompileError),

    /// A SPIR-V binary could not be reflected
    #[error("Shader reflection error: {0}")]
    Reflection(#[from] ReflectionError),

    /// Shader loading failed
    #[error("Shader error: {0}")]
    Shader(#[from] ShaderError),

    /// Material failure
    #[error("Material error: {0}")]
    Material(#[from] MaterialError),

    /// Scene failure
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Device call failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
