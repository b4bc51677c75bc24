//! Engine configuration sections
//!
//! `ShaderConfig` is handed to the shader compiler and to source path
//! resolution; nothing in the engine reads include paths from global state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigError};

/// Shader compilation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Directories searched, in order, when a shader file is not found relative to the working directory
    pub include_paths: Vec<PathBuf>,
    /// External compiler executable
    pub compiler: PathBuf,
    /// Entry point name used for every stage
    pub entry_point: String,
    /// Treat every source as HLSL regardless of extension
    pub hlsl: bool,
    /// Directory receiving compiler output; the system temp dir when `None`
    pub output_dir: Option<PathBuf>,
}

impl ShaderConfig {
    /// Create a shader configuration with default compiler settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an include search path
    pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    /// Use a specific compiler executable
    pub fn with_compiler(mut self, compiler: impl Into<PathBuf>) -> Self {
        self.compiler = compiler.into();
        self
    }

    /// Compile every source as HLSL
    pub fn with_hlsl(mut self, hlsl: bool) -> Self {
        self.hlsl = hlsl;
        self
    }

    /// Write compiler output into `dir`
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Resolve a shader file name
    ///
    /// The path is tried as given first, then joined onto each include path in
    /// declaration order. Returns `None` when no candidate exists.
    pub fn resolve(&self, file: impl AsRef<Path>) -> Option<PathBuf> {
        let file = file.as_ref();
        if file.exists() {
            return Some(file.to_path_buf());
        }

        self.include_paths
            .iter()
            .map(|dir| dir.join(file))
            .find(|candidate| candidate.exists())
    }

    /// Directory that receives compiled binaries
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.compiler.as_os_str().is_empty() {
            return Err("Shader compiler path cannot be empty".to_string());
        }
        if self.entry_point.is_empty() {
            return Err("Shader entry point cannot be empty".to_string());
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            include_paths: vec![PathBuf::from("shaders"), PathBuf::from("resources/shaders")],
            compiler: PathBuf::from("glslangValidator"),
            entry_point: "main".to_string(),
            hlsl: false,
            output_dir: None,
        }
    }
}

/// # Vulkan Renderer Configuration
///
/// Instance metadata and descriptor pool sizing for the Vulkan backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Whether to enable Vulkan validation layers
    pub enable_validation: Option<bool>,
    /// Maximum descriptor sets the pool can hand out
    pub max_descriptor_sets: u32,
    /// Descriptors of each type reserved per set in the pool
    pub descriptors_per_set: u32,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            ..Self::default()
        }
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = Some(enable);
        self
    }

    /// Set descriptor pool capacity
    pub fn with_max_descriptor_sets(mut self, max_sets: u32) -> Self {
        self.max_descriptor_sets = max_sets;
        self
    }

    /// Whether validation layers should be enabled for this build
    pub fn should_enable_validation(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }
        if self.max_descriptor_sets == 0 {
            return Err("Descriptor pool must allow at least one set".to_string());
        }
        if self.descriptors_per_set == 0 {
            return Err("Descriptor budget per set cannot be zero".to_string());
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Prism Application".to_string(),
            application_version: (1, 0, 0),
            enable_validation: None,
            max_descriptor_sets: 256,
            descriptors_per_set: 8,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log filter used when `RUST_LOG` is not set
    pub log_filter: Option<String>,
    /// Shader compiler settings
    pub shaders: ShaderConfig,
    /// Vulkan backend settings
    pub renderer: RendererConfig,
}

impl EngineConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shaders.validate().map_err(ConfigError::Invalid)?;
        self.renderer.validate().map_err(ConfigError::Invalid)
    }

    /// Initialize logging with the configured fallback filter
    pub fn init_logging(&self) {
        crate::foundation::logging::init_with_filter(self.log_filter.as_deref().unwrap_or("info"));
    }
}

impl Config for EngineConfig {}
