//! Shader source files and their compiled modules

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ash::vk;
use thiserror::Error;

use super::compiler::{CompileError, CompileRequest, ShaderCompiler};
use super::reflection::{reflect, ReflectionError, StageReflection};
use super::stage::ShaderStage;
use crate::core::ShaderConfig;
use crate::render::api::{BackendError, GpuBackend, ShaderStageDesc};

/// Shader loading failures, always tagged with the offending file
#[derive(Error, Debug)]
pub enum ShaderError {
    /// The file was not found directly or under any include path
    #[error("Shader file not found: {path}")]
    NotFound {
        /// Requested path
        path: PathBuf,
    },

    /// The stage could not be inferred from the file name
    #[error("Cannot infer shader stage of {path}")]
    UnknownStage {
        /// Requested path
        path: PathBuf,
    },

    /// The external compiler failed
    #[error("Failed to compile {path}: {source}")]
    Compile {
        /// Source file
        path: PathBuf,
        /// Compiler error
        #[source]
        source: CompileError,
    },

    /// The binary could not be reflected
    #[error("Failed to reflect {path}: {source}")]
    Reflection {
        /// Source file
        path: PathBuf,
        /// Reflection error
        #[source]
        source: ReflectionError,
    },

    /// The driver rejected the shader module
    #[error("Failed to create shader module for {path}: {source}")]
    Module {
        /// Source file
        path: PathBuf,
        /// Backend error
        #[source]
        source: BackendError,
    },

    /// The source has not been compiled yet
    #[error("Shader {path} has not been compiled")]
    NotCompiled {
        /// Source file
        path: PathBuf,
    },
}

impl ShaderError {
    /// File the error refers to
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound { path }
            | Self::UnknownStage { path }
            | Self::Compile { path, .. }
            | Self::Reflection { path, .. }
            | Self::Module { path, .. }
            | Self::NotCompiled { path } => path,
        }
    }
}

/// Result type for shader operations
pub type ShaderResult<T> = Result<T, ShaderError>;

/// One shader stage bound to a source file
///
/// Holds the last successfully compiled binary and its module. A failed
/// recompile leaves both untouched so a broken edit never tears down a
/// working pipeline.
#[derive(Debug)]
pub struct ShaderSource {
    path: PathBuf,
    stage: ShaderStage,
    entry_point: String,
    compiled_at: Option<SystemTime>,
    binary: Vec<u32>,
    module: vk::ShaderModule,
}

impl ShaderSource {
    /// Bind to an already resolved path without touching the filesystem
    pub fn new(path: impl Into<PathBuf>, stage: ShaderStage, entry_point: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            stage,
            entry_point: entry_point.into(),
            compiled_at: None,
            binary: Vec::new(),
            module: vk::ShaderModule::null(),
        }
    }

    /// Resolve `file` through the configured include paths
    pub fn from_file(file: impl AsRef<Path>, stage: ShaderStage, config: &ShaderConfig) -> ShaderResult<Self> {
        let file = file.as_ref();
        let path = config.resolve(file).ok_or_else(|| {
            log::error!("[SHADER] {} not found in working directory or include paths", file.display());
            ShaderError::NotFound { path: file.to_path_buf() }
        })?;
        Ok(Self::new(path, stage, config.entry_point.clone()))
    }

    /// Resolve `file` and infer its stage from the extension
    pub fn from_path(file: impl AsRef<Path>, config: &ShaderConfig) -> ShaderResult<Self> {
        let file = file.as_ref();
        let stage = ShaderStage::from_path(file).ok_or_else(|| ShaderError::UnknownStage { path: file.to_path_buf() })?;
        Self::from_file(file, stage, config)
    }

    /// Resolved source path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pipeline stage
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Last compiled binary, empty before the first compile
    pub fn binary(&self) -> &[u32] {
        &self.binary
    }

    /// Shader module, null before the first compile
    pub fn module(&self) -> vk::ShaderModule {
        self.module
    }

    /// True once a module exists
    pub fn is_compiled(&self) -> bool {
        self.module != vk::ShaderModule::null()
    }

    /// Run the compiler without touching the installed module
    pub fn compile_binary(&self, compiler: &dyn ShaderCompiler) -> ShaderResult<Vec<u32>> {
        let request = CompileRequest { path: &self.path, stage: self.stage, entry_point: &self.entry_point };
        compiler.compile(&request).map_err(|source| {
            log::error!("[SHADER] {source}");
            ShaderError::Compile { path: self.path.clone(), source }
        })
    }

    /// Create a module from `binary` and replace the current one
    pub fn install(&mut self, binary: Vec<u32>, backend: &mut dyn GpuBackend) -> ShaderResult<()> {
        let module = self.create_module(&binary, backend)?;
        self.replace_module(module, binary, backend);
        Ok(())
    }

    /// Create a module for `binary` without installing it
    pub(crate) fn create_module(&self, binary: &[u32], backend: &mut dyn GpuBackend) -> ShaderResult<vk::ShaderModule> {
        backend
            .create_shader_module(binary)
            .map_err(|source| ShaderError::Module { path: self.path.clone(), source })
    }

    /// Swap in a module created from `binary`, destroying the previous one
    pub(crate) fn replace_module(&mut self, module: vk::ShaderModule, binary: Vec<u32>, backend: &mut dyn GpuBackend) {
        if self.module != vk::ShaderModule::null() {
            backend.destroy_shader_module(self.module);
        }
        self.module = module;
        self.binary = binary;
        self.compiled_at = Some(modified_time(&self.path).unwrap_or_else(SystemTime::now));

        log::debug!("[SHADER] Compiled {} ({} stage, {} words)", self.path.display(), self.stage, self.binary.len());
    }

    /// Compile and install in one step
    pub fn compile(&mut self, compiler: &dyn ShaderCompiler, backend: &mut dyn GpuBackend) -> ShaderResult<()> {
        let binary = self.compile_binary(compiler)?;
        self.install(binary, backend)
    }

    /// Reflect the installed binary
    pub fn reflect(&self) -> ShaderResult<StageReflection> {
        if self.binary.is_empty() {
            return Err(ShaderError::NotCompiled { path: self.path.clone() });
        }
        reflect(&self.binary, self.stage).map_err(|source| ShaderError::Reflection { path: self.path.clone(), source })
    }

    /// Stage description for pipeline creation
    pub fn stage_desc(&self) -> ShaderResult<ShaderStageDesc> {
        if !self.is_compiled() {
            return Err(ShaderError::NotCompiled { path: self.path.clone() });
        }
        Ok(ShaderStageDesc { stage: self.stage.flags(), module: self.module, entry_point: self.entry_point.clone() })
    }

    /// True when the file changed on disk since the last successful compile
    pub fn needs_reload(&self) -> bool {
        match (self.compiled_at, modified_time(&self.path)) {
            (Some(compiled), Some(modified)) => modified > compiled,
            _ => false,
        }
    }

    /// Release the shader module
    pub fn destroy(&mut self, backend: &mut dyn GpuBackend) {
        if self.module != vk::ShaderModule::null() {
            backend.destroy_shader_module(self.module);
            self.module = vk::ShaderModule::null();
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
