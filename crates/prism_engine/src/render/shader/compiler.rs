//! Shader compilation
//!
//! [`ShaderCompiler`] turns a source file into SPIR-V. The default
//! implementation runs glslangValidator as a blocking child process; the
//! engine only sees the `compile` contract.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use super::stage::{ShaderLanguage, ShaderStage};
use crate::core::ShaderConfig;

/// Compilation failures
#[derive(Error, Debug)]
pub enum CompileError {
    /// The compiler process could not be started
    #[error("failed to launch {compiler}: {source}")]
    Launch {
        /// Compiler executable
        compiler: PathBuf,
        /// Spawn error
        #[source]
        source: std::io::Error,
    },

    /// The compiler rejected the source
    #[error("{path}: compiler exited with status {status:?}\n{log}")]
    Failed {
        /// Source file
        path: PathBuf,
        /// Exit code, if the process exited normally
        status: Option<i32>,
        /// Captured compiler output
        log: String,
    },

    /// The compiler succeeded but its output was unusable
    #[error("{path}: unreadable SPIR-V output: {source}")]
    Output {
        /// Source file
        path: PathBuf,
        /// Read error
        #[source]
        source: std::io::Error,
    },
}

/// Input to a compilation
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    /// Resolved source path
    pub path: &'a Path,
    /// Stage to compile for
    pub stage: ShaderStage,
    /// Entry point name
    pub entry_point: &'a str,
}

/// Source to SPIR-V compilation
pub trait ShaderCompiler {
    /// Compile one stage and return its SPIR-V words
    fn compile(&self, request: &CompileRequest<'_>) -> Result<Vec<u32>, CompileError>;
}

/// glslangValidator invoked as an external process
#[derive(Debug, Clone)]
pub struct GlslangCompiler {
    config: ShaderConfig,
}

impl GlslangCompiler {
    /// Create a compiler using the executable and include paths from `config`
    pub fn new(config: ShaderConfig) -> Self {
        Self { config }
    }

    /// Command-line arguments for `request`, writing to `output`
    pub fn arguments(&self, request: &CompileRequest<'_>, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-e".to_string(),
            request.entry_point.to_string(),
            "-V".to_string(),
        ];
        if self.config.hlsl || ShaderLanguage::from_path(request.path) == ShaderLanguage::Hlsl {
            args.push("-D".to_string());
        }
        args.push("-S".to_string());
        args.push(request.stage.compiler_name().to_string());

        if let Ok(cwd) = std::env::current_dir() {
            args.push(format!("-I{}", cwd.display()));
        }
        args.extend(self.config.include_paths.iter().map(|dir| format!("-I{}", dir.display())));

        args.push(request.path.display().to_string());
        args.push("-o".to_string());
        args.push(output.display().to_string());
        args
    }

    fn output_path(&self, request: &CompileRequest<'_>) -> PathBuf {
        let stem = request
            .path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("shader");
        self.config
            .output_dir()
            .join(format!("{stem}.{}.{}.spv", request.stage, std::process::id()))
    }
}

impl ShaderCompiler for GlslangCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<Vec<u32>, CompileError> {
        let output = self.output_path(request);
        log::debug!("[SHADER] Compiling {} ({})", request.path.display(), request.stage);

        let result = Command::new(&self.config.compiler)
            .args(self.arguments(request, &output))
            .output()
            .map_err(|source| CompileError::Launch { compiler: self.config.compiler.clone(), source })?;

        if !result.status.success() {
            let _ = std::fs::remove_file(&output);
            let mut log = String::from_utf8_lossy(&result.stdout).into_owned();
            log.push_str(&String::from_utf8_lossy(&result.stderr));
            return Err(CompileError::Failed {
                path: request.path.to_path_buf(),
                status: result.status.code(),
                log,
            });
        }

        let words = std::fs::File::open(&output)
            .and_then(|mut file| ash::util::read_spv(&mut file))
            .map_err(|source| CompileError::Output { path: request.path.to_path_buf(), source });
        let _ = std::fs::remove_file(&output);
        words
    }
}
