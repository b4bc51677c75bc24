//! Shader compilation, reflection and binding tables

pub mod binding_table;
pub mod compiler;
pub mod program;
pub mod reflection;
pub mod source;
pub mod spirv;
pub mod stage;

pub use binding_table::ShaderBindingTable;
pub use compiler::{CompileError, CompileRequest, GlslangCompiler, ShaderCompiler};
pub use program::ShaderProgram;
pub use reflection::{reflect, PushConstantEntry, ReflectedBinding, ReflectionError, ReflectionResult, StageReflection};
pub use source::{ShaderError, ShaderResult, ShaderSource};
pub use stage::{ShaderLanguage, ShaderStage};
