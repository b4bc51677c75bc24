//! # Rendering
//!
//! GPU-facing half of the engine:
//!
//! - [`api`]: the [`GpuBackend`](api::GpuBackend) seam and plain-data pipeline state
//! - [`backends`]: the Vulkan implementation of that seam
//! - [`shader`]: compilation, SPIR-V reflection and binding tables
//! - [`material`]: pipelines, descriptor sets and named properties
//! - [`mesh`]: vertex/index buffer bindings
//! - [`context`]: the backend, compiler, materials and meshes shared by a hierarchy
//! - [`frame`]: per-frame recording of active components

pub mod api;
pub mod backends;
pub mod context;
pub mod frame;
pub mod material;
pub mod mesh;
pub mod shader;

pub use context::{GpuContext, RenderContext};
pub use frame::{FrameRecorder, FrameStats};
pub use material::{BufferRange, Material, MaterialError, MaterialResult, MaterialState, TextureBinding};
pub use mesh::{Mesh, Vertex};
pub use shader::{ShaderBindingTable, ShaderCompiler, ShaderProgram, ShaderSource, ShaderStage};
