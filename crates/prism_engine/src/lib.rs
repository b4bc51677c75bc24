//! # Prism Engine
//!
//! Vulkan engine core built around two lifecycles:
//!
//! - **Scene**: game objects with hierarchical transforms and attached
//!   components. The [`Hierarchy`](scene::Hierarchy) drives each component
//!   through `on_added` → `initialize` → `on_enable` → `update` →
//!   `on_disable` → `on_removed` and indexes active components per kind for
//!   frame recording.
//! - **GPU resources**: shader sources are compiled to SPIR-V, reflected into
//!   a [`ShaderBindingTable`](render::shader::ShaderBindingTable), and
//!   consumed by [`Material`](render::material::Material)s that resolve named
//!   properties to descriptor slots.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use prism_engine::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     let config = EngineConfig::load_or_default("prism.toml")?;
//!     config.init_logging();
//!
//!     let compiler = GlslangCompiler::new(config.shaders.clone());
//!     let mut hierarchy = Hierarchy::new(RenderContext::new(Box::new(compiler)));
//!
//!     let program = ShaderProgram::compute("particles.comp", &config.shaders)?;
//!     let material = hierarchy.context_mut().add_material(Material::new("particles", program));
//!
//!     let emitter = hierarchy.create_game_object("emitter");
//!     let dispatcher = hierarchy.add(emitter, ComputeDispatcher::new(material, [1024, 1, 1]))?;
//!     hierarchy.enable(dispatcher)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod error;
pub mod foundation;
pub mod render;
pub mod scene;

#[cfg(test)]
mod testing;

pub use error::{EngineError, EngineResult};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError},
        core::{EngineConfig, RendererConfig, ShaderConfig},
        error::{EngineError, EngineResult},
        foundation::collections::{ComponentId, GameObjectId, MaterialId, MeshId, TransformId},
        foundation::math::{Mat4, Quat, Vec3},
        render::{
            api::GpuBackend,
            backends::vulkan::{VulkanBackend, VulkanContext},
            material::{BufferRange, Material, TextureBinding},
            mesh::Mesh,
            shader::{GlslangCompiler, ShaderCompiler, ShaderProgram, ShaderSource, ShaderStage},
            FrameRecorder, FrameStats, RenderContext,
        },
        scene::{
            Behavior, ComponentKind, ComputeDispatcher, Hierarchy, MeshRenderer, ProceduralRenderer, Rotator,
            SceneError, Transforms,
        },
    };
}
