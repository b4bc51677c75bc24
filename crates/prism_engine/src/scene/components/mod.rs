//! Built-in components

pub mod compute_dispatcher;
pub mod mesh_renderer;
pub mod procedural_renderer;
pub mod rotator;

pub use compute_dispatcher::ComputeDispatcher;
pub use mesh_renderer::MeshRenderer;
pub use procedural_renderer::ProceduralRenderer;
pub use rotator::Rotator;

use crate::foundation::collections::MaterialId;

use super::component::{DrawContext, InitContext};
use super::{SceneError, SceneResult};

/// Push-constant member that receives the owner's world matrix
pub const MODEL_PUSH_CONSTANT: &str = "model";

/// Ready a graphics material during component initialization
pub(crate) fn initialize_graphics_material(ctx: &mut InitContext<'_>, id: MaterialId, component: &str) -> SceneResult<()> {
    let material = ctx.initialize_material(id)?;
    if material.is_compute() {
        return Err(SceneError::InvalidComponent {
            component: component.to_string(),
            reason: format!("material '{}' is a compute material", material.name()),
        });
    }
    Ok(())
}

/// Bind `material` and push the world matrix when the program takes one
///
/// Returns false when nothing can be drawn with it this frame.
pub(crate) fn bind_for_draw(ctx: &mut DrawContext<'_>, id: MaterialId) -> bool {
    let Some(material) = ctx.materials.get_mut(id) else {
        log::warn!("[RENDER] Draw skipped: material no longer exists");
        return false;
    };
    if !material.bind(&mut *ctx.backend, ctx.command_buffer) {
        log::warn!("[RENDER] Draw skipped: material '{}' is not ready", material.name());
        return false;
    }
    if material.binding_table().push_constant(MODEL_PUSH_CONSTANT).is_some() {
        let world: &[f32] = ctx.world.as_slice();
        material.push_constant(&mut *ctx.backend, ctx.command_buffer, MODEL_PUSH_CONSTANT, bytemuck::cast_slice(world));
    }
    true
}
