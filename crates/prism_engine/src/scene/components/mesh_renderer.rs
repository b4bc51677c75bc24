//! Mesh renderer component

use crate::foundation::collections::{MaterialId, MeshId};
use crate::scene::component::{Behavior, ComponentKind, DrawContext, Drawable, InitContext};
use crate::scene::{SceneError, SceneResult};

use super::{bind_for_draw, initialize_graphics_material};

/// Draws a mesh with a material at the owner's world transform
#[derive(Debug, Clone)]
pub struct MeshRenderer {
    mesh: MeshId,
    material: MaterialId,
    instance_count: u32,
}

impl MeshRenderer {
    /// Draw `mesh` once per frame with `material`
    pub fn new(mesh: MeshId, material: MaterialId) -> Self {
        Self { mesh, material, instance_count: 1 }
    }

    /// Set the instance count
    pub fn with_instances(mut self, instance_count: u32) -> Self {
        self.instance_count = instance_count;
        self
    }

    /// Mesh drawn
    pub fn mesh(&self) -> MeshId {
        self.mesh
    }

    /// Material drawn with
    pub fn material(&self) -> MaterialId {
        self.material
    }

    /// Instances per draw
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }
}

impl Behavior for MeshRenderer {
    fn kind(&self) -> ComponentKind {
        ComponentKind::MeshRenderer
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> SceneResult<()> {
        if !ctx.meshes.contains_key(self.mesh) {
            return Err(SceneError::UnknownMesh);
        }
        initialize_graphics_material(ctx, self.material, self.name())
    }

    fn as_drawable(&self) -> Option<&dyn Drawable> {
        Some(self)
    }
}

impl Drawable for MeshRenderer {
    fn draw(&self, ctx: &mut DrawContext<'_>) -> bool {
        let meshes = ctx.meshes;
        let Some(mesh) = meshes.get(self.mesh) else {
            log::warn!("[RENDER] Draw skipped: mesh no longer exists");
            return false;
        };
        if !bind_for_draw(ctx, self.material) {
            return false;
        }
        mesh.record_draw(&mut *ctx.backend, ctx.command_buffer, self.instance_count);
        true
    }
}
