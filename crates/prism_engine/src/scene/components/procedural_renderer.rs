//! Procedural renderer component

use crate::foundation::collections::MaterialId;
use crate::scene::component::{Behavior, ComponentKind, DrawContext, Drawable, InitContext};
use crate::scene::SceneResult;

use super::{bind_for_draw, initialize_graphics_material};

/// Draws `vertex_count × instance_count` vertices with no vertex buffers bound
///
/// The vertex shader generates positions from the vertex and instance index.
#[derive(Debug, Clone)]
pub struct ProceduralRenderer {
    material: MaterialId,
    vertex_count: u32,
    instance_count: u32,
}

impl ProceduralRenderer {
    /// Draw `vertex_count` generated vertices once
    pub fn new(material: MaterialId, vertex_count: u32) -> Self {
        Self { material, vertex_count, instance_count: 1 }
    }

    /// Set the instance count
    pub fn with_instances(mut self, instance_count: u32) -> Self {
        self.instance_count = instance_count;
        self
    }

    /// Material drawn with
    pub fn material(&self) -> MaterialId {
        self.material
    }

    /// Vertices per instance
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Change the vertex count
    pub fn set_vertex_count(&mut self, vertex_count: u32) {
        self.vertex_count = vertex_count;
    }

    /// Instances per draw
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Change the instance count
    pub fn set_instance_count(&mut self, instance_count: u32) {
        self.instance_count = instance_count;
    }
}

impl Behavior for ProceduralRenderer {
    fn kind(&self) -> ComponentKind {
        ComponentKind::ProceduralRenderer
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> SceneResult<()> {
        initialize_graphics_material(ctx, self.material, self.name())
    }

    fn as_drawable(&self) -> Option<&dyn Drawable> {
        Some(self)
    }
}

impl Drawable for ProceduralRenderer {
    fn draw(&self, ctx: &mut DrawContext<'_>) -> bool {
        if self.vertex_count == 0 || self.instance_count == 0 {
            return false;
        }
        if !bind_for_draw(ctx, self.material) {
            return false;
        }
        ctx.backend.cmd_draw(ctx.command_buffer, self.vertex_count, self.instance_count);
        true
    }
}
