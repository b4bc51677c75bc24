//! Frame recording
//!
//! Walks the hierarchy's active-component registry and records one frame
//! into a primary command buffer:
//!
//! 1. compute secondaries, executed before the render pass begins
//! 2. the render pass, opened by the caller
//! 3. draws for every active drawable component
//!
//! Configuration problems in one component skip that component only.

use ash::vk;

use crate::scene::component::{ComponentKind, DispatchContext, DrawContext};
use crate::scene::hierarchy::{FrameScope, Hierarchy};
use crate::scene::SceneError;

/// Counts for one recorded frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Compute secondaries executed
    pub dispatches: usize,
    /// Draw calls recorded
    pub draws: usize,
    /// Active components that recorded nothing
    pub skipped: usize,
}

/// Records registered components into a primary command buffer
#[derive(Debug, Default)]
pub struct FrameRecorder {
    stats: FrameStats,
}

impl FrameRecorder {
    /// Start a frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts so far
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Execute every active dispatcher's secondary buffer into `primary`
    ///
    /// Must be called outside a render pass. Returns the number executed.
    pub fn record_compute(&mut self, hierarchy: &mut Hierarchy, primary: vk::CommandBuffer) -> usize {
        let FrameScope { components, registry, context, .. } = hierarchy.frame_scope();
        let (backend, _, _, materials, _) = context.parts();
        let Some(backend) = backend else {
            return 0;
        };

        let mut secondaries = Vec::new();
        for kind in ComponentKind::ALL {
            for id in registry.iter(kind) {
                let Some(slot) = components.get_mut(id) else {
                    continue;
                };
                let Some(dispatchable) = slot.behavior.as_dispatchable_mut() else {
                    continue;
                };
                let mut ctx = DispatchContext { backend: &mut *backend, materials: &mut *materials };
                match dispatchable.prepare(&mut ctx) {
                    Some(command_buffer) => secondaries.push(command_buffer),
                    None => self.stats.skipped += 1,
                }
            }
        }

        if !secondaries.is_empty() {
            backend.cmd_execute_commands(primary, &secondaries);
        }
        self.stats.dispatches += secondaries.len();
        secondaries.len()
    }

    /// Record draws for every active drawable into `command_buffer`
    ///
    /// The render pass must already be begun. Returns the number of draws.
    pub fn record_draws(&mut self, hierarchy: &mut Hierarchy, command_buffer: vk::CommandBuffer) -> usize {
        let FrameScope { components, registry, objects, transforms, context } = hierarchy.frame_scope();
        let (backend, _, _, materials, meshes) = context.parts();
        let Some(backend) = backend else {
            return 0;
        };

        let mut draws = 0;
        for kind in ComponentKind::ALL {
            for id in registry.iter(kind) {
                let Some(slot) = components.get(id) else {
                    continue;
                };
                let Some(drawable) = slot.behavior.as_drawable() else {
                    continue;
                };
                let world = objects
                    .get(slot.owner)
                    .ok_or(SceneError::UnknownGameObject)
                    .and_then(|object| transforms.world_matrix(object.transform()));
                let world = match world {
                    Ok(world) => world,
                    Err(err) => {
                        log::warn!("[RENDER] Draw of {} skipped: {err}", slot.behavior.name());
                        self.stats.skipped += 1;
                        continue;
                    }
                };

                let mut ctx = DrawContext {
                    backend: &mut *backend,
                    command_buffer,
                    materials: &mut *materials,
                    meshes,
                    world,
                };
                if drawable.draw(&mut ctx) {
                    draws += 1;
                } else {
                    self.stats.skipped += 1;
                }
            }
        }
        self.stats.draws += draws;
        draws
    }

    /// Finish the frame
    pub fn finish(self) -> FrameStats {
        log::trace!(
            "[RENDER] Frame recorded: {} dispatches, {} draws, {} skipped",
            self.stats.dispatches,
            self.stats.draws,
            self.stats.skipped
        );
        self.stats
    }

    /// Record a whole frame into `primary`
    ///
    /// `begin_pass` and `end_pass` open and close the render pass around the
    /// draws; compute work is recorded before `begin_pass`.
    pub fn record(
        hierarchy: &mut Hierarchy,
        primary: vk::CommandBuffer,
        begin_pass: impl FnOnce(vk::CommandBuffer),
        end_pass: impl FnOnce(vk::CommandBuffer),
    ) -> FrameStats {
        let mut recorder = Self::new();
        recorder.record_compute(hierarchy, primary);
        begin_pass(primary);
        recorder.record_draws(hierarchy, primary);
        end_pass(primary);
        recorder.finish()
    }
}
