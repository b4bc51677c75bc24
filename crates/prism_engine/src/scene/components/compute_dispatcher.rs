//! Compute dispatcher component
//!
//! Records its dispatch once into a secondary command buffer and hands that
//! buffer to the frame each time it is prepared. The buffer is re-recorded
//! when the material's pipeline is rebuilt, when any of its descriptors is
//! written after recording, or when the dispatch size changes.

use ash::vk;

use crate::foundation::collections::MaterialId;
use crate::render::api::{CommandBufferBegin, GpuBackend};
use crate::render::material::Material;
use crate::scene::component::{Behavior, ComponentKind, DispatchContext, Dispatchable, InitContext};
use crate::scene::{SceneError, SceneResult};

/// Work groups per axis for `size` invocations
///
/// Every axis of `size` must be an exact multiple of the work-group size.
pub fn group_counts(size: [u32; 3], work_group: [u32; 3]) -> SceneResult<[u32; 3]> {
    let mut groups = [0; 3];
    for axis in 0..3 {
        if work_group[axis] == 0 || size[axis] % work_group[axis] != 0 {
            return Err(SceneError::DispatchSize { size, work_group });
        }
        groups[axis] = size[axis] / work_group[axis];
    }
    Ok(groups)
}

/// Dispatches a compute material over a fixed invocation grid
#[derive(Debug, Clone)]
pub struct ComputeDispatcher {
    material: MaterialId,
    size: [u32; 3],
    command_buffer: Option<vk::CommandBuffer>,
    recorded: Option<(u64, u64)>,
}

impl ComputeDispatcher {
    /// Dispatch `size` invocations of `material`
    pub fn new(material: MaterialId, size: [u32; 3]) -> Self {
        Self { material, size, command_buffer: None, recorded: None }
    }

    /// Compute material
    pub fn material(&self) -> MaterialId {
        self.material
    }

    /// Invocations per axis
    pub fn size(&self) -> [u32; 3] {
        self.size
    }

    /// Change the invocation grid; the buffer is re-recorded on next use
    pub fn set_size(&mut self, size: [u32; 3]) {
        if self.size != size {
            self.size = size;
            self.recorded = None;
        }
    }

    /// Secondary command buffer, once initialized
    pub fn command_buffer(&self) -> Option<vk::CommandBuffer> {
        self.command_buffer
    }

    fn record(&self, backend: &mut dyn GpuBackend, material: &mut Material, command_buffer: vk::CommandBuffer, groups: [u32; 3]) -> SceneResult<()> {
        backend.begin_command_buffer(command_buffer, &CommandBufferBegin::secondary())?;
        let bound = material.bind(backend, command_buffer);
        if bound {
            backend.cmd_dispatch(command_buffer, groups[0], groups[1], groups[2]);
        }
        backend.end_command_buffer(command_buffer)?;
        if bound {
            Ok(())
        } else {
            Err(SceneError::InvalidComponent {
                component: self.name().to_string(),
                reason: format!("material '{}' is not ready", material.name()),
            })
        }
    }
}

impl Behavior for ComputeDispatcher {
    fn kind(&self) -> ComponentKind {
        ComponentKind::ComputeDispatcher
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> SceneResult<()> {
        let material = ctx.initialize_material(self.material)?;
        if !material.is_compute() {
            return Err(SceneError::InvalidComponent {
                component: self.name().to_string(),
                reason: format!("material '{}' has no compute stage", material.name()),
            });
        }
        if let Some(work_group) = material.work_group_size() {
            if let Err(err) = group_counts(self.size, work_group) {
                log::warn!("[COMPUTE] '{}': {err}", material.name());
            }
        }

        let command_buffer = ctx.gpu.backend.allocate_command_buffer(vk::CommandBufferLevel::SECONDARY)?;
        self.command_buffer = Some(command_buffer);
        self.recorded = None;
        Ok(())
    }

    fn on_removed(&mut self, backend: Option<&mut dyn GpuBackend>) {
        if let (Some(backend), Some(command_buffer)) = (backend, self.command_buffer.take()) {
            backend.free_command_buffer(command_buffer);
        }
        self.recorded = None;
    }

    fn as_dispatchable_mut(&mut self) -> Option<&mut dyn Dispatchable> {
        Some(self)
    }
}

impl Dispatchable for ComputeDispatcher {
    fn prepare(&mut self, ctx: &mut DispatchContext<'_>) -> Option<vk::CommandBuffer> {
        let command_buffer = self.command_buffer?;
        let Some(material) = ctx.materials.get_mut(self.material) else {
            log::warn!("[COMPUTE] Dispatch skipped: material no longer exists");
            return None;
        };
        if !material.is_ready() {
            return None;
        }
        let Some(work_group) = material.work_group_size() else {
            log::warn!("[COMPUTE] Dispatch skipped: '{}' declares no work group size", material.name());
            return None;
        };
        let groups = match group_counts(self.size, work_group) {
            Ok(groups) => groups,
            Err(err) => {
                log::error!("[COMPUTE] Dispatch of '{}' skipped: {err}", material.name());
                return None;
            }
        };

        let stale = material.pending_writes() > 0
            || self.recorded != Some((material.generation(), material.descriptor_writes()));
        if stale {
            if let Err(err) = self.record(&mut *ctx.backend, material, command_buffer, groups) {
                log::error!("[COMPUTE] Failed to record dispatch: {err}");
                self.recorded = None;
                return None;
            }
            self.recorded = Some((material.generation(), material.descriptor_writes()));
            log::debug!("[COMPUTE] Recorded dispatch of '{}' ({:?} groups)", material.name(), groups);
        }
        Some(command_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_counts_divide_exactly() {
        assert_eq!(group_counts([64, 32, 1], [32, 8, 1]).ok(), Some([2, 4, 1]));
        assert_eq!(group_counts([0, 1, 1], [32, 1, 1]).ok(), Some([0, 1, 1]));
    }

    #[test]
    fn group_counts_reject_remainders() {
        let err = group_counts([100, 1, 1], [32, 1, 1]);
        assert!(matches!(err, Err(SceneError::DispatchSize { size: [100, 1, 1], work_group: [32, 1, 1] })));
        assert!(group_counts([32, 1, 1], [32, 0, 1]).is_err());
    }
}
