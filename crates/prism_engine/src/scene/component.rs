//! Component behaviors
//!
//! A component is a [`Behavior`] attached to a game object. The hierarchy
//! owns the behavior in a [`ComponentSlot`] and drives its lifecycle:
//!
//! `on_added` → `initialize` (once, when the GPU context is ready) →
//! `on_enable` → `update`* → `on_disable` → `on_removed`
//!
//! `on_enable` and `on_disable` strictly alternate. Capabilities such as
//! drawing or compute dispatch are exposed through [`Behavior::as_drawable`]
//! and [`Behavior::as_dispatchable_mut`] rather than a type hierarchy.

use std::any::Any;

use ash::vk;

use crate::foundation::collections::{GameObjectId, MaterialId, MeshId, RegistryIndex, SlotMap, TransformId};
use crate::foundation::math::Mat4;
use crate::render::api::GpuBackend;
use crate::render::context::GpuContext;
use crate::render::material::Material;
use crate::render::mesh::Mesh;

use super::transform::Transforms;
use super::{SceneError, SceneResult};

/// Closed set of component kinds; each kind has its own registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    /// Draws a mesh with a material
    MeshRenderer,
    /// Draws generated vertices with a material
    ProceduralRenderer,
    /// Records compute dispatches
    ComputeDispatcher,
    /// Spins its transform
    Rotator,
    /// Application-defined behavior
    Custom,
}

impl ComponentKind {
    /// Number of kinds
    pub const COUNT: usize = 5;

    /// Every kind in registry order
    pub const ALL: [Self; Self::COUNT] =
        [Self::MeshRenderer, Self::ProceduralRenderer, Self::ComputeDispatcher, Self::Rotator, Self::Custom];

    /// Registry slot of the kind
    pub fn index(self) -> usize {
        self as usize
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Self::MeshRenderer => "MeshRenderer",
            Self::ProceduralRenderer => "ProceduralRenderer",
            Self::ComputeDispatcher => "ComputeDispatcher",
            Self::Rotator => "Rotator",
            Self::Custom => "Custom",
        }
    }
}

/// Downcasting support for boxed behaviors
pub trait AsAny {
    /// `&dyn Any` view
    fn as_any(&self) -> &dyn Any;
    /// `&mut dyn Any` view
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Access handed to [`Behavior::initialize`]
pub struct InitContext<'a> {
    /// Owning game object
    pub owner: GameObjectId,
    /// Owner's transform
    pub transform: TransformId,
    /// Device access
    pub gpu: GpuContext<'a>,
    /// Material arena
    pub materials: &'a mut SlotMap<MaterialId, Material>,
    /// Mesh arena
    pub meshes: &'a SlotMap<MeshId, Mesh>,
}

impl InitContext<'_> {
    /// Bring a material to ready
    pub fn initialize_material(&mut self, id: MaterialId) -> SceneResult<&Material> {
        let material = self.materials.get_mut(id).ok_or(SceneError::UnknownMaterial)?;
        material.initialize(&mut self.gpu)?;
        Ok(material)
    }
}

/// Access handed to [`Behavior::update`]
pub struct UpdateContext<'a> {
    /// Owning game object
    pub owner: GameObjectId,
    /// Owner's transform
    pub transform: TransformId,
    /// Transform arena
    pub transforms: &'a mut Transforms,
    /// Seconds since the previous update
    pub delta_time: f32,
}

/// Access handed to [`Drawable::draw`]
pub struct DrawContext<'a> {
    /// Device backend
    pub backend: &'a mut dyn GpuBackend,
    /// Command buffer inside the render pass
    pub command_buffer: vk::CommandBuffer,
    /// Material arena
    pub materials: &'a mut SlotMap<MaterialId, Material>,
    /// Mesh arena
    pub meshes: &'a SlotMap<MeshId, Mesh>,
    /// Owner's world matrix
    pub world: Mat4,
}

/// Access handed to [`Dispatchable::prepare`]
pub struct DispatchContext<'a> {
    /// Device backend
    pub backend: &'a mut dyn GpuBackend,
    /// Material arena
    pub materials: &'a mut SlotMap<MaterialId, Material>,
}

/// Components that record draws inside the render pass
pub trait Drawable {
    /// Record the draw; returns false when nothing was recorded
    fn draw(&self, ctx: &mut DrawContext<'_>) -> bool;
}

/// Components that contribute compute work ahead of the render pass
pub trait Dispatchable {
    /// Secondary command buffer to execute this frame, if any
    fn prepare(&mut self, ctx: &mut DispatchContext<'_>) -> Option<vk::CommandBuffer>;
}

/// Behavior attached to a game object
#[allow(unused_variables)]
pub trait Behavior: AsAny + 'static {
    /// Registry the component belongs to
    fn kind(&self) -> ComponentKind;

    /// Name used in diagnostics
    fn name(&self) -> &str {
        self.kind().name()
    }

    /// Attached to `owner`
    fn on_added(&mut self, owner: GameObjectId) {}

    /// One-time GPU setup, run once the context is ready
    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> SceneResult<()> {
        Ok(())
    }

    /// Became active
    fn on_enable(&mut self) {}

    /// Stopped being active
    fn on_disable(&mut self) {}

    /// Per-tick update while active
    fn update(&mut self, ctx: &mut UpdateContext<'_>) {}

    /// About to be detached; release GPU objects here
    fn on_removed(&mut self, backend: Option<&mut dyn GpuBackend>) {}

    /// Drawing capability
    fn as_drawable(&self) -> Option<&dyn Drawable> {
        None
    }

    /// Compute capability
    fn as_dispatchable_mut(&mut self) -> Option<&mut dyn Dispatchable> {
        None
    }
}

/// A behavior plus the lifecycle state the hierarchy tracks for it
///
/// `enabled` is the requested state. It survives while the owner is inactive
/// so the component comes back in the right state when the owner reactivates.
pub struct ComponentSlot {
    pub(crate) owner: GameObjectId,
    pub(crate) behavior: Box<dyn Behavior>,
    pub(crate) enabled: bool,
    pub(crate) initialized: bool,
    pub(crate) active: bool,
    pub(crate) registry_index: Option<RegistryIndex>,
}

impl ComponentSlot {
    pub(crate) fn new(owner: GameObjectId, behavior: Box<dyn Behavior>) -> Self {
        Self { owner, behavior, enabled: false, initialized: false, active: false, registry_index: None }
    }

    /// Owning game object
    pub fn owner(&self) -> GameObjectId {
        self.owner
    }

    /// Kind of the behavior
    pub fn kind(&self) -> ComponentKind {
        self.behavior.kind()
    }

    /// Requested enabled state
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True once `initialize` succeeded
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Enabled, initialized and owned by an active object
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The behavior
    pub fn behavior(&self) -> &dyn Behavior {
        self.behavior.as_ref()
    }
}

impl std::fmt::Debug for ComponentSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentSlot")
            .field("behavior", &self.behavior.name())
            .field("owner", &self.owner)
            .field("enabled", &self.enabled)
            .field("initialized", &self.initialized)
            .field("active", &self.active)
            .finish()
    }
}
