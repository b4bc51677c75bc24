//! The hierarchy
//!
//! Owns every game object, component and transform in slot-map arenas and
//! keeps the per-kind registry of active components in sync with lifecycle
//! changes. A component is *active* when it is enabled, initialized and its
//! owner is active; `on_enable`/`on_disable` fire only on changes of that
//! state, so repeated enable or disable calls are no-ops.
//!
//! Everything runs on the thread that owns the hierarchy.

use crate::foundation::collections::{ComponentId, GameObjectId, SlotMap};
use crate::render::api::GpuBackend;
use crate::render::context::{GpuContext, RenderContext};

use super::component::{Behavior, ComponentKind, ComponentSlot, InitContext, UpdateContext};
use super::game_object::GameObject;
use super::registry::ComponentRegistry;
use super::transform::Transforms;
use super::{SceneError, SceneResult};

use ash::vk;

/// Borrowed view used by frame recording
pub(crate) struct FrameScope<'a> {
    pub components: &'a mut SlotMap<ComponentId, ComponentSlot>,
    pub registry: &'a ComponentRegistry,
    pub objects: &'a SlotMap<GameObjectId, GameObject>,
    pub transforms: &'a Transforms,
    pub context: &'a mut RenderContext,
}

/// Scene graph of game objects and their components
#[derive(Debug)]
pub struct Hierarchy {
    objects: SlotMap<GameObjectId, GameObject>,
    components: SlotMap<ComponentId, ComponentSlot>,
    transforms: Transforms,
    registry: ComponentRegistry,
    context: RenderContext,
}

impl Hierarchy {
    /// Create an empty hierarchy around a render context
    pub fn new(context: RenderContext) -> Self {
        Self {
            objects: SlotMap::with_key(),
            components: SlotMap::with_key(),
            transforms: Transforms::new(),
            registry: ComponentRegistry::new(),
            context,
        }
    }

    /// Render context
    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    /// Mutable render context
    pub fn context_mut(&mut self) -> &mut RenderContext {
        &mut self.context
    }

    /// Transform arena
    pub fn transforms(&self) -> &Transforms {
        &self.transforms
    }

    /// Mutable transform arena
    pub fn transforms_mut(&mut self) -> &mut Transforms {
        &mut self.transforms
    }

    /// Active-component registry
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub(crate) fn frame_scope(&mut self) -> FrameScope<'_> {
        FrameScope {
            components: &mut self.components,
            registry: &self.registry,
            objects: &self.objects,
            transforms: &self.transforms,
            context: &mut self.context,
        }
    }

    /// Attach the GPU backend and run every deferred initialization
    ///
    /// All pending components are attempted; the first failure is returned.
    pub fn attach_backend(&mut self, backend: Box<dyn GpuBackend>, render_pass: vk::RenderPass) -> SceneResult<()> {
        self.context.attach_backend(backend, render_pass);
        log::info!("[HIERARCHY] GPU context attached, initializing deferred components");

        let pending: Vec<ComponentId> =
            self.components.iter().filter(|(_, slot)| !slot.initialized).map(|(id, _)| id).collect();

        let mut first_error = None;
        for id in pending {
            if let Err(err) = self.initialize_component(id) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    // Game objects

    /// Create an active game object at the root
    pub fn create_game_object(&mut self, name: impl Into<String>) -> GameObjectId {
        let transform = self.transforms.create();
        let name = name.into();
        log::debug!("[HIERARCHY] Created game object '{name}'");
        self.objects.insert(GameObject::new(name, transform))
    }

    /// Create an active game object whose transform is parented to `parent`'s
    pub fn create_child(&mut self, name: impl Into<String>, parent: GameObjectId) -> SceneResult<GameObjectId> {
        let parent_transform = self.game_object(parent)?.transform();
        let id = self.create_game_object(name);
        let transform = self.game_object(id)?.transform();
        self.transforms.set_parent(transform, Some(parent_transform))?;
        Ok(id)
    }

    /// Game object by id
    pub fn game_object(&self, id: GameObjectId) -> SceneResult<&GameObject> {
        self.objects.get(id).ok_or(SceneError::UnknownGameObject)
    }

    /// Iterate all game objects
    pub fn game_objects(&self) -> impl Iterator<Item = (GameObjectId, &GameObject)> {
        self.objects.iter()
    }

    /// Activate or deactivate a game object
    ///
    /// Components keep their requested enabled state and are re-evaluated;
    /// an enabled component comes back when its owner reactivates.
    pub fn set_active(&mut self, id: GameObjectId, active: bool) -> SceneResult<()> {
        let object = self.objects.get_mut(id).ok_or(SceneError::UnknownGameObject)?;
        if object.is_active() == active {
            return Ok(());
        }
        object.set_active(active);
        let components = object.components.clone();
        for component in components {
            self.refresh(component);
        }
        Ok(())
    }

    /// Destroy a game object and its components
    ///
    /// Each component goes through `on_disable` (if active) and `on_removed`.
    /// Child transforms move to the root; child game objects survive.
    pub fn destroy_game_object(&mut self, id: GameObjectId) -> SceneResult<()> {
        let components = self.game_object(id)?.components.clone();
        for component in components.into_iter().rev() {
            self.remove_component(component)?;
        }
        if let Some(object) = self.objects.remove(id) {
            self.transforms.remove(object.transform());
            log::debug!("[HIERARCHY] Destroyed game object '{}'", object.name());
        }
        Ok(())
    }

    // Components

    /// Attach a behavior to `owner`
    ///
    /// The component starts disabled. It is initialized right away when the
    /// GPU context is ready, otherwise when a backend is attached. If
    /// initialization fails the component is detached again and the error is
    /// returned.
    pub fn add_component(&mut self, owner: GameObjectId, behavior: Box<dyn Behavior>) -> SceneResult<ComponentId> {
        let object = self.objects.get_mut(owner).ok_or(SceneError::UnknownGameObject)?;
        let id = self.components.insert(ComponentSlot::new(owner, behavior));
        object.components.push(id);

        if let Some(slot) = self.components.get_mut(id) {
            slot.behavior.on_added(owner);
            log::debug!("[HIERARCHY] Added {} to '{}'", slot.behavior.name(), object.name());
        }

        if let Err(err) = self.initialize_component(id) {
            self.remove_component(id)?;
            return Err(err);
        }
        Ok(id)
    }

    /// Attach a concrete behavior
    pub fn add<B: Behavior>(&mut self, owner: GameObjectId, behavior: B) -> SceneResult<ComponentId> {
        self.add_component(owner, Box::new(behavior))
    }

    /// Detach a component and hand back its behavior
    pub fn remove_component(&mut self, id: ComponentId) -> SceneResult<Box<dyn Behavior>> {
        let slot = self.components.get_mut(id).ok_or(SceneError::UnknownComponent)?;
        let kind = slot.behavior.kind();
        if slot.active {
            if let Some(index) = slot.registry_index.take() {
                self.registry.unregister(kind, index);
            }
            slot.active = false;
            slot.behavior.on_disable();
        }
        slot.behavior.on_removed(self.context.backend_mut());

        let slot = self.components.remove(id).ok_or(SceneError::UnknownComponent)?;
        if let Some(object) = self.objects.get_mut(slot.owner) {
            object.components.retain(|component| *component != id);
        }
        log::debug!("[HIERARCHY] Removed {}", slot.behavior.name());
        Ok(slot.behavior)
    }

    /// Request a component's enabled state
    pub fn set_enabled(&mut self, id: ComponentId, enabled: bool) -> SceneResult<()> {
        let slot = self.components.get_mut(id).ok_or(SceneError::UnknownComponent)?;
        slot.enabled = enabled;
        self.refresh(id);
        Ok(())
    }

    /// Enable a component
    pub fn enable(&mut self, id: ComponentId) -> SceneResult<()> {
        self.set_enabled(id, true)
    }

    /// Disable a component
    pub fn disable(&mut self, id: ComponentId) -> SceneResult<()> {
        self.set_enabled(id, false)
    }

    /// Component slot by id
    pub fn component_slot(&self, id: ComponentId) -> SceneResult<&ComponentSlot> {
        self.components.get(id).ok_or(SceneError::UnknownComponent)
    }

    /// True if the component is active
    pub fn is_active(&self, id: ComponentId) -> bool {
        self.components.get(id).is_some_and(ComponentSlot::is_active)
    }

    /// Concrete behavior of a component
    pub fn component<B: Behavior>(&self, id: ComponentId) -> Option<&B> {
        let slot = self.components.get(id)?;
        (*slot.behavior).as_any().downcast_ref::<B>()
    }

    /// Mutable concrete behavior of a component
    pub fn component_mut<B: Behavior>(&mut self, id: ComponentId) -> Option<&mut B> {
        let slot = self.components.get_mut(id)?;
        (*slot.behavior).as_any_mut().downcast_mut::<B>()
    }

    /// Active components of `kind`
    pub fn registered(&self, kind: ComponentKind) -> impl Iterator<Item = ComponentId> + '_ {
        self.registry.iter(kind)
    }

    /// Update every active component once
    pub fn update(&mut self, delta_time: f32) {
        for kind in ComponentKind::ALL {
            let ids: Vec<ComponentId> = self.registry.iter(kind).collect();
            for id in ids {
                let Some(slot) = self.components.get_mut(id) else {
                    continue;
                };
                let Some(object) = self.objects.get(slot.owner) else {
                    continue;
                };
                let mut ctx = UpdateContext {
                    owner: slot.owner,
                    transform: object.transform(),
                    transforms: &mut self.transforms,
                    delta_time,
                };
                slot.behavior.update(&mut ctx);
            }
        }
    }

    /// Destroy every game object
    pub fn clear(&mut self) {
        let objects: Vec<GameObjectId> = self.objects.keys().collect();
        for id in objects {
            if let Err(err) = self.destroy_game_object(id) {
                log::warn!("[HIERARCHY] Failed to destroy game object: {err}");
            }
        }
    }

    fn initialize_component(&mut self, id: ComponentId) -> SceneResult<()> {
        let slot = self.components.get_mut(id).ok_or(SceneError::UnknownComponent)?;
        if slot.initialized {
            return Ok(());
        }
        let transform = self.objects.get(slot.owner).ok_or(SceneError::UnknownGameObject)?.transform();

        let (backend, compiler, render_pass, materials, meshes) = self.context.parts();
        let Some(backend) = backend else {
            log::debug!("[HIERARCHY] Deferring initialization of {} until the GPU context is ready", slot.behavior.name());
            return Ok(());
        };

        let mut ctx = InitContext {
            owner: slot.owner,
            transform,
            gpu: GpuContext::new(backend, compiler, render_pass),
            materials,
            meshes,
        };
        if let Err(err) = slot.behavior.initialize(&mut ctx) {
            log::error!("[HIERARCHY] Failed to initialize {}: {err}", slot.behavior.name());
            return Err(err);
        }

        slot.initialized = true;
        self.refresh(id);
        Ok(())
    }

    /// Reconcile a component's active state with its flags
    fn refresh(&mut self, id: ComponentId) {
        let Some(slot) = self.components.get_mut(id) else {
            return;
        };
        let owner_active = self.objects.get(slot.owner).is_some_and(GameObject::is_active);
        let active = slot.enabled && slot.initialized && owner_active;
        if active == slot.active {
            return;
        }

        let kind = slot.behavior.kind();
        slot.active = active;
        if active {
            slot.registry_index = Some(self.registry.register(kind, id));
            slot.behavior.on_enable();
        } else {
            if let Some(index) = slot.registry_index.take() {
                self.registry.unregister(kind, index);
            }
            slot.behavior.on_disable();
        }
    }
}

impl Drop for Hierarchy {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::material::TextureBinding;
    use crate::render::mesh::Mesh;
    use crate::scene::components::{ComputeDispatcher, MeshRenderer, Rotator};
    use crate::testing::{lit_material, particles_material, scene_compiler, Call, RecordingBackend, StaticCompiler};
    use approx::assert_relative_eq;
    use ash::vk::Handle;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::cell::RefCell;
    use std::rc::Rc;

    type EventLog = Rc<RefCell<Vec<&'static str>>>;

    struct Probe {
        log: EventLog,
        fail_init: bool,
    }

    impl Probe {
        fn new(log: &EventLog) -> Self {
            Self { log: Rc::clone(log), fail_init: false }
        }
    }

    impl Behavior for Probe {
        fn kind(&self) -> ComponentKind {
            ComponentKind::Custom
        }

        fn on_added(&mut self, _owner: GameObjectId) {
            self.log.borrow_mut().push("added");
        }

        fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> SceneResult<()> {
            self.log.borrow_mut().push("init");
            if self.fail_init {
                return Err(SceneError::InvalidComponent { component: "Probe".into(), reason: "refused".into() });
            }
            Ok(())
        }

        fn on_enable(&mut self) {
            self.log.borrow_mut().push("enable");
        }

        fn on_disable(&mut self) {
            self.log.borrow_mut().push("disable");
        }

        fn update(&mut self, _ctx: &mut UpdateContext<'_>) {
            self.log.borrow_mut().push("update");
        }

        fn on_removed(&mut self, _backend: Option<&mut dyn GpuBackend>) {
            self.log.borrow_mut().push("removed");
        }
    }

    fn ready_hierarchy(backend: &RecordingBackend) -> Hierarchy {
        let context = RenderContext::with_backend(Box::new(scene_compiler()), Box::new(backend.clone()), vk::RenderPass::null());
        Hierarchy::new(context)
    }

    fn detached_hierarchy() -> Hierarchy {
        Hierarchy::new(RenderContext::new(Box::new(StaticCompiler::new())))
    }

    #[test]
    fn lifecycle_runs_in_order() {
        let log = EventLog::default();
        let mut hierarchy = ready_hierarchy(&RecordingBackend::new());
        let object = hierarchy.create_game_object("probe");

        let id = hierarchy.add(object, Probe::new(&log)).unwrap();
        assert!(!hierarchy.is_active(id));
        hierarchy.enable(id).unwrap();
        hierarchy.update(0.016);
        hierarchy.destroy_game_object(object).unwrap();

        assert_eq!(*log.borrow(), ["added", "init", "enable", "update", "disable", "removed"]);
        assert!(hierarchy.registry().is_empty());
        assert!(hierarchy.component_slot(id).is_err());
    }

    #[test]
    fn repeated_enable_and_disable_are_noops() {
        let log = EventLog::default();
        let mut hierarchy = ready_hierarchy(&RecordingBackend::new());
        let object = hierarchy.create_game_object("probe");
        let id = hierarchy.add(object, Probe::new(&log)).unwrap();

        hierarchy.enable(id).unwrap();
        hierarchy.enable(id).unwrap();
        hierarchy.disable(id).unwrap();
        hierarchy.disable(id).unwrap();

        assert_eq!(*log.borrow(), ["added", "init", "enable", "disable"]);
    }

    #[test]
    fn random_toggles_alternate_and_match_registry() {
        let log = EventLog::default();
        let mut hierarchy = ready_hierarchy(&RecordingBackend::new());
        let object = hierarchy.create_game_object("probe");
        let id = hierarchy.add(object, Probe::new(&log)).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let (mut enabled, mut owner_active) = (false, true);
        for _ in 0..500 {
            match rng.gen_range(0..4) {
                0 => {
                    hierarchy.enable(id).unwrap();
                    enabled = true;
                }
                1 => {
                    hierarchy.disable(id).unwrap();
                    enabled = false;
                }
                2 => {
                    hierarchy.set_active(object, false).unwrap();
                    owner_active = false;
                }
                _ => {
                    hierarchy.set_active(object, true).unwrap();
                    owner_active = true;
                }
            }

            let expected = enabled && owner_active;
            assert_eq!(hierarchy.is_active(id), expected);
            assert_eq!(hierarchy.registry().contains(ComponentKind::Custom, id), expected);
        }

        let transitions: Vec<&str> =
            log.borrow().iter().copied().filter(|event| *event == "enable" || *event == "disable").collect();
        assert!(!transitions.is_empty());
        for pair in transitions.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert_eq!(transitions[0], "enable");
    }

    #[test]
    fn enabling_under_inactive_owner_waits_for_reactivation() {
        let log = EventLog::default();
        let mut hierarchy = ready_hierarchy(&RecordingBackend::new());
        let object = hierarchy.create_game_object("probe");
        let enabled = hierarchy.add(object, Probe::new(&log)).unwrap();
        let disabled = hierarchy.add(object, Probe::new(&log)).unwrap();

        hierarchy.enable(enabled).unwrap();
        hierarchy.set_active(object, false).unwrap();
        assert!(!hierarchy.is_active(enabled));

        hierarchy.enable(enabled).unwrap();
        assert!(!hierarchy.is_active(enabled));
        assert!(hierarchy.registry().is_empty());

        hierarchy.set_active(object, true).unwrap();
        assert!(hierarchy.is_active(enabled));
        assert!(!hierarchy.is_active(disabled));
        assert_eq!(hierarchy.registered(ComponentKind::Custom).collect::<Vec<_>>(), vec![enabled]);
    }

    #[test]
    fn initialization_waits_for_backend() {
        let log = EventLog::default();
        let mut hierarchy = detached_hierarchy();
        let object = hierarchy.create_game_object("probe");
        let id = hierarchy.add(object, Probe::new(&log)).unwrap();

        hierarchy.enable(id).unwrap();
        assert!(!hierarchy.is_active(id));
        assert_eq!(*log.borrow(), ["added"]);

        hierarchy.attach_backend(Box::new(RecordingBackend::new()), vk::RenderPass::null()).unwrap();
        assert_eq!(*log.borrow(), ["added", "init", "enable"]);
        assert!(hierarchy.registry().contains(ComponentKind::Custom, id));
        assert!(hierarchy.component_slot(id).unwrap().is_initialized());
    }

    #[test]
    fn failed_initialization_detaches_component() {
        let log = EventLog::default();
        let mut hierarchy = ready_hierarchy(&RecordingBackend::new());
        let object = hierarchy.create_game_object("probe");

        let probe = Probe { log: Rc::clone(&log), fail_init: true };
        let err = hierarchy.add(object, probe).unwrap_err();
        assert!(matches!(err, SceneError::InvalidComponent { .. }));
        assert!(hierarchy.game_object(object).unwrap().components().is_empty());
        assert_eq!(*log.borrow(), ["added", "init", "removed"]);
    }

    #[test]
    fn removing_enabled_component_disables_first() {
        let log = EventLog::default();
        let mut hierarchy = ready_hierarchy(&RecordingBackend::new());
        let object = hierarchy.create_game_object("probe");
        let id = hierarchy.add(object, Probe::new(&log)).unwrap();
        hierarchy.enable(id).unwrap();

        let behavior = hierarchy.remove_component(id).unwrap();
        assert!((*behavior).as_any().downcast_ref::<Probe>().is_some());
        assert_eq!(log.borrow()[log.borrow().len() - 2..], ["disable", "removed"]);
        assert!(hierarchy.registry().is_empty());
    }

    #[test]
    fn mesh_renderer_registers_after_attach_and_enable() {
        let backend = RecordingBackend::new();
        let mut hierarchy = ready_hierarchy(&backend);
        let material = hierarchy.context_mut().add_material(lit_material());
        let albedo = TextureBinding::new(vk::ImageView::from_raw(40)).with_sampler(vk::Sampler::from_raw(41));
        hierarchy
            .context_mut()
            .set_texture(material, "Albedo", albedo, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, false)
            .unwrap();
        let mesh = hierarchy.context_mut().add_mesh(Mesh::new(vk::Buffer::from_raw(50), 3));

        let object = hierarchy.create_game_object("cube");
        let id = hierarchy.add(object, MeshRenderer::new(mesh, material)).unwrap();
        assert!(hierarchy.context().material(material).unwrap().is_ready());
        assert_eq!(backend.descriptor_writes().len(), 1);
        assert!(!hierarchy.registry().contains(ComponentKind::MeshRenderer, id));

        hierarchy.enable(id).unwrap();
        assert!(hierarchy.registry().contains(ComponentKind::MeshRenderer, id));

        hierarchy.disable(id).unwrap();
        assert!(!hierarchy.registry().contains(ComponentKind::MeshRenderer, id));
    }

    #[test]
    fn renderer_rejects_compute_material() {
        let mut hierarchy = ready_hierarchy(&RecordingBackend::new());
        let material = hierarchy.context_mut().add_material(particles_material());
        let mesh = hierarchy.context_mut().add_mesh(Mesh::new(vk::Buffer::from_raw(50), 3));
        let object = hierarchy.create_game_object("cube");

        let err = hierarchy.add(object, MeshRenderer::new(mesh, material)).unwrap_err();
        assert!(matches!(err, SceneError::InvalidComponent { .. }));
    }

    #[test]
    fn dispatcher_frees_its_command_buffer_on_removal() {
        let backend = RecordingBackend::new();
        let mut hierarchy = ready_hierarchy(&backend);
        let material = hierarchy.context_mut().add_material(particles_material());
        let object = hierarchy.create_game_object("particles");

        let id = hierarchy.add(object, ComputeDispatcher::new(material, [64, 1, 1])).unwrap();
        let command_buffer = hierarchy.component::<ComputeDispatcher>(id).unwrap().command_buffer().unwrap();
        assert!(backend.calls().contains(&Call::AllocateCommandBuffer(command_buffer, vk::CommandBufferLevel::SECONDARY)));

        hierarchy.remove_component(id).unwrap();
        assert!(backend.calls().contains(&Call::FreeCommandBuffer(command_buffer)));
    }

    #[test]
    fn destroying_parent_moves_child_transform_to_root() {
        let mut hierarchy = ready_hierarchy(&RecordingBackend::new());
        let parent = hierarchy.create_game_object("parent");
        let child = hierarchy.create_child("child", parent).unwrap();
        let child_transform = hierarchy.game_object(child).unwrap().transform();
        assert!(hierarchy.transforms().get(child_transform).unwrap().parent().is_some());

        hierarchy.destroy_game_object(parent).unwrap();
        assert!(hierarchy.game_object(child).is_ok());
        assert_eq!(hierarchy.transforms().get(child_transform).unwrap().parent(), None);
    }

    #[test]
    fn rotator_spins_owner() {
        let mut hierarchy = ready_hierarchy(&RecordingBackend::new());
        let object = hierarchy.create_game_object("spinner");
        let id = hierarchy.add(object, Rotator::around_y(1.0)).unwrap();
        let transform = hierarchy.game_object(object).unwrap().transform();

        hierarchy.update(0.5);
        assert_relative_eq!(hierarchy.transforms().world_rotation(transform).unwrap().angle(), 0.0);

        hierarchy.enable(id).unwrap();
        hierarchy.update(0.5);
        let rotation = hierarchy.transforms().world_rotation(transform).unwrap();
        assert_relative_eq!(rotation.angle(), 0.5, epsilon = 1e-5);
        assert_relative_eq!(rotation * Vec3::x(), Vec3::new(0.5f32.cos(), 0.0, -(0.5f32.sin())), epsilon = 1e-5);
    }
}
