//! Arena keys shared across the engine
//!
//! Scene objects and GPU-side assets live in slot maps; cross references are
//! these generational keys rather than pointers, so a stale reference resolves
//! to `None` instead of dangling.

pub use slotmap::{DenseSlotMap, SlotMap, SecondaryMap};

slotmap::new_key_type! {
    /// Handle to a game object owned by a hierarchy
    pub struct GameObjectId;

    /// Handle to a component slot owned by a hierarchy
    pub struct ComponentId;

    /// Handle to a transform node
    pub struct TransformId;

    /// Handle to a material in a render context
    pub struct MaterialId;

    /// Handle to a mesh in a render context
    pub struct MeshId;

    /// Position of a component inside one per-kind registry
    pub struct RegistryIndex;
}
