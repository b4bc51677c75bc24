//! Per-kind registries of active components
//!
//! Frame recording and updates iterate these instead of walking every game
//! object. A component is registered exactly while it is active; the
//! [`RegistryIndex`] handed out on registration makes removal O(1).

use crate::foundation::collections::{ComponentId, DenseSlotMap, RegistryIndex};

use super::component::ComponentKind;

/// Active components grouped by kind
#[derive(Debug)]
pub struct ComponentRegistry {
    kinds: [DenseSlotMap<RegistryIndex, ComponentId>; ComponentKind::COUNT],
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self { kinds: std::array::from_fn(|_| DenseSlotMap::with_key()) }
    }
}

impl ComponentRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `component` to the `kind` registry
    pub fn register(&mut self, kind: ComponentKind, component: ComponentId) -> RegistryIndex {
        self.kinds[kind.index()].insert(component)
    }

    /// Remove the entry at `index`
    pub fn unregister(&mut self, kind: ComponentKind, index: RegistryIndex) -> Option<ComponentId> {
        self.kinds[kind.index()].remove(index)
    }

    /// Registered components of `kind`
    pub fn iter(&self, kind: ComponentKind) -> impl Iterator<Item = ComponentId> + '_ {
        self.kinds[kind.index()].values().copied()
    }

    /// True if `component` is registered under `kind`
    pub fn contains(&self, kind: ComponentKind, component: ComponentId) -> bool {
        self.kinds[kind.index()].values().any(|id| *id == component)
    }

    /// Number of registered components of `kind`
    pub fn len(&self, kind: ComponentKind) -> usize {
        self.kinds[kind.index()].len()
    }

    /// True when nothing of any kind is registered
    pub fn is_empty(&self) -> bool {
        self.kinds.iter().all(DenseSlotMap::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::SlotMap;

    #[test]
    fn unregister_by_index() {
        let mut ids: SlotMap<ComponentId, ()> = SlotMap::with_key();
        let (a, b) = (ids.insert(()), ids.insert(()));

        let mut registry = ComponentRegistry::new();
        let index_a = registry.register(ComponentKind::MeshRenderer, a);
        registry.register(ComponentKind::MeshRenderer, b);
        assert_eq!(registry.len(ComponentKind::MeshRenderer), 2);
        assert_eq!(registry.len(ComponentKind::Rotator), 0);

        assert_eq!(registry.unregister(ComponentKind::MeshRenderer, index_a), Some(a));
        assert!(!registry.contains(ComponentKind::MeshRenderer, a));
        assert_eq!(registry.iter(ComponentKind::MeshRenderer).collect::<Vec<_>>(), vec![b]);
        assert_eq!(registry.unregister(ComponentKind::MeshRenderer, index_a), None);
    }
}
