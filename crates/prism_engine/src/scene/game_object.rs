//! Game objects

use crate::foundation::collections::{ComponentId, TransformId};

/// Named node owning a transform and a list of components
///
/// Components may be of any mix of kinds, including several of the same kind.
#[derive(Debug, Clone)]
pub struct GameObject {
    name: String,
    active: bool,
    transform: TransformId,
    pub(crate) components: Vec<ComponentId>,
}

impl GameObject {
    pub(crate) fn new(name: impl Into<String>, transform: TransformId) -> Self {
        Self { name: name.into(), active: true, transform, components: Vec::new() }
    }

    /// Object name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True unless deactivated; inactive objects keep their components inactive
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// The object's transform
    pub fn transform(&self) -> TransformId {
        self.transform
    }

    /// Attached components in attach order
    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }
}
