//! Scene layer
//!
//! Game objects with hierarchical transforms and attached components. The
//! [`Hierarchy`] owns everything; frame recording walks the per-kind
//! [`ComponentRegistry`] rather than the object tree.

pub mod component;
pub mod components;
pub mod game_object;
pub mod hierarchy;
pub mod registry;
pub mod transform;

pub use component::{
    AsAny, Behavior, ComponentKind, ComponentSlot, DispatchContext, Dispatchable, DrawContext, Drawable, InitContext,
    UpdateContext,
};
pub use components::{ComputeDispatcher, MeshRenderer, ProceduralRenderer, Rotator};
pub use game_object::GameObject;
pub use hierarchy::Hierarchy;
pub use registry::ComponentRegistry;
pub use transform::{Transform, Transforms};

use thiserror::Error;

use crate::render::api::BackendError;
use crate::render::material::MaterialError;

/// Scene failures
#[derive(Error, Debug)]
pub enum SceneError {
    /// No game object under the id
    #[error("Unknown game object")]
    UnknownGameObject,

    /// No component under the id
    #[error("Unknown component")]
    UnknownComponent,

    /// No transform under the id
    #[error("Unknown transform")]
    UnknownTransform,

    /// No material under the id
    #[error("Unknown material")]
    UnknownMaterial,

    /// No mesh under the id
    #[error("Unknown mesh")]
    UnknownMesh,

    /// Parenting would create a cycle
    #[error("Transform cannot be parented to itself or a descendant")]
    TransformCycle,

    /// Dispatch size is not a multiple of the work-group size
    #[error("Dispatch size {size:?} is not a multiple of work group size {work_group:?}")]
    DispatchSize {
        /// Requested invocation count per axis
        size: [u32; 3],
        /// Declared local size
        work_group: [u32; 3],
    },

    /// A component cannot work with what it was given
    #[error("{component}: {reason}")]
    InvalidComponent {
        /// Component name
        component: String,
        /// What is wrong
        reason: String,
    },

    /// Material failure
    #[error(transparent)]
    Material(#[from] MaterialError),

    /// Device failure
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result alias for scene operations
pub type SceneResult<T> = Result<T, SceneError>;
