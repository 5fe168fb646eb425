//! Scene error taxonomy
//!
//! Structural errors (duplicate names, cycles, stale handles) fail the
//! operation that caused them. Frame-time errors for a single object (an
//! unresolved material) are logged and the object is skipped. Detaching an
//! object that is not attached and renaming onto a taken name are ordinary
//! outcomes and are reported through return values instead.

use thiserror::Error;

use crate::foundation::collections::{CameraId, LightId, NodeId, ObjectId};
use crate::render::{MaterialKey, RenderError};

/// Errors raised by scene operations
#[derive(Error, Debug)]
pub enum SceneError {
    /// A name collided within a scene namespace
    #[error("a {kind} named '{name}' already exists in this scene")]
    DuplicateName {
        /// Namespace the collision happened in ("node", "object", ...)
        kind: &'static str,
        /// The colliding name
        name: String,
    },

    /// An object was attached while still attached somewhere
    #[error("object '{object}' is already attached to node '{node}'")]
    AlreadyAttached {
        /// Name of the object
        object: String,
        /// Name of the node currently holding it
        node: String,
    },

    /// A reparent would have made a node its own ancestor
    #[error("making '{parent}' the parent of '{node}' would create a cycle")]
    CyclicGraph {
        /// Node being moved
        node: String,
        /// Requested new parent
        parent: String,
    },

    /// The material system could not resolve a key
    #[error("material '{0}' could not be resolved")]
    MaterialNotFound(MaterialKey),

    /// A frame was requested without an active camera
    #[error("no active camera is available for rendering")]
    NoCamera,

    /// The node handle is stale or foreign
    #[error("node {0:?} does not exist")]
    NodeNotFound(NodeId),

    /// The object handle is stale or foreign
    #[error("renderable object {0:?} does not exist")]
    ObjectNotFound(ObjectId),

    /// The camera handle is stale or foreign
    #[error("camera {0:?} does not exist")]
    CameraNotFound(CameraId),

    /// The light handle is stale or foreign
    #[error("light {0:?} does not exist")]
    LightNotFound(LightId),

    /// The operation is not allowed in the current state
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The render backend failed
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;

/// Outcome of a rename request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum RenameStatus {
    /// The name changed; lookups by the old name now fail
    Renamed,
    /// The new name equals the current one
    Unchanged,
    /// Another item already uses the name; nothing changed
    NameInUse,
}

impl RenameStatus {
    /// True when the item is now known by the requested name
    pub fn is_ok(self) -> bool {
        matches!(self, RenameStatus::Renamed | RenameStatus::Unchanged)
    }
}
