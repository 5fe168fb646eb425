//! Specialized collection types
//!
//! Generational handles for every arena the scene manager owns. A key carries
//! a slot index plus a generation, so a handle to a destroyed node never
//! aliases whatever is later stored in the same slot.

pub use slotmap::{SecondaryMap, SlotMap};

slotmap::new_key_type! {
    /// Handle to a [`SpatialNode`](crate::scene::SpatialNode) in a scene tree
    pub struct NodeId;

    /// Handle to a [`RenderableObject`](crate::scene::RenderableObject)
    pub struct ObjectId;

    /// Handle to a [`Camera`](crate::scene::Camera)
    pub struct CameraId;

    /// Handle to a [`Light`](crate::scene::Light)
    pub struct LightId;
}
