//! Camera with cached view, projection and frustum
//!
//! The camera's own position and orientation are relative to the node it is
//! attached to (or to the world when unattached). Derived matrices are cached
//! and rebuilt on demand when the camera's own parameters change or when the
//! scene manager reports a new world transform epoch for the parent node.

use crate::foundation::collections::NodeId;
use crate::foundation::math::{Mat4, Mat4Ext, Quat, Vec3};
use crate::scene::frustum::Frustum;

/// Projection model
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective projection with a vertical field of view in radians
    Perspective {
        /// Vertical field of view in radians
        fov_y: f32,
    },
    /// Orthographic projection of a fixed window size
    Orthographic {
        /// Window width in world units
        width: f32,
        /// Window height in world units
        height: f32,
    },
}

/// World-space frame of the node a camera (or light) hangs off
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParentFrame {
    /// Derived position of the node
    pub position: Vec3,
    /// Derived orientation of the node
    pub orientation: Quat,
    /// Transform epoch the values were taken at
    pub epoch: u64,
}

/// Scene camera
#[derive(Debug, Clone)]
pub struct Camera {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,

    position: Vec3,
    orientation: Quat,
    fixed_yaw_axis: Option<Vec3>,
    projection: Projection,
    aspect_ratio: f32,
    near_clip: f32,
    far_clip: f32,
    active: bool,

    parent_frame: Option<ParentFrame>,
    view_dirty: bool,
    projection_dirty: bool,
    frustum_dirty: bool,

    derived_position: Vec3,
    derived_orientation: Quat,
    view: Mat4,
    projection_matrix: Mat4,
    frustum: Frustum,
}

impl Camera {
    /// Create an active perspective camera at the origin looking down -Z
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            position: Vec3::zeros(),
            orientation: Quat::identity(),
            fixed_yaw_axis: Some(Vec3::y()),
            projection: Projection::Perspective {
                fov_y: std::f32::consts::FRAC_PI_4,
            },
            aspect_ratio: 4.0 / 3.0,
            near_clip: 0.1,
            far_clip: 1000.0,
            active: true,
            parent_frame: None,
            view_dirty: true,
            projection_dirty: true,
            frustum_dirty: true,
            derived_position: Vec3::zeros(),
            derived_orientation: Quat::identity(),
            view: Mat4::identity(),
            projection_matrix: Mat4::identity(),
            frustum: Frustum::from_matrix(&Mat4::identity()),
        }
    }

    /// Camera name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node the camera is attached to
    pub fn parent_node(&self) -> Option<NodeId> {
        self.parent
    }

    /// Whether the camera takes part in rendering
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Enable or disable the camera
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    // ---- projection parameters ----

    /// Current projection model
    pub fn projection(&self) -> Projection {
        self.projection
    }

    /// Switch projection model
    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.projection_dirty = true;
    }

    /// Set the vertical field of view (perspective only)
    pub fn set_fov_y(&mut self, fov_y: f32) {
        if let Projection::Perspective { .. } = self.projection {
            self.set_projection(Projection::Perspective { fov_y });
        }
    }

    /// Width divided by height
    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    /// Set width divided by height
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        self.aspect_ratio = aspect;
        self.projection_dirty = true;
    }

    /// Near clip distance
    pub fn near_clip(&self) -> f32 {
        self.near_clip
    }

    /// Set the near clip distance
    pub fn set_near_clip(&mut self, near: f32) {
        self.near_clip = near;
        self.projection_dirty = true;
    }

    /// Far clip distance
    pub fn far_clip(&self) -> f32 {
        self.far_clip
    }

    /// Set the far clip distance
    pub fn set_far_clip(&mut self, far: f32) {
        self.far_clip = far;
        self.projection_dirty = true;
    }

    // ---- placement ----

    /// Position relative to the parent node
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Orientation relative to the parent node
    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    /// Set the position relative to the parent node
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.view_dirty = true;
    }

    /// Set the orientation relative to the parent node
    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation;
        self.view_dirty = true;
    }

    /// Keep yaw rotations around a fixed world axis (`None` yaws around local Y)
    pub fn set_fixed_yaw_axis(&mut self, axis: Option<Vec3>) {
        self.fixed_yaw_axis = axis.map(|a| a.normalize());
    }

    /// Move along the camera's own axes
    pub fn move_relative(&mut self, delta: Vec3) {
        self.position += self.orientation * delta;
        self.view_dirty = true;
    }

    /// Rotate around the yaw axis
    pub fn yaw(&mut self, angle: f32) {
        match self.fixed_yaw_axis {
            Some(axis) => self.rotate_global(axis, angle),
            None => self.rotate_local(Vec3::y(), angle),
        }
    }

    /// Rotate around the local X axis
    pub fn pitch(&mut self, angle: f32) {
        self.rotate_local(Vec3::x(), angle);
    }

    /// Rotate around the local Z axis
    pub fn roll(&mut self, angle: f32) {
        self.rotate_local(Vec3::z(), angle);
    }

    fn rotate_local(&mut self, axis: Vec3, angle: f32) {
        let q = Quat::from_axis_angle(&nalgebra::Unit::new_normalize(axis), angle);
        self.set_orientation(Quat::new_normalize((self.orientation * q).into_inner()));
    }

    fn rotate_global(&mut self, axis: Vec3, angle: f32) {
        let q = Quat::from_axis_angle(&nalgebra::Unit::new_normalize(axis), angle);
        self.set_orientation(Quat::new_normalize((q * self.orientation).into_inner()));
    }

    /// Point the camera along a world-space direction
    pub fn set_direction(&mut self, direction: Vec3) {
        let Some(dir) = direction.try_normalize(f32::EPSILON) else {
            return;
        };

        let world_target = match self.fixed_yaw_axis {
            // Camera looks down -Z, so local +Z must map to -dir
            Some(axis) if axis.cross(&dir).magnitude_squared() > 1e-8 => {
                Quat::face_towards(&-dir, &axis)
            }
            _ => {
                let current = self.world_orientation();
                let forward = current * -Vec3::z();
                let arc = Quat::rotation_between(&forward, &dir)
                    .unwrap_or_else(|| Quat::from_axis_angle(&(current * Vec3::y_axis()), std::f32::consts::PI));
                arc * current
            }
        };

        let local = match self.parent_frame {
            Some(frame) => frame.orientation.inverse() * world_target,
            None => world_target,
        };
        self.set_orientation(local);
    }

    /// Point the camera at a world-space target
    pub fn look_at(&mut self, target: Vec3) {
        let eye = self.world_position();
        self.set_direction(target - eye);
    }

    fn world_orientation(&self) -> Quat {
        match self.parent_frame {
            Some(frame) => frame.orientation * self.orientation,
            None => self.orientation,
        }
    }

    fn world_position(&self) -> Vec3 {
        match self.parent_frame {
            Some(frame) => frame.position + frame.orientation * self.position,
            None => self.position,
        }
    }

    // ---- derived state ----

    /// Report the parent node's current frame (or `None` when unattached)
    ///
    /// Returns true when the view had to be invalidated.
    pub fn notify_parent_frame(&mut self, frame: Option<ParentFrame>) -> bool {
        let changed = match (self.parent_frame, frame) {
            (Some(old), Some(new)) => old.epoch != new.epoch,
            (None, None) => false,
            _ => true,
        };
        self.parent_frame = frame;
        if changed {
            self.view_dirty = true;
        }
        changed
    }

    /// Whether any cached matrix needs rebuilding
    pub fn is_stale(&self) -> bool {
        self.view_dirty || self.projection_dirty || self.frustum_dirty
    }

    fn update(&mut self) {
        if self.view_dirty {
            self.derived_orientation = self.world_orientation();
            self.derived_position = self.world_position();
            self.view = self.derived_orientation.inverse().to_homogeneous()
                * Mat4::new_translation(&-self.derived_position);
            self.view_dirty = false;
            self.frustum_dirty = true;
        }
        if self.projection_dirty {
            self.projection_matrix = match self.projection {
                Projection::Perspective { fov_y } => {
                    Mat4::perspective(fov_y, self.aspect_ratio, self.near_clip, self.far_clip)
                }
                Projection::Orthographic { width, height } => {
                    Mat4::orthographic(width, height, self.near_clip, self.far_clip)
                }
            };
            self.projection_dirty = false;
            self.frustum_dirty = true;
        }
        if self.frustum_dirty {
            self.frustum = Frustum::from_matrix(&(self.projection_matrix * self.view));
            self.frustum_dirty = false;
            log::trace!("Rebuilt frustum for camera '{}'", self.name);
        }
    }

    /// View matrix (world to camera)
    pub fn view_matrix(&mut self) -> Mat4 {
        self.update();
        self.view
    }

    /// Projection matrix
    pub fn projection_matrix(&mut self) -> Mat4 {
        self.update();
        self.projection_matrix
    }

    /// View frustum in world space
    pub fn frustum(&mut self) -> &Frustum {
        self.update();
        &self.frustum
    }

    /// World-space position
    pub fn derived_position(&mut self) -> Vec3 {
        self.update();
        self.derived_position
    }

    /// World-space orientation
    pub fn derived_orientation(&mut self) -> Quat {
        self.update();
        self.derived_orientation
    }

    /// World-space viewing direction
    pub fn direction(&mut self) -> Vec3 {
        self.derived_orientation() * -Vec3::z()
    }

    /// World-space up vector
    pub fn up(&mut self) -> Vec3 {
        self.derived_orientation() * Vec3::y()
    }

    /// World-space right vector
    pub fn right(&mut self) -> Vec3 {
        self.derived_orientation() * Vec3::x()
    }
}
