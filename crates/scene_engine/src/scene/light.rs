//! Dynamic lights

use crate::foundation::collections::NodeId;
use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::render::{RenderLight, RenderLightKind};

/// Kind of light source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Infinitely distant light shining along a direction
    Directional,
    /// Light radiating from a point
    Point,
    /// Cone of light
    Spot {
        /// Inner cone angle in radians
        inner_angle: f32,
        /// Outer cone angle in radians
        outer_angle: f32,
    },
}

/// A light that can be attached to a node
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,

    /// Light kind
    pub kind: LightKind,
    /// Position relative to the parent node
    pub position: Vec3,
    /// Direction relative to the parent node
    pub direction: Vec3,
    /// Diffuse colour
    pub diffuse: Vec3,
    /// Distance beyond which the light has no effect (positional lights)
    pub range: f32,
    /// Whether the light is considered at all
    pub visible: bool,
    /// Whether the light casts shadows
    pub cast_shadows: bool,
}

impl Light {
    /// Create a white light at the origin with a range of 100
    pub fn new(name: impl Into<String>, kind: LightKind) -> Self {
        Self {
            name: name.into(),
            parent: None,
            kind,
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, 0.0, -1.0),
            diffuse: Vec3::new(1.0, 1.0, 1.0),
            range: 100.0,
            visible: true,
            cast_shadows: true,
        }
    }

    /// Light name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node the light is attached to
    pub fn parent_node(&self) -> Option<NodeId> {
        self.parent
    }

    /// Set the diffuse colour (builder pattern)
    pub fn with_diffuse(mut self, diffuse: Vec3) -> Self {
        self.diffuse = diffuse;
        self
    }

    /// Set the range (builder pattern)
    pub fn with_range(mut self, range: f32) -> Self {
        self.range = range;
        self
    }

    /// Set the local direction (builder pattern)
    pub fn with_direction(mut self, direction: Vec3) -> Self {
        self.direction = direction;
        self
    }

    /// World-space parameters, given the parent node's world matrix
    pub fn to_render_light(&self, parent_world: Option<&Mat4>) -> RenderLight {
        let (position, direction) = match parent_world {
            Some(world) => (
                world.transform_point(&Point3::from(self.position)).coords,
                world.transform_vector(&self.direction),
            ),
            None => (self.position, self.direction),
        };
        RenderLight {
            kind: match self.kind {
                LightKind::Directional => RenderLightKind::Directional,
                LightKind::Point => RenderLightKind::Point,
                LightKind::Spot { inner_angle, outer_angle } => RenderLightKind::Spot { inner_angle, outer_angle },
            },
            position,
            direction: direction.try_normalize(f32::EPSILON).unwrap_or(Vec3::new(0.0, 0.0, -1.0)),
            diffuse: self.diffuse,
            range: self.range,
        }
    }
}

/// Lights affecting a point, nearest first, at most `limit` of them
///
/// Directional lights always apply and count as distance zero. Positional
/// lights apply when the point lies within their range.
pub fn lights_affecting(lights: &[RenderLight], point: Vec3, limit: usize) -> Vec<RenderLight> {
    let mut candidates: Vec<(f32, RenderLight)> = lights
        .iter()
        .filter_map(|light| match light.kind {
            RenderLightKind::Directional => Some((0.0, *light)),
            _ => {
                let distance = (light.position - point).magnitude();
                (distance <= light.range).then_some((distance, *light))
            }
        })
        .collect();
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
    candidates.into_iter().take(limit).map(|(_, light)| light).collect()
}
