//! Bounding volumes and rays
//!
//! Renderables carry a local-space [`BoundingVolume`]; the scene manager
//! transforms it by the owning node's world matrix for culling and queries.

use crate::foundation::math::{utils, Mat4, Point3, Vec3};

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given half extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box containing all points, or `None` for an empty iterator
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::new(first, first), |mut acc, p| {
            acc.min = acc.min.inf(&p);
            acc.max = acc.max.sup(&p);
            acc
        }))
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Smallest box containing both boxes
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Check if this AABB touches a sphere
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = Vec3::new(
            center.x.clamp(self.min.x, self.max.x),
            center.y.clamp(self.min.y, self.max.y),
            center.z.clamp(self.min.z, self.max.z),
        );
        (closest - center).magnitude_squared() <= radius * radius
    }

    /// Axis-aligned box enclosing this box after an affine transform
    ///
    /// Transforms the centre and rotates the half extents through the absolute
    /// upper 3x3 (Arvo's method), which avoids transforming all eight corners.
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let center = matrix.transform_point(&Point3::from(self.center())).coords;
        let half = self.extents();
        let new_half = Vec3::new(
            half.x * matrix[(0, 0)].abs() + half.y * matrix[(0, 1)].abs() + half.z * matrix[(0, 2)].abs(),
            half.x * matrix[(1, 0)].abs() + half.y * matrix[(1, 1)].abs() + half.z * matrix[(1, 2)].abs(),
            half.x * matrix[(2, 0)].abs() + half.y * matrix[(2, 1)].abs() + half.z * matrix[(2, 2)].abs(),
        );
        Aabb::from_center_extents(center, new_half)
    }

    /// Test ray intersection with this AABB using the slab method
    ///
    /// Returns the distance along `ray` to the entry point (0 when the origin
    /// is inside the box), or `None` when the ray misses.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        let inv_dir = Vec3::new(
            if ray.direction.x != 0.0 { 1.0 / ray.direction.x } else { f32::INFINITY },
            if ray.direction.y != 0.0 { 1.0 / ray.direction.y } else { f32::INFINITY },
            if ray.direction.z != 0.0 { 1.0 / ray.direction.z } else { f32::INFINITY },
        );

        let t1 = (self.min.x - ray.origin.x) * inv_dir.x;
        let t2 = (self.max.x - ray.origin.x) * inv_dir.x;
        let t3 = (self.min.y - ray.origin.y) * inv_dir.y;
        let t4 = (self.max.y - ray.origin.y) * inv_dir.y;
        let t5 = (self.min.z - ray.origin.z) * inv_dir.z;
        let t6 = (self.max.z - ray.origin.z) * inv_dir.z;

        let tmin = t1.min(t2).max(t3.min(t4)).max(t5.min(t6));
        let tmax = t1.max(t2).min(t3.max(t4)).min(t5.max(t6));

        if tmax >= tmin && tmax >= 0.0 {
            Some(tmin.max(0.0))
        } else {
            None
        }
    }
}

/// Bounding sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Centre of the sphere
    pub center: Vec3,
    /// Radius of the sphere
    pub radius: f32,
}

impl Sphere {
    /// Create a sphere
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Sphere after an affine transform (radius grows with the largest axis scale)
    pub fn transformed(&self, matrix: &Mat4) -> Sphere {
        Sphere {
            center: matrix.transform_point(&Point3::from(self.center)).coords,
            radius: self.radius * utils::max_axis_scale(matrix),
        }
    }

    /// Box tightly enclosing the sphere
    pub fn to_aabb(&self) -> Aabb {
        Aabb::from_center_extents(self.center, Vec3::repeat(self.radius))
    }
}

/// Local- or world-space bounding volume of a renderable
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundingVolume {
    /// Axis-aligned box
    Box(Aabb),
    /// Sphere
    Sphere(Sphere),
}

impl BoundingVolume {
    /// Centre of the volume
    pub fn center(&self) -> Vec3 {
        match self {
            BoundingVolume::Box(aabb) => aabb.center(),
            BoundingVolume::Sphere(sphere) => sphere.center,
        }
    }

    /// Radius of a sphere enclosing the volume
    pub fn bounding_radius(&self) -> f32 {
        match self {
            BoundingVolume::Box(aabb) => aabb.extents().magnitude(),
            BoundingVolume::Sphere(sphere) => sphere.radius,
        }
    }

    /// Axis-aligned box enclosing the volume
    pub fn to_aabb(&self) -> Aabb {
        match self {
            BoundingVolume::Box(aabb) => *aabb,
            BoundingVolume::Sphere(sphere) => sphere.to_aabb(),
        }
    }

    /// The volume after an affine transform, keeping its shape kind
    pub fn transformed(&self, matrix: &Mat4) -> BoundingVolume {
        match self {
            BoundingVolume::Box(aabb) => BoundingVolume::Box(aabb.transformed(matrix)),
            BoundingVolume::Sphere(sphere) => BoundingVolume::Sphere(sphere.transformed(matrix)),
        }
    }
}

/// Half-line used for picking queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Origin of the ray
    pub origin: Vec3,
    /// Direction of the ray (normalized on construction)
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray; the direction is normalized
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Point at distance `t` along the ray
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Distance along the ray to the first sphere intersection
    pub fn intersect_sphere(&self, sphere: &Sphere) -> Option<f32> {
        let to_center = sphere.center - self.origin;
        let along = to_center.dot(&self.direction);
        let dist_sq = to_center.magnitude_squared() - along * along;
        let radius_sq = sphere.radius * sphere.radius;
        if dist_sq > radius_sq {
            return None;
        }
        let half_chord = (radius_sq - dist_sq).sqrt();
        let near = along - half_chord;
        let far = along + half_chord;
        if far < 0.0 {
            None
        } else {
            Some(near.max(0.0))
        }
    }
}
