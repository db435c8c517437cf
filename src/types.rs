//! Shared vocabulary for pallet space.
//!
//! Lengths are centimetres, weights kilograms. `x` runs along the pallet
//! width, `y` along its length and `z` upwards from the floor.

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Headroom allowed when comparing dimensions against a limit.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Distance at which a bottom face counts as resting on a top face.
pub const EPSILON_HEIGHT: f64 = 1e-3;

/// A point or extent in pallet space.
///
/// ```
/// use palletizer::types::Vec3;
///
/// let corner = Vec3::new(10.0, 20.0, 0.0);
/// let extent = Vec3::new(40.0, 30.0, 20.0);
/// assert_eq!(corner + extent.center(), Vec3::new(30.0, 35.0, 10.0));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The pallet origin (front-left-bottom corner).
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    #[inline]
    pub const fn as_tuple(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }

    /// `x · y · z`, for vectors used as an extent.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.x * self.y * self.z
    }

    /// Half of this extent, i.e. the centre of a box anchored at the origin.
    #[inline]
    pub fn center(&self) -> Self {
        *self * 0.5
    }

    /// Component-wise `self <= limit + tolerance`.
    #[inline]
    pub fn fits_within(&self, limit: &Self, tolerance: f64) -> bool {
        self.x <= limit.x + tolerance && self.y <= limit.y + tolerance && self.z <= limit.z + tolerance
    }
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;

    #[inline]
    fn mul(self, factor: f64) -> Self {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

impl From<(f64, f64, f64)> for Vec3 {
    #[inline]
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Vec3::new(x, y, z)
    }
}

/// Anything with a width, length and height.
pub trait Dimensional {
    fn dimensions(&self) -> Vec3;

    fn volume(&self) -> f64 {
        self.dimensions().volume()
    }
}

pub trait Weighted {
    /// Weight in kilograms.
    fn weight(&self) -> f64;
}

/// Length of the intersection of `[a_lo, a_hi]` and `[b_lo, b_hi]`, or 0.
#[inline]
fn shared_length(a_lo: f64, a_hi: f64, b_lo: f64, b_hi: f64) -> f64 {
    (a_hi.min(b_hi) - a_lo.max(b_lo)).max(0.0)
}

/// Axis-aligned region occupied by a box.
///
/// Every collision and support query in the crate goes through this type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Front-left-bottom corner.
    pub min: Vec3,
    /// Back-right-top corner.
    pub max: Vec3,
}

impl BoundingBox {
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn from_position_and_dims(position: Vec3, dims: Vec3) -> Self {
        Self::new(position, position + dims)
    }

    #[inline]
    fn shared_x(&self, other: &Self) -> f64 {
        shared_length(self.min.x, self.max.x, other.min.x, other.max.x)
    }

    #[inline]
    fn shared_y(&self, other: &Self) -> f64 {
        shared_length(self.min.y, self.max.y, other.min.y, other.max.y)
    }

    #[inline]
    fn shared_z(&self, other: &Self) -> f64 {
        shared_length(self.min.z, self.max.z, other.min.z, other.max.z)
    }

    /// Strict overlap on all three axes. Shared faces, edges and corners
    /// are not a collision.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.footprint_overlaps(other) && self.shared_z(other) > 0.0
    }

    /// The XY projections share a positive area.
    #[inline]
    pub fn footprint_overlaps(&self, other: &Self) -> bool {
        self.shared_x(other) > 0.0 && self.shared_y(other) > 0.0
    }

    #[inline]
    pub fn top_z(&self) -> f64 {
        self.max.z
    }

    #[inline]
    pub fn dimensions(&self) -> Vec3 {
        self.max - self.min
    }

    /// Lies inside `[0, bounds]` on every axis.
    #[inline]
    pub fn within(&self, bounds: &Vec3, tolerance: f64) -> bool {
        self.min.x >= -tolerance
            && self.min.y >= -tolerance
            && self.min.z >= -tolerance
            && self.max.fits_within(bounds, tolerance)
    }
}

/// Running weight-weighted mean of points.
#[derive(Clone, Debug, Default)]
pub struct CenterOfMassCalculator {
    moment: Vec3,
    total_weight: f64,
}

impl CenterOfMassCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, point: Vec3, weight: f64) {
        self.moment = self.moment + point * weight;
        self.total_weight += weight;
    }

    /// `None` until some positive weight has been added.
    pub fn compute(&self) -> Option<Vec3> {
        (self.total_weight > 0.0).then(|| self.moment * self.total_weight.recip())
    }
}
