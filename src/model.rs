//! Data models for pallet building.
//!
//! This module defines the fundamental data structures:
//! - `Box3D`: An arriving box with its dimensions and weight
//! - `PlacedBox`: A box together with its position on a pallet
//! - `PalletCapacity`: The bounding limits of a pallet type
//! - `Pallet`: A capacity-bounded container that validates and places boxes

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::occupancy::OccupancyIndex;
use crate::placement::{LowestLayerSearch, PlacementStrategy};
use crate::scoring::StabilityPolicy;
use crate::types::{
    BoundingBox, CenterOfMassCalculator, Dimensional, EPSILON_GENERAL, Vec3, Weighted,
};

/// Validation error for box and pallet data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),
    #[error("Invalid grid step: {0}")]
    InvalidGridStep(String),
}

fn is_positive(value: f64) -> bool {
    value > 0.0 && value.is_finite()
}

fn validate_dimension(value: f64, name: &str) -> Result<(), ValidationError> {
    if !is_positive(value) {
        return Err(ValidationError::InvalidDimension(format!(
            "{} must be positive, got: {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_capacity_value(value: f64, name: &str) -> Result<(), ValidationError> {
    if !is_positive(value) {
        return Err(ValidationError::InvalidCapacity(format!(
            "{} must be positive, got: {}",
            name, value
        )));
    }
    Ok(())
}

/// Raw box record as it arrives from ingestion, before validation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub id: usize,
    pub width: f64,
    pub length: f64,
    pub height: f64,
    pub weight: f64,
}

/// A box to be palletized.
///
/// The physical magnitudes are fixed at construction; the only thing that
/// ever changes for a box is its position, which is recorded by the pallet
/// that accepts it (see [`PlacedBox`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BoxRecord", into = "BoxRecord")]
pub struct Box3D {
    id: usize,
    width: f64,
    length: f64,
    height: f64,
    weight: f64,
}

impl Box3D {
    /// Creates a new box with validation.
    ///
    /// # Parameters
    /// * `id` - Identifier, unique within a run
    /// * `width`, `length`, `height` - Dimensions in cm
    /// * `weight` - Weight in kg
    ///
    /// # Examples
    /// ```
    /// use palletizer::model::Box3D;
    ///
    /// assert!(Box3D::new(1, 50.0, 50.0, 50.0, 100.0).is_ok());
    /// assert!(Box3D::new(2, -10.0, 20.0, 30.0, 5.0).is_err());
    /// assert!(Box3D::new(3, 10.0, 20.0, 30.0, 0.0).is_err());
    /// ```
    pub fn new(
        id: usize,
        width: f64,
        length: f64,
        height: f64,
        weight: f64,
    ) -> Result<Self, ValidationError> {
        validate_dimension(width, "Width")?;
        validate_dimension(length, "Length")?;
        validate_dimension(height, "Height")?;
        if !is_positive(weight) {
            return Err(ValidationError::InvalidWeight(format!(
                "Weight must be positive, got: {}",
                weight
            )));
        }
        Ok(Self {
            id,
            width,
            length,
            height,
            weight,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Calculates the volume of the box (width × length × height).
    pub fn volume(&self) -> f64 {
        self.width * self.length * self.height
    }

    /// Converts the dimensions to a Vec3.
    #[inline]
    pub fn dims(&self) -> Vec3 {
        Vec3::new(self.width, self.length, self.height)
    }
}

impl TryFrom<BoxRecord> for Box3D {
    type Error = ValidationError;

    fn try_from(record: BoxRecord) -> Result<Self, Self::Error> {
        Self::new(
            record.id,
            record.width,
            record.length,
            record.height,
            record.weight,
        )
    }
}

impl From<Box3D> for BoxRecord {
    fn from(object: Box3D) -> Self {
        Self {
            id: object.id,
            width: object.width,
            length: object.length,
            height: object.height,
            weight: object.weight,
        }
    }
}

impl Dimensional for Box3D {
    fn dimensions(&self) -> Vec3 {
        self.dims()
    }
}

impl Weighted for Box3D {
    fn weight(&self) -> f64 {
        self.weight
    }
}

/// A box with its position on a pallet.
///
/// # Fields
/// * `object` - The box being placed
/// * `position` - Position (x, y, z) of the lower left front corner
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlacedBox {
    pub object: Box3D,
    pub position: Vec3,
}

impl PlacedBox {
    pub fn new(object: Box3D, position: Vec3) -> Self {
        Self { object, position }
    }

    /// Z position + height of the box.
    pub fn top_z(&self) -> f64 {
        self.position.z + self.object.height
    }

    /// Geometric center of the placed box.
    pub fn center(&self) -> Vec3 {
        self.position + self.object.dims().center()
    }

    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_position_and_dims(self.position, self.object.dims())
    }
}

impl Dimensional for PlacedBox {
    fn dimensions(&self) -> Vec3 {
        self.object.dims()
    }
}

impl Weighted for PlacedBox {
    fn weight(&self) -> f64 {
        self.object.weight
    }
}

/// Bounding limits of a pallet.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PalletCapacity {
    pub max_width: f64,
    pub max_length: f64,
    pub max_height: f64,
    pub max_weight: f64,
}

impl PalletCapacity {
    pub const DEFAULT_MAX_WIDTH: f64 = 120.0;
    pub const DEFAULT_MAX_LENGTH: f64 = 100.0;
    pub const DEFAULT_MAX_HEIGHT: f64 = 200.0;
    pub const DEFAULT_MAX_WEIGHT: f64 = 1000.0;

    /// Creates validated pallet limits.
    ///
    /// # Returns
    /// `Err(ValidationError::InvalidCapacity)` if any bound is not positive
    pub fn new(
        max_width: f64,
        max_length: f64,
        max_height: f64,
        max_weight: f64,
    ) -> Result<Self, ValidationError> {
        let capacity = Self {
            max_width,
            max_length,
            max_height,
            max_weight,
        };
        capacity.validate()?;
        Ok(capacity)
    }

    /// Checks that every bound is positive and finite.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_capacity_value(self.max_width, "Pallet width")?;
        validate_capacity_value(self.max_length, "Pallet length")?;
        validate_capacity_value(self.max_height, "Pallet height")?;
        validate_capacity_value(self.max_weight, "Pallet weight")?;
        Ok(())
    }

    #[inline]
    pub fn dims(&self) -> Vec3 {
        Vec3::new(self.max_width, self.max_length, self.max_height)
    }

    pub fn volume(&self) -> f64 {
        self.dims().volume()
    }

    /// Checks whether the box would fit an empty pallet of this type.
    pub fn admits(&self, object: &Box3D) -> bool {
        object.weight <= self.max_weight && self.admits_dimensions(object)
    }

    /// Checks the raw box dimensions against the bounds, ignoring weight.
    pub fn admits_dimensions(&self, object: &Box3D) -> bool {
        object.dims().fits_within(&self.dims(), EPSILON_GENERAL)
    }
}

impl Default for PalletCapacity {
    fn default() -> Self {
        Self {
            max_width: Self::DEFAULT_MAX_WIDTH,
            max_length: Self::DEFAULT_MAX_LENGTH,
            max_height: Self::DEFAULT_MAX_HEIGHT,
            max_weight: Self::DEFAULT_MAX_WEIGHT,
        }
    }
}

impl Dimensional for PalletCapacity {
    fn dimensions(&self) -> Vec3 {
        self.dims()
    }
}

/// A capacity-bounded pallet.
///
/// Boxes only enter a pallet through [`Pallet::try_place`],
/// [`Pallet::try_place_with`] or [`Pallet::place_at`], all of which keep
/// the weight, bounds, non-overlap and support invariants. Failed attempts
/// leave the pallet untouched.
#[derive(Clone, Debug)]
pub struct Pallet {
    id: usize,
    capacity: PalletCapacity,
    placed: Vec<PlacedBox>,
    current_weight: f64,
    occupancy: OccupancyIndex,
}

impl Pallet {
    /// Creates a new empty pallet after validating its limits.
    pub fn new(id: usize, capacity: PalletCapacity) -> Result<Self, ValidationError> {
        capacity.validate()?;
        Ok(Self::with_valid_capacity(id, capacity))
    }

    pub(crate) fn with_valid_capacity(id: usize, capacity: PalletCapacity) -> Self {
        Self {
            id,
            capacity,
            placed: Vec::new(),
            current_weight: 0.0,
            occupancy: OccupancyIndex::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn capacity(&self) -> &PalletCapacity {
        &self.capacity
    }

    /// Placed boxes in placement order.
    pub fn boxes(&self) -> &[PlacedBox] {
        &self.placed
    }

    pub fn len(&self) -> usize {
        self.placed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }

    pub fn current_weight(&self) -> f64 {
        self.current_weight
    }

    pub fn remaining_weight(&self) -> f64 {
        self.capacity.max_weight - self.current_weight
    }

    /// Checks weight headroom and that the raw box dimensions fit the
    /// pallet bounds. Occupancy is ignored, so a `true` result does not
    /// guarantee that a free spot exists.
    ///
    /// The weight cap is exact; dimensions keep `EPSILON_GENERAL` of slack.
    pub fn capacity_check(&self, object: &Box3D) -> bool {
        self.current_weight + object.weight <= self.capacity.max_weight
            && self.capacity.admits_dimensions(object)
    }

    /// Total pallet volume.
    pub fn volume(&self) -> f64 {
        self.capacity.volume()
    }

    /// Sum of the volumes of all placed boxes.
    pub fn used_volume(&self) -> f64 {
        self.placed.iter().map(|p| p.object.volume()).sum()
    }

    pub fn remaining_volume(&self) -> f64 {
        self.volume() - self.used_volume()
    }

    /// Highest point reached by the load, 0 when empty.
    pub fn max_stack_height(&self) -> f64 {
        self.occupancy.max_top()
    }

    /// Geometric center of the pallet's bounding space.
    pub fn geometric_center(&self) -> Vec3 {
        self.capacity.dims().center()
    }

    /// Weight-weighted mean of the box centers.
    ///
    /// Falls back to the geometric center when the pallet is empty.
    pub fn centroid(&self) -> Vec3 {
        let mut calc = CenterOfMassCalculator::new();
        for p in &self.placed {
            calc.add_point(p.center(), p.object.weight);
        }
        calc.compute().unwrap_or_else(|| self.geometric_center())
    }

    /// Number of placed boxes that are neither on the floor nor resting on
    /// another box.
    pub fn unsupported_count(&self) -> usize {
        self.placed
            .iter()
            .filter(|p| !self.occupancy.supports(&p.bounding_box()))
            .count()
    }

    /// Stability score under the default (additive) penalty policy.
    pub fn stability_score(&self) -> f64 {
        self.stability_score_with(StabilityPolicy::default())
    }

    /// Stability score in `[0, 1]` under an explicit penalty policy.
    pub fn stability_score_with(&self, policy: StabilityPolicy) -> f64 {
        policy.score(self.unsupported_count())
    }

    /// Checks whether a box may occupy `region`: inside the bounds, free
    /// of collisions and supported.
    pub fn is_region_free(&self, region: &BoundingBox) -> bool {
        region.within(&self.capacity.dims(), EPSILON_GENERAL)
            && !self.occupancy.collides(region)
            && self.is_supported(region)
    }

    /// Checks whether `region` stands on the floor or on a placed box.
    pub fn is_supported(&self, region: &BoundingBox) -> bool {
        self.occupancy.supports(region)
    }

    /// Checks whether any placed box ends at height `z`.
    pub fn has_support_level(&self, z: f64) -> bool {
        self.occupancy.has_level(z)
    }

    /// Searches the canonical lowest-layer position and places the box there.
    ///
    /// # Returns
    /// `true` on success; on failure the pallet is unchanged
    pub fn try_place(&mut self, object: &Box3D) -> bool {
        self.try_place_with(&LowestLayerSearch::default(), object)
    }

    /// Like [`Pallet::try_place`] with an explicit search strategy.
    pub fn try_place_with<S>(&mut self, strategy: &S, object: &Box3D) -> bool
    where
        S: PlacementStrategy + ?Sized,
    {
        if !self.capacity_check(object) {
            return false;
        }
        match strategy.find_position(self, object) {
            Some(position) => self.place_at(object, position),
            None => false,
        }
    }

    /// Places a box at an explicit position after validating it.
    ///
    /// # Returns
    /// `true` on success; on failure the pallet is unchanged
    pub fn place_at(&mut self, object: &Box3D, position: Vec3) -> bool {
        if !self.capacity_check(object) {
            return false;
        }
        let region = BoundingBox::from_position_and_dims(position, object.dims());
        if !self.is_region_free(&region) {
            return false;
        }
        self.commit(PlacedBox::new(object.clone(), position));
        true
    }

    fn commit(&mut self, placed: PlacedBox) {
        trace!(
            pallet_id = self.id,
            box_id = placed.object.id,
            x = placed.position.x,
            y = placed.position.y,
            z = placed.position.z,
            "box committed"
        );
        self.current_weight += placed.object.weight;
        self.occupancy.insert(placed.bounding_box());
        self.placed.push(placed);
    }

    /// Independent copy of the pallet for speculative placements.
    ///
    /// Mutating the snapshot never affects the original.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Inserts a box without any validation. Only used to build broken
    /// fixtures for scorer tests.
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&mut self, object: Box3D, position: Vec3) {
        self.commit(PlacedBox::new(object, position));
    }
}

impl Dimensional for Pallet {
    fn dimensions(&self) -> Vec3 {
        self.capacity.dims()
    }
}

impl Weighted for Pallet {
    fn weight(&self) -> f64 {
        self.current_weight
    }
}
