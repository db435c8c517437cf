//! Index of occupied regions inside a pallet.
//!
//! The index mirrors the placed-box sequence of a [`Pallet`](crate::model::Pallet)
//! and answers the two queries the placement search needs on every candidate:
//! "does this region collide with anything?" and "is this region supported?".
//! It is a flat structure so cloning it for a lookahead snapshot is a single
//! allocation.

use crate::geometry::{on_floor, rests_on};
use crate::types::{BoundingBox, EPSILON_HEIGHT};

#[derive(Clone, Debug, Default)]
pub struct OccupancyIndex {
    regions: Vec<BoundingBox>,
    /// Sorted, deduplicated top faces of all regions.
    levels: Vec<f64>,
}

impl OccupancyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly occupied region.
    pub fn insert(&mut self, region: BoundingBox) {
        let top = region.top_z();
        match self
            .levels
            .binary_search_by(|level| level.total_cmp(&top))
        {
            Ok(_) => {}
            Err(idx) => {
                let near_existing = [idx.checked_sub(1), Some(idx)]
                    .into_iter()
                    .flatten()
                    .filter_map(|i| self.levels.get(i))
                    .any(|level| (level - top).abs() <= EPSILON_HEIGHT);
                if !near_existing {
                    self.levels.insert(idx, top);
                }
            }
        }
        self.regions.push(region);
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundingBox> {
        self.regions.iter()
    }

    /// Checks whether `candidate` collides with any occupied region.
    pub fn collides(&self, candidate: &BoundingBox) -> bool {
        self.regions.iter().any(|r| r.intersects(candidate))
    }

    /// Checks whether `candidate` is supported by the floor or by the top
    /// face of an occupied region.
    pub fn supports(&self, candidate: &BoundingBox) -> bool {
        on_floor(candidate) || self.regions.iter().any(|r| rests_on(candidate, r))
    }

    /// Checks whether some region ends at height `z`, i.e. whether a box
    /// could possibly be supported at that height.
    pub fn has_level(&self, z: f64) -> bool {
        self.levels
            .iter()
            .any(|level| (level - z).abs() <= EPSILON_HEIGHT)
    }

    /// Top faces of all occupied regions, ascending.
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Highest occupied point, 0 when empty.
    pub fn max_top(&self) -> f64 {
        self.levels.last().copied().unwrap_or(0.0)
    }
}
