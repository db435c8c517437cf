//! Spatial search strategies for finding a free, supported slot on a pallet.
//!
//! Both searches enumerate grid-stepped candidate origins inside the pallet
//! bounds and accept only candidates that are collision free and supported.
//! They differ in scan order and in how they pick among valid candidates:
//!
//! - [`LowestLayerSearch`] scans z → y → x and keeps the first valid candidate
//!   on the lowest layer (lowest y, then lowest x). It is the canonical rule
//!   used by First-Fit, the decreasing variants and the lookahead simulation.
//! - [`SlotSearch`] scans x → y → z and minimises a [`WasteMetric`]; it backs
//!   the Guillotine heuristic.
//!
//! Both are brute-force scans over the full grid. The [`PlacementStrategy`]
//! trait keeps the heuristics independent of the search so a skyline or
//! maximal-space structure can replace it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{Box3D, Pallet};
use crate::types::{BoundingBox, EPSILON_GENERAL, Vec3};

/// Finds a position for a box on a pallet without mutating it.
pub trait PlacementStrategy {
    /// Returns the origin the box should be placed at, if any.
    fn find_position(&self, pallet: &Pallet, object: &Box3D) -> Option<Vec3>;
}

/// Generates candidate origins along one axis.
///
/// Positions are `0, step, 2·step, …` up to `pallet_len - object_len`.
/// Returns an empty list when the object is longer than the pallet.
///
/// # Parameters
/// * `pallet_len` - Pallet extent along the axis
/// * `object_len` - Box extent along the axis
/// * `step` - Grid step
pub fn axis_positions(pallet_len: f64, object_len: f64, step: f64) -> Vec<f64> {
    let max_pos = pallet_len - object_len;
    if max_pos < -EPSILON_GENERAL || step <= 0.0 {
        return Vec::new();
    }
    let count = ((max_pos.max(0.0) + EPSILON_GENERAL) / step).floor() as usize;
    (0..=count).map(|k| k as f64 * step).collect()
}

/// Canonical lowest-layer, front-left-most search.
///
/// Among all valid candidates the one with the lowest `z` wins; ties on
/// `z` are resolved by scan order, so the first candidate found on the
/// lowest layer is kept.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LowestLayerSearch {
    grid_step: f64,
}

impl LowestLayerSearch {
    pub const DEFAULT_GRID_STEP: f64 = 1.0;

    pub fn new(grid_step: f64) -> Self {
        Self { grid_step }
    }
}

impl Default for LowestLayerSearch {
    fn default() -> Self {
        Self::new(Self::DEFAULT_GRID_STEP)
    }
}

impl PlacementStrategy for LowestLayerSearch {
    fn find_position(&self, pallet: &Pallet, object: &Box3D) -> Option<Vec3> {
        let bounds = pallet.capacity().dims();
        let dims = object.dims();
        let xs = axis_positions(bounds.x, dims.x, self.grid_step);
        let ys = axis_positions(bounds.y, dims.y, self.grid_step);
        let zs = axis_positions(bounds.z, dims.z, self.grid_step);

        // z is the outermost loop, so the first valid candidate is already
        // the lowest-layer, lowest-y, lowest-x one.
        for &z in &zs {
            if z > 0.0 && !pallet.has_support_level(z) {
                continue;
            }
            for &y in &ys {
                for &x in &xs {
                    let position = Vec3::new(x, y, z);
                    let region = BoundingBox::from_position_and_dims(position, dims);
                    if pallet.is_region_free(&region) {
                        return Some(position);
                    }
                }
            }
        }
        None
    }
}

/// Objective minimised by [`SlotSearch`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WasteMetric {
    /// `pallet volume − (placed volume + box volume)`.
    ///
    /// Does not depend on the candidate position, so the search degenerates
    /// to the first valid slot in x → y → z scan order.
    #[default]
    Legacy,
    /// Manhattan distance of the slot origin from the pallet origin.
    ///
    /// Packs towards the front-left-bottom corner.
    CornerDistance,
}

impl WasteMetric {
    /// Waste of placing `object` at `position` on `pallet`.
    pub fn waste(&self, pallet: &Pallet, object: &Box3D, position: Vec3) -> f64 {
        match self {
            WasteMetric::Legacy => pallet.volume() - (pallet.used_volume() + object.volume()),
            WasteMetric::CornerDistance => position.x + position.y + position.z,
        }
    }

    /// Whether the metric yields the same value for every candidate.
    pub fn is_position_independent(&self) -> bool {
        matches!(self, WasteMetric::Legacy)
    }

    pub fn name(&self) -> &'static str {
        match self {
            WasteMetric::Legacy => "legacy",
            WasteMetric::CornerDistance => "corner-distance",
        }
    }
}

impl fmt::Display for WasteMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WasteMetric {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "legacy" => Ok(WasteMetric::Legacy),
            "corner-distance" | "corner" => Ok(WasteMetric::CornerDistance),
            other => Err(format!("unknown waste metric '{}'", other)),
        }
    }
}

/// Slot search used by the Guillotine heuristic.
///
/// Scans x outermost, then y, then z, and keeps the candidate with the
/// smallest waste; on equal waste the first candidate found stays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlotSearch {
    grid_step: f64,
    metric: WasteMetric,
}

impl SlotSearch {
    pub fn new(grid_step: f64, metric: WasteMetric) -> Self {
        Self { grid_step, metric }
    }
}

impl Default for SlotSearch {
    fn default() -> Self {
        Self::new(LowestLayerSearch::DEFAULT_GRID_STEP, WasteMetric::default())
    }
}

impl PlacementStrategy for SlotSearch {
    fn find_position(&self, pallet: &Pallet, object: &Box3D) -> Option<Vec3> {
        let bounds = pallet.capacity().dims();
        let dims = object.dims();
        let xs = axis_positions(bounds.x, dims.x, self.grid_step);
        let ys = axis_positions(bounds.y, dims.y, self.grid_step);
        let zs: Vec<f64> = axis_positions(bounds.z, dims.z, self.grid_step)
            .into_iter()
            .filter(|&z| z <= 0.0 || pallet.has_support_level(z))
            .collect();

        let mut best: Option<(Vec3, f64)> = None;
        for &x in &xs {
            for &y in &ys {
                for &z in &zs {
                    let position = Vec3::new(x, y, z);
                    let region = BoundingBox::from_position_and_dims(position, dims);
                    if !pallet.is_region_free(&region) {
                        continue;
                    }
                    if self.metric.is_position_independent() {
                        return Some(position);
                    }
                    let waste = self.metric.waste(pallet, object, position);
                    match best {
                        Some((_, current)) if waste >= current => {}
                        _ => best = Some((position, waste)),
                    }
                }
            }
        }
        best.map(|(position, _)| position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PalletCapacity;

    fn pallet(w: f64, l: f64, h: f64) -> Pallet {
        Pallet::new(1, PalletCapacity::new(w, l, h, 1000.0).unwrap()).unwrap()
    }

    fn item(id: usize, w: f64, l: f64, h: f64) -> Box3D {
        Box3D::new(id, w, l, h, 10.0).unwrap()
    }

    #[test]
    fn axis_positions_are_integer_stepped() {
        assert_eq!(axis_positions(10.0, 7.0, 1.0), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(axis_positions(10.0, 10.0, 1.0), vec![0.0]);
        assert_eq!(axis_positions(10.5, 10.0, 1.0), vec![0.0]);
        assert_eq!(axis_positions(10.0, 4.0, 2.5), vec![0.0, 2.5, 5.0]);
        assert!(axis_positions(10.0, 11.0, 1.0).is_empty());
    }

    #[test]
    fn empty_pallet_places_at_origin() {
        let p = pallet(100.0, 100.0, 150.0);
        let b = item(1, 50.0, 50.0, 50.0);
        assert_eq!(
            LowestLayerSearch::default().find_position(&p, &b),
            Some(Vec3::zero())
        );
        assert_eq!(SlotSearch::default().find_position(&p, &b), Some(Vec3::zero()));
    }

    #[test]
    fn lowest_layer_prefers_floor_over_stacking() {
        let mut p = pallet(100.0, 100.0, 150.0);
        assert!(p.place_at(&item(1, 50.0, 50.0, 50.0), Vec3::zero()));

        // Floor space remains, so the box stays at z = 0 and moves along x.
        let pos = LowestLayerSearch::default()
            .find_position(&p, &item(2, 50.0, 50.0, 50.0))
            .unwrap();
        assert_eq!(pos, Vec3::new(50.0, 0.0, 0.0));
    }

    #[test]
    fn slot_search_scans_x_outermost() {
        let mut p = pallet(100.0, 100.0, 150.0);
        assert!(p.place_at(&item(1, 50.0, 50.0, 50.0), Vec3::zero()));

        // z is the innermost loop: stacking on box 1 at (0, 0) is found
        // before moving back to y = 50 or right to x = 50.
        let pos = SlotSearch::default()
            .find_position(&p, &item(2, 50.0, 50.0, 50.0))
            .unwrap();
        assert_eq!(pos, Vec3::new(0.0, 0.0, 50.0));
    }

    #[test]
    fn slot_search_and_lowest_layer_disagree() {
        let mut p = pallet(100.0, 50.0, 150.0);
        assert!(p.place_at(&item(1, 50.0, 50.0, 50.0), Vec3::zero()));

        let next = item(2, 50.0, 50.0, 50.0);
        assert_eq!(
            SlotSearch::default().find_position(&p, &next),
            Some(Vec3::new(0.0, 0.0, 50.0))
        );
        assert_eq!(
            LowestLayerSearch::default().find_position(&p, &next),
            Some(Vec3::new(50.0, 0.0, 0.0))
        );
    }

    #[test]
    fn corner_distance_differs_from_legacy() {
        let mut p = pallet(100.0, 100.0, 150.0);
        assert!(p.place_at(&item(1, 10.0, 10.0, 50.0), Vec3::zero()));

        // Legacy stops at the first valid slot, on top of the column at
        // x = 0. Corner distance keeps scanning and prefers the floor slot
        // right behind the column.
        let next = item(2, 10.0, 10.0, 10.0);
        let legacy = SlotSearch::new(1.0, WasteMetric::Legacy)
            .find_position(&p, &next)
            .unwrap();
        let corner = SlotSearch::new(1.0, WasteMetric::CornerDistance)
            .find_position(&p, &next)
            .unwrap();
        assert_eq!(legacy, Vec3::new(0.0, 0.0, 50.0));
        assert_eq!(corner, Vec3::new(0.0, 10.0, 0.0));
    }

    #[test]
    fn legacy_waste_is_position_independent() {
        let p = pallet(100.0, 100.0, 100.0);
        let b = item(1, 10.0, 10.0, 10.0);
        let metric = WasteMetric::Legacy;
        let a = metric.waste(&p, &b, Vec3::zero());
        let c = metric.waste(&p, &b, Vec3::new(50.0, 20.0, 0.0));
        assert_eq!(a, c);
        assert!((a - 999_000.0).abs() < EPSILON_GENERAL);
        assert!(metric.is_position_independent());
        assert!(!WasteMetric::CornerDistance.is_position_independent());
    }

    #[test]
    fn waste_metric_parses_names() {
        assert_eq!("legacy".parse::<WasteMetric>(), Ok(WasteMetric::Legacy));
        assert_eq!(
            "Corner_Distance".parse::<WasteMetric>(),
            Ok(WasteMetric::CornerDistance)
        );
        assert!("smallest".parse::<WasteMetric>().is_err());
    }

    #[test]
    fn no_position_when_box_is_blocked() {
        let mut p = pallet(50.0, 50.0, 50.0);
        assert!(p.place_at(&item(1, 50.0, 50.0, 50.0), Vec3::zero()));
        let b = item(2, 10.0, 10.0, 10.0);
        assert!(LowestLayerSearch::default().find_position(&p, &b).is_none());
        assert!(SlotSearch::default().find_position(&p, &b).is_none());
    }
}
