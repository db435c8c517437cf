//! Quality scoring for populated pallets.
//!
//! The quality score is a weighted composite of four components, each
//! clamped to `[0, 1]` before combining:
//!
//! | Component             | Weight |
//! |-----------------------|--------|
//! | volume utilization    | 0.40   |
//! | weight distribution   | 0.30   |
//! | stability             | 0.20   |
//! | height utilization    | 0.10   |
//!
//! An empty pallet scores 0 on every component.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::Pallet;

/// Penalty policy for boxes that are neither on the floor nor resting on
/// another box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StabilityPolicy {
    /// Subtract 0.1 per unsupported box.
    #[default]
    Additive,
    /// Halve the score per unsupported box.
    Multiplicative,
}

impl StabilityPolicy {
    pub const ADDITIVE_PENALTY: f64 = 0.1;
    pub const MULTIPLICATIVE_FACTOR: f64 = 0.5;

    /// Stability in `[0, 1]` for the given number of unsupported boxes.
    pub fn score(&self, unsupported: usize) -> f64 {
        let raw = match self {
            StabilityPolicy::Additive => 1.0 - Self::ADDITIVE_PENALTY * unsupported as f64,
            StabilityPolicy::Multiplicative => {
                Self::MULTIPLICATIVE_FACTOR.powi(unsupported.min(i32::MAX as usize) as i32)
            }
        };
        raw.clamp(0.0, 1.0)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StabilityPolicy::Additive => "additive",
            StabilityPolicy::Multiplicative => "multiplicative",
        }
    }
}

impl fmt::Display for StabilityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StabilityPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "additive" => Ok(StabilityPolicy::Additive),
            "multiplicative" => Ok(StabilityPolicy::Multiplicative),
            other => Err(format!("unknown stability policy '{}'", other)),
        }
    }
}

/// Weights of the quality components.
pub mod weights {
    pub const VOLUME: f64 = 0.40;
    pub const WEIGHT_DISTRIBUTION: f64 = 0.30;
    pub const STABILITY: f64 = 0.20;
    pub const HEIGHT: f64 = 0.10;
}

/// Individual quality components, each in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct QualityComponents {
    pub volume_utilization: f64,
    pub weight_distribution: f64,
    pub stability_score: f64,
    pub height_utilization: f64,
}

/// Composite quality of a pallet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct QualityScore {
    pub quality: f64,
    pub components: QualityComponents,
}

/// Scores a pallet with the default (additive) stability policy.
pub fn score(pallet: &Pallet) -> QualityScore {
    score_with_policy(pallet, StabilityPolicy::default())
}

/// Scores a pallet with an explicit stability policy.
pub fn score_with_policy(pallet: &Pallet, policy: StabilityPolicy) -> QualityScore {
    if pallet.is_empty() {
        return QualityScore::default();
    }

    let capacity = pallet.capacity();
    let components = QualityComponents {
        volume_utilization: clamp_unit(pallet.used_volume() / pallet.volume()),
        weight_distribution: clamp_unit(weight_distribution(pallet)),
        stability_score: clamp_unit(pallet.stability_score_with(policy)),
        height_utilization: clamp_unit(pallet.max_stack_height() / capacity.max_height),
    };

    let quality = weights::VOLUME * components.volume_utilization
        + weights::WEIGHT_DISTRIBUTION * components.weight_distribution
        + weights::STABILITY * components.stability_score
        + weights::HEIGHT * components.height_utilization;

    QualityScore {
        quality: clamp_unit(quality),
        components,
    }
}

/// `1 − (deviation_x + deviation_y) / 2` of the centroid from the pallet
/// center, normalised by the half extents. 0 when the pallet carries no
/// weight.
pub fn weight_distribution(pallet: &Pallet) -> f64 {
    if pallet.current_weight() <= 0.0 {
        return 0.0;
    }
    centroid_balance(pallet)
}

/// Same measure as [`weight_distribution`] but without the zero-weight
/// special case; an empty pallet counts as perfectly balanced.
pub fn centroid_balance(pallet: &Pallet) -> f64 {
    let capacity = pallet.capacity();
    let centroid = pallet.centroid();
    let half_x = capacity.max_width / 2.0;
    let half_y = capacity.max_length / 2.0;
    let deviation_x = (centroid.x - half_x).abs() / half_x;
    let deviation_y = (centroid.y - half_y).abs() / half_y;
    1.0 - (deviation_x + deviation_y) / 2.0
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Usage figures of a pallet in absolute and relative terms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PalletMetrics {
    pub used_weight: f64,
    pub max_weight: f64,
    pub weight_percent: f64,
    pub used_volume: f64,
    pub total_volume: f64,
    pub volume_percent: f64,
    pub used_height: f64,
    pub max_height: f64,
    pub height_percent: f64,
}

impl PalletMetrics {
    pub fn from_pallet(pallet: &Pallet) -> Self {
        let capacity = pallet.capacity();
        let used_weight = pallet.current_weight();
        let used_volume = pallet.used_volume();
        let total_volume = pallet.volume();
        let used_height = pallet.max_stack_height();
        Self {
            used_weight,
            max_weight: capacity.max_weight,
            weight_percent: used_weight / capacity.max_weight * 100.0,
            used_volume,
            total_volume,
            volume_percent: used_volume / total_volume * 100.0,
            used_height,
            max_height: capacity.max_height,
            height_percent: used_height / capacity.max_height * 100.0,
        }
    }
}
