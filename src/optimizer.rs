//! Assignment heuristics that distribute a box sequence over pallets.
//!
//! Every heuristic consumes the boxes in a fixed order, asks the existing
//! pallets to accept each box and opens a new pallet when none does. Boxes
//! that do not even fit an empty pallet are dropped with a warning and end
//! up in [`PackingResult::unplaced`]; a drop never aborts the run.
//!
//! Available strategies:
//! - First-Fit: arrival order, first pallet that accepts
//! - First-Fit-Decreasing: volume-sorted, first pallet that accepts
//! - Best-Fit-Decreasing: volume-sorted, tightest pallet first
//! - Guillotine: arrival order, slot search minimising a waste metric
//! - Best-Fit-Lookahead: scores every eligible pallet on a snapshot,
//!   taking the next K queued boxes into account

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{Box3D, Pallet, PalletCapacity, PlacedBox, ValidationError};
use crate::placement::{LowestLayerSearch, PlacementStrategy, SlotSearch, WasteMetric};
use crate::scoring::{StabilityPolicy, centroid_balance};
use crate::types::{Dimensional, Vec3, Weighted};

/// The five interchangeable assignment policies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Heuristic {
    #[default]
    FirstFit,
    BestFitDecreasing,
    FirstFitDecreasing,
    Guillotine,
    BestFitLookahead { lookahead: usize },
}

impl Heuristic {
    pub const DEFAULT_LOOKAHEAD: usize = 3;

    /// All heuristics, the lookahead one peeking `lookahead` boxes.
    pub fn all(lookahead: usize) -> [Heuristic; 5] {
        [
            Heuristic::FirstFit,
            Heuristic::BestFitDecreasing,
            Heuristic::FirstFitDecreasing,
            Heuristic::Guillotine,
            Heuristic::BestFitLookahead { lookahead },
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Heuristic::FirstFit => "first-fit",
            Heuristic::BestFitDecreasing => "best-fit-decreasing",
            Heuristic::FirstFitDecreasing => "first-fit-decreasing",
            Heuristic::Guillotine => "guillotine",
            Heuristic::BestFitLookahead { .. } => "best-fit-lookahead",
        }
    }

    /// Replaces the lookahead count; no-op for the other heuristics.
    pub fn with_lookahead(self, lookahead: usize) -> Self {
        match self {
            Heuristic::BestFitLookahead { .. } => Heuristic::BestFitLookahead { lookahead },
            other => other,
        }
    }
}

impl fmt::Display for Heuristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Heuristic::BestFitLookahead { lookahead } => {
                write!(f, "{} (k={})", self.name(), lookahead)
            }
            _ => f.write_str(self.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "unknown heuristic '{0}', expected one of: first-fit, best-fit-decreasing, \
     first-fit-decreasing, guillotine, best-fit-lookahead"
)]
pub struct HeuristicParseError(pub String);

impl FromStr for Heuristic {
    type Err = HeuristicParseError;

    /// Parses a heuristic name; the lookahead variant gets
    /// [`Heuristic::DEFAULT_LOOKAHEAD`].
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "first-fit" | "ff" => Ok(Heuristic::FirstFit),
            "best-fit-decreasing" | "bfd" => Ok(Heuristic::BestFitDecreasing),
            "first-fit-decreasing" | "ffd" => Ok(Heuristic::FirstFitDecreasing),
            "guillotine" => Ok(Heuristic::Guillotine),
            "best-fit-lookahead" | "lookahead" => Ok(Heuristic::BestFitLookahead {
                lookahead: Self::DEFAULT_LOOKAHEAD,
            }),
            _ => Err(HeuristicParseError(raw.to_string())),
        }
    }
}

/// Parameters of a packing run. Immutable for the duration of the run.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PackingConfig {
    pub capacity: PalletCapacity,
    /// Penalty policy used when scoring lookahead snapshots.
    pub stability_policy: StabilityPolicy,
    /// Objective of the Guillotine slot search.
    pub waste_metric: WasteMetric,
    /// Step of the candidate position grid.
    pub grid_step: f64,
}

impl PackingConfig {
    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::default()
    }

    /// Canonical lowest-layer search with this configuration's grid.
    pub fn lowest_layer(&self) -> LowestLayerSearch {
        LowestLayerSearch::new(self.grid_step)
    }

    /// Guillotine slot search with this configuration's grid and metric.
    pub fn slot_search(&self) -> SlotSearch {
        SlotSearch::new(self.grid_step, self.waste_metric)
    }

    /// Checks the pallet capacity and that the grid step is positive and
    /// finite.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.capacity.validate()?;
        if !(self.grid_step > 0.0 && self.grid_step.is_finite()) {
            return Err(ValidationError::InvalidGridStep(format!(
                "Grid step must be positive, got: {}",
                self.grid_step
            )));
        }
        Ok(())
    }
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            capacity: PalletCapacity::default(),
            stability_policy: StabilityPolicy::default(),
            waste_metric: WasteMetric::default(),
            grid_step: LowestLayerSearch::DEFAULT_GRID_STEP,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PackingConfigBuilder {
    config: PackingConfig,
}

impl PackingConfigBuilder {
    pub fn capacity(mut self, capacity: PalletCapacity) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn stability_policy(mut self, policy: StabilityPolicy) -> Self {
        self.config.stability_policy = policy;
        self
    }

    pub fn waste_metric(mut self, metric: WasteMetric) -> Self {
        self.config.waste_metric = metric;
        self
    }

    pub fn grid_step(mut self, step: f64) -> Self {
        self.config.grid_step = step;
        self
    }

    pub fn build(self) -> PackingConfig {
        self.config
    }
}

/// Opens empty pallets of one validated capacity.
#[derive(Clone, Copy, Debug)]
pub struct PalletFactory {
    capacity: PalletCapacity,
}

impl PalletFactory {
    pub fn new(capacity: PalletCapacity) -> Result<Self, ValidationError> {
        capacity.validate()?;
        Ok(Self { capacity })
    }

    pub fn capacity(&self) -> &PalletCapacity {
        &self.capacity
    }

    pub fn open(&self, id: usize) -> Pallet {
        Pallet::with_valid_capacity(id, self.capacity)
    }

    /// Why the box can never go onto a pallet of this type, if it can't.
    pub fn rejection_reason(&self, object: &Box3D) -> Option<UnplacedReason> {
        if object.weight() > self.capacity.max_weight {
            Some(UnplacedReason::TooHeavyForPallet)
        } else if !self.capacity.admits_dimensions(object) {
            Some(UnplacedReason::DimensionsExceedPallet)
        } else {
            None
        }
    }
}

/// Outcome of a packing run.
#[derive(Clone, Debug)]
pub struct PackingResult {
    pub heuristic: Heuristic,
    /// Pallets in creation order.
    pub pallets: Vec<Pallet>,
    /// Dropped boxes in drop order.
    pub unplaced: Vec<UnplacedBox>,
}

impl PackingResult {
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }

    pub fn pallet_count(&self) -> usize {
        self.pallets.len()
    }

    pub fn placed_count(&self) -> usize {
        self.pallets.iter().map(Pallet::len).sum()
    }

    pub fn unplaced_count(&self) -> usize {
        self.unplaced.len()
    }

    pub fn dropped_ids(&self) -> Vec<usize> {
        self.unplaced.iter().map(|u| u.object.id()).collect()
    }

    /// Average volume utilization of all pallets in percent.
    pub fn average_utilization(&self) -> f64 {
        if self.pallets.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .pallets
            .iter()
            .map(|p| p.used_volume() / p.volume() * 100.0)
            .sum();
        sum / self.pallets.len() as f64
    }

    pub fn total_packed_weight(&self) -> f64 {
        self.pallets.iter().map(Pallet::current_weight).sum()
    }
}

/// A box that could not be placed on any pallet.
#[derive(Clone, Debug, PartialEq)]
pub struct UnplacedBox {
    pub object: Box3D,
    pub reason: UnplacedReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnplacedReason {
    TooHeavyForPallet,
    DimensionsExceedPallet,
    NoStablePosition,
}

impl UnplacedReason {
    pub fn code(&self) -> &'static str {
        match self {
            UnplacedReason::TooHeavyForPallet => "too_heavy_for_pallet",
            UnplacedReason::DimensionsExceedPallet => "dimensions_exceed_pallet",
            UnplacedReason::NoStablePosition => "no_stable_position",
        }
    }
}

impl fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnplacedReason::TooHeavyForPallet => {
                write!(f, "Box exceeds the maximum pallet weight")
            }
            UnplacedReason::DimensionsExceedPallet => {
                write!(f, "Box exceeds the pallet bounds in at least one dimension")
            }
            UnplacedReason::NoStablePosition => {
                write!(f, "No supported position found on an empty pallet")
            }
        }
    }
}

/// Progress events emitted while packing.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PackEvent {
    /// A new pallet was opened for the current box.
    PalletOpened {
        id: usize,
        dims: (f64, f64, f64),
        max_weight: f64,
    },
    /// A box was placed.
    BoxPlaced {
        pallet_id: usize,
        box_id: usize,
        position: (f64, f64, f64),
        dims: (f64, f64, f64),
        weight: f64,
        pallet_weight: f64,
    },
    /// A box was dropped.
    BoxRejected {
        box_id: usize,
        dims: (f64, f64, f64),
        weight: f64,
        reason_code: String,
        reason_text: String,
    },
    /// The run is complete.
    Finished {
        heuristic: String,
        pallets: usize,
        placed: usize,
        unplaced: usize,
    },
}

/// Packs boxes with the given heuristic.
///
/// # Errors
/// `ValidationError::InvalidCapacity` if the configured capacity is invalid,
/// `ValidationError::InvalidGridStep` if the grid step is not positive
pub fn pack_boxes(
    boxes: Vec<Box3D>,
    heuristic: Heuristic,
    config: &PackingConfig,
) -> Result<PackingResult, ValidationError> {
    pack_boxes_with_progress(boxes, heuristic, config, |_| {})
}

/// Like [`pack_boxes`], calling `on_event` for every placement, rejection
/// and opened pallet.
pub fn pack_boxes_with_progress(
    boxes: Vec<Box3D>,
    heuristic: Heuristic,
    config: &PackingConfig,
    on_event: impl FnMut(&PackEvent),
) -> Result<PackingResult, ValidationError> {
    config.validate()?;
    let factory = PalletFactory::new(config.capacity)?;
    debug!(heuristic = heuristic.name(), boxes = boxes.len(), "packing started");

    let mut run = PackRun {
        factory: &factory,
        pallets: Vec::new(),
        unplaced: Vec::new(),
        on_event,
    };

    match heuristic {
        Heuristic::FirstFit => run.fill_first(boxes, &config.lowest_layer()),
        Heuristic::FirstFitDecreasing => {
            run.fill_first(sorted_by_volume(boxes), &config.lowest_layer())
        }
        Heuristic::BestFitDecreasing => {
            run.fill_tightest(sorted_by_volume(boxes), &config.lowest_layer())
        }
        Heuristic::Guillotine => run.fill_first(boxes, &config.slot_search()),
        Heuristic::BestFitLookahead { lookahead } => run.fill_lookahead(boxes, lookahead, config),
    }

    Ok(run.finish(heuristic))
}

/// Stable sort by descending volume.
fn sorted_by_volume(mut boxes: Vec<Box3D>) -> Vec<Box3D> {
    boxes.sort_by(|a, b| b.volume().total_cmp(&a.volume()));
    boxes
}

struct PackRun<'a, F> {
    factory: &'a PalletFactory,
    pallets: Vec<Pallet>,
    unplaced: Vec<UnplacedBox>,
    on_event: F,
}

impl<F: FnMut(&PackEvent)> PackRun<'_, F> {
    /// First-Fit loop: existing pallets in creation order.
    fn fill_first<S: PlacementStrategy>(&mut self, boxes: Vec<Box3D>, strategy: &S) {
        for object in boxes {
            let target = self
                .pallets
                .iter_mut()
                .position(|pallet| pallet.try_place_with(strategy, &object));
            match target {
                Some(index) => self.report_placed(index),
                None => self.open_and_place(object, strategy),
            }
        }
    }

    /// Best-Fit loop: capacity-passing pallets by ascending remaining
    /// volume, creation order on ties.
    fn fill_tightest<S: PlacementStrategy>(&mut self, boxes: Vec<Box3D>, strategy: &S) {
        for object in boxes {
            let mut candidates: Vec<(usize, f64)> = self
                .pallets
                .iter()
                .enumerate()
                .filter(|(_, pallet)| pallet.capacity_check(&object))
                .map(|(index, pallet)| (index, pallet.remaining_volume()))
                .collect();
            candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

            let target = candidates
                .into_iter()
                .map(|(index, _)| index)
                .find(|&index| self.pallets[index].try_place_with(strategy, &object));
            match target {
                Some(index) => self.report_placed(index),
                None => self.open_and_place(object, strategy),
            }
        }
    }

    fn fill_lookahead(&mut self, boxes: Vec<Box3D>, lookahead: usize, config: &PackingConfig) {
        let search = config.lowest_layer();
        let mut queue: VecDeque<Box3D> = boxes.into();
        while let Some(object) = queue.pop_front() {
            let peeked: Vec<Box3D> = queue.iter().take(lookahead).cloned().collect();
            let choice = select_lookahead_pallet(&self.pallets, &object, &peeked, config);
            match choice {
                Some(choice) if self.pallets[choice.index].place_at(&object, choice.position) => {
                    self.report_placed(choice.index)
                }
                _ => self.open_and_place(object, &search),
            }
        }
    }

    fn open_and_place<S: PlacementStrategy>(&mut self, object: Box3D, strategy: &S) {
        if let Some(reason) = self.factory.rejection_reason(&object) {
            self.reject(object, reason);
            return;
        }

        let mut pallet = self.factory.open(self.pallets.len() + 1);
        if !pallet.try_place_with(strategy, &object) {
            self.reject(object, UnplacedReason::NoStablePosition);
            return;
        }

        debug!(pallet_id = pallet.id(), box_id = object.id(), "pallet opened");
        let capacity = pallet.capacity();
        (self.on_event)(&PackEvent::PalletOpened {
            id: pallet.id(),
            dims: capacity.dims().as_tuple(),
            max_weight: capacity.max_weight,
        });
        self.pallets.push(pallet);
        self.report_placed(self.pallets.len() - 1);
    }

    fn report_placed(&mut self, index: usize) {
        let pallet = &self.pallets[index];
        if let Some(placed) = pallet.boxes().last() {
            (self.on_event)(&box_placed_event(pallet, placed));
        }
    }

    fn reject(&mut self, object: Box3D, reason: UnplacedReason) {
        warn!(
            box_id = object.id(),
            weight = object.weight(),
            reason = reason.code(),
            "box dropped"
        );
        (self.on_event)(&PackEvent::BoxRejected {
            box_id: object.id(),
            dims: object.dimensions().as_tuple(),
            weight: object.weight(),
            reason_code: reason.code().to_string(),
            reason_text: reason.to_string(),
        });
        self.unplaced.push(UnplacedBox { object, reason });
    }

    fn finish(mut self, heuristic: Heuristic) -> PackingResult {
        let placed = self.pallets.iter().map(Pallet::len).sum();
        info!(
            heuristic = heuristic.name(),
            pallets = self.pallets.len(),
            placed,
            dropped = self.unplaced.len(),
            "packing finished"
        );
        (self.on_event)(&PackEvent::Finished {
            heuristic: heuristic.name().to_string(),
            pallets: self.pallets.len(),
            placed,
            unplaced: self.unplaced.len(),
        });
        PackingResult {
            heuristic,
            pallets: self.pallets,
            unplaced: self.unplaced,
        }
    }
}

fn box_placed_event(pallet: &Pallet, placed: &PlacedBox) -> PackEvent {
    PackEvent::BoxPlaced {
        pallet_id: pallet.id(),
        box_id: placed.object.id(),
        position: placed.position.as_tuple(),
        dims: placed.object.dims().as_tuple(),
        weight: placed.object.weight(),
        pallet_weight: pallet.current_weight(),
    }
}

/// Components of the lookahead composite score of one simulated pallet.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LookaheadScore {
    pub space_utilization: f64,
    pub lookahead_fit_fraction: f64,
    pub stability: f64,
    pub weight_balance: f64,
    pub total: f64,
}

impl LookaheadScore {
    pub const SPACE_WEIGHT: f64 = 0.4;
    pub const FIT_WEIGHT: f64 = 0.3;
    pub const STABILITY_WEIGHT: f64 = 0.2;
    pub const BALANCE_WEIGHT: f64 = 0.1;
}

/// Pallet picked by the lookahead heuristic for the head box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LookaheadChoice {
    /// Index into the pallet list.
    pub index: usize,
    /// Position found by the simulated placement.
    pub position: Vec3,
    pub score: LookaheadScore,
}

/// Scores a pallet snapshot that already holds the head box.
///
/// The fit fraction only runs [`Pallet::capacity_check`] for each peeked
/// box; it is 0 when nothing was peeked.
pub fn lookahead_score(
    simulated: &Pallet,
    peeked: &[Box3D],
    policy: StabilityPolicy,
) -> LookaheadScore {
    let space_utilization = 1.0 - simulated.remaining_volume() / simulated.volume();
    let lookahead_fit_fraction = if peeked.is_empty() {
        0.0
    } else {
        let fitting = peeked
            .iter()
            .filter(|object| simulated.capacity_check(object))
            .count();
        fitting as f64 / peeked.len() as f64
    };
    let stability = simulated.stability_score_with(policy);
    let weight_balance = centroid_balance(simulated);

    let total = LookaheadScore::SPACE_WEIGHT * space_utilization
        + LookaheadScore::FIT_WEIGHT * lookahead_fit_fraction
        + LookaheadScore::STABILITY_WEIGHT * stability
        + LookaheadScore::BALANCE_WEIGHT * weight_balance;

    LookaheadScore {
        space_utilization,
        lookahead_fit_fraction,
        stability,
        weight_balance,
        total,
    }
}

/// Evaluates every capacity-passing pallet on a snapshot and returns the
/// highest-scoring one. Pallets where the simulated placement fails are
/// skipped; on equal scores the earlier pallet wins.
pub fn select_lookahead_pallet(
    pallets: &[Pallet],
    object: &Box3D,
    peeked: &[Box3D],
    config: &PackingConfig,
) -> Option<LookaheadChoice> {
    let search = config.lowest_layer();
    let mut best: Option<LookaheadChoice> = None;

    for (index, pallet) in pallets.iter().enumerate() {
        if !pallet.capacity_check(object) {
            continue;
        }
        let mut simulated = pallet.snapshot();
        let Some(position) = search.find_position(&simulated, object) else {
            continue;
        };
        if !simulated.place_at(object, position) {
            continue;
        }

        let score = lookahead_score(&simulated, peeked, config.stability_policy);
        debug!(
            pallet_id = pallet.id(),
            box_id = object.id(),
            score = score.total,
            "lookahead candidate"
        );
        if best.is_none_or(|current| score.total > current.score.total) {
            best = Some(LookaheadChoice {
                index,
                position,
                score,
            });
        }
    }
    best
}
