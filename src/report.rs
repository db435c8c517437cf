//! Output artefacts of a packing run.
//!
//! [`PackReport`] is the read-only view handed to rendering and reporting:
//! every pallet with its placed boxes, usage metrics and quality tuple, the
//! dropped boxes and a run summary. It serialises to JSON and renders as a
//! plain-text summary through [`fmt::Display`].

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::model::{Pallet, PalletCapacity};
use crate::optimizer::{PackingResult, UnplacedReason};
use crate::scoring::{PalletMetrics, QualityScore, StabilityPolicy, score_with_policy};
use crate::types::{Dimensional, EPSILON_HEIGHT, Weighted};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlacedBoxReport {
    pub id: usize,
    pub position: (f64, f64, f64),
    pub dims: (f64, f64, f64),
    pub weight: f64,
}

/// Boxes whose bottom face lies at the same height.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayerReport {
    pub z: f64,
    pub box_ids: Vec<usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PalletReport {
    pub id: usize,
    pub capacity: PalletCapacity,
    pub boxes: Vec<PlacedBoxReport>,
    pub layers: Vec<LayerReport>,
    pub metrics: PalletMetrics,
    pub quality: QualityScore,
}

impl PalletReport {
    pub fn from_pallet(pallet: &Pallet, policy: StabilityPolicy) -> Self {
        let boxes: Vec<PlacedBoxReport> = pallet
            .boxes()
            .iter()
            .map(|placed| PlacedBoxReport {
                id: placed.object.id(),
                position: placed.position.as_tuple(),
                dims: placed.dimensions().as_tuple(),
                weight: placed.weight(),
            })
            .collect();
        Self {
            id: pallet.id(),
            capacity: *pallet.capacity(),
            layers: group_layers(&boxes),
            boxes,
            metrics: PalletMetrics::from_pallet(pallet),
            quality: score_with_policy(pallet, policy),
        }
    }
}

fn group_layers(boxes: &[PlacedBoxReport]) -> Vec<LayerReport> {
    let mut layers: Vec<LayerReport> = Vec::new();
    for placed in boxes {
        let z = placed.position.2;
        match layers
            .iter_mut()
            .find(|layer| (layer.z - z).abs() <= EPSILON_HEIGHT)
        {
            Some(layer) => layer.box_ids.push(placed.id),
            None => layers.push(LayerReport {
                z,
                box_ids: vec![placed.id],
            }),
        }
    }
    layers.sort_by(|a, b| a.z.total_cmp(&b.z));
    layers
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DroppedBox {
    pub id: usize,
    pub dims: (f64, f64, f64),
    pub weight: f64,
    pub reason: UnplacedReason,
    pub reason_text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub pallet_count: usize,
    pub placed_count: usize,
    pub dropped_count: usize,
    pub dropped_ids: Vec<usize>,
    pub boxes_per_pallet: f64,
    pub total_weight: f64,
    /// Mean volume utilization in percent.
    pub average_utilization: f64,
    pub average_quality: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PackReport {
    pub heuristic: String,
    pub stability_policy: StabilityPolicy,
    pub pallets: Vec<PalletReport>,
    pub dropped: Vec<DroppedBox>,
    pub summary: RunSummary,
}

impl PackReport {
    pub fn from_result(result: &PackingResult, policy: StabilityPolicy) -> Self {
        let pallets: Vec<PalletReport> = result
            .pallets
            .iter()
            .map(|pallet| PalletReport::from_pallet(pallet, policy))
            .collect();
        let dropped: Vec<DroppedBox> = result
            .unplaced
            .iter()
            .map(|unplaced| DroppedBox {
                id: unplaced.object.id(),
                dims: unplaced.object.dims().as_tuple(),
                weight: unplaced.object.weight(),
                reason: unplaced.reason,
                reason_text: unplaced.reason.to_string(),
            })
            .collect();

        let pallet_count = pallets.len();
        let placed_count = result.placed_count();
        let (boxes_per_pallet, average_quality) = if pallet_count == 0 {
            (0.0, 0.0)
        } else {
            let quality_sum: f64 = pallets.iter().map(|p| p.quality.quality).sum();
            (
                placed_count as f64 / pallet_count as f64,
                quality_sum / pallet_count as f64,
            )
        };

        let summary = RunSummary {
            pallet_count,
            placed_count,
            dropped_count: dropped.len(),
            dropped_ids: result.dropped_ids(),
            boxes_per_pallet,
            total_weight: result.total_packed_weight(),
            average_utilization: result.average_utilization(),
            average_quality,
        };

        Self {
            heuristic: result.heuristic.to_string(),
            stability_policy: policy,
            pallets,
            dropped,
            summary,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        write_json(self, path)
    }
}

/// Writes any report value as pretty-printed JSON, creating parent
/// directories as needed.
pub fn write_json<T: Serialize + ?Sized>(
    value: &T,
    path: impl AsRef<Path>,
) -> Result<(), ReportError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

impl fmt::Display for PackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = &self.summary;
        writeln!(f, "Palletization summary ({})", self.heuristic)?;
        writeln!(f, "Pallets used: {}", summary.pallet_count)?;
        writeln!(
            f,
            "Boxes placed: {} ({:.1} per pallet)",
            summary.placed_count, summary.boxes_per_pallet
        )?;
        writeln!(f, "Average quality: {:.3}", summary.average_quality)?;
        writeln!(f, "Average utilization: {:.1}%", summary.average_utilization)?;

        for pallet in &self.pallets {
            writeln!(f)?;
            writeln!(f, "Pallet {}:", pallet.id)?;
            writeln!(
                f,
                "- Total weight: {:.1} kg ({:.1}%)",
                pallet.metrics.used_weight, pallet.metrics.weight_percent
            )?;
            writeln!(f, "- Boxes: {}", pallet.boxes.len())?;
            writeln!(
                f,
                "- Height used: {:.1} cm ({:.1}%)",
                pallet.metrics.used_height, pallet.metrics.height_percent
            )?;
            writeln!(f, "- Quality: {:.3}", pallet.quality.quality)?;
            writeln!(f, "- Layers:")?;
            for layer in &pallet.layers {
                writeln!(f, "  z = {:.1} cm:", layer.z)?;
                for placed in pallet.boxes.iter().filter(|b| layer.box_ids.contains(&b.id)) {
                    let (w, l, h) = placed.dims;
                    writeln!(
                        f,
                        "    - Box {}: {}x{}x{} cm, {} kg",
                        placed.id, w, l, h, placed.weight
                    )?;
                }
            }
        }

        if !self.dropped.is_empty() {
            writeln!(f)?;
            writeln!(f, "Dropped boxes: {}", self.dropped.len())?;
            for dropped in &self.dropped {
                writeln!(f, "- Box {}: {}", dropped.id, dropped.reason_text)?;
            }
        }
        Ok(())
    }
}

/// Side-by-side table of several runs on the same input.
pub struct Comparison<'a>(pub &'a [PackReport]);

impl Comparison<'_> {
    /// Best run: fewest dropped boxes, then fewest pallets, then highest
    /// average quality. Earlier reports win ties.
    pub fn best(&self) -> Option<&PackReport> {
        self.0.iter().reduce(|best, candidate| {
            if rank(candidate, best) == Ordering::Less {
                candidate
            } else {
                best
            }
        })
    }
}

fn rank(a: &PackReport, b: &PackReport) -> Ordering {
    a.summary
        .dropped_count
        .cmp(&b.summary.dropped_count)
        .then(a.summary.pallet_count.cmp(&b.summary.pallet_count))
        .then(
            b.summary
                .average_quality
                .total_cmp(&a.summary.average_quality),
        )
}

impl fmt::Display for Comparison<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "| Heuristic | Pallets | Placed | Dropped | Avg quality | Avg utilization |"
        )?;
        writeln!(
            f,
            "|-----------|---------|--------|---------|-------------|-----------------|"
        )?;
        for report in self.0 {
            let s = &report.summary;
            writeln!(
                f,
                "| {} | {} | {} | {} | {:.3} | {:.1}% |",
                report.heuristic,
                s.pallet_count,
                s.placed_count,
                s.dropped_count,
                s.average_quality,
                s.average_utilization
            )?;
        }
        if let Some(best) = self.best() {
            writeln!(f)?;
            writeln!(f, "Best: {}", best.heuristic)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Box3D;
    use crate::optimizer::{Heuristic, PackingConfig, pack_boxes};
    use tempfile::tempdir;

    fn config() -> PackingConfig {
        PackingConfig::builder()
            .capacity(PalletCapacity::new(100.0, 100.0, 150.0, 1000.0).unwrap())
            .build()
    }

    fn boxes() -> Vec<Box3D> {
        vec![
            Box3D::new(1, 50.0, 50.0, 50.0, 100.0).unwrap(),
            Box3D::new(2, 50.0, 50.0, 50.0, 100.0).unwrap(),
            Box3D::new(3, 100.0, 100.0, 50.0, 200.0).unwrap(),
            Box3D::new(4, 150.0, 10.0, 10.0, 1.0).unwrap(),
        ]
    }

    fn report(heuristic: Heuristic) -> PackReport {
        let result = pack_boxes(boxes(), heuristic, &config()).unwrap();
        PackReport::from_result(&result, StabilityPolicy::Additive)
    }

    #[test]
    fn report_carries_pallets_and_drops() {
        let report = report(Heuristic::FirstFit);
        assert_eq!(report.heuristic, "first-fit");
        assert_eq!(report.summary.pallet_count, 1);
        assert_eq!(report.summary.placed_count, 3);
        assert_eq!(report.summary.dropped_ids, vec![4]);
        assert_eq!(report.dropped[0].reason, UnplacedReason::DimensionsExceedPallet);

        let pallet = &report.pallets[0];
        assert_eq!(pallet.boxes.len(), 3);
        assert_eq!(pallet.boxes[1].position, (50.0, 0.0, 0.0));
        assert!(pallet.quality.quality > 0.0);
    }

    #[test]
    fn layers_group_boxes_by_height() {
        let report = report(Heuristic::FirstFit);
        let layers = &report.pallets[0].layers;
        assert_eq!(
            layers,
            &vec![
                LayerReport {
                    z: 0.0,
                    box_ids: vec![1, 2],
                },
                LayerReport {
                    z: 50.0,
                    box_ids: vec![3],
                },
            ]
        );
    }

    #[test]
    fn summary_text_lists_pallets_layers_and_drops() {
        let text = report(Heuristic::FirstFit).to_string();
        assert!(text.contains("Pallets used: 1"));
        assert!(text.contains("Pallet 1:"));
        assert!(text.contains("z = 50.0 cm:"));
        assert!(text.contains("- Box 3: 100x100x50 cm, 200 kg"));
        assert!(text.contains("Dropped boxes: 1"));
    }

    #[test]
    fn json_report_is_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("report.json");
        let report = report(Heuristic::Guillotine);
        report.write_json(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw, report.to_json_pretty().unwrap());
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["heuristic"], "guillotine");
        assert_eq!(value["stability_policy"], "additive");
        assert_eq!(value["dropped"][0]["reason"], "dimensions_exceed_pallet");
        assert_eq!(value["pallets"][0]["boxes"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn empty_run_has_zero_averages() {
        let result = pack_boxes(Vec::new(), Heuristic::FirstFit, &config()).unwrap();
        let report = PackReport::from_result(&result, StabilityPolicy::Additive);
        assert_eq!(report.summary.pallet_count, 0);
        assert_eq!(report.summary.boxes_per_pallet, 0.0);
        assert_eq!(report.summary.average_quality, 0.0);
    }

    #[test]
    fn comparison_table_names_best_run() {
        let reports: Vec<PackReport> = Heuristic::all(2).into_iter().map(report).collect();
        let table = Comparison(&reports).to_string();
        assert!(table.starts_with("| Heuristic |"));
        for r in &reports {
            assert!(table.contains(&r.heuristic));
        }
        assert!(table.contains("Best: "));
        assert!(Comparison(&[]).best().is_none());

        let dir = tempdir().unwrap();
        let path = dir.path().join("comparison.json");
        write_json(reports.as_slice(), &path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(5));
    }
}
