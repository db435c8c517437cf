//! Box ingestion and conveyor simulation.
//!
//! Records are read from a CSV file with an `id,width,length,height,weight`
//! header (column order free, extra columns ignored). Rows that fail to
//! parse or validate are skipped with a warning; the packing engine only
//! ever sees validated [`Box3D`] values.
//!
//! The conveyor delivers boxes through a channel at a fixed interval and
//! re-packs everything seen so far after each arrival. The interval only
//! paces the output: the final assignment equals a direct
//! [`pack_boxes`] call on the same boxes.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::model::{Box3D, ValidationError};
use crate::optimizer::{Heuristic, PackingConfig, PackingResult, pack_boxes};
use crate::scoring::{PalletMetrics, QualityScore, score_with_policy};

const COLUMNS: [&str; 5] = ["id", "width", "length", "height", "weight"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("missing column '{0}' in CSV header")]
    MissingColumn(&'static str),

    #[error("malformed input: {0}")]
    Malformed(String),
}

/// A CSV row that was not turned into a box.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedRecord {
    /// 1-based line number in the input.
    pub line: usize,
    pub reason: String,
}

/// Boxes read from an input, in record order.
#[derive(Clone, Debug, Default)]
pub struct IngestOutcome {
    pub boxes: Vec<Box3D>,
    pub skipped: Vec<SkippedRecord>,
}

/// Reads box records from a CSV file.
pub fn load_boxes_csv(path: impl AsRef<Path>) -> Result<IngestOutcome, IngestError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let outcome = parse_boxes_csv(BufReader::new(file))?;
    info!(
        path = %path.display(),
        boxes = outcome.boxes.len(),
        skipped = outcome.skipped.len(),
        "boxes loaded"
    );
    Ok(outcome)
}

/// Parses box records from CSV text.
///
/// # Errors
/// `Malformed` when the input has no header line, `MissingColumn` when the
/// header lacks one of the required columns.
pub fn parse_boxes_csv(reader: impl BufRead) -> Result<IngestOutcome, IngestError> {
    let mut lines = reader.lines().enumerate();

    let header = loop {
        match lines.next() {
            Some((_, line)) => {
                let line = line?;
                if !line.trim().is_empty() {
                    break line;
                }
            }
            None => return Err(IngestError::Malformed("no header line".to_string())),
        }
    };

    let names: Vec<String> = header
        .split(',')
        .map(|name| name.trim().trim_matches('"').to_ascii_lowercase())
        .collect();
    let mut indices = [0usize; 5];
    for (slot, column) in indices.iter_mut().zip(COLUMNS) {
        *slot = names
            .iter()
            .position(|name| name == column)
            .ok_or(IngestError::MissingColumn(column))?;
    }

    let mut outcome = IngestOutcome::default();
    let mut seen_ids = HashSet::new();
    for (index, line) in lines {
        let line = line?;
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        match parse_record(&line, &indices) {
            Ok(object) if !seen_ids.insert(object.id()) => {
                skip(&mut outcome, line_no, format!("duplicate box id {}", object.id()));
            }
            Ok(object) => outcome.boxes.push(object),
            Err(reason) => skip(&mut outcome, line_no, reason),
        }
    }
    Ok(outcome)
}

fn skip(outcome: &mut IngestOutcome, line: usize, reason: String) {
    warn!(line, reason = %reason, "skipping box record");
    outcome.skipped.push(SkippedRecord { line, reason });
}

fn parse_record(line: &str, indices: &[usize; 5]) -> Result<Box3D, String> {
    let fields: Vec<&str> = line.split(',').map(|f| f.trim().trim_matches('"')).collect();
    let number = |column: usize| -> Result<f64, String> {
        let raw = field(&fields, indices, column)?;
        raw.parse::<f64>()
            .map_err(|err| format!("invalid {} '{}': {}", COLUMNS[column], raw, err))
    };

    let raw_id = field(&fields, indices, 0)?;
    let id = raw_id
        .parse::<usize>()
        .map_err(|err| format!("invalid id '{}': {}", raw_id, err))?;
    Box3D::new(id, number(1)?, number(2)?, number(3)?, number(4)?)
        .map_err(|err: ValidationError| err.to_string())
}

fn field<'a>(fields: &[&'a str], indices: &[usize; 5], column: usize) -> Result<&'a str, String> {
    fields
        .get(indices[column])
        .copied()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| format!("missing value for '{}'", COLUMNS[column]))
}

/// Feeds boxes into a channel, one per `interval`.
///
/// Must be called inside a Tokio runtime. The feeder stops early when the
/// receiving side is dropped.
pub fn conveyor_stream(boxes: Vec<Box3D>, interval: Duration) -> ReceiverStream<Box3D> {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        for object in boxes {
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            if tx.send(object).await.is_err() {
                debug!("conveyor receiver closed");
                break;
            }
        }
    });
    ReceiverStream::new(rx)
}

#[derive(Debug, Error)]
pub enum ConveyorError {
    #[error(transparent)]
    Packing(#[from] ValidationError),

    #[error("packing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// State of the palletization after one arrival.
#[derive(Clone, Debug, Serialize)]
pub struct ConveyorSnapshot {
    /// Number of boxes that have arrived so far.
    pub arrived: usize,
    pub box_id: usize,
    pub pallets: usize,
    pub placed: usize,
    pub unplaced: usize,
    /// Metrics of the most recently opened pallet.
    pub current_pallet: Option<PalletMetrics>,
    pub current_quality: Option<QualityScore>,
}

impl ConveyorSnapshot {
    fn from_result(
        arrived: usize,
        box_id: usize,
        result: &PackingResult,
        config: &PackingConfig,
    ) -> Self {
        let last = result.pallets.last();
        Self {
            arrived,
            box_id,
            pallets: result.pallet_count(),
            placed: result.placed_count(),
            unplaced: result.unplaced_count(),
            current_pallet: last.map(PalletMetrics::from_pallet),
            current_quality: last.map(|p| score_with_policy(p, config.stability_policy)),
        }
    }
}

/// Consumes arriving boxes and re-runs `heuristic` on all boxes seen so
/// far after each arrival.
///
/// Packing runs on the blocking pool. Returns the result for the complete
/// arrival sequence.
pub async fn run_conveyor<S>(
    mut arrivals: S,
    heuristic: Heuristic,
    config: PackingConfig,
    mut on_snapshot: impl FnMut(&ConveyorSnapshot),
) -> Result<PackingResult, ConveyorError>
where
    S: Stream<Item = Box3D> + Unpin,
{
    let mut seen: Vec<Box3D> = Vec::new();
    let mut latest: Option<PackingResult> = None;

    while let Some(object) = arrivals.next().await {
        let box_id = object.id();
        debug!(box_id, "box arrived");
        seen.push(object);

        let batch = seen.clone();
        let result =
            tokio::task::spawn_blocking(move || pack_boxes(batch, heuristic, &config)).await??;

        on_snapshot(&ConveyorSnapshot::from_result(
            seen.len(),
            box_id,
            &result,
            &config,
        ));
        latest = Some(result);
    }

    match latest {
        Some(result) => Ok(result),
        None => Ok(pack_boxes(Vec::new(), heuristic, &config)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PalletCapacity;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "\
id,width,length,height,weight
1,50,50,50,100
2,80,80,80,800
3,80,80,80,800
";

    fn config() -> PackingConfig {
        PackingConfig::builder()
            .capacity(PalletCapacity::new(100.0, 100.0, 150.0, 1000.0).unwrap())
            .build()
    }

    #[test]
    fn parses_records_in_order() {
        let outcome = parse_boxes_csv(Cursor::new(SAMPLE)).unwrap();
        let ids: Vec<usize> = outcome.boxes.iter().map(Box3D::id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.boxes[1].dims().as_tuple(), (80.0, 80.0, 80.0));
    }

    #[test]
    fn header_order_is_free() {
        let csv = "Weight, ID ,height,length,width,label\n12.5,7,30,20,10,fragile\n";
        let outcome = parse_boxes_csv(Cursor::new(csv)).unwrap();
        assert_eq!(outcome.boxes.len(), 1);
        let object = &outcome.boxes[0];
        assert_eq!(object.id(), 7);
        assert_eq!(object.dims().as_tuple(), (10.0, 20.0, 30.0));
    }

    #[test]
    fn invalid_rows_are_skipped() {
        let csv = "\
id,width,length,height,weight
1,10,10,10,1
2,-5,10,10,1
3,10,ten,10,1
4,10,10
1,10,10,10,1

5,10,10,10,0
6,20,20,20,2
";
        let outcome = parse_boxes_csv(Cursor::new(csv)).unwrap();
        let ids: Vec<usize> = outcome.boxes.iter().map(Box3D::id).collect();
        assert_eq!(ids, vec![1, 6]);
        let lines: Vec<usize> = outcome.skipped.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![3, 4, 5, 6, 8]);
        assert!(outcome.skipped[3].reason.contains("duplicate"));
    }

    #[test]
    fn missing_column_is_an_error() {
        let err = parse_boxes_csv(Cursor::new("id,width,length,height\n1,2,3,4\n")).unwrap_err();
        assert!(matches!(err, IngestError::MissingColumn("weight")));

        let err = parse_boxes_csv(Cursor::new("\n\n")).unwrap_err();
        assert!(matches!(err, IngestError::Malformed(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let outcome = load_boxes_csv(file.path()).unwrap();
        assert_eq!(outcome.boxes.len(), 3);

        let missing = load_boxes_csv(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(IngestError::Io(_))));
    }

    #[tokio::test]
    async fn stream_delivers_boxes_in_order() {
        let boxes = parse_boxes_csv(Cursor::new(SAMPLE)).unwrap().boxes;
        let received: Vec<Box3D> = conveyor_stream(boxes.clone(), Duration::from_millis(1))
            .collect()
            .await;
        assert_eq!(received, boxes);
    }

    #[tokio::test]
    async fn conveyor_snapshots_follow_arrivals() {
        let boxes = parse_boxes_csv(Cursor::new(SAMPLE)).unwrap().boxes;
        let mut snapshots = Vec::new();
        let result = run_conveyor(
            conveyor_stream(boxes, Duration::ZERO),
            Heuristic::FirstFit,
            config(),
            |s| snapshots.push(s.clone()),
        )
        .await
        .unwrap();

        let arrived: Vec<usize> = snapshots.iter().map(|s| s.arrived).collect();
        assert_eq!(arrived, vec![1, 2, 3]);
        let pallets: Vec<usize> = snapshots.iter().map(|s| s.pallets).collect();
        assert_eq!(pallets, vec![1, 1, 2]);
        assert_eq!(snapshots[2].box_id, 3);
        assert!(snapshots[0].current_quality.is_some());
        assert_eq!(result.placed_count(), 3);
    }

    #[tokio::test]
    async fn pacing_does_not_change_placements() {
        let boxes = parse_boxes_csv(Cursor::new(SAMPLE)).unwrap().boxes;
        let heuristic = Heuristic::BestFitLookahead { lookahead: 2 };
        let direct = pack_boxes(boxes.clone(), heuristic, &config()).unwrap();
        let paced = run_conveyor(
            conveyor_stream(boxes, Duration::from_millis(2)),
            heuristic,
            config(),
            |_| {},
        )
        .await
        .unwrap();

        let positions = |r: &PackingResult| -> Vec<(usize, usize, (f64, f64, f64))> {
            r.pallets
                .iter()
                .flat_map(|p| {
                    p.boxes()
                        .iter()
                        .map(move |b| (p.id(), b.object.id(), b.position.as_tuple()))
                })
                .collect()
        };
        assert_eq!(positions(&direct), positions(&paced));
    }

    #[tokio::test]
    async fn empty_conveyor_yields_empty_result() {
        let result = run_conveyor(
            tokio_stream::iter(Vec::<Box3D>::new()),
            Heuristic::FirstFit,
            config(),
            |_| panic!("no snapshot expected"),
        )
        .await
        .unwrap();
        assert_eq!(result.pallet_count(), 0);
    }
}
