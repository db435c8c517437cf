//! Pallet building engine.
//!
//! Assigns a stream of rectangular boxes to capacity-bounded pallets and
//! computes an exact, supported position for each of them. Five assignment
//! heuristics are available (see [`optimizer::Heuristic`]); the resulting
//! pallets can be scored with [`scoring::score`] and exported through
//! [`report::PackReport`].
//!
//! ```
//! use palletizer::model::{Box3D, PalletCapacity};
//! use palletizer::optimizer::{Heuristic, PackingConfig, pack_boxes};
//!
//! let config = PackingConfig::builder()
//!     .capacity(PalletCapacity::new(100.0, 100.0, 150.0, 1000.0).unwrap())
//!     .build();
//! let boxes = vec![Box3D::new(1, 50.0, 50.0, 50.0, 100.0).unwrap()];
//! let result = pack_boxes(boxes, Heuristic::FirstFit, &config).unwrap();
//! assert_eq!(result.pallet_count(), 1);
//! ```

pub mod config;
pub mod conveyor;
pub mod geometry;
pub mod model;
pub mod occupancy;
pub mod optimizer;
pub mod placement;
pub mod report;
pub mod scoring;
pub mod types;
