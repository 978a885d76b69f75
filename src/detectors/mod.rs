//! Learned detectors (spec.md §4.5): a point-anomaly detector (isolation
//! forest over single-ping features) and a sequence-anomaly detector
//! (percentile-threshold model over windowed features). Both expose a
//! `fit`/`score` contract with an explicit untrained default, mirroring
//! the `is_trained` guard in the original engine's isolation-forest
//! wrapper.

pub mod point_anomaly;
pub mod sequence_anomaly;

pub use point_anomaly::PointAnomalyDetector;
pub use sequence_anomaly::SequenceAnomalyDetector;

/// Minimum sample count before a detector will attempt to fit. Below
/// this, `fit` is a no-op and the detector stays untrained.
pub const MIN_FIT_SAMPLES: usize = 10;
