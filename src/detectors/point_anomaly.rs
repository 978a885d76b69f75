//! Point-Anomaly Detector: an isolation-forest-style unsupervised model
//! over the 8-dimensional point feature vector. Grounded in
//! `isolation_forest_detector.py`'s `is_trained` / `train` / `predict`
//! contract and score-normalization-to-[0,1] behavior, reimplemented as
//! an actual randomized-split forest rather than a port of the Python.

use rand::prelude::*;

use crate::features::PointFeatures;
use crate::models::{ModelMeta, PointScore};

const N_TREES: usize = 64;
const SUBSAMPLE_SIZE: usize = 256;
const N_FEATURES: usize = 8;

#[derive(Debug, Clone)]
enum Node {
    Leaf { size: usize },
    Split {
        feature: usize,
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

struct Forest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl Forest {
    fn average_path_length(&self, point: &[f64; N_FEATURES]) -> f64 {
        let total: f64 = self
            .trees
            .iter()
            .map(|tree| path_length(tree, point, 0))
            .sum();
        total / self.trees.len() as f64
    }
}

/// Expected path length of an unsuccessful BST search over `n` items
/// (the standard isolation-forest normalization constant c(n)).
fn c_factor(n: usize) -> f64 {
    if n <= 1 {
        return 1.0;
    }
    let n = n as f64;
    2.0 * (n - 1.0).ln() + 0.5772156649 - 2.0 * (n - 1.0) / n
}

fn path_length(node: &Node, point: &[f64; N_FEATURES], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + c_factor(*size),
        Node::Split {
            feature,
            value,
            left,
            right,
        } => {
            if point[*feature] < *value {
                path_length(left, point, depth + 1)
            } else {
                path_length(right, point, depth + 1)
            }
        }
    }
}

fn build_tree(samples: &[[f64; N_FEATURES]], depth: usize, max_depth: usize, rng: &mut impl Rng) -> Node {
    if samples.len() <= 1 || depth >= max_depth {
        return Node::Leaf { size: samples.len().max(1) };
    }

    let feature = rng.gen_range(0..N_FEATURES);
    let (min, max) = samples.iter().fold((f64::MAX, f64::MIN), |(mn, mx), s| {
        (mn.min(s[feature]), mx.max(s[feature]))
    });
    if (max - min).abs() < f64::EPSILON {
        return Node::Leaf { size: samples.len() };
    }
    let value = rng.gen_range(min..max);

    let (left, right): (Vec<_>, Vec<_>) = samples.iter().partition(|s| s[feature] < value);
    if left.is_empty() || right.is_empty() {
        return Node::Leaf { size: samples.len() };
    }

    Node::Split {
        feature,
        value,
        left: Box::new(build_tree(
            &left.into_iter().cloned().collect::<Vec<_>>(),
            depth + 1,
            max_depth,
            rng,
        )),
        right: Box::new(build_tree(
            &right.into_iter().cloned().collect::<Vec<_>>(),
            depth + 1,
            max_depth,
            rng,
        )),
    }
}

/// Not thread-safe by itself; the Model Registry holds this behind an
/// `Arc<RwLock<_>>` and swaps whole instances rather than mutating in place.
pub struct PointAnomalyDetector {
    forest: Option<Forest>,
    pub meta: Option<ModelMeta>,
}

impl PointAnomalyDetector {
    pub fn untrained() -> Self {
        Self {
            forest: None,
            meta: None,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.forest.is_some()
    }

    /// Fits a fresh forest over `samples`. No-op (returns `self`
    /// unchanged via caller discipline) if below `MIN_FIT_SAMPLES` —
    /// callers are expected to check `samples.len()` beforehand.
    pub fn fit(samples: &[PointFeatures], version: String) -> Self {
        let vectors: Vec<[f64; N_FEATURES]> = samples.iter().map(|f| f.as_vec()).collect();
        let mut rng = StdRng::seed_from_u64(fold_seed(&vectors));
        let max_depth = (SUBSAMPLE_SIZE.min(vectors.len()) as f64).log2().ceil() as usize;

        let trees = (0..N_TREES)
            .map(|_| {
                let subsample: Vec<[f64; N_FEATURES]> = if vectors.len() > SUBSAMPLE_SIZE {
                    vectors
                        .choose_multiple(&mut rng, SUBSAMPLE_SIZE)
                        .cloned()
                        .collect()
                } else {
                    vectors.clone()
                };
                build_tree(&subsample, 0, max_depth.max(1), &mut rng)
            })
            .collect();

        Self {
            forest: Some(Forest {
                trees,
                sample_size: vectors.len(),
            }),
            meta: Some(ModelMeta {
                detector_name: "point_anomaly",
                version,
                sample_count: samples.len(),
                fit_time: chrono::Utc::now(),
            }),
        }
    }

    pub fn score(&self, features: &PointFeatures) -> PointScore {
        let Some(forest) = &self.forest else {
            return PointScore::untrained();
        };
        let point = features.as_vec();
        let avg_path = forest.average_path_length(&point);
        let c = c_factor(forest.sample_size.max(2));
        let anomaly_score = 2f64.powf(-avg_path / c);
        let is_anomaly = anomaly_score > 0.65;
        let confidence = ((anomaly_score - 0.5).abs() * 2.0).clamp(0.0, 1.0);
        PointScore {
            anomaly_score,
            is_anomaly,
            confidence,
        }
    }
}

/// Deterministic seed derived from the training set so repeated fits
/// over identical data are reproducible in tests.
fn fold_seed(vectors: &[[f64; N_FEATURES]]) -> u64 {
    let mut acc: u64 = vectors.len() as u64;
    for v in vectors {
        for f in v {
            acc = acc.wrapping_mul(31).wrapping_add(f.to_bits());
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(speed: f64) -> PointFeatures {
        PointFeatures {
            speed_kmh: speed,
            distance_per_minute_km: speed / 60.0,
            inactivity_minutes: 1.0,
            speed_variance: 0.5,
            location_density: 0.1,
            time_of_day_risk: 0.1,
            movement_consistency: 0.9,
            deviation_from_route_km: 0.0,
        }
    }

    #[test]
    fn untrained_detector_returns_zero_score() {
        let detector = PointAnomalyDetector::untrained();
        let score = detector.score(&sample(5.0));
        assert!(!score.is_anomaly);
        assert_eq!(score.confidence, 0.0);
    }

    #[test]
    fn outlier_speed_scores_higher_than_typical_speed() {
        let mut samples: Vec<PointFeatures> = (0..50).map(|_| sample(5.0)).collect();
        samples.push(sample(4.5));
        samples.push(sample(5.5));
        let detector = PointAnomalyDetector::fit(&samples, "v1".into());
        let typical = detector.score(&sample(5.0));
        let outlier = detector.score(&sample(400.0));
        assert!(outlier.anomaly_score >= typical.anomaly_score);
    }
}
