//! Sequence-Anomaly Detector: a percentile-threshold statistical model
//! over the windowed point-feature sequence. Simpler than the point
//! detector by design — spec.md §4.5 calls for a statistical model
//! here, not a second learned ensemble — and sums four bounded risk
//! contributions: movement variance, time irregularity, a night-hour
//! penalty, and an inactivity-over-2h penalty.

use crate::features::SequenceFeatures;
use crate::models::{ModelMeta, SequenceScore};

pub const MIN_SEQ_POINTS: usize = 5;

/// Inactivity past this many minutes (spec.md §4.5: "inactivity > 2h")
/// starts contributing to the risk score.
const INACTIVITY_ALERT_MINUTES: f64 = 120.0;

/// Implied hours (from `time_of_day_risk = hour / 24`) that count as
/// "night" for the night-hour penalty.
fn is_night_hour(time_of_day_risk: f64) -> bool {
    let hour = (time_of_day_risk * 24.0).round() as i64;
    !(5..22).contains(&hour)
}

#[derive(Debug, Clone, Copy)]
struct Thresholds {
    movement_variance_p90: f64,
    time_irregularity_p90: f64,
}

pub struct SequenceAnomalyDetector {
    thresholds: Option<Thresholds>,
    pub meta: Option<ModelMeta>,
}

impl SequenceAnomalyDetector {
    pub fn untrained() -> Self {
        Self {
            thresholds: None,
            meta: None,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.thresholds.is_some()
    }

    /// Builds per-window movement-variance and time-irregularity
    /// statistics across `samples` and stores their 90th-percentile
    /// thresholds (spec.md §4.5). Windows shorter than `MIN_SEQ_POINTS`
    /// don't carry enough signal and are skipped.
    pub fn fit(samples: &[SequenceFeatures], version: String) -> Self {
        let mut variances = Vec::new();
        let mut irregularities = Vec::new();
        for sample in samples {
            if sample.active_len < MIN_SEQ_POINTS {
                continue;
            }
            let active = sample.active();
            variances.push(mean(active.iter().map(|p| p.speed_variance)));
            irregularities.push(sample_variance(active.iter().map(|p| p.distance_per_minute_km)));
        }
        variances.sort_by(|a, b| a.partial_cmp(b).unwrap());
        irregularities.sort_by(|a, b| a.partial_cmp(b).unwrap());

        Self {
            thresholds: Some(Thresholds {
                movement_variance_p90: percentile(&variances, 0.90),
                time_irregularity_p90: percentile(&irregularities, 0.90),
            }),
            meta: Some(ModelMeta {
                detector_name: "sequence_anomaly",
                version,
                sample_count: samples.len(),
                fit_time: chrono::Utc::now(),
            }),
        }
    }

    pub fn score(&self, features: &SequenceFeatures) -> SequenceScore {
        let Some(thresholds) = &self.thresholds else {
            return SequenceScore::unavailable();
        };
        if features.active_len < MIN_SEQ_POINTS {
            return SequenceScore::unavailable();
        }
        let active = features.active();

        let mean_variance = mean(active.iter().map(|p| p.speed_variance));
        let distance_irregularity = sample_variance(active.iter().map(|p| p.distance_per_minute_km));
        let night_fraction =
            active.iter().filter(|p| is_night_hour(p.time_of_day_risk)).count() as f64 / active.len() as f64;
        let max_inactivity = active.iter().map(|p| p.inactivity_minutes).fold(0.0_f64, f64::max);

        let movement_risk = excess_ratio(mean_variance, thresholds.movement_variance_p90);
        let irregularity_risk = excess_ratio(distance_irregularity, thresholds.time_irregularity_p90);
        let night_penalty = night_fraction;
        let inactivity_penalty =
            ((max_inactivity - INACTIVITY_ALERT_MINUTES) / INACTIVITY_ALERT_MINUTES).clamp(0.0, 1.0);

        let risk_score = (0.35 * movement_risk
            + 0.25 * irregularity_risk
            + 0.20 * night_penalty
            + 0.20 * inactivity_penalty)
            .clamp(0.0, 1.0);
        let pattern_deviation = (0.5 * movement_risk + 0.5 * irregularity_risk).clamp(0.0, 1.0);
        let confidence = 0.5 + 0.5 * (1.0 - (-risk_score * 3.0).exp());

        SequenceScore {
            risk_score,
            pattern_deviation,
            confidence,
        }
    }
}

/// 0 below the threshold, approaching 1 as the value grows past it.
fn excess_ratio(value: f64, threshold: f64) -> f64 {
    if threshold <= f64::EPSILON {
        return if value > 0.0 { 1.0 } else { 0.0 };
    }
    ((value - threshold) / threshold).clamp(0.0, 1.0)
}

fn mean<I: Iterator<Item = f64>>(values: I) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn sample_variance<I: Iterator<Item = f64>>(values: I) -> f64 {
    let xs: Vec<f64> = values.collect();
    if xs.len() < 2 {
        return 0.0;
    }
    let m = xs.iter().sum::<f64>() / xs.len() as f64;
    xs.iter().map(|v| (v - m).powi(2)).sum::<f64>() / xs.len() as f64
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
