//! Feature Extractor: turns a raw `Location` plus its recent history
//! into the numeric vectors the two learned detectors consume.

use chrono::Timelike;

use crate::models::Location;

/// Mean radius of the Earth in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point counts toward `inactivity_duration` while its displacement
/// from the current point stays below this, in meters (spec.md §4.2).
const INACTIVITY_RADIUS_METERS: f64 = 50.0;

/// `C` in `movement_consistency = 1 - min(1, speed_variance / C)`
/// (spec.md §4.2). A 30 km/h swing between segments (900 (km/h)^2 of
/// variance) already saturates the penalty.
const MOVEMENT_CONSISTENCY_C: f64 = 900.0;

/// Length `L` of the fixed sequence window (spec.md §4.2).
pub const SEQUENCE_WINDOW_LEN: usize = 10;

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1r, lat2r) = (lat1.to_radians(), lat2.to_radians());
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1r.cos() * lat2r.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Per-point feature vector fed to the Point-Anomaly Detector, matching
/// spec.md §4.2's eight point features in order. Field order is the
/// contract the detector's standardizer relies on.
#[derive(Debug, Clone, Copy)]
pub struct PointFeatures {
    pub speed_kmh: f64,
    pub distance_per_minute_km: f64,
    pub inactivity_minutes: f64,
    pub speed_variance: f64,
    pub location_density: f64,
    pub time_of_day_risk: f64,
    pub movement_consistency: f64,
    pub deviation_from_route_km: f64,
}

impl PointFeatures {
    pub fn as_vec(&self) -> [f64; 8] {
        [
            self.speed_kmh,
            self.distance_per_minute_km,
            self.inactivity_minutes,
            self.speed_variance,
            self.location_density,
            self.time_of_day_risk,
            self.movement_consistency,
            self.deviation_from_route_km,
        ]
    }

    /// The zero vector used to left-pad a short sequence window
    /// (spec.md §4.2: "left-padded with zeros when history is short").
    pub fn zero() -> Self {
        Self {
            speed_kmh: 0.0,
            distance_per_minute_km: 0.0,
            inactivity_minutes: 0.0,
            speed_variance: 0.0,
            location_density: 0.0,
            time_of_day_risk: 0.0,
            movement_consistency: 0.0,
            deviation_from_route_km: 0.0,
        }
    }
}

/// Per-sequence feature vector fed to the Sequence-Anomaly Detector: a
/// fixed-length L=10 tail of point-feature vectors (spec.md §4.2),
/// left-padded with `PointFeatures::zero()` when history is short.
/// `active_len` records how many of the ten slots are real (not
/// padding) so the detector can tell a padded zero from a genuinely
/// zero-valued reading.
#[derive(Debug, Clone, Copy)]
pub struct SequenceFeatures {
    pub points: [PointFeatures; SEQUENCE_WINDOW_LEN],
    pub active_len: usize,
}

impl SequenceFeatures {
    pub fn active(&self) -> &[PointFeatures] {
        &self.points[SEQUENCE_WINDOW_LEN - self.active_len..]
    }
}

/// Builds the point-level feature vector for `current`, given the
/// tourist's history ordered oldest-first and ending just before
/// `current` (may be empty on a tourist's first ping).
pub fn extract_point_features(current: &Location, history: &[Location]) -> PointFeatures {
    let previous = history.last();

    let (speed_kmh, distance_per_minute_km) = match previous {
        Some(prev) => {
            let dist = haversine_km(prev.latitude, prev.longitude, current.latitude, current.longitude);
            let minutes = ((current.event_time - prev.event_time).num_seconds() as f64 / 60.0).max(1e-6);
            let derived_speed = dist / (minutes / 60.0);
            (current.speed.unwrap_or(derived_speed), dist / minutes)
        }
        None => (current.speed.unwrap_or(0.0), 0.0),
    };

    let inactivity_minutes = inactivity_duration_minutes(current, history);
    let speed_variance = segment_speed_variance(current, history);
    let location_density = unique_location_count(current, history);
    let time_of_day_risk = current.event_time.hour() as f64 / 24.0;
    let movement_consistency = 1.0 - (speed_variance / MOVEMENT_CONSISTENCY_C).min(1.0);

    PointFeatures {
        speed_kmh,
        distance_per_minute_km,
        inactivity_minutes,
        speed_variance,
        location_density,
        time_of_day_risk,
        movement_consistency,
        // No planned-route polyline exists anywhere in this crate's
        // data model, so this is always the spec's "0 if no route" case.
        deviation_from_route_km: 0.0,
    }
}

/// Accumulated minutes over the recent suffix during which displacement
/// from `current` stayed below `INACTIVITY_RADIUS_METERS` (spec.md
/// §4.2). Walks backward from `current` and stops at the first point
/// that had already moved away, so an earlier long stay doesn't get
/// counted once the tourist has since wandered off.
fn inactivity_duration_minutes(current: &Location, history: &[Location]) -> f64 {
    let mut total = 0.0;
    let mut reference_time = current.event_time;
    for loc in history.iter().rev() {
        let displacement_m =
            haversine_km(current.latitude, current.longitude, loc.latitude, loc.longitude) * 1000.0;
        if displacement_m >= INACTIVITY_RADIUS_METERS {
            break;
        }
        let minutes = (reference_time - loc.event_time).num_seconds() as f64 / 60.0;
        total += minutes.max(0.0);
        reference_time = loc.event_time;
    }
    total
}

/// Sample variance of segment speeds across `history` plus the final
/// segment into `current` (spec.md §4.2: "sample variance of segment
/// speeds in window").
fn segment_speed_variance(current: &Location, history: &[Location]) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    let mut speeds = Vec::with_capacity(history.len());
    for pair in history.windows(2) {
        speeds.push(segment_speed(&pair[0], &pair[1]));
    }
    if let Some(last) = history.last() {
        speeds.push(segment_speed(last, current));
    }
    sample_variance(&speeds)
}

fn segment_speed(a: &Location, b: &Location) -> f64 {
    let dist = haversine_km(a.latitude, a.longitude, b.latitude, b.longitude);
    let minutes = ((b.event_time - a.event_time).num_seconds() as f64 / 60.0).max(1e-6);
    dist / (minutes / 60.0)
}

fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Count of unique (lat, lon) pairs rounded to 3 decimals across
/// `current` plus `history` — spec.md §4.2's literal `location_density`
/// definition, an integer count rather than a distance.
fn unique_location_count(current: &Location, history: &[Location]) -> f64 {
    let mut seen = std::collections::HashSet::new();
    seen.insert(round_coord(current.latitude, current.longitude));
    for loc in history {
        seen.insert(round_coord(loc.latitude, loc.longitude));
    }
    seen.len() as f64
}

fn round_coord(lat: f64, lon: f64) -> (i64, i64) {
    ((lat * 1000.0).round() as i64, (lon * 1000.0).round() as i64)
}

/// Builds the fixed-length L=10 window of point-feature vectors for the
/// Sequence-Anomaly Detector (spec.md §4.2), left-padded with zeros when
/// history is short. `history` is ordered oldest-first; its last element
/// is the point currently being scored. Each slot's point features are
/// computed against that slot's own prior history, not just the window.
pub fn extract_sequence_features(history: &[Location]) -> SequenceFeatures {
    let window_start = history.len().saturating_sub(SEQUENCE_WINDOW_LEN);
    let tail = &history[window_start..];
    let mut points = [PointFeatures::zero(); SEQUENCE_WINDOW_LEN];
    let pad = SEQUENCE_WINDOW_LEN - tail.len();
    for (i, loc) in tail.iter().enumerate() {
        let prior = &history[..window_start + i];
        points[pad + i] = extract_point_features(loc, prior);
    }
    SequenceFeatures {
        points,
        active_len: tail.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn loc(id: i64, lat: f64, lon: f64, minutes_offset: i64) -> Location {
        let base = Utc::now();
        Location {
            id,
            tourist_id: 1,
            latitude: lat,
            longitude: lon,
            altitude: None,
            accuracy: None,
            speed: None,
            heading: None,
            event_time: base + Duration::minutes(minutes_offset),
            inserted_at: base,
        }
    }

    #[test]
    fn haversine_zero_for_identical_points() {
        assert_eq!(haversine_km(28.6, 77.2, 28.6, 77.2), 0.0);
    }

    #[test]
    fn point_features_without_history_has_zero_inactivity() {
        let current = loc(1, 28.6, 77.2, 0);
        let features = extract_point_features(&current, &[]);
        assert_eq!(features.inactivity_minutes, 0.0);
    }

    #[test]
    fn time_of_day_risk_is_hour_over_24() {
        let mut current = loc(1, 28.6, 77.2, 0);
        current.event_time = current
            .event_time
            .date_naive()
            .and_hms_opt(6, 0, 0)
            .unwrap()
            .and_utc();
        let features = extract_point_features(&current, &[]);
        assert!((features.time_of_day_risk - 6.0 / 24.0).abs() < 1e-9);
    }

    #[test]
    fn inactivity_accumulates_only_while_within_50_meters() {
        let near1 = loc(1, 28.60000, 77.20000, -20);
        let near2 = loc(2, 28.60001, 77.20001, -10);
        let current = loc(3, 28.60001, 77.20001, 0);
        let features = extract_point_features(&current, &[near1, near2]);
        assert!(features.inactivity_minutes >= 19.0);

        let far = loc(1, 29.0, 78.0, -20);
        let features_far = extract_point_features(&current, &[far]);
        assert_eq!(features_far.inactivity_minutes, 0.0);
    }

    #[test]
    fn location_density_counts_unique_rounded_coordinates() {
        let current = loc(3, 28.60001, 77.20001, 0);
        let same_spot = loc(2, 28.60002, 77.20000, -5);
        let other_spot = loc(1, 29.0, 78.0, -10);
        let features = extract_point_features(&current, &[other_spot, same_spot]);
        // current and same_spot round to the same (lat, lon) triple; other_spot is distinct.
        assert_eq!(features.location_density, 2.0);
    }

    #[test]
    fn sequence_features_pad_short_history_with_zeros() {
        let history = [loc(1, 28.6, 77.2, -5), loc(2, 28.6, 77.2, 0)];
        let sequence = extract_sequence_features(&history);
        assert_eq!(sequence.active_len, 2);
        assert_eq!(sequence.active().len(), 2);
        let padded = &sequence.points[..SEQUENCE_WINDOW_LEN - 2];
        assert!(padded.iter().all(|p| p.speed_kmh == 0.0));
    }

    #[test]
    fn sequence_features_window_caps_at_fixed_length() {
        let history: Vec<Location> = (0..15)
            .map(|i| loc(i, 28.6 + i as f64 * 0.001, 77.2, i * 5))
            .collect();
        let sequence = extract_sequence_features(&history);
        assert_eq!(sequence.active_len, SEQUENCE_WINDOW_LEN);
    }
}
