//! Persisted and in-memory entity types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TouristId = i64;
pub type LocationId = i64;
pub type AssessmentId = i64;
pub type AlertId = i64;
pub type ZoneId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tourist {
    pub id: TouristId,
    pub name: String,
    pub contact: String,
    pub emergency_contact: String,
    pub age: Option<u32>,
    pub nationality: Option<String>,
    pub passport_number: Option<String>,
    /// Mutable, last-computed value. Invariant 1: equals the most recent
    /// Assessment's safety_score, or 100 if none exists.
    pub safety_score: u8,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tourist {
    pub fn new(id: TouristId, name: String, contact: String, emergency_contact: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            contact,
            emergency_contact,
            age: None,
            nationality: None,
            passport_number: None,
            safety_score: 100,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub tourist_id: TouristId,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub event_time: DateTime<Utc>,
    pub inserted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Safe,
    Warning,
    Critical,
}

impl Severity {
    /// Invariant 2: SAFE >= 80, WARNING in [50,80), CRITICAL < 50.
    pub fn from_score(score: u8) -> Self {
        if score >= 80 {
            Severity::Safe
        } else if score >= 50 {
            Severity::Warning
        } else {
            Severity::Critical
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceVerdict {
    pub in_restricted: bool,
    pub in_safe: bool,
    pub zone_name: Option<String>,
    pub danger_level: Option<u8>,
    pub safety_rating: Option<u8>,
}

impl GeofenceVerdict {
    pub fn unknown() -> Self {
        Self {
            in_restricted: false,
            in_safe: false,
            zone_name: None,
            danger_level: None,
            safety_rating: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointScore {
    pub anomaly_score: f64,
    pub is_anomaly: bool,
    pub confidence: f64,
}

impl PointScore {
    pub fn untrained() -> Self {
        Self {
            anomaly_score: 0.0,
            is_anomaly: false,
            confidence: 0.0,
        }
    }

    pub fn unavailable() -> Self {
        Self::untrained()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceScore {
    pub risk_score: f64,
    pub pattern_deviation: f64,
    pub confidence: f64,
}

impl SequenceScore {
    pub fn unavailable() -> Self {
        Self {
            risk_score: 0.0,
            pattern_deviation: 0.0,
            confidence: 0.0,
        }
    }
}

/// What fed into the Fusion Scorer, beyond the three detector outputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FusionSideChannel {
    pub sos: bool,
    pub manual_risk_level: Option<u8>,
    pub safe_duration_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionResult {
    pub score: u8,
    pub severity: Severity,
    pub confidence: f64,
    pub recommendations: Vec<String>,
    pub alerts_to_raise: Vec<RaisedAlert>,
}

/// An alert the Fusion Scorer says should be raised; the Assessment
/// Engine turns these into persisted Alert rows via the Dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaisedAlert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    pub tourist_id: TouristId,
    pub location_id: LocationId,
    pub safety_score: u8,
    pub severity: Severity,
    pub geofence: GeofenceVerdict,
    pub anomaly_score: f64,
    pub temporal_risk_score: f64,
    pub confidence: f64,
    pub recommendations: Vec<String>,
    pub point_model_version: Option<String>,
    pub sequence_model_version: Option<String>,
    pub degraded: bool,
    pub degraded_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    Panic,
    Sos,
    Geofence,
    Anomaly,
    Temporal,
    LowScore,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    FalseAlarm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub tourist_id: TouristId,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: AlertStatus,
    pub auto_generated: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub event_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneKind {
    Restricted,
    Safe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    /// Ordered ring of (lon, lat) pairs.
    pub polygon: Vec<(f64, f64)>,
    pub kind: ZoneKind,
    /// Danger level (restricted zones) or safety rating (safe zones), 0-10.
    pub rating: u8,
    pub is_active: bool,
}

impl Zone {
    pub fn bounding_box(&self) -> BoundingBox {
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lon = f64::MAX;
        let mut max_lon = f64::MIN;
        for &(lon, lat) in &self.polygon {
            min_lat = min_lat.min(lat);
            max_lat = max_lat.max(lat);
            min_lon = min_lon.min(lon);
            max_lon = max_lon.max(lon);
        }
        BoundingBox {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// In-memory only: metadata describing a trained detector snapshot,
/// hot-swapped under an atomic reference by the Model Registry.
#[derive(Debug, Clone)]
pub struct ModelMeta {
    pub detector_name: &'static str,
    pub version: String,
    pub sample_count: usize,
    pub fit_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_bands_match_invariant_2() {
        assert_eq!(Severity::from_score(100), Severity::Safe);
        assert_eq!(Severity::from_score(80), Severity::Safe);
        assert_eq!(Severity::from_score(79), Severity::Warning);
        assert_eq!(Severity::from_score(50), Severity::Warning);
        assert_eq!(Severity::from_score(49), Severity::Critical);
        assert_eq!(Severity::from_score(0), Severity::Critical);
    }

    #[test]
    fn bounding_box_contains_point_inside_ring() {
        let zone = Zone {
            id: 1,
            name: "test".into(),
            polygon: vec![(77.20, 28.60), (77.25, 28.60), (77.25, 28.65), (77.20, 28.65)],
            kind: ZoneKind::Restricted,
            rating: 2,
            is_active: true,
        };
        let bbox = zone.bounding_box();
        assert!(bbox.contains(28.62, 77.22));
        assert!(!bbox.contains(28.70, 77.22));
    }
}
