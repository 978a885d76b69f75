//! Append-only row store: the real persistence engine is an
//! out-of-scope external collaborator, so this is an in-memory
//! stand-in exposing the same filtered-read/insert contract.
//!
//! Tables are independent `RwLock<Vec<T>>`s rather than one giant lock.
//! Surrogate keys are monotonically increasing `AtomicI64` counters,
//! which also gives a stable per-tourist ordering (event timestamp,
//! then monotonic insert id).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::models::*;

#[derive(Default)]
struct Tables {
    tourists: RwLock<Vec<Tourist>>,
    locations: RwLock<Vec<Location>>,
    assessments: RwLock<Vec<Assessment>>,
    alerts: RwLock<Vec<Alert>>,
    zones: RwLock<Vec<Zone>>,
}

pub struct Store {
    tables: Tables,
    next_tourist_id: AtomicI64,
    next_location_id: AtomicI64,
    next_assessment_id: AtomicI64,
    next_alert_id: AtomicI64,
    next_zone_id: AtomicI64,
}

#[derive(Debug, Default, Clone)]
pub struct AlertFilter {
    pub tourist_id: Option<TouristId>,
    pub status: Option<AlertStatus>,
    pub severity: Option<AlertSeverity>,
    pub kind: Option<AlertKind>,
    pub limit: usize,
    pub offset: usize,
}

impl Store {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tables: Tables::default(),
            next_tourist_id: AtomicI64::new(1),
            next_location_id: AtomicI64::new(1),
            next_assessment_id: AtomicI64::new(1),
            next_alert_id: AtomicI64::new(1),
            next_zone_id: AtomicI64::new(1),
        })
    }

    // ---------------------------------------------------------------
    // Tourists
    // ---------------------------------------------------------------

    pub async fn insert_tourist(
        &self,
        name: String,
        contact: String,
        emergency_contact: String,
    ) -> Tourist {
        let id = self.next_tourist_id.fetch_add(1, Ordering::SeqCst);
        let tourist = Tourist::new(id, name, contact, emergency_contact);
        self.tables.tourists.write().await.push(tourist.clone());
        tourist
    }

    pub async fn get_tourist(&self, id: TouristId) -> AppResult<Tourist> {
        self.tables
            .tourists
            .read()
            .await
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("tourist {id}")))
    }

    /// Sets `safety_score` directly. Invariant 2: callers must have already
    /// derived `score` from the Fusion Scorer — this is the only writer.
    pub async fn set_tourist_safety_score(&self, id: TouristId, score: u8) -> AppResult<()> {
        let mut tourists = self.tables.tourists.write().await;
        let tourist = tourists
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| AppError::NotFound(format!("tourist {id}")))?;
        tourist.safety_score = score;
        tourist.updated_at = Utc::now();
        Ok(())
    }

    pub async fn count_tourists(&self) -> usize {
        self.tables.tourists.read().await.len()
    }

    pub async fn active_tourist_ids(&self) -> Vec<TouristId> {
        self.tables
            .tourists
            .read()
            .await
            .iter()
            .filter(|t| t.is_active)
            .map(|t| t.id)
            .collect()
    }

    // ---------------------------------------------------------------
    // Locations
    // ---------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_location(
        &self,
        tourist_id: TouristId,
        latitude: f64,
        longitude: f64,
        altitude: Option<f64>,
        accuracy: Option<f64>,
        speed: Option<f64>,
        heading: Option<f64>,
    ) -> Location {
        let id = self.next_location_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let location = Location {
            id,
            tourist_id,
            latitude,
            longitude,
            altitude,
            accuracy,
            speed,
            heading,
            event_time: now,
            inserted_at: now,
        };
        self.tables.locations.write().await.push(location.clone());
        location
    }

    pub async fn get_location(&self, id: LocationId) -> AppResult<Location> {
        self.tables
            .locations
            .read()
            .await
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("location {id}")))
    }

    /// Locations for a tourist ordered oldest-first, from `since` to now.
    pub async fn locations_since(
        &self,
        tourist_id: TouristId,
        since: DateTime<Utc>,
    ) -> Vec<Location> {
        let mut out: Vec<Location> = self
            .tables
            .locations
            .read()
            .await
            .iter()
            .filter(|l| l.tourist_id == tourist_id && l.event_time >= since)
            .cloned()
            .collect();
        out.sort_by_key(|l| (l.event_time, l.id));
        out
    }

    pub async fn recent_locations(&self, tourist_id: TouristId, limit: usize) -> Vec<Location> {
        let mut out: Vec<Location> = self
            .tables
            .locations
            .read()
            .await
            .iter()
            .filter(|l| l.tourist_id == tourist_id)
            .cloned()
            .collect();
        out.sort_by_key(|l| (l.event_time, l.id));
        let start = out.len().saturating_sub(limit);
        out[start..].to_vec()
    }

    /// All locations across all (active) tourists since a cutoff, for the
    /// Training Scheduler's rolling window.
    pub async fn locations_since_all(
        &self,
        since: DateTime<Utc>,
        active_tourist_ids: &[TouristId],
    ) -> Vec<Location> {
        self.tables
            .locations
            .read()
            .await
            .iter()
            .filter(|l| l.event_time >= since && active_tourist_ids.contains(&l.tourist_id))
            .cloned()
            .collect()
    }

    pub async fn count_locations(&self) -> usize {
        self.tables.locations.read().await.len()
    }

    pub async fn locations_inserted_since(&self, since: DateTime<Utc>) -> usize {
        self.tables
            .locations
            .read()
            .await
            .iter()
            .filter(|l| l.inserted_at >= since)
            .count()
    }

    // ---------------------------------------------------------------
    // Assessments
    // ---------------------------------------------------------------

    pub async fn insert_assessment(&self, mut assessment: Assessment) -> Assessment {
        let id = self.next_assessment_id.fetch_add(1, Ordering::SeqCst);
        assessment.id = id;
        self.tables
            .assessments
            .write()
            .await
            .push(assessment.clone());
        assessment
    }

    pub async fn latest_assessment(&self, tourist_id: TouristId) -> Option<Assessment> {
        self.tables
            .assessments
            .read()
            .await
            .iter()
            .filter(|a| a.tourist_id == tourist_id)
            .max_by_key(|a| (a.created_at, a.id))
            .cloned()
    }

    pub async fn count_assessments(&self) -> usize {
        self.tables.assessments.read().await.len()
    }

    // ---------------------------------------------------------------
    // Alerts
    // ---------------------------------------------------------------

    pub async fn insert_alert(&self, mut alert: Alert) -> Alert {
        let id = self.next_alert_id.fetch_add(1, Ordering::SeqCst);
        alert.id = id;
        self.tables.alerts.write().await.push(alert.clone());
        alert
    }

    pub async fn get_alert(&self, id: AlertId) -> AppResult<Alert> {
        self.tables
            .alerts
            .read()
            .await
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("alert {id}")))
    }

    pub async fn update_alert<F: FnOnce(&mut Alert)>(&self, id: AlertId, f: F) -> AppResult<Alert> {
        let mut alerts = self.tables.alerts.write().await;
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| AppError::NotFound(format!("alert {id}")))?;
        f(alert);
        Ok(alert.clone())
    }

    /// Recent duplicate lookup for Alert Dispatcher idempotency: same
    /// tourist, kind, second-bucketed timestamp, and coordinate rounded
    /// to 5 decimals.
    pub async fn find_recent_duplicate(
        &self,
        tourist_id: TouristId,
        kind: AlertKind,
        bucket_secs: i64,
        lat_rounded: Option<i64>,
        lon_rounded: Option<i64>,
    ) -> bool {
        self.tables.alerts.read().await.iter().any(|a| {
            a.tourist_id == tourist_id
                && a.kind == kind
                && a.event_time.timestamp() == bucket_secs
                && a.latitude.map(|v| (v * 100_000.0).round() as i64) == lat_rounded
                && a.longitude.map(|v| (v * 100_000.0).round() as i64) == lon_rounded
        })
    }

    pub async fn filter_alerts(&self, filter: &AlertFilter) -> Vec<Alert> {
        let mut out: Vec<Alert> = self
            .tables
            .alerts
            .read()
            .await
            .iter()
            .filter(|a| filter.tourist_id.map_or(true, |t| a.tourist_id == t))
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter(|a| filter.severity.map_or(true, |s| a.severity == s))
            .filter(|a| filter.kind.map_or(true, |k| a.kind == k))
            .cloned()
            .collect();
        out.sort_by_key(|a| std::cmp::Reverse(a.event_time));
        let start = filter.offset.min(out.len());
        let end = (start + filter.limit).min(out.len());
        out[start..end].to_vec()
    }

    pub async fn recent_alerts(&self, tourist_id: TouristId, limit: usize) -> Vec<Alert> {
        self.filter_alerts(&AlertFilter {
            tourist_id: Some(tourist_id),
            limit,
            ..Default::default()
        })
        .await
    }

    pub async fn count_alerts(&self) -> usize {
        self.tables.alerts.read().await.len()
    }

    pub async fn alerts_inserted_since(&self, since: DateTime<Utc>) -> usize {
        self.tables
            .alerts
            .read()
            .await
            .iter()
            .filter(|a| a.event_time >= since)
            .count()
    }

    // ---------------------------------------------------------------
    // Zones
    // ---------------------------------------------------------------

    pub async fn insert_zone(
        &self,
        name: String,
        polygon: Vec<(f64, f64)>,
        kind: ZoneKind,
        rating: u8,
    ) -> Zone {
        let id = self.next_zone_id.fetch_add(1, Ordering::SeqCst);
        let zone = Zone {
            id,
            name,
            polygon,
            kind,
            rating,
            is_active: true,
        };
        self.tables.zones.write().await.push(zone.clone());
        zone
    }

    pub async fn active_zones(&self) -> Vec<Zone> {
        self.tables
            .zones
            .read()
            .await
            .iter()
            .filter(|z| z.is_active)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tourist_round_trip_defaults_to_full_score() {
        let store = Store::new();
        let t = store
            .insert_tourist("A".into(), "+91...1".into(), "+91...9".into())
            .await;
        assert_eq!(t.safety_score, 100);
        let fetched = store.get_tourist(t.id).await.unwrap();
        assert_eq!(fetched.id, t.id);
    }

    #[tokio::test]
    async fn alert_dedup_lookup_matches_bucketed_identical_alert() {
        let store = Store::new();
        let t = store.insert_tourist("A".into(), "c".into(), "e".into()).await;
        let alert = Alert {
            id: 0,
            tourist_id: t.id,
            kind: AlertKind::Geofence,
            severity: AlertSeverity::High,
            message: "x".into(),
            description: None,
            latitude: Some(28.61290),
            longitude: Some(77.22950),
            status: AlertStatus::Active,
            auto_generated: true,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
            event_time: Utc::now(),
        };
        let inserted = store.insert_alert(alert.clone()).await;
        let bucket = inserted.event_time.timestamp();
        let lat_rounded = Some((inserted.latitude.unwrap() * 100_000.0).round() as i64);
        let lon_rounded = Some((inserted.longitude.unwrap() * 100_000.0).round() as i64);
        assert!(
            store
                .find_recent_duplicate(t.id, AlertKind::Geofence, bucket, lat_rounded, lon_rounded)
                .await
        );
    }
}
