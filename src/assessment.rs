//! Assessment Engine: orchestrates one location ping through
//! RECEIVED, FETCHED_CONTEXT, FEATURES, SCORED, PERSISTED, NOTIFIED,
//! falling back to a degraded assessment when a detector misses its
//! soft deadline, or when any later stage fails outright, rather than
//! failing the request.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::dispatcher::AlertDispatcher;
use crate::detectors::sequence_anomaly::MIN_SEQ_POINTS;
use crate::error::{AppError, AppResult};
use crate::features::{self, SequenceFeatures};
use crate::fusion::FusionScorer;
use crate::geofence;
use crate::models::{
    Alert, Assessment, FusionSideChannel, GeofenceVerdict, Location, PointScore, SequenceScore, Severity, Tourist,
};
use crate::registry::ModelRegistry;
use crate::store::Store;
use crate::zone_index::ZoneIndex;

/// How many prior pings feed the sequence window.
const SEQUENCE_WINDOW: usize = 10;

/// The persisted `Assessment` plus whatever alerts actually got raised
/// for it (after dedup), surfaced to the ingress response.
pub struct AssessmentOutcome {
    pub assessment: Assessment,
    pub raised_alerts: Vec<Alert>,
}

impl AssessmentOutcome {
    pub fn alert_generated(&self) -> bool {
        !self.raised_alerts.is_empty()
    }
}

pub struct AssessmentEngine {
    store: Arc<Store>,
    zones: Arc<ZoneIndex>,
    registry: Arc<ModelRegistry>,
    dispatcher: Arc<AlertDispatcher>,
    detector_soft_deadline: Duration,
}

impl AssessmentEngine {
    pub fn new(
        store: Arc<Store>,
        zones: Arc<ZoneIndex>,
        registry: Arc<ModelRegistry>,
        dispatcher: Arc<AlertDispatcher>,
        detector_soft_deadline: Duration,
    ) -> Self {
        Self {
            store,
            zones,
            registry,
            dispatcher,
            detector_soft_deadline,
        }
    }

    /// Runs the full pipeline for a freshly inserted `location`. Never
    /// fails: the Location row is already persisted by the time this is
    /// called, so any stage failure (a detector timeout, or a Store
    /// error on persisting the Assessment itself) degrades to a minimal
    /// Assessment rather than propagating past the caller (spec.md
    /// §4.7/§7 — "the engine never throws past its caller").
    pub async fn assess(&self, tourist: &Tourist, location: &Location) -> AppResult<AssessmentOutcome> {
        match self.try_assess(tourist, location).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => Ok(self.degrade(tourist, location, &err).await),
        }
    }

    async fn try_assess(&self, tourist: &Tourist, location: &Location) -> AppResult<AssessmentOutcome> {
        // FETCHED_CONTEXT
        let history = self.store.recent_locations(tourist.id, SEQUENCE_WINDOW).await;
        let restricted = self.zones.restricted_snapshot().await;
        let safe = self.zones.safe_snapshot().await;

        // FEATURES
        let point_features = features::extract_point_features(location, &history);
        let mut sequence_window: Vec<Location> = history.clone();
        sequence_window.push(location.clone());
        let sequence_features = features::extract_sequence_features(&sequence_window);

        let geofence_verdict = geofence::classify(location.latitude, location.longitude, &restricted, &safe);

        // SCORED — each learned detector gets its own soft deadline; a
        // miss degrades that signal to its unavailable default rather
        // than failing the whole assessment. A window shorter than
        // MIN_SEQ_POINTS never reaches the sequence detector at all,
        // per spec.md §4.5.
        let (point_score, point_degraded) = self.score_point(point_features).await;
        let (sequence_score, sequence_degraded) = if sequence_window.len() >= MIN_SEQ_POINTS {
            self.score_sequence(sequence_features).await
        } else {
            (SequenceScore::unavailable(), false)
        };
        let degraded = point_degraded || sequence_degraded;

        let side_channel = FusionSideChannel::default();
        let fusion = FusionScorer::fuse(
            &geofence_verdict,
            &point_score,
            &sequence_score,
            point_features.speed_kmh,
            &side_channel,
        );

        let point_meta = self.registry.point_meta().await;
        let sequence_meta = self.registry.sequence_meta().await;

        let assessment = Assessment {
            id: 0,
            tourist_id: tourist.id,
            location_id: location.id,
            safety_score: fusion.score,
            severity: fusion.severity,
            geofence: geofence_verdict,
            anomaly_score: point_score.anomaly_score,
            temporal_risk_score: sequence_score.risk_score,
            confidence: fusion.confidence,
            recommendations: fusion.recommendations.clone(),
            point_model_version: point_meta.map(|m| m.version),
            sequence_model_version: sequence_meta.map(|m| m.version),
            degraded,
            degraded_reason: degraded.then(|| "detector soft deadline exceeded".to_string()),
            created_at: Utc::now(),
        };

        // PERSISTED
        let assessment = self.store.insert_assessment(assessment).await;
        self.store
            .set_tourist_safety_score(tourist.id, assessment.safety_score)
            .await?;

        // NOTIFIED
        let mut raised_alerts = Vec::new();
        for raised in fusion.alerts_to_raise {
            let dispatched = self
                .dispatcher
                .dispatch(tourist.id, raised, location.latitude, location.longitude, location.event_time)
                .await;
            raised_alerts.extend(dispatched);
        }

        Ok(AssessmentOutcome {
            assessment,
            raised_alerts,
        })
    }

    /// Falls back to a minimal degraded Assessment when a pipeline stage
    /// fails after `location` is already persisted. Persisting the
    /// fallback itself is best-effort: if the Store is unavailable for
    /// that too, the caller still gets a response rather than an error.
    async fn degrade(&self, tourist: &Tourist, location: &Location, err: &AppError) -> AssessmentOutcome {
        log::warn!("assessment pipeline degraded for tourist {}: {err}", tourist.id);
        let assessment = Assessment {
            id: 0,
            tourist_id: tourist.id,
            location_id: location.id,
            safety_score: 50,
            severity: Severity::Warning,
            geofence: GeofenceVerdict::unknown(),
            anomaly_score: 0.0,
            temporal_risk_score: 0.0,
            confidence: 0.0,
            recommendations: vec!["assessment degraded after location was recorded".to_string()],
            point_model_version: None,
            sequence_model_version: None,
            degraded: true,
            degraded_reason: Some(err.to_string()),
            created_at: Utc::now(),
        };
        let assessment = self.store.insert_assessment(assessment).await;
        let _ = self.store.set_tourist_safety_score(tourist.id, assessment.safety_score).await;
        AssessmentOutcome {
            assessment,
            raised_alerts: Vec::new(),
        }
    }

    /// Forces an SOS-side assessment without requiring a fresh location
    /// ping (Open Question decision, see DESIGN.md): the coordinates
    /// reported in the SOS press itself feed the geofence check, and the
    /// SOS side channel forces the score floor. `last_location_id` ties
    /// the Assessment to the tourist's most recent Location row, if any.
    pub async fn assess_sos(
        &self,
        tourist: &Tourist,
        latitude: f64,
        longitude: f64,
        last_location_id: Option<crate::models::LocationId>,
    ) -> AppResult<AssessmentOutcome> {
        let restricted = self.zones.restricted_snapshot().await;
        let safe = self.zones.safe_snapshot().await;
        let geofence_verdict = geofence::classify(latitude, longitude, &restricted, &safe);

        let side_channel = FusionSideChannel {
            sos: true,
            ..Default::default()
        };
        let fusion = FusionScorer::fuse(
            &geofence_verdict,
            &PointScore::untrained(),
            &SequenceScore::unavailable(),
            0.0,
            &side_channel,
        );

        let assessment = Assessment {
            id: 0,
            tourist_id: tourist.id,
            location_id: last_location_id.unwrap_or(0),
            safety_score: fusion.score,
            severity: fusion.severity,
            geofence: geofence_verdict,
            anomaly_score: 0.0,
            temporal_risk_score: 0.0,
            confidence: fusion.confidence,
            recommendations: fusion.recommendations.clone(),
            point_model_version: None,
            sequence_model_version: None,
            degraded: false,
            degraded_reason: None,
            created_at: Utc::now(),
        };

        let assessment = self.store.insert_assessment(assessment).await;
        self.store
            .set_tourist_safety_score(tourist.id, assessment.safety_score)
            .await?;

        let now = Utc::now();
        let mut raised_alerts = Vec::new();
        for raised in fusion.alerts_to_raise {
            let dispatched = self
                .dispatcher
                .dispatch(tourist.id, raised, latitude, longitude, now)
                .await;
            raised_alerts.extend(dispatched);
        }

        Ok(AssessmentOutcome {
            assessment,
            raised_alerts,
        })
    }

    async fn score_point(&self, features: crate::features::PointFeatures) -> (PointScore, bool) {
        let detector = self.registry.current_point().await;
        let deadline = self.detector_soft_deadline;
        let handle = tokio::task::spawn_blocking(move || detector.score(&features));
        match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(score)) => (score, false),
            _ => (PointScore::unavailable(), true),
        }
    }

    async fn score_sequence(&self, features: SequenceFeatures) -> (SequenceScore, bool) {
        let detector = self.registry.current_sequence().await;
        let deadline = self.detector_soft_deadline;
        let handle = tokio::task::spawn_blocking(move || detector.score(&features));
        match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(score)) => (score, false),
            _ => (SequenceScore::unavailable(), true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    async fn engine() -> (AssessmentEngine, Arc<Store>) {
        let store = Store::new();
        let zones = ZoneIndex::empty();
        let registry = ModelRegistry::new();
        let config = AppConfig::for_tests();
        let dispatcher = Arc::new(AlertDispatcher::new(store.clone(), config.emergency_webhook_url.clone(), config.emergency_webhook_token.clone(), config.webhook_timeout));
        let engine = AssessmentEngine::new(store.clone(), zones, registry, dispatcher, config.detector_soft_deadline);
        (engine, store)
    }

    #[tokio::test]
    async fn assess_with_no_models_yields_full_score_and_no_alerts() {
        let (engine, store) = engine().await;
        let tourist = store.insert_tourist("A".into(), "c".into(), "e".into()).await;
        let location = store.insert_location(tourist.id, 28.6, 77.2, None, None, None, None).await;
        let outcome = engine.assess(&tourist, &location).await.unwrap();
        assert_eq!(outcome.assessment.safety_score, 100);
        assert!(!outcome.alert_generated());
        assert_eq!(store.count_alerts().await, 0);
    }

    #[tokio::test]
    async fn assess_sos_forces_zero_score_and_raises_alert() {
        let (engine, store) = engine().await;
        let tourist = store.insert_tourist("A".into(), "c".into(), "e".into()).await;
        let outcome = engine.assess_sos(&tourist, 28.6, 77.2, None).await.unwrap();
        assert_eq!(outcome.assessment.safety_score, 0);
        assert!(outcome.alert_generated());
        assert_eq!(outcome.raised_alerts[0].kind, crate::models::AlertKind::Sos);
        assert_eq!(store.count_alerts().await, 1);
    }

    #[tokio::test]
    async fn assess_degrades_instead_of_propagating_a_post_persistence_error() {
        let (engine, store) = engine().await;
        // A tourist unknown to the Store: the location is the caller's
        // problem to have persisted already, but `set_tourist_safety_score`
        // inside `try_assess` will fail with NotFound, which must degrade
        // rather than bubble up as an error.
        let ghost = crate::models::Tourist {
            id: 999,
            name: "ghost".into(),
            contact: "c".into(),
            emergency_contact: "e".into(),
            age: None,
            nationality: None,
            passport_number: None,
            safety_score: 100,
            is_active: true,
            created_at: Utc::now(),
        };
        let location = Location {
            id: 1,
            tourist_id: 999,
            latitude: 28.6,
            longitude: 77.2,
            altitude: None,
            accuracy: None,
            speed: None,
            heading: None,
            event_time: Utc::now(),
            inserted_at: Utc::now(),
        };

        let outcome = engine.assess(&ghost, &location).await.unwrap();
        assert!(outcome.assessment.degraded);
        assert_eq!(outcome.assessment.severity, crate::models::Severity::Warning);
        assert_eq!(outcome.assessment.confidence, 0.0);
        assert!(!outcome.alert_generated());
        assert_eq!(store.count_assessments().await, 1);
    }

    #[tokio::test]
    async fn assess_applies_high_speed_penalty() {
        let (engine, store) = engine().await;
        let tourist = store.insert_tourist("A".into(), "c".into(), "e".into()).await;
        let location = store
            .insert_location(tourist.id, 28.62, 77.23, None, None, Some(100.0), None)
            .await;
        let outcome = engine.assess(&tourist, &location).await.unwrap();
        assert!(outcome.assessment.safety_score <= 60);
    }
}
