//! Model Registry: holds the currently active point- and
//! sequence-anomaly detectors behind `Arc<RwLock<_>>`, swapped as a
//! whole on each successful fit so a reader mid-assessment never sees
//! a half-built model.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::detectors::{PointAnomalyDetector, SequenceAnomalyDetector};
use crate::models::ModelMeta;

pub struct ModelRegistry {
    point: RwLock<Arc<PointAnomalyDetector>>,
    sequence: RwLock<Arc<SequenceAnomalyDetector>>,
}

impl ModelRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            point: RwLock::new(Arc::new(PointAnomalyDetector::untrained())),
            sequence: RwLock::new(Arc::new(SequenceAnomalyDetector::untrained())),
        })
    }

    pub async fn current_point(&self) -> Arc<PointAnomalyDetector> {
        self.point.read().await.clone()
    }

    pub async fn current_sequence(&self) -> Arc<SequenceAnomalyDetector> {
        self.sequence.read().await.clone()
    }

    pub async fn install_point(&self, detector: PointAnomalyDetector) {
        *self.point.write().await = Arc::new(detector);
    }

    pub async fn install_sequence(&self, detector: SequenceAnomalyDetector) {
        *self.sequence.write().await = Arc::new(detector);
    }

    pub async fn point_meta(&self) -> Option<ModelMeta> {
        self.point.read().await.meta.clone()
    }

    pub async fn sequence_meta(&self) -> Option<ModelMeta> {
        self.sequence.read().await.meta.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::PointFeatures;

    #[tokio::test]
    async fn install_replaces_detector_atomically() {
        let registry = ModelRegistry::new();
        assert!(!registry.current_point().await.is_trained());

        let samples: Vec<PointFeatures> = (0..20)
            .map(|_| PointFeatures {
                speed_kmh: 5.0,
                distance_per_minute_km: 0.1,
                inactivity_minutes: 1.0,
                speed_variance: 0.5,
                location_density: 0.1,
                time_of_day_risk: 0.1,
                movement_consistency: 0.9,
                deviation_from_route_km: 0.0,
            })
            .collect();
        registry
            .install_point(PointAnomalyDetector::fit(&samples, "v1".into()))
            .await;
        assert!(registry.current_point().await.is_trained());
    }
}
