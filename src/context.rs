//! Wires every component into one shared, explicitly-constructed state
//! object. No global mutable singleton: the whole component graph is
//! built once and cloned (cheaply, via `Arc`) into every worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::assessment::AssessmentEngine;
use crate::config::AppConfig;
use crate::dispatcher::AlertDispatcher;
use crate::registry::ModelRegistry;
use crate::store::Store;
use crate::training::TrainingScheduler;
use crate::zone_index::ZoneIndex;

#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub store: Arc<Store>,
    pub zones: Arc<ZoneIndex>,
    pub registry: Arc<ModelRegistry>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub assessment_engine: Arc<AssessmentEngine>,
    pub training_scheduler: Arc<TrainingScheduler>,
    /// In-flight `/sendLocation` requests, for the ingress high-water-mark
    /// backpressure check (spec.md §5). Shared across workers via `Arc`.
    in_flight_locations: Arc<AtomicUsize>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        let store = Store::new();
        let zones = ZoneIndex::empty();
        let registry = ModelRegistry::new();
        let dispatcher = Arc::new(AlertDispatcher::new(
            store.clone(),
            config.emergency_webhook_url.clone(),
            config.emergency_webhook_token.clone(),
            config.webhook_timeout,
        ));
        let assessment_engine = Arc::new(AssessmentEngine::new(
            store.clone(),
            zones.clone(),
            registry.clone(),
            dispatcher.clone(),
            config.detector_soft_deadline,
        ));
        let training_scheduler = Arc::new(TrainingScheduler::new(
            store.clone(),
            registry.clone(),
            config.training_interval,
            config.training_hard_deadline,
        ));

        Self {
            config,
            store,
            zones,
            registry,
            dispatcher,
            assessment_engine,
            training_scheduler,
            in_flight_locations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Admits one `/sendLocation` request if under the configured
    /// high-water mark, returning a guard that decrements the counter on
    /// drop. `None` means the ingress adapter should reject the request.
    pub fn admit_location_request(&self) -> Option<IngressGuard> {
        let previous = self.in_flight_locations.fetch_add(1, Ordering::SeqCst);
        if previous >= self.config.ingress_high_water_mark {
            self.in_flight_locations.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(IngressGuard {
            counter: self.in_flight_locations.clone(),
        })
    }

    /// Builds a context for tests: short deadlines, no webhook, no API
    /// key gate, and the training loop is never spawned.
    pub fn for_tests() -> Self {
        Self::new(AppConfig::for_tests())
    }
}

/// Releases one slot of the ingress high-water mark when dropped, so a
/// request that errors out mid-handler still frees its slot.
pub struct IngressGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for IngressGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
