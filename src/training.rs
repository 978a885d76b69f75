//! Training Scheduler (spec.md §4.8): a background loop that
//! periodically refits both detectors over a rolling window of recent
//! locations and hot-swaps them into the Model Registry. Grounded in
//! `anomaly_ml.rs`'s `tokio::time::interval` retrain loop plus
//! `tokio::task::spawn_blocking` for the actual fit, with a graceful
//! shutdown deadline borrowed from the same example's cancellation
//! handling.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::detectors::{MIN_FIT_SAMPLES, PointAnomalyDetector, SequenceAnomalyDetector};
use crate::detectors::sequence_anomaly::MIN_SEQ_POINTS;
use crate::features;
use crate::registry::ModelRegistry;
use crate::store::Store;

/// How far back the rolling training window reaches.
const TRAINING_WINDOW_HOURS: i64 = 24;

pub struct TrainingScheduler {
    store: Arc<Store>,
    registry: Arc<ModelRegistry>,
    interval: Duration,
    hard_deadline: Duration,
    shutdown: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    last_run_unix: Arc<AtomicI64>,
    last_sample_count: Arc<std::sync::atomic::AtomicUsize>,
    version_counter: Arc<AtomicI64>,
    /// Guards against two fits for the same detector pair running at
    /// once (spec.md §4.8) — set for the duration of `run_once` and
    /// checked by both the scheduler tick and the forced-retrain route.
    is_training: Arc<AtomicBool>,
}

impl TrainingScheduler {
    pub fn new(
        store: Arc<Store>,
        registry: Arc<ModelRegistry>,
        interval: Duration,
        hard_deadline: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            interval,
            hard_deadline,
            shutdown: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            last_run_unix: Arc::new(AtomicI64::new(0)),
            last_sample_count: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            version_counter: Arc::new(AtomicI64::new(0)),
            is_training: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the background loop; returns a handle the caller can
    /// `.await` during shutdown.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = self.shutdown.notified() => {
                        log::info!("training scheduler shutting down");
                        self.stopped.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        })
    }

    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub fn hard_deadline(&self) -> Duration {
        self.hard_deadline
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        let unix = self.last_run_unix.load(Ordering::SeqCst);
        if unix == 0 {
            None
        } else {
            DateTime::from_timestamp(unix, 0)
        }
    }

    pub fn last_sample_count(&self) -> usize {
        self.last_sample_count.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn is_training(&self) -> bool {
        self.is_training.load(Ordering::SeqCst)
    }

    /// When the next background fit is due (spec.md §6): the last run
    /// plus the configured interval, or right away if nothing has run
    /// yet.
    pub fn next_fit(&self) -> DateTime<Utc> {
        let interval = chrono::Duration::from_std(self.interval).unwrap_or_else(|_| chrono::Duration::zero());
        match self.last_run() {
            Some(last) => last + interval,
            None => Utc::now(),
        }
    }

    /// Runs one fit cycle immediately, outside the interval tick — used
    /// by the forced-retrain endpoint and by the background loop.
    /// Idempotent while a fit is already in flight: a concurrent call
    /// (the scheduler tick racing a forced retrain, or two forced
    /// retrains) is a no-op rather than a second overlapping fit
    /// (spec.md §4.8: "at most one fit per detector in flight").
    pub async fn run_once(&self) {
        let Some(_guard) = TrainingGuard::acquire(&self.is_training) else {
            log::debug!("training run_once skipped: a fit is already in flight");
            return;
        };

        let cutoff = Utc::now() - chrono::Duration::hours(TRAINING_WINDOW_HOURS);
        let active_ids = self.store.active_tourist_ids().await;
        let locations = self.store.locations_since_all(cutoff, &active_ids).await;
        self.last_sample_count.store(locations.len(), Ordering::SeqCst);

        if locations.len() < MIN_FIT_SAMPLES {
            log::debug!("training skipped: only {} samples, need {}", locations.len(), MIN_FIT_SAMPLES);
            self.last_run_unix.store(Utc::now().timestamp(), Ordering::SeqCst);
            return;
        }

        let version = format!("v{}", self.version_counter.fetch_add(1, Ordering::SeqCst) + 1);

        let mut by_tourist: std::collections::HashMap<_, Vec<_>> = std::collections::HashMap::new();
        for loc in &locations {
            by_tourist.entry(loc.tourist_id).or_default().push(loc.clone());
        }

        let mut point_samples = Vec::new();
        let mut sequence_samples = Vec::new();

        for (_, mut history) in by_tourist {
            history.sort_by_key(|l| (l.event_time, l.id));
            for window_end in 1..history.len() {
                let point = features::extract_point_features(&history[window_end], &history[..window_end]);
                point_samples.push(point);
            }
            if history.len() >= MIN_SEQ_POINTS {
                for end in MIN_SEQ_POINTS..=history.len() {
                    sequence_samples.push(features::extract_sequence_features(&history[..end]));
                }
            }
        }

        let fit_deadline = self.hard_deadline;
        if point_samples.len() >= MIN_FIT_SAMPLES {
            let version_clone = version.clone();
            let handle = tokio::task::spawn_blocking(move || {
                PointAnomalyDetector::fit(&point_samples, version_clone)
            });
            match tokio::time::timeout(fit_deadline, handle).await {
                Ok(Ok(detector)) => self.registry.install_point(detector).await,
                _ => log::warn!("point detector training missed its hard deadline"),
            }
        }

        if sequence_samples.len() >= MIN_SEQ_POINTS {
            let version_clone = version.clone();
            let handle = tokio::task::spawn_blocking(move || {
                SequenceAnomalyDetector::fit(&sequence_samples, version_clone)
            });
            match tokio::time::timeout(fit_deadline, handle).await {
                Ok(Ok(detector)) => self.registry.install_sequence(detector).await,
                _ => log::warn!("sequence detector training missed its hard deadline"),
            }
        }

        self.last_run_unix.store(Utc::now().timestamp(), Ordering::SeqCst);
        log::info!("training cycle complete, version {version}");
    }
}

/// Releases the in-flight flag on drop, so a fit that panics or times
/// out still unblocks the next `run_once` call.
struct TrainingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> TrainingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for TrainingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[tokio::test]
    async fn run_once_below_min_samples_leaves_models_untrained() {
        let store = Store::new();
        let registry = ModelRegistry::new();
        let config = AppConfig::for_tests();
        let scheduler = TrainingScheduler::new(store, registry.clone(), config.training_interval, config.training_hard_deadline);
        scheduler.run_once().await;
        assert!(!registry.current_point().await.is_trained());
    }

    #[tokio::test]
    async fn run_once_with_enough_history_trains_point_detector() {
        let store = Store::new();
        let registry = ModelRegistry::new();
        let tourist = store.insert_tourist("A".into(), "c".into(), "e".into()).await;
        for i in 0..30 {
            store
                .insert_location(tourist.id, 28.6 + i as f64 * 0.001, 77.2, None, None, None, None)
                .await;
        }
        let config = AppConfig::for_tests();
        let scheduler = TrainingScheduler::new(store, registry.clone(), config.training_interval, config.training_hard_deadline);
        scheduler.run_once().await;
        assert!(registry.current_point().await.is_trained());
    }

    #[tokio::test]
    async fn run_once_is_a_no_op_while_already_training() {
        let store = Store::new();
        let registry = ModelRegistry::new();
        let config = AppConfig::for_tests();
        let scheduler = TrainingScheduler::new(store, registry, config.training_interval, config.training_hard_deadline);

        let _guard = TrainingGuard::acquire(&scheduler.is_training).unwrap();
        assert!(scheduler.is_training());
        scheduler.run_once().await;
        assert!(scheduler.last_run().is_none());
    }

    #[tokio::test]
    async fn next_fit_is_last_run_plus_interval() {
        let store = Store::new();
        let registry = ModelRegistry::new();
        let config = AppConfig::for_tests();
        let scheduler = TrainingScheduler::new(store, registry, config.training_interval, config.training_hard_deadline);
        scheduler.run_once().await;
        let last_run = scheduler.last_run().unwrap();
        let expected = last_run + chrono::Duration::from_std(config.training_interval).unwrap();
        assert_eq!(scheduler.next_fit(), expected);
    }
}
