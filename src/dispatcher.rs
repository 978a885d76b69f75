//! Alert Dispatcher (spec.md §4.9): persists a raised alert and makes a
//! best-effort webhook POST, deduplicating by tourist + kind + a
//! second-bucketed timestamp + coordinate rounded to 5 decimal places
//! so a single noisy moment doesn't fan out into a wall of duplicate
//! alerts. Webhook delivery is fire-and-forget: a failure is logged,
//! never propagated, grounded in the reqwest-based background-fetch
//! idiom in the TLE-cache reference example.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::models::{Alert, AlertKind, AlertStatus, RaisedAlert, TouristId};
use crate::store::Store;

pub struct AlertDispatcher {
    store: Arc<Store>,
    webhook_url: Option<String>,
    webhook_token: Option<String>,
    client: reqwest::Client,
}

impl AlertDispatcher {
    pub fn new(
        store: Arc<Store>,
        webhook_url: Option<String>,
        webhook_token: Option<String>,
        webhook_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(webhook_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            store,
            webhook_url,
            webhook_token,
            client,
        }
    }

    /// Persists the alert (unless an identical one was already raised
    /// within the same second) and fires the webhook. Returns the
    /// persisted alert, or `None` if it was deduplicated away.
    pub async fn dispatch(
        &self,
        tourist_id: TouristId,
        raised: RaisedAlert,
        latitude: f64,
        longitude: f64,
        event_time: DateTime<Utc>,
    ) -> Option<Alert> {
        let bucket = event_time.timestamp();
        let lat_rounded = Some((latitude * 100_000.0).round() as i64);
        let lon_rounded = Some((longitude * 100_000.0).round() as i64);

        if self
            .store
            .find_recent_duplicate(tourist_id, raised.kind, bucket, lat_rounded, lon_rounded)
            .await
        {
            log::debug!("deduplicated alert for tourist {tourist_id}: {:?}", raised.kind);
            return None;
        }

        let alert = Alert {
            id: 0,
            tourist_id,
            kind: raised.kind,
            severity: raised.severity,
            message: raised.message.clone(),
            description: None,
            latitude: Some(latitude),
            longitude: Some(longitude),
            status: AlertStatus::Active,
            auto_generated: true,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
            event_time,
        };
        let alert = self.store.insert_alert(alert).await;

        // spec.md §4.9: only PANIC/SOS alerts page the emergency webhook.
        if matches!(alert.kind, AlertKind::Panic | AlertKind::Sos) {
            self.notify_webhook(&alert).await;
        }

        Some(alert)
    }

    /// Whether a webhook URL is configured at all — used to report
    /// `emergency_services_notified` back to the SOS caller without
    /// making the ingress response wait on the outbound call itself.
    pub fn webhook_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn notify_webhook(&self, alert: &Alert) {
        let Some(url) = &self.webhook_url else {
            return;
        };

        let mut request = self.client.post(url).json(&json!({
            "alert_id": alert.id,
            "tourist_id": alert.tourist_id,
            "kind": alert.kind,
            "severity": alert.severity,
            "message": alert.message,
            "latitude": alert.latitude,
            "longitude": alert.longitude,
            "event_time": alert.event_time,
        }));
        if let Some(token) = &self.webhook_token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                log::warn!(
                    "emergency webhook responded with status {} for alert {}",
                    response.status(),
                    alert.id
                );
            }
            Err(err) => {
                log::warn!("emergency webhook delivery failed for alert {}: {err}", alert.id);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, AlertSeverity};

    #[tokio::test]
    async fn dispatch_persists_alert_when_no_webhook_configured() {
        let store = Store::new();
        let tourist = store.insert_tourist("A".into(), "c".into(), "e".into()).await;
        let dispatcher = AlertDispatcher::new(store.clone(), None, None, Duration::from_secs(5));
        let raised = RaisedAlert {
            kind: AlertKind::Geofence,
            severity: AlertSeverity::High,
            message: "test".into(),
        };
        let alert = dispatcher
            .dispatch(tourist.id, raised, 28.6, 77.2, Utc::now())
            .await;
        assert!(alert.is_some());
        assert_eq!(store.count_alerts().await, 1);
    }

    #[tokio::test]
    async fn dispatch_deduplicates_identical_alert_in_same_second() {
        let store = Store::new();
        let tourist = store.insert_tourist("A".into(), "c".into(), "e".into()).await;
        let dispatcher = AlertDispatcher::new(store.clone(), None, None, Duration::from_secs(5));
        let now = Utc::now();
        for _ in 0..2 {
            let raised = RaisedAlert {
                kind: AlertKind::Anomaly,
                severity: AlertSeverity::Medium,
                message: "test".into(),
            };
            dispatcher.dispatch(tourist.id, raised, 28.6, 77.2, now).await;
        }
        assert_eq!(store.count_alerts().await, 1);
    }
}
