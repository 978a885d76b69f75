//! Fusion Scorer: the sole writer of `safety_score`. Combines the
//! Geofence Classifier verdict, the two detector outputs, and an SOS
//! side channel into one bounded 0-100 score via fixed-order
//! deterministic penalties.

use crate::models::{
    AlertKind, AlertSeverity, FusionResult, FusionSideChannel, GeofenceVerdict, PointScore,
    RaisedAlert, SequenceScore, Severity,
};

pub struct FusionScorer;

impl FusionScorer {
    /// `speed_kmh` is the current reported (or segment-derived) speed;
    /// it drives the speed side-penalty independent of the point
    /// detector, per spec.md §4.6 step 5.
    pub fn fuse(
        geofence: &GeofenceVerdict,
        point: &PointScore,
        sequence: &SequenceScore,
        speed_kmh: f64,
        side: &FusionSideChannel,
    ) -> FusionResult {
        if side.sos {
            return FusionResult {
                score: 0,
                severity: Severity::Critical,
                confidence: 1.0,
                recommendations: vec!["Emergency services have been notified.".to_string()],
                alerts_to_raise: vec![RaisedAlert {
                    kind: AlertKind::Sos,
                    severity: AlertSeverity::Critical,
                    message: "SOS pressed".to_string(),
                }],
            };
        }

        let mut score: i32 = 100;
        let mut alerts = Vec::new();
        let mut recommendations = Vec::new();

        if geofence.in_restricted {
            let danger_level = geofence.danger_level.unwrap_or(5) as i32;
            score -= danger_level * 15;
            alerts.push(RaisedAlert {
                kind: AlertKind::Geofence,
                severity: AlertSeverity::High,
                message: format!(
                    "Entered restricted zone{}",
                    geofence
                        .zone_name
                        .as_ref()
                        .map(|n| format!(" \"{n}\""))
                        .unwrap_or_default()
                ),
            });
            recommendations.push("Leave the restricted zone and return to a monitored area.".to_string());
        } else if geofence.in_safe {
            let safety_rating = geofence.safety_rating.unwrap_or(0) as i32;
            score += (safety_rating - 3) * 5;
        }

        if point.confidence > 0.0 {
            let anomaly_penalty = (point.anomaly_score * 25.0).floor() as i32;
            score -= anomaly_penalty;
            if point.is_anomaly {
                alerts.push(RaisedAlert {
                    kind: AlertKind::Anomaly,
                    severity: if point.anomaly_score > 0.85 {
                        AlertSeverity::High
                    } else {
                        AlertSeverity::Medium
                    },
                    message: "Unusual movement pattern detected".to_string(),
                });
                recommendations.push("Check in with your emergency contact.".to_string());
            }
        }

        let temporal_penalty = (sequence.risk_score * 20.0).floor() as i32;
        score -= temporal_penalty;
        if sequence.pattern_deviation > 0.7 {
            alerts.push(RaisedAlert {
                kind: AlertKind::Temporal,
                severity: AlertSeverity::Medium,
                message: "Erratic movement over recent pings".to_string(),
            });
            recommendations.push("Slow down and confirm your route is intentional.".to_string());
        }

        if speed_kmh > 80.0 {
            score -= 40;
        } else if speed_kmh > 60.0 {
            score -= 25;
        } else if speed_kmh > 40.0 {
            score -= 15;
        }

        if let Some(manual) = side.manual_risk_level {
            score -= manual as i32 * 5;
            alerts.push(RaisedAlert {
                kind: AlertKind::Manual,
                severity: AlertSeverity::Medium,
                message: "Manually flagged risk level".to_string(),
            });
        }

        if let Some(hours) = side.safe_duration_hours {
            score += (hours * 10.0).round().clamp(0.0, 20.0) as i32;
        }

        let score = score.clamp(0, 100) as u8;
        let severity = Severity::from_score(score);

        if score < 50 {
            alerts.push(RaisedAlert {
                kind: AlertKind::LowScore,
                severity: AlertSeverity::High,
                message: format!("Safety score dropped to {score}"),
            });
            recommendations.push("Consider returning to a safe zone.".to_string());
        }

        if recommendations.is_empty() {
            recommendations.push(default_recommendation(severity).to_string());
        }

        // Geofence is rule-based and always contributes full confidence.
        let confidence = ((1.0 + point.confidence + sequence.confidence) / 3.0).clamp(0.0, 1.0);

        FusionResult {
            score,
            severity,
            confidence,
            recommendations,
            alerts_to_raise: alerts,
        }
    }
}

/// Canned per-band text shown when nothing more specific fired. Mirrors
/// the original engine's banded recommendation list.
fn default_recommendation(severity: Severity) -> &'static str {
    match severity {
        Severity::Safe => "Continue enjoying your trip safely!",
        Severity::Warning => "Stay alert and avoid isolated areas.",
        Severity::Critical => "Move to a populated area and contact your emergency contact.",
    }
}
