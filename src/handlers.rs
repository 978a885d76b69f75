//! HTTP handlers for the ingress surface. API-key gating via an
//! `X-API-Key` header is optional: when `AppConfig.api_key` is unset
//! the gate is open, which is what lets `AppConfig::for_tests()` drive
//! the integration tests without a key.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::models::{AlertKind, AlertSeverity, AlertStatus, RaisedAlert, TouristId};
use crate::store::AlertFilter;

fn is_authorized(req: &HttpRequest, ctx: &AppContext) -> bool {
    match &ctx.config.api_key {
        None => true,
        Some(expected) => req
            .headers()
            .get("X-API-Key")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == expected)
            .unwrap_or(false),
    }
}

pub async fn index() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "service": "tourist-safety-engine",
        "status": "running",
    }))
}

pub async fn health(ctx: web::Data<AppContext>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "tourists": ctx.store.count_tourists().await,
        "locations": ctx.store.count_locations().await,
        "alerts": ctx.store.count_alerts().await,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterTouristRequest {
    pub name: String,
    pub contact: String,
    pub emergency_contact: String,
}

pub async fn register_tourist(
    req: HttpRequest,
    ctx: web::Data<AppContext>,
    body: web::Json<RegisterTouristRequest>,
) -> AppResult<HttpResponse> {
    if !is_authorized(&req, &ctx) {
        return Err(AppError::InvalidInput("invalid or missing API key".into()));
    }
    if body.name.trim().is_empty() {
        return Err(AppError::InvalidInput("name must not be empty".into()));
    }
    let tourist = ctx
        .store
        .insert_tourist(body.name.clone(), body.contact.clone(), body.emergency_contact.clone())
        .await;
    Ok(HttpResponse::Created().json(tourist))
}

#[derive(Debug, Deserialize)]
pub struct SendLocationRequest {
    pub tourist_id: TouristId,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SendLocationResponse {
    pub location_id: i64,
    pub assessment: crate::models::Assessment,
    pub alert_generated: bool,
    pub updated_safety_score: u8,
    pub degraded: bool,
}

pub async fn send_location(
    req: HttpRequest,
    ctx: web::Data<AppContext>,
    body: web::Json<SendLocationRequest>,
) -> AppResult<HttpResponse> {
    if !is_authorized(&req, &ctx) {
        return Err(AppError::InvalidInput("invalid or missing API key".into()));
    }
    if !(-90.0..=90.0).contains(&body.latitude) || !(-180.0..=180.0).contains(&body.longitude) {
        return Err(AppError::InvalidInput("latitude/longitude out of range".into()));
    }

    // Backpressure: the Training Scheduler is never blocked by ingress
    // pressure, but a flood of location updates is rejected retryably
    // once the high-water mark is hit (spec.md §5).
    let _ingress_guard = ctx
        .admit_location_request()
        .ok_or(AppError::Backpressure)?;

    let tourist = ctx.store.get_tourist(body.tourist_id).await?;
    let location = ctx
        .store
        .insert_location(
            tourist.id,
            body.latitude,
            body.longitude,
            body.altitude,
            body.accuracy,
            body.speed,
            body.heading,
        )
        .await;

    let outcome = ctx.assessment_engine.assess(&tourist, &location).await?;

    Ok(HttpResponse::Ok().json(SendLocationResponse {
        location_id: location.id,
        alert_generated: outcome.alert_generated(),
        updated_safety_score: outcome.assessment.safety_score,
        degraded: outcome.assessment.degraded,
        assessment: outcome.assessment,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PressSosRequest {
    pub tourist_id: TouristId,
    pub latitude: f64,
    pub longitude: f64,
    pub emergency_type: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PressSosResponse {
    pub alert_id: i64,
    pub case_number: String,
    pub emergency_services_notified: bool,
}

pub async fn press_sos(
    req: HttpRequest,
    ctx: web::Data<AppContext>,
    body: web::Json<PressSosRequest>,
) -> AppResult<HttpResponse> {
    if !is_authorized(&req, &ctx) {
        return Err(AppError::InvalidInput("invalid or missing API key".into()));
    }
    if !(-90.0..=90.0).contains(&body.latitude) || !(-180.0..=180.0).contains(&body.longitude) {
        return Err(AppError::InvalidInput("latitude/longitude out of range".into()));
    }
    let tourist = ctx.store.get_tourist(body.tourist_id).await?;
    let history = ctx.store.recent_locations(tourist.id, 1).await;
    let last_location_id = history.last().map(|l| l.id);

    let outcome = ctx
        .assessment_engine
        .assess_sos(&tourist, body.latitude, body.longitude, last_location_id)
        .await?;

    // invariant 4: a PANIC/SOS alert always exists for an SOS press.
    let alert_id = outcome
        .raised_alerts
        .first()
        .map(|a| a.id)
        .ok_or_else(|| AppError::Degraded("SOS alert was deduplicated away".to_string()))?;

    if body.emergency_type.is_some() || body.message.is_some() {
        let emergency_type = body.emergency_type.clone();
        let message = body.message.clone();
        let _ = ctx
            .store
            .update_alert(alert_id, move |a| {
                a.description = Some(match (emergency_type, message) {
                    (Some(t), Some(m)) => format!("{t}: {m}"),
                    (Some(t), None) => t,
                    (None, Some(m)) => m,
                    (None, None) => unreachable!(),
                });
            })
            .await;
    }

    Ok(HttpResponse::Ok().json(PressSosResponse {
        alert_id,
        case_number: format!("SOS{:06}", alert_id),
        emergency_services_notified: ctx.dispatcher.webhook_configured(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct FileEfirRequest {
    pub tourist_id: TouristId,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct FileEfirResponse {
    pub case_number: String,
    pub alert_id: i64,
}

pub async fn file_efir(
    req: HttpRequest,
    ctx: web::Data<AppContext>,
    body: web::Json<FileEfirRequest>,
) -> AppResult<HttpResponse> {
    if !is_authorized(&req, &ctx) {
        return Err(AppError::InvalidInput("invalid or missing API key".into()));
    }
    let tourist = ctx.store.get_tourist(body.tourist_id).await?;
    let history = ctx.store.recent_locations(tourist.id, 1).await;
    let (lat, lon, event_time) = history
        .last()
        .map(|l| (l.latitude, l.longitude, l.event_time))
        .unwrap_or((0.0, 0.0, chrono::Utc::now()));

    let raised = RaisedAlert {
        kind: AlertKind::Manual,
        severity: AlertSeverity::High,
        message: format!("E-FIR filed: {}", body.description),
    };
    let alert = ctx
        .dispatcher
        .dispatch(tourist.id, raised, lat, lon, event_time)
        .await
        .ok_or_else(|| AppError::Degraded("duplicate E-FIR suppressed".to_string()))?;

    // spec.md §6: EFIR{alertId:06d}{YYYYMMDD}, stamped with the filing
    // time rather than the referenced location's event time.
    let case_number = format!("EFIR{:06}{}", alert.id, chrono::Utc::now().format("%Y%m%d"));
    Ok(HttpResponse::Created().json(FileEfirResponse {
        case_number,
        alert_id: alert.id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct GetAlertsQuery {
    pub tourist_id: Option<TouristId>,
    pub status: Option<String>,
    pub severity: Option<String>,
    pub kind: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn get_alerts(
    req: HttpRequest,
    ctx: web::Data<AppContext>,
    query: web::Query<GetAlertsQuery>,
) -> AppResult<HttpResponse> {
    if !is_authorized(&req, &ctx) {
        return Err(AppError::InvalidInput("invalid or missing API key".into()));
    }
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let severity = query.severity.as_deref().map(parse_severity).transpose()?;
    let kind = query.kind.as_deref().map(parse_kind).transpose()?;
    let filter = AlertFilter {
        tourist_id: query.tourist_id,
        status,
        severity,
        kind,
        limit: query.limit.unwrap_or(50).min(1000),
        offset: query.offset.unwrap_or(0),
    };
    let alerts = ctx.store.filter_alerts(&filter).await;
    Ok(HttpResponse::Ok().json(alerts))
}

fn parse_status(s: &str) -> AppResult<AlertStatus> {
    match s.to_ascii_lowercase().as_str() {
        "active" => Ok(AlertStatus::Active),
        "acknowledged" => Ok(AlertStatus::Acknowledged),
        "resolved" => Ok(AlertStatus::Resolved),
        "false_alarm" | "falsealarm" => Ok(AlertStatus::FalseAlarm),
        other => Err(AppError::InvalidInput(format!("unknown alert status: {other}"))),
    }
}

fn parse_severity(s: &str) -> AppResult<AlertSeverity> {
    match s.to_ascii_lowercase().as_str() {
        "low" => Ok(AlertSeverity::Low),
        "medium" => Ok(AlertSeverity::Medium),
        "high" => Ok(AlertSeverity::High),
        "critical" => Ok(AlertSeverity::Critical),
        other => Err(AppError::InvalidInput(format!("unknown alert severity: {other}"))),
    }
}

fn parse_kind(s: &str) -> AppResult<AlertKind> {
    match s.to_ascii_lowercase().as_str() {
        "panic" => Ok(AlertKind::Panic),
        "sos" => Ok(AlertKind::Sos),
        "geofence" => Ok(AlertKind::Geofence),
        "anomaly" => Ok(AlertKind::Anomaly),
        "temporal" => Ok(AlertKind::Temporal),
        "low_score" | "lowscore" => Ok(AlertKind::LowScore),
        "manual" => Ok(AlertKind::Manual),
        other => Err(AppError::InvalidInput(format!("unknown alert kind: {other}"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveAlertRequest {
    pub resolved_by: String,
    pub notes: Option<String>,
    pub false_alarm: Option<bool>,
}

pub async fn resolve_alert(
    req: HttpRequest,
    ctx: web::Data<AppContext>,
    path: web::Path<i64>,
    body: web::Json<ResolveAlertRequest>,
) -> AppResult<HttpResponse> {
    if !is_authorized(&req, &ctx) {
        return Err(AppError::InvalidInput("invalid or missing API key".into()));
    }
    let alert_id = path.into_inner();
    let status = if body.false_alarm.unwrap_or(false) {
        AlertStatus::FalseAlarm
    } else {
        AlertStatus::Resolved
    };
    let resolved_by = body.resolved_by.clone();
    let notes = body.notes.clone();
    let alert = ctx
        .store
        .update_alert(alert_id, move |a| {
            a.status = status;
            a.resolved_by = Some(resolved_by);
            a.resolved_at = Some(chrono::Utc::now());
            a.resolution_notes = notes;
        })
        .await?;
    Ok(HttpResponse::Ok().json(alert))
}

#[derive(Debug, Serialize)]
pub struct TouristDetailResponse {
    pub tourist: crate::models::Tourist,
    pub latest_assessment: Option<crate::models::Assessment>,
    pub recent_locations: Vec<crate::models::Location>,
    pub recent_alerts: Vec<crate::models::Alert>,
}

pub async fn get_tourist(
    req: HttpRequest,
    ctx: web::Data<AppContext>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    if !is_authorized(&req, &ctx) {
        return Err(AppError::InvalidInput("invalid or missing API key".into()));
    }
    let tourist_id = path.into_inner();
    let tourist = ctx.store.get_tourist(tourist_id).await?;
    let latest_assessment = ctx.store.latest_assessment(tourist_id).await;
    let recent_locations = ctx.store.recent_locations(tourist_id, 10).await;
    let recent_alerts = ctx.store.recent_alerts(tourist_id, 20).await;
    Ok(HttpResponse::Ok().json(TouristDetailResponse {
        tourist,
        latest_assessment,
        recent_locations,
        recent_alerts,
    }))
}

#[derive(Debug, Serialize)]
pub struct TrainingStatusResponse {
    pub is_training: bool,
    pub last_run: Option<chrono::DateTime<chrono::Utc>>,
    pub next_fit: chrono::DateTime<chrono::Utc>,
    pub last_sample_count: usize,
    pub point_model_trained: bool,
    pub sequence_model_trained: bool,
    pub point_model_version: Option<String>,
    pub sequence_model_version: Option<String>,
}

pub async fn training_status(req: HttpRequest, ctx: web::Data<AppContext>) -> AppResult<HttpResponse> {
    if !is_authorized(&req, &ctx) {
        return Err(AppError::InvalidInput("invalid or missing API key".into()));
    }
    let point = ctx.registry.current_point().await;
    let sequence = ctx.registry.current_sequence().await;
    Ok(HttpResponse::Ok().json(TrainingStatusResponse {
        is_training: ctx.training_scheduler.is_training(),
        last_run: ctx.training_scheduler.last_run(),
        next_fit: ctx.training_scheduler.next_fit(),
        last_sample_count: ctx.training_scheduler.last_sample_count(),
        point_model_trained: point.is_trained(),
        sequence_model_trained: sequence.is_trained(),
        point_model_version: ctx.registry.point_meta().await.map(|m| m.version),
        sequence_model_version: ctx.registry.sequence_meta().await.map(|m| m.version),
    }))
}

#[derive(Debug, Serialize)]
pub struct DataStatsResponse {
    pub tourists: usize,
    pub locations: usize,
    pub assessments: usize,
    pub alerts: usize,
    pub locations_last_hour: usize,
    pub alerts_last_hour: usize,
}

pub async fn data_stats(req: HttpRequest, ctx: web::Data<AppContext>) -> AppResult<HttpResponse> {
    if !is_authorized(&req, &ctx) {
        return Err(AppError::InvalidInput("invalid or missing API key".into()));
    }
    let since = chrono::Utc::now() - chrono::Duration::hours(1);
    Ok(HttpResponse::Ok().json(DataStatsResponse {
        tourists: ctx.store.count_tourists().await,
        locations: ctx.store.count_locations().await,
        assessments: ctx.store.count_assessments().await,
        alerts: ctx.store.count_alerts().await,
        locations_last_hour: ctx.store.locations_inserted_since(since).await,
        alerts_last_hour: ctx.store.alerts_inserted_since(since).await,
    }))
}

pub async fn force_training(req: HttpRequest, ctx: web::Data<AppContext>) -> AppResult<HttpResponse> {
    if !is_authorized(&req, &ctx) {
        return Err(AppError::InvalidInput("invalid or missing API key".into()));
    }
    // Idempotent: a fit already in flight (the scheduler's own tick, or
    // a previous force call) means `run_once` is a no-op, and this
    // request just reports that rather than launching a second one.
    if ctx.training_scheduler.is_training() {
        return Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "already training" })));
    }
    ctx.training_scheduler.run_once().await;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "training cycle complete" })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/health", web::get().to(health))
        .route("/registerTourist", web::post().to(register_tourist))
        .route("/sendLocation", web::post().to(send_location))
        .route("/pressSOS", web::post().to(press_sos))
        .route("/fileEFIR", web::post().to(file_efir))
        .route("/getAlerts", web::get().to(get_alerts))
        .route("/resolveAlert/{id}", web::put().to(resolve_alert))
        .route("/tourists/{id}", web::get().to(get_tourist))
        .route("/ai/training/status", web::get().to(training_status))
        .route("/ai/data/stats", web::get().to(data_stats))
        .route("/ai/training/force", web::post().to(force_training));
}
