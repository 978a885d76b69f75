use actix_web::{test, web, App};

use tourist_safety_engine::context::AppContext;
use tourist_safety_engine::handlers;

fn app_context() -> AppContext {
    AppContext::for_tests()
}

#[actix_web::test]
async fn health_reports_zero_counts_on_a_fresh_context() {
    let ctx = app_context();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(ctx))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["tourists"], 0);
    assert_eq!(resp["status"], "healthy");
}

#[actix_web::test]
async fn register_tourist_then_send_location_returns_full_score() {
    let ctx = app_context();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(ctx))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/registerTourist")
        .set_json(serde_json::json!({
            "name": "Asha Verma",
            "contact": "+91-90000-00000",
            "emergency_contact": "+91-90000-11111",
        }))
        .to_request();
    let tourist: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let tourist_id = tourist["id"].as_i64().unwrap();
    assert_eq!(tourist["safety_score"], 100);

    let req = test::TestRequest::post()
        .uri("/sendLocation")
        .set_json(serde_json::json!({
            "tourist_id": tourist_id,
            "latitude": 28.6139,
            "longitude": 77.2090,
        }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["updated_safety_score"], 100);
    assert_eq!(body["assessment"]["safety_score"], 100);
    assert_eq!(body["assessment"]["severity"], "Safe");
    assert_eq!(body["degraded"], false);
}

#[actix_web::test]
async fn send_location_for_unknown_tourist_returns_404() {
    let ctx = app_context();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(ctx))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/sendLocation")
        .set_json(serde_json::json!({
            "tourist_id": 999,
            "latitude": 1.0,
            "longitude": 1.0,
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn press_sos_forces_critical_severity_and_is_visible_in_alerts() {
    let ctx = app_context();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(ctx))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/registerTourist")
        .set_json(serde_json::json!({
            "name": "Rohan Gupta",
            "contact": "c",
            "emergency_contact": "e",
        }))
        .to_request();
    let tourist: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let tourist_id = tourist["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/pressSOS")
        .set_json(serde_json::json!({
            "tourist_id": tourist_id,
            "latitude": 28.6139,
            "longitude": 77.2090,
        }))
        .to_request();
    let sos_response: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert!(sos_response["case_number"].as_str().unwrap().starts_with("SOS"));

    let req = test::TestRequest::get()
        .uri(&format!("/getAlerts?tourist_id={tourist_id}"))
        .to_request();
    let alerts: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(alerts.as_array().unwrap().len(), 1);
    assert_eq!(alerts[0]["kind"], "Sos");
    assert_eq!(alerts[0]["severity"], "Critical");
}

#[actix_web::test]
async fn resolve_alert_marks_it_resolved() {
    let ctx = app_context();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(ctx))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/registerTourist")
        .set_json(serde_json::json!({ "name": "T", "contact": "c", "emergency_contact": "e" }))
        .to_request();
    let tourist: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let tourist_id = tourist["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/pressSOS")
        .set_json(serde_json::json!({
            "tourist_id": tourist_id,
            "latitude": 28.6139,
            "longitude": 77.2090,
        }))
        .to_request();
    let _: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::get()
        .uri(&format!("/getAlerts?tourist_id={tourist_id}"))
        .to_request();
    let alerts: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let alert_id = alerts[0]["id"].as_i64().unwrap();

    let req = test::TestRequest::put()
        .uri(&format!("/resolveAlert/{alert_id}"))
        .set_json(serde_json::json!({ "resolved_by": "operator-1", "notes": "contacted tourist" }))
        .to_request();
    let resolved: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resolved["status"], "Resolved");
    assert_eq!(resolved["resolved_by"], "operator-1");
}

#[actix_web::test]
async fn training_status_reports_untrained_models_before_any_history() {
    let ctx = app_context();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(ctx))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/ai/training/status").to_request();
    let status: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["point_model_trained"], false);
    assert_eq!(status["sequence_model_trained"], false);
    assert_eq!(status["is_training"], false);
    assert!(status["next_fit"].is_string());
}

#[actix_web::test]
async fn force_training_with_enough_history_trains_models() {
    let ctx = app_context();
    let req = test::TestRequest::post()
        .uri("/registerTourist")
        .set_json(serde_json::json!({ "name": "T", "contact": "c", "emergency_contact": "e" }))
        .to_request();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(ctx.clone()))
            .configure(handlers::configure),
    )
    .await;
    let tourist: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let tourist_id = tourist["id"].as_i64().unwrap();

    for i in 0..30 {
        let req = test::TestRequest::post()
            .uri("/sendLocation")
            .set_json(serde_json::json!({
                "tourist_id": tourist_id,
                "latitude": 28.6 + (i as f64) * 0.0005,
                "longitude": 77.2,
            }))
            .to_request();
        let _: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    }

    let req = test::TestRequest::post().uri("/ai/training/force").to_request();
    let _: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::get().uri("/ai/training/status").to_request();
    let status: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["point_model_trained"], true);
}

#[actix_web::test]
async fn file_efir_returns_a_case_number() {
    let ctx = app_context();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(ctx))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/registerTourist")
        .set_json(serde_json::json!({ "name": "T", "contact": "c", "emergency_contact": "e" }))
        .to_request();
    let tourist: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let tourist_id = tourist["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/fileEFIR")
        .set_json(serde_json::json!({
            "tourist_id": tourist_id,
            "description": "tourist missing since yesterday evening",
        }))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert!(resp["case_number"].as_str().unwrap().starts_with("EFIR"));
}
