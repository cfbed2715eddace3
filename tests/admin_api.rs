//! Admin API and health endpoint integration tests

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use textback_gateway::db::{EventKind, EventRepo, NewEvent};

mod common;
use common::{API_KEY, CALLER_PHONE, gateway, gateway_with, test_config};

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {API_KEY}"))
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {API_KEY}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint() {
    let gw = gateway();

    let response = gw
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn ready_reports_degraded_integrations() {
    let gw = gateway();

    let response = gw
        .router
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    // Missing REST credentials and LLM key are "unavailable", not failures.
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["checks"]["database"]["status"], "ok");
    assert_eq!(json["checks"]["twilio"]["status"], "unavailable");
    assert_eq!(json["checks"]["llm"]["status"], "unavailable");
}

#[tokio::test]
async fn admin_requires_api_key() {
    let gw = gateway();

    let response = gw
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/businesses")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = gw
        .router
        .oneshot(
            Request::builder()
                .uri("/api/admin/businesses")
                .header("Authorization", "Bearer wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_rate_limit_returns_429() {
    let mut config = test_config();
    config.server.admin_rate_limit_rpm = Some(1);
    let gw = gateway_with(config);

    let response = gw
        .router
        .clone()
        .oneshot(get("/api/admin/businesses"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = gw
        .router
        .oneshot(get("/api/admin/businesses"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn create_and_list_businesses() {
    let gw = gateway();

    let response = gw
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/admin/businesses",
            serde_json::json!({
                "name": "Golden Crust Pizza",
                "phone_number": "+1 (555) 867-5309",
                "owner_phone": "+15550009999",
                "ordering_url": "https://goldencrust.example.com/order"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let created = body_json(response).await;
    assert_eq!(created["name"], "Golden Crust Pizza");
    // Phone is normalized on the way in.
    assert_eq!(created["phone_number"], "+15558675309");
    assert_eq!(created["subscription_status"], "none");

    let response = gw
        .router
        .oneshot(get("/api/admin/businesses"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn create_business_rejects_empty_name() {
    let gw = gateway();

    let response = gw
        .router
        .oneshot(json_request(
            "POST",
            "/api/admin/businesses",
            serde_json::json!({
                "name": "",
                "phone_number": "+15558675309",
                "owner_phone": "+15550009999"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn get_business_and_not_found() {
    let gw = gateway();

    let response = gw
        .router
        .clone()
        .oneshot(get(&format!("/api/admin/businesses/{}", gw.business.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["name"], "Juniper Plumbing");

    let response = gw
        .router
        .oneshot(get("/api/admin/businesses/does-not-exist"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn update_business_merges_fields() {
    let gw = gateway();

    let response = gw
        .router
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/admin/businesses/{}", gw.business.id),
            serde_json::json!({
                "greeting_template": "Hey, {business} here - text us back!",
                "llm_enabled": false
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    // Untouched fields survive, updated ones stick.
    assert_eq!(json["name"], "Juniper Plumbing");
    assert_eq!(json["greeting_template"], "Hey, {business} here - text us back!");
    assert_eq!(json["llm_enabled"], false);
    assert_eq!(json["alerts_enabled"], true);
}

#[tokio::test]
async fn update_business_clears_ordering_url_with_empty_string() {
    let gw = gateway();

    let response = gw
        .router
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/admin/businesses/{}", gw.business.id),
            serde_json::json!({ "ordering_url": "" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["ordering_url"].is_null());

    // Absent field keeps whatever is stored.
    let response = gw
        .router
        .oneshot(json_request(
            "PUT",
            &format!("/api/admin/businesses/{}", gw.business.id),
            serde_json::json!({ "name": "Juniper Plumbing & Heating" }),
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert!(json["ordering_url"].is_null());
}

#[tokio::test]
async fn replace_and_list_faqs() {
    let gw = gateway();

    let response = gw
        .router
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/admin/businesses/{}/faqs", gw.business.id),
            serde_json::json!({
                "faqs": [
                    { "question": "What are your hours?", "answer": "8am to 6pm" },
                    { "question": "Do you do emergency calls?", "answer": "Yes, 24/7" }
                ]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = gw
        .router
        .oneshot(get(&format!(
            "/api/admin/businesses/{}/faqs",
            gw.business.id
        )))
        .await
        .unwrap();
    let json = body_json(response).await;
    let faqs = json.as_array().unwrap();
    assert_eq!(faqs.len(), 2);
    assert_eq!(faqs[0]["question"], "What are your hours?");
    assert_eq!(faqs[1]["position"], 1);
}

#[tokio::test]
async fn events_feed_returns_recent_events() {
    let gw = gateway();
    let events = EventRepo::new(gw.pool.clone());
    events
        .insert(&NewEvent::new(
            &gw.business.id,
            EventKind::MissedCall,
            CALLER_PHONE,
        ))
        .unwrap();
    events
        .insert(
            &NewEvent::new(&gw.business.id, EventKind::SmsOut, CALLER_PHONE)
                .with_detail(serde_json::json!({ "context": "missed_call" })),
        )
        .unwrap();

    let response = gw
        .router
        .oneshot(get(&format!(
            "/api/admin/businesses/{}/events?limit=10",
            gw.business.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let listed = json.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    // Newest first.
    assert_eq!(listed[0]["kind"], "sms_out");
    assert_eq!(listed[1]["kind"], "missed_call");
}

#[tokio::test]
async fn stats_counts_events_by_kind() {
    let gw = gateway();
    let events = EventRepo::new(gw.pool.clone());
    for _ in 0..3 {
        events
            .insert(&NewEvent::new(
                &gw.business.id,
                EventKind::MissedCall,
                CALLER_PHONE,
            ))
            .unwrap();
    }
    events
        .insert(&NewEvent::new(&gw.business.id, EventKind::SmsOut, CALLER_PHONE))
        .unwrap();

    let response = gw
        .router
        .clone()
        .oneshot(get(&format!(
            "/api/admin/businesses/{}/stats?days=30",
            gw.business.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["days"], 30);
    assert_eq!(json["counts"]["missed_call"], 3);
    assert_eq!(json["counts"]["sms_out"], 1);
    assert!(json["counts"]["owner_alert"].is_null());

    let response = gw
        .router
        .oneshot(get("/api/admin/businesses/does-not-exist/stats"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
