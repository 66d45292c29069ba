//! Façade contract tests over in-memory stores and a scripted gateway.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tower::util::ServiceExt;

use skybook_api::{app, AppState};
use skybook_engine::{
    ActivityOptions, BookingEngine, EngineConfig, LogNotifier, RetryPolicy, ScriptedGateway,
};
use skybook_store::{InMemoryJournal, InMemoryOrderStore, InMemorySeatStore};

const FLIGHT: &str = "FL123";
const RESERVATION_TIMEOUT: Duration = Duration::from_secs(30);

fn test_app() -> Router {
    let seats = InMemorySeatStore::new(RESERVATION_TIMEOUT);
    let numbers: Vec<String> = ["A", "B", "C"]
        .iter()
        .flat_map(|row| (1..=10).map(move |n| format!("{row}{n}")))
        .collect();
    let refs: Vec<&str> = numbers.iter().map(String::as_str).collect();
    seats.add_flight(FLIGHT, &refs);

    let orders = InMemoryOrderStore::new();
    let journal = InMemoryJournal::new();

    let options = ActivityOptions {
        start_to_close: Duration::from_secs(5),
        retry: RetryPolicy {
            initial_interval: Duration::from_millis(10),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_millis(50),
            maximum_attempts: 3,
        },
    };
    let engine = Arc::new(BookingEngine::new(
        Arc::new(journal),
        Arc::new(seats.clone()),
        Arc::new(orders.clone()),
        Arc::new(ScriptedGateway::new()),
        Arc::new(LogNotifier),
        EngineConfig {
            reservation_timeout: RESERVATION_TIMEOUT,
            seat_ops: options.clone(),
            payment: options,
        },
    ));

    app(AppState {
        engine,
        seats: Arc::new(seats),
        orders: Arc::new(orders),
        reservation_timeout: RESERVATION_TIMEOUT,
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn create_order(app: &Router, user_id: &str, seats: &[&str]) -> String {
    let (status, body) = send(
        app,
        post_json(
            &format!("/api/flights/{FLIGHT}/orders"),
            json!({"userId": user_id, "seats": seats}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "CREATED");
    assert_eq!(body["flightId"], FLIGHT);
    assert_eq!(body["workflowId"], body["orderId"]);
    body["orderId"].as_str().unwrap().to_string()
}

async fn wait_for_status(app: &Router, order_id: &str, status: &str, within: Duration) -> Value {
    let started = Instant::now();
    loop {
        let (code, body) = send(app, get(&format!("/api/orders/{order_id}"))).await;
        assert_eq!(code, StatusCode::OK);
        if body["status"] == status {
            return body;
        }
        if started.elapsed() > within {
            panic!("order {order_id} never reached {status}, last body {body}");
        }
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_create_order_and_track_status() {
    let app = test_app();
    let order_id = create_order(&app, "alice", &["A1", "A2"]).await;

    let body = wait_for_status(&app, &order_id, "SEATS_RESERVED", Duration::from_secs(2)).await;
    assert_eq!(body["seats"], json!(["A1", "A2"]));
    assert_eq!(body["userId"], "alice");
    let remaining = body["timeRemaining"].as_i64().unwrap();
    assert!(remaining > 0 && remaining <= 30, "remaining = {remaining}");
    assert!(body["reservedAt"].is_string());
}

#[tokio::test]
async fn test_time_remaining_is_non_increasing() {
    let app = test_app();
    let order_id = create_order(&app, "alice", &["A3"]).await;
    wait_for_status(&app, &order_id, "SEATS_RESERVED", Duration::from_secs(2)).await;

    let (_, first) = send(&app, get(&format!("/api/orders/{order_id}"))).await;
    sleep(Duration::from_millis(1100)).await;
    let (_, second) = send(&app, get(&format!("/api/orders/{order_id}"))).await;

    assert!(second["timeRemaining"].as_i64().unwrap() <= first["timeRemaining"].as_i64().unwrap());
}

#[tokio::test]
async fn test_create_order_validation() {
    let app = test_app();

    let (status, body) = send(
        &app,
        post_json(
            &format!("/api/flights/{FLIGHT}/orders"),
            json!({"userId": "", "seats": ["A1"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &app,
        post_json(
            &format!("/api/flights/{FLIGHT}/orders"),
            json!({"userId": "alice", "seats": []}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_order_is_404() {
    let app = test_app();

    let (status, _) = send(&app, get("/api/orders/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post_json("/api/orders/ghost/seats", json!({"seats": ["A1"]})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post_json("/api/orders/ghost/payment", json!({"paymentCode": "12345"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, delete("/api/orders/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_seats_requires_seats() {
    let app = test_app();
    let order_id = create_order(&app, "alice", &["B1"]).await;
    wait_for_status(&app, &order_id, "SEATS_RESERVED", Duration::from_secs(2)).await;

    let (status, _) = send(
        &app,
        post_json(&format!("/api/orders/{order_id}/seats"), json!({"seats": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_seats_moves_the_hold() {
    let app = test_app();
    let order_id = create_order(&app, "alice", &["A5"]).await;
    wait_for_status(&app, &order_id, "SEATS_RESERVED", Duration::from_secs(2)).await;

    let (status, body) = send(
        &app,
        post_json(
            &format!("/api/orders/{order_id}/seats"),
            json!({"seats": ["B5"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "seats updated");

    let started = Instant::now();
    loop {
        let (_, body) = send(&app, get(&format!("/api/orders/{order_id}"))).await;
        if body["seats"] == json!(["B5"]) {
            break;
        }
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "swap never became visible"
        );
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_payment_code_length_is_validated() {
    let app = test_app();
    let order_id = create_order(&app, "alice", &["B2"]).await;
    wait_for_status(&app, &order_id, "SEATS_RESERVED", Duration::from_secs(2)).await;

    let (status, _) = send(
        &app,
        post_json(
            &format!("/api/orders/{order_id}/payment"),
            json!({"paymentCode": "1234"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The order is untouched by the rejected submission.
    let (_, body) = send(&app, get(&format!("/api/orders/{order_id}"))).await;
    assert_eq!(body["status"], "SEATS_RESERVED");
}

#[tokio::test]
async fn test_payment_confirms_the_order() {
    let app = test_app();
    let order_id = create_order(&app, "alice", &["B3", "B4"]).await;
    wait_for_status(&app, &order_id, "SEATS_RESERVED", Duration::from_secs(2)).await;

    let (status, body) = send(
        &app,
        post_json(
            &format!("/api/orders/{order_id}/payment"),
            json!({"paymentCode": "12345"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "payment submitted");

    let body = wait_for_status(&app, &order_id, "CONFIRMED", Duration::from_secs(5)).await;
    // The orchestrator is gone; the fallback path answers with the
    // order row and pins the countdown to zero.
    assert_eq!(body["timeRemaining"], 0);
    assert_eq!(body["seats"], json!(["B3", "B4"]));

    let (_, seats_body) = send(&app, get(&format!("/api/flights/{FLIGHT}/seats"))).await;
    let booked: Vec<&Value> = seats_body["seats"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|s| s["status"] == "BOOKED")
        .collect();
    assert_eq!(booked.len(), 2);
}

#[tokio::test]
async fn test_cancel_order() {
    let app = test_app();
    let order_id = create_order(&app, "alice", &["C7"]).await;
    wait_for_status(&app, &order_id, "SEATS_RESERVED", Duration::from_secs(2)).await;

    let (status, body) = send(&app, delete(&format!("/api/orders/{order_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "order cancelled");

    wait_for_status(&app, &order_id, "CANCELLED", Duration::from_secs(2)).await;

    // The seat is free for the next order.
    let next = create_order(&app, "bob", &["C7"]).await;
    wait_for_status(&app, &next, "SEATS_RESERVED", Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_flight_seat_listing() {
    let app = test_app();
    let (status, body) = send(&app, get(&format!("/api/flights/{FLIGHT}/seats"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flightId"], FLIGHT);
    let seats = body["seats"].as_array().unwrap();
    assert_eq!(seats.len(), 30);
    assert!(seats.iter().all(|s| s["status"] == "AVAILABLE"));
}

#[tokio::test]
async fn test_admin_reset_clears_orders_and_seats() {
    let app = test_app();
    let order_id = create_order(&app, "alice", &["C2"]).await;
    wait_for_status(&app, &order_id, "SEATS_RESERVED", Duration::from_secs(2)).await;

    let (status, body) = send(
        &app,
        post_json(&format!("/api/admin/flights/{FLIGHT}/reset"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "flight reset");

    let (status, _) = send(&app, get(&format!("/api/orders/{order_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, get(&format!("/api/flights/{FLIGHT}/seats"))).await;
    assert!(body["seats"]
        .as_array()
        .unwrap()
        .iter()
        .all(|s| s["status"] == "AVAILABLE"));
}
