use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use skybook_core::journal::Signal;
use skybook_core::models::{Order, OrderStatus};
use skybook_engine::BookingInput;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    seats: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderResponse {
    order_id: String,
    flight_id: String,
    user_id: String,
    seats: Vec<String>,
    status: OrderStatus,
    workflow_id: String,
}

#[derive(Debug, Deserialize)]
struct UpdateSeatsRequest {
    #[serde(default)]
    seats: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitPaymentRequest {
    #[serde(default)]
    payment_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatusResponse {
    order_id: String,
    flight_id: String,
    user_id: String,
    seats: Vec<String>,
    status: OrderStatus,
    /// Whole seconds until the hold lapses; 0 when the orchestrator is
    /// not running or the hold has already lapsed.
    time_remaining: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    reserved_at: Option<DateTime<Utc>>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/flights/:flight_id/orders", post(create_order))
        .route(
            "/api/orders/:order_id",
            get(get_order_status).delete(cancel_order),
        )
        .route("/api/orders/:order_id/seats", post(update_seats))
        .route("/api/orders/:order_id/payment", post(submit_payment))
}

/// POST /api/flights/:flight_id/orders
///
/// The order row is inserted before the orchestrator is armed, so a
/// concurrent `GET` always finds the row even while the initial hold is
/// still in flight.
async fn create_order(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    if req.user_id.is_empty() || req.seats.is_empty() {
        return Err(ApiError::ValidationError(
            "userId and seats required".to_string(),
        ));
    }

    let order_id = Uuid::new_v4().to_string();
    let run_id = Uuid::new_v4().to_string();

    let order = Order::new(
        order_id.clone(),
        flight_id.clone(),
        req.user_id.clone(),
        order_id.clone(),
        run_id.clone(),
    );
    state.orders.create_order(&order).await?;

    state
        .engine
        .start_order(BookingInput {
            order_id: order_id.clone(),
            run_id,
            flight_id: flight_id.clone(),
            user_id: req.user_id.clone(),
            seats: req.seats.clone(),
        })
        .await
        .map_err(|err| {
            ApiError::InternalServerError(format!("failed to start orchestration: {err}"))
        })?;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            order_id: order_id.clone(),
            flight_id,
            user_id: req.user_id,
            seats: req.seats,
            status: OrderStatus::Created,
            workflow_id: order_id,
        }),
    ))
}

/// GET /api/orders/:order_id
///
/// Live orchestrations answer from their in-memory snapshot; the
/// countdown is computed here from wall-clock time because the
/// orchestrator's logical clock does not advance between queries. When
/// the orchestrator is gone, the order row and seat store answer
/// instead, with `timeRemaining` pinned to 0.
async fn get_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let order = state
        .orders
        .get_order(&order_id)
        .await?
        .ok_or_else(|| ApiError::NotFoundError("order not found".to_string()))?;

    if let Some(snapshot) = state.engine.query(&order_id).await {
        let elapsed = (Utc::now() - snapshot.reservation_start_at)
            .to_std()
            .unwrap_or_default();
        let remaining = state.reservation_timeout.saturating_sub(elapsed);

        return Ok(Json(OrderStatusResponse {
            order_id: snapshot.order_id,
            flight_id: snapshot.flight_id,
            user_id: snapshot.user_id,
            seats: snapshot.seats,
            status: snapshot.status,
            time_remaining: remaining.as_secs() as i64,
            reserved_at: Some(snapshot.reservation_start_at),
        }));
    }

    let seats = state
        .seats
        .get_order_seats(&order_id)
        .await
        .unwrap_or_default();
    Ok(Json(OrderStatusResponse {
        order_id: order.order_id,
        flight_id: order.flight_id,
        user_id: order.user_id,
        seats,
        status: order.status,
        time_remaining: 0,
        reserved_at: None,
    }))
}

/// POST /api/orders/:order_id/seats
async fn update_seats(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(req): Json<UpdateSeatsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.seats.is_empty() {
        return Err(ApiError::ValidationError("seats required".to_string()));
    }

    ensure_order_exists(&state, &order_id).await?;
    state
        .engine
        .signal(&order_id, Signal::UpdateSeats(req.seats))
        .await?;

    Ok(Json(json!({"message": "seats updated"})))
}

/// POST /api/orders/:order_id/payment
async fn submit_payment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(req): Json<SubmitPaymentRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.payment_code.len() != 5 {
        return Err(ApiError::ValidationError(
            "payment code must be 5 digits".to_string(),
        ));
    }

    ensure_order_exists(&state, &order_id).await?;
    state
        .engine
        .signal(&order_id, Signal::SubmitPayment(req.payment_code))
        .await?;

    Ok(Json(json!({"message": "payment submitted"})))
}

/// DELETE /api/orders/:order_id
async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_order_exists(&state, &order_id).await?;
    state.engine.signal(&order_id, Signal::CancelOrder).await?;

    Ok(Json(json!({"message": "order cancelled"})))
}

async fn ensure_order_exists(state: &AppState, order_id: &str) -> Result<(), ApiError> {
    state
        .orders
        .get_order(order_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::NotFoundError("order not found".to_string()))
}
