use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

use skybook_core::models::Seat;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SeatsResponse {
    flight_id: String,
    seats: Vec<Seat>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/flights/:flight_id/seats", get(get_seats))
        .route("/api/admin/flights/:flight_id/reset", post(reset_flight))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy"}))
}

/// GET /api/flights/:flight_id/seats
async fn get_seats(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
) -> Result<Json<SeatsResponse>, ApiError> {
    let seats = state.seats.get_seats(&flight_id).await?;
    Ok(Json(SeatsResponse { flight_id, seats }))
}

/// POST /api/admin/flights/:flight_id/reset
///
/// Orders go first so the seats' owner references are already detached
/// when the rows are reset.
async fn reset_flight(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.orders.delete_orders_by_flight(&flight_id).await?;
    state.seats.reset_flight_seats(&flight_id).await?;

    Ok(Json(json!({"message": "flight reset"})))
}
