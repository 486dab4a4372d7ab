use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::middleware::{AdminUser, AuthUser};
use crate::models::CinemaHall;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cinema_halls", get(list_halls).post(create_hall))
}

#[derive(Debug, Serialize)]
pub struct HallResponse {
    pub id: i64,
    pub name: String,
    pub rows: i32,
    pub seats_in_row: i32,
    pub capacity: u32,
}

impl From<CinemaHall> for HallResponse {
    fn from(hall: CinemaHall) -> Self {
        Self {
            capacity: hall.capacity(),
            id: hall.id,
            name: hall.name,
            rows: hall.rows,
            seats_in_row: hall.seats_in_row,
        }
    }
}

// GET /api/cinema_halls
async fn list_halls(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<Vec<HallResponse>>, ApiError> {
    let halls = sqlx::query_as::<_, CinemaHall>(
        "SELECT id, name, rows, seats_in_row FROM cinema_halls ORDER BY id"
    )
    .fetch_all(&state.db.pool)
    .await?;
    Ok(Json(halls.into_iter().map(HallResponse::from).collect()))
}

// POST /api/cinema_halls
#[derive(Debug, Deserialize, Validate)]
struct CreateHallRequest {
    #[validate(length(min = 1, max = 255))]
    name: String,
    #[validate(range(min = 1, max = 1000))]
    rows: i32,
    #[validate(range(min = 1, max = 1000))]
    seats_in_row: i32,
}

async fn create_hall(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(req): Json<CreateHallRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let hall = sqlx::query_as::<_, CinemaHall>(
        "INSERT INTO cinema_halls (name, rows, seats_in_row) VALUES ($1, $2, $3)
         RETURNING id, name, rows, seats_in_row"
    )
    .bind(req.name.trim())
    .bind(req.rows)
    .bind(req.seats_in_row)
    .fetch_one(&state.db.pool)
    .await?;

    // Зал сразу доступен пути бронирования
    state.engine.catalog.insert_hall(hall.clone());
    tracing::info!(hall_id = hall.id, capacity = hall.capacity(), "cinema hall created");

    Ok((StatusCode::CREATED, Json(HallResponse::from(hall))))
}
