use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::middleware::{AdminUser, AuthUser};
use crate::models::Genre;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/genres", get(list_genres).post(create_genre))
}

// GET /api/genres
async fn list_genres(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<Vec<Genre>>, ApiError> {
    let genres = sqlx::query_as::<_, Genre>("SELECT id, name FROM genres ORDER BY name")
        .fetch_all(&state.db.pool)
        .await?;
    Ok(Json(genres))
}

// POST /api/genres
#[derive(Debug, Deserialize, Validate)]
struct CreateGenreRequest {
    #[validate(length(min = 1, max = 255))]
    name: String,
}

async fn create_genre(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateGenreRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let genre = sqlx::query_as::<_, Genre>(
        "INSERT INTO genres (name) VALUES ($1) RETURNING id, name"
    )
    .bind(req.name.trim())
    .fetch_one(&state.db.pool)
    .await
    .map_err(|e| super::map_constraint_error(e, "genre with this name already exists", "invalid genre"))?;

    tracing::info!(genre_id = genre.id, admin = admin.user_id, "genre created");
    Ok((StatusCode::CREATED, Json(genre)))
}
