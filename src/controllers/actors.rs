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
use crate::models::Actor;
use crate::search_client::ActorView;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/actors", get(list_actors).post(create_actor))
}

// GET /api/actors
async fn list_actors(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<Vec<ActorView>>, ApiError> {
    let actors = sqlx::query_as::<_, Actor>(
        "SELECT id, first_name, last_name FROM actors ORDER BY last_name, first_name"
    )
    .fetch_all(&state.db.pool)
    .await?;
    Ok(Json(actors.into_iter().map(ActorView::from).collect()))
}

// POST /api/actors
#[derive(Debug, Deserialize, Validate)]
struct CreateActorRequest {
    #[validate(length(min = 1, max = 255))]
    first_name: String,
    #[validate(length(min = 1, max = 255))]
    last_name: String,
}

async fn create_actor(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(req): Json<CreateActorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let actor = sqlx::query_as::<_, Actor>(
        "INSERT INTO actors (first_name, last_name) VALUES ($1, $2)
         RETURNING id, first_name, last_name"
    )
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .fetch_one(&state.db.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(ActorView::from(actor))))
}
