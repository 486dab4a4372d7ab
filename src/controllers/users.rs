use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::models::User;
use crate::services::auth::hash_password;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/token", post(obtain_token))
        .route("/me", get(me).patch(update_me))
}

// bcrypt тяжёлый, уводим с рантайма
async fn hash_blocking(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))
}

// POST /api/user/register
#[derive(Debug, Deserialize, Validate)]
struct RegisterRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 5, max = 128))]
    password: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    first_name: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    last_name: String,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let password_hash = hash_blocking(req.password).await?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, password_hash, first_name, last_name)
         VALUES ($1, $2, $3, $4)
         RETURNING *"
    )
    .bind(req.email.trim().to_lowercase())
    .bind(password_hash)
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .fetch_one(&state.db.pool)
    .await
    .map_err(|e| super::map_constraint_error(e, "user with this email already exists", "invalid user"))?;

    tracing::info!(user_id = user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

// POST /api/user/token
#[derive(Debug, Deserialize)]
struct TokenRequest {
    email: String,
    password: String,
}

async fn obtain_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::BadRequest("unable to log in with provided credentials".to_string());

    let user = User::find_by_email(&req.email.trim().to_lowercase(), &state.db)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(invalid)?;

    let (user, valid) = tokio::task::spawn_blocking(move || {
        let valid = user.verify_password(&req.password);
        (user, valid)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    if !valid {
        return Err(invalid());
    }

    let token = state
        .tokens
        .issue(&user)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(json!({ "token": token })))
}

// GET /api/user/me
async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user = User::find_by_id(user.user_id, &state.db)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(user))
}

// PATCH /api/user/me
#[derive(Debug, Deserialize, Validate)]
struct UpdateMeRequest {
    #[validate(length(max = 150))]
    first_name: Option<String>,
    #[validate(length(max = 150))]
    last_name: Option<String>,
    #[validate(length(min = 5, max = 128))]
    password: Option<String>,
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<UpdateMeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let password_hash = match req.password {
        Some(password) => Some(hash_blocking(password).await?),
        None => None,
    };

    let updated = sqlx::query_as::<_, User>(
        "UPDATE users SET
            first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            password_hash = COALESCE($4, password_hash)
         WHERE id = $1
         RETURNING *"
    )
    .bind(user.user_id)
    .bind(req.first_name.as_deref().map(str::trim))
    .bind(req.last_name.as_deref().map(str::trim))
    .bind(password_hash)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or(ApiError::Unauthorized)?;

    Ok(Json(updated))
}
