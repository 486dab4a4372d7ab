pub mod actors;
pub mod genres;
pub mod halls;
pub mod movies;
pub mod orders;
pub mod sessions;
pub mod users;

use axum::Router;
use std::sync::Arc;

use crate::error::ApiError;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(genres::routes())
        .merge(actors::routes())
        .merge(halls::routes())
        .merge(movies::routes())
        .merge(sessions::routes())
        .merge(orders::routes())
        .nest("/user", users::routes())
}

/* ---------- helpers ---------- */

// Нарушения ограничений БД - ошибка клиента, остальное - сервера
fn map_constraint_error(e: sqlx::Error, unique: &str, foreign_key: &str) -> ApiError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return ApiError::Conflict(unique.to_string());
        }
        if db.is_foreign_key_violation() {
            return ApiError::BadRequest(foreign_key.to_string());
        }
    }
    ApiError::Database(e)
}
