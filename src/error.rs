//! Типы ошибок.
//!
//! `BookingError` возвращает ядро бронирования (каталог, леджер, координатор),
//! `ApiError` отдаётся HTTP-слою и сам превращается в JSON-ответ.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::Seat;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("seat {seat} is outside hall bounds for session {session_id} ({rows} rows x {seats_in_row} seats)")]
    InvalidSeat {
        session_id: i64,
        seat: Seat,
        rows: i32,
        seats_in_row: i32,
    },

    #[error("seats already taken for session {session_id}: {}", format_seats(.seats))]
    SeatConflict { session_id: i64, seats: Vec<Seat> },

    #[error("seat {seat} requested twice for session {session_id}")]
    DuplicateSeat { session_id: i64, seat: Seat },

    #[error("order must contain at least one ticket")]
    EmptyOrder,

    #[error("session {0} already has tickets")]
    SessionInUse(i64),

    #[error("session {0} is being changed, retry later")]
    SessionBusy(i64),

    #[error("order {0} was cancelled before commit")]
    Cancelled(uuid::Uuid),

    #[error("storage failure: {0}")]
    Persistence(#[source] sqlx::Error),

    #[error("order task interrupted: {0}")]
    Interrupted(#[from] tokio::task::JoinError),
}

impl BookingError {
    pub fn hall_not_found(id: i64) -> Self {
        Self::NotFound { kind: "cinema hall", id }
    }

    pub fn session_not_found(id: i64) -> Self {
        Self::NotFound { kind: "movie session", id }
    }

    /// Клиентская ли это ошибка (4xx) или сбой сервера.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Persistence(_) | Self::Interrupted(_) | Self::Cancelled(_))
    }
}

fn format_seats(seats: &[Seat]) -> String {
    seats.iter().map(Seat::to_string).collect::<Vec<_>>().join(", ")
}

/// Ошибка обработчика HTTP.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("{0}")]
    BadRequest(String),

    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("authentication required")]
    Unauthorized,

    #[error("admin permissions required")]
    Forbidden,

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Booking(err) => match err {
                BookingError::NotFound { .. } => StatusCode::NOT_FOUND,
                BookingError::SeatConflict { .. }
                | BookingError::SessionInUse(_)
                | BookingError::SessionBusy(_) => StatusCode::CONFLICT,
                BookingError::InvalidSeat { .. }
                | BookingError::DuplicateSeat { .. }
                | BookingError::EmptyOrder => StatusCode::BAD_REQUEST,
                BookingError::Persistence(_)
                | BookingError::Interrupted(_)
                | BookingError::Cancelled(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Booking(BookingError::NotFound { .. }) | ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::Booking(BookingError::InvalidSeat { .. }) => "INVALID_SEAT",
            ApiError::Booking(BookingError::SeatConflict { .. }) => "SEAT_CONFLICT",
            ApiError::Booking(BookingError::DuplicateSeat { .. }) => "DUPLICATE_SEAT",
            ApiError::Booking(BookingError::EmptyOrder) => "EMPTY_ORDER",
            ApiError::Booking(BookingError::SessionInUse(_)) => "SESSION_IN_USE",
            ApiError::Booking(BookingError::SessionBusy(_)) => "SESSION_BUSY",
            ApiError::Booking(_) | ApiError::Database(_) | ApiError::Internal(_) => "INTERNAL_SERVER_ERROR",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::Conflict(_) => "CONFLICT",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Детали серверных ошибок только в лог, клиенту общий текст
        let message = if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut body = json!({
            "code": self.code(),
            "message": message,
        });

        // Клиенту нужны конкретные места, чтобы выбрать другие
        if let ApiError::Booking(BookingError::SeatConflict { session_id, seats }) = &self {
            body["movie_session"] = json!(session_id);
            body["seats"] = json!(seats);
        }

        (status, Json(body)).into_response()
    }
}
