use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ApiError, BookingError};
use crate::middleware::{AdminUser, AuthUser};
use crate::models::{MovieSession, Seat};
use crate::search_client::{SessionFilters, SessionRow};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movie_sessions", get(list_sessions).post(create_session))
        .route(
            "/movie_sessions/{id}",
            get(get_session).put(update_session).delete(delete_session),
        )
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    pub date: Option<String>,
    pub movie: Option<String>,
}

impl TryFrom<&SessionsQuery> for SessionFilters {
    type Error = ApiError;

    fn try_from(query: &SessionsQuery) -> Result<Self, Self::Error> {
        let date = query
            .date
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
            .transpose()
            .map_err(|_| ApiError::BadRequest("date must be in YYYY-MM-DD format".to_string()))?;

        let movie = query
            .movie
            .as_deref()
            .filter(|m| !m.is_empty())
            .map(str::parse::<i64>)
            .transpose()
            .map_err(|_| ApiError::BadRequest("movie must be an integer id".to_string()))?;

        Ok(SessionFilters { date, movie })
    }
}

#[derive(Debug, Serialize)]
struct SessionListItem {
    id: i64,
    show_time: NaiveDateTime,
    movie_title: String,
    cinema_hall_name: String,
    cinema_hall_capacity: i32,
    tickets_available: u32,
}

// GET /api/movie_sessions?date=2024-05-01&movie=3
async fn list_sessions(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<SessionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filters = SessionFilters::try_from(&params)?;
    let rows = state.search_client.search_sessions(&filters).await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        // Свободные места считает движок, а не агрегат в SQL
        let tickets_available = state.engine.availability.available_count(row.id)?;
        items.push(SessionListItem {
            id: row.id,
            show_time: row.show_time,
            movie_title: row.movie_title,
            cinema_hall_name: row.cinema_hall_name,
            cinema_hall_capacity: row.rows * row.seats_in_row,
            tickets_available,
        });
    }

    Ok(Json(items))
}

#[derive(Debug, Serialize)]
struct SessionMovie {
    id: i64,
    title: String,
    description: String,
    duration: i32,
}

#[derive(Debug, Serialize)]
struct SessionHall {
    id: i64,
    name: String,
    rows: i32,
    seats_in_row: i32,
    capacity: i32,
}

#[derive(Debug, Serialize)]
struct SessionDetail {
    id: i64,
    show_time: NaiveDateTime,
    movie: SessionMovie,
    cinema_hall: SessionHall,
    taken_places: Vec<Seat>,
    tickets_available: u32,
}

// GET /api/movie_sessions/{id}
async fn get_session(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row: SessionRow = state
        .search_client
        .session_by_id(id)
        .await?
        .ok_or(ApiError::NotFound { kind: "movie session", id })?;

    // Один снимок: занятые места и счётчик согласованы
    let free = state.engine.availability.available_seats(id)?;

    Ok(Json(SessionDetail {
        id: row.id,
        show_time: row.show_time,
        movie: SessionMovie {
            id: row.movie_id,
            title: row.movie_title,
            description: row.movie_description,
            duration: row.movie_duration,
        },
        cinema_hall: SessionHall {
            id: row.cinema_hall_id,
            name: row.cinema_hall_name,
            rows: row.rows,
            seats_in_row: row.seats_in_row,
            capacity: row.rows * row.seats_in_row,
        },
        taken_places: free.occupied().iter().copied().collect(),
        tickets_available: free.count(),
    }))
}

#[derive(Debug, Deserialize)]
struct SessionRequest {
    show_time: NaiveDateTime,
    movie: i64,
    cinema_hall: i64,
}

// POST /api/movie_sessions
async fn create_session(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Зал должен быть известен движку, иначе на сеанс нельзя будет продать билет
    state.engine.catalog.get_hall(req.cinema_hall)?;

    let session = sqlx::query_as::<_, MovieSession>(
        "INSERT INTO movie_sessions (show_time, movie_id, cinema_hall_id) VALUES ($1, $2, $3)
         RETURNING id, movie_id, cinema_hall_id, show_time"
    )
    .bind(req.show_time)
    .bind(req.movie)
    .bind(req.cinema_hall)
    .fetch_one(&state.db.pool)
    .await
    .map_err(|e| super::map_constraint_error(e, "duplicate session", "unknown movie or cinema hall"))?;

    state.engine.catalog.insert_session(session.clone())?;
    tracing::info!(session_id = session.id, hall_id = session.cinema_hall_id, "movie session created");

    Ok((StatusCode::CREATED, Json(session)))
}

// PUT /api/movie_sessions/{id}
async fn update_session(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = MovieSession {
        id,
        movie_id: req.movie,
        cinema_hall_id: req.cinema_hall,
        show_time: req.show_time,
    };

    // Смена зала проверяется под замком сеанса; до исхода записи в базу
    // брони на сеанс отклоняются
    let change = state.engine.ledger.begin_update(updated.clone())?;

    sqlx::query(
        "UPDATE movie_sessions SET show_time = $2, movie_id = $3, cinema_hall_id = $4 WHERE id = $1"
    )
    .bind(id)
    .bind(updated.show_time)
    .bind(updated.movie_id)
    .bind(updated.cinema_hall_id)
    .execute(&state.db.pool)
    .await
    .map_err(|e| super::map_constraint_error(e, "duplicate session", "unknown movie or cinema hall"))?;

    change.apply()?;
    tracing::info!(session_id = id, hall_id = updated.cinema_hall_id, "movie session updated");

    Ok(Json(updated))
}

// DELETE /api/movie_sessions/{id}
async fn delete_session(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let removal = state.engine.ledger.begin_remove(id)?;

    sqlx::query("DELETE FROM movie_sessions WHERE id = $1")
        .bind(id)
        .execute(&state.db.pool)
        .await
        .map_err(|e| {
            // Билеты в БД держат сеанс через RESTRICT
            if matches!(&e, sqlx::Error::Database(db) if db.is_foreign_key_violation()) {
                ApiError::from(BookingError::SessionInUse(id))
            } else {
                ApiError::from(e)
            }
        })?;

    removal.apply()?;
    tracing::info!(session_id = id, "movie session deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(date: Option<&str>, movie: Option<&str>) -> SessionsQuery {
        SessionsQuery {
            date: date.map(str::to_string),
            movie: movie.map(str::to_string),
        }
    }

    #[test]
    fn date_and_movie_filters_are_parsed() {
        let filters = SessionFilters::try_from(&query(Some("2024-05-01"), Some("3"))).unwrap();
        assert_eq!(filters.date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(filters.movie, Some(3));
    }

    #[test]
    fn missing_filters_match_everything() {
        let filters = SessionFilters::try_from(&query(None, Some(""))).unwrap();
        assert_eq!(filters, SessionFilters::default());
    }

    #[test]
    fn only_iso_dates_are_accepted() {
        assert!(SessionFilters::try_from(&query(Some("01.05.2024"), None)).is_err());
        assert!(SessionFilters::try_from(&query(Some("2024-05-01T10:00"), None)).is_err());
        assert!(SessionFilters::try_from(&query(None, Some("abc"))).is_err());
    }
}
