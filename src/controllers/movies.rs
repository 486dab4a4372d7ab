use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::cache::movies::movies_key;
use crate::error::ApiError;
use crate::middleware::{AdminUser, AuthUser};
use crate::models::Movie;
use crate::search_client::{params_to_ids, MovieFilters};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movies", get(list_movies).post(create_movie))
        .route("/movies/{id}", get(get_movie))
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct MoviesQuery {
    pub title: Option<String>,
    pub genres: Option<String>,
    pub actors: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl TryFrom<&MoviesQuery> for MovieFilters {
    type Error = ApiError;

    fn try_from(query: &MoviesQuery) -> Result<Self, Self::Error> {
        let ids = |raw: Option<&str>, name: &str| {
            raw.map(params_to_ids)
                .transpose()
                .map_err(|_| ApiError::BadRequest(format!("{name} must be a comma-separated list of ids")))
        };

        Ok(MovieFilters {
            title: non_empty(&query.title).map(str::to_string),
            genres: ids(non_empty(&query.genres), "genres")?,
            actors: ids(non_empty(&query.actors), "actors")?,
        })
    }
}

// GET /api/movies?title=&genres=1,2&actors=3
async fn list_movies(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<MoviesQuery>,
) -> Result<Response, ApiError> {
    let filters = MovieFilters::try_from(&params)?;

    // 1. Ключ кеша строим по исходным параметрам запроса
    let cache_key = movies_key(&params).map_err(|e| ApiError::Internal(e.to_string()))?;

    // 2. Пытаемся получить результат из кеша
    if let Ok(Some(cached_json)) = state.cache.get_cached_movies(&cache_key).await {
        return Ok(json_response(cached_json, "HIT"));
    }

    // 3. Cache miss: идём в базу
    let movies = state.search_client.search_movies(&filters).await?;
    let json = serde_json::to_string(&movies).map_err(|e| ApiError::Internal(e.to_string()))?;

    // 4. Сохраняем в кеш, ошибки кеша не критичны
    if let Err(e) = state.cache.cache_movies(&cache_key, &json).await {
        tracing::warn!("Failed to cache movie listing: {:?}", e);
    }

    Ok(json_response(json, "MISS"))
}

fn json_response(json: String, cache_status: &'static str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::HeaderName::from_static("x-cache"), cache_status),
        ],
        Body::from(json),
    )
        .into_response()
}

// GET /api/movies/{id}
async fn get_movie(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let movie = state
        .search_client
        .movie_detail(id)
        .await?
        .ok_or(ApiError::NotFound { kind: "movie", id })?;
    Ok(Json(movie))
}

// POST /api/movies
#[derive(Debug, Deserialize, Validate)]
struct CreateMovieRequest {
    #[validate(length(min = 1, max = 255))]
    title: String,
    #[serde(default)]
    description: String,
    #[validate(range(min = 1))]
    duration: i32,
    #[serde(default)]
    genres: Vec<i64>,
    #[serde(default)]
    actors: Vec<i64>,
}

async fn create_movie(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(req): Json<CreateMovieRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let mut tx = state.db.pool.begin().await?;

    let movie = sqlx::query_as::<_, Movie>(
        "INSERT INTO movies (title, description, duration) VALUES ($1, $2, $3)
         RETURNING id, title, description, duration"
    )
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(req.duration)
    .fetch_one(&mut *tx)
    .await?;

    if !req.genres.is_empty() {
        sqlx::query(
            "INSERT INTO movie_genres (movie_id, genre_id)
             SELECT $1, UNNEST($2::bigint[]) ON CONFLICT DO NOTHING"
        )
        .bind(movie.id)
        .bind(req.genres.as_slice())
        .execute(&mut *tx)
        .await
        .map_err(|e| super::map_constraint_error(e, "duplicate genre", "unknown genre id"))?;
    }

    if !req.actors.is_empty() {
        sqlx::query(
            "INSERT INTO movie_actors (movie_id, actor_id)
             SELECT $1, UNNEST($2::bigint[]) ON CONFLICT DO NOTHING"
        )
        .bind(movie.id)
        .bind(req.actors.as_slice())
        .execute(&mut *tx)
        .await
        .map_err(|e| super::map_constraint_error(e, "duplicate actor", "unknown actor id"))?;
    }

    tx.commit().await?;

    if let Err(e) = state.cache.invalidate_movies().await {
        tracing::warn!("Failed to invalidate movie listings: {:?}", e);
    }

    tracing::info!(movie_id = movie.id, "movie created");
    let detail = state
        .search_client
        .movie_detail(movie.id)
        .await?
        .ok_or(ApiError::NotFound { kind: "movie", id: movie.id })?;
    Ok((StatusCode::CREATED, Json(detail)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(title: Option<&str>, genres: Option<&str>, actors: Option<&str>) -> MoviesQuery {
        MoviesQuery {
            title: title.map(str::to_string),
            genres: genres.map(str::to_string),
            actors: actors.map(str::to_string),
        }
    }

    #[test]
    fn filters_are_parsed() {
        let filters = MovieFilters::try_from(&query(Some("matrix"), Some("1,2"), Some("5"))).unwrap();
        assert_eq!(
            filters,
            MovieFilters {
                title: Some("matrix".into()),
                genres: Some(vec![1, 2]),
                actors: Some(vec![5]),
            }
        );
    }

    #[test]
    fn blank_filters_are_ignored() {
        let filters = MovieFilters::try_from(&query(Some(""), Some(" "), None)).unwrap();
        assert_eq!(filters, MovieFilters::default());
    }

    #[test]
    fn malformed_ids_are_bad_requests() {
        let err = MovieFilters::try_from(&query(None, Some("1,x"), None)).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
