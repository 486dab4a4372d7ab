use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::num::ParseIntError;

use crate::models::{Actor, Genre, Movie};

/// Клиент для выборок каталога: фильмы и сеансы с фильтрами
#[derive(Clone)]
pub struct SearchClient {
    pool: PgPool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MovieFilters {
    pub title: Option<String>,
    pub genres: Option<Vec<i64>>,
    pub actors: Option<Vec<i64>>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionFilters {
    pub date: Option<NaiveDate>,
    pub movie: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MovieListItem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub duration: i32,
    pub genres: Vec<String>,
    pub actors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MovieDetail {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub duration: i32,
    pub genres: Vec<Genre>,
    pub actors: Vec<ActorView>,
}

#[derive(Debug, Serialize)]
pub struct ActorView {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
}

impl From<Actor> for ActorView {
    fn from(actor: Actor) -> Self {
        Self {
            full_name: actor.full_name(),
            id: actor.id,
            first_name: actor.first_name,
            last_name: actor.last_name,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: i64,
    pub show_time: NaiveDateTime,
    pub movie_id: i64,
    pub movie_title: String,
    pub movie_description: String,
    pub movie_duration: i32,
    pub cinema_hall_id: i64,
    pub cinema_hall_name: String,
    pub rows: i32,
    pub seats_in_row: i32,
}

const SESSION_SELECT: &str = r#"
    SELECT ms.id, ms.show_time,
           ms.movie_id, m.title AS movie_title,
           m.description AS movie_description, m.duration AS movie_duration,
           ms.cinema_hall_id, ch.name AS cinema_hall_name, ch.rows, ch.seats_in_row
    FROM movie_sessions ms
    JOIN movies m ON m.id = ms.movie_id
    JOIN cinema_halls ch ON ch.id = ms.cinema_hall_id
"#;

/// Разбирает список id через запятую: "1,2, 3".
pub fn params_to_ids(raw: &str) -> Result<Vec<i64>, ParseIntError> {
    raw.split(',').map(|id| id.trim().parse::<i64>()).collect()
}

// Экранируем спецсимволы LIKE, чтобы искать подстроку буквально
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl SearchClient {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Фильмы по фильтрам. Совпадение по любому из жанров/актёров, без дублей.
    pub async fn search_movies(&self, filters: &MovieFilters) -> Result<Vec<MovieListItem>, sqlx::Error> {
        let movies = sqlx::query_as::<_, Movie>(
            r#"
            SELECT m.id, m.title, m.description, m.duration
            FROM movies m
            WHERE ($1::text IS NULL OR m.title ILIKE '%' || $1 || '%' ESCAPE '\')
              AND ($2::bigint[] IS NULL OR EXISTS (
                    SELECT 1 FROM movie_genres mg
                    WHERE mg.movie_id = m.id AND mg.genre_id = ANY($2)))
              AND ($3::bigint[] IS NULL OR EXISTS (
                    SELECT 1 FROM movie_actors ma
                    WHERE ma.movie_id = m.id AND ma.actor_id = ANY($3)))
            ORDER BY m.id
            "#
        )
        .bind(filters.title.as_deref().map(escape_like))
        .bind(filters.genres.clone())
        .bind(filters.actors.clone())
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i64> = movies.iter().map(|m| m.id).collect();
        let (mut genres, mut actors) = self.load_relations(&ids).await?;

        Ok(movies
            .into_iter()
            .map(|m| MovieListItem {
                genres: genres.remove(&m.id).unwrap_or_default().into_iter().map(|g| g.name).collect(),
                actors: actors.remove(&m.id).unwrap_or_default().iter().map(Actor::full_name).collect(),
                id: m.id,
                title: m.title,
                description: m.description,
                duration: m.duration,
            })
            .collect())
    }

    pub async fn movie_detail(&self, movie_id: i64) -> Result<Option<MovieDetail>, sqlx::Error> {
        let movie = sqlx::query_as::<_, Movie>(
            "SELECT id, title, description, duration FROM movies WHERE id = $1"
        )
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(movie) = movie else {
            return Ok(None);
        };

        let (mut genres, mut actors) = self.load_relations(&[movie.id]).await?;
        Ok(Some(MovieDetail {
            genres: genres.remove(&movie.id).unwrap_or_default(),
            actors: actors
                .remove(&movie.id)
                .unwrap_or_default()
                .into_iter()
                .map(ActorView::from)
                .collect(),
            id: movie.id,
            title: movie.title,
            description: movie.description,
            duration: movie.duration,
        }))
    }

    // Жанры и актёры пачкой для набора фильмов
    async fn load_relations(
        &self,
        movie_ids: &[i64],
    ) -> Result<(HashMap<i64, Vec<Genre>>, HashMap<i64, Vec<Actor>>), sqlx::Error> {
        let mut genres: HashMap<i64, Vec<Genre>> = HashMap::new();
        let mut actors: HashMap<i64, Vec<Actor>> = HashMap::new();
        if movie_ids.is_empty() {
            return Ok((genres, actors));
        }

        let genre_rows = sqlx::query_as::<_, (i64, i64, String)>(
            "SELECT mg.movie_id, g.id, g.name
             FROM movie_genres mg
             JOIN genres g ON g.id = mg.genre_id
             WHERE mg.movie_id = ANY($1)
             ORDER BY g.name"
        )
        .bind(movie_ids)
        .fetch_all(&self.pool)
        .await?;
        for (movie_id, id, name) in genre_rows {
            genres.entry(movie_id).or_default().push(Genre { id, name });
        }

        let actor_rows = sqlx::query_as::<_, (i64, i64, String, String)>(
            "SELECT ma.movie_id, a.id, a.first_name, a.last_name
             FROM movie_actors ma
             JOIN actors a ON a.id = ma.actor_id
             WHERE ma.movie_id = ANY($1)
             ORDER BY a.last_name, a.first_name"
        )
        .bind(movie_ids)
        .fetch_all(&self.pool)
        .await?;
        for (movie_id, id, first_name, last_name) in actor_rows {
            actors.entry(movie_id).or_default().push(Actor { id, first_name, last_name });
        }

        Ok((genres, actors))
    }

    /// Сеансы по дате показа (календарный день) и фильму.
    pub async fn search_sessions(&self, filters: &SessionFilters) -> Result<Vec<SessionRow>, sqlx::Error> {
        let query = format!(
            "{SESSION_SELECT}
             WHERE ($1::date IS NULL OR ms.show_time::date = $1)
               AND ($2::bigint IS NULL OR ms.movie_id = $2)
             ORDER BY ms.show_time, ms.id"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(filters.date)
            .bind(filters.movie)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn session_by_id(&self, session_id: i64) -> Result<Option<SessionRow>, sqlx::Error> {
        let query = format!("{SESSION_SELECT} WHERE ms.id = $1");
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
    }
}
