use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct MovieSession {
    pub id: i64,
    pub movie_id: i64,
    pub cinema_hall_id: i64,
    pub show_time: NaiveDateTime,
}
