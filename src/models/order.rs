use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Seat, Ticket};

/// Одна позиция заказа: место на конкретном сеансе.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub movie_session: i64,
    #[serde(flatten)]
    pub seat: Seat,
}

impl OrderItem {
    pub const fn new(movie_session: i64, row: i32, number: i32) -> Self {
        Self { movie_session, seat: Seat::new(row, number) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub tickets: Vec<Ticket>,
}
