use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Место в зале. Не хранится отдельно, выводится из размеров зала.
///
/// Порядок сравнения построчный: сначала ряд, затем номер.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Seat {
    pub row: i32,
    #[serde(rename = "seat")]
    pub number: i32,
}

impl Seat {
    pub const fn new(row: i32, number: i32) -> Self {
        Self { row, number }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub id: Uuid,
    #[serde(rename = "movie_session")]
    pub session_id: i64,
    #[serde(flatten)]
    pub seat: Seat,
    #[serde(skip)]
    pub order_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seats_sort_row_major() {
        let mut seats = vec![Seat::new(2, 1), Seat::new(1, 3), Seat::new(1, 1)];
        seats.sort();
        assert_eq!(seats, vec![Seat::new(1, 1), Seat::new(1, 3), Seat::new(2, 1)]);
    }

    #[test]
    fn seat_serializes_with_api_field_names() {
        let json = serde_json::to_value(Seat::new(4, 7)).unwrap();
        assert_eq!(json, serde_json::json!({"row": 4, "seat": 7}));
    }

    #[test]
    fn ticket_serializes_flat() {
        let ticket = Ticket {
            id: Uuid::nil(),
            session_id: 3,
            seat: Seat::new(1, 2),
            order_id: Uuid::new_v4(),
        };
        let json = serde_json::to_value(&ticket).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": Uuid::nil(), "movie_session": 3, "row": 1, "seat": 2})
        );
    }
}
