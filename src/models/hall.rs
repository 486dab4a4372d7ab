use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Seat;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CinemaHall {
    pub id: i64,
    pub name: String,
    pub rows: i32,
    pub seats_in_row: i32,
}

impl CinemaHall {
    // Вместимость всегда вычисляется, отдельно не храним
    pub fn capacity(&self) -> u32 {
        (self.rows.max(0) as u32) * (self.seats_in_row.max(0) as u32)
    }

    pub fn contains(&self, seat: &Seat) -> bool {
        (1..=self.rows).contains(&seat.row) && (1..=self.seats_in_row).contains(&seat.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hall() -> CinemaHall {
        CinemaHall { id: 1, name: "Red".to_string(), rows: 2, seats_in_row: 3 }
    }

    #[test]
    fn capacity_is_rows_times_seats() {
        assert_eq!(hall().capacity(), 6);
    }

    #[test]
    fn contains_checks_both_dimensions() {
        let hall = hall();
        assert!(hall.contains(&Seat::new(1, 1)));
        assert!(hall.contains(&Seat::new(2, 3)));
        assert!(!hall.contains(&Seat::new(3, 1)));
        assert!(!hall.contains(&Seat::new(1, 4)));
        assert!(!hall.contains(&Seat::new(0, 1)));
    }
}
