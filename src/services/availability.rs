//! Расчёт свободных мест сеанса.
//!
//! Все ответы строятся по снимку леджера, снятому под замком сеанса,
//! поэтому количество и список мест всегда согласованы между собой.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::ledger::TicketLedger;
use crate::error::BookingError;
use crate::models::{CinemaHall, Seat};

#[derive(Clone)]
pub struct AvailabilityCalculator {
    ledger: Arc<TicketLedger>,
}

impl AvailabilityCalculator {
    pub fn new(ledger: Arc<TicketLedger>) -> Self {
        Self { ledger }
    }

    /// Вместимость зала минус занятые места.
    pub fn available_count(&self, session_id: i64) -> Result<u32, BookingError> {
        Ok(self.available_seats(session_id)?.count())
    }

    /// Свободные места в построчном порядке на текущий момент.
    pub fn available_seats(&self, session_id: i64) -> Result<FreeSeats, BookingError> {
        let snapshot = self.ledger.snapshot(session_id)?;
        Ok(FreeSeats {
            hall: snapshot.hall,
            occupied: snapshot.occupied,
        })
    }
}

/// Снимок свободных мест. Итерировать можно сколько угодно раз.
#[derive(Debug, Clone)]
pub struct FreeSeats {
    hall: CinemaHall,
    occupied: BTreeSet<Seat>,
}

impl FreeSeats {
    pub fn capacity(&self) -> u32 {
        self.hall.capacity()
    }

    pub fn occupied(&self) -> &BTreeSet<Seat> {
        &self.occupied
    }

    pub fn count(&self) -> u32 {
        // В леджер попадают только места в границах зала
        self.capacity().saturating_sub(self.occupied.len() as u32)
    }

    pub fn iter(&self) -> FreeSeatsIter<'_> {
        FreeSeatsIter {
            seats: self,
            next: Seat::new(1, 1),
        }
    }
}

impl<'a> IntoIterator for &'a FreeSeats {
    type Item = Seat;
    type IntoIter = FreeSeatsIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ленивый обход зала: ряд по возрастанию, затем номер места.
pub struct FreeSeatsIter<'a> {
    seats: &'a FreeSeats,
    next: Seat,
}

impl Iterator for FreeSeatsIter<'_> {
    type Item = Seat;

    fn next(&mut self) -> Option<Seat> {
        let hall = &self.seats.hall;
        while self.next.row <= hall.rows && hall.seats_in_row > 0 {
            let current = self.next;
            if current.number < hall.seats_in_row {
                self.next.number += 1;
            } else {
                self.next = Seat::new(current.row + 1, 1);
            }
            if !self.seats.occupied.contains(&current) {
                return Some(current);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MovieSession;
    use crate::services::catalog::CatalogStore;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn setup(rows: i32, seats_in_row: i32) -> (Arc<TicketLedger>, AvailabilityCalculator) {
        let catalog = Arc::new(CatalogStore::new());
        catalog.insert_hall(CinemaHall { id: 1, name: "Main".into(), rows, seats_in_row });
        let show_time = NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(20, 30, 0))
            .unwrap();
        catalog
            .insert_session(MovieSession { id: 1, movie_id: 1, cinema_hall_id: 1, show_time })
            .unwrap();
        let ledger = Arc::new(TicketLedger::new(catalog));
        let calculator = AvailabilityCalculator::new(ledger.clone());
        (ledger, calculator)
    }

    #[test]
    fn empty_session_is_fully_available() {
        let (_, calculator) = setup(2, 3);
        assert_eq!(calculator.available_count(1).unwrap(), 6);
        let seats: Vec<Seat> = calculator.available_seats(1).unwrap().iter().collect();
        assert_eq!(
            seats,
            vec![
                Seat::new(1, 1),
                Seat::new(1, 2),
                Seat::new(1, 3),
                Seat::new(2, 1),
                Seat::new(2, 2),
                Seat::new(2, 3),
            ]
        );
    }

    #[test]
    fn reserved_seats_disappear_and_reappear_after_release() {
        let (ledger, calculator) = setup(2, 3);
        let order = Uuid::new_v4();
        ledger.reserve(1, &[Seat::new(1, 2), Seat::new(2, 3)], order).unwrap();

        let free = calculator.available_seats(1).unwrap();
        assert_eq!(free.count(), 4);
        assert!(free.iter().all(|s| s != Seat::new(1, 2) && s != Seat::new(2, 3)));

        ledger.release(1, order);
        assert!(calculator.available_seats(1).unwrap().iter().any(|s| s == Seat::new(1, 2)));
        assert_eq!(calculator.available_count(1).unwrap(), 6);
    }

    #[test]
    fn free_seats_iteration_is_restartable() {
        let (ledger, calculator) = setup(3, 2);
        ledger.reserve(1, &[Seat::new(2, 1)], Uuid::new_v4()).unwrap();
        let free = calculator.available_seats(1).unwrap();
        let first: Vec<Seat> = free.iter().collect();
        let second: Vec<Seat> = (&free).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn unknown_session_is_not_found() {
        let (_, calculator) = setup(1, 1);
        assert!(calculator.available_count(42).is_err());
    }

    proptest! {
        #[test]
        fn count_plus_occupied_equals_capacity(
            rows in 1i32..6,
            seats_in_row in 1i32..6,
            picks in proptest::collection::vec((1i32..6, 1i32..6), 0..20),
        ) {
            let (ledger, calculator) = setup(rows, seats_in_row);
            for (row, number) in picks {
                // Ошибки (границы, конфликты) тоже допустимы, важен инвариант
                let _ = ledger.reserve(1, &[Seat::new(row, number)], Uuid::new_v4());
            }

            let free = calculator.available_seats(1).unwrap();
            let occupied = ledger.list_occupied_seats(1).unwrap();
            let capacity = (rows * seats_in_row) as u32;
            prop_assert_eq!(free.count() + occupied.len() as u32, capacity);

            let listed: Vec<Seat> = free.iter().collect();
            prop_assert_eq!(listed.len() as u32, free.count());
            prop_assert!(listed.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(listed.iter().all(|s| !occupied.contains(s)));
        }
    }
}
