//! Каталог залов и сеансов для пути бронирования.
//!
//! Хранит только то, что нужно для проверки мест: размеры зала и привязку
//! сеанса к залу. Фильмы, жанры и актёры живут в Postgres и сюда не попадают.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::BookingError;
use crate::models::{CinemaHall, MovieSession};

#[derive(Debug, Default)]
pub struct CatalogStore {
    halls: RwLock<HashMap<i64, CinemaHall>>,
    sessions: RwLock<HashMap<i64, MovieSession>>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_hall(&self, hall_id: i64) -> Result<CinemaHall, BookingError> {
        self.halls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&hall_id)
            .cloned()
            .ok_or_else(|| BookingError::hall_not_found(hall_id))
    }

    pub fn get_session(&self, session_id: i64) -> Result<MovieSession, BookingError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session_id)
            .cloned()
            .ok_or_else(|| BookingError::session_not_found(session_id))
    }

    /// Сеанс вместе с его залом.
    pub fn session_with_hall(&self, session_id: i64) -> Result<(MovieSession, CinemaHall), BookingError> {
        let session = self.get_session(session_id)?;
        let hall = self.get_hall(session.cinema_hall_id)?;
        Ok((session, hall))
    }

    pub fn insert_hall(&self, hall: CinemaHall) {
        self.halls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hall.id, hall);
    }

    /// Регистрирует новый сеанс. Зал должен уже быть в каталоге.
    pub fn insert_session(&self, session: MovieSession) -> Result<(), BookingError> {
        self.get_hall(session.cinema_hall_id)?;
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id, session);
        Ok(())
    }

    // Замена и удаление сеанса вызываются только из леджера под замком сеанса
    pub(crate) fn replace_session(&self, session: MovieSession) -> Option<MovieSession> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id, session)
    }

    pub(crate) fn remove_session(&self, session_id: i64) -> Option<MovieSession> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session_id)
    }

    pub fn hall_count(&self) -> usize {
        self.halls.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn show_time() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(18, 0, 0))
            .unwrap()
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let catalog = CatalogStore::new();
        assert!(matches!(
            catalog.get_hall(1),
            Err(BookingError::NotFound { kind: "cinema hall", id: 1 })
        ));
        assert!(matches!(
            catalog.get_session(2),
            Err(BookingError::NotFound { kind: "movie session", id: 2 })
        ));
    }

    #[test]
    fn session_requires_known_hall() {
        let catalog = CatalogStore::new();
        let session = MovieSession { id: 1, movie_id: 1, cinema_hall_id: 9, show_time: show_time() };
        assert!(catalog.insert_session(session.clone()).is_err());

        catalog.insert_hall(CinemaHall { id: 9, name: "Blue".into(), rows: 5, seats_in_row: 10 });
        catalog.insert_session(session).unwrap();

        let (session, hall) = catalog.session_with_hall(1).unwrap();
        assert_eq!(session.cinema_hall_id, hall.id);
        assert_eq!(hall.capacity(), 50);
        assert_eq!(catalog.session_count(), 1);
    }
}
