pub mod auth;
pub mod availability;
pub mod catalog;
pub mod coordinator;
pub mod ledger;
pub mod orders;

use std::sync::Arc;

use tracing::info;

use crate::database::Database;
use crate::error::BookingError;
use crate::models::{CinemaHall, MovieSession};
use availability::AvailabilityCalculator;
use catalog::CatalogStore;
use coordinator::{BookingCoordinator, OrderRepository};
use ledger::TicketLedger;
use orders::PgOrderRepository;

/// Движок бронирования: каталог, леджер, расчёт мест и координатор.
#[derive(Clone)]
pub struct BookingEngine {
    pub catalog: Arc<CatalogStore>,
    pub ledger: Arc<TicketLedger>,
    pub availability: AvailabilityCalculator,
    pub coordinator: BookingCoordinator,
}

impl BookingEngine {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        let catalog = Arc::new(CatalogStore::new());
        let ledger = Arc::new(TicketLedger::new(catalog.clone()));
        Self {
            availability: AvailabilityCalculator::new(ledger.clone()),
            coordinator: BookingCoordinator::new(ledger.clone(), orders),
            catalog,
            ledger,
        }
    }

    // Прогрев при старте: залы, сеансы и уже проданные билеты из БД
    pub async fn warmup(&self, db: &Database, orders: &PgOrderRepository) -> Result<(), BookingError> {
        info!("Starting booking engine warmup...");

        let halls = sqlx::query_as::<_, CinemaHall>(
            "SELECT id, name, rows, seats_in_row FROM cinema_halls"
        )
        .fetch_all(&db.pool)
        .await
        .map_err(BookingError::Persistence)?;
        for hall in halls {
            self.catalog.insert_hall(hall);
        }

        let sessions = sqlx::query_as::<_, MovieSession>(
            "SELECT id, movie_id, cinema_hall_id, show_time FROM movie_sessions"
        )
        .fetch_all(&db.pool)
        .await
        .map_err(BookingError::Persistence)?;
        for session in sessions {
            self.catalog.insert_session(session)?;
        }

        let tickets = orders.load_tickets().await.map_err(BookingError::Persistence)?;
        let restored = self.ledger.restore(tickets)?;

        info!(
            halls = self.catalog.hall_count(),
            sessions = self.catalog.session_count(),
            tickets = restored,
            "Booking engine warmup done"
        );
        Ok(())
    }
}
