//! Координатор бронирования: единственный путь записи заказов и билетов.
//!
//! Попытка заказа проходит состояния
//! `Validating -> Reserving -> Committing -> {Committed | RolledBack}`.
//! Пока попытка не зафиксирована, её места удерживаются в леджере и
//! снимаются при любом выходе, кроме успешной фиксации.
//!
//! Отмена (сброс future вызывающим) до фиксации откатывает всё: если
//! запись в базу уже идёт, задача сохранения дожидается её и удаляет заказ.
//! Отмена после фиксации ни на что не влияет.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::ledger::TicketLedger;
use crate::error::BookingError;
use crate::models::{Order, OrderItem, Seat};

/// Хранилище заказов. Сохранение заказа и его билетов и есть точка фиксации.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn persist(&self, order: &Order) -> Result<(), sqlx::Error>;

    /// Компенсация: удаляет сохранённый заказ, который некому вернуть.
    async fn discard(&self, order_id: Uuid) -> Result<(), sqlx::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Validating,
    Reserving,
    Committing,
    Committed,
    RolledBack,
}

#[derive(Debug)]
struct AttemptProgress {
    state: AttemptState,
    sessions: Vec<i64>,
    caller_gone: bool,
}

/// Одна попытка заказа. Общая для вызывающего и задачи сохранения:
/// решение "зафиксировать или откатить" принимается под одним замком.
struct OrderAttempt {
    ledger: Arc<TicketLedger>,
    order_id: Uuid,
    progress: Mutex<AttemptProgress>,
}

impl OrderAttempt {
    fn new(ledger: Arc<TicketLedger>) -> Arc<Self> {
        Arc::new(Self {
            ledger,
            order_id: Uuid::new_v4(),
            progress: Mutex::new(AttemptProgress {
                state: AttemptState::Validating,
                sessions: Vec::new(),
                caller_gone: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, AttemptProgress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, progress: &mut AttemptProgress, next: AttemptState) {
        debug!(order_id = %self.order_id, from = ?progress.state, to = ?next, "order attempt");
        progress.state = next;
    }

    fn advance(&self, next: AttemptState) {
        let mut progress = self.lock();
        self.transition(&mut progress, next);
    }

    fn held(&self, session_id: i64) {
        self.lock().sessions.push(session_id);
    }

    fn confirm(&self, progress: &mut AttemptProgress) {
        for session_id in &progress.sessions {
            self.ledger.confirm(*session_id, self.order_id);
        }
        self.transition(progress, AttemptState::Committed);
    }

    fn release(&self, progress: &mut AttemptProgress) {
        if matches!(progress.state, AttemptState::Committed | AttemptState::RolledBack) {
            return;
        }
        let released: usize = progress
            .sessions
            .iter()
            .map(|session_id| self.ledger.release(*session_id, self.order_id))
            .sum();
        if released > 0 {
            warn!(order_id = %self.order_id, released, "order attempt rolled back");
        }
        self.transition(progress, AttemptState::RolledBack);
    }

    /// Точка фиксации. `false`, если вызывающий ушёл раньше.
    fn commit(&self) -> bool {
        let mut progress = self.lock();
        if progress.caller_gone || progress.state != AttemptState::Committing {
            return false;
        }
        self.confirm(&mut progress);
        true
    }

    // Заказ остался в базе (компенсация не удалась): леджер следует за базой
    fn keep(&self) {
        let mut progress = self.lock();
        if progress.state == AttemptState::Committing {
            self.confirm(&mut progress);
        }
    }

    fn roll_back(&self) {
        let mut progress = self.lock();
        self.release(&mut progress);
    }

    /// Вызывающий ушёл. Во время записи в базу места держим до её исхода,
    /// иначе снимаем сразу.
    fn abandon(&self) {
        let mut progress = self.lock();
        progress.caller_gone = true;
        if progress.state != AttemptState::Committing {
            self.release(&mut progress);
        }
    }
}

// Живёт в future вызывающего: сброс future означает отмену попытки
struct CallerGuard(Arc<OrderAttempt>);

impl Drop for CallerGuard {
    fn drop(&mut self) {
        self.0.abandon();
    }
}

/// Группирует позиции по сеансам (по возрастанию id), сохраняя порядок мест.
fn group_by_session(items: &[OrderItem]) -> BTreeMap<i64, Vec<Seat>> {
    let mut groups: BTreeMap<i64, Vec<Seat>> = BTreeMap::new();
    for item in items {
        groups.entry(item.movie_session).or_default().push(item.seat);
    }
    groups
}

#[derive(Clone)]
pub struct BookingCoordinator {
    ledger: Arc<TicketLedger>,
    orders: Arc<dyn OrderRepository>,
}

impl BookingCoordinator {
    pub fn new(ledger: Arc<TicketLedger>, orders: Arc<dyn OrderRepository>) -> Self {
        Self { ledger, orders }
    }

    /// Оформляет заказ пользователя `user_id` целиком или не оформляет вовсе.
    ///
    /// `user_id` считается уже проверенным вызывающей стороной.
    pub async fn place_order(&self, user_id: i64, items: &[OrderItem]) -> Result<Order, BookingError> {
        let attempt = OrderAttempt::new(self.ledger.clone());
        let _guard = CallerGuard(attempt.clone());

        if items.is_empty() {
            return Err(BookingError::EmptyOrder);
        }

        attempt.advance(AttemptState::Reserving);
        let mut tickets = Vec::with_capacity(items.len());
        for (session_id, seats) in group_by_session(items) {
            // При ошибке guard снимает уже взятые группы
            let reserved = self.ledger.reserve(session_id, &seats, attempt.order_id)?;
            attempt.held(session_id);
            tickets.extend(reserved);
        }

        let order = Order {
            id: attempt.order_id,
            user_id,
            created_at: Utc::now(),
            tickets,
        };

        attempt.advance(AttemptState::Committing);

        // Запись в базу нельзя прервать на середине, поэтому она идёт в
        // отдельной задаче; исход сверяется с вызывающим через `commit`
        let orders = self.orders.clone();
        let task_attempt = attempt.clone();
        let handle = tokio::spawn(async move { settle(orders, task_attempt, order).await });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                attempt.roll_back();
                Err(BookingError::Interrupted(e))
            }
        }
    }
}

async fn settle(
    orders: Arc<dyn OrderRepository>,
    attempt: Arc<OrderAttempt>,
    order: Order,
) -> Result<Order, BookingError> {
    if let Err(e) = orders.persist(&order).await {
        error!(order_id = %order.id, "failed to persist order: {:?}", e);
        attempt.roll_back();
        return Err(BookingError::Persistence(e));
    }

    if attempt.commit() {
        info!(order_id = %order.id, user_id = order.user_id, tickets = order.tickets.len(), "order committed");
        return Ok(order);
    }

    warn!(order_id = %order.id, "order cancelled while persisting, discarding");
    match orders.discard(order.id).await {
        Ok(()) => attempt.roll_back(),
        Err(e) => {
            error!(order_id = %order.id, "failed to discard cancelled order: {:?}", e);
            attempt.keep();
        }
    }
    Err(BookingError::Cancelled(order.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CinemaHall, MovieSession};
    use crate::services::catalog::CatalogStore;
    use crate::services::ledger::TicketState;
    use chrono::NaiveDate;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingOrders {
        orders: Mutex<Vec<Order>>,
        delay: Duration,
    }

    #[async_trait]
    impl OrderRepository for RecordingOrders {
        async fn persist(&self, order: &Order) -> Result<(), sqlx::Error> {
            tokio::time::sleep(self.delay).await;
            self.orders.lock().unwrap().push(order.clone());
            Ok(())
        }

        async fn discard(&self, order_id: Uuid) -> Result<(), sqlx::Error> {
            self.orders.lock().unwrap().retain(|o| o.id != order_id);
            Ok(())
        }
    }

    struct BrokenOrders;

    #[async_trait]
    impl OrderRepository for BrokenOrders {
        async fn persist(&self, _order: &Order) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }

        async fn discard(&self, _order_id: Uuid) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
    }

    // Сохраняет, но удалить уже не может
    struct StickyOrders;

    #[async_trait]
    impl OrderRepository for StickyOrders {
        async fn persist(&self, _order: &Order) -> Result<(), sqlx::Error> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }

        async fn discard(&self, _order_id: Uuid) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::PoolClosed)
        }
    }

    fn ledger() -> Arc<TicketLedger> {
        let catalog = Arc::new(CatalogStore::new());
        catalog.insert_hall(CinemaHall { id: 1, name: "Main".into(), rows: 2, seats_in_row: 3 });
        let show_time = NaiveDate::from_ymd_opt(2024, 6, 1)
            .and_then(|d| d.and_hms_opt(19, 0, 0))
            .unwrap();
        for id in [1, 2] {
            catalog
                .insert_session(MovieSession { id, movie_id: 1, cinema_hall_id: 1, show_time })
                .unwrap();
        }
        Arc::new(TicketLedger::new(catalog))
    }

    // Попытка с одним удерживаемым местом (1, 2) на сеансе 1
    fn holding_attempt(ledger: &Arc<TicketLedger>) -> Arc<OrderAttempt> {
        let attempt = OrderAttempt::new(ledger.clone());
        attempt.advance(AttemptState::Reserving);
        ledger.reserve(1, &[Seat::new(1, 2)], attempt.order_id).unwrap();
        attempt.held(1);
        attempt
    }

    #[test]
    fn grouping_keeps_request_order_within_session() {
        let items = [
            OrderItem::new(2, 1, 3),
            OrderItem::new(1, 2, 2),
            OrderItem::new(2, 1, 1),
        ];
        let groups = group_by_session(&items);
        assert_eq!(groups.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(groups[&2], vec![Seat::new(1, 3), Seat::new(1, 1)]);
    }

    #[tokio::test]
    async fn committed_order_confirms_seats() {
        let ledger = ledger();
        let repo = Arc::new(RecordingOrders::default());
        let coordinator = BookingCoordinator::new(ledger.clone(), repo.clone());

        let order = coordinator
            .place_order(5, &[OrderItem::new(1, 1, 1), OrderItem::new(2, 2, 3)])
            .await
            .unwrap();

        assert_eq!(order.user_id, 5);
        assert_eq!(order.tickets.len(), 2);
        assert!(order.tickets.iter().all(|t| t.order_id == order.id));
        assert_eq!(repo.orders.lock().unwrap().len(), 1);
        assert_eq!(
            ledger.seat_state(2, Seat::new(2, 3)).map(|(_, s)| s),
            Some(TicketState::Committed)
        );
    }

    #[tokio::test]
    async fn empty_order_is_rejected() {
        let coordinator = BookingCoordinator::new(ledger(), Arc::new(RecordingOrders::default()));
        assert!(matches!(coordinator.place_order(1, &[]).await, Err(BookingError::EmptyOrder)));
    }

    #[tokio::test]
    async fn persistence_failure_releases_every_group() {
        let ledger = ledger();
        let coordinator = BookingCoordinator::new(ledger.clone(), Arc::new(BrokenOrders));

        let err = coordinator
            .place_order(1, &[OrderItem::new(1, 1, 1), OrderItem::new(2, 1, 1)])
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::Persistence(_)));
        assert!(ledger.list_occupied_seats(1).unwrap().is_empty());
        assert!(ledger.list_occupied_seats(2).unwrap().is_empty());
    }

    #[tokio::test]
    async fn later_group_failure_releases_earlier_groups() {
        let ledger = ledger();
        let coordinator = BookingCoordinator::new(ledger.clone(), Arc::new(RecordingOrders::default()));

        // Сеанс 2 (вторая группа) выходит за границы зала
        let err = coordinator
            .place_order(1, &[OrderItem::new(1, 1, 1), OrderItem::new(2, 9, 9)])
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::InvalidSeat { session_id: 2, .. }));
        assert!(ledger.list_occupied_seats(1).unwrap().is_empty());
    }

    #[test]
    fn caller_leaving_before_commit_releases_seats() {
        let ledger = ledger();
        {
            let attempt = holding_attempt(&ledger);
            let _guard = CallerGuard(attempt);
        }
        assert!(ledger.list_occupied_seats(1).unwrap().is_empty());
    }

    #[test]
    fn caller_leaving_during_commit_is_settled_by_the_task() {
        let ledger = ledger();
        let attempt = holding_attempt(&ledger);
        attempt.advance(AttemptState::Committing);

        drop(CallerGuard(attempt.clone()));

        // Запись в базу ещё идёт: место держится до её исхода
        assert_eq!(
            ledger.seat_state(1, Seat::new(1, 2)).map(|(_, s)| s),
            Some(TicketState::Held)
        );
        assert!(!attempt.commit());

        attempt.roll_back();
        assert!(ledger.list_occupied_seats(1).unwrap().is_empty());
    }

    #[test]
    fn committed_attempt_survives_caller_leaving() {
        let ledger = ledger();
        let attempt = holding_attempt(&ledger);
        attempt.advance(AttemptState::Committing);
        assert!(attempt.commit());

        drop(CallerGuard(attempt));
        assert_eq!(
            ledger.seat_state(1, Seat::new(1, 2)).map(|(_, s)| s),
            Some(TicketState::Committed)
        );
    }

    #[tokio::test]
    async fn order_cancelled_while_persisting_is_discarded() {
        let ledger = ledger();
        let repo = Arc::new(RecordingOrders { delay: Duration::from_millis(150), ..Default::default() });
        let coordinator = BookingCoordinator::new(ledger.clone(), repo.clone());

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            coordinator.place_order(1, &[OrderItem::new(1, 1, 1)]),
        )
        .await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(repo.orders.lock().unwrap().is_empty());
        assert!(ledger.list_occupied_seats(1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn undeletable_cancelled_order_stays_booked() {
        let ledger = ledger();
        let coordinator = BookingCoordinator::new(ledger.clone(), Arc::new(StickyOrders));

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            coordinator.place_order(1, &[OrderItem::new(1, 2, 2)]),
        )
        .await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        // Заказ остался в базе, значит и место занято
        assert_eq!(
            ledger.seat_state(1, Seat::new(2, 2)).map(|(_, s)| s),
            Some(TicketState::Committed)
        );
    }
}
