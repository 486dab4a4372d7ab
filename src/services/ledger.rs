//! Леджер билетов: какие места заняты на каждом сеансе.
//!
//! Каждый сеанс защищён своим мьютексом, поэтому брони на разные сеансы
//! не блокируют друг друга, а проверка и вставка мест одного запроса
//! выполняются как один неделимый шаг. Мьютексы никогда не держатся
//! через `.await`.
//!
//! Место проходит два состояния: `Held` (попытка заказа ещё не
//! зафиксирована) и `Committed`. Для читателей оба состояния означают
//! "занято".

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::debug;
use uuid::Uuid;

use super::catalog::CatalogStore;
use crate::error::BookingError;
use crate::models::{CinemaHall, MovieSession, Seat, Ticket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    Held,
    Committed,
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    ticket_id: Uuid,
    order_id: Uuid,
    state: TicketState,
}

#[derive(Debug, Default)]
struct SessionSeats {
    taken: BTreeMap<Seat, LedgerEntry>,
    // Изменение сеанса ждёт записи в базу, брони не принимаются
    frozen: bool,
}

/// Состояние сеанса на один момент времени.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: MovieSession,
    pub hall: CinemaHall,
    pub occupied: BTreeSet<Seat>,
}

pub struct TicketLedger {
    catalog: Arc<CatalogStore>,
    sessions: RwLock<HashMap<i64, Arc<Mutex<SessionSeats>>>>,
}

impl TicketLedger {
    pub fn new(catalog: Arc<CatalogStore>) -> Self {
        Self {
            catalog,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    fn existing_slot(&self, session_id: i64) -> Option<Arc<Mutex<SessionSeats>>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session_id)
            .cloned()
    }

    // Слот создаётся лениво, только для сеансов из каталога
    fn slot(&self, session_id: i64) -> Result<Arc<Mutex<SessionSeats>>, BookingError> {
        if let Some(slot) = self.existing_slot(session_id) {
            return Ok(slot);
        }
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = sessions.get(&session_id) {
            return Ok(slot.clone());
        }
        // Проверка под замком карты: удалённый сеанс не должен вернуться
        self.catalog.get_session(session_id)?;
        let slot = Arc::new(Mutex::new(SessionSeats::default()));
        sessions.insert(session_id, slot.clone());
        Ok(slot)
    }

    fn lock(slot: &Mutex<SessionSeats>) -> MutexGuard<'_, SessionSeats> {
        slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Снимок сеанса: зал и занятые места, прочитанные под одним замком.
    pub fn snapshot(&self, session_id: i64) -> Result<SessionSnapshot, BookingError> {
        let slot = self.slot(session_id)?;
        let seats = Self::lock(&slot);
        let (session, hall) = self.catalog.session_with_hall(session_id)?;
        Ok(SessionSnapshot {
            session,
            hall,
            occupied: seats.taken.keys().copied().collect(),
        })
    }

    pub fn list_occupied_seats(&self, session_id: i64) -> Result<BTreeSet<Seat>, BookingError> {
        Ok(self.snapshot(session_id)?.occupied)
    }

    /// Резервирует места одного сеанса под заказ `order_id`.
    ///
    /// Либо все места становятся `Held`, либо ничего не меняется.
    /// Ошибки проверяются в порядке: границы зала, повторы в запросе,
    /// занятые места (в `SeatConflict` попадают все занятые).
    pub fn reserve(&self, session_id: i64, seats: &[Seat], order_id: Uuid) -> Result<Vec<Ticket>, BookingError> {
        let slot = self.slot(session_id)?;
        let mut state = Self::lock(&slot);
        if state.frozen {
            return Err(BookingError::SessionBusy(session_id));
        }

        // Зал перечитываем под замком: смена зала сериализована с бронями
        let (_, hall) = self.catalog.session_with_hall(session_id)?;

        let mut requested = BTreeSet::new();
        for seat in seats {
            if !hall.contains(seat) {
                return Err(BookingError::InvalidSeat {
                    session_id,
                    seat: *seat,
                    rows: hall.rows,
                    seats_in_row: hall.seats_in_row,
                });
            }
            if !requested.insert(*seat) {
                return Err(BookingError::DuplicateSeat { session_id, seat: *seat });
            }
        }

        let conflicts: Vec<Seat> = requested
            .iter()
            .filter(|seat| state.taken.contains_key(seat))
            .copied()
            .collect();
        if !conflicts.is_empty() {
            return Err(BookingError::SeatConflict { session_id, seats: conflicts });
        }

        let tickets: Vec<Ticket> = seats
            .iter()
            .map(|seat| Ticket {
                id: Uuid::new_v4(),
                session_id,
                seat: *seat,
                order_id,
            })
            .collect();

        for ticket in &tickets {
            state.taken.insert(
                ticket.seat,
                LedgerEntry {
                    ticket_id: ticket.id,
                    order_id,
                    state: TicketState::Held,
                },
            );
        }

        debug!(session_id, %order_id, seats = tickets.len(), "seats held");
        Ok(tickets)
    }

    /// Переводит места заказа в `Committed`. Возвращает число мест.
    pub fn confirm(&self, session_id: i64, order_id: Uuid) -> usize {
        let Some(slot) = self.existing_slot(session_id) else {
            return 0;
        };
        let mut state = Self::lock(&slot);
        let mut confirmed = 0;
        for entry in state.taken.values_mut().filter(|e| e.order_id == order_id) {
            entry.state = TicketState::Committed;
            confirmed += 1;
        }
        confirmed
    }

    /// Снимает все места заказа на сеансе. Чужие места не трогает.
    pub fn release(&self, session_id: i64, order_id: Uuid) -> usize {
        let Some(slot) = self.existing_slot(session_id) else {
            return 0;
        };
        let mut state = Self::lock(&slot);
        let before = state.taken.len();
        state.taken.retain(|_, entry| entry.order_id != order_id);
        let released = before - state.taken.len();
        debug!(session_id, %order_id, released, "seats released");
        released
    }

    /// Загружает уже зафиксированные билеты (при старте сервиса).
    pub fn restore(&self, tickets: impl IntoIterator<Item = Ticket>) -> Result<usize, BookingError> {
        let mut restored = 0;
        for ticket in tickets {
            let slot = self.slot(ticket.session_id)?;
            Self::lock(&slot).taken.insert(
                ticket.seat,
                LedgerEntry {
                    ticket_id: ticket.id,
                    order_id: ticket.order_id,
                    state: TicketState::Committed,
                },
            );
            restored += 1;
        }
        Ok(restored)
    }

    /// Состояние конкретного места, если оно занято.
    pub fn seat_state(&self, session_id: i64, seat: Seat) -> Option<(Uuid, TicketState)> {
        let slot = self.existing_slot(session_id)?;
        let state = Self::lock(&slot);
        state.taken.get(&seat).map(|entry| (entry.ticket_id, entry.state))
    }

    /// Начинает обновление сеанса. Сменить зал можно только пока билетов нет.
    ///
    /// До `apply` или сброса изменения брони на сеанс отклоняются.
    pub fn begin_update(&self, updated: MovieSession) -> Result<PendingChange<'_>, BookingError> {
        let slot = self.slot(updated.id)?;
        {
            let mut state = Self::lock(&slot);
            if state.frozen {
                return Err(BookingError::SessionBusy(updated.id));
            }
            let current = self.catalog.get_session(updated.id)?;
            if current.cinema_hall_id != updated.cinema_hall_id {
                if !state.taken.is_empty() {
                    return Err(BookingError::SessionInUse(updated.id));
                }
                self.catalog.get_hall(updated.cinema_hall_id)?;
            }
            state.frozen = true;
        }
        Ok(PendingChange {
            ledger: self,
            slot,
            session_id: updated.id,
            action: Some(SessionAction::Update(updated)),
        })
    }

    /// Начинает удаление сеанса без билетов.
    pub fn begin_remove(&self, session_id: i64) -> Result<PendingChange<'_>, BookingError> {
        let slot = self.slot(session_id)?;
        {
            let mut state = Self::lock(&slot);
            if state.frozen {
                return Err(BookingError::SessionBusy(session_id));
            }
            if !state.taken.is_empty() {
                return Err(BookingError::SessionInUse(session_id));
            }
            self.catalog.get_session(session_id)?;
            state.frozen = true;
        }
        Ok(PendingChange {
            ledger: self,
            slot,
            session_id,
            action: Some(SessionAction::Remove),
        })
    }

    /// Обновляет сеанс сразу. Возвращает прежнюю версию.
    pub fn change_session(&self, updated: MovieSession) -> Result<MovieSession, BookingError> {
        self.begin_update(updated)?.apply()
    }

    /// Удаляет сеанс без билетов из каталога и леджера.
    pub fn remove_session(&self, session_id: i64) -> Result<MovieSession, BookingError> {
        self.begin_remove(session_id)?.apply()
    }
}

#[derive(Debug)]
enum SessionAction {
    Update(MovieSession),
    Remove,
}

/// Изменение сеанса, ожидающее записи в базу.
///
/// `apply` переносит его в каталог. Сброс без `apply` отменяет изменение
/// и снова открывает сеанс для броней.
pub struct PendingChange<'a> {
    ledger: &'a TicketLedger,
    slot: Arc<Mutex<SessionSeats>>,
    session_id: i64,
    action: Option<SessionAction>,
}

impl PendingChange<'_> {
    /// Возвращает прежнюю (или удалённую) версию сеанса.
    pub fn apply(mut self) -> Result<MovieSession, BookingError> {
        let action = self.action.take();
        let catalog = &self.ledger.catalog;
        let mut state = TicketLedger::lock(&self.slot);
        state.frozen = false;

        match action {
            Some(SessionAction::Update(updated)) => {
                let previous = catalog.get_session(self.session_id)?;
                catalog.replace_session(updated);
                Ok(previous)
            }
            Some(SessionAction::Remove) => {
                let removed = catalog
                    .remove_session(self.session_id)
                    .ok_or_else(|| BookingError::session_not_found(self.session_id))?;
                drop(state);
                self.ledger
                    .sessions
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&self.session_id);
                Ok(removed)
            }
            None => catalog.get_session(self.session_id),
        }
    }
}

impl Drop for PendingChange<'_> {
    fn drop(&mut self) {
        if self.action.is_some() {
            TicketLedger::lock(&self.slot).frozen = false;
            debug!(session_id = self.session_id, "session change abandoned");
        }
    }
}
