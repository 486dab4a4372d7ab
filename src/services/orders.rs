//! Заказы в Postgres: фиксация заказа с билетами и выборки для API.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::coordinator::OrderRepository;
use crate::models::{Order, Seat, Ticket};

#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    // Заказ и все его билеты пишутся одной транзакцией
    async fn persist(&self, order: &Order) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO orders (id, user_id, created_at) VALUES ($1, $2, $3)")
            .bind(order.id)
            .bind(order.user_id)
            .bind(order.created_at)
            .execute(&mut *tx)
            .await?;

        let mut insert = QueryBuilder::<Postgres>::new(
            "INSERT INTO tickets (id, order_id, movie_session_id, row, seat) ",
        );
        insert.push_values(&order.tickets, |mut b, ticket| {
            b.push_bind(ticket.id)
                .push_bind(ticket.order_id)
                .push_bind(ticket.session_id)
                .push_bind(ticket.seat.row)
                .push_bind(ticket.seat.number);
        });
        insert.build().execute(&mut *tx).await?;

        tx.commit().await
    }

    // Билеты уходят каскадом по order_id
    async fn discard(&self, order_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct TicketRow {
    id: Uuid,
    order_id: Uuid,
    movie_session_id: i64,
    row: i32,
    seat: i32,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct OrderTicketRow {
    id: Uuid,
    order_id: Uuid,
    row: i32,
    seat: i32,
    session_id: i64,
    show_time: NaiveDateTime,
    movie_title: String,
    cinema_hall_name: String,
    rows: i32,
    seats_in_row: i32,
}

#[derive(Debug, Serialize)]
pub struct TicketSessionView {
    pub id: i64,
    pub show_time: NaiveDateTime,
    pub movie_title: String,
    pub cinema_hall_name: String,
    pub cinema_hall_capacity: i32,
}

#[derive(Debug, Serialize)]
pub struct TicketView {
    pub id: Uuid,
    #[serde(flatten)]
    pub seat: Seat,
    pub movie_session: TicketSessionView,
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub tickets: Vec<TicketView>,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Все зафиксированные билеты, для прогрева леджера.
    pub async fn load_tickets(&self) -> Result<Vec<Ticket>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TicketRow>(
            "SELECT id, order_id, movie_session_id, row, seat FROM tickets"
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Ticket {
                id: r.id,
                session_id: r.movie_session_id,
                seat: Seat::new(r.row, r.seat),
                order_id: r.order_id,
            })
            .collect())
    }

    pub async fn count_for_user(&self, user_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
    }

    /// Страница заказов пользователя, свежие сначала.
    pub async fn list_for_user(&self, user_id: i64, limit: i64, offset: i64) -> Result<Vec<OrderView>, sqlx::Error> {
        let orders = sqlx::query_as::<_, OrderRow>(
            "SELECT id, created_at FROM orders
             WHERE user_id = $1
             ORDER BY created_at DESC, id
             LIMIT $2 OFFSET $3"
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let rows = sqlx::query_as::<_, OrderTicketRow>(
            r#"
            SELECT t.id, t.order_id, t.row, t.seat,
                   ms.id AS session_id, ms.show_time,
                   m.title AS movie_title,
                   ch.name AS cinema_hall_name, ch.rows, ch.seats_in_row
            FROM tickets t
            JOIN movie_sessions ms ON ms.id = t.movie_session_id
            JOIN movies m ON m.id = ms.movie_id
            JOIN cinema_halls ch ON ch.id = ms.cinema_hall_id
            WHERE t.order_id = ANY($1)
            ORDER BY ms.show_time, t.row, t.seat
            "#
        )
        .bind(ids.as_slice())
        .fetch_all(&self.pool)
        .await?;

        let mut tickets: HashMap<Uuid, Vec<TicketView>> = HashMap::new();
        for r in rows {
            tickets.entry(r.order_id).or_default().push(TicketView {
                id: r.id,
                seat: Seat::new(r.row, r.seat),
                movie_session: TicketSessionView {
                    id: r.session_id,
                    show_time: r.show_time,
                    movie_title: r.movie_title,
                    cinema_hall_name: r.cinema_hall_name,
                    cinema_hall_capacity: r.rows * r.seats_in_row,
                },
            });
        }

        Ok(orders
            .into_iter()
            .map(|o| OrderView {
                tickets: tickets.remove(&o.id).unwrap_or_default(),
                id: o.id,
                created_at: o.created_at,
            })
            .collect())
    }
}
