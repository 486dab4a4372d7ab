use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::models::OrderItem;
use crate::services::orders::OrderView;
use crate::AppState;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() as i64 - 1) * self.page_size() as i64
    }
}

#[derive(Debug, Serialize)]
struct OrdersPage {
    count: i64,
    next: Option<u32>,
    previous: Option<u32>,
    results: Vec<OrderView>,
}

// GET /api/orders?page=2&page_size=10 - только свои заказы
async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.orders.count_for_user(user.user_id).await?;
    let page = params.page();

    if page > 1 && params.offset() >= count {
        return Err(ApiError::NotFound { kind: "page", id: page as i64 });
    }

    let results = state
        .orders
        .list_for_user(user.user_id, params.page_size() as i64, params.offset())
        .await?;

    let has_next = params.offset() + (results.len() as i64) < count;
    Ok(Json(OrdersPage {
        count,
        next: has_next.then_some(page + 1),
        previous: (page > 1).then(|| page - 1),
        results,
    }))
}

// POST /api/orders
#[derive(Debug, Deserialize)]
struct CreateOrderRequest {
    #[serde(default)]
    tickets: Vec<OrderItem>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .engine
        .coordinator
        .place_order(user.user_id, &req.tickets)
        .await?;

    Ok((StatusCode::CREATED, Json(order)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_page_of_ten() {
        let query = PageQuery::default();
        assert_eq!(query.page(), 1);
        assert_eq!(query.page_size(), 10);
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn page_size_is_clamped() {
        let query = PageQuery { page: Some(3), page_size: Some(500) };
        assert_eq!(query.page_size(), 100);
        assert_eq!(query.offset(), 200);

        let query = PageQuery { page: Some(0), page_size: Some(0) };
        assert_eq!(query.page(), 1);
        assert_eq!(query.page_size(), 1);
    }

    #[test]
    fn order_items_use_ticket_field_names() {
        let req: CreateOrderRequest = serde_json::from_str(
            r#"{"tickets": [{"movie_session": 4, "row": 2, "seat": 7}]}"#,
        )
        .unwrap();
        assert_eq!(req.tickets, vec![OrderItem::new(4, 2, 7)]);
    }
}
