//! Order detail pages and the order API, including seller shipping.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use kado_core::{Carrier, OrderId, OrderStatus};

use crate::db::OrderRepository;
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{CurrentUser, Order};
use crate::services::history::{HistoryEntry, reconstruct};
use crate::services::shipping::{Shipment, ship_order};
use crate::state::AppState;

pub fn page_router() -> Router<AppState> {
    Router::new().route("/orders/{id}", get(show))
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/orders", get(list))
        .route("/api/orders/{id}", get(detail))
        .route("/api/orders/{id}/ship", post(ship))
}

/// Body of `POST /api/orders/{id}/ship`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipBody {
    pub carrier: String,
    pub tracking_number: String,
}

/// An order with its reconstructed timeline.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub history: Vec<HistoryEntry>,
}

/// Carrier choice in the ship form.
#[derive(Debug, Clone)]
pub struct CarrierOption {
    pub value: &'static str,
    pub name: &'static str,
}

/// Timeline row as rendered.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub label: &'static str,
    pub description: String,
    pub iso: String,
    pub when: String,
}

impl From<&HistoryEntry> for TimelineEntry {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            label: entry.label,
            description: entry.description.clone(),
            iso: entry.timestamp.to_rfc3339(),
            when: entry.timestamp.format("%b %-d, %Y %H:%M UTC").to_string(),
        }
    }
}

/// Order detail page.
#[derive(Template, WebTemplate)]
#[template(path = "orders/show.html")]
pub struct OrderTemplate {
    pub user: Option<CurrentUser>,
    pub order_id: OrderId,
    pub listing_title: String,
    pub total: String,
    pub status_label: &'static str,
    pub fulfillment_label: Option<&'static str>,
    pub carrier: Option<&'static str>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub can_ship: bool,
    pub carriers: Vec<CarrierOption>,
    pub history: Vec<TimelineEntry>,
}

/// Buyer-facing wording for a payment status.
#[must_use]
pub const fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Awaiting payment",
        OrderStatus::Paid => "Paid",
        OrderStatus::Cancelled => "Cancelled",
        OrderStatus::Refunded => "Refunded",
    }
}

/// Load an order the caller is party to. Others get 404 so ids do not leak.
async fn visible_order(state: &AppState, id: OrderId, user: &CurrentUser) -> Result<Order> {
    OrderRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .filter(|o| o.is_party(&user.id) || state.config().is_admin(&user.id))
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
}

async fn load_detail(state: &AppState, id: OrderId, user: &CurrentUser) -> Result<OrderDetail> {
    let order = visible_order(state, id, user).await?;
    let events = OrderRepository::new(state.pool()).list_events(order.id).await?;
    let history = reconstruct(&order, &events);
    Ok(OrderDetail { order, history })
}

/// `GET /orders/{id}`
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<impl IntoResponse> {
    let OrderDetail { order, history } = load_detail(&state, id, &user).await?;

    let can_ship = order.seller_id == user.id
        && order.status == OrderStatus::Paid
        && order.tracking_number.is_none();
    let carrier = order
        .shipping_carrier
        .as_deref()
        .and_then(|c| c.parse::<Carrier>().ok())
        .map(|c| c.display_name());

    Ok(OrderTemplate {
        order_id: order.id,
        total: order.total().display(),
        status_label: status_label(order.status),
        fulfillment_label: order.fulfillment_status.map(|f| f.event_type().label()),
        carrier,
        can_ship,
        carriers: Carrier::ALL
            .iter()
            .map(|c| CarrierOption {
                value: c.as_str(),
                name: c.display_name(),
            })
            .collect(),
        history: history.iter().map(TimelineEntry::from).collect(),
        listing_title: order.listing_title,
        tracking_number: order.tracking_number,
        tracking_url: order.tracking_url,
        user: Some(user),
    })
}

/// `GET /api/orders`
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(&user.id)
        .await?;
    Ok(Json(orders))
}

/// `GET /api/orders/{id}`
pub async fn detail(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    Ok(Json(load_detail(&state, id, &user).await?))
}

/// `POST /api/orders/{id}/ship`
///
/// Returns the updated order and whether the buyer was emailed.
pub async fn ship(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
    Json(body): Json<ShipBody>,
) -> Result<Json<Shipment>> {
    let shipment = ship_order(&state, &user.id, id, &body.carrier, &body.tracking_number).await?;
    Ok(Json(shipment))
}
