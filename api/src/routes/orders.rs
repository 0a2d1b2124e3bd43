//! Read-only order routes. Orders are placed by the checkout flow of the storefront, which
//! prices them from the catalog before calling into the wallet engine.

use super::{found, listed, parse_id, LookupError, Range, RangeError};
use crate::{access, error::JsonResult, state::RocketState};
use app::order;
use chrono::{DateTime, Utc};
use rocket::{get, serde::json::Json, State};
use rocket_okapi::openapi;
use schemars::JsonSchema;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum PaymentMethod {
    /// Cash on delivery.
    Cod,
    /// Paid from the wallet.
    Wallet,
}

#[derive(Debug, Serialize, JsonSchema)]
struct ItemModel {
    food_id: Uuid,
    quantity: i32,
    /// Unit price when the order was placed.
    price_at_purchase: String,
}

#[derive(Debug, Serialize, JsonSchema)]
struct OrderModel {
    /// Unique order identifier.
    id: Uuid,
    user_id: Uuid,
    delivery_address: String,
    phone: String,
    total_amount: String,
    payment_method: PaymentMethod,
    is_paid: bool,
    created_at: DateTime<Utc>,
    items: Vec<ItemModel>,
}

impl OrderModel {
    fn from_entity(order: &order::Order) -> Self {
        Self {
            id: order.id.0,
            user_id: order.user_id.0,
            delivery_address: order.delivery_address.clone(),
            phone: order.phone.clone(),
            total_amount: order.total.to_string(),
            payment_method: match order.payment_method {
                order::PaymentMethod::Cod => PaymentMethod::Cod,
                order::PaymentMethod::Wallet => PaymentMethod::Wallet,
            },
            is_paid: order.is_paid,
            created_at: order.created,
            items: order
                .items
                .iter()
                .map(|item| ItemModel {
                    food_id: item.food_id.0,
                    quantity: item.quantity,
                    price_at_purchase: item.price_at_purchase.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct OrderResponse {
    order: OrderModel,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct OrdersResponse {
    orders: Vec<OrderModel>,
}

/// List your orders, newest first.
#[openapi(tag = "Orders")]
#[get("/orders?<range..>")]
pub(super) async fn list(
    state: &State<RocketState>,
    guard: access::CustomerGuard,
    range: Range,
) -> JsonResult<OrdersResponse, RangeError> {
    let orders = listed(order::list(guard.grant(), &state.db, range.query_range()?).await)?;
    Ok(Json(OrdersResponse {
        orders: orders.iter().map(OrderModel::from_entity).collect(),
    }))
}

/// Get order details, including whether it has been paid.
#[openapi(tag = "Orders")]
#[get("/orders/<order_id>")]
pub(super) async fn get(
    state: &State<RocketState>,
    guard: access::CustomerGuard,
    order_id: String,
) -> JsonResult<OrderResponse, LookupError> {
    let id = order::Id(parse_id(&order_id)?);
    let order = found("order", order::get(guard.grant(), &state.db, id).await)?;
    Ok(Json(OrderResponse {
        order: OrderModel::from_entity(&order),
    }))
}
