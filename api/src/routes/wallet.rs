//! Routes for the customer's own wallet and ledger.

use super::{listed, Range, RangeError};
use crate::{
    access,
    error::{self, JsonResult},
    state::RocketState,
};
use app::{ledger, wallet};
use chrono::{DateTime, Utc};
use rocket::{get, serde::json::Json, State};
use rocket_okapi::openapi;
use schemars::JsonSchema;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize, JsonSchema)]
struct WalletModel {
    /// Unique wallet identifier.
    id: Uuid,
    /// Current balance, as a decimal string with two fractional digits.
    balance: String,
    /// Time of the last balance change.
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct WalletResponse {
    wallet: WalletModel,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TransactionKind {
    /// Money added to the wallet.
    Credit,
    /// Money taken from the wallet.
    Debit,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TransactionCause {
    /// An approved top-up.
    TopUp,
    /// Payment for a wallet order.
    OrderPayment,
    /// Manual correction by staff.
    Adjustment,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct TransactionModel {
    /// Unique ledger entry identifier.
    id: Uuid,
    /// Wallet the entry belongs to.
    wallet_id: Uuid,
    kind: TransactionKind,
    cause: TransactionCause,
    /// Always positive; `kind` tells the direction.
    amount: String,
    /// The top-up this entry credits, if any.
    topup_id: Option<Uuid>,
    /// The order this entry pays for, if any.
    order_id: Option<Uuid>,
    note: String,
    created_at: DateTime<Utc>,
}

impl TransactionModel {
    pub(super) fn from_entity(entry: &ledger::Entry) -> Self {
        Self {
            id: entry.id.0,
            wallet_id: entry.wallet_id.0,
            kind: match entry.kind {
                ledger::Kind::Credit => TransactionKind::Credit,
                ledger::Kind::Debit => TransactionKind::Debit,
            },
            cause: match entry.cause {
                ledger::Cause::TopUp(_) => TransactionCause::TopUp,
                ledger::Cause::OrderPayment(_) => TransactionCause::OrderPayment,
                ledger::Cause::Adjustment => TransactionCause::Adjustment,
            },
            amount: entry.amount.to_string(),
            topup_id: match entry.cause {
                ledger::Cause::TopUp(id) => Some(id.0),
                _ => None,
            },
            order_id: match entry.cause {
                ledger::Cause::OrderPayment(id) => Some(id.0),
                _ => None,
            },
            note: entry.note.clone(),
            created_at: entry.created,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct TransactionResponse {
    pub(super) transaction: TransactionModel,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct TransactionsResponse {
    pub(super) transactions: Vec<TransactionModel>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(super) enum Error {
    /// Unexpected error, please contact support.
    Unknown,
}

/// Get your wallet and its current balance. The wallet is created on first access.
#[openapi(tag = "Wallet")]
#[get("/wallet")]
pub(super) async fn get(
    state: &State<RocketState>,
    guard: access::CustomerGuard,
) -> JsonResult<WalletResponse, Error> {
    let wallet = wallet::get(guard.grant(), &state.db)
        .await
        .map_err(|e| error::storage_error(Error::Unknown, &e))?;
    Ok(Json(WalletResponse {
        wallet: WalletModel {
            id: wallet.id().0,
            balance: wallet.balance().to_string(),
            updated_at: wallet.updated(),
        },
    }))
}

/// List the credits and debits of your wallet, newest first.
#[openapi(tag = "Wallet")]
#[get("/wallet/transactions?<range..>")]
pub(super) async fn list_transactions(
    state: &State<RocketState>,
    guard: access::CustomerGuard,
    range: Range,
) -> JsonResult<TransactionsResponse, RangeError> {
    let entries = listed(
        ledger::list_for_customer(guard.grant(), &state.db, range.query_range()?).await,
    )?;
    Ok(Json(TransactionsResponse {
        transactions: entries.iter().map(TransactionModel::from_entity).collect(),
    }))
}
