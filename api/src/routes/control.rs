//! Staff routes: the top-up review queue, order settlement and wallet corrections.

use super::{
    listed, parse_id, topups::TopUpModel, topups::TopUpsResponse, wallet::TransactionModel,
    wallet::TransactionResponse, wallet::TransactionsResponse, Range, RangeError,
};
use crate::{
    access,
    error::{self, JsonError, JsonResult},
    state::RocketState,
};
use app::money::Amount;
use app::{ledger, order, topup, user, wallet};
use rocket::{get, post, serde::json::Json, State};
use rocket_okapi::openapi;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(super) enum Decision {
    /// Credit the customer's wallet with the top-up amount.
    Approve,
    /// Leave the wallet untouched.
    Reject,
}

impl Decision {
    fn into_app(self) -> topup::Decision {
        match self {
            Decision::Approve => topup::Decision::Approve,
            Decision::Reject => topup::Decision::Reject,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(super) struct ReviewRequest {
    decision: Decision,
    /// Note for the customer. Rejections without a note get a default one.
    note: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(super) struct BatchReviewRequest {
    /// Top-ups to review. Unknown and already reviewed ones are skipped.
    ids: Vec<Uuid>,
    decision: Decision,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ReviewOutcome {
    Approved,
    Rejected,
    /// The top-up had already been reviewed; nothing changed.
    AlreadyReviewed,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct ReviewResponse {
    outcome: ReviewOutcome,
    /// True if this request credited the wallet.
    credited: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct BatchReviewResponse {
    reviewed: usize,
    credited: usize,
    skipped: usize,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum SettlementOutcome {
    /// The order is now marked as paid.
    Paid,
    /// The order was already paid; nothing changed.
    AlreadyPaid,
    /// The order is no longer marked as paid.
    Unmarked,
    /// The order was not marked as paid; nothing changed.
    NotPaid,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct SettlementResponse {
    outcome: SettlementOutcome,
    /// True if this request debited the customer's wallet.
    debited: bool,
    /// True if the customer's wallet was debited for this order and the debit was kept even
    /// though the order is no longer marked as paid.
    wallet_debit_kept: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(super) struct AdjustmentRequest {
    /// Signed amount: positive to credit the wallet, negative to debit it.
    amount: String,
    /// Reason for the correction.
    note: Option<String>,
}

/// Error during a staff action.
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(super) enum Error {
    /// Unexpected error, please contact support.
    Unknown,
    /// The identifier is not a valid UUID.
    InvalidId,
    /// The top-up, order or user does not exist.
    NotFound,
    /// The status filter is not one of PENDING, APPROVED or REJECTED.
    InvalidStatus,
    /// Invalid limit or offset.
    InvalidRange,
    /// The amount is not a number, is zero, or has more than two fractional digits.
    InvalidAmount,
    /// The customer's balance does not cover the debit.
    InsufficientBalance,
    /// The credit would take the customer's balance past the largest balance a wallet can hold.
    BalanceLimitExceeded,
}

fn id(raw: &str) -> Result<Uuid, JsonError<Error>> {
    parse_id(raw).map_err(|(_, e)| error::bad_request(Error::InvalidId, e.0.error.description))
}

fn storage(e: &app::database::Error) -> JsonError<Error> {
    error::storage_error(Error::Unknown, e)
}

fn topup_error(e: topup::Error) -> JsonError<Error> {
    match e {
        topup::Error::NotFound => error::not_found(Error::NotFound, "top-up not found".to_owned()),
        topup::Error::BalanceLimitExceeded(e) => {
            error::bad_request(Error::BalanceLimitExceeded, e.to_string())
        }
        topup::Error::Storage(e) => storage(&e),
        e => error::internal_server_error(Error::Unknown, e.to_string()),
    }
}

fn order_error(e: order::Error) -> JsonError<Error> {
    match e {
        order::Error::NotFound => error::not_found(Error::NotFound, "order not found".to_owned()),
        order::Error::InsufficientFunds(e) => {
            error::bad_request(Error::InsufficientBalance, e.to_string())
        }
        order::Error::Storage(e) => storage(&e),
        e => error::internal_server_error(Error::Unknown, e.to_string()),
    }
}

/// The top-up review queue, newest first. Filter by status with `PENDING`, `APPROVED` or
/// `REJECTED`.
#[openapi(tag = "Control")]
#[get("/control/topups?<status>&<range..>")]
pub(super) async fn list_topups(
    state: &State<RocketState>,
    guard: access::StaffGuard,
    status: Option<String>,
    range: Range,
) -> JsonResult<TopUpsResponse, Error> {
    let status = match status.as_deref().map(str::to_ascii_uppercase).as_deref() {
        None => None,
        Some("PENDING") => Some(topup::StatusFilter::Pending),
        Some("APPROVED") => Some(topup::StatusFilter::Approved),
        Some("REJECTED") => Some(topup::StatusFilter::Rejected),
        Some(other) => {
            return Err(error::bad_request(
                Error::InvalidStatus,
                format!("unknown top-up status {:?}", other),
            ))
        }
    };
    let range = range
        .query_range()
        .map_err(|(_, e)| error::bad_request(Error::InvalidRange, e.0.error.description))?;
    let topups = topup::list_all(guard.grant(), &state.db, status, range)
        .await
        .map_err(|e| storage(&e))?;
    Ok(Json(TopUpsResponse {
        topups: topups.iter().map(TopUpModel::from_entity).collect(),
    }))
}

/// Approve or reject a pending top-up. Approving credits the customer's wallet exactly once,
/// however many times it is requested.
#[openapi(tag = "Control")]
#[post("/control/topups/<topup_id>/review", data = "<req>")]
pub(super) async fn review_topup(
    state: &State<RocketState>,
    guard: access::StaffGuard,
    topup_id: String,
    req: Json<ReviewRequest>,
) -> JsonResult<ReviewResponse, Error> {
    let outcome = topup::review(
        guard.grant(),
        &state.db,
        topup::Id(id(&topup_id)?),
        req.decision.into_app(),
        req.note.as_deref(),
    )
    .await
    .map_err(topup_error)?;
    Ok(Json(match outcome {
        topup::Outcome::Approved { credited } => ReviewResponse {
            outcome: ReviewOutcome::Approved,
            credited,
        },
        topup::Outcome::Rejected => ReviewResponse {
            outcome: ReviewOutcome::Rejected,
            credited: false,
        },
        topup::Outcome::AlreadyReviewed => ReviewResponse {
            outcome: ReviewOutcome::AlreadyReviewed,
            credited: false,
        },
    }))
}

/// Approve or reject several top-ups at once.
#[openapi(tag = "Control")]
#[post("/control/topups/review", data = "<req>")]
pub(super) async fn review_topups(
    state: &State<RocketState>,
    guard: access::StaffGuard,
    req: Json<BatchReviewRequest>,
) -> JsonResult<BatchReviewResponse, Error> {
    let ids: Vec<topup::Id> = req.ids.iter().copied().map(topup::Id).collect();
    let batch = topup::review_many(guard.grant(), &state.db, &ids, req.decision.into_app())
        .await
        .map_err(topup_error)?;
    Ok(Json(BatchReviewResponse {
        reviewed: batch.reviewed,
        credited: batch.credited,
        skipped: batch.skipped,
    }))
}

/// Mark an order as paid. Wallet orders are debited unless the debit already happened at
/// checkout.
#[openapi(tag = "Control")]
#[post("/control/orders/<order_id>/mark-paid")]
pub(super) async fn mark_order_paid(
    state: &State<RocketState>,
    guard: access::StaffGuard,
    order_id: String,
) -> JsonResult<SettlementResponse, Error> {
    let outcome = order::mark_paid(guard.grant(), &state.db, order::Id(id(&order_id)?))
        .await
        .map_err(order_error)?;
    Ok(Json(match outcome {
        order::MarkPaidOutcome::Paid { debited } => SettlementResponse {
            outcome: SettlementOutcome::Paid,
            debited,
            wallet_debit_kept: false,
        },
        order::MarkPaidOutcome::AlreadyPaid => SettlementResponse {
            outcome: SettlementOutcome::AlreadyPaid,
            debited: false,
            wallet_debit_kept: false,
        },
    }))
}

/// Clear the paid flag of an order. A wallet debit is not refunded.
#[openapi(tag = "Control")]
#[post("/control/orders/<order_id>/unmark-paid")]
pub(super) async fn unmark_order_paid(
    state: &State<RocketState>,
    guard: access::StaffGuard,
    order_id: String,
) -> JsonResult<SettlementResponse, Error> {
    let outcome = order::unmark_paid(guard.grant(), &state.db, order::Id(id(&order_id)?))
        .await
        .map_err(order_error)?;
    Ok(Json(match outcome {
        order::UnmarkPaidOutcome::Unmarked { wallet_debit_kept } => SettlementResponse {
            outcome: SettlementOutcome::Unmarked,
            debited: false,
            wallet_debit_kept,
        },
        order::UnmarkPaidOutcome::NotPaid => SettlementResponse {
            outcome: SettlementOutcome::NotPaid,
            debited: false,
            wallet_debit_kept: false,
        },
    }))
}

/// The ledger across all wallets, newest first.
#[openapi(tag = "Control")]
#[get("/control/transactions?<range..>")]
pub(super) async fn list_transactions(
    state: &State<RocketState>,
    guard: access::StaffGuard,
    range: Range,
) -> JsonResult<TransactionsResponse, RangeError> {
    let entries = listed(ledger::list(guard.grant(), &state.db, range.query_range()?).await)?;
    Ok(Json(TransactionsResponse {
        transactions: entries.iter().map(TransactionModel::from_entity).collect(),
    }))
}

/// Correct a customer's balance. The correction is recorded on the ledger like any other
/// balance change.
#[openapi(tag = "Control")]
#[post("/control/wallets/<user_id>/adjustments", data = "<req>")]
pub(super) async fn adjust_wallet(
    state: &State<RocketState>,
    guard: access::StaffGuard,
    user_id: String,
    req: Json<AdjustmentRequest>,
) -> JsonResult<TransactionResponse, Error> {
    let user_id = user::Id(id(&user_id)?);
    let delta = Amount::parse(&req.amount)
        .map_err(|e| error::bad_request(Error::InvalidAmount, e.to_string()))?;
    let entry = wallet::adjust(
        guard.grant(),
        &state.db,
        user_id,
        delta,
        req.note.as_deref().unwrap_or_default(),
    )
    .await
    .map_err(|e| match e {
        wallet::Error::NotFound => error::not_found(Error::NotFound, "user not found".to_owned()),
        wallet::Error::ZeroAdjustment => {
            error::bad_request(Error::InvalidAmount, "adjustment must not be zero".to_owned())
        }
        wallet::Error::InsufficientFunds(e) => {
            error::bad_request(Error::InsufficientBalance, e.to_string())
        }
        wallet::Error::BalanceLimitExceeded(e) => {
            error::bad_request(Error::BalanceLimitExceeded, e.to_string())
        }
        wallet::Error::Storage(e) => storage(&e),
    })?;
    Ok(Json(TransactionResponse {
        transaction: TransactionModel::from_entity(&entry),
    }))
}

