use super::{found, listed, parse_id, LookupError, Range, RangeError};
use crate::{
    access,
    error::{self, JsonResult},
    state::RocketState,
};
use app::money::{Amount, AmountError};
use app::topup;
use chrono::{DateTime, Utc};
use rocket::{get, post, serde::json::Json, State};
use rocket_okapi::openapi;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, JsonSchema)]
pub(super) struct TopUpRequest {
    /// Amount paid, as a decimal string with at most two fractional digits.
    amount: String,
    /// Reference to the uploaded proof of payment.
    proof: String,
    /// Bank transfer reference or any other note for the reviewer.
    reference: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TopUpStatus {
    /// Waiting for staff review.
    Pending,
    /// Approved; the wallet has been credited.
    Approved,
    /// Rejected; the wallet was not touched.
    Rejected,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct TopUpModel {
    /// Unique top-up identifier.
    id: Uuid,
    /// The customer who submitted the top-up.
    user_id: Uuid,
    amount: String,
    proof: String,
    reference: String,
    status: TopUpStatus,
    created_at: DateTime<Utc>,
    /// The staff member who reviewed the top-up.
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    /// Reviewer note. Rejections always carry one.
    admin_note: Option<String>,
}

impl TopUpModel {
    pub(super) fn from_entity(topup: &topup::TopUp) -> Self {
        let review = match &topup.status {
            topup::Status::Pending => None,
            topup::Status::Approved(review) | topup::Status::Rejected(review) => Some(review),
        };
        Self {
            id: topup.id.0,
            user_id: topup.user_id.0,
            amount: topup.amount.to_string(),
            proof: topup.proof.0.clone(),
            reference: topup.reference.clone(),
            status: match topup.status {
                topup::Status::Pending => TopUpStatus::Pending,
                topup::Status::Approved(_) => TopUpStatus::Approved,
                topup::Status::Rejected(_) => TopUpStatus::Rejected,
            },
            created_at: topup.created,
            reviewed_by: review.map(|review| review.reviewed_by.0),
            reviewed_at: review.map(|review| review.reviewed_at),
            admin_note: review.map(|review| review.note.clone()),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct TopUpResponse {
    topup: TopUpModel,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct TopUpsResponse {
    pub(super) topups: Vec<TopUpModel>,
}

/// Error during top-up submission.
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(super) enum Error {
    /// Unexpected error, please contact support.
    Unknown,
    /// The amount is not a number, not positive, or has more than two fractional digits.
    InvalidAmount,
    /// The amount is too large.
    AmountTooLarge,
    /// No proof of payment was given.
    MissingProof,
}

/// Submit a top-up for review. Your wallet is credited once staff approve it.
#[openapi(tag = "Top-ups")]
#[post("/wallet/topups", data = "<req>")]
pub(super) async fn post(
    state: &State<RocketState>,
    req: Json<TopUpRequest>,
    guard: access::CustomerGuard,
) -> JsonResult<TopUpResponse, Error> {
    let amount = Amount::parse_positive(&req.amount).map_err(amount_error)?;
    topup::submit(
        guard.grant(),
        &state.db,
        amount,
        topup::Proof(req.proof.clone()),
        req.reference.as_deref().unwrap_or_default(),
    )
    .await
    .map(|topup| {
        Json(TopUpResponse {
            topup: TopUpModel::from_entity(&topup),
        })
    })
    .map_err(|e| match e {
        topup::Error::InvalidAmount(e) => amount_error(e),
        topup::Error::MissingProof => {
            error::bad_request(Error::MissingProof, "proof of payment is missing".to_owned())
        }
        e @ (topup::Error::NotFound | topup::Error::BalanceLimitExceeded(_)) => {
            error::internal_server_error(Error::Unknown, e.to_string())
        }
        topup::Error::Storage(e) => error::storage_error(Error::Unknown, &e),
    })
}

fn amount_error(e: AmountError) -> error::JsonError<Error> {
    match e {
        AmountError::TooLarge => error::bad_request(Error::AmountTooLarge, e.to_string()),
        _ => error::bad_request(Error::InvalidAmount, e.to_string()),
    }
}

/// List your top-ups, newest first.
#[openapi(tag = "Top-ups")]
#[get("/wallet/topups?<range..>")]
pub(super) async fn list(
    state: &State<RocketState>,
    guard: access::CustomerGuard,
    range: Range,
) -> JsonResult<TopUpsResponse, RangeError> {
    let topups = listed(topup::list(guard.grant(), &state.db, range.query_range()?).await)?;
    Ok(Json(TopUpsResponse {
        topups: topups.iter().map(TopUpModel::from_entity).collect(),
    }))
}

/// Get top-up details.
#[openapi(tag = "Top-ups")]
#[get("/wallet/topups/<topup_id>")]
pub(super) async fn get(
    state: &State<RocketState>,
    guard: access::CustomerGuard,
    topup_id: String,
) -> JsonResult<TopUpResponse, LookupError> {
    let id = topup::Id(parse_id(&topup_id)?);
    let topup = found("top-up", topup::get(guard.grant(), &state.db, id).await)?;
    Ok(Json(TopUpResponse {
        topup: TopUpModel::from_entity(&topup),
    }))
}
