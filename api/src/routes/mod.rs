//! Add top-level routes as submodules here.

use crate::{
    error::{self, JsonError},
    state::RocketState,
};
use app::QueryRange;
use rocket::{Build, FromForm, Rocket};
use rocket_okapi::{
    openapi_get_routes,
    swagger_ui::{make_swagger_ui, DefaultModelRendering, SwaggerUIConfig},
};
use schemars::JsonSchema;
use serde::Serialize;
use std::str::FromStr;
use uuid::Uuid;

mod control;
mod orders;
mod topups;
mod wallet;

const MIN_LIMIT: i64 = 1;
const MAX_LIMIT: i64 = 250;

#[derive(FromForm, JsonSchema)]
struct Range {
    limit: Option<String>,
    offset: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RangeError {
    /// Invalid limit.
    InvalidLimit,
    /// Invalid offset.
    InvalidOffset,
    /// Unexpected error, please contact support.
    Unknown,
}

/// Error when fetching a single record.
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupError {
    /// The identifier is not a valid UUID.
    InvalidId,
    /// No such record, or it belongs to someone else.
    NotFound,
    /// Unexpected error, please contact support.
    Unknown,
}

fn parse_id(id: &str) -> Result<Uuid, JsonError<LookupError>> {
    Uuid::from_str(id).map_err(|_| {
        error::bad_request(LookupError::InvalidId, format!("{:?} is not a valid id", id))
    })
}

fn found<T>(
    what: &str,
    result: Result<Option<T>, app::database::Error>,
) -> Result<T, JsonError<LookupError>> {
    match result {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(error::not_found(
            LookupError::NotFound,
            format!("{} not found", what),
        )),
        Err(e) => Err(error::storage_error(LookupError::Unknown, &e)),
    }
}

fn listed<T>(result: Result<Vec<T>, app::database::Error>) -> Result<Vec<T>, JsonError<RangeError>> {
    result.map_err(|e| error::storage_error(RangeError::Unknown, &e))
}

impl Range {
    fn query_range(self) -> Result<QueryRange, JsonError<RangeError>> {
        Ok(QueryRange {
            limit: Self::parse_limit(self.limit)?,
            offset: Self::parse_offset(self.offset)?,
        })
    }

    fn parse_limit(s: Option<String>) -> Result<i64, JsonError<RangeError>> {
        let limit: i64 = s.unwrap_or_else(|| "100".to_owned()).parse().map_err(|_| {
            error::bad_request(RangeError::InvalidLimit, "limit is not a number".to_owned())
        })?;
        if limit < MIN_LIMIT {
            Err(error::bad_request(
                RangeError::InvalidLimit,
                format!("limit must be at least {}", MIN_LIMIT),
            ))
        } else if limit > MAX_LIMIT {
            Err(error::bad_request(
                RangeError::InvalidLimit,
                format!("limit can be at most {}", MAX_LIMIT),
            ))
        } else {
            Ok(limit)
        }
    }

    fn parse_offset(s: Option<String>) -> Result<i64, JsonError<RangeError>> {
        let offset = s.unwrap_or_else(|| "0".to_owned()).parse().map_err(|_| {
            error::bad_request(
                RangeError::InvalidOffset,
                "offset is not a number".to_owned(),
            )
        })?;
        if offset < 0 {
            Err(error::bad_request(
                RangeError::InvalidOffset,
                "offset must be positive".to_owned(),
            ))
        } else {
            Ok(offset)
        }
    }
}

const VERSION: &str = "/v0";

pub fn register(rocket: Rocket<Build>, state: RocketState) -> Rocket<Build> {
    let rocket = rocket.manage(state);
    let rocket = rocket.mount(
        VERSION,
        openapi_get_routes![
            wallet::get,
            wallet::list_transactions,
            topups::post,
            topups::list,
            topups::get,
            orders::list,
            orders::get,
            control::list_topups,
            control::review_topup,
            control::review_topups,
            control::mark_order_paid,
            control::unmark_order_paid,
            control::list_transactions,
            control::adjust_wallet,
        ],
    );
    mount_swagger(rocket)
}

pub fn mount_swagger(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount(
        format!("{}/swagger", VERSION),
        make_swagger_ui(&SwaggerUIConfig {
            url: "../openapi.json".to_owned(),
            default_model_rendering: DefaultModelRendering::Model,
            show_extensions: true,
            ..Default::default()
        }),
    )
}
