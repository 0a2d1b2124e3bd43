use std::future::Future;

use app::{database::Database, user};
use okapi::openapi3::{Object, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket::{
    async_trait,
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};
use rocket_okapi::{
    gen::OpenApiGenerator,
    request::{OpenApiFromRequest, RequestHeaderInput},
};
use thiserror::Error;

use crate::state::RocketState;

/// A customer acting on their own wallet, top-ups and orders.
pub struct CustomerGuard(app::auth::CustomerGrant);

impl CustomerGuard {
    pub fn grant(&self) -> &app::auth::CustomerGrant {
        &self.0
    }
}

/// A staff member reviewing top-ups and settling orders.
pub struct StaffGuard(app::auth::StaffGrant);

impl StaffGuard {
    pub fn grant(&self) -> &app::auth::StaffGrant {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("access denied")]
    AccessDenied,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("could not check the token")]
    Storage,
}

const TOKEN_HEADER: &str = "X-Auth-Token";

#[async_trait]
impl<'r> FromRequest<'r> for CustomerGuard {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        guard_impl(req, app::auth::get_customer_grant, Self).await
    }
}

#[async_trait]
impl<'r> FromRequest<'r> for StaffGuard {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        guard_impl(req, app::auth::get_staff_grant, Self).await
    }
}

impl<'a> OpenApiFromRequest<'a> for CustomerGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(openapi_auth())
    }
}

impl<'a> OpenApiFromRequest<'a> for StaffGuard {
    fn from_request_input(
        _: &mut OpenApiGenerator,
        _: String,
        _: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(openapi_auth())
    }
}

async fn guard_impl<
    'a,
    'b,
    G: AnyGrant,
    F: Future<Output = Result<G, app::auth::Error>> + 'a,
    R,
>(
    req: &'a Request<'b>,
    get_grant: impl FnOnce(&'a Database, &'a str) -> F,
    create_guard: impl FnOnce(G) -> R,
) -> Outcome<R, Error> {
    let token = match req.headers().get_one(TOKEN_HEADER) {
        Some(token) => token,
        None => return Outcome::Error((Status::Forbidden, Error::AccessDenied)),
    };
    let state = match req.rocket().state::<RocketState>() {
        Some(state) => state,
        None => {
            log::error!("rocket state is not managed");
            return Outcome::Error((Status::InternalServerError, Error::Storage));
        }
    };
    match get_grant(&state.db, token).await {
        Ok(grant) => {
            if state.rate_limit.limit(grant.user_id()) {
                log::info!("rate limiting user {:?}", grant.user_id());
                Outcome::Error((Status::TooManyRequests, Error::RateLimited))
            } else {
                Outcome::Success(create_guard(grant))
            }
        }
        Err(app::auth::Error::AccessDenied(_)) => {
            Outcome::Error((Status::Forbidden, Error::AccessDenied))
        }
        Err(app::auth::Error::Storage(e)) => {
            log::error!("failed to look up token: {}", e);
            Outcome::Error((Status::InternalServerError, Error::Storage))
        }
    }
}

/// Helper trait implemented for all grant types.
trait AnyGrant {
    /// The user the request is rate limited as.
    fn user_id(&self) -> user::Id;
}

impl AnyGrant for app::auth::CustomerGrant {
    fn user_id(&self) -> user::Id {
        self.user_id
    }
}

impl AnyGrant for app::auth::StaffGrant {
    fn user_id(&self) -> user::Id {
        self.actor_id
    }
}

fn openapi_auth() -> RequestHeaderInput {
    let security_scheme = SecurityScheme {
        description: Some(format!(
            "Requires an API key to access: \"{}\".",
            TOKEN_HEADER
        )),
        data: SecuritySchemeData::ApiKey {
            name: TOKEN_HEADER.to_owned(),
            location: "header".to_owned(),
        },
        extensions: Object::default(),
    };
    let mut security_req = SecurityRequirement::new();
    security_req.insert(TOKEN_HEADER.to_owned(), Vec::new());
    RequestHeaderInput::Security(TOKEN_HEADER.to_owned(), security_scheme, security_req)
}
