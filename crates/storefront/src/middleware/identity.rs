//! Identity extractors.
//!
//! The identity collaborator: resolves whether the current caller is
//! anonymous or signed in. Session issuance happens in the external auth
//! service; here we only read the `CurrentCustomer` it stored, and for
//! anonymous callers pick up the cart cookie they carry.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tower_sessions::{Session, cookie::Cookie};

use crate::cart::CART_COOKIE_NAME;
use crate::error::AppError;
use crate::models::{CurrentCustomer, session_keys};

/// Who is making this request.
///
/// Resolved once at the top of each cart handler; the chosen variant picks
/// the cart backend for the whole request.
pub enum Identity {
    /// Signed-in buyer with a server-side cart.
    Customer(CurrentCustomer),
    /// Anonymous buyer; the cart, if any, rides in their cookie.
    Guest { cart_token: Option<String> },
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let customer = match parts.extensions.get::<Session>() {
            Some(session) => session
                .get::<CurrentCustomer>(session_keys::CURRENT_CUSTOMER)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        Ok(match customer {
            Some(customer) => Self::Customer(customer),
            None => Self::Guest {
                cart_token: cart_token_from_parts(parts),
            },
        })
    }
}

/// Extractor that requires a signed-in buyer.
///
/// Rejects with a 401 `unauthorized` JSON error otherwise. Used by the
/// checkout and merge handlers, which only operate on server-side carts.
pub struct RequireCustomer(pub CurrentCustomer);

impl<S> FromRequestParts<S> for RequireCustomer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AppError::Unauthorized)?;

        let customer: CurrentCustomer = session
            .get(session_keys::CURRENT_CUSTOMER)
            .await
            .ok()
            .flatten()
            .ok_or(AppError::Unauthorized)?;

        Ok(Self(customer))
    }
}

/// Extractor for the raw anonymous cart token, independent of identity.
///
/// The merge handler needs this alongside [`RequireCustomer`]: right after
/// login the session already names a customer while the cart cookie still
/// holds the anonymous lines.
pub struct GuestCartToken(pub Option<String>);

impl<S> FromRequestParts<S> for GuestCartToken
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(cart_token_from_parts(parts)))
    }
}

/// Pull the cart cookie's value out of the request headers.
fn cart_token_from_parts(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value.to_owned()))
        .filter_map(std::result::Result::ok)
        .find(|cookie| cookie.name() == CART_COOKIE_NAME)
        .map(|cookie| cookie.value().to_owned())
}
