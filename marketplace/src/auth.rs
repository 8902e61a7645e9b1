//! Request identity extractors.
//!
//! Authentication itself happens upstream. The gateway forwards the verified
//! identity in headers, which these extractors turn into a [`Caller`]:
//!
//! - `x-user-id`: user UUID (required)
//! - `x-user-role`: `buyer` (default), `seller` or `admin`
//! - `x-store-id`: store UUID, required for sellers
//!
//! # Usage
//!
//! ```rust,ignore
//! async fn cancel(CallerIdentity(caller): CallerIdentity) -> Result<Json<..>, ApiError> {
//!     // caller.user_id is whatever the gateway vouched for
//! }
//! ```

use crate::error::ApiError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use surplus_core::types::{Caller, Role, StoreId, UserId};

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's role.
pub const ROLE_HEADER: &str = "x-user-role";
/// Header carrying a seller's store id.
pub const STORE_ID_HEADER: &str = "x-store-id";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|value| value.to_str().ok())
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct CallerIdentity(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id: UserId = header(parts, USER_ID_HEADER)
            .ok_or_else(|| ApiError::unauthorized("Missing x-user-id header"))?
            .parse()
            .map_err(|_| ApiError::unauthorized("Invalid x-user-id header"))?;

        let role = match header(parts, ROLE_HEADER).unwrap_or("buyer") {
            "buyer" => Role::Buyer,
            "admin" => Role::Admin,
            "seller" => {
                let store_id: StoreId = header(parts, STORE_ID_HEADER)
                    .ok_or_else(|| ApiError::unauthorized("Sellers must send x-store-id"))?
                    .parse()
                    .map_err(|_| ApiError::unauthorized("Invalid x-store-id header"))?;
                Role::Seller { store_id }
            }
            other => return Err(ApiError::unauthorized(format!("Unknown role '{other}'"))),
        };

        Ok(Self(Caller { user_id, role }))
    }
}

/// Bearer token extracted from `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = header(parts, "authorization")
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| {
                ApiError::unauthorized("Invalid authorization format. Expected 'Bearer <token>'")
            })?;

        if token.is_empty() {
            return Err(ApiError::unauthorized("Empty bearer token"));
        }

        Ok(Self(token.to_string()))
    }
}
