//! Request body extraction with typed errors.
//!
//! Axum's own `Json` extractor answers malformed bodies with a plain-text
//! rejection. [`JsonBody`] maps every rejection to an [`ApiError`] so clients always
//! get the `{code, message}` body, and [`UnitCount`] accepts any JSON number for a
//! quantity so negative or fractional counts surface as `INVALID_QUANTITY`.

use crate::error::ApiError;
use axum::{
    Json,
    async_trait,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use surplus_core::error::LedgerError;

/// JSON request body whose rejection is an [`ApiError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection.body_text(), "Request body rejected");
                Err(rejection.into())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let code = match &rejection {
            JsonRejection::JsonDataError(_) => "INVALID_BODY",
            JsonRejection::JsonSyntaxError(_) => "MALFORMED_JSON",
            JsonRejection::MissingJsonContentType(_) => "UNSUPPORTED_MEDIA_TYPE",
            _ => "BAD_REQUEST",
        };
        Self::new(rejection.status(), rejection.body_text(), code.to_string())
    }
}

/// A unit count as the client sent it.
///
/// Deserializes from any JSON number; [`UnitCount::get`] rejects what is not a
/// whole number in `u32` range. Zero passes through so the ledger reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct UnitCount(serde_json::Number);

impl UnitCount {
    /// The count as units.
    ///
    /// # Errors
    ///
    /// `INVALID_QUANTITY` for negative, fractional or oversized counts.
    pub fn get(&self) -> Result<u32, ApiError> {
        self.0
            .as_u64()
            .and_then(|units| u32::try_from(units).ok())
            .ok_or_else(|| {
                LedgerError::InvalidQuantity(format!(
                    "quantity must be a whole number of units (got {})",
                    self.0
                ))
                .into()
            })
    }
}

impl From<u32> for UnitCount {
    fn from(units: u32) -> Self {
        Self(units.into())
    }
}
