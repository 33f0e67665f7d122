//! Backend REST API access.
//!
//! # Architecture
//!
//! - The backend is source of truth - the client never computes prices or stock
//! - Every response is wrapped in an `{ success, data, message }` envelope
//! - Requests carry a bearer token from the session and an `X-Request-Id`
//!
//! The cart endpoints sit behind the [`CartApi`] trait so the cart store can be
//! driven by the HTTP client in production and by a recording fake in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use aurelia_storefront::api::{ApiClient, CartApi};
//!
//! let client = ApiClient::new(&config.api)?;
//! let cart = client.get_cart(&token).await?;
//! ```

mod client;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use aurelia_core::{CartLineId, CartSnapshot, Product, ProductId, Quantity};

use crate::session::SessionToken;

pub use client::ApiClient;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Token missing, expired, or rejected (HTTP 401).
    #[error("Unauthorized")]
    Unauthorized,

    /// Request rejected by the backend (4xx other than 401 and 429).
    #[error("Rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Message from the backend, or the status reason.
        message: String,
    },

    /// Backend failed (5xx).
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message from the backend, or the status reason.
        message: String,
    },

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// 2xx response whose envelope reported `success: false`.
    #[error("Request unsuccessful: {0}")]
    Unsuccessful(String),

    /// 2xx response with no `data` where data was required.
    #[error("Response has no data")]
    MissingData,
}

impl ApiError {
    /// Whether the error means the session token is no longer valid.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Whether the backend looked at the request and refused it.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Unsuccessful(_))
    }

    /// Message suitable for showing to a shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } | Self::Unsuccessful(message) => message.clone(),
            Self::Unauthorized => "Please sign in again".to_string(),
            Self::RateLimited(_) => "Too many requests, please try again shortly".to_string(),
            Self::Http(_) | Self::Server { .. } | Self::Parse(_) | Self::MissingData | Self::Url(_) => {
                "The store is temporarily unavailable".to_string()
            }
        }
    }
}

/// Response envelope used by every backend endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the backend handled the request.
    pub success: bool,
    /// Payload, when the endpoint returns one.
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    /// Human-readable message (usually present on failure).
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// A successful response carrying `data`.
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    /// A successful response without a payload.
    pub const fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            message: None,
        }
    }

    /// A failed response with a message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Unwrap the envelope, keeping an absent payload as `None`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unsuccessful` if `success` is false.
    pub fn into_data(self) -> Result<Option<T>, ApiError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ApiError::Unsuccessful(
                self.message
                    .unwrap_or_else(|| "request was not successful".to_string()),
            ))
        }
    }
}

/// Body of `POST /cart/items`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    /// Product to add.
    pub product_id: ProductId,
    /// Units to add.
    pub quantity: Quantity,
}

/// Cart endpoints of the backend.
///
/// Mutations return `Ok(Some(snapshot))` when the backend sent the full cart
/// back and `Ok(None)` when it only acknowledged the call.
pub trait CartApi: Send + Sync + 'static {
    /// `GET /cart`
    fn get_cart(
        &self,
        token: &SessionToken,
    ) -> impl Future<Output = Result<CartSnapshot, ApiError>> + Send;

    /// `POST /cart/items`
    fn add_item(
        &self,
        token: &SessionToken,
        request: AddItemRequest,
    ) -> impl Future<Output = Result<Option<CartSnapshot>, ApiError>> + Send;

    /// `PUT /cart/items/{id}?quantity=N`
    fn update_item(
        &self,
        token: &SessionToken,
        line_id: CartLineId,
        quantity: Quantity,
    ) -> impl Future<Output = Result<Option<CartSnapshot>, ApiError>> + Send;

    /// `DELETE /cart/items/{id}`
    fn remove_item(
        &self,
        token: &SessionToken,
        line_id: CartLineId,
    ) -> impl Future<Output = Result<Option<CartSnapshot>, ApiError>> + Send;

    /// `DELETE /cart`
    fn clear_cart(&self, token: &SessionToken) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// Catalog endpoints of the backend.
pub trait ProductApi: Send + Sync + 'static {
    /// `GET /products/{id}`
    fn get_product(
        &self,
        token: &SessionToken,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Product, ApiError>> + Send;
}
