//! HTTP client for the backend REST API.
//!
//! Uses `reqwest` with bearer authentication. Every request gets a fresh
//! `X-Request-Id` so client logs can be matched to backend logs.

use std::sync::Arc;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use aurelia_core::{CartLineId, CartSnapshot, Product, ProductId, Quantity};

use super::{AddItemRequest, ApiError, ApiResponse, CartApi, ProductApi};
use crate::config::ApiConfig;
use crate::session::SessionToken;

const REQUEST_ID_HEADER: &str = "X-Request-Id";
const USER_AGENT: &str = concat!("aurelia-storefront/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body kept in logs and messages.
const BODY_EXCERPT_CHARS: usize = 200;

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the backend REST API.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the underlying HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client: builder.build()?,
                base_url: config.base_url.clone(),
            }),
        })
    }

    /// Base URL every endpoint is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Resolve a relative endpoint path.
    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.inner.base_url.join(path)?)
    }

    /// Start an authenticated request.
    fn request(
        &self,
        method: Method,
        path: &str,
        token: &SessionToken,
    ) -> Result<(RequestBuilder, Uuid), ApiError> {
        let request_id = Uuid::new_v4();
        let builder = self
            .inner
            .client
            .request(method, self.endpoint(path)?)
            .bearer_auth(token.expose_secret())
            .header(REQUEST_ID_HEADER, request_id.to_string());
        Ok((builder, request_id))
    }

    /// Send a request and unwrap the response envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        request_id: Uuid,
    ) -> Result<Option<T>, ApiError> {
        let response = builder.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        if status == StatusCode::UNAUTHORIZED {
            debug!(%request_id, "Backend rejected session token");
            return Err(ApiError::Unauthorized);
        }

        // Get response body as text first for better error diagnostics
        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(status, &body);
            tracing::warn!(
                %request_id,
                status = %status,
                body = %excerpt(&body),
                "Backend returned non-success status"
            );
            return Err(if status.is_client_error() {
                ApiError::Rejected {
                    status: status.as_u16(),
                    message,
                }
            } else {
                ApiError::Server {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        if body.trim().is_empty() {
            return Ok(None);
        }

        let envelope: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                %request_id,
                error = %e,
                body = %excerpt(&body),
                "Failed to parse backend response"
            );
            ApiError::Parse(e)
        })?;

        envelope.into_data()
    }
}

// =============================================================================
// Catalog Methods
// =============================================================================

impl ProductApi for ApiClient {
    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn get_product(
        &self,
        token: &SessionToken,
        product_id: ProductId,
    ) -> Result<Product, ApiError> {
        let (builder, request_id) =
            self.request(Method::GET, &format!("products/{product_id}"), token)?;
        self.send::<Product>(builder, request_id)
            .await?
            .ok_or(ApiError::MissingData)
    }
}

// =============================================================================
// Cart Methods (never cached - mutable state)
// =============================================================================

impl CartApi for ApiClient {
    #[instrument(skip(self, token))]
    async fn get_cart(&self, token: &SessionToken) -> Result<CartSnapshot, ApiError> {
        let (builder, request_id) = self.request(Method::GET, "cart", token)?;
        self.send::<CartSnapshot>(builder, request_id)
            .await?
            .ok_or(ApiError::MissingData)
    }

    #[instrument(skip(self, token), fields(product_id = %request.product_id, quantity = %request.quantity))]
    async fn add_item(
        &self,
        token: &SessionToken,
        request: AddItemRequest,
    ) -> Result<Option<CartSnapshot>, ApiError> {
        let (builder, request_id) = self.request(Method::POST, "cart/items", token)?;
        self.send(builder.json(&request), request_id).await
    }

    #[instrument(skip(self, token), fields(line_id = %line_id, quantity = %quantity))]
    async fn update_item(
        &self,
        token: &SessionToken,
        line_id: CartLineId,
        quantity: Quantity,
    ) -> Result<Option<CartSnapshot>, ApiError> {
        let (builder, request_id) =
            self.request(Method::PUT, &format!("cart/items/{line_id}"), token)?;
        self.send(builder.query(&[("quantity", quantity.get())]), request_id)
            .await
    }

    #[instrument(skip(self, token), fields(line_id = %line_id))]
    async fn remove_item(
        &self,
        token: &SessionToken,
        line_id: CartLineId,
    ) -> Result<Option<CartSnapshot>, ApiError> {
        let (builder, request_id) =
            self.request(Method::DELETE, &format!("cart/items/{line_id}"), token)?;
        self.send(builder, request_id).await
    }

    #[instrument(skip(self, token))]
    async fn clear_cart(&self, token: &SessionToken) -> Result<(), ApiError> {
        let (builder, request_id) = self.request(Method::DELETE, "cart", token)?;
        self.send::<serde_json::Value>(builder, request_id).await?;
        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Pull a human-readable message out of an error body.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ApiResponse<serde_json::Value>>(body)
        .ok()
        .and_then(|envelope| envelope.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map_or_else(|| format!("HTTP {status}"), str::to_string)
        })
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}
