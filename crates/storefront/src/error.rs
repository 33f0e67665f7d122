//! Cart error handling with Sentry integration.
//!
//! Every cart operation returns `Result<T, CartError>`. Callers normally do not
//! need to inspect the error: the store has already turned it into a notice
//! and, where needed, resynchronized. [`CartError::kind`] maps an error onto the
//! four failure classes the store reacts to.

use thiserror::Error;

use aurelia_core::{CartLineId, ProductId, Quantity};

use crate::api::ApiError;
use crate::session::SessionError;

/// How the store reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No session token. Not an error: the cart renders empty.
    SessionAbsent,
    /// The backend rejected the token. Credentials are cleared silently.
    Unauthorized,
    /// The request was refused (stock, validation). Shown as a warning.
    Rejected,
    /// Network or server failure. Shown as an error; nothing is retried.
    Transient,
}

/// Errors returned by cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// No session token is stored.
    #[error("No active session")]
    NoSession,

    /// Adding would exceed the stock seen at the last fetch.
    #[error("Only {available} of product {product_id} available (requested {requested})")]
    StockExceeded {
        /// Product being added.
        product_id: ProductId,
        /// Units in the cart plus units being added.
        requested: u64,
        /// Stock at the last fetch.
        available: u32,
    },

    /// The line is not in the current snapshot.
    #[error("Cart line {0} not found")]
    UnknownLine(CartLineId),

    /// The backend did not end up with the quantity last entered for a line.
    #[error("Quantity {requested} for cart line {line_id} was not applied")]
    NotApplied {
        /// Line that was edited.
        line_id: CartLineId,
        /// Last quantity entered.
        requested: Quantity,
    },

    /// Backend call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Session storage failed.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl CartError {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::NoSession => FailureKind::SessionAbsent,
            Self::StockExceeded { .. } | Self::UnknownLine(_) | Self::NotApplied { .. } => {
                FailureKind::Rejected
            }
            Self::Api(err) => {
                if err.is_unauthorized() {
                    FailureKind::Unauthorized
                } else if err.is_rejection() {
                    FailureKind::Rejected
                } else {
                    FailureKind::Transient
                }
            }
            Self::Session(_) => FailureKind::Transient,
        }
    }

    /// Message suitable for showing to a shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(err) => err.user_message(),
            Self::Session(_) => "Your session could not be read".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

/// Report a transient failure to Sentry.
///
/// Rejections and auth failures are expected traffic and only logged.
pub fn capture_failure(err: &CartError) {
    if err.kind() == FailureKind::Transient {
        let event_id = sentry::capture_error(err);
        tracing::error!(
            error = %err,
            sentry_event_id = %event_id,
            "Cart request failed"
        );
    }
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart
/// actions leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Updated quantity", Some(&[("line_id", "7")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
