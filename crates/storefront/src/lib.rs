//! Aurelia Storefront cart client.
//!
//! Keeps a local copy of the shopper's cart in step with the backend: loads
//! it, applies additions, quantity edits and removals, debounces rapid quantity
//! changes, and resynchronizes from the server when something goes wrong.
//!
//! # Example
//!
//! ```rust,ignore
//! use aurelia_storefront::{ApiClient, CartStore, Notifier, Session, StorefrontConfig};
//!
//! let config = StorefrontConfig::from_env()?;
//! let api = ApiClient::new(&config.api)?;
//! let session = Session::new(FileTokenStore::new(&config.session_file));
//! let store = CartStore::new(api, session, Notifier::default(), config.cart);
//! store.fetch().await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod notify;
pub mod session;

pub use api::{ApiClient, ApiError, CartApi, ProductApi};
pub use cart::{CartState, CartStore};
pub use catalog::Catalog;
pub use config::{CartConfig, ConfigError, StorefrontConfig};
pub use error::{CartError, FailureKind};
pub use notify::{Notice, NoticeLevel, Notifier};
pub use session::{FileTokenStore, MemoryTokenStore, Session, SessionToken, TokenStore};
