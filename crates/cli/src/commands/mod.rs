//! CLI command implementations.

pub mod cart;
pub mod session;

use std::io::{self, Write};

use thiserror::Error;
use tokio::sync::broadcast::{self, error::TryRecvError};

use aurelia_storefront::{
    ApiClient, ApiError, CartError, CartStore, Catalog, FileTokenStore, Notice,
    Notifier, Session, SessionToken, StorefrontConfig,
};
use aurelia_storefront::session::SessionError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// The HTTP client could not be built or a lookup failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A cart operation failed.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Session storage failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The token given to `login` is blank.
    #[error("Token must not be empty")]
    EmptyToken,

    /// The command needs a session.
    #[error("Not logged in; run `aurelia-cart login --token <TOKEN>` first")]
    NotLoggedIn,

    /// Writing output failed.
    #[error("Output error: {0}")]
    Output(#[from] io::Error),
}

/// Everything a command needs, built once per invocation.
pub struct Context {
    store: CartStore<ApiClient>,
    catalog: Catalog<ApiClient>,
}

impl Context {
    /// Build the client, session and cart store from configuration.
    ///
    /// A token from `AURELIA_API_TOKEN` seeds the session if none is stored.
    pub fn new(config: &StorefrontConfig) -> Result<Self, CliError> {
        let api = ApiClient::new(&config.api)?;
        let session = Session::new(FileTokenStore::new(&config.session_file));

        if !session.is_active()
            && let Some(token) = config.seed_token.clone().map(SessionToken::from)
        {
            tracing::debug!("Seeding session from AURELIA_API_TOKEN");
            session.begin(&token)?;
        }

        Ok(Self {
            store: CartStore::new(api.clone(), session, Notifier::default(), config.cart),
            catalog: Catalog::new(api, config.product_cache_ttl),
        })
    }

    pub const fn store(&self) -> &CartStore<ApiClient> {
        &self.store
    }

    pub const fn catalog(&self) -> &Catalog<ApiClient> {
        &self.catalog
    }

    pub fn notifier(&self) -> &Notifier {
        self.store.notifier()
    }

    /// The stored token, or `NotLoggedIn`.
    pub fn token(&self) -> Result<SessionToken, CliError> {
        self.store.session().token()?.ok_or(CliError::NotLoggedIn)
    }

    /// Cancel anything still scheduled before the process exits.
    pub async fn shutdown(&self) {
        self.store.teardown().await;
    }
}

/// Print every notice raised so far to stderr.
pub fn print_notices(mut notices: broadcast::Receiver<Notice>) {
    let mut err = io::stderr().lock();
    loop {
        match notices.try_recv() {
            Ok(notice) => {
                let _ = writeln!(err, "{notice}");
            }
            Err(TryRecvError::Lagged(skipped)) => {
                let _ = writeln!(err, "[warning] {skipped} notices were dropped");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}
