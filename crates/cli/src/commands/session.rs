//! Session commands.
//!
//! # Usage
//!
//! ```bash
//! aurelia-cart login --token <TOKEN>
//! aurelia-cart logout
//! ```
//!
//! The token is stored in `AURELIA_SESSION_FILE` (default
//! `.aurelia/session.json`).

use aurelia_storefront::SessionToken;

use super::{CliError, Context};

/// Store a token and load its cart.
pub async fn login(ctx: &Context, raw_token: &str) -> Result<(), CliError> {
    let token = SessionToken::new(raw_token).ok_or(CliError::EmptyToken)?;

    ctx.store().start_session(&token).await?;

    if ctx.store().session().is_active() {
        tracing::info!(
            items = ctx.store().item_count(),
            "Logged in"
        );
        Ok(())
    } else {
        // The backend answered 401 and the store already dropped the token.
        Err(CliError::NotLoggedIn)
    }
}

/// Forget the token and the local cart.
pub async fn logout(ctx: &Context) -> Result<(), CliError> {
    ctx.store().end_session().await?;
    ctx.catalog().invalidate_all().await;
    tracing::info!("Logged out");
    Ok(())
}
