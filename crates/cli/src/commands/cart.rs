//! Cart commands.
//!
//! Every command loads the cart first so it works against the server's
//! current state, then prints the cart as the store sees it afterwards.
//!
//! # Usage
//!
//! ```bash
//! aurelia-cart show
//! aurelia-cart add 42 -q 2
//! aurelia-cart set 7 3 4 5
//! aurelia-cart remove 7
//! aurelia-cart clear
//! ```

use std::io::{self, Write};

use aurelia_core::{CartLineId, ProductId, Quantity};
use aurelia_storefront::{CartError, CartState};

use super::{CliError, Context};

/// Print the cart.
pub async fn show(ctx: &Context) -> Result<(), CliError> {
    load(ctx).await?;
    render(&ctx.store().state())
}

/// Look up a product and add it.
pub async fn add(ctx: &Context, product_id: ProductId, quantity: Quantity) -> Result<(), CliError> {
    load(ctx).await?;
    let token = ctx.token()?;

    let product = ctx.catalog().product(&token, product_id).await?;
    let result = ctx.store().add(&product, quantity).await;
    if !matches!(result, Err(CartError::StockExceeded { .. })) {
        ctx.catalog().invalidate(product_id).await;
    }
    result?;

    render(&ctx.store().state())
}

/// Feed each value to the line's quantity field, then wait for the commit.
///
/// Fails if the backend does not end up with the last valid value, after
/// printing the cart as it stands.
pub async fn set(ctx: &Context, line_id: CartLineId, values: &[String]) -> Result<(), CliError> {
    load(ctx).await?;
    let product_id = product_of(&ctx.store().state(), line_id)?;

    let mut last = None;
    for value in values {
        match ctx
            .store()
            .update_quantity(line_id, Some(value.as_str()))
            .await?
        {
            Some(quantity) => last = Some(quantity),
            None => tracing::warn!(%line_id, value = %value, "Ignored invalid quantity"),
        }
    }

    let confirmed = match last {
        Some(quantity) => ctx.store().confirm_quantity(line_id, quantity).await,
        None => {
            ctx.store().settle().await;
            Ok(())
        }
    };
    ctx.catalog().invalidate(product_id).await;

    render(&ctx.store().state())?;
    Ok(confirmed?)
}

/// Remove one line.
pub async fn remove(ctx: &Context, line_id: CartLineId) -> Result<(), CliError> {
    load(ctx).await?;
    let product_id = product_of(&ctx.store().state(), line_id)?;

    let result = ctx.store().remove(line_id).await;
    ctx.catalog().invalidate(product_id).await;
    result?;

    render(&ctx.store().state())
}

/// Remove everything.
pub async fn clear(ctx: &Context) -> Result<(), CliError> {
    load(ctx).await?;
    let products: Vec<ProductId> = ctx
        .store()
        .state()
        .lines()
        .iter()
        .map(|line| line.product_id)
        .collect();

    ctx.store().clear().await?;
    for product_id in products {
        ctx.catalog().invalidate(product_id).await;
    }

    render(&ctx.store().state())
}

// =============================================================================
// Helpers
// =============================================================================

/// Fetch the cart; a guest or rejected token is an error for the CLI.
async fn load(ctx: &Context) -> Result<(), CliError> {
    ctx.store().fetch().await?;
    if ctx.store().session().is_active() {
        Ok(())
    } else {
        Err(CliError::NotLoggedIn)
    }
}

fn product_of(state: &CartState, line_id: CartLineId) -> Result<ProductId, CliError> {
    state
        .snapshot()
        .and_then(|snapshot| snapshot.line(line_id))
        .map(|line| line.product_id)
        .ok_or(CliError::Cart(CartError::UnknownLine(line_id)))
}

fn render(state: &CartState) -> Result<(), CliError> {
    let mut out = io::stdout().lock();
    write_cart(&mut out, state)?;
    Ok(())
}

fn write_cart(out: &mut impl Write, state: &CartState) -> io::Result<()> {
    if state.lines().is_empty() {
        writeln!(out, "Your cart is empty")?;
        return Ok(());
    }

    for line in state.lines() {
        let quantity = state.displayed_quantity(line.id).unwrap_or(line.quantity);
        let subtotal = state
            .displayed_subtotal(line.id)
            .unwrap_or_else(|| line.subtotal());
        let marker = if state.proposed_quantity(line.id).is_some() {
            " (unconfirmed)"
        } else {
            ""
        };
        writeln!(
            out,
            "#{:<6} {:<32} {:>3} x {:>10} = {:>10}{marker}",
            line.id.to_string(),
            line.product_name,
            quantity.get(),
            line.unit_price().to_string(),
            subtotal.to_string(),
        )?;
        if line.exceeds_stock(quantity) {
            writeln!(out, "        only {} in stock", line.stock_quantity)?;
        }
    }

    writeln!(out, "Items: {}", state.item_count())?;
    writeln!(out, "Total: {}", state.displayed_total())?;
    Ok(())
}
