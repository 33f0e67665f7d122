//! Catalog product as seen by the cart.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{CategoryId, ProductId};
use super::price::Price;

/// A catalog product.
///
/// Only the fields the storefront client reads are modeled; the backend may
/// send more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: Decimal,
    /// Units available at the time of the fetch.
    #[serde(default)]
    pub stock_quantity: u32,
    /// Primary image URL.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Category the product is listed under.
    #[serde(default)]
    pub category_id: Option<CategoryId>,
}

impl Product {
    /// Unit price in the default currency.
    #[must_use]
    pub fn unit_price(&self) -> Price {
        Price::from_amount(self.price)
    }

    /// Whether no units are available.
    #[must_use]
    pub const fn is_sold_out(&self) -> bool {
        self.stock_quantity == 0
    }
}
