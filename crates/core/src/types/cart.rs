//! Cart snapshot types.
//!
//! A [`CartSnapshot`] is a complete, point-in-time copy of the cart as the
//! backend returned it. Clients never patch a snapshot line by line; they
//! replace the whole value after each successful call.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{CartLineId, ProductId};
use super::price::Price;
use super::quantity::Quantity;

/// One product entry within a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Line identity, stable across quantity edits.
    pub id: CartLineId,
    /// Catalog product this line refers to.
    pub product_id: ProductId,
    /// Product name at the time of the fetch.
    pub product_name: String,
    /// Unit price.
    pub price: Decimal,
    /// Committed quantity.
    pub quantity: Quantity,
    /// Available stock at the time of the fetch. A hint, not a cap.
    #[serde(default)]
    pub stock_quantity: u32,
    /// Product image URL.
    #[serde(default)]
    pub product_image: Option<String>,
}

impl CartLine {
    /// Unit price in the default currency.
    #[must_use]
    pub fn unit_price(&self) -> Price {
        Price::from_amount(self.price)
    }

    /// Line subtotal for an arbitrary quantity (used for unconfirmed edits).
    #[must_use]
    pub fn subtotal_for(&self, quantity: Quantity) -> Price {
        self.unit_price().times(quantity.get())
    }

    /// Line subtotal at the committed quantity.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.subtotal_for(self.quantity)
    }

    /// Whether `quantity` is more than the stock seen at the last fetch.
    #[must_use]
    pub const fn exceeds_stock(&self, quantity: Quantity) -> bool {
        quantity.get() > self.stock_quantity
    }
}

/// A complete cart as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    /// Lines in server order.
    #[serde(default)]
    pub items: Vec<CartLine>,
    /// Server-computed total.
    #[serde(default)]
    pub total_amount: Decimal,
}

impl CartSnapshot {
    /// An empty cart.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items
            .iter()
            .map(|line| u64::from(line.quantity.get()))
            .sum()
    }

    /// Look up a line by id.
    #[must_use]
    pub fn line(&self, id: CartLineId) -> Option<&CartLine> {
        self.items.iter().find(|line| line.id == id)
    }

    /// Total units of `product_id` across all lines.
    #[must_use]
    pub fn quantity_of_product(&self, product_id: ProductId) -> u64 {
        self.items
            .iter()
            .filter(|line| line.product_id == product_id)
            .map(|line| u64::from(line.quantity.get()))
            .sum()
    }

    /// Server total in the default currency.
    #[must_use]
    pub fn total(&self) -> Price {
        Price::from_amount(self.total_amount)
    }
}
