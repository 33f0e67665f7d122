//! Observable cart state.
//!
//! [`CartState`] pairs the last server snapshot with the quantities the
//! shopper has typed but the server has not confirmed yet. Views render from
//! it; only the cart store writes it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use aurelia_core::{CartLine, CartLineId, CartSnapshot, Price, Quantity};

/// What views see of the cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    snapshot: Option<CartSnapshot>,
    proposed: BTreeMap<CartLineId, Quantity>,
    synced_at: Option<DateTime<Utc>>,
}

impl CartState {
    /// Last server snapshot; `None` for a guest or before the first fetch.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&CartSnapshot> {
        self.snapshot.as_ref()
    }

    /// Lines in server order (empty when no snapshot).
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.items.as_slice())
            .unwrap_or_default()
    }

    /// Sum of committed quantities across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.snapshot.as_ref().map_or(0, CartSnapshot::item_count)
    }

    /// Quantity typed for a line and not yet confirmed by the server.
    #[must_use]
    pub fn proposed_quantity(&self, line_id: CartLineId) -> Option<Quantity> {
        self.proposed.get(&line_id).copied()
    }

    /// Whether any line shows an unconfirmed quantity.
    #[must_use]
    pub fn has_unconfirmed_edits(&self) -> bool {
        !self.proposed.is_empty()
    }

    /// Quantity to display: the unconfirmed edit if any, else the committed one.
    #[must_use]
    pub fn displayed_quantity(&self, line_id: CartLineId) -> Option<Quantity> {
        self.proposed_quantity(line_id).or_else(|| {
            self.snapshot
                .as_ref()
                .and_then(|snapshot| snapshot.line(line_id))
                .map(|line| line.quantity)
        })
    }

    /// Displayed quantity times unit price.
    #[must_use]
    pub fn displayed_subtotal(&self, line_id: CartLineId) -> Option<Price> {
        let line = self.snapshot.as_ref()?.line(line_id)?;
        let quantity = self.proposed_quantity(line_id).unwrap_or(line.quantity);
        Some(line.subtotal_for(quantity))
    }

    /// Sum of displayed subtotals. May differ from the server total while
    /// edits are pending.
    #[must_use]
    pub fn displayed_total(&self) -> Price {
        let amount = self
            .lines()
            .iter()
            .filter_map(|line| self.displayed_subtotal(line.id))
            .map(|price| price.amount)
            .sum::<Decimal>();
        Price::from_amount(amount)
    }

    /// When the snapshot was last replaced.
    #[must_use]
    pub const fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    // =========================================================================
    // Mutators (cart store only)
    // =========================================================================

    /// Replace the snapshot wholesale. Proposals for lines that no longer
    /// exist are dropped.
    pub(crate) fn replace_snapshot(&mut self, snapshot: CartSnapshot) {
        self.proposed
            .retain(|line_id, _| snapshot.line(*line_id).is_some());
        self.snapshot = Some(snapshot);
        self.synced_at = Some(Utc::now());
    }

    /// Forget everything (guest, logout, or rejected credentials).
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn propose(&mut self, line_id: CartLineId, quantity: Quantity) {
        self.proposed.insert(line_id, quantity);
    }

    pub(crate) fn discard_proposal(&mut self, line_id: CartLineId) {
        self.proposed.remove(&line_id);
    }

    pub(crate) fn retain_proposals(&mut self, mut keep: impl FnMut(CartLineId) -> bool) {
        self.proposed.retain(|line_id, _| keep(*line_id));
    }
}
