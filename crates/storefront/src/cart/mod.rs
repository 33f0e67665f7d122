//! Cart synchronization.
//!
//! [`CartStore`] owns the client copy of the cart and is the only thing that
//! writes it. Views read a [`CartState`] through [`CartStore::subscribe`].
//!
//! # Consistency
//!
//! - Every successful mutation replaces the snapshot with the one the backend
//!   returned. If a mutation response carries no snapshot, the store fetches
//!   the cart instead of guessing.
//! - Quantity edits show up immediately as unconfirmed quantities and are
//!   committed once the shopper stops typing for the debounce window.
//! - When a quantity update or a removal fails, the store resynchronizes from
//!   the backend and the unconfirmed value is dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! let store = CartStore::new(api, session, Notifier::default(), config.cart);
//! store.fetch().await?;
//!
//! // Shopper clicks the spinner three times; one PUT is sent.
//! store.update_quantity(line_id, Some("3")).await?;
//! store.update_quantity(line_id, Some("4")).await?;
//! store.update_quantity(line_id, Some("5")).await?;
//! store.settle().await;
//! ```

mod debounce;
mod state;

#[cfg(test)]
mod tests;

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

use aurelia_core::{CartLineId, CartSnapshot, Product, Quantity};

use crate::api::{AddItemRequest, CartApi};
use crate::config::CartConfig;
use crate::error::{CartError, FailureKind, Result, add_breadcrumb, capture_failure};
use crate::notify::Notifier;
use crate::session::{Session, SessionToken};

use debounce::PendingEdits;
pub use state::CartState;

// =============================================================================
// CartStore
// =============================================================================

/// The cart synchronization unit.
///
/// Cheaply cloneable; clones share the same state. Dropping the last clone
/// cancels every scheduled quantity commit.
pub struct CartStore<A: CartApi> {
    inner: Arc<CartStoreInner<A>>,
}

impl<A: CartApi> Clone for CartStore<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CartStoreInner<A> {
    api: A,
    session: Session,
    notifier: Notifier,
    state: watch::Sender<CartState>,
    edits: Mutex<PendingEdits>,
    debounce: Duration,
}

impl<A: CartApi> CartStore<A> {
    /// Create a store with an empty, unfetched cart.
    #[must_use]
    pub fn new(api: A, session: Session, notifier: Notifier, config: CartConfig) -> Self {
        let (state, _) = watch::channel(CartState::default());

        Self {
            inner: Arc::new(CartStoreInner {
                api,
                session,
                notifier,
                state,
                edits: Mutex::new(PendingEdits::default()),
                debounce: config.debounce,
            }),
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CartState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.inner.state.subscribe()
    }

    /// Sum of committed quantities, derived from the current snapshot.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.inner.state.borrow().item_count()
    }

    /// Notifier the store reports to.
    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    /// Session the store reads credentials from.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Number of quantity commits still waiting for their window to elapse.
    pub async fn pending_commits(&self) -> usize {
        self.inner.edits.lock().await.len()
    }

    /// Wait until no line shows an unconfirmed quantity.
    pub async fn settle(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| !state.has_unconfirmed_edits()).await;
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Store a new session token and load its cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be stored or the fetch fails.
    pub async fn start_session(&self, token: &SessionToken) -> Result<()> {
        self.inner.session.begin(token)?;
        self.fetch().await
    }

    /// Log out: cancel scheduled commits, forget the token and the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored token cannot be removed. Local state is
    /// discarded regardless.
    pub async fn end_session(&self) -> Result<()> {
        self.discard_local().await;
        self.inner.session.end()?;
        info!("Cart session ended");
        Ok(())
    }

    /// Cancel scheduled commits and drop unconfirmed quantities (the owning
    /// view is going away). The snapshot is kept.
    pub async fn teardown(&self) {
        let mut edits = self.inner.edits.lock().await;
        edits.cancel_all();
        self.inner
            .state
            .send_modify(|state| state.retain_proposals(|_| false));
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Load the cart from the backend.
    ///
    /// Without a session token this clears local state and makes no call. A
    /// 401 clears local state and credentials and is not reported as an error.
    ///
    /// # Errors
    ///
    /// Returns an error for any other failure; the previous state is kept.
    #[instrument(skip(self))]
    pub async fn fetch(&self) -> Result<()> {
        let Some(token) = self.inner.session.token()? else {
            debug!("No session token, cart unavailable");
            self.discard_local().await;
            return Ok(());
        };

        match self.inner.api.get_cart(&token).await {
            Ok(snapshot) => {
                self.apply_snapshot(snapshot, None).await;
                Ok(())
            }
            Err(err) => {
                let err = CartError::from(err);
                if err.kind() == FailureKind::Unauthorized {
                    self.handle_unauthorized().await;
                    return Ok(());
                }
                warn!(error = %err, "Failed to fetch cart");
                capture_failure(&err);
                Err(err)
            }
        }
    }

    /// Reload from the backend, dropping unconfirmed quantities for every line
    /// without a scheduled or in-flight commit.
    ///
    /// # Errors
    ///
    /// Same as [`CartStore::fetch`].
    #[instrument(skip(self))]
    pub async fn resync(&self) -> Result<()> {
        debug!("Resynchronizing cart");
        let result = self.fetch().await;

        // Not before the fetch: settle() must not resolve mid-resync.
        let edits = self.inner.edits.lock().await;
        self.inner
            .state
            .send_modify(|state| state.retain_proposals(|line_id| edits.is_busy(line_id)));
        result
    }

    /// Add `quantity` units of `product`.
    ///
    /// Refused without a network call if the cart already holds enough units
    /// that the addition would exceed the product's stock.
    ///
    /// # Errors
    ///
    /// Returns `CartError::StockExceeded` for the precondition, `NoSession`
    /// for guests, or the backend failure. State is kept on failure.
    #[instrument(skip(self, product), fields(product_id = %product.id, quantity = %quantity))]
    pub async fn add(&self, product: &Product, quantity: Quantity) -> Result<()> {
        let Some(token) = self.inner.session.token()? else {
            self.inner
                .notifier
                .info("Sign in to add items to your cart");
            return Err(CartError::NoSession);
        };

        let in_cart = self
            .inner
            .state
            .borrow()
            .snapshot()
            .map_or(0, |snapshot| snapshot.quantity_of_product(product.id));
        let requested = in_cart + u64::from(quantity.get());

        if requested > u64::from(product.stock_quantity) {
            self.inner.notifier.warn(format!(
                "Only {} {} available and you already have {} in your cart",
                product.stock_quantity, product.name, in_cart
            ));
            return Err(CartError::StockExceeded {
                product_id: product.id,
                requested,
                available: product.stock_quantity,
            });
        }

        let product_id = product.id.to_string();
        add_breadcrumb("cart", "Add item", Some(&[("product_id", product_id.as_str())]));

        let request = AddItemRequest {
            product_id: product.id,
            quantity,
        };
        match self.inner.api.add_item(&token, request).await {
            Ok(snapshot) => {
                self.inner
                    .notifier
                    .info(format!("Added {} to your cart", product.name));
                self.apply_or_resync(snapshot, None).await
            }
            Err(err) => {
                Err(self
                    .report(err.into(), &format!("Could not add {} to your cart", product.name))
                    .await)
            }
        }
    }

    /// Handle raw quantity input for a line (text field or spinner).
    ///
    /// Empty, non-numeric, zero and negative input is ignored and returns
    /// `Ok(None)`. Accepted input is shown immediately and committed after the
    /// debounce window; see [`CartStore::set_quantity`].
    ///
    /// # Errors
    ///
    /// Returns `CartError::UnknownLine` if the line is not in the cart.
    pub async fn update_quantity(
        &self,
        line_id: CartLineId,
        input: Option<&str>,
    ) -> Result<Option<Quantity>> {
        let Some(raw) = input else {
            return Ok(None);
        };

        match Quantity::parse(raw) {
            Ok(quantity) => {
                self.set_quantity(line_id, quantity).await?;
                Ok(Some(quantity))
            }
            Err(e) => {
                debug!(%line_id, input = %raw, error = %e, "Ignoring quantity input");
                Ok(None)
            }
        }
    }

    /// Show `quantity` for a line now and schedule its commit.
    ///
    /// Any earlier scheduled commit for the line is cancelled. A value equal to
    /// the last one sent (the in-flight commit, else the snapshot) schedules
    /// nothing. Quantities above the line's last known stock produce a warning
    /// but are still sent; the backend decides.
    ///
    /// # Errors
    ///
    /// Returns `CartError::UnknownLine` if the line is not in the cart.
    #[instrument(skip(self), fields(line_id = %line_id, quantity = %quantity))]
    pub async fn set_quantity(&self, line_id: CartLineId, quantity: Quantity) -> Result<()> {
        let line = self
            .inner
            .state
            .borrow()
            .snapshot()
            .and_then(|snapshot| snapshot.line(line_id))
            .cloned();
        let Some(line) = line else {
            debug!("Quantity edit for a line not in the cart");
            return Err(CartError::UnknownLine(line_id));
        };

        let mut edits = self.inner.edits.lock().await;

        let in_flight = edits.in_flight(line_id);
        if quantity == in_flight.unwrap_or(line.quantity) {
            let superseded = edits.cancel(line_id);
            self.inner.state.send_modify(|state| {
                if in_flight.is_some() {
                    state.propose(line_id, quantity);
                } else {
                    state.discard_proposal(line_id);
                }
            });
            debug!(superseded, "Quantity matches the last value sent");
            return Ok(());
        }

        if line.exceeds_stock(quantity) {
            self.inner.notifier.warn(format!(
                "Only {} {} in stock; we'll check availability with the store",
                line.stock_quantity, line.product_name
            ));
        }

        self.inner
            .state
            .send_modify(|state| state.propose(line_id, quantity));

        let generation = edits.next_generation();
        let store = Arc::downgrade(&self.inner);
        let window = self.inner.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            fire_pending(store, line_id, generation).await;
        });
        edits.schedule(line_id, quantity, generation, task.abort_handle());

        Ok(())
    }

    /// Write a line quantity to the backend now, bypassing the debounce.
    ///
    /// On failure the store resynchronizes, so the line shows the last
    /// server-confirmed quantity again. Nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns the backend failure, or `NoSession` for guests.
    #[instrument(skip(self), fields(line_id = %line_id, quantity = %quantity))]
    pub async fn commit_quantity(&self, line_id: CartLineId, quantity: Quantity) -> Result<()> {
        self.commit(line_id, quantity, None).await
    }

    /// Wait for every edit to settle, then check the backend holds `quantity`
    /// for the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotApplied` when the line ended up with another
    /// quantity (the commit failed or was superseded) or is gone.
    pub async fn confirm_quantity(&self, line_id: CartLineId, quantity: Quantity) -> Result<()> {
        self.settle().await;

        let committed = self
            .inner
            .state
            .borrow()
            .snapshot()
            .and_then(|snapshot| snapshot.line(line_id))
            .map(|line| line.quantity);
        if committed == Some(quantity) {
            return Ok(());
        }

        warn!(%line_id, requested = %quantity, ?committed, "Quantity edit was not applied");
        Err(CartError::NotApplied {
            line_id,
            requested: quantity,
        })
    }

    /// Remove a line.
    ///
    /// A scheduled commit for the line is cancelled first. When the backend
    /// only acknowledges the delete, the cart is fetched again.
    ///
    /// # Errors
    ///
    /// Returns the backend failure (after resynchronizing), or `NoSession`.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove(&self, line_id: CartLineId) -> Result<()> {
        let Some(token) = self.inner.session.token()? else {
            return Err(CartError::NoSession);
        };

        {
            let mut edits = self.inner.edits.lock().await;
            edits.cancel(line_id);
            self.inner
                .state
                .send_modify(|state| state.discard_proposal(line_id));
        }

        let line = line_id.to_string();
        add_breadcrumb("cart", "Remove item", Some(&[("line_id", line.as_str())]));

        match self.inner.api.remove_item(&token, line_id).await {
            Ok(snapshot) => self.apply_or_resync(snapshot, None).await,
            Err(err) => {
                let err = self.report(err.into(), "Could not remove the item").await;
                self.recover(&err).await;
                Err(err)
            }
        }
    }

    /// Empty the cart.
    ///
    /// On success local state becomes an explicit empty snapshot without
    /// another round trip.
    ///
    /// # Errors
    ///
    /// Returns the backend failure, or `NoSession`. The snapshot is kept on
    /// failure.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        let Some(token) = self.inner.session.token()? else {
            return Err(CartError::NoSession);
        };

        {
            let mut edits = self.inner.edits.lock().await;
            edits.cancel_all();
            self.inner
                .state
                .send_modify(|state| state.retain_proposals(|_| false));
        }

        add_breadcrumb("cart", "Clear cart", None);

        match self.inner.api.clear_cart(&token).await {
            Ok(()) => {
                self.apply_snapshot(CartSnapshot::empty(), None).await;
                Ok(())
            }
            Err(err) => Err(self.report(err.into(), "Could not clear your cart").await),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Send a quantity update. `generation` identifies a scheduled commit
    /// whose in-flight entry is released once the request finishes.
    async fn commit(
        &self,
        line_id: CartLineId,
        quantity: Quantity,
        generation: Option<u64>,
    ) -> Result<()> {
        let result = match self.inner.session.token() {
            Ok(Some(token)) => {
                let line = line_id.to_string();
                let value = quantity.to_string();
                add_breadcrumb(
                    "cart",
                    "Update quantity",
                    Some(&[("line_id", line.as_str()), ("quantity", value.as_str())]),
                );
                self.inner
                    .api
                    .update_item(&token, line_id, quantity)
                    .await
                    .map_err(CartError::from)
            }
            Ok(None) => Err(CartError::NoSession),
            Err(e) => Err(e.into()),
        };

        if let Some(generation) = generation {
            self.inner.edits.lock().await.finish(line_id, generation);
        }

        match result {
            Ok(snapshot) => self.apply_or_resync(snapshot, Some(line_id)).await,
            Err(CartError::NoSession) => {
                self.discard_local().await;
                Err(CartError::NoSession)
            }
            Err(err) => {
                let err = self.report(err, "Could not update the quantity").await;
                self.recover(&err).await;
                Err(err)
            }
        }
    }

    /// Replace the snapshot. When `settled` names a line, its unconfirmed
    /// quantity is dropped unless a newer commit is scheduled or in flight.
    async fn apply_snapshot(&self, snapshot: CartSnapshot, settled: Option<CartLineId>) {
        let edits = self.inner.edits.lock().await;
        let keep_proposal = settled.is_some_and(|line_id| edits.is_busy(line_id));

        self.inner.state.send_modify(|state| {
            state.replace_snapshot(snapshot);
            if let Some(line_id) = settled
                && !keep_proposal
            {
                state.discard_proposal(line_id);
            }
        });
        debug!(items = self.inner.state.borrow().item_count(), "Cart snapshot replaced");
    }

    /// Trust the mutation response if it carries the cart, otherwise fetch.
    async fn apply_or_resync(
        &self,
        snapshot: Option<CartSnapshot>,
        settled: Option<CartLineId>,
    ) -> Result<()> {
        if let Some(snapshot) = snapshot {
            self.apply_snapshot(snapshot, settled).await;
            return Ok(());
        }

        let result = self.fetch().await;
        if let Some(line_id) = settled {
            let edits = self.inner.edits.lock().await;
            if !edits.is_busy(line_id) {
                self.inner
                    .state
                    .send_modify(|state| state.discard_proposal(line_id));
            }
        }
        result
    }

    /// Turn a failure into a notice (or a silent logout for 401).
    async fn report(&self, err: CartError, context: &str) -> CartError {
        match err.kind() {
            FailureKind::SessionAbsent => {}
            FailureKind::Unauthorized => self.handle_unauthorized().await,
            FailureKind::Rejected => {
                self.inner
                    .notifier
                    .warn(format!("{context}: {}", err.user_message()));
            }
            FailureKind::Transient => {
                self.inner
                    .notifier
                    .error(format!("{context}: {}", err.user_message()));
                capture_failure(&err);
            }
        }
        err
    }

    /// Resynchronize after a failed update or removal.
    async fn recover(&self, err: &CartError) {
        if matches!(
            err.kind(),
            FailureKind::Unauthorized | FailureKind::SessionAbsent
        ) {
            return;
        }
        if let Err(resync_err) = self.resync().await {
            warn!(error = %resync_err, "Resynchronization after failure also failed");
        }
    }

    /// The backend rejected the token: forget it and the cart.
    async fn handle_unauthorized(&self) {
        info!("Session rejected by backend, clearing credentials");
        if let Err(e) = self.inner.session.end() {
            warn!(error = %e, "Failed to clear rejected session token");
        }
        self.discard_local().await;
    }

    /// Cancel scheduled commits and reset state to "no cart".
    async fn discard_local(&self) {
        let mut edits = self.inner.edits.lock().await;
        edits.cancel_all();
        self.inner.state.send_modify(CartState::reset);
    }
}

/// Body of a scheduled commit, run once the debounce window has elapsed.
async fn fire_pending<A: CartApi>(
    store: Weak<CartStoreInner<A>>,
    line_id: CartLineId,
    generation: u64,
) {
    let Some(inner) = store.upgrade() else {
        return;
    };
    let store = CartStore { inner };

    let Some(quantity) = store
        .inner
        .edits
        .lock()
        .await
        .take_if_current(line_id, generation)
    else {
        return;
    };

    debug!(%line_id, %quantity, "Debounce window elapsed, committing quantity");
    if let Err(e) = store.commit(line_id, quantity, Some(generation)).await {
        warn!(%line_id, %quantity, error = %e, "Scheduled quantity commit failed");
    }
}
