use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::broadcast;

use aurelia_core::{CartLine, CartLineId, CartSnapshot, Product, ProductId, Quantity};

use super::CartStore;
use crate::api::{AddItemRequest, ApiError, CartApi};
use crate::config::CartConfig;
use crate::error::{CartError, FailureKind};
use crate::notify::{Notice, NoticeLevel, Notifier};
use crate::session::{Session, SessionToken};

// =============================================================================
// Fake backend
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Get,
    Add(ProductId, u32),
    Update(CartLineId, u32),
    Remove(CartLineId),
    Clear,
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Unauthorized,
    Rejected,
    Server,
}

impl Failure {
    fn into_error(self) -> ApiError {
        match self {
            Self::Unauthorized => ApiError::Unauthorized,
            Self::Rejected => ApiError::Rejected {
                status: 409,
                message: "Not enough stock".to_string(),
            },
            Self::Server => ApiError::Server {
                status: 500,
                message: "Internal Server Error".to_string(),
            },
        }
    }
}

#[derive(Default)]
struct FakeState {
    cart: Vec<CartLine>,
    calls: Vec<Call>,
    fail_next: VecDeque<Failure>,
    next_line_id: i64,
    update_latency: Option<Duration>,
}

impl FakeState {
    fn snapshot(&self) -> CartSnapshot {
        let total_amount = self
            .cart
            .iter()
            .map(|line| line.price * Decimal::from(line.quantity.get()))
            .sum();
        CartSnapshot {
            items: self.cart.clone(),
            total_amount,
        }
    }

    fn record(&mut self, call: Call) -> Result<(), ApiError> {
        self.calls.push(call);
        self.fail_next
            .pop_front()
            .map_or(Ok(()), |failure| Err(failure.into_error()))
    }
}

/// In-memory cart backend. Update and add return the cart; remove only
/// acknowledges.
#[derive(Clone, Default)]
struct FakeCartApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCartApi {
    fn with_lines(lines: Vec<CartLine>) -> Self {
        let next_line_id = lines.iter().map(|l| l.id.as_i64()).max().unwrap_or(0) + 1;
        Self {
            state: Arc::new(Mutex::new(FakeState {
                cart: lines,
                next_line_id,
                ..FakeState::default()
            })),
        }
    }

    fn fail_next(&self, failure: Failure) {
        self.state.lock().unwrap().fail_next.push_back(failure);
    }

    /// Hold every quantity update for `latency` before it reaches the cart.
    fn slow_updates(&self, latency: Duration) {
        self.state.lock().unwrap().update_latency = Some(latency);
    }

    fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    fn server_quantity(&self, line_id: CartLineId) -> Option<u32> {
        self.state
            .lock()
            .unwrap()
            .cart
            .iter()
            .find(|line| line.id == line_id)
            .map(|line| line.quantity.get())
    }
}

impl CartApi for FakeCartApi {
    async fn get_cart(&self, _token: &SessionToken) -> Result<CartSnapshot, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::Get)?;
        Ok(state.snapshot())
    }

    async fn add_item(
        &self,
        _token: &SessionToken,
        request: AddItemRequest,
    ) -> Result<Option<CartSnapshot>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::Add(request.product_id, request.quantity.get()))?;

        if let Some(line) = state
            .cart
            .iter_mut()
            .find(|line| line.product_id == request.product_id)
        {
            line.quantity = qty(line.quantity.get() + request.quantity.get());
        } else {
            let id = CartLineId::new(state.next_line_id);
            state.next_line_id += 1;
            state.cart.push(CartLine {
                id,
                product_id: request.product_id,
                product_name: "Added Product".to_string(),
                price: Decimal::new(5000, 2),
                quantity: request.quantity,
                stock_quantity: 10,
                product_image: None,
            });
        }
        Ok(Some(state.snapshot()))
    }

    async fn update_item(
        &self,
        _token: &SessionToken,
        line_id: CartLineId,
        quantity: Quantity,
    ) -> Result<Option<CartSnapshot>, ApiError> {
        let latency = self.state.lock().unwrap().update_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().unwrap();
        state.record(Call::Update(line_id, quantity.get()))?;
        if let Some(line) = state.cart.iter_mut().find(|line| line.id == line_id) {
            line.quantity = quantity;
        }
        Ok(Some(state.snapshot()))
    }

    async fn remove_item(
        &self,
        _token: &SessionToken,
        line_id: CartLineId,
    ) -> Result<Option<CartSnapshot>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::Remove(line_id))?;
        state.cart.retain(|line| line.id != line_id);
        Ok(None)
    }

    async fn clear_cart(&self, _token: &SessionToken) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::Clear)?;
        state.cart.clear();
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

const WINDOW: Duration = Duration::from_millis(500);

fn qty(n: u32) -> Quantity {
    Quantity::new(n).expect("non-zero")
}

fn line(id: i64, product_id: i64, quantity: u32, stock: u32) -> CartLine {
    CartLine {
        id: CartLineId::new(id),
        product_id: ProductId::new(product_id),
        product_name: format!("Product {product_id}"),
        price: Decimal::new(2500, 2),
        quantity: qty(quantity),
        stock_quantity: stock,
        product_image: None,
    }
}

fn product(id: i64, stock: u32) -> Product {
    Product {
        id: ProductId::new(id),
        name: "Silver Ring".to_string(),
        price: Decimal::new(2500, 2),
        stock_quantity: stock,
        image_url: None,
        category_id: None,
    }
}

fn token() -> SessionToken {
    SessionToken::new("test-session-token").expect("token")
}

fn store_with(api: &FakeCartApi, logged_in: bool) -> CartStore<FakeCartApi> {
    let session = Session::in_memory(logged_in.then(token));
    CartStore::new(
        api.clone(),
        session,
        Notifier::default(),
        CartConfig { debounce: WINDOW },
    )
}

async fn loaded_store(lines: Vec<CartLine>) -> (FakeCartApi, CartStore<FakeCartApi>) {
    let api = FakeCartApi::with_lines(lines);
    let store = store_with(&api, true);
    store.fetch().await.expect("initial fetch");
    (api, store)
}

fn drain(rx: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut notices = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        notices.push(notice);
    }
    notices
}

async fn elapse(duration: Duration) {
    tokio::time::sleep(duration).await;
    tokio::task::yield_now().await;
}

// =============================================================================
// Fetch
// =============================================================================

#[tokio::test]
async fn test_fetch_without_session_makes_no_call() {
    let api = FakeCartApi::with_lines(vec![line(1, 9, 2, 5)]);
    let store = store_with(&api, false);

    store.fetch().await.unwrap();

    assert!(api.calls().is_empty());
    assert!(store.state().snapshot().is_none());
    assert_eq!(store.item_count(), 0);
}

#[tokio::test]
async fn test_fetch_replaces_snapshot() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5), line(2, 4, 1, 3)]).await;

    assert_eq!(api.calls(), vec![Call::Get]);
    let state = store.state();
    assert_eq!(state.lines().len(), 2);
    assert_eq!(state.item_count(), 3);
    assert!(state.synced_at().is_some());
}

#[tokio::test]
async fn test_fetch_unauthorized_clears_session_silently() {
    let api = FakeCartApi::with_lines(vec![line(1, 9, 2, 5)]);
    let store = store_with(&api, true);
    let mut notices = store.notifier().subscribe();
    api.fail_next(Failure::Unauthorized);

    store.fetch().await.unwrap();

    assert!(store.state().snapshot().is_none());
    assert!(!store.session().is_active());
    assert!(drain(&mut notices).is_empty());
}

#[tokio::test]
async fn test_fetch_server_error_keeps_previous_state() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;
    let before = store.state();
    api.fail_next(Failure::Server);

    let err = store.fetch().await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Transient);
    assert_eq!(store.state(), before);
    assert!(store.session().is_active());
}

// =============================================================================
// Add
// =============================================================================

#[tokio::test]
async fn test_add_refused_when_cart_already_holds_stock() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 3)]).await;
    let mut notices = store.notifier().subscribe();

    let err = store.add(&product(9, 3), qty(2)).await.unwrap_err();

    assert!(matches!(
        err,
        CartError::StockExceeded {
            requested: 4,
            available: 3,
            ..
        }
    ));
    assert_eq!(api.calls(), vec![Call::Get]);
    let notices = drain(&mut notices);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Warning);
}

#[tokio::test]
async fn test_add_replaces_snapshot_from_response() {
    let (api, store) = loaded_store(vec![line(1, 9, 1, 3)]).await;

    store.add(&product(9, 3), qty(2)).await.unwrap();

    assert_eq!(api.calls(), vec![Call::Get, Call::Add(ProductId::new(9), 2)]);
    assert_eq!(store.item_count(), 3);
}

#[tokio::test]
async fn test_add_without_session_is_refused() {
    let api = FakeCartApi::default();
    let store = store_with(&api, false);

    let err = store.add(&product(9, 3), qty(1)).await.unwrap_err();

    assert!(matches!(err, CartError::NoSession));
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_add_rejection_keeps_state_and_warns() {
    let (api, store) = loaded_store(vec![line(1, 9, 1, 3)]).await;
    let before = store.state();
    let mut notices = store.notifier().subscribe();
    api.fail_next(Failure::Rejected);

    let err = store.add(&product(4, 10), qty(1)).await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Rejected);
    assert_eq!(store.state(), before);
    let notices = drain(&mut notices);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Warning);
    assert!(notices[0].message.contains("Not enough stock"));
}

// =============================================================================
// Debounced quantity edits
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_rapid_edits_send_one_update() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 10)]).await;
    let id = CartLineId::new(1);

    store.update_quantity(id, Some("3")).await.unwrap();
    elapse(Duration::from_millis(100)).await;
    store.update_quantity(id, Some("4")).await.unwrap();
    elapse(Duration::from_millis(100)).await;
    store.update_quantity(id, Some("5")).await.unwrap();

    // Shown immediately, not yet committed.
    let state = store.state();
    assert_eq!(state.displayed_quantity(id), Some(qty(5)));
    assert_eq!(state.item_count(), 2);
    assert_eq!(api.calls(), vec![Call::Get]);

    elapse(WINDOW + Duration::from_millis(50)).await;

    assert_eq!(api.calls(), vec![Call::Get, Call::Update(id, 5)]);
    let state = store.state();
    assert!(!state.has_unconfirmed_edits());
    assert_eq!(state.item_count(), 5);
    assert_eq!(store.pending_commits().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_edit_not_sent_before_window_elapses() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 10)]).await;
    let id = CartLineId::new(1);

    store.update_quantity(id, Some("3")).await.unwrap();
    elapse(Duration::from_millis(499)).await;
    assert_eq!(api.calls(), vec![Call::Get]);

    elapse(Duration::from_millis(10)).await;
    assert_eq!(api.calls(), vec![Call::Get, Call::Update(id, 3)]);
    assert_eq!(api.server_quantity(id), Some(3));
    assert_eq!(store.item_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_over_stock_edit_warns_but_still_sends() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;
    let id = CartLineId::new(1);
    let mut notices = store.notifier().subscribe();

    store.update_quantity(id, Some("10")).await.unwrap();

    let warnings = drain(&mut notices);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].level, NoticeLevel::Warning);

    elapse(WINDOW + Duration::from_millis(50)).await;
    assert_eq!(api.calls(), vec![Call::Get, Call::Update(id, 10)]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_update_reverts_to_server_quantity() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;
    let id = CartLineId::new(1);
    let mut notices = store.notifier().subscribe();
    api.fail_next(Failure::Rejected);

    store.update_quantity(id, Some("4")).await.unwrap();
    assert_eq!(store.state().displayed_quantity(id), Some(qty(4)));

    elapse(WINDOW + Duration::from_millis(50)).await;

    assert_eq!(
        api.calls(),
        vec![Call::Get, Call::Update(id, 4), Call::Get]
    );
    let state = store.state();
    assert_eq!(state.displayed_quantity(id), Some(qty(2)));
    assert!(!state.has_unconfirmed_edits());
    let notices = drain(&mut notices);
    assert!(notices.iter().any(|n| n.level == NoticeLevel::Warning));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_input_is_ignored() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;
    let id = CartLineId::new(1);

    for input in [None, Some(""), Some("abc"), Some("0"), Some("-3")] {
        assert_eq!(store.update_quantity(id, input).await.unwrap(), None);
    }

    assert!(!store.state().has_unconfirmed_edits());
    elapse(WINDOW * 2).await;
    assert_eq!(api.calls(), vec![Call::Get]);
}

#[tokio::test(start_paused = true)]
async fn test_edit_back_to_committed_quantity_is_a_no_op() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;
    let id = CartLineId::new(1);

    store.update_quantity(id, Some("2")).await.unwrap();

    assert_eq!(store.pending_commits().await, 0);
    elapse(WINDOW * 2).await;
    assert_eq!(api.calls(), vec![Call::Get]);
}

#[tokio::test(start_paused = true)]
async fn test_edit_back_while_commit_in_flight_is_sent() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 10)]).await;
    let id = CartLineId::new(1);
    api.slow_updates(Duration::from_millis(300));

    store.update_quantity(id, Some("3")).await.unwrap();
    elapse(WINDOW + Duration::from_millis(10)).await;

    // The update to 3 is on the wire; the shopper goes back to 2.
    store.update_quantity(id, Some("2")).await.unwrap();
    assert_eq!(store.state().displayed_quantity(id), Some(qty(2)));
    assert_eq!(store.pending_commits().await, 1);

    elapse(Duration::from_secs(5)).await;
    store.settle().await;

    assert_eq!(
        api.calls(),
        vec![Call::Get, Call::Update(id, 3), Call::Update(id, 2)]
    );
    assert_eq!(api.server_quantity(id), Some(2));
    assert_eq!(store.state().displayed_quantity(id), Some(qty(2)));
    assert_eq!(store.item_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_edit_matching_in_flight_value_sends_nothing_more() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 10)]).await;
    let id = CartLineId::new(1);
    api.slow_updates(Duration::from_millis(300));

    store.update_quantity(id, Some("3")).await.unwrap();
    elapse(WINDOW + Duration::from_millis(10)).await;
    store.update_quantity(id, Some("5")).await.unwrap();
    store.update_quantity(id, Some("3")).await.unwrap();

    assert_eq!(store.pending_commits().await, 0);
    assert_eq!(store.state().displayed_quantity(id), Some(qty(3)));

    elapse(Duration::from_secs(5)).await;
    store.settle().await;

    assert_eq!(api.calls(), vec![Call::Get, Call::Update(id, 3)]);
    assert_eq!(store.item_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_confirm_quantity_reports_applied_edit() {
    let (_api, store) = loaded_store(vec![line(1, 9, 2, 10)]).await;
    let id = CartLineId::new(1);

    store.update_quantity(id, Some("4")).await.unwrap();

    store.confirm_quantity(id, qty(4)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_confirm_quantity_fails_after_rejected_commit() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 10)]).await;
    let id = CartLineId::new(1);
    api.fail_next(Failure::Rejected);

    store.update_quantity(id, Some("4")).await.unwrap();
    let err = store.confirm_quantity(id, qty(4)).await.unwrap_err();

    assert!(matches!(
        err,
        CartError::NotApplied { line_id, requested } if line_id == id && requested == qty(4)
    ));
    assert_eq!(err.kind(), FailureKind::Rejected);
    assert_eq!(store.state().displayed_quantity(id), Some(qty(2)));
}

#[tokio::test]
async fn test_edit_for_unknown_line_is_refused() {
    let (_api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;

    let err = store
        .update_quantity(CartLineId::new(99), Some("3"))
        .await
        .unwrap_err();

    assert!(matches!(err, CartError::UnknownLine(_)));
}

#[tokio::test(start_paused = true)]
async fn test_lines_debounce_independently() {
    let (api, store) = loaded_store(vec![line(1, 9, 1, 5), line(2, 4, 1, 5)]).await;
    let a = CartLineId::new(1);
    let b = CartLineId::new(2);

    store.update_quantity(a, Some("2")).await.unwrap();
    elapse(Duration::from_millis(300)).await;
    store.update_quantity(b, Some("3")).await.unwrap();

    elapse(Duration::from_millis(250)).await;
    assert_eq!(api.calls(), vec![Call::Get, Call::Update(a, 2)]);
    // Line b is still unconfirmed.
    assert_eq!(store.state().proposed_quantity(b), Some(qty(3)));

    elapse(Duration::from_millis(300)).await;
    assert_eq!(
        api.calls(),
        vec![Call::Get, Call::Update(a, 2), Call::Update(b, 3)]
    );
    assert_eq!(store.item_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_settle_waits_for_commit() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;
    let id = CartLineId::new(1);

    store.update_quantity(id, Some("3")).await.unwrap();
    store.settle().await;

    assert_eq!(api.calls(), vec![Call::Get, Call::Update(id, 3)]);
    assert_eq!(store.item_count(), 3);
}

#[tokio::test]
async fn test_commit_quantity_is_immediate() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;
    let id = CartLineId::new(1);

    store.commit_quantity(id, qty(4)).await.unwrap();

    assert_eq!(api.calls(), vec![Call::Get, Call::Update(id, 4)]);
    assert_eq!(store.item_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_commit_unauthorized_ends_session() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;
    let id = CartLineId::new(1);
    api.fail_next(Failure::Unauthorized);

    store.update_quantity(id, Some("3")).await.unwrap();
    elapse(WINDOW + Duration::from_millis(50)).await;

    // No resync after a 401.
    assert_eq!(api.calls(), vec![Call::Get, Call::Update(id, 3)]);
    assert!(!store.session().is_active());
    assert!(store.state().snapshot().is_none());
}

// =============================================================================
// Remove and clear
// =============================================================================

#[tokio::test]
async fn test_remove_refetches_when_response_has_no_cart() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5), line(2, 4, 1, 5)]).await;

    store.remove(CartLineId::new(1)).await.unwrap();

    assert_eq!(
        api.calls(),
        vec![Call::Get, Call::Remove(CartLineId::new(1)), Call::Get]
    );
    let state = store.state();
    assert_eq!(state.lines().len(), 1);
    assert_eq!(state.item_count(), 1);
}

#[tokio::test]
async fn test_remove_failure_resyncs() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;
    let mut notices = store.notifier().subscribe();
    api.fail_next(Failure::Server);

    let err = store.remove(CartLineId::new(1)).await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Transient);
    assert_eq!(
        api.calls(),
        vec![Call::Get, Call::Remove(CartLineId::new(1)), Call::Get]
    );
    assert_eq!(store.state().lines().len(), 1);
    let notices = drain(&mut notices);
    assert!(notices.iter().any(|n| n.level == NoticeLevel::Error));
}

#[tokio::test(start_paused = true)]
async fn test_remove_cancels_pending_edit() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;
    let id = CartLineId::new(1);

    store.update_quantity(id, Some("4")).await.unwrap();
    store.remove(id).await.unwrap();
    elapse(WINDOW * 2).await;

    assert_eq!(api.calls(), vec![Call::Get, Call::Remove(id), Call::Get]);
    assert!(store.state().lines().is_empty());
}

#[tokio::test]
async fn test_clear_sets_empty_cart_without_refetch() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5), line(2, 4, 1, 5)]).await;

    store.clear().await.unwrap();

    assert_eq!(api.calls(), vec![Call::Get, Call::Clear]);
    let state = store.state();
    assert!(state.snapshot().is_some_and(CartSnapshot::is_empty));
    assert_eq!(state.item_count(), 0);
}

#[tokio::test]
async fn test_clear_failure_keeps_snapshot() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;
    api.fail_next(Failure::Server);

    store.clear().await.unwrap_err();

    assert_eq!(api.calls(), vec![Call::Get, Call::Clear]);
    assert_eq!(store.item_count(), 2);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_teardown_cancels_pending_edits() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;
    let id = CartLineId::new(1);

    store.update_quantity(id, Some("3")).await.unwrap();
    store.teardown().await;
    elapse(WINDOW * 2).await;

    assert_eq!(api.calls(), vec![Call::Get]);
    assert!(!store.state().has_unconfirmed_edits());
    assert_eq!(store.item_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_store_cancels_pending_edits() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;

    store
        .update_quantity(CartLineId::new(1), Some("3"))
        .await
        .unwrap();
    drop(store);
    elapse(WINDOW * 2).await;

    assert_eq!(api.calls(), vec![Call::Get]);
}

#[tokio::test(start_paused = true)]
async fn test_end_session_discards_cart_and_edits() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;

    store
        .update_quantity(CartLineId::new(1), Some("3"))
        .await
        .unwrap();
    store.end_session().await.unwrap();
    elapse(WINDOW * 2).await;

    assert_eq!(api.calls(), vec![Call::Get]);
    assert!(!store.session().is_active());
    assert_eq!(store.state(), super::CartState::default());
}

#[tokio::test]
async fn test_start_session_loads_cart() {
    let api = FakeCartApi::with_lines(vec![line(1, 9, 2, 5)]);
    let store = store_with(&api, false);

    store.start_session(&token()).await.unwrap();

    assert!(store.session().is_active());
    assert_eq!(store.item_count(), 2);
    assert_eq!(api.calls(), vec![Call::Get]);
}

#[tokio::test(start_paused = true)]
async fn test_resync_keeps_scheduled_edits() {
    let (api, store) = loaded_store(vec![line(1, 9, 2, 5)]).await;
    let id = CartLineId::new(1);

    store.update_quantity(id, Some("3")).await.unwrap();
    store.resync().await.unwrap();

    assert_eq!(store.state().proposed_quantity(id), Some(qty(3)));
    elapse(WINDOW + Duration::from_millis(50)).await;
    assert_eq!(
        api.calls(),
        vec![Call::Get, Call::Get, Call::Update(id, 3)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_item_count_always_matches_snapshot() {
    let (_api, store) = loaded_store(vec![line(1, 9, 2, 5), line(2, 4, 1, 5)]).await;
    let mut rx = store.subscribe();

    let watcher = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            let summed: u64 = state
                .lines()
                .iter()
                .map(|line| u64::from(line.quantity.get()))
                .sum();
            assert_eq!(state.item_count(), summed);
        }
    });

    store
        .update_quantity(CartLineId::new(1), Some("4"))
        .await
        .unwrap();
    store.add(&product(7, 5), qty(1)).await.unwrap();
    elapse(WINDOW * 2).await;
    store.remove(CartLineId::new(2)).await.unwrap();
    store.clear().await.unwrap();

    assert_eq!(store.item_count(), 0);
    drop(store);
    watcher.await.unwrap();
}
