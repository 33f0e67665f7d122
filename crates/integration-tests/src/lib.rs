//! Integration tests for the Aurelia cart client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p aurelia-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `api_client` - HTTP client against the fake backend (status mapping, envelopes)
//! - `cart_sync` - Cart store end to end (debounce, resync, session handling)
//!
//! [`FakeBackend`] is an in-process `axum` server on `127.0.0.1:0` that keeps
//! one cart in memory, records every request and can be told to fail the next
//! one.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;

use aurelia_core::{CartLine, CartLineId, CartSnapshot, Product, ProductId, Quantity};
use aurelia_storefront::api::AddItemRequest;
use aurelia_storefront::config::ApiConfig;

/// A request the backend received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: String,
    /// Path relative to the API root, with query string.
    pub path: String,
    /// `X-Request-Id` header, if sent.
    pub request_id: Option<String>,
}

impl RecordedRequest {
    /// `"PUT cart/items/3?quantity=5"` style summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

struct BackendState {
    token: String,
    products: HashMap<ProductId, Product>,
    cart: Vec<CartLine>,
    next_line_id: i64,
    requests: Vec<RecordedRequest>,
    fail_next: VecDeque<(StatusCode, String)>,
    echo_cart: bool,
}

impl BackendState {
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

    fn mutation_response(&self) -> Response {
        if self.echo_cart {
            ok(&self.snapshot())
        } else {
            ok_empty()
        }
    }
}

type Shared = Arc<Mutex<BackendState>>;

/// In-process fake of the storefront backend.
///
/// Dropping it stops the server.
pub struct FakeBackend {
    addr: SocketAddr,
    state: Shared,
    task: JoinHandle<()>,
}

impl FakeBackend {
    /// Start a backend that accepts `token` as the only valid bearer token.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start(token: &str) -> Self {
        let state: Shared = Arc::new(Mutex::new(BackendState {
            token: token.to_string(),
            products: HashMap::new(),
            cart: Vec::new(),
            next_line_id: 1,
            requests: Vec::new(),
            fail_next: VecDeque::new(),
            echo_cart: true,
        }));

        let api = Router::new()
            .route("/cart", get(get_cart).delete(clear_cart))
            .route("/cart/items", post(add_item))
            .route("/cart/items/{id}", put(update_item).delete(remove_item))
            .route("/products/{id}", get(get_product))
            .with_state(Arc::clone(&state));
        let app = Router::new().nest("/api", api);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake backend");
        let addr = listener.local_addr().expect("Failed to read local address");

        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Fake backend error");
        });

        Self { addr, state, task }
    }

    /// API root, e.g. `http://127.0.0.1:41234/api/`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}/api/", self.addr)
    }

    /// Client configuration pointing at this backend.
    ///
    /// # Panics
    ///
    /// Panics if the base URL is rejected.
    #[must_use]
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig::new(&self.base_url()).expect("valid fake backend url")
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().expect("backend state poisoned")
    }

    /// Register a product.
    pub fn add_product(&self, id: i64, name: &str, price_cents: i64, stock: u32) -> Product {
        let product = Product {
            id: ProductId::new(id),
            name: name.to_string(),
            price: Decimal::new(price_cents, 2),
            stock_quantity: stock,
            image_url: Some(format!("https://cdn.aurelia.test/products/{id}.jpg")),
            category_id: None,
        };
        self.lock().products.insert(product.id, product.clone());
        product
    }

    /// Put a line in the cart directly, bypassing the API.
    ///
    /// # Panics
    ///
    /// Panics if the product is unknown or `quantity` is zero.
    pub fn seed_line(&self, product_id: i64, quantity: u32) -> CartLineId {
        let mut state = self.lock();
        let product = state
            .products
            .get(&ProductId::new(product_id))
            .cloned()
            .expect("seeded product must be registered");
        let quantity = Quantity::new(quantity).expect("non-zero quantity");
        push_line(&mut state, &product, quantity)
    }

    /// Make the next request fail with `status` and `message`.
    pub fn fail_next(&self, status: StatusCode, message: &str) {
        self.lock()
            .fail_next
            .push_back((status, message.to_string()));
    }

    /// Whether mutations return the cart (default) or only acknowledge.
    pub fn set_echo_cart(&self, echo: bool) {
        self.lock().echo_cart = echo;
    }

    /// Change a product's stock (as another shopper would).
    pub fn set_stock(&self, product_id: i64, stock: u32) {
        let mut state = self.lock();
        let id = ProductId::new(product_id);
        if let Some(product) = state.products.get_mut(&id) {
            product.stock_quantity = stock;
        }
        for line in state.cart.iter_mut().filter(|line| line.product_id == id) {
            line.stock_quantity = stock;
        }
    }

    /// Every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Request summaries, e.g. `["GET cart", "PUT cart/items/1?quantity=3"]`.
    #[must_use]
    pub fn request_log(&self) -> Vec<String> {
        self.lock()
            .requests
            .iter()
            .map(RecordedRequest::summary)
            .collect()
    }

    /// Quantity the backend holds for a line.
    #[must_use]
    pub fn server_quantity(&self, line_id: CartLineId) -> Option<u32> {
        self.lock()
            .cart
            .iter()
            .find(|line| line.id == line_id)
            .map(|line| line.quantity.get())
    }

    /// Number of lines in the backend cart.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lock().cart.len()
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// Handlers
// =============================================================================

fn ok<T: serde::Serialize>(data: &T) -> Response {
    Json(json!({ "success": true, "data": data })).into_response()
}

fn ok_empty() -> Response {
    Json(json!({ "success": true, "message": "OK" })).into_response()
}

fn failure(status: StatusCode, message: &str) -> Response {
    let mut response = (
        status,
        Json(json!({ "success": false, "message": message })),
    )
        .into_response();
    if status == StatusCode::TOO_MANY_REQUESTS {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static("7"));
    }
    response
}

/// Record the request, then apply injected failures and the auth check.
fn admit<'a>(
    shared: &'a Shared,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<MutexGuard<'a, BackendState>, Response> {
    let mut state = shared.lock().map_err(|_| {
        failure(StatusCode::INTERNAL_SERVER_ERROR, "backend state poisoned")
    })?;

    let path = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |pq| pq.as_str())
        .trim_start_matches("/api")
        .trim_start_matches('/')
        .to_string();
    state.requests.push(RecordedRequest {
        method: method.to_string(),
        path,
        request_id: headers
            .get("X-Request-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    if let Some((status, message)) = state.fail_next.pop_front() {
        return Err(failure(status, &message));
    }

    let expected = format!("Bearer {}", state.token);
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return Err(failure(StatusCode::UNAUTHORIZED, "Invalid or expired token"));
    }

    Ok(state)
}

fn push_line(state: &mut BackendState, product: &Product, quantity: Quantity) -> CartLineId {
    let id = CartLineId::new(state.next_line_id);
    state.next_line_id += 1;
    state.cart.push(CartLine {
        id,
        product_id: product.id,
        product_name: product.name.clone(),
        price: product.price,
        quantity,
        stock_quantity: product.stock_quantity,
        product_image: product.image_url.clone(),
    });
    id
}

async fn get_cart(
    State(shared): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    match admit(&shared, &method, &uri, &headers) {
        Ok(state) => ok(&state.snapshot()),
        Err(response) => response,
    }
}

async fn add_item(
    State(shared): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(request): Json<AddItemRequest>,
) -> Response {
    let mut state = match admit(&shared, &method, &uri, &headers) {
        Ok(state) => state,
        Err(response) => return response,
    };

    let Some(product) = state.products.get(&request.product_id).cloned() else {
        return failure(StatusCode::NOT_FOUND, "Product not found");
    };

    let in_cart: u32 = state
        .cart
        .iter()
        .filter(|line| line.product_id == product.id)
        .map(|line| line.quantity.get())
        .sum();
    let wanted = in_cart + request.quantity.get();
    if wanted > product.stock_quantity {
        return failure(
            StatusCode::CONFLICT,
            &format!("Only {} {} left in stock", product.stock_quantity, product.name),
        );
    }

    if let Some(line) = state
        .cart
        .iter_mut()
        .find(|line| line.product_id == product.id)
    {
        line.quantity = Quantity::new(wanted).unwrap_or(line.quantity);
    } else {
        push_line(&mut state, &product, request.quantity);
    }

    state.mutation_response()
}

#[derive(Deserialize)]
struct QuantityParams {
    quantity: i64,
}

async fn update_item(
    State(shared): State<Shared>,
    Path(id): Path<i64>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<QuantityParams>,
) -> Response {
    let mut state = match admit(&shared, &method, &uri, &headers) {
        Ok(state) => state,
        Err(response) => return response,
    };

    let Some(quantity) = u32::try_from(params.quantity).ok().and_then(Quantity::new) else {
        return failure(StatusCode::BAD_REQUEST, "Quantity must be at least 1");
    };

    let Some(line) = state
        .cart
        .iter_mut()
        .find(|line| line.id == CartLineId::new(id))
    else {
        return failure(StatusCode::NOT_FOUND, "Cart item not found");
    };

    if quantity.get() > line.stock_quantity {
        let message = format!(
            "Only {} {} left in stock",
            line.stock_quantity, line.product_name
        );
        return failure(StatusCode::CONFLICT, &message);
    }
    line.quantity = quantity;

    state.mutation_response()
}

async fn remove_item(
    State(shared): State<Shared>,
    Path(id): Path<i64>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let mut state = match admit(&shared, &method, &uri, &headers) {
        Ok(state) => state,
        Err(response) => return response,
    };

    let before = state.cart.len();
    state.cart.retain(|line| line.id != CartLineId::new(id));
    if state.cart.len() == before {
        return failure(StatusCode::NOT_FOUND, "Cart item not found");
    }

    // Removal only acknowledges; clients re-read the cart.
    ok_empty()
}

async fn clear_cart(
    State(shared): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    match admit(&shared, &method, &uri, &headers) {
        Ok(mut state) => {
            state.cart.clear();
            ok_empty()
        }
        Err(response) => response,
    }
}

async fn get_product(
    State(shared): State<Shared>,
    Path(id): Path<i64>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let state = match admit(&shared, &method, &uri, &headers) {
        Ok(state) => state,
        Err(response) => return response,
    };

    state.products.get(&ProductId::new(id)).map_or_else(
        || failure(StatusCode::NOT_FOUND, "Product not found"),
        ok,
    )
}
