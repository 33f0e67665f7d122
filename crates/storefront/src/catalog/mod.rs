//! Product lookup for the cart.
//!
//! `add` needs the product's current stock, so the catalog fetches products by
//! ID and caches them briefly using `moka`. Anything that changes what is in
//! the cart for a product should call [`Catalog::invalidate`] so the next
//! lookup sees fresh stock.

mod cache;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument};

use aurelia_core::{Product, ProductId};

use crate::api::{ApiError, ProductApi};
use crate::session::SessionToken;

use cache::CacheKey;

const MAX_CACHED_PRODUCTS: u64 = 1000;

/// Cached product lookup.
///
/// Cheaply cloneable; clones share the cache.
pub struct Catalog<P: ProductApi> {
    inner: Arc<CatalogInner<P>>,
}

impl<P: ProductApi> Clone for Catalog<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CatalogInner<P> {
    api: P,
    cache: Cache<CacheKey, Product>,
}

impl<P: ProductApi> Catalog<P> {
    /// Create a catalog whose entries live for `ttl`.
    #[must_use]
    pub fn new(api: P, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_CACHED_PRODUCTS)
            .time_to_live(ttl)
            .build();

        Self {
            inner: Arc::new(CatalogInner { api, cache }),
        }
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not cached and the request fails.
    #[instrument(skip(self, token), fields(product_id = %product_id))]
    pub async fn product(
        &self,
        token: &SessionToken,
        product_id: ProductId,
    ) -> Result<Product, ApiError> {
        let key = CacheKey::Product(product_id);

        if let Some(product) = self.inner.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let product = self.inner.api.get_product(token, product_id).await?;
        self.inner.cache.insert(key, product.clone()).await;

        Ok(product)
    }

    /// Drop the cached entry for a product.
    pub async fn invalidate(&self, product_id: ProductId) {
        self.inner
            .cache
            .invalidate(&CacheKey::Product(product_id))
            .await;
    }

    /// Drop every cached product.
    pub async fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }
}
