//! Cache keys for catalog lookups.

use aurelia_core::ProductId;

/// Cache key for catalog entries.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Product(ProductId),
}
