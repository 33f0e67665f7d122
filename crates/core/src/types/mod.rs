//! Core types for the Aurelia storefront.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;
pub mod price;
pub mod product;
pub mod quantity;

pub use cart::{CartLine, CartSnapshot};
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use product::Product;
pub use quantity::{Quantity, QuantityError};
