//! Aurelia Core - Shared types library.
//!
//! This crate provides the types shared by every Aurelia component:
//! - `storefront` - Cart synchronization client and REST plumbing
//! - `cli` - Command-line front end for the cart
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no timers.
//! The wire shapes here mirror the backend's JSON (camelCase fields).
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, prices, quantities, cart snapshots and products

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
