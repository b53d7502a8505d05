//! Greenhouse Core - Shared domain library.
//!
//! This crate provides the types and rules used across all Greenhouse
//! components:
//! - `storefront` - Public cart, checkout and catalog HTTP service
//! - `cli` - Command-line tools for migrations, seeding and reconciliation
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. Cart totals, order snapshots and payment
//! status transitions are decided here so they can be tested without any
//! infrastructure.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, emails, sessions and statuses
//! - [`product`] - Catalog product records
//! - [`cart`] - Session cart and its mutation rules
//! - [`order`] - Order snapshots and payment reconciliation rules

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod order;
pub mod product;
pub mod types;

pub use cart::{Cart, CartError, CartItem, Quantity, recompute_total};
pub use order::{
    Order, OrderError, OrderItem, PaymentResolution, PaymentTransition, plan_transition,
};
pub use product::{NewProduct, Product, ProductError};
pub use types::*;
