//! Business logic services for the storefront.
//!
//! # Services
//!
//! - [`cart`] - Session cart mutations under a per-session lock
//! - [`checkout`] - Orders, payment intents and payment reconciliation

pub mod cart;
pub mod checkout;
mod locks;

pub use cart::{CartService, CartServiceError};
pub use checkout::{
    CheckoutError, CheckoutIntent, CheckoutRequest, CheckoutService, PaymentConfirmation,
    ReconcileReport,
};
