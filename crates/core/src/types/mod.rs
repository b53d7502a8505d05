//! Core types for Greenhouse.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod customer;
pub mod email;
pub mod id;
pub mod money;
pub mod session;
pub mod status;

pub use customer::{CheckoutDetails, CheckoutDetailsError, ShippingAddress};
pub use email::{Email, EmailError};
pub use id::*;
pub use money::{CurrencyCode, Money, MoneyError};
pub use session::{SessionId, SessionIdError};
pub use status::*;
