//! Payment gateway adapter.
//!
//! The storefront talks to the processor through [`PaymentGateway`]: one call
//! to open a payment intent for an order, one to read an intent back. The
//! production implementation is [`StripeClient`].

pub mod stripe;

pub use stripe::StripeClient;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use greenhouse_core::{CurrencyCode, OrderId, PaymentResolution};

/// Errors that can occur when talking to the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a response or build a request.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Request to authorize an order's total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIntent {
    /// Amount in minor units (cents).
    pub amount_minor: i64,
    pub currency: CurrencyCode,
    /// Correlation metadata: the order this intent pays for.
    pub order_id: OrderId,
    /// Deduplicates retried creations on the gateway side.
    pub idempotency_key: String,
}

impl CreateIntent {
    #[must_use]
    pub fn for_order(order_id: OrderId, amount_minor: i64, currency: CurrencyCode) -> Self {
        Self {
            amount_minor,
            currency,
            order_id,
            idempotency_key: format!("order-{order_id}"),
        }
    }
}

/// A freshly created intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    /// Handed to the browser to complete payment.
    pub client_secret: String,
}

/// Gateway-side lifecycle of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl IntentStatus {
    /// Only `succeeded` counts as paid.
    #[must_use]
    pub const fn resolution(self) -> PaymentResolution {
        match self {
            Self::Succeeded => PaymentResolution::Succeeded,
            _ => PaymentResolution::NotSucceeded,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
            Self::Unknown => "unknown",
        }
    }
}

/// Current state of an intent as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentSnapshot {
    pub id: String,
    pub status: IntentStatus,
    /// Order id from the intent's metadata, if present and well formed.
    pub order_id: Option<OrderId>,
}

/// Payment processor operations used by checkout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a payment intent for `request.amount_minor`.
    async fn create_intent(&self, request: &CreateIntent) -> Result<PaymentIntent, GatewayError>;

    /// Read an intent's current status. Has no side effects.
    async fn get_intent(&self, intent_id: &str) -> Result<IntentSnapshot, GatewayError>;
}

/// Whether `id` looks like a gateway intent id (`pi_` followed by
/// alphanumerics or underscores).
#[must_use]
pub fn is_valid_intent_id(id: &str) -> bool {
    id.strip_prefix("pi_").is_some_and(|rest| {
        !rest.is_empty()
            && rest.len() <= 255
            && rest.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
    })
}
