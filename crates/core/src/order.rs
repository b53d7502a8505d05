//! Orders: immutable purchase snapshots of a cart, plus the payment
//! reconciliation rules that move them between payment states.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cart::{Cart, CartError, recompute_total};
use crate::types::{
    CheckoutDetails, CurrencyCode, Email, Money, OrderId, OrderStatus, PaymentStatus, ProductId,
    SessionId, ShippingAddress,
};

/// Errors raised when building an order.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("cart is empty")]
    EmptyCart,
    #[error(transparent)]
    Cart(#[from] CartError),
}

/// A frozen line item. Independent of later cart or catalog changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

/// A purchase record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub session_id: SessionId,
    pub customer_email: Email,
    pub customer_name: String,
    pub shipping_address: ShippingAddress,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub total: Money,
    pub currency: CurrencyCode,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    /// Gateway intent id, set once the gateway accepted the request.
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Snapshot a cart into a new `pending` order.
    ///
    /// The total is recomputed from the cart's items rather than read from
    /// the stored cart total. Tax and shipping are not charged.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::EmptyCart`] if the cart has no items.
    pub fn from_cart(
        cart: &Cart,
        details: CheckoutDetails,
        currency: CurrencyCode,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let subtotal = recompute_total(cart.items())?;
        let tax = Money::ZERO;
        let shipping = Money::ZERO;
        let total = subtotal
            .checked_add(tax)
            .and_then(|t| t.checked_add(shipping))
            .map_err(CartError::from)?;
        let items = cart
            .items()
            .iter()
            .map(|item| OrderItem {
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
            })
            .collect();

        Ok(Self {
            id: OrderId::generate(),
            session_id: cart.session_id().clone(),
            customer_email: details.customer_email,
            customer_name: details.customer_name,
            shipping_address: details.shipping_address,
            items,
            subtotal,
            tax,
            shipping,
            total,
            currency,
            payment_status: PaymentStatus::Pending,
            order_status: OrderStatus::Pending,
            payment_intent_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether this order's recorded intent (if any) is `intent_id`.
    #[must_use]
    pub fn owns_intent(&self, intent_id: &str) -> bool {
        self.payment_intent_id
            .as_deref()
            .is_none_or(|recorded| recorded == intent_id)
    }
}

/// What the gateway says happened to a payment intent, reduced to the only
/// distinction the order cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentResolution {
    Succeeded,
    NotSucceeded,
}

/// A planned payment-status change for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentTransition {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub order_status: OrderStatus,
    /// Clear the session cart once the transition is persisted.
    pub clears_cart: bool,
}

/// Decide how an order moves given a gateway resolution.
///
/// Only `pending` orders move. Returns `None` for `paid` and `failed`
/// orders, so repeated or late confirmations are no-ops.
#[must_use]
pub const fn plan_transition(
    current: PaymentStatus,
    current_order_status: OrderStatus,
    resolution: PaymentResolution,
) -> Option<PaymentTransition> {
    match (current, resolution) {
        (PaymentStatus::Pending, PaymentResolution::Succeeded) => Some(PaymentTransition {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Paid,
            order_status: OrderStatus::Processing,
            clears_cart: true,
        }),
        (PaymentStatus::Pending, PaymentResolution::NotSucceeded) => Some(PaymentTransition {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Failed,
            order_status: current_order_status,
            clears_cart: false,
        }),
        (PaymentStatus::Failed | PaymentStatus::Paid, _) => None,
    }
}
