//! Checkout and payment reconciliation.
//!
//! # Flow
//!
//! 1. [`CheckoutService::create_payment_intent`] snapshots the cart into a
//!    `pending` order, opens a gateway intent tagged with the order id, then
//!    records the intent id on the order.
//! 2. [`CheckoutService::confirm_payment`] reads the intent back from the
//!    gateway and moves the order to `paid` (clearing the session cart) or
//!    `failed` (leaving the cart for a retry).
//! 3. [`CheckoutService::reconcile_stale`] settles orders left `pending`
//!    past the configured age.
//!
//! Payment status changes are compare-and-swap on the status that was read,
//! so concurrent confirmations of one order apply at most one transition.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use greenhouse_core::{
    CheckoutDetails, CheckoutDetailsError, CurrencyCode, MoneyError, Order, OrderError,
    OrderId, PaymentResolution, PaymentStatus, SessionId, ShippingAddress, plan_transition,
};

use super::cart::CartService;
use crate::db::{RepositoryError, Store};
use crate::payments::{CreateIntent, GatewayError, PaymentGateway, is_valid_intent_id};

/// Errors raised by checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("{0}")]
    Validation(String),
    #[error("order not found")]
    OrderNotFound,
    #[error("payment intent does not belong to this order")]
    IntentMismatch,
    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<CheckoutDetailsError> for CheckoutError {
    fn from(e: CheckoutDetailsError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<OrderError> for CheckoutError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::EmptyCart => Self::EmptyCart,
            OrderError::Cart(e) => Self::Validation(e.to_string()),
        }
    }
}

impl From<MoneyError> for CheckoutError {
    fn from(e: MoneyError) -> Self {
        Self::Validation(format!("order total cannot be charged: {e}"))
    }
}

/// Raw checkout-intent input.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub session_id: SessionId,
    pub customer_email: String,
    pub customer_name: String,
    pub shipping_address: ShippingAddress,
}

/// What the browser needs to complete payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutIntent {
    pub client_secret: String,
    pub order_id: OrderId,
    /// Charged amount in minor units.
    pub amount: i64,
}

/// Outcome of a confirmation or reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentConfirmation {
    Paid(Order),
    Failed(Order),
}

impl PaymentConfirmation {
    fn from_order(order: Order) -> Self {
        if order.payment_status == PaymentStatus::Paid {
            Self::Paid(order)
        } else {
            Self::Failed(order)
        }
    }

    #[must_use]
    pub const fn order(&self) -> &Order {
        match self {
            Self::Paid(order) | Self::Failed(order) => order,
        }
    }
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub examined: usize,
    pub paid: usize,
    pub failed: usize,
    pub errors: usize,
}

/// Checkout orchestration over the store, the gateway and the cart service.
#[derive(Clone)]
pub struct CheckoutService {
    store: Store,
    gateway: Arc<dyn PaymentGateway>,
    carts: CartService,
    currency: CurrencyCode,
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        store: Store,
        gateway: Arc<dyn PaymentGateway>,
        carts: CartService,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            store,
            gateway,
            carts,
            currency,
        }
    }

    /// Create an order from the session cart and open a payment intent.
    ///
    /// The order is persisted before the gateway is called. If the gateway
    /// call fails, the order stays `pending` with no intent and is settled
    /// later by [`CheckoutService::reconcile_stale`].
    ///
    /// # Errors
    ///
    /// `Validation` for bad customer details, `EmptyCart` if the cart is
    /// missing or empty (no order is created), `Gateway` or `Repository` on
    /// downstream failure.
    #[instrument(skip(self, request), fields(session_id = %request.session_id))]
    pub async fn create_payment_intent(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutIntent, CheckoutError> {
        let details = CheckoutDetails::parse(
            &request.customer_email,
            &request.customer_name,
            request.shipping_address,
        )?;

        let cart = self
            .store
            .carts()
            .find(&request.session_id)
            .await?
            .ok_or(CheckoutError::EmptyCart)?;
        let order = Order::from_cart(&cart, details, self.currency, Utc::now())?;
        let amount = order.total.to_minor_units()?;

        self.store.orders().insert(&order).await?;
        info!(order_id = %order.id, total = %order.total, "Order created");

        let intent = self
            .gateway
            .create_intent(&CreateIntent::for_order(order.id, amount, self.currency))
            .await
            .inspect_err(|e| {
                warn!(order_id = %order.id, error = %e, "Gateway rejected payment intent; order left pending");
            })?;

        self.store
            .orders()
            .attach_payment_intent(order.id, &intent.id, Utc::now())
            .await?;

        Ok(CheckoutIntent {
            client_secret: intent.client_secret,
            order_id: order.id,
            amount,
        })
    }

    /// Settle an order against the gateway's view of its payment intent.
    ///
    /// Confirming an order that is already `paid` returns it without
    /// contacting the gateway. A `failed` order stays failed even if its
    /// intent later succeeds. Repeated confirmations never clear the cart
    /// twice.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed intent id, `OrderNotFound`,
    /// `IntentMismatch` if the intent belongs to a different order, and
    /// `Gateway` or `Repository` on downstream failure.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn confirm_payment(
        &self,
        intent_id: &str,
        order_id: OrderId,
    ) -> Result<PaymentConfirmation, CheckoutError> {
        if !is_valid_intent_id(intent_id) {
            return Err(CheckoutError::Validation(
                "paymentIntentId is invalid".to_owned(),
            ));
        }

        let mut order = self
            .store
            .orders()
            .get(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound)?;
        if !order.owns_intent(intent_id) {
            return Err(CheckoutError::IntentMismatch);
        }
        if order.payment_status == PaymentStatus::Paid {
            return Ok(PaymentConfirmation::Paid(order));
        }

        let snapshot = self.gateway.get_intent(intent_id).await?;
        if snapshot.order_id.is_some_and(|id| id != order.id) {
            return Err(CheckoutError::IntentMismatch);
        }

        if order.payment_intent_id.is_none() {
            // Intent was opened but never recorded; adopt it only if the
            // gateway says it was opened for this order.
            if snapshot.order_id != Some(order.id) {
                return Err(CheckoutError::IntentMismatch);
            }
            order = self
                .store
                .orders()
                .attach_payment_intent(order.id, intent_id, Utc::now())
                .await
                .map_err(|e| match e {
                    RepositoryError::Conflict(_) => CheckoutError::IntentMismatch,
                    other => other.into(),
                })?;
        }

        info!(intent_status = snapshot.status.as_str(), "Payment intent retrieved");
        self.settle(order, snapshot.status.resolution(), true).await
    }

    /// # Errors
    ///
    /// `OrderNotFound` or a repository failure.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, CheckoutError> {
        self.store
            .orders()
            .get(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound)
    }

    /// Orders for a session, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Repository` if the store fails.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn orders_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<Order>, CheckoutError> {
        Ok(self.store.orders().list_for_session(session_id).await?)
    }

    /// Settle every order still `pending` after `older_than`.
    ///
    /// Orders with an intent are settled from the gateway's status; orders
    /// without one are marked `failed`. Carts are never cleared here since
    /// the session may have moved on. Per-order failures are logged and
    /// counted.
    ///
    /// # Errors
    ///
    /// `Validation` if `older_than` is out of range, or a repository failure
    /// while listing orders.
    #[instrument(skip(self))]
    pub async fn reconcile_stale(
        &self,
        older_than: Duration,
    ) -> Result<ReconcileReport, CheckoutError> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| CheckoutError::Validation(format!("invalid age: {e}")))?;
        let cutoff = Utc::now() - age;
        let stale = self.store.orders().list_pending_before(cutoff).await?;

        let mut report = ReconcileReport {
            examined: stale.len(),
            ..ReconcileReport::default()
        };

        for order in stale {
            let order_id = order.id;
            let outcome = match order.payment_intent_id.clone() {
                Some(intent_id) => match self.gateway.get_intent(&intent_id).await {
                    Ok(snapshot) => self.settle(order, snapshot.status.resolution(), false).await,
                    Err(e) => Err(e.into()),
                },
                None => {
                    self.settle(order, PaymentResolution::NotSucceeded, false)
                        .await
                }
            };

            match outcome {
                Ok(PaymentConfirmation::Paid(_)) => report.paid += 1,
                Ok(PaymentConfirmation::Failed(_)) => report.failed += 1,
                Err(e) => {
                    report.errors += 1;
                    warn!(order_id = %order_id, error = %e, "Failed to reconcile order");
                }
            }
        }

        info!(
            examined = report.examined,
            paid = report.paid,
            failed = report.failed,
            errors = report.errors,
            "Reconciliation finished"
        );
        Ok(report)
    }

    /// Apply the planned transition, if any, and clear the cart when the
    /// transition calls for it and `may_clear_cart` allows it.
    async fn settle(
        &self,
        order: Order,
        resolution: PaymentResolution,
        may_clear_cart: bool,
    ) -> Result<PaymentConfirmation, CheckoutError> {
        let Some(transition) = plan_transition(order.payment_status, order.order_status, resolution)
        else {
            if order.payment_status == PaymentStatus::Failed
                && resolution == PaymentResolution::Succeeded
            {
                warn!(
                    order_id = %order.id,
                    payment_intent_id = order.payment_intent_id.as_deref().unwrap_or_default(),
                    "Payment succeeded for an order already marked failed; needs refund or manual review"
                );
            }
            return Ok(PaymentConfirmation::from_order(order));
        };

        let updated = self
            .store
            .orders()
            .transition_payment(
                order.id,
                transition.from,
                transition.to,
                transition.order_status,
                Utc::now(),
            )
            .await?;

        let Some(updated) = updated else {
            // Another confirmation moved the order first; report its result.
            let current = self.get_order(order.id).await?;
            return Ok(PaymentConfirmation::from_order(current));
        };

        info!(
            order_id = %updated.id,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            "Payment status changed"
        );

        if transition.clears_cart && may_clear_cart {
            self.carts.clear_session_cart(&updated.session_id).await;
        }

        Ok(PaymentConfirmation::from_order(updated))
    }
}
