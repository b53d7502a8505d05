//! Session cart model and its mutation rules.
//!
//! A [`Cart`] owns its line items and its total. The total is never set
//! directly: every mutation rebuilds the candidate item list, runs
//! [`recompute_total`] over it and only then commits both together, so a
//! cart whose total disagrees with its items cannot be observed, and a
//! failed mutation leaves the cart untouched.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{CartItemId, Money, MoneyError, ProductId, SessionId};

/// Errors raised by cart mutations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("quantity must be at least 1 (got {0})")]
    InvalidQuantity(i64),
    #[error("cart item not found: {0}")]
    ItemNotFound(CartItemId),
    #[error("quantity too large")]
    QuantityOverflow,
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// A line-item quantity, always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(u32);

impl Quantity {
    pub const ONE: Self = Self(1);

    /// Validate a raw quantity from client input.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] for values below 1 or above
    /// `u32::MAX`.
    pub fn new(raw: i64) -> Result<Self, CartError> {
        match u32::try_from(raw) {
            Ok(n) if n >= 1 => Ok(Self(n)),
            _ => Err(CartError::InvalidQuantity(raw)),
        }
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// One product/quantity/price tuple in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price captured when the product was first added.
    pub price: Money,
}

impl CartItem {
    /// `price × quantity`.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::OutOfRange`] on decimal overflow.
    pub fn line_total(&self) -> Result<Money, MoneyError> {
        self.price.times(self.quantity)
    }
}

/// Sum of `price × quantity` over all items.
///
/// # Errors
///
/// Returns [`CartError::Money`] if any line total or the running sum
/// overflows.
pub fn recompute_total(items: &[CartItem]) -> Result<Money, CartError> {
    items.iter().try_fold(Money::ZERO, |total, item| {
        Ok(total.checked_add(item.line_total()?)?)
    })
}

/// The shopping cart for one guest session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    session_id: SessionId,
    items: Vec<CartItem>,
    total: Money,
    /// Optimistic-concurrency version; 0 means "never persisted".
    #[serde(skip)]
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Cart {
    /// A new, unsaved, empty cart.
    #[must_use]
    pub const fn empty(session_id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            items: Vec::new(),
            total: Money::ZERO,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a cart from stored parts, recomputing the total.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] if a stored quantity is zero or the total
    /// overflows.
    pub fn from_parts(
        session_id: SessionId,
        items: Vec<CartItem>,
        version: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, CartError> {
        if let Some(bad) = items.iter().find(|item| item.quantity == 0) {
            return Err(CartError::InvalidQuantity(i64::from(bad.quantity)));
        }
        let total = recompute_total(&items)?;
        Ok(Self {
            session_id,
            items,
            total,
            version,
            created_at,
            updated_at,
        })
    }

    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub const fn total(&self) -> Money {
        self.total
    }

    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    #[must_use]
    pub fn item(&self, id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Copy of this cart stamped with the version the store assigned.
    #[must_use]
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Add `quantity` units of a product.
    ///
    /// An existing line for the same product has its quantity increased and
    /// keeps its captured price; otherwise a new line is appended at
    /// `unit_price`. Returns the id of the affected line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::QuantityOverflow`] or [`CartError::Money`] if the
    /// resulting line or total would overflow; the cart is unchanged.
    pub fn add_item(
        &mut self,
        product_id: ProductId,
        unit_price: Money,
        quantity: Quantity,
        now: DateTime<Utc>,
    ) -> Result<CartItemId, CartError> {
        let mut items = self.items.clone();
        let id = if let Some(line) = items.iter_mut().find(|i| i.product_id == product_id) {
            line.quantity = line
                .quantity
                .checked_add(quantity.get())
                .ok_or(CartError::QuantityOverflow)?;
            line.id
        } else {
            let id = CartItemId::generate();
            items.push(CartItem {
                id,
                product_id,
                quantity: quantity.get(),
                price: unit_price,
            });
            id
        };
        self.commit(items, now)?;
        Ok(id)
    }

    /// Replace the quantity of one line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::ItemNotFound`] if no line has `item_id`.
    pub fn set_quantity(
        &mut self,
        item_id: CartItemId,
        quantity: Quantity,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        let mut items = self.items.clone();
        let line = items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(CartError::ItemNotFound(item_id))?;
        line.quantity = quantity.get();
        self.commit(items, now)
    }

    /// Remove one line. Returns `false` if no line had `item_id`.
    pub fn remove_item(&mut self, item_id: CartItemId, now: DateTime<Utc>) -> bool {
        let before = self.items.len();
        let items: Vec<CartItem> = self
            .items
            .iter()
            .filter(|i| i.id != item_id)
            .cloned()
            .collect();
        if items.len() == before {
            return false;
        }
        // Removing lines can only shrink the total, so this cannot fail.
        self.total = recompute_total(&items).unwrap_or(Money::ZERO);
        self.items = items;
        self.updated_at = now;
        true
    }

    /// Remove every line and zero the total.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.items.clear();
        self.total = Money::ZERO;
        self.updated_at = now;
    }

    fn commit(&mut self, items: Vec<CartItem>, now: DateTime<Utc>) -> Result<(), CartError> {
        let total = recompute_total(&items)?;
        self.items = items;
        self.total = total;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn session() -> SessionId {
        SessionId::parse("guest_test01").unwrap()
    }

    fn money(s: &str) -> Money {
        Money::new(s.parse::<Decimal>().unwrap()).unwrap()
    }

    fn qty(n: i64) -> Quantity {
        Quantity::new(n).unwrap()
    }

    fn assert_total_invariant(cart: &Cart) {
        assert_eq!(cart.total(), recompute_total(cart.items()).unwrap());
    }

    #[test]
    fn test_quantity_bounds() {
        assert_eq!(Quantity::new(0), Err(CartError::InvalidQuantity(0)));
        assert_eq!(Quantity::new(-3), Err(CartError::InvalidQuantity(-3)));
        assert!(Quantity::new(i64::from(u32::MAX) + 1).is_err());
        assert_eq!(Quantity::new(1).unwrap(), Quantity::ONE);
    }

    #[test]
    fn test_empty_cart() {
        let cart = Cart::empty(session(), Utc::now());
        assert!(cart.is_empty());
        assert!(cart.total().is_zero());
        assert_eq!(cart.version(), 0);
    }

    #[test]
    fn test_adding_same_product_twice_merges_lines() {
        let mut cart = Cart::empty(session(), Utc::now());
        let product = ProductId::generate();

        let first = cart.add_item(product, money("10"), qty(2), Utc::now()).unwrap();
        let second = cart.add_item(product, money("10"), qty(2), Utc::now()).unwrap();

        assert_eq!(first, second);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 4);
        assert_eq!(cart.total(), money("40.00"));
    }

    #[test]
    fn test_merge_keeps_captured_price() {
        let mut cart = Cart::empty(session(), Utc::now());
        let product = ProductId::generate();

        cart.add_item(product, money("10"), qty(1), Utc::now()).unwrap();
        // Catalog price changed between the two adds.
        cart.add_item(product, money("12"), qty(1), Utc::now()).unwrap();

        assert_eq!(cart.items()[0].price, money("10"));
        assert_eq!(cart.total(), money("20"));
    }

    #[test]
    fn test_distinct_products_get_distinct_lines_in_order() {
        let mut cart = Cart::empty(session(), Utc::now());
        let a = ProductId::generate();
        let b = ProductId::generate();

        cart.add_item(a, money("45.99"), qty(1), Utc::now()).unwrap();
        cart.add_item(b, money("24.99"), qty(3), Utc::now()).unwrap();

        assert_eq!(cart.items()[0].product_id, a);
        assert_eq!(cart.items()[1].product_id, b);
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.total(), money("120.96"));
    }

    #[test]
    fn test_set_quantity() {
        let mut cart = Cart::empty(session(), Utc::now());
        let id = cart
            .add_item(ProductId::generate(), money("5.50"), qty(1), Utc::now())
            .unwrap();

        cart.set_quantity(id, qty(3), Utc::now()).unwrap();

        assert_eq!(cart.item(id).unwrap().quantity, 3);
        assert_eq!(cart.total(), money("16.50"));
    }

    #[test]
    fn test_set_quantity_unknown_item_leaves_cart_unchanged() {
        let mut cart = Cart::empty(session(), Utc::now());
        cart.add_item(ProductId::generate(), money("5"), qty(1), Utc::now())
            .unwrap();
        let before = cart.clone();

        let missing = CartItemId::generate();
        assert_eq!(
            cart.set_quantity(missing, qty(2), Utc::now()),
            Err(CartError::ItemNotFound(missing))
        );
        assert_eq!(cart, before);
    }

    #[test]
    fn test_overflow_leaves_cart_unchanged() {
        let mut cart = Cart::empty(session(), Utc::now());
        let product = ProductId::generate();
        cart.add_item(product, money("1"), qty(i64::from(u32::MAX)), Utc::now())
            .unwrap();
        let before = cart.clone();

        assert_eq!(
            cart.add_item(product, money("1"), qty(1), Utc::now()),
            Err(CartError::QuantityOverflow)
        );
        assert_eq!(cart, before);
    }

    #[test]
    fn test_total_overflow_is_an_error() {
        let line = |price: Money| CartItem {
            id: CartItemId::generate(),
            product_id: ProductId::generate(),
            quantity: 1,
            price,
        };
        let max = Money::new(Decimal::MAX).unwrap();

        assert_eq!(recompute_total(&[line(max)]).unwrap(), max);
        assert!(matches!(
            recompute_total(&[line(max), line(money("1"))]),
            Err(CartError::Money(MoneyError::OutOfRange(_)))
        ));
    }

    #[test]
    fn test_remove_item() {
        let mut cart = Cart::empty(session(), Utc::now());
        let keep = cart
            .add_item(ProductId::generate(), money("3"), qty(2), Utc::now())
            .unwrap();
        let gone = cart
            .add_item(ProductId::generate(), money("7"), qty(1), Utc::now())
            .unwrap();

        assert!(cart.remove_item(gone, Utc::now()));
        assert!(!cart.remove_item(gone, Utc::now()));
        assert!(cart.item(keep).is_some());
        assert_eq!(cart.total(), money("6"));
    }

    #[test]
    fn test_clear() {
        let mut cart = Cart::empty(session(), Utc::now());
        cart.add_item(ProductId::generate(), money("3"), qty(2), Utc::now())
            .unwrap();

        cart.clear(Utc::now());

        assert!(cart.is_empty());
        assert!(cart.total().is_zero());
    }

    #[test]
    fn test_total_invariant_over_mixed_sequence() {
        let mut cart = Cart::empty(session(), Utc::now());
        let products: Vec<ProductId> = (0..4).map(|_| ProductId::generate()).collect();
        let prices = ["1.25", "9.99", "0.10", "42"];
        let mut ids = Vec::new();

        for (step, (product, price)) in products.iter().zip(prices).enumerate() {
            let n = i64::try_from(step).unwrap() + 1;
            ids.push(cart.add_item(*product, money(price), qty(n), Utc::now()).unwrap());
            assert_total_invariant(&cart);
        }
        cart.set_quantity(ids[1], qty(7), Utc::now()).unwrap();
        assert_total_invariant(&cart);
        cart.remove_item(ids[0], Utc::now());
        assert_total_invariant(&cart);
        cart.add_item(products[2], money("0.10"), qty(5), Utc::now())
            .unwrap();
        assert_total_invariant(&cart);

        // 9.99*7 + 0.10*8 + 42*4
        assert_eq!(cart.total(), money("238.73"));
    }

    #[test]
    fn test_from_parts_recomputes_total() {
        let items = vec![CartItem {
            id: CartItemId::generate(),
            product_id: ProductId::generate(),
            quantity: 3,
            price: money("2.50"),
        }];
        let cart = Cart::from_parts(session(), items, 7, Utc::now(), Utc::now()).unwrap();
        assert_eq!(cart.total(), money("7.50"));
        assert_eq!(cart.version(), 7);
    }

    #[test]
    fn test_from_parts_rejects_zero_quantity() {
        let items = vec![CartItem {
            id: CartItemId::generate(),
            product_id: ProductId::generate(),
            quantity: 0,
            price: money("2.50"),
        }];
        assert!(Cart::from_parts(session(), items, 1, Utc::now(), Utc::now()).is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let cart = Cart::empty(session(), Utc::now());
        let json = serde_json::to_value(&cart).unwrap();
        assert_eq!(json["sessionId"], "guest_test01");
        assert_eq!(json["items"], serde_json::json!([]));
        assert_eq!(json["total"].as_f64(), Some(0.0));
        assert!(json.get("version").is_none());
    }
}
