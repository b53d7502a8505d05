//! `PostgreSQL` storage backend.
//!
//! Queries are checked at runtime (`sqlx::query_as` with `FromRow` rows) so
//! the crate builds without a live database. Every row is validated back
//! into core types; values that fail validation surface as
//! `RepositoryError::DataCorruption`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use greenhouse_core::{
    Cart, CartItem, CartItemId, CurrencyCode, Email, Money, Order, OrderId, OrderItem,
    OrderStatus, PaymentStatus, Product, ProductId, SessionId, ShippingAddress,
};

use super::{CartRepository, CatalogRepository, OrderRepository, ProductFilter, RepositoryError};

/// Repository implementation over a connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn corrupt(what: &str, e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::DataCorruption(format!("invalid {what} in database: {e}"))
}

fn money(what: &str, value: Decimal) -> Result<Money, RepositoryError> {
    Money::new(value).map_err(|e| corrupt(what, e))
}

fn quantity(value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|e| corrupt("quantity", e))
}

fn session(value: &str) -> Result<SessionId, RepositoryError> {
    SessionId::parse(value).map_err(|e| corrupt("session id", e))
}

fn unique_violation(what: &str) -> impl FnOnce(sqlx::Error) -> RepositoryError {
    let what = what.to_owned();
    move |e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return RepositoryError::Conflict(format!("{what} already exists"));
        }
        RepositoryError::Database(e)
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: String,
    price: Decimal,
    image: String,
    category: String,
    in_stock: bool,
    featured: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(r: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProductId::new(r.id),
            name: r.name,
            description: r.description,
            price: money("product price", r.price)?,
            image: r.image,
            category: r.category,
            in_stock: r.in_stock,
            featured: r.featured,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const PRODUCT_COLUMNS: &str = "id, name, description, price, image, category, in_stock, \
                               featured, created_at, updated_at";

fn products(rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
    rows.into_iter().map(Product::try_from).collect()
}

#[async_trait]
impl CatalogRepository for PgStore {
    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM storefront.products WHERE id = $1");
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM storefront.products WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        products(rows)
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.products
             WHERE ($1::text IS NULL OR lower(category) = lower($1))
               AND ($2::boolean IS NULL OR featured = $2)
             ORDER BY featured DESC, created_at DESC"
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(filter.category.as_deref())
            .bind(filter.featured)
            .fetch_all(&self.pool)
            .await?;
        products(rows)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Product>, RepositoryError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.products WHERE name = $1 LIMIT 1"
        );
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn insert(&self, product: &Product) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.products
                (id, name, description, price, image, category, in_stock, featured,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(&product.image)
        .bind(&product.category)
        .bind(product.in_stock)
        .bind(product.featured)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unique_violation("product"))?;
        Ok(())
    }
}

// =============================================================================
// Carts
// =============================================================================

#[derive(sqlx::FromRow)]
struct CartRow {
    session_id: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: Uuid,
    product_id: Uuid,
    quantity: i64,
    price: Decimal,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = RepositoryError;

    fn try_from(r: CartItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CartItemId::new(r.id),
            product_id: ProductId::new(r.product_id),
            quantity: quantity(r.quantity)?,
            price: money("cart item price", r.price)?,
        })
    }
}

#[async_trait]
impl CartRepository for PgStore {
    async fn find(&self, session_id: &SessionId) -> Result<Option<Cart>, RepositoryError> {
        let Some(row) = sqlx::query_as::<_, CartRow>(
            r"
            SELECT session_id, version, created_at, updated_at
            FROM storefront.carts
            WHERE session_id = $1
            ",
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, CartItemRow>(
            r"
            SELECT id, product_id, quantity, price
            FROM storefront.cart_items
            WHERE session_id = $1
            ORDER BY position
            ",
        )
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CartItem::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        let cart = Cart::from_parts(
            session(&row.session_id)?,
            items,
            row.version,
            row.created_at,
            row.updated_at,
        )
        .map_err(|e| corrupt("cart", e))?;
        Ok(Some(cart))
    }

    async fn save(&self, cart: &Cart) -> Result<Cart, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let next_version = cart.version() + 1;

        let written = if cart.version() == 0 {
            sqlx::query(
                r"
                INSERT INTO storefront.carts (session_id, version, total, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (session_id) DO NOTHING
                ",
            )
            .bind(cart.session_id().as_str())
            .bind(next_version)
            .bind(cart.total().amount())
            .bind(cart.created_at())
            .bind(cart.updated_at())
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query(
                r"
                UPDATE storefront.carts
                SET version = $2, total = $3, updated_at = $4
                WHERE session_id = $1 AND version = $5
                ",
            )
            .bind(cart.session_id().as_str())
            .bind(next_version)
            .bind(cart.total().amount())
            .bind(cart.updated_at())
            .bind(cart.version())
            .execute(&mut *tx)
            .await?
        };

        if written.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(
                "cart was modified concurrently".to_owned(),
            ));
        }

        sqlx::query("DELETE FROM storefront.cart_items WHERE session_id = $1")
            .bind(cart.session_id().as_str())
            .execute(&mut *tx)
            .await?;

        for (position, item) in (0_i32..).zip(cart.items()) {
            sqlx::query(
                r"
                INSERT INTO storefront.cart_items
                    (id, session_id, position, product_id, quantity, price)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(item.id)
            .bind(cart.session_id().as_str())
            .bind(position)
            .bind(item.product_id)
            .bind(i64::from(item.quantity))
            .bind(item.price.amount())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(cart.clone().with_version(next_version))
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    session_id: String,
    customer_email: String,
    customer_name: String,
    shipping_address: Json<ShippingAddress>,
    subtotal: Decimal,
    tax: Decimal,
    shipping: Decimal,
    total: Decimal,
    currency: String,
    payment_status: PaymentStatus,
    order_status: OrderStatus,
    payment_intent_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    order_id: Uuid,
    product_id: Uuid,
    quantity: i64,
    price: Decimal,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        Ok(Order {
            id: OrderId::new(self.id),
            session_id: session(&self.session_id)?,
            customer_email: Email::parse(&self.customer_email)
                .map_err(|e| corrupt("email", e))?,
            customer_name: self.customer_name,
            shipping_address: self.shipping_address.0,
            items,
            subtotal: money("subtotal", self.subtotal)?,
            tax: money("tax", self.tax)?,
            shipping: money("shipping", self.shipping)?,
            total: money("total", self.total)?,
            currency: self
                .currency
                .parse::<CurrencyCode>()
                .map_err(|e| corrupt("currency", e))?,
            payment_status: self.payment_status,
            order_status: self.order_status,
            payment_intent_id: self.payment_intent_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, session_id, customer_email, customer_name, shipping_address, \
                             subtotal, tax, shipping, total, currency, payment_status, \
                             order_status, payment_intent_id, created_at, updated_at";

impl PgStore {
    async fn with_items(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let item_rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT order_id, product_id, quantity, price
            FROM storefront.order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for r in item_rows {
            items.entry(r.order_id).or_default().push(OrderItem {
                product_id: ProductId::new(r.product_id),
                quantity: quantity(r.quantity)?,
                price: money("order item price", r.price)?,
            });
        }

        rows.into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_order(lines)
            })
            .collect()
    }

    async fn order_exists(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let found: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM storefront.orders WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn require_order(&self, id: OrderId) -> Result<Order, RepositoryError> {
        OrderRepository::get(self, id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO storefront.orders
                (id, session_id, customer_email, customer_name, shipping_address,
                 subtotal, tax, shipping, total, currency, payment_status, order_status,
                 payment_intent_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ",
        )
        .bind(order.id)
        .bind(order.session_id.as_str())
        .bind(order.customer_email.as_str())
        .bind(&order.customer_name)
        .bind(Json(&order.shipping_address))
        .bind(order.subtotal.amount())
        .bind(order.tax.amount())
        .bind(order.shipping.amount())
        .bind(order.total.amount())
        .bind(order.currency.code())
        .bind(order.payment_status)
        .bind(order.order_status)
        .bind(order.payment_intent_id.as_deref())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(unique_violation("order"))?;

        for (position, item) in (0_i32..).zip(&order.items) {
            sqlx::query(
                r"
                INSERT INTO storefront.order_items (order_id, position, product_id, quantity, price)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(order.id)
            .bind(position)
            .bind(item.product_id)
            .bind(i64::from(item.quantity))
            .bind(item.price.amount())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE id = $1");
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .into_iter()
            .collect();
        Ok(self.with_items(rows).await?.into_iter().next())
    }

    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders
             WHERE session_id = $1
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(session_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        self.with_items(rows).await
    }

    async fn attach_payment_intent(
        &self,
        id: OrderId,
        intent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let updated = sqlx::query(
            r"
            UPDATE storefront.orders
            SET payment_intent_id = $2, updated_at = $3
            WHERE id = $1 AND payment_intent_id IS NULL
            ",
        )
        .bind(id)
        .bind(intent_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(unique_violation("payment intent"))?;

        let order = self.require_order(id).await?;
        if updated.rows_affected() == 0 && order.payment_intent_id.as_deref() != Some(intent_id) {
            return Err(RepositoryError::Conflict(
                "order already has a payment intent".to_owned(),
            ));
        }
        Ok(order)
    }

    async fn transition_payment(
        &self,
        id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
        order_status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        let updated = sqlx::query(
            r"
            UPDATE storefront.orders
            SET payment_status = $3, order_status = $4, updated_at = $5
            WHERE id = $1 AND payment_status = $2
            ",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(order_status)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            if self.order_exists(id).await? {
                return Ok(None);
            }
            return Err(RepositoryError::NotFound);
        }
        self.require_order(id).await.map(Some)
    }

    async fn list_pending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders
             WHERE payment_status = 'pending' AND created_at < $1
             ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        self.with_items(rows).await
    }
}
