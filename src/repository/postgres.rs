//! PostgreSQL repositories.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{wrong_store, CartRepository, OrderGuard, OrderRepository, ProductRepository, SaveOutcome};
use crate::domain::{
    BankTransferDetails, Cart, CartLine, CartOwner, Category, Money, Order, OrderItem, OrderNumber, OrderStatus,
    PaymentDetails, PaymentMethod, PaymentStatus, Product, Quantity, ShippingDetails,
};
use crate::{Result, StorefrontError};

fn decode<T, E: std::fmt::Display>(res: std::result::Result<T, E>) -> Result<T> {
    res.map_err(|e| StorefrontError::Storage(format!("corrupt row: {e}")))
}

// =============================================================================
// Products
// =============================================================================

const PRODUCT_COLUMNS: &str = "id, name, price, category, image_url, in_stock, created_at";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    price: Decimal,
    category: String,
    image_url: String,
    in_stock: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StorefrontError;
    fn try_from(r: ProductRow) -> Result<Self> {
        Ok(Product {
            id: r.id, name: r.name, price: Money::new(r.price), category: decode(r.category.parse::<Category>())?,
            image_url: r.image_url, in_stock: r.in_stock, created_at: r.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgProductRepo { db: PgPool }

impl PgProductRepo {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

#[async_trait]
impl ProductRepository for PgProductRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id).fetch_optional(&self.db).await?
            .map(Product::try_from).transpose()
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"))
            .bind(ids.to_vec()).fetch_all(&self.db).await?
            .into_iter().map(Product::try_from).collect()
    }
}

// =============================================================================
// Carts
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    #[sqlx(flatten)]
    product: ProductRow,
    quantity: i32,
    added_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PgCartRepo { db: PgPool }

impl PgCartRepo {
    pub fn new(db: PgPool) -> Self { Self { db } }

    fn user_id(owner: &CartOwner) -> Result<Uuid> {
        match owner {
            CartOwner::User(id) => Ok(*id),
            CartOwner::Session(_) => Err(wrong_store(owner, "persisted store")),
        }
    }
}

#[async_trait]
impl CartRepository for PgCartRepo {
    async fn load(&self, owner: &CartOwner) -> Result<Cart> {
        let user_id = Self::user_id(owner)?;
        // no-op update so RETURNING yields the row whether or not it existed
        let (version, updated_at): (i64, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO carts (user_id, version, created_at, updated_at) VALUES ($1, 0, NOW(), NOW()) \
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id RETURNING version, updated_at",
        )
        .bind(user_id).fetch_one(&self.db).await?;

        let rows = sqlx::query_as::<_, CartLineRow>(
            "SELECT p.id, p.name, p.price, p.category, p.image_url, p.in_stock, p.created_at, ci.quantity, ci.added_at \
             FROM cart_items ci JOIN products p ON p.id = ci.product_id WHERE ci.user_id = $1 ORDER BY ci.added_at",
        )
        .bind(user_id).fetch_all(&self.db).await?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let quantity = decode(Quantity::new(row.quantity))?;
            lines.push(CartLine { product: row.product.try_into()?, quantity, added_at: row.added_at });
        }
        Ok(Cart::restore(owner.clone(), lines, version as u64, updated_at))
    }

    async fn save(&self, cart: &Cart) -> Result<SaveOutcome> {
        let user_id = Self::user_id(cart.owner())?;
        let mut tx = self.db.begin().await?;
        let bumped = sqlx::query("UPDATE carts SET version = version + 1, updated_at = $3 WHERE user_id = $1 AND version = $2")
            .bind(user_id).bind(cart.version() as i64).bind(cart.updated_at())
            .execute(&mut *tx).await?
            .rows_affected();
        if bumped == 0 {
            tx.rollback().await?;
            return Ok(SaveOutcome::Conflict);
        }
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(&mut *tx).await?;
        for line in cart.lines() {
            sqlx::query("INSERT INTO cart_items (user_id, product_id, quantity, added_at) VALUES ($1, $2, $3, $4)")
                .bind(user_id).bind(line.product_id()).bind(line.quantity.value()).bind(line.added_at)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(SaveOutcome::Saved)
    }
}

// =============================================================================
// Orders
// =============================================================================

const ORDER_COLUMNS: &str = "id, order_number, user_id, status, payment_method, jazzcash_number, \
    bank_account_title, bank_account_number, bank_name, bank_transaction_id, transaction_proof, payment_status, \
    admin_notes, approved_by, approved_at, ship_full_name, ship_email, ship_address, ship_city, ship_state, \
    ship_zip_code, ship_country, subtotal, tax, total, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    status: String,
    payment_method: String,
    jazzcash_number: Option<String>,
    bank_account_title: Option<String>,
    bank_account_number: Option<String>,
    bank_name: Option<String>,
    bank_transaction_id: Option<String>,
    transaction_proof: Option<String>,
    payment_status: Option<String>,
    admin_notes: Option<String>,
    approved_by: Option<Uuid>,
    approved_at: Option<DateTime<Utc>>,
    ship_full_name: String,
    ship_email: String,
    ship_address: String,
    ship_city: String,
    ship_state: String,
    ship_zip_code: String,
    ship_country: String,
    subtotal: Decimal,
    tax: Decimal,
    total: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    order_id: Uuid,
    product_id: Uuid,
    name: String,
    price: Decimal,
    quantity: i32,
    image_url: String,
    category: String,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StorefrontError;
    fn try_from(r: OrderItemRow) -> Result<Self> {
        Ok(OrderItem {
            product_id: r.product_id, name: r.name, price: Money::new(r.price), quantity: decode(Quantity::new(r.quantity))?,
            image_url: r.image_url, category: decode(r.category.parse::<Category>())?,
        })
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order> {
        let bank_transfer = match (self.bank_account_title, self.bank_account_number, self.bank_name, self.bank_transaction_id) {
            (Some(account_title), Some(account_number), Some(bank_name), Some(transaction_id)) =>
                Some(BankTransferDetails { account_title, account_number, bank_name, transaction_id }),
            _ => None,
        };
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            order_number: OrderNumber::from_stored(self.order_number),
            items,
            shipping: ShippingDetails {
                full_name: self.ship_full_name, email: self.ship_email, address: self.ship_address, city: self.ship_city,
                state: self.ship_state, zip_code: self.ship_zip_code, country: self.ship_country,
            },
            payment_method: decode(self.payment_method.parse::<PaymentMethod>())?,
            payment: PaymentDetails {
                jazzcash_number: self.jazzcash_number,
                bank_transfer,
                transaction_proof: self.transaction_proof,
                status: self.payment_status.map(|s| s.parse::<PaymentStatus>()).transpose()?,
                admin_notes: self.admin_notes,
                approved_by: self.approved_by,
                approved_at: self.approved_at,
            },
            subtotal: Money::new(self.subtotal),
            tax: Money::new(self.tax),
            total: Money::new(self.total),
            status: decode(self.status.parse::<OrderStatus>())?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            events: vec![],
        })
    }
}

#[derive(Clone)]
pub struct PgOrderRepo { db: PgPool }

impl PgOrderRepo {
    pub fn new(db: PgPool) -> Self { Self { db } }

    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        if rows.is_empty() { return Ok(vec![]); }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let item_rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT order_id, product_id, name, price, quantity, image_url, category \
             FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position",
        )
        .bind(ids).fetch_all(&self.db).await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            items.entry(row.order_id).or_default().push(row.try_into()?);
        }
        rows.into_iter()
            .map(|r| { let lines = items.remove(&r.id).unwrap_or_default(); r.into_order(lines) })
            .collect()
    }

    async fn insert_items(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<()> {
        for (position, item) in order.items().iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (order_id, position, product_id, name, price, quantity, image_url, category) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(order.id()).bind(position as i32).bind(item.product_id).bind(&item.name).bind(item.price.amount())
            .bind(item.quantity.value()).bind(&item.image_url).bind(item.category.as_str())
            .execute(&mut **tx).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepo {
    async fn insert(&self, order: &Order) -> Result<()> {
        let pay = order.payment();
        let bank = pay.bank_transfer.as_ref();
        let ship = order.shipping();
        let mut tx = self.db.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
             $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)"
        ))
        .bind(order.id()).bind(order.order_number().as_str()).bind(order.user_id()).bind(order.status().as_str())
        .bind(order.payment_method().as_str()).bind(&pay.jazzcash_number)
        .bind(bank.map(|b| &b.account_title)).bind(bank.map(|b| &b.account_number))
        .bind(bank.map(|b| &b.bank_name)).bind(bank.map(|b| &b.transaction_id))
        .bind(&pay.transaction_proof).bind(pay.status.map(|s| s.as_str())).bind(&pay.admin_notes)
        .bind(pay.approved_by).bind(pay.approved_at)
        .bind(&ship.full_name).bind(&ship.email).bind(&ship.address).bind(&ship.city).bind(&ship.state)
        .bind(&ship.zip_code).bind(&ship.country)
        .bind(order.subtotal().amount()).bind(order.tax().amount()).bind(order.total().amount())
        .bind(order.created_at()).bind(order.updated_at)
        .execute(&mut *tx).await?;
        Self::insert_items(&mut tx, order).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, order: &Order, seen: OrderGuard) -> Result<SaveOutcome> {
        let pay = order.payment();
        let updated = sqlx::query(
            "UPDATE orders SET status = $2, payment_status = $3, admin_notes = $4, approved_by = $5, approved_at = $6, \
             updated_at = $7 WHERE id = $1 AND status = $8 AND payment_status IS NOT DISTINCT FROM $9",
        )
        .bind(order.id()).bind(order.status().as_str()).bind(pay.status.map(|s| s.as_str())).bind(&pay.admin_notes)
        .bind(pay.approved_by).bind(pay.approved_at).bind(order.updated_at)
        .bind(seen.status.as_str()).bind(seen.payment_status.map(|s| s.as_str()))
        .execute(&self.db).await?
        .rows_affected();
        Ok(if updated == 0 { SaveOutcome::Conflict } else { SaveOutcome::Saved })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id).fetch_all(&self.db).await?;
        Ok(self.hydrate(rows).await?.pop())
    }

    async fn find_for_user(&self, id: Uuid, user_id: Uuid) -> Result<Option<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND user_id = $2"))
            .bind(id).bind(user_id).fetch_all(&self.db).await?;
        Ok(self.hydrate(rows).await?.pop())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id).fetch_all(&self.db).await?;
        self.hydrate(rows).await
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"))
            .fetch_all(&self.db).await?;
        self.hydrate(rows).await
    }
}
