//! # Product Repository
//!
//! The catalog collaborator: the checkout only ever needs a product's
//! current name, price and gift-card flag.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use super::new_id;
use crate::error::DbResult;
use checkout_core::{Money, Product};

/// Repository for product lookups.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// `findProduct(id)`. Inactive products are returned too; the cart
    /// decides what to do with them.
    pub async fn find_product(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price_cents, is_gift_card, is_active, created_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Active products, cheapest first.
    pub async fn list_active(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price_cents, is_gift_card, is_active, created_at
            FROM products
            WHERE is_active = 1
            ORDER BY price_cents, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Inserts a product.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, is_gift_card, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.is_gift_card)
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Convenience for seeding: creates an active product with a fresh id.
    pub async fn create(&self, name: &str, price: Money, is_gift_card: bool) -> DbResult<Product> {
        let product = Product {
            id: new_id(),
            name: name.to_string(),
            price_cents: price.cents(),
            is_gift_card,
            is_active: true,
            created_at: Utc::now(),
        };
        self.insert(&product).await?;
        Ok(product)
    }
}
