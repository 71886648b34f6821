// /saree-store/services/order-service/src/repository/catalog.rs
// Thin persistence untuk cart, stock, coupons dan address book

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::{
    models::*,
    utils::error::{AppError, AppResult},
};

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    cart_item_id: i64,
    product_id: i64,
    variant_id: Option<i64>,
    quantity: i32,
    product_name: String,
    product_sku: Option<String>,
    variant_sku: Option<String>,
    color: Option<String>,
    size: Option<String>,
    price: BigDecimal,
    discount_percent: BigDecimal,
    price_override: Option<BigDecimal>,
    available_stock: i32,
    is_active: bool,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        let variant_label = match (row.color, row.size) {
            (Some(color), Some(size)) => Some(format!("{} / {}", color, size)),
            (Some(only), None) | (None, Some(only)) => Some(only),
            (None, None) => None,
        };

        CartLine {
            cart_item_id: row.cart_item_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            product_name: row.product_name,
            sku: row.variant_sku.or(row.product_sku),
            variant_label,
            price: row.price,
            discount_percent: row.discount_percent,
            price_override: row.price_override,
            available_stock: row.available_stock,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    code: String,
    kind: String,
    value: BigDecimal,
    min_subtotal: Option<BigDecimal>,
    max_discount: Option<BigDecimal>,
    active: bool,
    expires_at: Option<DateTime<Utc>>,
}

/// Repository untuk catalog collaborators
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Cart lines joined with live price and stock
    pub async fn cart_lines(&self, owner: &CartOwner) -> AppResult<Vec<CartLine>> {
        let (user_id, guest_session) = match owner {
            CartOwner::User(id) => (Some(*id), None),
            CartOwner::Guest(session) => (None, Some(session.as_str())),
        };

        let rows = sqlx::query_as::<_, CartLineRow>(
            r#"
            SELECT
                c.id AS cart_item_id,
                c.product_id,
                c.variant_id,
                c.quantity,
                p.name AS product_name,
                p.sku AS product_sku,
                v.sku AS variant_sku,
                v.color,
                v.size,
                p.price,
                p.discount_percent,
                v.price_override,
                COALESCE(v.stock, p.stock) AS available_stock,
                p.is_active
            FROM cart_items c
            JOIN products p ON p.id = c.product_id
            LEFT JOIN product_variants v ON v.id = c.variant_id
            WHERE ($1::BIGINT IS NOT NULL AND c.user_id = $1)
               OR ($2::VARCHAR IS NOT NULL AND c.user_id IS NULL AND c.guest_session = $2)
            ORDER BY c.id
            "#,
        )
        .bind(user_id)
        .bind(guest_session)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CartLine::from).collect())
    }

    /// Conditional decrement. Returns false when stock is short.
    pub async fn decrement_stock(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product_id: i64,
        variant_id: Option<i64>,
        quantity: i32,
    ) -> AppResult<bool> {
        let result = match variant_id {
            Some(variant_id) => {
                sqlx::query(
                    r#"
                    UPDATE product_variants
                    SET stock = stock - $3, updated_at = NOW()
                    WHERE id = $1 AND product_id = $2 AND stock >= $3
                    "#,
                )
                .bind(variant_id)
                .bind(product_id)
                .bind(quantity)
                .execute(&mut **tx)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE products
                    SET stock = stock - $2, updated_at = NOW()
                    WHERE id = $1 AND stock >= $2 AND is_active
                    "#,
                )
                .bind(product_id)
                .bind(quantity)
                .execute(&mut **tx)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    /// Stock as seen inside the transaction, for shortfall reports
    pub async fn current_stock(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product_id: i64,
        variant_id: Option<i64>,
    ) -> AppResult<i32> {
        let row = match variant_id {
            Some(variant_id) => {
                sqlx::query("SELECT stock FROM product_variants WHERE id = $1")
                    .bind(variant_id)
                    .fetch_optional(&mut **tx)
                    .await?
            }
            None => {
                sqlx::query("SELECT stock FROM products WHERE id = $1 AND is_active")
                    .bind(product_id)
                    .fetch_optional(&mut **tx)
                    .await?
            }
        };

        Ok(row.map(|r| r.try_get::<i32, _>("stock")).transpose()?.unwrap_or(0))
    }

    /// Put reserved quantities back
    pub async fn restock(&self, tx: &mut Transaction<'_, Postgres>, items: &[OrderItem]) -> AppResult<()> {
        for item in items {
            match item.variant_id {
                Some(variant_id) => {
                    sqlx::query("UPDATE product_variants SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
                        .bind(variant_id)
                        .bind(item.quantity)
                        .execute(&mut **tx)
                        .await?;
                }
                None => {
                    sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
                        .bind(item.product_id)
                        .bind(item.quantity)
                        .execute(&mut **tx)
                        .await?;
                }
            }
        }
        Ok(())
    }

    pub async fn clear_cart(&self, tx: &mut Transaction<'_, Postgres>, owner: &CartOwner) -> AppResult<()> {
        match owner {
            CartOwner::User(id) => {
                sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
            }
            CartOwner::Guest(session) => {
                sqlx::query("DELETE FROM cart_items WHERE user_id IS NULL AND guest_session = $1")
                    .bind(session)
                    .execute(&mut **tx)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn saved_address(&self, user_id: i64, address_id: i64) -> AppResult<Option<AddressSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT name, phone, email, line1, line2, landmark, city, state, pincode, country
            FROM user_addresses
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(address_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> AppResult<AddressSnapshot> {
            Ok(AddressSnapshot {
                name: r.try_get("name")?,
                phone: r.try_get("phone")?,
                email: r.try_get("email")?,
                line1: r.try_get("line1")?,
                line2: r.try_get("line2")?,
                landmark: r.try_get("landmark")?,
                city: r.try_get("city")?,
                state: r.try_get("state")?,
                pincode: r.try_get("pincode")?,
                country: r.try_get("country")?,
            })
        })
        .transpose()
    }

    pub async fn coupon(&self, code: &str) -> AppResult<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(
            r#"
            SELECT code, kind, value, min_subtotal, max_discount, active, expires_at
            FROM coupons
            WHERE UPPER(code) = UPPER($1)
            "#,
        )
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> AppResult<Coupon> {
            let kind = match r.kind.as_str() {
                "percent" => DiscountKind::Percent,
                "flat" => DiscountKind::Flat,
                other => {
                    return Err(AppError::Database(format!("Unknown coupon kind '{}'", other)));
                }
            };
            Ok(Coupon {
                code: r.code,
                kind,
                value: r.value,
                min_subtotal: r.min_subtotal,
                max_discount: r.max_discount,
                active: r.active,
                expires_at: r.expires_at,
            })
        })
        .transpose()
    }
}
