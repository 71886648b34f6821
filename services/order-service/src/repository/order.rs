// /saree-store/services/order-service/src/repository/order.rs

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool, Postgres, Row, Transaction};

use crate::{
    models::*,
    utils::error::{is_unique_violation, AppError, AppResult},
};

const ORDER_COLUMNS: &str = r#"
    id, order_number, user_id, guest_session, customer_email, customer_phone,
    subtotal, discount, shipping, tax, total, currency, coupon_code,
    status, payment_status, payment_method, gateway_order_id, transaction_id,
    gateway_response, shipping_address, billing_address, notes,
    cancel_reason, cancelled_at, shipped_at, delivered_at, return_reason,
    returned_at, deleted_at, created_at, updated_at
"#;

/// Raw row dari tabel orders
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderRow {
    id: i64,
    order_number: String,
    user_id: Option<i64>,
    guest_session: Option<String>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    subtotal: BigDecimal,
    discount: BigDecimal,
    shipping: BigDecimal,
    tax: BigDecimal,
    total: BigDecimal,
    currency: String,
    coupon_code: Option<String>,
    status: String,
    payment_status: String,
    payment_method: String,
    gateway_order_id: Option<String>,
    transaction_id: Option<String>,
    gateway_response: Option<serde_json::Value>,
    shipping_address: Json<AddressSnapshot>,
    billing_address: Json<AddressSnapshot>,
    notes: Option<String>,
    cancel_reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    return_reason: Option<String>,
    returned_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn corrupt(column: &str, err: AppError) -> AppError {
    AppError::Database(format!("Unreadable {} column: {}", column, err))
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            user_id: row.user_id,
            guest_session: row.guest_session,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            subtotal: row.subtotal,
            discount: row.discount,
            shipping: row.shipping,
            tax: row.tax,
            total: row.total,
            currency: row.currency,
            coupon_code: row.coupon_code,
            status: row.status.parse().map_err(|e| corrupt("status", e))?,
            payment_status: row.payment_status.parse().map_err(|e| corrupt("payment_status", e))?,
            payment_method: row.payment_method.parse().map_err(|e| corrupt("payment_method", e))?,
            gateway_order_id: row.gateway_order_id,
            transaction_id: row.transaction_id,
            gateway_response: row.gateway_response,
            shipping_address: row.shipping_address.0,
            billing_address: row.billing_address.0,
            notes: row.notes,
            cancel_reason: row.cancel_reason,
            cancelled_at: row.cancelled_at,
            shipped_at: row.shipped_at,
            delivered_at: row.delivered_at,
            return_reason: row.return_reason,
            returned_at: row.returned_at,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Raw row dari tabel order_items
#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    variant_id: Option<i64>,
    product_name: Option<String>,
    variant_label: Option<String>,
    sku: Option<String>,
    quantity: i32,
    unit_price: BigDecimal,
    line_total: BigDecimal,
    created_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            product_name: row.product_name,
            variant_label: row.variant_label,
            sku: row.sku,
            quantity: row.quantity,
            unit_price: row.unit_price,
            line_total: row.line_total,
            created_at: row.created_at,
        }
    }
}

fn into_orders(rows: Vec<OrderRow>) -> AppResult<Vec<Order>> {
    rows.into_iter().map(Order::try_from).collect()
}

/// Repository untuk order operations
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    /// Create new order repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert order row. A taken order_number surfaces as Conflict so the caller can retry.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        draft: &OrderDraft,
    ) -> AppResult<Order> {
        let sql = format!(
            r#"
            INSERT INTO orders (
                order_number, user_id, guest_session, customer_email, customer_phone,
                subtotal, discount, shipping, tax, total, currency, coupon_code,
                status, payment_status, payment_method, shipping_address, billing_address, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'pending', $14, $15, $16, $17)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );

        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(&draft.order_number)
            .bind(draft.user_id)
            .bind(&draft.guest_session)
            .bind(&draft.customer_email)
            .bind(&draft.customer_phone)
            .bind(&draft.totals.subtotal)
            .bind(&draft.totals.discount)
            .bind(&draft.totals.shipping)
            .bind(&draft.totals.tax)
            .bind(&draft.totals.total)
            .bind(&draft.currency)
            .bind(&draft.coupon_code)
            .bind(draft.status.as_str())
            .bind(draft.payment_method.as_str())
            .bind(Json(&draft.shipping_address))
            .bind(Json(&draft.billing_address))
            .bind(&draft.notes)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict(format!("Order number {} already taken", draft.order_number))
                } else {
                    AppError::from(e)
                }
            })?;

        Order::try_from(row)
    }

    /// Insert snapshot lines untuk order baru
    pub async fn insert_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
        items: &[DraftItem],
    ) -> AppResult<()> {
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, product_id, variant_id, product_name, variant_label, sku,
                    quantity, unit_price, line_total
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(order_id)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(&item.product_name)
            .bind(&item.variant_label)
            .bind(&item.sku)
            .bind(item.quantity)
            .bind(&item.unit_price)
            .bind(&item.line_total)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    pub async fn find_by_id(&self, order_id: i64) -> AppResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    /// Find order by order number
    pub async fn find_by_order_number(&self, order_number: &str) -> AppResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE order_number = $1", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    /// Resolve a gateway reference, current or from an earlier attempt
    pub async fn find_by_gateway_reference(&self, gateway_order_id: &str) -> AppResult<Option<Order>> {
        let sql = format!(
            r#"
            SELECT {} FROM orders o
            WHERE o.gateway_order_id = $1
               OR EXISTS (
                    SELECT 1 FROM payments p
                    WHERE p.order_id = o.id AND p.gateway_order_id = $1
               )
            ORDER BY o.id DESC
            LIMIT 1
            "#,
            ORDER_COLUMNS
        );

        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(gateway_order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    pub async fn items(&self, order_id: i64) -> AppResult<Vec<OrderItem>> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r#"
            SELECT id, order_id, product_id, variant_id, product_name, variant_label, sku,
                   quantity, unit_price, line_total, created_at
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    /// Items dibaca dalam transaction (untuk restock)
    pub async fn items_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
    ) -> AppResult<Vec<OrderItem>> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r#"
            SELECT id, order_id, product_id, variant_id, product_name, variant_label, sku,
                   quantity, unit_price, line_total, created_at
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    /// Paginated list dengan optional filters
    pub async fn list(&self, filter: &OrderFilter) -> AppResult<(Vec<Order>, i64)> {
        let limit = filter.limit.max(1) as i64;
        let offset = (filter.page.max(1) as i64 - 1) * limit;

        let where_clause = r#"
            WHERE ($1::BIGINT IS NULL OR user_id = $1)
              AND ($2::VARCHAR IS NULL OR status = $2)
              AND ($3::VARCHAR IS NULL OR payment_status = $3)
              AND ($4::VARCHAR IS NULL OR payment_method = $4)
              AND ($5 OR deleted_at IS NULL)
        "#;

        let sql = format!(
            "SELECT {} FROM orders {} ORDER BY created_at DESC, id DESC LIMIT $6 OFFSET $7",
            ORDER_COLUMNS, where_clause
        );

        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(filter.user_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.payment_status.map(|s| s.as_str()))
            .bind(filter.payment_method.map(|m| m.as_str()))
            .bind(filter.include_deleted)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS total FROM orders {}", where_clause))
            .bind(filter.user_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.payment_status.map(|s| s.as_str()))
            .bind(filter.payment_method.map(|m| m.as_str()))
            .bind(filter.include_deleted)
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        Ok((into_orders(rows)?, total))
    }

    /// Conditional update; returns false when the order moved in the meantime
    pub async fn apply_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        change: &OrderChange,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status           = $4,
                payment_status   = $5,
                cancel_reason    = COALESCE($6, cancel_reason),
                return_reason    = COALESCE($7, return_reason),
                cancelled_at     = COALESCE($8, cancelled_at),
                shipped_at       = COALESCE($9, shipped_at),
                delivered_at     = COALESCE($10, delivered_at),
                returned_at      = COALESCE($11, returned_at),
                transaction_id   = COALESCE($12, transaction_id),
                gateway_response = COALESCE($13, gateway_response),
                updated_at       = NOW()
            WHERE id = $1
              AND status = $2
              AND payment_status = $3
              AND deleted_at IS NULL
            "#,
        )
        .bind(change.order_id)
        .bind(change.expected_status.as_str())
        .bind(change.expected_payment_status.as_str())
        .bind(change.status.as_str())
        .bind(change.payment_status.as_str())
        .bind(&change.cancel_reason)
        .bind(&change.return_reason)
        .bind(change.cancelled_at)
        .bind(change.shipped_at)
        .bind(change.delivered_at)
        .bind(change.returned_at)
        .bind(&change.transaction_id)
        .bind(&change.gateway_response)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Simpan gateway reference dari attempt terakhir
    pub async fn set_gateway_order_id(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
        gateway_order_id: &str,
    ) -> AppResult<()> {
        sqlx::query("UPDATE orders SET gateway_order_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(gateway_order_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Lock row dan ambil status saat ini
    pub async fn lock_state(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
    ) -> AppResult<Option<(OrderStatus, PaymentStatus)>> {
        let row = sqlx::query(
            "SELECT status, payment_status FROM orders WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(|r| -> AppResult<(OrderStatus, PaymentStatus)> {
            let status: String = r.try_get("status")?;
            let payment_status: String = r.try_get("payment_status")?;
            Ok((
                status.parse().map_err(|e| corrupt("status", e))?,
                payment_status.parse().map_err(|e| corrupt("payment_status", e))?,
            ))
        })
        .transpose()
    }

    pub async fn soft_delete(&self, tx: &mut Transaction<'_, Postgres>, order_id: i64) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(order_id)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Counts per status and paid revenue untuk admin dashboard
    pub async fn stats(&self) -> AppResult<AdminOrderStats> {
        let mut stats = AdminOrderStats::default();

        let by_status = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM orders WHERE deleted_at IS NULL GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in by_status {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            stats.total_orders += count;
            stats.by_status.insert(status, count);
        }

        let by_payment = sqlx::query(
            "SELECT payment_status, COUNT(*) AS count FROM orders WHERE deleted_at IS NULL GROUP BY payment_status",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in by_payment {
            let status: String = row.try_get("payment_status")?;
            let count: i64 = row.try_get("count")?;
            stats.by_payment_status.insert(status, count);
        }

        let revenue: Option<BigDecimal> = sqlx::query(
            "SELECT SUM(total) AS revenue FROM orders WHERE deleted_at IS NULL AND payment_status = 'paid'",
        )
        .fetch_one(&self.pool)
        .await?
        .try_get("revenue")?;
        stats.paid_revenue = revenue.unwrap_or_else(|| BigDecimal::from(0));

        Ok(stats)
    }
}
