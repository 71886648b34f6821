// /saree-store/services/order-service/src/repository/payment.rs

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::{
    models::*,
    utils::error::{is_unique_violation, AppError, AppResult},
};

/// A taken transaction id means the callback was already recorded
fn duplicate_or_db(err: sqlx::Error) -> AppError {
    if is_unique_violation(&err) {
        AppError::Conflict("Transaction already recorded".to_string())
    } else {
        AppError::from(err)
    }
}

const PAYMENT_COLUMNS: &str =
    "id, order_id, gateway, gateway_order_id, transaction_id, amount, status, response, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    order_id: i64,
    gateway: String,
    gateway_order_id: Option<String>,
    transaction_id: Option<String>,
    amount: BigDecimal,
    status: String,
    response: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let bad = |e: AppError| AppError::Database(format!("Unreadable payment row {}: {}", row.id, e));

        Ok(Payment {
            id: row.id,
            order_id: row.order_id,
            gateway: row.gateway.parse().map_err(bad)?,
            gateway_order_id: row.gateway_order_id,
            transaction_id: row.transaction_id,
            amount: row.amount,
            status: row.status.parse().map_err(bad)?,
            response: row.response,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository untuk payment attempts
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Cek apakah transaction id sudah pernah dicatat
    pub async fn transaction_exists(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        transaction_id: &str,
    ) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 AS found FROM payments WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.is_some())
    }

    /// Upgrade the open attempt for this gateway reference in place.
    /// COD attempts carry no reference and match on the gateway alone.
    pub async fn settle_open_attempt(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
        payment: &NewPayment,
    ) -> AppResult<Option<i64>> {
        let row = sqlx::query(
            r#"
            UPDATE payments SET
                status         = $4,
                transaction_id = $5,
                response       = $6,
                updated_at     = NOW()
            WHERE id = (
                SELECT id FROM payments
                WHERE order_id = $1
                  AND gateway = $2
                  AND gateway_order_id IS NOT DISTINCT FROM $3
                  AND status IN ('pending', 'cod_pending')
                  AND transaction_id IS NULL
                ORDER BY id DESC
                LIMIT 1
                FOR UPDATE
            )
            RETURNING id
            "#,
        )
        .bind(order_id)
        .bind(payment.gateway.as_str())
        .bind(&payment.gateway_order_id)
        .bind(payment.status.as_str())
        .bind(&payment.transaction_id)
        .bind(&payment.response)
        .fetch_optional(&mut **tx)
        .await
        .map_err(duplicate_or_db)?;

        Ok(row.map(|r| r.try_get::<i64, _>("id")).transpose()?)
    }

    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
        payment: &NewPayment,
    ) -> AppResult<Payment> {
        let sql = format!(
            r#"
            INSERT INTO payments (order_id, gateway, gateway_order_id, transaction_id, amount, status, response)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        );

        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(order_id)
            .bind(payment.gateway.as_str())
            .bind(&payment.gateway_order_id)
            .bind(&payment.transaction_id)
            .bind(&payment.amount)
            .bind(payment.status.as_str())
            .bind(&payment.response)
            .fetch_one(&mut **tx)
            .await
            .map_err(duplicate_or_db)?;

        Payment::try_from(row)
    }

    /// Amount recorded when the gateway attempt was opened
    pub async fn attempt_amount(&self, order_id: i64, gateway_order_id: &str) -> AppResult<Option<BigDecimal>> {
        let row = sqlx::query(
            "SELECT amount FROM payments WHERE order_id = $1 AND gateway_order_id = $2 ORDER BY id LIMIT 1",
        )
        .bind(order_id)
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.try_get("amount")).transpose()?)
    }

    pub async fn for_order(&self, order_id: i64) -> AppResult<Vec<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE order_id = $1 ORDER BY id", PAYMENT_COLUMNS);
        let rows = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Payment::try_from).collect()
    }

    pub async fn count_failed(&self, order_id: i64) -> AppResult<i64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS failed FROM payments WHERE order_id = $1 AND status = 'failed'")
            .bind(order_id)
            .fetch_one(&self.pool)
            .await?
            .try_get("failed")?;
        Ok(count)
    }
}
