// /saree-store/services/order-service/src/repository/audit.rs

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    models::*,
    utils::error::{AppError, AppResult},
};

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    order_id: i64,
    old_status: Option<String>,
    new_status: String,
    old_payment_status: Option<String>,
    new_payment_status: String,
    updated_by: Option<i64>,
    actor: String,
    comments: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for OrderStatusHistory {
    type Error = AppError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let bad = |e: AppError| AppError::Database(format!("Unreadable history row {}: {}", row.id, e));

        Ok(OrderStatusHistory {
            id: row.id,
            order_id: row.order_id,
            old_status: row.old_status.as_deref().map(str::parse::<OrderStatus>).transpose().map_err(bad)?,
            new_status: row.new_status.parse().map_err(bad)?,
            old_payment_status: row.old_payment_status.as_deref().map(str::parse::<PaymentStatus>).transpose().map_err(bad)?,
            new_payment_status: row.new_payment_status.parse().map_err(bad)?,
            updated_by: row.updated_by,
            actor: row.actor.parse().map_err(bad)?,
            comments: row.comments,
            created_at: row.created_at,
        })
    }
}

/// Append-only status history (audit trail order)
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    /// Create new audit repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append satu history row
    #[allow(clippy::too_many_arguments)]
    pub async fn log_transition(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
        old_status: Option<OrderStatus>,
        new_status: OrderStatus,
        old_payment_status: Option<PaymentStatus>,
        new_payment_status: PaymentStatus,
        entry: &NewHistory,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_status_history (
                order_id, old_status, new_status, old_payment_status, new_payment_status,
                updated_by, actor, comments
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order_id)
        .bind(old_status.map(|s| s.as_str()))
        .bind(new_status.as_str())
        .bind(old_payment_status.map(|s| s.as_str()))
        .bind(new_payment_status.as_str())
        .bind(entry.updated_by)
        .bind(entry.actor.as_str())
        .bind(&entry.comments)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Audit trail untuk satu order, oldest first
    pub async fn for_order(&self, order_id: i64) -> AppResult<Vec<OrderStatusHistory>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, order_id, old_status, new_status, old_payment_status, new_payment_status,
                   updated_by, actor, comments, created_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderStatusHistory::try_from).collect()
    }
}
