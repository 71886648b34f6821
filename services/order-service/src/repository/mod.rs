// /saree-store/services/order-service/src/repository/mod.rs

pub mod audit;
pub mod catalog;
pub mod memory;
pub mod order;
pub mod payment;
pub mod settings;

use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    models::*,
    utils::error::{AppError, AppResult},
};

/// Storage contract of the order workflow.
///
/// Every method that writes more than one row runs in a single transaction
/// on the backing store; nothing partial is ever visible.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn cart_lines(&self, owner: &CartOwner) -> AppResult<Vec<CartLine>>;

    async fn saved_address(&self, user_id: i64, address_id: i64) -> AppResult<Option<AddressSnapshot>>;

    async fn coupon(&self, code: &str) -> AppResult<Option<Coupon>>;

    /// Reserve stock, write order + items + first history row, clear the cart.
    /// Fails with `InsufficientStock` listing every short line, or `Conflict`
    /// when the order number is taken.
    async fn place_order(&self, draft: &OrderDraft) -> AppResult<OrderDetails>;

    /// Includes soft-deleted orders; callers decide visibility
    async fn order_details(&self, order_id: i64) -> AppResult<Option<OrderDetails>>;

    async fn order_by_number(&self, order_number: &str) -> AppResult<Option<Order>>;

    async fn order_by_gateway_reference(&self, gateway_order_id: &str) -> AppResult<Option<Order>>;

    async fn list_orders(&self, filter: &OrderFilter) -> AppResult<(Vec<Order>, i64)>;

    /// Apply a guarded change. `Conflict` when the order left the expected state.
    async fn apply_change(&self, change: &OrderChange) -> AppResult<ChangeOutcome>;

    async fn soft_delete(&self, order_id: i64, entry: &NewHistory) -> AppResult<()>;

    async fn history(&self, order_id: i64) -> AppResult<Vec<OrderStatusHistory>>;

    /// Record a new gateway attempt and remember its reference on the order
    async fn record_initiation(&self, order_id: i64, payment: &NewPayment) -> AppResult<Payment>;

    async fn attempt_amount(&self, order_id: i64, gateway_order_id: &str) -> AppResult<Option<BigDecimal>>;

    async fn failed_payment_count(&self, order_id: i64) -> AppResult<i64>;

    async fn payment_settings(&self) -> AppResult<Vec<StoredGatewaySetting>>;

    async fn payment_setting(&self, gateway: PaymentMethod) -> AppResult<Option<StoredGatewaySetting>>;

    async fn save_payment_setting(&self, setting: &StoredGatewaySetting) -> AppResult<StoredGatewaySetting>;

    async fn order_stats(&self) -> AppResult<AdminOrderStats>;

    async fn ping(&self) -> AppResult<()>;
}

/// Postgres store yang menggabungkan semua repositories
pub struct Repository {
    pub pool: PgPool,
    order_repo: Arc<order::OrderRepository>,
    payment_repo: Arc<payment::PaymentRepository>,
    audit_repo: Arc<audit::AuditRepository>,
    catalog_repo: Arc<catalog::CatalogRepository>,
    settings_repo: Arc<settings::SettingsRepository>,
}

impl Repository {
    /// Create new repository instance
    pub fn new(pool: PgPool) -> Self {
        Self {
            order_repo: Arc::new(order::OrderRepository::new(pool.clone())),
            payment_repo: Arc::new(payment::PaymentRepository::new(pool.clone())),
            audit_repo: Arc::new(audit::AuditRepository::new(pool.clone())),
            catalog_repo: Arc::new(catalog::CatalogRepository::new(pool.clone())),
            settings_repo: Arc::new(settings::SettingsRepository::new(pool.clone())),
            pool,
        }
    }

    pub fn order(&self) -> &order::OrderRepository {
        &self.order_repo
    }

    pub fn payment(&self) -> &payment::PaymentRepository {
        &self.payment_repo
    }

    pub fn audit(&self) -> &audit::AuditRepository {
        &self.audit_repo
    }

    pub fn catalog(&self) -> &catalog::CatalogRepository {
        &self.catalog_repo
    }

    pub fn settings(&self) -> &settings::SettingsRepository {
        &self.settings_repo
    }

    /// Begin database transaction
    pub async fn begin_transaction(&self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    async fn reload(&self, order_id: i64) -> AppResult<OrderDetails> {
        self.order_details(order_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Order {} vanished after commit", order_id)))
    }
}

#[async_trait]
impl OrderStore for Repository {
    async fn cart_lines(&self, owner: &CartOwner) -> AppResult<Vec<CartLine>> {
        self.catalog().cart_lines(owner).await
    }

    async fn saved_address(&self, user_id: i64, address_id: i64) -> AppResult<Option<AddressSnapshot>> {
        self.catalog().saved_address(user_id, address_id).await
    }

    async fn coupon(&self, code: &str) -> AppResult<Option<Coupon>> {
        self.catalog().coupon(code).await
    }

    async fn place_order(&self, draft: &OrderDraft) -> AppResult<OrderDetails> {
        let mut tx = self.begin_transaction().await?;

        // attempt every line so the error names all short items
        let mut shortfalls = Vec::new();
        for item in &draft.items {
            let reserved = self
                .catalog()
                .decrement_stock(&mut tx, item.product_id, item.variant_id, item.quantity)
                .await?;
            if !reserved {
                let available = self
                    .catalog()
                    .current_stock(&mut tx, item.product_id, item.variant_id)
                    .await?;
                shortfalls.push(StockShortfall {
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                    name: item.product_name.clone(),
                    requested: item.quantity,
                    available,
                });
            }
        }

        if !shortfalls.is_empty() {
            tx.rollback().await?;
            return Err(AppError::InsufficientStock(shortfalls));
        }

        let order = self.order().insert(&mut tx, draft).await?;
        self.order().insert_items(&mut tx, order.id, &draft.items).await?;

        self.audit()
            .log_transition(
                &mut tx,
                order.id,
                None,
                order.status,
                None,
                order.payment_status,
                &NewHistory {
                    actor: draft.actor,
                    updated_by: draft.user_id,
                    comments: Some("Order placed".to_string()),
                },
            )
            .await?;

        self.catalog().clear_cart(&mut tx, &draft.cart_owner).await?;
        tx.commit().await?;

        self.reload(order.id).await
    }

    async fn order_details(&self, order_id: i64) -> AppResult<Option<OrderDetails>> {
        let Some(order) = self.order().find_by_id(order_id).await? else {
            return Ok(None);
        };

        let items = self.order().items(order.id).await?;
        let payments = self.payment().for_order(order.id).await?;

        Ok(Some(OrderDetails { order, items, payments }))
    }

    async fn order_by_number(&self, order_number: &str) -> AppResult<Option<Order>> {
        self.order().find_by_order_number(order_number).await
    }

    async fn order_by_gateway_reference(&self, gateway_order_id: &str) -> AppResult<Option<Order>> {
        self.order().find_by_gateway_reference(gateway_order_id).await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> AppResult<(Vec<Order>, i64)> {
        self.order().list(filter).await
    }

    async fn apply_change(&self, change: &OrderChange) -> AppResult<ChangeOutcome> {
        let mut tx = self.begin_transaction().await?;

        if let Some(payment) = &change.payment {
            if let Some(transaction_id) = &payment.transaction_id {
                if self.payment().transaction_exists(&mut tx, transaction_id).await? {
                    tx.rollback().await?;
                    return Ok(ChangeOutcome::DuplicatePayment);
                }
            }

            let upgraded = match self.payment().settle_open_attempt(&mut tx, change.order_id, payment).await {
                Ok(id) => id,
                Err(AppError::Conflict(_)) => return Ok(ChangeOutcome::DuplicatePayment),
                Err(e) => return Err(e),
            };

            if upgraded.is_none() {
                match self.payment().insert(&mut tx, change.order_id, payment).await {
                    Ok(_) => {}
                    Err(AppError::Conflict(_)) => return Ok(ChangeOutcome::DuplicatePayment),
                    Err(e) => return Err(e),
                }
            }
        }

        if !self.order().apply_update(&mut tx, change).await? {
            return Err(AppError::Conflict(format!(
                "Order {} was modified concurrently",
                change.order_id
            )));
        }

        if change.restock {
            let items = self.order().items_tx(&mut tx, change.order_id).await?;
            self.catalog().restock(&mut tx, &items).await?;
        }

        if let Some(entry) = &change.history {
            self.audit()
                .log_transition(
                    &mut tx,
                    change.order_id,
                    Some(change.expected_status),
                    change.status,
                    Some(change.expected_payment_status),
                    change.payment_status,
                    entry,
                )
                .await?;
        }

        tx.commit().await?;

        Ok(ChangeOutcome::Applied(self.reload(change.order_id).await?))
    }

    async fn soft_delete(&self, order_id: i64, entry: &NewHistory) -> AppResult<()> {
        let mut tx = self.begin_transaction().await?;

        let (status, payment_status) = self
            .order()
            .lock_state(&mut tx, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;

        if !self.order().soft_delete(&mut tx, order_id).await? {
            return Err(AppError::NotFound(format!("Order {} not found", order_id)));
        }

        self.audit()
            .log_transition(
                &mut tx,
                order_id,
                Some(status),
                status,
                Some(payment_status),
                payment_status,
                entry,
            )
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn history(&self, order_id: i64) -> AppResult<Vec<OrderStatusHistory>> {
        self.audit().for_order(order_id).await
    }

    async fn record_initiation(&self, order_id: i64, payment: &NewPayment) -> AppResult<Payment> {
        let mut tx = self.begin_transaction().await?;

        let recorded = self.payment().insert(&mut tx, order_id, payment).await?;
        if let Some(gateway_order_id) = &payment.gateway_order_id {
            self.order()
                .set_gateway_order_id(&mut tx, order_id, gateway_order_id)
                .await?;
        }

        tx.commit().await?;
        Ok(recorded)
    }

    async fn attempt_amount(&self, order_id: i64, gateway_order_id: &str) -> AppResult<Option<BigDecimal>> {
        self.payment().attempt_amount(order_id, gateway_order_id).await
    }

    async fn failed_payment_count(&self, order_id: i64) -> AppResult<i64> {
        self.payment().count_failed(order_id).await
    }

    async fn payment_settings(&self) -> AppResult<Vec<StoredGatewaySetting>> {
        self.settings().all().await
    }

    async fn payment_setting(&self, gateway: PaymentMethod) -> AppResult<Option<StoredGatewaySetting>> {
        self.settings().get(gateway).await
    }

    async fn save_payment_setting(&self, setting: &StoredGatewaySetting) -> AppResult<StoredGatewaySetting> {
        self.settings().upsert(setting).await
    }

    async fn order_stats(&self) -> AppResult<AdminOrderStats> {
        self.order().stats().await
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
