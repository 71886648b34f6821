// /saree-store/services/order-service/src/core/lifecycle.rs
// Customer dan admin transitions setelah checkout

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    config::AppConfig,
    core::{
        invoice::{build_invoice, Invoice, InvoiceInput, InvoiceLocale},
        transitions::{can_cancel, check_payment_change, check_status_change, holds_stock, stamp, PaymentChangeSource},
    },
    models::*,
    repository::OrderStore,
    utils::{
        error::{AppError, AppResult},
        validator::{validate_order_id, validate_order_number, validate_pagination, validate_string_length},
    },
};

fn actor_of(identity: &Identity) -> Actor {
    if identity.is_admin() {
        Actor::Admin
    } else {
        Actor::Customer
    }
}

/// Receipt reference untuk cash collected at the door
fn cod_transaction_id(order: &Order) -> String {
    format!("COD-{}", order.order_number)
}

fn cod_settlement(order: &Order, collected_by: Option<i64>) -> NewPayment {
    NewPayment {
        gateway: PaymentMethod::Cod,
        gateway_order_id: order.gateway_order_id.clone(),
        transaction_id: Some(cod_transaction_id(order)),
        amount: order.total.clone(),
        status: PaymentRecordStatus::Success,
        response: Some(serde_json::json!({
            "collected": true,
            "collected_by": collected_by,
        })),
    }
}

pub struct OrderLifecycle {
    store: Arc<dyn OrderStore>,
    config: Arc<AppConfig>,
}

impl OrderLifecycle {
    pub fn new(store: Arc<dyn OrderStore>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }

    /// Order yang boleh dilihat caller; others' orders read as missing
    pub async fn get_order(&self, identity: &Identity, order_id: i64) -> AppResult<OrderDetails> {
        validate_order_id(order_id)?;

        let details = self
            .store
            .order_details(order_id)
            .await?
            .filter(|d| d.order.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;

        if identity.is_admin() || details.order.is_owned_by(identity) {
            Ok(details)
        } else {
            Err(AppError::NotFound(format!("Order {} not found", order_id)))
        }
    }

    /// Order history of the signed-in customer
    pub async fn list_for_customer(
        &self,
        identity: &Identity,
        params: &OrderQueryParams,
    ) -> AppResult<(Vec<Order>, PaginationMeta)> {
        let user_id = identity
            .user_id()
            .ok_or_else(|| AppError::Unauthorized("Sign in to see your orders".to_string()))?;

        let (page, limit) = validate_pagination(params.page, params.limit)?;
        let filter = OrderFilter {
            user_id: Some(user_id),
            status: params.status.as_deref().map(str::parse).transpose()?,
            page,
            limit,
            ..Default::default()
        };

        let (orders, total) = self.store.list_orders(&filter).await?;
        Ok((orders, PaginationMeta::new(page, limit, total)))
    }

    pub async fn list_for_admin(&self, params: &OrderQueryParams) -> AppResult<(Vec<Order>, PaginationMeta)> {
        let (page, limit) = validate_pagination(params.page, params.limit)?;
        let filter = OrderFilter {
            user_id: None,
            status: params.status.as_deref().map(str::parse).transpose()?,
            payment_status: params.payment_status.as_deref().map(str::parse).transpose()?,
            payment_method: params.payment_method.as_deref().map(str::parse).transpose()?,
            page,
            limit,
            include_deleted: false,
        };

        let (orders, total) = self.store.list_orders(&filter).await?;
        Ok((orders, PaginationMeta::new(page, limit, total)))
    }

    /// Cancel before dispatch; reserved stock goes back and a paid order awaits refund
    pub async fn cancel(&self, identity: &Identity, order_id: i64, reason: &str) -> AppResult<OrderDetails> {
        let reason = validate_string_length(reason, "Cancellation reason", 3, 500)?;
        let details = self.get_order(identity, order_id).await?;
        let order = &details.order;

        if !can_cancel(order.status) {
            return Err(AppError::invalid_transition(order.status, OrderStatus::Cancelled));
        }

        let mut change = OrderChange::for_order(order);
        change.status = OrderStatus::Cancelled;
        change.cancel_reason = Some(reason.clone());
        change.restock = holds_stock(order.status);
        if order.payment_status == PaymentStatus::Paid {
            change.payment_status = PaymentStatus::RefundPending;
        }
        stamp(&mut change, Utc::now());
        change.history = Some(NewHistory {
            actor: actor_of(identity),
            updated_by: identity.user_id(),
            comments: Some(format!("Cancelled: {}", reason)),
        });

        let updated = self.apply(change).await?;
        tracing::info!(
            "Order {} cancelled by {:?} (payment {})",
            updated.order.order_number,
            actor_of(identity),
            updated.order.payment_status
        );
        Ok(updated)
    }

    /// Customer return request inside the return window
    pub async fn request_return(&self, identity: &Identity, order_id: i64, reason: &str) -> AppResult<OrderDetails> {
        let reason = validate_string_length(reason, "Return reason", 3, 500)?;
        let details = self.get_order(identity, order_id).await?;
        let order = &details.order;

        if order.status != OrderStatus::Delivered {
            return Err(AppError::invalid_transition(order.status, OrderStatus::ReturnRequested));
        }

        let delivered_at = order.delivered_at.unwrap_or(order.updated_at);
        if Utc::now() > delivered_at + Duration::days(self.config.return_window_days) {
            return Err(AppError::Validation(format!(
                "The {} day return window for order {} has closed",
                self.config.return_window_days, order.order_number
            )));
        }

        let mut change = OrderChange::for_order(order);
        change.status = OrderStatus::ReturnRequested;
        change.return_reason = Some(reason.clone());
        change.history = Some(NewHistory {
            actor: actor_of(identity),
            updated_by: identity.user_id(),
            comments: Some(format!("Return requested: {}", reason)),
        });

        self.apply(change).await
    }

    /// Admin status update; strict chain unless explicitly overridden
    pub async fn update_status(
        &self,
        admin: &Identity,
        order_id: i64,
        request: &UpdateStatusRequest,
    ) -> AppResult<OrderDetails> {
        let target: OrderStatus = request.status.parse()?;
        let details = self.get_order(admin, order_id).await?;
        let order = &details.order;

        let approval = check_status_change(order.status, target, request.force, request.comments.as_deref())?;

        let mut change = OrderChange::for_order(order);
        change.status = target;
        stamp(&mut change, Utc::now());
        let mut comments = approval.comment(request.comments.as_deref());

        match target {
            OrderStatus::Cancelled => {
                let reason = request
                    .comments
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| AppError::Validation("A cancellation reason is required".to_string()))?;
                change.cancel_reason = Some(reason.to_string());
                change.restock = holds_stock(order.status);
                if order.payment_status == PaymentStatus::Paid {
                    change.payment_status = PaymentStatus::RefundPending;
                }
            }
            OrderStatus::Returned => {
                change.restock = holds_stock(order.status);
                if order.payment_status == PaymentStatus::Paid {
                    change.payment_status = PaymentStatus::RefundPending;
                }
            }
            OrderStatus::Delivered
                if order.payment_method == PaymentMethod::Cod
                    && matches!(order.payment_status, PaymentStatus::Pending | PaymentStatus::Failed) =>
            {
                // delivery is the cash confirmation
                change.payment_status = PaymentStatus::Paid;
                change.transaction_id = Some(cod_transaction_id(order));
                change.payment = Some(cod_settlement(order, admin.user_id()));
                comments = Some(match comments {
                    Some(c) => format!("{} (cash collected)", c),
                    None => "Cash collected on delivery".to_string(),
                });
            }
            _ => {}
        }

        change.history = Some(NewHistory {
            actor: Actor::Admin,
            updated_by: admin.user_id(),
            comments,
        });

        let updated = self.apply(change).await?;
        tracing::info!(
            "Order {} status {} -> {} by admin {:?} ({:?})",
            updated.order.order_number,
            order.status,
            target,
            admin.user_id(),
            approval
        );
        Ok(updated)
    }

    /// Admin payment status update
    pub async fn update_payment_status(
        &self,
        admin: &Identity,
        order_id: i64,
        request: &UpdatePaymentRequest,
    ) -> AppResult<OrderDetails> {
        let target: PaymentStatus = request.payment_status.parse()?;
        let details = self.get_order(admin, order_id).await?;
        let order = &details.order;

        let approval = check_payment_change(
            order.payment_status,
            target,
            PaymentChangeSource::Admin,
            order.payment_method,
            request.force,
            request.comments.as_deref(),
        )?;

        let mut change = OrderChange::for_order(order);
        change.payment_status = target;
        if target == PaymentStatus::Paid {
            // only reachable for COD: cash collected
            change.transaction_id = Some(cod_transaction_id(order));
            change.payment = Some(cod_settlement(order, admin.user_id()));
        }
        change.history = Some(NewHistory {
            actor: Actor::Admin,
            updated_by: admin.user_id(),
            comments: approval.comment(request.comments.as_deref()),
        });

        let updated = self.apply(change).await?;
        tracing::info!(
            "Order {} payment {} -> {} by admin {:?}",
            updated.order.order_number,
            order.payment_status,
            target,
            admin.user_id()
        );
        Ok(updated)
    }

    /// Hide from customers, keep the audit trail
    pub async fn soft_delete(&self, admin: &Identity, order_id: i64) -> AppResult<()> {
        validate_order_id(order_id)?;
        self.store
            .soft_delete(
                order_id,
                &NewHistory {
                    actor: Actor::Admin,
                    updated_by: admin.user_id(),
                    comments: Some("Order deleted".to_string()),
                },
            )
            .await?;

        tracing::warn!("Order {} soft-deleted by admin {:?}", order_id, admin.user_id());
        Ok(())
    }

    /// Audit trail, oldest first; deleted orders included
    pub async fn history(&self, order_id: i64) -> AppResult<Vec<OrderStatusHistory>> {
        validate_order_id(order_id)?;
        if self.store.order_details(order_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Order {} not found", order_id)));
        }
        self.store.history(order_id).await
    }

    /// Public tracking, no PII
    pub async fn track(&self, order_number: &str) -> AppResult<TrackingView> {
        let order_number = validate_order_number(order_number)?;
        let order = self
            .store
            .order_by_number(order_number)
            .await?
            .filter(|o| o.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_number)))?;

        let timeline = self
            .store
            .history(order.id)
            .await?
            .into_iter()
            .filter(|h| h.old_status != Some(h.new_status))
            .map(|h| TrackingEvent {
                status: h.new_status,
                at: h.created_at,
            })
            .collect();

        Ok(TrackingView {
            order_number: order.order_number,
            status: order.status,
            payment_status: order.payment_status,
            placed_at: order.created_at,
            shipped_at: order.shipped_at,
            delivered_at: order.delivered_at,
            cancelled_at: order.cancelled_at,
            timeline,
        })
    }

    pub async fn invoice(&self, identity: &Identity, order_id: i64, params: &InvoiceQueryParams) -> AppResult<Invoice> {
        let locale = match params.locale.as_deref() {
            Some(raw) => raw.parse()?,
            None => InvoiceLocale::default(),
        };
        let details = self.get_order(identity, order_id).await?;

        Ok(build_invoice(&InvoiceInput::from(&details), locale, Utc::now()))
    }

    pub async fn stats(&self) -> AppResult<AdminOrderStats> {
        self.store.order_stats().await
    }

    async fn apply(&self, change: OrderChange) -> AppResult<OrderDetails> {
        match self.store.apply_change(&change).await? {
            ChangeOutcome::Applied(details) => Ok(details),
            ChangeOutcome::DuplicatePayment => Err(AppError::Conflict(format!(
                "Payment for order {} was already recorded",
                change.order_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{
            checkout::CheckoutService, payment::PaymentService, secrets::SecretStore, test_support::sample_address,
            transitions::OVERRIDE_PREFIX,
        },
        repository::memory::{MemoryStore, ProductRecord},
    };
    use bigdecimal::BigDecimal;

    struct Harness {
        store: Arc<MemoryStore>,
        checkout: CheckoutService,
        lifecycle: OrderLifecycle,
    }

    fn customer() -> Identity {
        Identity::User {
            id: 42,
            role: Role::Customer,
            email: None,
        }
    }

    fn admin() -> Identity {
        Identity::User {
            id: 1,
            role: Role::Admin,
            email: None,
        }
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_product(ProductRecord {
                id: 7,
                name: "Kanjivaram Silk Saree".to_string(),
                sku: None,
                price: BigDecimal::from(1000),
                discount_percent: BigDecimal::from(0),
                stock: 5,
                is_active: true,
            })
            .await;

        let config = Arc::new(AppConfig::default());
        let secrets = Arc::new(SecretStore::from_bytes([0u8; 32]));
        let payments = Arc::new(PaymentService::new(store.clone(), secrets, &config).unwrap());

        Harness {
            checkout: CheckoutService::new(store.clone(), payments, config.clone()),
            lifecycle: OrderLifecycle::new(store.clone(), config),
            store,
        }
    }

    async fn place_cod_order(h: &Harness) -> OrderDetails {
        h.store.add_to_cart(CartOwner::User(42), 7, None, 2).await;
        let request = CheckoutRequest {
            shipping_address: Some(sample_address()),
            shipping_address_id: None,
            billing_address: None,
            payment_method: "cod".to_string(),
            coupon_code: None,
            notes: None,
            email: None,
        };
        h.checkout.checkout(&customer(), request).await.unwrap().order
    }

    fn status_request(status: &str, comments: Option<&str>, force: bool) -> UpdateStatusRequest {
        UpdateStatusRequest {
            status: status.to_string(),
            comments: comments.map(str::to_string),
            force,
        }
    }

    async fn advance(h: &Harness, order_id: i64, statuses: &[&str]) -> OrderDetails {
        let mut last = None;
        for status in statuses {
            last = Some(
                h.lifecycle
                    .update_status(&admin(), order_id, &status_request(status, None, false))
                    .await
                    .unwrap(),
            );
        }
        last.unwrap()
    }

    #[tokio::test]
    async fn test_customer_cancel_restocks() {
        let h = harness().await;
        let order = place_cod_order(&h).await;
        assert_eq!(h.store.stock_of(7, None).await, 3);

        let cancelled = h.lifecycle.cancel(&customer(), order.order.id, "Ordered by mistake").await.unwrap();

        assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
        assert!(cancelled.order.cancelled_at.is_some());
        assert_eq!(cancelled.order.cancel_reason.as_deref(), Some("Ordered by mistake"));
        assert_eq!(h.store.stock_of(7, None).await, 5);
        assert!(cancelled.order.totals().is_consistent());

        let history = h.lifecycle.history(order.order.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].actor, Actor::Customer);
    }

    #[tokio::test]
    async fn test_cancel_after_shipped_rejected() {
        let h = harness().await;
        let order = place_cod_order(&h).await;
        advance(&h, order.order.id, &["confirmed", "packed", "shipped"]).await;

        let err = h.lifecycle.cancel(&customer(), order.order.id, "Too slow").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));

        let err = h
            .lifecycle
            .update_status(&admin(), order.order.id, &status_request("cancelled", Some("late"), true))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(h.store.stock_of(7, None).await, 3);
    }

    #[tokio::test]
    async fn test_delivered_to_placed_rejected_without_override() {
        let h = harness().await;
        let order = place_cod_order(&h).await;
        advance(
            &h,
            order.order.id,
            &["confirmed", "packed", "shipped", "out_for_delivery", "delivered"],
        )
        .await;

        let err = h
            .lifecycle
            .update_status(&admin(), order.order.id, &status_request("placed", None, false))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));

        let err = h
            .lifecycle
            .update_status(&admin(), order.order.id, &status_request("placed", None, true))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let overridden = h
            .lifecycle
            .update_status(&admin(), order.order.id, &status_request("placed", Some("courier mix-up"), true))
            .await
            .unwrap();
        assert_eq!(overridden.order.status, OrderStatus::Placed);

        let history = h.lifecycle.history(order.order.id).await.unwrap();
        let last = history.last().unwrap();
        assert!(last.comments.as_deref().unwrap().starts_with(OVERRIDE_PREFIX));
    }

    #[tokio::test]
    async fn test_cod_delivery_settles_payment() {
        let h = harness().await;
        let order = place_cod_order(&h).await;

        let delivered = advance(
            &h,
            order.order.id,
            &["confirmed", "packed", "shipped", "out_for_delivery", "delivered"],
        )
        .await;

        assert_eq!(delivered.order.payment_status, PaymentStatus::Paid);
        assert!(delivered.order.shipped_at.is_some());
        assert!(delivered.order.delivered_at.is_some());
        assert_eq!(
            delivered.order.transaction_id.as_deref(),
            Some(format!("COD-{}", delivered.order.order_number).as_str())
        );
        assert_eq!(delivered.payments.len(), 1);
        assert_eq!(delivered.payments[0].status, PaymentRecordStatus::Success);
        assert!(delivered.order.totals().is_consistent());

        let history = h.lifecycle.history(order.order.id).await.unwrap();
        assert_eq!(history.len(), 6);
    }

    #[tokio::test]
    async fn test_return_flow_restocks_and_flags_refund() {
        let h = harness().await;
        let order = place_cod_order(&h).await;
        advance(
            &h,
            order.order.id,
            &["confirmed", "packed", "shipped", "out_for_delivery", "delivered"],
        )
        .await;

        let requested = h
            .lifecycle
            .request_return(&customer(), order.order.id, "Colour differs from photo")
            .await
            .unwrap();
        assert_eq!(requested.order.status, OrderStatus::ReturnRequested);

        let returned = advance(&h, order.order.id, &["returned"]).await;
        assert_eq!(returned.order.status, OrderStatus::Returned);
        assert_eq!(returned.order.payment_status, PaymentStatus::RefundPending);
        assert!(returned.order.returned_at.is_some());
        assert_eq!(h.store.stock_of(7, None).await, 5);

        let refunded = h
            .lifecycle
            .update_payment_status(
                &admin(),
                order.order.id,
                &UpdatePaymentRequest {
                    payment_status: "refunded".to_string(),
                    comments: Some("UPI refund issued".to_string()),
                    force: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(refunded.order.payment_status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_return_requires_delivery() {
        let h = harness().await;
        let order = place_cod_order(&h).await;

        let err = h
            .lifecycle
            .request_return(&customer(), order.order.id, "Changed my mind")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_refund_needs_settled_payment() {
        let h = harness().await;
        let order = place_cod_order(&h).await;

        let err = h
            .lifecycle
            .update_payment_status(
                &admin(),
                order.order.id,
                &UpdatePaymentRequest {
                    payment_status: "refunded".to_string(),
                    comments: Some("forced".to_string()),
                    force: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_admin_marks_cod_cash_received() {
        let h = harness().await;
        let order = place_cod_order(&h).await;

        let paid = h
            .lifecycle
            .update_payment_status(
                &admin(),
                order.order.id,
                &UpdatePaymentRequest {
                    payment_status: "paid".to_string(),
                    comments: Some("Cash received at store".to_string()),
                    force: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(paid.order.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.payments[0].status, PaymentRecordStatus::Success);

        // later cancellation of a paid order waits for a refund
        let cancelled = h.lifecycle.cancel(&customer(), order.order.id, "No longer needed").await.unwrap();
        assert_eq!(cancelled.order.payment_status, PaymentStatus::RefundPending);
    }

    #[tokio::test]
    async fn test_other_customer_sees_not_found() {
        let h = harness().await;
        let order = place_cod_order(&h).await;
        let stranger = Identity::User {
            id: 99,
            role: Role::Customer,
            email: None,
        };

        let err = h.lifecycle.get_order(&stranger, order.order.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(h.lifecycle.get_order(&admin(), order.order.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_soft_delete_hides_order_keeps_history() {
        let h = harness().await;
        let order = place_cod_order(&h).await;

        h.lifecycle.soft_delete(&admin(), order.order.id).await.unwrap();

        let err = h.lifecycle.get_order(&customer(), order.order.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let (orders, meta) = h
            .lifecycle
            .list_for_customer(&customer(), &OrderQueryParams::default())
            .await
            .unwrap();
        assert!(orders.is_empty());
        assert_eq!(meta.total_items, 0);

        let history = h.lifecycle.history(order.order.id).await.unwrap();
        assert_eq!(history.len(), 2);

        let err = h.lifecycle.soft_delete(&admin(), order.order.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_tracking_timeline() {
        let h = harness().await;
        let order = place_cod_order(&h).await;
        advance(&h, order.order.id, &["confirmed", "packed"]).await;

        let view = h.lifecycle.track(&order.order.order_number).await.unwrap();
        let statuses: Vec<OrderStatus> = view.timeline.iter().map(|e| e.status).collect();

        assert_eq!(view.status, OrderStatus::Packed);
        assert_eq!(
            statuses,
            vec![OrderStatus::Placed, OrderStatus::Confirmed, OrderStatus::Packed]
        );
        assert!(h.lifecycle.track("ORD-20260101-ZZZZZZ").await.is_err());
    }

    #[tokio::test]
    async fn test_invoice_for_owner() {
        let h = harness().await;
        let order = place_cod_order(&h).await;

        let invoice = h
            .lifecycle
            .invoice(
                &customer(),
                order.order.id,
                &InvoiceQueryParams {
                    format: None,
                    locale: Some("en-IN".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(invoice.invoice_number, format!("INV-{}", order.order.order_number));
        assert_eq!(invoice.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_stats_count_orders() {
        let h = harness().await;
        place_cod_order(&h).await;

        let stats = h.lifecycle.stats().await.unwrap();
        assert_eq!(stats.total_orders, 1);
        assert_eq!(stats.by_status.get("placed"), Some(&1));
        assert_eq!(stats.paid_revenue, BigDecimal::from(0));
    }
}
