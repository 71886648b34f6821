// /saree-store/services/order-service/src/core/payment.rs

use std::sync::Arc;

use crate::{
    config::AppConfig,
    core::{
        gateway::{build_gateway, GatewayContext, PaymentGateway},
        pricing::round_money,
        secrets::{GatewayCredentials, SecretStore},
        transitions::{check_payment_change, PaymentChangeSource},
    },
    models::*,
    repository::OrderStore,
    utils::error::{AppError, AppResult},
};

/// Optimistic retries when a callback races another writer on the same order
const MAX_RECONCILE_ATTEMPTS: usize = 3;

// Service untuk payment initiation dan reconciliation
pub struct PaymentService {
    store: Arc<dyn OrderStore>,
    secrets: Arc<SecretStore>,
    gateway_ctx: GatewayContext,
    max_payment_failures: u32,
}

impl PaymentService {
    pub fn new(store: Arc<dyn OrderStore>, secrets: Arc<SecretStore>, config: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            store,
            secrets,
            gateway_ctx: GatewayContext::from_config(config)?,
            max_payment_failures: config.max_payment_failures,
        })
    }

    /// Enabled gateways, sanitized untuk storefront
    pub async fn methods(&self) -> AppResult<Vec<PaymentMethodView>> {
        Ok(self
            .store
            .payment_settings()
            .await?
            .into_iter()
            .filter(|s| s.enabled)
            .map(|s| PaymentMethodView {
                method: s.gateway,
                display_name: s.display_name,
                public_key: s.public_key,
                sandbox: s.sandbox,
            })
            .collect())
    }

    pub async fn ensure_enabled(&self, method: PaymentMethod) -> AppResult<()> {
        match self.store.payment_setting(method).await? {
            Some(setting) if setting.enabled => Ok(()),
            _ => Err(AppError::Validation(format!(
                "Payment method {} is not available",
                method.display_name()
            ))),
        }
    }

    /// Open credentials and build the client for one call; plain secrets are
    /// dropped (and zeroized) with the returned client.
    async fn gateway_for(&self, method: PaymentMethod, require_enabled: bool) -> AppResult<Box<dyn PaymentGateway>> {
        let setting = self
            .store
            .payment_setting(method)
            .await?
            .ok_or_else(|| AppError::Validation(format!("Payment method {} is not configured", method)))?;

        if require_enabled && !setting.enabled {
            return Err(AppError::Validation(format!(
                "Payment method {} is not available",
                method.display_name()
            )));
        }

        let credentials = match (&setting.sealed_credentials, method) {
            (Some(sealed), _) => self.secrets.open_credentials(sealed)?,
            (None, PaymentMethod::Cod) => GatewayCredentials::Cod,
            (None, _) => {
                return Err(AppError::Configuration(format!("No credentials stored for {}", method)));
            }
        };

        if credentials.method() != method {
            return Err(AppError::Configuration(format!(
                "Stored credentials for {} belong to {}",
                method,
                credentials.method()
            )));
        }

        Ok(build_gateway(&credentials, setting.sandbox, &self.gateway_ctx))
    }

    /// Start a payment attempt for an order and record it
    pub async fn initiate(&self, details: &OrderDetails) -> AppResult<PaymentIntent> {
        let order = &details.order;

        if order.payment_status.is_settled() {
            return Err(AppError::Conflict(format!("Order {} is already paid", order.order_number)));
        }
        if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Returned) {
            return Err(AppError::Validation(format!(
                "Order {} is {} and cannot be paid",
                order.order_number, order.status
            )));
        }

        let gateway = self.gateway_for(order.payment_method, true).await?;
        let intent = gateway.initiate(order).await?;

        let already_open = order.payment_method == PaymentMethod::Cod
            && details.payments.iter().any(|p| p.status == PaymentRecordStatus::CodPending);

        if !already_open {
            self.store
                .record_initiation(
                    order.id,
                    &NewPayment {
                        gateway: order.payment_method,
                        gateway_order_id: intent.gateway_order_id.clone(),
                        transaction_id: None,
                        amount: order.total.clone(),
                        status: if order.payment_method == PaymentMethod::Cod {
                            PaymentRecordStatus::CodPending
                        } else {
                            PaymentRecordStatus::Pending
                        },
                        response: Some(intent.payload.clone()),
                    },
                )
                .await?;
        }

        tracing::info!(
            gateway = %order.payment_method,
            "Payment initiated for order {} (reference {:?})",
            order.order_number,
            intent.gateway_order_id
        );

        Ok(intent)
    }

    /// Customer-triggered (re)initiation
    pub async fn retry_payment(&self, identity: &Identity, order_id: i64) -> AppResult<PaymentIntent> {
        let details = self.owned_details(identity, order_id).await?;
        self.initiate(&details).await
    }

    /// Verify a gateway callback and apply its outcome
    pub async fn reconcile(&self, callback: GatewayCallback) -> AppResult<OrderDetails> {
        let method = match &callback {
            GatewayCallback::Razorpay { .. } => PaymentMethod::Razorpay,
            GatewayCallback::Phonepe { .. } => PaymentMethod::Phonepe,
            GatewayCallback::Paytm(_) => PaymentMethod::Paytm,
            GatewayCallback::Cod { .. } => PaymentMethod::Cod,
        };

        let gateway = self.gateway_for(method, false).await?;
        let verified = gateway.verify(&callback).map_err(|e| {
            tracing::warn!(gateway = %method, "Callback rejected: {}", e);
            e
        })?;

        self.settle(method, verified).await
    }

    /// On-demand PhonePe status check for an order
    pub async fn phonepe_status(&self, identity: &Identity, order_id: i64) -> AppResult<OrderDetails> {
        let details = self.owned_details(identity, order_id).await?;
        if details.order.payment_method != PaymentMethod::Phonepe {
            return Err(AppError::Validation("Order was not paid with PhonePe".to_string()));
        }

        let gateway_order_id = details
            .order
            .gateway_order_id
            .clone()
            .ok_or_else(|| AppError::Validation("No PhonePe payment was started for this order".to_string()))?;

        let gateway = self.gateway_for(PaymentMethod::Phonepe, false).await?;
        let verified = gateway.check_status(&gateway_order_id).await?;

        self.settle(PaymentMethod::Phonepe, verified).await
    }

    /// COD degenerate verification
    pub async fn cod_confirm(&self, order_number: &str) -> AppResult<OrderDetails> {
        self.reconcile(GatewayCallback::Cod {
            order_number: order_number.to_string(),
        })
        .await
    }

    async fn owned_details(&self, identity: &Identity, order_id: i64) -> AppResult<OrderDetails> {
        let details = self
            .store
            .order_details(order_id)
            .await?
            .filter(|d| d.order.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;

        if !identity.is_admin() && !details.order.is_owned_by(identity) {
            return Err(AppError::NotFound(format!("Order {} not found", order_id)));
        }

        Ok(details)
    }

    async fn resolve(&self, reference: &OrderReference) -> AppResult<Order> {
        let order = match reference {
            OrderReference::GatewayOrderId(gid) => self.store.order_by_gateway_reference(gid).await?,
            OrderReference::OrderNumber(number) => self.store.order_by_number(number).await?,
        };

        order
            .filter(|o| o.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("No order for payment reference {:?}", reference)))
    }

    /// Apply a verified gateway result to its order
    async fn settle(&self, method: PaymentMethod, verified: VerifiedPayment) -> AppResult<OrderDetails> {
        let order = self.resolve(&verified.reference).await?;

        if order.payment_method != method {
            return Err(AppError::PaymentVerification(format!(
                "Order {} was not placed with {}",
                order.order_number, method
            )));
        }

        let gateway_order_id = match &verified.reference {
            OrderReference::GatewayOrderId(gid) => Some(gid.clone()),
            OrderReference::OrderNumber(_) => order.gateway_order_id.clone(),
        };

        if verified.outcome == PaymentOutcome::Success {
            self.check_amount(&order, gateway_order_id.as_deref(), &verified).await?;
        }

        let order_id = order.id;
        for attempt in 1..=MAX_RECONCILE_ATTEMPTS {
            let details = self
                .store
                .order_details(order_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;

            let Some(change) = self.change_for(&details, method, gateway_order_id.as_deref(), &verified).await? else {
                return Ok(details);
            };

            match self.store.apply_change(&change).await {
                Ok(ChangeOutcome::Applied(updated)) => {
                    tracing::info!(
                        gateway = %method,
                        "Order {} reconciled: {:?} -> payment {}",
                        updated.order.order_number,
                        verified.outcome,
                        updated.order.payment_status
                    );
                    return Ok(updated);
                }
                Ok(ChangeOutcome::DuplicatePayment) => {
                    tracing::info!(
                        gateway = %method,
                        "Replayed callback for order {} ignored",
                        details.order.order_number
                    );
                    return Ok(details);
                }
                Err(AppError::Conflict(msg)) if attempt < MAX_RECONCILE_ATTEMPTS => {
                    tracing::debug!("Reconcile attempt {} lost a race: {}", attempt, msg);
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Conflict(format!("Order {} is being updated, try again", order_id)))
    }

    /// Gateway amount (or the amount the attempt was opened with) must match the order total
    async fn check_amount(
        &self,
        order: &Order,
        gateway_order_id: Option<&str>,
        verified: &VerifiedPayment,
    ) -> AppResult<()> {
        let reported = match (&verified.amount, gateway_order_id) {
            (Some(amount), _) => amount.clone(),
            (None, Some(gid)) => self.store.attempt_amount(order.id, gid).await?.ok_or_else(|| {
                AppError::PaymentVerification(format!("Unknown payment attempt {}", gid))
            })?,
            (None, None) => order.total.clone(),
        };

        if round_money(&reported) != round_money(&order.total) {
            tracing::warn!(
                "Amount mismatch on order {}: gateway {} vs total {}",
                order.order_number,
                reported,
                order.total
            );
            return Err(AppError::PaymentVerification(format!(
                "Paid amount {} does not match order total {}",
                reported, order.total
            )));
        }

        Ok(())
    }

    /// Build the change a verified result asks for; None when nothing is left to do
    async fn change_for(
        &self,
        details: &OrderDetails,
        method: PaymentMethod,
        gateway_order_id: Option<&str>,
        verified: &VerifiedPayment,
    ) -> AppResult<Option<OrderChange>> {
        let order = &details.order;
        let mut change = OrderChange::for_order(order);
        let payment = NewPayment {
            gateway: method,
            gateway_order_id: gateway_order_id.map(str::to_string),
            transaction_id: verified.transaction_id.clone(),
            amount: order.total.clone(),
            status: PaymentRecordStatus::Pending,
            response: Some(verified.raw_response.clone()),
        };

        match verified.outcome {
            PaymentOutcome::Pending => Ok(None),

            PaymentOutcome::Success => {
                if order.payment_status.is_settled() {
                    if order.transaction_id.is_some() && order.transaction_id == verified.transaction_id {
                        return Ok(None);
                    }
                    // second capture on a settled order, keep the evidence only
                    tracing::warn!(
                        gateway = %method,
                        "Order {} is already {}, recording extra payment {:?}",
                        order.order_number,
                        order.payment_status,
                        verified.transaction_id
                    );
                    change.payment = Some(NewPayment {
                        status: PaymentRecordStatus::Success,
                        ..payment
                    });
                    return Ok(Some(change));
                }

                change.transaction_id = verified.transaction_id.clone();
                change.gateway_response = Some(verified.raw_response.clone());
                change.payment = Some(NewPayment {
                    status: PaymentRecordStatus::Success,
                    ..payment
                });

                // uang masuk setelah order ditutup, stock sudah dikembalikan
                if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Returned) {
                    tracing::warn!(
                        gateway = %method,
                        "Order {} is {} but payment {:?} was captured, refund required",
                        order.order_number,
                        order.status,
                        verified.transaction_id
                    );
                    change.payment_status = PaymentStatus::RefundPending;
                    change.history = Some(NewHistory {
                        actor: Actor::Gateway,
                        updated_by: None,
                        comments: Some(format!(
                            "Payment captured via {} after {}, refund required",
                            method, order.status
                        )),
                    });
                    return Ok(Some(change));
                }

                check_payment_change(
                    order.payment_status,
                    PaymentStatus::Paid,
                    PaymentChangeSource::Verification,
                    method,
                    false,
                    None,
                )?;

                change.payment_status = PaymentStatus::Paid;
                if order.status == OrderStatus::Pending {
                    change.status = OrderStatus::Placed;
                }
                change.history = Some(NewHistory {
                    actor: Actor::Gateway,
                    updated_by: None,
                    comments: Some(format!(
                        "Payment verified via {} ({})",
                        method,
                        verified.transaction_id.as_deref().unwrap_or("no transaction id")
                    )),
                });
                Ok(Some(change))
            }

            PaymentOutcome::Failed => {
                // tanpa transaction id tiap failure dihitung sebagai attempt baru
                let replayed = verified.transaction_id.is_some()
                    && details.payments.iter().any(|p| {
                        p.status == PaymentRecordStatus::Failed
                            && p.gateway_order_id.as_deref() == gateway_order_id
                            && p.transaction_id == verified.transaction_id
                    });
                if replayed {
                    return Ok(None);
                }

                change.payment = Some(NewPayment {
                    status: PaymentRecordStatus::Failed,
                    ..payment
                });

                let failures = self.store.failed_payment_count(order.id).await? + 1;
                if order.payment_status == PaymentStatus::Pending && failures >= i64::from(self.max_payment_failures) {
                    check_payment_change(
                        order.payment_status,
                        PaymentStatus::Failed,
                        PaymentChangeSource::Verification,
                        method,
                        false,
                        None,
                    )?;
                    change.payment_status = PaymentStatus::Failed;
                    change.gateway_response = Some(verified.raw_response.clone());
                    change.history = Some(NewHistory {
                        actor: Actor::Gateway,
                        updated_by: None,
                        comments: Some(format!("{} failed payment attempts via {}", failures, method)),
                    });
                }

                tracing::warn!(
                    gateway = %method,
                    "Payment attempt {} failed for order {}",
                    failures,
                    order.order_number
                );
                Ok(Some(change))
            }
        }
    }

    /// Admin view of every stored gateway setting
    pub async fn settings(&self) -> AppResult<Vec<PaymentSettingView>> {
        Ok(self
            .store
            .payment_settings()
            .await?
            .iter()
            .map(PaymentSettingView::from)
            .collect())
    }

    /// Admin: enable/disable a gateway and rotate its sealed credentials
    pub async fn save_setting(
        &self,
        gateway: PaymentMethod,
        request: PaymentSettingRequest,
    ) -> AppResult<PaymentSettingView> {
        let existing = self.store.payment_setting(gateway).await?;

        let (sealed_credentials, public_key) = match &request.credentials {
            Some(credentials) => {
                if credentials.method() != gateway {
                    return Err(AppError::Validation(format!(
                        "Credentials are for {}, not {}",
                        credentials.method(),
                        gateway
                    )));
                }
                match credentials {
                    GatewayCredentials::Cod => (None, None),
                    other => (Some(self.secrets.seal_credentials(other)?), other.public_key()),
                }
            }
            None => (
                existing.as_ref().and_then(|s| s.sealed_credentials.clone()),
                existing.as_ref().and_then(|s| s.public_key.clone()),
            ),
        };

        if request.enabled && gateway != PaymentMethod::Cod && sealed_credentials.is_none() {
            return Err(AppError::Validation(format!(
                "Credentials are required before {} can be enabled",
                gateway.display_name()
            )));
        }

        let display_name = request
            .display_name
            .clone()
            .or_else(|| existing.as_ref().map(|s| s.display_name.clone()))
            .unwrap_or_else(|| gateway.display_name().to_string());

        let saved = self
            .store
            .save_payment_setting(&StoredGatewaySetting {
                gateway,
                enabled: request.enabled,
                display_name,
                sandbox: request.sandbox,
                sealed_credentials,
                public_key,
                updated_at: chrono::Utc::now(),
            })
            .await?;

        tracing::info!(
            gateway = %gateway,
            "Payment setting updated (enabled: {}, sandbox: {}, credentials rotated: {})",
            saved.enabled,
            saved.sandbox,
            request.credentials.is_some()
        );

        Ok(PaymentSettingView::from(&saved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{
            checkout::CheckoutService,
            lifecycle::OrderLifecycle,
            gateway::{hmac_sha256_hex, paytm::PaytmClient, paytm::CHECKSUM_FIELD},
            test_support::sample_address,
        },
        repository::memory::{MemoryStore, ProductRecord},
    };
    use bigdecimal::BigDecimal;
    use std::{
        collections::BTreeMap,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    const RZP_SECRET: &str = "rzp_test_secret";
    const PAYTM_MID: &str = "SAREE00112233";
    const PAYTM_KEY: &str = "kbzk1DSbJiV_O3p5";

    struct Harness {
        store: Arc<MemoryStore>,
        payments: Arc<PaymentService>,
        checkout: CheckoutService,
        config: AppConfig,
    }

    fn customer() -> Identity {
        Identity::User {
            id: 42,
            role: Role::Customer,
            email: None,
        }
    }

    async fn harness(razorpay_base: &str) -> Harness {
        let mut config = AppConfig::default();
        config.gateway_endpoints.razorpay = razorpay_base.to_string();
        harness_with(config).await
    }

    async fn harness_with(config: AppConfig) -> Harness {
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

        let config = Arc::new(config);

        let secrets = Arc::new(SecretStore::from_bytes([0u8; 32]));
        let payments = Arc::new(PaymentService::new(store.clone(), secrets, &config).unwrap());

        payments
            .save_setting(
                PaymentMethod::Razorpay,
                PaymentSettingRequest {
                    enabled: true,
                    display_name: None,
                    sandbox: true,
                    credentials: Some(GatewayCredentials::Razorpay {
                        key_id: "rzp_test_key".to_string(),
                        key_secret: RZP_SECRET.to_string(),
                    }),
                },
            )
            .await
            .unwrap();
        payments
            .save_setting(
                PaymentMethod::Paytm,
                PaymentSettingRequest {
                    enabled: true,
                    display_name: None,
                    sandbox: false,
                    credentials: Some(GatewayCredentials::Paytm {
                        merchant_id: PAYTM_MID.to_string(),
                        merchant_key: PAYTM_KEY.to_string(),
                        website: "DEFAULT".to_string(),
                    }),
                },
            )
            .await
            .unwrap();

        Harness {
            checkout: CheckoutService::new(store.clone(), payments.clone(), config.clone()),
            config: (*config).clone(),
            store,
            payments,
        }
    }

    async fn place(h: &Harness, method: &str) -> CheckoutResult {
        h.store.add_to_cart(CartOwner::User(42), 7, None, 2).await;
        h.checkout
            .checkout(
                &customer(),
                CheckoutRequest {
                    shipping_address: Some(sample_address()),
                    shipping_address_id: None,
                    billing_address: None,
                    payment_method: method.to_string(),
                    coupon_code: None,
                    notes: None,
                    email: None,
                },
            )
            .await
            .unwrap()
    }

    async fn razorpay_server() -> (mockito::ServerGuard, mockito::Mock) {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/orders")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"order_NXp1","amount":209900,"currency":"INR","status":"created"}"#)
            .create_async()
            .await;
        (server, mock)
    }

    fn razorpay_callback(payment_id: &str, secret: &str) -> GatewayCallback {
        GatewayCallback::Razorpay {
            razorpay_order_id: "order_NXp1".to_string(),
            razorpay_payment_id: payment_id.to_string(),
            razorpay_signature: hmac_sha256_hex(secret, &format!("order_NXp1|{}", payment_id)).unwrap(),
        }
    }

    fn paytm_callback(h: &Harness, order_number: &str, txn_id: &str, status: &str, amount: &str) -> GatewayCallback {
        let paytm = PaytmClient::new(
            PAYTM_MID.to_string(),
            PAYTM_KEY.to_string(),
            "DEFAULT".to_string(),
            GatewayContext::from_config(&h.config).unwrap(),
        );
        let mut fields = BTreeMap::new();
        fields.insert("MID".to_string(), PAYTM_MID.to_string());
        fields.insert("ORDERID".to_string(), order_number.to_string());
        fields.insert("TXNID".to_string(), txn_id.to_string());
        fields.insert("TXNAMOUNT".to_string(), amount.to_string());
        fields.insert("STATUS".to_string(), status.to_string());
        let checksum = paytm.checksum(&fields).unwrap();
        fields.insert(CHECKSUM_FIELD.to_string(), checksum);
        GatewayCallback::Paytm(fields)
    }

    /// Gateway yang accept connection tapi tidak pernah menjawab
    async fn silent_gateway() -> (String, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();

        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });

        (format!("http://{}", address), accepted)
    }

    #[tokio::test]
    async fn test_razorpay_success_then_replay() {
        let (server, mock) = razorpay_server().await;
        let h = harness(&server.url()).await;

        let placed = place(&h, "razorpay").await;
        mock.assert_async().await;
        assert_eq!(placed.order.order.status, OrderStatus::Pending);
        assert_eq!(placed.order.order.gateway_order_id.as_deref(), Some("order_NXp1"));
        assert_eq!(placed.order.payments.len(), 1);
        assert!(placed.payment.is_some());

        let paid = h.payments.reconcile(razorpay_callback("pay_NXp9", RZP_SECRET)).await.unwrap();
        assert_eq!(paid.order.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.order.status, OrderStatus::Placed);
        assert_eq!(paid.order.transaction_id.as_deref(), Some("pay_NXp9"));
        assert_eq!(paid.payments.len(), 1);
        assert_eq!(paid.payments[0].status, PaymentRecordStatus::Success);

        let replayed = h.payments.reconcile(razorpay_callback("pay_NXp9", RZP_SECRET)).await.unwrap();
        assert_eq!(replayed.order.payment_status, PaymentStatus::Paid);
        assert_eq!(replayed.payments.len(), 1);
        assert_eq!(h.store.history(paid.order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tampered_razorpay_signature_changes_nothing() {
        let (server, _mock) = razorpay_server().await;
        let h = harness(&server.url()).await;
        let placed = place(&h, "razorpay").await;

        let err = h
            .payments
            .reconcile(razorpay_callback("pay_NXp9", "not_the_secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PaymentVerification(_)));

        let details = h.store.order_details(placed.order.order.id).await.unwrap().unwrap();
        assert_eq!(details.order.payment_status, PaymentStatus::Pending);
        assert_eq!(details.payments.len(), 1);
        assert_eq!(details.payments[0].status, PaymentRecordStatus::Pending);
        assert_eq!(h.store.history(placed.order.order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_capture_recorded_without_state_change() {
        let (server, _mock) = razorpay_server().await;
        let h = harness(&server.url()).await;
        place(&h, "razorpay").await;

        h.payments.reconcile(razorpay_callback("pay_NXp9", RZP_SECRET)).await.unwrap();
        let again = h.payments.reconcile(razorpay_callback("pay_OTHER1", RZP_SECRET)).await.unwrap();

        assert_eq!(again.order.transaction_id.as_deref(), Some("pay_NXp9"));
        assert_eq!(again.payments.len(), 2);
        assert_eq!(h.store.history(again.order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_paytm_failures_reach_threshold_then_recover() {
        let h = harness("http://127.0.0.1:9").await;
        let placed = place(&h, "paytm").await;
        let number = placed.order.order.order_number.clone();
        assert_eq!(placed.order.order.gateway_order_id.as_deref(), Some(number.as_str()));

        for (i, txn) in ["TXN001", "TXN002"].iter().enumerate() {
            let details = h
                .payments
                .reconcile(paytm_callback(&h, &number, txn, "TXN_FAILURE", "2099.00"))
                .await
                .unwrap();
            assert_eq!(details.order.payment_status, PaymentStatus::Pending, "failure {}", i + 1);
        }
        assert_eq!(h.store.history(placed.order.order.id).await.unwrap().len(), 1);

        let failed = h
            .payments
            .reconcile(paytm_callback(&h, &number, "TXN003", "TXN_FAILURE", "2099.00"))
            .await
            .unwrap();
        assert_eq!(failed.order.payment_status, PaymentStatus::Failed);
        assert_eq!(h.store.failed_payment_count(failed.order.id).await.unwrap(), 3);

        let recovered = h
            .payments
            .reconcile(paytm_callback(&h, &number, "TXN004", "TXN_SUCCESS", "2099.00"))
            .await
            .unwrap();
        assert_eq!(recovered.order.payment_status, PaymentStatus::Paid);
        assert_eq!(recovered.order.status, OrderStatus::Placed);
    }

    #[tokio::test]
    async fn test_paytm_amount_mismatch_rejected() {
        let h = harness("http://127.0.0.1:9").await;
        let placed = place(&h, "paytm").await;

        let err = h
            .payments
            .reconcile(paytm_callback(&h, &placed.order.order.order_number, "TXN001", "TXN_SUCCESS", "1.00"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PaymentVerification(_)));

        let details = h.store.order_details(placed.order.order.id).await.unwrap().unwrap();
        assert_eq!(details.order.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_callback_for_other_gateway_rejected() {
        let (server, _mock) = razorpay_server().await;
        let h = harness(&server.url()).await;
        let placed = place(&h, "razorpay").await;

        let err = h
            .payments
            .reconcile(paytm_callback(&h, &placed.order.order.order_number, "TXN001", "TXN_SUCCESS", "2099.00"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PaymentVerification(_)));
    }

    #[tokio::test]
    async fn test_cod_confirm_leaves_payment_pending() {
        let h = harness("http://127.0.0.1:9").await;
        let placed = place(&h, "cod").await;

        let details = h.payments.cod_confirm(&placed.order.order.order_number).await.unwrap();
        assert_eq!(details.order.status, OrderStatus::Placed);
        assert_eq!(details.order.payment_status, PaymentStatus::Pending);
        assert_eq!(details.payments.len(), 1);
    }

    #[tokio::test]
    async fn test_settings_keep_secrets_sealed() {
        let h = harness("http://127.0.0.1:9").await;

        let view = h
            .payments
            .save_setting(
                PaymentMethod::Razorpay,
                PaymentSettingRequest {
                    enabled: false,
                    display_name: Some("Razorpay".to_string()),
                    sandbox: true,
                    credentials: None,
                },
            )
            .await
            .unwrap();
        assert!(view.has_credentials);
        assert_eq!(view.public_key.as_deref(), Some("rzp_test_key"));

        let stored = h.store.payment_setting(PaymentMethod::Razorpay).await.unwrap().unwrap();
        assert!(!stored.sealed_credentials.unwrap().contains(RZP_SECRET));

        let methods: Vec<PaymentMethod> = h.payments.methods().await.unwrap().into_iter().map(|m| m.method).collect();
        assert!(!methods.contains(&PaymentMethod::Razorpay));
        assert!(methods.contains(&PaymentMethod::Cod));

        let err = h
            .payments
            .save_setting(
                PaymentMethod::Phonepe,
                PaymentSettingRequest {
                    enabled: true,
                    display_name: None,
                    sandbox: true,
                    credentials: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_retry_payment_for_other_customer_is_not_found() {
        let h = harness("http://127.0.0.1:9").await;
        let placed = place(&h, "paytm").await;
        let stranger = Identity::Guest {
            session: "4f1c2a8e-9d4b-4c3e-8f7a-2b6d1e0c9a11".to_string(),
        };

        let err = h.payments.retry_payment(&stranger, placed.order.order.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_capture_after_cancellation_needs_refund() {
        let (server, _mock) = razorpay_server().await;
        let h = harness(&server.url()).await;
        let placed = place(&h, "razorpay").await;
        let order_id = placed.order.order.id;
        let lifecycle = OrderLifecycle::new(h.store.clone(), Arc::new(h.config.clone()));

        let cancelled = lifecycle.cancel(&customer(), order_id, "Ordered the wrong colour").await.unwrap();
        assert_eq!(cancelled.order.payment_status, PaymentStatus::Pending);
        assert_eq!(h.store.stock_of(7, None).await, 5);

        let late = h.payments.reconcile(razorpay_callback("pay_LATE1", RZP_SECRET)).await.unwrap();
        assert_eq!(late.order.status, OrderStatus::Cancelled);
        assert_eq!(late.order.payment_status, PaymentStatus::RefundPending);
        assert_eq!(late.order.transaction_id.as_deref(), Some("pay_LATE1"));
        assert_eq!(late.payments.len(), 1);
        assert_eq!(late.payments[0].status, PaymentRecordStatus::Success);
        assert_eq!(h.store.stock_of(7, None).await, 5);

        let history = h.store.history(order_id).await.unwrap();
        assert_eq!(history.len(), 3);
        let last = history.last().unwrap();
        assert_eq!(last.new_payment_status, PaymentStatus::RefundPending);
        assert!(last.comments.as_deref().unwrap().contains("refund required"));

        let stats = h.store.order_stats().await.unwrap();
        assert_eq!(stats.paid_revenue, BigDecimal::from(0));

        let replayed = h.payments.reconcile(razorpay_callback("pay_LATE1", RZP_SECRET)).await.unwrap();
        assert_eq!(replayed.order.payment_status, PaymentStatus::RefundPending);
        assert_eq!(h.store.history(order_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_paytm_failures_without_txn_id_all_count() {
        let h = harness("http://127.0.0.1:9").await;
        let placed = place(&h, "paytm").await;
        let number = placed.order.order.order_number.clone();

        for _ in 0..2 {
            h.payments
                .reconcile(paytm_callback(&h, &number, "", "TXN_FAILURE", "2099.00"))
                .await
                .unwrap();
        }

        assert_eq!(h.store.failed_payment_count(placed.order.order.id).await.unwrap(), 2);

        let failed = h
            .payments
            .reconcile(paytm_callback(&h, &number, "", "TXN_FAILURE", "2099.00"))
            .await
            .unwrap();
        assert_eq!(failed.order.payment_status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_gateway_timeout_retried_once_and_order_kept() {
        let (base, accepted) = silent_gateway().await;
        let mut config = AppConfig::default();
        config.gateway_endpoints.razorpay = base;
        config.gateway_timeout = Duration::from_millis(100);
        let h = harness_with(config).await;

        let placed = place(&h, "razorpay").await;
        assert!(placed.payment.is_none());
        assert!(placed.payment_error.is_some());
        assert_eq!(accepted.load(Ordering::SeqCst), 2);

        let kept = h.store.order_details(placed.order.order.id).await.unwrap().unwrap();
        assert_eq!(kept.order.status, OrderStatus::Pending);
        assert_eq!(kept.order.payment_status, PaymentStatus::Pending);
        assert_eq!(h.store.cart_len(&CartOwner::User(42)).await, 0);

        let err = h.payments.initiate(&kept).await.unwrap_err();
        assert!(matches!(err, AppError::GatewayTimeout(_)));
        assert_eq!(accepted.load(Ordering::SeqCst), 4);
    }
}
