// /saree-store/services/order-service/src/core/checkout.rs
// Cart-to-order conversion

use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use rand::Rng;
use validator::Validate;

use crate::{
    config::AppConfig,
    core::{
        payment::PaymentService,
        pricing::{compute_totals, coupon_discount, line_total, unit_price},
    },
    models::*,
    repository::OrderStore,
    utils::error::{AppError, AppResult},
};

const ORDER_NUMBER_ATTEMPTS: usize = 3;
const ORDER_NUMBER_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// `ORD-YYYYMMDD-XXXXXX`
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| ORDER_NUMBER_CHARSET[rng.random_range(0..ORDER_NUMBER_CHARSET.len())] as char)
        .collect();

    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}

fn check_address(address: &AddressSnapshot, label: &str) -> AppResult<()> {
    address
        .validate()
        .map_err(|e| AppError::InvalidAddress(format!("{} address: {}", label, e)))
}

pub struct CheckoutService {
    store: Arc<dyn OrderStore>,
    payments: Arc<PaymentService>,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn OrderStore>, payments: Arc<PaymentService>, config: Arc<AppConfig>) -> Self {
        Self { store, payments, config }
    }

    /// Convert the caller's cart into an order, then start the payment.
    ///
    /// The order survives a failed payment start; the result then carries
    /// `payment_error` and the customer can retry from the order.
    pub async fn checkout(&self, identity: &Identity, request: CheckoutRequest) -> AppResult<CheckoutResult> {
        request.validate()?;

        let owner = match identity {
            Identity::User { id, .. } => CartOwner::User(*id),
            Identity::Guest { session } => CartOwner::Guest(session.clone()),
            Identity::Anonymous => {
                return Err(AppError::Unauthorized(
                    "Sign in or send a guest session to check out".to_string(),
                ));
            }
        };

        let payment_method: PaymentMethod = request.payment_method.parse()?;
        self.payments.ensure_enabled(payment_method).await?;

        let shipping_address = self.shipping_address(identity, &request).await?;
        let billing_address = match &request.billing_address {
            Some(billing) => {
                check_address(billing, "Billing")?;
                billing.clone()
            }
            None => shipping_address.clone(),
        };

        let lines = self.store.cart_lines(&owner).await?;
        if lines.is_empty() {
            return Err(AppError::EmptyCart);
        }

        let items = self.draft_items(&lines)?;
        let subtotal = items
            .iter()
            .fold(BigDecimal::from(0), |acc, item| acc + &item.line_total);

        let now = Utc::now();
        let (coupon_code, discount) = match request.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => {
                let coupon = self
                    .store
                    .coupon(code)
                    .await?
                    .ok_or_else(|| AppError::Validation(format!("Coupon {} does not exist", code)))?;
                let discount = coupon_discount(&coupon, &subtotal, now)?;
                (Some(coupon.code), discount)
            }
            None => (None, BigDecimal::from(0)),
        };

        let totals = compute_totals(&subtotal, &discount, &self.config.shipping, &self.config.tax_rate_percent);

        let customer_email = request
            .email
            .clone()
            .or_else(|| match identity {
                Identity::User { email, .. } => email.clone(),
                _ => None,
            })
            .or_else(|| shipping_address.email.clone());

        let mut draft = OrderDraft {
            order_number: generate_order_number(now),
            user_id: identity.user_id(),
            guest_session: match identity {
                Identity::Guest { session } => Some(session.clone()),
                _ => None,
            },
            customer_email,
            customer_phone: Some(shipping_address.phone.clone()),
            totals,
            currency: self.config.currency.clone(),
            coupon_code,
            status: if payment_method.requires_redirect() {
                OrderStatus::Pending
            } else {
                OrderStatus::Placed
            },
            payment_method,
            shipping_address,
            billing_address,
            notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
            items,
            cart_owner: owner,
            actor: Actor::Customer,
        };

        let details = self.place_with_fresh_number(&mut draft).await?;

        tracing::info!(
            "Order {} placed ({} item(s), total {} {}, {})",
            details.order.order_number,
            details.items.len(),
            details.order.total,
            details.order.currency,
            details.order.payment_method
        );

        let (payment, payment_error) = match self.payments.initiate(&details).await {
            Ok(intent) => (Some(intent), None),
            Err(e) => {
                tracing::warn!(
                    gateway = %details.order.payment_method,
                    "Payment start failed for order {}: {}",
                    details.order.order_number,
                    e
                );
                (
                    None,
                    Some("Payment pending. Retry the payment or check its status later.".to_string()),
                )
            }
        };

        // pick up the attempt row and gateway reference
        let order = self
            .store
            .order_details(details.order.id)
            .await?
            .unwrap_or(details);

        Ok(CheckoutResult {
            order,
            payment,
            payment_error,
        })
    }

    async fn shipping_address(&self, identity: &Identity, request: &CheckoutRequest) -> AppResult<AddressSnapshot> {
        if let Some(address) = &request.shipping_address {
            check_address(address, "Shipping")?;
            return Ok(address.clone());
        }

        let Some(address_id) = request.shipping_address_id else {
            return Err(AppError::InvalidAddress("A shipping address is required".to_string()));
        };

        let user_id = identity.user_id().ok_or_else(|| {
            AppError::InvalidAddress("Saved addresses are only available when signed in".to_string())
        })?;

        let address = self
            .store
            .saved_address(user_id, address_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Address {} not found", address_id)))?;

        check_address(&address, "Saved")?;
        Ok(address)
    }

    /// Snapshot each cart line at its live price
    fn draft_items(&self, lines: &[CartLine]) -> AppResult<Vec<DraftItem>> {
        lines
            .iter()
            .map(|line| {
                if !line.is_active {
                    return Err(AppError::Validation(format!(
                        "{} is no longer available",
                        line.display_name()
                    )));
                }
                if line.quantity < 1 {
                    return Err(AppError::Validation(format!(
                        "Quantity for {} must be at least 1",
                        line.display_name()
                    )));
                }

                let unit = unit_price(line);
                Ok(DraftItem {
                    product_id: line.product_id,
                    variant_id: line.variant_id,
                    product_name: line.product_name.clone(),
                    variant_label: line.variant_label.clone(),
                    sku: line.sku.clone(),
                    quantity: line.quantity,
                    line_total: line_total(&unit, line.quantity),
                    unit_price: unit,
                })
            })
            .collect()
    }

    async fn place_with_fresh_number(&self, draft: &mut OrderDraft) -> AppResult<OrderDetails> {
        let mut attempt = 1;
        loop {
            match self.store.place_order(draft).await {
                Err(AppError::Conflict(msg)) if attempt < ORDER_NUMBER_ATTEMPTS => {
                    tracing::warn!("Order number collision ({}), regenerating", msg);
                    draft.order_number = generate_order_number(Utc::now());
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{secrets::SecretStore, test_support::sample_address},
        repository::memory::{MemoryStore, ProductRecord, VariantRecord},
    };

    fn saree() -> ProductRecord {
        ProductRecord {
            id: 7,
            name: "Banarasi Silk Saree".to_string(),
            sku: Some("BSS".to_string()),
            price: BigDecimal::from(1000),
            discount_percent: BigDecimal::from(0),
            stock: 5,
            is_active: true,
        }
    }

    fn cod_request() -> CheckoutRequest {
        CheckoutRequest {
            shipping_address: Some(sample_address()),
            shipping_address_id: None,
            billing_address: None,
            payment_method: "cod".to_string(),
            coupon_code: None,
            notes: None,
            email: None,
        }
    }

    fn customer(id: i64) -> Identity {
        Identity::User {
            id,
            role: Role::Customer,
            email: Some(format!("customer{}@example.com", id)),
        }
    }

    fn service(store: Arc<MemoryStore>) -> CheckoutService {
        let config = Arc::new(AppConfig::default());
        let secrets = Arc::new(SecretStore::from_bytes([0u8; 32]));
        let payments = Arc::new(PaymentService::new(store.clone(), secrets, &config).unwrap());
        CheckoutService::new(store, payments, config)
    }

    #[test]
    fn test_order_number_format() {
        let number = generate_order_number(Utc::now());
        let parts: Vec<&str> = number.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_cod_checkout_scenario() {
        let store = Arc::new(MemoryStore::new());
        store.insert_product(saree()).await;
        store.add_to_cart(CartOwner::User(42), 7, None, 2).await;

        let result = service(store.clone()).checkout(&customer(42), cod_request()).await.unwrap();
        let order = &result.order.order;

        assert_eq!(order.subtotal, BigDecimal::from(2000));
        assert_eq!(order.shipping, BigDecimal::from(99));
        assert_eq!(order.total, BigDecimal::from(2099));
        assert!(order.totals().is_consistent());
        assert_eq!(order.status, OrderStatus::Placed);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(store.stock_of(7, None).await, 3);
        assert_eq!(store.cart_len(&CartOwner::User(42)).await, 0);

        assert!(result.payment.is_some());
        assert!(result.payment_error.is_none());
        assert_eq!(result.order.payments.len(), 1);
        assert_eq!(result.order.payments[0].status, PaymentRecordStatus::CodPending);

        let item = &result.order.items[0];
        assert_eq!(item.line_total, &item.unit_price * BigDecimal::from(item.quantity));
    }

    #[tokio::test]
    async fn test_line_snapshot_ignores_later_price_changes() {
        let store = Arc::new(MemoryStore::new());
        store.insert_product(saree()).await;
        store.add_to_cart(CartOwner::User(42), 7, None, 1).await;

        let result = service(store.clone()).checkout(&customer(42), cod_request()).await.unwrap();
        store.update_price(7, BigDecimal::from(1500)).await;

        let reloaded = store.order_details(result.order.order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.items[0].unit_price, BigDecimal::from(1000));
        assert_eq!(reloaded.items[0].line_total, BigDecimal::from(1000));
        assert_eq!(reloaded.order.total, result.order.order.total);
    }

    #[tokio::test]
    async fn test_variant_price_override_and_discount() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_product(ProductRecord {
                discount_percent: BigDecimal::from(10),
                ..saree()
            })
            .await;
        store
            .insert_variant(VariantRecord {
                id: 70,
                product_id: 7,
                color: Some("Red".to_string()),
                size: Some("Free Size".to_string()),
                sku: Some("BSS-RED".to_string()),
                stock: 4,
                price_override: Some(BigDecimal::from(1200)),
            })
            .await;
        store.add_to_cart(CartOwner::User(42), 7, Some(70), 1).await;

        let result = service(store.clone()).checkout(&customer(42), cod_request()).await.unwrap();
        let item = &result.order.items[0];

        assert_eq!(item.unit_price, BigDecimal::from(1080));
        assert_eq!(item.variant_label.as_deref(), Some("Red / Free Size"));
        assert_eq!(store.stock_of(7, Some(70)).await, 3);
        assert_eq!(store.stock_of(7, None).await, 5);
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let store = Arc::new(MemoryStore::new());
        let err = service(store).checkout(&customer(42), cod_request()).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyCart));
    }

    #[tokio::test]
    async fn test_invalid_address_rejected() {
        let store = Arc::new(MemoryStore::new());
        store.insert_product(saree()).await;
        store.add_to_cart(CartOwner::User(42), 7, None, 1).await;

        let mut request = cod_request();
        if let Some(address) = request.shipping_address.as_mut() {
            address.pincode = "12345".to_string();
        }

        let err = service(store.clone()).checkout(&customer(42), request).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidAddress(_)));
        assert_eq!(store.stock_of(7, None).await, 5);
    }

    #[tokio::test]
    async fn test_disabled_method_rejected() {
        let store = Arc::new(MemoryStore::new());
        store.insert_product(saree()).await;
        store.add_to_cart(CartOwner::User(42), 7, None, 1).await;

        let mut request = cod_request();
        request.payment_method = "razorpay".to_string();

        let err = service(store).checkout(&customer(42), request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_saved_address_is_snapshotted() {
        let store = Arc::new(MemoryStore::new());
        store.insert_product(saree()).await;
        store.add_to_cart(CartOwner::User(42), 7, None, 1).await;
        let address_id = store.insert_address(42, sample_address()).await;

        let mut request = cod_request();
        request.shipping_address = None;
        request.shipping_address_id = Some(address_id);

        let result = service(store).checkout(&customer(42), request).await.unwrap();
        assert_eq!(result.order.order.shipping_address, sample_address());
        assert_eq!(result.order.order.billing_address, sample_address());
    }

    #[tokio::test]
    async fn test_guest_checkout_with_coupon() {
        let store = Arc::new(MemoryStore::new());
        store.insert_product(saree()).await;
        store
            .insert_coupon(Coupon {
                code: "FESTIVE10".to_string(),
                kind: DiscountKind::Percent,
                value: BigDecimal::from(10),
                min_subtotal: None,
                max_discount: Some(BigDecimal::from(150)),
                active: true,
                expires_at: None,
            })
            .await;
        let guest = Identity::Guest {
            session: "4f1c2a8e-9d4b-4c3e-8f7a-2b6d1e0c9a11".to_string(),
        };
        store
            .add_to_cart(CartOwner::Guest("4f1c2a8e-9d4b-4c3e-8f7a-2b6d1e0c9a11".to_string()), 7, None, 2)
            .await;

        let mut request = cod_request();
        request.coupon_code = Some("festive10".to_string());

        let result = service(store).checkout(&guest, request).await.unwrap();
        let order = &result.order.order;

        assert_eq!(order.user_id, None);
        assert_eq!(order.discount, BigDecimal::from(150));
        assert_eq!(order.total, BigDecimal::from(1949));
        assert!(order.totals().is_consistent());
        assert_eq!(order.coupon_code.as_deref(), Some("FESTIVE10"));
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_on_last_unit() {
        let store = Arc::new(MemoryStore::new());
        store.insert_product(ProductRecord { stock: 1, ..saree() }).await;
        store.add_to_cart(CartOwner::User(1), 7, None, 1).await;
        store.add_to_cart(CartOwner::User(2), 7, None, 1).await;

        let checkout = Arc::new(service(store.clone()));
        let (first, second) = tokio::join!(
            {
                let checkout = checkout.clone();
                async move { checkout.checkout(&customer(1), cod_request()).await }
            },
            {
                let checkout = checkout.clone();
                async move { checkout.checkout(&customer(2), cod_request()).await }
            }
        );

        let results = [first, second];
        let placed = results.iter().filter(|r| r.is_ok()).count();
        let short = results
            .iter()
            .filter(|r| matches!(r, Err(AppError::InsufficientStock(items)) if items[0].available == 0))
            .count();

        assert_eq!(placed, 1);
        assert_eq!(short, 1);
        assert_eq!(store.stock_of(7, None).await, 0);
    }

    #[tokio::test]
    async fn test_anonymous_checkout_rejected() {
        let store = Arc::new(MemoryStore::new());
        let err = service(store).checkout(&Identity::Anonymous, cod_request()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
