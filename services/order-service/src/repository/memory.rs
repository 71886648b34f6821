// /saree-store/services/order-service/src/repository/memory.rs
// In-memory OrderStore untuk local runs (STORE_BACKEND=memory) dan tests

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use tokio::sync::Mutex;

use super::OrderStore;
use crate::{
    models::*,
    utils::error::{AppError, AppResult},
};

#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub id: i64,
    pub name: String,
    pub sku: Option<String>,
    pub price: BigDecimal,
    pub discount_percent: BigDecimal,
    pub stock: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct VariantRecord {
    pub id: i64,
    pub product_id: i64,
    pub color: Option<String>,
    pub size: Option<String>,
    pub sku: Option<String>,
    pub stock: i32,
    pub price_override: Option<BigDecimal>,
}

#[derive(Debug, Clone)]
struct CartRecord {
    id: i64,
    owner: CartOwner,
    product_id: i64,
    variant_id: Option<i64>,
    quantity: i32,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    products: HashMap<i64, ProductRecord>,
    variants: HashMap<i64, VariantRecord>,
    cart: Vec<CartRecord>,
    coupons: HashMap<String, Coupon>,
    addresses: HashMap<i64, (i64, AddressSnapshot)>,
    orders: BTreeMap<i64, Order>,
    items: Vec<OrderItem>,
    history: Vec<OrderStatusHistory>,
    payments: Vec<Payment>,
    settings: BTreeMap<PaymentMethod, StoredGatewaySetting>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn stock(&self, product_id: i64, variant_id: Option<i64>) -> i32 {
        match variant_id {
            Some(id) => self.variants.get(&id).map(|v| v.stock).unwrap_or(0),
            None => self
                .products
                .get(&product_id)
                .filter(|p| p.is_active)
                .map(|p| p.stock)
                .unwrap_or(0),
        }
    }

    fn adjust_stock(&mut self, product_id: i64, variant_id: Option<i64>, delta: i32) {
        match variant_id {
            Some(id) => {
                if let Some(variant) = self.variants.get_mut(&id) {
                    variant.stock += delta;
                }
            }
            None => {
                if let Some(product) = self.products.get_mut(&product_id) {
                    product.stock += delta;
                }
            }
        }
    }

    fn details(&self, order_id: i64) -> Option<OrderDetails> {
        let order = self.orders.get(&order_id)?.clone();
        Some(OrderDetails {
            items: self.items.iter().filter(|i| i.order_id == order_id).cloned().collect(),
            payments: self.payments.iter().filter(|p| p.order_id == order_id).cloned().collect(),
            order,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn append_history(
        &mut self,
        order_id: i64,
        old_status: Option<OrderStatus>,
        new_status: OrderStatus,
        old_payment_status: Option<PaymentStatus>,
        new_payment_status: PaymentStatus,
        entry: &NewHistory,
    ) {
        let id = self.next_id();
        self.history.push(OrderStatusHistory {
            id,
            order_id,
            old_status,
            new_status,
            old_payment_status,
            new_payment_status,
            updated_by: entry.updated_by,
            actor: entry.actor,
            comments: entry.comments.clone(),
            created_at: Utc::now(),
        });
    }

    fn insert_payment(&mut self, order_id: i64, payment: &NewPayment) -> Payment {
        let now = Utc::now();
        let row = Payment {
            id: self.next_id(),
            order_id,
            gateway: payment.gateway,
            gateway_order_id: payment.gateway_order_id.clone(),
            transaction_id: payment.transaction_id.clone(),
            amount: payment.amount.clone(),
            status: payment.status,
            response: payment.response.clone(),
            created_at: now,
            updated_at: now,
        };
        self.payments.push(row.clone());
        row
    }
}

/// OrderStore backed by a mutex-guarded map; one lock per operation gives
/// the same all-or-nothing behaviour as a database transaction.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with COD enabled
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        state.settings.insert(
            PaymentMethod::Cod,
            StoredGatewaySetting {
                gateway: PaymentMethod::Cod,
                enabled: true,
                display_name: PaymentMethod::Cod.display_name().to_string(),
                sandbox: false,
                sealed_credentials: None,
                public_key: None,
                updated_at: Utc::now(),
            },
        );

        Self {
            state: Mutex::new(state),
        }
    }
}

/// Seeding helpers, catalog dan cart dikelola service lain di production
#[cfg(test)]
impl MemoryStore {
    pub async fn insert_product(&self, product: ProductRecord) {
        self.state.lock().await.products.insert(product.id, product);
    }

    pub async fn insert_variant(&self, variant: VariantRecord) {
        self.state.lock().await.variants.insert(variant.id, variant);
    }

    pub async fn update_price(&self, product_id: i64, price: BigDecimal) {
        if let Some(product) = self.state.lock().await.products.get_mut(&product_id) {
            product.price = price;
        }
    }

    pub async fn add_to_cart(&self, owner: CartOwner, product_id: i64, variant_id: Option<i64>, quantity: i32) {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.cart.push(CartRecord {
            id,
            owner,
            product_id,
            variant_id,
            quantity,
        });
    }

    pub async fn insert_coupon(&self, coupon: Coupon) {
        self.state
            .lock()
            .await
            .coupons
            .insert(coupon.code.to_uppercase(), coupon);
    }

    /// Simpan address ke address book user, returns address id
    pub async fn insert_address(&self, user_id: i64, address: AddressSnapshot) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.addresses.insert(id, (user_id, address));
        id
    }

    pub async fn stock_of(&self, product_id: i64, variant_id: Option<i64>) -> i32 {
        self.state.lock().await.stock(product_id, variant_id)
    }

    pub async fn cart_len(&self, owner: &CartOwner) -> usize {
        self.state
            .lock()
            .await
            .cart
            .iter()
            .filter(|c| &c.owner == owner)
            .count()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn cart_lines(&self, owner: &CartOwner) -> AppResult<Vec<CartLine>> {
        let state = self.state.lock().await;

        let mut lines = Vec::new();
        for record in state.cart.iter().filter(|c| &c.owner == owner) {
            let Some(product) = state.products.get(&record.product_id) else {
                continue;
            };
            let variant = record.variant_id.and_then(|id| state.variants.get(&id));

            let variant_label = variant.and_then(|v| match (&v.color, &v.size) {
                (Some(color), Some(size)) => Some(format!("{} / {}", color, size)),
                (Some(only), None) | (None, Some(only)) => Some(only.clone()),
                (None, None) => None,
            });

            lines.push(CartLine {
                cart_item_id: record.id,
                product_id: product.id,
                variant_id: record.variant_id,
                quantity: record.quantity,
                product_name: product.name.clone(),
                sku: variant.and_then(|v| v.sku.clone()).or_else(|| product.sku.clone()),
                variant_label,
                price: product.price.clone(),
                discount_percent: product.discount_percent.clone(),
                price_override: variant.and_then(|v| v.price_override.clone()),
                available_stock: variant.map(|v| v.stock).unwrap_or(product.stock),
                is_active: product.is_active,
            });
        }

        Ok(lines)
    }

    async fn saved_address(&self, user_id: i64, address_id: i64) -> AppResult<Option<AddressSnapshot>> {
        Ok(self
            .state
            .lock()
            .await
            .addresses
            .get(&address_id)
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, address)| address.clone()))
    }

    async fn coupon(&self, code: &str) -> AppResult<Option<Coupon>> {
        Ok(self
            .state
            .lock()
            .await
            .coupons
            .get(&code.trim().to_uppercase())
            .cloned())
    }

    async fn place_order(&self, draft: &OrderDraft) -> AppResult<OrderDetails> {
        let mut state = self.state.lock().await;

        // running tally so two lines of the same variant are checked together
        let mut reserved: HashMap<(i64, Option<i64>), i32> = HashMap::new();
        let mut shortfalls = Vec::new();
        for item in &draft.items {
            let key = (item.product_id, item.variant_id);
            let available = state.stock(item.product_id, item.variant_id) - reserved.get(&key).copied().unwrap_or(0);
            if available >= item.quantity {
                *reserved.entry(key).or_insert(0) += item.quantity;
            } else {
                shortfalls.push(StockShortfall {
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                    name: item.product_name.clone(),
                    requested: item.quantity,
                    available: available.max(0),
                });
            }
        }
        if !shortfalls.is_empty() {
            return Err(AppError::InsufficientStock(shortfalls));
        }

        if state.orders.values().any(|o| o.order_number == draft.order_number) {
            return Err(AppError::Conflict(format!(
                "Order number {} already taken",
                draft.order_number
            )));
        }

        for ((product_id, variant_id), quantity) in reserved {
            state.adjust_stock(product_id, variant_id, -quantity);
        }

        let now = Utc::now();
        let order_id = state.next_id();
        let order = Order {
            id: order_id,
            order_number: draft.order_number.clone(),
            user_id: draft.user_id,
            guest_session: draft.guest_session.clone(),
            customer_email: draft.customer_email.clone(),
            customer_phone: draft.customer_phone.clone(),
            subtotal: draft.totals.subtotal.clone(),
            discount: draft.totals.discount.clone(),
            shipping: draft.totals.shipping.clone(),
            tax: draft.totals.tax.clone(),
            total: draft.totals.total.clone(),
            currency: draft.currency.clone(),
            coupon_code: draft.coupon_code.clone(),
            status: draft.status,
            payment_status: PaymentStatus::Pending,
            payment_method: draft.payment_method,
            gateway_order_id: None,
            transaction_id: None,
            gateway_response: None,
            shipping_address: draft.shipping_address.clone(),
            billing_address: draft.billing_address.clone(),
            notes: draft.notes.clone(),
            cancel_reason: None,
            cancelled_at: None,
            shipped_at: None,
            delivered_at: None,
            return_reason: None,
            returned_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(order_id, order);

        for item in &draft.items {
            let id = state.next_id();
            state.items.push(OrderItem {
                id,
                order_id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                product_name: Some(item.product_name.clone()),
                variant_label: item.variant_label.clone(),
                sku: item.sku.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price.clone(),
                line_total: item.line_total.clone(),
                created_at: now,
            });
        }

        state.append_history(
            order_id,
            None,
            draft.status,
            None,
            PaymentStatus::Pending,
            &NewHistory {
                actor: draft.actor,
                updated_by: draft.user_id,
                comments: Some("Order placed".to_string()),
            },
        );

        state.cart.retain(|c| c.owner != draft.cart_owner);

        state
            .details(order_id)
            .ok_or_else(|| AppError::Internal(format!("Order {} vanished after insert", order_id)))
    }

    async fn order_details(&self, order_id: i64) -> AppResult<Option<OrderDetails>> {
        Ok(self.state.lock().await.details(order_id))
    }

    async fn order_by_number(&self, order_number: &str) -> AppResult<Option<Order>> {
        Ok(self
            .state
            .lock()
            .await
            .orders
            .values()
            .find(|o| o.order_number == order_number)
            .cloned())
    }

    async fn order_by_gateway_reference(&self, gateway_order_id: &str) -> AppResult<Option<Order>> {
        let state = self.state.lock().await;

        let direct = state
            .orders
            .values()
            .rev()
            .find(|o| o.gateway_order_id.as_deref() == Some(gateway_order_id));
        if let Some(order) = direct {
            return Ok(Some(order.clone()));
        }

        Ok(state
            .payments
            .iter()
            .rev()
            .find(|p| p.gateway_order_id.as_deref() == Some(gateway_order_id))
            .and_then(|p| state.orders.get(&p.order_id))
            .cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> AppResult<(Vec<Order>, i64)> {
        let state = self.state.lock().await;

        let mut matching: Vec<&Order> = state
            .orders
            .values()
            .filter(|o| filter.include_deleted || o.deleted_at.is_none())
            .filter(|o| filter.user_id.map_or(true, |id| o.user_id == Some(id)))
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .filter(|o| filter.payment_status.map_or(true, |s| o.payment_status == s))
            .filter(|o| filter.payment_method.map_or(true, |m| o.payment_method == m))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let limit = filter.limit.max(1) as usize;
        let offset = (filter.page.max(1) as usize - 1) * limit;

        let page = matching.into_iter().skip(offset).take(limit).cloned().collect();
        Ok((page, total))
    }

    async fn apply_change(&self, change: &OrderChange) -> AppResult<ChangeOutcome> {
        let mut state = self.state.lock().await;

        let current = state
            .orders
            .get(&change.order_id)
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", change.order_id)))?;
        if current.deleted_at.is_some()
            || current.status != change.expected_status
            || current.payment_status != change.expected_payment_status
        {
            return Err(AppError::Conflict(format!(
                "Order {} was modified concurrently",
                change.order_id
            )));
        }

        if let Some(payment) = &change.payment {
            if let Some(transaction_id) = &payment.transaction_id {
                if state.payments.iter().any(|p| p.transaction_id.as_deref() == Some(transaction_id)) {
                    return Ok(ChangeOutcome::DuplicatePayment);
                }
            }

            let open_attempt = state.payments.iter().rposition(|p| {
                p.order_id == change.order_id
                    && p.gateway == payment.gateway
                    && p.gateway_order_id == payment.gateway_order_id
                    && matches!(p.status, PaymentRecordStatus::Pending | PaymentRecordStatus::CodPending)
                    && p.transaction_id.is_none()
            });

            match open_attempt {
                Some(index) => {
                    let row = &mut state.payments[index];
                    row.status = payment.status;
                    row.transaction_id = payment.transaction_id.clone();
                    row.response = payment.response.clone();
                    row.updated_at = Utc::now();
                }
                None => {
                    state.insert_payment(change.order_id, payment);
                }
            }
        }

        if change.restock {
            let items: Vec<(i64, Option<i64>, i32)> = state
                .items
                .iter()
                .filter(|i| i.order_id == change.order_id)
                .map(|i| (i.product_id, i.variant_id, i.quantity))
                .collect();
            for (product_id, variant_id, quantity) in items {
                state.adjust_stock(product_id, variant_id, quantity);
            }
        }

        if let Some(order) = state.orders.get_mut(&change.order_id) {
            order.status = change.status;
            order.payment_status = change.payment_status;
            if change.cancel_reason.is_some() {
                order.cancel_reason = change.cancel_reason.clone();
            }
            if change.return_reason.is_some() {
                order.return_reason = change.return_reason.clone();
            }
            order.cancelled_at = change.cancelled_at.or(order.cancelled_at);
            order.shipped_at = change.shipped_at.or(order.shipped_at);
            order.delivered_at = change.delivered_at.or(order.delivered_at);
            order.returned_at = change.returned_at.or(order.returned_at);
            if change.transaction_id.is_some() {
                order.transaction_id = change.transaction_id.clone();
            }
            if change.gateway_response.is_some() {
                order.gateway_response = change.gateway_response.clone();
            }
            order.updated_at = Utc::now();
        }

        if let Some(entry) = &change.history {
            state.append_history(
                change.order_id,
                Some(change.expected_status),
                change.status,
                Some(change.expected_payment_status),
                change.payment_status,
                entry,
            );
        }

        state
            .details(change.order_id)
            .map(ChangeOutcome::Applied)
            .ok_or_else(|| AppError::Internal(format!("Order {} vanished", change.order_id)))
    }

    async fn soft_delete(&self, order_id: i64, entry: &NewHistory) -> AppResult<()> {
        let mut state = self.state.lock().await;

        let order = state
            .orders
            .get_mut(&order_id)
            .filter(|o| o.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;

        let now = Utc::now();
        order.deleted_at = Some(now);
        order.updated_at = now;
        let (status, payment_status) = (order.status, order.payment_status);

        state.append_history(order_id, Some(status), status, Some(payment_status), payment_status, entry);
        Ok(())
    }

    async fn history(&self, order_id: i64) -> AppResult<Vec<OrderStatusHistory>> {
        Ok(self
            .state
            .lock()
            .await
            .history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn record_initiation(&self, order_id: i64, payment: &NewPayment) -> AppResult<Payment> {
        let mut state = self.state.lock().await;

        if !state.orders.contains_key(&order_id) {
            return Err(AppError::NotFound(format!("Order {} not found", order_id)));
        }

        let recorded = state.insert_payment(order_id, payment);
        if let (Some(gateway_order_id), Some(order)) =
            (&payment.gateway_order_id, state.orders.get_mut(&order_id))
        {
            order.gateway_order_id = Some(gateway_order_id.clone());
            order.updated_at = Utc::now();
        }

        Ok(recorded)
    }

    async fn attempt_amount(&self, order_id: i64, gateway_order_id: &str) -> AppResult<Option<BigDecimal>> {
        Ok(self
            .state
            .lock()
            .await
            .payments
            .iter()
            .find(|p| p.order_id == order_id && p.gateway_order_id.as_deref() == Some(gateway_order_id))
            .map(|p| p.amount.clone()))
    }

    async fn failed_payment_count(&self, order_id: i64) -> AppResult<i64> {
        Ok(self
            .state
            .lock()
            .await
            .payments
            .iter()
            .filter(|p| p.order_id == order_id && p.status == PaymentRecordStatus::Failed)
            .count() as i64)
    }

    async fn payment_settings(&self) -> AppResult<Vec<StoredGatewaySetting>> {
        Ok(self.state.lock().await.settings.values().cloned().collect())
    }

    async fn payment_setting(&self, gateway: PaymentMethod) -> AppResult<Option<StoredGatewaySetting>> {
        Ok(self.state.lock().await.settings.get(&gateway).cloned())
    }

    async fn save_payment_setting(&self, setting: &StoredGatewaySetting) -> AppResult<StoredGatewaySetting> {
        let mut saved = setting.clone();
        saved.updated_at = Utc::now();
        self.state
            .lock()
            .await
            .settings
            .insert(saved.gateway, saved.clone());
        Ok(saved)
    }

    async fn order_stats(&self) -> AppResult<AdminOrderStats> {
        let state = self.state.lock().await;

        let mut stats = AdminOrderStats::default();
        for order in state.orders.values().filter(|o| o.deleted_at.is_none()) {
            stats.total_orders += 1;
            *stats.by_status.entry(order.status.as_str().to_string()).or_insert(0) += 1;
            *stats
                .by_payment_status
                .entry(order.payment_status.as_str().to_string())
                .or_insert(0) += 1;
            if order.payment_status == PaymentStatus::Paid {
                stats.paid_revenue += &order.total;
            }
        }

        Ok(stats)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::sample_address;

    fn saree(stock: i32) -> ProductRecord {
        ProductRecord {
            id: 7,
            name: "Banarasi Silk Saree".to_string(),
            sku: Some("BSS".to_string()),
            price: BigDecimal::from(1000),
            discount_percent: BigDecimal::from(0),
            stock,
            is_active: true,
        }
    }

    fn draft(order_number: &str, quantity: i32) -> OrderDraft {
        OrderDraft {
            order_number: order_number.to_string(),
            user_id: Some(42),
            guest_session: None,
            customer_email: None,
            customer_phone: None,
            totals: OrderTotals {
                subtotal: BigDecimal::from(1000 * quantity),
                discount: BigDecimal::from(0),
                shipping: BigDecimal::from(0),
                tax: BigDecimal::from(0),
                total: BigDecimal::from(1000 * quantity),
            },
            currency: "INR".to_string(),
            coupon_code: None,
            status: OrderStatus::Placed,
            payment_method: PaymentMethod::Cod,
            shipping_address: sample_address(),
            billing_address: sample_address(),
            notes: None,
            items: vec![DraftItem {
                product_id: 7,
                variant_id: None,
                product_name: "Banarasi Silk Saree".to_string(),
                variant_label: None,
                sku: None,
                quantity,
                unit_price: BigDecimal::from(1000),
                line_total: BigDecimal::from(1000 * quantity),
            }],
            cart_owner: CartOwner::User(42),
            actor: Actor::Customer,
        }
    }

    #[tokio::test]
    async fn test_place_order_reserves_stock_and_clears_cart() {
        let store = MemoryStore::new();
        store.insert_product(saree(5)).await;
        store.add_to_cart(CartOwner::User(42), 7, None, 2).await;

        let details = store.place_order(&draft("ORD-20260101-AAAAAA", 2)).await.unwrap();

        assert_eq!(details.items.len(), 1);
        assert_eq!(store.stock_of(7, None).await, 3);
        assert_eq!(store.cart_len(&CartOwner::User(42)).await, 0);

        let history = store.history(details.order.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_status, None);
    }

    #[tokio::test]
    async fn test_shortfall_leaves_nothing_behind() {
        let store = MemoryStore::new();
        store.insert_product(saree(1)).await;
        store.add_to_cart(CartOwner::User(42), 7, None, 2).await;

        let err = store.place_order(&draft("ORD-20260101-BBBBBB", 2)).await.unwrap_err();
        match err {
            AppError::InsufficientStock(items) => {
                assert_eq!(items[0].requested, 2);
                assert_eq!(items[0].available, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert_eq!(store.stock_of(7, None).await, 1);
        assert_eq!(store.cart_len(&CartOwner::User(42)).await, 1);
        let (orders, total) = store.list_orders(&OrderFilter { page: 1, limit: 10, ..Default::default() }).await.unwrap();
        assert!(orders.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_duplicate_order_number_is_conflict() {
        let store = MemoryStore::new();
        store.insert_product(saree(5)).await;

        store.place_order(&draft("ORD-20260101-CCCCCC", 1)).await.unwrap();
        let err = store.place_order(&draft("ORD-20260101-CCCCCC", 1)).await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.stock_of(7, None).await, 4);
    }

    #[tokio::test]
    async fn test_stale_change_is_conflict() {
        let store = MemoryStore::new();
        store.insert_product(saree(5)).await;
        let details = store.place_order(&draft("ORD-20260101-DDDDDD", 1)).await.unwrap();

        let mut change = OrderChange::for_order(&details.order);
        change.expected_status = OrderStatus::Confirmed;
        change.status = OrderStatus::Packed;

        let err = store.apply_change(&change).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
