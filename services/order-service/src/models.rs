// /saree-store/services/order-service/src/models.rs

use std::{collections::BTreeMap, fmt, str::FromStr};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::error::AppError;

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\+91[\s-]?)?[6-9][0-9]{9}$").expect("valid phone regex")
});

static PINCODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[1-9][0-9]{5}$").expect("valid pincode regex")
});

// ========================= ENUMS =========================

/// Fulfilment status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Placed,
    Confirmed,
    Packed,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
    ReturnRequested,
    Returned,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 10] = [
        OrderStatus::Pending,
        OrderStatus::Placed,
        OrderStatus::Confirmed,
        OrderStatus::Packed,
        OrderStatus::Shipped,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::ReturnRequested,
        OrderStatus::Returned,
    ];

    /// Convert ke string untuk database
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Placed => "placed",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Packed => "packed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::ReturnRequested => "return_requested",
            OrderStatus::Returned => "returned",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| AppError::Validation(format!("Unknown order status '{}'", s)))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    RefundPending,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::Paid,
        PaymentStatus::Failed,
        PaymentStatus::RefundPending,
        PaymentStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::RefundPending => "refund_pending",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Money sudah diterima (atau sedang dikembalikan)
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Paid | PaymentStatus::RefundPending | PaymentStatus::Refunded
        )
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| AppError::Validation(format!("Unknown payment status '{}'", s)))
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment method / gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cod,
    Razorpay,
    Phonepe,
    Paytm,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Cod,
        PaymentMethod::Razorpay,
        PaymentMethod::Phonepe,
        PaymentMethod::Paytm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Razorpay => "razorpay",
            PaymentMethod::Phonepe => "phonepe",
            PaymentMethod::Paytm => "paytm",
        }
    }

    /// Get display name untuk UI
    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "Cash on Delivery",
            PaymentMethod::Razorpay => "Cards / UPI / Netbanking (Razorpay)",
            PaymentMethod::Phonepe => "PhonePe",
            PaymentMethod::Paytm => "Paytm",
        }
    }

    /// Redirect gateways confirm payment asynchronously, so the order waits in `pending`
    pub fn requires_redirect(&self) -> bool {
        !matches!(self, PaymentMethod::Cod)
    }
}

impl FromStr for PaymentMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| {
                AppError::Validation(format!("Payment method '{}' is not supported", s))
            })
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single payment attempt row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordStatus {
    Pending,
    Success,
    Failed,
    CodPending,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRecordStatus::Pending => "pending",
            PaymentRecordStatus::Success => "success",
            PaymentRecordStatus::Failed => "failed",
            PaymentRecordStatus::CodPending => "cod_pending",
        }
    }
}

impl FromStr for PaymentRecordStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentRecordStatus::Pending),
            "success" => Ok(PaymentRecordStatus::Success),
            "failed" => Ok(PaymentRecordStatus::Failed),
            "cod_pending" => Ok(PaymentRecordStatus::CodPending),
            other => Err(AppError::Validation(format!("Unknown payment record status '{}'", other))),
        }
    }
}

/// Who triggered a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Customer,
    Admin,
    Gateway,
    System,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::Customer => "customer",
            Actor::Admin => "admin",
            Actor::Gateway => "gateway",
            Actor::System => "system",
        }
    }
}

impl FromStr for Actor {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Actor::Customer),
            "admin" => Ok(Actor::Admin),
            "gateway" => Ok(Actor::Gateway),
            "system" => Ok(Actor::System),
            other => Err(AppError::Validation(format!("Unknown actor '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    Percent,
    Flat,
}

// ========================= IDENTITY =========================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

/// Caller identity yang di-inject oleh auth middleware
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    User {
        id: i64,
        role: Role,
        email: Option<String>,
    },
    Guest {
        session: String,
    },
    Anonymous,
}

impl Identity {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Identity::User { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Identity::User { role: Role::Admin, .. })
    }
}

/// Pemilik cart: user login atau guest session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CartOwner {
    User(i64),
    Guest(String),
}

// ========================= DOMAIN MODELS =========================

/// Address copied into the order at checkout time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AddressSnapshot {
    #[validate(length(min = 2, max = 120, message = "name is required"))]
    pub name: String,

    #[validate(regex(path = *PHONE_RE, message = "phone must be a 10 digit Indian mobile number"))]
    pub phone: String,

    #[validate(email(message = "email is invalid"))]
    pub email: Option<String>,

    #[validate(length(min = 3, max = 255, message = "address line is required"))]
    pub line1: String,

    #[validate(length(max = 255))]
    pub line2: Option<String>,

    #[validate(length(max = 120))]
    pub landmark: Option<String>,

    #[validate(length(min = 2, max = 100, message = "city is required"))]
    pub city: String,

    #[validate(length(min = 2, max = 100, message = "state is required"))]
    pub state: String,

    #[validate(regex(path = *PINCODE_RE, message = "pincode must be 6 digits"))]
    pub pincode: String,

    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "India".to_string()
}

/// Stored monetary breakdown of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: BigDecimal,
    pub discount: BigDecimal,
    pub shipping: BigDecimal,
    pub tax: BigDecimal,
    pub total: BigDecimal,
}

impl OrderTotals {
    /// total = subtotal - discount + shipping + tax
    pub fn is_consistent(&self) -> bool {
        &self.subtotal - &self.discount + &self.shipping + &self.tax == self.total
    }
}

/// Model Order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub user_id: Option<i64>,
    pub guest_session: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub subtotal: BigDecimal,
    pub discount: BigDecimal,
    pub shipping: BigDecimal,
    pub tax: BigDecimal,
    pub total: BigDecimal,
    pub currency: String,
    pub coupon_code: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub gateway_order_id: Option<String>,
    pub transaction_id: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub shipping_address: AddressSnapshot,
    pub billing_address: AddressSnapshot,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub return_reason: Option<String>,
    pub returned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn totals(&self) -> OrderTotals {
        OrderTotals {
            subtotal: self.subtotal.clone(),
            discount: self.discount.clone(),
            shipping: self.shipping.clone(),
            tax: self.tax.clone(),
            total: self.total.clone(),
        }
    }

    /// Owner check untuk customer endpoints
    pub fn is_owned_by(&self, identity: &Identity) -> bool {
        match identity {
            Identity::User { id, .. } => self.user_id == Some(*id),
            Identity::Guest { session } => {
                self.user_id.is_none() && self.guest_session.as_deref() == Some(session.as_str())
            }
            Identity::Anonymous => false,
        }
    }
}

/// Order line, frozen at checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub product_name: Option<String>,
    pub variant_label: Option<String>,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub line_total: BigDecimal,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    pub id: i64,
    pub order_id: i64,
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub old_payment_status: Option<PaymentStatus>,
    pub new_payment_status: PaymentStatus,
    pub updated_by: Option<i64>,
    pub actor: Actor,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One payment attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub gateway: PaymentMethod,
    pub gateway_order_id: Option<String>,
    pub transaction_id: Option<String>,
    pub amount: BigDecimal,
    pub status: PaymentRecordStatus,
    pub response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order dengan items dan payments untuk response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
}

// ========================= CATALOG COLLABORATORS =========================

/// Cart line joined with the live product/variant row
#[derive(Debug, Clone)]
pub struct CartLine {
    pub cart_item_id: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i32,
    pub product_name: String,
    pub sku: Option<String>,
    pub variant_label: Option<String>,
    pub price: BigDecimal,
    pub discount_percent: BigDecimal,
    pub price_override: Option<BigDecimal>,
    pub available_stock: i32,
    pub is_active: bool,
}

impl CartLine {
    pub fn display_name(&self) -> String {
        match &self.variant_label {
            Some(label) => format!("{} ({})", self.product_name, label),
            None => self.product_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub kind: DiscountKind,
    pub value: BigDecimal,
    pub min_subtotal: Option<BigDecimal>,
    pub max_discount: Option<BigDecimal>,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// One cart line that cannot be fulfilled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockShortfall {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub name: String,
    pub requested: i32,
    pub available: i32,
}

// ========================= WRITE MODELS =========================

#[derive(Debug, Clone)]
pub struct DraftItem {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub product_name: String,
    pub variant_label: Option<String>,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub line_total: BigDecimal,
}

/// Everything needed to persist an order in one transaction
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub order_number: String,
    pub user_id: Option<i64>,
    pub guest_session: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub totals: OrderTotals,
    pub currency: String,
    pub coupon_code: Option<String>,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub shipping_address: AddressSnapshot,
    pub billing_address: AddressSnapshot,
    pub notes: Option<String>,
    pub items: Vec<DraftItem>,
    pub cart_owner: CartOwner,
    pub actor: Actor,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub gateway: PaymentMethod,
    pub gateway_order_id: Option<String>,
    pub transaction_id: Option<String>,
    pub amount: BigDecimal,
    pub status: PaymentRecordStatus,
    pub response: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct NewHistory {
    pub actor: Actor,
    pub updated_by: Option<i64>,
    pub comments: Option<String>,
}

/// Guarded mutation of one order.
///
/// The store applies it only if the order is still in
/// `expected_status`/`expected_payment_status`, so two writers racing on the
/// same order cannot both win.
#[derive(Debug, Clone)]
pub struct OrderChange {
    pub order_id: i64,
    pub expected_status: OrderStatus,
    pub expected_payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub cancel_reason: Option<String>,
    pub return_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub restock: bool,
    pub payment: Option<NewPayment>,
    pub history: Option<NewHistory>,
}

impl OrderChange {
    /// No-op change anchored on the current state
    pub fn for_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            expected_status: order.status,
            expected_payment_status: order.payment_status,
            status: order.status,
            payment_status: order.payment_status,
            cancel_reason: None,
            return_reason: None,
            cancelled_at: None,
            shipped_at: None,
            delivered_at: None,
            returned_at: None,
            transaction_id: None,
            gateway_response: None,
            restock: false,
            payment: None,
            history: None,
        }
    }
}

#[derive(Debug)]
pub enum ChangeOutcome {
    Applied(OrderDetails),
    /// The payment's transaction id was already recorded; nothing was written
    DuplicatePayment,
}

/// Filter untuk list orders
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub user_id: Option<i64>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub page: u32,
    pub limit: u32,
    pub include_deleted: bool,
}

/// Gateway setting as persisted; credentials stay sealed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredGatewaySetting {
    pub gateway: PaymentMethod,
    pub enabled: bool,
    pub display_name: String,
    pub sandbox: bool,
    pub sealed_credentials: Option<String>,
    pub public_key: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// ========================= GATEWAY DTOs =========================

/// Returned by `PaymentGateway::initiate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub gateway: PaymentMethod,
    pub gateway_order_id: Option<String>,
    pub amount: BigDecimal,
    pub currency: String,
    /// Redirect URL, checkout options or signed form fields
    pub payload: serde_json::Value,
}

/// How a callback points back at its order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderReference {
    GatewayOrderId(String),
    OrderNumber(String),
}

/// Raw callback as received from a gateway
#[derive(Debug, Clone)]
pub enum GatewayCallback {
    Razorpay {
        razorpay_order_id: String,
        razorpay_payment_id: String,
        razorpay_signature: String,
    },
    Phonepe {
        response: String,
        x_verify: String,
    },
    Paytm(BTreeMap<String, String>),
    Cod {
        order_number: String,
    },
}

/// What the gateway says happened to the money
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Success,
    Failed,
    /// Not settled yet (COD, or a gateway still processing)
    Pending,
}

/// Result of `PaymentGateway::verify` once the signature checked out
#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub outcome: PaymentOutcome,
    pub reference: OrderReference,
    pub transaction_id: Option<String>,
    pub amount: Option<BigDecimal>,
    pub raw_response: serde_json::Value,
}

// ========================= REQUEST DTOs =========================

/// Request untuk checkout
#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub shipping_address: Option<AddressSnapshot>,

    /// Saved address dari address book user
    pub shipping_address_id: Option<i64>,

    pub billing_address: Option<AddressSnapshot>,

    #[validate(length(min = 1, message = "payment_method is required"))]
    pub payment_method: String,

    #[validate(length(min = 3, max = 40))]
    pub coupon_code: Option<String>,

    #[validate(length(max = 500))]
    pub notes: Option<String>,

    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelOrderRequest {
    #[validate(length(min = 3, max = 500, message = "a cancellation reason is required"))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReturnOrderRequest {
    #[validate(length(min = 3, max = 500, message = "a return reason is required"))]
    pub reason: String,
}

/// Request untuk admin update order status
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    #[validate(length(min = 1, max = 50))]
    pub status: String,

    #[validate(length(max = 500))]
    pub comments: Option<String>,

    /// Explicit admin override for a jump outside the transition table
    #[serde(rename = "override", default)]
    pub force: bool,
}

/// Request untuk admin update payment status
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePaymentRequest {
    #[validate(length(min = 1, max = 50))]
    pub payment_status: String,

    #[validate(length(max = 500))]
    pub comments: Option<String>,

    #[serde(rename = "override", default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayVerifyRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Deserialize)]
pub struct PhonepeCallbackRequest {
    /// Base64 encoded JSON body signed by PhonePe
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusRequest {
    pub order_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CodConfirmRequest {
    pub order_number: String,
}

/// Admin request untuk update gateway setting
#[derive(Debug, Deserialize, Validate)]
pub struct PaymentSettingRequest {
    pub enabled: bool,

    #[validate(length(min = 2, max = 80))]
    pub display_name: Option<String>,

    #[serde(default)]
    pub sandbox: bool,

    /// Plain credentials; sealed before they touch storage
    pub credentials: Option<crate::core::secrets::GatewayCredentials>,
}

/// Query parameters untuk list orders
#[derive(Debug, Default, Deserialize)]
pub struct OrderQueryParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceQueryParams {
    pub format: Option<String>,
    pub locale: Option<String>,
}

// ========================= RESPONSE DTOs =========================

/// Response wrapper untuk single order
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<OrderDetails>,
}

/// Checkout result: the order always, the payment intent when initiation worked
#[derive(Debug, Serialize)]
pub struct CheckoutResult {
    pub order: OrderDetails,
    pub payment: Option<PaymentIntent>,
    pub payment_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub success: bool,
    pub message: String,
    pub data: CheckoutResult,
}

/// Response wrapper untuk list orders
#[derive(Debug, Serialize)]
pub struct OrdersListResponse {
    pub success: bool,
    pub message: String,
    pub data: Vec<Order>,
    pub pagination: Option<PaginationMeta>,
}

/// Metadata untuk pagination
#[derive(Debug, Serialize, Clone)]
pub struct PaginationMeta {
    pub current_page: u32,
    pub per_page: u32,
    pub total_items: i64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    /// Create pagination metadata dari hasil query
    pub fn new(current_page: u32, per_page: u32, total_items: i64) -> Self {
        let total_pages = ((total_items as f64) / (per_page.max(1) as f64)).ceil() as u32;

        Self {
            current_page,
            per_page,
            total_items,
            total_pages: total_pages.max(1),
            has_next: current_page < total_pages,
            has_prev: current_page > 1,
        }
    }
}

/// Public tracking projection, no PII
#[derive(Debug, Serialize)]
pub struct TrackingView {
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub placed_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub timeline: Vec<TrackingEvent>,
}

#[derive(Debug, Serialize)]
pub struct TrackingEvent {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
}

/// Sanitized gateway info untuk storefront
#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethodView {
    pub method: PaymentMethod,
    pub display_name: String,
    pub public_key: Option<String>,
    pub sandbox: bool,
}

/// Statistik order untuk admin dashboard
#[derive(Debug, Default, Serialize)]
pub struct AdminOrderStats {
    pub total_orders: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_payment_status: BTreeMap<String, i64>,
    pub paid_revenue: BigDecimal,
}

/// Generic envelope untuk endpoints tanpa response struct khusus
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// What a gateway callback is answered with; no PII
#[derive(Debug, Serialize)]
pub struct PaymentResultView {
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
}

impl From<&Order> for PaymentResultView {
    fn from(order: &Order) -> Self {
        Self {
            order_number: order.order_number.clone(),
            status: order.status,
            payment_status: order.payment_status,
            transaction_id: order.transaction_id.clone(),
        }
    }
}

/// Admin view of a gateway setting; sealed credentials never leave the store
#[derive(Debug, Serialize)]
pub struct PaymentSettingView {
    pub gateway: PaymentMethod,
    pub enabled: bool,
    pub display_name: String,
    pub sandbox: bool,
    pub public_key: Option<String>,
    pub has_credentials: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&StoredGatewaySetting> for PaymentSettingView {
    fn from(setting: &StoredGatewaySetting) -> Self {
        Self {
            gateway: setting.gateway,
            enabled: setting.enabled,
            display_name: setting.display_name.clone(),
            sandbox: setting.sandbox,
            public_key: setting.public_key.clone(),
            has_credentials: setting.sealed_credentials.is_some(),
            updated_at: setting.updated_at,
        }
    }
}

/// Standard error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    pub error_code: Option<String>,
    pub details: Option<serde_json::Value>,
}
