// /saree-store/services/order-service/src/core/test_support.rs
// Shared fixtures untuk unit tests

use bigdecimal::BigDecimal;
use chrono::{TimeZone, Utc};

use crate::models::*;

pub fn sample_address() -> AddressSnapshot {
    AddressSnapshot {
        name: "Lakshmi Iyer".to_string(),
        phone: "9876543210".to_string(),
        email: Some("lakshmi@example.com".to_string()),
        line1: "12 Temple Street".to_string(),
        line2: Some("Mylapore".to_string()),
        landmark: None,
        city: "Chennai".to_string(),
        state: "Tamil Nadu".to_string(),
        pincode: "600004".to_string(),
        country: "India".to_string(),
    }
}

/// Order of 2 x 1000 plus 99 shipping
pub fn sample_order(method: PaymentMethod) -> Order {
    let created_at = Utc.with_ymd_and_hms(2026, 1, 1, 10, 30, 0).single().unwrap_or_else(Utc::now);

    Order {
        id: 1,
        order_number: "ORD-20260101-ABC123".to_string(),
        user_id: Some(42),
        guest_session: None,
        customer_email: Some("lakshmi@example.com".to_string()),
        customer_phone: Some("9876543210".to_string()),
        subtotal: BigDecimal::from(2000),
        discount: BigDecimal::from(0),
        shipping: BigDecimal::from(99),
        tax: BigDecimal::from(0),
        total: BigDecimal::from(2099),
        currency: "INR".to_string(),
        coupon_code: None,
        status: if method.requires_redirect() {
            OrderStatus::Pending
        } else {
            OrderStatus::Placed
        },
        payment_status: PaymentStatus::Pending,
        payment_method: method,
        gateway_order_id: None,
        transaction_id: None,
        gateway_response: None,
        shipping_address: sample_address(),
        billing_address: sample_address(),
        notes: None,
        cancel_reason: None,
        cancelled_at: None,
        shipped_at: None,
        delivered_at: None,
        return_reason: None,
        returned_at: None,
        deleted_at: None,
        created_at,
        updated_at: created_at,
    }
}

pub fn sample_details(method: PaymentMethod) -> OrderDetails {
    let order = sample_order(method);
    let item = OrderItem {
        id: 1,
        order_id: order.id,
        product_id: 7,
        variant_id: Some(70),
        product_name: Some("Banarasi Silk Saree".to_string()),
        variant_label: Some("Red / Free Size".to_string()),
        sku: Some("BSS-RED-FS".to_string()),
        quantity: 2,
        unit_price: BigDecimal::from(1000),
        line_total: BigDecimal::from(2000),
        created_at: order.created_at,
    };

    OrderDetails {
        order,
        items: vec![item],
        payments: Vec::new(),
    }
}
