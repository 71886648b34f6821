// /saree-store/services/order-service/src/core/invoice.rs

use std::{fmt::Write as _, str::FromStr};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    core::pricing::round_money,
    models::{AddressSnapshot, OrderDetails, OrderStatus, PaymentMethod, PaymentRecordStatus, PaymentStatus},
    utils::error::AppError,
};

const MISSING: &str = "—";

/// Number formatting locale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvoiceLocale {
    /// 1,23,456.78
    #[default]
    EnIn,
    /// 123,456.78
    EnUs,
}

impl FromStr for InvoiceLocale {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en-in" | "en_in" => Ok(InvoiceLocale::EnIn),
            "en-us" | "en_us" => Ok(InvoiceLocale::EnUs),
            other => Err(AppError::Validation(format!("Unsupported locale '{}'", other))),
        }
    }
}

/// Loose invoice input; any part of it may be missing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InvoiceInput {
    pub order_number: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub status: Option<OrderStatus>,
    pub currency: Option<String>,
    pub billing_address: Option<AddressSnapshot>,
    pub shipping_address: Option<AddressSnapshot>,
    pub items: Vec<InvoiceItemInput>,
    pub subtotal: Option<BigDecimal>,
    pub discount: Option<BigDecimal>,
    pub shipping: Option<BigDecimal>,
    pub tax: Option<BigDecimal>,
    pub total: Option<BigDecimal>,
    pub coupon_code: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InvoiceItemInput {
    pub product_name: Option<String>,
    pub variant_label: Option<String>,
    pub sku: Option<String>,
    pub quantity: Option<i32>,
    pub unit_price: Option<BigDecimal>,
    pub line_total: Option<BigDecimal>,
}

impl From<&OrderDetails> for InvoiceInput {
    fn from(details: &OrderDetails) -> Self {
        let order = &details.order;

        // latest successful attempt wins over the order column
        let transaction_id = details
            .payments
            .iter()
            .rev()
            .find(|p| p.status == PaymentRecordStatus::Success)
            .and_then(|p| p.transaction_id.clone())
            .or_else(|| order.transaction_id.clone());

        Self {
            order_number: Some(order.order_number.clone()),
            created_at: Some(order.created_at),
            status: Some(order.status),
            currency: Some(order.currency.clone()),
            billing_address: Some(order.billing_address.clone()),
            shipping_address: Some(order.shipping_address.clone()),
            items: details
                .items
                .iter()
                .map(|item| InvoiceItemInput {
                    product_name: item.product_name.clone(),
                    variant_label: item.variant_label.clone(),
                    sku: item.sku.clone(),
                    quantity: Some(item.quantity),
                    unit_price: Some(item.unit_price.clone()),
                    line_total: Some(item.line_total.clone()),
                })
                .collect(),
            subtotal: Some(order.subtotal.clone()),
            discount: Some(order.discount.clone()),
            shipping: Some(order.shipping.clone()),
            tax: Some(order.tax.clone()),
            total: Some(order.total.clone()),
            coupon_code: order.coupon_code.clone(),
            payment_method: Some(order.payment_method),
            payment_status: Some(order.payment_status),
            transaction_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceLine {
    pub name: String,
    pub variant: Option<String>,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit_price: String,
    pub line_total: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceTotals {
    pub subtotal: String,
    pub discount: String,
    pub shipping: String,
    pub tax: String,
    pub total: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoicePayment {
    pub method: String,
    pub status: String,
    pub transaction_id: String,
}

/// Rendered invoice, ready for JSON or text output
#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    pub invoice_number: String,
    pub order_number: String,
    pub order_date: String,
    pub issued_at: String,
    pub order_status: String,
    pub currency: String,
    pub billing_address: Vec<String>,
    pub shipping_address: Vec<String>,
    pub lines: Vec<InvoiceLine>,
    pub coupon_code: Option<String>,
    pub totals: InvoiceTotals,
    pub payment: InvoicePayment,
}

/// Group the integer part according to the locale
fn group_digits(digits: &str, locale: InvoiceLocale) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }

    let (head, last3) = digits.split_at(digits.len() - 3);
    let group = match locale {
        InvoiceLocale::EnIn => 2,
        InvoiceLocale::EnUs => 3,
    };

    let mut groups = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(group);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();

    format!("{},{}", groups.join(","), last3)
}

/// 2 decimal places with locale thousands separators
pub fn format_amount(value: &BigDecimal, locale: InvoiceLocale) -> String {
    let plain = round_money(value).to_string();
    let (negative, unsigned) = match plain.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, plain.as_str()),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, "00"));

    format!(
        "{}{}.{:0<2}",
        if negative { "-" } else { "" },
        group_digits(int_part, locale),
        frac_part
    )
}

pub fn currency_symbol(currency: &str) -> String {
    match currency.to_uppercase().as_str() {
        "INR" => "₹".to_string(),
        other => format!("{} ", other),
    }
}

fn money(value: &BigDecimal, currency: &str, locale: InvoiceLocale) -> String {
    format!("{}{}", currency_symbol(currency), format_amount(value, locale))
}

fn address_block(address: Option<&AddressSnapshot>) -> Vec<String> {
    let Some(address) = address else {
        return vec![MISSING.to_string()];
    };

    let mut lines = vec![address.name.clone(), address.line1.clone()];
    if let Some(line2) = address.line2.as_ref().filter(|l| !l.trim().is_empty()) {
        lines.push(line2.clone());
    }
    if let Some(landmark) = address.landmark.as_ref().filter(|l| !l.trim().is_empty()) {
        lines.push(format!("Near {}", landmark));
    }
    lines.push(format!("{}, {} - {}", address.city, address.state, address.pincode));
    lines.push(address.country.clone());
    lines.push(format!("Phone: {}", address.phone));
    lines
}

/// Pure projection of an order into an invoice. Never fails.
pub fn build_invoice(input: &InvoiceInput, locale: InvoiceLocale, issued_at: DateTime<Utc>) -> Invoice {
    let currency = input.currency.clone().unwrap_or_else(|| "INR".to_string());
    let zero = BigDecimal::from(0);
    let amount = |value: Option<&BigDecimal>| money(value.unwrap_or(&zero), &currency, locale);

    let lines = input
        .items
        .iter()
        .map(|item| {
            let quantity = item.quantity.unwrap_or(0);
            let unit_price = item.unit_price.clone().unwrap_or_else(|| zero.clone());
            let line_total = item
                .line_total
                .clone()
                .unwrap_or_else(|| &unit_price * BigDecimal::from(quantity));

            InvoiceLine {
                name: item
                    .product_name
                    .clone()
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| "Product".to_string()),
                variant: item.variant_label.clone(),
                sku: item.sku.clone(),
                quantity,
                unit_price: money(&unit_price, &currency, locale),
                line_total: money(&line_total, &currency, locale),
            }
        })
        .collect();

    let order_number = input.order_number.clone().unwrap_or_else(|| MISSING.to_string());
    let billing = input.billing_address.as_ref().or(input.shipping_address.as_ref());

    Invoice {
        invoice_number: input
            .order_number
            .as_ref()
            .map(|number| format!("INV-{}", number))
            .unwrap_or_else(|| MISSING.to_string()),
        order_number,
        order_date: input
            .created_at
            .map(|at| at.format("%d %b %Y").to_string())
            .unwrap_or_else(|| MISSING.to_string()),
        issued_at: issued_at.format("%d %b %Y").to_string(),
        order_status: input
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| MISSING.to_string()),
        currency: currency.clone(),
        billing_address: address_block(billing),
        shipping_address: address_block(input.shipping_address.as_ref()),
        lines,
        coupon_code: input.coupon_code.clone(),
        totals: InvoiceTotals {
            subtotal: amount(input.subtotal.as_ref()),
            discount: amount(input.discount.as_ref()),
            shipping: amount(input.shipping.as_ref()),
            tax: amount(input.tax.as_ref()),
            total: amount(input.total.as_ref()),
        },
        payment: InvoicePayment {
            method: input
                .payment_method
                .map(|m| m.display_name().to_string())
                .unwrap_or_else(|| MISSING.to_string()),
            status: input
                .payment_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| MISSING.to_string()),
            transaction_id: input
                .transaction_id
                .clone()
                .unwrap_or_else(|| MISSING.to_string()),
        },
    }
}

/// Plain text rendering for email bodies and downloads
pub fn render_text(invoice: &Invoice) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "TAX INVOICE  {}", invoice.invoice_number);
    let _ = writeln!(out, "Order: {}    Date: {}", invoice.order_number, invoice.order_date);
    let _ = writeln!(out, "Issued: {}    Status: {}", invoice.issued_at, invoice.order_status);
    let _ = writeln!(out);

    let _ = writeln!(out, "Bill to:");
    for line in &invoice.billing_address {
        let _ = writeln!(out, "  {}", line);
    }
    let _ = writeln!(out, "Ship to:");
    for line in &invoice.shipping_address {
        let _ = writeln!(out, "  {}", line);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "{:<40} {:>5} {:>16} {:>16}", "Item", "Qty", "Unit price", "Amount");
    for line in &invoice.lines {
        let name = match &line.variant {
            Some(variant) => format!("{} ({})", line.name, variant),
            None => line.name.clone(),
        };
        let _ = writeln!(
            out,
            "{:<40} {:>5} {:>16} {:>16}",
            name, line.quantity, line.unit_price, line.line_total
        );
    }
    let _ = writeln!(out);

    let totals = &invoice.totals;
    let _ = writeln!(out, "{:>62} {:>16}", "Subtotal", totals.subtotal);
    match &invoice.coupon_code {
        Some(code) => {
            let _ = writeln!(out, "{:>62} {:>16}", format!("Discount ({})", code), totals.discount);
        }
        None => {
            let _ = writeln!(out, "{:>62} {:>16}", "Discount", totals.discount);
        }
    }
    let _ = writeln!(out, "{:>62} {:>16}", "Shipping", totals.shipping);
    let _ = writeln!(out, "{:>62} {:>16}", "Tax", totals.tax);
    let _ = writeln!(out, "{:>62} {:>16}", "Total", totals.total);
    let _ = writeln!(out);

    let _ = writeln!(out, "Payment: {} ({})", invoice.payment.method, invoice.payment.status);
    let _ = writeln!(out, "Transaction: {}", invoice.payment.transaction_id);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_lakh_grouping() {
        assert_eq!(format_amount(&dec("123456.78"), InvoiceLocale::EnIn), "1,23,456.78");
        assert_eq!(format_amount(&dec("12345678.9"), InvoiceLocale::EnIn), "1,23,45,678.90");
        assert_eq!(format_amount(&dec("999"), InvoiceLocale::EnIn), "999.00");
        assert_eq!(format_amount(&dec("-2099"), InvoiceLocale::EnIn), "-2,099.00");
    }

    #[test]
    fn test_us_grouping() {
        assert_eq!(format_amount(&dec("123456.78"), InvoiceLocale::EnUs), "123,456.78");
        assert_eq!(format_amount(&dec("1234567"), InvoiceLocale::EnUs), "1,234,567.00");
    }

    #[test]
    fn test_missing_data_fallbacks() {
        let input = InvoiceInput {
            order_number: Some("ORD-20260101-ABC123".to_string()),
            items: vec![InvoiceItemInput {
                product_name: None,
                quantity: Some(3),
                unit_price: Some(dec("1250.50")),
                ..Default::default()
            }],
            ..Default::default()
        };

        let invoice = build_invoice(&input, InvoiceLocale::EnIn, Utc::now());

        assert_eq!(invoice.invoice_number, "INV-ORD-20260101-ABC123");
        assert_eq!(invoice.lines[0].name, "Product");
        assert_eq!(invoice.lines[0].line_total, "₹3,751.50");
        assert_eq!(invoice.totals.total, "₹0.00");
        assert_eq!(invoice.shipping_address, vec!["—".to_string()]);
        assert_eq!(invoice.payment.transaction_id, "—");
    }

    #[test]
    fn test_missing_price_is_zero() {
        let input = InvoiceInput {
            items: vec![InvoiceItemInput {
                product_name: Some("Chanderi Cotton Saree".to_string()),
                quantity: Some(2),
                ..Default::default()
            }],
            ..Default::default()
        };

        let invoice = build_invoice(&input, InvoiceLocale::EnIn, Utc::now());
        assert_eq!(invoice.lines[0].unit_price, "₹0.00");
        assert_eq!(invoice.lines[0].line_total, "₹0.00");
        assert_eq!(invoice.invoice_number, "—");
    }

    #[test]
    fn test_from_order_details_and_text() {
        let details = crate::core::test_support::sample_details(PaymentMethod::Cod);
        let invoice = build_invoice(&InvoiceInput::from(&details), InvoiceLocale::EnIn, Utc::now());

        assert_eq!(invoice.totals.total, "₹2,099.00");
        assert_eq!(invoice.lines.len(), 1);
        assert_eq!(invoice.payment.method, "Cash on Delivery");

        let text = render_text(&invoice);
        assert!(text.contains("INV-ORD-20260101-ABC123"));
        assert!(text.contains("₹2,099.00"));
        assert!(text.contains("Chennai, Tamil Nadu - 600004"));
    }
}
