// /saree-store/services/order-service/src/core/pricing.rs

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Utc};

use crate::{
    config::ShippingSchedule,
    models::{CartLine, Coupon, DiscountKind, OrderTotals},
    utils::error::{AppError, AppResult},
};

/// Round ke 2 decimal places (paise)
pub fn round_money(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfUp)
}

/// price - price * discount_percent / 100, rounded to 2 dp
pub fn final_price(price: &BigDecimal, discount_percent: &BigDecimal) -> BigDecimal {
    let zero = BigDecimal::from(0);
    let hundred = BigDecimal::from(100);

    let pct = if discount_percent < &zero {
        zero
    } else if discount_percent > &hundred {
        hundred.clone()
    } else {
        discount_percent.clone()
    };

    round_money(&(price - price * pct / hundred))
}

/// Live unit price of a cart line; a variant override replaces the product price
pub fn unit_price(line: &CartLine) -> BigDecimal {
    let base = line.price_override.as_ref().unwrap_or(&line.price);
    final_price(base, &line.discount_percent)
}

pub fn line_total(unit_price: &BigDecimal, quantity: i32) -> BigDecimal {
    round_money(&(unit_price * BigDecimal::from(quantity)))
}

/// Discount granted by a coupon, never more than the subtotal
pub fn coupon_discount(coupon: &Coupon, subtotal: &BigDecimal, now: DateTime<Utc>) -> AppResult<BigDecimal> {
    if !coupon.active {
        return Err(AppError::Validation(format!("Coupon {} is not active", coupon.code)));
    }

    if coupon.expires_at.is_some_and(|expires| expires <= now) {
        return Err(AppError::Validation(format!("Coupon {} has expired", coupon.code)));
    }

    if let Some(min) = &coupon.min_subtotal {
        if subtotal < min {
            return Err(AppError::Validation(format!(
                "Coupon {} needs a minimum order of {}",
                coupon.code, min
            )));
        }
    }

    let raw = match coupon.kind {
        DiscountKind::Percent => round_money(&(subtotal * &coupon.value / BigDecimal::from(100))),
        DiscountKind::Flat => round_money(&coupon.value),
    };

    let capped = match &coupon.max_discount {
        Some(max) if &raw > max => max.clone(),
        _ => raw,
    };

    let zero = BigDecimal::from(0);
    Ok(if capped < zero {
        zero
    } else if &capped > subtotal {
        subtotal.clone()
    } else {
        capped
    })
}

/// Build the stored breakdown: total = subtotal - discount + shipping + tax
pub fn compute_totals(
    subtotal: &BigDecimal,
    discount: &BigDecimal,
    shipping: &ShippingSchedule,
    tax_rate_percent: &BigDecimal,
) -> OrderTotals {
    let subtotal = round_money(subtotal);
    let discount = round_money(discount);
    let shipping = round_money(&shipping.fee_for(&subtotal));
    let tax = round_money(&((&subtotal - &discount) * tax_rate_percent / BigDecimal::from(100)));
    let total = &subtotal - &discount + &shipping + &tax;

    OrderTotals {
        subtotal,
        discount,
        shipping,
        tax,
        total,
    }
}

/// Amount dalam paise untuk gateway API
pub fn to_minor_units(amount: &BigDecimal) -> AppResult<i64> {
    use bigdecimal::ToPrimitive;

    (round_money(amount) * BigDecimal::from(100))
        .with_scale(0)
        .to_i64()
        .ok_or_else(|| AppError::Validation(format!("Amount {} out of range", amount)))
}

pub fn from_minor_units(paise: i64) -> BigDecimal {
    round_money(&(BigDecimal::from(paise) / BigDecimal::from(100)))
}
