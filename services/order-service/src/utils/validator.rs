// /saree-store/services/order-service/src/utils/validator.rs

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::utils::error::{AppError, AppResult};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

static ORDER_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ORD-[0-9]{8}-[A-Z0-9]{6}$").expect("valid order number regex")
});

/// Validasi guest session header (UUID)
pub fn validate_guest_session(raw: &str) -> AppResult<String> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .map_err(|_| AppError::Validation("X-Guest-Session harus berupa UUID".to_string()))
}

/// Validasi order id dari path
pub fn validate_order_id(order_id: i64) -> AppResult<i64> {
    if order_id <= 0 {
        return Err(AppError::Validation(format!("Order id {} tidak valid", order_id)));
    }
    Ok(order_id)
}

/// Validasi format order number (ORD-YYYYMMDD-XXXXXX)
pub fn validate_order_number(order_number: &str) -> AppResult<&str> {
    let trimmed = order_number.trim();
    if !ORDER_NUMBER_RE.is_match(trimmed) {
        return Err(AppError::Validation(format!(
            "Order number '{}' tidak valid",
            order_number
        )));
    }
    Ok(trimmed)
}

/// Validasi pagination parameters, defaults applied
pub fn validate_pagination(page: Option<u32>, limit: Option<u32>) -> AppResult<(u32, u32)> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);

    if page == 0 {
        return Err(AppError::Validation("Page harus dimulai dari 1".to_string()));
    }

    if limit == 0 {
        return Err(AppError::Validation("Limit harus lebih besar dari 0".to_string()));
    }

    if limit > MAX_PAGE_SIZE {
        return Err(AppError::Validation(format!(
            "Limit maksimal {} items per page",
            MAX_PAGE_SIZE
        )));
    }

    Ok((page, limit))
}

/// Validasi string tidak kosong dan dalam batas panjang
pub fn validate_string_length(value: &str, field_name: &str, min_len: usize, max_len: usize) -> AppResult<String> {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} tidak boleh kosong", field_name)));
    }

    let len = trimmed.chars().count();
    if len < min_len {
        return Err(AppError::Validation(format!(
            "{} minimal {} karakter",
            field_name, min_len
        )));
    }

    if len > max_len {
        return Err(AppError::Validation(format!(
            "{} maksimal {} karakter",
            field_name, max_len
        )));
    }

    Ok(trimmed.to_string())
}

/// Validasi transaction / reference id dari payment gateway
pub fn validate_gateway_reference(value: &str, field_name: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} tidak boleh kosong", field_name)));
    }

    if value.len() > 100 {
        return Err(AppError::Validation(format!("{} terlalu panjang", field_name)));
    }

    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::Validation(format!("{} mengandung karakter tidak valid", field_name)));
    }

    Ok(())
}
