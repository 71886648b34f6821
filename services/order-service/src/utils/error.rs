// /saree-store/services/order-service/src/utils/error.rs
// Centralized error handling untuk order service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use crate::models::{ErrorResponse, StockShortfall};

/// Type alias untuk Result dengan AppError
pub type AppResult<T> = Result<T, AppError>;

/// Application error enum dengan semua possible errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Insufficient stock for {} item(s)", .0.len())]
    InsufficientStock(Vec<StockShortfall>),

    #[error("Payment verification failed: {0}")]
    PaymentVerification(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Shorthand untuk transition errors dari dua status apa saja
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        AppError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Stable machine-readable code untuk response body
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::EmptyCart => "EMPTY_CART",
            AppError::InvalidAddress(_) => "INVALID_ADDRESS",
            AppError::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            AppError::PaymentVerification(_) => "PAYMENT_VERIFICATION_FAILED",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::GatewayTimeout(_) => "GATEWAY_TIMEOUT",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    /// Convert AppError ke HTTP response
    fn into_response(self) -> Response {
        let code = self.error_code();
        let (status, message, details) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::EmptyCart => (
                StatusCode::BAD_REQUEST,
                "Your cart is empty".to_string(),
                None,
            ),
            AppError::InvalidAddress(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                msg.clone(),
                None,
            ),
            AppError::InsufficientStock(items) => (
                StatusCode::CONFLICT,
                format!(
                    "Insufficient stock for: {}",
                    items.iter().map(|i| i.name.as_str()).collect::<Vec<_>>().join(", ")
                ),
                serde_json::to_value(items).ok(),
            ),
            AppError::PaymentVerification(msg) => {
                tracing::warn!("Payment verification failed: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone(), None)
            }
            AppError::InvalidTransition { from, to } => (
                StatusCode::CONFLICT,
                format!("Transition {} -> {} is not allowed", from, to),
                Some(serde_json::json!({ "from": from, "to": to })),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::GatewayTimeout(msg) => {
                tracing::warn!("Gateway timeout: {}", msg);
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "Payment pending — check status later".to_string(),
                    None,
                )
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone(), None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone(), None),
            AppError::ExternalService(msg) => {
                tracing::error!("External service error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Payment gateway unavailable".to_string(),
                    None,
                )
            }
            AppError::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database operation failed".to_string(),
                    None,
                )
            }
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Service configuration error".to_string(),
                    None,
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error_code: Some(code.to_string()),
            details,
        });

        (status, body).into_response()
    }
}

// Implement conversions dari common error types
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::GatewayTimeout(err.to_string())
        } else {
            AppError::ExternalService(err.to_string())
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Cek apakah sqlx error adalah unique violation (SQLSTATE 23505)
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_insufficient_stock_response_lists_items() {
        let err = AppError::InsufficientStock(vec![StockShortfall {
            product_id: 7,
            variant_id: Some(70),
            name: "Banarasi Silk Saree (Red / Free Size)".to_string(),
            requested: 2,
            available: 1,
        }]);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error_code"], "INSUFFICIENT_STOCK");
        assert_eq!(json["details"][0]["variant_id"], 70);
        assert_eq!(json["details"][0]["available"], 1);
    }

    #[tokio::test]
    async fn test_internal_errors_hide_message() {
        let response = AppError::Database("relation orders does not exist".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Database operation failed");
    }

    #[test]
    fn test_gateway_timeout_code() {
        let err = AppError::GatewayTimeout("razorpay".to_string());
        assert_eq!(err.error_code(), "GATEWAY_TIMEOUT");
    }
}
