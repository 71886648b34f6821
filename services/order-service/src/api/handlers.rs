// /saree-store/services/order-service/src/api/handlers.rs

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension, Form,
};
use validator::Validate;

use crate::{
    core::invoice::render_text,
    models::*,
    utils::{
        error::{AppError, AppResult},
        health::{comprehensive_health_check, HealthCheckResult},
        validator::validate_gateway_reference,
    },
    AppState,
};

// ========================= CUSTOMER ORDER HANDLERS =========================

/// Checkout cart jadi order
/// POST /api/orders
pub async fn checkout(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<CheckoutResponse>)> {
    let result = state.checkout.checkout(&identity, payload).await?;

    let message = match &result.payment_error {
        Some(_) => "Order placed, payment pending".to_string(),
        None => format!("Order {} placed", result.order.order.order_number),
    };

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            success: true,
            message,
            data: result,
        }),
    ))
}

/// GET /api/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<OrderQueryParams>,
) -> AppResult<Json<OrdersListResponse>> {
    let (orders, pagination) = state.lifecycle.list_for_customer(&identity, &params).await?;

    Ok(Json(OrdersListResponse {
        success: true,
        message: format!("{} order(s) found", pagination.total_items),
        data: orders,
        pagination: Some(pagination),
    }))
}

/// GET /api/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(order_id): Path<i64>,
) -> AppResult<Json<OrderResponse>> {
    let details = state.lifecycle.get_order(&identity, order_id).await?;

    Ok(Json(OrderResponse {
        success: true,
        message: "Order berhasil diambil".to_string(),
        data: Some(details),
    }))
}

/// POST /api/orders/{id}/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(order_id): Path<i64>,
    Json(payload): Json<CancelOrderRequest>,
) -> AppResult<Json<OrderResponse>> {
    payload.validate()?;
    let details = state.lifecycle.cancel(&identity, order_id, &payload.reason).await?;

    Ok(Json(OrderResponse {
        success: true,
        message: "Order cancelled".to_string(),
        data: Some(details),
    }))
}

/// POST /api/orders/{id}/return
pub async fn request_return(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(order_id): Path<i64>,
    Json(payload): Json<ReturnOrderRequest>,
) -> AppResult<Json<OrderResponse>> {
    payload.validate()?;
    let details = state.lifecycle.request_return(&identity, order_id, &payload.reason).await?;

    Ok(Json(OrderResponse {
        success: true,
        message: "Return requested".to_string(),
        data: Some(details),
    }))
}

/// Start (or restart) payment untuk existing order
/// POST /api/orders/{id}/payment
pub async fn retry_payment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(order_id): Path<i64>,
) -> AppResult<Json<ApiResponse<PaymentIntent>>> {
    let intent = state.payments.retry_payment(&identity, order_id).await?;
    Ok(Json(ApiResponse::ok("Payment initiated", intent)))
}

/// GET /api/orders/{id}/invoice?format=json|text&locale=en-IN|en-US
pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(order_id): Path<i64>,
    Query(params): Query<InvoiceQueryParams>,
) -> AppResult<Response> {
    let invoice = state.lifecycle.invoice(&identity, order_id, &params).await?;

    match params.format.as_deref().unwrap_or("json") {
        "json" => Ok(Json(ApiResponse::ok("Invoice generated", invoice)).into_response()),
        "text" => Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            render_text(&invoice),
        )
            .into_response()),
        other => Err(AppError::Validation(format!("Unsupported invoice format '{}'", other))),
    }
}

/// Public tracking, tanpa PII
/// GET /api/orders/track/{order_number}
pub async fn track_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> AppResult<Json<ApiResponse<TrackingView>>> {
    let view = state.lifecycle.track(&order_number).await?;
    Ok(Json(ApiResponse::ok("Tracking info", view)))
}

// ========================= PAYMENT HANDLERS =========================

/// GET /api/payment/methods
pub async fn payment_methods(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Vec<PaymentMethodView>>>> {
    let methods = state.payments.methods().await?;
    Ok(Json(ApiResponse::ok("Available payment methods", methods)))
}

fn payment_result(details: &OrderDetails) -> Json<ApiResponse<PaymentResultView>> {
    let message = match details.order.payment_status {
        PaymentStatus::Paid => "Payment successful",
        PaymentStatus::Failed => "Payment failed",
        _ => "Payment status recorded",
    };
    Json(ApiResponse::ok(message, PaymentResultView::from(&details.order)))
}

/// POST /api/payment/razorpay/verify
pub async fn razorpay_verify(
    State(state): State<AppState>,
    Json(payload): Json<RazorpayVerifyRequest>,
) -> AppResult<Json<ApiResponse<PaymentResultView>>> {
    validate_gateway_reference(&payload.razorpay_order_id, "razorpay_order_id")?;
    validate_gateway_reference(&payload.razorpay_payment_id, "razorpay_payment_id")?;

    let details = state
        .payments
        .reconcile(GatewayCallback::Razorpay {
            razorpay_order_id: payload.razorpay_order_id,
            razorpay_payment_id: payload.razorpay_payment_id,
            razorpay_signature: payload.razorpay_signature,
        })
        .await?;

    Ok(payment_result(&details))
}

/// Server-to-server callback dari PhonePe
/// POST /api/payment/phonepe/callback
pub async fn phonepe_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PhonepeCallbackRequest>,
) -> AppResult<Json<ApiResponse<PaymentResultView>>> {
    let x_verify = headers
        .get("x-verify")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::PaymentVerification("X-VERIFY header missing".to_string()))?;

    let details = state
        .payments
        .reconcile(GatewayCallback::Phonepe {
            response: payload.response,
            x_verify: x_verify.to_string(),
        })
        .await?;

    Ok(payment_result(&details))
}

/// On-demand PhonePe status check
/// POST /api/payment/phonepe/status
pub async fn phonepe_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<PaymentStatusRequest>,
) -> AppResult<Json<ApiResponse<PaymentResultView>>> {
    let details = state.payments.phonepe_status(&identity, payload.order_id).await?;
    Ok(payment_result(&details))
}

/// Paytm posts the signed form back
/// POST /api/payment/paytm/callback
pub async fn paytm_callback(
    State(state): State<AppState>,
    Form(fields): Form<BTreeMap<String, String>>,
) -> AppResult<Json<ApiResponse<PaymentResultView>>> {
    let details = state.payments.reconcile(GatewayCallback::Paytm(fields)).await?;
    Ok(payment_result(&details))
}

/// POST /api/payment/cod/confirm
pub async fn cod_confirm(
    State(state): State<AppState>,
    Json(payload): Json<CodConfirmRequest>,
) -> AppResult<Json<ApiResponse<PaymentResultView>>> {
    let details = state.payments.cod_confirm(&payload.order_number).await?;
    Ok(payment_result(&details))
}

// ========================= ADMIN HANDLERS =========================

/// GET /api/admin/orders
pub async fn admin_list_orders(
    State(state): State<AppState>,
    Query(params): Query<OrderQueryParams>,
) -> AppResult<Json<OrdersListResponse>> {
    let (orders, pagination) = state.lifecycle.list_for_admin(&params).await?;

    Ok(Json(OrdersListResponse {
        success: true,
        message: format!("{} order(s) found", pagination.total_items),
        data: orders,
        pagination: Some(pagination),
    }))
}

/// GET /api/admin/orders/stats
pub async fn admin_order_stats(State(state): State<AppState>) -> AppResult<Json<ApiResponse<AdminOrderStats>>> {
    let stats = state.lifecycle.stats().await?;
    Ok(Json(ApiResponse::ok("Order statistics", stats)))
}

/// GET /api/admin/orders/{id}/history
pub async fn admin_order_history(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<OrderStatusHistory>>>> {
    let history = state.lifecycle.history(order_id).await?;
    Ok(Json(ApiResponse::ok(format!("{} history entries", history.len()), history)))
}

/// PATCH /api/admin/orders/{id}/status
pub async fn admin_update_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(order_id): Path<i64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<OrderResponse>> {
    payload.validate()?;
    let details = state.lifecycle.update_status(&identity, order_id, &payload).await?;

    Ok(Json(OrderResponse {
        success: true,
        message: format!("Order status updated to {}", details.order.status),
        data: Some(details),
    }))
}

/// PATCH /api/admin/orders/{id}/payment
pub async fn admin_update_payment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(order_id): Path<i64>,
    Json(payload): Json<UpdatePaymentRequest>,
) -> AppResult<Json<OrderResponse>> {
    payload.validate()?;
    let details = state.lifecycle.update_payment_status(&identity, order_id, &payload).await?;

    Ok(Json(OrderResponse {
        success: true,
        message: format!("Payment status updated to {}", details.order.payment_status),
        data: Some(details),
    }))
}

/// DELETE /api/admin/orders/{id}
pub async fn admin_delete_order(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(order_id): Path<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    state.lifecycle.soft_delete(&identity, order_id).await?;
    Ok(Json(ApiResponse::ok(
        "Order deleted",
        serde_json::json!({ "order_id": order_id }),
    )))
}

/// GET /api/admin/payment-settings
pub async fn admin_payment_settings(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<PaymentSettingView>>>> {
    let settings = state.payments.settings().await?;
    Ok(Json(ApiResponse::ok("Payment settings", settings)))
}

/// PUT /api/admin/payment-settings/{gateway}
pub async fn admin_update_payment_setting(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    Json(payload): Json<PaymentSettingRequest>,
) -> AppResult<Json<ApiResponse<PaymentSettingView>>> {
    payload.validate()?;
    let gateway: PaymentMethod = gateway.parse()?;
    let view = state.payments.save_setting(gateway, payload).await?;

    Ok(Json(ApiResponse::ok("Payment setting updated", view)))
}

// ========================= HEALTH =========================

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "order-service",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now(),
    }))
}

/// GET /health/detailed
pub async fn health_detailed(State(state): State<AppState>) -> (StatusCode, Json<HealthCheckResult>) {
    let result = comprehensive_health_check(&state.store).await;
    let status = match result.status {
        crate::utils::health::HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(result))
}
