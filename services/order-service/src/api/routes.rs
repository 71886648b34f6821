// /saree-store/services/order-service/src/api/routes.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, patch, post, put},
    Router,
};

use super::handlers;
use crate::{middleware::auth::require_admin, AppState};

/// Create semua routes untuk order service
pub fn create_routes() -> Router<AppState> {
    Router::new()
        // Customer order routes
        .route("/api/orders", post(handlers::checkout).get(handlers::list_orders))
        .route("/api/orders/{id}", get(handlers::get_order))
        .route("/api/orders/{id}/cancel", post(handlers::cancel_order))
        .route("/api/orders/{id}/return", post(handlers::request_return))
        .route("/api/orders/{id}/payment", post(handlers::retry_payment))
        .route("/api/orders/{id}/invoice", get(handlers::get_invoice))
        .route("/api/orders/track/{order_number}", get(handlers::track_order))
        // Payment routes (callbacks are public, signature-checked)
        .route("/api/payment/methods", get(handlers::payment_methods))
        .route("/api/payment/razorpay/verify", post(handlers::razorpay_verify))
        .route("/api/payment/phonepe/callback", post(handlers::phonepe_callback))
        .route("/api/payment/phonepe/status", post(handlers::phonepe_status))
        .route("/api/payment/paytm/callback", post(handlers::paytm_callback))
        .route("/api/payment/cod/confirm", post(handlers::cod_confirm))
        // Health
        .route("/health", get(handlers::health))
        .route("/health/detailed", get(handlers::health_detailed))
        .merge(admin_routes())
}

/// Admin routes, role admin wajib
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/orders", get(handlers::admin_list_orders))
        .route("/api/admin/orders/stats", get(handlers::admin_order_stats))
        .route(
            "/api/admin/orders/{id}",
            axum::routing::delete(handlers::admin_delete_order),
        )
        .route("/api/admin/orders/{id}/history", get(handlers::admin_order_history))
        .route("/api/admin/orders/{id}/status", patch(handlers::admin_update_status))
        .route("/api/admin/orders/{id}/payment", patch(handlers::admin_update_payment))
        .route("/api/admin/payment-settings", get(handlers::admin_payment_settings))
        .route(
            "/api/admin/payment-settings/{gateway}",
            put(handlers::admin_update_payment_setting),
        )
        .route_layer(axum_middleware::from_fn(require_admin))
}
