// /saree-store/services/order-service/src/core/gateway/razorpay.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::{gateway_error, verify_hmac_sha256_hex, GatewayContext, PaymentGateway};
use crate::{
    core::pricing::{from_minor_units, to_minor_units},
    models::*,
    utils::error::{AppError, AppResult},
};

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    status: Option<String>,
}

/// Client untuk Razorpay Orders API
pub struct RazorpayClient {
    key_id: String,
    key_secret: String,
    ctx: GatewayContext,
}

impl Drop for RazorpayClient {
    fn drop(&mut self) {
        self.key_secret.zeroize();
    }
}

impl RazorpayClient {
    pub fn new(key_id: String, key_secret: String, ctx: GatewayContext) -> Self {
        Self { key_id, key_secret, ctx }
    }

    /// Message signed by Razorpay checkout
    pub fn signature_payload(razorpay_order_id: &str, razorpay_payment_id: &str) -> String {
        format!("{}|{}", razorpay_order_id, razorpay_payment_id)
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Razorpay
    }

    async fn initiate(&self, order: &Order) -> AppResult<PaymentIntent> {
        let amount = to_minor_units(&order.total)?;
        let url = format!("{}/orders", self.ctx.endpoints.razorpay.trim_end_matches('/'));
        let body = CreateOrderRequest {
            amount,
            currency: &order.currency,
            receipt: &order.order_number,
            notes: serde_json::json!({ "order_id": order.id }),
        };

        let response = self
            .ctx
            .send_with_retry(PaymentMethod::Razorpay, || {
                self.ctx
                    .http
                    .post(&url)
                    .basic_auth(&self.key_id, Some(&self.key_secret))
                    .json(&body)
            })
            .await?;

        if !response.status().is_success() {
            return Err(gateway_error(PaymentMethod::Razorpay, response).await);
        }

        let created: CreateOrderResponse = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse Razorpay response: {}", e))
        })?;

        if created.amount != amount {
            return Err(AppError::ExternalService(format!(
                "Razorpay created order {} for {} paise, expected {}",
                created.id, created.amount, amount
            )));
        }

        tracing::info!(
            gateway = "razorpay",
            "Razorpay order {} created for {} ({:?})",
            created.id,
            order.order_number,
            created.status
        );

        Ok(PaymentIntent {
            gateway: PaymentMethod::Razorpay,
            gateway_order_id: Some(created.id.clone()),
            amount: from_minor_units(created.amount),
            currency: created.currency.clone(),
            payload: serde_json::json!({
                "key": self.key_id,
                "order_id": created.id,
                "amount": created.amount,
                "currency": created.currency,
                "name": "Saree Store",
                "description": format!("Order {}", order.order_number),
                "prefill": {
                    "name": order.shipping_address.name,
                    "email": order.customer_email,
                    "contact": order.customer_phone,
                },
                "callback_url": format!("{}/api/payment/razorpay/verify", self.ctx.public_base_url),
            }),
        })
    }

    fn verify(&self, callback: &GatewayCallback) -> AppResult<VerifiedPayment> {
        let GatewayCallback::Razorpay {
            razorpay_order_id,
            razorpay_payment_id,
            razorpay_signature,
        } = callback
        else {
            return Err(AppError::PaymentVerification("Not a Razorpay callback".to_string()));
        };

        let payload = Self::signature_payload(razorpay_order_id, razorpay_payment_id);
        verify_hmac_sha256_hex(&self.key_secret, &payload, razorpay_signature).map_err(|e| {
            tracing::warn!(gateway = "razorpay", "Signature check failed for {}", razorpay_order_id);
            e
        })?;

        Ok(VerifiedPayment {
            outcome: PaymentOutcome::Success,
            reference: OrderReference::GatewayOrderId(razorpay_order_id.clone()),
            transaction_id: Some(razorpay_payment_id.clone()),
            // amount was fixed when the Razorpay order was created
            amount: None,
            raw_response: serde_json::json!({
                "razorpay_order_id": razorpay_order_id,
                "razorpay_payment_id": razorpay_payment_id,
            }),
        })
    }
}
