// /saree-store/services/order-service/src/core/gateway/phonepe.rs

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use zeroize::Zeroize;

use super::{constant_time_eq, gateway_error, sha256_hex, GatewayContext, PaymentGateway};
use crate::{
    core::pricing::{from_minor_units, to_minor_units},
    models::*,
    utils::error::{AppError, AppResult},
};

const PAY_PATH: &str = "/pg/v1/pay";

/// Decoded PhonePe status / callback body
#[derive(Debug, Deserialize)]
struct PhonepeStatus {
    #[serde(default)]
    success: bool,
    code: String,
    #[serde(default)]
    data: Option<PhonepeStatusData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhonepeStatusData {
    merchant_transaction_id: String,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
}

/// Client untuk PhonePe PG API
pub struct PhonepeClient {
    merchant_id: String,
    salt_key: String,
    salt_index: String,
    ctx: GatewayContext,
}

impl Drop for PhonepeClient {
    fn drop(&mut self) {
        self.salt_key.zeroize();
    }
}

impl PhonepeClient {
    pub fn new(merchant_id: String, salt_key: String, salt_index: String, ctx: GatewayContext) -> Self {
        Self {
            merchant_id,
            salt_key,
            salt_index,
            ctx,
        }
    }

    /// sha256(payload + salt_key) + "###" + salt_index
    pub fn x_verify(&self, payload: &str) -> String {
        format!("{}###{}", sha256_hex(&format!("{}{}", payload, self.salt_key)), self.salt_index)
    }

    /// Unique per attempt so retries get a fresh PhonePe transaction
    fn merchant_transaction_id(order: &Order) -> String {
        format!(
            "{}{}",
            order.order_number.replace('-', ""),
            Utc::now().timestamp_millis() % 1_000_000
        )
    }

    fn map_status(&self, status: PhonepeStatus, raw: serde_json::Value) -> AppResult<VerifiedPayment> {
        let data = status.data.ok_or_else(|| {
            AppError::PaymentVerification(format!("PhonePe response without data (code {})", status.code))
        })?;

        let outcome = match status.code.as_str() {
            "PAYMENT_SUCCESS" if status.success => PaymentOutcome::Success,
            "PAYMENT_PENDING" | "INTERNAL_SERVER_ERROR" => PaymentOutcome::Pending,
            _ => PaymentOutcome::Failed,
        };

        Ok(VerifiedPayment {
            outcome,
            reference: OrderReference::GatewayOrderId(data.merchant_transaction_id),
            transaction_id: data.transaction_id,
            amount: data.amount.map(from_minor_units),
            raw_response: raw,
        })
    }
}

#[async_trait]
impl PaymentGateway for PhonepeClient {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Phonepe
    }

    async fn initiate(&self, order: &Order) -> AppResult<PaymentIntent> {
        let merchant_transaction_id = Self::merchant_transaction_id(order);
        let amount = to_minor_units(&order.total)?;
        let payload = serde_json::json!({
            "merchantId": self.merchant_id,
            "merchantTransactionId": merchant_transaction_id,
            "merchantUserId": order
                .user_id
                .map(|id| format!("U{}", id))
                .unwrap_or_else(|| format!("G{}", order.id)),
            "amount": amount,
            "redirectUrl": format!("{}/orders/{}", self.ctx.frontend_base_url, order.order_number),
            "redirectMode": "REDIRECT",
            "callbackUrl": format!("{}/api/payment/phonepe/callback", self.ctx.public_base_url),
            "mobileNumber": order.shipping_address.phone,
            "paymentInstrument": { "type": "PAY_PAGE" },
        });

        let encoded = base64::engine::general_purpose::STANDARD.encode(payload.to_string());
        let x_verify = self.x_verify(&format!("{}{}", encoded, PAY_PATH));
        let url = format!("{}{}", self.ctx.endpoints.phonepe.trim_end_matches('/'), PAY_PATH);
        let body = serde_json::json!({ "request": encoded });

        let response = self
            .ctx
            .send_with_retry(PaymentMethod::Phonepe, || {
                self.ctx
                    .http
                    .post(&url)
                    .header("X-VERIFY", &x_verify)
                    .json(&body)
            })
            .await?;

        if !response.status().is_success() {
            return Err(gateway_error(PaymentMethod::Phonepe, response).await);
        }

        let data: serde_json::Value = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse PhonePe response: {}", e))
        })?;

        let redirect_url = data["data"]["instrumentResponse"]["redirectInfo"]["url"]
            .as_str()
            .ok_or_else(|| {
                AppError::ExternalService(format!(
                    "PhonePe did not return a redirect url (code {})",
                    data["code"].as_str().unwrap_or("unknown")
                ))
            })?
            .to_string();

        tracing::info!(
            gateway = "phonepe",
            "PhonePe transaction {} started for {}",
            merchant_transaction_id,
            order.order_number
        );

        Ok(PaymentIntent {
            gateway: PaymentMethod::Phonepe,
            gateway_order_id: Some(merchant_transaction_id),
            amount: order.total.clone(),
            currency: order.currency.clone(),
            payload: serde_json::json!({ "redirect_url": redirect_url }),
        })
    }

    fn verify(&self, callback: &GatewayCallback) -> AppResult<VerifiedPayment> {
        let GatewayCallback::Phonepe { response, x_verify } = callback else {
            return Err(AppError::PaymentVerification("Not a PhonePe callback".to_string()));
        };

        let expected = self.x_verify(response);
        if !constant_time_eq(expected.as_bytes(), x_verify.trim().as_bytes()) {
            tracing::warn!(gateway = "phonepe", "X-VERIFY mismatch on callback");
            return Err(AppError::PaymentVerification("Signature mismatch".to_string()));
        }

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(response.trim())
            .map_err(|_| AppError::PaymentVerification("Callback body is not base64".to_string()))?;
        let raw: serde_json::Value = serde_json::from_slice(&decoded)
            .map_err(|e| AppError::PaymentVerification(format!("Callback body is not JSON: {}", e)))?;
        let status: PhonepeStatus = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::PaymentVerification(format!("Unexpected callback shape: {}", e)))?;

        self.map_status(status, raw)
    }

    async fn check_status(&self, gateway_order_id: &str) -> AppResult<VerifiedPayment> {
        let path = format!("/pg/v1/status/{}/{}", self.merchant_id, gateway_order_id);
        let x_verify = self.x_verify(&path);
        let url = format!("{}{}", self.ctx.endpoints.phonepe.trim_end_matches('/'), path);

        let response = self
            .ctx
            .send_with_retry(PaymentMethod::Phonepe, || {
                self.ctx
                    .http
                    .get(&url)
                    .header("X-VERIFY", &x_verify)
                    .header("X-MERCHANT-ID", &self.merchant_id)
            })
            .await?;

        if !response.status().is_success() {
            return Err(gateway_error(PaymentMethod::Phonepe, response).await);
        }

        let raw: serde_json::Value = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse PhonePe status: {}", e))
        })?;
        let status: PhonepeStatus = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::ExternalService(format!("Unexpected PhonePe status shape: {}", e)))?;

        tracing::info!(gateway = "phonepe", "Status of {} is {}", gateway_order_id, status.code);
        self.map_status(status, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn client(base: &str) -> PhonepeClient {
        let mut config = AppConfig::default();
        config.gateway_endpoints.phonepe = base.to_string();
        PhonepeClient::new(
            "PGTESTPAYUAT".to_string(),
            "099eb0cd-02cf-4e2a-8aca-3e6c6aff0399".to_string(),
            "1".to_string(),
            GatewayContext::from_config(&config).unwrap(),
        )
    }

    fn encoded_callback(code: &str, amount: i64) -> String {
        let body = serde_json::json!({
            "success": code == "PAYMENT_SUCCESS",
            "code": code,
            "data": {
                "merchantId": "PGTESTPAYUAT",
                "merchantTransactionId": "ORD20260101ABC123456789",
                "transactionId": "T2601011234",
                "amount": amount,
                "state": "COMPLETED"
            }
        });
        base64::engine::general_purpose::STANDARD.encode(body.to_string())
    }

    #[test]
    fn test_callback_with_valid_checksum() {
        let phonepe = client("http://localhost");
        let response = encoded_callback("PAYMENT_SUCCESS", 209900);
        let x_verify = phonepe.x_verify(&response);

        let verified = phonepe
            .verify(&GatewayCallback::Phonepe { response, x_verify })
            .unwrap();

        assert_eq!(verified.outcome, PaymentOutcome::Success);
        assert_eq!(verified.transaction_id.as_deref(), Some("T2601011234"));
        assert_eq!(verified.amount, Some(from_minor_units(209900)));
    }

    #[test]
    fn test_callback_with_wrong_checksum() {
        let phonepe = client("http://localhost");
        let response = encoded_callback("PAYMENT_SUCCESS", 209900);
        let forged = format!("{}###1", sha256_hex("forged"));

        let err = phonepe
            .verify(&GatewayCallback::Phonepe { response, x_verify: forged })
            .unwrap_err();
        assert!(matches!(err, AppError::PaymentVerification(_)));
    }

    #[test]
    fn test_failed_payment_code() {
        let phonepe = client("http://localhost");
        let response = encoded_callback("PAYMENT_ERROR", 209900);
        let x_verify = phonepe.x_verify(&response);

        let verified = phonepe
            .verify(&GatewayCallback::Phonepe { response, x_verify })
            .unwrap();
        assert_eq!(verified.outcome, PaymentOutcome::Failed);
    }

    #[tokio::test]
    async fn test_status_check_signs_path() {
        let phonepe = client("http://placeholder");
        let path = "/pg/v1/status/PGTESTPAYUAT/ORD20260101ABC123456789";
        let expected_header = phonepe.x_verify(path);

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", path)
            .match_header("X-VERIFY", expected_header.as_str())
            .match_header("X-MERCHANT-ID", "PGTESTPAYUAT")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "success": false,
                    "code": "PAYMENT_PENDING",
                    "data": { "merchantTransactionId": "ORD20260101ABC123456789", "amount": 209900 }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let phonepe = client(&server.url());
        let verified = phonepe.check_status("ORD20260101ABC123456789").await.unwrap();

        mock.assert_async().await;
        assert_eq!(verified.outcome, PaymentOutcome::Pending);
    }
}
