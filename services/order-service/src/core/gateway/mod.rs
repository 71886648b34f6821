// /saree-store/services/order-service/src/core/gateway/mod.rs

pub mod cod;
pub mod paytm;
pub mod phonepe;
pub mod razorpay;

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::{
    config::{AppConfig, GatewayEndpoints},
    core::secrets::GatewayCredentials,
    models::*,
    utils::error::{AppError, AppResult},
};

type HmacSha256 = Hmac<Sha256>;

/// Common contract of every payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Start a payment for the order. Never touches storage.
    async fn initiate(&self, order: &Order) -> AppResult<PaymentIntent>;

    /// Check the callback signature and read the outcome
    fn verify(&self, callback: &GatewayCallback) -> AppResult<VerifiedPayment>;

    /// Ask the gateway directly for the state of an attempt
    async fn check_status(&self, gateway_order_id: &str) -> AppResult<VerifiedPayment> {
        Err(AppError::Validation(format!(
            "{} does not support status checks (reference {})",
            self.method(),
            gateway_order_id
        )))
    }
}

/// Everything a gateway client needs besides its credentials
#[derive(Debug, Clone)]
pub struct GatewayContext {
    pub http: reqwest::Client,
    pub endpoints: GatewayEndpoints,
    pub currency: String,
    pub public_base_url: String,
    pub frontend_base_url: String,
    pub timeout: Duration,
}

impl GatewayContext {
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.gateway_timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoints: config.gateway_endpoints.clone(),
            currency: config.currency.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            frontend_base_url: config.frontend_base_url.trim_end_matches('/').to_string(),
            timeout: config.gateway_timeout,
        })
    }

    /// Send a request, retrying exactly once on timeout
    pub async fn send_with_retry<F>(&self, gateway: PaymentMethod, build: F) -> AppResult<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        match build().timeout(self.timeout).send().await {
            Ok(response) => Ok(response),
            Err(e) if e.is_timeout() => {
                tracing::warn!(gateway = %gateway, "Gateway call timed out, retrying once");
                build().timeout(self.timeout).send().await.map_err(|e| {
                    tracing::error!(gateway = %gateway, "Gateway call failed after retry: {}", e);
                    AppError::from(e)
                })
            }
            Err(e) => {
                tracing::error!(gateway = %gateway, "Gateway call failed: {}", e);
                Err(AppError::from(e))
            }
        }
    }
}

/// Build the client for one gateway from opened credentials
pub fn build_gateway(
    credentials: &GatewayCredentials,
    sandbox: bool,
    ctx: &GatewayContext,
) -> Box<dyn PaymentGateway> {
    match credentials {
        GatewayCredentials::Cod => Box::new(cod::CodGateway),
        GatewayCredentials::Razorpay { key_id, key_secret } => Box::new(razorpay::RazorpayClient::new(
            key_id.clone(),
            key_secret.clone(),
            ctx.clone(),
        )),
        GatewayCredentials::Phonepe { merchant_id, salt_key, salt_index } => {
            Box::new(phonepe::PhonepeClient::new(
                merchant_id.clone(),
                salt_key.clone(),
                salt_index.clone(),
                ctx.clone(),
            ))
        }
        GatewayCredentials::Paytm { merchant_id, merchant_key, website } => Box::new(paytm::PaytmClient::new(
            merchant_id.clone(),
            merchant_key.clone(),
            if sandbox { "WEBSTAGING".to_string() } else { website.clone() },
            ctx.clone(),
        )),
    }
}

/// Compare secrets without leaking the mismatch position
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

pub fn hmac_sha256_hex(key: &str, message: &str) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|_| AppError::Configuration("HMAC key error".to_string()))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex HMAC-SHA256 signature via `Mac::verify_slice`
pub fn verify_hmac_sha256_hex(key: &str, message: &str, signature_hex: &str) -> AppResult<()> {
    let expected = hex::decode(signature_hex.trim())
        .map_err(|_| AppError::PaymentVerification("Signature is not valid hex".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|_| AppError::Configuration("HMAC key error".to_string()))?;
    mac.update(message.as_bytes());

    mac.verify_slice(&expected)
        .map_err(|_| AppError::PaymentVerification("Signature mismatch".to_string()))
}

pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Read the error body of a failed gateway call
pub(crate) async fn gateway_error(gateway: PaymentMethod, response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    tracing::error!(gateway = %gateway, status = %status, "Gateway rejected request: {}", body);
    AppError::ExternalService(format!("{} error ({}): {}", gateway, status, body))
}
