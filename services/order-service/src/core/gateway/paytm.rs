// /saree-store/services/order-service/src/core/gateway/paytm.rs
//
// Form-post integration. The checksum is HMAC-SHA256 (merchant key) over the
// `|`-joined field values sorted by field name, CHECKSUMHASH excluded.

use std::{collections::BTreeMap, str::FromStr};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use zeroize::Zeroize;

use super::{hmac_sha256_hex, verify_hmac_sha256_hex, GatewayContext, PaymentGateway};
use crate::{
    core::pricing::round_money,
    models::*,
    utils::error::{AppError, AppResult},
};

pub const CHECKSUM_FIELD: &str = "CHECKSUMHASH";

/// Client untuk Paytm form checkout
pub struct PaytmClient {
    merchant_id: String,
    merchant_key: String,
    website: String,
    ctx: GatewayContext,
}

impl Drop for PaytmClient {
    fn drop(&mut self) {
        self.merchant_key.zeroize();
    }
}

impl PaytmClient {
    pub fn new(merchant_id: String, merchant_key: String, website: String, ctx: GatewayContext) -> Self {
        Self {
            merchant_id,
            merchant_key,
            website,
            ctx,
        }
    }

    /// Values sorted by key (BTreeMap order) joined with `|`
    fn checksum_message(fields: &BTreeMap<String, String>) -> String {
        fields
            .iter()
            .filter(|(key, _)| key.as_str() != CHECKSUM_FIELD)
            .map(|(_, value)| value.as_str())
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn checksum(&self, fields: &BTreeMap<String, String>) -> AppResult<String> {
        hmac_sha256_hex(&self.merchant_key, &Self::checksum_message(fields))
    }
}

#[async_trait]
impl PaymentGateway for PaytmClient {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Paytm
    }

    async fn initiate(&self, order: &Order) -> AppResult<PaymentIntent> {
        let mut fields = BTreeMap::new();
        fields.insert("MID".to_string(), self.merchant_id.clone());
        fields.insert("ORDER_ID".to_string(), order.order_number.clone());
        fields.insert(
            "CUST_ID".to_string(),
            order
                .user_id
                .map(|id| format!("CUST{}", id))
                .unwrap_or_else(|| format!("GUEST{}", order.id)),
        );
        fields.insert("TXN_AMOUNT".to_string(), round_money(&order.total).to_string());
        fields.insert("CHANNEL_ID".to_string(), "WEB".to_string());
        fields.insert("INDUSTRY_TYPE_ID".to_string(), "Retail".to_string());
        fields.insert("WEBSITE".to_string(), self.website.clone());
        fields.insert(
            "CALLBACK_URL".to_string(),
            format!("{}/api/payment/paytm/callback", self.ctx.public_base_url),
        );
        if let Some(phone) = &order.customer_phone {
            fields.insert("MOBILE_NO".to_string(), phone.clone());
        }
        if let Some(email) = &order.customer_email {
            fields.insert("EMAIL".to_string(), email.clone());
        }

        let checksum = self.checksum(&fields)?;
        fields.insert(CHECKSUM_FIELD.to_string(), checksum);

        tracing::info!(gateway = "paytm", "Paytm form prepared for {}", order.order_number);

        Ok(PaymentIntent {
            gateway: PaymentMethod::Paytm,
            gateway_order_id: Some(order.order_number.clone()),
            amount: order.total.clone(),
            currency: order.currency.clone(),
            payload: serde_json::json!({
                "action": format!(
                    "{}/order/process",
                    self.ctx.endpoints.paytm.trim_end_matches('/')
                ),
                "method": "POST",
                "fields": fields,
            }),
        })
    }

    fn verify(&self, callback: &GatewayCallback) -> AppResult<VerifiedPayment> {
        let GatewayCallback::Paytm(fields) = callback else {
            return Err(AppError::PaymentVerification("Not a Paytm callback".to_string()));
        };

        let signature = fields
            .get(CHECKSUM_FIELD)
            .ok_or_else(|| AppError::PaymentVerification("CHECKSUMHASH missing".to_string()))?;

        verify_hmac_sha256_hex(&self.merchant_key, &Self::checksum_message(fields), signature).map_err(|e| {
            tracing::warn!(gateway = "paytm", "Checksum mismatch for {:?}", fields.get("ORDERID"));
            e
        })?;

        if fields.get("MID").map(String::as_str) != Some(self.merchant_id.as_str()) {
            return Err(AppError::PaymentVerification("Callback is for another merchant".to_string()));
        }

        let order_number = fields
            .get("ORDERID")
            .cloned()
            .ok_or_else(|| AppError::PaymentVerification("ORDERID missing".to_string()))?;

        let amount = fields
            .get("TXNAMOUNT")
            .map(|raw| BigDecimal::from_str(raw.trim()))
            .transpose()
            .map_err(|_| AppError::PaymentVerification("TXNAMOUNT is not a number".to_string()))?;

        let outcome = match fields.get("STATUS").map(String::as_str) {
            Some("TXN_SUCCESS") => PaymentOutcome::Success,
            Some("PENDING") => PaymentOutcome::Pending,
            _ => PaymentOutcome::Failed,
        };

        let raw: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .filter(|(key, _)| key.as_str() != CHECKSUM_FIELD)
            .map(|(key, value)| (key.clone(), serde_json::Value::String(value.clone())))
            .collect();

        Ok(VerifiedPayment {
            outcome,
            reference: OrderReference::OrderNumber(order_number),
            transaction_id: fields.get("TXNID").filter(|id| !id.is_empty()).cloned(),
            amount,
            raw_response: serde_json::Value::Object(raw),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn client() -> PaytmClient {
        PaytmClient::new(
            "SAREE00112233".to_string(),
            "kbzk1DSbJiV_O3p5".to_string(),
            "WEBSTAGING".to_string(),
            GatewayContext::from_config(&AppConfig::default()).unwrap(),
        )
    }

    fn callback_fields(status: &str) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("MID".to_string(), "SAREE00112233".to_string());
        fields.insert("ORDERID".to_string(), "ORD-20260101-ABC123".to_string());
        fields.insert("TXNID".to_string(), "20260101111212800110168".to_string());
        fields.insert("TXNAMOUNT".to_string(), "2099.00".to_string());
        fields.insert("STATUS".to_string(), status.to_string());
        fields.insert("RESPCODE".to_string(), "01".to_string());
        fields
    }

    #[test]
    fn test_signed_callback_verifies() {
        let paytm = client();
        let mut fields = callback_fields("TXN_SUCCESS");
        let checksum = paytm.checksum(&fields).unwrap();
        fields.insert(CHECKSUM_FIELD.to_string(), checksum);

        let verified = paytm.verify(&GatewayCallback::Paytm(fields)).unwrap();
        assert_eq!(verified.outcome, PaymentOutcome::Success);
        assert_eq!(verified.reference, OrderReference::OrderNumber("ORD-20260101-ABC123".to_string()));
        assert_eq!(verified.amount, Some(BigDecimal::from(2099)));
    }

    #[test]
    fn test_modified_amount_breaks_checksum() {
        let paytm = client();
        let mut fields = callback_fields("TXN_SUCCESS");
        let checksum = paytm.checksum(&fields).unwrap();
        fields.insert(CHECKSUM_FIELD.to_string(), checksum);
        fields.insert("TXNAMOUNT".to_string(), "1.00".to_string());

        assert!(matches!(
            paytm.verify(&GatewayCallback::Paytm(fields)),
            Err(AppError::PaymentVerification(_))
        ));
    }

    #[test]
    fn test_missing_checksum_rejected() {
        let paytm = client();
        assert!(paytm.verify(&GatewayCallback::Paytm(callback_fields("TXN_SUCCESS"))).is_err());
    }

    #[tokio::test]
    async fn test_initiate_signs_form_fields() {
        let paytm = client();
        let order = crate::core::test_support::sample_order(PaymentMethod::Paytm);
        let intent = paytm.initiate(&order).await.unwrap();

        let fields: BTreeMap<String, String> =
            serde_json::from_value(intent.payload["fields"].clone()).unwrap();
        assert_eq!(fields["TXN_AMOUNT"], "2099.00");
        assert_eq!(fields[CHECKSUM_FIELD], paytm.checksum(&fields).unwrap());
    }
}
