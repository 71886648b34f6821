// /saree-store/services/order-service/src/core/gateway/cod.rs

use async_trait::async_trait;

use super::PaymentGateway;
use crate::{
    models::*,
    utils::error::{AppError, AppResult},
};

/// Cash on delivery. No network, no signature; money is confirmed at the door.
pub struct CodGateway;

#[async_trait]
impl PaymentGateway for CodGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Cod
    }

    async fn initiate(&self, order: &Order) -> AppResult<PaymentIntent> {
        Ok(PaymentIntent {
            gateway: PaymentMethod::Cod,
            gateway_order_id: None,
            amount: order.total.clone(),
            currency: order.currency.clone(),
            payload: serde_json::json!({
                "message": format!("Pay {} {} in cash on delivery", order.currency, order.total),
            }),
        })
    }

    fn verify(&self, callback: &GatewayCallback) -> AppResult<VerifiedPayment> {
        let GatewayCallback::Cod { order_number } = callback else {
            return Err(AppError::PaymentVerification("Not a COD confirmation".to_string()));
        };

        Ok(VerifiedPayment {
            outcome: PaymentOutcome::Pending,
            reference: OrderReference::OrderNumber(order_number.clone()),
            transaction_id: None,
            amount: None,
            raw_response: serde_json::json!({ "order_number": order_number }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cod_never_settles_on_its_own() {
        let order = crate::core::test_support::sample_order(PaymentMethod::Cod);
        let intent = CodGateway.initiate(&order).await.unwrap();
        assert!(intent.gateway_order_id.is_none());

        let verified = CodGateway
            .verify(&GatewayCallback::Cod { order_number: order.order_number.clone() })
            .unwrap();
        assert_eq!(verified.outcome, PaymentOutcome::Pending);
    }
}
