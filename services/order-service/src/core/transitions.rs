// /saree-store/services/order-service/src/core/transitions.rs

use chrono::{DateTime, Utc};

use crate::{
    models::{OrderChange, OrderStatus, PaymentMethod, PaymentStatus},
    utils::error::{AppError, AppResult},
};

pub const OVERRIDE_PREFIX: &str = "[override]";

/// Who is asking for a payment status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentChangeSource {
    /// Signature-checked gateway result
    Verification,
    Admin,
}

/// Outcome of a transition check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Legal,
    Overridden,
}

impl Approval {
    /// History comment, tagged when the table was bypassed
    pub fn comment(&self, comment: Option<&str>) -> Option<String> {
        let trimmed = comment.map(str::trim).filter(|c| !c.is_empty());
        match (self, trimmed) {
            (Approval::Legal, c) => c.map(str::to_string),
            (Approval::Overridden, Some(c)) => Some(format!("{} {}", OVERRIDE_PREFIX, c)),
            (Approval::Overridden, None) => Some(OVERRIDE_PREFIX.to_string()),
        }
    }
}

/// Next step of the forward chain
pub fn next_status(status: OrderStatus) -> Option<OrderStatus> {
    match status {
        OrderStatus::Pending => Some(OrderStatus::Placed),
        OrderStatus::Placed => Some(OrderStatus::Confirmed),
        OrderStatus::Confirmed => Some(OrderStatus::Packed),
        OrderStatus::Packed => Some(OrderStatus::Shipped),
        OrderStatus::Shipped => Some(OrderStatus::OutForDelivery),
        OrderStatus::OutForDelivery => Some(OrderStatus::Delivered),
        OrderStatus::Delivered => Some(OrderStatus::ReturnRequested),
        OrderStatus::ReturnRequested => Some(OrderStatus::Returned),
        OrderStatus::Cancelled | OrderStatus::Returned => None,
    }
}

/// States nothing can leave, override included
pub fn is_final(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Cancelled | OrderStatus::Returned)
}

/// Cancellation is only possible before the parcel leaves the warehouse
pub fn can_cancel(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Pending | OrderStatus::Placed | OrderStatus::Confirmed | OrderStatus::Packed
    )
}

/// Whether stock reserved by the order is still held
pub fn holds_stock(status: OrderStatus) -> bool {
    !matches!(status, OrderStatus::Cancelled | OrderStatus::Returned)
}

/// Validate an order status change requested by an admin
pub fn check_status_change(
    from: OrderStatus,
    to: OrderStatus,
    force: bool,
    comment: Option<&str>,
) -> AppResult<Approval> {
    if from == to || is_final(from) {
        return Err(AppError::invalid_transition(from, to));
    }

    if to == OrderStatus::Cancelled {
        // cancellation carries stock and refund side effects, no override
        return if can_cancel(from) {
            Ok(Approval::Legal)
        } else {
            Err(AppError::invalid_transition(from, to))
        };
    }

    if next_status(from) == Some(to) {
        return Ok(Approval::Legal);
    }

    if force {
        require_comment(comment)?;
        tracing::warn!("Admin override on order status: {} -> {}", from, to);
        return Ok(Approval::Overridden);
    }

    Err(AppError::invalid_transition(from, to))
}

fn legal_payment_step(from: PaymentStatus, to: PaymentStatus, source: PaymentChangeSource) -> bool {
    use PaymentStatus::*;

    match (from, to) {
        (Pending, Paid) | (Failed, Paid) => source == PaymentChangeSource::Verification,
        (Pending, Failed) => true,
        (Failed, Pending) => source == PaymentChangeSource::Admin,
        (Paid, RefundPending) | (Paid, Refunded) | (RefundPending, Refunded) => true,
        (Paid, Failed) => true,
        _ => false,
    }
}

/// Validate a payment status change
pub fn check_payment_change(
    from: PaymentStatus,
    to: PaymentStatus,
    source: PaymentChangeSource,
    method: PaymentMethod,
    force: bool,
    comment: Option<&str>,
) -> AppResult<Approval> {
    if from == to {
        return Err(AppError::invalid_transition(from, to));
    }

    // refunds only ever follow a settled payment
    match to {
        PaymentStatus::Refunded if !matches!(from, PaymentStatus::Paid | PaymentStatus::RefundPending) => {
            return Err(AppError::invalid_transition(from, to));
        }
        PaymentStatus::RefundPending if from != PaymentStatus::Paid => {
            return Err(AppError::invalid_transition(from, to));
        }
        _ => {}
    }

    if to == PaymentStatus::Paid && source == PaymentChangeSource::Admin {
        // cash collected is the only manual verification
        return if method == PaymentMethod::Cod && matches!(from, PaymentStatus::Pending | PaymentStatus::Failed) {
            Ok(Approval::Legal)
        } else {
            Err(AppError::invalid_transition(from, to))
        };
    }

    if legal_payment_step(from, to, source) {
        return Ok(Approval::Legal);
    }

    if force && source == PaymentChangeSource::Admin {
        require_comment(comment)?;
        tracing::warn!("Admin override on payment status: {} -> {}", from, to);
        return Ok(Approval::Overridden);
    }

    Err(AppError::invalid_transition(from, to))
}

fn require_comment(comment: Option<&str>) -> AppResult<()> {
    match comment.map(str::trim) {
        Some(c) if !c.is_empty() => Ok(()),
        _ => Err(AppError::Validation(
            "An override needs a comment explaining it".to_string(),
        )),
    }
}

/// Fill the timestamp that belongs to the target status
pub fn stamp(change: &mut OrderChange, now: DateTime<Utc>) {
    match change.status {
        OrderStatus::Shipped => change.shipped_at = Some(now),
        OrderStatus::Delivered => change.delivered_at = Some(now),
        OrderStatus::Cancelled => change.cancelled_at = Some(now),
        OrderStatus::Returned => change.returned_at = Some(now),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_chain_is_legal() {
        let mut status = OrderStatus::Pending;
        while let Some(next) = next_status(status) {
            assert_eq!(check_status_change(status, next, false, None).unwrap(), Approval::Legal);
            status = next;
        }
        assert_eq!(status, OrderStatus::Returned);
    }

    #[test]
    fn test_delivered_to_placed_rejected() {
        let err = check_status_change(OrderStatus::Delivered, OrderStatus::Placed, false, None).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[test]
    fn test_skip_forward_needs_override_with_comment() {
        assert!(check_status_change(OrderStatus::Placed, OrderStatus::Shipped, false, None).is_err());
        assert!(matches!(
            check_status_change(OrderStatus::Placed, OrderStatus::Shipped, true, None),
            Err(AppError::Validation(_))
        ));

        let approval = check_status_change(
            OrderStatus::Placed,
            OrderStatus::Shipped,
            true,
            Some("packed at the warehouse, scan missed"),
        )
        .unwrap();
        assert_eq!(approval, Approval::Overridden);
        assert_eq!(
            approval.comment(Some("scan missed")).as_deref(),
            Some("[override] scan missed")
        );
    }

    #[test]
    fn test_cancel_window() {
        assert!(check_status_change(OrderStatus::Packed, OrderStatus::Cancelled, false, None).is_ok());
        assert!(check_status_change(OrderStatus::Shipped, OrderStatus::Cancelled, false, None).is_err());
        assert!(check_status_change(OrderStatus::Shipped, OrderStatus::Cancelled, true, Some("x")).is_err());
    }

    #[test]
    fn test_final_states_cannot_be_left() {
        assert!(check_status_change(OrderStatus::Cancelled, OrderStatus::Placed, true, Some("oops")).is_err());
        assert!(check_status_change(OrderStatus::Returned, OrderStatus::Delivered, true, Some("oops")).is_err());
    }

    #[test]
    fn test_payment_paid_requires_verification() {
        use PaymentChangeSource::*;

        assert!(check_payment_change(PaymentStatus::Pending, PaymentStatus::Paid, Verification, PaymentMethod::Razorpay, false, None).is_ok());
        assert!(check_payment_change(PaymentStatus::Failed, PaymentStatus::Paid, Verification, PaymentMethod::Razorpay, false, None).is_ok());
        assert!(check_payment_change(PaymentStatus::Pending, PaymentStatus::Paid, Admin, PaymentMethod::Razorpay, true, Some("trust me")).is_err());
        assert!(check_payment_change(PaymentStatus::Pending, PaymentStatus::Paid, Admin, PaymentMethod::Cod, false, None).is_ok());
    }

    #[test]
    fn test_refunds_only_from_paid() {
        use PaymentChangeSource::*;

        assert!(check_payment_change(PaymentStatus::Paid, PaymentStatus::RefundPending, Admin, PaymentMethod::Paytm, false, None).is_ok());
        assert!(check_payment_change(PaymentStatus::RefundPending, PaymentStatus::Refunded, Admin, PaymentMethod::Paytm, false, None).is_ok());
        assert!(check_payment_change(PaymentStatus::Pending, PaymentStatus::Refunded, Admin, PaymentMethod::Paytm, true, Some("x")).is_err());
        assert!(check_payment_change(PaymentStatus::Failed, PaymentStatus::RefundPending, Admin, PaymentMethod::Paytm, true, Some("x")).is_err());
    }

    #[test]
    fn test_admin_reset_and_override() {
        use PaymentChangeSource::*;

        assert!(check_payment_change(PaymentStatus::Failed, PaymentStatus::Pending, Admin, PaymentMethod::Phonepe, false, None).is_ok());
        assert!(check_payment_change(PaymentStatus::Refunded, PaymentStatus::Pending, Admin, PaymentMethod::Phonepe, false, None).is_err());
        assert_eq!(
            check_payment_change(PaymentStatus::Refunded, PaymentStatus::Pending, Admin, PaymentMethod::Phonepe, true, Some("refund reversed by bank")).unwrap(),
            Approval::Overridden
        );
    }
}
