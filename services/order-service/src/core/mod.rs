// /saree-store/services/order-service/src/core/mod.rs

pub mod checkout;
pub mod gateway;
pub mod invoice;
pub mod lifecycle;
pub mod payment;
pub mod pricing;
pub mod secrets;
pub mod transitions;

#[cfg(test)]
pub mod test_support;

// Re-export untuk kemudahan akses
pub mod services {
    pub use super::checkout::CheckoutService;
    pub use super::lifecycle::OrderLifecycle;
    pub use super::payment::PaymentService;
}
