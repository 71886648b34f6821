// /saree-store/services/order-service/src/utils/mod.rs
pub mod cors;
pub mod error;
pub mod health;
pub mod logger;
pub mod validator;
