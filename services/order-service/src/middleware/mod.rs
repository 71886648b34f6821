// /saree-store/services/order-service/src/middleware/mod.rs

pub mod auth;
pub mod security;
