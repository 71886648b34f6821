// /saree-store/services/order-service/src/api/mod.rs

pub mod handlers;
pub mod routes;
