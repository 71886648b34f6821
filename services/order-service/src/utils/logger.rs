// /saree-store/services/order-service/src/utils/logger.rs

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "order_service=debug,tower_http=info";

/// Logger initialization; RUST_LOG overrides the default filter
pub fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    if json_output() {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// LOG_FORMAT=json untuk log aggregation di production
fn json_output() -> bool {
    std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
