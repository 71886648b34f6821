// /saree-store/services/order-service/src/utils/health.rs

use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::repository::OrderStore;

#[derive(Debug, Serialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub service: &'static str,
    pub version: &'static str,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub response_time_ms: Option<u64>,
}

/// Health check untuk store dan payment gateways
pub async fn comprehensive_health_check(store: &Arc<dyn OrderStore>) -> HealthCheckResult {
    let mut checks = HashMap::new();

    checks.insert("database".to_string(), check_store_health(store).await);
    checks.insert("payment_gateways".to_string(), check_gateway_settings(store).await);

    HealthCheckResult {
        status: determine_overall_status(&checks),
        service: "order-service",
        version: env!("CARGO_PKG_VERSION"),
        checks,
        timestamp: Utc::now(),
    }
}

async fn check_store_health(store: &Arc<dyn OrderStore>) -> ComponentHealth {
    let start = Instant::now();

    match store.ping().await {
        Ok(()) => ComponentHealth {
            name: "Order store".to_string(),
            status: HealthStatus::Healthy,
            message: None,
            response_time_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::error!("Store health check failed: {}", e);
            ComponentHealth {
                name: "Order store".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some("Store unreachable".to_string()),
                response_time_ms: None,
            }
        }
    }
}

/// Degraded kalau tidak ada gateway yang aktif
async fn check_gateway_settings(store: &Arc<dyn OrderStore>) -> ComponentHealth {
    let start = Instant::now();

    match store.payment_settings().await {
        Ok(settings) => {
            let enabled: Vec<&str> = settings
                .iter()
                .filter(|s| s.enabled)
                .map(|s| s.gateway.as_str())
                .collect();

            ComponentHealth {
                name: "Payment gateways".to_string(),
                status: if enabled.is_empty() {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                },
                message: Some(format!("Enabled: {}", if enabled.is_empty() { "none".to_string() } else { enabled.join(", ") })),
                response_time_ms: Some(start.elapsed().as_millis() as u64),
            }
        }
        Err(e) => ComponentHealth {
            name: "Payment gateways".to_string(),
            status: HealthStatus::Unhealthy,
            message: Some(format!("Settings unavailable: {}", e.error_code())),
            response_time_ms: None,
        },
    }
}

fn determine_overall_status(checks: &HashMap<String, ComponentHealth>) -> HealthStatus {
    if checks.values().any(|c| c.status == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if checks.values().any(|c| c.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::MemoryStore;

    #[tokio::test]
    async fn test_memory_store_is_healthy() {
        let store: Arc<dyn OrderStore> = Arc::new(MemoryStore::new());
        let result = comprehensive_health_check(&store).await;

        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(result.checks["database"].status, HealthStatus::Healthy);
        assert_eq!(result.checks["payment_gateways"].message.as_deref(), Some("Enabled: cod"));
    }

    #[test]
    fn test_degraded_wins_over_healthy() {
        let mut checks = HashMap::new();
        checks.insert(
            "a".to_string(),
            ComponentHealth { name: "a".to_string(), status: HealthStatus::Healthy, message: None, response_time_ms: None },
        );
        checks.insert(
            "b".to_string(),
            ComponentHealth { name: "b".to_string(), status: HealthStatus::Degraded, message: None, response_time_ms: None },
        );
        assert_eq!(determine_overall_status(&checks), HealthStatus::Degraded);
    }
}
