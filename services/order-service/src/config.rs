// /saree-store/services/order-service/src/config.rs

use std::{env, str::FromStr, time::Duration};

use bigdecimal::BigDecimal;

use crate::utils::error::{AppError, AppResult};

/// Storage backend yang dipakai service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::Configuration(format!("Unknown STORE_BACKEND '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShippingTier {
    pub threshold: BigDecimal,
    pub fee: BigDecimal,
}

/// Tiered shipping fees, sorted by threshold
#[derive(Debug, Clone, PartialEq)]
pub struct ShippingSchedule {
    tiers: Vec<ShippingTier>,
}

impl ShippingSchedule {
    /// Parse `threshold:fee` pairs, e.g. `0:99,4999:0`
    pub fn parse(raw: &str) -> AppResult<Self> {
        let mut tiers = Vec::new();

        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (threshold, fee) = pair.split_once(':').ok_or_else(|| {
                AppError::Configuration(format!("Shipping tier '{}' must be threshold:fee", pair))
            })?;

            let threshold = BigDecimal::from_str(threshold.trim())
                .map_err(|e| AppError::Configuration(format!("Bad tier threshold '{}': {}", threshold, e)))?;
            let fee = BigDecimal::from_str(fee.trim())
                .map_err(|e| AppError::Configuration(format!("Bad tier fee '{}': {}", fee, e)))?;

            if threshold < BigDecimal::from(0) || fee < BigDecimal::from(0) {
                return Err(AppError::Configuration(format!(
                    "Shipping tier '{}' cannot be negative",
                    pair
                )));
            }

            tiers.push(ShippingTier { threshold, fee });
        }

        tiers.sort_by(|a, b| a.threshold.cmp(&b.threshold));
        Ok(Self { tiers })
    }

    /// Fee of the highest tier whose threshold is <= subtotal
    pub fn fee_for(&self, subtotal: &BigDecimal) -> BigDecimal {
        self.tiers
            .iter()
            .rev()
            .find(|tier| &tier.threshold <= subtotal)
            .map(|tier| tier.fee.clone())
            .unwrap_or_else(|| BigDecimal::from(0))
    }

    pub fn tiers(&self) -> &[ShippingTier] {
        &self.tiers
    }
}

impl Default for ShippingSchedule {
    fn default() -> Self {
        Self {
            tiers: vec![
                ShippingTier { threshold: BigDecimal::from(0), fee: BigDecimal::from(99) },
                ShippingTier { threshold: BigDecimal::from(4999), fee: BigDecimal::from(0) },
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

/// Base URLs gateway API, overridable untuk sandbox dan tests
#[derive(Debug, Clone)]
pub struct GatewayEndpoints {
    pub razorpay: String,
    pub phonepe: String,
    pub paytm: String,
}

impl Default for GatewayEndpoints {
    fn default() -> Self {
        Self {
            razorpay: "https://api.razorpay.com/v1".to_string(),
            phonepe: "https://api-preprod.phonepe.com/apis/pg-sandbox".to_string(),
            paytm: "https://securegw-stage.paytm.in".to_string(),
        }
    }
}

/// Service configuration, loaded once in main and passed explicitly
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub port: u16,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub database_acquire_timeout: Duration,
    pub run_migrations: bool,
    pub jwt: JwtSettings,
    pub secrets_master_key: String,
    pub currency: String,
    pub shipping: ShippingSchedule,
    pub tax_rate_percent: BigDecimal,
    pub max_payment_failures: u32,
    pub return_window_days: i64,
    pub gateway_timeout: Duration,
    pub gateway_endpoints: GatewayEndpoints,
    pub frontend_base_url: String,
    pub public_base_url: String,
    pub allowed_origins: Vec<String>,
    /// Trust X-User-* headers from the API gateway
    pub trust_gateway_headers: bool,
}

impl AppConfig {
    /// Load config dari environment variables
    pub fn from_env() -> AppResult<Self> {
        let store_backend = match env::var("STORE_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => StoreBackend::Postgres,
        };

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(AppError::Configuration(
                "DATABASE_URL harus di-set untuk STORE_BACKEND=postgres".to_string(),
            ));
        }

        let jwt_secret = required("JWT_SECRET")?;
        let secrets_master_key = required("SECRETS_MASTER_KEY")?;

        let shipping = match env::var("SHIPPING_TIERS") {
            Ok(raw) => ShippingSchedule::parse(&raw).unwrap_or_else(|e| {
                tracing::warn!("Invalid SHIPPING_TIERS, using defaults: {}", e);
                ShippingSchedule::default()
            }),
            Err(_) => ShippingSchedule::default(),
        };

        let defaults = GatewayEndpoints::default();
        let port = env::var("ORDER_SERVICE_PORT")
            .or_else(|_| env::var("SERVER_PORT"))
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(3004);

        Ok(Self {
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .to_lowercase(),
            port,
            store_backend,
            database_url,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            database_acquire_timeout: Duration::from_secs(env_or("DATABASE_ACQUIRE_TIMEOUT_SECONDS", 3)),
            run_migrations: env_or("RUN_MIGRATIONS", true),
            jwt: JwtSettings {
                secret: jwt_secret,
                issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "saree-store-auth".to_string()),
                audience: env::var("JWT_AUDIENCE").unwrap_or_else(|_| "saree-store".to_string()),
            },
            secrets_master_key,
            currency: env::var("CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            shipping,
            tax_rate_percent: env_or("TAX_RATE_PERCENT", BigDecimal::from(0)),
            max_payment_failures: env_or("MAX_PAYMENT_FAILURES", 3u32).max(1),
            return_window_days: env_or("RETURN_WINDOW_DAYS", 7),
            gateway_timeout: Duration::from_secs(env_or("GATEWAY_TIMEOUT_SECONDS", 15)),
            gateway_endpoints: GatewayEndpoints {
                razorpay: env::var("RAZORPAY_API_BASE").unwrap_or(defaults.razorpay),
                phonepe: env::var("PHONEPE_API_BASE").unwrap_or(defaults.phonepe),
                paytm: env::var("PAYTM_API_BASE").unwrap_or(defaults.paytm),
            },
            frontend_base_url: env::var("FRONTEND_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            allowed_origins: parse_origins(
                &env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            ),
            trust_gateway_headers: env_or("TRUST_GATEWAY_HEADERS", false),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            port: 3004,
            store_backend: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 10,
            database_acquire_timeout: Duration::from_secs(3),
            run_migrations: false,
            jwt: JwtSettings {
                secret: "local-development-secret-change-me".to_string(),
                issuer: "saree-store-auth".to_string(),
                audience: "saree-store".to_string(),
            },
            // 32 zero bytes, local runs only
            secrets_master_key: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string(),
            currency: "INR".to_string(),
            shipping: ShippingSchedule::default(),
            tax_rate_percent: BigDecimal::from(0),
            max_payment_failures: 3,
            return_window_days: 7,
            gateway_timeout: Duration::from_secs(15),
            gateway_endpoints: GatewayEndpoints::default(),
            frontend_base_url: "http://localhost:8080".to_string(),
            public_base_url: "http://localhost:3004".to_string(),
            allowed_origins: vec!["http://localhost:8080".to_string()],
            trust_gateway_headers: false,
        }
    }
}

/// Comma separated list, blanks dropped
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn required(key: &str) -> AppResult<String> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Configuration(format!("{} harus di-set di environment", key)))
}

/// Parse env var, fallback ke default dengan warning kalau invalid
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value for {} ('{}'), using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
