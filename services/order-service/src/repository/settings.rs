// /saree-store/services/order-service/src/repository/settings.rs

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    models::*,
    utils::error::{AppError, AppResult},
};

#[derive(Debug, sqlx::FromRow)]
struct SettingRow {
    gateway: String,
    enabled: bool,
    display_name: String,
    sandbox: bool,
    sealed_credentials: Option<String>,
    public_key: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SettingRow> for StoredGatewaySetting {
    type Error = AppError;

    fn try_from(row: SettingRow) -> Result<Self, Self::Error> {
        Ok(StoredGatewaySetting {
            gateway: row
                .gateway
                .parse()
                .map_err(|e| AppError::Database(format!("Unreadable payment setting: {}", e)))?,
            enabled: row.enabled,
            display_name: row.display_name,
            sandbox: row.sandbox,
            sealed_credentials: row.sealed_credentials,
            public_key: row.public_key,
            updated_at: row.updated_at,
        })
    }
}

/// Repository untuk payment gateway settings
pub struct SettingsRepository {
    pool: PgPool,
}

impl SettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn all(&self) -> AppResult<Vec<StoredGatewaySetting>> {
        let rows = sqlx::query_as::<_, SettingRow>(
            r#"
            SELECT gateway, enabled, display_name, sandbox, sealed_credentials, public_key, updated_at
            FROM payment_settings
            ORDER BY gateway
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredGatewaySetting::try_from).collect()
    }

    pub async fn get(&self, gateway: PaymentMethod) -> AppResult<Option<StoredGatewaySetting>> {
        let row = sqlx::query_as::<_, SettingRow>(
            r#"
            SELECT gateway, enabled, display_name, sandbox, sealed_credentials, public_key, updated_at
            FROM payment_settings
            WHERE gateway = $1
            "#,
        )
        .bind(gateway.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredGatewaySetting::try_from).transpose()
    }

    /// Insert atau update satu gateway setting
    pub async fn upsert(&self, setting: &StoredGatewaySetting) -> AppResult<StoredGatewaySetting> {
        let row = sqlx::query_as::<_, SettingRow>(
            r#"
            INSERT INTO payment_settings (gateway, enabled, display_name, sandbox, sealed_credentials, public_key, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (gateway) DO UPDATE SET
                enabled            = EXCLUDED.enabled,
                display_name       = EXCLUDED.display_name,
                sandbox            = EXCLUDED.sandbox,
                sealed_credentials = EXCLUDED.sealed_credentials,
                public_key         = EXCLUDED.public_key,
                updated_at         = NOW()
            RETURNING gateway, enabled, display_name, sandbox, sealed_credentials, public_key, updated_at
            "#,
        )
        .bind(setting.gateway.as_str())
        .bind(setting.enabled)
        .bind(&setting.display_name)
        .bind(setting.sandbox)
        .bind(&setting.sealed_credentials)
        .bind(&setting.public_key)
        .fetch_one(&self.pool)
        .await?;

        StoredGatewaySetting::try_from(row)
    }
}
