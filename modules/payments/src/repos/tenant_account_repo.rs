//! Persistence for tenant provider sub-accounts.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::TenantGatewayAccount;

#[derive(sqlx::FromRow)]
struct AccountRow {
    tenant_id: String,
    merchant_code: String,
    enabled: bool,
    created_at: DateTime<Utc>,
}

impl From<AccountRow> for TenantGatewayAccount {
    fn from(row: AccountRow) -> Self {
        TenantGatewayAccount {
            tenant_id: row.tenant_id,
            merchant_code: row.merchant_code,
            enabled: row.enabled,
            created_at: row.created_at,
        }
    }
}

pub async fn fetch(
    pool: &PgPool,
    tenant_id: &str,
) -> Result<Option<TenantGatewayAccount>, sqlx::Error> {
    let row: Option<AccountRow> = sqlx::query_as(
        "SELECT tenant_id, merchant_code, enabled, created_at \
         FROM tenant_gateway_accounts WHERE tenant_id = $1",
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

pub async fn upsert(
    pool: &PgPool,
    tenant_id: &str,
    merchant_code: &str,
    enabled: bool,
) -> Result<TenantGatewayAccount, sqlx::Error> {
    let row: AccountRow = sqlx::query_as(
        r#"
        INSERT INTO tenant_gateway_accounts (tenant_id, merchant_code, enabled)
        VALUES ($1, $2, $3)
        ON CONFLICT (tenant_id) DO UPDATE
        SET merchant_code = EXCLUDED.merchant_code,
            enabled = EXCLUDED.enabled
        RETURNING tenant_id, merchant_code, enabled, created_at
        "#,
    )
    .bind(tenant_id)
    .bind(merchant_code)
    .bind(enabled)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}
