use crate::error_map::{map_sqlx_err, not_found};
use crate::traits::TenantRepository;
use async_trait::async_trait;
use kb_core::{KbResult, Plan, Tenant, TenantId};
use sqlx::{FromRow, SqlitePool};

#[derive(FromRow)]
struct TenantRow {
    id: String,
    name: String,
    plan: String,
    settings: String,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = kb_core::KbError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let plan = match row.plan.as_str() {
            "sandbox" => Plan::Sandbox,
            "pro" => Plan::Pro,
            "enterprise" => Plan::Enterprise,
            other => return Err(kb_core::KbError::Internal(anyhow::anyhow!("unknown plan '{other}'"))),
        };
        let settings = serde_json::from_str(&row.settings)
            .map_err(|e| kb_core::KbError::Internal(anyhow::anyhow!("decode tenant settings: {e}")))?;
        Ok(Tenant {
            id: TenantId(uuid::Uuid::parse_str(&row.id).map_err(|e| {
                kb_core::KbError::Internal(anyhow::anyhow!("decode tenant id: {e}"))
            })?),
            name: row.name,
            plan,
            settings,
        })
    }
}

pub struct SqliteTenantRepository {
    pool: SqlitePool,
}

impl SqliteTenantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for SqliteTenantRepository {
    async fn create(&self, tenant: &Tenant) -> KbResult<()> {
        let plan = match tenant.plan {
            Plan::Sandbox => "sandbox",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        };
        let settings = serde_json::to_string(&tenant.settings).unwrap_or_else(|_| "{}".to_string());
        sqlx::query("INSERT INTO tenants (id, name, plan, settings) VALUES (?, ?, ?, ?)")
            .bind(tenant.id.0.to_string())
            .bind(&tenant.name)
            .bind(plan)
            .bind(settings)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_err("create tenant", e))?;
        Ok(())
    }

    async fn get(&self, id: TenantId) -> KbResult<Tenant> {
        let row: TenantRow = sqlx::query_as("SELECT id, name, plan, settings FROM tenants WHERE id = ?")
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_err("get tenant", e))?
            .ok_or_else(|| not_found(format!("tenant {id}")))?;
        row.try_into()
    }

    async fn get_by_name(&self, name: &str) -> KbResult<Option<Tenant>> {
        let row: Option<TenantRow> =
            sqlx::query_as("SELECT id, name, plan, settings FROM tenants WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_err("get tenant by name", e))?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self) -> KbResult<Vec<Tenant>> {
        let rows: Vec<TenantRow> = sqlx::query_as("SELECT id, name, plan, settings FROM tenants ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_err("list tenants", e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
