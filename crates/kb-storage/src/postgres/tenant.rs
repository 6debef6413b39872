use crate::error_map::{map_sqlx_err, not_found};
use crate::traits::TenantRepository;
use async_trait::async_trait;
use kb_core::{KbResult, Plan, Tenant, TenantId};
use sqlx::{FromRow, PgPool};

#[derive(FromRow)]
struct TenantRow {
    id: uuid::Uuid,
    name: String,
    plan: String,
    settings: serde_json::Value,
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
        Ok(Tenant {
            id: TenantId(row.id),
            name: row.name,
            plan,
            settings: row.settings,
        })
    }
}

pub struct PgTenantRepository {
    pool: PgPool,
}

impl PgTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for PgTenantRepository {
    async fn create(&self, tenant: &Tenant) -> KbResult<()> {
        let plan = match tenant.plan {
            Plan::Sandbox => "sandbox",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        };
        sqlx::query(
            r#"INSERT INTO tenants (id, name, plan, settings) VALUES ($1, $2, $3, $4)"#,
        )
        .bind(tenant.id.0)
        .bind(&tenant.name)
        .bind(plan)
        .bind(&tenant.settings)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("create tenant", e))?;
        Ok(())
    }

    async fn get(&self, id: TenantId) -> KbResult<Tenant> {
        let row: TenantRow = sqlx::query_as(
            r#"SELECT id, name, plan, settings FROM tenants WHERE id = $1"#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("get tenant", e))?
        .ok_or_else(|| not_found(format!("tenant {id}")))?;
        row.try_into()
    }

    async fn get_by_name(&self, name: &str) -> KbResult<Option<Tenant>> {
        let row: Option<TenantRow> = sqlx::query_as(
            r#"SELECT id, name, plan, settings FROM tenants WHERE name = $1"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("get tenant by name", e))?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self) -> KbResult<Vec<Tenant>> {
        let rows: Vec<TenantRow> = sqlx::query_as(
            r#"SELECT id, name, plan, settings FROM tenants ORDER BY name"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list tenants", e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
