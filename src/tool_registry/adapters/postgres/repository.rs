//! `PostgreSQL` repository implementation for tools and catalogs.

use super::{
    models::{CatalogRow, ToolRow},
    schema::{operation_catalogs, tools},
};
use crate::provider::domain::ProviderName;
use crate::tool_registry::{
    domain::{
        AuthDescriptor, AuthKind, CatalogDraft, HealthSnapshot, HealthStatus, OperationCatalog,
        PersistedToolData, TenantId, ToolConfiguration, ToolDefinition, ToolId, ToolName,
    },
    ports::{ToolRepository, ToolRepositoryError, ToolRepositoryResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type for tool registry adapters.
pub type ToolPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed repository for tool configurations and catalogs.
#[derive(Debug, Clone)]
pub struct PostgresToolRepository {
    pool: ToolPgPool,
}

impl PostgresToolRepository {
    /// Creates a new repository from a `PostgreSQL` pool.
    #[must_use]
    pub const fn new(pool: ToolPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, operation: F) -> ToolRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> ToolRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(ToolRepositoryError::persistence)?;
            operation(&mut connection)
        })
        .await
        .map_err(ToolRepositoryError::persistence)?
    }
}

#[async_trait]
impl ToolRepository for PostgresToolRepository {
    async fn register(&self, tool: &ToolConfiguration) -> ToolRepositoryResult<()> {
        let tool_id = tool.id();
        let tenant = tool.tenant().clone();
        let name = tool.name().clone();
        let row = to_row(tool);

        self.run_blocking(move |connection| {
            diesel::insert_into(tools::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
                        if is_name_unique_violation(info.as_ref()) =>
                    {
                        ToolRepositoryError::DuplicateToolName {
                            tenant: tenant.clone(),
                            name: name.clone(),
                        }
                    }
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        ToolRepositoryError::DuplicateTool(tool_id)
                    }
                    _ => ToolRepositoryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn update(&self, tool: &ToolConfiguration) -> ToolRepositoryResult<()> {
        let row = to_row(tool);

        self.run_blocking(move |connection| {
            let updated_count = diesel::update(tools::table.filter(tools::id.eq(row.id)))
                .set((
                    tools::base_url.eq(&row.base_url),
                    tools::auth_kind.eq(&row.auth_kind),
                    tools::secret_ref.eq(&row.secret_ref),
                    tools::spec_url.eq(&row.spec_url),
                    tools::discovery_hints.eq(&row.discovery_hints),
                    tools::active.eq(row.active),
                    tools::health_status.eq(&row.health_status),
                    tools::health_message.eq(&row.health_message),
                    tools::health_checked_at.eq(row.health_checked_at),
                    tools::updated_at.eq(row.updated_at),
                ))
                .execute(connection)
                .map_err(ToolRepositoryError::persistence)?;

            if updated_count == 0 {
                return Err(ToolRepositoryError::NotFound(ToolId::from_uuid(row.id)));
            }
            Ok(())
        })
        .await
    }

    async fn set_active(
        &self,
        tool_id: ToolId,
        active: bool,
        updated_at: DateTime<Utc>,
    ) -> ToolRepositoryResult<ToolConfiguration> {
        self.run_blocking(move |connection| {
            let row = diesel::update(tools::table.filter(tools::id.eq(tool_id.into_inner())))
                .set((tools::active.eq(active), tools::updated_at.eq(updated_at)))
                .returning(ToolRow::as_returning())
                .get_result::<ToolRow>(connection)
                .optional()
                .map_err(ToolRepositoryError::persistence)?
                .ok_or(ToolRepositoryError::NotFound(tool_id))?;
            row_to_tool(row)
        })
        .await
    }

    async fn set_health(
        &self,
        tool_id: ToolId,
        health: &HealthSnapshot,
        updated_at: DateTime<Utc>,
    ) -> ToolRepositoryResult<ToolConfiguration> {
        let status = health.status().as_str().to_owned();
        let message = health.message().map(str::to_owned);
        let checked_at = health.checked_at();

        self.run_blocking(move |connection| {
            let row = diesel::update(tools::table.filter(tools::id.eq(tool_id.into_inner())))
                .set((
                    tools::health_status.eq(&status),
                    tools::health_message.eq(&message),
                    tools::health_checked_at.eq(checked_at),
                    tools::updated_at.eq(updated_at),
                ))
                .returning(ToolRow::as_returning())
                .get_result::<ToolRow>(connection)
                .optional()
                .map_err(ToolRepositoryError::persistence)?
                .ok_or(ToolRepositoryError::NotFound(tool_id))?;
            row_to_tool(row)
        })
        .await
    }

    async fn find_by_id(&self, tool_id: ToolId) -> ToolRepositoryResult<Option<ToolConfiguration>> {
        self.run_blocking(move |connection| {
            let row = tools::table
                .filter(tools::id.eq(tool_id.into_inner()))
                .select(ToolRow::as_select())
                .first::<ToolRow>(connection)
                .optional()
                .map_err(ToolRepositoryError::persistence)?;
            row.map(row_to_tool).transpose()
        })
        .await
    }

    async fn find_by_name(
        &self,
        tenant: &TenantId,
        name: &ToolName,
    ) -> ToolRepositoryResult<Option<ToolConfiguration>> {
        let tenant = tenant.as_str().to_owned();
        let name = name.as_str().to_owned();
        self.run_blocking(move |connection| {
            let row = tools::table
                .filter(tools::tenant_id.eq(&tenant))
                .filter(tools::name.eq(&name))
                .select(ToolRow::as_select())
                .first::<ToolRow>(connection)
                .optional()
                .map_err(ToolRepositoryError::persistence)?;
            row.map(row_to_tool).transpose()
        })
        .await
    }

    async fn list_for_tenant(
        &self,
        tenant: &TenantId,
    ) -> ToolRepositoryResult<Vec<ToolConfiguration>> {
        let tenant = tenant.as_str().to_owned();
        self.run_blocking(move |connection| {
            let rows = tools::table
                .filter(tools::tenant_id.eq(&tenant))
                .order(tools::name.asc())
                .select(ToolRow::as_select())
                .load::<ToolRow>(connection)
                .map_err(ToolRepositoryError::persistence)?;
            rows.into_iter().map(row_to_tool).collect()
        })
        .await
    }

    async fn publish_catalog(
        &self,
        tool_id: ToolId,
        draft: CatalogDraft,
        published_at: DateTime<Utc>,
    ) -> ToolRepositoryResult<OperationCatalog> {
        let operations =
            serde_json::to_value(&draft.operations).map_err(ToolRepositoryError::persistence)?;
        let expansions =
            serde_json::to_value(&draft.expansions).map_err(ToolRepositoryError::persistence)?;
        let id = tool_id.into_inner();

        let version = self
            .run_blocking(move |connection| {
                connection
                    .transaction::<_, DieselError, _>(|tx| {
                        let exists = tools::table
                            .filter(tools::id.eq(id))
                            .count()
                            .get_result::<i64>(tx)?
                            > 0;
                        if !exists {
                            return Ok(None);
                        }

                        let latest = operation_catalogs::table
                            .filter(operation_catalogs::tool_id.eq(id))
                            .select(diesel::dsl::max(operation_catalogs::version))
                            .get_result::<Option<i32>>(tx)?;
                        let version = latest.unwrap_or(0).saturating_add(1);

                        diesel::insert_into(operation_catalogs::table)
                            .values(&CatalogRow {
                                tool_id: id,
                                version,
                                operations,
                                expansions,
                                published_at,
                            })
                            .execute(tx)?;
                        Ok(Some(version))
                    })
                    .map_err(ToolRepositoryError::persistence)?
                    .ok_or(ToolRepositoryError::NotFound(tool_id))
            })
            .await?;

        let version = u32::try_from(version).map_err(ToolRepositoryError::invalid_persisted_data)?;
        Ok(OperationCatalog::publish(tool_id, version, draft, published_at))
    }

    async fn current_catalog(
        &self,
        tool_id: ToolId,
    ) -> ToolRepositoryResult<Option<OperationCatalog>> {
        self.run_blocking(move |connection| {
            let row = operation_catalogs::table
                .filter(operation_catalogs::tool_id.eq(tool_id.into_inner()))
                .order(operation_catalogs::version.desc())
                .select(CatalogRow::as_select())
                .first::<CatalogRow>(connection)
                .optional()
                .map_err(ToolRepositoryError::persistence)?;
            row.map(row_to_catalog).transpose()
        })
        .await
    }
}

fn to_row(tool: &ToolConfiguration) -> ToolRow {
    let health = tool.health();
    ToolRow {
        id: tool.id().into_inner(),
        tenant_id: tool.tenant().as_str().to_owned(),
        name: tool.name().as_str().to_owned(),
        provider: tool.provider().as_str().to_owned(),
        base_url: tool.base_url().to_owned(),
        auth_kind: tool.auth().kind().as_str().to_owned(),
        secret_ref: tool.auth().secret_ref().map(str::to_owned),
        spec_url: tool.spec_url().map(str::to_owned),
        discovery_hints: tool.discovery_hints().to_vec(),
        active: tool.is_active(),
        health_status: health.status().as_str().to_owned(),
        health_message: health.message().map(str::to_owned),
        health_checked_at: health.checked_at(),
        created_at: tool.created_at(),
        updated_at: tool.updated_at(),
    }
}

fn row_to_tool(row: ToolRow) -> ToolRepositoryResult<ToolConfiguration> {
    let ToolRow {
        id,
        tenant_id,
        name,
        provider,
        base_url,
        auth_kind,
        secret_ref,
        spec_url,
        discovery_hints,
        active,
        health_status,
        health_message,
        health_checked_at,
        created_at,
        updated_at,
    } = row;

    let tenant = TenantId::new(tenant_id).map_err(ToolRepositoryError::invalid_persisted_data)?;
    let name = ToolName::new(name).map_err(ToolRepositoryError::invalid_persisted_data)?;
    let provider =
        ProviderName::new(provider).map_err(ToolRepositoryError::invalid_persisted_data)?;
    let kind = AuthKind::try_from(auth_kind.as_str())
        .map_err(ToolRepositoryError::invalid_persisted_data)?;
    let auth =
        AuthDescriptor::new(kind, secret_ref).map_err(ToolRepositoryError::invalid_persisted_data)?;
    let status = HealthStatus::try_from(health_status.as_str())
        .map_err(ToolRepositoryError::invalid_persisted_data)?;
    let snapshot = HealthSnapshot::new(status, health_checked_at);
    let health = match health_message {
        Some(message) => snapshot.with_message(message),
        None => snapshot,
    };

    Ok(ToolConfiguration::from_persisted(PersistedToolData {
        id: ToolId::from_uuid(id),
        definition: ToolDefinition {
            tenant,
            name,
            provider,
            base_url,
            auth,
            spec_url,
            discovery_hints,
        },
        active,
        health,
        created_at,
        updated_at,
    }))
}

fn row_to_catalog(row: CatalogRow) -> ToolRepositoryResult<OperationCatalog> {
    let version =
        u32::try_from(row.version).map_err(ToolRepositoryError::invalid_persisted_data)?;
    let draft = CatalogDraft {
        operations: serde_json::from_value(row.operations)
            .map_err(ToolRepositoryError::invalid_persisted_data)?,
        expansions: serde_json::from_value(row.expansions)
            .map_err(ToolRepositoryError::invalid_persisted_data)?,
    };
    Ok(OperationCatalog::publish(
        ToolId::from_uuid(row.tool_id),
        version,
        draft,
        row.published_at,
    ))
}

fn is_name_unique_violation(info: &dyn diesel::result::DatabaseErrorInformation) -> bool {
    info.constraint_name()
        .is_some_and(|name| name == "idx_tools_tenant_name")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockable::DefaultClock;
    use serde_json::json;

    fn tool() -> ToolConfiguration {
        ToolConfiguration::new(
            ToolDefinition {
                tenant: TenantId::new("acme").expect("valid tenant"),
                name: ToolName::new("github_main").expect("valid name"),
                provider: ProviderName::new("github").expect("valid provider"),
                base_url: "https://api.github.com".to_owned(),
                auth: AuthDescriptor::new(AuthKind::Bearer, Some("gh-token".to_owned()))
                    .expect("valid auth"),
                spec_url: None,
                discovery_hints: vec!["/internal/openapi.json".to_owned()],
            },
            &DefaultClock,
        )
        .expect("valid tool")
    }

    #[test]
    fn rows_reconstruct_the_persisted_tool() {
        let original = tool();
        let restored = row_to_tool(to_row(&original)).expect("row should decode");
        assert_eq!(restored, original);
    }

    #[test]
    fn unknown_auth_kind_is_invalid_persisted_data() {
        let mut row = to_row(&tool());
        row.auth_kind = "kerberos".to_owned();
        assert!(matches!(
            row_to_tool(row),
            Err(ToolRepositoryError::InvalidPersistedData(_))
        ));
    }

    #[test]
    fn negative_catalog_versions_are_rejected() {
        let row = CatalogRow {
            tool_id: uuid::Uuid::new_v4(),
            version: -1,
            operations: json!([]),
            expansions: json!({}),
            published_at: Utc::now(),
        };
        assert!(matches!(
            row_to_catalog(row),
            Err(ToolRepositoryError::InvalidPersistedData(_))
        ));
    }
}
