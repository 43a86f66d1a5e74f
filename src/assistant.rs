//! The assistant service shared by every transport.
//!
//! One method per remote operation, each returning display text. The
//! JSON-RPC loop and the MCP server are thin routers over this type.

use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::{CatalogSearch, SearchScope, TableIdentifier};
use crate::config::DiscoveryConfig;
use crate::discovery::{SchemaContext, SchemaDiscovery};
use crate::error::AssistantError;
use crate::execution::{self, QueryOutcome};
use crate::format;
use crate::params::{
    CatalogParams, ExecuteSqlParams, ListTablesParams, NaturalQueryParams, SearchColumnsParams,
    SearchDescriptionParams, SearchTablesParams, SmartQueryParams, TableDetailsParams,
};
use crate::sql::SqlResolver;
use crate::warehouse::Warehouse;

#[derive(Clone)]
pub struct Assistant {
    warehouse: Arc<dyn Warehouse>,
    discovery: DiscoveryConfig,
    resolver: SqlResolver,
}

impl Assistant {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        discovery: DiscoveryConfig,
        resolver: SqlResolver,
    ) -> Self {
        Self {
            warehouse,
            discovery,
            resolver,
        }
    }

    // ========================================================================
    // Catalog browsing
    // ========================================================================

    pub async fn list_all_catalogs(&self) -> Result<String, AssistantError> {
        let catalogs = self.warehouse.list_catalogs().await?;
        Ok(format::catalogs(&catalogs))
    }

    pub async fn list_schemas_in_catalog(
        &self,
        p: CatalogParams,
    ) -> Result<String, AssistantError> {
        let catalog = required("catalog_name", &p.catalog_name)?;
        let schemas = self.warehouse.list_schemas(catalog).await?;
        Ok(format::schemas(catalog, &schemas))
    }

    pub async fn list_tables_in_schema(
        &self,
        p: ListTablesParams,
    ) -> Result<String, AssistantError> {
        let catalog = required("catalog_name", &p.catalog_name)?;
        let schema = required("schema_name", &p.schema_name)?;
        let tables = self.warehouse.list_tables(catalog, schema).await?;
        Ok(format::tables(
            catalog,
            schema,
            &tables,
            p.include_columns.unwrap_or(true),
        ))
    }

    pub async fn get_table_details(
        &self,
        p: TableDetailsParams,
    ) -> Result<String, AssistantError> {
        let table = TableIdentifier::parse(&p.full_table_name).ok_or_else(|| {
            AssistantError::InvalidParams(format!(
                "full_table_name must be catalog.schema.table, got '{}'",
                p.full_table_name
            ))
        })?;
        let full_name = table.to_string();

        let info = self.warehouse.get_table(&full_name).await?;
        let lineage = if p.include_lineage.unwrap_or(false) {
            match self.warehouse.get_lineage(&full_name).await {
                Ok(lineage) => Some(lineage),
                Err(e) => {
                    warn!(table = %full_name, "lineage unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(format::table_details(&info, lineage.as_ref()))
    }

    // ========================================================================
    // Search
    // ========================================================================

    fn search(&self) -> CatalogSearch<'_> {
        CatalogSearch::new(self.warehouse.as_ref(), self.discovery.search_limit)
    }

    pub async fn search_tables_by_name(
        &self,
        p: SearchTablesParams,
    ) -> Result<String, AssistantError> {
        let pattern = required("table_name_pattern", &p.table_name_pattern)?;
        let scope = SearchScope::new(p.catalog_name.as_deref(), None);
        let hits = self.search().tables_by_name(pattern, &scope).await?;
        Ok(format::table_hits(
            &hits,
            &format!("No tables found matching '{pattern}'."),
        ))
    }

    pub async fn search_columns_by_name(
        &self,
        p: SearchColumnsParams,
    ) -> Result<String, AssistantError> {
        let pattern = required("column_name_pattern", &p.column_name_pattern)?;
        let scope = SearchScope::new(p.catalog_name.as_deref(), p.schema_name.as_deref());
        let hits = self.search().columns_by_name(pattern, &scope).await?;
        Ok(format::column_hits(
            &hits,
            &format!("No columns found matching '{pattern}'."),
        ))
    }

    pub async fn search_tables_by_description(
        &self,
        p: SearchDescriptionParams,
    ) -> Result<String, AssistantError> {
        let pattern = required("description_pattern", &p.description_pattern)?;
        let scope = SearchScope::new(p.catalog_name.as_deref(), None);
        let hits = self.search().tables_by_description(pattern, &scope).await?;
        Ok(format::table_hits(
            &hits,
            &format!("No tables found with a description matching '{pattern}'."),
        ))
    }

    // ========================================================================
    // Natural language
    // ========================================================================

    /// Discover relevant tables, generate SQL constrained to them, run it.
    pub async fn smart_natural_language_query(
        &self,
        p: SmartQueryParams,
    ) -> Result<String, AssistantError> {
        let query = required("query", &p.query)?;
        let catalog = p.catalog_name.as_deref();
        let schema = p.schema_name.as_deref();

        let context = if p.auto_discover_schema.unwrap_or(true) {
            let engine = SchemaDiscovery::new(self.warehouse.as_ref(), self.discovery);
            let discovery = engine
                .discover(query, &SearchScope::new(catalog, schema))
                .await;
            info!(
                candidates = discovery.ranked.len(),
                selected = discovery.context.tables.len(),
                "schema discovery finished"
            );
            discovery.context
        } else {
            SchemaContext::default()
        };

        let resolved = self
            .resolver
            .resolve(query, catalog, schema, Some(&context))
            .await?;
        info!(source = %resolved.source, "resolved SQL");

        let outcome = execution::execute(self.warehouse.as_ref(), &resolved.sql, catalog, schema).await;

        let mut out = format!("**Generated SQL:**\n```sql\n{}\n```\n\n", resolved.sql);
        if !context.is_empty() {
            out.push_str(&format!(
                "**Discovered Schema Context:**\n{}\n\n",
                context.render()
            ));
        }
        out.push_str(&format!("**Results:**\n{}", outcome.render()));
        Ok(out)
    }

    pub async fn execute_sql_query(&self, p: ExecuteSqlParams) -> Result<String, AssistantError> {
        let sql = required("sql", &p.sql)?;
        let outcome: QueryOutcome = execution::execute(self.warehouse.as_ref(), sql, None, None).await;
        Ok(outcome.render())
    }

    /// Generate SQL without schema discovery and run it.
    pub async fn natural_language_query(
        &self,
        p: NaturalQueryParams,
    ) -> Result<String, AssistantError> {
        let query = required("query", &p.query)?;
        let catalog = p.catalog_name.as_deref();
        let schema = p.schema_name.as_deref();

        let resolved = self.resolver.resolve(query, catalog, schema, None).await?;
        let outcome = execution::execute(self.warehouse.as_ref(), &resolved.sql, catalog, schema).await;

        Ok(format!(
            "Generated SQL: ```sql\n{}\n```\n\nResults:\n{}",
            resolved.sql,
            outcome.render()
        ))
    }

    // ========================================================================
    // Utilities
    // ========================================================================

    pub async fn clear_cache(&self) -> Result<String, AssistantError> {
        self.warehouse.clear_cache().await?;
        info!("metadata cache cleared");
        Ok("Cache cleared successfully.".to_string())
    }
}

/// Trimmed value of a required string parameter; blank is invalid.
fn required<'a>(name: &str, value: &'a str) -> Result<&'a str, AssistantError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AssistantError::InvalidParams(format!(
            "'{name}' must not be empty"
        )));
    }
    Ok(trimmed)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::llm::{LlmClient, MockLlmClient};
    use crate::sql::FALLBACK_SQL;
    use crate::warehouse::{CatalogInfo, MockWarehouse, table};

    fn shop() -> MockWarehouse {
        let mut wh = MockWarehouse::new(vec![
            table(
                "main.sales.orders",
                Some("Customer purchase orders"),
                &[("order_id", "BIGINT"), ("customer_id", "BIGINT")],
            ),
            table(
                "main.crm.customer_emails",
                Some("Email addresses per customer"),
                &[("customer_id", "BIGINT"), ("email", "STRING")],
            ),
            table("main.hr.employees", Some("Staff directory"), &[("name", "STRING")]),
        ]);
        wh.catalogs = vec![CatalogInfo {
            name: "main".into(),
            catalog_type: Some("MANAGED_CATALOG".into()),
            comment: None,
        }];
        wh
    }

    fn assistant(wh: &Arc<MockWarehouse>, llm: Option<Arc<MockLlmClient>>) -> Assistant {
        Assistant::new(
            wh.clone(),
            DiscoveryConfig::default(),
            SqlResolver::new(llm.map(|m| m as Arc<dyn LlmClient>)),
        )
    }

    #[tokio::test]
    async fn test_list_all_catalogs() {
        let wh = Arc::new(shop());
        let out = assistant(&wh, None).list_all_catalogs().await.unwrap();
        assert!(out.contains("| main | MANAGED_CATALOG |"));
    }

    #[tokio::test]
    async fn test_list_schemas_and_tables() {
        let wh = Arc::new(shop());
        let a = assistant(&wh, None);

        let schemas = a
            .list_schemas_in_catalog(CatalogParams {
                catalog_name: "main".into(),
            })
            .await
            .unwrap();
        assert!(schemas.contains("| crm |"));

        let tables = a
            .list_tables_in_schema(ListTablesParams {
                catalog_name: "main".into(),
                schema_name: "crm".into(),
                include_columns: None,
            })
            .await
            .unwrap();
        assert!(tables.contains("## customer_emails"));
        assert!(tables.contains("- `email` (STRING)"));
    }

    #[tokio::test]
    async fn test_get_table_details_validates_name() {
        let wh = Arc::new(shop());
        let a = assistant(&wh, None);

        let err = a
            .get_table_details(TableDetailsParams {
                full_table_name: "orders".into(),
                include_lineage: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::InvalidParams(_)));

        let out = a
            .get_table_details(TableDetailsParams {
                full_table_name: "main.sales.orders".into(),
                include_lineage: Some(true),
            })
            .await
            .unwrap();
        assert!(out.starts_with("**Table:** main.sales.orders"));
        assert!(out.contains("- Upstream: none"));
    }

    #[tokio::test]
    async fn test_unknown_table_is_warehouse_error() {
        let wh = Arc::new(shop());
        let result = assistant(&wh, None)
            .get_table_details(TableDetailsParams {
                full_table_name: "main.sales.nope".into(),
                include_lineage: None,
            })
            .await;
        assert!(matches!(result, Err(AssistantError::Warehouse(_))));
    }

    #[tokio::test]
    async fn test_search_tables_by_name_nonexistent() {
        let wh = Arc::new(MockWarehouse::empty());
        let out = assistant(&wh, None)
            .search_tables_by_name(SearchTablesParams {
                table_name_pattern: "zzz_nonexistent".into(),
                catalog_name: None,
            })
            .await
            .unwrap();
        assert_eq!(out, "No tables found matching 'zzz_nonexistent'.");
    }

    #[tokio::test]
    async fn test_search_columns_renders_hits() {
        let wh = Arc::new(shop());
        let out = assistant(&wh, None)
            .search_columns_by_name(SearchColumnsParams {
                column_name_pattern: "email".into(),
                catalog_name: Some("main".into()),
                schema_name: None,
            })
            .await
            .unwrap();
        assert!(out.contains("| main | crm | customer_emails | email | STRING | YES |"));
    }

    #[tokio::test]
    async fn test_search_by_description() {
        let wh = Arc::new(shop());
        let out = assistant(&wh, None)
            .search_tables_by_description(SearchDescriptionParams {
                description_pattern: "staff".into(),
                catalog_name: None,
            })
            .await
            .unwrap();
        assert!(out.contains("| main | hr | employees |"));
    }

    #[tokio::test]
    async fn test_smart_query_end_to_end() {
        let wh = Arc::new(shop());
        let llm = Arc::new(MockLlmClient::new(vec![
            "<SQL>SELECT e.email FROM main.crm.customer_emails e JOIN main.sales.orders o ON o.customer_id = e.customer_id WHERE o.order_id = 105</SQL>"
                .into(),
        ]));
        let a = assistant(&wh, Some(llm.clone()));

        let out = a
            .smart_natural_language_query(SmartQueryParams {
                query: "Show me customer emails for order ID 105".into(),
                catalog_name: None,
                schema_name: None,
                auto_discover_schema: None,
            })
            .await
            .unwrap();

        assert!(out.starts_with("**Generated SQL:**\n```sql\nSELECT e.email"));
        assert!(out.contains("**Discovered Schema Context:**\nThe following tables are available."));
        assert!(out.contains("**Results:**\n| message |"));

        let (_, user) = llm.last_prompt().unwrap();
        assert!(user.contains("**Table:** main.crm.customer_emails"));
        let statements = wh.user_statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].sql.starts_with("SELECT"));
    }

    #[tokio::test]
    async fn test_smart_query_without_discovery() {
        let wh = Arc::new(shop());
        let llm = Arc::new(MockLlmClient::new(vec!["SELECT 1".into()]));
        let out = assistant(&wh, Some(llm))
            .smart_natural_language_query(SmartQueryParams {
                query: "one".into(),
                catalog_name: None,
                schema_name: None,
                auto_discover_schema: Some(false),
            })
            .await
            .unwrap();

        assert!(!out.contains("Discovered Schema Context"));
        assert!(wh.executed().iter().all(|s| !s.sql.contains("information_schema")));
    }

    #[tokio::test]
    async fn test_smart_query_model_fault_never_executes() {
        let wh = Arc::new(shop());
        let llm = Arc::new(MockLlmClient::with_results(vec![Err("503 overloaded".into())]));

        let err = assistant(&wh, Some(llm))
            .smart_natural_language_query(SmartQueryParams {
                query: "Show me customer emails for order ID 105".into(),
                catalog_name: None,
                schema_name: None,
                auto_discover_schema: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AssistantError::Resolve(ResolveError::Model(_))));
        assert!(wh.user_statements().is_empty());
    }

    #[tokio::test]
    async fn test_natural_language_query_missing_credentials() {
        let wh = Arc::new(shop());
        let err = assistant(&wh, None)
            .natural_language_query(NaturalQueryParams {
                query: "count orders".into(),
                catalog_name: None,
                schema_name: None,
            })
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Error: GEMINI_API_KEY not set. Cannot generate SQL from natural language."
        );
        assert!(wh.executed().is_empty());
    }

    #[tokio::test]
    async fn test_natural_language_query_unusable_reply_runs_fallback() {
        let wh = Arc::new(shop());
        let llm = Arc::new(MockLlmClient::new(vec!["Sorry, I can't do that.".into()]));

        let out = assistant(&wh, Some(llm))
            .natural_language_query(NaturalQueryParams {
                query: "count orders".into(),
                catalog_name: Some("main".into()),
                schema_name: Some("sales".into()),
            })
            .await
            .unwrap();

        assert!(out.starts_with(&format!("Generated SQL: ```sql\n{FALLBACK_SQL}\n```")));
        assert!(out.ends_with("(1 row)"));
        let stmt = &wh.user_statements()[0];
        assert_eq!(stmt.catalog.as_deref(), Some("main"));
        assert_eq!(stmt.schema.as_deref(), Some("sales"));
    }

    #[tokio::test]
    async fn test_execute_sql_query_rejects_blank() {
        let wh = Arc::new(shop());
        let err = assistant(&wh, None)
            .execute_sql_query(ExecuteSqlParams { sql: "  ".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let wh = Arc::new(shop());
        let out = assistant(&wh, None).clear_cache().await.unwrap();
        assert_eq!(out, "Cache cleared successfully.");
        assert_eq!(
            wh.cache_clears.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }
}
