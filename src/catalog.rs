//! Catalog search over `system.information_schema`.
//!
//! Three lookups (table name, column name, table description), each a
//! parameterized `LIKE '%pattern%'` query scoped to an optional catalog and
//! schema. Results come back typed so discovery never has to re-parse
//! rendered text.

use std::fmt;

use tracing::debug;

use crate::error::WarehouseError;
use crate::warehouse::{ExecutionStatus, Statement, StatementResult, Warehouse};

/// Default cap on rows returned by one search.
pub const DEFAULT_SEARCH_LIMIT: usize = 100;

/// Catalog name of the legacy Hive metastore.
pub const LEGACY_CATALOG: &str = "hive_metastore";

// ============================================================================
// Types
// ============================================================================

/// Fully qualified `catalog.schema.table` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableIdentifier {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl TableIdentifier {
    pub fn new(catalog: &str, schema: &str, table: &str) -> Self {
        Self {
            catalog: catalog.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }

    /// Parse `catalog.schema.table`. Returns `None` unless there are exactly
    /// three non-empty parts.
    pub fn parse(full_name: &str) -> Option<Self> {
        let parts: Vec<&str> = full_name.split('.').map(str::trim).collect();
        match parts.as_slice() {
            [c, s, t] if !c.is_empty() && !s.is_empty() && !t.is_empty() => {
                Some(Self::new(c, s, t))
            }
            _ => None,
        }
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}

/// Column-level detail of a hit from a column search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMatch {
    pub name: String,
    pub data_type: Option<String>,
    pub is_nullable: Option<String>,
}

/// One row returned by a catalog search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryHit {
    pub table: TableIdentifier,
    /// The pattern that produced this hit.
    pub pattern: String,
    pub table_type: Option<String>,
    pub comment: Option<String>,
    pub column: Option<ColumnMatch>,
}

/// Optional catalog/schema restriction for a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchScope {
    pub catalog: Option<String>,
    pub schema: Option<String>,
}

impl SearchScope {
    pub fn new(catalog: Option<&str>, schema: Option<&str>) -> Self {
        Self {
            catalog: catalog.map(str::to_string),
            schema: schema.map(str::to_string),
        }
    }

    /// The legacy metastore, keeping this scope's schema restriction.
    pub fn legacy(&self) -> Self {
        Self {
            catalog: Some(LEGACY_CATALOG.to_string()),
            schema: self.schema.clone(),
        }
    }
}

/// Which metadata a search matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    TableName,
    ColumnName,
    Description,
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TableName => "table name",
            Self::ColumnName => "column name",
            Self::Description => "description",
        })
    }
}

// ============================================================================
// Catalog Search
// ============================================================================

/// Issues metadata searches through a [`Warehouse`].
pub struct CatalogSearch<'a> {
    warehouse: &'a dyn Warehouse,
    limit: usize,
}

impl<'a> CatalogSearch<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, limit: usize) -> Self {
        Self {
            warehouse,
            limit: limit.max(1),
        }
    }

    pub async fn tables_by_name(
        &self,
        pattern: &str,
        scope: &SearchScope,
    ) -> Result<Vec<DiscoveryHit>, WarehouseError> {
        self.search(SearchKind::TableName, pattern, scope).await
    }

    pub async fn columns_by_name(
        &self,
        pattern: &str,
        scope: &SearchScope,
    ) -> Result<Vec<DiscoveryHit>, WarehouseError> {
        self.search(SearchKind::ColumnName, pattern, scope).await
    }

    pub async fn tables_by_description(
        &self,
        pattern: &str,
        scope: &SearchScope,
    ) -> Result<Vec<DiscoveryHit>, WarehouseError> {
        self.search(SearchKind::Description, pattern, scope).await
    }

    /// Run one search. A non-success statement status is returned as
    /// [`WarehouseError::Lookup`]; an empty result set is `Ok(vec![])`.
    pub async fn search(
        &self,
        kind: SearchKind,
        pattern: &str,
        scope: &SearchScope,
    ) -> Result<Vec<DiscoveryHit>, WarehouseError> {
        let statement = search_statement(kind, pattern, scope, self.limit);
        let result = self.warehouse.execute(&statement).await?;

        if result.status != ExecutionStatus::Success {
            return Err(WarehouseError::Lookup(format!(
                "{kind} search for '{pattern}' failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            )));
        }

        let hits = hits_from_result(kind, pattern, &result)?;
        debug!(%kind, pattern, hits = hits.len(), "catalog search");
        Ok(hits)
    }
}

/// Build the parameterized lookup for one search.
pub fn search_statement(
    kind: SearchKind,
    pattern: &str,
    scope: &SearchScope,
    limit: usize,
) -> Statement {
    let (select, view, matched, order) = match kind {
        SearchKind::TableName => (
            "table_catalog, table_schema, table_name, table_type, comment",
            "tables",
            "table_name",
            "table_catalog, table_schema, table_name",
        ),
        SearchKind::ColumnName => (
            "table_catalog, table_schema, table_name, column_name, data_type, is_nullable",
            "columns",
            "column_name",
            "table_catalog, table_schema, table_name, ordinal_position",
        ),
        SearchKind::Description => (
            "table_catalog, table_schema, table_name, table_type, comment",
            "tables",
            "comment",
            "table_catalog, table_schema, table_name",
        ),
    };

    let mut sql = format!(
        "SELECT {select}\nFROM system.information_schema.{view}\nWHERE LOWER({matched}) LIKE LOWER(:pattern) ESCAPE '\\\\'"
    );
    let mut statement =
        Statement::default().bind("pattern", format!("%{}%", escape_like(pattern)));

    if let Some(catalog) = &scope.catalog {
        sql.push_str("\n  AND table_catalog = :catalog");
        statement = statement.bind("catalog", catalog.as_str());
    }
    if let Some(schema) = &scope.schema {
        sql.push_str("\n  AND table_schema = :schema");
        statement = statement.bind("schema", schema.as_str());
    }
    sql.push_str(&format!("\nORDER BY {order}\nLIMIT {limit}"));

    statement.sql = sql;
    statement
}

/// Escape `\`, `%` and `_` so the pattern matches as a plain substring.
pub fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Convert search rows into hits. Rows missing any part of the table
/// identifier are skipped.
fn hits_from_result(
    kind: SearchKind,
    pattern: &str,
    result: &StatementResult,
) -> Result<Vec<DiscoveryHit>, WarehouseError> {
    let col = |name: &str| {
        result
            .column_index(name)
            .ok_or_else(|| WarehouseError::Parse(format!("search result missing column '{name}'")))
    };
    let (catalog_ix, schema_ix, table_ix) =
        (col("table_catalog")?, col("table_schema")?, col("table_name")?);

    let optional = |name: &str| result.column_index(name);
    let (type_ix, comment_ix) = (optional("table_type"), optional("comment"));
    let (column_ix, data_type_ix, nullable_ix) = (
        optional("column_name"),
        optional("data_type"),
        optional("is_nullable"),
    );

    let cell = |row: &[Option<String>], ix: Option<usize>| -> Option<String> {
        ix.and_then(|i| row.get(i).cloned().flatten())
    };

    let hits = result
        .rows
        .iter()
        .filter_map(|row| {
            let table = TableIdentifier::new(
                row.get(catalog_ix)?.as_deref()?,
                row.get(schema_ix)?.as_deref()?,
                row.get(table_ix)?.as_deref()?,
            );
            let column = match kind {
                SearchKind::ColumnName => Some(ColumnMatch {
                    name: cell(row, column_ix)?,
                    data_type: cell(row, data_type_ix),
                    is_nullable: cell(row, nullable_ix),
                }),
                _ => None,
            };
            Some(DiscoveryHit {
                table,
                pattern: pattern.to_string(),
                table_type: cell(row, type_ix),
                comment: cell(row, comment_ix),
                column,
            })
        })
        .collect();

    Ok(hits)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{MockWarehouse, table};

    fn sample_warehouse() -> MockWarehouse {
        MockWarehouse::new(vec![
            table(
                "main.sales.orders",
                Some("Customer orders"),
                &[("order_id", "BIGINT"), ("customer_id", "BIGINT")],
            ),
            table(
                "main.crm.customers",
                Some("CRM customer master"),
                &[("customer_id", "BIGINT"), ("email", "STRING")],
            ),
            table("dev.crm.customers", None, &[("email", "STRING")]),
        ])
    }

    #[test]
    fn test_identifier_parse_and_display() {
        let id = TableIdentifier::parse("main.sales.orders").unwrap();
        assert_eq!(id, TableIdentifier::new("main", "sales", "orders"));
        assert_eq!(id.to_string(), "main.sales.orders");
        assert!(TableIdentifier::parse("sales.orders").is_none());
        assert!(TableIdentifier::parse("a..c").is_none());
        assert!(TableIdentifier::parse("a.b.c.d").is_none());
    }

    #[test]
    fn test_statement_binds_pattern_instead_of_interpolating() {
        let stmt = search_statement(
            SearchKind::TableName,
            "o'brien",
            &SearchScope::default(),
            50,
        );
        assert!(!stmt.sql.contains("o'brien"));
        assert_eq!(stmt.param("pattern"), Some("%o'brien%"));
        assert!(stmt.sql.contains("LOWER(table_name) LIKE LOWER(:pattern) ESCAPE '\\\\'"));
        assert!(stmt.sql.ends_with("LIMIT 50"));
        assert!(!stmt.sql.contains(":catalog"));
    }

    #[test]
    fn test_wildcards_in_pattern_are_escaped() {
        assert_eq!(escape_like("order_id"), "order\\_id");
        assert_eq!(escape_like("50%"), "50\\%");
        assert_eq!(escape_like(r"a\b"), r"a\\b");

        let stmt = search_statement(
            SearchKind::ColumnName,
            "order_id",
            &SearchScope::default(),
            100,
        );
        assert_eq!(stmt.param("pattern"), Some(r"%order\_id%"));
    }

    #[tokio::test]
    async fn test_underscore_matches_literally() {
        let wh = MockWarehouse::new(vec![
            table("main.sales.orders", None, &[("order_id", "BIGINT")]),
            table("main.sales.legacy", None, &[("orderXid", "BIGINT")]),
        ]);
        let search = CatalogSearch::new(&wh, DEFAULT_SEARCH_LIMIT);

        let hits = search
            .columns_by_name("order_id", &SearchScope::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].table.to_string(), "main.sales.orders");
    }

    #[test]
    fn test_statement_scope_filters() {
        let stmt = search_statement(
            SearchKind::ColumnName,
            "email",
            &SearchScope::new(Some("main"), Some("crm")),
            100,
        );
        assert!(stmt.sql.contains("FROM system.information_schema.columns"));
        assert!(stmt.sql.contains("AND table_catalog = :catalog"));
        assert!(stmt.sql.contains("AND table_schema = :schema"));
        assert!(stmt.sql.contains("ordinal_position"));
        assert_eq!(stmt.param("catalog"), Some("main"));
        assert_eq!(stmt.param("schema"), Some("crm"));
    }

    #[test]
    fn test_description_statement_matches_comment() {
        let stmt = search_statement(SearchKind::Description, "orders", &SearchScope::default(), 100);
        assert!(stmt.sql.contains("LOWER(comment) LIKE LOWER(:pattern)"));
    }

    #[test]
    fn test_legacy_scope_keeps_schema() {
        let scope = SearchScope::new(Some("main"), Some("crm")).legacy();
        assert_eq!(scope.catalog.as_deref(), Some(LEGACY_CATALOG));
        assert_eq!(scope.schema.as_deref(), Some("crm"));
    }

    #[tokio::test]
    async fn test_tables_by_name() {
        let wh = sample_warehouse();
        let search = CatalogSearch::new(&wh, DEFAULT_SEARCH_LIMIT);

        let hits = search
            .tables_by_name("CUSTOMER", &SearchScope::default())
            .await
            .unwrap();
        let names: Vec<String> = hits.iter().map(|h| h.table.to_string()).collect();
        assert_eq!(names, vec!["main.crm.customers", "dev.crm.customers"]);
        assert_eq!(hits[0].comment.as_deref(), Some("CRM customer master"));
        assert_eq!(hits[0].pattern, "CUSTOMER");
    }

    #[tokio::test]
    async fn test_tables_by_name_scoped_to_catalog() {
        let wh = sample_warehouse();
        let search = CatalogSearch::new(&wh, DEFAULT_SEARCH_LIMIT);

        let hits = search
            .tables_by_name("customers", &SearchScope::new(Some("dev"), None))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].table.catalog, "dev");
    }

    #[tokio::test]
    async fn test_columns_by_name() {
        let wh = sample_warehouse();
        let search = CatalogSearch::new(&wh, DEFAULT_SEARCH_LIMIT);

        let hits = search
            .columns_by_name("customer_id", &SearchScope::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        let column = hits[0].column.as_ref().unwrap();
        assert_eq!(column.name, "customer_id");
        assert_eq!(column.data_type.as_deref(), Some("BIGINT"));
    }

    #[tokio::test]
    async fn test_tables_by_description() {
        let wh = sample_warehouse();
        let search = CatalogSearch::new(&wh, DEFAULT_SEARCH_LIMIT);

        let hits = search
            .tables_by_description("master", &SearchScope::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].table.to_string(), "main.crm.customers");
    }

    #[tokio::test]
    async fn test_nonexistent_pattern_on_empty_catalog_is_empty() {
        let wh = MockWarehouse::empty();
        let search = CatalogSearch::new(&wh, DEFAULT_SEARCH_LIMIT);

        let hits = search
            .tables_by_name("zzz_nonexistent", &SearchScope::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_error() {
        let mut wh = sample_warehouse();
        wh.fail_lookups = true;
        let search = CatalogSearch::new(&wh, DEFAULT_SEARCH_LIMIT);

        let result = search.tables_by_name("orders", &SearchScope::default()).await;
        assert!(matches!(result, Err(WarehouseError::Http(_))));
    }

    #[tokio::test]
    async fn test_failed_status_is_lookup_error() {
        let mut wh = sample_warehouse();
        wh.reject_lookups = true;
        let search = CatalogSearch::new(&wh, DEFAULT_SEARCH_LIMIT);

        let result = search.columns_by_name("email", &SearchScope::default()).await;
        assert!(matches!(result, Err(WarehouseError::Lookup(ref m)) if m.contains("PERMISSION_DENIED")));
    }

    #[test]
    fn test_missing_identifier_column_is_parse_error() {
        let hits = hits_from_result(
            SearchKind::TableName,
            "x",
            &StatementResult::success(vec!["table_catalog".into()], vec![]),
        );
        assert!(matches!(hits, Err(WarehouseError::Parse(_))));
    }

    #[test]
    fn test_rows_with_null_identifier_parts_are_skipped() {
        let result = StatementResult::success(
            ["table_catalog", "table_schema", "table_name", "table_type", "comment"]
                .map(String::from)
                .to_vec(),
            vec![
                vec![Some("main".into()), None, Some("t".into()), None, None],
                vec![
                    Some("main".into()),
                    Some("s".into()),
                    Some("t".into()),
                    Some("VIEW".into()),
                    None,
                ],
            ],
        );
        let hits = hits_from_result(SearchKind::TableName, "t", &result).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].table_type.as_deref(), Some("VIEW"));
    }
}
