//! Warehouse collaborator: SQL execution and Unity Catalog metadata.
//!
//! [`Warehouse`] is the seam between the assistant and the workspace. The
//! production implementation lives in [`crate::databricks`]; tests use
//! [`MockWarehouse`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WarehouseError;

// ============================================================================
// Statements
// ============================================================================

/// A SQL statement with named parameters and optional default namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    /// Named `:param` bindings, all sent as STRING.
    pub parameters: Vec<(String, String)>,
    pub catalog: Option<String>,
    pub schema: Option<String>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }

    pub fn bind(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parameters.push((name.to_string(), value.into()));
        self
    }

    pub fn with_defaults(mut self, catalog: Option<&str>, schema: Option<&str>) -> Self {
        self.catalog = catalog.map(str::to_string);
        self.schema = schema.map(str::to_string);
        self
    }

    /// Value bound to `name`, if any.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Terminal status reported by the warehouse for a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    /// The query ran and failed (syntax, missing table, permissions).
    Failed,
    /// The statement could not be executed (canceled, closed, rejected).
    Error,
    /// Any status the warehouse reported that the above do not cover.
    Other(String),
}

/// Raw outcome of one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementResult {
    pub status: ExecutionStatus,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub error: Option<String>,
    pub details: Option<String>,
}

impl StatementResult {
    pub fn success(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self {
            status: ExecutionStatus::Success,
            columns,
            rows,
            error: None,
            details: None,
        }
    }

    pub fn with_status(status: ExecutionStatus, error: &str, details: Option<&str>) -> Self {
        Self {
            status,
            columns: Vec::new(),
            rows: Vec::new(),
            error: Some(error.to_string()),
            details: details.map(str::to_string),
        }
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

// ============================================================================
// Metadata
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogInfo {
    pub name: String,
    pub catalog_type: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub catalog: String,
    pub name: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub type_text: String,
    pub nullable: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub catalog: String,
    pub schema: String,
    pub name: String,
    pub table_type: Option<String>,
    pub comment: Option<String>,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    pub fn full_name(&self) -> String {
        format!("{}.{}.{}", self.catalog, self.schema, self.name)
    }
}

/// Upstream and downstream tables of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableLineage {
    pub upstream: Vec<String>,
    pub downstream: Vec<String>,
}

// ============================================================================
// Warehouse Trait
// ============================================================================

/// Everything the assistant needs from the data platform.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Execute a statement. Query-level failures come back as a non-success
    /// [`StatementResult`]; `Err` means the warehouse could not be reached or
    /// answered with something unreadable.
    async fn execute(&self, statement: &Statement) -> Result<StatementResult, WarehouseError>;

    async fn list_catalogs(&self) -> Result<Vec<CatalogInfo>, WarehouseError>;

    async fn list_schemas(&self, catalog: &str) -> Result<Vec<SchemaInfo>, WarehouseError>;

    async fn list_tables(&self, catalog: &str, schema: &str)
    -> Result<Vec<TableInfo>, WarehouseError>;

    async fn get_table(&self, full_name: &str) -> Result<TableInfo, WarehouseError>;

    async fn get_lineage(&self, full_name: &str) -> Result<TableLineage, WarehouseError>;

    /// Drop any cached metadata.
    async fn clear_cache(&self) -> Result<(), WarehouseError>;
}

// ============================================================================
// Mock Implementation (Test Only)
// ============================================================================

/// In-memory warehouse for tests.
///
/// Answers `information_schema` table/column searches from a registry of
/// [`TableInfo`]s, answers any other statement through `responder`, and
/// records every statement it executes.
#[cfg(test)]
pub struct MockWarehouse {
    pub tables: Vec<TableInfo>,
    pub catalogs: Vec<CatalogInfo>,
    /// Tables whose `get_table` call fails.
    pub broken_tables: Vec<String>,
    /// Fail every `information_schema` lookup at the transport level.
    pub fail_lookups: bool,
    /// Answer every `information_schema` lookup with a FAILED status.
    pub reject_lookups: bool,
    pub responder: Box<dyn Fn(&Statement) -> Result<StatementResult, WarehouseError> + Send + Sync>,
    pub executed: std::sync::Mutex<Vec<Statement>>,
    pub cache_clears: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockWarehouse {
    pub fn new(tables: Vec<TableInfo>) -> Self {
        Self {
            tables,
            catalogs: Vec::new(),
            broken_tables: Vec::new(),
            fail_lookups: false,
            reject_lookups: false,
            responder: Box::new(|stmt| {
                if stmt.sql.trim_start().to_uppercase().starts_with("SELECT") {
                    Ok(StatementResult::success(
                        vec!["message".into()],
                        vec![vec![Some("ok".into())]],
                    ))
                } else {
                    Ok(StatementResult::success(Vec::new(), Vec::new()))
                }
            }),
            executed: std::sync::Mutex::new(Vec::new()),
            cache_clears: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_responder(
        mut self,
        responder: impl Fn(&Statement) -> Result<StatementResult, WarehouseError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.responder = Box::new(responder);
        self
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.executed.lock().unwrap().clone()
    }

    /// Statements that were not metadata lookups.
    pub fn user_statements(&self) -> Vec<Statement> {
        self.executed()
            .into_iter()
            .filter(|s| !s.sql.contains("information_schema"))
            .collect()
    }

    fn search(&self, stmt: &Statement) -> StatementResult {
        let raw = stmt.param("pattern").unwrap_or_default();
        let raw = raw.strip_prefix('%').unwrap_or(raw);
        let raw = raw.strip_suffix('%').unwrap_or(raw);
        let mut needle = String::new();
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => needle.extend(chars.next()),
                c => needle.push(c),
            }
        }
        let needle = needle.to_lowercase();
        let pattern = needle.as_str();
        let in_scope = |t: &TableInfo| {
            stmt.param("catalog").is_none_or(|c| c == t.catalog)
                && stmt.param("schema").is_none_or(|s| s == t.schema)
        };

        if stmt.sql.contains("information_schema.columns") {
            let rows = self
                .tables
                .iter()
                .filter(|t| in_scope(t))
                .flat_map(|t| {
                    t.columns
                        .iter()
                        .filter(move |c| c.name.to_lowercase().contains(pattern))
                        .map(move |c| {
                            vec![
                                Some(t.catalog.clone()),
                                Some(t.schema.clone()),
                                Some(t.name.clone()),
                                Some(c.name.clone()),
                                Some(c.type_text.clone()),
                                Some(if c.nullable { "YES" } else { "NO" }.to_string()),
                            ]
                        })
                })
                .collect();
            return StatementResult::success(
                [
                    "table_catalog",
                    "table_schema",
                    "table_name",
                    "column_name",
                    "data_type",
                    "is_nullable",
                ]
                .map(String::from)
                .to_vec(),
                rows,
            );
        }

        let by_comment = stmt.sql.contains("LOWER(comment)");
        let rows = self
            .tables
            .iter()
            .filter(|t| in_scope(t))
            .filter(|t| {
                if by_comment {
                    t.comment
                        .as_deref()
                        .is_some_and(|c| c.to_lowercase().contains(pattern))
                } else {
                    t.name.to_lowercase().contains(pattern)
                }
            })
            .map(|t| {
                vec![
                    Some(t.catalog.clone()),
                    Some(t.schema.clone()),
                    Some(t.name.clone()),
                    t.table_type.clone(),
                    t.comment.clone(),
                ]
            })
            .collect();
        StatementResult::success(
            ["table_catalog", "table_schema", "table_name", "table_type", "comment"]
                .map(String::from)
                .to_vec(),
            rows,
        )
    }
}

#[cfg(test)]
#[async_trait]
impl Warehouse for MockWarehouse {
    async fn execute(&self, statement: &Statement) -> Result<StatementResult, WarehouseError> {
        self.executed.lock().unwrap().push(statement.clone());
        if statement.sql.contains("information_schema") {
            if self.fail_lookups {
                return Err(WarehouseError::Http("connection reset".into()));
            }
            if self.reject_lookups {
                return Ok(StatementResult::with_status(
                    ExecutionStatus::Failed,
                    "PERMISSION_DENIED: User does not have USE CATALOG on catalog 'system'",
                    None,
                ));
            }
            return Ok(self.search(statement));
        }
        (self.responder)(statement)
    }

    async fn list_catalogs(&self) -> Result<Vec<CatalogInfo>, WarehouseError> {
        Ok(self.catalogs.clone())
    }

    async fn list_schemas(&self, catalog: &str) -> Result<Vec<SchemaInfo>, WarehouseError> {
        let mut names: Vec<&str> = self
            .tables
            .iter()
            .filter(|t| t.catalog == catalog)
            .map(|t| t.schema.as_str())
            .collect();
        names.dedup();
        Ok(names
            .into_iter()
            .map(|name| SchemaInfo {
                catalog: catalog.to_string(),
                name: name.to_string(),
                comment: None,
            })
            .collect())
    }

    async fn list_tables(
        &self,
        catalog: &str,
        schema: &str,
    ) -> Result<Vec<TableInfo>, WarehouseError> {
        Ok(self
            .tables
            .iter()
            .filter(|t| t.catalog == catalog && t.schema == schema)
            .cloned()
            .collect())
    }

    async fn get_table(&self, full_name: &str) -> Result<TableInfo, WarehouseError> {
        if self.broken_tables.iter().any(|t| t == full_name) {
            return Err(WarehouseError::Http("timed out".into()));
        }
        self.tables
            .iter()
            .find(|t| t.full_name() == full_name)
            .cloned()
            .ok_or_else(|| WarehouseError::Api {
                code: "TABLE_DOES_NOT_EXIST".into(),
                message: format!("Table '{full_name}' does not exist."),
            })
    }

    async fn get_lineage(&self, _full_name: &str) -> Result<TableLineage, WarehouseError> {
        Ok(TableLineage::default())
    }

    async fn clear_cache(&self) -> Result<(), WarehouseError> {
        self.cache_clears
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

/// Build a [`TableInfo`] from `catalog.schema.table` and `(column, type)` pairs.
#[cfg(test)]
pub fn table(full_name: &str, comment: Option<&str>, columns: &[(&str, &str)]) -> TableInfo {
    let mut parts = full_name.splitn(3, '.');
    TableInfo {
        catalog: parts.next().unwrap_or_default().to_string(),
        schema: parts.next().unwrap_or_default().to_string(),
        name: parts.next().unwrap_or_default().to_string(),
        table_type: Some("MANAGED".to_string()),
        comment: comment.map(str::to_string),
        columns: columns
            .iter()
            .map(|(name, ty)| ColumnInfo {
                name: name.to_string(),
                type_text: ty.to_string(),
                nullable: true,
                comment: None,
            })
            .collect(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_bind_and_param() {
        let stmt = Statement::new("SELECT :a")
            .bind("a", "1")
            .with_defaults(Some("main"), None);
        assert_eq!(stmt.param("a"), Some("1"));
        assert_eq!(stmt.param("b"), None);
        assert_eq!(stmt.catalog.as_deref(), Some("main"));
        assert!(stmt.schema.is_none());
    }

    #[test]
    fn test_column_index_case_insensitive() {
        let result = StatementResult::success(vec!["Table_Name".into()], vec![]);
        assert_eq!(result.column_index("table_name"), Some(0));
        assert_eq!(result.column_index("missing"), None);
    }

    #[tokio::test]
    async fn test_mock_records_statements() {
        let wh = MockWarehouse::new(vec![table("main.sales.orders", None, &[("id", "INT")])]);
        wh.execute(&Statement::new("SELECT 1")).await.unwrap();
        assert_eq!(wh.user_statements().len(), 1);
        assert_eq!(wh.get_table("main.sales.orders").await.unwrap().columns.len(), 1);
        assert!(wh.get_table("main.sales.nope").await.is_err());
    }
}
