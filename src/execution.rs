//! Query execution facade.
//!
//! Runs one statement through the [`Warehouse`] and classifies the outcome.
//! There is no retry; every outcome, including transport failures, comes
//! back as a [`QueryOutcome`] that renders to display text.

use tracing::{info, warn};

use crate::format;
use crate::warehouse::{ExecutionStatus, Statement, Warehouse};

/// Classified result of executing one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Success {
        columns: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    },
    /// The statement ran and the warehouse reported a query failure.
    Failed {
        error: String,
        details: Option<String>,
    },
    /// The statement could not complete (canceled, closed, rejected).
    Error {
        error: String,
        details: Option<String>,
    },
    /// An unrecognized status, or the warehouse could not be reached.
    Unexpected { detail: String },
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short status label for logs.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failed { .. } => "failed",
            Self::Error { .. } => "error",
            Self::Unexpected { .. } => "unexpected",
        }
    }

    pub fn render(&self) -> String {
        match self {
            Self::Success { columns, rows } => format::query_results(columns, rows),
            Self::Failed { error, details } => {
                format!("SQL Query Failed: {error}\nDetails: {}", details_text(details))
            }
            Self::Error { error, details } => {
                format!(
                    "Error during SQL Execution: {error}\nDetails: {}",
                    details_text(details)
                )
            }
            Self::Unexpected { detail } => format!("Unexpected status: {detail}"),
        }
    }
}

fn details_text(details: &Option<String>) -> &str {
    details.as_deref().unwrap_or("No details available")
}

/// Execute `sql` with optional default catalog and schema.
pub async fn execute(
    warehouse: &dyn Warehouse,
    sql: &str,
    catalog: Option<&str>,
    schema: Option<&str>,
) -> QueryOutcome {
    let statement = Statement::new(sql).with_defaults(catalog, schema);

    let outcome = match warehouse.execute(&statement).await {
        Ok(result) => {
            let unknown = || "unknown error".to_string();
            match result.status {
                ExecutionStatus::Success => QueryOutcome::Success {
                    columns: result.columns,
                    rows: result.rows,
                },
                ExecutionStatus::Failed => QueryOutcome::Failed {
                    error: result.error.unwrap_or_else(unknown),
                    details: result.details,
                },
                ExecutionStatus::Error => QueryOutcome::Error {
                    error: result.error.unwrap_or_else(unknown),
                    details: result.details,
                },
                ExecutionStatus::Other(state) => QueryOutcome::Unexpected { detail: state },
            }
        }
        Err(e) => {
            warn!("statement execution failed: {e}");
            QueryOutcome::Unexpected {
                detail: e.to_string(),
            }
        }
    };

    info!(status = outcome.status(), "statement executed");
    outcome
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WarehouseError;
    use crate::sql::FALLBACK_SQL;
    use crate::warehouse::{MockWarehouse, StatementResult};

    #[tokio::test]
    async fn test_success_renders_table() {
        let wh = MockWarehouse::empty().with_responder(|_| {
            Ok(StatementResult::success(
                vec!["id".into(), "email".into()],
                vec![
                    vec![Some("105".into()), Some("a@example.com".into())],
                    vec![Some("106".into()), None],
                ],
            ))
        });

        let outcome = execute(&wh, "SELECT id, email FROM t", Some("main"), Some("crm")).await;
        assert!(outcome.is_success());
        let text = outcome.render();
        assert!(text.contains("| 105 | a@example.com |"));
        assert!(text.contains("| 106 | NULL |"));
        assert!(text.ends_with("(2 rows)"));

        let stmt = &wh.executed()[0];
        assert_eq!(stmt.catalog.as_deref(), Some("main"));
        assert_eq!(stmt.schema.as_deref(), Some("crm"));
    }

    #[tokio::test]
    async fn test_fallback_statement_is_one_row_success() {
        let wh = MockWarehouse::empty();
        let outcome = execute(&wh, FALLBACK_SQL, None, None).await;

        match &outcome {
            QueryOutcome::Success { rows, .. } => assert_eq!(rows.len(), 1),
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(wh.executed()[0].sql, FALLBACK_SQL);
    }

    #[tokio::test]
    async fn test_failed_status() {
        let wh = MockWarehouse::empty().with_responder(|_| {
            Ok(StatementResult::with_status(
                ExecutionStatus::Failed,
                "[TABLE_OR_VIEW_NOT_FOUND] The table `nope` cannot be found.",
                Some("TABLE_OR_VIEW_NOT_FOUND"),
            ))
        });

        let outcome = execute(&wh, "SELECT * FROM nope", None, None).await;
        assert_eq!(outcome.status(), "failed");
        assert_eq!(
            outcome.render(),
            "SQL Query Failed: [TABLE_OR_VIEW_NOT_FOUND] The table `nope` cannot be found.\nDetails: TABLE_OR_VIEW_NOT_FOUND"
        );
    }

    #[tokio::test]
    async fn test_error_status() {
        let wh = MockWarehouse::empty().with_responder(|_| {
            Ok(StatementResult::with_status(
                ExecutionStatus::Error,
                "Statement was canceled",
                None,
            ))
        });

        let outcome = execute(&wh, "SELECT 1", None, None).await;
        assert!(
            outcome
                .render()
                .starts_with("Error during SQL Execution: Statement was canceled\nDetails:")
        );
    }

    #[tokio::test]
    async fn test_other_status_is_unexpected() {
        let wh = MockWarehouse::empty().with_responder(|_| {
            Ok(StatementResult {
                status: ExecutionStatus::Other("PENDING".into()),
                columns: vec![],
                rows: vec![],
                error: None,
                details: None,
            })
        });

        let outcome = execute(&wh, "SELECT 1", None, None).await;
        assert_eq!(outcome.render(), "Unexpected status: PENDING");
    }

    #[tokio::test]
    async fn test_transport_error_is_unexpected() {
        let wh = MockWarehouse::empty()
            .with_responder(|_| Err(WarehouseError::Http("connection refused".into())));

        let outcome = execute(&wh, "SELECT 1", None, None).await;
        assert_eq!(
            outcome,
            QueryOutcome::Unexpected {
                detail: "HTTP error: connection refused".into()
            }
        );
    }
}
