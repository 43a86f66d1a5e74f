//! Display rendering for tool results.
//!
//! Every tool answers with Markdown text meant for direct display. These are
//! pure functions over typed results.

use std::fmt::Write;

use crate::catalog::DiscoveryHit;
use crate::warehouse::{CatalogInfo, SchemaInfo, TableInfo, TableLineage};

/// Render a Markdown table. Pipes inside cells are escaped and newlines
/// flattened so each row stays on one line.
pub fn markdown_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "| {} |", headers.join(" | "));
    let _ = writeln!(
        out,
        "| {} |",
        headers.iter().map(|_| "---").collect::<Vec<_>>().join(" | ")
    );
    for row in rows {
        let cells: Vec<String> = row.iter().map(|c| escape_cell(c)).collect();
        let _ = writeln!(out, "| {} |", cells.join(" | "));
    }
    out
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// Render the rows of a successful statement.
pub fn query_results(columns: &[String], rows: &[Vec<Option<String>>]) -> String {
    if columns.is_empty() {
        return "Query executed successfully. No results returned.".to_string();
    }
    if rows.is_empty() {
        return "Query executed successfully but returned no rows.".to_string();
    }

    let headers: Vec<&str> = columns.iter().map(String::as_str).collect();
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| v.clone().unwrap_or_else(|| "NULL".to_string()))
                .collect()
        })
        .collect();

    let mut out = markdown_table(&headers, &body);
    let noun = if rows.len() == 1 { "row" } else { "rows" };
    let _ = write!(out, "\n({} {noun})", rows.len());
    out
}

pub fn catalogs(catalogs: &[CatalogInfo]) -> String {
    if catalogs.is_empty() {
        return "No catalogs found.".to_string();
    }
    let rows: Vec<Vec<String>> = catalogs
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.catalog_type.clone().unwrap_or_default(),
                c.comment.clone().unwrap_or_default(),
            ]
        })
        .collect();
    format!(
        "# Catalogs ({})\n\n{}",
        catalogs.len(),
        markdown_table(&["Catalog", "Type", "Comment"], &rows)
    )
}

pub fn schemas(catalog: &str, schemas: &[SchemaInfo]) -> String {
    if schemas.is_empty() {
        return format!("No schemas found in catalog '{catalog}'.");
    }
    let rows: Vec<Vec<String>> = schemas
        .iter()
        .map(|s| vec![s.name.clone(), s.comment.clone().unwrap_or_default()])
        .collect();
    format!(
        "# Schemas in `{catalog}` ({})\n\n{}",
        schemas.len(),
        markdown_table(&["Schema", "Comment"], &rows)
    )
}

pub fn tables(catalog: &str, schema: &str, tables: &[TableInfo], include_columns: bool) -> String {
    if tables.is_empty() {
        return format!("No tables found in schema '{catalog}.{schema}'.");
    }

    let mut out = format!("# Tables in `{catalog}.{schema}` ({})\n", tables.len());
    for table in tables {
        let _ = write!(out, "\n## {}\n", table.name);
        if let Some(kind) = &table.table_type {
            let _ = writeln!(out, "**Type:** {kind}");
        }
        if let Some(comment) = table.comment.as_deref().filter(|c| !c.is_empty()) {
            let _ = writeln!(out, "**Comment:** {comment}");
        }
        if include_columns && !table.columns.is_empty() {
            out.push_str("**Columns:**\n");
            for col in &table.columns {
                let _ = writeln!(out, "- `{}` ({})", col.name, col.type_text);
            }
        }
    }
    out
}

/// Full detail of one table, optionally with lineage.
pub fn table_details(table: &TableInfo, lineage: Option<&TableLineage>) -> String {
    let mut out = format!("**Table:** {}\n", table.full_name());
    if let Some(kind) = &table.table_type {
        let _ = writeln!(out, "**Type:** {kind}");
    }
    if let Some(comment) = table.comment.as_deref().filter(|c| !c.is_empty()) {
        let _ = writeln!(out, "**Comment:** {comment}");
    }

    if table.columns.is_empty() {
        out.push_str("**Columns:** (none reported)\n");
    } else {
        let _ = writeln!(out, "**Columns ({}):**", table.columns.len());
        for col in &table.columns {
            let nullable = if col.nullable { "nullable" } else { "not null" };
            let _ = write!(out, "- `{}` ({}, {nullable})", col.name, col.type_text);
            if let Some(comment) = col.comment.as_deref().filter(|c| !c.is_empty()) {
                let _ = write!(out, ": {comment}");
            }
            out.push('\n');
        }
    }

    if let Some(lineage) = lineage {
        out.push_str("\n**Lineage:**\n");
        let _ = writeln!(out, "- Upstream: {}", name_list(&lineage.upstream));
        let _ = writeln!(out, "- Downstream: {}", name_list(&lineage.downstream));
    }
    out
}

fn name_list(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

/// Render table-level search hits (name or description searches).
pub fn table_hits(hits: &[DiscoveryHit], empty_message: &str) -> String {
    if hits.is_empty() {
        return empty_message.to_string();
    }
    let rows: Vec<Vec<String>> = hits
        .iter()
        .map(|h| {
            vec![
                h.table.catalog.clone(),
                h.table.schema.clone(),
                h.table.table.clone(),
                h.table_type.clone().unwrap_or_default(),
                h.comment.clone().unwrap_or_default(),
            ]
        })
        .collect();
    markdown_table(
        &["table_catalog", "table_schema", "table_name", "table_type", "comment"],
        &rows,
    )
}

/// Render column search hits.
pub fn column_hits(hits: &[DiscoveryHit], empty_message: &str) -> String {
    if hits.is_empty() {
        return empty_message.to_string();
    }
    let rows: Vec<Vec<String>> = hits
        .iter()
        .map(|h| {
            let column = h.column.as_ref();
            vec![
                h.table.catalog.clone(),
                h.table.schema.clone(),
                h.table.table.clone(),
                column.map(|c| c.name.clone()).unwrap_or_default(),
                column.and_then(|c| c.data_type.clone()).unwrap_or_default(),
                column.and_then(|c| c.is_nullable.clone()).unwrap_or_default(),
            ]
        })
        .collect();
    markdown_table(
        &[
            "table_catalog",
            "table_schema",
            "table_name",
            "column_name",
            "data_type",
            "is_nullable",
        ],
        &rows,
    )
}

// ============================================================================
// Tests
// ============================================================================
