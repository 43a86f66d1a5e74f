//! Parameter structs for every assistant operation.
//!
//! Shared by the JSON-RPC loop, the MCP server and the client, so each
//! method has exactly one parameter shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, rmcp::schemars::JsonSchema)]
pub struct NoParams {}

#[derive(Debug, Clone, Serialize, Deserialize, rmcp::schemars::JsonSchema)]
pub struct CatalogParams {
    #[schemars(description = "Name of the catalog, e.g. 'main'")]
    pub catalog_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, rmcp::schemars::JsonSchema)]
pub struct ListTablesParams {
    #[schemars(description = "Name of the catalog")]
    pub catalog_name: String,
    #[schemars(description = "Name of the schema within the catalog")]
    pub schema_name: String,
    #[schemars(description = "List each table's columns (default: true)")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_columns: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, rmcp::schemars::JsonSchema)]
pub struct TableDetailsParams {
    #[schemars(description = "Fully qualified table name: catalog.schema.table")]
    pub full_table_name: String,
    #[schemars(description = "Include upstream and downstream lineage (default: false)")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_lineage: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, rmcp::schemars::JsonSchema)]
pub struct SearchTablesParams {
    #[schemars(description = "Substring to match against table names (case-insensitive)")]
    pub table_name_pattern: String,
    #[schemars(description = "Restrict the search to one catalog")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, rmcp::schemars::JsonSchema)]
pub struct SearchColumnsParams {
    #[schemars(description = "Substring to match against column names (case-insensitive)")]
    pub column_name_pattern: String,
    #[schemars(description = "Restrict the search to one catalog")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_name: Option<String>,
    #[schemars(description = "Restrict the search to one schema")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, rmcp::schemars::JsonSchema)]
pub struct SearchDescriptionParams {
    #[schemars(description = "Substring to match against table comments (case-insensitive)")]
    pub description_pattern: String,
    #[schemars(description = "Restrict the search to one catalog")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, rmcp::schemars::JsonSchema)]
pub struct SmartQueryParams {
    #[schemars(description = "Question in plain English, e.g. 'top 10 customers by revenue'")]
    pub query: String,
    #[schemars(description = "Default catalog for the generated SQL and the discovery scope")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_name: Option<String>,
    #[schemars(description = "Default schema for the generated SQL and the discovery scope")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[schemars(description = "Search the catalog for relevant tables first (default: true)")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_discover_schema: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, rmcp::schemars::JsonSchema)]
pub struct ExecuteSqlParams {
    #[schemars(description = "SQL statement to run on the warehouse")]
    pub sql: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, rmcp::schemars::JsonSchema)]
pub struct NaturalQueryParams {
    #[schemars(description = "Question in plain English")]
    pub query: String,
    #[schemars(description = "Default catalog for the generated SQL")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_name: Option<String>,
    #[schemars(description = "Default schema for the generated SQL")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
}
