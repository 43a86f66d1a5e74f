//! Databricks REST implementation of [`Warehouse`].
//!
//! SQL goes through the Statement Execution API with inline `JSON_ARRAY`
//! results. Metadata comes from the Unity Catalog API, and table lineage
//! from the lineage tracking API, cached per table until
//! [`Warehouse::clear_cache`] is called.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::WarehouseConfig;
use crate::error::WarehouseError;
use crate::warehouse::{
    CatalogInfo, ColumnInfo, ExecutionStatus, SchemaInfo, Statement, StatementResult, TableInfo,
    TableLineage, Warehouse,
};

const STATEMENTS_PATH: &str = "/api/2.0/sql/statements";
const UNITY_CATALOG_PATH: &str = "/api/2.1/unity-catalog";
const LINEAGE_PATH: &str = "/api/2.0/lineage-tracking/table-lineage";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    warehouse_id: &'a str,
    statement: &'a str,
    wait_timeout: &'a str,
    on_wait_timeout: &'static str,
    format: &'static str,
    disposition: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parameters: Vec<StatementParameter<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct StatementParameter<'a> {
    name: &'a str,
    value: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    status: Option<StatementStatus>,
    manifest: Option<Manifest>,
    result: Option<ResultData>,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    state: String,
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    error_code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    schema: Option<ManifestSchema>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct ManifestSchema {
    #[serde(default)]
    columns: Vec<ManifestColumn>,
}

#[derive(Debug, Deserialize)]
struct ManifestColumn {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResultData {
    #[serde(default)]
    data_array: Vec<Vec<Value>>,
    next_chunk_index: Option<u64>,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UcCatalog {
    name: String,
    catalog_type: Option<String>,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UcSchema {
    name: String,
    catalog_name: Option<String>,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UcTable {
    name: String,
    catalog_name: String,
    schema_name: String,
    table_type: Option<String>,
    comment: Option<String>,
    #[serde(default)]
    columns: Vec<UcColumn>,
}

#[derive(Debug, Deserialize)]
struct UcColumn {
    name: String,
    type_text: Option<String>,
    type_name: Option<String>,
    nullable: Option<bool>,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineageResponse {
    #[serde(default)]
    upstreams: Vec<LineageEdge>,
    #[serde(default)]
    downstreams: Vec<LineageEdge>,
}

#[derive(Debug, Deserialize)]
struct LineageEdge {
    #[serde(rename = "tableInfo")]
    table_info: Option<LineageTable>,
}

#[derive(Debug, Deserialize)]
struct LineageTable {
    name: Option<String>,
    catalog_name: Option<String>,
    schema_name: Option<String>,
}

impl From<UcCatalog> for CatalogInfo {
    fn from(c: UcCatalog) -> Self {
        Self {
            name: c.name,
            catalog_type: c.catalog_type,
            comment: c.comment,
        }
    }
}

impl From<UcTable> for TableInfo {
    fn from(t: UcTable) -> Self {
        Self {
            catalog: t.catalog_name,
            schema: t.schema_name,
            name: t.name,
            table_type: t.table_type,
            comment: t.comment,
            columns: t
                .columns
                .into_iter()
                .map(|c| ColumnInfo {
                    type_text: c
                        .type_text
                        .or(c.type_name)
                        .unwrap_or_else(|| "UNKNOWN".to_string()),
                    name: c.name,
                    nullable: c.nullable.unwrap_or(true),
                    comment: c.comment,
                })
                .collect(),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Databricks workspace client bound to one SQL warehouse.
pub struct DatabricksClient {
    config: WarehouseConfig,
    client: reqwest::Client,
    lineage_cache: RwLock<HashMap<String, TableLineage>>,
}

impl DatabricksClient {
    pub fn new(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| WarehouseError::Http(e.to_string()))?;
        Ok(Self {
            config,
            client,
            lineage_cache: RwLock::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.host)
    }

    fn statement_request<'a>(&'a self, statement: &'a Statement) -> StatementRequest<'a> {
        StatementRequest {
            warehouse_id: &self.config.warehouse_id,
            statement: &statement.sql,
            wait_timeout: &self.config.wait_timeout,
            on_wait_timeout: "CANCEL",
            format: "JSON_ARRAY",
            disposition: "INLINE",
            parameters: statement
                .parameters
                .iter()
                .map(|(name, value)| StatementParameter {
                    name,
                    value,
                    kind: "STRING",
                })
                .collect(),
            catalog: statement.catalog.as_deref(),
            schema: statement.schema.as_deref(),
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, WarehouseError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.config.token)
            .query(query)
            .send()
            .await
            .map_err(|e| WarehouseError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WarehouseError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| WarehouseError::Parse(e.to_string()))
    }

    /// Follow `next_page_token` until the listing is exhausted.
    async fn list_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        key: &str,
    ) -> Result<Vec<T>, WarehouseError> {
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut params = query.to_vec();
            if let Some(token) = token.as_deref() {
                params.push(("page_token", token));
            }
            let page = self.get_json(path, &params).await?;
            items.extend(page_items::<T>(&page, key)?);

            token = next_page_token(&page);
            if token.is_none() {
                break;
            }
            debug!(path, fetched = items.len(), "fetching next page");
        }
        Ok(items)
    }
}

#[async_trait]
impl Warehouse for DatabricksClient {
    async fn execute(&self, statement: &Statement) -> Result<StatementResult, WarehouseError> {
        let request = self.statement_request(statement);
        debug!(params = request.parameters.len(), "submitting statement");

        let response = self
            .client
            .post(self.url(STATEMENTS_PATH))
            .bearer_auth(&self.config.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| WarehouseError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WarehouseError::Http(e.to_string()))?;

        statement_result(status, &body)
    }

    async fn list_catalogs(&self) -> Result<Vec<CatalogInfo>, WarehouseError> {
        let catalogs: Vec<UcCatalog> = self
            .list_paged(&format!("{UNITY_CATALOG_PATH}/catalogs"), &[], "catalogs")
            .await?;
        Ok(catalogs.into_iter().map(CatalogInfo::from).collect())
    }

    async fn list_schemas(&self, catalog: &str) -> Result<Vec<SchemaInfo>, WarehouseError> {
        let schemas: Vec<UcSchema> = self
            .list_paged(
                &format!("{UNITY_CATALOG_PATH}/schemas"),
                &[("catalog_name", catalog)],
                "schemas",
            )
            .await?;
        Ok(schemas
            .into_iter()
            .map(|s| SchemaInfo {
                catalog: s.catalog_name.unwrap_or_else(|| catalog.to_string()),
                name: s.name,
                comment: s.comment,
            })
            .collect())
    }

    async fn list_tables(
        &self,
        catalog: &str,
        schema: &str,
    ) -> Result<Vec<TableInfo>, WarehouseError> {
        let tables: Vec<UcTable> = self
            .list_paged(
                &format!("{UNITY_CATALOG_PATH}/tables"),
                &[("catalog_name", catalog), ("schema_name", schema)],
                "tables",
            )
            .await?;
        Ok(tables.into_iter().map(TableInfo::from).collect())
    }

    async fn get_table(&self, full_name: &str) -> Result<TableInfo, WarehouseError> {
        let body = self
            .get_json(&format!("{UNITY_CATALOG_PATH}/tables/{full_name}"), &[])
            .await?;
        let table: UcTable =
            serde_json::from_value(body).map_err(|e| WarehouseError::Parse(e.to_string()))?;
        Ok(table.into())
    }

    async fn get_lineage(&self, full_name: &str) -> Result<TableLineage, WarehouseError> {
        if let Some(hit) = self.lineage_cache.read().await.get(full_name) {
            debug!(table = full_name, "lineage cache hit");
            return Ok(hit.clone());
        }

        let body = self
            .get_json(
                LINEAGE_PATH,
                &[("table_name", full_name), ("include_entity_lineage", "false")],
            )
            .await?;
        let lineage = lineage_from(body)?;

        self.lineage_cache
            .write()
            .await
            .insert(full_name.to_string(), lineage.clone());
        Ok(lineage)
    }

    async fn clear_cache(&self) -> Result<(), WarehouseError> {
        let mut cache = self.lineage_cache.write().await;
        debug!(entries = cache.len(), "clearing lineage cache");
        cache.clear();
        Ok(())
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

fn api_error(status: StatusCode, body: &str) -> WarehouseError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(ApiErrorBody {
            error_code,
            message: Some(message),
        }) => WarehouseError::Api {
            code: error_code.unwrap_or_else(|| status.as_u16().to_string()),
            message,
        },
        _ => WarehouseError::Api {
            code: status.as_u16().to_string(),
            message: body.trim().to_string(),
        },
    }
}

/// Classify a Statement Execution API response.
fn statement_result(status: StatusCode, body: &str) -> Result<StatementResult, WarehouseError> {
    if !status.is_success() {
        return match api_error(status, body) {
            WarehouseError::Api { code, message } => Ok(StatementResult::with_status(
                ExecutionStatus::Error,
                &message,
                Some(&code),
            )),
            other => Err(other),
        };
    }

    let parsed: StatementResponse =
        serde_json::from_str(body).map_err(|e| WarehouseError::Parse(e.to_string()))?;
    let state = parsed
        .status
        .ok_or_else(|| WarehouseError::Parse("statement response has no status".into()))?;

    let failure = |kind: ExecutionStatus, fallback: &str| {
        let error = state.error.as_ref();
        StatementResult::with_status(
            kind,
            error
                .and_then(|e| e.message.as_deref())
                .unwrap_or(fallback),
            error.and_then(|e| e.error_code.as_deref()),
        )
    };

    match state.state.as_str() {
        "SUCCEEDED" => {
            let (columns, truncated) = match parsed.manifest {
                Some(manifest) => (
                    manifest
                        .schema
                        .map(|s| s.columns.into_iter().map(|c| c.name).collect())
                        .unwrap_or_default(),
                    manifest.truncated,
                ),
                None => (Vec::new(), false),
            };
            let (rows, more_chunks) = match parsed.result {
                Some(result) => (
                    result
                        .data_array
                        .into_iter()
                        .map(|row| row.into_iter().map(cell_text).collect())
                        .collect(),
                    result.next_chunk_index.is_some(),
                ),
                None => (Vec::new(), false),
            };
            if truncated || more_chunks {
                warn!("statement result exceeds the inline limit, showing the first chunk only");
            }
            Ok(StatementResult::success(columns, rows))
        }
        "FAILED" => Ok(failure(ExecutionStatus::Failed, "Query failed")),
        "CANCELED" | "CLOSED" => Ok(failure(
            ExecutionStatus::Error,
            &format!("Statement {}", state.state.to_lowercase()),
        )),
        other => Ok(StatementResult {
            status: ExecutionStatus::Other(other.to_string()),
            columns: Vec::new(),
            rows: Vec::new(),
            error: None,
            details: None,
        }),
    }
}

fn cell_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn page_items<T: DeserializeOwned>(page: &Value, key: &str) -> Result<Vec<T>, WarehouseError> {
    match page.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(items) => serde_json::from_value(items.clone())
            .map_err(|e| WarehouseError::Parse(format!("'{key}': {e}"))),
    }
}

fn next_page_token(page: &Value) -> Option<String> {
    page.get("next_page_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn lineage_from(body: Value) -> Result<TableLineage, WarehouseError> {
    let parsed: LineageResponse =
        serde_json::from_value(body).map_err(|e| WarehouseError::Parse(e.to_string()))?;
    let names = |edges: Vec<LineageEdge>| -> Vec<String> {
        edges
            .into_iter()
            .filter_map(|edge| {
                let t = edge.table_info?;
                Some(format!("{}.{}.{}", t.catalog_name?, t.schema_name?, t.name?))
            })
            .collect()
    };
    Ok(TableLineage {
        upstream: names(parsed.upstreams),
        downstream: names(parsed.downstreams),
    })
}

// ============================================================================
// Tests
// ============================================================================
