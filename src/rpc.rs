//! Line-delimited JSON-RPC 2.0 over any async byte stream.
//!
//! One request per line, one response per line, processed strictly in
//! order. [`Method`] is the single table mapping wire names to assistant
//! operations.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::assistant::Assistant;
use crate::error::AssistantError;

/// Unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Malformed request, invalid params, or handler failure.
pub const INTERNAL_ERROR: i64 = -32603;

const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// Method Table
// ============================================================================

/// Every remotely callable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    ListAllCatalogs,
    ListSchemasInCatalog,
    ListTablesInSchema,
    GetTableDetails,
    SearchTablesByName,
    SearchColumnsByName,
    SearchTablesByDescription,
    SmartNaturalLanguageQuery,
    ExecuteSqlQuery,
    NaturalLanguageQuery,
    ClearCache,
}

impl Method {
    pub const ALL: [Method; 11] = [
        Method::ListAllCatalogs,
        Method::ListSchemasInCatalog,
        Method::ListTablesInSchema,
        Method::GetTableDetails,
        Method::SearchTablesByName,
        Method::SearchColumnsByName,
        Method::SearchTablesByDescription,
        Method::SmartNaturalLanguageQuery,
        Method::ExecuteSqlQuery,
        Method::NaturalLanguageQuery,
        Method::ClearCache,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Method::ListAllCatalogs => "list_all_catalogs",
            Method::ListSchemasInCatalog => "list_schemas_in_catalog",
            Method::ListTablesInSchema => "list_tables_in_schema",
            Method::GetTableDetails => "get_table_details",
            Method::SearchTablesByName => "search_tables_by_name",
            Method::SearchColumnsByName => "search_columns_by_name",
            Method::SearchTablesByDescription => "search_tables_by_description",
            Method::SmartNaturalLanguageQuery => "smart_natural_language_query",
            Method::ExecuteSqlQuery => "execute_sql_query",
            Method::NaturalLanguageQuery => "natural_language_query",
            Method::ClearCache => "clear_cache",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcResponse {
    pub fn success(id: Value, result: String) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Decode `params` for one method. Missing or `null` params decode as `{}`.
fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, AssistantError> {
    let params = match params {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(params).map_err(|e| AssistantError::InvalidParams(e.to_string()))
}

/// Route one call to the assistant.
pub async fn dispatch(
    assistant: &Assistant,
    method: Method,
    params: Value,
) -> Result<String, AssistantError> {
    match method {
        Method::ListAllCatalogs => assistant.list_all_catalogs().await,
        Method::ListSchemasInCatalog => {
            assistant.list_schemas_in_catalog(parse_params(params)?).await
        }
        Method::ListTablesInSchema => assistant.list_tables_in_schema(parse_params(params)?).await,
        Method::GetTableDetails => assistant.get_table_details(parse_params(params)?).await,
        Method::SearchTablesByName => assistant.search_tables_by_name(parse_params(params)?).await,
        Method::SearchColumnsByName => {
            assistant.search_columns_by_name(parse_params(params)?).await
        }
        Method::SearchTablesByDescription => {
            assistant
                .search_tables_by_description(parse_params(params)?)
                .await
        }
        Method::SmartNaturalLanguageQuery => {
            assistant
                .smart_natural_language_query(parse_params(params)?)
                .await
        }
        Method::ExecuteSqlQuery => assistant.execute_sql_query(parse_params(params)?).await,
        Method::NaturalLanguageQuery => {
            assistant.natural_language_query(parse_params(params)?).await
        }
        Method::ClearCache => assistant.clear_cache().await,
    }
}

/// Handle one input line. Returns `None` for blank lines.
pub async fn handle_line(assistant: &Assistant, line: &str) -> Option<RpcResponse> {
    if line.trim().is_empty() {
        return None;
    }

    let request = match serde_json::from_str::<Value>(line) {
        Ok(value) => match RpcRequest::deserialize(&value) {
            Ok(request) => request,
            Err(e) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                warn!("invalid request: {e}");
                return Some(RpcResponse::error(id, INTERNAL_ERROR, format!("Parse error: {e}")));
            }
        },
        Err(e) => {
            warn!("unparseable request line: {e}");
            return Some(RpcResponse::error(
                Value::Null,
                INTERNAL_ERROR,
                format!("Parse error: {e}"),
            ));
        }
    };

    let Some(method) = Method::from_name(&request.method) else {
        warn!(method = %request.method, "method not found");
        return Some(RpcResponse::error(
            request.id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", request.method),
        ));
    };

    info!(%method, "handling request");
    let response = match dispatch(assistant, method, request.params).await {
        Ok(text) => RpcResponse::success(request.id, text),
        Err(e) => {
            warn!(%method, "request failed: {e}");
            RpcResponse::error(request.id, INTERNAL_ERROR, e.to_string())
        }
    };
    Some(response)
}

/// Serve requests from `reader` until end of input, writing each response
/// as one line to `writer`.
pub async fn serve<R, W>(
    assistant: &Assistant,
    mut reader: R,
    mut writer: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let response = match std::str::from_utf8(&buf) {
            Ok(line) => handle_line(assistant, line).await,
            Err(e) => {
                warn!("request line is not valid UTF-8: {e}");
                Some(RpcResponse::error(
                    Value::Null,
                    INTERNAL_ERROR,
                    format!("Parse error: {e}"),
                ))
            }
        };
        let Some(response) = response else {
            continue;
        };
        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await?;
        writer.flush().await?;
    }
    debug!("input closed, stopping");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
