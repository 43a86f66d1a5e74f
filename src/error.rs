//! Error types for the dbsql-assistant crate.

use thiserror::Error;

use crate::llm::LlmError;

/// Errors returned by the warehouse collaborator (SQL execution and catalog metadata).
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// HTTP or network failure talking to the workspace.
    #[error("HTTP error: {0}")]
    Http(String),
    /// The workspace answered with an API error payload.
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },
    /// The response body did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),
    /// A metadata lookup returned a non-success statement status.
    #[error("Lookup failed: {0}")]
    Lookup(String),
}

/// Errors from the SQL resolver that short-circuit before a statement exists.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No model credentials are configured.
    #[error("Error: GEMINI_API_KEY not set. Cannot generate SQL from natural language.")]
    MissingCredentials,
    /// The model call itself failed.
    #[error("Error generating SQL: {0}")]
    Model(#[from] LlmError),
}

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("{0} environment variable not set")]
    MissingVar(&'static str),
    /// A variable is set but its value is unusable.
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Errors surfaced by assistant operations to the transport layer.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// Invalid parameters provided by the caller.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}
