use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tokio::io::BufReader;
use tracing::{info, warn};

use dbsql_assistant::assistant::Assistant;
use dbsql_assistant::catalog::DEFAULT_SEARCH_LIMIT;
use dbsql_assistant::config::{
    self, DEFAULT_KEYWORD_LIMIT, DEFAULT_TOP_TABLES, DiscoveryConfig, ScopePolicy, WarehouseConfig,
};
use dbsql_assistant::databricks::DatabricksClient;
use dbsql_assistant::llm::{GeminiClient, LlmClient};
use dbsql_assistant::rpc;
use dbsql_assistant::server::AssistantServer;
use dbsql_assistant::sql::SqlResolver;

#[derive(Parser)]
#[command(
    name = "dbsql-assistant",
    about = "Natural language SQL assistant for Databricks, served over stdio"
)]
struct Args {
    /// Serve MCP instead of line-delimited JSON-RPC
    #[arg(long)]
    mcp: bool,

    /// Load environment variables from this file instead of the default .env lookup
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Number of keywords searched per discovery
    #[arg(long, env = "DBSQL_KEYWORD_LIMIT", default_value_t = DEFAULT_KEYWORD_LIMIT)]
    keyword_limit: usize,

    /// Number of ranked tables whose details are sent to the model
    #[arg(long, env = "DBSQL_TOP_TABLES", default_value_t = DEFAULT_TOP_TABLES)]
    top_tables: usize,

    /// Row cap for each catalog search
    #[arg(long, env = "DBSQL_SEARCH_LIMIT", default_value_t = DEFAULT_SEARCH_LIMIT)]
    search_limit: usize,

    /// Whether discovery also searches hive_metastore
    #[arg(long, env = "DBSQL_SCOPE_POLICY", value_enum, default_value_t = ScopePolicy::Primary)]
    scope_policy: ScopePolicy,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Env-backed flags are parsed again once the .env file is applied.
    let early = Args::parse();
    if let Some(path) = config::load_env_file(early.env_file.as_deref())? {
        info!(path = %path.display(), "loaded environment file");
    }
    let args = Args::parse();

    // Warehouse settings are required, fail early if missing.
    let warehouse_config = WarehouseConfig::from_env().map_err(|e| {
        format!(
            "{e}. Set DATABRICKS_HOST, DATABRICKS_TOKEN and DATABRICKS_SQL_WAREHOUSE_ID."
        )
    })?;
    let http_timeout = warehouse_config.http_timeout;
    let warehouse = Arc::new(DatabricksClient::new(warehouse_config)?);

    // The model is optional: catalog tools still work without it.
    let llm: Option<Arc<dyn LlmClient>> = match GeminiClient::from_env(http_timeout) {
        Ok(client) => {
            info!(model = client.model(), "model client ready");
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!("{e}; natural language tools are disabled");
            None
        }
    };

    let discovery = DiscoveryConfig {
        keyword_limit: args.keyword_limit,
        top_tables: args.top_tables,
        search_limit: args.search_limit,
        scope_policy: args.scope_policy,
    };
    let assistant = Assistant::new(warehouse, discovery, SqlResolver::new(llm));

    if args.mcp {
        info!("serving MCP on stdio");
        let service = AssistantServer::new(assistant).serve(stdio()).await?;
        service.waiting().await?;
    } else {
        info!("serving JSON-RPC on stdio");
        rpc::serve(
            &assistant,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
        .await?;
    }

    Ok(())
}
