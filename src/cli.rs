use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use dbsql_assistant::client::{ClientError, RpcClient};
use dbsql_assistant::params::{
    CatalogParams, ExecuteSqlParams, ListTablesParams, NaturalQueryParams, NoParams,
    SearchColumnsParams, SearchDescriptionParams, SearchTablesParams, SmartQueryParams,
    TableDetailsParams,
};
use dbsql_assistant::rpc::Method;

#[derive(Parser)]
#[command(
    name = "dbsql",
    about = "Query Databricks in plain English through a dbsql-assistant server"
)]
struct Cli {
    /// Output machine-readable JSON (default: the server's text)
    #[arg(long, global = true)]
    json: bool,

    /// Server binary to spawn (default: dbsql-assistant next to this binary)
    #[arg(long, global = true, env = "DBSQL_SERVER")]
    server: Option<PathBuf>,

    /// Extra argument passed to the server, repeatable (e.g. --server-arg=--env-file=prod.env)
    #[arg(long = "server-arg", global = true, allow_hyphen_values = true)]
    server_args: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all catalogs
    Catalogs,
    /// List the schemas in a catalog
    Schemas { catalog: String },
    /// List the tables in a schema
    Tables {
        catalog: String,
        schema: String,
        /// Omit column listings
        #[arg(long)]
        no_columns: bool,
    },
    /// Show one table's details
    Table {
        /// catalog.schema.table
        full_name: String,
        #[arg(long)]
        lineage: bool,
    },
    /// Search tables by name
    SearchTables {
        pattern: String,
        #[arg(long)]
        catalog: Option<String>,
    },
    /// Search columns by name
    SearchColumns {
        pattern: String,
        #[arg(long)]
        catalog: Option<String>,
        #[arg(long)]
        schema: Option<String>,
    },
    /// Search tables by description
    SearchDescriptions {
        pattern: String,
        #[arg(long)]
        catalog: Option<String>,
    },
    /// Ask a question; discovers relevant tables first
    Ask {
        /// The question (positional, collects remaining args)
        query: Vec<String>,
        #[arg(long)]
        catalog: Option<String>,
        #[arg(long)]
        schema: Option<String>,
        /// Skip schema discovery
        #[arg(long)]
        no_discovery: bool,
    },
    /// Ask a question without schema discovery
    Nl {
        query: Vec<String>,
        #[arg(long)]
        catalog: Option<String>,
        #[arg(long)]
        schema: Option<String>,
    },
    /// Run a SQL statement
    Sql { sql: String },
    /// Clear the server's metadata cache
    ClearCache,
}

/// Locate the server binary installed alongside this one.
fn default_server() -> std::io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(exe.with_file_name(format!(
        "dbsql-assistant{}",
        std::env::consts::EXE_SUFFIX
    )))
}

async fn call<P: Serialize>(
    client: &mut RpcClient,
    method: Method,
    params: P,
) -> Result<String, ClientError> {
    client.call(method, &params).await
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let server = match cli.server {
        Some(path) => path,
        None => default_server()?,
    };
    let mut client = RpcClient::spawn(&server, &cli.server_args)?;

    let (method, result) = match cli.command {
        Command::Catalogs => {
            let m = Method::ListAllCatalogs;
            (m, call(&mut client, m, NoParams {}).await)
        }
        Command::Schemas { catalog } => {
            let m = Method::ListSchemasInCatalog;
            let p = CatalogParams {
                catalog_name: catalog,
            };
            (m, call(&mut client, m, p).await)
        }
        Command::Tables {
            catalog,
            schema,
            no_columns,
        } => {
            let m = Method::ListTablesInSchema;
            let p = ListTablesParams {
                catalog_name: catalog,
                schema_name: schema,
                include_columns: Some(!no_columns),
            };
            (m, call(&mut client, m, p).await)
        }
        Command::Table { full_name, lineage } => {
            let m = Method::GetTableDetails;
            let p = TableDetailsParams {
                full_table_name: full_name,
                include_lineage: Some(lineage),
            };
            (m, call(&mut client, m, p).await)
        }
        Command::SearchTables { pattern, catalog } => {
            let m = Method::SearchTablesByName;
            let p = SearchTablesParams {
                table_name_pattern: pattern,
                catalog_name: catalog,
            };
            (m, call(&mut client, m, p).await)
        }
        Command::SearchColumns {
            pattern,
            catalog,
            schema,
        } => {
            let m = Method::SearchColumnsByName;
            let p = SearchColumnsParams {
                column_name_pattern: pattern,
                catalog_name: catalog,
                schema_name: schema,
            };
            (m, call(&mut client, m, p).await)
        }
        Command::SearchDescriptions { pattern, catalog } => {
            let m = Method::SearchTablesByDescription;
            let p = SearchDescriptionParams {
                description_pattern: pattern,
                catalog_name: catalog,
            };
            (m, call(&mut client, m, p).await)
        }
        Command::Ask {
            query,
            catalog,
            schema,
            no_discovery,
        } => {
            let m = Method::SmartNaturalLanguageQuery;
            let p = SmartQueryParams {
                query: query.join(" "),
                catalog_name: catalog,
                schema_name: schema,
                auto_discover_schema: Some(!no_discovery),
            };
            (m, call(&mut client, m, p).await)
        }
        Command::Nl {
            query,
            catalog,
            schema,
        } => {
            let m = Method::NaturalLanguageQuery;
            let p = NaturalQueryParams {
                query: query.join(" "),
                catalog_name: catalog,
                schema_name: schema,
            };
            (m, call(&mut client, m, p).await)
        }
        Command::Sql { sql } => {
            let m = Method::ExecuteSqlQuery;
            (m, call(&mut client, m, ExecuteSqlParams { sql }).await)
        }
        Command::ClearCache => {
            let m = Method::ClearCache;
            (m, call(&mut client, m, NoParams {}).await)
        }
    };

    client.shutdown().await?;

    match result {
        Ok(text) => {
            if cli.json {
                let output = serde_json::json!({ "method": method.name(), "result": text });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{text}");
            }
        }
        Err(ClientError::Rpc { code, message }) => {
            if cli.json {
                let output = serde_json::json!({
                    "method": method.name(),
                    "error": { "code": code, "message": message },
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                eprintln!("{message}");
            }
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
