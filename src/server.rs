//! MCP server exposing the assistant operations as tools over stdio.

use rmcp::handler::server::{router::tool::ToolRouter, wrapper::Parameters};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData, ServerHandler, tool, tool_handler, tool_router};

use crate::assistant::Assistant;
use crate::error::AssistantError;
use crate::params::{
    CatalogParams, ExecuteSqlParams, ListTablesParams, NaturalQueryParams, SearchColumnsParams,
    SearchDescriptionParams, SearchTablesParams, SmartQueryParams, TableDetailsParams,
};

fn tool_result(result: Result<String, AssistantError>) -> Result<CallToolResult, ErrorData> {
    match result {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(AssistantError::InvalidParams(msg)) => Err(ErrorData::invalid_params(msg, None)),
        Err(e) => Err(ErrorData::internal_error(e.to_string(), None)),
    }
}

// ---------------------------------------------------------------------------
// MCP Server
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AssistantServer {
    assistant: Assistant,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl AssistantServer {
    pub fn new(assistant: Assistant) -> Self {
        Self {
            assistant,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "List all Unity Catalog catalogs in the workspace.")]
    async fn list_all_catalogs(&self) -> Result<CallToolResult, ErrorData> {
        tool_result(self.assistant.list_all_catalogs().await)
    }

    #[tool(description = "List the schemas in a catalog.")]
    async fn list_schemas_in_catalog(
        &self,
        Parameters(p): Parameters<CatalogParams>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.assistant.list_schemas_in_catalog(p).await)
    }

    #[tool(description = "List the tables in a schema, optionally with their columns.")]
    async fn list_tables_in_schema(
        &self,
        Parameters(p): Parameters<ListTablesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.assistant.list_tables_in_schema(p).await)
    }

    #[tool(
        description = "Show a table's type, comment and columns (with types and nullability), optionally with upstream and downstream lineage."
    )]
    async fn get_table_details(
        &self,
        Parameters(p): Parameters<TableDetailsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.assistant.get_table_details(p).await)
    }

    #[tool(description = "Find tables whose name contains a pattern.")]
    async fn search_tables_by_name(
        &self,
        Parameters(p): Parameters<SearchTablesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.assistant.search_tables_by_name(p).await)
    }

    #[tool(description = "Find columns whose name contains a pattern.")]
    async fn search_columns_by_name(
        &self,
        Parameters(p): Parameters<SearchColumnsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.assistant.search_columns_by_name(p).await)
    }

    #[tool(description = "Find tables whose comment contains a pattern.")]
    async fn search_tables_by_description(
        &self,
        Parameters(p): Parameters<SearchDescriptionParams>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.assistant.search_tables_by_description(p).await)
    }

    #[tool(
        description = "Answer a question in plain English: discover the relevant tables, generate SQL restricted to them, run it and show the SQL, the discovered schema and the results."
    )]
    async fn smart_natural_language_query(
        &self,
        Parameters(p): Parameters<SmartQueryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.assistant.smart_natural_language_query(p).await)
    }

    #[tool(description = "Run a SQL statement on the SQL warehouse and show the results.")]
    async fn execute_sql_query(
        &self,
        Parameters(p): Parameters<ExecuteSqlParams>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.assistant.execute_sql_query(p).await)
    }

    #[tool(
        description = "Generate SQL for a question in plain English without schema discovery, run it and show the SQL and results."
    )]
    async fn natural_language_query(
        &self,
        Parameters(p): Parameters<NaturalQueryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.assistant.natural_language_query(p).await)
    }

    #[tool(description = "Clear cached table lineage.")]
    async fn clear_cache(&self) -> Result<CallToolResult, ErrorData> {
        tool_result(self.assistant.clear_cache().await)
    }
}

#[tool_handler]
impl ServerHandler for AssistantServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Databricks SQL assistant. Browse Unity Catalog with 'list_all_catalogs', \
                 'list_schemas_in_catalog', 'list_tables_in_schema' and 'get_table_details', \
                 search metadata with the 'search_*' tools, run SQL with 'execute_sql_query', \
                 and ask questions in plain English with 'smart_natural_language_query'."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
