//! Schema discovery: find the tables a question is most likely about.
//!
//! The question is reduced to keywords, each keyword is searched by table
//! name, table description and column name, the candidate tables are ranked
//! by how many keywords their fully qualified name contains, and the details
//! of the best few are assembled into the schema context handed to the model.

use indexmap::IndexSet;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogSearch, DiscoveryHit, SearchScope, TableIdentifier};
use crate::config::{DiscoveryConfig, ScopePolicy};
use crate::error::WarehouseError;
use crate::format;
use crate::keywords::{self, KeywordSet};
use crate::warehouse::Warehouse;

/// Header placed above the table blocks of a non-empty context.
const CONTEXT_HEADER: &str = "The following tables are available. You MUST use only these:";

/// Delimiter placed after each table block.
const TABLE_DELIMITER: &str = "---";

// ============================================================================
// Types
// ============================================================================

/// A discovered table with its keyword overlap score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedCandidate {
    pub score: usize,
    pub table: TableIdentifier,
}

/// Rendered detail of one selected table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableContext {
    pub table: TableIdentifier,
    pub detail: String,
}

/// Table details handed to the model. Empty means "no schema constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaContext {
    pub tables: Vec<TableContext>,
}

impl SchemaContext {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Prompt text for this context; empty string when there are no tables.
    pub fn render(&self) -> String {
        if self.tables.is_empty() {
            return String::new();
        }
        let mut out = format!("{CONTEXT_HEADER}\n");
        for table in &self.tables {
            out.push_str(&format!("\n{}\n{TABLE_DELIMITER}\n", table.detail.trim_end()));
        }
        out
    }
}

/// Everything one discovery run produced.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub keywords: KeywordSet,
    pub ranked: Vec<RankedCandidate>,
    pub context: SchemaContext,
}

// ============================================================================
// Engine
// ============================================================================

/// Runs keyword extraction, catalog search, ranking and detail assembly.
pub struct SchemaDiscovery<'a> {
    warehouse: &'a dyn Warehouse,
    config: DiscoveryConfig,
}

impl<'a> SchemaDiscovery<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, config: DiscoveryConfig) -> Self {
        Self { warehouse, config }
    }

    /// Discover the schema context for `query` within `scope`.
    ///
    /// Never fails: search and detail errors are logged and skipped, and an
    /// empty context is a valid result.
    pub async fn discover(&self, query: &str, scope: &SearchScope) -> Discovery {
        let keywords = keywords::extract(query);
        if keywords.is_empty() {
            info!("no keywords in query, skipping schema discovery");
            return Discovery::default();
        }
        info!(keywords = %keywords.joined(), "extracted keywords");

        let discovered = self.collect_tables(&keywords, scope).await;
        let ranked = rank_tables(discovered, &keywords);
        debug!(candidates = ranked.len(), "ranked discovered tables");

        let selected: Vec<&TableIdentifier> = ranked
            .iter()
            .take(self.config.top_tables)
            .map(|c| &c.table)
            .collect();
        let context = self.build_context(&selected).await;

        Discovery {
            keywords,
            ranked,
            context,
        }
    }

    /// Search the capped keyword prefix across every scope and collect the
    /// distinct tables in first-discovered order.
    async fn collect_tables(
        &self,
        keywords: &KeywordSet,
        scope: &SearchScope,
    ) -> IndexSet<TableIdentifier> {
        let search = CatalogSearch::new(self.warehouse, self.config.search_limit);
        let scopes = self.scopes(scope);
        let mut discovered = IndexSet::new();

        for keyword in keywords.prefix(self.config.keyword_limit) {
            for scope in &scopes {
                let (by_name, by_description, by_column) = tokio::join!(
                    search.tables_by_name(keyword, scope),
                    search.tables_by_description(keyword, scope),
                    search.columns_by_name(keyword, scope),
                );
                for result in [by_name, by_description, by_column] {
                    discovered.extend(hits_or_log(keyword, result).into_iter().map(|h| h.table));
                }
            }
        }

        discovered
    }

    fn scopes(&self, scope: &SearchScope) -> Vec<SearchScope> {
        let mut scopes = vec![scope.clone()];
        if self.config.scope_policy == ScopePolicy::WithLegacy {
            let legacy = scope.legacy();
            if legacy != *scope {
                scopes.push(legacy);
            }
        }
        scopes
    }

    async fn build_context(&self, selected: &[&TableIdentifier]) -> SchemaContext {
        let mut tables = Vec::with_capacity(selected.len());
        for table in selected {
            let full_name = table.to_string();
            match self.warehouse.get_table(&full_name).await {
                Ok(info) => tables.push(TableContext {
                    table: (*table).clone(),
                    detail: format::table_details(&info, None),
                }),
                Err(e) => warn!(table = %full_name, "failed to fetch table details: {e}"),
            }
        }
        SchemaContext { tables }
    }
}

fn hits_or_log(
    keyword: &str,
    result: Result<Vec<DiscoveryHit>, WarehouseError>,
) -> Vec<DiscoveryHit> {
    result.unwrap_or_else(|e| {
        warn!(keyword, "catalog search failed, continuing: {e}");
        Vec::new()
    })
}

/// Score each table by the number of keywords its lowercased full name
/// contains, then sort by score descending. Equal scores keep discovery
/// order.
pub fn rank_tables(
    tables: impl IntoIterator<Item = TableIdentifier>,
    keywords: &KeywordSet,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = tables
        .into_iter()
        .map(|table| RankedCandidate {
            score: keywords.overlap(&table.to_string()),
            table,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

// ============================================================================
// Tests
// ============================================================================
