//! Natural language to SQL resolution.
//!
//! Builds the model prompt, calls the [`LlmClient`], and reduces whatever
//! comes back to exactly one statement whose leading keyword is
//! allow-listed. Anything else degrades to [`FALLBACK_SQL`].

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::discovery::SchemaContext;
use crate::error::ResolveError;
use crate::llm::LlmClient;

/// Leading keywords a resolved statement may start with.
pub const ALLOWED_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP", "SHOW", "DESCRIBE",
    "EXPLAIN",
];

/// Statement substituted when the model reply is unusable.
pub const FALLBACK_SQL: &str = "SELECT 'Unable to generate SQL for this request' AS message";

const SYSTEM_PROMPT: &str = "You are a SQL assistant that converts natural language into Databricks SQL queries.
Rules:
1. Return ONLY a single valid SQL query.
2. Do NOT add explanations, comments, or alternative queries.
3. If schema context is provided, use only those tables and columns. Otherwise no schema constraint applies.
4. Always wrap the SQL inside <SQL>...</SQL> tags.
5. If you cannot write the query, return <SQL>SELECT 'Unable to generate SQL for this request' AS message</SQL>.";

static TAGGED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<sql>(.*?)</sql>").expect("tag pattern is valid"));

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:[A-Za-z]*[ \t]*\r?\n)?(.*?)```").expect("fence pattern is valid")
});

static LEADING_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+").expect("word pattern is valid"));

// ============================================================================
// Types
// ============================================================================

/// Where the resolved statement came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlSource {
    /// Extracted from a `<SQL>...</SQL>` block.
    Tagged,
    /// Taken from untagged output that already began with a statement.
    Scanned,
    /// The model reply was unusable.
    Fallback,
}

impl fmt::Display for SqlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tagged => "tagged",
            Self::Scanned => "scanned",
            Self::Fallback => "fallback",
        })
    }
}

/// One trimmed, allow-listed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSql {
    pub sql: String,
    pub source: SqlSource,
}

impl ResolvedSql {
    pub fn fallback() -> Self {
        Self {
            sql: FALLBACK_SQL.to_string(),
            source: SqlSource::Fallback,
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Turns questions into SQL through a generative model.
#[derive(Clone)]
pub struct SqlResolver {
    llm: Option<Arc<dyn LlmClient>>,
}

impl SqlResolver {
    /// `None` means no model credentials are configured; every resolve
    /// then fails with [`ResolveError::MissingCredentials`].
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    pub async fn resolve(
        &self,
        query: &str,
        catalog: Option<&str>,
        schema: Option<&str>,
        context: Option<&SchemaContext>,
    ) -> Result<ResolvedSql, ResolveError> {
        let llm = self.llm.as_ref().ok_or(ResolveError::MissingCredentials)?;

        let user = build_user_prompt(query, catalog, schema, context);
        let completion = llm.complete(SYSTEM_PROMPT, &user).await?;
        debug!(chars = completion.text.len(), "model reply received");

        let resolved = parse_model_output(&completion.text);
        if resolved.source == SqlSource::Fallback {
            warn!("model reply held no usable statement, using fallback");
        }
        Ok(resolved)
    }
}

/// The user message: default namespace lines, schema context, question.
pub fn build_user_prompt(
    query: &str,
    catalog: Option<&str>,
    schema: Option<&str>,
    context: Option<&SchemaContext>,
) -> String {
    let mut prompt = String::new();
    if let Some(catalog) = catalog {
        prompt.push_str(&format!("Default catalog: {catalog}.\n"));
    }
    if let Some(schema) = schema {
        prompt.push_str(&format!("Default schema: {schema}.\n"));
    }
    match context.filter(|c| !c.is_empty()) {
        Some(context) => {
            prompt.push_str(&format!("\nAvailable schema information:\n{}\n", context.render()));
        }
        None => prompt.push_str("\nNo schema context was discovered.\n"),
    }
    prompt.push_str(&format!("\nNatural language query:\n{query}"));
    prompt
}

// ============================================================================
// Parsing
// ============================================================================

/// Reduce a model reply to one allow-listed statement.
///
/// A `<SQL>` block wins when present. Without one, a fenced code block (or
/// else the whole reply) is accepted only when it already starts with an
/// allow-listed keyword. Everything else yields the fallback.
pub fn parse_model_output(text: &str) -> ResolvedSql {
    if let Some(caps) = TAGGED_RE.captures(text) {
        let inner = strip_fences(caps.get(1).map_or("", |m| m.as_str()));
        return accept(first_statement(inner, false), SqlSource::Tagged);
    }

    let candidate = FENCE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str());
    accept(first_statement(candidate, true), SqlSource::Scanned)
}

fn accept(sql: &str, source: SqlSource) -> ResolvedSql {
    if validate(sql) {
        ResolvedSql {
            sql: sql.to_string(),
            source,
        }
    } else {
        ResolvedSql::fallback()
    }
}

/// True when the statement's first word is allow-listed.
pub fn validate(sql: &str) -> bool {
    LEADING_WORD_RE
        .find(sql.trim_start())
        .is_some_and(|m| {
            ALLOWED_KEYWORDS
                .iter()
                .any(|kw| kw.eq_ignore_ascii_case(m.as_str()))
        })
}

fn strip_fences(text: &str) -> &str {
    FENCE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str())
}

/// Text up to the first `;` outside quotes, trimmed. With `paragraph`
/// set, a blank line outside quotes also ends the statement.
fn first_statement(text: &str, paragraph: bool) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (None, '\'' | '"' | '`') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ';') => return text[..i].trim(),
            (None, '\n') if paragraph && starts_blank_line(&text[i + 1..]) => {
                return text[..i].trim();
            }
            _ => {}
        }
    }
    text.trim()
}

fn starts_blank_line(rest: &str) -> bool {
    rest.trim_start_matches([' ', '\t', '\r']).starts_with('\n')
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableIdentifier;
    use crate::discovery::TableContext;
    use crate::llm::MockLlmClient;

    fn resolver(mock: &Arc<MockLlmClient>) -> SqlResolver {
        SqlResolver::new(Some(mock.clone() as Arc<dyn LlmClient>))
    }

    #[test]
    fn test_tagged_output() {
        let out = parse_model_output("Here you go:\n<SQL>\n  SELECT * FROM main.crm.customers\n</SQL>");
        assert_eq!(out.sql, "SELECT * FROM main.crm.customers");
        assert_eq!(out.source, SqlSource::Tagged);
    }

    #[test]
    fn test_tags_are_case_insensitive_and_fences_stripped() {
        let out = parse_model_output("<sql>```sql\nselect 1\n```</sql>");
        assert_eq!(out.sql, "select 1");
        assert_eq!(out.source, SqlSource::Tagged);
    }

    #[test]
    fn test_tagged_output_keeps_first_statement_only() {
        let out = parse_model_output("<SQL>SELECT 1; DROP TABLE main.crm.customers;</SQL>");
        assert_eq!(out.sql, "SELECT 1");
    }

    #[test]
    fn test_semicolon_inside_string_literal_is_kept() {
        let out = parse_model_output("<SQL>SELECT 'a;b' AS x; SELECT 2</SQL>");
        assert_eq!(out.sql, "SELECT 'a;b' AS x");
    }

    #[test]
    fn test_untagged_statement_stops_at_paragraph_break() {
        let out = parse_model_output(
            "SELECT email FROM main.crm.customers\n\nThis query returns every customer's email.",
        );
        assert_eq!(out.sql, "SELECT email FROM main.crm.customers");
        assert_eq!(out.source, SqlSource::Scanned);

        let out = parse_model_output("SELECT 1\n  \r\nThis query ...");
        assert_eq!(out.sql, "SELECT 1");
    }

    #[test]
    fn test_untagged_multiline_statement_is_kept_whole() {
        let out = parse_model_output("SELECT id,\n  email\nFROM main.crm.customers");
        assert_eq!(out.sql, "SELECT id,\n  email\nFROM main.crm.customers");
    }

    #[test]
    fn test_tagged_statement_may_contain_blank_lines() {
        let out = parse_model_output("<SQL>WITH t AS (SELECT 1)\n\nSELECT * FROM t</SQL>");
        assert_eq!(out.sql, "WITH t AS (SELECT 1)\n\nSELECT * FROM t");
    }

    #[test]
    fn test_one_line_fence_without_language_tag() {
        let out = parse_model_output("```SELECT 1```");
        assert_eq!(out.sql, "SELECT 1");
        assert_eq!(out.source, SqlSource::Scanned);

        // A language tag needs its own line.
        let out = parse_model_output("```sql SELECT 2```");
        assert_eq!(out.source, SqlSource::Fallback);
    }

    #[test]
    fn test_untagged_statement_is_scanned() {
        let out = parse_model_output("WITH t AS (SELECT 1) SELECT * FROM t;\nThis query selects...");
        assert_eq!(out.sql, "WITH t AS (SELECT 1) SELECT * FROM t");
        assert_eq!(out.source, SqlSource::Scanned);
    }

    #[test]
    fn test_untagged_fenced_block_is_scanned() {
        let out = parse_model_output("```sql\nSHOW TABLES IN main.crm\n```");
        assert_eq!(out.sql, "SHOW TABLES IN main.crm");
        assert_eq!(out.source, SqlSource::Scanned);
    }

    #[test]
    fn test_adversarial_outputs_fall_back() {
        for reply in [
            "",
            "   ",
            "I'm sorry, I cannot help with that.",
            "Here is the query: SELECT 1",
            "<SQL></SQL>",
            "<SQL>Sure! The answer is 42.</SQL>",
            "<SQL>GRANT ALL PRIVILEGES ON CATALOG main TO `everyone`</SQL>",
            "```python\nprint('hi')\n```",
            "<SQL>-- comment only</SQL>",
            "MERGE INTO t USING s ON t.id = s.id",
        ] {
            let out = parse_model_output(reply);
            assert_eq!(out, ResolvedSql::fallback(), "reply: {reply:?}");
        }
    }

    #[test]
    fn test_resolved_sql_is_always_allow_listed() {
        for reply in [
            "<SQL>delete from t where id = 1</SQL>",
            "explain select 1",
            "nonsense",
            "<SQL>; SELECT 1</SQL>",
        ] {
            assert!(validate(&parse_model_output(reply).sql), "reply: {reply:?}");
        }
        assert!(validate(FALLBACK_SQL));
    }

    #[test]
    fn test_user_prompt_with_context() {
        let context = SchemaContext {
            tables: vec![TableContext {
                table: TableIdentifier::new("main", "crm", "customers"),
                detail: "**Table:** main.crm.customers\n".into(),
            }],
        };
        let prompt = build_user_prompt("count customers", Some("main"), None, Some(&context));
        assert!(prompt.starts_with("Default catalog: main.\n"));
        assert!(!prompt.contains("Default schema"));
        assert!(prompt.contains("You MUST use only these"));
        assert!(prompt.contains("**Table:** main.crm.customers"));
        assert!(prompt.ends_with("Natural language query:\ncount customers"));
    }

    #[test]
    fn test_user_prompt_without_context() {
        let prompt = build_user_prompt("count customers", None, None, Some(&SchemaContext::default()));
        assert!(prompt.contains("No schema context was discovered."));
        assert!(!prompt.contains("Available schema information"));
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let result = SqlResolver::new(None).resolve("anything", None, None, None).await;
        assert!(matches!(result, Err(ResolveError::MissingCredentials)));
    }

    #[tokio::test]
    async fn test_model_fault_is_an_error() {
        let mock = Arc::new(MockLlmClient::with_results(vec![Err("quota exceeded".into())]));
        let result = resolver(&mock).resolve("count orders", None, None, None).await;

        let err = result.unwrap_err();
        assert!(matches!(err, ResolveError::Model(_)));
        assert!(err.to_string().starts_with("Error generating SQL:"));
    }

    #[tokio::test]
    async fn test_resolve_sends_rules_and_parses_reply() {
        let mock = Arc::new(MockLlmClient::new(vec![
            "<SQL>SELECT COUNT(*) FROM main.sales.orders</SQL>".into(),
        ]));
        let resolved = resolver(&mock)
            .resolve("how many orders", Some("main"), Some("sales"), None)
            .await
            .unwrap();

        assert_eq!(resolved.sql, "SELECT COUNT(*) FROM main.sales.orders");
        let (system, user) = mock.last_prompt().unwrap();
        assert!(system.contains("<SQL>...</SQL>"));
        assert!(user.contains("Default schema: sales."));
        assert_eq!(mock.call_count(), 1);
    }
}
