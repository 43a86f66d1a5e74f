//! Keyword extraction for schema discovery.
//!
//! Turns a free-text question into the search terms used for catalog
//! lookups. The stop-word list and synonym groups are static data tables so
//! they can be extended without touching the extraction logic.

use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;

// ============================================================================
// Static Vocabulary
// ============================================================================

/// Words that never carry table or column meaning in a question.
pub const STOP_WORDS: &[&str] = &[
    // articles, conjunctions
    "a", "an", "the", "and", "or", "but", "nor",
    // prepositions
    "in", "on", "at", "to", "for", "of", "with", "by", "from", "into", "about", "per",
    // verbs of being
    "is", "are", "was", "were", "be", "been", "do", "does", "did", "has", "have", "had",
    // interrogatives and quantifiers
    "what", "which", "when", "where", "why", "how", "who", "whom", "whose", "many", "much",
    "few", "all", "any", "each", "every", "some",
    // pronouns
    "me", "my", "i", "we", "our", "you", "your", "it", "its", "they", "their", "them",
    "this", "that", "these", "those", "there",
    // generic request verbs
    "give", "show", "display", "list", "find", "search", "get", "return", "fetch", "tell",
    "please", "can", "could", "would", "want", "need",
];

/// Synonym groups. Each group contains its head word; a match on any member
/// adds the whole group.
pub const SYNONYM_GROUPS: &[&[&str]] = &[
    &["name", "names", "firstname", "lastname", "fullname"],
    &["id", "identifier", "code", "number"],
    &["customer", "client", "user", "account"],
    &["order", "purchase", "transaction"],
    &["product", "item", "sku", "goods"],
];

static STOP_SET: LazyLock<IndexSet<&'static str>> =
    LazyLock::new(|| STOP_WORDS.iter().copied().collect());

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}_]+").expect("token pattern is valid")
});

// ============================================================================
// Keyword Set
// ============================================================================

/// Deduplicated, insertion-ordered set of lowercase search terms.
///
/// Tokens taken from the question come first in question order, followed
/// by synonym expansions, so a capped prefix favors the user's own words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSet {
    words: IndexSet<String>,
}

impl KeywordSet {
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    /// The first `limit` keywords, in set order.
    pub fn prefix(&self, limit: usize) -> impl Iterator<Item = &str> {
        self.iter().take(limit)
    }

    /// Number of keywords contained in `text` (compared lowercased).
    pub fn overlap(&self, text: &str) -> usize {
        let haystack = text.to_lowercase();
        self.iter().filter(|kw| haystack.contains(kw)).count()
    }

    /// Space-joined keywords, e.g. for logging.
    pub fn joined(&self) -> String {
        self.iter().collect::<Vec<_>>().join(" ")
    }
}

impl<'a> FromIterator<&'a str> for KeywordSet {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        Self {
            words: iter.into_iter().map(str::to_string).collect(),
        }
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Extract salient search terms from a natural language question.
///
/// Stop words are dropped. A token is kept when it is longer than two
/// characters, purely numeric (IDs matter at any length), or part of the
/// synonym vocabulary. Kept tokens that belong to a synonym group pull in
/// the rest of the group.
pub fn extract(query: &str) -> KeywordSet {
    let mut primary: IndexSet<String> = IndexSet::new();
    let mut expanded: IndexSet<String> = IndexSet::new();

    for token in TOKEN_RE.find_iter(query) {
        let token = token.as_str().to_lowercase();
        if STOP_SET.contains(token.as_str()) {
            continue;
        }

        let group = synonym_group(&token);
        let numeric = token.chars().all(|c| c.is_ascii_digit());
        if token.chars().count() <= 2 && !numeric && group.is_none() {
            continue;
        }

        if let Some(group) = group {
            expanded.extend(group.iter().map(|w| w.to_string()));
        }
        primary.insert(token);
    }

    primary.extend(expanded);
    KeywordSet { words: primary }
}

/// The synonym group containing `word`, if any (first match wins).
fn synonym_group(word: &str) -> Option<&'static [&'static str]> {
    SYNONYM_GROUPS
        .iter()
        .copied()
        .find(|group| group.contains(&word))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query() {
        assert!(extract("").is_empty());
        assert!(extract("   ?!  ").is_empty());
    }

    #[test]
    fn test_only_stop_words() {
        assert!(extract("Show me all of those that are there").is_empty());
        assert!(extract("what is the").is_empty());
    }

    #[test]
    fn test_short_numeric_tokens_survive() {
        let kws = extract("orders in region 7");
        assert!(kws.contains("7"));
        assert!(kws.contains("region"));
        // "in" is a stop word, not a short keyword.
        assert!(!kws.contains("in"));
    }

    #[test]
    fn test_short_non_numeric_tokens_dropped() {
        let kws = extract("revenue xy q3");
        assert!(kws.contains("revenue"));
        assert!(!kws.contains("xy"));
        assert!(!kws.contains("q3"));
    }

    #[test]
    fn test_lowercases_and_strips_punctuation() {
        let kws = extract("Revenue, by REGION?");
        assert_eq!(kws.iter().collect::<Vec<_>>(), vec!["revenue", "region"]);
    }

    #[test]
    fn test_synonym_expansion_adds_group() {
        let kws = extract("client emails");
        for word in ["client", "customer", "user", "account", "emails"] {
            assert!(kws.contains(word), "missing {word}");
        }
    }

    #[test]
    fn test_primary_tokens_precede_expansions() {
        let kws = extract("products sold per item");
        let words: Vec<&str> = kws.iter().collect();
        assert_eq!(&words[..3], &["products", "sold", "item"]);
        assert!(words[3..].contains(&"sku"));
    }

    #[test]
    fn test_deduplicates() {
        let kws = extract("order order ORDER");
        assert_eq!(kws.iter().filter(|w| *w == "order").count(), 1);
    }

    #[test]
    fn test_customer_emails_for_order_id() {
        let kws = extract("Show me customer emails for order ID 105");
        let prefix: Vec<&str> = kws.prefix(5).collect();
        assert_eq!(prefix, vec!["customer", "emails", "order", "id", "105"]);
        assert!(kws.contains("transaction"));
        assert!(!kws.contains("show"));
        assert!(!kws.contains("me"));
    }

    #[test]
    fn test_idempotent_on_own_output() {
        for query in [
            "Show me customer emails for order ID 105",
            "total revenue per product in 2023",
            "list every name in the users table",
        ] {
            let first = extract(query);
            let second = extract(&first.joined());
            let a: IndexSet<&str> = first.iter().collect();
            let b: IndexSet<&str> = second.iter().collect();
            assert_eq!(a, b, "not idempotent for {query:?}");
        }
    }

    #[test]
    fn test_no_stop_words_in_output() {
        let kws = extract("which of the customers did place an order with us");
        for word in kws.iter() {
            assert!(!STOP_WORDS.contains(&word), "stop word {word} leaked");
        }
    }

    #[test]
    fn test_overlap_counts_contained_keywords() {
        let kws = extract("customer orders");
        assert_eq!(kws.overlap("main.sales.customer_orders"), 2);
        assert_eq!(kws.overlap("main.crm.user_accounts"), 2);
        assert_eq!(kws.overlap("main.hr.employees"), 0);
    }
}
