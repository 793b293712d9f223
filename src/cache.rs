//! Cache Layer - TTL caches shared across workflow invocations
//!
//! Two named caches: source schemas (long TTL) and query results (short TTL,
//! keyed by data source + normalized SQL). Expiry is lazy: an expired entry is
//! dropped the next time it is read.

use crate::execution::result::QueryResult;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_SCHEMA_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_QUERY_RESULT_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub name: String,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Concurrent key/value cache with per-entry TTL
pub struct TtlCache<V> {
    name: &'static str,
    default_ttl: Duration,
    entries: DashMap<String, CacheEntry<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: &'static str, default_ttl: Duration) -> Self {
        Self {
            name,
            default_ttl,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a live entry. Expired entries count as a miss and are removed.
    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }

        if self.entries.remove_if(key, |_, entry| entry.is_expired()).is_some() {
            debug!("{} cache entry expired: {}", self.name, key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Insert or replace the entry for `key`
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        self.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                value,
                cached_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Not required for correctness.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            name: self.name.to_string(),
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// The two caches a workflow orchestrator reads and writes
pub struct PipelineCaches {
    pub schema: TtlCache<Value>,
    pub query_results: TtlCache<QueryResult>,
}

impl PipelineCaches {
    pub fn new(schema_ttl: Duration, query_result_ttl: Duration) -> Self {
        Self {
            schema: TtlCache::new("schema", schema_ttl),
            query_results: TtlCache::new("query_result", query_result_ttl),
        }
    }
}

impl Default for PipelineCaches {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMA_TTL, DEFAULT_QUERY_RESULT_TTL)
    }
}

/// Query-result cache key for a SQL statement against a data source
pub fn query_fingerprint(data_source_id: &str, sql: &str) -> String {
    format!("{}::{}", data_source_id, normalize_sql(sql))
}

/// Canonical rendering of a SQL string.
///
/// Parsable SQL is re-rendered from its AST, which normalizes whitespace and
/// keyword case. Anything the parser rejects falls back to whitespace
/// collapsing and lowercasing outside quoted spans.
pub fn normalize_sql(sql: &str) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    match Parser::parse_sql(&GenericDialect {}, trimmed) {
        Ok(statements) if !statements.is_empty() => statements
            .iter()
            .map(|statement| statement.to_string())
            .collect::<Vec<_>>()
            .join("; "),
        _ => fold_unquoted(trimmed),
    }
}

/// Collapse whitespace and lowercase everything except `'...'`, `"..."`
/// and backtick-quoted spans, which are kept verbatim.
fn fold_unquoted(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    for c in sql.chars() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c.is_whitespace() => pending_space = true,
            None => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                if matches!(c, '\'' | '"' | '`') {
                    quote = Some(c);
                    out.push(c);
                } else {
                    out.extend(c.to_lowercase());
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_then_get() {
        let cache: TtlCache<Value> = TtlCache::new("schema", DEFAULT_SCHEMA_TTL);
        cache.set("sales_db", json!({"tables": ["orders"]}));
        assert_eq!(cache.get("sales_db"), Some(json!({"tables": ["orders"]})));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let cache: TtlCache<String> = TtlCache::new("query_result", DEFAULT_QUERY_RESULT_TTL);
        cache.set_with_ttl("k", "v".to_string(), Duration::from_millis(40));
        assert_eq!(cache.get("k"), Some("v".to_string()));

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_set_replaces_existing_entry() {
        let cache: TtlCache<u32> = TtlCache::new("test", Duration::from_secs(60));
        cache.set("k", 1);
        cache.set("k", 2);
        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let cache: TtlCache<u32> = TtlCache::new("test", Duration::from_secs(60));
        cache.set_with_ttl("old", 1, Duration::from_millis(0));
        cache.set("fresh", 2);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.get("fresh"), Some(2));
    }

    #[test]
    fn test_fingerprint_ignores_whitespace_and_keyword_case() {
        let a = query_fingerprint("ds1", "select status, sum(amount)  from orders\n group by status;");
        let b = query_fingerprint("ds1", "SELECT status, sum(amount) FROM orders GROUP BY status");
        assert_eq!(a, b);
        assert_ne!(a, query_fingerprint("ds2", "SELECT status, sum(amount) FROM orders GROUP BY status"));
    }

    #[test]
    fn test_fingerprint_falls_back_for_unparsable_sql() {
        let a = query_fingerprint("ds1", "SELEC  broken   QUERY");
        assert_eq!(a, "ds1::selec broken query");
    }

    #[test]
    fn test_fallback_keeps_literal_case() {
        for tail in ["SETTINGS max_threads = 1", "FOR SHARE SKIP LOCKED NOWAIT", "LIMIT 5 WITH TIES"] {
            let upper = query_fingerprint("ds", &format!("SELECT * FROM users WHERE name = 'Bob' {}", tail));
            let lower = query_fingerprint("ds", &format!("SELECT * FROM users WHERE name = 'bob' {}", tail));
            assert_ne!(upper, lower, "{}", tail);
        }
    }

    #[test]
    fn test_fallback_keeps_quoted_whitespace() {
        let normalized = normalize_sql("SELEC  \"Full  Name\"  FROM   t WHERE x = 'A  b'");
        assert_eq!(normalized, "selec \"Full  Name\" from t where x = 'A  b'");
    }

    #[test]
    fn test_concurrent_access() {
        let cache = std::sync::Arc::new(TtlCache::<usize>::new("test", Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.set(format!("{}-{}", t, i), i);
                        assert_eq!(cache.get(&format!("{}-{}", t, i)), Some(i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 800);
    }
}
