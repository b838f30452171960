//! Prepared statement caching with LRU eviction.
//!
//! Sessions cache server-side prepared statements so repeated executions
//! of the same text reuse one `COM_STMT_PREPARE` round-trip. The cache
//! is keyed by the exact statement text: two texts that differ only in
//! whitespace are distinct entries.
//!
//! ## Lifecycle
//!
//! 1. `prepare()` sends `COM_STMT_PREPARE`, the server returns a statement id
//! 2. The id is cached by text; later executions dispatch `COM_STMT_EXECUTE`
//! 3. When the cache is full, LRU eviction should `COM_STMT_CLOSE` the evicted id
//! 4. Connection close implicitly releases all server-side statements

use std::num::NonZeroUsize;
use std::time::Instant;

use lru::LruCache;

/// Default maximum number of prepared statements to cache per connection.
pub const DEFAULT_MAX_STATEMENTS: usize = 256;

/// A server-side prepared statement.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    /// Server-assigned statement id.
    handle: u32,
    /// The exact statement text this handle was prepared from.
    text: String,
    /// Number of parameter placeholders the server reported.
    parameter_count: u16,
    /// Timestamp when this statement was prepared.
    created_at: Instant,
}

impl PreparedStatement {
    /// Create a new prepared statement.
    pub fn new(handle: u32, text: impl Into<String>, parameter_count: u16) -> Self {
        Self {
            handle,
            text: text.into(),
            parameter_count,
            created_at: Instant::now(),
        }
    }

    /// Get the server-assigned statement id.
    #[must_use]
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// Get the statement text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Get the number of parameter placeholders.
    #[must_use]
    pub fn parameter_count(&self) -> u16 {
        self.parameter_count
    }

    /// Get the age of this statement.
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

/// LRU cache of prepared statements keyed by exact statement text.
///
/// When capacity is reached the least recently used statement is evicted;
/// the caller should release its server-side id via `COM_STMT_CLOSE`.
pub struct StatementCache {
    cache: LruCache<String, PreparedStatement>,
    max_size: usize,
    hits: u64,
    misses: u64,
}

impl StatementCache {
    /// Create a new statement cache with the specified maximum size.
    ///
    /// A `max_size` of zero falls back to the default capacity.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size)
            .or_else(|| NonZeroUsize::new(DEFAULT_MAX_STATEMENTS))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            max_size: capacity.get(),
            hits: 0,
            misses: 0,
        }
    }

    /// Create a new statement cache with the default maximum size.
    #[must_use]
    pub fn with_default_size() -> Self {
        Self::new(DEFAULT_MAX_STATEMENTS)
    }

    /// Look up a prepared statement by exact text.
    ///
    /// Returns a clone of the cached entry and updates the LRU order.
    pub fn get(&mut self, text: &str) -> Option<PreparedStatement> {
        if let Some(statement) = self.cache.get(text) {
            self.hits += 1;
            tracing::trace!(text = text, handle = statement.handle, "statement cache hit");
            Some(statement.clone())
        } else {
            self.misses += 1;
            tracing::trace!(text = text, "statement cache miss");
            None
        }
    }

    /// Peek at a prepared statement without updating LRU order.
    #[must_use]
    pub fn peek(&self, text: &str) -> Option<&PreparedStatement> {
        self.cache.peek(text)
    }

    /// Insert a prepared statement, keyed by its exact text.
    ///
    /// Returns the evicted statement if one was removed due to capacity.
    pub fn insert(&mut self, statement: PreparedStatement) -> Option<PreparedStatement> {
        tracing::debug!(
            text = statement.text(),
            handle = statement.handle,
            "caching prepared statement"
        );

        let evicted = if self.cache.len() >= self.max_size && self.cache.peek(statement.text()).is_none() {
            self.cache.pop_lru().map(|(_, statement)| statement)
        } else {
            None
        };

        self.cache.put(statement.text.clone(), statement);
        evicted
    }

    /// Remove a prepared statement from the cache.
    pub fn remove(&mut self, text: &str) -> Option<PreparedStatement> {
        self.cache.pop(text)
    }

    /// Clear all cached statements, returning them for release.
    pub fn clear(&mut self) -> Vec<PreparedStatement> {
        let mut statements = Vec::with_capacity(self.cache.len());
        while let Some((_, statement)) = self.cache.pop_lru() {
            statements.push(statement);
        }
        tracing::debug!(count = statements.len(), "cleared statement cache");
        statements
    }

    /// Get the number of cached statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Get the maximum cache size.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the number of cache hits.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Get the number of cache misses.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

impl Default for StatementCache {
    fn default() -> Self {
        Self::with_default_size()
    }
}

impl std::fmt::Debug for StatementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementCache")
            .field("len", &self.cache.len())
            .field("max_size", &self.max_size)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}
