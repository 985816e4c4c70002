//! Cache key namespacing

/// Composes fully-qualified keys from an optional prefix and a logical key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyNamespacer {
    prefix: Option<String>,
}

impl KeyNamespacer {
    /// Creates a namespacer; an empty prefix behaves like no prefix
    pub fn new(prefix: Option<impl Into<String>>) -> Self {
        let prefix = prefix.map(Into::into).filter(|p| !p.is_empty());
        Self { prefix }
    }

    /// Creates a namespacer without a prefix
    pub fn unprefixed() -> Self {
        Self::default()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Builds `<prefix>:<key>`, or returns the key unchanged without a prefix
    pub fn build(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// Namespaces a glob pattern expressed in logical-key terms
    pub fn build_pattern(&self, pattern: &str) -> String {
        self.build(pattern)
    }

    /// Recovers the logical key from a fully-qualified key
    pub fn strip<'a>(&self, full_key: &'a str) -> &'a str {
        match &self.prefix {
            Some(prefix) => full_key
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix(':'))
                .unwrap_or(full_key),
            None => full_key,
        }
    }
}

/// Builds keys for the common cached entities
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    prefix: String,
}

impl CacheKeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn user(&self, user_id: &str) -> String {
        format!("{}:user:{}", self.prefix, user_id)
    }

    pub fn test(&self, test_id: &str) -> String {
        format!("{}:test:{}", self.prefix, test_id)
    }

    pub fn user_tests(&self, user_id: &str) -> String {
        format!("{}:user:{}:tests", self.prefix, user_id)
    }

    pub fn leaderboard(&self, category: &str) -> String {
        format!("{}:leaderboard:{}", self.prefix, category)
    }

    pub fn stats(&self, user_id: &str, period: &str) -> String {
        format!("{}:stats:{}:{}", self.prefix, user_id, period)
    }
}
