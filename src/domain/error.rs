use thiserror::Error;

/// Errors surfaced by the cache facade and its backends
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache key not found: {key}")]
    NotFound { key: String },

    #[error("Cache {operation} error for key '{key}': {message}")]
    Transient {
        operation: String,
        key: String,
        message: String,
    },

    #[error("Cache {operation} serialization error for key '{key}': {message}")]
    Serialization {
        operation: String,
        key: String,
        message: String,
    },

    #[error("Invalid cache configuration: {message}")]
    Validation { message: String },

    #[error("Failed to connect to cache backend: {message}")]
    Connection { message: String },

    #[error("Cache {operation} cancelled")]
    Cancelled { operation: String },

    #[error("Cache {operation} deadline exceeded")]
    DeadlineExceeded { operation: String },

    #[error("Cache warmup error for key '{key}' (entry {index}): {source}")]
    Warmup {
        index: usize,
        key: String,
        #[source]
        source: Box<CacheError>,
    },

    #[error("Cache invalidation error for key '{key}': {source}")]
    Invalidation {
        key: String,
        #[source]
        source: Box<CacheError>,
    },
}

impl CacheError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn transient(
        operation: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Transient {
            operation: operation.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn serialization(
        operation: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Serialization {
            operation: operation.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    pub fn deadline_exceeded(operation: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            operation: operation.into(),
        }
    }

    pub fn warmup(index: usize, key: impl Into<String>, source: CacheError) -> Self {
        Self::Warmup {
            index,
            key: key.into(),
            source: Box::new(source),
        }
    }

    pub fn invalidation(key: impl Into<String>, source: CacheError) -> Self {
        Self::Invalidation {
            key: key.into(),
            source: Box::new(source),
        }
    }

    /// True for the key-absent sentinel
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient { .. } | Self::Cancelled { .. } | Self::DeadlineExceeded { .. }
        )
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "CACHE_KEY_NOT_FOUND",
            Self::Transient { .. } | Self::Connection { .. } => "CACHE_CONNECTION",
            Self::Serialization { .. } => "CACHE_SERIALIZATION",
            Self::Validation { .. } => "CACHE_VALIDATION",
            Self::Cancelled { .. } => "CACHE_CANCELLED",
            Self::DeadlineExceeded { .. } => "CACHE_DEADLINE_EXCEEDED",
            Self::Warmup { .. } => "CACHE_WARMUP_ERROR",
            Self::Invalidation { .. } => "CACHE_INVALIDATION_ERROR",
        }
    }
}
