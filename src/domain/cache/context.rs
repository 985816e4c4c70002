//! Cancellation and deadline propagation for cache calls

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::CacheError;

/// Per-call context carrying an optional cancellation token and deadline
///
/// When either fires, the in-flight backend future is dropped and the call
/// resolves to `Cancelled` or `DeadlineExceeded`.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl OpContext {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: None,
            deadline: Some(deadline),
        }
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token: Some(token),
            deadline: None,
        }
    }

    /// Adds or tightens the deadline, keeping the earlier of the two
    pub fn and_timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn and_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if one is set
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Runs a future, abandoning it when the context is cancelled or expires
    pub async fn run<T, F>(&self, operation: &str, future: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        if self.is_cancelled() {
            return Err(CacheError::cancelled(operation));
        }

        if self.remaining().is_some_and(|left| left.is_zero()) {
            return Err(CacheError::deadline_exceeded(operation));
        }

        let cancelled = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(CacheError::cancelled(operation)),
            _ = expired => Err(CacheError::deadline_exceeded(operation)),
            result = future => result,
        }
    }
}
