//! Transaction Context
//!
//! Carries per-call metadata for tracing and the caller's cancellation
//! signal into the transaction scope.

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Context for one unit of work, used for tracing and cancellation.
#[derive(Debug, Clone, Default)]
pub struct TxContext {
    /// Human readable label attached to log lines (e.g. "tx 3")
    pub label: Option<String>,

    /// Correlation ID for request tracing
    pub correlation_id: Option<Uuid>,

    cancellation: CancellationToken,
}

impl TxContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create context with a debug label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Create context bound to a caller-owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("-")
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the caller cancels this context
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancellation.cancelled()
    }
}
