//! Storage-layer error model.

use thiserror::Error;

use stockroom_core::{DomainError, OrderId, ProductId};

/// Result type used across the storage layer.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage operation error.
///
/// Wraps deterministic domain failures and adds the lookup/storage variants
/// the domain layer has no business knowing about. At an API boundary the
/// not-found variants map to not-found responses, `Domain` maps per the
/// wrapped error, and `Storage` is a transient server error; it is safe to
/// retry the whole operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Deterministic domain failure surfaced through a store operation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Storage-layer fault (connection, constraint machinery, corruption).
    #[error("storage failure: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// True for invariant violations, which signal a logic or data bug and
    /// must never be silently swallowed.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::Domain(DomainError::InvariantViolation(_)))
    }
}
