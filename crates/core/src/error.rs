//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic business failures. Storage concerns
/// (not-found lookups, connection faults) belong to the store layer.
///
/// At an API boundary, `InvalidQuantity`, `InsufficientStock` and
/// `InvalidTransition` map to client errors; `InvariantViolation` signals a
/// logic or data-integrity bug and maps to a server error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A requested quantity was not a positive amount.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Not enough available stock to satisfy a reservation.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    /// A stock-ledger invariant was violated. Fatal to the operation; the
    /// surrounding transaction must abort with prior state unchanged.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An order status change not permitted by the transition table.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// An identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn insufficient_stock(requested: u32, available: u32) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
