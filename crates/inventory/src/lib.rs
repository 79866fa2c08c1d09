//! Inventory domain module.
//!
//! This crate contains the stock-ledger business rules, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). Atomicity of the
//! ledger mutations relative to concurrent callers is the store layer's job;
//! the arithmetic and the invariants live here.

pub mod product;
pub mod reservation;

pub use product::{Product, StockLevels};
pub use reservation::Reservation;
