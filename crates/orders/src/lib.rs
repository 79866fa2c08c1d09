//! Orders domain module.
//!
//! Order records with snapshot line items and the status state machine.
//! Transition validation is pure; the store layer makes the status update
//! and its audit entry one transaction.

pub mod order;

pub use order::{Order, OrderItem, OrderStatus, StatusChange};
