//! Store abstraction and backends.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockroom_audit::{AuditAction, AuditLogEntry};
use stockroom_core::{ActorId, OrderId, ProductId, ReservationId};
use stockroom_inventory::{Product, Reservation};
use stockroom_orders::{Order, OrderStatus, StatusChange};

use crate::error::StoreResult;

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;

/// Outcome of a single-reservation reclaim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimOutcome {
    /// Stock released, audit entry written, reservation deleted.
    Reclaimed,
    /// The reservation was already gone or had been converted to an order;
    /// nothing was changed. Not an error: reclaim passes race with each
    /// other and with conversion.
    Skipped,
}

/// Unit-of-work surface over the backing store.
///
/// Compound operations are single methods so each backend can execute them
/// as one indivisible transaction: no caller can observe a stock decrement
/// without its reservation, or a status change without its audit entry.
/// Contention on a single product serializes inside the backend (writer
/// lock or row-level lock); operations on different products do not
/// serialize with each other in the Postgres backend.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    // -- products ---------------------------------------------------------

    /// Persist a new product. The stock invariant is verified before the
    /// write; a violating product is rejected, not stored.
    async fn insert_product(&self, product: Product) -> StoreResult<()>;

    /// Fetch an alive (non-tombstoned) product.
    async fn get_product(&self, id: ProductId) -> StoreResult<Product>;

    /// Tombstone a product. Subsequent alive reads and reserve attempts
    /// fail with `ProductNotFound`.
    async fn tombstone_product(&self, id: ProductId, now: DateTime<Utc>) -> StoreResult<()>;

    // -- reservations -----------------------------------------------------

    /// Atomically reserve stock: conditional decrement of the product's
    /// available stock, creation of the reservation, and the
    /// `reservation_created` audit entry, all in one transaction. If any
    /// step fails the decrement is rolled back.
    ///
    /// Of `M` concurrent callers competing for `N` available units, the
    /// backend guarantees that successes account for exactly the stock that
    /// was available at the start; the rest fail with `InsufficientStock`.
    async fn reserve_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
        expires_at: DateTime<Utc>,
        actor: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> StoreResult<Reservation>;

    async fn get_reservation(&self, id: ReservationId) -> StoreResult<Option<Reservation>>;

    /// All reservations with `expires_at < now` that were never converted
    /// to an order, as one logical snapshot. Scan order is unspecified.
    async fn find_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Reservation>>;

    /// Delete a reservation without touching stock. Idempotent: removing an
    /// already-removed reservation returns `false` instead of failing, since
    /// reclamation and manual cancellation can race.
    async fn remove_reservation(&self, id: ReservationId) -> StoreResult<bool>;

    /// Reclaim one expired reservation in its own transaction: lock the
    /// product row, re-check the reservation under the lock, release its
    /// quantity back to available stock, append the `reservation_expired`
    /// audit entry, delete the reservation.
    async fn reclaim_reservation(
        &self,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> StoreResult<ReclaimOutcome>;

    // -- orders -----------------------------------------------------------

    async fn insert_order(&self, order: Order) -> StoreResult<()>;

    /// Fetch an alive order with its line items.
    async fn get_order(&self, id: OrderId) -> StoreResult<Order>;

    /// Validate and apply a status transition; the status update and its
    /// `status_changed` audit entry are one transaction: both or neither.
    async fn transition_order(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        actor: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> StoreResult<StatusChange>;

    // -- audit ------------------------------------------------------------

    /// Append an audit entry. Pure insert; fails only on storage faults.
    async fn append_audit(&self, entry: AuditLogEntry) -> StoreResult<AuditLogEntry>;

    /// Audit entries, optionally filtered by action, oldest first.
    async fn audit_entries(&self, action: Option<AuditAction>) -> StoreResult<Vec<AuditLogEntry>>;
}

#[async_trait]
impl<S: InventoryStore + ?Sized> InventoryStore for std::sync::Arc<S> {
    async fn insert_product(&self, product: Product) -> StoreResult<()> {
        (**self).insert_product(product).await
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Product> {
        (**self).get_product(id).await
    }

    async fn tombstone_product(
        &self,
        id: ProductId,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        (**self).tombstone_product(id, now).await
    }

    async fn reserve_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
        expires_at: DateTime<Utc>,
        actor: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> StoreResult<Reservation> {
        (**self)
            .reserve_stock(product_id, quantity, expires_at, actor, now)
            .await
    }

    async fn get_reservation(
        &self,
        id: ReservationId,
    ) -> StoreResult<Option<Reservation>> {
        (**self).get_reservation(id).await
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Reservation>> {
        (**self).find_expired(now).await
    }

    async fn remove_reservation(&self, id: ReservationId) -> StoreResult<bool> {
        (**self).remove_reservation(id).await
    }

    async fn reclaim_reservation(
        &self,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> StoreResult<ReclaimOutcome> {
        (**self).reclaim_reservation(reservation, now).await
    }

    async fn insert_order(&self, order: Order) -> StoreResult<()> {
        (**self).insert_order(order).await
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Order> {
        (**self).get_order(id).await
    }

    async fn transition_order(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        actor: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> StoreResult<StatusChange> {
        (**self)
            .transition_order(order_id, new_status, actor, now)
            .await
    }

    async fn append_audit(&self, entry: AuditLogEntry) -> StoreResult<AuditLogEntry> {
        (**self).append_audit(entry).await
    }

    async fn audit_entries(
        &self,
        action: Option<AuditAction>,
    ) -> StoreResult<Vec<AuditLogEntry>> {
        (**self).audit_entries(action).await
    }
}
