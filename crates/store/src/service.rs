//! Application facade over the store: the operations the outer layer calls.
//!
//! HTTP routing, authentication and scheduling live outside this crate; they
//! are handed an `InventoryService` and a ready store (dependency injection,
//! no global state).

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use stockroom_audit::{AuditAction, AuditLogEntry};
use stockroom_core::{ActorId, OrderId, ProductId, ReservationId};
use stockroom_inventory::{Product, Reservation};
use stockroom_orders::{Order, OrderItem, OrderStatus};

use crate::error::StoreResult;
use crate::reclaim::{ExpiryReclaimer, ReclaimReport};
use crate::store::InventoryStore;

/// Reservation lifetime policy.
#[derive(Debug, Clone, Copy)]
pub struct ReservationPolicy {
    /// How long a reservation soft-holds stock before becoming reclaimable.
    pub hold_duration: Duration,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            hold_duration: Duration::minutes(10),
        }
    }
}

/// What a successful reserve call hands back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReservationReceipt {
    pub reservation_id: ReservationId,
    pub expires_at: DateTime<Utc>,
}

/// The core's external interface.
pub struct InventoryService<S> {
    store: S,
    policy: ReservationPolicy,
}

impl<S: InventoryStore> InventoryService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: ReservationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReservationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a product with all stock available.
    pub async fn add_product(
        &self,
        name: impl Into<String>,
        total_stock: u32,
    ) -> StoreResult<Product> {
        let product = Product::new(ProductId::new(), name, total_stock, Utc::now());
        self.store.insert_product(product.clone()).await?;
        Ok(product)
    }

    /// Reserve stock for a product.
    ///
    /// The stock decrement, the reservation record and its audit entry are
    /// one atomic unit; concurrent callers competing for the same product
    /// serialize inside the store.
    pub async fn reserve(
        &self,
        product_id: ProductId,
        quantity: u32,
        actor: Option<ActorId>,
    ) -> StoreResult<ReservationReceipt> {
        let now = Utc::now();
        let expires_at = now + self.policy.hold_duration;
        let reservation = self
            .store
            .reserve_stock(product_id, quantity, expires_at, actor, now)
            .await?;

        info!(
            %product_id,
            reservation_id = %reservation.id,
            quantity,
            expires_at = %reservation.expires_at,
            "stock reserved"
        );
        Ok(ReservationReceipt {
            reservation_id: reservation.id,
            expires_at: reservation.expires_at,
        })
    }

    /// Reclaim every reservation expired at `now`. Safe to invoke at any
    /// cadence, repeatedly, and concurrently with live traffic.
    pub async fn release_expired(&self, now: DateTime<Utc>) -> StoreResult<ReclaimReport> {
        ExpiryReclaimer::new(&self.store).run(now).await
    }

    /// Create a pending order with snapshot line items.
    pub async fn place_order(
        &self,
        customer: ActorId,
        items: Vec<OrderItem>,
    ) -> StoreResult<Order> {
        let order = Order::new(OrderId::new(), customer, items, Utc::now());
        self.store.insert_order(order.clone()).await?;
        Ok(order)
    }

    /// Apply a status transition to an order.
    pub async fn transition_order(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        actor: Option<ActorId>,
    ) -> StoreResult<OrderStatus> {
        let change = self
            .store
            .transition_order(order_id, new_status, actor, Utc::now())
            .await?;
        info!(%order_id, from = %change.from, to = %change.to, "order status changed");
        Ok(change.to)
    }

    pub async fn confirm_order(
        &self,
        order_id: OrderId,
        actor: Option<ActorId>,
    ) -> StoreResult<OrderStatus> {
        self.transition_order(order_id, OrderStatus::Confirmed, actor)
            .await
    }

    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        actor: Option<ActorId>,
    ) -> StoreResult<OrderStatus> {
        self.transition_order(order_id, OrderStatus::Cancelled, actor)
            .await
    }

    // Read-throughs for the outer query/serialization layer.

    pub async fn product(&self, id: ProductId) -> StoreResult<Product> {
        self.store.get_product(id).await
    }

    pub async fn reservation(&self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        self.store.get_reservation(id).await
    }

    pub async fn order(&self, id: OrderId) -> StoreResult<Order> {
        self.store.get_order(id).await
    }

    pub async fn audit_entries(
        &self,
        action: Option<AuditAction>,
    ) -> StoreResult<Vec<AuditLogEntry>> {
        self.store.audit_entries(action).await
    }
}
