//! In-memory store for tests/dev. Not optimized for performance.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockroom_audit::{AuditAction, AuditLogEntry};
use stockroom_core::{ActorId, OrderId, ProductId, ReservationId};
use stockroom_inventory::{Product, Reservation};
use stockroom_orders::{Order, OrderStatus, StatusChange};

use crate::error::{StoreError, StoreResult};

use super::{InventoryStore, ReclaimOutcome};

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    reservations: HashMap<ReservationId, Reservation>,
    orders: HashMap<OrderId, Order>,
    audit: Vec<AuditLogEntry>,
}

/// In-memory backend.
///
/// A single writer lock over the whole state is the serialization point:
/// every compound operation runs to completion under it, which gives the
/// same all-or-nothing and serializability guarantees the Postgres backend
/// gets from transactions and row locks. Mutations are validated on a clone
/// and only then written back, so a failed operation leaves prior state
/// untouched.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    state: RwLock<State>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn alive_product(state: &State, id: ProductId) -> StoreResult<&Product> {
    state
        .products
        .get(&id)
        .filter(|p| !p.is_deleted())
        .ok_or(StoreError::ProductNotFound(id))
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn insert_product(&self, product: Product) -> StoreResult<()> {
        use stockroom_core::Entity;

        product.verify_invariant()?;
        let mut state = self.state.write().unwrap();
        let id = *product.id();
        if state.products.contains_key(&id) {
            return Err(StoreError::storage(format!("product {id} already exists")));
        }
        state.products.insert(id, product);
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Product> {
        let state = self.state.read().unwrap();
        alive_product(&state, id).cloned()
    }

    async fn tombstone_product(&self, id: ProductId, now: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.write().unwrap();
        let product = state
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductNotFound(id))?;
        product.tombstone(now);
        Ok(())
    }

    async fn reserve_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
        expires_at: DateTime<Utc>,
        actor: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> StoreResult<Reservation> {
        let mut state = self.state.write().unwrap();

        let mut product = alive_product(&state, product_id)?.clone();
        product.reserve(quantity, now)?;
        product.verify_invariant()?;

        let reservation = Reservation::new(product_id, quantity, expires_at, now);
        let entry = AuditLogEntry::reservation_created(
            reservation.id,
            product_id,
            quantity,
            actor,
            now,
        );

        // Commit point: nothing above mutated shared state.
        state.products.insert(product_id, product);
        state.reservations.insert(reservation.id, reservation.clone());
        state.audit.push(entry);
        Ok(reservation)
    }

    async fn get_reservation(&self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        let state = self.state.read().unwrap();
        Ok(state.reservations.get(&id).cloned())
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Reservation>> {
        let state = self.state.read().unwrap();
        Ok(state
            .reservations
            .values()
            .filter(|r| r.is_reclaimable(now))
            .cloned()
            .collect())
    }

    async fn remove_reservation(&self, id: ReservationId) -> StoreResult<bool> {
        let mut state = self.state.write().unwrap();
        Ok(state.reservations.remove(&id).is_some())
    }

    async fn reclaim_reservation(
        &self,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> StoreResult<ReclaimOutcome> {
        let mut state = self.state.write().unwrap();

        // Re-check under the lock: a concurrent reclaimer or a conversion
        // may have won since the expiry scan.
        let Some(current) = state.reservations.get(&reservation.id).cloned() else {
            return Ok(ReclaimOutcome::Skipped);
        };
        if current.is_converted() {
            return Ok(ReclaimOutcome::Skipped);
        }

        let mut product = alive_product(&state, current.product_id)?.clone();
        product.release(current.quantity, now)?;
        product.verify_invariant()?;

        let entry = AuditLogEntry::reservation_expired(
            current.id,
            current.product_id,
            current.quantity,
            now,
        );

        state.products.insert(current.product_id, product);
        state.audit.push(entry);
        state.reservations.remove(&current.id);
        Ok(ReclaimOutcome::Reclaimed)
    }

    async fn insert_order(&self, order: Order) -> StoreResult<()> {
        use stockroom_core::Entity;

        let mut state = self.state.write().unwrap();
        let id = *order.id();
        if state.orders.contains_key(&id) {
            return Err(StoreError::storage(format!("order {id} already exists")));
        }
        state.orders.insert(id, order);
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Order> {
        let state = self.state.read().unwrap();
        state
            .orders
            .get(&id)
            .filter(|o| !o.is_deleted())
            .cloned()
            .ok_or(StoreError::OrderNotFound(id))
    }

    async fn transition_order(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        actor: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> StoreResult<StatusChange> {
        let mut state = self.state.write().unwrap();

        let mut order = state
            .orders
            .get(&order_id)
            .filter(|o| !o.is_deleted())
            .cloned()
            .ok_or(StoreError::OrderNotFound(order_id))?;

        let change = order.transition(new_status, now)?;
        let entry = AuditLogEntry::status_changed(order_id, change, actor, now);

        state.orders.insert(order_id, order);
        state.audit.push(entry);
        Ok(change)
    }

    async fn append_audit(&self, entry: AuditLogEntry) -> StoreResult<AuditLogEntry> {
        let mut state = self.state.write().unwrap();
        state.audit.push(entry.clone());
        Ok(entry)
    }

    async fn audit_entries(&self, action: Option<AuditAction>) -> StoreResult<Vec<AuditLogEntry>> {
        let state = self.state.read().unwrap();
        Ok(state
            .audit
            .iter()
            .filter(|e| action.map_or(true, |a| e.action == a))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn seeded_product(store: &InMemoryInventoryStore, total: u32) -> ProductId {
        let id = ProductId::new();
        store
            .insert_product(Product::new(id, "Widget", total, Utc::now()))
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn reserve_decrements_and_records() {
        let store = InMemoryInventoryStore::new();
        let product_id = seeded_product(&store, 10).await;
        let now = Utc::now();

        let reservation = store
            .reserve_stock(product_id, 3, now + Duration::minutes(10), None, now)
            .await
            .unwrap();

        let product = store.get_product(product_id).await.unwrap();
        assert_eq!(product.stock().available, 7);
        assert_eq!(product.stock().reserved, 3);
        assert_eq!(reservation.quantity, 3);

        let created = store
            .audit_entries(Some(AuditAction::ReservationCreated))
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].object_id, reservation.id.to_string());
    }

    #[tokio::test]
    async fn failed_reserve_leaves_no_trace() {
        let store = InMemoryInventoryStore::new();
        let product_id = seeded_product(&store, 10).await;
        let now = Utc::now();

        let err = store
            .reserve_stock(product_id, 15, now + Duration::minutes(10), None, now)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(stockroom_core::DomainError::InsufficientStock { .. })
        ));

        let product = store.get_product(product_id).await.unwrap();
        assert_eq!(product.stock().available, 10);
        assert!(store.audit_entries(None).await.unwrap().is_empty());
        assert!(
            store
                .find_expired(now + Duration::hours(1))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn reserve_on_unknown_product_is_not_found() {
        let store = InMemoryInventoryStore::new();
        let now = Utc::now();
        let err = store
            .reserve_stock(ProductId::new(), 1, now + Duration::minutes(10), None, now)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn tombstoned_product_is_invisible() {
        let store = InMemoryInventoryStore::new();
        let product_id = seeded_product(&store, 5).await;
        store
            .tombstone_product(product_id, Utc::now())
            .await
            .unwrap();

        assert!(matches!(
            store.get_product(product_id).await,
            Err(StoreError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn remove_reservation_is_idempotent() {
        let store = InMemoryInventoryStore::new();
        let product_id = seeded_product(&store, 10).await;
        let now = Utc::now();
        let reservation = store
            .reserve_stock(product_id, 2, now + Duration::minutes(10), None, now)
            .await
            .unwrap();

        assert!(store.remove_reservation(reservation.id).await.unwrap());
        assert!(!store.remove_reservation(reservation.id).await.unwrap());
    }

    #[tokio::test]
    async fn reclaim_skips_an_already_removed_reservation() {
        let store = InMemoryInventoryStore::new();
        let product_id = seeded_product(&store, 10).await;
        let now = Utc::now();
        let expired = now - Duration::minutes(1);

        let reservation = store
            .reserve_stock(product_id, 2, expired, None, now)
            .await
            .unwrap();

        store.remove_reservation(reservation.id).await.unwrap();
        let outcome = store.reclaim_reservation(&reservation, now).await.unwrap();
        assert_eq!(outcome, ReclaimOutcome::Skipped);
        // Stock untouched: the units stay soft-held until released elsewhere.
        let product = store.get_product(product_id).await.unwrap();
        assert_eq!(product.stock().reserved, 2);
    }
}
