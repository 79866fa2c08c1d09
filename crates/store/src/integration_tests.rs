//! Integration tests for the full reservation pipeline.
//!
//! Reserve → expire → reclaim against the in-memory backend, plus the
//! contention scenario: many concurrent reservers competing for the same
//! product must never oversell it.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use stockroom_audit::AuditAction;
    use stockroom_core::{ActorId, DomainError, ProductId};
    use stockroom_orders::{OrderItem, OrderStatus};

    use crate::error::StoreError;
    use crate::service::{InventoryService, ReservationPolicy};
    use crate::store::{InMemoryInventoryStore, InventoryStore};

    fn service() -> InventoryService<Arc<InMemoryInventoryStore>> {
        InventoryService::new(Arc::new(InMemoryInventoryStore::new()))
    }

    /// A timestamp safely past the default 10 minute hold.
    fn after_expiry() -> chrono::DateTime<Utc> {
        Utc::now() + Duration::minutes(11)
    }

    #[tokio::test]
    async fn reserve_expire_reclaim_scenario() {
        let service = service();
        let product = service.add_product("Widget", 10).await.unwrap();
        let product_id = product.id_typed();

        // Reserve 3: available drops, reserved rises.
        let receipt = service.reserve(product_id, 3, None).await.unwrap();
        let stock = service.product(product_id).await.unwrap().stock();
        assert_eq!((stock.available, stock.reserved), (7, 3));

        // Reserve 15: insufficient, state unchanged.
        let err = service.reserve(product_id, 15, None).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::InsufficientStock {
                requested: 15,
                available: 7
            })
        ));
        let stock = service.product(product_id).await.unwrap().stock();
        assert_eq!((stock.available, stock.reserved), (7, 3));

        // Expire and reclaim: counts restored, reservation gone, one audit entry.
        let report = service.release_expired(after_expiry()).await.unwrap();
        assert_eq!(report.reclaimed, 1);
        assert!(report.is_clean());

        let stock = service.product(product_id).await.unwrap().stock();
        assert_eq!((stock.available, stock.reserved), (10, 0));
        assert!(
            service
                .reservation(receipt.reservation_id)
                .await
                .unwrap()
                .is_none()
        );

        let expired = service
            .audit_entries(Some(AuditAction::ReservationExpired))
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].object_id, receipt.reservation_id.to_string());
        assert_eq!(expired[0].old_value.as_ref().unwrap()["quantity"], 3);
        assert!(expired[0].new_value.is_none());
    }

    #[tokio::test]
    async fn second_reclaim_pass_is_a_no_op() {
        let service = service();
        let product = service.add_product("Widget", 10).await.unwrap();
        let product_id = product.id_typed();

        service.reserve(product_id, 3, None).await.unwrap();

        let first = service.release_expired(after_expiry()).await.unwrap();
        assert_eq!(first.reclaimed, 1);

        let second = service.release_expired(after_expiry()).await.unwrap();
        assert_eq!(second.reclaimed, 0);
        assert_eq!(second.skipped, 0);
        assert!(second.is_clean());

        let stock = service.product(product_id).await.unwrap().stock();
        assert_eq!((stock.available, stock.reserved), (10, 0));
    }

    #[tokio::test]
    async fn reclaim_restores_pre_reservation_counts_exactly() {
        let service = service();
        let product = service.add_product("Widget", 7).await.unwrap();
        let product_id = product.id_typed();

        service.reserve(product_id, 2, None).await.unwrap();
        let before = service.product(product_id).await.unwrap().stock();

        service.reserve(product_id, 3, None).await.unwrap();
        service.release_expired(after_expiry()).await.unwrap();

        // Both reservations expired at once; everything returns.
        let after = service.product(product_id).await.unwrap().stock();
        assert_eq!(after.available, 7);
        assert_eq!(after.reserved, 0);
        assert_eq!(after.total, before.total);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn contention_never_oversells() {
        const TOTAL: u32 = 10;
        const CALLERS: usize = 25;

        let service = Arc::new(service());
        let product = service.add_product("Hot item", TOTAL).await.unwrap();
        let product_id = product.id_typed();

        let mut handles = Vec::with_capacity(CALLERS);
        for _ in 0..CALLERS {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.reserve(product_id, 1, None).await
            }));
        }

        let mut succeeded = 0usize;
        let mut insufficient = 0usize;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(StoreError::Domain(DomainError::InsufficientStock { .. })) => {
                    insufficient += 1
                }
                Err(other) => panic!("unexpected failure: {other:?}"),
            }
        }

        assert_eq!(succeeded, TOTAL as usize);
        assert_eq!(insufficient, CALLERS - TOTAL as usize);

        let stock = service.product(product_id).await.unwrap().stock();
        assert_eq!(stock.available, 0);
        assert_eq!(stock.reserved, TOTAL);
        service
            .product(product_id)
            .await
            .unwrap()
            .verify_invariant()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reclaim_passes_release_once() {
        let service = Arc::new(service());
        let product = service.add_product("Widget", 10).await.unwrap();
        let product_id = product.id_typed();

        service.reserve(product_id, 4, None).await.unwrap();

        let now = after_expiry();
        let (a, b) = tokio::join!(
            {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.release_expired(now).await })
            },
            {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.release_expired(now).await })
            },
        );
        let (a, b) = (a.unwrap().unwrap(), b.unwrap().unwrap());

        // Whichever pass lost the race skipped or saw nothing; stock is
        // released exactly once either way.
        assert_eq!(a.reclaimed + b.reclaimed, 1);
        assert!(a.is_clean() && b.is_clean());

        let stock = service.product(product_id).await.unwrap().stock();
        assert_eq!((stock.available, stock.reserved), (10, 0));
        let expired = service
            .audit_entries(Some(AuditAction::ReservationExpired))
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
    }

    #[tokio::test]
    async fn reclaim_failure_does_not_abort_the_batch() {
        let service = service();
        let doomed = service.add_product("Doomed", 5).await.unwrap();
        let doomed_id = doomed.id_typed();
        let healthy = service.add_product("Healthy", 5).await.unwrap();
        let healthy_id = healthy.id_typed();

        service.reserve(doomed_id, 2, None).await.unwrap();
        service.reserve(healthy_id, 2, None).await.unwrap();

        // The product disappears under its reservation.
        service
            .store()
            .tombstone_product(doomed_id, Utc::now())
            .await
            .unwrap();

        let report = service.release_expired(after_expiry()).await.unwrap();
        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].error,
            StoreError::ProductNotFound(id) if id == doomed_id
        ));

        let stock = service.product(healthy_id).await.unwrap().stock();
        assert_eq!((stock.available, stock.reserved), (5, 0));
    }

    #[tokio::test]
    async fn order_transition_writes_audit_atomically() {
        let service = service();
        let customer = ActorId::new();
        let order = service
            .place_order(
                customer,
                vec![OrderItem {
                    product_id: ProductId::new(),
                    quantity: 1,
                    unit_price_cents: 4999,
                }],
            )
            .await
            .unwrap();
        let order_id = order.id_typed();

        let status = service
            .confirm_order(order_id, Some(customer))
            .await
            .unwrap();
        assert_eq!(status, OrderStatus::Confirmed);

        let changes = service
            .audit_entries(Some(AuditAction::StatusChanged))
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_value.as_ref().unwrap()["status"], "pending");
        assert_eq!(changes[0].new_value.as_ref().unwrap()["status"], "confirmed");
        assert_eq!(changes[0].actor, Some(customer));

        // A rejected transition leaves no audit trace.
        let err = service
            .transition_order(order_id, OrderStatus::Delivered, Some(customer))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::InvalidTransition { .. })
        ));
        let changes = service
            .audit_entries(Some(AuditAction::StatusChanged))
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            service.order(order_id).await.unwrap().status(),
            OrderStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn transition_on_unknown_order_is_not_found() {
        let service = service();
        let err = service
            .confirm_order(stockroom_core::OrderId::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn custom_hold_duration_is_honored() {
        let store = Arc::new(InMemoryInventoryStore::new());
        let service = InventoryService::new(Arc::clone(&store)).with_policy(ReservationPolicy {
            hold_duration: Duration::seconds(30),
        });
        let product = service.add_product("Widget", 3).await.unwrap();
        let product_id = product.id_typed();

        let receipt = service.reserve(product_id, 1, None).await.unwrap();
        let reservation = store
            .get_reservation(receipt.reservation_id)
            .await
            .unwrap()
            .unwrap();
        let held_for = reservation.expires_at - reservation.created_at;
        assert_eq!(held_for, Duration::seconds(30));
    }
}
