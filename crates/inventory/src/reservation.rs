use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{Entity, OrderId, ProductId, ReservationId};

/// A time-bounded soft hold on product stock.
///
/// Created only as part of a successful atomic reserve; destroyed either by
/// conversion into an order or by expiry reclamation. Holds a non-owning
/// back-reference to its product. Reservations are hard-deleted on
/// reclamation, so they carry no tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Set once the reservation has been converted into an order. Converted
    /// reservations are never reclaimed.
    pub order_id: Option<OrderId>,
}

impl Reservation {
    pub fn new(
        product_id: ProductId,
        quantity: u32,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            product_id,
            quantity,
            expires_at,
            created_at: now,
            order_id: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_converted(&self) -> bool {
        self.order_id.is_some()
    }

    /// Eligible for expiry reclamation: past its expiry and never converted.
    pub fn is_reclaimable(&self, now: DateTime<Utc>) -> bool {
        self.is_expired(now) && !self.is_converted()
    }
}

impl Entity for Reservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reservation_expiring_at(expires_at: DateTime<Utc>) -> Reservation {
        Reservation::new(ProductId::new(), 2, expires_at, Utc::now())
    }

    #[test]
    fn fresh_reservation_is_not_expired() {
        let now = Utc::now();
        let reservation = reservation_expiring_at(now + Duration::minutes(10));
        assert!(!reservation.is_expired(now));
        assert!(!reservation.is_reclaimable(now));
    }

    #[test]
    fn past_expiry_is_reclaimable() {
        let now = Utc::now();
        let reservation = reservation_expiring_at(now - Duration::minutes(1));
        assert!(reservation.is_expired(now));
        assert!(reservation.is_reclaimable(now));
    }

    #[test]
    fn converted_reservation_is_never_reclaimable() {
        let now = Utc::now();
        let mut reservation = reservation_expiring_at(now - Duration::minutes(1));
        reservation.order_id = Some(OrderId::new());
        assert!(reservation.is_expired(now));
        assert!(!reservation.is_reclaimable(now));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let reservation = reservation_expiring_at(now);
        // Expires strictly after `expires_at` passes.
        assert!(!reservation.is_expired(now));
    }
}
