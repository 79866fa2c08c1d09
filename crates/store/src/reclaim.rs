//! Expiry reclamation: release stock held by expired reservations.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use stockroom_core::ReservationId;

use crate::error::{StoreError, StoreResult};
use crate::store::{InventoryStore, ReclaimOutcome};

/// One failed reclamation within a pass.
#[derive(Debug)]
pub struct ReclaimFailure {
    pub reservation_id: ReservationId,
    pub error: StoreError,
}

/// Summary of one reclamation pass.
#[derive(Debug, Default)]
pub struct ReclaimReport {
    /// Reservations whose stock was released and which were deleted.
    pub reclaimed: usize,
    /// Reservations that were already gone or converted by the time their
    /// transaction ran.
    pub skipped: usize,
    /// Reservations that could not be reclaimed this pass. They stay in the
    /// store and the next pass retries them.
    pub failures: Vec<ReclaimFailure>,
}

impl ReclaimReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Reclaims expired, unconverted reservations.
///
/// Invoked by an external scheduler or command at any cadence. Each
/// reservation is reclaimed in its own transaction, so one failure never
/// aborts the rest of the batch, and a partial run simply leaves the
/// remainder for the next run. Concurrent passes are safe: whichever
/// transaction loses the product lock race finds the reservation already
/// deleted and skips it.
pub struct ExpiryReclaimer<'a, S> {
    store: &'a S,
}

impl<'a, S: InventoryStore> ExpiryReclaimer<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Run one reclamation pass over everything expired at `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> StoreResult<ReclaimReport> {
        let expired = self.store.find_expired(now).await?;
        let scanned = expired.len();
        let mut report = ReclaimReport::default();

        for reservation in expired {
            match self.store.reclaim_reservation(&reservation, now).await {
                Ok(ReclaimOutcome::Reclaimed) => {
                    debug!(
                        reservation_id = %reservation.id,
                        product_id = %reservation.product_id,
                        quantity = reservation.quantity,
                        "reclaimed expired reservation"
                    );
                    report.reclaimed += 1;
                }
                Ok(ReclaimOutcome::Skipped) => {
                    debug!(reservation_id = %reservation.id, "reservation already gone, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    if e.is_invariant_violation() {
                        error!(reservation_id = %reservation.id, error = %e, "invariant violation during reclaim");
                    } else {
                        warn!(reservation_id = %reservation.id, error = %e, "failed to reclaim reservation");
                    }
                    report.failures.push(ReclaimFailure {
                        reservation_id: reservation.id,
                        error: e,
                    });
                }
            }
        }

        info!(
            scanned,
            reclaimed = report.reclaimed,
            skipped = report.skipped,
            failed = report.failures.len(),
            "expiry reclamation pass complete"
        );
        Ok(report)
    }
}
