use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use stockroom_core::{ActorId, AuditEntryId, OrderId, ProductId, ReservationId};
use stockroom_orders::StatusChange;

/// Action tag of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ReservationCreated,
    ReservationExpired,
    StatusChanged,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::ReservationCreated => "reservation_created",
            AuditAction::ReservationExpired => "reservation_expired",
            AuditAction::StatusChanged => "status_changed",
        }
    }

    /// Inverse of [`AuditAction::as_str`], for rows read back from storage.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reservation_created" => Some(AuditAction::ReservationCreated),
            "reservation_expired" => Some(AuditAction::ReservationExpired),
            "status_changed" => Some(AuditAction::StatusChanged),
            _ => None,
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of a state-changing action.
///
/// `old_value`/`new_value` are structured JSON snapshots; either may be
/// absent (creation has no old value, deletion has no new value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditEntryId,
    pub actor: Option<ActorId>,
    pub action: AuditAction,
    pub object_type: String,
    pub object_id: String,
    pub old_value: Option<JsonValue>,
    pub new_value: Option<JsonValue>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        action: AuditAction,
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            actor: None,
            action,
            object_type: object_type.into(),
            object_id: object_id.into(),
            old_value: None,
            new_value: None,
            recorded_at: now,
        }
    }

    pub fn with_actor(mut self, actor: Option<ActorId>) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_old_value(mut self, value: JsonValue) -> Self {
        self.old_value = Some(value);
        self
    }

    pub fn with_new_value(mut self, value: JsonValue) -> Self {
        self.new_value = Some(value);
        self
    }

    /// Entry for a freshly created reservation.
    pub fn reservation_created(
        reservation_id: ReservationId,
        product_id: ProductId,
        quantity: u32,
        actor: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            AuditAction::ReservationCreated,
            "Reservation",
            reservation_id.to_string(),
            now,
        )
        .with_actor(actor)
        .with_new_value(json!({
            "product": product_id.to_string(),
            "quantity": quantity,
        }))
    }

    /// Entry for a reservation reclaimed after expiry. No new value; the
    /// reservation ceases to exist.
    pub fn reservation_expired(
        reservation_id: ReservationId,
        product_id: ProductId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            AuditAction::ReservationExpired,
            "Reservation",
            reservation_id.to_string(),
            now,
        )
        .with_old_value(json!({
            "product": product_id.to_string(),
            "quantity": quantity,
        }))
    }

    /// Entry for an order status transition.
    pub fn status_changed(
        order_id: OrderId,
        change: StatusChange,
        actor: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            AuditAction::StatusChanged,
            "Order",
            order_id.to_string(),
            now,
        )
        .with_actor(actor)
        .with_old_value(json!({ "status": change.from.as_str() }))
        .with_new_value(json!({ "status": change.to.as_str() }))
    }
}
