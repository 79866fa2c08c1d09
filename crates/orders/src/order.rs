use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{ActorId, DomainError, Entity, OrderId, ProductId, RecordMeta};

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Allowed next statuses. Delivered and cancelled are terminal.
    pub fn allowed_transitions(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Processing, Cancelled],
            Processing => &[Shipped],
            Shipped => &[Delivered],
            Delivered => &[],
            Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Inverse of [`OrderStatus::as_str`], for rows read back from storage.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order line: product, quantity, unit price snapshotted at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Price in smallest currency unit (e.g., cents) at the time of order.
    pub unit_price_cents: u64,
}

impl OrderItem {
    pub fn line_total_cents(&self) -> u64 {
        u64::from(self.quantity) * self.unit_price_cents
    }
}

/// A validated status change, returned for auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// A customer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    customer_id: ActorId,
    status: OrderStatus,
    items: Vec<OrderItem>,
    /// Total in smallest currency unit, snapshotted from the items.
    total_cents: u64,
    #[serde(flatten)]
    meta: RecordMeta,
}

impl Order {
    /// Create a pending order with snapshot line items.
    pub fn new(
        id: OrderId,
        customer_id: ActorId,
        items: Vec<OrderItem>,
        now: DateTime<Utc>,
    ) -> Self {
        let total_cents = items.iter().map(OrderItem::line_total_cents).sum();
        Self {
            id,
            customer_id,
            status: OrderStatus::Pending,
            items,
            total_cents,
            meta: RecordMeta::new(now),
        }
    }

    /// Rebuild an order from persisted state (storage layer only).
    pub fn from_parts(
        id: OrderId,
        customer_id: ActorId,
        status: OrderStatus,
        items: Vec<OrderItem>,
        total_cents: u64,
        meta: RecordMeta,
    ) -> Self {
        Self {
            id,
            customer_id,
            status,
            items,
            total_cents,
            meta,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> ActorId {
        self.customer_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total_cents(&self) -> u64 {
        self.total_cents
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    pub fn is_deleted(&self) -> bool {
        self.meta.is_deleted()
    }

    /// Apply a status transition, or fail with `InvalidTransition` naming
    /// both the current and the attempted status. Returns the old/new pair
    /// so the caller can write the audit entry in the same transaction.
    pub fn transition(
        &mut self,
        new_status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, DomainError> {
        if !self.status.can_transition_to(new_status) {
            return Err(DomainError::invalid_transition(
                self.status.as_str(),
                new_status.as_str(),
            ));
        }

        let change = StatusChange {
            from: self.status,
            to: new_status,
        };
        self.status = new_status;
        self.meta.touch(now);
        Ok(change)
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
