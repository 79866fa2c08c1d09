//! Record metadata: identity and lifecycle timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Creation/update timestamps plus an optional tombstone.
///
/// Every persisted entity carries this as an explicit field set. Reads of
/// "alive" rows must filter tombstoned records; a tombstone is set once and
/// never cleared by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RecordMeta {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Record a mutation.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Mark the record dead. Idempotent; the first tombstone wins.
    pub fn tombstone(&mut self, now: DateTime<Utc>) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(now);
        }
        self.updated_at = now;
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
