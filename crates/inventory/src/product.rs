use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, Entity, ProductId, RecordMeta};

/// Snapshot of a product's stock counters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub total: u32,
    pub available: u32,
    pub reserved: u32,
}

/// A product with a stock ledger.
///
/// Invariant: `available + reserved == total` at all times. The mutating
/// methods preserve it; [`Product::verify_invariant`] re-checks it so stores
/// can reject a write that would persist a corrupted ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    total_stock: u32,
    available_stock: u32,
    reserved_stock: u32,
    #[serde(flatten)]
    meta: RecordMeta,
}

impl Product {
    /// Create a product with all stock available.
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        total_stock: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            total_stock,
            available_stock: total_stock,
            reserved_stock: 0,
            meta: RecordMeta::new(now),
        }
    }

    /// Rebuild a product from persisted counters (storage layer only).
    pub fn from_parts(
        id: ProductId,
        name: String,
        levels: StockLevels,
        meta: RecordMeta,
    ) -> Self {
        Self {
            id,
            name,
            total_stock: levels.total,
            available_stock: levels.available,
            reserved_stock: levels.reserved,
            meta,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stock(&self) -> StockLevels {
        StockLevels {
            total: self.total_stock,
            available: self.available_stock,
            reserved: self.reserved_stock,
        }
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    pub fn is_deleted(&self) -> bool {
        self.meta.is_deleted()
    }

    /// Move `quantity` units from available to reserved.
    ///
    /// Rejects a zero quantity and any quantity exceeding the currently
    /// available stock. Callers must hold the product exclusively (writer
    /// lock or row lock) for the duration of the read-modify-write.
    pub fn reserve(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<(), DomainError> {
        if quantity == 0 {
            return Err(DomainError::invalid_quantity(
                "quantity must be greater than zero",
            ));
        }
        if self.available_stock < quantity {
            return Err(DomainError::insufficient_stock(
                quantity,
                self.available_stock,
            ));
        }

        self.available_stock -= quantity;
        self.reserved_stock += quantity;
        self.meta.touch(now);
        self.verify_invariant()
    }

    /// Move `quantity` units from reserved back to available.
    ///
    /// Releasing more than is currently reserved would drive the reserved
    /// counter negative; that is a caller bug, reported as an invariant
    /// violation rather than clamped.
    pub fn release(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.reserved_stock < quantity {
            return Err(DomainError::invariant(format!(
                "cannot release {quantity} units, only {} reserved",
                self.reserved_stock
            )));
        }

        self.reserved_stock -= quantity;
        self.available_stock += quantity;
        self.meta.touch(now);
        self.verify_invariant()
    }

    /// Check `available + reserved == total`.
    ///
    /// Stores run this before every persisted write; a failure aborts the
    /// surrounding transaction with prior state unchanged.
    pub fn verify_invariant(&self) -> Result<(), DomainError> {
        let sum = u64::from(self.available_stock) + u64::from(self.reserved_stock);
        if sum != u64::from(self.total_stock) {
            return Err(DomainError::invariant(format!(
                "available ({}) + reserved ({}) != total ({})",
                self.available_stock, self.reserved_stock, self.total_stock
            )));
        }
        Ok(())
    }

    /// Tombstone the product. Reads of alive products skip it afterwards.
    pub fn tombstone(&mut self, now: DateTime<Utc>) {
        self.meta.tombstone(now);
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_product(total: u32) -> Product {
        Product::new(ProductId::new(), "Widget", total, Utc::now())
    }

    #[test]
    fn new_product_has_all_stock_available() {
        let product = test_product(10);
        let stock = product.stock();
        assert_eq!(stock.total, 10);
        assert_eq!(stock.available, 10);
        assert_eq!(stock.reserved, 0);
        product.verify_invariant().unwrap();
    }

    #[test]
    fn reserve_moves_stock_to_reserved() {
        let mut product = test_product(10);
        product.reserve(3, Utc::now()).unwrap();

        let stock = product.stock();
        assert_eq!(stock.available, 7);
        assert_eq!(stock.reserved, 3);
        assert_eq!(stock.total, 10);
    }

    #[test]
    fn reserve_rejects_zero_quantity() {
        let mut product = test_product(10);
        let err = product.reserve(0, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
        assert_eq!(product.stock().available, 10);
    }

    #[test]
    fn reserve_rejects_more_than_available() {
        let mut product = test_product(10);
        product.reserve(3, Utc::now()).unwrap();

        let err = product.reserve(15, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                requested: 15,
                available: 7
            }
        );
        // State unchanged on failure.
        assert_eq!(product.stock().available, 7);
        assert_eq!(product.stock().reserved, 3);
    }

    #[test]
    fn release_returns_stock_exactly() {
        let mut product = test_product(10);
        product.reserve(3, Utc::now()).unwrap();
        product.release(3, Utc::now()).unwrap();

        let stock = product.stock();
        assert_eq!(stock.available, 10);
        assert_eq!(stock.reserved, 0);
    }

    #[test]
    fn release_more_than_reserved_is_invariant_violation() {
        let mut product = test_product(10);
        product.reserve(2, Utc::now()).unwrap();

        let err = product.release(5, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(product.stock().reserved, 2);
    }

    #[test]
    fn verify_invariant_detects_corrupted_counters() {
        let product = Product::from_parts(
            ProductId::new(),
            "Widget".to_string(),
            StockLevels {
                total: 10,
                available: 6,
                reserved: 3,
            },
            RecordMeta::new(Utc::now()),
        );
        assert!(matches!(
            product.verify_invariant(),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: any sequence of reserve/release calls preserves
            /// `available + reserved == total`, whether the calls succeed
            /// or fail.
            #[test]
            fn invariant_holds_under_arbitrary_sequences(
                total in 0u32..1000,
                ops in prop::collection::vec((prop::bool::ANY, 0u32..1200), 0..50)
            ) {
                let mut product = Product::new(ProductId::new(), "P", total, Utc::now());

                for (is_reserve, quantity) in ops {
                    let _ = if is_reserve {
                        product.reserve(quantity, Utc::now())
                    } else {
                        product.release(quantity, Utc::now())
                    };
                    prop_assert!(product.verify_invariant().is_ok());
                    prop_assert_eq!(product.stock().total, total);
                }
            }

            /// Property: a successful reserve followed by a release of the
            /// same quantity restores the exact prior counters.
            #[test]
            fn reserve_release_round_trips(
                total in 1u32..1000,
                quantity in 1u32..1000
            ) {
                prop_assume!(quantity <= total);
                let mut product = Product::new(ProductId::new(), "P", total, Utc::now());
                let before = product.stock();

                product.reserve(quantity, Utc::now()).unwrap();
                product.release(quantity, Utc::now()).unwrap();

                prop_assert_eq!(product.stock(), before);
            }
        }
    }
}
