//! Postgres-backed store implementation.
//!
//! All compound operations run inside a transaction. Contention on a single
//! product serializes on that product's row lock (the guarded `UPDATE` in
//! [`PostgresInventoryStore::reserve_stock`], `SELECT ... FOR UPDATE`
//! elsewhere); operations on different products do not block each other.
//! The stock invariant is enforced twice: by the domain types before every
//! write, and by CHECK constraints at the database level as a second line
//! of defense.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (check constraint violation) | `23514` | `Domain(InvariantViolation)` | A write would corrupt the stock ledger |
//! | Database (unique violation) | `23505` | `Storage` | Duplicate primary key |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | PoolClosed / network / decode | N/A | `Storage` | Transient faults; safe to retry the whole operation |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockroom_audit::{AuditAction, AuditLogEntry};
use stockroom_core::{ActorId, DomainError, OrderId, ProductId, RecordMeta, ReservationId};
use stockroom_inventory::{Product, Reservation, StockLevels};
use stockroom_orders::{Order, OrderItem, OrderStatus, StatusChange};

use crate::error::{StoreError, StoreResult};

use super::{InventoryStore, ReclaimOutcome};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id              UUID PRIMARY KEY,
        name            TEXT NOT NULL,
        total_stock     BIGINT NOT NULL CHECK (total_stock >= 0),
        available_stock BIGINT NOT NULL CHECK (available_stock >= 0),
        reserved_stock  BIGINT NOT NULL CHECK (reserved_stock >= 0),
        created_at      TIMESTAMPTZ NOT NULL,
        updated_at      TIMESTAMPTZ NOT NULL,
        deleted_at      TIMESTAMPTZ NULL,
        CHECK (available_stock + reserved_stock = total_stock)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reservations (
        id         UUID PRIMARY KEY,
        product_id UUID NOT NULL REFERENCES products (id),
        quantity   BIGINT NOT NULL CHECK (quantity > 0),
        expires_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        order_id   UUID NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_reservations_expires_at
        ON reservations (expires_at) WHERE order_id IS NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id          UUID PRIMARY KEY,
        customer_id UUID NOT NULL,
        status      TEXT NOT NULL,
        total_cents BIGINT NOT NULL CHECK (total_cents >= 0),
        created_at  TIMESTAMPTZ NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL,
        deleted_at  TIMESTAMPTZ NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_items (
        order_id         UUID NOT NULL REFERENCES orders (id),
        line_no          BIGINT NOT NULL,
        product_id       UUID NOT NULL,
        quantity         BIGINT NOT NULL CHECK (quantity > 0),
        unit_price_cents BIGINT NOT NULL CHECK (unit_price_cents >= 0),
        PRIMARY KEY (order_id, line_no)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id          UUID PRIMARY KEY,
        actor       UUID NULL,
        action      TEXT NOT NULL,
        object_type TEXT NOT NULL,
        object_id   TEXT NOT NULL,
        old_value   JSONB NULL,
        new_value   JSONB NULL,
        recorded_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// Postgres-backed store.
///
/// Uses the SQLx connection pool (thread-safe, `Send + Sync`); every
/// compound operation is one transaction against a single connection.
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

fn map_sqlx_error(op: &str, e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23514") {
            return StoreError::Domain(DomainError::invariant(format!(
                "{op}: {}",
                db.message()
            )));
        }
    }
    StoreError::Storage(format!("{op}: {e}"))
}

fn counter(op: &str, value: i64) -> StoreResult<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::storage(format!("{op}: counter out of range: {value}")))
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    total_stock: i64,
    available_stock: i64,
    reserved_stock: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl ProductRow {
    fn into_product(self) -> StoreResult<Product> {
        Ok(Product::from_parts(
            ProductId::from(self.id),
            self.name,
            StockLevels {
                total: counter("products.total_stock", self.total_stock)?,
                available: counter("products.available_stock", self.available_stock)?,
                reserved: counter("products.reserved_stock", self.reserved_stock)?,
            },
            RecordMeta {
                created_at: self.created_at,
                updated_at: self.updated_at,
                deleted_at: self.deleted_at,
            },
        ))
    }
}

#[derive(Debug, FromRow)]
struct ReservationRow {
    id: Uuid,
    product_id: Uuid,
    quantity: i64,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    order_id: Option<Uuid>,
}

impl ReservationRow {
    fn into_reservation(self) -> StoreResult<Reservation> {
        Ok(Reservation {
            id: ReservationId::from(self.id),
            product_id: ProductId::from(self.product_id),
            quantity: counter("reservations.quantity", self.quantity)?,
            expires_at: self.expires_at,
            created_at: self.created_at,
            order_id: self.order_id.map(OrderId::from),
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    customer_id: Uuid,
    status: String,
    total_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct OrderItemRow {
    product_id: Uuid,
    quantity: i64,
    unit_price_cents: i64,
}

impl OrderItemRow {
    fn into_item(self) -> StoreResult<OrderItem> {
        Ok(OrderItem {
            product_id: ProductId::from(self.product_id),
            quantity: counter("order_items.quantity", self.quantity)?,
            unit_price_cents: u64::try_from(self.unit_price_cents).map_err(|_| {
                StoreError::storage(format!(
                    "order_items.unit_price_cents out of range: {}",
                    self.unit_price_cents
                ))
            })?,
        })
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    id: Uuid,
    actor: Option<Uuid>,
    action: String,
    object_type: String,
    object_id: String,
    old_value: Option<serde_json::Value>,
    new_value: Option<serde_json::Value>,
    recorded_at: DateTime<Utc>,
}

impl AuditRow {
    fn into_entry(self) -> StoreResult<AuditLogEntry> {
        let action = AuditAction::parse(&self.action)
            .ok_or_else(|| StoreError::storage(format!("unknown audit action: {}", self.action)))?;
        Ok(AuditLogEntry {
            id: stockroom_core::AuditEntryId::from(self.id),
            actor: self.actor.map(ActorId::from),
            action,
            object_type: self.object_type,
            object_id: self.object_id,
            old_value: self.old_value,
            new_value: self.new_value,
            recorded_at: self.recorded_at,
        })
    }
}

async fn insert_audit_tx(
    tx: &mut Transaction<'_, Postgres>,
    entry: &AuditLogEntry,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_log
            (id, actor, action, object_type, object_id, old_value, new_value, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.actor.map(|a| *a.as_uuid()))
    .bind(entry.action.as_str())
    .bind(&entry.object_type)
    .bind(&entry.object_id)
    .bind(entry.old_value.clone())
    .bind(entry.new_value.clone())
    .bind(entry.recorded_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("append_audit", e))?;
    Ok(())
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    #[instrument(skip(self, product), err)]
    async fn insert_product(&self, product: Product) -> StoreResult<()> {
        use stockroom_core::Entity;

        product.verify_invariant()?;
        let stock = product.stock();
        let meta = product.meta();
        sqlx::query(
            r#"
            INSERT INTO products
                (id, name, total_stock, available_stock, reserved_stock,
                 created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(product.id().as_uuid())
        .bind(product.name())
        .bind(i64::from(stock.total))
        .bind(i64::from(stock.available))
        .bind(i64::from(stock.reserved))
        .bind(meta.created_at)
        .bind(meta.updated_at)
        .bind(meta.deleted_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> StoreResult<Product> {
        let row: Option<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, name, total_stock, available_stock, reserved_stock,
                   created_at, updated_at, deleted_at
            FROM products
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?;

        row.ok_or(StoreError::ProductNotFound(id))?.into_product()
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn tombstone_product(&self, id: ProductId, now: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET deleted_at = COALESCE(deleted_at, $2), updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("tombstone_product", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn reserve_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
        expires_at: DateTime<Utc>,
        actor: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> StoreResult<Reservation> {
        if quantity == 0 {
            return Err(DomainError::invalid_quantity("quantity must be greater than zero").into());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("reserve_stock", e))?;

        // Guarded conditional decrement: the single statement is the
        // serialization point for concurrent reservers of this product.
        let updated = sqlx::query(
            r#"
            UPDATE products
            SET available_stock = available_stock - $2,
                reserved_stock  = reserved_stock + $2,
                updated_at      = $3
            WHERE id = $1 AND deleted_at IS NULL AND available_stock >= $2
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(i64::from(quantity))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reserve_stock", e))?;

        if updated.rows_affected() == 0 {
            // Guard failed: distinguish a missing product from a stock shortfall.
            let available: Option<i64> = sqlx::query_scalar(
                "SELECT available_stock FROM products WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("reserve_stock", e))?;

            return match available {
                Some(available) => Err(DomainError::insufficient_stock(
                    quantity,
                    counter("products.available_stock", available)?,
                )
                .into()),
                None => Err(StoreError::ProductNotFound(product_id)),
            };
        }

        let reservation = Reservation::new(product_id, quantity, expires_at, now);
        sqlx::query(
            r#"
            INSERT INTO reservations (id, product_id, quantity, expires_at, created_at, order_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.product_id.as_uuid())
        .bind(i64::from(reservation.quantity))
        .bind(reservation.expires_at)
        .bind(reservation.created_at)
        .bind(reservation.order_id.map(|o| *o.as_uuid()))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reserve_stock", e))?;

        let entry =
            AuditLogEntry::reservation_created(reservation.id, product_id, quantity, actor, now);
        insert_audit_tx(&mut tx, &entry).await?;

        // A failure anywhere above drops the transaction and rolls the
        // decrement back.
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("reserve_stock", e))?;
        Ok(reservation)
    }

    #[instrument(skip(self), fields(reservation_id = %id), err)]
    async fn get_reservation(&self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, product_id, quantity, expires_at, created_at, order_id
            FROM reservations
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_reservation", e))?;

        row.map(ReservationRow::into_reservation).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Reservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, product_id, quantity, expires_at, created_at, order_id
            FROM reservations
            WHERE expires_at < $1 AND order_id IS NULL
            "#,
        )
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_expired", e))?;

        rows.into_iter()
            .map(ReservationRow::into_reservation)
            .collect()
    }

    #[instrument(skip(self), fields(reservation_id = %id), err)]
    async fn remove_reservation(&self, id: ReservationId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("remove_reservation", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, reservation), fields(reservation_id = %reservation.id), err)]
    async fn reclaim_reservation(
        &self,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> StoreResult<ReclaimOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("reclaim_reservation", e))?;

        // Exclusive lock on the product row for the whole read-modify-write.
        let product_row: Option<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, name, total_stock, available_stock, reserved_stock,
                   created_at, updated_at, deleted_at
            FROM products
            WHERE id = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(reservation.product_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reclaim_reservation", e))?;

        let Some(product_row) = product_row else {
            return Err(StoreError::ProductNotFound(reservation.product_id));
        };

        // Re-check the reservation under the lock: a concurrent reclaimer
        // or a conversion may have won since the expiry scan.
        let current: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, product_id, quantity, expires_at, created_at, order_id
            FROM reservations
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(reservation.id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reclaim_reservation", e))?;

        let current = match current {
            None => return Ok(ReclaimOutcome::Skipped),
            Some(row) if row.order_id.is_some() => return Ok(ReclaimOutcome::Skipped),
            Some(row) => row.into_reservation()?,
        };

        let mut product = product_row.into_product()?;
        product.release(current.quantity, now)?;
        product.verify_invariant()?;
        let stock = product.stock();

        sqlx::query(
            r#"
            UPDATE products
            SET available_stock = $2, reserved_stock = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(current.product_id.as_uuid())
        .bind(i64::from(stock.available))
        .bind(i64::from(stock.reserved))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reclaim_reservation", e))?;

        let entry = AuditLogEntry::reservation_expired(
            current.id,
            current.product_id,
            current.quantity,
            now,
        );
        insert_audit_tx(&mut tx, &entry).await?;

        sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(current.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("reclaim_reservation", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("reclaim_reservation", e))?;
        Ok(ReclaimOutcome::Reclaimed)
    }

    #[instrument(skip(self, order), err)]
    async fn insert_order(&self, order: Order) -> StoreResult<()> {
        use stockroom_core::Entity;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;

        let meta = order.meta();
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, customer_id, status, total_cents, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.customer_id().as_uuid())
        .bind(order.status().as_str())
        .bind(i64::try_from(order.total_cents()).map_err(|_| {
            StoreError::storage(format!("order total out of range: {}", order.total_cents()))
        })?)
        .bind(meta.created_at)
        .bind(meta.updated_at)
        .bind(meta.deleted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for (line_no, item) in order.items().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, line_no, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(line_no as i64)
            .bind(item.product_id.as_uuid())
            .bind(i64::from(item.quantity))
            .bind(i64::try_from(item.unit_price_cents).map_err(|_| {
                StoreError::storage(format!(
                    "unit price out of range: {}",
                    item.unit_price_cents
                ))
            })?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn get_order(&self, id: OrderId) -> StoreResult<Order> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, customer_id, status, total_cents, created_at, updated_at, deleted_at
            FROM orders
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_order", e))?;

        let Some(row) = row else {
            return Err(StoreError::OrderNotFound(id));
        };

        let item_rows: Vec<OrderItemRow> = sqlx::query_as(
            r#"
            SELECT product_id, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY line_no
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_order", e))?;

        let items = item_rows
            .into_iter()
            .map(OrderItemRow::into_item)
            .collect::<StoreResult<Vec<_>>>()?;

        let status = OrderStatus::parse(&row.status)
            .ok_or_else(|| StoreError::storage(format!("unknown order status: {}", row.status)))?;
        let total_cents = u64::try_from(row.total_cents).map_err(|_| {
            StoreError::storage(format!("orders.total_cents out of range: {}", row.total_cents))
        })?;

        Ok(Order::from_parts(
            OrderId::from(row.id),
            ActorId::from(row.customer_id),
            status,
            items,
            total_cents,
            RecordMeta {
                created_at: row.created_at,
                updated_at: row.updated_at,
                deleted_at: row.deleted_at,
            },
        ))
    }

    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status), err)]
    async fn transition_order(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        actor: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> StoreResult<StatusChange> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("transition_order", e))?;

        let status: Option<String> = sqlx::query_scalar(
            r#"
            SELECT status FROM orders
            WHERE id = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("transition_order", e))?;

        let Some(status) = status else {
            return Err(StoreError::OrderNotFound(order_id));
        };
        let current = OrderStatus::parse(&status)
            .ok_or_else(|| StoreError::storage(format!("unknown order status: {status}")))?;

        if !current.can_transition_to(new_status) {
            return Err(
                DomainError::invalid_transition(current.as_str(), new_status.as_str()).into(),
            );
        }
        let change = StatusChange {
            from: current,
            to: new_status,
        };

        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(new_status.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("transition_order", e))?;

        let entry = AuditLogEntry::status_changed(order_id, change, actor, now);
        insert_audit_tx(&mut tx, &entry).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("transition_order", e))?;
        Ok(change)
    }

    #[instrument(skip(self, entry), fields(action = %entry.action), err)]
    async fn append_audit(&self, entry: AuditLogEntry) -> StoreResult<AuditLogEntry> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("append_audit", e))?;
        insert_audit_tx(&mut tx, &entry).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("append_audit", e))?;
        Ok(entry)
    }

    #[instrument(skip(self), err)]
    async fn audit_entries(&self, action: Option<AuditAction>) -> StoreResult<Vec<AuditLogEntry>> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, actor, action, object_type, object_id, old_value, new_value, recorded_at
            FROM audit_log
            WHERE $1::TEXT IS NULL OR action = $1
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(action.map(AuditAction::as_str))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("audit_entries", e))?;

        rows.into_iter().map(AuditRow::into_entry).collect()
    }
}
