//! `PostgreSQL` implementation of [`InventoryStore`].
//!
//! Each [`Mutation`] runs in one transaction. The listing update is a conditional
//! `UPDATE ... WHERE id = $1 AND version = $2`; under `READ COMMITTED` a second
//! writer racing on the same row blocks on the row lock, re-evaluates the predicate
//! after the first commits and matches zero rows. That is reported as
//! [`StoreError::ConcurrencyConflict`] and the transaction is rolled back, so the
//! dependent reservation write never lands without its stock change.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use surplus_core::error::StoreError;
use surplus_core::geo::GeoPoint;
use surplus_core::ledger::{ListingSnapshot, Mutation, ReservationWrite};
use surplus_core::store::{InventoryStore, ListingQuery, StoreFuture};
use surplus_core::types::{
    BuyerId, Listing, ListingId, ListingStatus, Money, Reservation, ReservationId,
    ReservationStatus, StoreId, StoreRef,
};
use surplus_core::version::Version;
use uuid::Uuid;

const LISTING_COLUMNS: &str = r"
    l.id, l.store_id, l.name, l.category, l.is_instant,
    l.original_price, l.discount_price, l.quantity, l.stocked_quantity, l.sold_direct,
    l.status, l.pickup_deadline, l.early_access_from, l.visible_from,
    l.created_at, l.updated_at, l.version,
    s.latitude, s.longitude
";

const RESERVATION_COLUMNS: &str = r"
    r.id, r.listing_id, r.store_id, r.buyer_id, r.quantity, r.status,
    r.preferred_pickup_time, r.created_at, r.completed_at, r.canceled_at
";

fn db_error(error: sqlx::Error) -> StoreError {
    StoreError::DatabaseError(error.to_string())
}

fn decode_error(error: sqlx::Error) -> StoreError {
    StoreError::SerializationError(error.to_string())
}

fn to_db_count(value: u32) -> i64 {
    i64::from(value)
}

fn from_db_count(value: i64, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::SerializationError(format!("{column} out of range: {value}")))
}

fn to_db_money(value: Money) -> Result<i64, StoreError> {
    i64::try_from(value.amount())
        .map_err(|_| StoreError::SerializationError(format!("price out of range: {value}")))
}

fn from_db_money(value: i64, column: &str) -> Result<Money, StoreError> {
    u64::try_from(value)
        .map(Money::new)
        .map_err(|_| StoreError::SerializationError(format!("{column} out of range: {value}")))
}

fn to_db_version(version: Version) -> Result<i64, StoreError> {
    i64::try_from(version)
        .map_err(|_| StoreError::SerializationError(format!("version out of range: {version}")))
}

fn location(latitude: Option<f64>, longitude: Option<f64>) -> Option<GeoPoint> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint::new(latitude, longitude)),
        _ => None,
    }
}

fn row_to_listing(row: &PgRow) -> Result<Listing, StoreError> {
    let status: String = row.try_get("status").map_err(decode_error)?;
    let version: i64 = row.try_get("version").map_err(decode_error)?;

    Ok(Listing {
        id: ListingId::from_uuid(row.try_get("id").map_err(decode_error)?),
        store: StoreRef {
            id: StoreId::from_uuid(row.try_get("store_id").map_err(decode_error)?),
            location: location(
                row.try_get("latitude").map_err(decode_error)?,
                row.try_get("longitude").map_err(decode_error)?,
            ),
        },
        name: row.try_get("name").map_err(decode_error)?,
        category: row.try_get("category").map_err(decode_error)?,
        is_instant: row.try_get("is_instant").map_err(decode_error)?,
        original_price: from_db_money(
            row.try_get("original_price").map_err(decode_error)?,
            "original_price",
        )?,
        discount_price: from_db_money(
            row.try_get("discount_price").map_err(decode_error)?,
            "discount_price",
        )?,
        quantity: from_db_count(row.try_get("quantity").map_err(decode_error)?, "quantity")?,
        stocked_quantity: from_db_count(
            row.try_get("stocked_quantity").map_err(decode_error)?,
            "stocked_quantity",
        )?,
        sold_direct: from_db_count(
            row.try_get("sold_direct").map_err(decode_error)?,
            "sold_direct",
        )?,
        status: ListingStatus::parse(&status).map_err(StoreError::SerializationError)?,
        pickup_deadline: row.try_get("pickup_deadline").map_err(decode_error)?,
        early_access_from: row.try_get("early_access_from").map_err(decode_error)?,
        visible_from: row.try_get("visible_from").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
        version: Version::try_from(version).map_err(|_| {
            StoreError::SerializationError(format!("version out of range: {version}"))
        })?,
    })
}

fn row_to_reservation(row: &PgRow) -> Result<Reservation, StoreError> {
    let status: String = row.try_get("status").map_err(decode_error)?;

    Ok(Reservation {
        id: ReservationId::from_uuid(row.try_get("id").map_err(decode_error)?),
        listing_id: ListingId::from_uuid(row.try_get("listing_id").map_err(decode_error)?),
        store_id: StoreId::from_uuid(row.try_get("store_id").map_err(decode_error)?),
        buyer_id: BuyerId::from_uuid(row.try_get("buyer_id").map_err(decode_error)?),
        quantity: from_db_count(row.try_get("quantity").map_err(decode_error)?, "quantity")?,
        status: ReservationStatus::parse(&status).map_err(StoreError::SerializationError)?,
        preferred_pickup_time: row.try_get("preferred_pickup_time").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        completed_at: row.try_get("completed_at").map_err(decode_error)?,
        canceled_at: row.try_get("canceled_at").map_err(decode_error)?,
    })
}

/// `PostgreSQL`-backed listings and reservations.
///
/// # Example
///
/// ```no_run
/// use surplus_postgres::PostgresInventoryStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresInventoryStore::new("postgres://localhost/surplus").await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Connect to `database_url` with a default pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(db_error)?;
        Ok(Self { pool })
    }

    /// Use an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    async fn current_version(
        tx: &mut Transaction<'_, Postgres>,
        id: ListingId,
    ) -> Result<Option<i64>, StoreError> {
        sqlx::query_scalar("SELECT version FROM listings WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_error)
    }

    async fn write_reservation(
        tx: &mut Transaction<'_, Postgres>,
        write: &ReservationWrite,
    ) -> Result<bool, StoreError> {
        let result = match write {
            ReservationWrite::Insert(r) => sqlx::query(
                r"
                INSERT INTO reservations (
                    id, listing_id, store_id, buyer_id, quantity, status,
                    preferred_pickup_time, created_at, completed_at, canceled_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ",
            )
            .bind(r.id.as_uuid())
            .bind(r.listing_id.as_uuid())
            .bind(r.store_id.as_uuid())
            .bind(r.buyer_id.as_uuid())
            .bind(to_db_count(r.quantity))
            .bind(r.status.as_str())
            .bind(r.preferred_pickup_time)
            .bind(r.created_at)
            .bind(r.completed_at)
            .bind(r.canceled_at)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?,
            ReservationWrite::Update {
                reservation: r,
                expected_status,
            } => sqlx::query(
                r"
                UPDATE reservations
                SET status = $2, completed_at = $3, canceled_at = $4
                WHERE id = $1 AND status = $5
                ",
            )
            .bind(r.id.as_uuid())
            .bind(r.status.as_str())
            .bind(r.completed_at)
            .bind(r.canceled_at)
            .bind(expected_status.as_str())
            .execute(&mut **tx)
            .await
            .map_err(db_error)?,
        };
        Ok(result.rows_affected() == 1)
    }

    async fn commit_mutation(&self, mutation: Mutation) -> Result<Listing, StoreError> {
        let listing = &mutation.listing;
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let updated = sqlx::query(
            r"
            UPDATE listings
            SET quantity = $3,
                stocked_quantity = $4,
                sold_direct = $5,
                status = $6,
                pickup_deadline = $7,
                updated_at = $8,
                version = $9,
                name = $10,
                category = $11,
                is_instant = $12,
                original_price = $13,
                discount_price = $14
            WHERE id = $1 AND version = $2
            ",
        )
        .bind(listing.id.as_uuid())
        .bind(to_db_version(mutation.expected_version)?)
        .bind(to_db_count(listing.quantity))
        .bind(to_db_count(listing.stocked_quantity))
        .bind(to_db_count(listing.sold_direct))
        .bind(listing.status.as_str())
        .bind(listing.pickup_deadline)
        .bind(listing.updated_at)
        .bind(to_db_version(listing.version)?)
        .bind(&listing.name)
        .bind(&listing.category)
        .bind(listing.is_instant)
        .bind(to_db_money(listing.original_price)?)
        .bind(to_db_money(listing.discount_price)?)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if updated.rows_affected() == 0 {
            let actual = Self::current_version(&mut tx, listing.id).await?;
            tx.rollback().await.map_err(db_error)?;
            metrics::counter!("surplus_store_rollbacks_total", "reason" => "stale_listing")
                .increment(1);
            return match actual {
                None => Err(StoreError::NotFound(format!("listing {}", listing.id))),
                Some(actual) => Err(StoreError::ConcurrencyConflict {
                    listing_id: listing.id,
                    expected: mutation.expected_version,
                    actual: Version::try_from(actual).unwrap_or(Version::INITIAL),
                }),
            };
        }

        if let Some(write) = &mutation.reservation {
            if !Self::write_reservation(&mut tx, write).await? {
                tx.rollback().await.map_err(db_error)?;
                metrics::counter!("surplus_store_rollbacks_total", "reason" => "stale_reservation")
                    .increment(1);
                return Err(StoreError::ConcurrencyConflict {
                    listing_id: listing.id,
                    expected: mutation.expected_version,
                    actual: mutation.expected_version,
                });
            }
        }

        tx.commit().await.map_err(db_error)?;

        tracing::debug!(
            listing_id = %listing.id,
            version = %listing.version,
            event_type = mutation.event.event_type(),
            "Mutation committed"
        );

        Ok(mutation.listing)
    }

    async fn fetch_reservations(
        &self,
        filter: &str,
        bind: Uuid,
        status: Option<ReservationStatus>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations r
             WHERE {filter} = $1 AND ($2::text IS NULL OR r.status = $2)
             ORDER BY r.created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(bind)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(row_to_reservation).collect()
    }
}

impl InventoryStore for PostgresInventoryStore {
    fn register_store(&self, store: StoreRef) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO stores (id, latitude, longitude)
                VALUES ($1, $2, $3)
                ON CONFLICT (id) DO UPDATE
                SET latitude = EXCLUDED.latitude, longitude = EXCLUDED.longitude
                ",
            )
            .bind(store.id.as_uuid())
            .bind(store.location.map(|p| p.latitude))
            .bind(store.location.map(|p| p.longitude))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
            Ok(())
        })
    }

    fn load_store(&self, id: StoreId) -> StoreFuture<'_, Option<StoreRef>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT latitude, longitude FROM stores WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
            row.map(|row| {
                Ok(StoreRef {
                    id,
                    location: location(
                        row.try_get("latitude").map_err(decode_error)?,
                        row.try_get("longitude").map_err(decode_error)?,
                    ),
                })
            })
            .transpose()
        })
    }

    fn insert_listing(&self, listing: Listing) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                INSERT INTO listings (
                    id, store_id, name, category, is_instant,
                    original_price, discount_price, quantity, stocked_quantity, sold_direct,
                    status, pickup_deadline, early_access_from, visible_from,
                    created_at, updated_at, version
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
                )
                ",
            )
            .bind(listing.id.as_uuid())
            .bind(listing.store.id.as_uuid())
            .bind(&listing.name)
            .bind(&listing.category)
            .bind(listing.is_instant)
            .bind(to_db_money(listing.original_price)?)
            .bind(to_db_money(listing.discount_price)?)
            .bind(to_db_count(listing.quantity))
            .bind(to_db_count(listing.stocked_quantity))
            .bind(to_db_count(listing.sold_direct))
            .bind(listing.status.as_str())
            .bind(listing.pickup_deadline)
            .bind(listing.early_access_from)
            .bind(listing.visible_from)
            .bind(listing.created_at)
            .bind(listing.updated_at)
            .bind(to_db_version(listing.version)?)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => Err(
                    StoreError::NotFound(format!("store {}", listing.store.id)),
                ),
                Err(e) => Err(db_error(e)),
            }
        })
    }

    fn load_listing(&self, id: ListingId) -> StoreFuture<'_, Option<Listing>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {LISTING_COLUMNS} FROM listings l JOIN stores s ON s.id = l.store_id
                 WHERE l.id = $1"
            );
            let row = sqlx::query(&sql)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
            row.as_ref().map(row_to_listing).transpose()
        })
    }

    fn load_snapshot(&self, id: ListingId) -> StoreFuture<'_, Option<ListingSnapshot>> {
        Box::pin(async move {
            // Both reads see the same database snapshot.
            let mut tx = self.pool.begin().await.map_err(db_error)?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;

            let sql = format!(
                "SELECT {LISTING_COLUMNS} FROM listings l JOIN stores s ON s.id = l.store_id
                 WHERE l.id = $1"
            );
            let Some(row) = sqlx::query(&sql)
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?
            else {
                tx.rollback().await.map_err(db_error)?;
                return Ok(None);
            };
            let listing = row_to_listing(&row)?;

            let sql = format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations r
                 WHERE r.listing_id = $1 AND r.status = 'RESERVED'
                 ORDER BY r.created_at"
            );
            let rows = sqlx::query(&sql)
                .bind(id.as_uuid())
                .fetch_all(&mut *tx)
                .await
                .map_err(db_error)?;
            tx.commit().await.map_err(db_error)?;

            let open_reservations = rows
                .iter()
                .map(row_to_reservation)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(ListingSnapshot {
                listing,
                open_reservations,
            }))
        })
    }

    fn load_reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move {
            let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations r WHERE r.id = $1");
            let row = sqlx::query(&sql)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
            row.as_ref().map(row_to_reservation).transpose()
        })
    }

    fn commit(&self, mutation: Mutation) -> StoreFuture<'_, Listing> {
        Box::pin(self.commit_mutation(mutation))
    }

    fn open_listings(
        &self,
        now: DateTime<Utc>,
        query: ListingQuery,
    ) -> StoreFuture<'_, Vec<Listing>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {LISTING_COLUMNS} FROM listings l JOIN stores s ON s.id = l.store_id
                 WHERE l.status = 'AVAILABLE'
                   AND l.quantity > 0
                   AND l.pickup_deadline > $1
                   AND ($2::boolean IS NULL OR l.is_instant = $2)
                   AND ($3::bigint IS NULL OR l.discount_price <= $3)
                   AND ($4::text IS NULL OR l.category = $4)"
            );
            let max_price = query.max_price.map(to_db_money).transpose()?;
            let rows = sqlx::query(&sql)
                .bind(now)
                .bind(query.is_instant)
                .bind(max_price)
                .bind(&query.category)
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
            rows.iter().map(row_to_listing).collect()
        })
    }

    fn listings_for_store(&self, store_id: StoreId) -> StoreFuture<'_, Vec<Listing>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {LISTING_COLUMNS} FROM listings l JOIN stores s ON s.id = l.store_id
                 WHERE l.store_id = $1
                 ORDER BY l.created_at DESC, l.id DESC"
            );
            let rows = sqlx::query(&sql)
                .bind(store_id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
            rows.iter().map(row_to_listing).collect()
        })
    }

    fn reservations_for_listing(&self, listing_id: ListingId) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(self.fetch_reservations("r.listing_id", *listing_id.as_uuid(), None))
    }

    fn reservations_for_buyer(&self, buyer_id: BuyerId) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(self.fetch_reservations("r.buyer_id", *buyer_id.as_uuid(), None))
    }

    fn reservations_for_store(
        &self,
        store_id: StoreId,
        status: Option<ReservationStatus>,
    ) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(self.fetch_reservations("r.store_id", *store_id.as_uuid(), status))
    }

    fn overdue_reservations(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations r
                 JOIN listings l ON l.id = r.listing_id
                 WHERE r.status = 'RESERVED' AND l.pickup_deadline < $1
                 ORDER BY r.created_at"
            );
            let rows = sqlx::query(&sql)
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
            rows.iter().map(row_to_reservation).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_requires_both_coordinates() {
        assert_eq!(location(Some(1.0), Some(2.0)), Some(GeoPoint::new(1.0, 2.0)));
        assert_eq!(location(Some(1.0), None), None);
        assert_eq!(location(None, None), None);
    }

    #[test]
    fn test_negative_counts_are_rejected() {
        assert!(matches!(
            from_db_count(-1, "quantity"),
            Err(StoreError::SerializationError(_))
        ));
        assert_eq!(from_db_count(7, "quantity").ok(), Some(7));
    }

    #[test]
    fn test_money_bounds() {
        assert!(to_db_money(Money::new(u64::MAX)).is_err());
        assert_eq!(from_db_money(6_000, "discount_price").ok(), Some(Money::new(6_000)));
        assert!(from_db_money(-5, "discount_price").is_err());
    }
}
