//! Buyer profile and favorites reads.
//!
//! Both tables are owned by other services; this adapter only reads them.

use sqlx::{PgPool, Row};
use std::collections::HashSet;
use surplus_core::environment::{
    BuyerProfile, BuyerProfiles, CollaboratorError, CollaboratorFuture, FavoriteStores,
};
use surplus_core::geo::GeoPoint;
use surplus_core::types::{BuyerId, BuyerTier, StoreId};
use uuid::Uuid;

fn unavailable(error: sqlx::Error) -> CollaboratorError {
    CollaboratorError::Unavailable(error.to_string())
}

/// Read adapter for `buyer_profiles` and `favorite_stores`.
#[derive(Clone, Debug)]
pub struct PostgresBuyerDirectory {
    pool: PgPool,
}

impl PostgresBuyerDirectory {
    /// Create a directory over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl BuyerProfiles for PostgresBuyerDirectory {
    fn profile(&self, buyer_id: BuyerId) -> CollaboratorFuture<'_, Option<BuyerProfile>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT tier, latitude, longitude FROM buyer_profiles WHERE buyer_id = $1",
            )
            .bind(buyer_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

            let Some(row) = row else {
                return Ok(None);
            };
            let tier: i16 = row.try_get("tier").map_err(unavailable)?;
            let latitude: Option<f64> = row.try_get("latitude").map_err(unavailable)?;
            let longitude: Option<f64> = row.try_get("longitude").map_err(unavailable)?;

            Ok(Some(BuyerProfile {
                location: latitude.zip(longitude).map(|(lat, lon)| GeoPoint::new(lat, lon)),
                // Grades above the u8 range are clamped rather than rejected.
                tier: BuyerTier::new(u8::try_from(tier.max(0)).unwrap_or(u8::MAX)),
            }))
        })
    }
}

impl FavoriteStores for PostgresBuyerDirectory {
    fn favorite_stores(&self, buyer_id: BuyerId) -> CollaboratorFuture<'_, HashSet<StoreId>> {
        Box::pin(async move {
            let ids: Vec<Uuid> =
                sqlx::query_scalar("SELECT store_id FROM favorite_stores WHERE buyer_id = $1")
                    .bind(buyer_id.as_uuid())
                    .fetch_all(&self.pool)
                    .await
                    .map_err(unavailable)?;
            Ok(ids.into_iter().map(StoreId::from_uuid).collect())
        })
    }
}
