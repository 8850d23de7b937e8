use chrono::Utc;
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::RwLock;

use crate::{
    db::ListingStore,
    error::{AppError, AppResult},
    models::{Listing, ListingFilter, Location, NewLocation, NormalizedListing},
};

/// Inner state guarded by the store lock
#[derive(Default)]
struct StoreInner {
    next_location_id: i32,
    next_listing_id: i32,
    locations: BTreeMap<i32, Location>,
    listings: BTreeMap<i32, Listing>,
}

/// In-process listing store
///
/// Used by the test suites; writes can be made to fail to exercise the
/// ingestion rollback path.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `create_listing` calls fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn listing_count(&self) -> usize {
        self.inner.read().await.listings.len()
    }

    pub async fn location_count(&self) -> usize {
        self.inner.read().await.locations.len()
    }
}

#[async_trait::async_trait]
impl ListingStore for MemoryStore {
    async fn create_listing(
        &self,
        location: &NewLocation,
        listing: &NormalizedListing,
        manager_id: &str,
    ) -> AppResult<Listing> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Internal("Simulated write failure".to_string()));
        }

        let mut inner = self.inner.write().await;

        inner.next_location_id += 1;
        let address = &location.address;
        let stored_location = Location {
            id: inner.next_location_id,
            address: address.street.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            country: address.country.clone(),
            postal_code: address.postal_code.clone(),
            coordinates: location.coordinates,
        };

        inner.next_listing_id += 1;
        let created = Listing::from_parts(
            inner.next_listing_id,
            listing.clone(),
            stored_location.clone(),
            manager_id.to_string(),
            Utc::now(),
        );

        inner.locations.insert(stored_location.id, stored_location);
        inner.listings.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_listing(&self, id: i32) -> AppResult<Option<Listing>> {
        Ok(self.inner.read().await.listings.get(&id).cloned())
    }

    async fn find_listings(&self, filter: &ListingFilter) -> AppResult<Vec<Listing>> {
        let inner = self.inner.read().await;
        let matching = inner
            .listings
            .values()
            .filter(|listing| filter.matches(listing))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matching)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
