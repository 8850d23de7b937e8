use crate::{
    error::AppResult,
    models::{Listing, ListingFilter, NewLocation, NormalizedListing},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{create_pool, PgListingStore};

/// System of record for listings and their locations
#[async_trait::async_trait]
pub trait ListingStore: Send + Sync {
    /// Creates the location and then the listing referencing it, atomically
    ///
    /// On error neither row exists afterward.
    async fn create_listing(
        &self,
        location: &NewLocation,
        listing: &NormalizedListing,
        manager_id: &str,
    ) -> AppResult<Listing>;

    async fn find_listing(&self, id: i32) -> AppResult<Option<Listing>>;

    /// Listings matching every bound of `filter`, ordered by ascending id
    async fn find_listings(&self, filter: &ListingFilter) -> AppResult<Vec<Listing>>;

    /// Store name for logging and debugging
    fn name(&self) -> &'static str;
}
