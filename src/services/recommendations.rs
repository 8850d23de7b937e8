use std::sync::Arc;

use crate::{
    db::ListingStore,
    error::{AppError, AppResult},
    models::{Listing, ListingFilter},
};

/// Maximum number of similar listings returned
pub const MAX_RECOMMENDATIONS: usize = 5;

const BAND_LOWER: f64 = 0.8;
const BAND_UPPER: f64 = 1.2;

/// Inclusive monthly price range around a reference listing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBand {
    pub min: f64,
    pub max: f64,
}

impl PriceBand {
    pub fn around(price: f64) -> Self {
        Self {
            min: price * BAND_LOWER,
            max: price * BAND_UPPER,
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }
}

/// Finds listings similar to an existing one
///
/// Similar means the same property type and a monthly price within
/// [`PriceBand::around`] the source price. Location is not considered.
#[derive(Clone)]
pub struct SimilarityRecommender {
    store: Arc<dyn ListingStore>,
}

impl SimilarityRecommender {
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self { store }
    }

    /// Returns up to [`MAX_RECOMMENDATIONS`] listings similar to `listing_id`,
    /// ordered by ascending id and never including the source itself
    pub async fn recommend(&self, listing_id: i32) -> AppResult<Vec<Listing>> {
        let source = self
            .store
            .find_listing(listing_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Property {} not found", listing_id)))?;

        let band = PriceBand::around(source.price_per_month);
        let filter = ListingFilter {
            exclude_id: Some(source.id),
            property_type: Some(source.property_type),
            price_min: Some(band.min),
            price_max: Some(band.max),
            limit: Some(MAX_RECOMMENDATIONS),
            ..Default::default()
        };

        let recommendations = self.store.find_listings(&filter).await?;

        tracing::info!(
            listing_id,
            property_type = %source.property_type,
            price_min = band.min,
            price_max = band.max,
            results = recommendations.len(),
            "Recommendations computed"
        );

        Ok(recommendations)
    }
}
