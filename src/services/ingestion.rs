use std::{sync::Arc, time::Instant};

use crate::{
    db::ListingStore,
    error::{AppError, AppResult},
    models::{Listing, NewLocation, RawSubmission},
    services::{geocoding::Geocoder, normalizer, uploader::PhotoUploader},
};

/// Creates listings from raw submissions
///
/// A submission either becomes exactly one stored listing with all of its
/// photos, or fails leaving no listing, no location and no uploaded objects.
#[derive(Clone)]
pub struct IngestionOrchestrator {
    geocoder: Arc<dyn Geocoder>,
    uploader: PhotoUploader,
    store: Arc<dyn ListingStore>,
}

impl IngestionOrchestrator {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        uploader: PhotoUploader,
        store: Arc<dyn ListingStore>,
    ) -> Self {
        Self {
            geocoder,
            uploader,
            store,
        }
    }

    /// Ingests a submission
    ///
    /// The pipeline:
    /// 1. Resolve the address and upload the photos concurrently
    /// 2. Normalize the submitted fields
    /// 3. Persist location and listing in one transaction
    ///
    /// Uploaded photos are deleted whenever a later step fails. Dropping the
    /// returned future cancels both branches of step 1 and deletes whatever
    /// was already uploaded.
    pub async fn ingest(&self, submission: RawSubmission) -> AppResult<Listing> {
        let start = Instant::now();
        let RawSubmission {
            address,
            manager_id,
            fields,
            files,
        } = submission;
        let photo_count = files.len();

        tracing::info!(
            photo_count,
            city = %address.city,
            geocoder = self.geocoder.name(),
            "Starting listing ingestion"
        );

        // 1. Fan out; geocoding never fails, upload failures are already cleaned up
        let (coordinates, uploaded) = tokio::join!(
            self.geocoder.resolve(&address),
            self.uploader.upload(files)
        );
        let batch = uploaded?;

        // 2. Normalize
        let mut listing = match normalizer::normalize(&address, &manager_id, &fields) {
            Ok(listing) => listing,
            Err(field_errors) => {
                tracing::info!(
                    invalid_fields = field_errors.len(),
                    "Submission rejected, discarding uploaded photos"
                );
                batch.discard().await;
                return Err(AppError::ValidationFailed(field_errors));
            }
        };
        listing.photo_urls = batch.urls();

        // 3. Persist
        let location = NewLocation {
            address,
            coordinates,
        };
        let created = match self
            .store
            .create_listing(&location, &listing, &manager_id)
            .await
        {
            Ok(created) => created,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    store = self.store.name(),
                    "Listing write failed, discarding uploaded photos"
                );
                batch.discard().await;
                return Err(AppError::PersistenceFailed(e.to_string()));
            }
        };

        batch.commit();

        tracing::info!(
            listing_id = created.id,
            location_id = created.location.id,
            photo_count,
            fallback_coordinates = coordinates.is_fallback(),
            processing_time_ms = start.elapsed().as_millis() as u64,
            "Listing ingested"
        );

        Ok(created)
    }
}
