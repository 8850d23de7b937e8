pub mod geocoding;
pub mod ingestion;
pub mod normalizer;
pub mod recommendations;
pub mod uploader;

pub use geocoding::{Geocoder, NominatimGeocoder};
pub use ingestion::IngestionOrchestrator;
pub use recommendations::SimilarityRecommender;
pub use uploader::{PhotoUploader, UploadBatch};
