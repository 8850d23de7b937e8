/// Blob storage abstraction
///
/// Photos are written to an object store under caller-chosen keys. The uploader
/// is the only component that creates or deletes objects.
use bytes::Bytes;

use crate::error::AppResult;

pub mod http;
pub mod memory;

pub use http::HttpBlobStore;
pub use memory::MemoryBlobStore;

/// Trait for object stores holding listing photos
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `key` and returns the public URL of the object
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> AppResult<String>;

    /// Removes the object under `key`; deleting a missing object is not an error
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Store name for logging and debugging
    fn name(&self) -> &'static str;
}
