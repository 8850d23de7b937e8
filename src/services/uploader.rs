/// Concurrent photo upload with all-or-nothing semantics
///
/// Files are written to the blob store with a bounded number of uploads in
/// flight. The resulting URLs line up with the input files regardless of which
/// upload finishes first. If any file still fails after its retries, every
/// object written for the batch is deleted before the error is reported.
use futures::stream::{FuturesUnordered, StreamExt};
use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    error::{AppError, AppResult},
    models::PhotoFile,
    storage::BlobStore,
};

/// Key prefix for listing photos in the blob store
pub const PHOTO_KEY_PREFIX: &str = "properties";

/// Builds the object key for a photo: `properties/{unix_millis}-{file_name}`
///
/// Directory components are stripped from the submitted name and characters
/// outside `[A-Za-z0-9._-]` become `-` so the key is URL-safe.
pub fn photo_key(timestamp_millis: i64, file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let name = if sanitized.is_empty() {
        "photo".to_string()
    } else {
        sanitized
    };
    format!("{}/{}-{}", PHOTO_KEY_PREFIX, timestamp_millis, name)
}

static LAST_KEY_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Timestamp for the next photo key
///
/// Strictly increasing across the process, so no two photos share a key even
/// when they carry the same file name and are dispatched in the same millisecond.
fn next_key_millis() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let previous = LAST_KEY_MILLIS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(previous + 1)
}

/// Uploads photo batches to a [`BlobStore`]
#[derive(Clone)]
pub struct PhotoUploader {
    store: Arc<dyn BlobStore>,
    concurrency: usize,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl PhotoUploader {
    pub fn new(
        store: Arc<dyn BlobStore>,
        concurrency: usize,
        max_attempts: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
            max_attempts: max_attempts.max(1),
            retry_backoff,
        }
    }

    /// Uploads every file and returns the batch holding their URLs in input order
    ///
    /// On failure no new uploads are started, the ones in flight are allowed to
    /// finish, and everything the batch wrote is deleted before returning.
    pub async fn upload(&self, files: Vec<PhotoFile>) -> AppResult<UploadBatch> {
        let total = files.len();
        let mut batch = UploadBatch::new(self.store.clone(), total);
        if total == 0 {
            return Ok(batch);
        }

        let mut pending = files.into_iter().enumerate();
        let mut in_flight = FuturesUnordered::new();
        let mut failure: Option<AppError> = None;

        loop {
            while failure.is_none() && in_flight.len() < self.concurrency {
                let Some((index, file)) = pending.next() else {
                    break;
                };
                let key = photo_key(next_key_millis(), &file.file_name);
                batch.track(key.clone());
                in_flight.push(async move {
                    let result = self.upload_one(&key, file).await;
                    (index, result)
                });
            }

            let Some((index, result)) = in_flight.next().await else {
                break;
            };

            match result {
                Ok(url) => batch.complete(index, url),
                Err(e) => {
                    tracing::error!(error = %e, index, "Photo upload failed, aborting batch");
                    failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = failure {
            batch.discard().await;
            return Err(AppError::UploadFailed(e.to_string()));
        }

        tracing::info!(
            photo_count = total,
            store = self.store.name(),
            "Photo batch uploaded"
        );

        Ok(batch)
    }

    async fn upload_one(&self, key: &str, file: PhotoFile) -> AppResult<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .store
                .put(key, file.bytes.clone(), &file.content_type)
                .await
            {
                Ok(url) => return Ok(url),
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        key = %key,
                        attempt,
                        error = %e,
                        "Photo upload attempt failed, retrying"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Objects written by one upload call
///
/// The batch stays armed until [`UploadBatch::commit`] is called. Discarding it,
/// or dropping it while armed (for example when the request is cancelled),
/// deletes every tracked object.
pub struct UploadBatch {
    store: Arc<dyn BlobStore>,
    keys: Vec<String>,
    urls: Vec<Option<String>>,
    armed: bool,
}

impl UploadBatch {
    fn new(store: Arc<dyn BlobStore>, capacity: usize) -> Self {
        Self {
            store,
            keys: Vec::with_capacity(capacity),
            urls: vec![None; capacity],
            armed: true,
        }
    }

    // Keys are tracked in dispatch order, which is input order
    fn track(&mut self, key: String) {
        self.keys.push(key);
    }

    fn complete(&mut self, index: usize, url: String) {
        self.urls[index] = Some(url);
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Uploaded URLs in input order
    pub fn urls(&self) -> Vec<String> {
        self.urls.iter().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keeps the objects; ownership passes to the listing that references them
    pub fn commit(mut self) -> Vec<String> {
        self.armed = false;
        self.urls()
    }

    /// Deletes every object of the batch (best effort)
    ///
    /// The deletes run on a spawned task and finish even if this future is
    /// dropped before they complete.
    pub async fn discard(mut self) {
        self.armed = false;
        let keys = std::mem::take(&mut self.keys);
        if let Err(e) = tokio::spawn(delete_all(self.store.clone(), keys)).await {
            tracing::error!(error = %e, "Compensating photo delete task failed");
        }
    }
}

impl Drop for UploadBatch {
    fn drop(&mut self) {
        if !self.armed || self.keys.is_empty() {
            return;
        }
        let keys = std::mem::take(&mut self.keys);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(
                    objects = keys.len(),
                    "Upload batch dropped before commit, deleting objects"
                );
                handle.spawn(delete_all(self.store.clone(), keys));
            }
            Err(_) => {
                tracing::error!(keys = ?keys, "No runtime available to delete orphaned photos");
            }
        }
    }
}

async fn delete_all(store: Arc<dyn BlobStore>, keys: Vec<String>) {
    if keys.is_empty() {
        return;
    }

    let results = futures::future::join_all(keys.iter().map(|key| store.delete(key))).await;

    let mut failed = 0;
    for (key, result) in keys.iter().zip(results) {
        if let Err(e) = result {
            failed += 1;
            tracing::warn!(key = %key, error = %e, "Compensating photo delete failed");
        }
    }

    tracing::info!(
        deleted = keys.len() - failed,
        failed,
        "Compensating photo deletes completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    fn photo(name: &str) -> PhotoFile {
        PhotoFile::new(name, "image/jpeg", name.as_bytes().to_vec())
    }

    fn uploader(store: Arc<MemoryBlobStore>, concurrency: usize) -> PhotoUploader {
        PhotoUploader::new(store, concurrency, 2, Duration::from_millis(1))
    }

    #[test]
    fn test_photo_key_format() {
        assert_eq!(
            photo_key(1_700_000_000_123, "front.jpg"),
            "properties/1700000000123-front.jpg"
        );
    }

    #[test]
    fn test_photo_key_strips_paths_and_unsafe_chars() {
        assert_eq!(
            photo_key(1, "C:\\Users\\me\\living room.png"),
            "properties/1-living-room.png"
        );
        assert_eq!(photo_key(1, "../../etc/"), "properties/1-photo");
    }

    #[test]
    fn test_key_millis_strictly_increase() {
        let stamps: Vec<i64> = (0..1000).map(|_| next_key_millis()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_same_file_name_in_one_batch_keeps_both_photos() {
        let store = Arc::new(MemoryBlobStore::new("mem://b"));
        let files = vec![
            PhotoFile::new("image.jpg", "image/jpeg", b"FRONT".to_vec()),
            PhotoFile::new("image.jpg", "image/jpeg", b"KITCHEN".to_vec()),
        ];

        let batch = uploader(store.clone(), 2).upload(files).await.unwrap();
        let keys = batch.keys().to_vec();
        let urls = batch.commit();

        assert_eq!(urls.len(), 2);
        assert_ne!(urls[0], urls[1]);
        assert_eq!(store.keys().await.len(), 2);
        assert_eq!(store.get(&keys[0]).await.unwrap().bytes, &b"FRONT"[..]);
        assert_eq!(store.get(&keys[1]).await.unwrap().bytes, &b"KITCHEN"[..]);
    }

    #[tokio::test]
    async fn test_discarding_one_batch_leaves_another_intact() {
        let store = Arc::new(MemoryBlobStore::new("mem://b"));
        let up = uploader(store.clone(), 2);

        let (kept, discarded) = tokio::join!(
            up.upload(vec![photo("image.jpg")]),
            up.upload(vec![photo("image.jpg")])
        );
        let kept = kept.unwrap();
        let kept_keys = kept.keys().to_vec();
        kept.commit();
        discarded.unwrap().discard().await;

        assert_eq!(store.keys().await, kept_keys);
    }

    #[tokio::test]
    async fn test_cancelled_discard_still_deletes_everything() {
        let store = Arc::new(
            MemoryBlobStore::new("mem://b").slow_deletes(Duration::from_millis(40)),
        );
        let batch = uploader(store.clone(), 2)
            .upload(vec![photo("a.jpg"), photo("b.jpg")])
            .await
            .unwrap();

        let result = tokio::time::timeout(Duration::from_millis(5), batch.discard()).await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_batch_is_valid() {
        let store = Arc::new(MemoryBlobStore::new("mem://b"));
        let batch = uploader(store.clone(), 4).upload(vec![]).await.unwrap();

        assert!(batch.is_empty());
        assert!(batch.commit().is_empty());
        assert_eq!(store.put_calls(), 0);
    }

    #[tokio::test]
    async fn test_urls_preserve_input_order_despite_completion_order() {
        let store = Arc::new(
            MemoryBlobStore::new("mem://b")
                .delayed_on("first.jpg", Duration::from_millis(60))
                .delayed_on("second.jpg", Duration::from_millis(30)),
        );
        let files = vec![photo("first.jpg"), photo("second.jpg"), photo("third.jpg")];

        let batch = uploader(store.clone(), 3).upload(files).await.unwrap();
        let urls = batch.commit();

        assert_eq!(urls.len(), 3);
        assert!(urls[0].ends_with("-first.jpg"));
        assert!(urls[1].ends_with("-second.jpg"));
        assert!(urls[2].ends_with("-third.jpg"));
        assert_eq!(store.keys().await.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrency_cap_of_one_still_uploads_everything() {
        let store = Arc::new(MemoryBlobStore::new("mem://b"));
        let files = (0..5).map(|i| photo(&format!("{}.jpg", i))).collect();

        let batch = uploader(store.clone(), 1).upload(files).await.unwrap();

        assert_eq!(batch.commit().len(), 5);
        assert_eq!(store.put_calls(), 5);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let store = Arc::new(MemoryBlobStore::new("mem://b").flaky_on("kitchen.jpg", 1));
        let files = vec![photo("kitchen.jpg"), photo("bath.jpg")];

        let batch = uploader(store.clone(), 2).upload(files).await.unwrap();

        assert_eq!(batch.commit().len(), 2);
        assert_eq!(store.put_calls(), 3);
    }

    #[tokio::test]
    async fn test_failure_deletes_whole_batch() {
        let store = Arc::new(
            MemoryBlobStore::new("mem://b")
                .failing_on("broken.jpg")
                .delayed_on("slow.jpg", Duration::from_millis(30)),
        );
        let files = vec![photo("ok.jpg"), photo("broken.jpg"), photo("slow.jpg")];

        let result = uploader(store.clone(), 3).upload(files).await;

        assert!(matches!(result, Err(AppError::UploadFailed(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_failure_stops_dispatching_new_uploads() {
        let store = Arc::new(MemoryBlobStore::new("mem://b").failing_on("0.jpg"));
        let files = (0..6).map(|i| photo(&format!("{}.jpg", i))).collect();

        let result = uploader(store.clone(), 1).upload(files).await;

        assert!(result.is_err());
        // Two attempts for the failing first file, nothing after it
        assert_eq!(store.put_calls(), 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_discard_deletes_committed_objects() {
        let store = Arc::new(MemoryBlobStore::new("mem://b"));
        let batch = uploader(store.clone(), 2)
            .upload(vec![photo("a.jpg"), photo("b.jpg")])
            .await
            .unwrap();
        assert_eq!(store.keys().await.len(), 2);

        batch.discard().await;

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_dropped_batch_cleans_up_in_background() {
        let store = Arc::new(MemoryBlobStore::new("mem://b"));
        let batch = uploader(store.clone(), 2)
            .upload(vec![photo("a.jpg")])
            .await
            .unwrap();

        drop(batch);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_cancelled_upload_removes_finished_objects() {
        let store = Arc::new(
            MemoryBlobStore::new("mem://b").delayed_on("slow.jpg", Duration::from_secs(5)),
        );
        let up = uploader(store.clone(), 2);
        let files = vec![photo("fast.jpg"), photo("slow.jpg")];

        let result =
            tokio::time::timeout(Duration::from_millis(50), up.upload(files)).await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_delete_is_not_propagated() {
        let store = Arc::new(MemoryBlobStore::new("mem://b").failing_deletes());
        let batch = uploader(store.clone(), 1)
            .upload(vec![photo("a.jpg")])
            .await
            .unwrap();

        batch.discard().await;

        assert_eq!(store.delete_calls(), 1);
        assert_eq!(store.keys().await.len(), 1);
    }
}
