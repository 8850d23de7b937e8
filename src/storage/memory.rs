/// In-process object store
///
/// Backs the test suites and local runs without an object store. Failures and
/// latency can be injected per key suffix to exercise the uploader's retry,
/// ordering and compensation paths.
use bytes::Bytes;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    storage::BlobStore,
};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Default)]
pub struct MemoryBlobStore {
    public_url: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    always_fail: Vec<String>,
    fail_times: Mutex<HashMap<String, u32>>,
    delays: Vec<(String, Duration)>,
    fail_deletes: bool,
    delete_delay: Option<Duration>,
    put_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new(public_url: &str) -> Self {
        Self {
            public_url: public_url.trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    /// Every put for a key ending in `suffix` fails
    pub fn failing_on(mut self, suffix: &str) -> Self {
        self.always_fail.push(suffix.to_string());
        self
    }

    /// The first `times` puts for a key ending in `suffix` fail
    pub fn flaky_on(self, suffix: &str, times: u32) -> Self {
        if let Ok(mut fail_times) = self.fail_times.lock() {
            fail_times.insert(suffix.to_string(), times);
        }
        self
    }

    /// Puts for a key ending in `suffix` take `delay` before completing
    pub fn delayed_on(mut self, suffix: &str, delay: Duration) -> Self {
        self.delays.push((suffix.to_string(), delay));
        self
    }

    /// Deletes report failure (objects are kept)
    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    /// Every delete takes `delay` before completing
    pub fn slow_deletes(mut self, delay: Duration) -> Self {
        self.delete_delay = Some(delay);
        self
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn should_fail(&self, key: &str) -> bool {
        if self.always_fail.iter().any(|s| key.ends_with(s.as_str())) {
            return true;
        }
        let Ok(mut fail_times) = self.fail_times.lock() else {
            return false;
        };
        match fail_times.iter_mut().find(|(s, _)| key.ends_with(s.as_str())) {
            Some((_, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> AppResult<String> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);

        if let Some((_, delay)) = self.delays.iter().find(|(s, _)| key.ends_with(s.as_str())) {
            tokio::time::sleep(*delay).await;
        }

        if self.should_fail(key) {
            return Err(AppError::ExternalApi(format!(
                "Simulated storage failure for {}",
                key
            )));
        }

        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                bytes,
            },
        );

        Ok(format!("{}/{}", self.public_url, key))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delete_delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_deletes {
            return Err(AppError::ExternalApi(format!(
                "Simulated delete failure for {}",
                key
            )));
        }

        self.objects.write().await.remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
