//! Asset resolver: serves an artifact if it exists, otherwise rebuilds a
//! derived artifact from the original exactly when it is requested.
//!
//! A fetch is driven through `ResolveState`:
//!
//! ```text
//! Lookup -> HaveArtifact -> Done
//!        \-> NeedOriginal -> Deriving -> Done
//!                         \           \-> Failed
//!                          \-> Failed (SourceMissing)
//! ```
//!
//! Misses are serialized per `(key, kind)` so a burst of requests for the same
//! missing thumbnail decodes the original once. Correctness does not depend on
//! this: derivation is deterministic and store writes are atomic.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

use crate::error::AppError;
use crate::services::derivative::DerivativePolicy;
use crate::storage::{ArtifactKind, AssetStore, ResourceKey};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Nothing to serve and nothing to rebuild from
    #[error("Source image is missing")]
    SourceMissing,

    #[error("Regeneration failed: {0}")]
    RegenerationFailed(String),

    #[error("Storage unavailable: {0}")]
    Storage(String),
}

#[derive(Debug)]
enum ResolveState {
    Lookup,
    HaveArtifact,
    NeedOriginal,
    Deriving(Bytes),
    Failed(ResolveError),
    Done(Bytes),
}

impl ResolveState {
    fn name(&self) -> &'static str {
        match self {
            ResolveState::Lookup => "lookup",
            ResolveState::HaveArtifact => "have-artifact",
            ResolveState::NeedOriginal => "need-original",
            ResolveState::Deriving(_) => "deriving",
            ResolveState::Failed(_) => "failed",
            ResolveState::Done(_) => "done",
        }
    }

    fn into_result(self) -> Result<Bytes, ResolveError> {
        match self {
            ResolveState::Done(bytes) => Ok(bytes),
            ResolveState::Failed(err) => Err(err),
            other => Err(ResolveError::RegenerationFailed(format!(
                "resolver halted in state {}",
                other.name()
            ))),
        }
    }
}

fn storage_error(err: AppError) -> ResolveError {
    ResolveError::Storage(err.to_string())
}

type FlightKey = (ResourceKey, ArtifactKind);
type FlightMap = DashMap<FlightKey, Arc<Mutex<()>>>;

/// Share of one per-artifact lock. Dropping the last handle removes the map
/// entry, including when the owning fetch is cancelled mid-wait.
struct FlightHandle<'a> {
    map: &'a FlightMap,
    key: FlightKey,
    lock: Arc<Mutex<()>>,
}

impl<'a> FlightHandle<'a> {
    fn acquire(map: &'a FlightMap, key: FlightKey) -> Self {
        let lock = map
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self { map, key, lock }
    }
}

impl Drop for FlightHandle<'_> {
    fn drop(&mut self) {
        // The map and this handle hold the only two references
        self.map
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 2);
    }
}

pub struct AssetResolver {
    store: AssetStore,
    policy: DerivativePolicy,
    workers: Arc<Semaphore>,
    in_flight: FlightMap,
}

impl AssetResolver {
    pub fn new(store: AssetStore, policy: DerivativePolicy, workers: usize) -> Self {
        Self {
            store,
            policy,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            in_flight: DashMap::new(),
        }
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// Bytes of the requested artifact, regenerating a missing derivative
    pub async fn fetch(&self, key: &ResourceKey, kind: ArtifactKind) -> Result<Bytes, ResolveError> {
        if !kind.is_derived() {
            return match self.store.read(key, kind).await {
                Ok(bytes) => Ok(bytes),
                Err(AppError::NotFound(_)) => Err(ResolveError::SourceMissing),
                Err(e) => Err(storage_error(e)),
            };
        }

        let state = self.drive(key, kind, ResolveState::Lookup, true).await;
        if !matches!(state, ResolveState::NeedOriginal) {
            if matches!(state, ResolveState::Done(_)) {
                tracing::debug!("Serving existing {} for {}", kind, key);
            }
            return state.into_result();
        }

        let flight = FlightHandle::acquire(&self.in_flight, (key.clone(), kind));
        let state = {
            let _guard = flight.lock.lock().await;
            // Another caller may have produced the artifact while we waited
            self.drive(key, kind, ResolveState::Lookup, false).await
        };
        drop(flight);

        state.into_result()
    }

    /// Produce both derivatives for a freshly stored original. Failures are
    /// logged; the next fetch retries them.
    pub async fn warm(&self, key: &ResourceKey) {
        for kind in [ArtifactKind::Thumbnail, ArtifactKind::Compressed] {
            if let Err(e) = self.fetch(key, kind).await {
                tracing::warn!("Failed to pre-generate {} for {}: {}", kind, key, e);
            }
        }
    }

    /// Number of artifacts with a regeneration lock currently held or awaited
    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    async fn drive(
        &self,
        key: &ResourceKey,
        kind: ArtifactKind,
        mut state: ResolveState,
        stop_on_miss: bool,
    ) -> ResolveState {
        loop {
            match state {
                ResolveState::Done(_) | ResolveState::Failed(_) => return state,
                ResolveState::NeedOriginal if stop_on_miss => return state,
                current => state = self.advance(key, kind, current).await,
            }
        }
    }

    async fn advance(&self, key: &ResourceKey, kind: ArtifactKind, state: ResolveState) -> ResolveState {
        match state {
            ResolveState::Lookup => match self.store.exists(key, kind).await {
                Ok(true) => ResolveState::HaveArtifact,
                Ok(false) => ResolveState::NeedOriginal,
                Err(e) => ResolveState::Failed(storage_error(e)),
            },
            ResolveState::HaveArtifact => match self.store.read(key, kind).await {
                Ok(bytes) => ResolveState::Done(bytes),
                // Deleted between the existence check and the read
                Err(AppError::NotFound(_)) => ResolveState::NeedOriginal,
                Err(e) => ResolveState::Failed(storage_error(e)),
            },
            ResolveState::NeedOriginal => {
                match self.store.exists(key, ArtifactKind::Original).await {
                    Ok(false) => {
                        tracing::info!("Cannot regenerate {} for {}: original missing", kind, key);
                        return ResolveState::Failed(ResolveError::SourceMissing);
                    }
                    Ok(true) => {}
                    Err(e) => return ResolveState::Failed(storage_error(e)),
                }
                match self.store.read(key, ArtifactKind::Original).await {
                    Ok(source) => ResolveState::Deriving(source),
                    Err(AppError::NotFound(_)) => ResolveState::Failed(ResolveError::SourceMissing),
                    Err(e) => ResolveState::Failed(storage_error(e)),
                }
            }
            ResolveState::Deriving(source) => self.derive_and_store(key, kind, source).await,
            terminal => terminal,
        }
    }

    async fn derive_and_store(&self, key: &ResourceKey, kind: ArtifactKind, source: Bytes) -> ResolveState {
        let permit = match self.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return ResolveState::Failed(ResolveError::RegenerationFailed(
                    "worker pool closed".to_string(),
                ))
            }
        };

        tracing::info!("Regenerating {} for {}", kind, key);
        let policy = self.policy;
        let derived = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            policy.derive(kind, &source)
        })
        .await;

        let derived = match derived {
            Ok(Ok(derived)) => derived,
            Ok(Err(e)) => {
                tracing::warn!("Failed to derive {} for {}: {}", kind, key, e);
                return ResolveState::Failed(ResolveError::RegenerationFailed(e.to_string()));
            }
            Err(e) => {
                tracing::error!("Derivation task for {} {} aborted: {}", kind, key, e);
                return ResolveState::Failed(ResolveError::RegenerationFailed(format!(
                    "derivation task aborted: {}",
                    e
                )));
            }
        };

        if let Err(e) = self.store.write(key, kind, derived.bytes.clone()).await {
            tracing::error!("Failed to store {} for {}: {}", kind, key, e);
            return ResolveState::Failed(ResolveError::RegenerationFailed(e.to_string()));
        }

        match self.store.exists(key, kind).await {
            Ok(true) => {
                tracing::debug!(
                    "Stored {} for {} ({}x{} q{}, {} bytes)",
                    derived.kind,
                    key,
                    derived.width,
                    derived.height,
                    derived.quality,
                    derived.bytes.len()
                );
                ResolveState::Done(derived.bytes)
            }
            Ok(false) => {
                tracing::error!("{} for {} missing right after a successful write", kind, key);
                ResolveState::Failed(ResolveError::RegenerationFailed(
                    "artifact not visible after write".to_string(),
                ))
            }
            Err(e) => ResolveState::Failed(storage_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::derivative::tests::solid_png;
    use crate::storage::memory::MemoryStorage;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (Arc<MemoryStorage>, AssetResolver, ResourceKey) {
        let memory = Arc::new(MemoryStorage::new());
        let store = AssetStore::new(memory.clone());
        let resolver = AssetResolver::new(store, DerivativePolicy::default(), 2);
        let key = ResourceKey::new(1, "photo.png").unwrap();
        (memory, resolver, key)
    }

    #[tokio::test]
    async fn original_is_served_verbatim() {
        let (memory, resolver, key) = setup();
        memory.insert("original/photo.png", Bytes::from_static(b"raw bytes"));

        let bytes = resolver.fetch(&key, ArtifactKind::Original).await.unwrap();
        assert_eq!(bytes, "raw bytes");
    }

    #[tokio::test]
    async fn missing_original_is_source_missing() {
        let (_memory, resolver, key) = setup();
        assert!(matches!(
            resolver.fetch(&key, ArtifactKind::Original).await,
            Err(ResolveError::SourceMissing)
        ));
    }

    #[tokio::test]
    async fn existing_derivative_is_not_rebuilt() {
        let (memory, resolver, key) = setup();
        memory.insert("original/photo.png", solid_png(10, 10, [0, 0, 0]));
        memory.insert("thumbnail/photo.png", Bytes::from_static(b"cached thumb"));

        let bytes = resolver.fetch(&key, ArtifactKind::Thumbnail).await.unwrap();
        assert_eq!(bytes, "cached thumb");
        assert_eq!(memory.puts(), 0);
    }

    #[tokio::test]
    async fn missing_derivative_is_regenerated_once() {
        let (memory, resolver, key) = setup();
        memory.insert("original/photo.png", solid_png(400, 300, [200, 10, 10]));

        let first = resolver.fetch(&key, ArtifactKind::Thumbnail).await.unwrap();
        let second = resolver.fetch(&key, ArtifactKind::Thumbnail).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(memory.puts(), 1);
        assert_eq!(
            memory.paths(),
            vec!["original/photo.png".to_string(), "thumbnail/photo.png".to_string()]
        );
        let decoded = image::load_from_memory(&first).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (250, 250));
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test]
    async fn orphaned_derivative_request_creates_nothing() {
        let (memory, resolver, key) = setup();

        assert!(matches!(
            resolver.fetch(&key, ArtifactKind::Thumbnail).await,
            Err(ResolveError::SourceMissing)
        ));
        assert!(memory.paths().is_empty());
        assert_eq!(memory.puts(), 0);
    }

    #[tokio::test]
    async fn corrupt_original_fails_without_writing() {
        let (memory, resolver, key) = setup();
        memory.insert("original/photo.png", Bytes::from_static(b"not an image"));

        assert!(matches!(
            resolver.fetch(&key, ArtifactKind::Compressed).await,
            Err(ResolveError::RegenerationFailed(_))
        ));
        assert_eq!(memory.paths(), vec!["original/photo.png".to_string()]);
        assert_eq!(memory.puts(), 0);
    }

    #[tokio::test]
    async fn write_failure_leaves_store_untouched() {
        let (memory, resolver, key) = setup();
        memory.insert("original/photo.png", solid_png(20, 20, [1, 2, 3]));
        memory.fail_puts.store(true, Ordering::SeqCst);

        assert!(matches!(
            resolver.fetch(&key, ArtifactKind::Thumbnail).await,
            Err(ResolveError::RegenerationFailed(_))
        ));
        assert_eq!(memory.paths(), vec!["original/photo.png".to_string()]);

        // Recovers once storage does
        memory.fail_puts.store(false, Ordering::SeqCst);
        assert!(resolver.fetch(&key, ArtifactKind::Thumbnail).await.is_ok());
    }

    #[tokio::test]
    async fn silently_dropped_write_is_detected() {
        let (memory, resolver, key) = setup();
        memory.insert("original/photo.png", solid_png(20, 20, [1, 2, 3]));
        memory.swallow_puts.store(true, Ordering::SeqCst);

        assert!(matches!(
            resolver.fetch(&key, ArtifactKind::Compressed).await,
            Err(ResolveError::RegenerationFailed(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_derive_once() {
        let (memory, resolver, key) = setup();
        memory.insert("original/photo.png", solid_png(640, 480, [5, 100, 200]));
        let resolver = Arc::new(resolver);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let resolver = resolver.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                resolver.fetch(&key, ArtifactKind::Thumbnail).await.unwrap()
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(memory.puts(), 1);
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test]
    async fn abandoned_fetch_releases_its_lock_entry() {
        let (memory, resolver, key) = setup();
        memory.insert("original/photo.png", solid_png(64, 64, [7, 7, 7]));

        let holder = FlightHandle::acquire(&resolver.in_flight, (key.clone(), ArtifactKind::Thumbnail));
        let held = holder.lock.lock().await;

        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            resolver.fetch(&key, ArtifactKind::Thumbnail),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(resolver.in_flight(), 1);

        drop(held);
        drop(holder);
        assert_eq!(resolver.in_flight(), 0);
        assert_eq!(memory.puts(), 0);

        // The next request regenerates normally
        assert!(resolver.fetch(&key, ArtifactKind::Thumbnail).await.is_ok());
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test]
    async fn regenerates_onto_local_disk() {
        let dir = TempDir::new().unwrap();
        let resolver = AssetResolver::new(AssetStore::local(dir.path()), DerivativePolicy::default(), 1);
        let key = ResourceKey::new(3, "big.png").unwrap();
        resolver
            .store()
            .write(&key, ArtifactKind::Original, Bytes::from(solid_png(3000, 2000, [9, 9, 9])))
            .await
            .unwrap();

        let bytes = resolver.fetch(&key, ArtifactKind::Compressed).await.unwrap();
        let on_disk = std::fs::read(dir.path().join("compressed/big.png")).unwrap();
        assert_eq!(bytes.as_ref(), on_disk.as_slice());

        let decoded = image::load_from_memory(&on_disk).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1200, 800));
    }

    #[tokio::test]
    async fn warm_builds_both_derivatives() {
        let (memory, resolver, key) = setup();
        memory.insert("original/photo.png", solid_png(64, 48, [0, 0, 0]));

        resolver.warm(&key).await;
        assert_eq!(
            memory.paths(),
            vec![
                "compressed/photo.png".to_string(),
                "original/photo.png".to_string(),
                "thumbnail/photo.png".to_string(),
            ]
        );
    }
}
