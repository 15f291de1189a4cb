//! Snapshot persistence.
//!
//! The directory's node list is saved as a JSON array of registration
//! descriptors under a fixed key in a [`SnapshotStore`], and rebuilt after a
//! restart by replaying that array through registration. Saves are
//! best-effort: nodes that come and go between two saves are lost on crash.
//!
//! No save happens before the startup restore has finished. Until then the
//! directory only holds part of the stored list, and writing it back would
//! drop descriptors that were never even checked.

use async_trait::async_trait;
use parking_lot::Mutex;
use s2s_common::{RegistrationDescriptor, Result, S2sError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::directory::{Directory, RestoreReport};

/// Key the snapshot is stored under.
pub const SNAPSHOT_KEY: &str = "rpcNodes";

/// Snapshot persistence configuration.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub key: String,
    /// Time between two background saves
    pub interval: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            key: SNAPSHOT_KEY.to_string(),
            interval: Duration::from_secs(600),
        }
    }
}

/// Opaque blob storage keyed by name.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns `None` if nothing was stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// In-process store, mostly for tests and single-run setups.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// One file per key inside a directory.
///
/// Writes go to a temp file that is then renamed over the target, so a
/// crash mid-write leaves the previous snapshot intact.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, value).await?;
        tokio::fs::rename(&temp_path, &path).await?;
        Ok(())
    }
}

/// Serializes the directory's current nodes and stores them under `key`.
///
/// Returns the number of descriptors written.
pub async fn save_snapshot(
    directory: &Directory,
    store: &dyn SnapshotStore,
    key: &str,
) -> Result<usize> {
    let descriptors = directory.snapshot();
    let bytes = serde_json::to_vec(&descriptors)?;
    store
        .set(key, &bytes)
        .await
        .map_err(|e| S2sError::Persistence(format!("Failed to save {}: {}", key, e)))?;
    debug!("Saved {} descriptor(s) under {}", descriptors.len(), key);
    Ok(descriptors.len())
}

/// Loads the descriptors stored under `key`; empty if there are none.
pub async fn load_snapshot(
    store: &dyn SnapshotStore,
    key: &str,
) -> Result<Vec<RegistrationDescriptor>> {
    let bytes = store
        .get(key)
        .await
        .map_err(|e| S2sError::Persistence(format!("Failed to load {}: {}", key, e)))?;
    match bytes {
        Some(bytes) if !bytes.is_empty() => Ok(serde_json::from_slice(&bytes)?),
        _ => Ok(Vec::new()),
    }
}

/// Loads the snapshot and replays it into `directory`.
pub async fn restore_snapshot(
    directory: &Directory,
    store: &dyn SnapshotStore,
    key: &str,
) -> Result<RestoreReport> {
    let descriptors = load_snapshot(store, key).await?;
    if descriptors.is_empty() {
        info!("No snapshot under {}, starting empty", key);
        return Ok(RestoreReport::default());
    }
    info!("Restoring {} descriptor(s) from {}", descriptors.len(), key);
    Ok(directory.restore(descriptors).await)
}

/// Restores the directory from its store, then saves it periodically.
///
/// Both run in one background task, so a periodic save never overlaps the
/// restore. Use the returned [`SnapshotHandle`] for the final save on
/// shutdown.
pub struct SnapshotTask {
    directory: Arc<Directory>,
    store: Arc<dyn SnapshotStore>,
    config: SnapshotConfig,
}

impl SnapshotTask {
    pub fn new(
        directory: Arc<Directory>,
        store: Arc<dyn SnapshotStore>,
        config: SnapshotConfig,
    ) -> Self {
        Self {
            directory,
            store,
            config,
        }
    }

    /// Starts the restore and the periodic saves as a background task.
    pub fn spawn(self) -> SnapshotHandle {
        let restored = Arc::new(AtomicBool::new(false));
        let directory = Arc::clone(&self.directory);
        let store = Arc::clone(&self.store);
        let key = self.config.key.clone();
        let task = tokio::spawn(self.run(Arc::clone(&restored)));
        SnapshotHandle {
            task,
            restored,
            directory,
            store,
            key,
        }
    }

    async fn run(self, restored: Arc<AtomicBool>) {
        match restore_snapshot(&self.directory, self.store.as_ref(), &self.config.key).await {
            Ok(report) => debug!("Startup restore done: {:?}", report),
            // Nothing readable to protect; later saves replace it
            Err(e) => error!("Snapshot restore failed: {}", e),
        }
        restored.store(true, Ordering::Release);

        let mut interval = tokio::time::interval(self.config.interval);
        // The first tick completes immediately; save only after a full period
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) =
                save_snapshot(&self.directory, self.store.as_ref(), &self.config.key).await
            {
                warn!("Snapshot save failed: {}", e);
            }
        }
    }
}

/// Handle to a running [`SnapshotTask`].
pub struct SnapshotHandle {
    task: JoinHandle<()>,
    restored: Arc<AtomicBool>,
    directory: Arc<Directory>,
    store: Arc<dyn SnapshotStore>,
    key: String,
}

impl SnapshotHandle {
    /// `true` once the startup restore has finished, successfully or not.
    pub fn is_restored(&self) -> bool {
        self.restored.load(Ordering::Acquire)
    }

    /// Stops the background task and writes a final snapshot.
    ///
    /// # Returns
    /// - `Ok(Some(n))` - `n` descriptors were saved
    /// - `Ok(None)` - The restore was still running; it was cancelled and the
    ///   stored snapshot left as it was
    /// - `Err(S2sError)` - The final save failed
    pub async fn shutdown(mut self) -> Result<Option<usize>> {
        self.task.abort();
        // Wait for the task to stop so no save races the final one
        let _ = (&mut self.task).await;

        if !self.is_restored() {
            warn!("Restore still running at shutdown, keeping the stored snapshot");
            return Ok(None);
        }
        save_snapshot(&self.directory, self.store.as_ref(), &self.key)
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLiveness;
    use s2s_common::auth::{sign, SharedSecret};

    const SECRET: &str = "snapshot-secret";

    fn directory() -> (Arc<Directory>, Arc<ScriptedLiveness>) {
        let liveness = Arc::new(ScriptedLiveness::new());
        let dir = Arc::new(Directory::new(SharedSecret::new(SECRET), liveness.clone()));
        (dir, liveness)
    }

    fn descriptor(name: &str, url: &str) -> RegistrationDescriptor {
        let token = sign(&SharedSecret::new(SECRET), name, url);
        RegistrationDescriptor::new(name, url, "tag", token)
    }

    #[test]
    fn test_snapshot_config_default() {
        let config = SnapshotConfig::default();
        assert_eq!(config.key, "rpcNodes");
        assert_eq!(config.interval, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("k").await.unwrap().is_none());
        store.set("k", b"v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some(&b"v"[..]));
    }

    #[tokio::test]
    async fn test_file_store_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        assert!(store.get(SNAPSHOT_KEY).await.unwrap().is_none());
        store.set(SNAPSHOT_KEY, b"first").await.unwrap();
        store.set(SNAPSHOT_KEY, b"second").await.unwrap();

        assert_eq!(
            store.get(SNAPSHOT_KEY).await.unwrap().as_deref(),
            Some(&b"second"[..])
        );
        assert!(!dir.path().join("nested/rpcNodes.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_then_restore_into_fresh_directory() {
        let (dir, _) = directory();
        dir.register(&descriptor("exec", "b:2")).await.unwrap();
        dir.register(&descriptor("exec", "a:1")).await.unwrap();

        let store = MemoryStore::new();
        assert_eq!(save_snapshot(&dir, &store, SNAPSHOT_KEY).await.unwrap(), 2);

        let (fresh, _) = directory();
        let report = restore_snapshot(&fresh, &store, SNAPSHOT_KEY).await.unwrap();
        assert_eq!(report, RestoreReport { restored: 2, rejected: 0 });

        let urls: Vec<_> = fresh.overview()[0].members.iter().map(|m| m.url.clone()).collect();
        assert_eq!(urls, vec!["b:2", "a:1"]);
    }

    #[tokio::test]
    async fn test_restore_skips_unreachable_nodes() {
        let (dir, _) = directory();
        dir.register(&descriptor("exec", "a:1")).await.unwrap();
        dir.register(&descriptor("exec", "b:2")).await.unwrap();
        let store = MemoryStore::new();
        save_snapshot(&dir, &store, SNAPSHOT_KEY).await.unwrap();

        let (fresh, liveness) = directory();
        liveness.set_healthy("a:1", false);
        let report = restore_snapshot(&fresh, &store, SNAPSHOT_KEY).await.unwrap();

        assert_eq!(report, RestoreReport { restored: 1, rejected: 1 });
        assert_eq!(fresh.select("exec").unwrap().addr(), "b:2");
    }

    #[tokio::test]
    async fn test_restore_from_other_secret_admits_nothing() {
        let (dir, _) = directory();
        dir.register(&descriptor("exec", "a:1")).await.unwrap();
        let store = MemoryStore::new();
        save_snapshot(&dir, &store, SNAPSHOT_KEY).await.unwrap();

        let other = Directory::new(SharedSecret::new("rotated"), Arc::new(ScriptedLiveness::new()));
        let report = restore_snapshot(&other, &store, SNAPSHOT_KEY).await.unwrap();
        assert_eq!(report, RestoreReport { restored: 0, rejected: 1 });
        assert!(other.service_names().is_empty());
    }

    #[tokio::test]
    async fn test_restore_missing_key_is_empty() {
        let (dir, _) = directory();
        let report = restore_snapshot(&dir, &MemoryStore::new(), SNAPSHOT_KEY).await.unwrap();
        assert_eq!(report, RestoreReport::default());
    }

    #[tokio::test]
    async fn test_restore_corrupt_snapshot_fails() {
        let (dir, _) = directory();
        let store = MemoryStore::new();
        store.set(SNAPSHOT_KEY, b"not json").await.unwrap();

        let result = restore_snapshot(&dir, &store, SNAPSHOT_KEY).await;
        assert!(matches!(result, Err(S2sError::JsonSerialization(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_task_saves_periodically() {
        let (dir, _) = directory();
        dir.register(&descriptor("exec", "a:1")).await.unwrap();
        let store = Arc::new(MemoryStore::new());

        let config = SnapshotConfig {
            key: SNAPSHOT_KEY.to_string(),
            interval: Duration::from_secs(60),
        };
        let handle = SnapshotTask::new(dir.clone(), store.clone(), config).spawn();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(handle.is_restored());
        assert!(store.get(SNAPSHOT_KEY).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_secs(31)).await;
        let saved = load_snapshot(store.as_ref(), SNAPSHOT_KEY).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].url, "a:1");

        assert_eq!(handle.shutdown().await.unwrap(), Some(1));
    }

    async fn store_with(urls: &[&str]) -> Arc<MemoryStore> {
        let descriptors: Vec<_> = urls.iter().map(|url| descriptor("exec", url)).collect();
        let store = Arc::new(MemoryStore::new());
        store
            .set(SNAPSHOT_KEY, &serde_json::to_vec(&descriptors).unwrap())
            .await
            .unwrap();
        store
    }

    fn slow_directory() -> Arc<Directory> {
        let liveness = Arc::new(ScriptedLiveness::with_delay(Duration::from_millis(100)));
        Arc::new(Directory::new(SharedSecret::new(SECRET), liveness))
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_restore_keeps_stored_snapshot() {
        let urls = ["a:1", "b:2", "c:3", "d:4", "e:5"];
        let store = store_with(&urls).await;
        let dir = slow_directory();

        let handle = SnapshotTask::new(dir.clone(), store.clone(), SnapshotConfig::default()).spawn();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!handle.is_restored());
        assert_eq!(dir.service("exec").unwrap().len(), 1);

        assert_eq!(handle.shutdown().await.unwrap(), None);
        let stored = load_snapshot(store.as_ref(), SNAPSHOT_KEY).await.unwrap();
        let stored: Vec<_> = stored.iter().map(|d| d.url.as_str()).collect();
        assert_eq!(stored, urls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_after_restore_saves() {
        let store = store_with(&["a:1", "b:2", "c:3"]).await;
        let dir = slow_directory();

        let handle = SnapshotTask::new(dir.clone(), store.clone(), SnapshotConfig::default()).spawn();
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(handle.is_restored());

        dir.register(&descriptor("exec", "d:4")).await.unwrap();
        assert_eq!(handle.shutdown().await.unwrap(), Some(4));
        assert_eq!(load_snapshot(store.as_ref(), SNAPSHOT_KEY).await.unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_save_waits_for_restore() {
        let store = store_with(&["a:1", "b:2", "c:3"]).await;
        let dir = slow_directory();
        let config = SnapshotConfig {
            key: SNAPSHOT_KEY.to_string(),
            interval: Duration::from_millis(50),
        };

        let handle = SnapshotTask::new(dir.clone(), store.clone(), config).spawn();
        // Several intervals pass while the restore is still checking nodes
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!handle.is_restored());
        assert_eq!(load_snapshot(store.as_ref(), SNAPSHOT_KEY).await.unwrap().len(), 3);

        handle.shutdown().await.unwrap();
    }
}
