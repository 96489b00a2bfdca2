use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, ObjectStore};
use sha2::{Digest, Sha256};

use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

/// Prefix under which content-addressed blobs are written.
const BLOB_PREFIX: &str = "blobs";

/// Content-addressed blob store.
///
/// Every artifact (document, converted text, chunk, serialized embedding) is
/// stored under the hex SHA-256 digest of its bytes, so identical bytes always
/// resolve to the identical content identifier and a re-upload is an
/// idempotent overwrite of identical content.
#[derive(Clone)]
pub struct ContentStore {
    store: DynStore,
}

impl ContentStore {
    /// Create a new ContentStore with the backend selected by configuration.
    pub async fn new(cfg: &AppConfig) -> object_store::Result<Self> {
        let store = create_storage_backend(cfg).await?;
        Ok(Self { store })
    }

    /// Create a ContentStore with a custom storage backend.
    ///
    /// Useful for testing scenarios where a specific backend is injected.
    pub fn with_backend(store: DynStore) -> Self {
        Self { store }
    }

    /// Derive the content identifier for a byte payload.
    pub fn cid_for(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    /// Store a blob and return its content identifier.
    ///
    /// A transport failure surfaces as an error and aborts the caller's
    /// current step; no retry is performed here.
    pub async fn put(&self, data: Bytes) -> object_store::Result<String> {
        let cid = Self::cid_for(&data);
        let path = ObjPath::from(format!("{BLOB_PREFIX}/{cid}"));
        let payload = object_store::PutPayload::from_bytes(data);
        self.store.put(&path, payload).await?;
        Ok(cid)
    }

    /// Retrieve a blob by content identifier.
    ///
    /// A miss returns `Ok(None)` and is a recompute signal, not an error.
    pub async fn fetch(&self, cid: &str) -> object_store::Result<Option<Bytes>> {
        let path = ObjPath::from(format!("{BLOB_PREFIX}/{cid}"));
        match self.store.get(&path).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Check whether a blob exists for the given content identifier.
    pub async fn exists(&self, cid: &str) -> object_store::Result<bool> {
        let path = ObjPath::from(format!("{BLOB_PREFIX}/{cid}"));
        self.store
            .head(&path)
            .await
            .map(|_| true)
            .or_else(|e| match e {
                object_store::Error::NotFound { .. } => Ok(false),
                _ => Err(e),
            })
    }
}

/// Create a storage backend based on configuration.
async fn create_storage_backend(cfg: &AppConfig) -> object_store::Result<DynStore> {
    match cfg.storage {
        StorageKind::Local => {
            let base = resolve_base_dir(cfg);
            if !base.exists() {
                tokio::fs::create_dir_all(&base).await.map_err(|e| {
                    object_store::Error::Generic {
                        store: "LocalFileSystem",
                        source: e.into(),
                    }
                })?;
            }
            let store = LocalFileSystem::new_with_prefix(base)?;
            Ok(Arc::new(store))
        }
        StorageKind::Memory => Ok(Arc::new(InMemory::new())),
    }
}

/// Resolve the absolute base directory used for local storage from config.
///
/// If `data_dir` is relative, it is resolved against the current working directory.
fn resolve_base_dir(cfg: &AppConfig) -> PathBuf {
    if cfg.data_dir.starts_with('/') {
        PathBuf::from(&cfg.data_dir)
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&cfg.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn memory_store() -> ContentStore {
        ContentStore::with_backend(Arc::new(InMemory::new()))
    }

    #[tokio::test]
    async fn identical_bytes_yield_identical_cids() {
        let store = memory_store();

        let first = store
            .put(Bytes::from_static(b"scientific document"))
            .await
            .expect("first put");
        let second = store
            .put(Bytes::from_static(b"scientific document"))
            .await
            .expect("second put");

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn differing_bytes_yield_differing_cids() {
        let store = memory_store();

        let first = store.put(Bytes::from_static(b"alpha")).await.expect("put");
        let second = store.put(Bytes::from_static(b"beta")).await.expect("put");

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn fetch_round_trips_content() {
        let store = memory_store();
        let data = b"converted markdown text";

        let cid = store.put(Bytes::from_static(data)).await.expect("put");
        let fetched = store.fetch(&cid).await.expect("fetch").expect("present");

        assert_eq!(fetched.as_ref(), data);
        assert!(store.exists(&cid).await.expect("exists"));
    }

    #[tokio::test]
    async fn fetch_miss_is_none_not_error() {
        let store = memory_store();

        let missing = store
            .fetch(&ContentStore::cid_for(b"never uploaded"))
            .await
            .expect("fetch should not error on miss");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn cid_is_hex_sha256() {
        // sha256("abc")
        assert_eq!(
            ContentStore::cid_for(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
