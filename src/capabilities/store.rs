//! Durable storage: publishing stream segments and caching shared audio
//! assets, backed by any [`object_store::ObjectStore`].

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path as StorePath;
use object_store::{Attribute, ObjectStore, PutOptions, PutPayload};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::StorageConfig;
use crate::registry::{Capability, CapabilityError, NamedInputs};

/// Cloneable handle to the backing store plus the public URL scheme for
/// published keys.
#[derive(Clone)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    public_base_url: String,
}

impl ObjectStoreClient {
    pub fn new(store: Arc<dyn ObjectStore>, public_base_url: impl Into<String>) -> Self {
        Self {
            store,
            public_base_url: public_base_url.into(),
        }
    }

    /// S3-backed client; credentials and region come from the environment.
    pub fn from_config(config: &StorageConfig) -> Result<Self, CapabilityError> {
        let store = object_store::aws::AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .build()
            .map_err(|e| CapabilityError::Store {
                message: e.to_string(),
            })?;
        Ok(Self::new(Arc::new(store), config.public_base_url.clone()))
    }

    /// In-memory client, for tests and local development.
    pub fn in_memory(public_base_url: impl Into<String>) -> Self {
        Self::new(
            Arc::new(object_store::memory::InMemory::new()),
            public_base_url,
        )
    }

    /// Public URL under which an uploaded key is reachable.
    #[must_use]
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url.trim_end_matches('/'))
    }

    #[instrument(name = "store.put", skip(self, data), fields(key, size = data.len()))]
    pub async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), CapabilityError> {
        let mut opts = PutOptions::default();
        opts.attributes
            .insert(Attribute::ContentType, content_type.to_string().into());
        self.store
            .put_opts(&StorePath::from(key), PutPayload::from(data), opts)
            .await
            .map_err(|e| CapabilityError::Store {
                message: e.to_string(),
            })?;
        Ok(())
    }

    #[instrument(name = "store.get", skip(self), fields(key))]
    pub async fn get(&self, key: &str) -> Result<Bytes, CapabilityError> {
        let result = self
            .store
            .get(&StorePath::from(key))
            .await
            .map_err(|e| CapabilityError::Store {
                message: e.to_string(),
            })?;
        result.bytes().await.map_err(|e| CapabilityError::Store {
            message: e.to_string(),
        })
    }
}

impl std::fmt::Debug for ObjectStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreClient")
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

fn content_type_for(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("ts") => "video/mp2t",
        Some("mp3") => "audio/mpeg",
        Some("aac") => "audio/aac",
        _ => "application/octet-stream",
    }
}

/// `store.upload_dir`: publish every file in a directory under a remote
/// prefix.
///
/// Inputs: `dir`, `prefix`. Output: `{"uploads": [{key, url}]}`, sorted
/// by filename for deterministic manifests.
pub struct StoreUploadDir {
    client: ObjectStoreClient,
}

impl StoreUploadDir {
    pub fn new(client: ObjectStoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Capability for StoreUploadDir {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let dir = inputs.require_str("dir")?;
        let prefix = inputs.require_str("prefix")?;

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort_unstable();

        let mut uploads = Vec::with_capacity(names.len());
        for name in names {
            let bytes = Bytes::from(tokio::fs::read(Path::new(dir).join(&name)).await?);
            let key = format!("{}/{name}", prefix.trim_end_matches('/'));
            self.client.put(&key, bytes, content_type_for(&name)).await?;
            uploads.push(json!({"key": key, "url": self.client.url_for(&key)}));
        }
        debug!(dir, prefix, count = uploads.len(), "directory uploaded");
        Ok(json!({"uploads": uploads}))
    }
}

/// `store.fetch_asset`: download a shared asset into a local cache
/// directory, skipping the download when the file is already present.
///
/// Concurrent fetches of the same asset race benignly: each writes a
/// unique temp file and atomically renames it onto the cache path, so the
/// path only ever holds complete bytes (last writer wins).
///
/// Inputs: `asset` (remote key), `dir`. Output: `{"path": ...}`.
pub struct StoreFetchAsset {
    client: ObjectStoreClient,
}

impl StoreFetchAsset {
    pub fn new(client: ObjectStoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Capability for StoreFetchAsset {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let asset = inputs.require_str("asset")?;
        let dir = inputs.require_str("dir")?;

        let filename = Path::new(asset)
            .file_name()
            .ok_or_else(|| CapabilityError::MissingInput {
                what: format!("asset (no filename in {asset})"),
            })?;
        let local = Path::new(dir).join(filename);
        if tokio::fs::try_exists(&local).await? {
            debug!(asset, path = %local.display(), "asset cache hit");
            return Ok(json!({"path": local.to_string_lossy()}));
        }

        tokio::fs::create_dir_all(dir).await?;
        let bytes = self.client.get(asset).await?;
        let temp = local.with_extension(format!("part-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &local).await?;
        debug!(asset, path = %local.display(), size = bytes.len(), "asset downloaded");
        Ok(json!({"path": local.to_string_lossy()}))
    }
}
