//! Uniform addressing and transfer for local files and object-store objects.

mod address;
mod format;
pub mod template;

pub use address::{ResourceAddress, Scheme};
pub use format::{DocumentFormat, parse_document, parse_single};

use crate::{QuiltError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAttributes {
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Loads and stores resources addressed by [`ResourceAddress`].
///
/// Object stores are resolved per container. Stores registered with
/// [`ResourceLocator::register_store`] win; otherwise an S3 store is built from
/// the process environment on first use and cached.
#[derive(Debug, Clone, Default)]
pub struct ResourceLocator {
    region: Option<String>,
    stores: Arc<RwLock<HashMap<String, Arc<dyn ObjectStore>>>>,
}

impl ResourceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        let region = region.into();
        self.region = if region.trim().is_empty() {
            None
        } else {
            Some(region)
        };
        self
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub async fn register_store(&self, container: impl Into<String>, store: Arc<dyn ObjectStore>) {
        self.stores.write().await.insert(container.into(), store);
    }

    async fn store_for(&self, container: &str) -> Result<Arc<dyn ObjectStore>> {
        if let Some(store) = self.stores.read().await.get(container) {
            return Ok(store.clone());
        }

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(container);
        if let Some(region) = &self.region {
            builder = builder.with_region(region);
        }
        let store: Arc<dyn ObjectStore> = Arc::new(builder.build().map_err(|error| {
            QuiltError::Config(format!(
                "failed to build object store for '{}': {}",
                container, error
            ))
        })?);

        let mut stores = self.stores.write().await;
        let store = stores
            .entry(container.to_string())
            .or_insert(store)
            .clone();
        tracing::debug!("Built object store for container {}", container);
        Ok(store)
    }

    pub async fn load(&self, address: &ResourceAddress) -> Result<Bytes> {
        match address.scheme() {
            Scheme::File => match fs::read(address.key()).await {
                Ok(data) => Ok(Bytes::from(data)),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                    Err(QuiltError::NotFound(address.to_uri()))
                }
                Err(error) => Err(QuiltError::transfer(address.to_uri(), error)),
            },
            Scheme::ObjectStore => {
                let uri = address.to_uri();
                let store = self.store_for(address.container()).await?;
                let result = store
                    .get(&ObjectPath::from(address.key()))
                    .await
                    .map_err(|error| QuiltError::from_object_store(&uri, error))?;
                result
                    .bytes()
                    .await
                    .map_err(|error| QuiltError::from_object_store(&uri, error))
            }
        }
    }

    /// Loads a document and narrows it to a single record.
    pub async fn load_and_parse(&self, address: &ResourceAddress) -> Result<Value> {
        parse_single(self.load_document(address).await?)
    }

    /// Loads a document, substituting the address context, without narrowing.
    pub async fn load_document(&self, address: &ResourceAddress) -> Result<Value> {
        let format = DocumentFormat::from_extension(address.extension())?;
        let raw = self.load(address).await?;
        parse_document(&raw, format, address.substitution_context())
    }

    pub async fn save(&self, address: &ResourceAddress, contents: impl Into<Bytes>) -> Result<()> {
        let contents = contents.into();
        let size = contents.len();

        match address.scheme() {
            Scheme::File => {
                let path = Path::new(address.key());
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent).await?;
                    }
                }

                // Write to a uniquely named sibling, then rename over the target.
                let temp_path = format!("{}.{}.tmp", address.key(), Ulid::new());
                let written = async {
                    let mut file = fs::File::create(&temp_path).await?;
                    file.write_all(&contents).await?;
                    file.sync_all().await?;
                    drop(file);
                    fs::rename(&temp_path, path).await?;
                    Ok::<(), std::io::Error>(())
                }
                .await;
                if let Err(error) = written {
                    let _ = fs::remove_file(&temp_path).await;
                    return Err(error.into());
                }
            }
            Scheme::ObjectStore => {
                let uri = address.to_uri();
                let store = self.store_for(address.container()).await?;
                store
                    .put(&ObjectPath::from(address.key()), PutPayload::from(contents))
                    .await
                    .map_err(|error| QuiltError::from_object_store(&uri, error))?;
            }
        }

        tracing::debug!("Saved {} bytes to {}", size, address);
        Ok(())
    }

    pub async fn delete(&self, address: &ResourceAddress) -> Result<()> {
        match address.scheme() {
            Scheme::File => match fs::remove_file(address.key()).await {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                    return Err(QuiltError::NotFound(address.to_uri()));
                }
                Err(error) => return Err(error.into()),
            },
            Scheme::ObjectStore => {
                let uri = address.to_uri();
                let store = self.store_for(address.container()).await?;
                store
                    .delete(&ObjectPath::from(address.key()))
                    .await
                    .map_err(|error| QuiltError::from_object_store(&uri, error))?;
            }
        }

        tracing::info!("Deleted {}", address);
        Ok(())
    }

    /// Lists objects whose key starts with the address key and ends with `suffix`.
    pub async fn list_by_suffix(
        &self,
        address: &ResourceAddress,
        suffix: &str,
    ) -> Result<Vec<ResourceAddress>> {
        if address.is_file() {
            return Err(QuiltError::UnsupportedScheme(format!(
                "listing is only supported for object stores, not '{}'",
                address.to_uri()
            )));
        }

        let uri = address.to_uri();
        let store = self.store_for(address.container()).await?;

        // Object store prefixes match whole path segments, so list the
        // enclosing directory and filter on the raw key prefix.
        let directory = match address.key().rsplit_once('/') {
            Some((directory, _)) if !directory.is_empty() => Some(ObjectPath::from(directory)),
            _ => None,
        };

        let objects: Vec<_> = store
            .list(directory.as_ref())
            .try_collect()
            .await
            .map_err(|error| QuiltError::from_object_store(&uri, error))?;

        let mut matches: Vec<ResourceAddress> = objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|key| key.starts_with(address.key()) && key.ends_with(suffix))
            .map(|key| address.with_key(key))
            .collect();
        matches.sort_by(|a, b| a.key().cmp(b.key()));

        tracing::debug!(
            "Found {} objects under {} ending with {}",
            matches.len(),
            uri,
            suffix
        );
        Ok(matches)
    }

    pub async fn get_attributes(&self, address: &ResourceAddress) -> Result<ResourceAttributes> {
        match address.scheme() {
            Scheme::File => {
                let metadata = match fs::metadata(address.key()).await {
                    Ok(metadata) => metadata,
                    Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                        return Err(QuiltError::NotFound(address.to_uri()));
                    }
                    Err(error) => return Err(error.into()),
                };
                Ok(ResourceAttributes {
                    size: metadata.len(),
                    last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                })
            }
            Scheme::ObjectStore => {
                let uri = address.to_uri();
                let store = self.store_for(address.container()).await?;
                let meta = store
                    .head(&ObjectPath::from(address.key()))
                    .await
                    .map_err(|error| QuiltError::from_object_store(&uri, error))?;
                Ok(ResourceAttributes {
                    size: meta.size as u64,
                    last_modified: Some(meta.last_modified),
                })
            }
        }
    }
}
