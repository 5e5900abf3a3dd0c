// src/storage/mod.rs
use anyhow::{anyhow, bail, Context, Result};
use std::{fmt, path::PathBuf};
use url::Url;

pub mod gcs;
pub mod local;

pub use gcs::GcsStore;
pub use local::LocalStore;

/// Where an object lives: a GCS bucket/key or a path on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Gcs { bucket: String, key: String },
    Local(PathBuf),
}

impl Location {
    /// Accepts `gs://bucket/key`, `file:///abs/path` or a bare filesystem path.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            bail!("empty location");
        }
        if !raw.contains("://") {
            return Ok(Location::Local(PathBuf::from(raw)));
        }

        let url = Url::parse(raw).with_context(|| format!("invalid location url `{}`", raw))?;
        match url.scheme() {
            "gs" => {
                let bucket = url
                    .host_str()
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| anyhow!("`{}` has no bucket", raw))?
                    .to_string();
                // take the key from the raw text so it is not percent-encoded
                let key = raw["gs://".len()..]
                    .split_once('/')
                    .map(|(_, k)| k.trim_matches('/').to_string())
                    .unwrap_or_default();
                Ok(Location::Gcs { bucket, key })
            }
            "file" => url
                .to_file_path()
                .map(Location::Local)
                .map_err(|_| anyhow!("`{}` is not an absolute file url", raw)),
            other => bail!("unsupported location scheme `{}` in `{}`", other, raw),
        }
    }

    /// Child location, treating `self` as a directory-like prefix.
    pub fn join(&self, name: &str) -> Location {
        match self {
            Location::Gcs { bucket, key } => {
                let key = if key.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", key.trim_end_matches('/'), name)
                };
                Location::Gcs {
                    bucket: bucket.clone(),
                    key,
                }
            }
            Location::Local(path) => Location::Local(path.join(name)),
        }
    }

    pub fn is_gcs(&self) -> bool {
        matches!(self, Location::Gcs { .. })
    }

    /// `gs://bucket` with no key: the whole bucket.
    pub fn is_bucket_root(&self) -> bool {
        matches!(self, Location::Gcs { key, .. } if key.is_empty())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Gcs { bucket, key } => write!(f, "gs://{}/{}", bucket, key),
            Location::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A storage backend. One variant per supported location kind.
pub enum BlobStore {
    Gcs(GcsStore),
    Local(LocalStore),
}

impl BlobStore {
    pub fn name(&self) -> &'static str {
        match self {
            BlobStore::Gcs(_) => "gcs",
            BlobStore::Local(_) => "local",
        }
    }

    /// Read a whole object into memory. A missing object is an error.
    pub async fn get(&self, location: &Location) -> Result<Vec<u8>> {
        match (self, location) {
            (BlobStore::Gcs(store), Location::Gcs { bucket, key }) => store.get(bucket, key).await,
            (BlobStore::Local(store), Location::Local(path)) => store.get(path).await,
            _ => Err(self.mismatch(location)),
        }
    }

    /// Write (or replace) a single object.
    pub async fn put(&self, location: &Location, data: Vec<u8>, content_type: &str) -> Result<()> {
        match (self, location) {
            (BlobStore::Gcs(store), Location::Gcs { bucket, key }) => {
                store.put(bucket, key, data, content_type).await
            }
            (BlobStore::Local(store), Location::Local(path)) => store.put(path, data).await,
            _ => Err(self.mismatch(location)),
        }
    }

    /// Remove everything stored under `location`; returns how many objects went away.
    pub async fn delete_prefix(&self, location: &Location) -> Result<usize> {
        match (self, location) {
            (BlobStore::Gcs(store), Location::Gcs { bucket, key }) => {
                store.delete_prefix(bucket, key).await
            }
            (BlobStore::Local(store), Location::Local(path)) => store.delete_prefix(path).await,
            _ => Err(self.mismatch(location)),
        }
    }

    fn mismatch(&self, location: &Location) -> anyhow::Error {
        anyhow!(
            "{} store cannot serve location {}",
            self.name(),
            location
        )
    }
}
