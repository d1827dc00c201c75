//! Read-only access to an image's manifest and layer blobs.
//!
//! [`ImageAccessor`] is the seam between signature enumeration and wherever
//! the image actually lives.  This crate ships two implementations:
//! [`MemoryImage`] here, and [`LayoutImage`](crate::oci_layout::LayoutImage)
//! for OCI layout directories on disk.

use std::{
    collections::HashMap,
    io::{Cursor, Read},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use ocidir::oci_spec::image::{Digest, ImageManifest};
use sha2::{Digest as _, Sha256};

/// Access to the parts of an image needed to enumerate its signature layers.
///
/// Implementations must be safe to call from several threads at once;
/// `LayerSignatureSet::get_concurrent` fetches layers in parallel.
pub trait ImageAccessor: Send + Sync {
    /// Parse and return the image manifest.
    fn manifest(&self) -> Result<ImageManifest>;

    /// Open the content of the blob with the given digest.
    fn layer_by_digest(&self, digest: &Digest) -> Result<Box<dyn Read + Send>>;

    /// The serialized manifest exactly as stored.
    fn raw_manifest(&self) -> Result<Vec<u8>>;
}

impl<T: ImageAccessor + ?Sized> ImageAccessor for Arc<T> {
    fn manifest(&self) -> Result<ImageManifest> {
        (**self).manifest()
    }

    fn layer_by_digest(&self, digest: &Digest) -> Result<Box<dyn Read + Send>> {
        (**self).layer_by_digest(digest)
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        (**self).raw_manifest()
    }
}

/// Computes the `sha256:<hex>` digest of some bytes.
pub fn sha256_digest(bytes: &[u8]) -> Result<Digest> {
    let hex = hex::encode(Sha256::digest(bytes));
    Ok(format!("sha256:{hex}").parse()?)
}

/// An image held entirely in memory.
///
/// The manifest is kept in serialized form and parsed on each
/// [`manifest()`](ImageAccessor::manifest) call.
#[derive(Debug, Clone, Default)]
pub struct MemoryImage {
    raw_manifest: Vec<u8>,
    blobs: HashMap<String, Arc<[u8]>>,
}

impl MemoryImage {
    /// Creates an image from raw manifest bytes, with no blobs.
    pub fn new(raw_manifest: impl Into<Vec<u8>>) -> Self {
        Self {
            raw_manifest: raw_manifest.into(),
            blobs: HashMap::new(),
        }
    }

    /// Creates an image by serializing a typed manifest.
    pub fn from_manifest(manifest: &ImageManifest) -> Result<Self> {
        let json = manifest.to_string().context("Serializing manifest")?;
        Ok(Self::new(json))
    }

    /// Stores a blob under its sha256 digest and returns that digest.
    pub fn add_blob(&mut self, content: impl Into<Arc<[u8]>>) -> Result<Digest> {
        let content = content.into();
        let digest = sha256_digest(&content)?;
        self.blobs.insert(digest.to_string(), content);
        Ok(digest)
    }

    /// Stores a blob under an explicit digest, without checking it.
    pub fn insert_blob(&mut self, digest: &Digest, content: impl Into<Arc<[u8]>>) {
        self.blobs.insert(digest.to_string(), content.into());
    }
}

impl ImageAccessor for MemoryImage {
    fn manifest(&self) -> Result<ImageManifest> {
        ImageManifest::from_reader(&self.raw_manifest[..]).context("Parsing manifest")
    }

    fn layer_by_digest(&self, digest: &Digest) -> Result<Box<dyn Read + Send>> {
        let blob = self
            .blobs
            .get(&digest.to_string())
            .ok_or_else(|| anyhow!("blob {digest} not found"))?;
        Ok(Box::new(Cursor::new(Arc::clone(blob))))
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.raw_manifest.clone())
    }
}
