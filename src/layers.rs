//! Enumerating signatures from the layers of a signature image.
//!
//! Every layer of the manifest becomes one [`Signature`], in manifest order.
//! The layer count is checked against a bound before any blob is opened, so a
//! manifest with an absurd number of layers costs one manifest read and
//! nothing else.

use std::{io::Read, num::NonZeroUsize, sync::Arc};

use log::{debug, trace};
use ocidir::oci_spec::image::Descriptor;
use sha2::{Digest as _, Sha256};
use tokio::task::{JoinError, JoinSet};

use crate::{
    error::{Result, SignatureError},
    image::ImageAccessor,
    signature::Signature,
    SignatureSource,
};

/// Layer count above which a manifest is rejected.
pub const DEFAULT_MAX_LAYERS: usize = 1000;

/// The signatures stored as layers of an image.
#[derive(Debug)]
pub struct LayerSignatureSet<I> {
    image: Arc<I>,
    max_layers: usize,
    verify_digests: bool,
}

impl<I> Clone for LayerSignatureSet<I> {
    fn clone(&self) -> Self {
        Self {
            image: Arc::clone(&self.image),
            max_layers: self.max_layers,
            verify_digests: self.verify_digests,
        }
    }
}

impl<I: ImageAccessor> LayerSignatureSet<I> {
    pub fn new(image: I) -> Self {
        Self::from_arc(Arc::new(image))
    }

    /// Like [`new()`](Self::new), for an image that is already shared.
    pub fn from_arc(image: Arc<I>) -> Self {
        Self {
            image,
            max_layers: DEFAULT_MAX_LAYERS,
            verify_digests: true,
        }
    }

    /// Sets the maximum number of layers a manifest may declare.
    pub fn with_max_layers(mut self, max_layers: usize) -> Self {
        self.max_layers = max_layers;
        self
    }

    /// Enables or disables checking fetched content against its descriptor.
    ///
    /// When enabled (the default) the content must have the descriptor's size
    /// and, for sha256 descriptors, hash to the descriptor's digest.
    pub fn with_digest_verification(mut self, verify: bool) -> Self {
        self.verify_digests = verify;
        self
    }

    pub fn image(&self) -> &I {
        &self.image
    }

    pub fn max_layers(&self) -> usize {
        self.max_layers
    }

    /// Reads the manifest and returns its layers, if there aren't too many.
    fn checked_layers(&self) -> Result<Vec<Descriptor>> {
        let manifest = self.image.manifest()?;
        let layers = manifest.layers();
        if layers.len() > self.max_layers {
            return Err(SignatureError::ResourceLimitExceeded {
                actual: layers.len(),
                limit: self.max_layers,
            });
        }
        debug!("Manifest declares {} signature layers", layers.len());
        Ok(layers.to_vec())
    }
}

impl<I: ImageAccessor + 'static> LayerSignatureSet<I> {
    /// Fetches the signature layers with up to `jobs` fetches in flight.
    ///
    /// Produces the same result as [`get()`](SignatureSource::get).  A new
    /// fetch is only started once a slot is free and every fetch that has
    /// finished so far succeeded, so with `jobs == 1` this behaves exactly
    /// like the serial path.  The first failure ends the call and pending
    /// tasks are dropped.
    pub async fn get_concurrent(&self, jobs: NonZeroUsize) -> Result<Vec<Signature>> {
        let layers = self.checked_layers()?;

        let mut tasks = JoinSet::new();
        let mut results: Vec<Option<Signature>> = vec![None; layers.len()];

        for (idx, descriptor) in layers.into_iter().enumerate() {
            // Wait for a slot; the finished task is checked before anything
            // else is spawned.
            if tasks.len() >= jobs.get() {
                if let Some(joined) = tasks.join_next().await {
                    let (idx, signature) = joined_signature(joined)?;
                    results[idx] = Some(signature);
                }
            }
            while let Some(joined) = tasks.try_join_next() {
                let (idx, signature) = joined_signature(joined)?;
                results[idx] = Some(signature);
            }

            let image = Arc::clone(&self.image);
            let verify = self.verify_digests;
            tasks.spawn_blocking(move || {
                fetch_signature(&*image, &descriptor, verify).map(|sig| (idx, sig))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (idx, signature) = joined_signature(joined)?;
            results[idx] = Some(signature);
        }

        Ok(results.into_iter().flatten().collect())
    }
}

impl<I: ImageAccessor> SignatureSource for LayerSignatureSet<I> {
    fn get(&self) -> Result<Vec<Signature>> {
        let layers = self.checked_layers()?;
        layers
            .iter()
            .map(|descriptor| fetch_signature(&*self.image, descriptor, self.verify_digests))
            .collect()
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.image.raw_manifest()?)
    }
}

fn joined_signature(
    joined: std::result::Result<Result<(usize, Signature)>, JoinError>,
) -> Result<(usize, Signature)> {
    joined.map_err(|e| SignatureError::Task(e.to_string()))?
}

/// Reads one layer and binds it to its descriptor.
fn fetch_signature<I: ImageAccessor + ?Sized>(
    image: &I,
    descriptor: &Descriptor,
    verify: bool,
) -> Result<Signature> {
    trace!("Fetching signature layer {}", descriptor.digest());
    let reader = image.layer_by_digest(descriptor.digest())?;

    let mut content = Vec::new();
    if verify {
        // One byte past the declared size is enough to tell it's too long.
        reader
            .take(descriptor.size().saturating_add(1))
            .read_to_end(&mut content)?;
        verify_content(descriptor, &content)?;
    } else {
        let mut reader = reader;
        reader.read_to_end(&mut content)?;
    }

    Ok(Signature::new(content, descriptor.clone()))
}

fn verify_content(descriptor: &Descriptor, content: &[u8]) -> Result<()> {
    let actual_size = content.len() as u64;
    if actual_size != descriptor.size() {
        return Err(SignatureError::LayerSizeMismatch {
            digest: descriptor.digest().to_string(),
            expected: descriptor.size(),
            actual: actual_size,
        });
    }

    if let Some(expected) = descriptor.as_digest_sha256() {
        let actual = hex::encode(Sha256::digest(content));
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(SignatureError::LayerDigestMismatch {
                expected: descriptor.digest().to_string(),
                actual: format!("sha256:{actual}"),
            });
        }
    }

    Ok(())
}
