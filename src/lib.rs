//! Locating signature objects attached to OCI images.
//!
//! Signing tools such as cosign store signatures as extra layers of an OCI
//! image manifest.  This crate enumerates those layers as [`Signature`]
//! handles without interpreting their cryptographic contents.
//!
//! Key functionality includes:
//! - [`LayerSignatureSet`]: one signature per manifest layer, in manifest
//!   order, with an upper bound on the layer count
//! - [`ArtifactTypeFilter`]: accepts only manifests whose `artifactType` is
//!   the in-toto payload type and marks their signatures as OCI 1.1
//!   attestations
//! - [`MemoryImage`] and [`LayoutImage`]: image accessors for in-memory
//!   images and OCI layout directories
//!
//! Nothing here verifies a signature.

pub mod error;
pub mod filter;
pub mod image;
pub mod layers;
pub mod oci_layout;
pub mod signature;

pub use ocidir::oci_spec;

pub use error::{Result, SignatureError};
pub use filter::{ArtifactTypeFilter, IN_TOTO_PAYLOAD_TYPE};
pub use image::{ImageAccessor, MemoryImage};
pub use layers::{LayerSignatureSet, DEFAULT_MAX_LAYERS};
pub use oci_layout::LayoutImage;
pub use signature::{Signature, SignatureFormat};

/// Something that can produce the signatures attached to an image.
///
/// Each call to [`get()`](Self::get) is independent: it either returns the
/// complete sequence, in manifest layer order, or an error.
pub trait SignatureSource {
    /// Returns the signatures, in manifest layer order.
    fn get(&self) -> Result<Vec<Signature>>;

    /// Returns the serialized manifest the signatures come from.
    fn raw_manifest(&self) -> Result<Vec<u8>>;
}

impl<S: SignatureSource + ?Sized> SignatureSource for Box<S> {
    fn get(&self) -> Result<Vec<Signature>> {
        (**self).get()
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        (**self).raw_manifest()
    }
}
