//! Signature handles built from manifest layers.
//!
//! A [`Signature`] binds the content of one layer to the descriptor that
//! declared it.  Nothing here decodes or verifies the payload; the accessors
//! only hand back raw bytes and raw annotation strings.

use std::{collections::HashMap, sync::Arc};

use ocidir::oci_spec::image::{Descriptor, Digest, MediaType};

/// Annotation key holding the base64-encoded signature on a cosign layer.
pub const ANN_SIGNATURE: &str = "dev.cosignproject.cosign/signature";

/// Annotation key holding the PEM signing certificate.
pub const ANN_CERTIFICATE: &str = "dev.sigstore.cosign/certificate";

/// Annotation key holding the PEM certificate chain.
pub const ANN_CHAIN: &str = "dev.sigstore.cosign/chain";

/// Annotation key holding the JSON transparency log bundle.
pub const ANN_BUNDLE: &str = "dev.sigstore.cosign/bundle";

/// How a signature is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFormat {
    /// Classic cosign layout: payload in the layer, signature in an annotation.
    Layer,
    /// OCI 1.1 artifact whose layer is an in-toto DSSE envelope.
    Oci11Intoto,
}

impl SignatureFormat {
    /// Short name used in listings.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureFormat::Layer => "layer",
            SignatureFormat::Oci11Intoto => "oci11-intoto",
        }
    }
}

impl std::fmt::Display for SignatureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One signature object attached to an image.
///
/// The payload is shared, so cloning or re-wrapping a signature does not copy
/// layer content.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    descriptor: Descriptor,
    payload: Arc<[u8]>,
    format: SignatureFormat,
}

impl Signature {
    /// Binds layer content to the descriptor it was fetched for.
    pub fn new(payload: impl Into<Arc<[u8]>>, descriptor: Descriptor) -> Self {
        Self {
            descriptor,
            payload: payload.into(),
            format: SignatureFormat::Layer,
        }
    }

    /// Returns the OCI 1.1 in-toto view of this signature.
    ///
    /// `self` is left untouched; the new value shares its payload.
    pub fn to_oci11(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            payload: Arc::clone(&self.payload),
            format: SignatureFormat::Oci11Intoto,
        }
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn digest(&self) -> &Digest {
        self.descriptor.digest()
    }

    pub fn media_type(&self) -> &MediaType {
        self.descriptor.media_type()
    }

    pub fn size(&self) -> u64 {
        self.descriptor.size()
    }

    pub fn format(&self) -> SignatureFormat {
        self.format
    }

    /// The raw layer content.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn annotations(&self) -> Option<&HashMap<String, String>> {
        self.descriptor.annotations().as_ref()
    }

    /// Looks up a single layer annotation.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations()
            .and_then(|annotations| annotations.get(key))
            .map(String::as_str)
    }

    /// The base64 signature carried in the layer annotations.
    ///
    /// Always `None` for OCI 1.1 in-toto signatures: those keep the signature
    /// inside the DSSE envelope that forms the payload.
    pub fn base64_signature(&self) -> Option<&str> {
        match self.format {
            SignatureFormat::Layer => self.annotation(ANN_SIGNATURE),
            SignatureFormat::Oci11Intoto => None,
        }
    }

    pub fn certificate_pem(&self) -> Option<&str> {
        self.annotation(ANN_CERTIFICATE)
    }

    pub fn chain_pem(&self) -> Option<&str> {
        self.annotation(ANN_CHAIN)
    }

    pub fn bundle_json(&self) -> Option<&str> {
        self.annotation(ANN_BUNDLE)
    }
}
