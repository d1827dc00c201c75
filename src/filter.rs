//! Restricting a signature source to OCI 1.1 in-toto attestations.
//!
//! [`ArtifactTypeFilter`] checks the top-level `artifactType` of the
//! manifest behind any [`SignatureSource`] and, if it names the in-toto
//! payload type, hands back the source's signatures re-wrapped as
//! [`SignatureFormat::Oci11Intoto`](crate::signature::SignatureFormat).
//!
//! Only the top-level field is consulted.  Subject- or descriptor-level
//! artifact types are ignored so that existing manifests keep being accepted
//! or rejected exactly as before.

use log::debug;
use serde_json::{Map, Value};

use crate::{
    error::{Result, SignatureError},
    signature::Signature,
    SignatureSource,
};

/// The in-toto attestation payload type, as used for `artifactType`.
pub const IN_TOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

const ARTIFACT_TYPE_FIELD: &str = "artifactType";

/// A [`SignatureSource`] that only yields signatures from in-toto artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactTypeFilter<S> {
    inner: S,
    expected: String,
}

impl<S: SignatureSource> ArtifactTypeFilter<S> {
    /// Wraps `inner`, expecting [`IN_TOTO_PAYLOAD_TYPE`].
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            expected: IN_TOTO_PAYLOAD_TYPE.to_string(),
        }
    }

    /// Replaces the artifact type the manifest must declare.
    pub fn with_expected_artifact_type(mut self, expected: impl Into<String>) -> Self {
        self.expected = expected.into();
        self
    }

    pub fn expected_artifact_type(&self) -> &str {
        &self.expected
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn check_artifact_type(&self, raw_manifest: &[u8]) -> Result<()> {
        let manifest: Value = serde_json::from_slice(raw_manifest)?;
        let manifest: Map<String, Value> = match manifest {
            Value::Object(map) => map,
            _ => return Err(SignatureError::ManifestNotObject),
        };

        let artifact_type = manifest
            .get(ARTIFACT_TYPE_FIELD)
            .ok_or(SignatureError::MissingField(ARTIFACT_TYPE_FIELD))?;

        match artifact_type {
            Value::String(actual) if *actual == self.expected => Ok(()),
            Value::String(actual) => Err(SignatureError::UnexpectedArtifactType {
                expected: self.expected.clone(),
                actual: actual.clone(),
            }),
            other => Err(SignatureError::UnexpectedArtifactType {
                expected: self.expected.clone(),
                actual: other.to_string(),
            }),
        }
    }
}

impl<S: SignatureSource> SignatureSource for ArtifactTypeFilter<S> {
    fn get(&self) -> Result<Vec<Signature>> {
        let signatures = self.inner.get()?;
        let raw_manifest = self.inner.raw_manifest()?;
        self.check_artifact_type(&raw_manifest)?;

        debug!(
            "Manifest has artifactType {}, wrapping {} signatures",
            self.expected,
            signatures.len()
        );
        Ok(signatures.iter().map(Signature::to_oci11).collect())
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        self.inner.raw_manifest()
    }
}
