//! Error types for signature enumeration.
//!
//! Every fallible operation in this crate returns [`Result<T>`], an alias for
//! `Result<T, SignatureError>`.  Errors coming from an
//! [`ImageAccessor`](crate::image::ImageAccessor) are carried through
//! unchanged in [`SignatureError::Image`].

/// Result type alias for operations that may return a SignatureError.
pub type Result<T> = std::result::Result<T, SignatureError>;

/// Error types for signature enumeration and filtering.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The manifest declares more layers than the configured bound.
    #[error("number of layers ({actual}) exceeded the limit ({limit})")]
    ResourceLimitExceeded { actual: usize, limit: usize },

    /// Error reported by the image accessor, passed through as-is.
    #[error(transparent)]
    Image(#[from] anyhow::Error),

    /// The raw manifest is not valid JSON.
    #[error("failed to parse manifest: {0}")]
    ManifestParse(#[from] serde_json::Error),

    /// The raw manifest is valid JSON but not an object.
    #[error("manifest is not a JSON object")]
    ManifestNotObject,

    /// A required top-level manifest field is absent.
    #[error("no {0} found in manifest")]
    MissingField(&'static str),

    /// The manifest's artifact type is not the expected one.
    #[error("expected artifactType {expected}, got {actual}")]
    UnexpectedArtifactType { expected: String, actual: String },

    /// Layer content length differs from its descriptor.
    #[error("layer {digest} has size {actual}, descriptor says {expected}")]
    LayerSizeMismatch {
        digest: String,
        expected: u64,
        actual: u64,
    },

    /// Layer content hashes to something other than its descriptor digest.
    #[error("layer digest mismatch: expected {expected}, got {actual}")]
    LayerDigestMismatch { expected: String, actual: String },

    /// I/O error while reading layer content.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A concurrent fetch task failed to complete.
    #[error("layer fetch task failed: {0}")]
    Task(String),
}
