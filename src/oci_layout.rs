//! Reading signature images from local OCI layout directories.
//!
//! An OCI layout is a directory with an `oci-layout` marker, an `index.json`
//! listing manifests, and content-addressed blobs under `blobs/<alg>/<hex>`.
//! [`LayoutImage`] selects one manifest from the index when opened and then
//! serves that manifest and its blobs through [`ImageAccessor`].

use std::{fmt, fs::File, io::Read, path::Path};

use anyhow::{bail, Context, Result};
use cap_std_ext::cap_std;
use fn_error_context::context;
use log::debug;
use ocidir::{
    oci_spec::image::{Descriptor, Digest, ImageManifest, MediaType},
    OciDir,
};

use crate::image::ImageAccessor;

/// Index annotation naming a manifest within a layout.
const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

/// Parse an OCI layout reference like "/path/to/dir:tag" or "/path/to/dir".
///
/// A leading `oci:` is taken as a transport prefix only when a path with a
/// slash follows it, so `oci:/srv/sigs:tag` names `/srv/sigs` while
/// `oci:tag` is the directory `oci` with tag `tag`.  Returns
/// (path, optional_tag).
pub fn parse_layout_ref(imgref: &str) -> (&str, Option<&str>) {
    let imgref = match imgref.strip_prefix("oci:") {
        Some(rest) if rest.contains('/') => rest,
        _ => imgref,
    };
    // A colon only separates a tag if it comes after the last slash.
    let search_from = imgref.rfind('/').unwrap_or(0);
    match imgref[search_from..].rfind(':') {
        Some(colon_pos) => {
            let (path, tag_with_colon) = imgref.split_at(search_from + colon_pos);
            (path, Some(&tag_with_colon[1..]))
        }
        None => (imgref, None),
    }
}

/// One image manifest from an OCI layout directory.
///
/// The manifest is read once, when the layout is opened; blobs are opened
/// on demand.
pub struct LayoutImage {
    ocidir: OciDir,
    manifest_descriptor: Descriptor,
    raw_manifest: Vec<u8>,
    manifest: ImageManifest,
}

impl fmt::Debug for LayoutImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutImage")
            .field("manifest_digest", self.manifest_descriptor.digest())
            .field("layers", &self.manifest.layers().len())
            .finish()
    }
}

impl LayoutImage {
    /// Opens the layout at `layout_path`, selecting the manifest tagged `tag`.
    ///
    /// Without a tag the index must contain exactly one manifest.
    #[context("Opening OCI layout {}", layout_path.display())]
    pub fn open(layout_path: &Path, tag: Option<&str>) -> Result<Self> {
        let dir = cap_std::fs::Dir::open_ambient_dir(layout_path, cap_std::ambient_authority())
            .context("Opening directory")?;
        let ocidir = OciDir::open(dir).context("Opening OCI directory")?;

        let manifest_descriptor = resolve_manifest_descriptor(&ocidir, tag)
            .context("Resolving manifest from index")?;

        // Nested indices are valid in a layout but never hold signatures.
        if *manifest_descriptor.media_type() == MediaType::ImageIndex {
            bail!(
                "Nested image index not supported; the selected manifest points to another index \
                 rather than an image manifest"
            );
        }

        let raw_manifest =
            read_blob_bytes(&ocidir, &manifest_descriptor).context("Reading manifest blob")?;
        let manifest = ImageManifest::from_reader(&raw_manifest[..]).context("Parsing manifest")?;
        debug!(
            "Opened manifest {} with {} layers",
            manifest_descriptor.digest(),
            manifest.layers().len()
        );

        Ok(Self {
            ocidir,
            manifest_descriptor,
            raw_manifest,
            manifest,
        })
    }

    /// Opens a layout from a reference of the form `[oci:]path[:tag]`.
    pub fn open_ref(imgref: &str) -> Result<Self> {
        let (path, tag) = parse_layout_ref(imgref);
        Self::open(Path::new(path), tag)
    }

    /// The index entry the manifest was selected from.
    pub fn manifest_descriptor(&self) -> &Descriptor {
        &self.manifest_descriptor
    }

    /// Finds the descriptor the manifest declares for `digest`.
    fn declared_descriptor(&self, digest: &Digest) -> Option<&Descriptor> {
        std::iter::once(self.manifest.config())
            .chain(self.manifest.layers())
            .find(|desc| desc.digest() == digest)
    }
}

impl ImageAccessor for LayoutImage {
    fn manifest(&self) -> Result<ImageManifest> {
        Ok(self.manifest.clone())
    }

    fn layer_by_digest(&self, digest: &Digest) -> Result<Box<dyn Read + Send>> {
        let Some(descriptor) = self.declared_descriptor(digest) else {
            bail!("blob {digest} not found in manifest");
        };
        let file: File = self
            .ocidir
            .read_blob(descriptor)
            .with_context(|| format!("Opening blob {digest}"))?;
        Ok(Box::new(file))
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.raw_manifest.clone())
    }
}

/// Read a blob from an OCI layout as bytes.
fn read_blob_bytes(ocidir: &OciDir, desc: &Descriptor) -> Result<Vec<u8>> {
    let mut file = ocidir.read_blob(desc)?;
    let mut bytes = Vec::with_capacity(desc.size() as usize);
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Resolve the manifest descriptor from an OCI layout's index.
///
/// If `tag` is provided, looks for a manifest with that annotation.
/// Otherwise, selects the only manifest available.
fn resolve_manifest_descriptor(ocidir: &OciDir, tag: Option<&str>) -> Result<Descriptor> {
    let index = ocidir.read_index().context("Reading index.json")?;
    let manifests = index.manifests();

    if manifests.is_empty() {
        bail!("OCI layout index contains no manifests");
    }

    if let Some(tag) = tag {
        return manifests
            .iter()
            .find(|desc| ref_name(desc) == Some(tag))
            .cloned()
            .with_context(|| format!("Tag '{tag}' not found in OCI layout index"));
    }

    if let [only] = manifests.as_slice() {
        return Ok(only.clone());
    }

    bail!(
        "OCI layout index contains {} manifests; select one by tag. Available tags: {}",
        manifests.len(),
        manifests
            .iter()
            .filter_map(ref_name)
            .collect::<Vec<_>>()
            .join(", ")
    );
}

fn ref_name(desc: &Descriptor) -> Option<&str> {
    desc.annotations()
        .as_ref()
        .and_then(|annotations| annotations.get(REF_NAME_ANNOTATION))
        .map(String::as_str)
}
