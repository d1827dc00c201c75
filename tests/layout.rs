use std::{collections::HashMap, num::NonZeroUsize, path::Path};

use similar_asserts::assert_eq;

use ocisig::{
    image::sha256_digest,
    oci_spec::image::{
        Descriptor, DescriptorBuilder, ImageIndexBuilder, ImageManifestBuilder, MediaType,
        OciLayoutBuilder,
    },
    signature::{ANN_CERTIFICATE, ANN_SIGNATURE},
    ArtifactTypeFilter, LayerSignatureSet, LayoutImage, SignatureError, SignatureFormat,
    SignatureSource, IN_TOTO_PAYLOAD_TYPE,
};

const SIMPLESIGNING: &str = "application/vnd.dev.cosign.simplesigning.v1+json";
const DSSE: &str = "application/vnd.dsse.envelope.v1+json";

fn write_blob(layout: &Path, media_type: &str, content: &[u8]) -> Descriptor {
    let digest = sha256_digest(content).unwrap();
    std::fs::write(layout.join("blobs/sha256").join(digest.digest()), content).unwrap();
    DescriptorBuilder::default()
        .media_type(MediaType::from(media_type))
        .digest(digest)
        .size(content.len() as u64)
        .build()
        .unwrap()
}

fn annotate(desc: Descriptor, annotations: &[(&str, &str)]) -> Descriptor {
    let annotations: HashMap<String, String> = annotations
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    DescriptorBuilder::default()
        .media_type(desc.media_type().clone())
        .digest(desc.digest().clone())
        .size(desc.size())
        .annotations(annotations)
        .build()
        .unwrap()
}

/// Writes a single-manifest layout whose layers are `payloads`.
fn signature_layout(
    layout: &Path,
    layer_media_type: &str,
    payloads: &[&[u8]],
    artifact_type: Option<&str>,
) -> Vec<Descriptor> {
    std::fs::create_dir_all(layout.join("blobs/sha256")).unwrap();
    std::fs::write(
        layout.join("oci-layout"),
        OciLayoutBuilder::default()
            .image_layout_version("1.0.0".to_string())
            .build()
            .unwrap()
            .to_string()
            .unwrap(),
    )
    .unwrap();

    let config = write_blob(layout, "application/vnd.oci.empty.v1+json", b"{}");
    let layers: Vec<Descriptor> = payloads
        .iter()
        .enumerate()
        .map(|(i, payload)| {
            let desc = write_blob(layout, layer_media_type, payload);
            let signature = format!("c2lnbmF0dXJl{i}");
            annotate(
                desc,
                &[
                    (ANN_SIGNATURE, signature.as_str()),
                    (ANN_CERTIFICATE, "-----BEGIN CERTIFICATE-----"),
                ],
            )
        })
        .collect();

    let mut builder = ImageManifestBuilder::default()
        .schema_version(2u32)
        .media_type(MediaType::ImageManifest)
        .config(config)
        .layers(layers.clone());
    if let Some(artifact_type) = artifact_type {
        builder = builder.artifact_type(MediaType::from(artifact_type));
    }
    let manifest = builder.build().unwrap().to_string().unwrap();
    let manifest_desc = write_blob(
        layout,
        "application/vnd.oci.image.manifest.v1+json",
        manifest.as_bytes(),
    );

    let index = ImageIndexBuilder::default()
        .schema_version(2u32)
        .media_type(MediaType::ImageIndex)
        .manifests(vec![manifest_desc])
        .build()
        .unwrap();
    std::fs::write(layout.join("index.json"), index.to_string().unwrap()).unwrap();

    layers
}

#[test]
fn test_classic_signatures() {
    let tempdir = tempfile::tempdir().unwrap();
    let payloads: [&[u8]; 3] = [b"{\"critical\":1}", b"{\"critical\":2}", b"{\"critical\":3}"];
    let layers = signature_layout(tempdir.path(), SIMPLESIGNING, &payloads, None);

    let set = LayerSignatureSet::new(LayoutImage::open(tempdir.path(), None).unwrap());
    let sigs = set.get().unwrap();

    assert_eq!(sigs.len(), 3);
    for (i, ((sig, layer), payload)) in sigs.iter().zip(&layers).zip(payloads).enumerate() {
        assert_eq!(sig.digest(), layer.digest());
        assert_eq!(sig.payload(), payload);
        assert_eq!(sig.format(), SignatureFormat::Layer);
        assert_eq!(sig.base64_signature(), Some(format!("c2lnbmF0dXJl{i}").as_str()));
        assert_eq!(sig.certificate_pem(), Some("-----BEGIN CERTIFICATE-----"));
    }

    // a classic signature image has no artifactType
    let err = ArtifactTypeFilter::new(set).get().unwrap_err();
    assert!(matches!(err, SignatureError::MissingField(_)), "{err}");
}

#[tokio::test]
async fn test_intoto_attestations() {
    let tempdir = tempfile::tempdir().unwrap();
    let payloads: [&[u8]; 2] = [b"{\"payloadType\":\"a\"}", b"{\"payloadType\":\"b\"}"];
    let layers = signature_layout(tempdir.path(), DSSE, &payloads, Some(IN_TOTO_PAYLOAD_TYPE));

    let imgref = format!("oci:{}", tempdir.path().display());
    let set = LayerSignatureSet::new(LayoutImage::open_ref(&imgref).unwrap());

    let concurrent = set
        .get_concurrent(NonZeroUsize::new(2).unwrap())
        .await
        .unwrap();
    assert_eq!(concurrent, set.get().unwrap());

    let filter = ArtifactTypeFilter::new(set);
    let sigs = filter.get().unwrap();
    assert_eq!(sigs.len(), 2);
    for (sig, layer) in sigs.iter().zip(&layers) {
        assert_eq!(sig.digest(), layer.digest());
        assert_eq!(sig.format(), SignatureFormat::Oci11Intoto);
        assert_eq!(sig.base64_signature(), None);
    }

    // repeated calls see the same thing
    assert_eq!(filter.get().unwrap(), sigs);
}

#[test]
fn test_wrong_artifact_type() {
    let tempdir = tempfile::tempdir().unwrap();
    signature_layout(
        tempdir.path(),
        DSSE,
        &[b"{}".as_slice()],
        Some("application/vnd.dev.sigstore.bundle.v0.3+json"),
    );

    let set = LayerSignatureSet::new(LayoutImage::open(tempdir.path(), None).unwrap());
    let err = ArtifactTypeFilter::new(set).get().unwrap_err();
    assert_eq!(
        err.to_string(),
        "expected artifactType application/vnd.in-toto+json, \
         got application/vnd.dev.sigstore.bundle.v0.3+json"
    );
}

#[test]
fn test_layer_bound() {
    let tempdir = tempfile::tempdir().unwrap();
    let payloads: Vec<Vec<u8>> = (0..5).map(|i| vec![i; 4]).collect();
    let payloads: Vec<&[u8]> = payloads.iter().map(Vec::as_slice).collect();
    signature_layout(tempdir.path(), SIMPLESIGNING, &payloads, None);

    let set = LayerSignatureSet::new(LayoutImage::open(tempdir.path(), None).unwrap())
        .with_max_layers(4);
    let err = set.get().unwrap_err();
    assert!(
        matches!(
            err,
            SignatureError::ResourceLimitExceeded {
                actual: 5,
                limit: 4
            }
        ),
        "{err}"
    );
}

#[test]
fn test_missing_layer_blob() {
    let tempdir = tempfile::tempdir().unwrap();
    let payloads: [&[u8]; 2] = [b"one", b"two"];
    let layers = signature_layout(tempdir.path(), SIMPLESIGNING, &payloads, None);
    std::fs::remove_file(
        tempdir
            .path()
            .join("blobs/sha256")
            .join(layers[1].digest().digest()),
    )
    .unwrap();

    let set = LayerSignatureSet::new(LayoutImage::open(tempdir.path(), None).unwrap());
    let err = set.get().unwrap_err();
    assert!(matches!(err, SignatureError::Image(_)), "{err}");
}
