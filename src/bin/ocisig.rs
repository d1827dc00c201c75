use std::num::NonZeroUsize;

use anyhow::Result;
use clap::{Parser, Subcommand};

use ocisig::{
    ArtifactTypeFilter, LayerSignatureSet, LayoutImage, Signature, SignatureSource,
    DEFAULT_MAX_LAYERS, IN_TOTO_PAYLOAD_TYPE,
};

/// ocisig
#[derive(Debug, Parser)]
#[clap(name = "ocisig", version)]
pub struct App {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Lists the signature layers of an image in an OCI layout directory
    List {
        /// the layout to read, as `path[:tag]`
        layout: String,
        /// reject manifests with more layers than this
        #[clap(long, default_value_t = DEFAULT_MAX_LAYERS)]
        max_layers: usize,
        /// don't check layer content against its descriptor
        #[clap(long)]
        no_verify_digests: bool,
        /// only accept OCI 1.1 in-toto attestation manifests
        #[clap(long)]
        intoto: bool,
        /// the artifactType required with --intoto
        #[clap(long, default_value = IN_TOTO_PAYLOAD_TYPE, requires = "intoto")]
        artifact_type: String,
        /// fetch this many layers at once
        #[clap(long)]
        jobs: Option<NonZeroUsize>,
    },
}

/// Wraps the result of a concurrent fetch so it can go through the filter.
struct Fetched<'a> {
    signatures: Vec<Signature>,
    set: &'a LayerSignatureSet<LayoutImage>,
}

impl SignatureSource for Fetched<'_> {
    fn get(&self) -> ocisig::Result<Vec<Signature>> {
        Ok(self.signatures.clone())
    }

    fn raw_manifest(&self) -> ocisig::Result<Vec<u8>> {
        self.set.raw_manifest()
    }
}

fn print_signatures(signatures: &[Signature]) {
    for sig in signatures {
        println!(
            "{} {} {} {}",
            sig.digest(),
            sig.media_type(),
            sig.size(),
            sig.format()
        );
    }
}

impl Command {
    /// Resolves the signatures the command asks for.
    async fn signatures(&self) -> Result<Vec<Signature>> {
        match self {
            Command::List {
                layout,
                max_layers,
                no_verify_digests,
                intoto,
                artifact_type,
                jobs,
            } => {
                let image = LayoutImage::open_ref(layout)?;
                let set = LayerSignatureSet::new(image)
                    .with_max_layers(*max_layers)
                    .with_digest_verification(!no_verify_digests);

                let source: Box<dyn SignatureSource + '_> = match jobs {
                    Some(jobs) => Box::new(Fetched {
                        signatures: set.get_concurrent(*jobs).await?,
                        set: &set,
                    }),
                    None => Box::new(set.clone()),
                };

                let signatures = if *intoto {
                    ArtifactTypeFilter::new(source)
                        .with_expected_artifact_type(artifact_type)
                        .get()?
                } else {
                    source.get()?
                };
                Ok(signatures)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = App::parse();
    let signatures = args.cmd.signatures().await?;
    print_signatures(&signatures);
    Ok(())
}
