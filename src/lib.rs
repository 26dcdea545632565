use log::debug;
use thiserror::Error;

pub mod attestation;
pub mod build;
pub mod checks;
pub mod config;
pub mod image;
pub mod metadata;
pub mod response;
pub mod signer;
pub mod suite;
pub mod vulnerability;

// Re-export commonly used types
pub use attestation::{Attestation, SignedAttestation};
pub use build::{BuildArtifact, BuildDetail};
pub use checks::{Check, CheckRegistry, Collaborators};
pub use config::Config;
pub use image::ImageReference;
pub use metadata::{MetadataClient, PollSettings};
pub use response::{CheckResult, Response};
pub use signer::{AttestationSigner, SignatureOutput};
pub use suite::Suite;
pub use vulnerability::{Severity, Vulnerability};

#[derive(Debug, Error)]
pub enum VoucherError {
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    #[error("requested check \"{0}\" does not exist")]
    UnknownCheck(String),

    #[error("check is missing a required collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("no metadata of type {0} found")]
    NoMetadata(&'static str),

    #[error("discoveries have not finished processing")]
    DiscoveriesUnfinished,

    #[error("attestation already exists")]
    AlreadyExists,

    #[error("no signing entity exists for check \"{0}\"")]
    NoSigningEntity(String),

    #[error("message is not signed")]
    Unsigned,

    #[error("message was signed by an unknown key: {0}")]
    UnknownSigner(String),

    #[error("signature verification failed: {0}")]
    InvalidSignature(String),

    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("KMS error: {0}")]
    Kms(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("check timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl VoucherError {
    /// Whether the backend reported that the written record already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, VoucherError::AlreadyExists)
    }

    /// Whether the backend holds no record of the requested kind.
    pub fn is_no_metadata(&self) -> bool {
        matches!(self, VoucherError::NoMetadata(_))
    }
}

pub type Result<T> = std::result::Result<T, VoucherError>;

// ===== Convenience entry points =====

/// Run every check in the suite against an image and, when a metadata
/// client is provided and able to attest, attest the passing checks.
pub async fn check_image(
    suite: &Suite,
    client: Option<&dyn MetadataClient>,
    image: &ImageReference,
) -> Response {
    let results = match client {
        Some(client) if client.can_attest() => {
            debug!("Attesting {} through {} client", image, client.client_type());
            suite.run_and_attest(client, image).await
        }
        _ => suite.run(image).await,
    };

    Response::new(image, results)
}

/// Parse an image reference and check it, see [`check_image`].
pub async fn check_image_str(
    suite: &Suite,
    client: Option<&dyn MetadataClient>,
    image: &str,
) -> Result<Response> {
    let image = ImageReference::parse(image)?;
    Ok(check_image(suite, client, &image).await)
}
