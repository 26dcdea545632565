pub mod grafeas;
pub mod poll;

use crate::attestation::{Attestation, SignedAttestation, container_signature_payload};
use crate::build::BuildDetail;
use crate::image::ImageReference;
use crate::vulnerability::Vulnerability;
use crate::{Result, VoucherError};
use async_trait::async_trait;
use log::debug;

pub use grafeas::GrafeasClient;
pub use poll::{DiscoverySource, DiscoveryStatus, PollSettings, poll_for_discoveries};

/// Adapter to a store of image metadata and attestations.
///
/// Every backend used by a suite must implement this trait.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Whether this client has what it needs to create attestations
    fn can_attest(&self) -> bool;

    /// Unsigned payload to attest for `image`
    async fn new_payload_body(&self, image: &ImageReference) -> Result<String> {
        container_signature_payload(image)
    }

    /// Provenance recorded for the image
    async fn get_build_detail(&self, image: &ImageReference) -> Result<BuildDetail>;

    /// Vulnerabilities found for the image, once scanning has finished
    async fn get_vulnerabilities(&self, image: &ImageReference) -> Result<Vec<Vulnerability>>;

    /// Attestations already stored for the image
    async fn get_attestations(&self, image: &ImageReference) -> Result<Vec<SignedAttestation>>;

    /// Sign the attestation and store it against the image
    async fn add_attestation_to_image(
        &self,
        image: &ImageReference,
        attestation: Attestation,
    ) -> Result<SignedAttestation>;

    /// Release any resources held by the client
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Get the client type name for logging
    fn client_type(&self) -> &'static str;
}

/// Treat an "already exists" write as a successful no-op.
///
/// The returned attestation carries no signature since nothing was signed
/// by this call.
pub fn idempotent(
    attestation: Attestation,
    result: Result<SignedAttestation>,
) -> Result<SignedAttestation> {
    match result {
        Err(VoucherError::AlreadyExists) => {
            debug!(
                "Attestation for {} already exists, skipping",
                attestation.check_name
            );
            Ok(SignedAttestation::existing(attestation))
        }
        other => other,
    }
}
