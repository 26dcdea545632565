use crate::image::ImageReference;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Signature type recorded in container signature payloads
pub const CONTAINER_SIGNATURE_TYPE: &str = "Google cloud binauthz container signature";

/// Unsigned claim that an image passed a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    #[serde(rename = "checkName")]
    pub check_name: String,
    pub body: String,
}

impl Attestation {
    pub fn new(check_name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            check_name: check_name.into(),
            body: body.into(),
        }
    }
}

/// An attestation together with the signature over its body.
///
/// `signature` is empty when the backend already held this attestation and
/// the write was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAttestation {
    #[serde(flatten)]
    pub attestation: Attestation,
    pub signature: String,
    #[serde(rename = "keyID")]
    pub key_id: String,
}

impl SignedAttestation {
    /// Wrap an attestation the backend already had; nothing was signed.
    pub fn existing(attestation: Attestation) -> Self {
        Self {
            attestation,
            signature: String::new(),
            key_id: String::new(),
        }
    }

    pub fn check_name(&self) -> &str {
        &self.attestation.check_name
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }
}

/// Canonical JSON payload binding the image identity to its digest.
///
/// Keys are emitted in sorted order so the same image always produces the
/// same bytes to sign.
pub fn container_signature_payload(image: &ImageReference) -> Result<String> {
    let payload = json!({
        "critical": {
            "identity": {
                "docker-reference": image.name(),
            },
            "image": {
                "docker-manifest-digest": image.digest(),
            },
            "type": CONTAINER_SIGNATURE_TYPE,
        }
    });

    Ok(serde_json::to_string(&payload)?)
}
