use crate::attestation::SignedAttestation;
use crate::image::ImageReference;
use serde::Serialize;

/// Outcome of one check against one image.
///
/// `success` reflects the check itself, `attested` whether its attestation
/// was signed and stored. A check can pass and still fail to attest.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    #[serde(skip)]
    pub image: ImageReference,
    pub success: bool,
    pub attested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<SignedAttestation>,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, image: &ImageReference, success: bool) -> Self {
        Self {
            name: name.into(),
            image: image.clone(),
            success,
            attested: false,
            error: None,
            details: None,
        }
    }

    /// A check that could not be evaluated.
    pub fn errored(name: impl Into<String>, image: &ImageReference, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(name, image, false)
        }
    }
}

/// Results of a suite run as reported to callers
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub image: String,
    pub success: bool,
    pub results: Vec<CheckResult>,
}

impl Response {
    /// `success` is true iff every check passed; attestation failures are
    /// not considered.
    pub fn new(image: &ImageReference, results: Vec<CheckResult>) -> Self {
        Self {
            image: image.to_string(),
            success: results.iter().all(|r| r.success),
            results,
        }
    }

    pub fn result(&self, name: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.name == name)
    }
}
