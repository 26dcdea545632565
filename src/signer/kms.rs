//! Signer that delegates private key operations to a remote KMS.
//!
//! Only the digest of the attestation body leaves the process; the key
//! material never does.

use crate::signer::{AttestationSigner, SignatureOutput};
use crate::{Result, VoucherError};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use log::debug;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

const KMS_API_URL: &str = "https://cloudkms.googleapis.com";
const KEY_ID_PREFIX: &str = "//cloudkms.googleapis.com/v1/";
const USER_AGENT_VALUE: &str = "voucher/0.1.0";

/// Digest algorithms the KMS accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn digest(self, data: &[u8]) -> KmsDigest {
        let bytes = match self {
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        };
        KmsDigest {
            algorithm: self,
            bytes,
        }
    }

    fn field_name(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = VoucherError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "").as_str() {
            "SHA256" => Ok(DigestAlgorithm::Sha256),
            "SHA384" => Ok(DigestAlgorithm::Sha384),
            "SHA512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(VoucherError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field_name().to_ascii_uppercase())
    }
}

/// Digest sent to the KMS in place of the message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmsDigest {
    pub algorithm: DigestAlgorithm,
    pub bytes: Vec<u8>,
}

/// Key binding for one check.
///
/// The algorithm is kept as configured and parsed at sign time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmsKey {
    pub path: String,
    pub algo: String,
}

/// Remote signing service
#[async_trait]
pub trait KmsClient: Send + Sync {
    /// Sign a precomputed digest with the key at `key_path`
    async fn asymmetric_sign(&self, key_path: &str, digest: &KmsDigest) -> Result<Vec<u8>>;
}

/// Signer that maps check names to KMS keys
pub struct KmsSigner {
    client: Arc<dyn KmsClient>,
    keys: HashMap<String, KmsKey>,
}

impl KmsSigner {
    pub fn new(client: Arc<dyn KmsClient>, keys: HashMap<String, KmsKey>) -> Self {
        Self { client, keys }
    }

    /// Resource path recorded as the key id of signatures made with `key_path`.
    pub fn key_id(key_path: &str) -> String {
        format!("{}{}", KEY_ID_PREFIX, key_path)
    }
}

#[async_trait]
impl AttestationSigner for KmsSigner {
    async fn sign(&self, check_name: &str, body: &str) -> Result<SignatureOutput> {
        let key = self
            .keys
            .get(check_name)
            .ok_or_else(|| VoucherError::NoSigningEntity(check_name.to_string()))?;

        let algorithm: DigestAlgorithm = key.algo.parse()?;
        let digest = algorithm.digest(body.as_bytes());

        debug!("Signing {} with KMS key {} ({})", check_name, key.path, algorithm);
        let signature = self.client.asymmetric_sign(&key.path, &digest).await?;

        Ok(SignatureOutput {
            signature: BASE64.encode(signature),
            key_id: Self::key_id(&key.path),
        })
    }

    fn signer_type(&self) -> &'static str {
        "KMS"
    }
}

#[derive(Debug, Serialize)]
struct AsymmetricSignRequest {
    digest: HashMap<&'static str, String>,
}

#[derive(Debug, Deserialize)]
struct AsymmetricSignResponse {
    signature: String,
}

/// HTTP client for the KMS `asymmetricSign` endpoint
#[derive(Debug, Clone)]
pub struct HttpKmsClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpKmsClient {
    pub fn new(token: Option<&str>) -> Result<Self> {
        Self::with_base_url(KMS_API_URL, token)
    }

    pub fn with_base_url(base_url: impl Into<String>, token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        if let Some(token) = token {
            let auth_value = format!("Bearer {}", token);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value).map_err(|e| VoucherError::Kms(e.to_string()))?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl KmsClient for HttpKmsClient {
    async fn asymmetric_sign(&self, key_path: &str, digest: &KmsDigest) -> Result<Vec<u8>> {
        let url = format!("{}/v1/{}:asymmetricSign", self.base_url, key_path);
        let request = AsymmetricSignRequest {
            digest: HashMap::from([(digest.algorithm.field_name(), BASE64.encode(&digest.bytes))]),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VoucherError::Kms(format!(
                "KMS returned {}: {}",
                status, body
            )));
        }

        let signed: AsymmetricSignResponse = response.json().await?;
        BASE64
            .decode(signed.signature)
            .map_err(|e| VoucherError::Kms(format!("failed to decode signature: {}", e)))
    }
}
