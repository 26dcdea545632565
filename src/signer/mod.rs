pub mod keyring;
pub mod kms;

use crate::Result;
use async_trait::async_trait;

pub use keyring::{KeyRing, verify};
pub use kms::{DigestAlgorithm, HttpKmsClient, KmsClient, KmsDigest, KmsKey, KmsSigner};

/// Signature produced for an attestation body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureOutput {
    /// Encoded signature (armored message or base64, depending on the signer)
    pub signature: String,
    /// Identifier of the key that produced the signature
    pub key_id: String,
}

/// Trait for the backends that sign attestations on behalf of a check
#[async_trait]
pub trait AttestationSigner: Send + Sync {
    /// Sign `body` with the key bound to `check_name`
    async fn sign(&self, check_name: &str, body: &str) -> Result<SignatureOutput>;

    /// Release any resources held by the signer
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Get the signer type name for logging
    fn signer_type(&self) -> &'static str;
}
