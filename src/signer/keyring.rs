//! In-process keyring signer.
//!
//! Keys are ECDSA P-256 and are imported from PEM at startup. Each check
//! name is bound to at most one key; signing wraps the body in a DSSE
//! envelope and armors it so the result can be stored as a plain string.

use crate::signer::{AttestationSigner, SignatureOutput};
use crate::{Result, VoucherError};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use log::debug;
use p256::ecdsa::{
    Signature, SigningKey, VerifyingKey,
    signature::{Signer as _, Verifier as _},
};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// DSSE payload type for attestation bodies
pub const PAYLOAD_TYPE: &str = "application/vnd.voucher.attestation.v1+json";

const ARMOR_BEGIN: &str = "-----BEGIN VOUCHER SIGNED MESSAGE-----";
const ARMOR_END: &str = "-----END VOUCHER SIGNED MESSAGE-----";
const ARMOR_LINE_LEN: usize = 64;
const FINGERPRINT_LEN: usize = 20;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "payloadType")]
    payload_type: String,
    payload: String,
    #[serde(default)]
    signatures: Vec<EnvelopeSignature>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeSignature {
    keyid: String,
    sig: String,
}

/// One imported key. Public-only entities can verify but not sign.
struct KeyEntity {
    fingerprint: String,
    verifying_key: VerifyingKey,
    signing_key: Option<SigningKey>,
}

impl KeyEntity {
    fn new(verifying_key: VerifyingKey, signing_key: Option<SigningKey>) -> Self {
        Self {
            fingerprint: fingerprint(&verifying_key),
            verifying_key,
            signing_key,
        }
    }
}

/// Imported keys plus the check name to key binding.
#[derive(Default)]
pub struct KeyRing {
    entities: Vec<KeyEntity>,
    names: HashMap<String, String>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one private key per check name from PEM files.
    pub async fn from_files(keys: &HashMap<String, PathBuf>) -> Result<Self> {
        let mut keyring = Self::new();
        for (name, path) in keys {
            let pem = tokio::fs::read_to_string(path).await.map_err(|e| {
                VoucherError::Key(format!("failed to read key file {}: {}", path.display(), e))
            })?;
            keyring.add_signing_key(name, &pem)?;
        }
        Ok(keyring)
    }

    /// Import a PKCS#8 private key and return its fingerprint.
    pub fn add_private_key_pem(&mut self, pem: &str) -> Result<String> {
        let signing_key = SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| VoucherError::Key(format!("failed to parse private key: {}", e)))?;
        let entity = KeyEntity::new(*signing_key.verifying_key(), Some(signing_key));
        Ok(self.push(entity))
    }

    /// Import an SPKI public key and return its fingerprint.
    pub fn add_public_key_pem(&mut self, pem: &str) -> Result<String> {
        let verifying_key = VerifyingKey::from_public_key_pem(pem)
            .map_err(|e| VoucherError::Key(format!("failed to parse public key: {}", e)))?;
        Ok(self.push(KeyEntity::new(verifying_key, None)))
    }

    /// Bind a check name to a key id. A later binding for the same name
    /// replaces the earlier one.
    pub fn bind(&mut self, name: impl Into<String>, key_id: impl Into<String>) {
        self.names.insert(name.into(), key_id.into());
    }

    /// Import a private key and bind it to a check name.
    pub fn add_signing_key(&mut self, name: &str, pem: &str) -> Result<String> {
        let key_id = self.add_private_key_pem(pem)?;
        self.bind(name, key_id.clone());
        debug!("Bound key {} to check {}", key_id, name);
        Ok(key_id)
    }

    /// Fingerprints of every imported key, in import order.
    pub fn key_ids(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.fingerprint.as_str()).collect()
    }

    /// A copy of this keyring that holds only public keys.
    pub fn public_keyring(&self) -> KeyRing {
        KeyRing {
            entities: self
                .entities
                .iter()
                .map(|e| KeyEntity::new(e.verifying_key, None))
                .collect(),
            names: self.names.clone(),
        }
    }

    fn push(&mut self, entity: KeyEntity) -> String {
        let fingerprint = entity.fingerprint.clone();
        self.entities.push(entity);
        fingerprint
    }

    fn entity_by_id(&self, key_id: &str) -> Option<&KeyEntity> {
        self.entities.iter().find(|e| e.fingerprint == key_id)
    }

    /// Resolve the signing key bound to a check name.
    fn signer_by_name(&self, name: &str) -> Result<(&str, &SigningKey)> {
        let entity = self
            .names
            .get(name)
            .and_then(|key_id| self.entity_by_id(key_id))
            .ok_or_else(|| VoucherError::NoSigningEntity(name.to_string()))?;

        let signing_key = entity
            .signing_key
            .as_ref()
            .ok_or_else(|| VoucherError::NoSigningEntity(name.to_string()))?;

        Ok((&entity.fingerprint, signing_key))
    }

    /// Key id bound to a check name, if it can sign.
    pub fn get_signer_by_name(&self, name: &str) -> Result<String> {
        self.signer_by_name(name).map(|(key_id, _)| key_id.to_string())
    }

    /// Produce an armored signed message over `body`.
    pub fn sign_message(&self, name: &str, body: &str) -> Result<SignatureOutput> {
        let (key_id, signing_key) = self.signer_by_name(name)?;

        let pae = create_dsse_pae(PAYLOAD_TYPE, body.as_bytes());
        let signature: Signature = signing_key.sign(&pae);

        let envelope = Envelope {
            payload_type: PAYLOAD_TYPE.to_string(),
            payload: BASE64.encode(body),
            signatures: vec![EnvelopeSignature {
                keyid: key_id.to_string(),
                sig: BASE64.encode(signature.to_der().as_bytes()),
            }],
        };

        Ok(SignatureOutput {
            signature: armor(&serde_json::to_vec(&envelope)?),
            key_id: key_id.to_string(),
        })
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("keys", &self.key_ids())
            .field("names", &self.names)
            .finish()
    }
}

#[async_trait]
impl AttestationSigner for KeyRing {
    async fn sign(&self, check_name: &str, body: &str) -> Result<SignatureOutput> {
        self.sign_message(check_name, body)
    }

    fn signer_type(&self) -> &'static str {
        "KeyRing"
    }
}

/// Verify an armored signed message against a keyring and return the body.
pub fn verify(keyring: &KeyRing, signed: &str) -> Result<String> {
    let envelope_bytes = dearmor(signed)?;
    let envelope: Envelope = serde_json::from_slice(&envelope_bytes)
        .map_err(|e| VoucherError::InvalidSignature(format!("malformed envelope: {}", e)))?;

    let signature = envelope.signatures.first().ok_or(VoucherError::Unsigned)?;

    let entity = keyring
        .entity_by_id(&signature.keyid)
        .ok_or_else(|| VoucherError::UnknownSigner(signature.keyid.clone()))?;

    let payload = BASE64
        .decode(&envelope.payload)
        .map_err(|e| VoucherError::InvalidSignature(format!("failed to decode payload: {}", e)))?;
    let sig_bytes = BASE64
        .decode(&signature.sig)
        .map_err(|e| VoucherError::InvalidSignature(format!("failed to decode signature: {}", e)))?;
    let sig = Signature::from_der(&sig_bytes)
        .map_err(|e| VoucherError::InvalidSignature(format!("failed to parse signature: {}", e)))?;

    let pae = create_dsse_pae(&envelope.payload_type, &payload);
    entity
        .verifying_key
        .verify(&pae, &sig)
        .map_err(|e| VoucherError::InvalidSignature(e.to_string()))?;

    String::from_utf8(payload)
        .map_err(|e| VoucherError::InvalidSignature(format!("payload is not UTF-8: {}", e)))
}

/// Uppercase hex of the leading bytes of SHA-256 over the uncompressed point.
pub fn fingerprint(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let digest = Sha256::digest(point.as_bytes());
    hex::encode_upper(&digest[..FINGERPRINT_LEN])
}

/// Create DSSE PAE (Pre-Authentication Encoding)
fn create_dsse_pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut pae = Vec::new();

    // DSSEv1 SP LEN(type) SP type SP LEN(payload) SP payload
    pae.extend_from_slice(b"DSSEv1");
    pae.push(b' ');
    pae.extend_from_slice(payload_type.len().to_string().as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_type.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload.len().to_string().as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload);

    pae
}

fn armor(data: &[u8]) -> String {
    let encoded = BASE64.encode(data);
    let mut out = String::with_capacity(encoded.len() + 128);
    out.push_str(ARMOR_BEGIN);
    out.push('\n');
    for chunk in encoded.as_bytes().chunks(ARMOR_LINE_LEN) {
        // base64 output is ASCII
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push('\n');
    }
    out.push_str(ARMOR_END);
    out.push('\n');
    out
}

fn dearmor(signed: &str) -> Result<Vec<u8>> {
    let mut lines = signed.lines().map(str::trim);

    if !lines.any(|line| line == ARMOR_BEGIN) {
        return Err(VoucherError::Unsigned);
    }

    let mut body = String::new();
    let mut terminated = false;
    for line in lines {
        if line == ARMOR_END {
            terminated = true;
            break;
        }
        body.push_str(line);
    }

    if !terminated {
        return Err(VoucherError::InvalidSignature("unterminated armor".into()));
    }

    BASE64
        .decode(body)
        .map_err(|e| VoucherError::InvalidSignature(format!("failed to decode armor: {}", e)))
}
