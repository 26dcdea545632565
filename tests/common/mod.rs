#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use voucher::attestation::{Attestation, SignedAttestation};
use voucher::checks::Check;
use voucher::metadata::{MetadataClient, idempotent};
use voucher::signer::{AttestationSigner, KeyRing};
use voucher::{BuildDetail, ImageReference, Result, VoucherError, Vulnerability};

pub const SNAKEOIL_KEY: &str = include_str!("../fixtures/snakeoil.key.pem");
pub const SNAKEOIL_PUB: &str = include_str!("../fixtures/snakeoil.pub.pem");
// Fixture key ids are P-256 fingerprints (leading 20 bytes of SHA-256 over the
// public point), not the OpenPGP v4 fingerprint of the classic snakeoil key
// (90E942641C07A4C466BA97161E92E2B4BB73E885).
pub const SNAKEOIL_FINGERPRINT: &str = "6AF6654103E6DE1E60EAFC725F40BDAC8DE861BF";
pub const DIY_KEY: &str = include_str!("../fixtures/diy.key.pem");
pub const DIY_FINGERPRINT: &str = "7771EB455F37738B05163A32989B996E44E4607D";

pub const DIGEST: &str = "sha256:cb749360c5198a55859dcb0e5cf1e2d4ff2e3bbbe5b5c7ebc1a3a7b8f2a3e1e0";

pub fn image() -> ImageReference {
    ImageReference::parse(&format!("gcr.io/example-project/app@{}", DIGEST)).unwrap()
}

pub fn keyring() -> KeyRing {
    let mut keyring = KeyRing::new();
    keyring.add_signing_key("snakeoil", SNAKEOIL_KEY).unwrap();
    keyring.add_signing_key("diy", DIY_KEY).unwrap();
    keyring
}

/// Check that returns a fixed outcome.
pub struct StaticCheck {
    pub passed: bool,
    pub error: Option<&'static str>,
}

impl StaticCheck {
    pub fn pass() -> Box<dyn Check> {
        Box::new(Self { passed: true, error: None })
    }

    pub fn fail() -> Box<dyn Check> {
        Box::new(Self { passed: false, error: None })
    }

    pub fn broken(error: &'static str) -> Box<dyn Check> {
        Box::new(Self { passed: false, error: Some(error) })
    }
}

#[async_trait]
impl Check for StaticCheck {
    async fn check(&self, _image: &ImageReference) -> Result<bool> {
        match self.error {
            Some(error) => Err(VoucherError::Api(error.to_string())),
            None => Ok(self.passed),
        }
    }
}

/// Check that panics while running.
pub struct PanickingCheck;

#[async_trait]
impl Check for PanickingCheck {
    async fn check(&self, _image: &ImageReference) -> Result<bool> {
        panic!("check exploded");
    }
}

/// Check that never finishes on its own.
pub struct HangingCheck;

#[async_trait]
impl Check for HangingCheck {
    async fn check(&self, _image: &ImageReference) -> Result<bool> {
        std::future::pending::<()>().await;
        Ok(true)
    }
}

/// In-memory metadata backend. Writes for an (image, check) pair that was
/// already stored report `AlreadyExists` and are absorbed.
#[derive(Default)]
pub struct MemoryMetadata {
    pub signer: Option<Arc<dyn AttestationSigner>>,
    pub build: Option<BuildDetail>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub stored: Mutex<HashMap<(String, String), SignedAttestation>>,
    pub writes: AtomicUsize,
    pub fail_writes_for: HashSet<String>,
}

impl MemoryMetadata {
    pub fn with_signer(signer: Arc<dyn AttestationSigner>) -> Self {
        Self {
            signer: Some(signer),
            ..Default::default()
        }
    }
}

#[async_trait]
impl MetadataClient for MemoryMetadata {
    fn can_attest(&self) -> bool {
        self.signer.is_some()
    }

    async fn get_build_detail(&self, _image: &ImageReference) -> Result<BuildDetail> {
        self.build.clone().ok_or(VoucherError::NoMetadata("build"))
    }

    async fn get_vulnerabilities(&self, _image: &ImageReference) -> Result<Vec<Vulnerability>> {
        Ok(self.vulnerabilities.clone())
    }

    async fn get_attestations(&self, image: &ImageReference) -> Result<Vec<SignedAttestation>> {
        let stored = self.stored.lock().unwrap();
        Ok(stored
            .iter()
            .filter(|((stored_image, _), _)| *stored_image == image.to_string())
            .map(|(_, attestation)| attestation.clone())
            .collect())
    }

    async fn add_attestation_to_image(
        &self,
        image: &ImageReference,
        attestation: Attestation,
    ) -> Result<SignedAttestation> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes_for.contains(&attestation.check_name) {
            return Err(VoucherError::Api("backend unavailable".into()));
        }

        let signer = self
            .signer
            .as_ref()
            .ok_or(VoucherError::MissingCollaborator("signer"))?;
        let signed = signer.sign(&attestation.check_name, &attestation.body).await?;

        let key = (image.to_string(), attestation.check_name.clone());
        let result = {
            let mut stored = self.stored.lock().unwrap();
            if stored.contains_key(&key) {
                Err(VoucherError::AlreadyExists)
            } else {
                let signed = SignedAttestation {
                    attestation: attestation.clone(),
                    signature: signed.signature,
                    key_id: signed.key_id,
                };
                stored.insert(key, signed.clone());
                Ok(signed)
            }
        };

        idempotent(attestation, result)
    }

    fn client_type(&self) -> &'static str {
        "Memory"
    }
}

/// A canned HTTP response.
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Request as seen by the test server.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub target: String,
    pub body: String,
}

/// Minimal HTTP/1.1 server answering each request with `handler`.
/// Returns the base URL and the log of received requests.
pub async fn serve<F>(handler: F) -> (String, Arc<Mutex<Vec<Request>>>)
where
    F: Fn(&Request) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    let server_log = Arc::clone(&log);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let handler = Arc::clone(&handler);
            let log = Arc::clone(&server_log);
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                let reply = handler(&request);
                log.lock().unwrap().push(request);

                let response = format!(
                    "HTTP/1.1 {} Status\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    reply.status,
                    reply.body.len(),
                    reply.body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}", address), log)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<Request> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(position) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break position + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < header_end + content_length {
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let mut request_line = head.lines().next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let body = String::from_utf8_lossy(&buffer[header_end..]).to_string();

    Some(Request { method, target, body })
}
