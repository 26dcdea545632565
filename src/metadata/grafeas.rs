//! Hosted metadata service client.
//!
//! Talks to the occurrences surface of a Grafeas-compatible API. Build,
//! vulnerability, discovery and attestation records are all occurrences
//! of different kinds attached to the image's resource URI.

use crate::attestation::{Attestation, SignedAttestation};
use crate::build::{BuildArtifact, BuildDetail};
use crate::image::ImageReference;
use crate::metadata::poll::{DiscoverySource, DiscoveryStatus, PollSettings, poll_for_discoveries};
use crate::metadata::{MetadataClient, idempotent};
use crate::signer::AttestationSigner;
use crate::vulnerability::{Severity, Vulnerability};
use crate::{Result, VoucherError};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use log::{debug, warn};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const GRAFEAS_API_URL: &str = "https://containeranalysis.googleapis.com";
const USER_AGENT_VALUE: &str = "voucher/0.1.0";
const PAGE_SIZE: &str = "100";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OccurrenceKind {
    Build,
    Vulnerability,
    Discovery,
    Attestation,
}

impl OccurrenceKind {
    fn as_str(self) -> &'static str {
        match self {
            OccurrenceKind::Build => "BUILD",
            OccurrenceKind::Vulnerability => "VULNERABILITY",
            OccurrenceKind::Discovery => "DISCOVERY",
            OccurrenceKind::Attestation => "ATTESTATION",
        }
    }

    fn metadata_name(self) -> &'static str {
        match self {
            OccurrenceKind::Build => "build",
            OccurrenceKind::Vulnerability => "vulnerability",
            OccurrenceKind::Discovery => "discovery",
            OccurrenceKind::Attestation => "attestation",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListOccurrencesResponse {
    #[serde(default)]
    occurrences: Vec<Occurrence>,
    #[serde(default)]
    next_page_token: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct Occurrence {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default)]
    resource_uri: String,
    #[serde(default)]
    note_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    build: Option<BuildOccurrence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vulnerability: Option<VulnerabilityOccurrence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    discovery: Option<DiscoveryOccurrence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attestation: Option<AttestationOccurrence>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct BuildOccurrence {
    #[serde(default)]
    provenance: BuildProvenance,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildProvenance {
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    creator: String,
    #[serde(default)]
    logs_uri: String,
    #[serde(default)]
    built_artifacts: Vec<BuiltArtifact>,
    #[serde(default)]
    source_provenance: Option<SourceProvenance>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct BuiltArtifact {
    #[serde(default)]
    id: String,
    #[serde(default)]
    checksum: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct SourceProvenance {
    #[serde(default)]
    context: Option<SourceContext>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct SourceContext {
    #[serde(default)]
    git: Option<GitSourceContext>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct GitSourceContext {
    #[serde(default)]
    url: String,
    #[serde(default)]
    revision_id: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct VulnerabilityOccurrence {
    #[serde(default)]
    severity: String,
    #[serde(default)]
    effective_severity: String,
    #[serde(default)]
    short_description: String,
    #[serde(default)]
    package_issue: Vec<PackageIssue>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct PackageIssue {
    #[serde(default)]
    fixed_location: Option<FixedLocation>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct FixedLocation {
    #[serde(default)]
    version: Option<Version>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Version {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveryOccurrence {
    // Omitted by the API while unspecified.
    #[serde(default)]
    analysis_status: DiscoveryStatus,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttestationOccurrence {
    serialized_payload: String,
    #[serde(default)]
    signatures: Vec<OccurrenceSignature>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct OccurrenceSignature {
    signature: String,
    public_key_id: String,
}

/// Metadata client for a Grafeas-compatible occurrences API
pub struct GrafeasClient {
    client: reqwest::Client,
    base_url: String,
    /// Project holding image metadata
    project: String,
    /// Project holding the attestation notes
    binauth_project: String,
    signer: Option<Arc<dyn AttestationSigner>>,
    poll: PollSettings,
}

impl GrafeasClient {
    pub fn new(
        project: impl Into<String>,
        binauth_project: impl Into<String>,
        token: Option<&str>,
    ) -> Result<Self> {
        Self::with_base_url(GRAFEAS_API_URL, project, binauth_project, token)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        project: impl Into<String>,
        binauth_project: impl Into<String>,
        token: Option<&str>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        if let Some(token) = token {
            let auth_value = format!("Bearer {}", token);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value).map_err(|e| VoucherError::Api(e.to_string()))?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project: project.into(),
            binauth_project: binauth_project.into(),
            signer: None,
            poll: PollSettings::default(),
        })
    }

    /// Sign attestations with `signer`; without one the client is read-only.
    pub fn with_signer(mut self, signer: Arc<dyn AttestationSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    fn resource_uri(image: &ImageReference) -> String {
        format!("https://{}", image)
    }

    fn note_name(&self, check_name: &str) -> String {
        format!("projects/{}/notes/{}", self.binauth_project, check_name)
    }

    async fn list_occurrences(
        &self,
        image: &ImageReference,
        kind: OccurrenceKind,
    ) -> Result<Vec<Occurrence>> {
        let url = format!("{}/v1/projects/{}/occurrences", self.base_url, self.project);
        let filter = format!(
            "resourceUrl=\"{}\" AND kind=\"{}\"",
            Self::resource_uri(image),
            kind.as_str()
        );

        let mut occurrences = Vec::new();
        let mut page_token = String::new();
        loop {
            let mut query = vec![("filter", filter.as_str()), ("pageSize", PAGE_SIZE)];
            if !page_token.is_empty() {
                query.push(("pageToken", page_token.as_str()));
            }

            let response = self.client.get(&url).query(&query).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(VoucherError::NoMetadata(kind.metadata_name()));
            }
            let response = check_status(response).await?;
            let page: ListOccurrencesResponse = response.json().await?;
            occurrences.extend(page.occurrences);

            if page.next_page_token.is_empty() {
                break;
            }
            page_token = page.next_page_token;
        }

        if occurrences.is_empty() {
            return Err(VoucherError::NoMetadata(kind.metadata_name()));
        }

        Ok(occurrences)
    }

    async fn create_occurrence(&self, occurrence: &Occurrence) -> Result<()> {
        let url = format!("{}/v1/projects/{}/occurrences", self.base_url, self.project);
        let response = self.client.post(&url).json(occurrence).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl DiscoverySource for GrafeasClient {
    async fn get_discoveries(&self, image: &ImageReference) -> Result<Vec<DiscoveryStatus>> {
        let occurrences = self.list_occurrences(image, OccurrenceKind::Discovery).await?;
        Ok(occurrences
            .into_iter()
            .filter_map(|o| o.discovery.map(|d| d.analysis_status))
            .collect())
    }
}

#[async_trait]
impl MetadataClient for GrafeasClient {
    fn can_attest(&self) -> bool {
        self.signer.is_some()
    }

    async fn get_build_detail(&self, image: &ImageReference) -> Result<BuildDetail> {
        let occurrences = self.list_occurrences(image, OccurrenceKind::Build).await?;

        if occurrences.len() > 1 {
            warn!("Found {} build occurrences for {}, using the first", occurrences.len(), image);
        }

        occurrences
            .into_iter()
            .find_map(|o| o.build)
            .map(|build| build_detail(build.provenance))
            .ok_or(VoucherError::NoMetadata("build"))
    }

    async fn get_vulnerabilities(&self, image: &ImageReference) -> Result<Vec<Vulnerability>> {
        poll_for_discoveries(self, image, self.poll).await?;

        let occurrences = match self.list_occurrences(image, OccurrenceKind::Vulnerability).await {
            Ok(occurrences) => occurrences,
            // A finished scan with no findings.
            Err(e) if e.is_no_metadata() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(occurrences
            .into_iter()
            .filter_map(|o| {
                let name = short_name(&o.note_name).to_string();
                o.vulnerability.map(|v| vulnerability(name, v))
            })
            .collect())
    }

    async fn get_attestations(&self, image: &ImageReference) -> Result<Vec<SignedAttestation>> {
        let occurrences = self.list_occurrences(image, OccurrenceKind::Attestation).await?;

        let mut attestations = Vec::new();
        for occurrence in occurrences {
            let Some(stored) = occurrence.attestation else {
                continue;
            };
            let body = BASE64
                .decode(&stored.serialized_payload)
                .map_err(|e| VoucherError::Api(format!("failed to decode payload: {}", e)))?;
            let signature = stored.signatures.into_iter().next().unwrap_or_default();
            let decoded_signature = BASE64
                .decode(&signature.signature)
                .map_err(|e| VoucherError::Api(format!("failed to decode signature: {}", e)))?;

            attestations.push(SignedAttestation {
                attestation: Attestation::new(
                    short_name(&occurrence.note_name),
                    String::from_utf8_lossy(&body),
                ),
                signature: String::from_utf8_lossy(&decoded_signature).into_owned(),
                key_id: signature.public_key_id,
            });
        }

        Ok(attestations)
    }

    async fn add_attestation_to_image(
        &self,
        image: &ImageReference,
        attestation: Attestation,
    ) -> Result<SignedAttestation> {
        let signer = self
            .signer
            .as_ref()
            .ok_or(VoucherError::MissingCollaborator("signer"))?;

        let signed = signer.sign(&attestation.check_name, &attestation.body).await?;

        let occurrence = Occurrence {
            resource_uri: Self::resource_uri(image),
            note_name: self.note_name(&attestation.check_name),
            attestation: Some(AttestationOccurrence {
                serialized_payload: BASE64.encode(&attestation.body),
                signatures: vec![OccurrenceSignature {
                    signature: BASE64.encode(&signed.signature),
                    public_key_id: signed.key_id.clone(),
                }],
            }),
            ..Default::default()
        };

        debug!("Creating {} attestation for {}", attestation.check_name, image);
        let created = self.create_occurrence(&occurrence).await.map(|()| SignedAttestation {
            attestation: attestation.clone(),
            signature: signed.signature,
            key_id: signed.key_id,
        });

        idempotent(attestation, created)
    }

    fn client_type(&self) -> &'static str {
        "Grafeas"
    }
}

/// Map a non-success response onto the error taxonomy.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::CONFLICT {
        return Err(VoucherError::AlreadyExists);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(VoucherError::Api(format!(
        "metadata API returned {}: {}",
        status, body
    )))
}

fn build_detail(provenance: BuildProvenance) -> BuildDetail {
    let git = provenance
        .source_provenance
        .and_then(|s| s.context)
        .and_then(|c| c.git)
        .unwrap_or_default();

    BuildDetail {
        repository_url: git.url,
        commit: git.revision_id,
        build_creator: provenance.creator,
        build_url: provenance.logs_uri,
        project_id: provenance.project_id,
        artifacts: provenance
            .built_artifacts
            .into_iter()
            .map(|a| BuildArtifact {
                id: a.id,
                checksum: a.checksum,
            })
            .collect(),
    }
}

fn vulnerability(name: String, occurrence: VulnerabilityOccurrence) -> Vulnerability {
    let severity_name = if occurrence.effective_severity.is_empty() {
        &occurrence.severity
    } else {
        &occurrence.effective_severity
    };
    let severity = severity_name.parse().unwrap_or(Severity::Unknown);

    let fixed_by = occurrence
        .package_issue
        .into_iter()
        .find_map(|issue| issue.fixed_location.and_then(|l| l.version))
        .map(|v| v.name)
        .unwrap_or_default();

    Vulnerability {
        name,
        description: occurrence.short_description,
        fixed_by,
        severity,
    }
}

fn short_name(resource: &str) -> &str {
    resource.rsplit('/').next().unwrap_or(resource)
}
