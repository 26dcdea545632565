mod common;

use async_trait::async_trait;
use common::{MemoryMetadata, image};
use std::sync::Arc;
use voucher::checks::approved::ApprovedCheck;
use voucher::checks::diy::DiyCheck;
use voucher::checks::nobody::NobodyCheck;
use voucher::checks::provenance::TrustedBuildCheck;
use voucher::checks::sbom::SbomExistsCheck;
use voucher::checks::snakeoil::SnakeoilCheck;
use voucher::checks::{
    Auth, Check, ImageConfig, MetadataScanner, RepositoryClient, SbomClient, VulnerabilityScanner,
};
use voucher::{
    BuildArtifact, BuildDetail, Collaborators, ImageReference, Result, Severity, VoucherError,
    Vulnerability,
};

struct FixedUser(&'static str);

#[async_trait]
impl Auth for FixedUser {
    async fn image_config(&self, _image: &ImageReference) -> Result<ImageConfig> {
        Ok(ImageConfig {
            user: self.0.to_string(),
        })
    }
}

struct ApprovedCommits(Vec<&'static str>);

#[async_trait]
impl RepositoryClient for ApprovedCommits {
    async fn is_commit_approved(&self, _repository_url: &str, commit: &str) -> Result<bool> {
        Ok(self.0.iter().any(|approved| *approved == commit))
    }
}

struct SbomStore(bool);

#[async_trait]
impl SbomClient for SbomStore {
    async fn has_sbom(&self, _image: &ImageReference) -> Result<bool> {
        Ok(self.0)
    }
}

fn wired(mut check: Box<dyn Check>, collaborators: &Collaborators) -> Box<dyn Check> {
    collaborators.wire(check.as_mut());
    check
}

fn trusted_build() -> BuildDetail {
    BuildDetail {
        repository_url: "https://github.com/example/app".into(),
        commit: "abc123".into(),
        build_creator: "builder@example.com".into(),
        build_url: "https://logs/1".into(),
        project_id: "example-project".into(),
        artifacts: vec![BuildArtifact {
            id: "gcr.io/example-project/app".into(),
            checksum: common::DIGEST.into(),
        }],
    }
}

fn metadata_with_build(build: BuildDetail) -> Arc<MemoryMetadata> {
    Arc::new(MemoryMetadata {
        build: Some(build),
        ..Default::default()
    })
}

fn vulnerability(name: &str, severity: Severity) -> Vulnerability {
    Vulnerability {
        name: name.to_string(),
        description: String::new(),
        fixed_by: String::new(),
        severity,
    }
}

// ===== diy =====

#[tokio::test]
async fn test_diy_accepts_valid_repo_prefix() {
    let check = DiyCheck::new(vec!["gcr.io/example-project/".to_string()]);
    assert!(check.check(&image()).await.unwrap());
}

#[tokio::test]
async fn test_diy_rejects_other_repos() {
    let check = DiyCheck::new(vec!["gcr.io/other-project/".to_string(), String::new()]);
    assert!(!check.check(&image()).await.unwrap());

    let check = DiyCheck::default();
    assert!(!check.check(&image()).await.unwrap());
}

// ===== nobody =====

#[tokio::test]
async fn test_nobody_user_rules() {
    let cases = [
        ("", false),
        ("root", false),
        ("0", false),
        ("0:0", false),
        ("root:staff", false),
        ("nobody", true),
        ("65534", true),
        ("app:app", true),
    ];

    for (user, expected) in cases {
        let collaborators = Collaborators {
            auth: Some(Arc::new(FixedUser(user))),
            ..Default::default()
        };
        let check = wired(Box::new(NobodyCheck::default()), &collaborators);
        assert_eq!(check.check(&image()).await.unwrap(), expected, "user {:?}", user);
    }
}

#[tokio::test]
async fn test_nobody_requires_auth() {
    let check = wired(Box::new(NobodyCheck::default()), &Collaborators::default());
    let err = check.check(&image()).await.unwrap_err();
    assert!(matches!(err, VoucherError::MissingCollaborator("auth")));
}

// ===== provenance =====

fn provenance_collaborators(build: BuildDetail) -> Collaborators {
    Collaborators {
        metadata_client: Some(metadata_with_build(build)),
        trusted_build_creators: vec!["builder@example.com".into()],
        trusted_projects: vec!["example-project".into()],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_provenance_trusted_build() {
    let check = wired(
        Box::new(TrustedBuildCheck::default()),
        &provenance_collaborators(trusted_build()),
    );
    assert!(check.check(&image()).await.unwrap());
}

#[tokio::test]
async fn test_provenance_untrusted_creator() {
    let build = BuildDetail {
        build_creator: "someone@else.com".into(),
        ..trusted_build()
    };
    let check = wired(Box::new(TrustedBuildCheck::default()), &provenance_collaborators(build));
    assert!(!check.check(&image()).await.unwrap());
}

#[tokio::test]
async fn test_provenance_untrusted_project() {
    let build = BuildDetail {
        project_id: "other-project".into(),
        ..trusted_build()
    };
    let check = wired(Box::new(TrustedBuildCheck::default()), &provenance_collaborators(build));
    assert!(!check.check(&image()).await.unwrap());
}

#[tokio::test]
async fn test_provenance_digest_mismatch() {
    let build = BuildDetail {
        artifacts: vec![BuildArtifact {
            id: "gcr.io/example-project/app".into(),
            checksum: format!("sha256:{}", "0".repeat(64)),
        }],
        ..trusted_build()
    };
    let check = wired(Box::new(TrustedBuildCheck::default()), &provenance_collaborators(build));
    assert!(!check.check(&image()).await.unwrap());
}

#[tokio::test]
async fn test_provenance_missing_build_is_an_error() {
    let collaborators = Collaborators {
        metadata_client: Some(Arc::new(MemoryMetadata::default())),
        ..provenance_collaborators(trusted_build())
    };
    let check = wired(Box::new(TrustedBuildCheck::default()), &collaborators);

    let err = check.check(&image()).await.unwrap_err();
    assert!(err.is_no_metadata());
}

#[tokio::test]
async fn test_provenance_requires_metadata_client() {
    let check = wired(Box::new(TrustedBuildCheck::default()), &Collaborators::default());
    let err = check.check(&image()).await.unwrap_err();
    assert!(matches!(err, VoucherError::MissingCollaborator(_)));
}

// ===== snakeoil =====

fn scanner_over(vulnerabilities: Vec<Vulnerability>, fail_on: Severity) -> Arc<dyn VulnerabilityScanner> {
    let metadata = Arc::new(MemoryMetadata {
        vulnerabilities,
        ..Default::default()
    });
    Arc::new(MetadataScanner::new(metadata, fail_on))
}

#[tokio::test]
async fn test_snakeoil_passes_below_threshold() {
    let collaborators = Collaborators {
        scanner: Some(scanner_over(
            vec![
                vulnerability("CVE-2024-0001", Severity::Low),
                vulnerability("CVE-2024-0002", Severity::Medium),
            ],
            Severity::High,
        )),
        ..Default::default()
    };
    let check = wired(Box::new(SnakeoilCheck::default()), &collaborators);
    assert!(check.check(&image()).await.unwrap());
}

#[tokio::test]
async fn test_snakeoil_fails_at_threshold() {
    let collaborators = Collaborators {
        scanner: Some(scanner_over(
            vec![
                vulnerability("CVE-2024-0001", Severity::Low),
                vulnerability("CVE-2024-0003", Severity::High),
            ],
            Severity::High,
        )),
        ..Default::default()
    };
    let check = wired(Box::new(SnakeoilCheck::default()), &collaborators);
    assert!(!check.check(&image()).await.unwrap());
}

#[tokio::test]
async fn test_metadata_scanner_filters_by_threshold() {
    let scanner = scanner_over(
        vec![
            vulnerability("low", Severity::Low),
            vulnerability("unknown", Severity::Unknown),
            vulnerability("critical", Severity::Critical),
        ],
        Severity::Medium,
    );

    let names: Vec<String> = scanner
        .scan(&image())
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.name)
        .collect();
    assert_eq!(names, vec!["unknown", "critical"]);
}

#[tokio::test]
async fn test_snakeoil_requires_scanner() {
    let check = wired(Box::new(SnakeoilCheck::default()), &Collaborators::default());
    assert!(check.check(&image()).await.is_err());
}

// ===== sbom =====

#[tokio::test]
async fn test_sbom_check() {
    for present in [true, false] {
        let collaborators = Collaborators {
            sbom_client: Some(Arc::new(SbomStore(present))),
            ..Default::default()
        };
        let check = wired(Box::new(SbomExistsCheck::default()), &collaborators);
        assert_eq!(check.check(&image()).await.unwrap(), present);
    }

    let check = wired(Box::new(SbomExistsCheck::default()), &Collaborators::default());
    assert!(check.check(&image()).await.is_err());
}

// ===== approved =====

fn approved_collaborators(build: BuildDetail) -> Collaborators {
    Collaborators {
        metadata_client: Some(metadata_with_build(build)),
        repository_client: Some(Arc::new(ApprovedCommits(vec!["abc123"]))),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_approved_commit() {
    let check = wired(Box::new(ApprovedCheck::default()), &approved_collaborators(trusted_build()));
    assert!(check.check(&image()).await.unwrap());
}

#[tokio::test]
async fn test_unapproved_commit() {
    let build = BuildDetail {
        commit: "def456".into(),
        ..trusted_build()
    };
    let check = wired(Box::new(ApprovedCheck::default()), &approved_collaborators(build));
    assert!(!check.check(&image()).await.unwrap());
}

#[tokio::test]
async fn test_build_without_source_is_not_approved() {
    let build = BuildDetail {
        repository_url: String::new(),
        ..trusted_build()
    };
    let check = wired(Box::new(ApprovedCheck::default()), &approved_collaborators(build));
    assert!(!check.check(&image()).await.unwrap());
}

#[tokio::test]
async fn test_approved_requires_repository_client() {
    let collaborators = Collaborators {
        repository_client: None,
        ..approved_collaborators(trusted_build())
    };
    let check = wired(Box::new(ApprovedCheck::default()), &collaborators);
    let err = check.check(&image()).await.unwrap_err();
    assert!(matches!(err, VoucherError::MissingCollaborator("repository client")));
}
