pub mod approved;
pub mod diy;
pub mod nobody;
pub mod provenance;
pub mod registry;
pub mod sbom;
pub mod snakeoil;

use crate::image::ImageReference;
use crate::metadata::MetadataClient;
use crate::vulnerability::Vulnerability;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use registry::{CheckFactory, CheckRegistry, register_builtin_checks};
pub use snakeoil::MetadataScanner;

/// One named unit of image trust logic.
///
/// `Ok(false)` means the image does not satisfy the check. `Err` means the
/// check could not be evaluated, e.g. a collaborator was unreachable or
/// was never provided.
///
/// Checks opt into collaborators by overriding the `as_*` accessors; the
/// suite wires whatever each check exposes before running it.
#[async_trait]
pub trait Check: Send + Sync {
    async fn check(&self, image: &ImageReference) -> Result<bool>;

    fn as_auth_check(&mut self) -> Option<&mut dyn AuthCheck> {
        None
    }

    fn as_scanner_check(&mut self) -> Option<&mut dyn ScannerCheck> {
        None
    }

    fn as_metadata_check(&mut self) -> Option<&mut dyn MetadataCheck> {
        None
    }

    fn as_repository_check(&mut self) -> Option<&mut dyn RepositoryCheck> {
        None
    }

    fn as_sbom_check(&mut self) -> Option<&mut dyn SbomCheck> {
        None
    }

    fn as_valid_repos_check(&mut self) -> Option<&mut dyn ValidReposCheck> {
        None
    }

    fn as_provenance_check(&mut self) -> Option<&mut dyn ProvenanceCheck> {
        None
    }
}

// ===== Capabilities =====

pub trait AuthCheck {
    fn set_auth(&mut self, auth: Arc<dyn Auth>);
}

pub trait ScannerCheck {
    fn set_scanner(&mut self, scanner: Arc<dyn VulnerabilityScanner>);
}

pub trait MetadataCheck {
    fn set_metadata_client(&mut self, client: Arc<dyn MetadataClient>);
}

pub trait RepositoryCheck {
    fn set_repository_client(&mut self, client: Arc<dyn RepositoryClient>);
}

pub trait SbomCheck {
    fn set_sbom_client(&mut self, client: Arc<dyn SbomClient>);
}

pub trait ValidReposCheck {
    fn set_valid_repos(&mut self, repos: Vec<String>);
}

pub trait ProvenanceCheck {
    fn set_trusted_build_creators_and_projects(&mut self, creators: Vec<String>, projects: Vec<String>);
}

// ===== Collaborators =====

/// Subset of an image's runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// User the entrypoint runs as; empty means root
    #[serde(default)]
    pub user: String,
}

/// Authenticated access to the image registry
#[async_trait]
pub trait Auth: Send + Sync {
    async fn image_config(&self, image: &ImageReference) -> Result<ImageConfig>;
}

/// Source of vulnerabilities that should fail an image
#[async_trait]
pub trait VulnerabilityScanner: Send + Sync {
    async fn scan(&self, image: &ImageReference) -> Result<Vec<Vulnerability>>;
}

/// Version control host holding the image's source
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Whether `commit` went through review and landed on the default branch
    async fn is_commit_approved(&self, repository_url: &str, commit: &str) -> Result<bool>;
}

/// Store of software bills of materials
#[async_trait]
pub trait SbomClient: Send + Sync {
    async fn has_sbom(&self, image: &ImageReference) -> Result<bool>;
}

/// Everything a suite can hand to its checks.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub auth: Option<Arc<dyn Auth>>,
    pub scanner: Option<Arc<dyn VulnerabilityScanner>>,
    pub metadata_client: Option<Arc<dyn MetadataClient>>,
    pub repository_client: Option<Arc<dyn RepositoryClient>>,
    pub sbom_client: Option<Arc<dyn SbomClient>>,
    pub valid_repos: Vec<String>,
    pub trusted_build_creators: Vec<String>,
    pub trusted_projects: Vec<String>,
}

impl Collaborators {
    /// Hand each collaborator to the checks that can take it. Checks that
    /// need a missing collaborator fail when run.
    pub fn wire(&self, check: &mut dyn Check) {
        if let (Some(auth), Some(target)) = (&self.auth, check.as_auth_check()) {
            target.set_auth(Arc::clone(auth));
        }
        if let (Some(scanner), Some(target)) = (&self.scanner, check.as_scanner_check()) {
            target.set_scanner(Arc::clone(scanner));
        }
        if let (Some(client), Some(target)) = (&self.metadata_client, check.as_metadata_check()) {
            target.set_metadata_client(Arc::clone(client));
        }
        if let (Some(client), Some(target)) =
            (&self.repository_client, check.as_repository_check())
        {
            target.set_repository_client(Arc::clone(client));
        }
        if let (Some(client), Some(target)) = (&self.sbom_client, check.as_sbom_check()) {
            target.set_sbom_client(Arc::clone(client));
        }
        if let Some(target) = check.as_valid_repos_check() {
            target.set_valid_repos(self.valid_repos.clone());
        }
        if let Some(target) = check.as_provenance_check() {
            target.set_trusted_build_creators_and_projects(
                self.trusted_build_creators.clone(),
                self.trusted_projects.clone(),
            );
        }
    }
}
