//! Configuration for a voucher deployment.
//!
//! A typical configuration file looks like:
//! ```toml
//! checks = ["diy", "nobody", "provenance", "snakeoil"]
//! failon = "high"
//! valid_repos = ["gcr.io/example-project/"]
//! timeout_secs = 240
//!
//! [trusted]
//! build_creators = ["builder@example-project.iam.gserviceaccount.com"]
//! projects = ["example-project"]
//!
//! # PEM private keys for the local keyring, by check name
//! [keys]
//! diy = "/etc/voucher/keys/diy.pem"
//!
//! # Or KMS keys, by check name
//! [kms_keys.snakeoil]
//! path = "projects/p/locations/global/keyRings/r/cryptoKeys/k/cryptoKeyVersions/1"
//! algo = "SHA512"
//!
//! [metadata]
//! project = "example-project"
//! binauth_project = "example-binauth"
//! vulnerability_attempts = 6
//! vulnerability_sleep_secs = 10
//! ```

use crate::checks::{CheckRegistry, Collaborators};
use crate::metadata::PollSettings;
use crate::signer::{KeyRing, KmsClient, KmsKey, KmsSigner};
use crate::suite::Suite;
use crate::vulnerability::Severity;
use crate::{Result, VoucherError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_FAIL_ON: &str = "high";

/// Deployment configuration, usually parsed from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Checks to run for every image.
    #[serde(default)]
    pub checks: Vec<String>,

    /// Lowest severity that fails the vulnerability check.
    #[serde(default)]
    pub failon: Option<String>,

    /// Repository prefixes the organization owns.
    #[serde(default)]
    pub valid_repos: Vec<String>,

    /// Deadline for each check in a suite run, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub trusted: TrustedConfig,

    /// PEM private key files for the local keyring, by check name.
    #[serde(default)]
    pub keys: HashMap<String, PathBuf>,

    /// KMS key bindings, by check name.
    #[serde(default)]
    pub kms_keys: HashMap<String, KmsKey>,

    #[serde(default)]
    pub metadata: MetadataConfig,
}

/// Identities trusted to produce images.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrustedConfig {
    #[serde(default)]
    pub build_creators: Vec<String>,
    #[serde(default)]
    pub projects: Vec<String>,
}

/// Metadata backend settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataConfig {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub binauth_project: String,
    #[serde(default)]
    pub vulnerability_attempts: Option<u32>,
    #[serde(default)]
    pub vulnerability_sleep_secs: Option<u64>,
}

impl Config {
    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.fail_on()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VoucherError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Severity threshold for vulnerability checks.
    pub fn fail_on(&self) -> Result<Severity> {
        self.failon.as_deref().unwrap_or(DEFAULT_FAIL_ON).parse()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn poll_settings(&self) -> PollSettings {
        let defaults = PollSettings::default();
        PollSettings {
            attempts: self.metadata.vulnerability_attempts.unwrap_or(defaults.attempts),
            sleep: self
                .metadata
                .vulnerability_sleep_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.sleep),
        }
    }

    /// Load the local keyring from the configured key files.
    pub async fn keyring(&self) -> Result<KeyRing> {
        KeyRing::from_files(&self.keys).await
    }

    /// A KMS signer for the configured bindings, if there are any.
    pub fn kms_signer(&self, client: Arc<dyn KmsClient>) -> Option<KmsSigner> {
        if self.kms_keys.is_empty() {
            return None;
        }
        Some(KmsSigner::new(client, self.kms_keys.clone()))
    }

    /// Collaborators carrying the configured trust lists. Clients are
    /// added by the caller.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            valid_repos: self.valid_repos.clone(),
            trusted_build_creators: self.trusted.build_creators.clone(),
            trusted_projects: self.trusted.projects.clone(),
            ..Default::default()
        }
    }

    /// Build the configured suite from a registry.
    pub fn build_suite(
        &self,
        registry: &CheckRegistry,
        collaborators: &Collaborators,
    ) -> Result<Suite> {
        if self.checks.is_empty() {
            return Err(VoucherError::Config("no checks configured".into()));
        }

        let suite = Suite::from_registry(registry, &self.checks, collaborators)?;
        Ok(match self.timeout() {
            Some(timeout) => suite.with_timeout(timeout),
            None => suite,
        })
    }
}
