use crate::checks::{Check, ScannerCheck, VulnerabilityScanner};
use crate::image::ImageReference;
use crate::metadata::MetadataClient;
use crate::vulnerability::{Severity, Vulnerability, filter_vulnerabilities};
use crate::{Result, VoucherError};
use async_trait::async_trait;
use log::info;
use std::sync::Arc;

pub const NAME: &str = "snakeoil";

/// Passes when the scanner reports no vulnerabilities.
#[derive(Default)]
pub struct SnakeoilCheck {
    scanner: Option<Arc<dyn VulnerabilityScanner>>,
}

#[async_trait]
impl Check for SnakeoilCheck {
    async fn check(&self, image: &ImageReference) -> Result<bool> {
        let scanner = self
            .scanner
            .as_ref()
            .ok_or(VoucherError::MissingCollaborator("vulnerability scanner"))?;

        let vulnerabilities = scanner.scan(image).await?;
        for vulnerability in &vulnerabilities {
            info!(
                "{} has {} vulnerability {} (fixed by: {})",
                image,
                vulnerability.severity,
                vulnerability.name,
                if vulnerability.fixed_by.is_empty() { "none" } else { vulnerability.fixed_by.as_str() }
            );
        }

        Ok(vulnerabilities.is_empty())
    }

    fn as_scanner_check(&mut self) -> Option<&mut dyn ScannerCheck> {
        Some(self)
    }
}

impl ScannerCheck for SnakeoilCheck {
    fn set_scanner(&mut self, scanner: Arc<dyn VulnerabilityScanner>) {
        self.scanner = Some(scanner);
    }
}

/// Scanner that reads vulnerabilities from the metadata backend and keeps
/// those at or above the failure threshold.
pub struct MetadataScanner {
    client: Arc<dyn MetadataClient>,
    fail_on: Severity,
}

impl MetadataScanner {
    pub fn new(client: Arc<dyn MetadataClient>, fail_on: Severity) -> Self {
        Self { client, fail_on }
    }

    pub fn fail_on(&self) -> Severity {
        self.fail_on
    }
}

#[async_trait]
impl VulnerabilityScanner for MetadataScanner {
    async fn scan(&self, image: &ImageReference) -> Result<Vec<Vulnerability>> {
        let vulnerabilities = self.client.get_vulnerabilities(image).await?;
        Ok(filter_vulnerabilities(vulnerabilities, self.fail_on))
    }
}
