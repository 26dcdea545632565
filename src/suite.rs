//! Runs a set of checks against one image and attests the ones that pass.

use crate::attestation::Attestation;
use crate::checks::{Check, CheckRegistry, Collaborators};
use crate::image::ImageReference;
use crate::metadata::MetadataClient;
use crate::response::CheckResult;
use crate::{Result, VoucherError};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};

/// Named checks to run against an image
#[derive(Default)]
pub struct Suite {
    checks: BTreeMap<String, Arc<dyn Check>>,
    timeout: Option<Duration>,
}

impl Suite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a suite from registered checks, wiring collaborators into each.
    pub fn from_registry<S: AsRef<str>>(
        registry: &CheckRegistry,
        names: &[S],
        collaborators: &Collaborators,
    ) -> Result<Self> {
        let mut suite = Self::new();
        for (name, mut check) in registry.get(names)? {
            collaborators.wire(check.as_mut());
            suite.add(name, check);
        }
        Ok(suite)
    }

    /// Abort any check still running after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add a check. A name that is already present keeps its first check.
    pub fn add(&mut self, name: impl Into<String>, check: Box<dyn Check>) -> bool {
        let name = name.into();
        if self.checks.contains_key(&name) {
            debug!("Suite already has a check named {}, ignoring", name);
            return false;
        }
        self.checks.insert(name, Arc::from(check));
        true
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.checks.keys().map(String::as_str).collect()
    }

    /// Run every check concurrently. Returns one result per check in
    /// completion order.
    ///
    /// Dropping the returned future aborts every check still running.
    pub async fn run(&self, image: &ImageReference) -> Vec<CheckResult> {
        let mut tasks = JoinSet::new();

        for (name, check) in &self.checks {
            tasks.spawn(run_check(
                name.clone(),
                Arc::clone(check),
                image.clone(),
                self.timeout,
            ));
        }

        let mut results = Vec::with_capacity(self.checks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                // run_check absorbs check panics; this only fires on outside cancellation.
                Err(e) => warn!("Check task did not complete: {}", e),
            }
        }
        results
    }

    /// Sign and store an attestation for every passing result, one at a
    /// time. Failures are recorded on the result; `success` is never changed.
    pub async fn attest(
        &self,
        client: &dyn MetadataClient,
        mut results: Vec<CheckResult>,
    ) -> Vec<CheckResult> {
        for result in results.iter_mut().filter(|r| r.success) {
            match attest_result(client, result).await {
                Ok(signed) => {
                    info!("Attested {} for {}", result.name, result.image);
                    result.attested = true;
                    result.details = Some(signed);
                }
                Err(e) => {
                    warn!("Failed to attest {} for {}: {}", result.name, result.image, e);
                    result.attested = false;
                    result.error = Some(e.to_string());
                }
            }
        }
        results
    }

    /// [`run`](Self::run) followed by [`attest`](Self::attest).
    pub async fn run_and_attest(
        &self,
        client: &dyn MetadataClient,
        image: &ImageReference,
    ) -> Vec<CheckResult> {
        let results = self.run(image).await;
        self.attest(client, results).await
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn run_check(
    name: String,
    check: Arc<dyn Check>,
    image: ImageReference,
    timeout: Option<Duration>,
) -> CheckResult {
    let task_image = image.clone();
    // The check runs in its own task so a panic surfaces as a JoinError.
    let mut task = AbortOnDrop(tokio::spawn(async move { check.check(&task_image).await }));

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut task.0).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("Check {} timed out after {:?}", name, limit);
                return CheckResult::errored(name, &image, VoucherError::Timeout);
            }
        },
        None => (&mut task.0).await,
    };

    match joined {
        Ok(Ok(passed)) => {
            debug!("Check {} finished: passed={}", name, passed);
            CheckResult::new(name, &image, passed)
        }
        Ok(Err(e)) => {
            debug!("Check {} failed to run: {}", name, e);
            CheckResult::errored(name, &image, e)
        }
        Err(e) => {
            warn!("Check {} did not complete: {}", name, e);
            CheckResult::errored(name, &image, format!("check did not complete: {}", e))
        }
    }
}

async fn attest_result(
    client: &dyn MetadataClient,
    result: &CheckResult,
) -> Result<crate::attestation::SignedAttestation> {
    let body = client.new_payload_body(&result.image).await?;
    let attestation = Attestation::new(result.name.clone(), body);
    client.add_attestation_to_image(&result.image, attestation).await
}
