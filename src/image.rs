use crate::{Result, VoucherError};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const DIGEST_ALGORITHM: &str = "sha256";
const DIGEST_HEX_LEN: usize = 64;

/// A digest-pinned reference to a single container image.
///
/// Attestations are bound to the image digest, so a reference without a
/// digest (`registry/repo:tag`) is rejected at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    registry: String,
    repository: String,
    digest: String,
}

impl ImageReference {
    /// Parse `host/path[:tag]@sha256:<hex>`. The tag, if present, is dropped.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        let (name, digest) = reference.split_once('@').ok_or_else(|| {
            VoucherError::InvalidReference(format!("{} is not digest-pinned", reference))
        })?;

        validate_digest(digest)?;

        let (registry, path) = name.split_once('/').ok_or_else(|| {
            VoucherError::InvalidReference(format!("{} has no repository path", reference))
        })?;

        if !is_registry_host(registry) {
            return Err(VoucherError::InvalidReference(format!(
                "{} does not name a registry host",
                reference
            )));
        }

        // Strip a tag from the last path component only, so ports on the
        // registry host are left alone.
        let repository = match path.rsplit_once(':') {
            Some((repo, _tag)) if !repo.is_empty() => repo,
            Some(_) => {
                return Err(VoucherError::InvalidReference(format!(
                    "{} has an empty repository",
                    reference
                )));
            }
            None => path,
        };

        if repository.is_empty()
            || repository
                .split('/')
                .any(|component| component.is_empty() || !is_path_component(component))
        {
            return Err(VoucherError::InvalidReference(format!(
                "{} has an invalid repository path",
                reference
            )));
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            digest: digest.to_string(),
        })
    }

    /// Registry host, including the port if one was given.
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Repository path below the registry host.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Content digest in `sha256:<hex>` form.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Fully qualified name without the digest (`host/path`).
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// The digest's hex part, without the algorithm prefix.
    pub fn digest_hex(&self) -> &str {
        self.digest
            .split_once(':')
            .map(|(_, hex)| hex)
            .unwrap_or(&self.digest)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.registry, self.repository, self.digest)
    }
}

impl FromStr for ImageReference {
    type Err = VoucherError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ImageReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn validate_digest(digest: &str) -> Result<()> {
    let (algorithm, hex) = digest
        .split_once(':')
        .ok_or_else(|| VoucherError::InvalidReference(format!("malformed digest {}", digest)))?;

    if algorithm != DIGEST_ALGORITHM {
        return Err(VoucherError::InvalidReference(format!(
            "unsupported digest algorithm {}",
            algorithm
        )));
    }

    if hex.len() != DIGEST_HEX_LEN
        || !hex
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        return Err(VoucherError::InvalidReference(format!(
            "digest {} is not {} lowercase hex characters",
            digest, DIGEST_HEX_LEN
        )));
    }

    Ok(())
}

fn is_registry_host(component: &str) -> bool {
    component == "localhost" || component.contains('.') || component.contains(':')
}

fn is_path_component(component: &str) -> bool {
    component
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}
