use crate::checks::{Check, MetadataCheck, ProvenanceCheck};
use crate::image::ImageReference;
use crate::metadata::MetadataClient;
use crate::{Result, VoucherError};
use async_trait::async_trait;
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

pub const NAME: &str = "provenance";

/// Passes when the image was produced by a trusted builder in a trusted
/// project, and the build recorded the image's digest among its artifacts.
#[derive(Default)]
pub struct TrustedBuildCheck {
    client: Option<Arc<dyn MetadataClient>>,
    trusted_build_creators: HashSet<String>,
    trusted_projects: HashSet<String>,
}

#[async_trait]
impl Check for TrustedBuildCheck {
    async fn check(&self, image: &ImageReference) -> Result<bool> {
        let client = self
            .client
            .as_ref()
            .ok_or(VoucherError::MissingCollaborator("metadata client"))?;

        let detail = client.get_build_detail(image).await?;

        if !self.trusted_build_creators.contains(&detail.build_creator) {
            debug!("Build creator {} is not trusted", detail.build_creator);
            return Ok(false);
        }

        if !self.trusted_projects.contains(&detail.project_id) {
            debug!("Build project {} is not trusted", detail.project_id);
            return Ok(false);
        }

        if !detail.has_artifact_with_digest(image.digest()) {
            debug!("No build artifact of {} matches {}", detail.build_url, image.digest());
            return Ok(false);
        }

        Ok(true)
    }

    fn as_metadata_check(&mut self) -> Option<&mut dyn MetadataCheck> {
        Some(self)
    }

    fn as_provenance_check(&mut self) -> Option<&mut dyn ProvenanceCheck> {
        Some(self)
    }
}

impl MetadataCheck for TrustedBuildCheck {
    fn set_metadata_client(&mut self, client: Arc<dyn MetadataClient>) {
        self.client = Some(client);
    }
}

impl ProvenanceCheck for TrustedBuildCheck {
    fn set_trusted_build_creators_and_projects(&mut self, creators: Vec<String>, projects: Vec<String>) {
        self.trusted_build_creators = creators.into_iter().collect();
        self.trusted_projects = projects.into_iter().collect();
    }
}
