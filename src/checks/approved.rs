use crate::checks::{Check, MetadataCheck, RepositoryCheck, RepositoryClient};
use crate::image::ImageReference;
use crate::metadata::MetadataClient;
use crate::{Result, VoucherError};
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

pub const NAME: &str = "approved";

/// Passes when the commit the image was built from was approved in its
/// source repository.
#[derive(Default)]
pub struct ApprovedCheck {
    metadata: Option<Arc<dyn MetadataClient>>,
    repository: Option<Arc<dyn RepositoryClient>>,
}

#[async_trait]
impl Check for ApprovedCheck {
    async fn check(&self, image: &ImageReference) -> Result<bool> {
        let metadata = self
            .metadata
            .as_ref()
            .ok_or(VoucherError::MissingCollaborator("metadata client"))?;
        let repository = self
            .repository
            .as_ref()
            .ok_or(VoucherError::MissingCollaborator("repository client"))?;

        let detail = metadata.get_build_detail(image).await?;
        if detail.repository_url.is_empty() || detail.commit.is_empty() {
            debug!("Build of {} does not record its source", image);
            return Ok(false);
        }

        repository
            .is_commit_approved(&detail.repository_url, &detail.commit)
            .await
    }

    fn as_metadata_check(&mut self) -> Option<&mut dyn MetadataCheck> {
        Some(self)
    }

    fn as_repository_check(&mut self) -> Option<&mut dyn RepositoryCheck> {
        Some(self)
    }
}

impl MetadataCheck for ApprovedCheck {
    fn set_metadata_client(&mut self, client: Arc<dyn MetadataClient>) {
        self.metadata = Some(client);
    }
}

impl RepositoryCheck for ApprovedCheck {
    fn set_repository_client(&mut self, client: Arc<dyn RepositoryClient>) {
        self.repository = Some(client);
    }
}
