use crate::checks::{Check, SbomCheck, SbomClient};
use crate::image::ImageReference;
use crate::{Result, VoucherError};
use async_trait::async_trait;
use std::sync::Arc;

pub const NAME: &str = "sbom";

/// Passes when a bill of materials has been published for the image.
#[derive(Default)]
pub struct SbomExistsCheck {
    client: Option<Arc<dyn SbomClient>>,
}

#[async_trait]
impl Check for SbomExistsCheck {
    async fn check(&self, image: &ImageReference) -> Result<bool> {
        let client = self
            .client
            .as_ref()
            .ok_or(VoucherError::MissingCollaborator("SBOM client"))?;
        client.has_sbom(image).await
    }

    fn as_sbom_check(&mut self) -> Option<&mut dyn SbomCheck> {
        Some(self)
    }
}

impl SbomCheck for SbomExistsCheck {
    fn set_sbom_client(&mut self, client: Arc<dyn SbomClient>) {
        self.client = Some(client);
    }
}
