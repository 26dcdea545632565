use crate::checks::{Auth, AuthCheck, Check};
use crate::image::ImageReference;
use crate::{Result, VoucherError};
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

pub const NAME: &str = "nobody";

/// Passes when the image runs as a non-root user.
#[derive(Default)]
pub struct NobodyCheck {
    auth: Option<Arc<dyn Auth>>,
}

#[async_trait]
impl Check for NobodyCheck {
    async fn check(&self, image: &ImageReference) -> Result<bool> {
        let auth = self
            .auth
            .as_ref()
            .ok_or(VoucherError::MissingCollaborator("auth"))?;

        let config = auth.image_config(image).await?;
        let runs_as_root = is_root(&config.user);
        if runs_as_root {
            debug!("Image {} runs as root (user \"{}\")", image, config.user);
        }
        Ok(!runs_as_root)
    }

    fn as_auth_check(&mut self) -> Option<&mut dyn AuthCheck> {
        Some(self)
    }
}

impl AuthCheck for NobodyCheck {
    fn set_auth(&mut self, auth: Arc<dyn Auth>) {
        self.auth = Some(auth);
    }
}

/// Users are `name`, `uid`, or either followed by `:group`.
fn is_root(user: &str) -> bool {
    let user = user.split(':').next().unwrap_or_default().trim();
    user.is_empty() || user == "root" || user == "0"
}
