use crate::checks::{Check, ValidReposCheck};
use crate::image::ImageReference;
use crate::Result;
use async_trait::async_trait;
use log::debug;

pub const NAME: &str = "diy";

/// Passes when the image lives in one of the organization's own
/// repositories.
#[derive(Debug, Default)]
pub struct DiyCheck {
    valid_repos: Vec<String>,
}

impl DiyCheck {
    pub fn new(valid_repos: Vec<String>) -> Self {
        Self { valid_repos }
    }
}

#[async_trait]
impl Check for DiyCheck {
    async fn check(&self, image: &ImageReference) -> Result<bool> {
        let name = image.name();
        let matched = self
            .valid_repos
            .iter()
            .any(|repo| !repo.is_empty() && name.starts_with(repo.as_str()));

        if !matched {
            debug!("Image {} is not in any valid repository", name);
        }
        Ok(matched)
    }

    fn as_valid_repos_check(&mut self) -> Option<&mut dyn ValidReposCheck> {
        Some(self)
    }
}

impl ValidReposCheck for DiyCheck {
    fn set_valid_repos(&mut self, repos: Vec<String>) {
        self.valid_repos = repos;
    }
}
