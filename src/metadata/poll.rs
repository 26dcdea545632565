use crate::image::ImageReference;
use crate::{Result, VoucherError};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_ATTEMPTS: u32 = 6;
const DEFAULT_SLEEP: Duration = Duration::from_secs(10);

/// Progress of the backend's asynchronous scan of an image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryStatus {
    Pending,
    Scanning,
    #[serde(alias = "COMPLETE")]
    FinishedSuccess,
    FinishedFailed,
    FinishedUnsupported,
    #[default]
    #[serde(other)]
    Unknown,
}

impl DiscoveryStatus {
    /// Terminal states; no further vulnerability records will appear.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            DiscoveryStatus::FinishedSuccess
                | DiscoveryStatus::FinishedFailed
                | DiscoveryStatus::FinishedUnsupported
        )
    }
}

/// Bounds for waiting on discoveries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub attempts: u32,
    pub sleep: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            sleep: DEFAULT_SLEEP,
        }
    }
}

/// Backend that exposes discovery records for an image
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Current discovery records. `NoMetadata` when none exist yet.
    async fn get_discoveries(&self, image: &ImageReference) -> Result<Vec<DiscoveryStatus>>;
}

/// Wait until a discovery for the image reaches a finished state.
///
/// Makes at most `settings.attempts` reads, sleeping between them. Missing
/// records count as not finished yet. Dropping the returned future stops
/// polling.
pub async fn poll_for_discoveries<S>(
    source: &S,
    image: &ImageReference,
    settings: PollSettings,
) -> Result<()>
where
    S: DiscoverySource + ?Sized,
{
    for attempt in 1..=settings.attempts {
        match source.get_discoveries(image).await {
            Ok(discoveries) if discoveries.iter().any(|d| d.is_finished()) => {
                debug!("Discoveries for {} finished after {} attempt(s)", image, attempt);
                return Ok(());
            }
            Ok(_) => {}
            Err(e) if e.is_no_metadata() => {}
            Err(e) => return Err(e),
        }

        if attempt < settings.attempts && !settings.sleep.is_zero() {
            tokio::time::sleep(settings.sleep).await;
        }
    }

    Err(VoucherError::DiscoveriesUnfinished)
}
