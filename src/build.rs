use serde::{Deserialize, Serialize};

/// Provenance of an image as recorded by the build system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDetail {
    /// Source repository the image was built from
    #[serde(rename = "repositoryURL")]
    pub repository_url: String,
    /// Commit the build was run against
    pub commit: String,
    /// Identity that triggered the build
    pub build_creator: String,
    /// Link to the build log
    #[serde(rename = "buildURL")]
    pub build_url: String,
    /// Project the build ran under
    #[serde(rename = "projectID")]
    pub project_id: String,
    /// Artifacts produced by the build
    #[serde(default)]
    pub artifacts: Vec<BuildArtifact>,
}

/// One artifact produced by a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    pub id: String,
    pub checksum: String,
}

impl BuildDetail {
    /// Whether any artifact's checksum matches the digest, with or
    /// without the `sha256:` prefix.
    pub fn has_artifact_with_digest(&self, digest: &str) -> bool {
        let bare = digest.strip_prefix("sha256:").unwrap_or(digest);
        self.artifacts.iter().any(|artifact| {
            let checksum = artifact.checksum.strip_prefix("sha256:").unwrap_or(&artifact.checksum);
            checksum.eq_ignore_ascii_case(bare)
        })
    }
}
