//! Background check for a newer published release.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

const GITHUB_API: &str = "https://api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Events emitted by the update checker.
#[derive(Debug)]
pub enum UpdateEvent {
    /// A newer release is published.
    Available {
        /// Tag of the release, without a leading `v`.
        version: String,
        /// Release page to show the user.
        url: String,
    },
    /// The running build is the latest release.
    UpToDate,
    /// The check could not be completed.
    Failed(anyhow::Error),
}

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
    html_url: String,
}

/// Queries the latest GitHub release of a repository.
pub struct UpdateCheck {
    repo: String,
    current_version: String,
    api_base: String,
}

impl UpdateCheck {
    /// `repo` is `owner/name`.
    pub fn new(repo: impl Into<String>, current_version: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            current_version: current_version.into(),
            api_base: GITHUB_API.to_string(),
        }
    }

    /// Point the check at another API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn latest_release_url(&self) -> String {
        format!(
            "{}/repos/{}/releases/latest",
            self.api_base.trim_end_matches('/'),
            self.repo
        )
    }

    /// Run the check once and report the outcome on `sender`.
    pub async fn run(self, sender: mpsc::Sender<UpdateEvent>) -> Result<()> {
        let event = match self.fetch_latest().await {
            Ok(release) => self.evaluate(release),
            Err(err) => {
                debug!(error = %err, "Update check failed");
                UpdateEvent::Failed(err)
            }
        };
        sender
            .send(event)
            .await
            .context("failed to send update event")?;
        Ok(())
    }

    async fn fetch_latest(&self) -> Result<LatestRelease> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("gameslist/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        let url = self.latest_release_url();
        let release = client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .with_context(|| format!("failed to query {url}"))?
            .error_for_status()
            .with_context(|| format!("release lookup for {} was rejected", self.repo))?
            .json::<LatestRelease>()
            .await
            .context("failed to decode release response")?;
        Ok(release)
    }

    fn evaluate(&self, release: LatestRelease) -> UpdateEvent {
        let version = release.tag_name.trim_start_matches('v').to_string();
        if is_newer(&version, &self.current_version) {
            info!(%version, current = %self.current_version, "Update available");
            UpdateEvent::Available {
                version,
                url: release.html_url,
            }
        } else {
            UpdateEvent::UpToDate
        }
    }
}

/// Compare dotted numeric versions, ignoring a leading `v` and any
/// pre-release suffix. Unparseable candidates are never newer.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    match (parse_version(candidate), parse_version(current)) {
        (Some(candidate), Some(current)) => candidate > current,
        (Some(_), None) => true,
        _ => false,
    }
}

fn parse_version(value: &str) -> Option<Vec<u64>> {
    let core = value.trim().trim_start_matches('v');
    let core = core.split(['-', '+']).next()?;
    let mut parts = core
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    while parts.len() > 1 && parts.last() == Some(&0) {
        parts.pop();
    }
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_comparison_is_numeric() {
        assert!(is_newer("v1.10.0", "1.9.3"));
        assert!(is_newer("2", "1.99"));
        assert!(!is_newer("1.2.0", "1.2"));
        assert!(!is_newer("1.2.0-beta", "1.2.0"));
        assert!(!is_newer("nightly", "1.0.0"));
        assert!(is_newer("0.2.0", "dev"));
    }

    #[test]
    fn release_url_uses_api_base() {
        let check = UpdateCheck::new("owner/gameslist", "0.1.0").with_api_base("http://localhost:9/");
        assert_eq!(
            check.latest_release_url(),
            "http://localhost:9/repos/owner/gameslist/releases/latest"
        );
    }

    #[test]
    fn newer_tag_becomes_available_event() {
        let check = UpdateCheck::new("owner/gameslist", "0.1.0");
        let event = check.evaluate(LatestRelease {
            tag_name: "v0.2.0".to_string(),
            html_url: "https://example.invalid/release".to_string(),
        });
        assert!(matches!(event, UpdateEvent::Available { ref version, .. } if version == "0.2.0"));

        let event = check.evaluate(LatestRelease {
            tag_name: "v0.1.0".to_string(),
            html_url: String::new(),
        });
        assert!(matches!(event, UpdateEvent::UpToDate));
    }

    #[tokio::test]
    async fn unreachable_host_reports_failure() {
        let (sender, mut receiver) = mpsc::channel(1);
        UpdateCheck::new("owner/gameslist", "0.1.0")
            .with_api_base("http://127.0.0.1:9")
            .run(sender)
            .await
            .unwrap();
        assert!(matches!(receiver.recv().await, Some(UpdateEvent::Failed(_))));
    }
}
