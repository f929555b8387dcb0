use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use semver::Version;
use serde::Deserialize;

const RELEASES_URL: &str =
    "https://api.github.com/repos/fenneh/reddit-stream-console/releases/latest";

/// Set to any value to skip the release check.
pub const SKIP_UPDATE_ENV: &str = "REDDIT_STREAM_SKIP_UPDATE_CHECK";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub version: Version,
    pub url: String,
}

#[derive(Deserialize)]
struct Release {
    tag_name: String,
    html_url: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
}

pub fn check_for_update(current: &Version) -> Result<Option<UpdateInfo>> {
    let client = Client::builder()
        .timeout(Duration::from_secs(8))
        .user_agent(format!(
            "reddit-stream/{version} (update-check)",
            version = crate::VERSION
        ))
        .build()
        .context("build update HTTP client")?;

    let response = client
        .get(RELEASES_URL)
        .header("Accept", "application/vnd.github+json")
        .send()
        .context("request latest release metadata")?;

    match response.status() {
        StatusCode::NOT_FOUND => return Ok(None),
        StatusCode::FORBIDDEN => bail!("rate limited by GitHub while checking for updates"),
        status if !status.is_success() => bail!("update check failed with status {status}"),
        _ => {}
    }

    let release: Release = response
        .json()
        .context("decode release response from GitHub")?;
    newer_release(release, current)
}

fn newer_release(release: Release, current: &Version) -> Result<Option<UpdateInfo>> {
    if release.draft || release.prerelease {
        return Ok(None);
    }
    let version = parse_tag(&release.tag_name)?;
    tracing::debug!(%version, %current, "latest release");
    if &version > current {
        Ok(Some(UpdateInfo {
            version,
            url: release.html_url,
        }))
    } else {
        Ok(None)
    }
}

fn parse_tag(tag: &str) -> Result<Version> {
    let tag = tag.trim();
    let normalized = tag
        .strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag);
    Version::parse(normalized).with_context(|| format!("parse release tag {tag:?} as semantic version"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(tag: &str, prerelease: bool) -> Release {
        Release {
            tag_name: tag.into(),
            html_url: "https://example.invalid/release".into(),
            draft: false,
            prerelease,
        }
    }

    #[test]
    fn reports_newer_tagged_release() {
        let current = Version::parse("0.1.0").unwrap();
        let info = newer_release(release("v0.2.0", false), &current)
            .unwrap()
            .unwrap();
        assert_eq!(info.version, Version::new(0, 2, 0));
    }

    #[test]
    fn ignores_same_version_and_prereleases() {
        let current = Version::parse("0.2.0").unwrap();
        assert_eq!(newer_release(release("0.2.0", false), &current).unwrap(), None);
        assert_eq!(newer_release(release("v9.0.0", true), &current).unwrap(), None);
    }

    #[test]
    fn rejects_non_semver_tags() {
        assert!(parse_tag("nightly").is_err());
    }
}
