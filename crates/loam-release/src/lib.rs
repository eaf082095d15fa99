use std::path::Path;

use anyhow::{bail, Result};
use serde::Deserialize;

mod github;

pub use github::GithubReleases;

pub const RELEASE_REPO: &str = "loam-app/loam";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseInfo {
    #[serde(rename = "tag_name")]
    pub tag: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseInfo {
    // Release tags are published as `vX.Y.Z`; strip the prefix when the rest
    // parses as a version, otherwise show the tag as-is.
    pub fn display_version(&self) -> String {
        match semver::Version::parse(self.tag.trim_start_matches('v')) {
            Ok(version) => version.to_string(),
            Err(_) => self.tag.clone(),
        }
    }

    pub fn asset_for(&self, platform_suffix: &str) -> Option<&ReleaseAsset> {
        self.assets
            .iter()
            .find(|asset| asset.name.contains(platform_suffix))
    }
}

pub trait ReleaseSource {
    fn latest_release(&self) -> Result<ReleaseInfo>;
    fn download_and_extract(&self, release: &ReleaseInfo, dest_dir: &Path) -> Result<()>;
}

pub fn host_platform_suffix() -> Result<&'static str> {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("macos", "x86_64") => Ok("darwin-amd64"),
        ("macos", "aarch64") => Ok("darwin-arm64"),
        ("linux", "x86_64") => Ok("linux-amd64"),
        ("linux", "aarch64") => Ok("linux-arm64"),
        (os, arch) => bail!("no release assets are published for {os}/{arch}"),
    }
}
