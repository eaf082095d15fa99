use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};

use crate::{host_platform_suffix, ReleaseInfo, ReleaseSource};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("loam/", env!("CARGO_PKG_VERSION"));

pub struct GithubReleases {
    api_base: String,
    repo: String,
    client: reqwest::blocking::Client,
}

impl GithubReleases {
    pub fn new(repo: impl Into<String>) -> Self {
        Self::with_api_base(DEFAULT_API_BASE, repo)
    }

    pub fn with_api_base(api_base: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            repo: repo.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn download_asset(&self, url: &str, out_path: &Path) -> Result<()> {
        let part_path = out_path.with_file_name(format!(
            "{}.part",
            out_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("asset")
        ));

        let result = self.fetch_to_file(url, &part_path);
        if let Err(err) = result {
            let _ = fs::remove_file(&part_path);
            return Err(err);
        }

        fs::rename(&part_path, out_path).with_context(|| {
            format!("failed to move downloaded asset into place: {}", out_path.display())
        })?;
        Ok(())
    }

    fn fetch_to_file(&self, url: &str, out_path: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .with_context(|| format!("failed to download release asset: {url}"))?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "release asset download failed: {url} returned {}",
                response.status()
            ));
        }

        let mut file = fs::File::create(out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        response
            .copy_to(&mut file)
            .with_context(|| format!("failed writing release asset to {}", out_path.display()))?;
        Ok(())
    }
}

impl ReleaseSource for GithubReleases {
    fn latest_release(&self) -> Result<ReleaseInfo> {
        let url = format!("{}/repos/{}/releases/latest", self.api_base, self.repo);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .with_context(|| format!("failed to fetch release metadata: {url}"))?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "release metadata request failed: {url} returned {}",
                response.status()
            ));
        }

        let body = response
            .text()
            .with_context(|| format!("failed to read release metadata: {url}"))?;
        let release: ReleaseInfo = serde_json::from_str(&body)
            .with_context(|| format!("failed to parse release metadata: {url}"))?;
        Ok(release)
    }

    fn download_and_extract(&self, release: &ReleaseInfo, dest_dir: &Path) -> Result<()> {
        let suffix = host_platform_suffix()?;
        let asset = release.asset_for(suffix).ok_or_else(|| {
            anyhow!("release {} has no asset for {suffix}", release.tag)
        })?;

        let asset_path = dest_dir.join(&asset.name);
        self.download_asset(&asset.download_url, &asset_path)?;

        if is_tar_archive(&asset.name) {
            extract_tar(&asset_path, dest_dir)?;
            fs::remove_file(&asset_path).with_context(|| {
                format!("failed to remove extracted archive: {}", asset_path.display())
            })?;
        } else {
            // Bare-binary asset: the download is the binary itself and needs
            // its execute bit restored, which HTTP does not carry.
            mark_executable(&asset_path)?;
        }

        Ok(())
    }
}

pub(crate) fn is_tar_archive(name: &str) -> bool {
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

fn mark_executable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)
        .with_context(|| format!("failed to inspect {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
        .with_context(|| format!("failed to mark {} executable", path.display()))
}

fn extract_tar(archive_path: &Path, dst: &Path) -> Result<()> {
    run_command(
        Command::new("tar")
            .arg("-xf")
            .arg(archive_path)
            .arg("-C")
            .arg(dst),
        "failed to extract release archive",
    )
}

fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}
