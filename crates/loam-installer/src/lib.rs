use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use loam_project::{ProjectLayout, APP_BINARY};
use loam_release::{ReleaseInfo, ReleaseSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub stale_backup: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    pub version: String,
    pub binary_path: PathBuf,
    pub stale_backup: Option<PathBuf>,
}

#[derive(Debug)]
pub enum UpgradeEvent<'a> {
    ResolvedLatest(&'a ReleaseInfo),
    Downloading,
    Installing,
}

pub fn binary_candidates() -> [String; 5] {
    [
        APP_BINARY.to_string(),
        format!("{APP_BINARY}-darwin-amd64"),
        format!("{APP_BINARY}-darwin-arm64"),
        format!("{APP_BINARY}-linux-amd64"),
        format!("{APP_BINARY}-linux-arm64"),
    ]
}

// The generic name is checked first so a manually renamed binary always wins
// over a freshly extracted platform asset sitting in the same directory.
pub fn locate_binary(dir: &Path) -> Option<PathBuf> {
    for name in binary_candidates() {
        let path = dir.join(&name);
        if path.is_file() {
            return Some(path);
        }
    }
    None
}

// Two-phase replacement: move the live binary aside, copy the new bytes in,
// and only then drop the backup. If the copy step fails the backup is moved
// back, so `current_path` is present again before the error is returned.
// Copying rather than renaming is required because the source sits in a
// staging directory that may be on a different filesystem.
pub fn install_binary(current_path: &Path, new_path: &Path) -> Result<InstallOutcome> {
    let backup_path = backup_path_for(current_path);

    fs::rename(current_path, &backup_path).with_context(|| {
        format!("failed to back up existing binary: {}", current_path.display())
    })?;

    if let Err(err) = fs::copy(new_path, current_path) {
        let _ = fs::rename(&backup_path, current_path);
        return Err(err).with_context(|| {
            format!("failed to install new binary: {}", current_path.display())
        });
    }

    match fs::remove_file(&backup_path) {
        Ok(()) => Ok(InstallOutcome { stale_backup: None }),
        // A stray backup file is harmless; the install itself succeeded.
        Err(_) => Ok(InstallOutcome {
            stale_backup: Some(backup_path),
        }),
    }
}

pub fn upgrade(
    layout: &ProjectLayout,
    source: &dyn ReleaseSource,
    notify: &mut dyn FnMut(UpgradeEvent<'_>),
) -> Result<UpgradeReport> {
    let current_path = locate_binary(layout.root()).ok_or_else(|| {
        anyhow!(
            "no {APP_BINARY} binary found in {}",
            layout.root().display()
        )
    })?;

    let release = source.latest_release()?;
    notify(UpgradeEvent::ResolvedLatest(&release));

    let staging = StagingDir::create()?;

    notify(UpgradeEvent::Downloading);
    source.download_and_extract(&release, staging.path())?;

    let new_path = locate_binary(staging.path()).ok_or_else(|| {
        anyhow!("no binary found in downloaded release {}", release.tag)
    })?;

    notify(UpgradeEvent::Installing);
    let outcome = install_binary(&current_path, &new_path)?;

    Ok(UpgradeReport {
        version: release.display_version(),
        binary_path: current_path,
        stale_backup: outcome.stale_backup,
    })
}

fn backup_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".backup");
    PathBuf::from(os)
}

// Removed on drop so the staging directory never outlives the upgrade call,
// whichever exit path is taken.
struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    fn create() -> Result<Self> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system time is before unix epoch")?
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "{APP_BINARY}-upgrade-{}-{nanos}",
            std::process::id()
        ));
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create staging dir: {}", path.display()))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

#[cfg(test)]
mod tests;
