use super::*;

use std::cell::RefCell;
use std::os::unix::fs::PermissionsExt;

use anyhow::bail;

fn test_dir(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("loam-installer-{label}-{nanos}"));
    fs::create_dir_all(&dir).expect("must create test dir");
    dir
}

fn write_executable(path: &Path, bytes: &[u8]) {
    fs::write(path, bytes).expect("must write binary");
    let mut perms = fs::metadata(path).expect("must stat binary").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("must chmod binary");
}

fn mode_bits(path: &Path) -> u32 {
    fs::metadata(path).expect("must stat").permissions().mode() & 0o777
}

struct FakeSource {
    payload: Option<&'static [u8]>,
    fail_fetch: bool,
    staging_seen: RefCell<Option<PathBuf>>,
}

impl FakeSource {
    fn with_payload(payload: &'static [u8]) -> Self {
        Self {
            payload: Some(payload),
            fail_fetch: false,
            staging_seen: RefCell::new(None),
        }
    }

    fn empty_release() -> Self {
        Self {
            payload: None,
            fail_fetch: false,
            staging_seen: RefCell::new(None),
        }
    }

    fn offline() -> Self {
        Self {
            payload: None,
            fail_fetch: true,
            staging_seen: RefCell::new(None),
        }
    }

    fn staging_dir(&self) -> Option<PathBuf> {
        self.staging_seen.borrow().clone()
    }
}

impl ReleaseSource for FakeSource {
    fn latest_release(&self) -> Result<ReleaseInfo> {
        if self.fail_fetch {
            bail!("release metadata request failed: offline");
        }
        Ok(ReleaseInfo {
            tag: "v2.0.0".to_string(),
            assets: Vec::new(),
        })
    }

    fn download_and_extract(&self, _release: &ReleaseInfo, dest_dir: &Path) -> Result<()> {
        *self.staging_seen.borrow_mut() = Some(dest_dir.to_path_buf());
        if let Some(payload) = self.payload {
            write_executable(&dest_dir.join("loam-linux-amd64"), payload);
        }
        Ok(())
    }
}

#[test]
fn locate_prefers_the_generic_name_over_platform_assets() {
    let dir = test_dir("locate-order");
    write_executable(&dir.join("loam-linux-amd64"), b"platform");
    write_executable(&dir.join("loam"), b"generic");

    let found = locate_binary(&dir).expect("must locate a binary");
    assert_eq!(found, dir.join("loam"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn locate_falls_back_to_platform_qualified_names() {
    let dir = test_dir("locate-platform");
    write_executable(&dir.join("loam-darwin-arm64"), b"platform");

    let found = locate_binary(&dir).expect("must locate a binary");
    assert_eq!(found, dir.join("loam-darwin-arm64"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn locate_skips_directories_with_candidate_names() {
    let dir = test_dir("locate-skip-dirs");
    fs::create_dir(dir.join("loam")).expect("must create decoy dir");
    write_executable(&dir.join("loam-linux-amd64"), b"platform");

    let found = locate_binary(&dir).expect("must locate a binary");
    assert_eq!(found, dir.join("loam-linux-amd64"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn locate_reports_absent_in_an_empty_directory() {
    let dir = test_dir("locate-empty");
    assert_eq!(locate_binary(&dir), None);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn install_replaces_bytes_and_mode_and_drops_the_backup() {
    let dir = test_dir("install-ok");
    let current = dir.join("loam");
    let new = dir.join("staged-loam");
    write_executable(&current, b"old build");
    write_executable(&new, b"new build");

    let outcome = install_binary(&current, &new).expect("must install");
    assert_eq!(outcome.stale_backup, None);

    assert_eq!(fs::read(&current).expect("must read"), b"new build");
    assert_ne!(mode_bits(&current) & 0o111, 0, "execute bit must survive");
    assert!(
        !dir.join("loam.backup").exists(),
        "backup must be removed after a successful install"
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn install_aborts_untouched_when_backup_rename_fails() {
    let dir = test_dir("install-backup-fail");
    let current = dir.join("loam");
    let new = dir.join("staged-loam");
    write_executable(&new, b"new build");

    let err = install_binary(&current, &new).expect_err("missing current binary must fail");
    assert!(
        err.to_string().contains("failed to back up"),
        "unexpected error: {err}"
    );
    assert!(!current.exists());
    assert!(!dir.join("loam.backup").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn install_rolls_back_when_the_copy_step_fails() {
    let dir = test_dir("install-rollback");
    let current = dir.join("loam");
    write_executable(&current, b"old build");
    let missing_new = dir.join("does-not-exist");

    let err = install_binary(&current, &missing_new).expect_err("copy must fail");
    assert!(
        err.to_string().contains("failed to install new binary"),
        "unexpected error: {err}"
    );

    assert_eq!(
        fs::read(&current).expect("binary must be restored"),
        b"old build",
        "rollback must restore the original bytes"
    );
    assert!(!dir.join("loam.backup").exists(), "backup must not linger");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn upgrade_installs_the_staged_binary_and_preserves_project_data() {
    let dir = test_dir("upgrade-ok");
    let layout = ProjectLayout::new(&dir);
    write_executable(&layout.app_binary_path(), b"v1 build");
    fs::write(dir.join(".env"), "PORT=8080\n").expect("must write env");
    fs::write(dir.join("loam.db"), b"precious data").expect("must write db");

    let source = FakeSource::with_payload(b"v2 build");
    let mut events = Vec::new();
    let report = upgrade(&layout, &source, &mut |event| {
        events.push(match event {
            UpgradeEvent::ResolvedLatest(release) => format!("resolved:{}", release.tag),
            UpgradeEvent::Downloading => "downloading".to_string(),
            UpgradeEvent::Installing => "installing".to_string(),
        });
    })
    .expect("must upgrade");

    assert_eq!(report.version, "2.0.0");
    assert_eq!(report.binary_path, layout.app_binary_path());
    assert_eq!(report.stale_backup, None);
    assert_eq!(events, ["resolved:v2.0.0", "downloading", "installing"]);

    assert_eq!(
        fs::read(layout.app_binary_path()).expect("must read"),
        b"v2 build"
    );
    assert_ne!(mode_bits(&layout.app_binary_path()) & 0o111, 0);
    assert!(!dir.join("loam.backup").exists());
    assert_eq!(
        fs::read_to_string(dir.join(".env")).expect("must read env"),
        "PORT=8080\n",
        "upgrade must not touch colocated config"
    );
    assert_eq!(
        fs::read(dir.join("loam.db")).expect("must read db"),
        b"precious data",
        "upgrade must not touch colocated data"
    );

    let staging = source.staging_dir().expect("staging dir must be used");
    assert!(!staging.exists(), "staging dir must be removed");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn upgrade_fails_fast_when_no_live_binary_exists() {
    let dir = test_dir("upgrade-no-binary");
    let layout = ProjectLayout::new(&dir);

    let source = FakeSource::with_payload(b"v2 build");
    let err = upgrade(&layout, &source, &mut |_| {}).expect_err("must fail");
    assert!(
        err.to_string().contains("no loam binary found"),
        "unexpected error: {err}"
    );
    assert_eq!(
        source.staging_dir(),
        None,
        "nothing should be downloaded without a live binary"
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn upgrade_fails_when_the_release_contains_no_binary() {
    let dir = test_dir("upgrade-empty-release");
    let layout = ProjectLayout::new(&dir);
    write_executable(&layout.app_binary_path(), b"v1 build");

    let source = FakeSource::empty_release();
    let err = upgrade(&layout, &source, &mut |_| {}).expect_err("must fail");
    assert!(
        err.to_string().contains("no binary found in downloaded release"),
        "unexpected error: {err}"
    );

    assert_eq!(
        fs::read(layout.app_binary_path()).expect("must read"),
        b"v1 build",
        "live binary must be untouched"
    );
    let staging = source.staging_dir().expect("staging dir must be used");
    assert!(!staging.exists(), "staging dir must be removed on failure");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn upgrade_propagates_fetch_failures_without_side_effects() {
    let dir = test_dir("upgrade-offline");
    let layout = ProjectLayout::new(&dir);
    write_executable(&layout.app_binary_path(), b"v1 build");

    let source = FakeSource::offline();
    let err = upgrade(&layout, &source, &mut |_| {}).expect_err("must fail");
    assert!(
        err.to_string().contains("offline"),
        "unexpected error: {err}"
    );
    assert_eq!(
        fs::read(layout.app_binary_path()).expect("must read"),
        b"v1 build"
    );

    let _ = fs::remove_dir_all(&dir);
}
