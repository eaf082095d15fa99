use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use loam_project::{read_env_key, ProjectLayout, APP_BINARY};

mod pid;

pub use pid::{clear_pid, pid_is_alive, read_pid, write_pid, PidRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    StaleRecord { pid: i32 },
    InvalidRecord,
    Running { pid: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub binary_present: bool,
    pub state: ProcessState,
    pub port: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedChild {
    pub pid: i32,
    pub record_warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    AlreadyRunning { pid: i32 },
    Started(SpawnedChild),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForegroundOutcome {
    AlreadyRunning { pid: i32 },
    Exited { pid: i32, success: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Stopped { pid: i32 },
}

pub fn status(layout: &ProjectLayout) -> Result<StatusReport> {
    Ok(StatusReport {
        binary_present: layout.app_binary_path().exists(),
        state: check_state(layout)?,
        port: read_env_key(&layout.env_path(), "PORT"),
    })
}

// A record that no longer matches a live process is transient state: every
// check that observes one clears it, so the next reader sees Stopped.
fn check_state(layout: &ProjectLayout) -> Result<ProcessState> {
    match read_pid(layout)? {
        PidRecord::Absent => Ok(ProcessState::Stopped),
        PidRecord::Invalid => {
            clear_pid(layout)?;
            Ok(ProcessState::InvalidRecord)
        }
        PidRecord::Pid(pid) if pid_is_alive(pid) => Ok(ProcessState::Running { pid }),
        PidRecord::Pid(pid) => {
            clear_pid(layout)?;
            Ok(ProcessState::StaleRecord { pid })
        }
    }
}

pub fn start_detached(layout: &ProjectLayout) -> Result<StartOutcome> {
    if let Some(pid) = running_instance(layout)? {
        return Ok(StartOutcome::AlreadyRunning { pid });
    }

    let binary = layout.app_binary_path();
    let child = Command::new(&binary)
        .current_dir(layout.root())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .with_context(|| format!("failed to start {}", binary.display()))?;

    let pid = child.id() as i32;
    let record_warning = write_pid(layout, pid).err().map(|err| format!("{err:#}"));

    Ok(StartOutcome::Started(SpawnedChild { pid, record_warning }))
}

pub fn start_foreground(
    layout: &ProjectLayout,
    on_spawn: impl FnOnce(&SpawnedChild),
) -> Result<ForegroundOutcome> {
    if let Some(pid) = running_instance(layout)? {
        return Ok(ForegroundOutcome::AlreadyRunning { pid });
    }

    let binary = layout.app_binary_path();
    let mut child = Command::new(&binary)
        .current_dir(layout.root())
        .spawn()
        .with_context(|| format!("failed to start {}", binary.display()))?;

    let pid = child.id() as i32;
    let record_warning = write_pid(layout, pid).err().map(|err| format!("{err:#}"));
    on_spawn(&SpawnedChild { pid, record_warning });

    let wait_result = child.wait();

    // The foreground child's lifetime is bounded by this call, so the record
    // is cleared here whether the exit was clean or not. A detached child
    // outlives the invocation and only `stop` may clear its record.
    clear_pid(layout)?;

    let status = wait_result
        .with_context(|| format!("failed waiting for {}", binary.display()))?;
    Ok(ForegroundOutcome::Exited {
        pid,
        success: status.success(),
    })
}

pub fn stop(layout: &ProjectLayout) -> Result<StopOutcome> {
    match read_pid(layout)? {
        PidRecord::Absent => Ok(StopOutcome::NotRunning),
        PidRecord::Invalid => {
            clear_pid(layout)?;
            Ok(StopOutcome::NotRunning)
        }
        PidRecord::Pid(pid) => {
            let was_alive = pid_is_alive(pid);
            if was_alive {
                terminate(pid)?;
            }
            clear_pid(layout)?;
            if was_alive {
                Ok(StopOutcome::Stopped { pid })
            } else {
                Ok(StopOutcome::NotRunning)
            }
        }
    }
}

// Shared start preflight: the target must exist and be executable, and a
// record pointing at a live process short-circuits the start entirely. Stale
// and invalid records are cleared so the spawn can proceed.
fn running_instance(layout: &ProjectLayout) -> Result<Option<i32>> {
    let binary = layout.app_binary_path();
    let metadata = match fs::metadata(&binary) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            bail!(
                "{APP_BINARY} executable not found in {}",
                layout.root().display()
            );
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to inspect {}", binary.display()));
        }
    };
    if metadata.permissions().mode() & 0o111 == 0 {
        bail!(
            "{APP_BINARY} file exists but is not executable: {}",
            binary.display()
        );
    }

    match read_pid(layout)? {
        PidRecord::Pid(pid) if pid_is_alive(pid) => Ok(Some(pid)),
        PidRecord::Absent => Ok(None),
        _ => {
            clear_pid(layout)?;
            Ok(None)
        }
    }
}

fn terminate(pid: i32) -> Result<()> {
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        let err = io::Error::last_os_error();
        // Died between the liveness probe and the signal.
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        return Err(err).with_context(|| format!("failed to signal process {pid}"));
    }
    Ok(())
}
