use std::fs;
use std::io;

use anyhow::{Context, Result};
use loam_project::ProjectLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidRecord {
    Absent,
    Invalid,
    Pid(i32),
}

pub fn write_pid(layout: &ProjectLayout, pid: i32) -> Result<()> {
    let path = layout.pid_path();
    fs::write(&path, pid.to_string())
        .with_context(|| format!("failed to write PID file: {}", path.display()))
}

pub fn read_pid(layout: &ProjectLayout) -> Result<PidRecord> {
    let path = layout.pid_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(PidRecord::Absent),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read PID file: {}", path.display()));
        }
    };

    match raw.trim().parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(PidRecord::Pid(pid)),
        _ => Ok(PidRecord::Invalid),
    }
}

pub fn clear_pid(layout: &ProjectLayout) -> Result<()> {
    let path = layout.pid_path();
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove PID file: {}", path.display()))?;
    }
    Ok(())
}

// Signal 0 probes existence without delivering anything. EPERM would mean
// the process exists but belongs to another user; a child this tool manages
// is always signalable, so any error counts as not alive here.
pub fn pid_is_alive(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}
