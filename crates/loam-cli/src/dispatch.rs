use anyhow::{Context, Result};
use indicatif::ProgressBar;
use loam_installer::{upgrade, UpgradeEvent};
use loam_project::ProjectLayout;
use loam_release::{GithubReleases, ReleaseSource, RELEASE_REPO};
use loam_supervisor::{
    start_detached, start_foreground, status, stop, ForegroundOutcome, ProcessState, StartOutcome,
    StatusReport, StopOutcome,
};

use crate::render;
use crate::{Cli, Commands};

pub fn run_cli(cli: Cli) -> Result<()> {
    let root = match cli.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to get current directory")?,
    };
    let layout = ProjectLayout::new(root);

    match cli.command {
        Commands::Up { detach } => run_up(&layout, detach),
        Commands::Down => run_down(&layout),
        Commands::Restart { detach } => {
            // A stop that finds nothing to stop is an expected precondition
            // for restart, not a reason to skip the start.
            if let Err(err) = run_down(&layout) {
                render::print_warning(&format!("{err:#}"));
            }
            run_up(&layout, detach)
        }
        Commands::Status => run_status(&layout),
        Commands::Upgrade => run_upgrade(&layout, &GithubReleases::new(RELEASE_REPO)),
        Commands::Version => {
            render::print_line(&format!("v{}", env!("CARGO_PKG_VERSION")));
            Ok(())
        }
        Commands::Completions { shell } => {
            write_completions(shell);
            Ok(())
        }
    }
}

fn run_up(layout: &ProjectLayout, detach: bool) -> Result<()> {
    if detach {
        match start_detached(layout)? {
            StartOutcome::AlreadyRunning { pid } => {
                render::print_line(&format_already_running(pid));
            }
            StartOutcome::Started(child) => {
                if let Some(warning) = &child.record_warning {
                    render::print_warning(warning);
                }
                render::print_success(&format!(
                    "loam started in background (PID: {})",
                    child.pid
                ));
            }
        }
        return Ok(());
    }

    let outcome = start_foreground(layout, |child| {
        if let Some(warning) = &child.record_warning {
            render::print_warning(warning);
        }
        render::print_success(&format!("loam started (PID: {})", child.pid));
    })?;

    match outcome {
        ForegroundOutcome::AlreadyRunning { pid } => {
            render::print_line(&format_already_running(pid));
        }
        ForegroundOutcome::Exited { pid, success: false } => {
            render::print_warning(&format!("loam (PID: {pid}) exited with an error"));
        }
        ForegroundOutcome::Exited { .. } => {}
    }
    Ok(())
}

fn run_down(layout: &ProjectLayout) -> Result<()> {
    match stop(layout)? {
        StopOutcome::NotRunning => render::print_line("loam is not running"),
        StopOutcome::Stopped { pid } => {
            render::print_success(&format!("loam stopped (PID: {pid})"));
        }
    }
    Ok(())
}

fn run_status(layout: &ProjectLayout) -> Result<()> {
    let report = status(layout)?;
    for line in format_status_lines(&report) {
        render::print_line(&line);
    }
    Ok(())
}

fn run_upgrade(layout: &ProjectLayout, source: &dyn ReleaseSource) -> Result<()> {
    render::print_line("Checking for updates...");

    let mut spinner: Option<ProgressBar> = None;
    let result = upgrade(layout, source, &mut |event| match event {
        UpgradeEvent::ResolvedLatest(release) => {
            render::print_line(&format!("Latest version: {}", release.display_version()));
        }
        UpgradeEvent::Downloading => {
            spinner = Some(render::start_spinner("Downloading release"));
        }
        UpgradeEvent::Installing => {
            if let Some(spinner) = spinner.take() {
                render::finish_spinner(&spinner, "Download complete");
            }
            render::print_line("Installing...");
        }
    });

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            if let Some(spinner) = spinner.take() {
                spinner.finish_and_clear();
            }
            return Err(err);
        }
    };

    if let Some(backup) = &report.stale_backup {
        render::print_warning(&format!(
            "failed to remove backup file: {}",
            backup.display()
        ));
    }
    render::print_success(&format!(
        "Upgrade completed successfully (v{})",
        report.version
    ));
    Ok(())
}

fn format_already_running(pid: i32) -> String {
    format!("loam is already running (PID: {pid})")
}

pub(crate) fn format_status_lines(report: &StatusReport) -> Vec<String> {
    if !report.binary_present {
        return vec!["Not a loam project (no loam executable found)".to_string()];
    }

    let port = report.port.as_deref().filter(|port| !port.is_empty());
    let mut lines = Vec::new();

    match report.state {
        ProcessState::Running { pid } => {
            lines.push(format!("loam is running (PID: {pid})"));
            if let Some(port) = port {
                lines.push(format!("   Port: {port}"));
                lines.push(format!("   URL:  http://localhost:{port}"));
            }
        }
        ProcessState::Stopped => lines.push("loam is stopped".to_string()),
        ProcessState::StaleRecord { .. } => {
            lines.push("loam is stopped (stale .PID file)".to_string());
        }
        ProcessState::InvalidRecord => {
            lines.push("loam is stopped (invalid .PID file)".to_string());
        }
    }

    if !matches!(report.state, ProcessState::Running { .. }) {
        if let Some(port) = port {
            lines.push(format!("   Port: {port}"));
        }
    }

    lines
}

fn write_completions(shell: clap_complete::Shell) {
    let mut command = <Cli as clap::CommandFactory>::command();
    clap_complete::generate(shell, &mut command, "loam", &mut std::io::stdout());
}
