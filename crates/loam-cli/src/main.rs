use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod dispatch;
mod render;

#[derive(Parser, Debug)]
#[command(name = "loam")]
#[command(about = "Manage a local loam installation", long_about = None)]
struct Cli {
    #[arg(long, global = true, value_name = "DIR")]
    project_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Up {
        #[arg(short = 'd', long)]
        detach: bool,
    },
    Down,
    Restart {
        #[arg(short = 'd', long)]
        detach: bool,
    },
    Status,
    Upgrade,
    Version,
    Completions {
        shell: clap_complete::Shell,
    },
}

fn main() -> Result<()> {
    dispatch::run_cli(Cli::parse())
}
