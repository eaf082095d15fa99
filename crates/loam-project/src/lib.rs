use std::path::{Path, PathBuf};

mod env;

pub use env::read_env_key;

pub const APP_BINARY: &str = "loam";
pub const PID_FILE: &str = ".PID";
pub const ENV_FILE: &str = ".env";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pid_path(&self) -> PathBuf {
        self.root.join(PID_FILE)
    }

    pub fn env_path(&self) -> PathBuf {
        self.root.join(ENV_FILE)
    }

    pub fn app_binary_path(&self) -> PathBuf {
        self.root.join(APP_BINARY)
    }
}
