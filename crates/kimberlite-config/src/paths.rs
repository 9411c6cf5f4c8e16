//! Path utilities and XDG directory discovery for recovery configuration.

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// XDG-compliant paths for the replica recovery core.
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    /// Create a new `Paths` instance with XDG discovery.
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("dev", "kimberlite", "kimberlite"),
        }
    }

    /// User config directory (`~/.config/kimberlite/`).
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or_else(|| {
                ConfigError::XdgError("failed to determine user config directory".to_string())
            })
    }

    /// User config file (`~/.config/kimberlite/recovery.toml`).
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join("recovery.toml"))
    }

    /// Project-tracked recovery config file (`kimberlite-recovery.toml`).
    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("kimberlite-recovery.toml")
    }

    /// Local, gitignored override (`kimberlite-recovery.local.toml`).
    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("kimberlite-recovery.local.toml")
    }

    /// Whether a project directory carries a tracked recovery config.
    pub fn is_initialized(project_dir: impl AsRef<Path>) -> bool {
        Self::project_config_file(project_dir).exists()
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn xdg_paths_mention_kimberlite() {
        let paths = Paths::new();
        if let Ok(config_dir) = paths.user_config_dir() {
            assert!(config_dir.to_string_lossy().contains("kimberlite"));
        }
    }

    #[test]
    fn project_paths_are_rooted_at_project_dir() {
        let temp_dir = tempdir().expect("tempdir");
        let project_dir = temp_dir.path();

        let config_file = Paths::project_config_file(project_dir);
        assert_eq!(config_file, project_dir.join("kimberlite-recovery.toml"));

        let local_file = Paths::local_config_file(project_dir);
        assert_eq!(local_file, project_dir.join("kimberlite-recovery.local.toml"));

        assert!(!Paths::is_initialized(project_dir));
        std::fs::write(&config_file, "max_retries = 10\n").unwrap();
        assert!(Paths::is_initialized(project_dir));
    }
}
