//! Multi-source config loader for [`crate::RecoveryFileConfig`].

use crate::{Paths, RecoveryFileConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Builder for the recovery-config precedence chain: built-in defaults →
/// user config → project config → local override → `KMB_RECOVERY_*` env
/// vars (highest precedence), mirroring
/// `kimberlite-cluster::ClusterSupervisor`'s own layered-override
/// pattern.
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// New loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "KMB_RECOVERY".to_string(),
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load the config from all sources with proper precedence.
    pub fn load(self) -> Result<RecoveryFileConfig> {
        let mut builder = config::Config::builder();

        let defaults = RecoveryFileConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        let paths = Paths::new();
        if let Ok(user_config_file) = paths.user_config_file() {
            if user_config_file.exists() {
                builder = builder.add_source(
                    config::File::from(user_config_file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(
                config::File::from(project_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(
                config::File::from(local_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build().context("failed to build recovery configuration")?;
        config
            .try_deserialize()
            .context("failed to deserialize recovery configuration")
    }

    pub fn load_or_default(self) -> RecoveryFileConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
