// (c) 2026 rupd contributors
//! Configuration file wrangling

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use figment::{
    providers::{Env, Format as _, Serialized, Toml},
    value::{Dict, Map},
    Figment, Metadata, Profile, Provider,
};
use serde::Deserialize;
use tracing::{debug, warn};

use super::Configuration;

/// Prefix of environment variables that set configuration fields
pub(super) const ENV_PREFIX: &str = "RUPD_";

const SYSTEM_CONFIG_FILE: &str = "/etc/rupd.toml";

/// Processes and merges all possible configuration sources.
///
/// To see which files apply for the current user, run `rupd config-files`.
#[derive(Debug, Clone)]
pub struct Manager {
    /// Configuration data
    pub(super) data: Figment,
}

impl Manager {
    fn new(extra_file: Option<&Path>, apply_env: bool, apply_config_files: bool) -> Self {
        let mut new1 = Self {
            data: Figment::new(),
        };
        if apply_config_files {
            new1.add_config("system", Some(Path::new(SYSTEM_CONFIG_FILE)));
            new1.add_config("user", user_config_path().as_deref());
        }
        if let Some(path) = extra_file {
            if path.exists() {
                new1.merge_provider(Toml::file(path));
            } else {
                // An explicitly requested file must exist; leave the figment in an error state.
                new1.merge_provider(MissingFile(path.to_path_buf()));
            }
        }
        if apply_env {
            new1.merge_provider(Env::prefixed(ENV_PREFIX));
        }
        new1.apply_system_default();
        new1
    }

    /// General constructor for production use
    ///
    /// Reads the system and user configuration files, then the given extra file if any,
    /// then the environment.
    #[must_use]
    pub fn standard(extra_file: Option<&Path>) -> Self {
        Self::new(extra_file, true, true)
    }

    /// Testing/internal constructor: applies the system default only
    #[must_use]
    pub fn without_files() -> Self {
        Self::new(None, false, false)
    }

    /// Testing/internal constructor: applies the system default and the given file only
    #[must_use]
    pub fn with_file(file: &Path) -> Self {
        Self::new(Some(file), false, false)
    }

    fn add_config(&mut self, what: &str, path: Option<&Path>) {
        let Some(path) = path else {
            warn!("could not determine {what} configuration file path");
            return;
        };
        if !path.exists() {
            debug!("{what} configuration file {path:?} not present");
            return;
        }
        self.merge_provider(Toml::file(path));
    }

    /// Returns the list of configuration files we read, whether or not they exist.
    #[must_use]
    pub fn config_files() -> Vec<String> {
        let mut inputs = vec![PathBuf::from(SYSTEM_CONFIG_FILE)];
        inputs.extend(user_config_path());
        inputs
            .iter()
            .map(|p| p.as_os_str().to_string_lossy().to_string())
            .collect()
    }

    /// Merges in a data set, which is some sort of [figment::Provider](https://docs.rs/figment/latest/figment/trait.Provider.html).
    /// This uses figment's `merge` operation, which prefers to _replace_ existing items.
    pub fn merge_provider<T>(&mut self, provider: T)
    where
        T: Provider,
    {
        let f = std::mem::take(&mut self.data);
        self.data = f.merge(provider); // in the error case, this leaves the provider in a fused state
    }

    /// Applies the system default settings, at a lower priority than everything else
    pub fn apply_system_default(&mut self) {
        let f = std::mem::take(&mut self.data);
        self.data = f.join(Defaults);
    }

    /// Attempts to extract a particular struct from the data.
    pub fn get<'de, T>(&self) -> Result<T, figment::Error>
    where
        T: Deserialize<'de>,
    {
        self.data.extract::<T>()
    }

    /// Extracts and validates the [Configuration]
    pub fn configuration(&self) -> Result<Configuration> {
        let config = self
            .get::<Configuration>()
            .context("invalid configuration")?;
        config.validate()?;
        Ok(config)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rupd").join("rupd.toml"))
}

type ProviderData = Result<Map<Profile, Dict>, figment::Error>;

/// The hard-wired defaults, reported as source "default"
struct Defaults;

impl Provider for Defaults {
    fn metadata(&self) -> Metadata {
        Metadata::named("default")
    }

    fn data(&self) -> ProviderData {
        Serialized::defaults(Configuration::system_default()).data()
    }
}

/// Stand-in provider for a configuration file that was asked for but does not exist
struct MissingFile(PathBuf);

impl Provider for MissingFile {
    fn metadata(&self) -> Metadata {
        Metadata::named("configuration file")
    }

    fn data(&self) -> ProviderData {
        Err(figment::Error::from(format!(
            "configuration file {} not found",
            self.0.display()
        )))
    }
}
