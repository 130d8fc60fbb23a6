// (c) 2026 rupd contributors

//! Configuration structure

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use struct_field_names_as_array::FieldNamesAsSlice;

use crate::{
    protocol::{DEFAULT_MESSAGE_LIMIT, MAX_CHUNK_SIZE, TAG_LEN},
    util::TimeFormat,
};

/// The smallest message limit that still admits a full data chunk
#[allow(clippy::cast_possible_truncation)] // a compile-time constant well within range
pub const MIN_MESSAGE_LIMIT: u32 = (MAX_CHUNK_SIZE + TAG_LEN) as u32;

/// The set of configurable options supported by rupd.
///
/// All fields are required once the configuration sources have been merged;
/// the [system default](Configuration::system_default) supplies every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FieldNamesAsSlice)]
pub struct Configuration {
    // SERVER OPTIONS ==================================================================================
    /// Address the servers listen on
    pub bind_address: String,
    /// Listening port of the MR server (and the port the client connects to for MR)
    pub mr_port: u16,
    /// Listening port of the FS server (and the port the client connects to for FS)
    pub fs_port: u16,
    /// Directory holding the installed workspaces and the update driver scripts
    pub install_root: PathBuf,
    /// Parent directory of per-session save directories
    pub staging_root: PathBuf,
    /// Directory holding the decrypt script and the fallback update driver scripts
    pub script_dir: PathBuf,
    /// File name of the decrypt script within `script_dir`
    pub decrypt_script: String,
    /// Key passed to the decrypt script. If empty, every verification fails.
    pub decrypt_key: String,
    /// Directory within an installed workspace that may carry its own update driver
    pub driver_subdir: PathBuf,
    /// Root directory of the log categories served by `MLOG`
    pub log_root: PathBuf,
    /// Only files with this suffix are served by `MLOG`
    pub log_suffix: String,
    /// Marker text the decrypt script prints ahead of the archive's version
    pub version_marker: String,
    /// How many bytes after the version marker to search for the role prefix
    pub version_window: usize,
    /// Interval between build progress messages [milliseconds]
    pub progress_interval_ms: u64,

    // CLIENT OPTIONS ==================================================================================
    /// Connection timeout [milliseconds]
    pub connect_timeout_ms: u64,

    // COMMON OPTIONS ==================================================================================
    /// Largest incoming message we accept [bytes]
    pub max_message_size: u32,
    /// Time format to use when printing messages to the console
    pub time_format: TimeFormat,
}

static SYSTEM_DEFAULT: LazyLock<Configuration> = LazyLock::new(|| {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let script_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    Configuration {
        bind_address: "0.0.0.0".into(),
        mr_port: 12341,
        fs_port: 12342,
        install_root: home.join("robot_ws"),
        staging_root: std::env::temp_dir().join("rupd"),
        script_dir,
        decrypt_script: "script.sh".into(),
        decrypt_key: String::new(),
        driver_subdir: PathBuf::from("scripts"),
        log_root: home.join("logs"),
        log_suffix: ".log".into(),
        version_marker: "software_version".into(),
        version_window: 10,
        progress_interval_ms: 5000,
        connect_timeout_ms: 5000,
        max_message_size: DEFAULT_MESSAGE_LIMIT,
        time_format: TimeFormat::Local,
    }
});

impl Configuration {
    /// Hard-wired defaults
    #[must_use]
    pub fn system_default() -> &'static Self {
        &SYSTEM_DEFAULT
    }

    /// Interval between build progress messages
    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Client connection timeout
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Checks the fields for consistency, as far as possible without touching the filesystem
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.mr_port != self.fs_port,
            "mr_port and fs_port must differ (both are {})",
            self.mr_port
        );
        ensure!(
            self.progress_interval_ms > 0,
            "progress_interval_ms must be greater than zero"
        );
        ensure!(
            self.connect_timeout_ms > 0,
            "connect_timeout_ms must be greater than zero"
        );
        ensure!(
            self.max_message_size >= MIN_MESSAGE_LIMIT,
            "max_message_size must be at least {MIN_MESSAGE_LIMIT}"
        );
        ensure!(self.version_window > 0, "version_window must be greater than zero");
        ensure!(!self.version_marker.is_empty(), "version_marker must not be empty");
        ensure!(!self.log_suffix.is_empty(), "log_suffix must not be empty");
        ensure!(
            is_plain_file_name(&self.decrypt_script),
            "decrypt_script must be a bare file name"
        );
        ensure!(
            self.driver_subdir.is_relative(),
            "driver_subdir must be a relative path"
        );
        Ok(())
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{Configuration, MIN_MESSAGE_LIMIT};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        let config = Configuration::system_default();
        config.validate().unwrap();
        assert_eq!(config.progress_interval(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.decrypt_script, "script.sh");
        assert!(config.install_root.ends_with("robot_ws"));
    }

    #[test]
    fn rejections() {
        let base = Configuration::system_default().clone();

        let same_ports = Configuration {
            fs_port: base.mr_port,
            ..base.clone()
        };
        assert!(same_ports.validate().is_err());

        let tiny = Configuration {
            max_message_size: MIN_MESSAGE_LIMIT - 1,
            ..base.clone()
        };
        assert!(tiny.validate().is_err());

        let sneaky_script = Configuration {
            decrypt_script: "../script.sh".into(),
            ..base.clone()
        };
        assert!(sneaky_script.validate().is_err());

        let no_interval = Configuration {
            progress_interval_ms: 0,
            ..base
        };
        assert!(no_interval.validate().is_err());
    }
}
