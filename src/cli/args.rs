// (c) 2026 rupd contributors
//! Command line argument definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::styles::CLAP_STYLES;
use crate::{config::CommandLineSource, role::Role, util::TimeFormat};

/// Remote update service and client for robot workspaces
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about,
    styles = CLAP_STYLES,
    infer_long_args(true),
    propagate_version(true)
)]
pub(crate) struct CliArgs {
    #[command(flatten)]
    pub(crate) global: GlobalOptions,

    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Options that apply to every mode
#[derive(Debug, Args, Clone, Default)]
pub(crate) struct GlobalOptions {
    /// Reads an additional configuration file, at a higher priority than the standard files
    #[arg(long, global(true), value_name("FILE"), help_heading("Configuration"))]
    pub(crate) config: Option<PathBuf>,

    /// Enable detailed debug output
    ///
    /// This has the same effect as setting `RUST_LOG=rupd=debug` in the environment.
    /// If present, `RUST_LOG` overrides this option.
    #[arg(short, long, global(true), action, help_heading("Output"))]
    pub(crate) debug: bool,

    /// Quiet mode: reports only errors
    #[arg(short, long, global(true), action, conflicts_with("debug"), help_heading("Output"))]
    pub(crate) quiet: bool,

    /// Log to a file as well as the console
    ///
    /// To change what is logged to file, set `RUST_LOG_FILE_DETAIL` (same semantics as `RUST_LOG`).
    #[arg(short('l'), long, global(true), value_name("FILE"), help_heading("Output"))]
    pub(crate) log_file: Option<PathBuf>,

    /// Time format to use in console messages
    #[arg(short('T'), long, global(true), value_name("FORMAT"), help_heading("Output"))]
    pub(crate) time_format: Option<TimeFormat>,

    /// Port of the MR server
    #[arg(long, global(true), value_name("PORT"), help_heading("Network"))]
    pub(crate) mr_port: Option<u16>,

    /// Port of the FS server
    #[arg(long, global(true), value_name("PORT"), help_heading("Network"))]
    pub(crate) fs_port: Option<u16>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Runs the update servers
    Server(ServerArgs),
    /// Uploads update archives, installs and builds them
    Update(UpdateArgs),
    /// Downloads a category of log files from the servers
    Logs(LogsArgs),
    /// Outputs the configuration, then exits
    ShowConfig,
    /// Outputs the paths to configuration file(s), then exits
    ConfigFiles,
}

#[derive(Debug, Args, Clone, Default)]
pub(crate) struct ServerArgs {
    /// Which servers to run. May be repeated; defaults to both.
    #[arg(long("role"), value_enum, value_name("ROLE"))]
    pub(crate) roles: Vec<Role>,

    /// Address to listen on
    #[arg(long("bind"), value_name("ADDRESS"))]
    pub(crate) bind_address: Option<String>,

    /// Port to listen on. With a single `--role`, sets that role's port;
    /// without one, the role is the one configured for this port (MR if it is the MR port, otherwise FS).
    #[arg(long, value_name("PORT"))]
    pub(crate) port: Option<u16>,

    /// Directory holding the installed workspaces
    #[arg(long, value_name("DIR"))]
    pub(crate) install_root: Option<PathBuf>,

    /// Parent directory of per-session save directories
    #[arg(long, value_name("DIR"))]
    pub(crate) staging_root: Option<PathBuf>,

    /// Directory holding the decrypt script and fallback driver scripts
    #[arg(long, value_name("DIR"))]
    pub(crate) script_dir: Option<PathBuf>,

    /// Root directory of the log categories
    #[arg(long, value_name("DIR"))]
    pub(crate) log_root: Option<PathBuf>,
}

#[derive(Debug, Args, Clone, Default)]
pub(crate) struct UpdateArgs {
    /// Server host name or address
    #[arg(long, default_value("127.0.0.1"))]
    pub(crate) host: String,

    /// Update archive for the MR server
    #[arg(long, value_name("FILE"))]
    pub(crate) mr: Option<PathBuf>,

    /// Update archive for the FS server
    #[arg(long, value_name("FILE"))]
    pub(crate) fs: Option<PathBuf>,

    /// Saves each server's session log next to its archive
    #[arg(long, action)]
    pub(crate) save_logs: bool,
}

#[derive(Debug, Args, Clone, Default)]
pub(crate) struct LogsArgs {
    /// Server host name or address
    #[arg(long, default_value("127.0.0.1"))]
    pub(crate) host: String,

    /// Log category (a directory name under the server's log root)
    #[arg(long, default_value("eventlog"))]
    pub(crate) category: String,

    /// Where to save the files. Each server's files go in a subdirectory named after its role.
    #[arg(long, alias("dir"), value_name("DIR"), default_value("."))]
    pub(crate) dest: PathBuf,

    /// Which servers to ask. May be repeated; defaults to both.
    #[arg(long("role"), value_enum, value_name("ROLE"))]
    pub(crate) roles: Vec<Role>,
}

fn path_value(p: Option<&PathBuf>) -> Option<String> {
    p.map(|p| p.to_string_lossy().into_owned())
}

impl CliArgs {
    /// Configuration fields set on the command line
    pub(crate) fn overrides(&self) -> CommandLineSource {
        let mut src = CommandLineSource::new();
        let g = &self.global;
        src.add_opt("time_format", g.time_format.map(|t| t.to_string()));
        src.add_opt("mr_port", g.mr_port);
        src.add_opt("fs_port", g.fs_port);
        if let Command::Server(s) = &self.command {
            src.add_opt("bind_address", s.bind_address.clone());
            src.add_opt("install_root", path_value(s.install_root.as_ref()));
            src.add_opt("staging_root", path_value(s.staging_root.as_ref()));
            src.add_opt("script_dir", path_value(s.script_dir.as_ref()));
            src.add_opt("log_root", path_value(s.log_root.as_ref()));
        }
        src
    }
}

/// An empty selection means every role
pub(crate) fn roles_or_all(roles: &[Role]) -> Vec<Role> {
    use strum::IntoEnumIterator as _;
    if roles.is_empty() {
        Role::iter().collect()
    } else {
        let mut v = roles.to_vec();
        v.sort();
        v.dedup();
        v
    }
}
