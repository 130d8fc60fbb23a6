//! Main CLI for rupd
// (c) 2026 rupd contributors

use std::{collections::BTreeMap, io::IsTerminal as _, process::ExitCode};

use anstream::{eprintln, println};
use anyhow::{Context as _, Result};
use clap::Parser as _;
use indicatif::{MultiProgress, ProgressDrawTarget};
use tracing::{debug, error_span};

use super::{
    args::{roles_or_all, CliArgs, Command, LogsArgs, ServerArgs, UpdateArgs},
    styles::{outcome, ERROR, RESET},
};
use crate::{
    client::{Orchestrator, Report, MAX_UPDATE_FPS},
    config::{Configuration, Manager},
    role::Role,
    server::server_main,
    util::{setup_tracing, trace_level, ConsoleTraceType},
};

/// Main CLI entrypoint
///
/// Call this from `main`. It reads argv.
/// # Return
/// An exit code, success only if the requested operation fully succeeded.
/// An Error is a failure we have not output or logged.
pub fn cli() -> Result<ExitCode> {
    let args = CliArgs::parse();

    let mut manager = Manager::standard(args.global.config.as_deref());
    manager.merge_provider(args.overrides());

    match args.command {
        Command::ConfigFiles => {
            println!("{:?}", Manager::config_files());
            return Ok(ExitCode::SUCCESS);
        }
        Command::ShowConfig => {
            println!("{}", show_config_data(&manager));
            let _ = manager.configuration()?;
            return Ok(ExitCode::SUCCESS);
        }
        _ => (),
    }

    let mut config = manager.configuration()?;
    let mut command = args.command;
    if let Command::Server(s) = &mut command {
        apply_server_port(s, &mut config)?;
    }
    let display = match (&command, args.global.quiet) {
        (Command::Update(_) | Command::Logs(_), false) => Some(MultiProgress::with_draw_target(
            ProgressDrawTarget::stderr_with_hz(MAX_UPDATE_FPS),
        )),
        _ => None,
    };
    setup_tracing(
        trace_level(args.global.debug, args.global.quiet),
        display
            .clone()
            .map_or(ConsoleTraceType::Standard, ConsoleTraceType::Indicatif),
        args.global.log_file.as_deref(),
        config.time_format,
        std::io::stderr().is_terminal(),
    )?;

    run(command, config, display)
}

/// Resolves `--port` into a role and that role's listening port
fn apply_server_port(args: &mut ServerArgs, config: &mut Configuration) -> Result<()> {
    let Some(port) = args.port else {
        return Ok(());
    };
    let role = match args.roles.as_slice() {
        [] => Role::for_port(port, config),
        [role] => *role,
        _ => anyhow::bail!("--port needs a single --role"),
    };
    role.set_port(config, port);
    config.validate()?;
    args.roles = vec![role];
    Ok(())
}

#[tokio::main]
async fn run(command: Command, config: Configuration, display: Option<MultiProgress>) -> Result<ExitCode> {
    match command {
        Command::Server(s) => {
            let _span = error_span!("server").entered();
            server_main(config, &roles_or_all(&s.roles))
                .await
                .context("[Server] failed")?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Update(u) => Ok(run_update(&config, display, u).await),
        Command::Logs(l) => Ok(run_logs(&config, display, l).await),
        Command::ShowConfig | Command::ConfigFiles => Ok(ExitCode::SUCCESS),
    }
}

fn show_config_data(manager: &Manager) -> String {
    format!("Configuration:\n{}", manager.to_display_adapter())
}

async fn run_update(config: &Configuration, display: Option<MultiProgress>, args: UpdateArgs) -> ExitCode {
    let mut files = BTreeMap::new();
    let mut roles = Vec::new();
    for (role, file) in [(Role::Mr, args.mr), (Role::Fs, args.fs)] {
        if let Some(f) = file {
            roles.push(role);
            let _ = files.insert(role, f);
        }
    }
    if roles.is_empty() {
        eprintln!("{ERROR}Error:{RESET} No file selected. Use --mr and/or --fs.");
        return ExitCode::FAILURE;
    }

    let mut orchestrator = Orchestrator::new(&args.host, &roles, config);
    if let Some(mp) = &display {
        orchestrator.set_display(mp);
    }
    let report = orchestrator.update_all(&files, args.save_logs).await;
    for (role, log) in orchestrator.log_details() {
        debug!("{role} session log:{log}");
    }
    conclude(&report)
}

async fn run_logs(config: &Configuration, display: Option<MultiProgress>, args: LogsArgs) -> ExitCode {
    let mut orchestrator = Orchestrator::new(&args.host, &roles_or_all(&args.roles), config);
    if let Some(mp) = &display {
        orchestrator.set_display(mp);
    }
    let report = orchestrator.request_logs(&args.dest, &args.category).await;
    conclude(&report)
}

fn conclude(report: &Report) -> ExitCode {
    let style = outcome(report.succeeded());
    if report.succeeded() {
        println!("{style}{report}{RESET}");
        ExitCode::SUCCESS
    } else {
        eprintln!("{style}{report}{RESET}");
        ExitCode::FAILURE
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::{apply_server_port, show_config_data};
    use crate::{
        cli::args::ServerArgs,
        config::{Configuration, Manager},
        role::Role,
    };
    use pretty_assertions::assert_eq;
    use assertables::assert_contains;

    #[test]
    fn server_port_selects_role() {
        let mut config = Configuration::system_default().clone();
        let mut args = ServerArgs {
            port: Some(12341),
            ..Default::default()
        };
        apply_server_port(&mut args, &mut config).unwrap();
        assert_eq!(args.roles, vec![Role::Mr]);

        let mut args = ServerArgs {
            port: Some(4000),
            roles: vec![Role::Mr],
            ..Default::default()
        };
        apply_server_port(&mut args, &mut config).unwrap();
        assert_eq!(config.mr_port, 4000);

        let mut args = ServerArgs {
            port: Some(4001),
            roles: vec![Role::Mr, Role::Fs],
            ..Default::default()
        };
        assert!(apply_server_port(&mut args, &mut config).is_err());
    }

    #[test]
    fn show_config() {
        let data = show_config_data(&Manager::without_files());
        assert_contains!(data, "Configuration:");
        assert_contains!(data, "mr_port");
        assert_contains!(data, "<not set>");
    }
}
