mod cli;

use std::{path::Path, process::ExitCode, time::Duration};

use anyhow::{Context, bail};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};

use warden_core::prelude::*;
use warden_observe::{init_local_offset, init_logger};

use crate::cli::{Cli, Command};

/// Exit code of a shim whose exec failed, in shell convention.
const EXIT_EXEC_FAILED: u8 = 127;

fn main() -> ExitCode {
    let cli = Cli::parse();
    // Offset detection only works while the process is single-threaded.
    init_local_offset();

    let mut config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("warden: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logger(&config.logger) {
        eprintln!("warden: {e}");
        return ExitCode::FAILURE;
    }

    let shim = matches!(cli.command, Command::Shim { .. });
    let runtime = if shim {
        tokio::runtime::Builder::new_current_thread().enable_all().build()
    } else {
        tokio::runtime::Builder::new_multi_thread().enable_all().build()
    };
    let runtime = match runtime {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("warden: cannot start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli.command, &mut config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if shim => {
            error!(error = %format!("{e:#}"), "service exec failed");
            ExitCode::from(EXIT_EXEC_FAILED)
        }
        Err(e) => {
            eprintln!("warden: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<WardenConfig> {
    let mut config = WardenConfig::load(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.logger.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.logger.format = format;
    }
    Ok(config)
}

async fn run(command: Command, config: &mut WardenConfig) -> anyhow::Result<()> {
    match command {
        Command::Up {
            state,
            definition,
            name,
            wait,
        } => {
            if let Some(wait) = wait {
                config.up_wait_secs = wait;
            }
            let definition = definition
                .as_deref()
                .map(read_definition)
                .transpose()?;
            let controller = Controller::new(StateDir::new(state), config.clone());
            match controller
                .up(definition.as_deref(), name.as_deref(), shutdown_signal())
                .await?
            {
                UpOutcome::Started { svcpid } => println!("up: service spawned (svcpid {svcpid})"),
                UpOutcome::AlreadyUp { svcpid: Some(pid) } => {
                    println!("up: already running (svcpid {pid})")
                }
                UpOutcome::AlreadyUp { svcpid: None } => println!("up: already running"),
            }
        }

        Command::Down { state, timeout } => {
            let timeout = Duration::from_secs(timeout.unwrap_or(config.down_timeout_secs));
            let controller = Controller::new(StateDir::new(state), config.clone());
            match controller.down(timeout).await? {
                DownOutcome::Abandoned => {
                    bail!("controller did not stop; process group killed, status is undefined")
                }
                outcome => println!("down: {}", down_label(outcome)),
            }
        }

        Command::Status { state, json } => {
            let report = Controller::new(StateDir::new(state), config.clone()).status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
        }

        Command::Purge { state } => {
            Controller::new(StateDir::new(state), config.clone()).purge()?;
            println!("purged");
        }

        Command::Monitor {
            state,
            timeout,
            sink,
            outer,
            inner,
        } => {
            let mut delimiters = config.delimiters;
            delimiters.outer = outer.unwrap_or(delimiters.outer);
            delimiters.inner = inner.unwrap_or(delimiters.inner);

            let store = StateDir::new(state).init_store()?;
            let monitor = Monitor::start(store, timeout)?;
            match sink {
                Some(path) => {
                    let file = tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .await
                        .with_context(|| format!("open sink {}", path.display()))?;
                    run_to_sink(monitor, delimiters, file, shutdown_signal()).await?;
                }
                None => {
                    run_to_sink(monitor, delimiters, tokio::io::stdout(), shutdown_signal()).await?;
                }
            }
        }

        Command::Loop { state, gate } => {
            let cntrl = ControllerLoop::new(StateDir::new(state), config.program()?)?;
            let exit = cntrl.run(gate.as_deref(), true).await?;
            info!(svcpid = exit.svcpid, rc = exit.rc, stopped = exit.stopped, "controller loop done");
        }

        Command::Shim { gate } => run_shim(&gate).await?,
    }
    Ok(())
}

fn read_definition(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read definition {}", path.display()))
}

fn down_label(outcome: DownOutcome) -> &'static str {
    match outcome {
        DownOutcome::Graceful => "stopped",
        DownOutcome::Forceful => "stopped (forced)",
        DownOutcome::Abandoned => "abandoned",
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate => {}
    }
}
