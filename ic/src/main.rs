//! Irrigation controller
//!
//! CLI entry point for listing and running irrigation programs.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use irrigation::cli::{Cli, Command, get_log_path};
use irrigation::config::Config;
use irrigation::events::{Phase, RunEvent, create_event_bus};
use irrigation::program::load_programs;
use irrigation::sequencer::{RunOutcome, Sequencer, SequencerConfig};
use irrigation::valve::{HttpValveClient, ValveClient};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::List { file } => cmd_list(&config, file),
        Command::Run { id, file, address } => cmd_run(&config, id, file, address).await,
        Command::Status { address } => cmd_status(&config, address).await,
    }
}

/// Pick the program file: `--file` wins over config
fn programs_file(config: &Config, file: Option<PathBuf>) -> PathBuf {
    file.unwrap_or_else(|| config.programs_file.clone())
}

/// Pick the device address: `--address` wins over config
fn device_address(config: &Config, address: Option<String>) -> Result<String> {
    address.or_else(|| config.device.address.clone()).ok_or_else(|| {
        eyre::eyre!("No valve address given. Pass --address or set device.address in the config file.")
    })
}

/// List programs in the program file
fn cmd_list(config: &Config, file: Option<PathBuf>) -> Result<()> {
    let path = programs_file(config, file);
    let loaded = load_programs(&path, config.program.step_count)?;

    for rejected in &loaded.rejected {
        eprintln!(
            "{} skipping record #{} (id: {}, name: {}): {}",
            "warning:".yellow(),
            rejected.index,
            rejected.id,
            rejected.name,
            rejected.error
        );
    }

    if loaded.programs.is_empty() {
        println!("No irrigation programs in {}", path.display());
        return Ok(());
    }

    println!("Irrigation programs ({}):", path.display());
    for program in &loaded.programs {
        println!("  {} ({}s total)", program, program.total_watering_secs());
    }
    Ok(())
}

/// Run one program to completion or abort
async fn cmd_run(config: &Config, id: i64, file: Option<PathBuf>, address: Option<String>) -> Result<()> {
    let address = device_address(config, address)?;
    let path = programs_file(config, file);
    let loaded = load_programs(&path, config.program.step_count)?;
    for rejected in &loaded.rejected {
        eprintln!(
            "{} skipping record #{} (id: {}): {}",
            "warning:".yellow(),
            rejected.index,
            rejected.id,
            rejected.error
        );
    }
    let program = loaded.find(id)?;
    info!(id, total_secs = program.total_watering_secs(), "cmd_run: program found");
    println!(
        "Program {}: {}s of watering over {} steps",
        program.name(),
        program.total_watering_secs(),
        program.active_steps().count()
    );

    let client: Arc<dyn ValveClient> =
        Arc::new(HttpValveClient::from_config(&config.device).context("Failed to create valve client")?);
    let bus = create_event_bus();
    let printer = tokio::spawn(print_progress(bus.subscribe()));

    let mut sequencer = Sequencer::new(client, SequencerConfig::from(config), bus);
    let outcome = sequencer.run(program, &address).await;

    // The printer stops on the terminal event
    join_printer(printer).await;

    match outcome {
        RunOutcome::Completed { steps_run } => {
            println!("{} Program {} completed ({} steps)", "✓".green(), program.name(), steps_run);
            Ok(())
        }
        RunOutcome::Aborted(reason) => {
            println!("{} Program {} aborted", "❌".red(), program.name());
            Err(eyre::eyre!("{}", reason))
        }
    }
}

/// Wait for the progress printer; a failed printer never fails the run
async fn join_printer(printer: JoinHandle<()>) -> bool {
    match printer.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "join_printer: progress printer failed");
            false
        }
    }
}

/// Print run progress with timestamps until the run ends
async fn print_progress(mut rx: broadcast::Receiver<RunEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "print_progress: lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let stamp = now.dimmed();
        match &event {
            RunEvent::RunStarted {
                program_id,
                program_name,
                address,
                ..
            } => {
                println!(
                    "{} Running program {} ({}) on {}",
                    stamp,
                    program_name.bright_cyan().bold(),
                    program_id,
                    address
                );
            }
            RunEvent::StepStarted {
                step,
                total_steps,
                duration_secs,
                ..
            } => {
                println!("{} Step {}/{}: water {}s", stamp, step + 1, total_steps, duration_secs);
            }
            RunEvent::PhaseChanged { step, phase, .. } => match phase {
                Phase::Opening => println!("{}   step {}: opening valve", stamp, step + 1),
                Phase::Holding => println!("{}   step {}: {}", stamp, step + 1, "valve open".green()),
                Phase::Closing => println!("{}   step {}: closing valve", stamp, step + 1),
                Phase::Settling => println!("{}   step {}: valve closed, settling", stamp, step + 1),
            },
            RunEvent::AttemptFailed {
                step,
                command,
                attempt,
                max_attempts,
                error,
                ..
            } => {
                println!(
                    "{}   step {}: {} attempt {}/{} failed: {}",
                    stamp,
                    step + 1,
                    command,
                    attempt,
                    max_attempts,
                    error.yellow()
                );
            }
            RunEvent::StepCompleted { step, .. } => {
                println!("{} Step {} done", stamp, step + 1);
            }
            RunEvent::RunCompleted { .. } => {}
            RunEvent::RunAborted { message, .. } => {
                println!("{} {}", stamp, message.red());
            }
        }

        if event.is_terminal() {
            break;
        }
    }
}

/// Print the live valve state
async fn cmd_status(config: &Config, address: Option<String>) -> Result<()> {
    let address = device_address(config, address)?;
    let client = HttpValveClient::from_config(&config.device).context("Failed to create valve client")?;

    let state = client
        .get_status(&address)
        .await
        .with_context(|| format!("Failed to query valve at {}", address))?;
    println!("Valve at {}: {}", address, state);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use irrigation::events::EventBus;

    #[tokio::test]
    async fn test_printer_stops_on_terminal_event() {
        let bus = EventBus::new(16);
        let printer = tokio::spawn(print_progress(bus.subscribe()));
        bus.emitter_for("run-1").run_completed(0);

        assert!(join_printer(printer).await);
    }

    #[tokio::test]
    async fn test_failed_printer_is_reported() {
        let printer: JoinHandle<()> = tokio::spawn(async { panic!("printer broke") });
        assert!(!join_printer(printer).await);
    }
}
