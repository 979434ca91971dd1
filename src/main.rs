#![forbid(unsafe_code)]

//! `acp-harness`: drive an ACP agent through one prompt over stdio.
//!
//! Spawns the agent, runs initialize → session/new → session/prompt, drains
//! streamed notifications until the prompt's response arrives, prints the
//! result summary on stdout, and exits `0` on success or `1` otherwise.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use acp_harness::acp::spawner::{spawn_agent, SpawnConfig};
use acp_harness::{AppError, HarnessConfig, ProtocolDriver, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "acp-harness", about = "ACP stdio conformance harness", version, long_about = None)]
struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Agent executable to launch.
    #[arg(long)]
    agent: Option<String>,

    /// Argument passed to the agent; repeat for several. Replaces the
    /// configured arguments when given.
    #[arg(long = "agent-arg", allow_hyphen_values = true)]
    agent_args: Vec<String>,

    /// Prompt text sent in `session/prompt`.
    #[arg(long)]
    prompt: Option<String>,

    /// Consecutive empty reads before the drain gives up.
    #[arg(long)]
    max_empty_reads: Option<u32>,

    /// Wall-clock bound on the drain in milliseconds (0 disables it).
    #[arg(long)]
    drain_deadline_ms: Option<u64>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print the run report as JSON instead of the text summary.
    #[arg(long)]
    report_json: bool,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    let outcome = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(args)));

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "acp harness run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    let config = load_config(&args)?;
    info!(
        agent = config.agent_command.as_str(),
        args = ?config.agent_args,
        "starting acp harness"
    );

    // Armed before the agent exists so the startup delay is interruptible too.
    let interrupted = interrupt_signal();
    tokio::pin!(interrupted);

    let spawn_config = SpawnConfig::from(&config);
    let transport = tokio::select! {
        spawned = spawn_agent(&spawn_config) => spawned?,
        signal = &mut interrupted => return Err(interrupted_by(signal)),
    };
    let mut driver = ProtocolDriver::new(transport);

    let outcome = tokio::select! {
        result = driver.run(&config) => result,
        signal = &mut interrupted => Err(interrupted_by(signal)),
    };

    match driver.shutdown(config.shutdown_grace()).await {
        Ok(shutdown) => info!(?shutdown, "agent shut down"),
        Err(err) => warn!(%err, "agent shutdown failed"),
    }

    let report = outcome?;
    if args.report_json {
        println!("{}", report.to_json()?);
    } else {
        println!("{report}");
    }

    report.verdict()
}

/// Build the effective configuration: file (or defaults), then CLI overrides.
fn load_config(args: &Cli) -> Result<HarnessConfig> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::load_from_path(path)?,
        None => HarnessConfig::default(),
    };

    if let Some(agent) = &args.agent {
        config.agent_command.clone_from(agent);
    }
    if !args.agent_args.is_empty() {
        config.agent_args.clone_from(&args.agent_args);
    }
    if let Some(prompt) = &args.prompt {
        config.prompt.clone_from(prompt);
    }
    if let Some(max) = args.max_empty_reads {
        config.timeouts.max_empty_reads = max;
    }
    if let Some(ms) = args.drain_deadline_ms {
        config.timeouts.drain_deadline_ms = ms;
    }

    config.validate()?;
    Ok(config)
}

fn interrupted_by(signal: &str) -> AppError {
    AppError::Interrupted(format!("run interrupted by {signal}"))
}

/// Resolve with the name of the first operator signal received.
async fn interrupt_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            },
            Err(err) => {
                warn!(%err, "SIGTERM unavailable; only ctrl-c interrupts the run");
                wait_for_ctrl_c().await
            }
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await
    }
}

async fn wait_for_ctrl_c() -> &'static str {
    if let Err(err) = tokio::signal::ctrl_c().await {
        // Without a handler the run can only end on its own bounds.
        error!(%err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the report; diagnostics go to stderr.
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);

    let installed = match log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| AppError::Config(format!("cannot install harness logger: {err}")))
}
