use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use keepalive_core::config::DEFAULT_CONFIG_DIR;
use keepalive_core::counter::DEFAULT_WG_COMMAND;
use keepalive_core::{CounterSource, Monitor, MonitorConfig, ShellRunner, WgCounterSource};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "wg-keepalive", version)]
#[command(about = "Restart a WireGuard interface when its inbound traffic stalls")]
struct Cli {
    /// WireGuard interface name
    interface: String,

    /// Directory holding <interface>.conf
    #[arg(short = 'd', long, default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,

    #[arg(long, value_enum, default_value = "info")]
    loglevel: LogLevel,

    #[arg(long)]
    no_log_timestamp: bool,

    /// Tool queried for the interface's transfer counters
    #[arg(long, default_value = DEFAULT_WG_COMMAND)]
    wg_command: String,

    /// Sample the counter once, print it with the resolved configuration and exit
    #[arg(long)]
    check: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.use_stderr() => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
        Err(err) => err.exit(),
    };

    init_logging(cli.loglevel, !cli.no_log_timestamp);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: LogLevel, timestamps: bool) {
    let filter = if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level.as_filter())
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    if timestamps {
        builder.init();
    } else {
        builder.without_time().init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = MonitorConfig::load(&cli.config_dir, &cli.interface)
        .with_context(|| format!("loading configuration for {}", cli.interface))?;
    let mut source = WgCounterSource::new(cli.wg_command);

    if cli.check {
        let rx_bytes = source.sample(&config.interface).await?;
        let out = serde_json::json!({
            "config": config,
            "rx_bytes": rx_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    let mut monitor = Monitor::new(source, ShellRunner, config);
    monitor.run(token).await?;

    Ok(())
}

async fn cancel_on_signal(token: CancellationToken) {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(err) => {
            warn!(error = %err, "cannot listen for SIGTERM");
            None
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => warn!("received ctrl-c, stopping"),
        Some(_) = async {
            match terminate.as_mut() {
                Some(stream) => stream.recv().await,
                None => std::future::pending().await,
            }
        } => warn!("received SIGTERM, stopping"),
    }

    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_packaged_layout() {
        let cli = Cli::try_parse_from(["wg-keepalive", "wg0"]).expect("parse");

        assert_eq!(cli.interface, "wg0");
        assert_eq!(cli.config_dir, PathBuf::from("/etc/wg-keepalive"));
        assert_eq!(cli.wg_command, "wg");
        assert!(matches!(cli.loglevel, LogLevel::Info));
        assert!(!cli.no_log_timestamp);
        assert!(!cli.check);
    }

    #[test]
    fn short_config_dir_and_loglevel() {
        let cli = Cli::try_parse_from([
            "wg-keepalive",
            "-d",
            "/tmp/conf",
            "--loglevel",
            "debug",
            "--no-log-timestamp",
            "wg1",
        ])
        .expect("parse");

        assert_eq!(cli.config_dir, PathBuf::from("/tmp/conf"));
        assert!(matches!(cli.loglevel, LogLevel::Debug));
        assert!(cli.no_log_timestamp);
    }

    #[test]
    fn interface_is_required() {
        let err = Cli::try_parse_from(["wg-keepalive"]).expect_err("missing interface");
        assert!(err.use_stderr());
    }
}
