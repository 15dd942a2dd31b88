//! # loopcast
//!
//! Publishes a greeting, prints recent history, then listens on a channel
//! set while periodically interrupting itself for a priority publish. A
//! clock line ticks along on stdout the whole time.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use loopcast_client::{PubNubClient, PubNubConfig};
use loopcast_core::logging::{init_json_subscriber, init_subscriber};
use loopcast_runtime::clock::spawn_clock;
use loopcast_runtime::{
    ConsoleObserver, Observer, Orchestrator, OrchestratorConfig, ShutdownCoordinator,
};
use loopcast_settings::{LogFormat, LoopcastSettings, load_settings, load_settings_from_path};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// PubNub subscribe loop with periodic priority publish.
#[derive(Parser, Debug)]
#[command(name = "loopcast", version, about)]
struct Cli {
    /// Settings file (default `~/.loopcast/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter, e.g. `info` or `loopcast_runtime=debug` (`RUST_LOG` wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Broker origin URL.
    #[arg(long)]
    origin: Option<String>,

    /// Preemption period in milliseconds.
    #[arg(long)]
    preempt_period_ms: Option<u64>,

    /// Do not print the clock line.
    #[arg(long)]
    no_clock: bool,
}

impl Cli {
    /// Overlay command-line flags on loaded settings.
    fn apply(&self, settings: &mut LoopcastSettings) {
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(origin) = &self.origin {
            settings.broker.origin.clone_from(origin);
        }
        if let Some(period) = self.preempt_period_ms {
            settings.preemption.period_ms = period;
        }
        if self.no_clock {
            settings.clock.enabled = false;
        }
    }

    fn load_settings(&self) -> Result<LoopcastSettings> {
        let mut settings = match &self.settings {
            Some(path) => load_settings_from_path(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => load_settings().context("failed to load settings")?,
        };
        self.apply(&mut settings);
        settings.validate().context("invalid settings")?;
        Ok(settings)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match start(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("loopcast: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn start(cli: &Cli) -> Result<ExitCode> {
    let settings = cli.load_settings()?;
    match settings.logging.format {
        LogFormat::Compact => init_subscriber(&settings.logging.level),
        LogFormat::Json => init_json_subscriber(&settings.logging.level),
    }

    let client = PubNubClient::new(PubNubConfig::from_settings(&settings))
        .context("failed to create PubNub client")?;
    let config = OrchestratorConfig::from_settings(&settings).context("invalid settings")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    Ok(runtime.block_on(serve(&settings, client, config)))
}

async fn serve(
    settings: &LoopcastSettings,
    client: PubNubClient,
    config: OrchestratorConfig,
) -> ExitCode {
    info!(
        origin = %settings.broker.origin,
        uuid = client.uuid(),
        channels = %config.channels,
        preempt_period_ms = settings.preemption.period_ms,
        "loopcast starting"
    );

    let observer: Arc<dyn Observer> = Arc::new(ConsoleObserver);
    let mut coordinator = ShutdownCoordinator::new();

    coordinator.track(spawn_interrupt_watch(coordinator.token()));
    if settings.clock.enabled {
        coordinator.track(spawn_clock(
            observer.clone(),
            Duration::from_millis(settings.clock.period_ms),
            coordinator.token(),
        ));
    }

    let mut orchestrator = Orchestrator::new(config, Arc::new(client), observer);
    match coordinator.supervise(&mut orchestrator).await {
        Ok(()) => {
            println!();
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("\nloopcast: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Cancel the shutdown token on Ctrl-C. Ends on its own once the token fires.
fn spawn_interrupt_watch(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    info!("interrupt received");
                    token.cancel();
                }
                Err(e) => {
                    warn!(error = %e, "cannot listen for Ctrl-C");
                    token.cancelled().await;
                }
            },
            () = token.cancelled() => {}
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "loopcast",
            "--log-level",
            "debug",
            "--origin",
            "http://localhost:9000",
            "--preempt-period-ms",
            "250",
            "--no-clock",
        ]);
        let mut settings = LoopcastSettings::default();
        cli.apply(&mut settings);

        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.broker.origin, "http://localhost:9000");
        assert_eq!(settings.preemption.period_ms, 250);
        assert!(!settings.clock.enabled);
    }

    #[test]
    fn no_flags_keep_settings() {
        let cli = Cli::parse_from(["loopcast"]);
        let mut settings = LoopcastSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings, LoopcastSettings::default());
    }

    #[test]
    fn settings_file_and_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"channels": {"subscribe": ["solo"]}}"#).unwrap();

        let cli = Cli::parse_from(["loopcast", "--settings", path.to_str().unwrap()]);
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.channels.subscribe, ["solo"]);

        let cli = Cli::parse_from([
            "loopcast",
            "--settings",
            path.to_str().unwrap(),
            "--preempt-period-ms",
            "0",
        ]);
        let err = cli.load_settings().unwrap_err();
        assert!(format!("{err:#}").contains("preemption.periodMs"));
    }
}
