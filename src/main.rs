//! Skycoach - Autonomous CFI Supervisor
//!
//! Runs alongside a flight simulator, ingests live aircraft telemetry
//! over UDP, detects the current phase of flight, evaluates hazard and
//! standards rules, and dispatches spoken coaching through urgent and
//! non-urgent channels. A completed flight (touchdown plus engine
//! shutdown) emits a full-flight debrief and arms the next cycle.
//!
//! # Usage
//!
//! ```bash
//! # Run against a local simulator with default settings
//! cargo run --release
//!
//! # Bounded dry run without the external speech endpoint
//! cargo run --release -- --duration-sec 600 --dry-run
//! ```
//!
//! # Environment Variables
//!
//! - `SKYCOACH_CONFIG`: Path to a TOML config file (default ./skycoach.toml)
//! - `SKYCOACH_UDP_HOST` / `SKYCOACH_UDP_PORT`: Simulator endpoint overrides
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use skycoach::config::{self, CoachConfig};
use skycoach::journal::JsonlJournal;
use skycoach::runtime::{CoachRuntime, RuntimeOptions};
use skycoach::speech::{HttpSpeechTransport, SpeechSink};
use skycoach::team::RestExpertTeam;
use skycoach::telemetry::XPlaneUdpSource;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "skycoach")]
#[command(about = "Skycoach Autonomous CFI Supervisor")]
#[command(version)]
struct CliArgs {
    /// Stop after this many seconds (0 = run until interrupted)
    #[arg(long, default_value = "0")]
    duration_sec: f64,

    /// Skip the external speech endpoint; cooldown state still advances
    #[arg(long)]
    dry_run: bool,

    /// Disable review/debrief utterances (urgent callouts still speak)
    #[arg(long)]
    no_nonurgent_speak: bool,

    /// Disable all speech output (implies --no-nonurgent-speak)
    #[arg(long)]
    no_speak: bool,

    /// Override the tick-loop poll interval (seconds)
    #[arg(long)]
    poll_sec: Option<f64>,

    /// Override the maximum run duration (hours, 0 = unlimited)
    #[arg(long)]
    max_flight_hours: Option<f64>,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut coach_config = CoachConfig::load();
    if let Some(poll_sec) = args.poll_sec {
        coach_config.runtime.poll_sec = poll_sec;
    }
    if let Some(max_flight_hours) = args.max_flight_hours {
        coach_config.runtime.max_flight_hours = max_flight_hours;
    }
    coach_config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    config::init(coach_config.clone());

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Skycoach - Autonomous CFI Supervisor");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("");

    // Assemble the pipeline
    let source = Box::new(XPlaneUdpSource::new(
        coach_config.telemetry.clone(),
        coach_config.review.review_window_sec,
    ));

    let dry_run = args.dry_run || args.no_speak;
    let transport = HttpSpeechTransport::new(&coach_config.speech)
        .map_err(|e| anyhow::anyhow!("speech transport setup failed: {e}"))?;
    let speech = SpeechSink::new(&coach_config.speech, Box::new(transport), dry_run);

    let team = Box::new(
        RestExpertTeam::new(
            &coach_config.team,
            JsonlJournal::new(&coach_config.journal.team_chat_log),
        )
        .map_err(|e| anyhow::anyhow!("expert team client setup failed: {e}"))?,
    );

    let options = RuntimeOptions {
        nonurgent_speak_enabled: !(args.no_nonurgent_speak || args.no_speak),
    };
    let mut runtime = CoachRuntime::new(coach_config, options, source, speech, team);

    // Ctrl+C requests a clean stop of the tick loop
    let cancel = runtime.cancel_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        cancel.cancel();
    });

    let duration = (args.duration_sec > 0.0).then_some(args.duration_sec);
    if let Err(e) = runtime.run(duration).await {
        error!(error = %e, "Supervisor failed");
        return Err(e);
    }

    info!("");
    info!("Skycoach shutdown complete");
    Ok(())
}
