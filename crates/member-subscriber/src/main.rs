//! Member Subscriber scenario replay.
//!
//! Replays a room scenario against the scripted transport and prints the
//! resulting report (observer events, transport requests, member states,
//! handle ledger) as JSON, followed by the Prometheus metrics exposition.
//!
//! # Usage
//!
//! ```text
//! member-subscriber <scenario.json>
//! MS_SCENARIO_PATH=<scenario.json> member-subscriber
//! ```
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Initialize Prometheus metrics recorder
//! 4. Load and replay the scenario
//! 5. Print the report and metrics

#![warn(clippy::pedantic)]

use anyhow::{bail, Context};
use member_subscriber::actors::ActorMetrics;
use member_subscriber::config::Config;
use member_subscriber::observability::init_metrics_recorder;
use member_subscriber::scenario::{replay, Scenario};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration before tracing so the log settings apply
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("member_subscriber={}", config.observability.log_level).into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    info!(
        preferred_mode = %config.preferred_mode,
        mode_fallback = ?config.mode_fallback,
        member_mailbox_capacity = config.member_mailbox_capacity,
        room_mailbox_capacity = config.room_mailbox_capacity,
        settle_timeout_ms = config.settle_timeout.as_millis(),
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        anyhow::anyhow!(e)
    })?;

    let path = match std::env::args().nth(1).or_else(|| config.scenario_path.clone()) {
        Some(path) => path,
        None => bail!("No scenario given: pass a path or set MS_SCENARIO_PATH"),
    };

    let scenario =
        Scenario::load(&path).with_context(|| format!("Failed to load scenario {path}"))?;

    info!(scenario = %path, members = scenario.members.len(), "Scenario loaded");

    let metrics = ActorMetrics::new();
    let report = replay(scenario, &config, metrics.clone())
        .await
        .context("Scenario replay failed")?;

    if report.outstanding_handles > 0 {
        warn!(
            outstanding_handles = report.outstanding_handles,
            "Renderer or subscriber handles were not released"
        );
    } else if report.outstanding_handles < 0 {
        warn!(
            outstanding_handles = report.outstanding_handles,
            "Renderer or subscriber handles were released more than once"
        );
    }

    info!(
        room_id = %report.room_id,
        requests = report.requests.len(),
        events = report.events.len(),
        subscribe_requests = metrics.subscribe_request_count(),
        stale_completions = metrics.stale_completion_count(),
        exhaustions = metrics.exhaustion_count(),
        "Scenario replay complete"
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize report")?
    );
    println!("{}", prometheus_handle.render());

    Ok(())
}
