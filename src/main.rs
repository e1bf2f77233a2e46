//! scf-detector - Coil detector for Solana memecoin liquidity pools
//!
//! Binary entry point: parses the CLI, wires stores/scorers/engine from
//! configuration and dispatches to the run/replay/gen-stream handlers.

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{fmt, EnvFilter};

use scf_detector::adapters::cli::{
    CheckConfigCmd, CliApp, Command, GenStreamCmd, ReplayCmd, RunCmd,
};
use scf_detector::adapters::storage::{
    InMemoryFeatureStore, InMemorySignalStore, JsonFeatureStore, JsonlSignalStore,
};
use scf_detector::adapters::stream;
use scf_detector::adapters::wallet::{FileWalletScorer, NeutralWalletScorer};
use scf_detector::application::{drive, DetectorEngine};
use scf_detector::config::{default_config, load_config, Config};
use scf_detector::ports::{FeatureStore, SignalStore, WalletScorer};

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets and SCF_* overrides live in .env, not in config.toml.
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    match app.command {
        Command::Run(cmd) => run_command(cmd, app.verbose, app.debug).await,
        Command::Replay(cmd) => replay_command(cmd, app.verbose, app.debug).await,
        Command::GenStream(cmd) => gen_stream_command(cmd),
        Command::CheckConfig(cmd) => check_config_command(cmd),
    }
}

fn init_logging(config_level: &str, verbose: bool, debug: bool) {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        config_level
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt().with_env_filter(filter).init();
}

fn load_config_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => default_config().context("failed to build default configuration"),
    }
}

fn load_prior_winners(path: Option<&PathBuf>) -> Result<HashSet<String>> {
    let Some(path) = path else {
        return Ok(HashSet::new());
    };
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read prior winners from {}", path.display()))?;
    let wallets: Vec<String> =
        serde_json::from_str(&body).context("prior winners file is not a JSON string array")?;
    Ok(wallets.into_iter().collect())
}

fn build_scorer(config: &Config) -> Result<Arc<dyn WalletScorer>> {
    match &config.detector.wallet_profiles_path {
        Some(path) => {
            let scorer = FileWalletScorer::load(path)
                .with_context(|| format!("failed to load wallet profiles from {}", path.display()))?;
            tracing::info!(profiles = scorer.len(), "wallet profiles loaded");
            Ok(Arc::new(scorer))
        }
        None => Ok(Arc::new(NeutralWalletScorer)),
    }
}

async fn build_stores(
    config: &Config,
) -> Result<(Arc<dyn FeatureStore>, Arc<dyn SignalStore>)> {
    if config.storage.persist_files {
        let dir = &config.storage.data_dir;
        let features = JsonFeatureStore::open(dir)
            .await
            .context("failed to open feature store")?;
        let signals = JsonlSignalStore::open(dir)
            .await
            .context("failed to open signal store")?;
        Ok((Arc::new(features), Arc::new(signals)))
    } else {
        Ok((
            Arc::new(InMemoryFeatureStore::new()),
            Arc::new(InMemorySignalStore::new()),
        ))
    }
}

async fn run_command(cmd: RunCmd, verbose: bool, debug: bool) -> Result<()> {
    let config = load_config_or_default(cmd.config.as_deref())?;
    init_logging(&config.logging.level, verbose, debug);
    tracing::info!("starting coil detector");

    let (features, signals) = build_stores(&config).await?;
    let scorer = build_scorer(&config)?;
    let winners = load_prior_winners(config.detector.prior_winners_path.as_ref())?;
    if !winners.is_empty() {
        tracing::info!(wallets = winners.len(), "prior-winners cohort loaded");
    }

    let engine = Arc::new(DetectorEngine::new(
        config.detector.clone(),
        config.thresholds.clone(),
        features,
        signals,
        scorer,
        winners,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        shutdown_tx.send(true).ok();
    });

    let (event_tx, event_rx) = mpsc::channel(1024);
    tokio::spawn(stream::pump_stdin(event_tx));

    engine.run(event_rx, shutdown_rx).await?;
    Ok(())
}

async fn replay_command(cmd: ReplayCmd, verbose: bool, debug: bool) -> Result<()> {
    let config = load_config_or_default(cmd.config.as_deref())?;
    init_logging(&config.logging.level, verbose, debug);

    let events = stream::read_events_file(&cmd.file)
        .with_context(|| format!("failed to load events from {}", cmd.file.display()))?;
    tracing::info!(events = events.len(), "replaying event file");

    let features = Arc::new(InMemoryFeatureStore::new());
    let signals = Arc::new(InMemorySignalStore::new());
    let scorer = build_scorer(&config)?;
    let winners = load_prior_winners(config.detector.prior_winners_path.as_ref())?;

    let engine = Arc::new(DetectorEngine::new(
        config.detector.clone(),
        config.thresholds.clone(),
        features.clone(),
        signals.clone(),
        scorer,
        winners,
    ));

    let report = drive(&engine, events, cmd.tick_secs).await?;
    let emitted = signals.all().await;

    println!(
        "replayed {} events over {} ticks ({} .. {})",
        report.events, report.ticks, report.first_ts, report.last_ts
    );
    println!("pools tracked: {}", features.len().await);
    println!("signals emitted: {}", emitted.len());
    for sig in &emitted {
        println!(
            "  {} pool={} score={:.3} reason={}",
            sig.ts, sig.pool, sig.score, sig.reason
        );
    }
    Ok(())
}

fn gen_stream_command(cmd: GenStreamCmd) -> Result<()> {
    let start = chrono::Utc::now() - chrono::Duration::minutes(30);
    let scenario = match cmd.seed {
        Some(seed) => stream::coil_scenario_seeded(&cmd.pool, start, seed),
        None => stream::coil_scenario(&cmd.pool, start),
    };
    let body = stream::to_jsonl(&scenario.events).context("failed to serialize events")?;

    match cmd.out {
        Some(path) => {
            std::fs::write(&path, body)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "wrote {} events for pool {} to {}",
                scenario.events.len(),
                scenario.pool,
                path.display()
            );
            eprintln!(
                "prior winners: {}",
                serde_json::to_string(&scenario.prior_winners.iter().collect::<Vec<_>>())?
            );
        }
        None => print!("{body}"),
    }
    Ok(())
}

fn check_config_command(cmd: CheckConfigCmd) -> Result<()> {
    let config = load_config_or_default(cmd.config.as_deref())?;
    println!(
        "configuration ok: poll={}s cooldown={}s vc_max={} lt_max={} weights_sum={:.2}",
        config.detector.poll_secs,
        config.thresholds.cooldown_secs,
        config.thresholds.vc_max,
        config.thresholds.lt_depth_max,
        config.thresholds.weights.sum(),
    );
    Ok(())
}
