//! Bundle Relay Submitter
//!
//! Entry point: loads configuration and the signing wallet, connects to the
//! ledger and the block-engine relay, runs one submission cycle and follows
//! the bundle's result until it is final, the deadline passes or the
//! process is interrupted.
//!
//! ## Environment
//!
//! - `BLOCK_ENGINE_URL`: relay base URL
//! - `AUTH_KEYPAIR_PATH`: JSON keypair file (64 byte array)
//! - `RPC_URL`: ledger JSON-RPC URL
//! - `BUNDLE_TRANSACTION_LIMIT`: maximum transactions per bundle

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{bail, Context, Result};
use bundle_submitter::config::{Config, ConfigOverrides};
use bundle_submitter::endpoints;
use bundle_submitter::ledger::RpcLedgerClient;
use bundle_submitter::orchestrator::{Cycle, CyclePlan, CycleState, CycleTimeouts, Orchestrator};
use bundle_submitter::relay::{BundleEvent, JsonRpcRelayClient, ResultSubscription, SubmissionClient};
use bundle_submitter::tx_builder::{BundleError, TipPlacement};
use bundle_submitter::wallet::Wallet;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Block engine base URL
    #[arg(long, env = "BLOCK_ENGINE_URL")]
    block_engine_url: Option<String>,

    /// Keypair file used to sign every transaction
    #[arg(long, env = "AUTH_KEYPAIR_PATH")]
    keypair: Option<String>,

    /// Ledger JSON-RPC URL
    #[arg(long, env = "RPC_URL")]
    rpc_url: Option<String>,

    /// Maximum transactions per bundle
    #[arg(long, env = "BUNDLE_TRANSACTION_LIMIT")]
    bundle_limit: Option<String>,

    /// Tip position: first, last or embedded
    #[arg(long)]
    tip_placement: Option<String>,

    /// Payload note, one transaction per occurrence
    #[arg(long = "note")]
    notes: Vec<String>,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build, submit and follow one bundle (default)
    Bundle,
    /// Broadcast a single note transaction through the ledger, without a bundle
    Note { text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging(args.verbose, config.monitoring.log_json)?;
    info!("Starting bundle submitter v{}", env!("CARGO_PKG_VERSION"));

    let wallet = Wallet::from_file(&config.wallet.keypair_path).context("Failed to load wallet")?;
    info!(payer = %wallet.pubkey(), "Wallet loaded");

    if let Some(port) = config.monitoring.metrics_port {
        info!("Starting metrics server on port {}", port);
        tokio::spawn(async move {
            if let Err(e) = endpoints::endpoint_server(port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let ledger = Arc::new(RpcLedgerClient::new(&config.ledger.rpc_url, config.request_timeout()));
    let relay = Arc::new(JsonRpcRelayClient::new(&config.relay.url, config.request_timeout())?);
    info!(ledger = %ledger.url(), relay = %relay.endpoint(), "Clients initialized");

    let (submitter, subscription) = SubmissionClient::connect(relay, config.subscription());
    let orchestrator = Orchestrator::new(
        ledger,
        submitter,
        CyclePlan::from_config(&config.bundle),
        CycleTimeouts {
            anchor: config.anchor_timeout(),
            discovery: config.discovery_timeout(),
            submit: config.submit_timeout(),
        },
    );

    let outcome = match args.command.unwrap_or(Command::Bundle) {
        Command::Bundle => run_bundle(&orchestrator, &wallet, &config, subscription).await,
        Command::Note { text } => {
            subscription.unsubscribe().await;
            let signature = orchestrator
                .broadcast_note(wallet.keypair(), text.as_bytes())
                .await?;
            info!(signature = %signature, "Note transaction sent");
            Ok(())
        }
    };

    info!("Shutting down");
    outcome
}

/// Merge defaults, the optional config file, the environment and flags
fn load_config(args: &Args) -> Result<Config> {
    let base = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        Config::default()
    };

    let capacity = args
        .bundle_limit
        .as_deref()
        .map(|raw| {
            raw.trim().parse::<usize>().map_err(|_| {
                BundleError::config(format!(
                    "BUNDLE_TRANSACTION_LIMIT '{}' is not a positive integer",
                    raw
                ))
            })
        })
        .transpose()?;
    let tip_placement = args
        .tip_placement
        .as_deref()
        .map(str::parse::<TipPlacement>)
        .transpose()?;

    let config = base.with_overrides(ConfigOverrides {
        relay_url: args.block_engine_url.clone(),
        rpc_url: args.rpc_url.clone(),
        keypair_path: args.keypair.clone(),
        capacity,
        tip_placement,
        notes: Some(args.notes.clone()),
        metrics_port: args.metrics_port,
        log_json: args.log_json,
    });
    config.validate()?;
    Ok(config)
}

/// Run one cycle and follow its result
async fn run_bundle(
    orchestrator: &Orchestrator,
    wallet: &Wallet,
    config: &Config,
    mut subscription: ResultSubscription,
) -> Result<()> {
    let mut cycle = match orchestrator.run_cycle(wallet.keypair()).await {
        Ok(cycle) => cycle,
        Err(e) => {
            subscription.unsubscribe().await;
            return Err(e.into());
        }
    };

    if let CycleState::SubmissionFailed { error } = cycle.state() {
        let message = error.to_string();
        subscription.unsubscribe().await;
        bail!("bundle submission failed: {}", message);
    }

    let followed = follow_results(&mut cycle, &mut subscription, config).await;
    subscription.unsubscribe().await;
    followed
}

/// Print every result of this cycle's bundle until it is final
///
/// Ends on a terminal outcome, on the result deadline or on Ctrl+C. A
/// stream fault is fatal.
async fn follow_results(
    cycle: &mut Cycle,
    subscription: &mut ResultSubscription,
    config: &Config,
) -> Result<()> {
    let deadline = config.result_timeout();
    let sleep = async {
        match deadline {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    bail!("bundle result stream closed unexpectedly");
                };
                if matches!(event, BundleEvent::Fault(_)) {
                    error!(correlation_id = %cycle.correlation_id(), "Bundle result stream fault");
                }
                if let Some(result) = cycle.on_event(event)? {
                    info!(
                        bundle_id = %result.bundle_id,
                        outcome = %result.outcome,
                        landed_slot = ?result.landed_slot,
                        "Bundle result"
                    );
                    if result.outcome.is_terminal() {
                        return Ok(());
                    }
                }
            }
            _ = &mut sleep => {
                warn!(
                    correlation_id = %cycle.correlation_id(),
                    "No final bundle result before the deadline"
                );
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                return Ok(());
            }
        }
    }
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_filter = if verbose {
        "bundle_submitter=debug,info"
    } else {
        "bundle_submitter=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec![
            "bundle-submitter",
            "--config",
            "/nonexistent/config.toml",
            "--block-engine-url",
            "https://relay.example.com",
            "--rpc-url",
            "https://rpc.example.com",
            "--keypair",
            "/tmp/id.json",
        ];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = load_config(&args(&[
            "--bundle-limit",
            "3",
            "--tip-placement",
            "first",
            "--note",
            "one",
        ]))
        .unwrap();
        assert_eq!(config.bundle.capacity, 3);
        assert_eq!(config.bundle.tip_placement, TipPlacement::First);
        assert_eq!(config.bundle.notes, vec!["one".to_string()]);
    }

    #[test]
    fn test_non_integer_limit_is_config_error() {
        let err = load_config(&args(&["--bundle-limit", "five"])).unwrap_err();
        let err = err.downcast::<BundleError>().unwrap();
        assert!(matches!(err, BundleError::Configuration(_)));
    }

    #[test]
    fn test_note_subcommand() {
        let parsed = args(&["note", "hello"]);
        assert!(matches!(parsed.command, Some(Command::Note { ref text }) if text == "hello"));
    }
}
