//! prorated-sub-escrow - offline tooling for the subscription escrow
//!
//! Reads escrow state exported from chain as JSON and prints decoded datums,
//! phase summaries, transaction plans and validator verdicts.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use prorated_sub_escrow::config::ServiceConfig;
use prorated_sub_escrow::sdk::proration::{is_expired, sum_installments};
use prorated_sub_escrow::sdk::{
    Action, EscrowPhase, EscrowUtxo, KeyHash, Planner, PlutusData, SubscriptionDatum, TxContext,
    Validator,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Offline subscription escrow tooling
#[derive(Parser, Debug)]
#[command(name = "prorated-sub-escrow")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the service configuration file (protocol parameters)
    #[arg(short, long, default_value = "escrow.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a PlutusData datum into its typed form
    Decode {
        /// Datum in detailed JSON schema
        datum: PathBuf,
    },

    /// Show the phase of a subscription and the actions it allows
    Status {
        /// Datum in detailed JSON schema
        datum: PathBuf,

        /// POSIX milliseconds, defaults to the current time
        #[arg(long)]
        now: Option<u64>,
    },

    /// Plan a transition of an escrow UTxO
    Plan {
        /// Escrow UTxO as `{out_ref, value, datum}`
        escrow: PathBuf,

        /// extend, merchant_withdraw, unsubscribe or subscriber_withdraw
        #[arg(short, long)]
        action: Action,

        /// Key hash (hex) of the party signing the transaction
        #[arg(short, long)]
        signer: KeyHash,

        /// POSIX milliseconds, defaults to the current time
        #[arg(long)]
        now: Option<u64>,
    },

    /// Run the escrow validator against a full transaction
    Validate {
        /// Redeemer in detailed JSON schema
        redeemer: PathBuf,

        /// Transaction context as JSON
        tx: PathBuf,
    },
}

#[derive(Serialize)]
struct StatusOutput {
    phase: EscrowPhase,
    subscription_end: u64,
    expired: bool,
    pending: u64,
    available_actions: &'static [Action],
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Decode { datum } => {
            let datum = read_datum(&datum)?;
            print_json(&datum)
        },
        Commands::Status { datum, now } => {
            let datum = read_datum(&datum)?;
            let now = resolve_now(now)?;
            let phase = EscrowPhase::of(&datum, now);
            print_json(&StatusOutput {
                phase,
                subscription_end: datum.subscription_end,
                expired: is_expired(datum.subscription_end, now),
                pending: sum_installments(&datum.installments)?,
                available_actions: phase.available_actions(),
            })
        },
        Commands::Plan {
            escrow,
            action,
            signer,
            now,
        } => {
            let config = load_config(&cli.config)?;
            let escrow: EscrowUtxo = read_json(&escrow)?;
            let planner = Planner::new(config.params);
            let plan = planner.plan(&escrow, action, signer, resolve_now(now)?)?;
            print_json(&plan)
        },
        Commands::Validate { redeemer, tx } => {
            let config = load_config(&cli.config)?;
            let redeemer: PlutusData = read_json(&redeemer)?;
            let tx: TxContext = read_json(&tx)?;
            let validator = Validator::new(config.params);
            match validator.validate_spend(&redeemer, &tx) {
                Ok(()) => {
                    println!("accepted");
                    Ok(())
                },
                Err(e) => bail!("rejected: {e}"),
            }
        },
    }
}

fn load_config(path: &Path) -> Result<ServiceConfig> {
    ServiceConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn read_datum(path: &Path) -> Result<SubscriptionDatum> {
    let raw: PlutusData = read_json(path)?;
    SubscriptionDatum::decode(&raw).with_context(|| format!("decoding {}", path.display()))
}

fn resolve_now(now: Option<u64>) -> Result<u64> {
    match now {
        Some(now) => Ok(now),
        None => {
            let elapsed = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .context("system clock is before the epoch")?;
            u64::try_from(elapsed.as_millis()).context("system clock out of range")
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
