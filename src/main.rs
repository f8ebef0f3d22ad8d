//! tiered-archive - hot/cold archival and federated queries for simulation stores

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use rusqlite::types::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiered_archive::archival::PartialCounters;
use tiered_archive::{operations, Config, RestoreSelector};

#[derive(Parser, Debug)]
#[command(name = "tiered-archive")]
#[command(about = "Hot/cold archival and federated queries for simulation stores")]
struct Args {
    /// Path to the hot SQLite database (the cold file sits next to it)
    #[arg(long, env = "TIERED_DATABASE_PATH", default_value = "./simulation.db")]
    db: PathBuf,

    /// Log level
    #[arg(long, env = "TIERED_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Append archival run reports to this JSON-lines file
    #[arg(long, env = "TIERED_REPORT_LOG")]
    report_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Move eligible historical rows into the cold store
    Archive {
        /// Current epoch (season); derived from hot data if omitted
        #[arg(long)]
        epoch: Option<i64>,

        /// Current sequence (tick); derived from hot data if omitted
        #[arg(long)]
        sequence: Option<i64>,

        /// Only report candidate counts
        #[arg(long)]
        dry_run: bool,
    },
    /// Store sizes, row counts, and archival recommendation
    Stats,
    /// Copy archived rows back into the hot store
    Restore {
        #[arg(long)]
        table: String,

        #[command(flatten)]
        selector: SelectorArgs,
    },
    /// Run a read-only query, federated across both stores by default
    Query {
        #[arg(long)]
        sql: String,

        /// Positional parameter (repeatable); integers, reals and `null` are typed
        #[arg(long = "param")]
        params: Vec<String>,

        /// Read the hot store only
        #[arg(long)]
        hot_only: bool,
    },
    /// Exit 0 if a cold store exists, 1 otherwise
    HasCold,
}

#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = true)]
struct SelectorArgs {
    /// Single epoch
    #[arg(long, conflicts_with_all = ["from_epoch", "from_seq", "all"])]
    epoch: Option<i64>,

    #[arg(long, requires = "to_epoch", conflicts_with_all = ["from_seq", "all"])]
    from_epoch: Option<i64>,

    #[arg(long, requires = "from_epoch")]
    to_epoch: Option<i64>,

    #[arg(long, requires = "to_seq", conflicts_with = "all")]
    from_seq: Option<i64>,

    #[arg(long, requires = "from_seq")]
    to_seq: Option<i64>,

    /// Every archived row of the table
    #[arg(long)]
    all: bool,
}

impl SelectorArgs {
    fn selector(&self) -> anyhow::Result<RestoreSelector> {
        match self {
            Self { epoch: Some(e), .. } => Ok(RestoreSelector::Epoch(*e)),
            Self {
                from_epoch: Some(from),
                to_epoch: Some(to),
                ..
            } => Ok(RestoreSelector::EpochRange {
                from: *from,
                to: *to,
            }),
            Self {
                from_seq: Some(from),
                to_seq: Some(to),
                ..
            } => Ok(RestoreSelector::SequenceRange {
                from: *from,
                to: *to,
            }),
            Self { all: true, .. } => Ok(RestoreSelector::All),
            _ => anyhow::bail!("no restore selector given"),
        }
    }
}

fn parse_param(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Real(f)
    } else if raw.eq_ignore_ascii_case("null") {
        Value::Null
    } else {
        Value::Text(raw.to_string())
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(args: &Args, config: &Config) -> anyhow::Result<()> {
    let db = args.db.as_path();
    match &args.command {
        Command::Archive {
            epoch,
            sequence,
            dry_run,
        } => {
            let counters = PartialCounters::new(*epoch, *sequence);
            if *dry_run {
                print_json(&operations::plan_archive(db, config, &counters)?)
            } else {
                print_json(&operations::archive_with_counters(db, config, &counters)?)
            }
        }
        Command::Stats => print_json(&operations::stats(db, config)?),
        Command::Restore { table, selector } => {
            let selector = selector.selector()?;
            let restored = operations::restore(db, config, table, &selector)
                .with_context(|| format!("restoring {} ({})", table, selector))?;
            print_json(&serde_json::json!({
                "table": table,
                "selector": selector,
                "restored": restored,
            }))
        }
        Command::Query {
            sql,
            params,
            hot_only,
        } => {
            let params: Vec<Value> = params.iter().map(|p| parse_param(p)).collect();
            print_json(&operations::query(db, config, sql, &params, !hot_only)?)
        }
        Command::HasCold => {
            let present = operations::has_cold_store(db);
            print_json(&serde_json::json!({ "has_cold_store": present }))?;
            if !present {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Initialize logging (stderr, so stdout stays machine-readable)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log_level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env();
    config.log_level = args.log_level.clone();
    if args.report_log.is_some() {
        config.report_log_path = args.report_log.clone();
    }

    let result = run(&args, &config);
    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}
