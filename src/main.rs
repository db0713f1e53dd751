use std::sync::Arc;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::{error, info};
use mongodb::error::Error as DbError;
use thiserror::Error;

use election_reconciler::{
    config::{self, Config, ConfigError, DEFAULT_CONFIG_FILE},
    error::{Error as LogicError, PublicError},
    logic::{Requester, TallyPolicy},
    model::mongodb::Id,
    shutdown::{Context, ShutdownController},
    store::{mongo::MongoStore, Stores},
    Service,
};

const PROGRAM_NAME: &str = "election-reconciler";

const ABOUT_TEXT: &str = "Close elections whose voting window has elapsed and keep their \
results snapshots up to date.

EXIT CODES:
     0: Success.
     1: Critical failure, see the log.";

const CONFIG: &str = "CONFIG";
const PERIOD: &str = "PERIOD";
const ELECTION_ID: &str = "ELECTION_ID";
const REQUESTER: &str = "REQUESTER";
const ADMIN: &str = "ADMIN";
const BEST_EFFORT: &str = "BEST_EFFORT";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(CONFIG)
                .long("config")
                .help("Path to the config file")
                .default_value(DEFAULT_CONFIG_FILE)
                .action(ArgAction::Set)
                .global(true),
        )
        .arg(
            Arg::new(PERIOD)
                .long("period")
                .help("Seconds between reconciliation passes, overriding the config")
                .value_parser(value_parser!(u64).range(1..))
                .action(ArgAction::Set)
                .global(true),
        )
        .subcommand(Command::new("run").about("Run reconciliation passes until stopped (default)"))
        .subcommand(Command::new("reconcile").about("Run a single reconciliation pass"))
        .subcommand(
            Command::new("tally")
                .about("Tally one election and store its results")
                .arg(
                    Arg::new(ELECTION_ID)
                        .help("The election to tally")
                        .action(ArgAction::Set)
                        .required(true),
                )
                .arg(
                    Arg::new(REQUESTER)
                        .long("requester")
                        .help("ID of the person requesting the tally")
                        .action(ArgAction::Set)
                        .required(true),
                )
                .arg(
                    Arg::new(ADMIN)
                        .long("admin")
                        .help("Act with administrative privilege")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new(BEST_EFFORT)
                        .long("best-effort")
                        .help("Keep counting when individual counts fail")
                        .action(ArgAction::SetTrue),
                ),
        )
}

/// Errors that are critical to the entire process.
#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to contact database during launch: {0}")]
    DbLaunch(#[from] DbError),
    #[error(transparent)]
    Logic(#[from] LogicError),
    #[error("Failed to encode results: {0}")]
    Output(#[from] serde_json::Error),
    #[error("Scheduler task failed: {0}")]
    Scheduler(#[from] tokio::task::JoinError),
}

/// The code reported to the caller. The details only go to the log.
fn public_code(err: &Error) -> &'static str {
    match err {
        Error::Logic(e) => e.public_kind().code(),
        _ => PublicError::Internal.code(),
    }
}

async fn connect(matches: &ArgMatches) -> Result<(Config, Service), Error> {
    let config_path = matches
        .get_one::<String>(CONFIG)
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_FILE);
    let mut config = Config::load(config_path)?;
    if let Some(period) = matches.get_one::<u64>(PERIOD) {
        config.set_period_secs(*period)?;
    }
    info!("Loaded config from {config_path}");

    let db = config::connect(&config).await?;
    let stores = Stores::shared(Arc::new(MongoStore::from_db(&db)));
    let service = election_reconciler::build(stores, &config);
    Ok((config, service))
}

async fn run(matches: ArgMatches) -> Result<(), Error> {
    let (config, service) = connect(&matches).await?;

    match matches.subcommand() {
        Some(("reconcile", _)) => {
            let report = service.reconciler.reconcile(&Context::background()).await?;
            info!(
                "Pass finished: {} examined, {} ended, {} tallied",
                report.examined,
                report.ended.len(),
                report.tallied
            );
            for (id, err) in report.failures.iter() {
                error!("Election {id}: {err}");
            }
        }
        Some(("tally", args)) => {
            let election_id = Id::parse(
                args.get_one::<String>(ELECTION_ID)
                    .map(String::as_str)
                    .unwrap_or_default(),
            )?;
            let requester_id = Id::parse(
                args.get_one::<String>(REQUESTER)
                    .map(String::as_str)
                    .unwrap_or_default(),
            )?;
            let requester = Requester {
                id: requester_id,
                admin: args.get_flag(ADMIN),
            };
            let policy = if args.get_flag(BEST_EFFORT) {
                TallyPolicy::BestEffort
            } else {
                TallyPolicy::FailFast
            };
            let tally = service
                .aggregator
                .tally(&Context::background(), election_id, requester, policy)
                .await?;
            for ((polarity, candidate_id), err) in tally.errors.iter() {
                error!("Counting {polarity} votes of {candidate_id} failed: {err}");
            }
            println!("{}", serde_json::to_string_pretty(&tally.results)?);
        }
        _ => {
            let controller = ShutdownController::new();
            let handle = service.scheduler(config.period_secs())?.spawn();
            info!("Reconciler running, press Ctrl-C to stop");
            controller.wait_for_signal().await;
            info!("Shutting down...");
            handle.stop().await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Set up logging.
    if let Err(e) = log4rs::init_file("log4rs.yaml", Default::default()) {
        eprintln!("Failed to initialise logging: {e}");
        std::process::exit(1);
    }
    info!("Initialised logging");

    let matches = cli().get_matches();
    if let Err(err) = run(matches).await {
        error!("{err}");
        error!("Critical failure, shutting down");
        eprintln!("error: {}", public_code(&err));
        std::process::exit(1)
    }
}
