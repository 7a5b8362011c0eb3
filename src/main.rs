use std::collections::VecDeque;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use uptime_service::config::Config;
use uptime_service::contract::StakingManagerClient;
use uptime_service::indexer::GraphQlIndexer;
use uptime_service::signer::AggregatorClient;
use uptime_service::{store, telemetry, UptimeService};

fn print_usage() {
    eprintln!(
        "\
uptime-service

USAGE:
  uptime-service [--config <path>] <command>

COMMANDS:
  generate-and-submit           Observe, negotiate, submit, and store uptime
                                proofs for the full validator set
  resolve-rewards               Resolve delegator rewards for all stored
                                validators
  submit-missing-uptime-proofs  Resubmit proofs the indexer does not list
                                for the configured epoch

OPTIONS:
  --config <path>               Config file (default: config.json)
"
    );
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let mut config_path = String::from("config.json");
    let mut command: Option<String> = None;

    while let Some(arg) = args.pop_front() {
        match arg.as_str() {
            "--config" => match args.pop_front() {
                Some(path) => config_path = path,
                None => {
                    eprintln!("missing value for --config");
                    print_usage();
                    return ExitCode::FAILURE;
                }
            },
            "-h" | "--help" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            other if command.is_none() && !other.starts_with('-') => {
                command = Some(other.to_string());
            }
            other => {
                eprintln!("unexpected argument: {other}");
                print_usage();
                return ExitCode::FAILURE;
            }
        }
    }

    let Some(command) = command else {
        eprintln!("command required");
        print_usage();
        return ExitCode::FAILURE;
    };
    if !matches!(
        command.as_str(),
        "generate-and-submit" | "resolve-rewards" | "submit-missing-uptime-proofs"
    ) {
        eprintln!("unknown command: {command}");
        print_usage();
        return ExitCode::FAILURE;
    }

    match run(&config_path, &command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("command {command} failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: &str, command: &str) -> anyhow::Result<()> {
    let cfg = Config::load(config_path)?;
    telemetry::init(&cfg.log_level);

    let store = store::connect(&cfg.database_url).await?;
    let signer = Arc::new(AggregatorClient::new(
        &cfg.aggregator_url,
        cfg.network_id,
        &cfg.signing_subnet_id,
        &cfg.source_chain_id,
        cfg.quorum_percentage,
    )?);
    let contract = Arc::new(StakingManagerClient::new(&cfg)?);
    let indexer = Arc::new(GraphQlIndexer::new(&cfg.graphql_endpoint)?);

    let epoch = cfg.epoch.clone();
    let service = UptimeService::new(cfg, store.clone(), signer, contract, indexer);

    let started = Instant::now();
    let outcome = match command {
        "generate-and-submit" => service.generate_and_submit().await.map(|summary| {
            info!(%summary, "generate-and-submit finished");
        }),
        "resolve-rewards" => service.resolve_rewards().await,
        "submit-missing-uptime-proofs" => {
            service.submit_missing_uptime_proofs(&epoch).await.map(|report| {
                info!(
                    checked = report.checked,
                    missing = report.missing,
                    submitted = report.submitted,
                    resigned = report.resigned,
                    failures = report.failures.len(),
                    "reconciliation finished"
                );
            })
        }
        _ => unreachable!("command validated in main"),
    };

    store.close().await;
    outcome?;

    info!(elapsed = ?started.elapsed(), "command completed successfully");
    Ok(())
}
