//! evalgate CLI entry point.
//!
//! ## CLI Subcommands
//!
//! - `evalgate-cli simulate [OPTIONS]` - Run a synthetic workload (default)
//! - `evalgate-cli config show|defaults|validate [FILE]` - Inspect configuration
//! - `evalgate-cli version` - Print version

use std::process::ExitCode;

use evalgate::cli::config_cmd;
use evalgate::cli::{run_simulate, SimulateArgs};
use evalgate::config;
use evalgate::telemetry::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("simulate");

    match command {
        "simulate" => {
            let env = config::load();
            if let Err(e) = init_logging(&env.log) {
                eprintln!("Logging disabled: {}", e);
            }
            let rest = args.get(2..).unwrap_or_default();
            match SimulateArgs::parse(rest, env.gate) {
                Ok(sim) => ExitCode::from(run_simulate(&sim).await as u8),
                Err(e) => {
                    eprintln!("{}", e);
                    print_command_help("simulate");
                    ExitCode::from(2u8)
                }
            }
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    config_cmd::run_show();
                    ExitCode::SUCCESS
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => {
                    let path = args.get(3).map(|s| s.as_str());
                    let code = config_cmd::run_validate(path);
                    ExitCode::from(code as u8)
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("evalgate {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "evalgate - Adaptive batching and admission control v{}

USAGE:
    evalgate-cli [COMMAND] [OPTIONS]

COMMANDS:
    simulate     Run a synthetic workload and print metrics (default)
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

ENVIRONMENT:
    EVALGATE_MAX_CONCURRENCY     Concurrent evaluator calls (default: 5)
    EVALGATE_BATCH_SIZE          Requests per batch (default: 3)
    EVALGATE_CACHE_ENABLED       Reuse results for identical payloads (default: true)
    EVALGATE_MAX_QUEUE_SIZE      Max pending requests (default: 1000)
    EVALGATE_REQUEST_TIMEOUT_MS  Max queue wait (default: 30000)
    EVALGATE_POLICY              default | latency_aware | dependency_aware
    EVALGATE_LOG_LEVEL           Tracing filter (default: info)
    EVALGATE_LOG_FORMAT          json | pretty

EXIT CODES:
    0  Success
    1  Failure / validation warnings
    2  Usage or configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "simulate" => {
            eprintln!(
                "evalgate-cli simulate - Run a synthetic workload

USAGE:
    evalgate-cli simulate [OPTIONS]

OPTIONS:
    --requests N          Requests to submit (default: 100)
    --distinct N          Distinct payloads; lower means more cache hits (default: 80)
    --min-latency-ms MS   Evaluator latency lower bound (default: 20)
    --max-latency-ms MS   Evaluator latency upper bound (default: 200)
    --fail-rate P         Evaluator failure probability 0..1 (default: 0)
    --seed N              Random seed (default: 7)
    --policy NAME         default | latency_aware | dependency_aware
    --concurrency N       Override EVALGATE_MAX_CONCURRENCY
    --batch-size N        Override EVALGATE_BATCH_SIZE
    --queue-size N        Override EVALGATE_MAX_QUEUE_SIZE
    --timeout-ms MS       Override EVALGATE_REQUEST_TIMEOUT_MS

EXAMPLES:
    evalgate-cli simulate --requests 500 --policy latency_aware
    evalgate-cli simulate --concurrency 2 --queue-size 10
"
            );
        }
        "config" => {
            eprintln!(
                "evalgate-cli config - Inspect configuration

USAGE:
    evalgate-cli config show
    evalgate-cli config defaults
    evalgate-cli config validate [FILE]

DESCRIPTION:
    show      Print effective values from EVALGATE_* environment variables
    defaults  Print built-in defaults
    validate  Check environment (or a TOML file) for likely misconfigurations

EXIT CODES:
    0  Valid
    1  Warnings found
    2  File unreadable or invalid
"
            );
        }
        _ => {
            eprintln!("No detailed help for: {}", command);
            print_usage();
        }
    }
}
