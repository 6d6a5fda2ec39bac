use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use schemaflow_cli::{
    init_tracing, inspect, load_config, read_snapshot, run_simulator, SimulatorConfig,
};
use std::path::PathBuf;

fn workflow_arg() -> Arg {
    Arg::new("workflow")
        .long("workflow")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Workflow snapshot (JSON)")
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("Propagation config (TOML); defaults when omitted")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output as JSON")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Command::new("schemaflow")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Schema propagation across workflow graphs")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Propagate schemas through a workflow with simulated readiness")
                .arg(workflow_arg())
                .arg(config_arg())
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("max-ready-ms")
                        .long("max-ready-ms")
                        .default_value("5000")
                        .value_parser(value_parser!(u64))
                        .help("Upper bound on each node's schema readiness delay"),
                )
                .arg(
                    Arg::new("timeout-secs")
                        .long("timeout-secs")
                        .default_value("600")
                        .value_parser(value_parser!(u64))
                        .help("Stop waiting for the queue after this long"),
                )
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("inspect")
                .about("Validate a workflow and list it upstream-first")
                .arg(workflow_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective propagation config")
                .arg(config_arg()),
        );

    let matches = cli.get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let workflow = args
                .get_one::<PathBuf>("workflow")
                .context("--workflow is required")?;
            let snapshot = read_snapshot(workflow)?;
            let propagation = load_config(args.get_one::<PathBuf>("config").map(PathBuf::as_path))?;

            let config = SimulatorConfig {
                seed: args.get_one::<u64>("seed").copied().unwrap_or(42),
                max_ready_ms: args.get_one::<u64>("max-ready-ms").copied().unwrap_or(5000),
                timeout_secs: args.get_one::<u64>("timeout-secs").copied().unwrap_or(600),
                propagation,
                ..SimulatorConfig::default()
            };

            let report = run_simulator(snapshot, config).await?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.generate_text());
            }

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("inspect", args)) => {
            let workflow = args
                .get_one::<PathBuf>("workflow")
                .context("--workflow is required")?;
            let report = inspect(read_snapshot(workflow)?)
                .with_context(|| format!("invalid workflow {}", workflow.display()))?;

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.generate_text());
            }
        }
        Some(("config", args)) => {
            let config = load_config(args.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        _ => {}
    }

    Ok(())
}
