mod bids;
mod charts;
mod config;
mod errors;
mod fitter;
mod likelihood;
mod logger;
mod margin;
mod minimizer;
mod pipeline;
mod provider;
mod scenarios;
mod sigmoid;
mod synthetic;

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use config::PricingConfig;
use logger::{ConsoleReceiver, FileReceiver, LogEvent, Logger, sanitize_filename};
use pipeline::ScenarioInput;
use provider::{CsvDataProvider, DataProvider, InMemoryProvider, write_csv};
use scenarios::{ScenarioEntry, find_scenario, get_scenario_catalog};

const DEFAULT_DATA: &str = "data/fleet_sales_pricing_at_fjord_motor.csv";
const DEFAULT_SEED: u64 = 42;

#[derive(Parser)]
#[command(author, version, about = "Win-probability fitting and price optimization for fleet-sales bids", long_about = None)]
struct Cli {
    /// Bid file with the eight-column fleet-sales layout
    #[arg(long, global = true, default_value = DEFAULT_DATA)]
    data: PathBuf,

    /// TOML file overriding the default pricing configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use generated bids with this seed instead of reading --data
    #[arg(long, global = true)]
    synthetic: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scenario, or all of them
    Run {
        #[arg(default_value = "all")]
        scenario: String,
    },
    /// List registered scenarios
    List,
    /// Write a synthetic bid file in the reference layout
    Generate {
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },
    /// Render fitted win-probability and margin curves
    Charts {
        #[arg(long, default_value = "charts")]
        output_dir: PathBuf,
    },
}

fn main() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::List => {
            for entry in get_scenario_catalog() {
                println!("{:<20} {}", entry.short_name, entry.description);
            }
            Ok(true)
        }
        Commands::Generate { output, seed } => generate(&cli, output, *seed).map(|_| true),
        Commands::Charts { output_dir } => load_input(&cli).and_then(|input| {
            for path in charts::generate_pricing_charts(&input, output_dir)? {
                println!("Generated: {}", path.display());
            }
            Ok(true)
        }),
        Commands::Run { scenario } => load_input(&cli).and_then(|input| run_scenarios(scenario, &input)),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> Result<PricingConfig, Box<dyn Error>> {
    match &cli.config {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            Ok(PricingConfig::from_toml_file(path)?)
        }
        None => Ok(PricingConfig::default()),
    }
}

fn load_input(cli: &Cli) -> Result<ScenarioInput, Box<dyn Error>> {
    let config = load_config(cli)?;
    let provider: Box<dyn DataProvider> = match cli.synthetic {
        Some(seed) => {
            let (police, corporate) = synthetic::fleet_layout(&config);
            info!(seed, police, corporate, "generating synthetic bids");
            Box::new(InMemoryProvider::new(synthetic::generate_fleet_dataset(&config, police, corporate, seed)?))
        }
        None => {
            if !cli.data.exists() {
                return Err(format!(
                    "bid file {} not found; create one with `fleetprice generate --output {}` or pass --synthetic SEED",
                    cli.data.display(),
                    cli.data.display()
                )
                .into());
            }
            Box::new(CsvDataProvider::new(&cli.data))
        }
    };
    Ok(ScenarioInput::new(provider, config)?)
}

fn generate(cli: &Cli, output: &Path, seed: u64) -> Result<(), Box<dyn Error>> {
    let config = load_config(cli)?;
    let (police, corporate) = synthetic::fleet_layout(&config);
    let dataset = synthetic::generate_fleet_dataset(&config, police, corporate, seed)?;
    write_csv(&dataset, output)?;
    println!("Wrote {} bids to {}", dataset.len(), output.display());
    Ok(())
}

/// Run the selected scenarios, logging a summary line per scenario.
/// Returns whether every scenario passed.
fn run_scenarios(scenario_arg: &str, input: &ScenarioInput) -> Result<bool, Box<dyn Error>> {
    let scenarios: Vec<ScenarioEntry> = if scenario_arg == "all" {
        get_scenario_catalog()
    } else {
        match find_scenario(scenario_arg) {
            Some(scenario) => vec![scenario],
            None => {
                let names: Vec<&str> = get_scenario_catalog().iter().map(|s| s.short_name).collect();
                return Err(format!("Scenario '{}' not found. Available scenarios: {}", scenario_arg, names.join(", ")).into());
            }
        }
    };

    // a single scenario also shows its details on the console
    let mut logger = Logger::new();
    if scenario_arg == "all" {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation]));
    } else {
        logger.add_receiver(ConsoleReceiver::new(vec![
            LogEvent::Fit,
            LogEvent::Pricing,
            LogEvent::Scenario,
            LogEvent::Validation,
        ]));
    }
    let summary_receiver_id = logger.add_receiver(FileReceiver::new(&PathBuf::from("log/summary.log"), vec![LogEvent::Validation])?);

    if scenario_arg == "all" {
        logln!(&mut logger, LogEvent::Validation, "Running all scenarios on {} bids...\n", input.dataset.len());
    } else {
        logln!(&mut logger, LogEvent::Validation, "Running scenario '{}' on {} bids...\n", scenario_arg, input.dataset.len());
    }

    let mut failed = 0;
    for scenario in &scenarios {
        log!(&mut logger, LogEvent::Validation, "{}: ", scenario.short_name);
        let scenario_log = PathBuf::from(format!("log/{}/scenario.log", sanitize_filename(scenario.short_name)));
        let scenario_receiver_id = logger.add_receiver(FileReceiver::new(
            &scenario_log,
            vec![LogEvent::Fit, LogEvent::Pricing, LogEvent::Scenario],
        )?);

        match (scenario.run)(scenario.short_name, input, &mut logger) {
            Ok(()) => {
                logln!(&mut logger, LogEvent::Validation, "✓ PASSED");
            }
            Err(e) => {
                failed += 1;
                warn!(scenario = scenario.short_name, "scenario failed");
                logln!(&mut logger, LogEvent::Validation, "✗ FAILED: {}", e);
            }
        }

        logger.flush()?;
        logger.remove_receiver(scenario_receiver_id);
    }

    logln!(&mut logger, LogEvent::Validation, "\n{} of {} scenarios passed", scenarios.len() - failed, scenarios.len());
    logger.flush()?;
    logger.remove_receiver(summary_receiver_id);
    Ok(failed == 0)
}
