mod scenarios;

use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use rtb_dsp::campaign::{BiddingStrategy, CampaignBudget, SharedBudget};
use rtb_dsp::config::AppConfig;
use rtb_dsp::engine::{BidOptimizationEngine, BidRequest};
use rtb_dsp::logger::{sanitize_filename, ConsoleReceiver, FileReceiver, LogEvent, Logger};
use rtb_dsp::trainer::{spawn_training, TrainingConfig};
use rtb_dsp::utils::{self, RAND_SEED, TOTAL_SIMULATION_RUNS};
use rtb_dsp::{log, logln};

use scenarios::get_scenario_catalog;

#[derive(Parser)]
#[command(author, version, about = "Real-time bidding DSP simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scenario (or "all") and validate its expected behavior
    Scenario {
        /// Scenario short name, or "all"
        name: String,

        /// Number of iterations, each with its own seed
        #[arg(short, long, default_value = "1")]
        iterations: u64,

        /// Seed of the first iteration
        #[arg(long, default_value = "0")]
        start: u64,

        /// Stop at the first failed validation
        #[arg(long)]
        fastbreak: bool,

        /// Write every auction as a CSV row to log/<scenario>/auctions-<variant>.csv
        #[arg(long)]
        verbose_auction: bool,
    },
    /// Process one bid request given as JSON and print the response
    Bid {
        /// JSON file with the request, or "-" for stdin
        #[arg(short, long)]
        request: String,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Total campaign budget
        #[arg(long, default_value = "1000")]
        total_budget: f64,

        /// Remaining campaign budget (defaults to the total)
        #[arg(long)]
        remaining_budget: Option<f64>,

        /// Bidding strategy of the campaign
        #[arg(long, value_enum, ignore_case = true, default_value_t = StrategyArg::Balanced)]
        strategy: StrategyArg,
    },
    /// Train the CTR and CVR models on synthetic data
    Train {
        /// TOML configuration file; its [training] section is used
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        learning_rate: Option<f64>,

        #[arg(long)]
        epochs: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        num_samples: Option<usize>,

        #[arg(long)]
        train_test_split: Option<f64>,

        #[arg(long)]
        regularization: Option<f64>,

        #[arg(long)]
        seed: Option<u64>,

        /// Print the full training result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn load_config(path: Option<&Path>) -> AppConfig {
    match path {
        Some(path) => match AppConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        None => AppConfig::default(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Conservative,
    Balanced,
    Aggressive,
}

impl From<StrategyArg> for BiddingStrategy {
    fn from(strategy: StrategyArg) -> Self {
        match strategy {
            StrategyArg::Conservative => BiddingStrategy::Conservative,
            StrategyArg::Balanced => BiddingStrategy::Balanced,
            StrategyArg::Aggressive => BiddingStrategy::Aggressive,
        }
    }
}

fn read_request(source: &str) -> std::io::Result<String> {
    if source == "-" {
        let mut content = String::new();
        std::io::stdin().read_to_string(&mut content)?;
        Ok(content)
    } else {
        std::fs::read_to_string(source)
    }
}

fn run_bid(request: &str, config: Option<&Path>, total_budget: f64, remaining_budget: Option<f64>, strategy: StrategyArg) {
    let config = load_config(config);
    let strategy = BiddingStrategy::from(strategy);

    let content = match read_request(request) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error: Cannot read request '{}': {}", request, e);
            std::process::exit(1);
        }
    };
    let request: BidRequest = match serde_json::from_str(&content) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: Invalid bid request: {}", e);
            std::process::exit(1);
        }
    };

    let mut engine = match BidOptimizationEngine::new(config.engine) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let budget = SharedBudget::new(CampaignBudget::new(
        total_budget,
        remaining_budget.unwrap_or(total_budget),
        strategy,
    ));

    let mut logger = Logger::new();
    logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation]));

    match engine.process(&request, &budget, &mut logger) {
        Ok(response) => match serde_json::to_string_pretty(&response) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: Cannot serialize response: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Error: Invalid bid request: {}", e);
            std::process::exit(1);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_train(
    config: Option<&Path>,
    learning_rate: Option<f64>,
    epochs: Option<usize>,
    batch_size: Option<usize>,
    num_samples: Option<usize>,
    train_test_split: Option<f64>,
    regularization: Option<f64>,
    seed: Option<u64>,
    json: bool,
) {
    let defaults = load_config(config).training;
    let training_config = TrainingConfig {
        learning_rate: learning_rate.unwrap_or(defaults.learning_rate),
        epochs: epochs.unwrap_or(defaults.epochs),
        batch_size: batch_size.unwrap_or(defaults.batch_size),
        num_samples: num_samples.unwrap_or(defaults.num_samples),
        train_test_split: train_test_split.unwrap_or(defaults.train_test_split),
        regularization: regularization.unwrap_or(defaults.regularization),
        seed: seed.unwrap_or(defaults.seed),
    };

    let mut logger = Logger::new();
    if !json {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Epoch, LogEvent::Training]));
    }

    let handle = match spawn_training(training_config) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let result = handle.wait_with(|phase, metric| {
        logln!(
            &mut logger,
            LogEvent::Epoch,
            "[{}] epoch {:>3}: train loss {:.4} ({:.2}%), val loss {:.4} ({:.2}%)",
            phase,
            metric.epoch,
            metric.train_loss,
            metric.train_accuracy,
            metric.val_loss,
            metric.val_accuracy
        );
    });

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: Training failed: {}", e);
            std::process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: Cannot serialize training result: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    for (label, metrics) in [("CTR", &result.ctr_metrics), ("CVR", &result.cvr_metrics)] {
        logln!(
            &mut logger,
            LogEvent::Training,
            "\n{} model: accuracy {:.2}%, precision {:.2}%, recall {:.2}%, F1 {:.2}%, AUC {:.2}%, log loss {:.4}",
            label,
            metrics.accuracy,
            metrics.precision,
            metrics.recall,
            metrics.f1_score,
            metrics.auc,
            metrics.log_loss
        );
        logln!(
            &mut logger,
            LogEvent::Training,
            "  Confusion (tp/fp/tn/fn): {} / {} / {} / {}",
            metrics.true_positives,
            metrics.false_positives,
            metrics.true_negatives,
            metrics.false_negatives
        );
    }
    for (label, model) in [("CTR", &result.ctr_model), ("CVR", &result.cvr_model)] {
        logln!(&mut logger, LogEvent::Training, "\n{} feature importance:", label);
        for (name, weight) in model.feature_importance().iter().take(8) {
            logln!(&mut logger, LogEvent::Training, "  {:<22} {:+.4}", name, weight);
        }
    }
    logln!(
        &mut logger,
        LogEvent::Training,
        "\nTraining {} in {:.1}ms",
        if result.complete { "completed" } else { "stopped early" },
        result.training_time_ms
    );
}

fn run_scenarios(scenario_arg: &str, iterations: u64, start_iteration: u64, fastbreak: bool) {
    // Get all scenarios from the catalog
    let all_scenarios = get_scenario_catalog();

    let scenarios: Vec<_> = if scenario_arg == "all" {
        all_scenarios.clone()
    } else {
        match all_scenarios.iter().find(|s| s.short_name == scenario_arg) {
            Some(scenario) => vec![scenario.clone()],
            None => {
                eprintln!("Error: Scenario '{}' not found.", scenario_arg);
                eprintln!("Available scenarios:");
                for s in &all_scenarios {
                    eprintln!("  - {}", s.short_name);
                }
                std::process::exit(1);
            }
        }
    };

    // Scenario events only go to the console for a single scenario run once
    let mut logger = Logger::new();
    if scenario_arg != "all" && iterations == 1 {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation, LogEvent::Scenario]));
    } else {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation]));
    }

    let summary_receiver_id = match FileReceiver::new(&PathBuf::from("log/summary.log"), vec![LogEvent::Validation]) {
        Ok(receiver) => logger.add_receiver(receiver),
        Err(e) => {
            eprintln!("Error: Cannot open log/summary.log: {}", e);
            std::process::exit(1);
        }
    };

    TOTAL_SIMULATION_RUNS.store(0, Ordering::Relaxed);
    let initial_count = TOTAL_SIMULATION_RUNS.load(Ordering::Relaxed);

    let target = if scenario_arg == "all" {
        "all scenarios".to_string()
    } else {
        format!("scenario '{}'", scenario_arg)
    };
    if iterations > 1 {
        logln!(&mut logger, LogEvent::Validation, "Running {} {} times... (Total simulation runs: {})\n", target, iterations, initial_count);
    } else {
        logln!(&mut logger, LogEvent::Validation, "Running {}... (Total simulation runs: {})\n", target, initial_count);
    }

    'scenarios: for scenario in &scenarios {
        log!(&mut logger, LogEvent::Validation, "{}: ", scenario.short_name);

        let scenario_log = PathBuf::from(format!("log/{}/scenario.log", sanitize_filename(scenario.short_name)));
        let scenario_receiver_id = match FileReceiver::new(&scenario_log, vec![LogEvent::Scenario]) {
            Ok(receiver) => Some(logger.add_receiver(receiver)),
            Err(e) => {
                eprintln!("Warning: Cannot open {}: {}", scenario_log.display(), e);
                None
            }
        };

        for i in start_iteration..(start_iteration + iterations) {
            if iterations > 1 {
                log!(&mut logger, LogEvent::Validation, "[{}/{}] ", i - start_iteration + 1, iterations);
            }

            // Every seeded component is offset by the iteration number
            RAND_SEED.store(i, Ordering::Relaxed);

            match (scenario.run)(scenario.short_name, &mut logger) {
                Ok(()) => {
                    if iterations > 1 {
                        logln!(&mut logger, LogEvent::Validation, "✓");
                    } else {
                        logln!(&mut logger, LogEvent::Validation, "✓ PASSED");
                    }
                }
                Err(e) => {
                    if iterations > 1 {
                        logln!(&mut logger, LogEvent::Validation, "✗");
                    } else {
                        logln!(&mut logger, LogEvent::Validation, "✗ FAILED: {}", e);
                    }

                    if fastbreak {
                        if let Some(id) = scenario_receiver_id {
                            logger.remove_receiver(id);
                        }
                        logln!(&mut logger, LogEvent::Validation, "\nStopping scenario execution due to failure (--fastbreak enabled)");
                        if iterations > 1 {
                            logln!(
                                &mut logger,
                                LogEvent::Validation,
                                "Error at iteration {}/{} (seed {}): {}",
                                i - start_iteration + 1,
                                iterations,
                                i,
                                e
                            );
                        } else {
                            logln!(&mut logger, LogEvent::Validation, "Error: {}", e);
                        }
                        break 'scenarios;
                    }
                }
            }

            // Make sure validation lines reach summary.log
            let _ = logger.flush();
        }

        if let Some(id) = scenario_receiver_id {
            logger.remove_receiver(id);
        }
    }

    let final_count = TOTAL_SIMULATION_RUNS.load(Ordering::Relaxed);
    logln!(&mut logger, LogEvent::Validation, "\nTotal simulation runs completed: {}", final_count);

    let _ = logger.flush();
    logger.remove_receiver(summary_receiver_id);
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scenario {
            name,
            iterations,
            start,
            fastbreak,
            verbose_auction,
        } => {
            if verbose_auction {
                utils::VERBOSE_AUCTION.store(true, Ordering::Relaxed);
            }
            run_scenarios(&name, iterations, start, fastbreak);
        }
        Commands::Bid {
            request,
            config,
            total_budget,
            remaining_budget,
            strategy,
        } => run_bid(&request, config.as_deref(), total_budget, remaining_budget, strategy),
        Commands::Train {
            config,
            learning_rate,
            epochs,
            batch_size,
            num_samples,
            train_test_split,
            regularization,
            seed,
            json,
        } => run_train(
            config.as_deref(),
            learning_rate,
            epochs,
            batch_size,
            num_samples,
            train_test_split,
            regularization,
            seed,
            json,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_bid_strategy(args: &[&str]) -> Result<StrategyArg, clap::Error> {
        let cli = Cli::try_parse_from(["rtb_dsp", "bid", "--request", "-"].into_iter().chain(args.iter().copied()))?;
        match cli.command {
            Commands::Bid { strategy, .. } => Ok(strategy),
            _ => panic!("expected the bid subcommand"),
        }
    }

    #[test]
    fn test_strategy_flag_parses_known_strategies() {
        assert_eq!(parse_bid_strategy(&[]).unwrap(), StrategyArg::Balanced);
        assert_eq!(parse_bid_strategy(&["--strategy", "aggressive"]).unwrap(), StrategyArg::Aggressive);
        assert_eq!(parse_bid_strategy(&["--strategy", "Conservative"]).unwrap(), StrategyArg::Conservative);
        assert_eq!(BiddingStrategy::from(StrategyArg::Aggressive), BiddingStrategy::Aggressive);
    }

    #[test]
    fn test_unknown_strategy_is_a_usage_error() {
        let err = parse_bid_strategy(&["--strategy", "reckless"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
