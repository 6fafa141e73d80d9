/*!
 * Tether CLI - Command Line Interface
 *
 * Validate configuration files and drive the resilience stack against a
 * simulated endpoint.
 */

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tether::{
    cli_style::{self, config_table, outcome_table, section_header, simulation_table},
    config::{LogLevel, TetherConfig},
    error::{Result, TetherError, EXIT_SUCCESS},
    logging,
    simulate::{run_simulation, SimulationOptions},
};

#[derive(Parser)]
#[command(name = "tether")]
#[command(version, about = "Resilient connection pooling with circuit breaking and bounded retries", long_about = None)]
struct Cli {
    /// Log level (overrides the config file)
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Write JSON logs to this file instead of stdout
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and print the effective settings
    Check {
        /// Path to the TOML configuration file
        config: PathBuf,
    },

    /// Write a configuration file from a preset
    Init {
        /// Where to write the configuration
        path: PathBuf,

        #[arg(long, value_enum, default_value = "default")]
        preset: PresetArg,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Drive calls through the pool, breaker and retry stack against a simulated endpoint
    Simulate {
        /// TOML configuration file (defaults are used when omitted)
        #[arg(short = 'c', long = "config", value_name = "PATH")]
        config: Option<PathBuf>,

        /// Total calls to issue
        #[arg(short = 'n', long, default_value_t = 1000)]
        requests: usize,

        /// Calls in flight at once
        #[arg(short = 'j', long, default_value_t = 32)]
        concurrency: usize,

        /// Probability that a request fails (0.0 - 1.0)
        #[arg(long, default_value_t = 0.05)]
        failure_rate: f64,

        /// Probability that opening a connection fails (0.0 - 1.0)
        #[arg(long, default_value_t = 0.01)]
        connect_failure_rate: f64,

        /// Latency of each request and connect in milliseconds
        #[arg(long, default_value_t = 5)]
        latency_ms: u64,

        /// Per-call deadline in milliseconds (0 = no deadline)
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,

        /// Exit non-zero when the success rate falls below this percentage
        #[arg(long, default_value_t = 90.0)]
        min_success_rate: f64,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PresetArg {
    Default,
    HighConcurrency,
    LongLived,
}

impl From<PresetArg> for TetherConfig {
    fn from(preset: PresetArg) -> Self {
        match preset {
            PresetArg::Default => TetherConfig::default(),
            PresetArg::HighConcurrency => TetherConfig::high_concurrency(),
            PresetArg::LongLived => TetherConfig::long_lived(),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            cli_style::print_error(&e.to_string(), None);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { ref config } => {
            let config = TetherConfig::from_file(config)?;
            config.validate()?;

            section_header("Effective configuration");
            println!("{}", config_table(&config));
            cli_style::print_success("Configuration is valid");
            Ok(())
        }

        Commands::Init {
            ref path,
            preset,
            force,
        } => {
            if path.exists() && !force {
                return Err(TetherError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            TetherConfig::from(preset).to_file(path)?;
            cli_style::print_success(&format!("Wrote {}", path.display()));
            Ok(())
        }

        Commands::Simulate {
            ref config,
            requests,
            concurrency,
            failure_rate,
            connect_failure_rate,
            latency_ms,
            timeout_ms,
            min_success_rate,
        } => {
            let mut config = match config {
                Some(path) => TetherConfig::from_file(path)?,
                None => TetherConfig::default(),
            };
            if let Some(level) = cli.log_level {
                config.logging.level = level.into();
            }
            if cli.log_file.is_some() {
                config.logging.file = cli.log_file.clone();
            }
            logging::init_logging(&config.logging)?;

            let options = SimulationOptions {
                requests,
                concurrency,
                failure_rate,
                connect_failure_rate,
                latency: Duration::from_millis(latency_ms),
                call_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            };

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let report = runtime.block_on(run_simulation(&config, &options))?;

            section_header("Outcomes");
            println!("{}", outcome_table(&report.outcomes));
            section_header("Simulation");
            println!("{}", simulation_table(&report));

            if report.outcomes.success_rate() < min_success_rate {
                return Err(TetherError::SimulationFailures {
                    failed: report.failed_calls(),
                    total: report.outcomes.total(),
                });
            }
            if report.failed_calls() > 0 {
                cli_style::print_warning(&format!(
                    "{} of {} calls failed",
                    report.failed_calls(),
                    report.outcomes.total()
                ));
            }
            cli_style::print_success("Simulation complete");
            Ok(())
        }
    }
}
