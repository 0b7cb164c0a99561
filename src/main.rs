mod config;
mod detectors;
mod line_source;
mod logging;
mod reboot;
mod signals;
mod watchdog;

use clap::Parser;
use config::NannyConfig;
use line_source::FileLineSource;
use reboot::{CommandRebooter, NoopRebooter, Rebooter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use watchdog::Watchdog;

/// Watches a mining worker's stderr log and reboots the machine when the
/// worker is stuck, killed, disconnected, or hashing below its expected rate.
#[derive(Parser, Debug)]
#[command(name = "nanny", version, about)]
pub struct Cli {
    /// Config file path (default: ~/nanny.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log reboot reasons but never reboot; keep polling
    #[arg(long)]
    dry_run: bool,

    /// Skip the startup delay, check the log once, print verdicts and exit
    #[arg(long)]
    once: bool,

    /// Print the resolved configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log every poll cycle
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("nanny: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config_path = match cli.config {
        Some(path) => path,
        None => config::default_config_path()?,
    };
    let config_found = config_path.exists();
    let config = NannyConfig::load(&config_path)?;

    if cli.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    let source = Box::new(FileLineSource::new(
        &config.paths.worker_log,
        config.detectors.max_lines,
    ));

    if cli.once {
        logging::init_cli(cli.verbose);
        report_config(&config_path, config_found, &config);
        let dog = Watchdog::new(
            config.timing,
            config.detectors,
            source,
            Arc::new(NoopRebooter::new()),
        );
        let verdicts = dog.check().await?;
        if verdicts.is_empty() {
            println!("{}", detectors::Verdict::Healthy);
            return Ok(ExitCode::SUCCESS);
        }
        for verdict in &verdicts {
            println!("{verdict}");
        }
        return Ok(ExitCode::from(1));
    }

    let _guard = logging::init_daemon(&config.paths.log_file, cli.verbose)?;
    tracing::info!(
        config = %config_path.display(),
        worker_log = %source.path().display(),
        log_file = %config.paths.log_file.display(),
        dry_run = cli.dry_run,
        "nanny starting"
    );
    report_config(&config_path, config_found, &config);

    let rebooter: Arc<dyn Rebooter> = if cli.dry_run {
        Arc::new(NoopRebooter::new())
    } else {
        Arc::new(CommandRebooter::new(&config.reboot))
    };

    let shutdown = signals::install()?;
    let mut dog = Watchdog::new(config.timing, config.detectors, source, rebooter);
    dog.run(shutdown).await;

    Ok(ExitCode::SUCCESS)
}

/// Log config notes once the subscriber exists to receive them.
fn report_config(path: &Path, found: bool, config: &NannyConfig) {
    if !found {
        tracing::info!(path = %path.display(), "no config file, using defaults");
    }
    for warning in config.warnings() {
        tracing::warn!("{warning}");
    }
}
