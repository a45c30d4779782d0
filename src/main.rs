use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use sortrs::config::Config;
use sortrs::core::MediaLoader;
use sortrs::database::{CONFIG_FILE_NAME, DATA_DIR_NAME};
use sortrs::services::Sorter;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "sortrs",
    version,
    about = "Sort photos and videos into a deduplicated, date-organized archive"
)]
struct Cli {
    /// Archive root (must already exist)
    #[arg(value_name = "DESTINATION")]
    destination: PathBuf,

    /// Directories to sort into the archive
    #[arg(value_name = "SOURCE", required = true)]
    sources: Vec<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Index mutations between automatic flushes
    #[arg(long, value_name = "N")]
    save_threshold: Option<usize>,

    /// Pause after each delete or rename, in milliseconds
    #[arg(long, value_name = "MS")]
    settle_delay_ms: Option<u64>,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    if let Err(err) = run(cli) {
        log::error!("{:#}", err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Some(missing) = cli.sources.iter().find(|source| !source.is_dir()) {
        anyhow::bail!("{} does not exist!", missing.display());
    }

    let config_path = cli.destination.join(DATA_DIR_NAME).join(CONFIG_FILE_NAME);
    let mut config = Config::load_or_default(&config_path)?;
    if let Some(threshold) = cli.save_threshold {
        config.save_threshold = threshold;
    }
    if let Some(delay) = cli.settle_delay_ms {
        config.settle_delay_ms = delay;
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} [{pos}] {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));

    let loader = MediaLoader::new(config.hash_size);
    let mut sorter = Sorter::open(&cli.destination, loader, config)
        .with_context(|| format!("Failed to open archive {}", cli.destination.display()))?
        .with_progress(spinner.clone());

    for source in &cli.sources {
        sorter
            .sort_dir(source)
            .with_context(|| format!("Failed to sort {}", source.display()))?;
    }

    spinner.finish_and_clear();
    log::info!("Done: {}", sorter.summary());
    Ok(())
}
