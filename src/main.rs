use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use carwatch::config::{Backend, Config};
use carwatch::session::{provider_from_config, Collector};
use carwatch::{logging, report, run_cycle, server, CycleOutcome, HistoryStore};

#[derive(Parser)]
#[command(name = "carwatch")]
#[command(about = "Collects W124 listings into a deduplicated price history")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "carwatch.toml")]
    config: PathBuf,

    /// Override the history store location
    #[arg(long)]
    store: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect listings once and merge them into the history
    Collect(CollectArgs),

    /// Write the price report from the current history
    Report {
        /// Output directory for report artifacts
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Collect, then report
    Run(CollectArgs),

    /// Serve the history over HTTP
    Serve {
        /// Listen address
        #[arg(short, long)]
        listen: Option<String>,
    },
}

#[derive(clap::Args)]
struct CollectArgs {
    /// Fetch backend
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum BackendArg {
    Webdriver,
    Http,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Webdriver => Backend::Webdriver,
            BackendArg::Http => Backend::Http,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(store) = &cli.store {
        config.store.path = store.clone();
    }

    if let Err(e) = logging::init(&config.logging, cli.verbose) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    match execute(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Commands, mut config: Config) -> Result<()> {
    let store = HistoryStore::new(config.store.path.clone());

    match command {
        Commands::Collect(args) => {
            args.apply(&mut config);
            collect(&config, &store).await?;
        }
        Commands::Report { out } => {
            let dir = out.unwrap_or_else(|| config.report.artifacts_dir.clone());
            report::generate(&store, &dir, Local::now().date_naive())?;
        }
        Commands::Run(args) => {
            args.apply(&mut config);
            let outcome = collect(&config, &store).await?;
            if outcome.collected > 0 {
                report::generate(&store, &config.report.artifacts_dir, Local::now().date_naive())?;
            }
        }
        Commands::Serve { listen } => {
            let addr = listen.unwrap_or_else(|| config.server.listen_addr.clone());
            server::serve(store, &addr).await?;
        }
    }

    Ok(())
}

impl CollectArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(backend) = self.backend {
            config.collector.backend = backend.into();
        }
        if self.headed {
            config.collector.headless = false;
        }
    }
}

async fn collect(config: &Config, store: &HistoryStore) -> Result<CycleOutcome> {
    let collector = Collector::from_config(&config.collector)?;
    let provider = provider_from_config(&config.collector)?;

    let outcome = run_cycle(&collector, provider.as_ref(), store).await?;
    info!(
        collected = outcome.collected,
        new = outcome.new,
        store = %store.path().display(),
        "Collection finished"
    );
    Ok(outcome)
}
