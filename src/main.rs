use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::eyre};
use tracing::info;
use tracing_subscriber::EnvFilter;

use swcache::cache::MemoryStorage;
use swcache::config::RouterConfig;
use swcache::fetch::HttpFetcher;
use swcache::router::CacheRouter;
use swcache::server::{Server, dispatch};

#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(about = "Offline cache router running as a local caching proxy")]
#[command(version)]
struct Args {
    /// Path to a TOML config file (defaults reproduce the AutoMarket worker)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install and activate the current generation, then serve as a proxy
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        listen: String,
    },
    /// Print the effective configuration's version tag and generations
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match args.config.as_deref() {
        Some(path) => RouterConfig::load(path)?,
        None => RouterConfig::default(),
    };

    match args.command {
        Command::Version => {
            println!("version: {}", config.version);
            println!("static generation: {}", config.static_generation());
            println!("dynamic generation: {}", config.dynamic_generation());
            Ok(())
        }
        Command::Serve { listen } => serve(config, &listen).await,
    }
}

async fn serve(config: RouterConfig, listen: &str) -> Result<()> {
    let fetcher = HttpFetcher::new(config.origin.clone());
    let router = Arc::new(CacheRouter::new(
        config,
        Arc::new(MemoryStorage::new()),
        fetcher,
    ));

    let report = router.on_install().await?;
    info!(cached = report.cached.len(), failed = report.failed.len(), "install complete");

    if !router.should_activate() {
        return Err(eyre!("installed generation is not ready to activate"));
    }
    let deleted = router.on_activate().await?;
    info!(deleted = deleted.len(), "activation complete");

    let server = Server::bind(listen).await?;
    server
        .run(move |request| dispatch(Arc::clone(&router), request))
        .await?;
    Ok(())
}
