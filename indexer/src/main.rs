use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crawler::IndexingService;
use search_core::response::{Ack, SearchResponse, StatisticsResponse};
use search_core::stats::statistics;
use search_core::{open_store, Config, LemmaExtractor, SearchEngine, SearchRequest, StemmerMorphology};
use serde_json::to_string_pretty;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Crawl configured sites into a lemma index and query it", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-index every configured site (Ctrl-C stops the run)
    Crawl,
    /// Re-index a single page of a configured site
    Page {
        #[arg(long)]
        url: String,
    },
    /// Query the index
    Search {
        #[arg(long)]
        query: String,
        /// Restrict results to one configured site URL
        #[arg(long)]
        site: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Print per-site statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let config = Arc::new(Config::load(&cli.config).with_context(|| format!("loading {}", cli.config))?);
    let store = open_store(&config)?;

    match cli.command {
        Commands::Crawl => {
            let service = IndexingService::new(Arc::clone(&config), Arc::clone(&store))?;
            let run = service.start_indexing()?;
            let stopper = service.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, stopping");
                    if let Err(e) = stopper.stop_indexing() {
                        warn!(error = %e, "stop failed");
                    }
                }
            });
            let report = run.wait().await;
            println!("{}", to_string_pretty(&report)?);
        }
        Commands::Page { url } => {
            let service = IndexingService::new(Arc::clone(&config), Arc::clone(&store))?;
            service.index_single_page(&url).await?;
            println!("{}", to_string_pretty(&Ack::ok())?);
        }
        Commands::Search { query, site, offset, limit } => {
            let engine = SearchEngine::new(
                Arc::clone(&config),
                Arc::clone(&store),
                LemmaExtractor::new(Arc::new(StemmerMorphology::russian())),
            );
            let mut request = SearchRequest::new(query).page(offset, limit);
            if let Some(site) = site {
                request = request.site(site);
            }
            let hits = engine.search(&request)?;
            let response = SearchResponse { result: true, count: hits.count, data: hits.data };
            println!("{}", to_string_pretty(&response)?);
        }
        Commands::Stats => {
            let response = StatisticsResponse { result: true, statistics: statistics(&config, &store, false) };
            println!("{}", to_string_pretty(&response)?);
        }
    }

    store.flush()?;
    Ok(())
}
