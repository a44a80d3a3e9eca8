use anyhow::Context;
use research_scout::{
    load_research_config, ChromeLauncher, ReqwestFetcher, ResearchOrchestrator, SelectorPolicy,
};
use std::sync::Arc;
use tracing::{info, warn};

fn query_from_args() -> Option<String> {
    let words: Vec<String> = std::env::args().skip(1).collect();
    let query = words.join(" ");
    let query = query.trim();
    if query.is_empty() {
        None
    } else {
        Some(query.to_string())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let Some(query) = query_from_args() else {
        eprintln!("usage: research-scout <query words...>");
        std::process::exit(2);
    };

    let config = load_research_config();
    config.validate().context("invalid research-scout configuration")?;

    let http = Arc::new(
        ReqwestFetcher::new(config.fetch.http_timeout()).context("failed to build HTTP client")?,
    );
    let launcher = ChromeLauncher::auto().with_page_timeout(config.fetch.http_timeout());
    if !launcher.is_available() {
        warn!("No browser available: engine searches will be skipped");
    }

    let policy = Arc::new(SelectorPolicy::new(config.policy.clone()));
    let orchestrator = ResearchOrchestrator::new(config, policy, http, Arc::new(launcher))
        .context("failed to set up research")?;

    info!("Researching: {}", query);
    tokio::select! {
        outcome = orchestrator.research(&query) => {
            println!("{}", outcome);
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
        }
    }

    Ok(())
}
