mod cli;

use std::io::Write;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use vulnbot::aws::EcrClient;
use vulnbot::github::GitHubClient;
use vulnbot::output::{Report, formatter};
use vulnbot::sources::{EcrDataSource, GitHubDataSource};
use vulnbot::{Config, DataSource, collect_all};

fn init_tracing(args: &Cli) {
    let filter = EnvFilter::builder()
        .with_default_directive(args.verbose.tracing_level_filter().into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn data_sources(args: &Cli, config: &Arc<Config>) -> Result<Vec<Arc<dyn DataSource>>> {
    let mut sources: Vec<Arc<dyn DataSource>> = Vec::new();

    let org = args.github_org.as_ref().or(config.github_org.as_ref());
    match (&args.github_token, org) {
        (Some(token), Some(org)) => {
            let client = GitHubClient::new(token.as_str())?.with_api_base(args.github_api_url.as_str());
            sources.push(Arc::new(GitHubDataSource::new(
                Arc::new(client),
                org.as_str(),
                config.clone(),
            )));
        }
        (None, _) => warn!("no GitHub token provided; skipping GitHub"),
        (Some(_), None) => warn!("no GitHub organization configured; skipping GitHub"),
    }

    match &args.aws_region {
        Some(region) => {
            let registry = EcrClient::from_region(region.as_str()).await;
            sources.push(Arc::new(EcrDataSource::new(Arc::new(registry))));
        }
        None => debug!("no AWS region provided; skipping ECR"),
    }

    Ok(sources)
}

async fn run(args: Cli) -> Result<()> {
    let config = Arc::new(Config::load(&args.config)?);
    let sources = data_sources(&args, &config).await?;

    let projects = collect_all(sources).await;
    let report = Report::build(&projects).with_summary_channel(config.default_slack_channel.clone());

    let mut stdout = std::io::stdout().lock();
    formatter(args.json).write_report(&report, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    init_tracing(&args);

    if let Err(e) = run(args).await {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}
