use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

/// Collect vulnerability alerts across an organization and summarize them by team
#[derive(Parser)]
#[command(name = "vulnbot", version)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// GitHub organization to scan (overrides `github_org` in the config file)
    #[arg(long, env = "GITHUB_ORG")]
    pub github_org: Option<String>,

    /// GitHub token used for the GraphQL API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Base URL of the GitHub API
    #[arg(long, env = "VULNBOT_GITHUB_API_URL", default_value = vulnbot::github::GITHUB_API_BASE)]
    pub github_api_url: String,

    /// AWS region whose ECR image scan findings are included; ECR is skipped when unset
    #[arg(long, env = "AWS_REGION")]
    pub aws_region: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}
