use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A team that can own projects and receive reports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct TeamConfig {
    pub name: String,
    pub github_slug: String,
    #[serde(default)]
    pub slack_channel: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub default_slack_channel: Option<String>,
    pub github_org: Option<String>,
    #[serde(default, rename = "team")]
    pub teams: Vec<TeamConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        raw.parse()
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn team_by_slug(&self, slug: &str) -> Option<&TeamConfig> {
        self.teams.iter().find(|t| t.github_slug == slug)
    }
}

impl std::str::FromStr for Config {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}
