use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Something that can answer a GraphQL query with its `data` payload.
#[async_trait]
pub trait GraphQlClient: Send + Sync {
    async fn query(&self, query: &str, variables: Value) -> Result<Value>;
}

#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    token: String,
    api_base: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("vulnbot")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            token: token.into(),
            api_base: GITHUB_API_BASE.to_string(),
        })
    }

    /// Point the client at a different API host, e.g. GitHub Enterprise or a
    /// test server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn graphql_url(&self) -> String {
        format!("{}/graphql", self.api_base)
    }
}

#[async_trait]
impl GraphQlClient for GitHubClient {
    #[instrument(skip(self, query, variables))]
    async fn query(&self, query: &str, variables: Value) -> Result<Value> {
        let url = self.graphql_url();
        let body = serde_json::json!({ "query": query, "variables": variables });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("GraphQL request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("GraphQL API returned HTTP {status}");
        }

        let json: Value = response
            .json()
            .await
            .context("failed to parse GraphQL response")?;

        if let Some(errors) = json.get("errors") {
            bail!("GraphQL errors: {errors}");
        }

        json.get("data")
            .cloned()
            .context("missing 'data' field in GraphQL response")
    }
}
