use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::finding::{IdentifierKind, Identifiers, Severity};
use crate::pagination::{CursorWalk, PageInfo};
use crate::project::ProjectCollection;
use crate::sources::DataSource;

pub const LINK_LABEL: &str = "ECR";

static FINDING_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+)-\d+-\d+$").expect("static regex is valid"));

#[derive(Debug, Clone)]
pub struct ImageRepository {
    pub name: String,
    pub uri: String,
}

#[derive(Debug, Clone)]
pub struct RepositoryPage {
    pub repositories: Vec<ImageRepository>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImageDetail {
    pub digest: String,
    pub tags: Vec<String>,
    pub pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageId {
    pub digest: String,
    pub tag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ScanFinding {
    pub name: String,
    pub description: String,
    pub severity: String,
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ScanFindingsPage {
    pub findings: Vec<ScanFinding>,
    pub next_token: Option<String>,
}

/// The subset of a container registry's API the image scan source needs.
#[async_trait]
pub trait ImageRegistry: Send + Sync {
    async fn describe_repositories(&self, next_token: Option<String>) -> Result<RepositoryPage>;
    async fn describe_images(&self, repository: &str) -> Result<Vec<ImageDetail>>;
    async fn describe_image_scan_findings(
        &self,
        repository: &str,
        image: &ImageId,
        next_token: Option<String>,
    ) -> Result<ScanFindingsPage>;
}

pub fn severity_from_ecr(label: &str) -> Severity {
    match label {
        "INFORMATIONAL" => Severity::Info,
        "LOW" => Severity::Low,
        "MEDIUM" => Severity::Moderate,
        "HIGH" => Severity::High,
        "CRITICAL" => Severity::Critical,
        _ => Severity::Undefined,
    }
}

/// `CVE-2023-1234` yields kind `CVE`; names of any other shape yield nothing.
fn identifiers_for(name: &str) -> Option<Identifiers> {
    let kind = FINDING_NAME.captures(name)?.get(1)?.as_str();
    Some(Identifiers::from([(IdentifierKind::new(kind), name.to_string())]))
}

fn package_name(attributes: &[(String, String)]) -> Option<&str> {
    attributes
        .iter()
        .find(|(key, _)| key == "package_name")
        .map(|(_, value)| value.as_str())
}

/// Most recently pushed image, tagged with its last tag.
fn latest_image(mut images: Vec<ImageDetail>) -> Option<ImageId> {
    images.sort_by(|a, b| b.pushed_at.cmp(&a.pushed_at));
    images.into_iter().next().map(|image| ImageId {
        tag: image.tags.last().cloned(),
        digest: image.digest,
    })
}

/// Pulls image scan findings for the latest image of every repository in a
/// registry.
pub struct EcrDataSource {
    registry: Arc<dyn ImageRegistry>,
}

impl EcrDataSource {
    pub fn new(registry: Arc<dyn ImageRegistry>) -> Self {
        Self { registry }
    }

    async fn list_repositories(&self) -> Result<Vec<ImageRepository>> {
        let mut repositories = Vec::new();
        let mut pages = CursorWalk::new();
        while let Some(token) = pages.cursor() {
            let page = self
                .registry
                .describe_repositories(token)
                .await
                .context("describe repositories query failed")?;
            repositories.extend(page.repositories);
            pages.advance(&PageInfo::from_next_token(page.next_token));
        }
        Ok(repositories)
    }

    async fn process_repository(&self, projects: &ProjectCollection, repo: &ImageRepository) -> Result<()> {
        let project = projects.get_project(&repo.name);
        project.set_link(LINK_LABEL, repo.uri.clone());

        let images = self.registry.describe_images(&repo.name).await?;
        let Some(image) = latest_image(images) else {
            anyhow::bail!("no images found in the repository");
        };

        let mut pages = CursorWalk::new();
        while let Some(token) = pages.cursor() {
            let page = self
                .registry
                .describe_image_scan_findings(&repo.name, &image, token)
                .await?;

            for vuln in &page.findings {
                let Some(identifiers) = identifiers_for(&vuln.name) else {
                    debug!(finding = %vuln.name, "no finding type found; skipping");
                    continue;
                };
                project.get_finding(identifiers).update(|finding| {
                    finding.fill_description(&vuln.description);
                    if let Some(package) = package_name(&vuln.attributes) {
                        finding.fill_package_name(package);
                    }
                    finding.set_severity(severity_from_ecr(&vuln.severity));
                });
            }
            pages.advance(&PageInfo::from_next_token(page.next_token));
        }
        Ok(())
    }
}

#[async_trait]
impl DataSource for EcrDataSource {
    async fn collect_findings(&self, projects: &ProjectCollection) -> Result<()> {
        let repositories = self.list_repositories().await?;
        info!(count = repositories.len(), "processing image repositories");

        for repo in &repositories {
            if let Err(e) = self.process_repository(projects, repo).await {
                warn!(repository = %repo.name, error = %e, "error processing repository findings");
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "ECR"
    }
}
