use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ecr::Client;
use aws_sdk_ecr::error::DisplayErrorContext;
use aws_sdk_ecr::primitives::DateTime as SdkDateTime;
use aws_sdk_ecr::types as sdk;
use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::pagination::{CursorWalk, PageInfo};
use crate::sources::ecr::{
    ImageDetail, ImageId, ImageRegistry, ImageRepository, RepositoryPage, ScanFinding, ScanFindingsPage,
};

/// Amazon ECR behind the [`ImageRegistry`] capability.
#[derive(Clone, Debug)]
pub struct EcrClient {
    client: Client,
}

impl EcrClient {
    /// Credentials and endpoint overrides come from the standard AWS
    /// environment and profile chain.
    pub async fn from_region(region: impl Into<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;
        Self::from_client(Client::new(&config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn repository_from_sdk(repo: &sdk::Repository) -> Option<ImageRepository> {
    Some(ImageRepository {
        name: repo.repository_name()?.to_string(),
        uri: repo.repository_uri().unwrap_or_default().to_string(),
    })
}

fn timestamp(time: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

fn image_from_sdk(image: &sdk::ImageDetail) -> Option<ImageDetail> {
    Some(ImageDetail {
        digest: image.image_digest()?.to_string(),
        tags: image.image_tags().to_vec(),
        pushed_at: image.image_pushed_at().and_then(timestamp),
    })
}

fn finding_from_sdk(finding: &sdk::ImageScanFinding) -> ScanFinding {
    ScanFinding {
        name: finding.name().unwrap_or_default().to_string(),
        description: finding.description().unwrap_or_default().to_string(),
        severity: finding
            .severity()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        attributes: finding
            .attributes()
            .iter()
            .map(|a| (a.key().to_string(), a.value().unwrap_or_default().to_string()))
            .collect(),
    }
}

#[async_trait]
impl ImageRegistry for EcrClient {
    #[instrument(skip(self))]
    async fn describe_repositories(&self, next_token: Option<String>) -> Result<RepositoryPage> {
        let output = self
            .client
            .describe_repositories()
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| anyhow!("DescribeRepositories failed: {}", DisplayErrorContext(e)))?;

        Ok(RepositoryPage {
            repositories: output.repositories().iter().filter_map(repository_from_sdk).collect(),
            next_token: output.next_token().map(str::to_string),
        })
    }

    #[instrument(skip(self))]
    async fn describe_images(&self, repository: &str) -> Result<Vec<ImageDetail>> {
        let mut images = Vec::new();
        let mut pages = CursorWalk::new();
        while let Some(token) = pages.cursor() {
            let output = self
                .client
                .describe_images()
                .repository_name(repository)
                .set_next_token(token)
                .send()
                .await
                .map_err(|e| anyhow!("DescribeImages failed for {repository}: {}", DisplayErrorContext(e)))?;

            images.extend(output.image_details().iter().filter_map(image_from_sdk));
            pages.advance(&PageInfo::from_next_token(output.next_token().map(str::to_string)));
        }
        Ok(images)
    }

    #[instrument(skip(self, image), fields(digest = %image.digest))]
    async fn describe_image_scan_findings(
        &self,
        repository: &str,
        image: &ImageId,
        next_token: Option<String>,
    ) -> Result<ScanFindingsPage> {
        let image_id = sdk::ImageIdentifier::builder()
            .image_digest(&image.digest)
            .set_image_tag(image.tag.clone())
            .build();

        let output = self
            .client
            .describe_image_scan_findings()
            .repository_name(repository)
            .image_id(image_id)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "DescribeImageScanFindings failed for {repository}: {}",
                    DisplayErrorContext(e)
                )
            })?;

        let findings = output
            .image_scan_findings()
            .map(|scan| scan.findings().iter().map(finding_from_sdk).collect())
            .unwrap_or_default();
        Ok(ScanFindingsPage {
            findings,
            next_token: output.next_token().map(str::to_string),
        })
    }
}
