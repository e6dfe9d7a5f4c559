use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{Instrument, error, info, info_span};

use crate::project::ProjectCollection;

pub mod ecr;
pub mod github;

pub use ecr::EcrDataSource;
pub use github::GitHubDataSource;

/// A collector that populates the shared [`ProjectCollection`] from one
/// external vulnerability feed.
///
/// Implementations must go through [`ProjectCollection::get_project`] and
/// [`Project::get_finding`](crate::project::Project::get_finding) for every
/// write, since other sources are merging into the same projects at the same
/// time. Data merged before an error is returned is kept.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn collect_findings(&self, projects: &ProjectCollection) -> anyhow::Result<()>;
    fn name(&self) -> &str;
}

/// Run every source concurrently against one collection and return it once
/// all of them have finished, successfully or not.
pub async fn collect_all(sources: Vec<Arc<dyn DataSource>>) -> ProjectCollection {
    let projects = Arc::new(ProjectCollection::new());

    let (names, handles): (Vec<String>, Vec<_>) = sources
        .into_iter()
        .map(|source| {
            let projects = projects.clone();
            let name = source.name().to_string();
            let span = info_span!("collect", source = %name);
            let handle = tokio::spawn(
                async move {
                    info!("querying data source");
                    source.collect_findings(&projects).await
                }
                .instrument(span),
            );
            (name, handle)
        })
        .unzip();

    for (name, joined) in names.iter().zip(join_all(handles).await) {
        match joined {
            Ok(Ok(())) => info!(source = %name, "data source finished"),
            Ok(Err(e)) => error!(source = %name, error = %e, "failed to query data source"),
            Err(e) => error!(source = %name, error = %e, "data source task did not complete"),
        }
    }

    // Every task has been joined, so no other handle to the collection remains.
    match Arc::try_unwrap(projects) {
        Ok(projects) => projects,
        Err(shared) => ProjectCollection::from_projects(shared.projects()),
    }
}
