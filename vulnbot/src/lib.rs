pub mod aws;
pub mod config;
pub mod finding;
pub mod github;
pub mod output;
pub mod pagination;
pub mod project;
pub mod sources;
pub mod summary;

pub use config::{Config, TeamConfig};
pub use finding::{Ecosystem, Finding, FindingData, IdentifierKind, Identifiers, Severity};
pub use project::{Project, ProjectCollection, normalize_project_name};
pub use sources::{DataSource, collect_all};
pub use summary::{
    FindingSummary, ProjectFindingSummary, TeamProjectCollection, group_team_findings,
    summarize_findings,
};
