use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, TeamConfig};
use crate::finding::{Ecosystem, IdentifierKind, Identifiers, Severity};
use crate::github::GraphQlClient;
use crate::pagination::{CursorWalk, PageInfo};
use crate::project::{Project, ProjectCollection};
use crate::sources::DataSource;

/// Repositories with a topic containing this keyword are never attributed to
/// an owning team.
pub const DISABLE_TOPIC_KEYWORD: &str = "disable-vulnbot";

pub const LINK_LABEL: &str = "GitHub";

pub const ORG_VULNERABILITY_QUERY: &str = r#"query($login: String!, $repoCursor: String, $alertCursor: String) {
  organization(login: $login) {
    name
    login
    repositories(orderBy: {field: NAME, direction: ASC}, isFork: false, isArchived: false, first: 100, after: $repoCursor) {
      totalCount
      pageInfo { endCursor hasNextPage }
      nodes {
        name
        url
        vulnerabilityAlerts(states: OPEN, first: 100, after: $alertCursor) {
          totalCount
          pageInfo { endCursor hasNextPage }
          nodes {
            securityAdvisory { description identifiers { type value } }
            securityVulnerability { severity package { ecosystem name } }
          }
        }
      }
    }
  }
}"#;

pub const REPOSITORY_ALERTS_QUERY: &str = r#"query($repoName: String!, $orgName: String!, $alertCursor: String) {
  repository(name: $repoName, owner: $orgName) {
    name
    url
    vulnerabilityAlerts(states: OPEN, first: 100, after: $alertCursor) {
      totalCount
      pageInfo { endCursor hasNextPage }
      nodes {
        securityAdvisory { description identifiers { type value } }
        securityVulnerability { severity package { ecosystem name } }
      }
    }
  }
}"#;

pub const ORG_TEAMS_QUERY: &str = r#"query($login: String!, $teamCursor: String, $repoCursor: String) {
  organization(login: $login) {
    teams(orderBy: {field: NAME, direction: ASC}, first: 100, after: $teamCursor) {
      totalCount
      pageInfo { endCursor hasNextPage }
      nodes {
        name
        slug
        repositories(orderBy: {field: NAME, direction: ASC}, first: 100, after: $repoCursor) {
          pageInfo { endCursor hasNextPage }
          edges {
            permission
            node {
              name
              isFork
              isArchived
              repositoryTopics(first: 10) { edges { node { topic { name } } } }
            }
          }
        }
      }
    }
  }
}"#;

pub const TEAM_REPOSITORIES_QUERY: &str = r#"query($login: String!, $teamSlug: String!, $repoCursor: String) {
  organization(login: $login) {
    team(slug: $teamSlug) {
      name
      slug
      repositories(orderBy: {field: NAME, direction: ASC}, first: 100, after: $repoCursor) {
        pageInfo { endCursor hasNextPage }
        edges {
          permission
          node {
            name
            isFork
            isArchived
            repositoryTopics(first: 10) { edges { node { topic { name } } } }
          }
        }
      }
    }
  }
}"#;

#[derive(Deserialize)]
struct Connection<T> {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

#[derive(Deserialize)]
struct OrgVulnerabilityData {
    organization: OrgRepositories,
}

#[derive(Deserialize)]
struct OrgRepositories {
    repositories: Connection<OrgRepo>,
}

#[derive(Deserialize)]
struct RepositoryData {
    repository: OrgRepo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrgRepo {
    name: String,
    url: String,
    vulnerability_alerts: Connection<VulnerabilityAlert>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VulnerabilityAlert {
    security_advisory: SecurityAdvisory,
    security_vulnerability: SecurityVulnerability,
}

#[derive(Deserialize)]
struct SecurityAdvisory {
    #[serde(default)]
    description: String,
    #[serde(default)]
    identifiers: Vec<AdvisoryIdentifier>,
}

#[derive(Deserialize)]
struct AdvisoryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

#[derive(Deserialize)]
struct SecurityVulnerability {
    #[serde(default)]
    severity: String,
    package: VulnerablePackage,
}

#[derive(Deserialize)]
struct VulnerablePackage {
    #[serde(default)]
    ecosystem: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct OrgTeamsData {
    organization: OrgTeams,
}

#[derive(Deserialize)]
struct OrgTeams {
    teams: Connection<OrgTeam>,
}

#[derive(Deserialize)]
struct TeamRepositoriesData {
    organization: TeamRepositoriesOrg,
}

#[derive(Deserialize)]
struct TeamRepositoriesOrg {
    team: Option<OrgTeam>,
}

#[derive(Deserialize)]
struct OrgTeam {
    name: String,
    slug: String,
    repositories: TeamRepositories,
}

#[derive(Deserialize)]
struct TeamRepositories {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    #[serde(default)]
    edges: Vec<TeamRepositoryEdge>,
}

#[derive(Deserialize)]
struct TeamRepositoryEdge {
    permission: String,
    node: TeamRepository,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamRepository {
    name: String,
    #[serde(default)]
    is_fork: bool,
    #[serde(default)]
    is_archived: bool,
    #[serde(default)]
    repository_topics: RepositoryTopics,
}

#[derive(Deserialize, Default)]
struct RepositoryTopics {
    #[serde(default)]
    edges: Vec<TopicEdge>,
}

#[derive(Deserialize)]
struct TopicEdge {
    node: TopicNode,
}

#[derive(Deserialize)]
struct TopicNode {
    topic: Topic,
}

#[derive(Deserialize)]
struct Topic {
    name: String,
}

impl TeamRepository {
    fn is_untracked(&self) -> bool {
        self.is_archived
            || self.is_fork
            || self.repository_topics.edges.iter().any(|edge| {
                edge.node
                    .topic
                    .name
                    .to_lowercase()
                    .contains(DISABLE_TOPIC_KEYWORD)
            })
    }
}

// Ref: https://docs.github.com/en/graphql/reference/enums#securityadvisoryecosystem
pub fn ecosystem_from_github(label: &str) -> Ecosystem {
    match label {
        "ACTIONS" => Ecosystem::Gha,
        "COMPOSER" => Ecosystem::Php,
        "ERLANG" => Ecosystem::Erlang,
        "GO" => Ecosystem::Go,
        "MAVEN" => Ecosystem::Java,
        "NPM" => Ecosystem::Js,
        "NUGET" => Ecosystem::CSharp,
        "PIP" => Ecosystem::Python,
        "PUB" => Ecosystem::Dart,
        "RUBYGEMS" => Ecosystem::Ruby,
        "RUST" => Ecosystem::Rust,
        "SWIFT" => Ecosystem::Swift,
        _ => Ecosystem::Unspecified,
    }
}

pub fn severity_from_github(label: &str) -> Severity {
    match label {
        "CRITICAL" => Severity::Critical,
        "HIGH" => Severity::High,
        "MODERATE" => Severity::Moderate,
        "LOW" => Severity::Low,
        _ => Severity::Undefined,
    }
}

fn is_owner_permission(permission: &str) -> bool {
    matches!(permission, "ADMIN" | "MAINTAIN")
}

/// Pulls open Dependabot alerts and team ownership for one organization.
pub struct GitHubDataSource {
    client: Arc<dyn GraphQlClient>,
    org: String,
    config: Arc<Config>,
}

impl GitHubDataSource {
    /// Teams are matched to GitHub team slugs through `config`; teams it does
    /// not list are ignored.
    pub fn new(client: Arc<dyn GraphQlClient>, org: impl Into<String>, config: Arc<Config>) -> Self {
        Self {
            client,
            org: org.into(),
            config,
        }
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let data = self.client.query(query, variables).await?;
        serde_json::from_value(data).context("unexpected GraphQL response shape")
    }

    #[instrument(skip(self, projects), fields(org = %self.org))]
    async fn collect_vulnerabilities(&self, projects: &ProjectCollection) -> Result<()> {
        let mut repos = CursorWalk::new();
        while let Some(cursor) = repos.cursor() {
            info!(repo_cursor = ?cursor, "querying GitHub for repositories with vulnerabilities");
            let data: OrgVulnerabilityData = self
                .query(
                    ORG_VULNERABILITY_QUERY,
                    json!({ "login": self.org, "repoCursor": cursor, "alertCursor": null }),
                )
                .await
                .context("GitHub repository query failed")?;

            let page = data.organization.repositories;
            for repo in page.nodes {
                self.process_repository(projects, repo).await?;
            }
            repos.advance(&page.page_info);
        }
        Ok(())
    }

    async fn process_repository(&self, projects: &ProjectCollection, repo: OrgRepo) -> Result<()> {
        let project = projects.get_project(&repo.name);
        // There is no GraphQL field for the Dependabot page itself.
        project.set_link(LINK_LABEL, format!("{}/security/dependabot", repo.url));
        debug!(project = project.name(), "processing findings for project");

        merge_alerts(&project, &repo.vulnerability_alerts.nodes);

        let mut alerts = CursorWalk::resume(&repo.vulnerability_alerts.page_info);
        while let Some(cursor) = alerts.cursor() {
            info!(repository = %repo.name, alert_cursor = ?cursor, "querying for more vulnerabilities for a repository");
            let data: RepositoryData = self
                .query(
                    REPOSITORY_ALERTS_QUERY,
                    json!({ "repoName": repo.name, "orgName": self.org, "alertCursor": cursor }),
                )
                .await
                .with_context(|| format!("alert query for repository {} failed", repo.name))?;

            let page = data.repository.vulnerability_alerts;
            merge_alerts(&project, &page.nodes);
            alerts.advance(&page.page_info);
        }
        Ok(())
    }

    #[instrument(skip(self, projects), fields(org = %self.org))]
    async fn gather_repo_owners(&self, projects: &ProjectCollection) -> Result<()> {
        let mut teams = CursorWalk::new();
        while let Some(cursor) = teams.cursor() {
            info!(team_cursor = ?cursor, "querying GitHub for repository ownership");
            let data: OrgTeamsData = self
                .query(
                    ORG_TEAMS_QUERY,
                    json!({ "login": self.org, "teamCursor": cursor, "repoCursor": null }),
                )
                .await
                .context("GitHub team ownership query failed")?;

            let page = data.organization.teams;
            for team in page.nodes {
                self.process_team(projects, team).await?;
            }
            teams.advance(&page.page_info);
        }
        Ok(())
    }

    async fn process_team(&self, projects: &ProjectCollection, team: OrgTeam) -> Result<()> {
        let Some(config) = self.config.team_by_slug(&team.slug) else {
            warn!(slug = %team.slug, team = %team.name, "no config found for team; skipping");
            return Ok(());
        };

        attribute_owners(projects, config, &team.repositories.edges);

        let mut repos = CursorWalk::resume(&team.repositories.page_info);
        while let Some(cursor) = repos.cursor() {
            info!(team = %team.slug, repo_cursor = ?cursor, "querying for more repositories for a team");
            let data: TeamRepositoriesData = self
                .query(
                    TEAM_REPOSITORIES_QUERY,
                    json!({ "login": self.org, "teamSlug": team.slug, "repoCursor": cursor }),
                )
                .await
                .with_context(|| format!("repository query for team {} failed", team.slug))?;

            let Some(next) = data.organization.team else {
                warn!(team = %team.slug, "team disappeared while paging its repositories");
                break;
            };
            attribute_owners(projects, config, &next.repositories.edges);
            repos.advance(&next.repositories.page_info);
        }
        Ok(())
    }
}

fn merge_alerts(project: &Project, alerts: &[VulnerabilityAlert]) {
    for alert in alerts {
        let identifiers: Identifiers = alert
            .security_advisory
            .identifiers
            .iter()
            .map(|id| (IdentifierKind::new(id.kind.as_str()), id.value.clone()))
            .collect();
        if identifiers.is_empty() {
            warn!(project = project.name(), "skipping alert without advisory identifiers");
            continue;
        }
        debug!(?identifiers, "processing finding");

        let vulnerability = &alert.security_vulnerability;
        project.get_finding(identifiers).update(|finding| {
            finding.fill_description(&alert.security_advisory.description);
            finding.fill_package_name(&vulnerability.package.name);
            finding.set_ecosystem(ecosystem_from_github(&vulnerability.package.ecosystem));
            finding.set_severity(severity_from_github(&vulnerability.severity));
        });
    }
}

fn attribute_owners(projects: &ProjectCollection, team: &TeamConfig, edges: &[TeamRepositoryEdge]) {
    for edge in edges {
        let repo = &edge.node;
        if repo.is_untracked() {
            debug!(
                repository = %repo.name,
                is_fork = repo.is_fork,
                is_archived = repo.is_archived,
                "skipping untracked repository"
            );
            continue;
        }
        if is_owner_permission(&edge.permission) {
            projects.get_project(&repo.name).add_owner(team.clone());
        }
    }
}

#[async_trait]
impl DataSource for GitHubDataSource {
    async fn collect_findings(&self, projects: &ProjectCollection) -> Result<()> {
        self.collect_vulnerabilities(projects).await?;
        self.gather_repo_owners(projects).await
    }

    fn name(&self) -> &str {
        "GitHub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use anyhow::anyhow;

    use crate::finding::FindingData;

    /// Answers queries from a script, recording every request.
    #[derive(Default)]
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<Value>>>,
        requests: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<Value>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<(String, Value)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GraphQlClient for ScriptedClient {
        async fn query(&self, query: &str, variables: Value) -> Result<Value> {
            self.requests.lock().unwrap().push((query.to_string(), variables));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("unexpected query")))
        }
    }

    fn page_info(cursor: &str, has_next_page: bool) -> Value {
        json!({ "endCursor": cursor, "hasNextPage": has_next_page })
    }

    fn alert(cve: &str, ecosystem: &str, severity: &str, package: &str) -> Value {
        json!({
            "securityAdvisory": {
                "description": format!("{cve} is bad"),
                "identifiers": [{ "type": "CVE", "value": cve }]
            },
            "securityVulnerability": {
                "severity": severity,
                "package": { "ecosystem": ecosystem, "name": package }
            }
        })
    }

    fn repo(name: &str, alerts: Vec<Value>, alert_page: Value) -> Value {
        json!({
            "name": name,
            "url": format!("https://github.com/heart-of-gold/{name}"),
            "vulnerabilityAlerts": { "totalCount": alerts.len(), "pageInfo": alert_page, "nodes": alerts }
        })
    }

    fn repos_page(repos: Vec<Value>, page: Value) -> Value {
        json!({
            "organization": {
                "name": "Heart of Gold",
                "login": "heart-of-gold",
                "repositories": { "totalCount": repos.len(), "pageInfo": page, "nodes": repos }
            }
        })
    }

    fn team_edge(name: &str, permission: &str, fork: bool, archived: bool, topics: &[&str]) -> Value {
        let topics: Vec<Value> = topics
            .iter()
            .map(|t| json!({ "node": { "topic": { "name": t } } }))
            .collect();
        json!({
            "permission": permission,
            "node": {
                "name": name,
                "isFork": fork,
                "isArchived": archived,
                "repositoryTopics": { "edges": topics }
            }
        })
    }

    fn team(slug: &str, edges: Vec<Value>, page: Value) -> Value {
        json!({
            "name": slug.to_uppercase(),
            "slug": slug,
            "repositories": { "pageInfo": page, "edges": edges }
        })
    }

    fn teams_page(teams: Vec<Value>, page: Value) -> Value {
        json!({
            "organization": {
                "teams": { "totalCount": teams.len(), "pageInfo": page, "nodes": teams }
            }
        })
    }

    fn empty_teams() -> Value {
        teams_page(vec![], page_info("", false))
    }

    fn team_config(slug: &str) -> TeamConfig {
        TeamConfig {
            name: slug.to_uppercase(),
            github_slug: slug.to_string(),
            slack_channel: format!("#{slug}"),
        }
    }

    fn source(client: &Arc<ScriptedClient>, teams: Vec<TeamConfig>) -> GitHubDataSource {
        let config = Config {
            teams,
            ..Config::default()
        };
        GitHubDataSource::new(client.clone(), "heart-of-gold", Arc::new(config))
    }

    #[tokio::test]
    async fn single_project_single_finding() {
        let client = ScriptedClient::new(vec![
            Ok(repos_page(
                vec![repo("zaphod", vec![alert("CVE-42", "GO", "CRITICAL", "improbability-drive")], page_info("a1", false))],
                page_info("r1", false),
            )),
            Ok(empty_teams()),
        ]);
        let projects = ProjectCollection::new();
        source(&client, vec![]).collect_findings(&projects).await.unwrap();

        assert_eq!(projects.len(), 1);
        let project = projects.get_project("zaphod");
        assert_eq!(
            project.links()[LINK_LABEL],
            "https://github.com/heart-of-gold/zaphod/security/dependabot"
        );
        assert_eq!(
            project.findings(),
            vec![FindingData {
                identifiers: Identifiers::from([(IdentifierKind::CVE, "CVE-42".to_string())]),
                ecosystem: Ecosystem::Go,
                severity: Severity::Critical,
                description: Some("CVE-42 is bad".into()),
                package_name: Some("improbability-drive".into()),
            }]
        );
        assert!(project.owners().is_empty());
    }

    #[tokio::test]
    async fn repository_pages_are_walked_until_exhausted() {
        let client = ScriptedClient::new(vec![
            Ok(repos_page(vec![repo("a", vec![], page_info("", false))], page_info("r1", true))),
            Ok(repos_page(vec![repo("b", vec![], page_info("", false))], page_info("r2", true))),
            Ok(repos_page(vec![repo("c", vec![], page_info("", false))], page_info("r3", false))),
            Ok(empty_teams()),
        ]);
        let projects = ProjectCollection::new();
        source(&client, vec![]).collect_findings(&projects).await.unwrap();

        let requests = client.requests();
        let repo_queries: Vec<&Value> = requests
            .iter()
            .filter(|(q, _)| q == ORG_VULNERABILITY_QUERY)
            .map(|(_, v)| v)
            .collect();
        assert_eq!(repo_queries.len(), 3);
        assert_eq!(repo_queries[0]["repoCursor"], Value::Null);
        assert_eq!(repo_queries[1]["repoCursor"], "r1");
        assert_eq!(repo_queries[2]["repoCursor"], "r2");
        assert_eq!(requests.len(), 4);
        assert_eq!(projects.len(), 3);
    }

    #[tokio::test]
    async fn extra_alert_pages_are_fetched_per_repository() {
        let more_alerts = |cve: &str, page: Value| {
            json!({ "repository": repo("zaphod", vec![alert(cve, "NPM", "LOW", "left-pad")], page) })
        };
        let client = ScriptedClient::new(vec![
            Ok(repos_page(
                vec![
                    repo("zaphod", vec![alert("CVE-1", "NPM", "HIGH", "left-pad")], page_info("a1", true)),
                    repo("marvin", vec![alert("CVE-9", "PIP", "LOW", "paranoid")], page_info("m1", false)),
                ],
                page_info("r1", false),
            )),
            Ok(more_alerts("CVE-2", page_info("a2", true))),
            Ok(more_alerts("CVE-3", page_info("a3", false))),
            Ok(empty_teams()),
        ]);
        let projects = ProjectCollection::new();
        source(&client, vec![]).collect_findings(&projects).await.unwrap();

        let requests = client.requests();
        let alert_queries: Vec<&Value> = requests
            .iter()
            .filter(|(q, _)| q == REPOSITORY_ALERTS_QUERY)
            .map(|(_, v)| v)
            .collect();
        assert_eq!(alert_queries.len(), 2);
        assert_eq!(alert_queries[0]["repoName"], "zaphod");
        assert_eq!(alert_queries[0]["orgName"], "heart-of-gold");
        assert_eq!(alert_queries[0]["alertCursor"], "a1");
        assert_eq!(alert_queries[1]["alertCursor"], "a2");

        assert_eq!(projects.get_project("zaphod").finding_count(), 3);
        assert_eq!(projects.get_project("marvin").finding_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_alerts_merge_into_one_finding() {
        let mut ghsa = alert("CVE-1", "GO", "HIGH", "towel");
        ghsa["securityAdvisory"]["identifiers"] = json!([
            { "type": "GHSA", "value": "GHSA-xxxx" },
            { "type": "CVE", "value": "CVE-1" }
        ]);
        ghsa["securityAdvisory"]["description"] = json!("later description");
        let client = ScriptedClient::new(vec![
            Ok(repos_page(
                vec![repo("zaphod", vec![alert("CVE-1", "GO", "LOW", "towel"), ghsa], page_info("", false))],
                page_info("", false),
            )),
            Ok(empty_teams()),
        ]);
        let projects = ProjectCollection::new();
        source(&client, vec![]).collect_findings(&projects).await.unwrap();

        let findings = projects.get_project("zaphod").findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].identifiers.len(), 2);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].description.as_deref(), Some("CVE-1 is bad"));
    }

    #[tokio::test]
    async fn alerts_without_identifiers_are_skipped() {
        let mut bare = alert("CVE-1", "GO", "HIGH", "towel");
        bare["securityAdvisory"]["identifiers"] = json!([]);
        let client = ScriptedClient::new(vec![
            Ok(repos_page(vec![repo("zaphod", vec![bare], page_info("", false))], page_info("", false))),
            Ok(empty_teams()),
        ]);
        let projects = ProjectCollection::new();
        source(&client, vec![]).collect_findings(&projects).await.unwrap();
        assert_eq!(projects.get_project("zaphod").finding_count(), 0);
    }

    #[tokio::test]
    async fn unknown_labels_map_to_undefined() {
        let client = ScriptedClient::new(vec![
            Ok(repos_page(
                vec![repo("zaphod", vec![alert("CVE-1", "HASKELL", "APOCALYPTIC", "monad")], page_info("", false))],
                page_info("", false),
            )),
            Ok(empty_teams()),
        ]);
        let projects = ProjectCollection::new();
        source(&client, vec![]).collect_findings(&projects).await.unwrap();
        let finding = &projects.get_project("zaphod").findings()[0];
        assert_eq!(finding.ecosystem, Ecosystem::Unspecified);
        assert_eq!(finding.severity, Severity::Undefined);
    }

    #[tokio::test]
    async fn owners_require_elevated_permission_and_tracked_repos() {
        let client = ScriptedClient::new(vec![
            Ok(repos_page(vec![], page_info("", false))),
            Ok(teams_page(
                vec![team(
                    "improbability",
                    vec![
                        team_edge("admin-repo", "ADMIN", false, false, &[]),
                        team_edge("maintain-repo", "MAINTAIN", false, false, &["rust"]),
                        team_edge("write-repo", "WRITE", false, false, &[]),
                        team_edge("forked", "ADMIN", true, false, &[]),
                        team_edge("archived", "ADMIN", false, true, &[]),
                        team_edge("opted-out", "ADMIN", false, false, &["Disable-VulnBot-please"]),
                    ],
                    page_info("", false),
                )],
                page_info("", false),
            )),
        ]);
        let projects = ProjectCollection::new();
        source(&client, vec![team_config("improbability")])
            .collect_findings(&projects)
            .await
            .unwrap();

        let mut names: Vec<String> = projects.projects().iter().map(|p| p.name().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["admin_repo", "maintain_repo", "write_repo"]);
        assert!(projects.get_project("admin-repo").owners().contains(&team_config("improbability")));
        assert!(projects.get_project("maintain-repo").owners().contains(&team_config("improbability")));
        assert!(projects.get_project("write-repo").owners().is_empty());
    }

    #[tokio::test]
    async fn untracked_repo_keeps_findings_without_owners() {
        let client = ScriptedClient::new(vec![
            Ok(repos_page(
                vec![repo("legacy", vec![alert("CVE-1", "GO", "HIGH", "towel")], page_info("", false))],
                page_info("", false),
            )),
            Ok(teams_page(
                vec![team("improbability", vec![team_edge("legacy", "ADMIN", false, true, &[])], page_info("", false))],
                page_info("", false),
            )),
        ]);
        let projects = ProjectCollection::new();
        source(&client, vec![team_config("improbability")])
            .collect_findings(&projects)
            .await
            .unwrap();
        let legacy = projects.get_project("legacy");
        assert_eq!(legacy.finding_count(), 1);
        assert!(legacy.owners().is_empty());
    }

    #[tokio::test]
    async fn unconfigured_teams_are_skipped() {
        let client = ScriptedClient::new(vec![
            Ok(repos_page(vec![], page_info("", false))),
            Ok(teams_page(
                vec![
                    team("vogons", vec![team_edge("poetry", "ADMIN", false, false, &[])], page_info("v1", true)),
                    team("towels", vec![team_edge("towel", "ADMIN", false, false, &[])], page_info("", false)),
                ],
                page_info("", false),
            )),
        ]);
        let projects = ProjectCollection::new();
        source(&client, vec![team_config("towels")])
            .collect_findings(&projects)
            .await
            .unwrap();

        assert_eq!(projects.len(), 1);
        assert_eq!(projects.get_project("towel").owners().len(), 1);
        // The unconfigured team's extra repository page is never requested.
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn team_and_team_repository_pages_are_walked() {
        let client = ScriptedClient::new(vec![
            Ok(repos_page(vec![], page_info("", false))),
            Ok(teams_page(
                vec![team("towels", vec![team_edge("towel-1", "ADMIN", false, false, &[])], page_info("tr1", true))],
                page_info("t1", true),
            )),
            Ok(json!({ "organization": {
                "team": team("towels", vec![team_edge("towel-2", "MAINTAIN", false, false, &[])], page_info("tr2", false))
            }})),
            Ok(teams_page(
                vec![team("improbability", vec![team_edge("drive", "ADMIN", false, false, &[])], page_info("", false))],
                page_info("t2", false),
            )),
        ]);
        let projects = ProjectCollection::new();
        source(&client, vec![team_config("towels"), team_config("improbability")])
            .collect_findings(&projects)
            .await
            .unwrap();

        let requests = client.requests();
        assert_eq!(requests[1].1["teamCursor"], Value::Null);
        assert_eq!(requests[2].0, TEAM_REPOSITORIES_QUERY);
        assert_eq!(requests[2].1["teamSlug"], "towels");
        assert_eq!(requests[2].1["repoCursor"], "tr1");
        assert_eq!(requests[3].1["teamCursor"], "t1");
        assert_eq!(requests.len(), 4);

        assert_eq!(projects.get_project("towel-2").owners().len(), 1);
        assert!(projects.get_project("drive").owners().contains(&team_config("improbability")));
    }

    #[tokio::test]
    async fn failed_page_aborts_but_keeps_partial_data() {
        let client = ScriptedClient::new(vec![
            Ok(repos_page(
                vec![repo("zaphod", vec![alert("CVE-1", "GO", "HIGH", "towel")], page_info("", false))],
                page_info("r1", true),
            )),
            Err(anyhow!("secondary rate limit")),
        ]);
        let projects = ProjectCollection::new();
        let err = source(&client, vec![]).collect_findings(&projects).await.unwrap_err();

        assert!(format!("{err:#}").contains("secondary rate limit"));
        assert_eq!(projects.get_project("zaphod").finding_count(), 1);
        // Ownership is never queried after the repository walk fails.
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn malformed_response_is_an_error() {
        let client = ScriptedClient::new(vec![Ok(json!({ "organization": null }))]);
        let projects = ProjectCollection::new();
        let err = source(&client, vec![]).collect_findings(&projects).await.unwrap_err();
        assert!(format!("{err:#}").contains("unexpected GraphQL response shape"));
    }

    #[test]
    fn label_mappings() {
        assert_eq!(ecosystem_from_github("RUBYGEMS"), Ecosystem::Ruby);
        assert_eq!(ecosystem_from_github("NUGET"), Ecosystem::CSharp);
        assert_eq!(severity_from_github("MODERATE"), Severity::Moderate);
        assert_eq!(severity_from_github(""), Severity::Undefined);
    }
}
