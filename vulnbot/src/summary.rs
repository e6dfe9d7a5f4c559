use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::TeamConfig;
use crate::finding::{Ecosystem, Severity};
use crate::project::ProjectCollection;

/// Reserved name of the per-team aggregate entry.
pub const SUMMARY_KEY: &str = "summary";

/// Severity tallies start with zero counts for the primary tiers so reports
/// always show them. Info and Undefined only appear when present.
pub fn new_severity_map() -> BTreeMap<Severity, usize> {
    BTreeMap::from([
        (Severity::Critical, 0),
        (Severity::High, 0),
        (Severity::Moderate, 0),
        (Severity::Low, 0),
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindingSummary {
    pub total_count: usize,
    pub affected_repos: usize,
    pub by_ecosystem: BTreeMap<Ecosystem, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
}

impl Default for FindingSummary {
    fn default() -> Self {
        Self {
            total_count: 0,
            affected_repos: 0,
            by_ecosystem: BTreeMap::new(),
            by_severity: new_severity_map(),
        }
    }
}

impl FindingSummary {
    /// Most severe tier with at least one finding, or `Undefined`.
    pub fn highest_criticality(&self) -> Severity {
        Severity::REPORT_ORDER
            .into_iter()
            .find(|sev| self.by_severity.get(sev).is_some_and(|&count| count > 0))
            .unwrap_or(Severity::Undefined)
    }

    fn record(&mut self, ecosystem: Ecosystem, severity: Severity) {
        *self.by_ecosystem.entry(ecosystem).or_default() += 1;
        *self.by_severity.entry(severity).or_default() += 1;
    }

    fn absorb(&mut self, other: &FindingSummary) {
        self.total_count += other.total_count;
        self.affected_repos += other.affected_repos;
        for (ecosystem, count) in &other.by_ecosystem {
            *self.by_ecosystem.entry(*ecosystem).or_default() += count;
        }
        for (severity, count) in &other.by_severity {
            *self.by_severity.entry(*severity).or_default() += count;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectFindingSummary {
    pub name: String,
    #[serde(flatten)]
    pub summary: FindingSummary,
    /// Set only on the synthetic per-team entry, so a real project that
    /// happens to be named [`SUMMARY_KEY`] is still listed as a project.
    #[serde(skip)]
    aggregate: bool,
}

impl ProjectFindingSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary: FindingSummary::default(),
            aggregate: false,
        }
    }

    fn team_aggregate() -> Self {
        Self {
            aggregate: true,
            ..Self::new(SUMMARY_KEY)
        }
    }

    pub fn highest_criticality(&self) -> Severity {
        self.summary.highest_criticality()
    }

    pub fn is_team_summary(&self) -> bool {
        self.aggregate
    }
}

/// Tally findings across the whole collection and for each project, in
/// collection order.
pub fn summarize_findings(projects: &ProjectCollection) -> (FindingSummary, Vec<ProjectFindingSummary>) {
    let mut summary = FindingSummary::default();
    let mut reports = Vec::new();

    for project in projects.projects() {
        let mut report = ProjectFindingSummary::new(project.name());
        let findings = project.findings();
        if !findings.is_empty() {
            summary.affected_repos += 1;
            summary.total_count += findings.len();
            report.summary.affected_repos = 1;
            report.summary.total_count = findings.len();
            for finding in &findings {
                summary.record(finding.ecosystem, finding.severity);
                report.summary.record(finding.ecosystem, finding.severity);
            }
        }
        reports.push(report);
    }

    (summary, reports)
}

/// A team's project summaries followed by one aggregate entry named
/// [`SUMMARY_KEY`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct TeamProjectCollection(pub Vec<ProjectFindingSummary>);

impl TeamProjectCollection {
    /// Order projects by highest criticality (Critical first), then by name.
    /// The aggregate entry stays last.
    pub fn sort(&mut self) {
        self.0.sort_by(|a, b| {
            a.is_team_summary()
                .cmp(&b.is_team_summary())
                .then_with(|| a.highest_criticality().cmp(&b.highest_criticality()))
                .then_with(|| a.name.cmp(&b.name))
        });
    }

    pub fn projects(&self) -> impl Iterator<Item = &ProjectFindingSummary> {
        self.0.iter().filter(|p| !p.is_team_summary())
    }

    pub fn summary(&self) -> Option<&ProjectFindingSummary> {
        self.0.iter().find(|p| p.is_team_summary())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Map each owning team to the summaries of the projects it owns, plus an
/// aggregate entry. Teams owning nothing do not appear.
pub fn group_team_findings(
    projects: &ProjectCollection,
    summaries: &[ProjectFindingSummary],
) -> BTreeMap<TeamConfig, TeamProjectCollection> {
    let mut teams: BTreeMap<TeamConfig, TeamProjectCollection> = BTreeMap::new();

    for project in projects.projects() {
        let summary = summaries
            .iter()
            .find(|s| s.name == project.name())
            .cloned()
            .unwrap_or_else(|| ProjectFindingSummary::new(project.name()));
        for owner in project.owners() {
            teams.entry(owner).or_default().0.push(summary.clone());
        }
    }

    for collection in teams.values_mut() {
        let mut aggregate = ProjectFindingSummary::team_aggregate();
        for project in &collection.0 {
            aggregate.summary.absorb(&project.summary);
        }
        collection.0.push(aggregate);
    }

    teams
}
