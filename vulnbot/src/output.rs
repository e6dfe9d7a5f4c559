use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::TeamConfig;
use crate::finding::Severity;
use crate::project::ProjectCollection;
use crate::summary::{
    FindingSummary, ProjectFindingSummary, TeamProjectCollection, group_team_findings,
    summarize_findings,
};

#[derive(Debug, Serialize)]
pub struct TeamReport {
    #[serde(flatten)]
    pub team: TeamConfig,
    pub projects: TeamProjectCollection,
}

/// Everything the reporting layer needs from one completed run.
#[derive(Debug, Serialize)]
pub struct Report {
    /// Channel that receives the organization-wide report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_channel: Option<String>,
    pub total_repositories: usize,
    pub summary: FindingSummary,
    pub projects: Vec<ProjectFindingSummary>,
    pub teams: Vec<TeamReport>,
    pub unowned: Vec<String>,
}

impl Report {
    pub fn build(projects: &ProjectCollection) -> Self {
        let (summary, reports) = summarize_findings(projects);
        let teams: BTreeMap<TeamConfig, TeamProjectCollection> = group_team_findings(projects, &reports);
        let teams = teams
            .into_iter()
            .map(|(team, mut collection)| {
                collection.sort();
                TeamReport {
                    team,
                    projects: collection,
                }
            })
            .collect();
        let unowned = projects
            .projects()
            .iter()
            .filter(|p| p.owners().is_empty())
            .map(|p| p.name().to_string())
            .collect();

        Self {
            summary_channel: None,
            total_repositories: projects.len(),
            summary,
            projects: reports,
            teams,
            unowned,
        }
    }

    pub fn with_summary_channel(mut self, channel: Option<String>) -> Self {
        self.summary_channel = channel.filter(|c| !c.is_empty());
        self
    }
}

pub trait OutputFormatter {
    fn write_report(&self, report: &Report, writer: &mut dyn std::io::Write) -> std::io::Result<()>;
}

fn write_severities(writer: &mut dyn std::io::Write, summary: &FindingSummary) -> std::io::Result<()> {
    for severity in Severity::REPORT_ORDER {
        if let Some(count) = summary.by_severity.get(&severity) {
            writeln!(writer, "  {severity}: {count}")?;
        }
    }
    Ok(())
}

pub struct TextOutput;

impl OutputFormatter for TextOutput {
    fn write_report(&self, report: &Report, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        let summary = &report.summary;
        if let Some(channel) = &report.summary_channel {
            writeln!(writer, "Summary channel: {channel}")?;
        }
        writeln!(writer, "Total repositories: {}", report.total_repositories)?;
        writeln!(writer, "Total vulnerabilities: {}", summary.total_count)?;
        writeln!(writer, "Affected repositories: {}", summary.affected_repos)?;

        writeln!(writer, "Breakdown by Severity")?;
        write_severities(writer, summary)?;

        writeln!(writer, "Breakdown by Ecosystem")?;
        for (ecosystem, count) in &summary.by_ecosystem {
            writeln!(writer, "  {ecosystem}: {count}")?;
        }

        for team in &report.teams {
            writeln!(writer)?;
            writeln!(writer, "{}", team.team.name)?;
            if let Some(aggregate) = team.projects.summary() {
                writeln!(writer, "  Total vulnerabilities: {}", aggregate.summary.total_count)?;
            }
            for project in team.projects.projects() {
                let counts: Vec<String> = Severity::REPORT_ORDER
                    .iter()
                    .filter_map(|sev| project.summary.by_severity.get(sev).map(|c| format!("{sev}: {c}")))
                    .collect();
                writeln!(writer, "  {} -- {}", project.name, counts.join(", "))?;
            }
        }

        if !report.unowned.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Unowned projects")?;
            for name in &report.unowned {
                writeln!(writer, "  {name}")?;
            }
        }
        Ok(())
    }
}

pub struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn write_report(&self, report: &Report, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, report)?;
        writeln!(writer)?;
        Ok(())
    }
}

pub fn formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonOutput)
    } else {
        Box::new(TextOutput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{Ecosystem, IdentifierKind, Identifiers};

    fn sample() -> ProjectCollection {
        let projects = ProjectCollection::new();
        let add = |project: &str, cve: &str, severity: Severity| {
            projects
                .get_project(project)
                .get_finding(Identifiers::from([(IdentifierKind::CVE, cve.to_string())]))
                .update(|f| {
                    f.set_severity(severity);
                    f.set_ecosystem(Ecosystem::Go);
                });
        };
        add("zaphod", "CVE-1", Severity::Moderate);
        add("marvin", "CVE-2", Severity::Critical);
        projects.get_project("arthur");

        let team = TeamConfig {
            name: "Heart of Gold".into(),
            github_slug: "heart-of-gold".into(),
            slack_channel: "#hog".into(),
        };
        projects.get_project("zaphod").add_owner(team.clone());
        projects.get_project("marvin").add_owner(team);
        projects
    }

    fn render(formatter: &dyn OutputFormatter, report: &Report) -> String {
        let mut buf = Vec::new();
        formatter.write_report(report, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn report_sorts_team_projects_and_lists_unowned() {
        let report = Report::build(&sample());
        assert_eq!(report.total_repositories, 3);
        assert_eq!(report.teams.len(), 1);
        let names: Vec<&str> = report.teams[0].projects.projects().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["marvin", "zaphod"]);
        assert_eq!(report.unowned, vec!["arthur"]);
    }

    #[test]
    fn text_output_contains_totals_and_teams() {
        let output = render(&TextOutput, &Report::build(&sample()));
        assert!(output.contains("Total repositories: 3"));
        assert!(output.contains("Total vulnerabilities: 2"));
        assert!(output.contains("Affected repositories: 2"));
        assert!(output.contains("  Low: 0"));
        assert!(output.contains("  go: 2"));
        assert!(output.contains("Heart of Gold"));
        assert!(output.contains("  marvin -- Critical: 1"));
        assert!(output.contains("Unowned projects\n  arthur"));
        assert!(!output.contains("Info"));
        assert!(!output.contains("Summary channel"));
    }

    #[test]
    fn summary_channel_heads_the_report() {
        let report = Report::build(&sample()).with_summary_channel(Some("#security".into()));
        let output = render(&TextOutput, &report);
        assert!(output.starts_with("Summary channel: #security\nTotal repositories: 3"));

        let parsed: serde_json::Value = serde_json::from_str(&render(&JsonOutput, &report)).unwrap();
        assert_eq!(parsed["summary_channel"], "#security");

        let blank = Report::build(&sample()).with_summary_channel(Some(String::new()));
        assert!(blank.summary_channel.is_none());
    }

    #[test]
    fn json_output_is_valid() {
        let output = render(&JsonOutput, &Report::build(&sample()));
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["summary"]["total_count"], 2);
        assert_eq!(parsed["summary"]["by_severity"]["Critical"], 1);
        assert_eq!(parsed["summary"]["by_ecosystem"]["go"], 2);
        assert_eq!(parsed["teams"][0]["github_slug"], "heart-of-gold");
        let team_projects = parsed["teams"][0]["projects"].as_array().unwrap();
        assert_eq!(team_projects.last().unwrap()["name"], "summary");
        assert_eq!(parsed["unowned"][0], "arthur");
        assert!(parsed.get("summary_channel").is_none());
    }
}
