use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use regex::Regex;
use tracing::debug;

use crate::config::TeamConfig;
use crate::finding::{Finding, FindingData, Identifiers};

static UNACCEPTABLE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N} \-_]+").expect("static regex is valid"));

/// Normalize a project name for lookup and storage.
///
/// Lower-cases, strips everything except letters, digits, spaces, hyphens and
/// underscores, trims, then turns spaces and hyphens into underscores.
/// `"Heart-of-Gold: Improbability Drive!"` becomes
/// `"heart_of_gold_improbability_drive"`.
pub fn normalize_project_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = UNACCEPTABLE_CHARS.replace_all(&lowered, "");
    stripped.trim().replace([' ', '-'], "_")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A repository or image owning findings, links, and a set of owning teams.
#[derive(Debug)]
pub struct Project {
    name: String,
    findings: Mutex<Vec<Arc<Finding>>>,
    links: Mutex<BTreeMap<String, String>>,
    owners: Mutex<BTreeSet<TeamConfig>>,
}

impl Project {
    fn new(name: String) -> Self {
        Self {
            name,
            findings: Mutex::new(Vec::new()),
            links: Mutex::new(BTreeMap::new()),
            owners: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the finding sharing any identifier with `identifiers`, merging
    /// the new identifiers into it, or records a new finding.
    ///
    /// `identifiers` must not be empty; such a finding can never be matched.
    pub fn get_finding(&self, identifiers: Identifiers) -> Arc<Finding> {
        debug_assert!(!identifiers.is_empty(), "findings need at least one identifier");

        let mut findings = lock(&self.findings);
        if let Some(existing) = findings.iter().find(|f| f.matches(&identifiers)) {
            existing.merge_identifiers(identifiers);
            return existing.clone();
        }

        debug!(project = %self.name, ?identifiers, "recording new finding");
        let finding = Arc::new(Finding::new(identifiers));
        findings.push(finding.clone());
        finding
    }

    pub fn set_link(&self, label: impl Into<String>, url: impl Into<String>) {
        lock(&self.links).insert(label.into(), url.into());
    }

    pub fn add_owner(&self, team: TeamConfig) {
        lock(&self.owners).insert(team);
    }

    pub fn finding_count(&self) -> usize {
        lock(&self.findings).len()
    }

    /// Copies of every finding, in discovery order.
    pub fn findings(&self) -> Vec<FindingData> {
        lock(&self.findings).iter().map(|f| f.snapshot()).collect()
    }

    pub fn links(&self) -> BTreeMap<String, String> {
        lock(&self.links).clone()
    }

    pub fn owners(&self) -> BTreeSet<TeamConfig> {
        lock(&self.owners).clone()
    }
}

/// Registry of every project seen during a run.
#[derive(Debug, Default)]
pub struct ProjectCollection {
    projects: Mutex<Vec<Arc<Project>>>,
}

impl ProjectCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_projects(projects: Vec<Arc<Project>>) -> Self {
        Self {
            projects: Mutex::new(projects),
        }
    }

    /// Returns the project whose normalized name matches `name`, creating it
    /// if no source has referenced it yet.
    pub fn get_project(&self, name: &str) -> Arc<Project> {
        let normalized = normalize_project_name(name);
        let mut projects = lock(&self.projects);
        if let Some(existing) = projects.iter().find(|p| p.name == normalized) {
            return existing.clone();
        }

        debug!(project = %normalized, "recording new project");
        let project = Arc::new(Project::new(normalized));
        projects.push(project.clone());
        project
    }

    /// Projects in first-seen order.
    pub fn projects(&self) -> Vec<Arc<Project>> {
        lock(&self.projects).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.projects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
