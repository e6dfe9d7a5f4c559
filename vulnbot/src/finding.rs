use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

/// The scheme an identifier belongs to, e.g. `CVE` or `GHSA`.
///
/// Sources may report kinds beyond the well-known constants; any label is
/// accepted and compared verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct IdentifierKind(Cow<'static, str>);

impl IdentifierKind {
    pub const CVE: IdentifierKind = IdentifierKind(Cow::Borrowed("CVE"));
    pub const GHSA: IdentifierKind = IdentifierKind(Cow::Borrowed("GHSA"));

    pub fn new(kind: impl Into<String>) -> Self {
        Self(Cow::Owned(kind.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type Identifiers = BTreeMap<IdentifierKind, String>;

/// Severity tiers, declared most severe first so that `Ord` sorts
/// `Critical` before `Undefined`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub enum Severity {
    Critical,
    High,
    Moderate,
    Low,
    Info,
    #[default]
    Undefined,
}

impl Severity {
    /// Fixed order used both for reporting and for picking the highest tier.
    pub const REPORT_ORDER: [Severity; 6] = [
        Severity::Critical,
        Severity::High,
        Severity::Moderate,
        Severity::Low,
        Severity::Info,
        Severity::Undefined,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Moderate => "Moderate",
            Severity::Low => "Low",
            Severity::Info => "Info",
            Severity::Undefined => "Undefined",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Apt,
    CSharp,
    Dart,
    Erlang,
    /// GitHub Actions
    Gha,
    Go,
    Java,
    /// Includes TypeScript
    Js,
    Php,
    Python,
    Rpm,
    Ruby,
    Rust,
    Swift,
    #[default]
    Unspecified,
}

impl Ecosystem {
    pub fn label(&self) -> &'static str {
        match self {
            Ecosystem::Apt => "apt",
            Ecosystem::CSharp => "csharp",
            Ecosystem::Dart => "dart",
            Ecosystem::Erlang => "erlang",
            Ecosystem::Gha => "gha",
            Ecosystem::Go => "go",
            Ecosystem::Java => "java",
            Ecosystem::Js => "js",
            Ecosystem::Php => "php",
            Ecosystem::Python => "python",
            Ecosystem::Rpm => "rpm",
            Ecosystem::Ruby => "ruby",
            Ecosystem::Rust => "rust",
            Ecosystem::Swift => "swift",
            Ecosystem::Unspecified => "unspecified",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The mutable fields of a finding.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FindingData {
    pub identifiers: Identifiers,
    pub ecosystem: Ecosystem,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
}

impl FindingData {
    /// Sets the description unless an earlier writer already did.
    pub fn fill_description(&mut self, description: &str) {
        fill_if_empty(&mut self.description, description);
    }

    /// Sets the package name unless an earlier writer already did.
    pub fn fill_package_name(&mut self, package_name: &str) {
        fill_if_empty(&mut self.package_name, package_name);
    }

    // Last writer wins, even when the incoming value is Undefined.
    pub fn set_severity(&mut self, severity: Severity) {
        self.severity = severity;
    }

    pub fn set_ecosystem(&mut self, ecosystem: Ecosystem) {
        self.ecosystem = ecosystem;
    }
}

fn fill_if_empty(slot: &mut Option<String>, value: &str) {
    let empty = slot.as_deref().is_none_or(str::is_empty);
    if empty && !value.is_empty() {
        *slot = Some(value.to_string());
    }
}

/// A single vulnerability record, shared between sources through its
/// [`Project`](crate::project::Project).
#[derive(Debug)]
pub struct Finding {
    data: Mutex<FindingData>,
}

impl Finding {
    pub(crate) fn new(identifiers: Identifiers) -> Self {
        Self {
            data: Mutex::new(FindingData {
                identifiers,
                ..FindingData::default()
            }),
        }
    }

    /// Runs `f` as one critical section over this finding's fields.
    pub fn update<R>(&self, f: impl FnOnce(&mut FindingData) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn snapshot(&self) -> FindingData {
        self.lock().clone()
    }

    pub(crate) fn matches(&self, identifiers: &Identifiers) -> bool {
        let data = self.lock();
        identifiers
            .iter()
            .any(|(kind, value)| data.identifiers.get(kind) == Some(value))
    }

    pub(crate) fn merge_identifiers(&self, identifiers: Identifiers) {
        self.lock().identifiers.extend(identifiers);
    }

    fn lock(&self) -> MutexGuard<'_, FindingData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
