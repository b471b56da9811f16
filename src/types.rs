use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Blocker,
    Critical,
    Major,
    Minor,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Blocker,
        Severity::Critical,
        Severity::Major,
        Severity::Minor,
        Severity::Info,
    ];

    pub fn as_api_str(&self) -> &'static str {
        match self {
            Severity::Blocker => "BLOCKER",
            Severity::Critical => "CRITICAL",
            Severity::Major => "MAJOR",
            Severity::Minor => "MINOR",
            Severity::Info => "INFO",
        }
    }

    pub fn from_api(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|sev| sev.as_api_str() == s)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Blocker => write!(f, "Blocker"),
            Severity::Critical => write!(f, "Critical"),
            Severity::Major => write!(f, "Major"),
            Severity::Minor => write!(f, "Minor"),
            Severity::Info => write!(f, "Info"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueType {
    Bug,
    Vulnerability,
    CodeSmell,
}

impl IssueType {
    pub fn from_api(s: &str) -> Self {
        match s {
            "BUG" => IssueType::Bug,
            "VULNERABILITY" => IssueType::Vulnerability,
            _ => IssueType::CodeSmell,
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueType::Bug => write!(f, "Bug"),
            IssueType::Vulnerability => write!(f, "Vulnerability"),
            IssueType::CodeSmell => write!(f, "Code Smell"),
        }
    }
}

/// Workflow transitions accepted by `api/issues/do_transition`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Confirm,
    Unconfirm,
    Reopen,
    Resolve,
    FalsePositive,
    WontFix,
}

impl Transition {
    pub const ALL: [Transition; 6] = [
        Transition::Confirm,
        Transition::Unconfirm,
        Transition::Reopen,
        Transition::Resolve,
        Transition::FalsePositive,
        Transition::WontFix,
    ];

    pub fn as_api_str(&self) -> &'static str {
        match self {
            Transition::Confirm => "confirm",
            Transition::Unconfirm => "unconfirm",
            Transition::Reopen => "reopen",
            Transition::Resolve => "resolve",
            Transition::FalsePositive => "falsepositive",
            Transition::WontFix => "wontfix",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Confirm => write!(f, "Confirm"),
            Transition::Unconfirm => write!(f, "Unconfirm"),
            Transition::Reopen => write!(f, "Reopen"),
            Transition::Resolve => write!(f, "Resolve as fixed"),
            Transition::FalsePositive => write!(f, "Resolve as false positive"),
            Transition::WontFix => write!(f, "Resolve as won't fix"),
        }
    }
}

/// One change applied to a batch of issues
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkChange {
    AssignTo(String),
    Unassign,
    Transition(Transition),
    SetSeverity(Severity),
}

impl fmt::Display for BulkChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkChange::AssignTo(login) => write!(f, "Assign to {}", login),
            BulkChange::Unassign => write!(f, "Unassign"),
            BulkChange::Transition(t) => write!(f, "{}", t),
            BulkChange::SetSeverity(s) => write!(f, "Set severity: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct BulkChangeSummary {
    pub total: u32,
    pub success: u32,
    pub ignored: u32,
    pub failures: u32,
}

/// SonarQube issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    pub rule: String,
    pub severity: Severity,
    pub issue_type: IssueType,
    pub component: String,
    pub project: String,
    pub line: Option<u32>,
    pub message: String,
    pub status: String,
    pub resolution: Option<String>,
    pub assignee: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub effort: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Window over a server-side result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    pub page_index: u32,
    pub page_size: u32,
    pub total: u32,
}

impl Paging {
    /// True once every issue the server counted is covered by the fetched pages.
    pub fn is_exhausted(&self) -> bool {
        u64::from(self.total) <= u64::from(self.page_index) * u64::from(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetValue {
    pub val: String,
    pub count: u32,
}

/// Facet property -> value counts, as returned by the server
pub type Facets = BTreeMap<String, Vec<FacetValue>>;

#[derive(Debug, Clone)]
pub struct ReferencedComponent {
    pub key: String,
    pub name: String,
    pub long_name: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReferencedUser {
    pub name: String,
    pub active: bool,
}

/// Denormalized lookup tables sent alongside a search response
#[derive(Debug, Clone, Default)]
pub struct References {
    /// Keyed by component uuid
    pub components: HashMap<String, ReferencedComponent>,
    /// Language key -> display name
    pub languages: HashMap<String, String>,
    /// Rule key -> rule name
    pub rules: HashMap<String, String>,
    /// Keyed by login
    pub users: HashMap<String, ReferencedUser>,
}

impl References {
    pub fn component_by_key(&self, key: &str) -> Option<&ReferencedComponent> {
        self.components.values().find(|c| c.key == key)
    }

    /// Human label for a facet value, falling back to the raw value.
    pub fn facet_label(&self, property: &str, val: &str) -> String {
        let label = match property {
            "languages" => self.languages.get(val).cloned(),
            "rules" => self.rules.get(val).cloned(),
            "assignees" | "authors" => self.users.get(val).map(|u| {
                if u.active {
                    u.name.clone()
                } else {
                    format!("{} (deactivated)", u.name)
                }
            }),
            "fileUuids" | "moduleUuids" | "projectUuids" => self
                .components
                .get(val)
                .map(|c| c.long_name.clone().unwrap_or_else(|| c.name.clone())),
            _ => None,
        };
        label.unwrap_or_else(|| val.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct IssuesResponse {
    pub issues: Vec<Issue>,
    pub paging: Option<Paging>,
    pub facets: Facets,
    pub references: References,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentUser {
    pub is_logged_in: bool,
    pub login: Option<String>,
    pub name: Option<String>,
}
