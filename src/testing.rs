//! In-memory issue source for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, SnagError};
use crate::source::IssueSource;
use crate::types::{
    BulkChange, BulkChangeSummary, CurrentUser, FacetValue, Facets, Issue, IssueType,
    IssuesResponse, Paging, References, Severity, Transition,
};

pub fn issue(key: &str, component: &str) -> Issue {
    Issue {
        key: key.to_string(),
        rule: "java:S100".to_string(),
        severity: Severity::Major,
        issue_type: IssueType::CodeSmell,
        component: component.to_string(),
        project: "org:app".to_string(),
        line: Some(1),
        message: format!("issue {}", key),
        status: "OPEN".to_string(),
        resolution: None,
        assignee: None,
        author: None,
        tags: Vec::new(),
        effort: None,
        created_at: None,
        updated_at: None,
    }
}

#[derive(Debug, Default)]
pub struct FakeSource {
    issues: Mutex<Vec<Issue>>,
    requests: Mutex<Vec<Vec<(String, String)>>>,
    bulk_changes: Mutex<Vec<(Vec<String>, BulkChange)>>,
    failure: Mutex<Option<String>>,
}

impl FakeSource {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self {
            issues: Mutex::new(issues),
            ..Self::default()
        }
    }

    pub fn set_issues(&self, issues: Vec<Issue>) {
        *self.issues.lock().unwrap() = issues;
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    /// Page numbers of every explicit page request, in order.
    pub fn requested_pages(&self) -> Vec<u32> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|params| param(params, "p").and_then(|p| p.parse().ok()))
            .collect()
    }

    pub fn requests(&self) -> Vec<Vec<(String, String)>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn bulk_changes(&self) -> Vec<(Vec<String>, BulkChange)> {
        self.bulk_changes.lock().unwrap().clone()
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(SnagError::Api(message)),
            None => Ok(()),
        }
    }

    fn update(&self, key: &str, change: impl FnOnce(&mut Issue)) -> Result<Issue> {
        let mut issues = self.issues.lock().unwrap();
        let issue = issues
            .iter_mut()
            .find(|i| i.key == key)
            .ok_or_else(|| SnagError::Api(format!("unknown issue {}", key)))?;
        change(issue);
        Ok(issue.clone())
    }
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

#[async_trait]
impl IssueSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    fn issue_url(&self, issue: &Issue, _component: Option<&str>) -> String {
        format!("https://sonar.test/issues?open={}", issue.key)
    }

    async fn current_user(&self) -> Result<CurrentUser> {
        Ok(CurrentUser {
            is_logged_in: true,
            login: Some("me".to_string()),
            name: Some("Me".to_string()),
        })
    }

    async fn search_issues(&self, params: &[(String, String)]) -> Result<IssuesResponse> {
        self.requests.lock().unwrap().push(params.to_vec());
        self.check_failure()?;

        let page: u32 = param(params, "p").and_then(|p| p.parse().ok()).unwrap_or(1);
        let page_size: u32 = param(params, "ps")
            .and_then(|p| p.parse().ok())
            .unwrap_or(100);

        let issues = self.issues.lock().unwrap();
        let start = ((page - 1) * page_size) as usize;
        let page_issues: Vec<Issue> = issues
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect();

        let mut facets = Facets::new();
        if param(params, "facets").is_some() {
            facets.insert(
                "severities".to_string(),
                vec![FacetValue {
                    val: "MAJOR".to_string(),
                    count: issues.len() as u32,
                }],
            );
            facets.insert(
                "createdAt".to_string(),
                vec![
                    FacetValue {
                        val: "2024-01-01T00:00:00+0000".to_string(),
                        count: issues.len() as u32,
                    },
                    FacetValue {
                        val: "2024-02-01T00:00:00+0000".to_string(),
                        count: 0,
                    },
                ],
            );
        }

        Ok(IssuesResponse {
            issues: page_issues,
            paging: Some(Paging {
                page_index: page,
                page_size,
                total: issues.len() as u32,
            }),
            facets,
            references: References::default(),
        })
    }

    async fn assign(&self, issue: &str, assignee: Option<&str>) -> Result<Issue> {
        self.check_failure()?;
        self.update(issue, |i| i.assignee = assignee.map(str::to_string))
    }

    async fn do_transition(&self, issue: &str, transition: Transition) -> Result<Issue> {
        self.check_failure()?;
        self.update(issue, |i| match transition {
            Transition::Confirm => i.status = "CONFIRMED".to_string(),
            Transition::Unconfirm | Transition::Reopen => i.status = "REOPENED".to_string(),
            _ => {
                i.status = "RESOLVED".to_string();
                i.resolution = Some(transition.as_api_str().to_uppercase());
            }
        })
    }

    async fn bulk_change(
        &self,
        issues: &[String],
        change: &BulkChange,
    ) -> Result<BulkChangeSummary> {
        self.check_failure()?;
        self.bulk_changes
            .lock()
            .unwrap()
            .push((issues.to_vec(), change.clone()));
        let count = issues.len() as u32;
        Ok(BulkChangeSummary {
            total: count,
            success: count,
            ignored: 0,
            failures: 0,
        })
    }
}
