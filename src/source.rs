use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BulkChange, BulkChangeSummary, CurrentUser, Issue, IssuesResponse, Transition};

/// Request parameters for an issue search, in request order
pub type SearchParams = Vec<(String, String)>;

/// Issue tracker backend the views read from and write to.
#[async_trait]
pub trait IssueSource: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Web page for an issue, optionally scoped to a component.
    fn issue_url(&self, issue: &Issue, component: Option<&str>) -> String;

    async fn current_user(&self) -> Result<CurrentUser>;
    async fn search_issues(&self, params: &[(String, String)]) -> Result<IssuesResponse>;

    /// Set or clear the assignee. Returns the updated issue.
    async fn assign(&self, issue: &str, assignee: Option<&str>) -> Result<Issue>;
    async fn do_transition(&self, issue: &str, transition: Transition) -> Result<Issue>;
    async fn bulk_change(&self, issues: &[String], change: &BulkChange)
        -> Result<BulkChangeSummary>;
}
