use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use crate::error::{Result, SnagError};
use crate::source::IssueSource;
use crate::types::{
    BulkChange, BulkChangeSummary, CurrentUser, FacetValue, Facets, Issue, IssueType,
    IssuesResponse, Paging, ReferencedComponent, ReferencedUser, References, Severity,
    Transition,
};

pub struct Sonar {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for Sonar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sonar")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl Sonar {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("snag/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    /// Tokens go in the basic-auth username with an empty password.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.basic_auth(token, Some("")),
            None => request,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.authorize(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let message = format!("SonarQube {}: {}", status, error_message(&text));
            return Err(match status.as_u16() {
                401 | 403 => SnagError::Auth(message),
                _ => SnagError::Api(message),
            });
        }

        response
            .json()
            .await
            .map_err(|e| SnagError::Api(e.to_string()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T> {
        let url = self.api_url(path);
        tracing::debug!(%url, ?params, "GET");
        self.send(self.client.get(&url).query(params)).await
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T> {
        let url = self.api_url(path);
        tracing::debug!(%url, "POST");
        self.send(self.client.post(&url).form(form)).await
    }
}

// SonarQube web service response types

#[derive(Deserialize)]
struct SqErrors {
    #[serde(default)]
    errors: Vec<SqErrorMessage>,
}

#[derive(Deserialize)]
struct SqErrorMessage {
    msg: String,
}

#[derive(Deserialize)]
struct SqSearchResponse {
    #[serde(default)]
    issues: Vec<SqIssue>,
    paging: Option<Paging>,
    #[serde(default)]
    facets: Vec<SqFacet>,
    #[serde(default)]
    components: Vec<SqComponent>,
    #[serde(default)]
    languages: Vec<SqLanguage>,
    #[serde(default)]
    rules: Vec<SqRule>,
    #[serde(default)]
    users: Vec<SqUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SqIssue {
    key: String,
    #[serde(default)]
    rule: String,
    severity: Option<String>,
    #[serde(default)]
    component: String,
    project: Option<String>,
    line: Option<u32>,
    message: Option<String>,
    status: Option<String>,
    resolution: Option<String>,
    assignee: Option<String>,
    author: Option<String>,
    #[serde(rename = "type")]
    issue_type: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    effort: Option<String>,
    creation_date: Option<String>,
    update_date: Option<String>,
}

#[derive(Deserialize)]
struct SqIssueResponse {
    issue: SqIssue,
}

#[derive(Deserialize)]
struct SqFacet {
    property: String,
    #[serde(default)]
    values: Vec<SqFacetValue>,
}

#[derive(Deserialize)]
struct SqFacetValue {
    val: String,
    count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SqComponent {
    key: String,
    uuid: Option<String>,
    name: Option<String>,
    long_name: Option<String>,
    path: Option<String>,
}

#[derive(Deserialize)]
struct SqLanguage {
    key: String,
    name: String,
}

#[derive(Deserialize)]
struct SqRule {
    key: String,
    name: Option<String>,
}

#[derive(Deserialize)]
struct SqUser {
    login: String,
    name: Option<String>,
    active: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SqCurrentUser {
    #[serde(default)]
    is_logged_in: bool,
    login: Option<String>,
    name: Option<String>,
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<SqErrors>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed
            .errors
            .into_iter()
            .map(|e| e.msg)
            .collect::<Vec<_>>()
            .join("; "),
        _ => body.to_string(),
    }
}

/// SonarQube timestamps look like `2017-05-10T10:10:10+0200`.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

fn sq_issue(i: SqIssue) -> Issue {
    Issue {
        severity: i
            .severity
            .as_deref()
            .and_then(Severity::from_api)
            .unwrap_or(Severity::Info),
        issue_type: IssueType::from_api(i.issue_type.as_deref().unwrap_or_default()),
        project: i.project.unwrap_or_default(),
        message: i.message.unwrap_or_default(),
        status: i.status.unwrap_or_else(|| "OPEN".to_string()),
        created_at: i.creation_date.as_deref().and_then(parse_datetime),
        updated_at: i.update_date.as_deref().and_then(parse_datetime),
        key: i.key,
        rule: i.rule,
        component: i.component,
        line: i.line,
        resolution: i.resolution,
        assignee: i.assignee,
        author: i.author,
        tags: i.tags,
        effort: i.effort,
    }
}

fn sq_facets(facets: Vec<SqFacet>) -> Facets {
    facets
        .into_iter()
        .map(|f| {
            let values = f
                .values
                .into_iter()
                .map(|v| FacetValue {
                    val: v.val,
                    count: v.count,
                })
                .collect();
            (f.property, values)
        })
        .collect()
}

fn sq_references(r: &mut SqSearchResponse) -> References {
    References {
        components: r
            .components
            .drain(..)
            .map(|c| {
                let uuid = c.uuid.unwrap_or_else(|| c.key.clone());
                let component = ReferencedComponent {
                    name: c.name.unwrap_or_else(|| c.key.clone()),
                    key: c.key,
                    long_name: c.long_name,
                    path: c.path,
                };
                (uuid, component)
            })
            .collect(),
        languages: r
            .languages
            .drain(..)
            .map(|l| (l.key, l.name))
            .collect(),
        rules: r
            .rules
            .drain(..)
            .map(|rule| {
                let name = rule.name.unwrap_or_else(|| rule.key.clone());
                (rule.key, name)
            })
            .collect(),
        users: r
            .users
            .drain(..)
            .map(|u| {
                let user = ReferencedUser {
                    name: u.name.unwrap_or_else(|| u.login.clone()),
                    active: u.active.unwrap_or(true),
                };
                (u.login, user)
            })
            .collect(),
    }
}

fn sq_search_response(mut r: SqSearchResponse) -> IssuesResponse {
    let references = sq_references(&mut r);
    IssuesResponse {
        issues: r.issues.into_iter().map(sq_issue).collect(),
        paging: r.paging,
        facets: sq_facets(r.facets),
        references,
    }
}

fn bulk_change_form(issues: &[String], change: &BulkChange) -> Vec<(&'static str, String)> {
    let mut form = vec![("issues", issues.join(","))];
    match change {
        BulkChange::AssignTo(login) => form.push(("assign", login.clone())),
        BulkChange::Unassign => form.push(("assign", String::new())),
        BulkChange::Transition(t) => form.push(("do_transition", t.as_api_str().to_string())),
        BulkChange::SetSeverity(s) => form.push(("set_severity", s.as_api_str().to_string())),
    }
    form
}

#[async_trait]
impl IssueSource for Sonar {
    fn name(&self) -> &str {
        "SonarQube"
    }

    fn issue_url(&self, issue: &Issue, component: Option<&str>) -> String {
        match component {
            Some(id) => format!(
                "{}/project/issues?id={}&open={}",
                self.base_url,
                urlencoding::encode(id),
                urlencoding::encode(&issue.key)
            ),
            None => format!(
                "{}/issues?open={}",
                self.base_url,
                urlencoding::encode(&issue.key)
            ),
        }
    }

    async fn current_user(&self) -> Result<CurrentUser> {
        let user: SqCurrentUser = self.get_json("users/current", &[]).await?;
        Ok(CurrentUser {
            is_logged_in: user.is_logged_in,
            login: user.login,
            name: user.name,
        })
    }

    async fn search_issues(&self, params: &[(String, String)]) -> Result<IssuesResponse> {
        let response: SqSearchResponse = self.get_json("issues/search", params).await?;
        Ok(sq_search_response(response))
    }

    async fn assign(&self, issue: &str, assignee: Option<&str>) -> Result<Issue> {
        let form = [
            ("issue", issue.to_string()),
            ("assignee", assignee.unwrap_or_default().to_string()),
        ];
        let response: SqIssueResponse = self.post_form("issues/assign", &form).await?;
        Ok(sq_issue(response.issue))
    }

    async fn do_transition(&self, issue: &str, transition: Transition) -> Result<Issue> {
        let form = [
            ("issue", issue.to_string()),
            ("transition", transition.as_api_str().to_string()),
        ];
        let response: SqIssueResponse = self.post_form("issues/do_transition", &form).await?;
        Ok(sq_issue(response.issue))
    }

    async fn bulk_change(
        &self,
        issues: &[String],
        change: &BulkChange,
    ) -> Result<BulkChangeSummary> {
        if issues.is_empty() {
            return Ok(BulkChangeSummary::default());
        }
        let form = bulk_change_form(issues, change);
        self.post_form("issues/bulk_change", &form).await
    }
}
