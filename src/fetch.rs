use crate::error::{Result, SnagError};
use crate::query::Location;
use crate::source::{IssueSource, SearchParams};
use crate::types::{Issue, IssuesResponse, Paging};

pub const PAGE_SIZE: u32 = 25;
/// Largest page the search endpoint serves; bulk changes cover at most this many issues.
pub const BULK_PAGE_SIZE: u32 = 500;
pub const MAX_PAGES: u32 = 40;

/// Facets requested alongside the first page.
pub const FACETS: [&str; 14] = [
    "assignees",
    "authors",
    "createdAt",
    "directories",
    "fileUuids",
    "languages",
    "moduleUuids",
    "projectUuids",
    "resolutions",
    "rules",
    "severities",
    "statuses",
    "tags",
    "types",
];

/// Paging knobs shared by every request the views make
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    pub page_size: u32,
    /// Cap on pages requested while following a component run
    pub max_pages: Option<u32>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            max_pages: Some(MAX_PAGES),
        }
    }
}

/// Everything needed to request pages of one result set
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRequest {
    pub location: Location,
    pub page_size: u32,
}

impl IssueRequest {
    pub fn new(location: &Location, page_size: u32) -> Self {
        Self {
            location: location.clone(),
            page_size,
        }
    }

    pub fn params(&self, page: Option<u32>, with_facets: bool) -> SearchParams {
        let mut params = SearchParams::new();
        if let Some(component) = &self.location.component {
            params.push(("componentKeys".to_string(), component.clone()));
        }
        params.extend(self.location.query.serialize());
        params.push(("s".to_string(), "FILE_LINE".to_string()));
        params.push(("ps".to_string(), self.page_size.to_string()));
        if with_facets {
            params.push(("facets".to_string(), FACETS.join(",")));
        }
        if let Some(p) = page {
            params.push(("p".to_string(), p.to_string()));
        }
        if self.location.my_issues {
            params.retain(|(k, _)| k != "assignees");
            params.push(("assignees".to_string(), "__me__".to_string()));
        }
        params
    }
}

/// A run of consecutive pages starting at `first_page`
#[derive(Debug, Clone, PartialEq)]
pub struct IssuePage {
    pub first_page: u32,
    pub issues: Vec<Issue>,
    pub paging: Paging,
}

/// First page of a result set, with facets and reference tables.
pub async fn fetch_first_issues(
    source: &dyn IssueSource,
    request: &IssueRequest,
) -> Result<IssuesResponse> {
    source.search_issues(&request.params(None, true)).await
}

pub async fn fetch_page(
    source: &dyn IssueSource,
    request: &IssueRequest,
    page: u32,
) -> Result<IssuePage> {
    let response = source.search_issues(&request.params(Some(page), false)).await?;
    let paging = response
        .paging
        .ok_or_else(|| SnagError::Api("search response without paging".to_string()))?;
    Ok(IssuePage {
        first_page: page,
        issues: response.issues,
        paging,
    })
}

/// Request consecutive pages from `start_page` until `done` holds for the issues
/// fetched by this call and the latest paging.
///
/// Also stops when the server total is exhausted, when a page comes back empty,
/// or after `max_pages` requests.
pub async fn fetch_issues_until<F>(
    source: &dyn IssueSource,
    request: &IssueRequest,
    start_page: u32,
    max_pages: Option<u32>,
    mut done: F,
) -> Result<IssuePage>
where
    F: FnMut(&[Issue], &Paging) -> bool + Send,
{
    let mut issues = Vec::new();
    let mut page = start_page;
    let mut requests = 0u32;

    loop {
        let next = fetch_page(source, request, page).await?;
        requests += 1;
        let empty = next.issues.is_empty();
        issues.extend(next.issues);
        let paging = next.paging;

        if done(&issues, &paging) || empty || paging.is_exhausted() {
            return Ok(IssuePage {
                first_page: start_page,
                issues,
                paging,
            });
        }

        if max_pages.is_some_and(|max| requests >= max) {
            tracing::warn!(
                start_page,
                requests,
                "stopped paging before the end condition was met"
            );
            return Ok(IssuePage {
                first_page: start_page,
                issues,
                paging,
            });
        }

        page += 1;
    }
}

/// Issues sharing the open issue's component, plus any pages fetched to find them
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentIssues {
    pub fetched: Option<IssuePage>,
    pub issues: Vec<Issue>,
}

/// Resolve the run of issues in the open issue's component.
///
/// Results are sorted by file and line, so a component's issues are contiguous.
/// Pages are only fetched while the loaded window could still continue the run.
pub async fn fetch_issues_for_component(
    source: &dyn IssueSource,
    request: &IssueRequest,
    loaded: &[Issue],
    paging: Option<&Paging>,
    open: Option<&str>,
    max_pages: Option<u32>,
) -> Result<ComponentIssues> {
    let open_issue = loaded
        .iter()
        .find(|issue| Some(issue.key.as_str()) == open)
        .ok_or(SnagError::NoOpenIssue)?;
    let paging = paging.ok_or(SnagError::NoPaging)?;
    let component = open_issue.component.clone();

    let run_ended = |issues: &[Issue], paging: &Paging| {
        paging.is_exhausted()
            || issues
                .last()
                .map_or(true, |issue| issue.component != component)
    };

    let same_component = |issue: &&Issue| issue.component == open_issue.component;

    if run_ended(loaded, paging) {
        return Ok(ComponentIssues {
            fetched: None,
            issues: loaded.iter().filter(same_component).cloned().collect(),
        });
    }

    let fetched = fetch_issues_until(
        source,
        request,
        paging.page_index + 1,
        max_pages,
        |issues, paging| run_ended(issues, paging),
    )
    .await?;

    let issues = loaded
        .iter()
        .chain(fetched.issues.iter())
        .filter(same_component)
        .cloned()
        .collect();

    Ok(ComponentIssues {
        fetched: Some(fetched),
        issues,
    })
}

/// The checked subset as a single synthetic page.
pub fn checked_issues(issues: &[Issue], checked: &[String]) -> IssuePage {
    let selected: Vec<Issue> = checked
        .iter()
        .filter_map(|key| issues.iter().find(|issue| &issue.key == key))
        .cloned()
        .collect();
    let count = selected.len() as u32;
    IssuePage {
        first_page: 1,
        issues: selected,
        paging: Paging {
            page_index: 1,
            page_size: count,
            total: count,
        },
    }
}

/// Every issue matching the current query, up to the bulk page size.
pub async fn all_issues_for_bulk_change(
    source: &dyn IssueSource,
    location: &Location,
) -> Result<IssuePage> {
    let request = IssueRequest::new(location, BULK_PAGE_SIZE);
    fetch_page(source, &request, 1).await
}
