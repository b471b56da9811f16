use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent};
use tokio::sync::mpsc;

use crate::action::{Action, BulkMode, Focus, Popup};
use crate::event::Event;
use crate::fetch::{self, FetchSettings, IssuePage, IssueRequest};
use crate::history::History;
use crate::query::{Filter, Location, Query};
use crate::source::IssueSource;
use crate::types::{
    BulkChange, CurrentUser, Facets, Issue, IssuesResponse, Paging, References, Severity,
    Transition,
};

/// How a navigation lands in history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nav {
    Push,
    Replace,
}

/// One line of the facets sidebar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacetRow {
    Header {
        filter: Filter,
        open: bool,
        active: usize,
    },
    Value {
        filter: Filter,
        val: String,
        count: u32,
        active: bool,
    },
    CreatedHeader {
        open: bool,
        active: bool,
    },
    /// Restrict to issues in the leak period
    NewCode {
        active: bool,
    },
    /// Creation-date bucket `[start, end)`
    CreatedValue {
        start: String,
        end: Option<String>,
        count: u32,
        active: bool,
    },
}

/// Date part of a `createdAt` facet value such as `2024-01-01T00:00:00+0000`.
fn bucket_date(val: &str) -> &str {
    val.split('T').next().unwrap_or(val)
}

pub struct App {
    pub history: History,
    pub focus: Focus,

    // Current result set
    pub issues: Vec<Issue>,
    pub paging: Option<Paging>,
    pub facets: Facets,
    pub references: References,

    pub selected: Option<String>,
    pub checked: Vec<String>,
    /// Keys of the open issue's component run, once resolved
    pub component_issues: Vec<String>,

    // Facets sidebar
    pub open_facets: BTreeMap<Filter, bool>,
    pub created_open: bool,
    pub facet_index: usize,

    pub popup: Option<Popup>,
    pub current_user: CurrentUser,
    pub loading: bool,
    pub error: Option<String>,
    pub message: Option<String>,
    pub should_quit: bool,

    /// Generation of the current result set; results from older generations are dropped
    load_id: u64,
    settings: FetchSettings,
    source: Arc<dyn IssueSource>,
    action_tx: mpsc::UnboundedSender<Action>,
}

impl App {
    pub fn new(
        source: Arc<dyn IssueSource>,
        location: Location,
        settings: FetchSettings,
        action_tx: mpsc::UnboundedSender<Action>,
    ) -> Self {
        let selected = location.open.clone();
        Self {
            history: History::new(location),
            focus: Focus::default(),

            issues: Vec::new(),
            paging: None,
            facets: Facets::new(),
            references: References::default(),

            selected,
            checked: Vec::new(),
            component_issues: Vec::new(),

            open_facets: BTreeMap::from([(Filter::Resolutions, true), (Filter::Types, true)]),
            created_open: false,
            facet_index: 0,

            popup: None,
            current_user: CurrentUser::default(),
            loading: true,
            error: None,
            message: None,
            should_quit: false,

            load_id: 0,
            settings,
            source,
            action_tx,
        }
    }

    pub fn location(&self) -> &Location {
        self.history.current()
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn selected_index(&self) -> Option<usize> {
        let selected = self.selected.as_deref()?;
        self.issues.iter().position(|issue| issue.key == selected)
    }

    /// The issue shown in detail view, if it is part of the loaded list.
    pub fn open_issue(&self) -> Option<&Issue> {
        let open = self.location().open.as_deref()?;
        self.issues.iter().find(|issue| issue.key == open)
    }

    /// Issue that single-issue commands act on: the open one, else the selected one.
    pub fn target_issue(&self) -> Option<&Issue> {
        self.open_issue()
            .or_else(|| self.selected_index().map(|i| &self.issues[i]))
    }

    pub fn can_edit(&self) -> bool {
        self.current_user.is_logged_in
    }

    pub fn handle_event(&self, event: Event) -> Action {
        match event {
            Event::Init => Action::Start,
            Event::Key(key) => self.handle_key(key),
            _ => Action::None,
        }
    }

    fn handle_key(&self, key: KeyEvent) -> Action {
        if self.popup.is_some() {
            return match key.code {
                KeyCode::Char('j') | KeyCode::Down => Action::PopupDown,
                KeyCode::Char('k') | KeyCode::Up => Action::PopupUp,
                KeyCode::Enter => Action::PopupSelect,
                KeyCode::Esc | KeyCode::Char('q') => Action::ClosePopup,
                _ => Action::None,
            };
        }

        let detail = self.open_issue().is_some();

        if self.focus == Focus::Facets && !detail {
            match key.code {
                KeyCode::Char('j') | KeyCode::Down => return Action::FacetDown,
                KeyCode::Char('k') | KeyCode::Up => return Action::FacetUp,
                KeyCode::Enter | KeyCode::Char(' ') => return Action::FacetSelect,
                KeyCode::Esc | KeyCode::Tab => return Action::ToggleFocus,
                _ => {}
            }
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                if detail {
                    Action::CloseIssue
                } else {
                    Action::Quit
                }
            }
            KeyCode::Char('k') | KeyCode::Up => Action::SelectPrevious,
            KeyCode::Char('j') | KeyCode::Down => Action::SelectNext,
            KeyCode::Char('l') | KeyCode::Right | KeyCode::Enter => Action::OpenSelected,
            KeyCode::Char('h') | KeyCode::Left => Action::CloseIssue,
            KeyCode::Backspace => Action::HistoryBack,
            KeyCode::Tab => {
                if detail {
                    Action::None
                } else {
                    Action::ToggleFocus
                }
            }
            KeyCode::Char(' ') | KeyCode::Char('x') => Action::ToggleCheck,
            KeyCode::Char('m') => Action::ToggleMyIssues,
            KeyCode::Char('R') => Action::ResetFilters,
            KeyCode::Char('n') => Action::LoadMore,
            KeyCode::Char('r') | KeyCode::F(5) => {
                if detail {
                    Action::ReloadAndOpenFirst
                } else {
                    Action::Refresh
                }
            }
            KeyCode::Char('b') => Action::ShowBulkChange(BulkMode::All),
            KeyCode::Char('B') => Action::ShowBulkChange(BulkMode::Checked),
            KeyCode::Char('t') => Action::ShowTransitions,
            KeyCode::Char('a') => Action::AssignToMe,
            KeyCode::Char('o') => Action::OpenInBrowser,
            KeyCode::Char('y') => Action::YankKey,
            _ => Action::None,
        }
    }

    pub fn update(&mut self, action: Action) {
        if self.error.is_some()
            && !matches!(
                action,
                Action::None | Action::Error { .. } | Action::CurrentUserLoaded(_)
            )
        {
            self.error = None;
        }

        match action {
            Action::Start => {
                self.spawn_load_current_user();
                self.fetch_first_issues(false);
            }
            Action::Quit => {
                self.should_quit = true;
            }
            Action::HistoryBack => {
                let prev = self.location().clone();
                if self.history.back() {
                    self.apply_location(&prev);
                }
            }

            Action::SelectPrevious => self.select_relative(-1),
            Action::SelectNext => self.select_relative(1),
            Action::OpenSelected => {
                if let Some(selected) = self.selected.clone() {
                    self.open_issue_by_key(selected);
                }
            }
            Action::CloseIssue => self.close_issue(),

            Action::ToggleFocus => {
                self.focus = match self.focus {
                    Focus::Issues => Focus::Facets,
                    Focus::Facets => Focus::Issues,
                };
            }
            Action::FacetUp => {
                self.facet_index = self.facet_index.saturating_sub(1);
            }
            Action::FacetDown => {
                let rows = self.facet_rows().len();
                if rows > 0 && self.facet_index < rows - 1 {
                    self.facet_index += 1;
                }
            }
            Action::FacetSelect => self.select_facet_row(),
            Action::ToggleMyIssues => {
                if self.can_edit() {
                    let my_issues = !self.location().my_issues;
                    self.handle_my_issues_change(my_issues);
                }
            }
            Action::ResetFilters => {
                let location = self.location().with_query(Query::default_query());
                self.navigate(location, Nav::Push);
            }

            Action::ToggleCheck => self.toggle_check(),

            Action::LoadMore => self.fetch_more_issues(),
            Action::Refresh => self.fetch_first_issues(false),
            Action::ReloadAndOpenFirst => self.fetch_first_issues(true),
            Action::CurrentUserLoaded(user) => {
                self.current_user = user;
            }
            Action::IssuesLoaded {
                response,
                load_id,
                open_first,
            } => self.receive_first_issues(*response, load_id, open_first),
            Action::IssuesAppended { page, load_id } => {
                if self.append_page(page, load_id) || load_id == self.load_id {
                    self.loading = false;
                }
            }
            Action::ComponentIssuesLoaded {
                result,
                open,
                load_id,
            } => {
                if load_id != self.load_id {
                    tracing::debug!(%open, load_id, "dropping stale component issues");
                    return;
                }
                self.loading = false;
                if self.location().open.as_deref() != Some(open.as_str()) {
                    tracing::debug!(%open, "dropping component issues for a closed issue");
                    return;
                }
                let appended = match result.fetched {
                    Some(page) => self.append_page(page, load_id),
                    None => true,
                };
                // Keys from rejected pages are not in the list
                self.component_issues = result
                    .issues
                    .into_iter()
                    .map(|i| i.key)
                    .filter(|key| appended || self.issues.iter().any(|i| &i.key == key))
                    .collect();
            }

            Action::AssignToMe => self.assign_to_me(),
            Action::IssueChanged(issue) => {
                self.loading = false;
                self.message = Some(format!("Updated {}", issue.key));
                self.handle_issue_change(*issue);
            }
            Action::ShowBulkChange(mode) => self.open_bulk_change(mode),
            Action::ShowTransitions => {
                if self.can_edit() {
                    if let Some(issue) = self.target_issue() {
                        self.popup = Some(Popup::Transition {
                            issue: issue.key.clone(),
                            index: 0,
                        });
                    }
                }
            }
            Action::BulkChangeDone(summary) => {
                tracing::info!(
                    total = summary.total,
                    success = summary.success,
                    ignored = summary.ignored,
                    failures = summary.failures,
                    "bulk change finished"
                );
                self.message = Some(if summary.failures > 0 {
                    format!(
                        "Bulk change: {} of {} issues changed, {} failed",
                        summary.success, summary.total, summary.failures
                    )
                } else {
                    format!(
                        "Bulk change: {} of {} issues changed",
                        summary.success, summary.total
                    )
                });
                self.fetch_first_issues(false);
            }

            Action::PopupUp => {
                if let Some(Popup::BulkChange { index, .. } | Popup::Transition { index, .. }) =
                    &mut self.popup
                {
                    *index = index.saturating_sub(1);
                }
            }
            Action::PopupDown => {
                let len = self.popup_items().len();
                if let Some(Popup::BulkChange { index, .. } | Popup::Transition { index, .. }) =
                    &mut self.popup
                {
                    if *index + 1 < len {
                        *index += 1;
                    }
                }
            }
            Action::PopupSelect => self.select_popup_item(),
            Action::ClosePopup => {
                self.popup = None;
            }

            Action::OpenInBrowser => {
                if let Some(issue) = self.target_issue() {
                    let url = self
                        .source
                        .issue_url(issue, self.location().component.as_deref());
                    if let Err(e) = open::that(&url) {
                        self.error = Some(format!("Could not open browser: {}", e));
                    }
                }
            }
            Action::YankKey => {
                if let Some(key) = self.target_issue().map(|i| i.key.clone()) {
                    match arboard::Clipboard::new().and_then(|mut c| c.set_text(key.clone())) {
                        Ok(()) => self.message = Some(format!("Copied {}", key)),
                        Err(e) => self.error = Some(format!("Clipboard unavailable: {}", e)),
                    }
                }
            }

            Action::Error { message, load_id } => {
                if load_id.is_some_and(|id| id != self.load_id) {
                    tracing::debug!(error = %message, "dropping stale failure");
                    return;
                }
                tracing::warn!(error = %message, "request failed");
                self.loading = false;
                self.error = Some(message);
            }
            Action::None => {}
        }
    }

    // Navigation

    fn navigate(&mut self, location: Location, nav: Nav) {
        let prev = self.location().clone();
        match nav {
            Nav::Push => self.history.push(location),
            Nav::Replace => self.history.replace(location),
        }
        self.apply_location(&prev);
    }

    /// Derive view state from a location change, once per navigation.
    fn apply_location(&mut self, prev: &Location) {
        let next = self.location().clone();
        tracing::debug!(location = %next.to_query_string(), "navigate");

        if let Some(open) = &next.open {
            if self.selected.as_ref() != Some(open) {
                self.selected = Some(open.clone());
            }
        }

        if !prev.query.same_as(&next.query)
            || prev.my_issues != next.my_issues
            || prev.component != next.component
        {
            self.fetch_first_issues(false);
        } else if prev.open != next.open {
            self.component_issues.clear();
            if next.open.is_some() {
                self.load_component_issues();
            }
        }
    }

    fn select_relative(&mut self, delta: isize) {
        let Some(index) = self.selected_index() else {
            return;
        };
        let Some(next) = index.checked_add_signed(delta) else {
            return;
        };
        let Some(issue) = self.issues.get(next) else {
            return;
        };
        let key = issue.key.clone();
        if self.location().open.is_some() {
            self.open_issue_by_key(key);
        } else {
            self.selected = Some(key);
        }
    }

    /// Show an issue in detail view. Moving between open issues replaces the
    /// history entry; opening from the list pushes one.
    fn open_issue_by_key(&mut self, key: String) {
        let nav = if self.location().open.is_some() {
            Nav::Replace
        } else {
            Nav::Push
        };
        let location = self.location().with_open(Some(key));
        self.navigate(location, nav);
    }

    fn close_issue(&mut self) {
        if self.location().open.is_some() {
            let location = self.location().with_open(None);
            self.navigate(location, Nav::Push);
        }
    }

    fn handle_filter_change(&mut self, query: Query) {
        let location = self.location().with_query(query);
        self.navigate(location, Nav::Push);
    }

    fn handle_my_issues_change(&mut self, my_issues: bool) {
        self.open_facets.insert(Filter::Assignees, false);
        let current = self.location();
        let location = Location {
            query: current.query.for_my_issues(),
            my_issues,
            ..current.with_open(None)
        };
        self.navigate(location, Nav::Push);
    }

    // Facets

    pub fn facet_rows(&self) -> Vec<FacetRow> {
        let query = &self.location().query;
        let mut rows = Vec::new();
        for filter in Filter::FACETS {
            if filter == Filter::Assignees && self.location().my_issues {
                continue;
            }
            let selected = query.values(filter);
            let open = self.open_facets.get(&filter).copied().unwrap_or(false);
            rows.push(FacetRow::Header {
                filter,
                open,
                active: selected.len(),
            });
            if !open {
                continue;
            }
            if let Some(values) = self.facets.get(filter.param()) {
                rows.extend(values.iter().map(|v| FacetRow::Value {
                    filter,
                    val: v.val.clone(),
                    count: v.count,
                    active: selected.contains(&v.val),
                }));
            }
        }

        rows.push(FacetRow::CreatedHeader {
            open: self.created_open,
            active: query.has_creation_filter(),
        });
        if self.created_open {
            rows.push(FacetRow::NewCode {
                active: query.since_leak_period,
            });
            if let Some(buckets) = self.facets.get("createdAt") {
                for (i, bucket) in buckets.iter().enumerate() {
                    let start = bucket_date(&bucket.val).to_string();
                    let end = buckets.get(i + 1).map(|next| bucket_date(&next.val).to_string());
                    rows.push(FacetRow::CreatedValue {
                        active: query.created_between(&start, end.as_deref()),
                        start,
                        end,
                        count: bucket.count,
                    });
                }
            }
        }
        rows
    }

    fn select_facet_row(&mut self) {
        match self.facet_rows().get(self.facet_index).cloned() {
            Some(FacetRow::Header { filter, open, .. }) => {
                self.open_facets.insert(filter, !open);
            }
            Some(FacetRow::Value { filter, val, .. }) => {
                let query = self.location().query.toggle_value(filter, &val);
                self.handle_filter_change(query);
            }
            Some(FacetRow::CreatedHeader { open, .. }) => {
                self.created_open = !open;
            }
            Some(FacetRow::NewCode { .. }) => {
                let query = self.location().query.toggle_since_leak_period();
                self.handle_filter_change(query);
            }
            Some(FacetRow::CreatedValue { start, end, .. }) => {
                let query = self.location().query.toggle_created_between(&start, end.as_deref());
                self.handle_filter_change(query);
            }
            None => {}
        }
        let rows = self.facet_rows().len();
        self.facet_index = self.facet_index.min(rows.saturating_sub(1));
    }

    // Loading

    fn request(&self) -> IssueRequest {
        IssueRequest::new(self.location(), self.settings.page_size)
    }

    fn spawn<F, Fut>(&self, task: F)
    where
        F: FnOnce(Arc<dyn IssueSource>) -> Fut,
        Fut: Future<Output = Action> + Send + 'static,
    {
        let tx = self.action_tx.clone();
        let fut = task(Arc::clone(&self.source));
        tokio::spawn(async move {
            tx.send(fut.await).ok();
        });
    }

    fn spawn_load_current_user(&self) {
        self.spawn(|source| async move {
            match source.current_user().await {
                Ok(user) => Action::CurrentUserLoaded(user),
                Err(e) => {
                    tracing::warn!(error = %e, "could not load current user");
                    Action::None
                }
            }
        });
    }

    /// Replace the result set with page 1 of the current query.
    fn fetch_first_issues(&mut self, open_first: bool) {
        self.load_id += 1;
        self.loading = true;
        let load_id = self.load_id;
        let request = self.request();
        self.spawn(move |source| async move {
            match fetch::fetch_first_issues(source.as_ref(), &request).await {
                Ok(response) => Action::IssuesLoaded {
                    response: Box::new(response),
                    load_id,
                    open_first,
                },
                Err(e) => Action::list_error(e, load_id),
            }
        });
    }

    fn receive_first_issues(&mut self, response: IssuesResponse, load_id: u64, open_first: bool) {
        if load_id != self.load_id {
            tracing::debug!(load_id, current = self.load_id, "dropping stale issues");
            return;
        }

        self.loading = false;
        let open = self.location().open.clone();
        self.selected = match open
            .as_ref()
            .filter(|key| response.issues.iter().any(|i| &i.key == *key))
        {
            Some(key) => Some(key.clone()),
            None => response.issues.first().map(|i| i.key.clone()),
        };
        self.issues = response.issues;
        self.paging = response.paging;
        self.facets = response.facets;
        self.references = response.references;
        self.component_issues.clear();
        let rows = self.facet_rows().len();
        self.facet_index = self.facet_index.min(rows.saturating_sub(1));

        if open_first {
            if let Some(first) = self.issues.first().map(|i| i.key.clone()) {
                self.open_issue_by_key(first);
                if open.as_deref() == self.location().open.as_deref() {
                    self.load_component_issues();
                }
            }
        } else if open.is_some() {
            self.load_component_issues();
        }
    }

    fn fetch_more_issues(&mut self) {
        let Some(paging) = self.paging else {
            return;
        };
        if paging.is_exhausted() {
            return;
        }
        self.loading = true;
        let load_id = self.load_id;
        let request = self.request();
        let page = paging.page_index + 1;
        self.spawn(move |source| async move {
            match fetch::fetch_page(source.as_ref(), &request, page).await {
                Ok(page) => Action::IssuesAppended { page, load_id },
                Err(e) => Action::list_error(e, load_id),
            }
        });
    }

    /// Append pages that directly follow the loaded window of the current generation.
    fn append_page(&mut self, page: IssuePage, load_id: u64) -> bool {
        if load_id != self.load_id {
            tracing::debug!(load_id, "dropping page from a previous result set");
            return false;
        }
        match self.paging {
            Some(paging) if page.first_page == paging.page_index + 1 => {
                self.issues.extend(page.issues);
                self.paging = Some(page.paging);
                true
            }
            _ => {
                tracing::debug!(first_page = page.first_page, "dropping non-contiguous page");
                false
            }
        }
    }

    fn load_component_issues(&mut self) {
        let Some(open) = self.location().open.clone() else {
            return;
        };
        if !self.issues.iter().any(|i| i.key == open) {
            return;
        }
        self.loading = true;
        let load_id = self.load_id;
        let request = self.request();
        let loaded = self.issues.clone();
        let paging = self.paging;
        let max_pages = self.settings.max_pages;
        self.spawn(move |source| async move {
            let result = fetch::fetch_issues_for_component(
                source.as_ref(),
                &request,
                &loaded,
                paging.as_ref(),
                Some(&open),
                max_pages,
            )
            .await;
            match result {
                Ok(result) => Action::ComponentIssuesLoaded {
                    result,
                    open,
                    load_id,
                },
                Err(e) => Action::list_error(e, load_id),
            }
        });
    }

    // Mutations

    fn toggle_check(&mut self) {
        if !self.can_edit() || self.open_issue().is_some() {
            return;
        }
        let Some(key) = self.selected.clone() else {
            return;
        };
        if let Some(pos) = self.checked.iter().position(|k| *k == key) {
            self.checked.remove(pos);
        } else {
            self.checked.push(key);
        }
    }

    /// Merge an updated issue back into the list by key.
    pub fn handle_issue_change(&mut self, issue: Issue) {
        if let Some(existing) = self.issues.iter_mut().find(|i| i.key == issue.key) {
            *existing = issue;
        }
    }

    fn assign_to_me(&mut self) {
        let Some(login) = self.current_user.login.clone() else {
            return;
        };
        let Some(key) = self.target_issue().map(|i| i.key.clone()) else {
            return;
        };
        self.loading = true;
        self.spawn(move |source| async move {
            match source.assign(&key, Some(&login)).await {
                Ok(issue) => Action::IssueChanged(Box::new(issue)),
                Err(e) => e.into(),
            }
        });
    }

    fn open_bulk_change(&mut self, mode: BulkMode) {
        if !self.can_edit() || self.open_issue().is_some() {
            return;
        }
        if mode == BulkMode::Checked && self.checked.is_empty() {
            self.message = Some("No issues checked".to_string());
            return;
        }
        self.popup = Some(Popup::BulkChange { mode, index: 0 });
    }

    pub fn bulk_changes(&self) -> Vec<BulkChange> {
        let mut changes = Vec::new();
        if let Some(login) = &self.current_user.login {
            changes.push(BulkChange::AssignTo(login.clone()));
        }
        changes.push(BulkChange::Unassign);
        changes.extend(Transition::ALL.into_iter().map(BulkChange::Transition));
        changes.extend(Severity::ALL.into_iter().map(BulkChange::SetSeverity));
        changes
    }

    pub fn popup_items(&self) -> Vec<String> {
        match &self.popup {
            Some(Popup::BulkChange { .. }) => {
                self.bulk_changes().iter().map(ToString::to_string).collect()
            }
            Some(Popup::Transition { .. }) => {
                Transition::ALL.iter().map(ToString::to_string).collect()
            }
            None => Vec::new(),
        }
    }

    /// Size of the set a bulk change would apply to.
    pub fn bulk_target_count(&self, mode: BulkMode) -> u32 {
        match mode {
            BulkMode::All => self.paging.map_or(0, |p| p.total),
            BulkMode::Checked => fetch::checked_issues(&self.issues, &self.checked).paging.total,
        }
    }

    fn select_popup_item(&mut self) {
        let Some(popup) = self.popup.take() else {
            return;
        };
        match popup {
            Popup::BulkChange { mode, index } => {
                let Some(change) = self.bulk_changes().get(index).cloned() else {
                    return;
                };
                self.loading = true;
                let location = self.location().clone();
                let checked = fetch::checked_issues(&self.issues, &self.checked);
                self.spawn(move |source| async move {
                    let target = match mode {
                        BulkMode::All => {
                            fetch::all_issues_for_bulk_change(source.as_ref(), &location).await
                        }
                        BulkMode::Checked => Ok(checked),
                    };
                    let keys: Vec<String> = match target {
                        Ok(page) => page.issues.into_iter().map(|i| i.key).collect(),
                        Err(e) => return e.into(),
                    };
                    tracing::info!(count = keys.len(), change = %change, "bulk change");
                    match source.bulk_change(&keys, &change).await {
                        Ok(summary) => Action::BulkChangeDone(summary),
                        Err(e) => e.into(),
                    }
                });
            }
            Popup::Transition { issue, index } => {
                let Some(transition) = Transition::ALL.get(index).copied() else {
                    return;
                };
                self.loading = true;
                self.spawn(move |source| async move {
                    match source.do_transition(&issue, transition).await {
                        Ok(issue) => Action::IssueChanged(Box::new(issue)),
                        Err(e) => e.into(),
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnagError;
    use crate::fetch::ComponentIssues;
    use crate::testing::{issue, FakeSource};
    use crate::types::BulkChangeSummary;
    use crossterm::event::KeyModifiers;

    struct Harness {
        app: App,
        rx: mpsc::UnboundedReceiver<Action>,
        source: Arc<FakeSource>,
    }

    impl Harness {
        fn new(issues: Vec<Issue>, location: Location, page_size: u32) -> Self {
            let source = Arc::new(FakeSource::new(issues));
            let (tx, rx) = mpsc::unbounded_channel();
            let settings = FetchSettings {
                page_size,
                max_pages: Some(10),
            };
            let app = App::new(source.clone(), location, settings, tx);
            Self { app, rx, source }
        }

        /// Feed the next `n` task results back into the app.
        async fn settle(&mut self, n: usize) {
            for _ in 0..n {
                let action = self.rx.recv().await.unwrap();
                self.app.update(action);
            }
        }

        async fn started(mut self) -> Self {
            self.app.update(Action::Start);
            self.settle(2).await;
            self
        }

        fn open(&self) -> Option<&str> {
            self.app.location().open.as_deref()
        }
    }

    fn issues(n: usize) -> Vec<Issue> {
        (0..n).map(|i| issue(&format!("k{}", i), "comp")).collect()
    }

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[tokio::test]
    async fn start_loads_first_page_and_selects_first_issue() {
        let h = Harness::new(issues(30), Location::default(), 25)
            .started()
            .await;
        assert!(!h.app.loading);
        assert_eq!(h.app.issues.len(), 25);
        assert_eq!(h.app.paging.unwrap().total, 30);
        assert_eq!(h.app.selected.as_deref(), Some("k0"));
        assert!(h.app.facets.contains_key("severities"));
        assert!(h.app.current_user.is_logged_in);
    }

    #[tokio::test]
    async fn start_selects_open_issue_when_present() {
        let location = Location::default().with_open(Some("k3".to_string()));
        let mut h = Harness::new(issues(5), location, 25).started().await;
        assert_eq!(h.app.selected.as_deref(), Some("k3"));
        // component run load
        h.settle(1).await;
        assert_eq!(h.app.component_issues.len(), 5);
    }

    #[tokio::test]
    async fn start_falls_back_to_first_when_open_issue_missing() {
        let location = Location::default().with_open(Some("gone".to_string()));
        let h = Harness::new(issues(3), location, 25).started().await;
        assert_eq!(h.app.selected.as_deref(), Some("k0"));
        assert!(h.app.open_issue().is_none());
    }

    #[tokio::test]
    async fn empty_result_selects_nothing() {
        let h = Harness::new(Vec::new(), Location::default(), 25)
            .started()
            .await;
        assert_eq!(h.app.selected, None);
        assert_eq!(h.app.paging.unwrap().total, 0);
    }

    #[tokio::test]
    async fn selection_stays_within_bounds() {
        let mut h = Harness::new(issues(3), Location::default(), 25)
            .started()
            .await;
        h.app.update(Action::SelectPrevious);
        assert_eq!(h.app.selected_index(), Some(0));
        for _ in 0..5 {
            h.app.update(Action::SelectNext);
        }
        assert_eq!(h.app.selected_index(), Some(2));
        assert_eq!(h.app.history.len(), 1);
    }

    #[tokio::test]
    async fn navigation_without_selection_is_noop() {
        let mut h = Harness::new(issues(3), Location::default(), 25);
        h.app.update(Action::SelectNext);
        h.app.update(Action::OpenSelected);
        assert_eq!(h.app.selected, None);
        assert_eq!(h.app.history.len(), 1);
    }

    #[tokio::test]
    async fn opening_pushes_and_moving_between_open_issues_replaces() {
        let mut h = Harness::new(issues(3), Location::default(), 25)
            .started()
            .await;

        h.app.update(Action::OpenSelected);
        assert_eq!(h.open(), Some("k0"));
        assert_eq!(h.app.history.len(), 2);
        h.settle(1).await;

        h.app.update(Action::SelectNext);
        assert_eq!(h.open(), Some("k1"));
        assert_eq!(h.app.selected.as_deref(), Some("k1"));
        assert_eq!(h.app.history.len(), 2);
        h.settle(1).await;

        h.app.update(Action::CloseIssue);
        assert_eq!(h.open(), None);
        assert_eq!(h.app.history.len(), 3);
        assert_eq!(h.app.selected.as_deref(), Some("k1"));

        // closing again does nothing
        h.app.update(Action::CloseIssue);
        assert_eq!(h.app.history.len(), 3);
    }

    #[tokio::test]
    async fn keys_map_to_navigation_actions() {
        let h = Harness::new(issues(3), Location::default(), 25)
            .started()
            .await;
        assert!(matches!(h.app.handle_event(key(KeyCode::Up)), Action::SelectPrevious));
        assert!(matches!(h.app.handle_event(key(KeyCode::Down)), Action::SelectNext));
        assert!(matches!(h.app.handle_event(key(KeyCode::Right)), Action::OpenSelected));
        assert!(matches!(h.app.handle_event(key(KeyCode::Left)), Action::CloseIssue));
        assert!(matches!(h.app.handle_event(Event::Init), Action::Start));
    }

    #[tokio::test]
    async fn stale_first_page_is_ignored() {
        let mut h = Harness::new(issues(3), Location::default(), 25)
            .started()
            .await;
        let stale = IssuesResponse {
            issues: vec![issue("old", "comp")],
            ..IssuesResponse::default()
        };
        let stale_id = h.app.load_id - 1;
        h.app.update(Action::IssuesLoaded {
            response: Box::new(stale),
            load_id: stale_id,
            open_first: false,
        });
        assert_eq!(h.app.issues.len(), 3);
        assert_eq!(h.app.issues[0].key, "k0");
    }

    #[tokio::test]
    async fn overlapping_refreshes_keep_latest() {
        let mut h = Harness::new(issues(3), Location::default(), 25)
            .started()
            .await;
        h.app.update(Action::Refresh);
        h.source.set_issues(issues(2));
        h.app.update(Action::Refresh);
        h.settle(2).await;
        // only the second refresh is applied, whatever order the results arrived in
        assert_eq!(h.app.issues.len(), 2);
    }

    #[tokio::test]
    async fn load_more_appends_next_page() {
        let mut h = Harness::new(issues(12), Location::default(), 5)
            .started()
            .await;
        h.app.update(Action::LoadMore);
        h.settle(1).await;
        assert_eq!(h.app.issues.len(), 10);
        assert_eq!(h.app.paging.unwrap().page_index, 2);
        assert_eq!(h.app.issues[5].key, "k5");
    }

    #[tokio::test]
    async fn duplicate_load_more_does_not_duplicate_issues() {
        let mut h = Harness::new(issues(12), Location::default(), 5)
            .started()
            .await;
        h.app.update(Action::LoadMore);
        h.app.update(Action::LoadMore);
        h.settle(2).await;
        assert_eq!(h.app.issues.len(), 10);
    }

    #[tokio::test]
    async fn load_more_stops_at_total() {
        let mut h = Harness::new(issues(4), Location::default(), 5)
            .started()
            .await;
        h.app.update(Action::LoadMore);
        assert!(!h.app.loading);
        assert!(h.source.requested_pages().is_empty());
    }

    #[tokio::test]
    async fn opening_issue_loads_its_component_run_across_pages() {
        let mut all = vec![issue("a0", "A")];
        all.extend((0..6).map(|i| issue(&format!("b{}", i), "B")));
        all.push(issue("c0", "C"));
        let mut h = Harness::new(all, Location::default(), 3).started().await;

        h.app.open_issue_by_key("b1".to_string());
        h.settle(1).await;

        assert_eq!(
            h.app.component_issues,
            vec!["b0", "b1", "b2", "b3", "b4", "b5"]
        );
        // pages 2 and 3 were appended to the list
        assert_eq!(h.app.issues.len(), 8);
        assert_eq!(h.app.paging.unwrap().page_index, 3);
    }

    #[tokio::test]
    async fn filter_change_refetches_and_closes_issue() {
        let location = Location::default().with_open(Some("k0".to_string()));
        let mut h = Harness::new(issues(3), location, 25).started().await;
        h.settle(1).await;

        let query = h.app.location().query.toggle_value(Filter::Severities, "MAJOR");
        h.app.handle_filter_change(query);
        assert_eq!(h.open(), None);
        assert!(h.app.loading);
        h.settle(1).await;

        let last = h.source.requests().pop().unwrap();
        assert!(last.contains(&("severities".to_string(), "MAJOR".to_string())));
    }

    #[tokio::test]
    async fn my_issues_toggle_clears_assignees() {
        let location = Location {
            query: Query::default_query().toggle_value(Filter::Assignees, "bob"),
            ..Location::default()
        };
        let mut h = Harness::new(issues(3), location, 25).started().await;

        h.app.update(Action::ToggleMyIssues);
        let loc = h.app.location();
        assert!(loc.my_issues);
        assert!(loc.query.assigned);
        assert!(loc.query.values(Filter::Assignees).is_empty());
        assert_eq!(h.app.open_facets.get(&Filter::Assignees), Some(&false));
        h.settle(1).await;

        let last = h.source.requests().pop().unwrap();
        assert!(last.contains(&("assignees".to_string(), "__me__".to_string())));
    }

    #[tokio::test]
    async fn history_back_restores_previous_query() {
        let mut h = Harness::new(issues(3), Location::default(), 25)
            .started()
            .await;
        let query = h.app.location().query.toggle_value(Filter::Types, "BUG");
        h.app.handle_filter_change(query);
        h.settle(1).await;

        h.app.update(Action::HistoryBack);
        assert!(h.app.location().query.values(Filter::Types).is_empty());
        assert!(h.app.loading);
    }

    #[tokio::test]
    async fn facet_header_toggles_and_value_filters() {
        let mut h = Harness::new(issues(3), Location::default(), 25)
            .started()
            .await;
        h.app.update(Action::ToggleFocus);
        assert_eq!(h.app.focus, Focus::Facets);

        // Types, Resolutions, then Severities header
        h.app.facet_index = 2;
        assert!(matches!(
            h.app.facet_rows()[2],
            FacetRow::Header {
                filter: Filter::Severities,
                open: false,
                ..
            }
        ));
        h.app.update(Action::FacetSelect);
        assert!(matches!(
            h.app.facet_rows()[3],
            FacetRow::Value { filter: Filter::Severities, .. }
        ));

        h.app.update(Action::FacetDown);
        h.app.update(Action::FacetSelect);
        assert_eq!(h.app.location().query.values(Filter::Severities), ["MAJOR"]);
    }

    #[tokio::test]
    async fn checking_requires_selection_and_toggles() {
        let mut h = Harness::new(issues(3), Location::default(), 25)
            .started()
            .await;
        h.app.update(Action::ToggleCheck);
        h.app.update(Action::SelectNext);
        h.app.update(Action::ToggleCheck);
        assert_eq!(h.app.checked, vec!["k0", "k1"]);
        h.app.update(Action::ToggleCheck);
        assert_eq!(h.app.checked, vec!["k0"]);
        assert_eq!(h.app.bulk_target_count(BulkMode::Checked), 1);
        assert_eq!(h.app.bulk_target_count(BulkMode::All), 3);
    }

    #[tokio::test]
    async fn bulk_change_on_checked_issues_then_refetches() {
        let mut h = Harness::new(issues(6), Location::default(), 25)
            .started()
            .await;
        h.app.checked = vec!["k2".to_string(), "k5".to_string()];

        h.app.update(Action::ShowBulkChange(BulkMode::Checked));
        // AssignTo(me), Unassign, then Confirm
        h.app.update(Action::PopupDown);
        h.app.update(Action::PopupDown);
        h.app.update(Action::PopupSelect);
        assert_eq!(h.app.popup, None);
        h.settle(1).await;

        let changes = h.source.bulk_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, vec!["k2", "k5"]);
        assert_eq!(changes[0].1, BulkChange::Transition(Transition::Confirm));
        assert!(h.app.loading);
        assert_eq!(
            h.app.message.as_deref(),
            Some("Bulk change: 2 of 2 issues changed")
        );

        h.settle(1).await;
        assert!(!h.app.loading);
    }

    #[tokio::test]
    async fn bulk_change_on_all_issues_fetches_matching_set() {
        let mut h = Harness::new(issues(40), Location::default(), 25)
            .started()
            .await;
        h.app.update(Action::ShowBulkChange(BulkMode::All));
        h.app.update(Action::PopupSelect);
        h.settle(1).await;

        let changes = h.source.bulk_changes();
        assert_eq!(changes[0].0.len(), 40);
        assert_eq!(changes[0].1, BulkChange::AssignTo("me".to_string()));
    }

    #[tokio::test]
    async fn bulk_change_unavailable_without_checked_issues_or_in_detail() {
        let mut h = Harness::new(issues(3), Location::default(), 25)
            .started()
            .await;
        h.app.update(Action::ShowBulkChange(BulkMode::Checked));
        assert_eq!(h.app.popup, None);

        h.app.update(Action::OpenSelected);
        h.app.update(Action::ShowBulkChange(BulkMode::All));
        assert_eq!(h.app.popup, None);
    }

    #[tokio::test]
    async fn transition_updates_issue_in_place() {
        let mut h = Harness::new(issues(3), Location::default(), 25)
            .started()
            .await;
        h.app.update(Action::SelectNext);
        h.app.update(Action::ShowTransitions);
        assert_eq!(
            h.app.popup,
            Some(Popup::Transition {
                issue: "k1".to_string(),
                index: 0
            })
        );
        h.app.update(Action::PopupSelect);
        h.settle(1).await;
        assert_eq!(h.app.issues[1].status, "CONFIRMED");
        assert_eq!(h.app.issues.len(), 3);
    }

    #[tokio::test]
    async fn assign_to_me_merges_by_key() {
        let mut h = Harness::new(issues(3), Location::default(), 25)
            .started()
            .await;
        h.app.update(Action::AssignToMe);
        h.settle(1).await;
        assert_eq!(h.app.issues[0].assignee.as_deref(), Some("me"));
    }

    #[tokio::test]
    async fn reload_and_open_first_opens_first_issue() {
        let location = Location::default().with_open(Some("k2".to_string()));
        let mut h = Harness::new(issues(3), location, 25).started().await;
        h.settle(1).await;

        h.app.update(Action::ReloadAndOpenFirst);
        h.settle(1).await;
        assert_eq!(h.open(), Some("k0"));
        assert_eq!(h.app.selected.as_deref(), Some("k0"));
    }

    #[tokio::test]
    async fn request_failure_surfaces_error() {
        let mut h = Harness::new(issues(3), Location::default(), 25);
        h.source.fail_with("server down");
        h.app.update(Action::Start);
        h.settle(2).await;
        assert!(h.app.error.as_deref().unwrap().contains("server down"));
        assert!(!h.app.loading);
    }

    #[tokio::test]
    async fn bulk_summary_message_mentions_failures() {
        let mut h = Harness::new(issues(5), Location::default(), 25);
        h.app.update(Action::BulkChangeDone(BulkChangeSummary {
            total: 5,
            success: 3,
            ignored: 0,
            failures: 2,
        }));
        assert_eq!(
            h.app.message.as_deref(),
            Some("Bulk change: 3 of 5 issues changed, 2 failed")
        );
        assert!(h.app.loading);
    }

    fn page(all: &[Issue], first_page: u32, range: std::ops::Range<usize>, size: u32) -> IssuePage {
        IssuePage {
            first_page,
            issues: all[range].to_vec(),
            paging: Paging {
                page_index: first_page,
                page_size: size,
                total: all.len() as u32,
            },
        }
    }

    fn run_of_b() -> Vec<Issue> {
        let mut all = vec![issue("a0", "A")];
        all.extend((0..6).map(|i| issue(&format!("b{}", i), "B")));
        all.push(issue("c0", "C"));
        all
    }

    #[tokio::test]
    async fn page_from_previous_query_leaves_new_load_running() {
        let all = issues(12);
        let mut h = Harness::new(all.clone(), Location::default(), 5)
            .started()
            .await;
        let old = h.app.load_id;

        let query = h.app.location().query.toggle_value(Filter::Types, "BUG");
        h.app.handle_filter_change(query);
        assert!(h.app.loading);

        h.app.update(Action::IssuesAppended {
            page: page(&all, 2, 5..10, 5),
            load_id: old,
        });
        assert!(h.app.loading);
        assert_eq!(h.app.issues.len(), 5);

        h.settle(1).await;
        assert!(!h.app.loading);
    }

    #[tokio::test]
    async fn failure_from_previous_query_is_not_shown() {
        let mut h = Harness::new(issues(12), Location::default(), 5)
            .started()
            .await;
        let old = h.app.load_id;
        h.app.update(Action::Refresh);

        h.app.update(Action::list_error(SnagError::Api("old page".into()), old));
        assert_eq!(h.app.error, None);
        assert!(h.app.loading);

        let current = h.app.load_id;
        h.app.update(Action::list_error(SnagError::Api("new page".into()), current));
        assert!(h.app.error.as_deref().unwrap().contains("new page"));
        assert!(!h.app.loading);
    }

    #[tokio::test]
    async fn component_run_from_previous_query_is_dropped() {
        let location = Location::default().with_open(Some("k0".to_string()));
        let mut h = Harness::new(issues(3), location, 25).started().await;
        h.settle(1).await;
        let old = h.app.load_id;
        let stale_run = h.app.component_issues.clone();

        h.app.update(Action::Refresh);
        assert!(h.app.loading);
        h.app.update(Action::ComponentIssuesLoaded {
            result: ComponentIssues {
                fetched: None,
                issues: vec![issue("elsewhere", "comp")],
            },
            open: "k0".to_string(),
            load_id: old,
        });
        assert!(h.app.loading);
        assert_eq!(h.app.component_issues, stale_run);
    }

    #[tokio::test]
    async fn component_run_for_closed_issue_is_dropped() {
        let mut h = Harness::new(issues(3), Location::default(), 25)
            .started()
            .await;
        h.app.update(Action::ComponentIssuesLoaded {
            result: ComponentIssues {
                fetched: None,
                issues: issues(3),
            },
            open: "k1".to_string(),
            load_id: h.app.load_id,
        });
        assert!(h.app.component_issues.is_empty());
    }

    #[tokio::test]
    async fn component_run_keeps_only_loaded_keys_when_pages_are_rejected() {
        let all = run_of_b();
        let mut h = Harness::new(all.clone(), Location::default(), 3)
            .started()
            .await;
        h.app.open_issue_by_key("b1".to_string());
        let load_id = h.app.load_id;

        // load more lands first
        h.app.update(Action::IssuesAppended {
            page: page(&all, 2, 3..6, 3),
            load_id,
        });
        assert_eq!(h.app.issues.len(), 6);

        let fetched = IssuePage {
            first_page: 2,
            issues: all[3..8].to_vec(),
            paging: Paging {
                page_index: 3,
                page_size: 3,
                total: 8,
            },
        };
        h.app.update(Action::ComponentIssuesLoaded {
            result: ComponentIssues {
                fetched: Some(fetched),
                issues: all[1..7].to_vec(),
            },
            open: "b1".to_string(),
            load_id,
        });

        assert_eq!(h.app.issues.len(), 6);
        assert_eq!(h.app.component_issues, vec!["b0", "b1", "b2", "b3", "b4"]);
    }

    #[tokio::test]
    async fn unknown_open_issue_keeps_list_actions_available() {
        let location = Location::default().with_open(Some("gone".to_string()));
        let mut h = Harness::new(issues(3), location, 25).started().await;
        assert!(h.app.open_issue().is_none());

        h.app.update(Action::ToggleCheck);
        assert_eq!(h.app.checked, vec!["k0"]);

        h.app.update(Action::ShowBulkChange(BulkMode::All));
        assert_eq!(
            h.app.popup,
            Some(Popup::BulkChange {
                mode: BulkMode::All,
                index: 0
            })
        );
        assert!(matches!(h.app.handle_event(key(KeyCode::Char('q'))), Action::ClosePopup));
    }

    #[tokio::test]
    async fn creation_date_bucket_filters_by_window() {
        let mut h = Harness::new(issues(3), Location::default(), 25)
            .started()
            .await;
        let rows = h.app.facet_rows();
        assert_eq!(
            rows.last(),
            Some(&FacetRow::CreatedHeader {
                open: false,
                active: false
            })
        );

        h.app.facet_index = rows.len() - 1;
        h.app.update(Action::FacetSelect);
        let rows = h.app.facet_rows();
        let header = rows
            .iter()
            .position(|r| matches!(r, FacetRow::CreatedHeader { .. }))
            .unwrap();
        assert_eq!(rows[header + 1], FacetRow::NewCode { active: false });
        assert_eq!(
            rows[header + 2],
            FacetRow::CreatedValue {
                start: "2024-01-01".to_string(),
                end: Some("2024-02-01".to_string()),
                count: 3,
                active: false,
            }
        );

        h.app.facet_index = header + 2;
        h.app.update(Action::FacetSelect);
        let query = &h.app.location().query;
        assert!(query.created_between("2024-01-01", Some("2024-02-01")));
        assert!(h.app.loading);
        h.settle(1).await;

        let last = h.source.requests().pop().unwrap();
        assert!(last.contains(&("createdAfter".to_string(), "2024-01-01".to_string())));
    }

    #[tokio::test]
    async fn new_code_row_toggles_leak_period() {
        let mut h = Harness::new(issues(3), Location::default(), 25)
            .started()
            .await;
        h.app.created_open = true;
        h.app.facet_index = h
            .app
            .facet_rows()
            .iter()
            .position(|r| matches!(r, FacetRow::NewCode { .. }))
            .unwrap();
        h.app.update(Action::FacetSelect);
        assert!(h.app.location().query.since_leak_period);
    }
}
