use crate::error::SnagError;
use crate::fetch::{ComponentIssues, IssuePage};
use crate::types::{BulkChangeSummary, CurrentUser, Issue, IssuesResponse};

/// Which pane receives list navigation keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Issues,
    Facets,
}

/// Which issues a bulk change applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkMode {
    /// Everything matching the current query
    All,
    Checked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popup {
    BulkChange { mode: BulkMode, index: usize },
    Transition { issue: String, index: usize },
}

#[derive(Debug, Clone)]
pub enum Action {
    Start,
    Quit,
    HistoryBack,

    // Selection and detail view
    SelectPrevious,
    SelectNext,
    OpenSelected,
    CloseIssue,

    // Filters
    ToggleFocus,
    FacetUp,
    FacetDown,
    FacetSelect,
    ToggleMyIssues,
    ResetFilters,

    ToggleCheck,

    // Loading
    LoadMore,
    Refresh,
    ReloadAndOpenFirst,
    CurrentUserLoaded(CurrentUser),
    IssuesLoaded {
        response: Box<IssuesResponse>,
        load_id: u64,
        open_first: bool,
    },
    IssuesAppended {
        page: IssuePage,
        load_id: u64,
    },
    ComponentIssuesLoaded {
        result: ComponentIssues,
        open: String,
        load_id: u64,
    },

    // Mutations
    AssignToMe,
    IssueChanged(Box<Issue>),
    ShowBulkChange(BulkMode),
    ShowTransitions,
    BulkChangeDone(BulkChangeSummary),

    // Popup navigation
    PopupUp,
    PopupDown,
    PopupSelect,
    ClosePopup,

    OpenInBrowser,
    YankKey,

    /// A failed request. List loads carry the generation they were started for.
    Error {
        message: String,
        load_id: Option<u64>,
    },
    None,
}

impl Action {
    /// Failure of a request that belongs to list generation `load_id`.
    pub fn list_error(err: SnagError, load_id: u64) -> Self {
        Action::Error {
            message: err.to_string(),
            load_id: Some(load_id),
        }
    }
}

impl From<SnagError> for Action {
    fn from(err: SnagError) -> Self {
        Action::Error {
            message: err.to_string(),
            load_id: None,
        }
    }
}
