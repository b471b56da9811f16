use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Multi-valued issue filters. Each maps to one search parameter and one facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Filter {
    Types,
    Resolutions,
    Severities,
    Statuses,
    Rules,
    Tags,
    Projects,
    Modules,
    Directories,
    Files,
    Assignees,
    Authors,
    Languages,
    Issues,
}

impl Filter {
    pub const ALL: [Filter; 14] = [
        Filter::Types,
        Filter::Resolutions,
        Filter::Severities,
        Filter::Statuses,
        Filter::Rules,
        Filter::Tags,
        Filter::Projects,
        Filter::Modules,
        Filter::Directories,
        Filter::Files,
        Filter::Assignees,
        Filter::Authors,
        Filter::Languages,
        Filter::Issues,
    ];

    /// Filters shown in the facets sidebar, in display order.
    pub const FACETS: [Filter; 13] = [
        Filter::Types,
        Filter::Resolutions,
        Filter::Severities,
        Filter::Statuses,
        Filter::Rules,
        Filter::Tags,
        Filter::Projects,
        Filter::Modules,
        Filter::Directories,
        Filter::Files,
        Filter::Assignees,
        Filter::Authors,
        Filter::Languages,
    ];

    /// Name used both in location query strings and in search requests.
    pub fn param(&self) -> &'static str {
        match self {
            Filter::Types => "types",
            Filter::Resolutions => "resolutions",
            Filter::Severities => "severities",
            Filter::Statuses => "statuses",
            Filter::Rules => "rules",
            Filter::Tags => "tags",
            Filter::Projects => "projectUuids",
            Filter::Modules => "moduleUuids",
            Filter::Directories => "directories",
            Filter::Files => "fileUuids",
            Filter::Assignees => "assignees",
            Filter::Authors => "authors",
            Filter::Languages => "languages",
            Filter::Issues => "issues",
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = match self {
            Filter::Types => "Type",
            Filter::Resolutions => "Resolution",
            Filter::Severities => "Severity",
            Filter::Statuses => "Status",
            Filter::Rules => "Rule",
            Filter::Tags => "Tag",
            Filter::Projects => "Project",
            Filter::Modules => "Module",
            Filter::Directories => "Directory",
            Filter::Files => "File",
            Filter::Assignees => "Assignee",
            Filter::Authors => "Author",
            Filter::Languages => "Language",
            Filter::Issues => "Issue",
        };
        write!(f, "{}", title)
    }
}

/// Serialized form of a query: parameter name -> value, omitting defaults.
pub type SerializedQuery = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub assigned: bool,
    pub resolved: bool,
    pub since_leak_period: bool,
    pub created_after: Option<String>,
    pub created_at: Option<String>,
    pub created_before: Option<String>,
    pub created_in_last: Option<String>,
    pub filters: BTreeMap<Filter, Vec<String>>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            assigned: true,
            resolved: true,
            since_leak_period: false,
            created_after: None,
            created_at: None,
            created_before: None,
            created_in_last: None,
            filters: BTreeMap::new(),
        }
    }
}

fn parse_as_boolean(value: Option<&str>, default: bool) -> bool {
    match value {
        Some("false") => false,
        Some("true") => true,
        _ => default,
    }
}

fn parse_as_string(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn parse_as_array(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Query {
    /// The query a fresh issues view starts from: unresolved issues only.
    pub fn default_query() -> Self {
        Self {
            resolved: false,
            ..Self::default()
        }
    }

    pub fn parse(params: &BTreeMap<String, String>) -> Self {
        let get = |name: &str| params.get(name).map(String::as_str);

        let filters = Filter::ALL
            .into_iter()
            .map(|f| (f, parse_as_array(get(f.param()))))
            .filter(|(_, values)| !values.is_empty())
            .collect();

        Self {
            assigned: parse_as_boolean(get("assigned"), true),
            resolved: parse_as_boolean(get("resolved"), true),
            since_leak_period: parse_as_boolean(get("sinceLeakPeriod"), false),
            created_after: parse_as_string(get("createdAfter")),
            created_at: parse_as_string(get("createdAt")),
            created_before: parse_as_string(get("createdBefore")),
            created_in_last: parse_as_string(get("createdInLast")),
            filters,
        }
    }

    pub fn serialize(&self) -> SerializedQuery {
        let mut out = SerializedQuery::new();
        if !self.assigned {
            out.insert("assigned".to_string(), "false".to_string());
        }
        if !self.resolved {
            out.insert("resolved".to_string(), "false".to_string());
        }
        if self.since_leak_period {
            out.insert("sinceLeakPeriod".to_string(), "true".to_string());
        }
        let dates = [
            ("createdAfter", &self.created_after),
            ("createdAt", &self.created_at),
            ("createdBefore", &self.created_before),
            ("createdInLast", &self.created_in_last),
        ];
        for (name, value) in dates {
            if let Some(v) = value {
                out.insert(name.to_string(), v.clone());
            }
        }
        for (filter, values) in &self.filters {
            if !values.is_empty() {
                out.insert(filter.param().to_string(), values.join(","));
            }
        }
        out
    }

    /// Queries are equal when they serialize identically.
    pub fn same_as(&self, other: &Query) -> bool {
        self.serialize() == other.serialize()
    }

    pub fn is_filtered(&self) -> bool {
        !self.same_as(&Self::default_query())
    }

    pub fn values(&self, filter: Filter) -> &[String] {
        self.filters.get(&filter).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn with_values(&self, filter: Filter, values: Vec<String>) -> Self {
        let mut next = self.clone();
        if values.is_empty() {
            next.filters.remove(&filter);
        } else {
            next.filters.insert(filter, values);
        }
        next
    }

    /// Add `value` to the filter, or remove it if already present.
    pub fn toggle_value(&self, filter: Filter, value: &str) -> Self {
        let mut values = self.values(filter).to_vec();
        if let Some(pos) = values.iter().position(|v| v == value) {
            values.remove(pos);
        } else {
            values.push(value.to_string());
        }
        self.with_values(filter, values)
    }

    /// Whether the creation window is exactly `[start, end)`.
    pub fn created_between(&self, start: &str, end: Option<&str>) -> bool {
        self.created_after.as_deref() == Some(start) && self.created_before.as_deref() == end
    }

    /// Restrict to issues created in `[start, end)`, or drop the window if it is already set.
    /// Any other creation criterion is cleared.
    pub fn toggle_created_between(&self, start: &str, end: Option<&str>) -> Self {
        let selected = self.created_between(start, end);
        Self {
            since_leak_period: false,
            created_after: (!selected).then(|| start.to_string()),
            created_at: None,
            created_before: if selected {
                None
            } else {
                end.map(str::to_string)
            },
            created_in_last: None,
            ..self.clone()
        }
    }

    /// Flip the new-code restriction. It replaces any creation window.
    pub fn toggle_since_leak_period(&self) -> Self {
        Self {
            since_leak_period: !self.since_leak_period,
            created_after: None,
            created_at: None,
            created_before: None,
            created_in_last: None,
            ..self.clone()
        }
    }

    pub fn has_creation_filter(&self) -> bool {
        self.since_leak_period
            || self.created_after.is_some()
            || self.created_at.is_some()
            || self.created_before.is_some()
            || self.created_in_last.is_some()
    }

    /// Switching "my issues" drops explicit assignees and restricts to assigned issues.
    pub fn for_my_issues(&self) -> Self {
        let mut next = self.with_values(Filter::Assignees, Vec::new());
        next.assigned = true;
        next
    }
}

/// Navigation state, the terminal counterpart of the issues page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub query: Query,
    /// Component key the view is scoped to (`id`)
    pub component: Option<String>,
    pub my_issues: bool,
    /// Issue shown in detail view
    pub open: Option<String>,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            query: Query::default_query(),
            component: None,
            my_issues: false,
            open: None,
        }
    }
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(Cow::into_owned)
        .unwrap_or(spaced)
}

impl Location {
    /// Parse a URL query string such as `resolved=false&severities=MAJOR&open=AX1`.
    /// An empty string yields the default location.
    pub fn parse(query_string: &str) -> Self {
        let trimmed = query_string.trim().trim_start_matches('?');
        if trimmed.is_empty() {
            return Self::default();
        }

        let params: BTreeMap<String, String> = trimmed
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (decode(k), decode(v)),
                None => (decode(pair), String::new()),
            })
            .collect();

        let get = |name: &str| params.get(name).filter(|v| !v.is_empty()).cloned();

        Self {
            query: Query::parse(&params),
            component: get("id"),
            my_issues: params.get("myIssues").map(String::as_str) == Some("true"),
            open: get("open"),
        }
    }

    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self.query.serialize().into_iter().collect();
        if let Some(id) = &self.component {
            pairs.push(("id".to_string(), id.clone()));
        }
        if self.my_issues {
            pairs.push(("myIssues".to_string(), "true".to_string()));
        }
        if let Some(open) = &self.open {
            pairs.push(("open".to_string(), open.clone()));
        }
        pairs
    }

    pub fn to_query_string(&self) -> String {
        self.to_pairs()
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn with_open(&self, open: Option<String>) -> Self {
        Self {
            open,
            ..self.clone()
        }
    }

    /// New location for a changed query; any open issue is closed.
    pub fn with_query(&self, query: Query) -> Self {
        Self {
            query,
            open: None,
            ..self.clone()
        }
    }
}
