use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;

use crate::app::App;
use crate::types::Issue;

use super::{component_label, severity_style, truncate};

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let Some(issue) = app.open_issue() else {
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    render_issue_list(frame, app, issue, chunks[0]);
    render_issue(frame, app, issue, chunks[1]);
}

/// Concise list with the open issue's component run called out.
fn render_issue_list(frame: &mut Frame, app: &App, open: &Issue, area: Rect) {
    let w = area.width.saturating_sub(2) as usize;
    let selected = app.selected_index();

    let items: Vec<ListItem> = app
        .issues
        .iter()
        .map(|issue| {
            let in_run = app.component_issues.contains(&issue.key);
            let marker = if issue.key == open.key {
                ">"
            } else if in_run {
                "|"
            } else {
                " "
            };
            let text_style = if in_run || issue.component == open.component {
                Style::default()
            } else {
                Style::default().fg(Color::DarkGray)
            };
            let line = issue.line.map(|l| format!("L{} ", l)).unwrap_or_default();
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", marker), Style::default().fg(Color::Cyan)),
                Span::styled(
                    format!("{:<2}", &issue.severity.to_string()[..1]),
                    severity_style(issue.severity),
                ),
                Span::styled(line, Style::default().fg(Color::DarkGray)),
                Span::styled(truncate(&issue.message, w.saturating_sub(12)), text_style),
            ]))
        })
        .collect();

    let title = format!(
        "{} ({} in file)",
        truncate(&component_label(&app.references, open), w.saturating_sub(14)),
        app.component_issues.len().max(1)
    );
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray));

    let mut state = ListState::default();
    state.select(selected);
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_issue(frame: &mut Frame, app: &App, issue: &Issue, area: Rect) {
    let label = Style::default().fg(Color::Gray);
    let field = |name: &'static str, value: String| {
        Line::from(vec![
            Span::styled(format!("{:<12}", name), label),
            Span::raw(value),
        ])
    };

    let rule = app
        .references
        .rules
        .get(&issue.rule)
        .map(|name| format!("{} ({})", name, issue.rule))
        .unwrap_or_else(|| issue.rule.clone());
    let assignee = issue
        .assignee
        .as_deref()
        .map(|login| app.references.facet_label("assignees", login))
        .unwrap_or_else(|| "Not assigned".to_string());
    let status = match &issue.resolution {
        Some(resolution) => format!("{} ({})", issue.status, resolution),
        None => issue.status.clone(),
    };
    let project = app
        .references
        .component_by_key(&issue.project)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| issue.project.clone());
    let location = match issue.line {
        Some(line) => format!("{}:{}", component_label(&app.references, issue), line),
        None => component_label(&app.references, issue),
    };

    let mut lines = vec![
        Line::from(Span::styled(
            issue.message.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled(format!("{:<12}", "Severity"), label),
            Span::styled(issue.severity.to_string(), severity_style(issue.severity)),
        ]),
        field("Type", issue.issue_type.to_string()),
        field("Status", status),
        field("Assignee", assignee),
        field("Rule", rule),
        field("Project", project),
        field("Location", location),
        field("Key", issue.key.clone()),
    ];

    if let Some(author) = &issue.author {
        lines.push(field("Author", author.clone()));
    }
    if let Some(effort) = &issue.effort {
        lines.push(field("Effort", effort.clone()));
    }
    if !issue.tags.is_empty() {
        lines.push(field("Tags", issue.tags.join(", ")));
    }
    if let Some(created) = issue.created_at {
        lines.push(field("Created", created.format("%Y-%m-%d %H:%M").to_string()));
    }
    if let Some(updated) = issue.updated_at {
        lines.push(field("Updated", updated.format("%Y-%m-%d %H:%M").to_string()));
    }

    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(issue.key.as_str()))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}
