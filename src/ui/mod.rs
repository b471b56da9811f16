mod facets;
mod issue_detail;
mod issue_list;
mod popup;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::action::{BulkMode, Focus, Popup};
use crate::app::App;
use crate::types::{Issue, References, Severity};

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);

    if app.open_issue().is_some() {
        issue_detail::render(frame, app, chunks[1]);
    } else {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(32), Constraint::Min(0)])
            .split(chunks[1]);
        facets::render(frame, app, body[0]);
        issue_list::render(frame, app, body[1]);
    }

    render_status_bar(frame, app, chunks[2]);

    match &app.popup {
        Some(Popup::BulkChange { mode, index }) => {
            let scope = match mode {
                BulkMode::All => "all matching",
                BulkMode::Checked => "checked",
            };
            let title = format!("Change {} {} issues", app.bulk_target_count(*mode), scope);
            popup::render_select(frame, &title, &app.popup_items(), *index);
        }
        Some(Popup::Transition { issue, index }) => {
            let title = format!("Transition {}", issue);
            popup::render_select(frame, &title, &app.popup_items(), *index);
        }
        None => {}
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let location = app.location();
    let scope = location
        .component
        .as_deref()
        .map(|key| {
            app.references
                .component_by_key(key)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| key.to_string())
        })
        .unwrap_or_else(|| "All projects".to_string());

    let mut spans = vec![Span::styled(
        format!("snag - {} - {}", app.source_name(), scope),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];

    if location.my_issues {
        spans.push(Span::styled(
            "  [my issues]",
            Style::default().fg(Color::Green),
        ));
    }
    if location.query.is_filtered() {
        spans.push(Span::styled("  [filtered]", Style::default().fg(Color::Yellow)));
    }
    if let Some(name) = &app.current_user.name {
        spans.push(Span::styled(
            format!("  {}", name),
            Style::default().fg(Color::Gray),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status = if let Some(error) = &app.error {
        Line::from(vec![Span::styled(
            format!("Error: {}", error),
            Style::default().fg(Color::Red),
        )])
    } else if app.loading {
        Line::from(vec![Span::styled(
            "Loading...",
            Style::default().fg(Color::Yellow),
        )])
    } else if let Some(message) = &app.message {
        Line::from(vec![Span::styled(
            message.as_str(),
            Style::default().fg(Color::Green),
        )])
    } else {
        let help = if app.popup.is_some() {
            "j/k: nav | Enter: apply | Esc: cancel"
        } else if app.open_issue().is_some() {
            concat!(
                "j/k: prev/next | h/q: back | t: transition | a: assign to me",
                " | o: browser | y: copy key | r: reload",
            )
        } else if app.focus == Focus::Facets {
            "j/k: nav | Enter: toggle | Tab: issues | q: quit"
        } else if app.can_edit() {
            concat!(
                "j/k: nav | Enter: open | Tab: filters | x: check | b/B: bulk",
                " | m: my issues | R: reset | n: more | q: quit",
            )
        } else {
            "j/k: nav | Enter: open | Tab: filters | R: reset | n: more | r: refresh | q: quit"
        };
        Line::from(vec![Span::styled(help, Style::default().fg(Color::Gray))])
    };

    let status_bar = Paragraph::new(status).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(status_bar, area);
}

fn severity_style(severity: Severity) -> Style {
    let color = match severity {
        Severity::Blocker => Color::Red,
        Severity::Critical => Color::LightRed,
        Severity::Major => Color::Yellow,
        Severity::Minor => Color::Green,
        Severity::Info => Color::Blue,
    };
    Style::default().fg(color)
}

/// Short display name for an issue's file: its path when known,
/// else the key after the project prefix.
fn component_label(references: &References, issue: &Issue) -> String {
    references
        .component_by_key(&issue.component)
        .and_then(|c| c.path.clone().or_else(|| c.long_name.clone()))
        .unwrap_or_else(|| {
            issue
                .component
                .split_once(':')
                .map_or(issue.component.as_str(), |(_, path)| path)
                .to_string()
        })
}

/// Cut `s` to at most `max` characters, marking the cut with "...".
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return s.chars().take(max).collect();
    }
    let mut out: String = s.chars().take(max - 3).collect();
    out.push_str("...");
    out
}
