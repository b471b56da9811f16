use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;

use crate::action::Focus;
use crate::app::App;
use crate::types::IssueType;

use super::{component_label, severity_style, truncate};

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let title = match app.paging {
        Some(paging) => format!("Issues ({} of {})", app.issues.len(), paging.total),
        None => "Issues".to_string(),
    };
    let border_style = if app.focus == Focus::Issues {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(title);

    if app.issues.is_empty() && !app.loading {
        let empty = Paragraph::new("No issues match the current filters")
            .block(block)
            .style(Style::default().fg(Color::Gray));
        frame.render_widget(empty, area);
        return;
    }

    let checkable = app.can_edit();
    let w = area.width.saturating_sub(2) as usize;
    // check(4) + severity(9) + type(5) + location(28) + spaces
    let fixed = if checkable { 48 } else { 44 };
    let flex = w.saturating_sub(fixed).max(10);
    let selected = app.selected_index();

    let items: Vec<ListItem> = app
        .issues
        .iter()
        .enumerate()
        .map(|(i, issue)| {
            let style = if Some(i) == selected {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            let mut spans = Vec::new();
            if checkable {
                let mark = if app.checked.contains(&issue.key) {
                    "[x] "
                } else {
                    "[ ] "
                };
                spans.push(Span::styled(mark, Style::default().fg(Color::Green)));
            }

            let kind = match issue.issue_type {
                IssueType::Bug => "BUG",
                IssueType::Vulnerability => "VULN",
                IssueType::CodeSmell => "SMELL",
            };
            let location = match issue.line {
                Some(line) => format!(
                    "{}:{}",
                    truncate(&component_label(&app.references, issue), 21),
                    line
                ),
                None => truncate(&component_label(&app.references, issue), 27),
            };

            spans.extend([
                Span::styled(
                    format!("{:<9}", issue.severity.to_string()),
                    severity_style(issue.severity),
                ),
                Span::styled(format!("{:<5}", kind), Style::default().fg(Color::Magenta)),
                Span::raw(" "),
                Span::styled(format!("{:<28}", location), Style::default().fg(Color::DarkGray)),
                Span::raw(" "),
                Span::styled(truncate(&issue.message, flex), style),
            ]);

            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray));

    let mut state = ListState::default();
    state.select(selected);

    frame.render_stateful_widget(list, area, &mut state);
}
