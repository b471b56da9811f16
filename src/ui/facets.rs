use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};
use ratatui::Frame;

use crate::action::Focus;
use crate::app::{App, FacetRow};

use super::truncate;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let focused = app.focus == Focus::Facets;
    let w = area.width.saturating_sub(2) as usize;

    let items: Vec<ListItem> = app
        .facet_rows()
        .into_iter()
        .map(|row| match row {
            FacetRow::Header {
                filter,
                open,
                active,
            } => {
                let arrow = if open { "v " } else { "> " };
                let mut spans = vec![Span::styled(
                    format!("{}{}", arrow, filter),
                    Style::default().add_modifier(Modifier::BOLD),
                )];
                if active > 0 {
                    spans.push(Span::styled(
                        format!(" ({})", active),
                        Style::default().fg(Color::Yellow),
                    ));
                }
                ListItem::new(Line::from(spans))
            }
            FacetRow::Value {
                filter,
                val,
                count,
                active,
            } => {
                let label = app.references.facet_label(filter.param(), &val);
                value_item(&label, Some(count), active, w)
            }
            FacetRow::CreatedHeader { open, active } => {
                let arrow = if open { "v " } else { "> " };
                let mut spans = vec![Span::styled(
                    format!("{}Creation date", arrow),
                    Style::default().add_modifier(Modifier::BOLD),
                )];
                if active {
                    spans.push(Span::styled(" (1)", Style::default().fg(Color::Yellow)));
                }
                ListItem::new(Line::from(spans))
            }
            FacetRow::NewCode { active } => value_item("New code", None, active, w),
            FacetRow::CreatedValue {
                start,
                end,
                count,
                active,
            } => {
                let label = match end {
                    Some(end) => format!("{} - {}", start, end),
                    None => format!("since {}", start),
                };
                value_item(&label, Some(count), active, w)
            }
        })
        .collect();

    let border_style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title("Filters"),
        )
        .highlight_style(if focused {
            Style::default().bg(Color::DarkGray)
        } else {
            Style::default()
        });

    let mut state = ListState::default();
    if focused {
        state.select(Some(app.facet_index));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

/// A selectable facet value with its count right of the label.
fn value_item(label: &str, count: Option<u32>, active: bool, width: usize) -> ListItem<'static> {
    let count = count.map(|c| format!(" {}", c)).unwrap_or_default();
    let label_width = width.saturating_sub(count.len() + 4);
    let style = if active {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::Gray)
    };
    let mark = if active { "* " } else { "  " };
    ListItem::new(Line::from(vec![
        Span::styled(
            format!("  {}{:<label_width$}", mark, truncate(label, label_width)),
            style,
        ),
        Span::styled(count, Style::default().fg(Color::DarkGray)),
    ]))
}
