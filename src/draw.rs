use chrono::Local;
use log::error;
use tui::backend::Backend;
use tui::layout::{Alignment, Constraint, Layout, Rect};
use tui::style::{Color, Modifier, Style};
use tui::text::{Line, Span};
use tui::widgets::{Block, BorderType, Borders, Paragraph, Tabs};
use tui::{Frame, Terminal};
use tui_logger::TuiLoggerWidget;

use crate::app::{App, MenuItem};
use crate::components::standings::{NoticeToast, StandingsTable, tone_color};
use crate::state::app_state::{TOAST_TTL, is_recent};
use crate::state::network::{ERROR_CHAR, LoadingState};
use crate::ui::layout::LayoutAreas;

static TABS: &[&str; 2] = &["Leaderboard", "Activity"];
const TOAST_LINES: usize = 3;

const HELP: &[(&str, &str)] = &[
    ("q / Ctrl-c", "quit"),
    ("1 / 2", "leaderboard / activity"),
    ("s / S", "next / previous scope"),
    ("j / k", "move selection"),
    ("r", "refresh (and retry live updates)"),
    ("c", "recalculate selected stage"),
    ("e", "export selected stage"),
    ("f", "toggle full screen"),
    ("\"", "toggle log pane"),
    ("Esc", "leave help"),
];

pub fn draw<B>(terminal: &mut Terminal<B>, app: &mut App, loading: LoadingState)
where
    B: Backend,
{
    let current_size = terminal.size().unwrap_or_default();
    if current_size.width <= 10 || current_size.height <= 10 {
        return;
    }

    let mut layout = LayoutAreas::new(current_size);

    let result = terminal.draw(|f| {
        layout.update(f.area(), app.settings.full_screen, app.state.show_logs);

        if !app.settings.full_screen {
            draw_tabs(f, layout.tab_bar, app);
            draw_status_bar(f, layout.status, app);
        }

        match app.state.active_tab {
            MenuItem::Leaderboard => draw_leaderboard(f, layout.main, app),
            MenuItem::Activity => draw_activity(f, layout.main, app),
            MenuItem::Help => draw_help(f, layout.main),
        }

        if let Some(logs) = layout.logs {
            draw_logs(f, logs);
        }

        draw_loading_spinner(f, f.area(), app, loading);
    });

    if let Err(e) = result {
        error!("draw failed: {e}");
    }
}

pub fn default_border<'a>(color: Color) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(color))
}

fn draw_tabs(f: &mut Frame, tab_bar: [Rect; 2], app: &App) {
    let style = Style::default().fg(Color::White);
    let border_type = BorderType::Rounded;

    let tab_index = match app.state.active_tab {
        MenuItem::Leaderboard => 0,
        MenuItem::Activity => 1,
        MenuItem::Help => 0,
    };

    let titles: Vec<Line> = TABS.iter().map(|t| Line::from(*t)).collect();
    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::LEFT | Borders::BOTTOM | Borders::TOP)
                .border_type(border_type),
        )
        .highlight_style(Style::default().add_modifier(Modifier::UNDERLINED))
        .select(tab_index)
        .style(style);
    f.render_widget(tabs, tab_bar[0]);

    let scope = app
        .state
        .scopes
        .current()
        .map(|o| o.label.as_str())
        .unwrap_or("no scope");
    let right = Paragraph::new(format!("{scope}  Help: ? "))
        .alignment(Alignment::Right)
        .block(
            Block::default()
                .borders(Borders::RIGHT | Borders::BOTTOM | Borders::TOP)
                .border_type(border_type),
        )
        .style(style);
    f.render_widget(right, tab_bar[1]);
}

fn draw_leaderboard(f: &mut Frame, area: Rect, app: &App) {
    let title = match app.state.scopes.current() {
        Some(option) => format!(" {} ", option.label),
        None => " Leaderboard ".to_string(),
    };
    let block = default_border(Color::White).title(title);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let lb = &app.state.leaderboard;
    if app.state.scopes.options.is_empty() {
        draw_hint(
            f,
            inner,
            "No tournament or stage configured. Set STANDINGS_TOURNAMENT or pass --tournament.",
        );
        return;
    }
    if lb.view.entries.is_empty() {
        let msg = if lb.loaded { "No standings yet." } else { "Loading standings..." };
        draw_hint(f, inner, msg);
    } else {
        f.render_widget(
            StandingsTable {
                entries: &lb.view.entries,
                selected: Some(lb.selected_row),
            },
            inner,
        );
    }

    let now = Local::now();
    let fresh: Vec<_> = lb
        .view
        .notices
        .iter()
        .filter(|n| is_recent(n.at, now, TOAST_TTL))
        .take(TOAST_LINES)
        .collect();
    if !fresh.is_empty() {
        let toast = NoticeToast { notices: &fresh };
        let toast_area = toast.area(inner);
        f.render_widget(toast, toast_area);
    }
}

fn draw_activity(f: &mut Frame, area: Rect, app: &App) {
    let [notices_area, history_area] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(area);

    let block = default_border(Color::White).title(" Rank changes ");
    let inner = block.inner(notices_area);
    f.render_widget(block, notices_area);
    let notices = &app.state.leaderboard.view.notices;
    if notices.is_empty() {
        draw_hint(f, inner, "No rank changes yet.");
    } else {
        let lines: Vec<Line> = notices
            .iter()
            .map(|n| {
                Line::from(vec![
                    Span::styled(
                        format!("[{}] ", n.at.format("%H:%M:%S")),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::styled(n.message.as_str(), Style::default().fg(tone_color(n.tone))),
                ])
            })
            .collect();
        f.render_widget(Paragraph::new(lines), inner);
    }

    let conn = &app.state.connection;
    let block = default_border(Color::DarkGray).title(" Live updates ");
    let inner = block.inner(history_area);
    f.render_widget(block, history_area);

    let visible = inner.height as usize;
    let start = conn.history.len().saturating_sub(visible);
    let lines: Vec<Line> = conn.history[start..]
        .iter()
        .map(|s| {
            Line::from(vec![
                Span::styled(format!("[{}] ", s.timestamp), Style::default().fg(Color::DarkGray)),
                Span::styled(s.body.as_str(), Style::default().fg(Color::Gray)),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let conn = &app.state.connection;
    let (label, color) = if conn.connected {
        ("LIVE", Color::Green)
    } else if conn.gave_up {
        ("OFFLINE", Color::Red)
    } else {
        ("CONNECTING", Color::Yellow)
    };

    let mut spans = vec![Span::styled(
        format!(" {label} "),
        Style::default().fg(Color::Black).bg(color),
    )];
    if let Some(at) = app.state.leaderboard.updated_at {
        spans.push(Span::styled(
            format!("  updated {}", at.format("%H:%M:%S")),
            Style::default().fg(Color::DarkGray),
        ));
    }
    if let Some(flash) = app.state.flash.as_ref().filter(|fl| fl.is_fresh(Local::now())) {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(flash.message.as_str(), Style::default().fg(tone_color(flash.tone))));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let block = default_border(Color::DarkGray).title(" Help ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let lines: Vec<Line> = HELP
        .iter()
        .map(|(key, action)| {
            Line::from(vec![
                Span::styled(format!("{key:>12}  "), Style::default().fg(Color::Yellow)),
                Span::raw(*action),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_logs(f: &mut Frame, area: Rect) {
    let logger = TuiLoggerWidget::default()
        .block(default_border(Color::DarkGray).title(" Logs "))
        .style_error(Style::default().fg(Color::Red))
        .style_warn(Style::default().fg(Color::Yellow))
        .style_info(Style::default().fg(Color::Cyan));
    f.render_widget(logger, area);
}

fn draw_hint(f: &mut Frame, area: Rect, msg: &str) {
    f.render_widget(
        Paragraph::new(msg)
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center),
        area,
    );
}

fn draw_loading_spinner(f: &mut Frame, area: Rect, app: &App, loading: LoadingState) {
    if !loading.is_loading && loading.spinner_char != ERROR_CHAR {
        return;
    }
    let style = match loading.spinner_char {
        ERROR_CHAR => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::White),
    };
    let spinner = Paragraph::new(loading.spinner_char.to_string())
        .alignment(Alignment::Right)
        .style(style);
    let area = if app.settings.full_screen {
        Rect::new(area.width.saturating_sub(3), area.height.saturating_sub(2), 1, 1)
    } else {
        Rect::new(area.width.saturating_sub(3), 1, 1, 1)
    };
    f.render_widget(spinner, area);
}
