use standings_api::{LeaderboardEntry, RankNotice, Tone};
use tui::buffer::Buffer;
use tui::layout::{Constraint, Rect};
use tui::style::{Color, Modifier, Style};
use tui::text::Line;
use tui::widgets::{
    Block, BorderType, Borders, Cell, Clear, Paragraph, Row, StatefulWidget, Table, TableState,
    Widget,
};

const WIDTHS: [Constraint; 7] = [
    Constraint::Length(4),
    Constraint::Fill(1),
    Constraint::Length(4),
    Constraint::Length(6),
    Constraint::Length(6),
    Constraint::Length(6),
    Constraint::Length(5),
];

/// Ranked rows for one scope with a movement column.
pub struct StandingsTable<'a> {
    pub entries: &'a [LeaderboardEntry],
    pub selected: Option<usize>,
}

impl Widget for StandingsTable<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let header = Row::new(["#", "Team", "W", "Place", "Kills", "Pts", "+/-"])
            .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));

        let rows = self.entries.iter().map(|e| {
            let (delta, color) = delta_label(e);
            Row::new(vec![
                Cell::from(e.rank.to_string()),
                Cell::from(e.team_name.as_str()),
                Cell::from(e.wins.to_string()),
                Cell::from(e.placement_points.to_string()),
                Cell::from(e.total_kills.to_string()),
                Cell::from(e.total_points.to_string())
                    .style(Style::default().add_modifier(Modifier::BOLD)),
                Cell::from(delta).style(Style::default().fg(color)),
            ])
        });

        let table = Table::new(rows, WIDTHS)
            .header(header)
            .column_spacing(1)
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

        let mut state = TableState::default().with_selected(self.selected);
        StatefulWidget::render(table, area, buf, &mut state);
    }
}

pub fn delta_label(entry: &LeaderboardEntry) -> (String, Color) {
    if entry.moved_up() {
        (format!("▲{}", entry.delta), Color::Green)
    } else if entry.moved_down() {
        (format!("▼{}", entry.delta.unsigned_abs()), Color::Red)
    } else {
        ("-".to_string(), Color::DarkGray)
    }
}

pub fn tone_color(tone: Tone) -> Color {
    match tone {
        Tone::Positive => Color::Green,
        Tone::Negative => Color::Red,
    }
}

/// Overlay listing the newest rank changes.
pub struct NoticeToast<'a> {
    pub notices: &'a [&'a RankNotice],
}

impl NoticeToast<'_> {
    /// Bottom-right corner of `area`, sized to the notices.
    pub fn area(&self, area: Rect) -> Rect {
        let longest = self
            .notices
            .iter()
            .map(|n| n.message.chars().count())
            .max()
            .unwrap_or(0);
        let width = u16::try_from(longest)
            .unwrap_or(u16::MAX)
            .saturating_add(4)
            .max(20)
            .min(area.width.saturating_sub(2));
        let height = (self.notices.len() as u16 + 2).min(area.height);
        Rect::new(
            area.x + area.width.saturating_sub(width + 1),
            area.y + area.height.saturating_sub(height + 1),
            width,
            height,
        )
    }
}

impl Widget for NoticeToast<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if self.notices.is_empty() || area.height < 3 {
            return;
        }
        Clear.render(area, buf);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Rank changes ");
        let lines: Vec<Line> = self
            .notices
            .iter()
            .map(|n| Line::styled(n.message.as_str(), Style::default().fg(tone_color(n.tone))))
            .collect();
        Paragraph::new(lines).block(block).render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn row_text(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width).map(|x| buf[(x, y)].symbol()).collect()
    }

    fn entry(name: &str, rank: u32, delta: i32) -> LeaderboardEntry {
        LeaderboardEntry {
            team_id: Some(name.to_lowercase()),
            team_name: name.into(),
            rank,
            total_points: 40,
            delta,
            ..LeaderboardEntry::default()
        }
    }

    #[test]
    fn delta_labels_use_arrows() {
        assert_eq!(delta_label(&entry("A", 1, 2)), ("▲2".to_string(), Color::Green));
        assert_eq!(delta_label(&entry("A", 4, -3)), ("▼3".to_string(), Color::Red));
        assert_eq!(delta_label(&entry("A", 1, 0)).0, "-");
    }

    #[test]
    fn table_renders_header_and_rows_in_order() {
        let entries = [entry("Alpha", 1, 1), entry("Bravo", 2, -1)];
        let area = Rect::new(0, 0, 50, 4);
        let mut buf = Buffer::empty(area);
        StandingsTable { entries: &entries, selected: Some(0) }.render(area, &mut buf);

        assert!(row_text(&buf, 0).contains("Team"));
        assert!(row_text(&buf, 1).contains("Alpha"));
        assert!(row_text(&buf, 1).contains("▲1"));
        assert!(row_text(&buf, 2).contains("Bravo"));
        assert!(row_text(&buf, 2).contains("▼1"));
    }

    #[test]
    fn toast_sits_in_bottom_right() {
        let notice = RankNotice {
            message: "Alpha moved UP by 1 rank".into(),
            tone: Tone::Positive,
            at: Local::now(),
        };
        let notices = [&notice];
        let toast = NoticeToast { notices: &notices };
        let area = toast.area(Rect::new(0, 0, 80, 24));
        assert_eq!(area.height, 3);
        assert_eq!(area.x + area.width, 79);
        assert_eq!(area.y + area.height, 23);
    }

    #[test]
    fn toast_width_is_capped_for_huge_team_names() {
        let notice = RankNotice {
            message: "x".repeat(70_000),
            tone: Tone::Negative,
            at: Local::now(),
        };
        let notices = [&notice];
        let toast = NoticeToast { notices: &notices };
        let area = toast.area(Rect::new(0, 0, 80, 24));
        assert_eq!(area.width, 78);
        assert_eq!(area.x + area.width, 79);
    }
}
