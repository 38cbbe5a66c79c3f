use std::io;
use std::time::Duration;

use itertools::Itertools;
use ratatui::{
    backend::Backend,
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
    Terminal,
};

use crate::practice::{ExitReason, SessionResult};

const HORIZONTAL_MARGIN: u16 = 2;
const HINT: &str = "(Press ESC to quit, Space/Enter to finalize)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Incorrect,
    TimeExpired,
}

impl Verdict {
    fn text(self) -> &'static str {
        match self {
            Verdict::Success => "SUCCESS!",
            Verdict::Incorrect => "INCORRECT.",
            Verdict::TimeExpired => "TIME EXPIRED. INCORRECT.",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ItemView<'a> {
    pub wpm: u16,
    pub index: usize,
    pub total: usize,
    pub target: &'a str,
    pub typed: &'a str,
    /// Time left in timed mode.
    pub remaining: Option<Duration>,
    pub verdict: Option<Verdict>,
}

/// Everything the practice loop can put on screen.
#[derive(Debug, Clone)]
pub enum View<'a> {
    StartGate {
        wpm: u16,
        limit: Duration,
        total: usize,
    },
    Item(ItemView<'a>),
    Results {
        result: &'a SessionResult,
        timed: bool,
    },
}

impl View<'_> {
    fn wpm(&self) -> Option<u16> {
        match self {
            View::StartGate { wpm, .. } => Some(*wpm),
            View::Item(item) => Some(item.wpm),
            View::Results { .. } => None,
        }
    }

    fn lines(&self) -> Vec<Line<'_>> {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let hint_style = Style::default().add_modifier(Modifier::ITALIC | Modifier::DIM);

        match self {
            View::StartGate { limit, total, .. } => vec![
                Line::from(Span::styled("Speed Practice Setup Complete.", bold)),
                Line::default(),
                Line::from(format!(
                    "Time Limit per item: {} seconds",
                    limit.as_secs_f64()
                )),
                Line::from(format!("Total items: {total}")),
                Line::from("Adjust WPM if needed."),
                Line::default(),
                Line::from("Press SPACE (or Enter) to begin..."),
                Line::from(Span::styled("Press ESC to abort.", hint_style)),
            ],
            View::Item(item) => {
                let mut lines = Vec::new();
                if item.remaining.is_some() {
                    lines.push(Line::from(Span::styled("Speed Practice", bold)));
                }
                lines.push(Line::from(format!("Item {} of {}", item.index + 1, item.total)));
                lines.push(Line::from(vec![
                    Span::raw("TARGET: "),
                    Span::styled(item.target.to_uppercase(), bold.fg(Color::Cyan)),
                ]));
                lines.push(Line::default());
                match item.verdict {
                    Some(Verdict::Success) => lines.push(Line::from(Span::styled(
                        Verdict::Success.text(),
                        bold.fg(Color::Green),
                    ))),
                    Some(v) => lines.push(Line::from(Span::styled(v.text(), bold.fg(Color::Red)))),
                    None => {
                        lines.push(Line::from(format!("You typed: {}", item.typed)));
                        if let Some(remaining) = item.remaining {
                            lines.push(Line::from(Span::styled(
                                format!("Time left: {:.1}s", remaining.as_secs_f64()),
                                Style::default().fg(Color::Yellow),
                            )));
                        }
                        lines.push(Line::default());
                        lines.push(Line::from(Span::styled(HINT, hint_style)));
                    }
                }
                lines
            }
            View::Results { result, timed } => results_lines(result, *timed, bold),
        }
    }
}

fn results_lines(result: &SessionResult, timed: bool, bold: Style) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    match &result.exit {
        ExitReason::Completed => {}
        ExitReason::Aborted => lines.push(Line::from("Practice aborted.")),
        ExitReason::Interrupted => lines.push(Line::from("Practice interrupted.")),
        ExitReason::LinkFailed(msg) => lines.push(Line::from(Span::styled(
            format!("Keyer link lost: {msg}"),
            Style::default().fg(Color::Red),
        ))),
        ExitReason::TerminalFailed(msg) => lines.push(Line::from(Span::styled(
            format!("Keyboard lost: {msg}"),
            Style::default().fg(Color::Red),
        ))),
    }
    let title = if timed {
        "Speed Practice session finished!"
    } else {
        "Practice session finished!"
    };
    lines.push(Line::from(Span::styled(title, bold)));
    lines.push(Line::default());
    lines.push(Line::from(format!("Items asked: {}", result.items_total)));
    lines.push(Line::from(format!("Right: {}", result.right)));
    lines.push(Line::from(format!("Wrong: {}", result.wrong)));
    lines.push(Line::from(format!("Score: {:.1}%", result.score_percent())));

    if !result.missed.is_empty() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled("Missed Questions:", bold)));
        lines.extend(result.missed.iter().map(|(target, typed)| {
            Line::from(format!(
                "TARGET: {} | You answered: {}",
                target,
                if typed.is_empty() { "(no answer)" } else { typed }
            ))
        }));
    }
    lines.push(Line::default());
    lines.push(Line::from("Press any key to return..."));
    lines
}

/// Plain-text summary printed after the terminal is restored.
pub fn summary_text(result: &SessionResult) -> String {
    let mut out = format!(
        "Items asked: {}\nRight: {}\nWrong: {}\nScore: {:.1}%\n",
        result.items_total,
        result.right,
        result.wrong,
        result.score_percent()
    );
    if !result.missed.is_empty() {
        out.push_str("Missed: ");
        out.push_str(
            &result
                .missed
                .iter()
                .map(|(target, typed)| {
                    if typed.is_empty() {
                        format!("{target} (no answer)")
                    } else {
                        format!("{target} -> {typed}")
                    }
                })
                .join(", "),
        );
        out.push('\n');
    }
    if result.exit != ExitReason::Completed {
        out.push_str(&format!("Session {}\n", result.exit));
    }
    out
}

impl Widget for &View<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .constraints([Constraint::Length(1), Constraint::Min(0)])
            .split(area);

        if let Some(wpm) = self.wpm() {
            Paragraph::new(Span::styled(
                format!("WPM: {wpm}"),
                Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
            ))
            .alignment(Alignment::Right)
            .render(chunks[0], buf);
        }

        Paragraph::new(self.lines())
            .wrap(Wrap { trim: false })
            .render(chunks[1], buf);
    }
}

/// Where the practice loop draws.
pub trait Screen {
    fn draw(&mut self, view: &View<'_>) -> io::Result<()>;
}

impl<B: Backend> Screen for Terminal<B> {
    fn draw(&mut self, view: &View<'_>) -> io::Result<()> {
        Terminal::draw(self, |f| f.render_widget(view, f.area()))?;
        Ok(())
    }
}

impl<S: Screen + ?Sized> Screen for &mut S {
    fn draw(&mut self, view: &View<'_>) -> io::Result<()> {
        (**self).draw(view)
    }
}
