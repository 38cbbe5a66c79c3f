//! Per-item bookkeeping: typed buffers, sealed attempts and the session tally.
//! Pure state, no I/O.

use std::time::{Duration, Instant};

use crate::terminal::{BACKSPACE, CR, DELETE, ESC, LF};

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Correct,
    Incorrect,
    TimedOut,
    Aborted,
}

#[derive(Clone, Debug, Copy, PartialEq)]
pub enum PracticeMode {
    Untimed,
    /// Each item must be finalized within the limit.
    Timed(Duration),
}

impl PracticeMode {
    pub fn limit(&self) -> Option<Duration> {
        match self {
            PracticeMode::Untimed => None,
            PracticeMode::Timed(limit) => Some(*limit),
        }
    }

    pub fn is_timed(&self) -> bool {
        self.limit().is_some()
    }
}

/// What an operator byte does to the current item.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Append(char),
    Backspace,
    Finalize,
    Abort,
    Ignore,
}

pub fn key_action(byte: u8) -> KeyAction {
    match byte {
        ESC => KeyAction::Abort,
        b' ' | CR | LF => KeyAction::Finalize,
        BACKSPACE | DELETE => KeyAction::Backspace,
        32..=126 => KeyAction::Append((byte as char).to_ascii_uppercase()),
        _ => KeyAction::Ignore,
    }
}

/// Case-insensitive comparison with trailing whitespace ignored.
pub fn is_correct(target: &str, typed: &str) -> bool {
    target.trim_end().eq_ignore_ascii_case(typed.trim_end())
}

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Displayed, nothing typed yet.
    Armed,
    Typing,
}

/// The item currently being answered. Consumed when it is sealed.
#[derive(Debug)]
pub struct ActiveItem {
    index: usize,
    target: String,
    typed: String,
    state: ItemState,
    started_at: Instant,
}

impl ActiveItem {
    pub fn arm(index: usize, target: String) -> Self {
        Self {
            index,
            target,
            typed: String::new(),
            state: ItemState::Armed,
            started_at: Instant::now(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn typed(&self) -> &str {
        &self.typed
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn push(&mut self, c: char) {
        self.typed.push(c.to_ascii_uppercase());
        self.state = ItemState::Typing;
    }

    pub fn backspace(&mut self) {
        self.typed.pop();
        self.state = ItemState::Typing;
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn remaining(&self, limit: Duration) -> Duration {
        limit.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self, limit: Duration) -> bool {
        self.elapsed() >= limit
    }

    /// Terminator received: score the buffer.
    pub fn finalize(self) -> ItemAttempt {
        let outcome = if is_correct(&self.target, &self.typed) {
            Outcome::Correct
        } else {
            Outcome::Incorrect
        };
        self.seal(outcome)
    }

    pub fn time_out(self) -> ItemAttempt {
        self.seal(Outcome::TimedOut)
    }

    pub fn abort(self) -> ItemAttempt {
        self.seal(Outcome::Aborted)
    }

    fn seal(self, outcome: Outcome) -> ItemAttempt {
        ItemAttempt {
            elapsed: self.started_at.elapsed(),
            target: self.target,
            typed: self.typed.trim_end().to_string(),
            outcome,
        }
    }
}

/// A finished attempt; read-only.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemAttempt {
    target: String,
    typed: String,
    outcome: Outcome,
    elapsed: Duration,
}

impl ItemAttempt {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn typed(&self) -> &str {
        &self.typed
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Why the session loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitReason {
    Completed,
    /// ESC from the operator.
    Aborted,
    /// External interrupt.
    Interrupted,
    LinkFailed(String),
    /// The keyboard could no longer be read.
    TerminalFailed(String),
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Completed => write!(f, "completed"),
            ExitReason::Aborted => write!(f, "aborted"),
            ExitReason::Interrupted => write!(f, "interrupted"),
            ExitReason::LinkFailed(msg) => write!(f, "link failed: {msg}"),
            ExitReason::TerminalFailed(msg) => write!(f, "terminal failed: {msg}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionResult {
    pub items_total: usize,
    pub right: usize,
    pub wrong: usize,
    pub attempts: Vec<ItemAttempt>,
    /// Timed mode only: (target, final typed buffer) for each miss.
    pub missed: Vec<(String, String)>,
    pub exit: ExitReason,
}

impl SessionResult {
    pub fn score_percent(&self) -> f64 {
        if self.items_total == 0 {
            return 0.0;
        }
        100.0 * self.right as f64 / self.items_total as f64
    }
}

/// Owns the item pool, the sealed attempts and the right/wrong tally.
#[derive(Debug)]
pub struct Practice {
    items: Vec<String>,
    mode: PracticeMode,
    next: usize,
    attempts: Vec<ItemAttempt>,
    right: usize,
    wrong: usize,
}

impl Practice {
    pub fn new(items: Vec<String>, mode: PracticeMode) -> Self {
        Self {
            items,
            mode,
            next: 0,
            attempts: Vec::new(),
            right: 0,
            wrong: 0,
        }
    }

    pub fn mode(&self) -> PracticeMode {
        self.mode
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Arm the next item, or `None` when the pool is exhausted.
    pub fn next_item(&mut self) -> Option<ActiveItem> {
        let target = self.items.get(self.next)?.clone();
        let item = ActiveItem::arm(self.next, target);
        self.next += 1;
        Some(item)
    }

    pub fn record(&mut self, attempt: ItemAttempt) {
        match attempt.outcome {
            Outcome::Correct => self.right += 1,
            Outcome::Pending => {}
            _ => self.wrong += 1,
        }
        self.attempts.push(attempt);
    }

    /// Seal the current item as aborted and count it plus every item not yet
    /// attempted as wrong.
    pub fn abort(&mut self, current: ActiveItem) {
        self.record(current.abort());
        self.wrong += self.items.len() - self.next;
        self.next = self.items.len();
    }

    pub fn finish(self, exit: ExitReason) -> SessionResult {
        let missed = if self.mode.is_timed() {
            self.attempts
                .iter()
                .filter(|a| matches!(a.outcome, Outcome::Incorrect | Outcome::TimedOut))
                .map(|a| (a.target.clone(), a.typed.clone()))
                .collect()
        } else {
            Vec::new()
        };
        SessionResult {
            items_total: self.items.len(),
            right: self.right,
            wrong: self.wrong,
            attempts: self.attempts,
            missed,
            exit,
        }
    }
}
