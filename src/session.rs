//! The practice loop: a single-threaded multiplexer over the keyboard, the
//! keyer link and (in timed mode) the per-item deadline.
//!
//! Each iteration waits at most one poll interval for a keystroke, then takes
//! at most one device byte. An ESC from the keyboard is acted on before
//! anything else in the same iteration.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, trace, warn};

use crate::error::Result;
use crate::link::Link;
use crate::practice::{
    is_correct, key_action, ActiveItem, ExitReason, KeyAction, Practice, PracticeMode,
    SessionResult,
};
use crate::protocol::{classify, Inbound, KeyerMode, PotRange, ProtocolError, PIN_SPEAKER_ON};
use crate::runtime::{StopFlag, Ticker};
use crate::telemetry::SpeedFeedback;
use crate::terminal::KeySource;
use crate::ui::{ItemView, Screen, Verdict, View};

/// Keyer settings shared by every command sent during a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub current_wpm: u16,
    pub pot_min_wpm: u16,
    pub pot_max_wpm: u16,
    pub use_buffered_speed_change: bool,
    pub pin_config: u8,
    pub keyer_mode: KeyerMode,
    pub ptt_lead_in_ms: u16,
    pub ptt_tail_ms: u16,
    /// Timing adjustments last sent with `set`; `None` leaves the keyer's own.
    pub weighting: Option<u16>,
    pub farnsworth_wpm: Option<u16>,
    pub ratio: Option<u16>,
    pub key_compensation_ms: Option<u16>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            current_wpm: 20,
            pot_min_wpm: 5,
            pot_max_wpm: 35,
            use_buffered_speed_change: false,
            pin_config: PIN_SPEAKER_ON,
            keyer_mode: KeyerMode::IambicB,
            ptt_lead_in_ms: 0,
            ptt_tail_ms: 0,
            weighting: None,
            farnsworth_wpm: None,
            ratio: None,
            key_compensation_ms: None,
        }
    }
}

impl SessionConfig {
    pub fn pot_range(&self) -> std::result::Result<PotRange, ProtocolError> {
        PotRange::new(self.pot_min_wpm, self.pot_max_wpm)
    }
}

/// How one item ended, before it is sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemEnd {
    Finalized,
    TimedOut,
    Aborted,
    Interrupted,
    LinkFailed(String),
    TerminalFailed(String),
}

/// Result of the timed-mode start gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Begin,
    Aborted,
    Interrupted,
    LinkFailed(String),
    TerminalFailed(String),
}

pub struct Session<'c, L: Link, K: KeySource, S: Screen, T: Ticker> {
    link: L,
    keys: K,
    screen: S,
    ticker: T,
    config: &'c mut SessionConfig,
    feedback: SpeedFeedback,
    stop: StopFlag,
    feedback_pause: Duration,
    device_busy: bool,
}

impl<'c, L: Link, K: KeySource, S: Screen, T: Ticker> Session<'c, L, K, S, T> {
    /// Takes ownership of the link for the session's lifetime. Fails if the
    /// speed pot range is misconfigured.
    pub fn new(
        link: L,
        keys: K,
        screen: S,
        ticker: T,
        config: &'c mut SessionConfig,
        stop: StopFlag,
    ) -> Result<Self> {
        let feedback = SpeedFeedback::from_config(config)?;
        Ok(Self {
            link,
            keys,
            screen,
            ticker,
            config,
            feedback,
            stop,
            feedback_pause: Duration::ZERO,
            device_busy: false,
        })
    }

    /// Pause after showing a verdict.
    pub fn with_feedback_pause(mut self, pause: Duration) -> Self {
        self.feedback_pause = pause;
        self
    }

    pub fn current_wpm(&self) -> u16 {
        self.config.current_wpm
    }

    fn draw(&mut self, view: &View<'_>) {
        if let Err(e) = self.screen.draw(view) {
            warn!("redraw failed: {e}");
        }
    }

    fn draw_item(
        &mut self,
        item: &ActiveItem,
        total: usize,
        mode: PracticeMode,
        verdict: Option<Verdict>,
    ) {
        let view = View::Item(ItemView {
            wpm: self.config.current_wpm,
            index: item.index(),
            total,
            target: item.target(),
            typed: item.typed(),
            remaining: mode.limit().map(|limit| item.remaining(limit)),
            verdict,
        });
        self.draw(&view);
    }

    /// Feed one pot reading through the speed loop. Returns true when the
    /// speed changed; a failed write is fatal.
    fn on_telemetry(&mut self, position: u8) -> std::result::Result<bool, String> {
        match self.feedback.apply(position, self.config) {
            Ok(Some(change)) => {
                if let Err(e) = self.link.send(&change.frame) {
                    error!("speed update write failed: {e}");
                    return Err(e.to_string());
                }
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                warn!("speed pot reading rejected: {e}");
                Ok(false)
            }
        }
    }

    /// Take at most one device byte. `Ok(None)` when nothing was pending.
    fn read_device(&mut self) -> std::result::Result<Option<Inbound>, String> {
        match self.link.try_read() {
            Ok(Some(byte)) => {
                self.device_busy = true;
                Ok(Some(classify(byte)))
            }
            Ok(None) => {
                self.device_busy = false;
                Ok(None)
            }
            Err(e) => {
                error!("keyer read failed: {e}");
                Err(e.to_string())
            }
        }
    }

    /// A failed keyboard read ends the session; the terminal is gone.
    fn poll_key(&mut self) -> std::result::Result<Option<u8>, String> {
        // Device bytes waiting: don't sit on the keyboard.
        let wait = if self.device_busy {
            Duration::ZERO
        } else {
            self.ticker.interval()
        };
        self.keys.poll_byte(wait).map_err(|e| {
            error!("keyboard read failed: {e}");
            e.to_string()
        })
    }

    /// Timed-mode gate: wait for Space/Enter before the first item. Speed pot
    /// changes are applied while waiting.
    pub fn wait_for_start(&mut self, limit: Duration, total: usize) -> StartOutcome {
        let gate = |wpm| View::StartGate { wpm, limit, total };
        self.draw(&gate(self.config.current_wpm));
        loop {
            if self.stop.is_stopped() {
                return StartOutcome::Interrupted;
            }
            let key = match self.poll_key() {
                Ok(key) => key,
                Err(msg) => return StartOutcome::TerminalFailed(msg),
            };
            if let Some(byte) = key {
                match key_action(byte) {
                    KeyAction::Abort => return StartOutcome::Aborted,
                    KeyAction::Finalize => return StartOutcome::Begin,
                    _ => {}
                }
            }
            match self.read_device() {
                Ok(Some(Inbound::Telemetry(position))) => match self.on_telemetry(position) {
                    Ok(true) => self.draw(&gate(self.config.current_wpm)),
                    Ok(false) => {}
                    Err(msg) => return StartOutcome::LinkFailed(msg),
                },
                Ok(_) => {}
                Err(msg) => return StartOutcome::LinkFailed(msg),
            }
        }
    }

    /// Apply one action to the item. Returns `(finished, needs_redraw)`.
    fn edit(item: &mut ActiveItem, action: KeyAction) -> (bool, bool) {
        match action {
            KeyAction::Append(c) => {
                item.push(c);
                (false, true)
            }
            KeyAction::Backspace => {
                item.backspace();
                (false, true)
            }
            KeyAction::Finalize => (true, false),
            KeyAction::Abort | KeyAction::Ignore => (false, false),
        }
    }

    fn drive_item(&mut self, item: &mut ActiveItem, total: usize, mode: PracticeMode) -> ItemEnd {
        let mut shown_tenths = None;
        loop {
            if self.stop.is_stopped() {
                return ItemEnd::Interrupted;
            }

            let action = match self.poll_key() {
                Ok(key) => key.map(key_action),
                Err(msg) => return ItemEnd::TerminalFailed(msg),
            };
            if action == Some(KeyAction::Abort) {
                return ItemEnd::Aborted;
            }

            if let Some(limit) = mode.limit() {
                if item.is_expired(limit) {
                    return ItemEnd::TimedOut;
                }
            }

            let mut redraw = false;
            if let Some(action) = action {
                let (done, changed) = Self::edit(item, action);
                if done {
                    return ItemEnd::Finalized;
                }
                redraw |= changed;
            }

            match self.read_device() {
                Ok(Some(Inbound::Telemetry(position))) => match self.on_telemetry(position) {
                    Ok(changed) => redraw |= changed,
                    Err(msg) => return ItemEnd::LinkFailed(msg),
                },
                Ok(Some(Inbound::Printable(c))) => {
                    let (done, changed) = Self::edit(item, key_action(c as u8));
                    if done {
                        return ItemEnd::Finalized;
                    }
                    redraw |= changed;
                }
                Ok(Some(Inbound::Status(byte))) => trace!(byte, "status byte ignored"),
                Ok(Some(Inbound::Ignored(byte))) => trace!(byte, "device byte ignored"),
                Ok(None) => {}
                Err(msg) => return ItemEnd::LinkFailed(msg),
            }

            if let Some(limit) = mode.limit() {
                let tenths = item.remaining(limit).as_millis() / 100;
                if shown_tenths != Some(tenths) {
                    shown_tenths = Some(tenths);
                    redraw = true;
                }
            }
            if redraw {
                self.draw_item(item, total, mode, None);
            }
        }
    }

    fn show_verdict(
        &mut self,
        item: &ActiveItem,
        total: usize,
        mode: PracticeMode,
        verdict: Verdict,
    ) {
        self.draw_item(item, total, mode, Some(verdict));
        let pause = match (mode, verdict) {
            (PracticeMode::Untimed, _) | (_, Verdict::TimeExpired) => self.feedback_pause,
            _ => Duration::ZERO,
        };
        if !pause.is_zero() {
            thread::sleep(pause);
        }
    }

    /// Run every item in the pool. Always produces a result; the reason the
    /// loop ended is recorded in it. The link is closed when this returns.
    pub fn run(mut self, mut practice: Practice) -> SessionResult {
        let mode = practice.mode();
        let total = practice.total();
        info!(
            total,
            timed = mode.is_timed(),
            wpm = self.config.current_wpm,
            "session start"
        );

        let exit = loop {
            if self.stop.is_stopped() {
                break ExitReason::Interrupted;
            }
            let Some(mut item) = practice.next_item() else {
                break ExitReason::Completed;
            };
            self.draw_item(&item, total, mode, None);

            match self.drive_item(&mut item, total, mode) {
                ItemEnd::Finalized => {
                    let verdict = if is_correct(item.target(), item.typed()) {
                        Verdict::Success
                    } else {
                        Verdict::Incorrect
                    };
                    self.show_verdict(&item, total, mode, verdict);
                    practice.record(item.finalize());
                }
                ItemEnd::TimedOut => {
                    self.show_verdict(&item, total, mode, Verdict::TimeExpired);
                    practice.record(item.time_out());
                }
                ItemEnd::Aborted => {
                    info!(item = item.index() + 1, "practice aborted");
                    practice.abort(item);
                    break ExitReason::Aborted;
                }
                ItemEnd::Interrupted => break ExitReason::Interrupted,
                ItemEnd::LinkFailed(msg) => break ExitReason::LinkFailed(msg),
                ItemEnd::TerminalFailed(msg) => break ExitReason::TerminalFailed(msg),
            }
        };

        let result = practice.finish(exit);
        info!(
            right = result.right,
            wrong = result.wrong,
            exit = %result.exit,
            "session finished"
        );
        result
    }
}
