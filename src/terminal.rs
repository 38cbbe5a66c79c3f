//! Raw-mode terminal handling and the operator's keyboard as a byte source.

use std::io::{self, Stdout};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::runtime::StopFlag;

pub const ESC: u8 = 27;
pub const BACKSPACE: u8 = 8;
pub const DELETE: u8 = 127;
pub const CR: u8 = b'\r';
pub const LF: u8 = b'\n';

/// Holds the terminal in raw mode on the alternate screen. The previous mode
/// is restored when the guard is dropped, whichever way the scope is left.
pub struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    pub fn enter() -> Result<Self> {
        enable_raw_mode().map_err(Error::Terminal)?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(Error::Terminal(e));
        }
        let terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
            Ok(t) => t,
            Err(e) => {
                let _ = execute!(io::stdout(), LeaveAlternateScreen);
                let _ = disable_raw_mode();
                return Err(Error::Terminal(e));
            }
        };
        debug!("terminal in raw mode");
        Ok(Self { terminal })
    }

    pub fn terminal(&mut self) -> &mut Terminal<CrosstermBackend<Stdout>> {
        &mut self.terminal
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(e) = execute!(self.terminal.backend_mut(), LeaveAlternateScreen) {
            warn!("leaving alternate screen failed: {e}");
        }
        if let Err(e) = disable_raw_mode() {
            warn!("restoring terminal mode failed: {e}");
        }
        let _ = self.terminal.show_cursor();
        debug!("terminal restored");
    }
}

/// Source of operator keystrokes, already reduced to bytes.
pub trait KeySource {
    /// Wait up to `timeout` for one byte. `Ok(None)` when nothing arrived.
    fn poll_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>>;
}

impl<K: KeySource + ?Sized> KeySource for &mut K {
    fn poll_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        (**self).poll_byte(timeout)
    }
}

/// Reduce a key event to the byte the practice loop understands.
pub fn key_to_byte(key: &KeyEvent) -> Option<u8> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match key.code {
        KeyCode::Esc => Some(ESC),
        KeyCode::Enter => Some(CR),
        KeyCode::Backspace => Some(DELETE),
        KeyCode::Char(c) if c.is_ascii() && !key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(c as u8)
        }
        _ => None,
    }
}

/// Keyboard source backed by crossterm's event queue. Ctrl-C raises the stop
/// flag, since raw mode keeps SIGINT from being generated.
pub struct CrosstermKeySource {
    stop: StopFlag,
}

impl CrosstermKeySource {
    pub fn new(stop: StopFlag) -> Self {
        Self { stop }
    }
}

impl KeySource for CrosstermKeySource {
    fn poll_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key)
                if key.modifiers.contains(KeyModifiers::CONTROL)
                    && key.code == KeyCode::Char('c') =>
            {
                self.stop.request_stop();
                Ok(None)
            }
            Event::Key(key) => Ok(key_to_byte(&key)),
            _ => Ok(None),
        }
    }
}

/// Test keyboard fed through a channel.
pub struct TestKeySource {
    rx: Receiver<u8>,
}

impl TestKeySource {
    pub fn new(rx: Receiver<u8>) -> Self {
        Self { rx }
    }
}

impl KeySource for TestKeySource {
    fn poll_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        match self.rx.recv_timeout(timeout) {
            Ok(b) => Ok(Some(b)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}
