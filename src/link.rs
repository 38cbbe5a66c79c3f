use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::Frame;

pub const BAUD_RATE: u32 = 1200;

/// Read timeout applied to the port; reads are only issued once bytes are
/// pending, so this only bounds a misbehaving driver.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// A duplex byte channel to the keyer.
pub trait Link {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Return one pending byte, or `None` immediately if nothing is waiting.
    fn try_read(&mut self) -> io::Result<Option<u8>>;

    fn send(&mut self, frame: &Frame) -> io::Result<()> {
        debug!(?frame, "send");
        self.write_all(frame.as_bytes())
    }
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }

    fn try_read(&mut self) -> io::Result<Option<u8>> {
        (**self).try_read()
    }
}

/// The real serial port: 1200 baud, 8 data bits, 2 stop bits, no parity, no
/// flow control. Closed when dropped.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::Two)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| Error::LinkOpen {
                path: path.to_string(),
                source,
            })?;
        info!(path, baud = BAUD_RATE, "serial link open");
        Ok(Self { port })
    }
}

impl Link for SerialLink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn try_read(&mut self) -> io::Result<Option<u8>> {
        if self.port.bytes_to_read()? == 0 {
            return Ok(None);
        }
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        info!("serial link closed");
    }
}

#[derive(Debug, Default)]
struct TestLinkState {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    fail_writes: bool,
}

/// In-memory link for tests: inbound bytes are scripted through a
/// [`TestLinkHandle`], writes are recorded.
pub struct TestLink {
    state: Arc<Mutex<TestLinkState>>,
}

/// The test side of a [`TestLink`].
#[derive(Clone)]
pub struct TestLinkHandle {
    state: Arc<Mutex<TestLinkState>>,
}

impl TestLink {
    pub fn new() -> (Self, TestLinkHandle) {
        let state = Arc::new(Mutex::new(TestLinkState::default()));
        (
            Self {
                state: state.clone(),
            },
            TestLinkHandle { state },
        )
    }
}

impl Link for TestLink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock().expect("test link poisoned");
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device disconnected"));
        }
        state.written.extend_from_slice(bytes);
        Ok(())
    }

    fn try_read(&mut self) -> io::Result<Option<u8>> {
        Ok(self
            .state
            .lock()
            .expect("test link poisoned")
            .inbound
            .pop_front())
    }
}

impl TestLinkHandle {
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.state
            .lock()
            .expect("test link poisoned")
            .inbound
            .extend(bytes.iter().copied());
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().expect("test link poisoned").written.clone()
    }

    pub fn pending_inbound(&self) -> usize {
        self.state.lock().expect("test link poisoned").inbound.len()
    }

    pub fn fail_writes(&self) {
        self.state.lock().expect("test link poisoned").fail_writes = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode, Command};

    #[test]
    fn test_link_records_frames() {
        let (mut link, handle) = TestLink::new();
        let frame = encode(&Command::SetWeighting(50)).unwrap();
        link.send(&frame).unwrap();
        assert_eq!(handle.written(), vec![0x03, 50]);
    }

    #[test]
    fn test_link_reads_are_non_blocking() {
        let (mut link, handle) = TestLink::new();
        assert_eq!(link.try_read().unwrap(), None);
        handle.push_inbound(&[0x41, 0x80]);
        assert_eq!(link.try_read().unwrap(), Some(0x41));
        assert_eq!(link.try_read().unwrap(), Some(0x80));
        assert_eq!(link.try_read().unwrap(), None);
    }

    #[test]
    fn test_link_write_failure() {
        let (mut link, handle) = TestLink::new();
        handle.fail_writes();
        let err = link.write_all(&[0x0A]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(handle.written().is_empty());
    }

    #[test]
    fn open_missing_port_fails() {
        let result = SerialLink::open("/dev/keyerdrill-does-not-exist");
        assert!(matches!(result, Err(Error::LinkOpen { .. })));
    }
}
