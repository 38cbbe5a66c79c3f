use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::Result;
use crate::link::Link;
use crate::protocol::{encode, Command};
use crate::session::SessionConfig;

/// Delays the keyer needs while it digests each setup command.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeTiming {
    /// How long to wait for the firmware revision byte.
    pub id_wait: Duration,
    pub settle: Duration,
}

impl Default for HandshakeTiming {
    fn default() -> Self {
        Self {
            id_wait: Duration::from_millis(300),
            settle: Duration::from_millis(200),
        }
    }
}

impl HandshakeTiming {
    pub fn immediate() -> Self {
        Self {
            id_wait: Duration::ZERO,
            settle: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub firmware: Option<u8>,
}

fn read_within<L: Link>(link: &mut L, wait: Duration) -> Result<Option<u8>> {
    let deadline = Instant::now() + wait;
    loop {
        if let Some(b) = link.try_read()? {
            return Ok(Some(b));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Open the host session and push the configured mode, speed and pin setup.
///
/// All frames are built before the first write, so a bad configuration
/// leaves the device untouched.
pub fn handshake<L: Link>(
    link: &mut L,
    config: &SessionConfig,
    timing: &HandshakeTiming,
) -> Result<DeviceInfo> {
    let open = encode(&Command::HostOpen)?;
    let setup = [
        encode(&Command::SetMode(config.keyer_mode))?,
        encode(&Command::SetSpeed {
            wpm: config.current_wpm,
            buffered: config.use_buffered_speed_change,
        })?,
        encode(&Command::SetPinConfig(config.pin_config))?,
    ];

    link.send(&open)?;
    let opened = Instant::now();
    let firmware = read_within(link, timing.id_wait)?;
    match firmware {
        Some(version) => info!(version, "keyer firmware"),
        None => warn!("no firmware version byte read"),
    }
    // the keyer is not ready for setup frames until the full id wait has
    // passed, even when its version byte came early
    thread::sleep(timing.id_wait.saturating_sub(opened.elapsed()));

    for frame in &setup {
        link.send(frame)?;
        thread::sleep(timing.settle);
    }
    info!(
        mode = %config.keyer_mode,
        wpm = config.current_wpm,
        pins = config.pin_config,
        "keyer initialized"
    );
    Ok(DeviceInfo { firmware })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::link::TestLink;
    use crate::protocol::{KeyerMode, ProtocolError};
    use std::io;

    // Records when each write happened.
    #[derive(Default)]
    struct StampedLink {
        inbound: Vec<u8>,
        writes: Vec<(Instant, Vec<u8>)>,
    }

    impl Link for StampedLink {
        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.writes.push((Instant::now(), bytes.to_vec()));
            Ok(())
        }

        fn try_read(&mut self) -> io::Result<Option<u8>> {
            Ok(self.inbound.pop())
        }
    }

    #[test]
    fn handshake_sends_setup_in_order() {
        let (mut link, handle) = TestLink::new();
        handle.push_inbound(&[31]);
        let config = SessionConfig::default();

        let info = handshake(&mut link, &config, &HandshakeTiming::immediate()).unwrap();

        assert_eq!(info.firmware, Some(31));
        assert_eq!(
            handle.written(),
            vec![0x00, 0x02, 0x0E, 0xC4, 0x02, 20, 0x09, 0x0F]
        );
    }

    #[test]
    fn missing_firmware_byte_is_not_fatal() {
        let (mut link, handle) = TestLink::new();
        let config = SessionConfig {
            use_buffered_speed_change: true,
            keyer_mode: KeyerMode::IambicA,
            current_wpm: 30,
            ..SessionConfig::default()
        };

        let info = handshake(&mut link, &config, &HandshakeTiming::immediate()).unwrap();

        assert_eq!(info.firmware, None);
        assert_eq!(
            handle.written(),
            vec![0x00, 0x02, 0x0E, 0xD4, 0x1C, 30, 0x09, 0x0F]
        );
    }

    #[test]
    fn early_firmware_byte_still_waits_before_setup() {
        let mut link = StampedLink {
            inbound: vec![31],
            ..StampedLink::default()
        };
        let timing = HandshakeTiming {
            id_wait: Duration::from_millis(60),
            settle: Duration::from_millis(20),
        };

        let info = handshake(&mut link, &SessionConfig::default(), &timing).unwrap();

        assert_eq!(info.firmware, Some(31));
        assert_eq!(link.writes.len(), 4);
        assert_eq!(link.writes[0].1, vec![0x00, 0x02]);
        assert_eq!(link.writes[1].1, vec![0x0E, 0xC4]);
        let gaps: Vec<Duration> = link
            .writes
            .windows(2)
            .map(|w| w[1].0.duration_since(w[0].0))
            .collect();
        assert!(gaps[0] >= timing.id_wait, "mode frame sent after {:?}", gaps[0]);
        assert!(gaps[1..].iter().all(|g| *g >= timing.settle));
    }

    #[test]
    fn invalid_speed_writes_nothing() {
        let (mut link, handle) = TestLink::new();
        let config = SessionConfig {
            current_wpm: 150,
            ..SessionConfig::default()
        };

        let err = handshake(&mut link, &config, &HandshakeTiming::immediate()).unwrap_err();

        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::OutOfRange { value: 150, .. })
        ));
        assert!(handle.written().is_empty());
    }

    #[test]
    fn write_failure_aborts() {
        let (mut link, handle) = TestLink::new();
        handle.fail_writes();
        let err = handshake(
            &mut link,
            &SessionConfig::default(),
            &HandshakeTiming::immediate(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Link(_)));
    }
}
