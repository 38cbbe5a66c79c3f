//! Command frames sent to the keyer and classification of the bytes it sends
//! back.
//!
//! Outbound frames are short and positional:
//!
//! ```text
//! ┌────────┬──────────┬──────────┬─────┬─────┐
//! │ opcode │ operand  │ operand  │  0  │  0  │   (zero-filled, fixed length)
//! └────────┴──────────┴──────────┴─────┴─────┘
//! ```
//!
//! Inbound bytes are classified by their two high bits alone.
//!
//! A pot byte (`10xxxxxx`) carries at most 63 on the wire, so with the
//! 0-127 rescale a physical pot tops out near the middle of its range
//! (about 20 WPM for 5-35).

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Admin prefix; followed by a sub-command byte.
pub const OP_ADMIN: u8 = 0x00;
pub const OP_SPEED_DIRECT: u8 = 0x02;
pub const OP_WEIGHTING: u8 = 0x03;
pub const OP_PTT_TIMING: u8 = 0x04;
pub const OP_POT_RANGE: u8 = 0x05;
pub const OP_PIN_CONFIG: u8 = 0x09;
pub const OP_CLEAR_BUFFER: u8 = 0x0A;
pub const OP_FARNSWORTH: u8 = 0x0D;
pub const OP_MODE: u8 = 0x0E;
pub const OP_KEY_COMPENSATION: u8 = 0x11;
pub const OP_RATIO: u8 = 0x17;
pub const OP_SPEED_BUFFERED: u8 = 0x1C;

/// Admin sub-command that opens the host session and returns the firmware
/// revision.
pub const ADMIN_HOST_OPEN: u8 = 0x02;

pub const PIN_SPEAKER_ON: u8 = 0x0F;
pub const PIN_SPEAKER_OFF: u8 = 0x0D;
pub const PIN_CUSTOM: u8 = 0x07;

/// Highest speed-pot position reported by the device.
pub const POT_POSITION_MAX: u8 = 127;

pub const SPEED_RANGE: (u16, u16) = (5, 99);
pub const WEIGHTING_RANGE: (u16, u16) = (10, 90);
pub const FARNSWORTH_RANGE: (u16, u16) = (10, 99);
pub const RATIO_RANGE: (u16, u16) = (33, 66);
pub const KEY_COMPENSATION_RANGE: (u16, u16) = (0, 250);
pub const PTT_DELAY_RANGE: (u16, u16) = (0, 250);

const MAX_FRAME_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// An operand fell outside the range the device accepts.
    #[error("{what} {value} out of range ({min}-{max})")]
    OutOfRange {
        what: &'static str,
        value: u16,
        min: u16,
        max: u16,
    },

    /// The speed pot range is empty or inverted.
    #[error("invalid speed pot range {min}-{max} WPM (need 5 <= min < max <= 99)")]
    InvalidPotRange { min: u16, max: u16 },
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum KeyerMode {
    #[default]
    #[strum(serialize = "Iambic B")]
    IambicB,
    #[strum(serialize = "Iambic A")]
    IambicA,
    Ultimatic,
    Bug,
}

impl KeyerMode {
    pub fn mode_byte(self) -> u8 {
        match self {
            KeyerMode::IambicB => 0xC4,
            KeyerMode::IambicA => 0xD4,
            KeyerMode::Ultimatic => 0xE4,
            KeyerMode::Bug => 0xF4,
        }
    }
}

/// Everything the host can ask of the keyer.
///
/// Operands are carried wide so out-of-range requests can be rejected rather
/// than truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    HostOpen,
    ClearBuffer,
    SetMode(KeyerMode),
    SetSpeed { wpm: u16, buffered: bool },
    SetWeighting(u16),
    SetFarnsworth(u16),
    SetRatio(u16),
    SetKeyCompensation(u16),
    SetPinConfig(u8),
    /// Both delays in milliseconds; sent in tens of milliseconds.
    SetPttTiming { lead_in_ms: u16, tail_ms: u16 },
    SetPotRange { min_wpm: u16, max_wpm: u16 },
}

/// An encoded command, immutable once built.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl Frame {
    fn new(bytes: &[u8]) -> Self {
        let mut buf = [0u8; MAX_FRAME_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Self {
            bytes: buf,
            len: bytes.len(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame[")?;
        for (i, b) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{b:02X}")?;
        }
        write!(f, "]")
    }
}

fn check(what: &'static str, value: u16, (min, max): (u16, u16)) -> Result<u8, ProtocolError> {
    if value < min || value > max {
        return Err(ProtocolError::OutOfRange {
            what,
            value,
            min,
            max,
        });
    }
    Ok(value as u8)
}

/// The opcode used for speed changes, chosen by configuration.
pub fn speed_opcode(buffered: bool) -> u8 {
    if buffered {
        OP_SPEED_BUFFERED
    } else {
        OP_SPEED_DIRECT
    }
}

/// Validate and encode a command. Nothing is built for an invalid operand.
pub fn encode(command: &Command) -> Result<Frame, ProtocolError> {
    let frame = match *command {
        Command::HostOpen => Frame::new(&[OP_ADMIN, ADMIN_HOST_OPEN]),
        Command::ClearBuffer => Frame::new(&[OP_CLEAR_BUFFER]),
        Command::SetMode(mode) => Frame::new(&[OP_MODE, mode.mode_byte()]),
        Command::SetSpeed { wpm, buffered } => {
            Frame::new(&[speed_opcode(buffered), check("speed", wpm, SPEED_RANGE)?])
        }
        Command::SetWeighting(pct) => {
            Frame::new(&[OP_WEIGHTING, check("weighting", pct, WEIGHTING_RANGE)?])
        }
        Command::SetFarnsworth(wpm) => {
            Frame::new(&[OP_FARNSWORTH, check("farnsworth speed", wpm, FARNSWORTH_RANGE)?])
        }
        Command::SetRatio(ratio) => {
            Frame::new(&[OP_RATIO, check("dit/dah ratio", ratio, RATIO_RANGE)?])
        }
        Command::SetKeyCompensation(ms) => Frame::new(&[
            OP_KEY_COMPENSATION,
            check("key compensation", ms, KEY_COMPENSATION_RANGE)?,
        ]),
        Command::SetPinConfig(pins) => Frame::new(&[OP_PIN_CONFIG, pins]),
        Command::SetPttTiming { lead_in_ms, tail_ms } => {
            let lead = check("PTT lead-in", lead_in_ms, PTT_DELAY_RANGE)? / 10;
            let tail = check("PTT tail", tail_ms, PTT_DELAY_RANGE)? / 10;
            Frame::new(&[OP_PTT_TIMING, lead, tail, 0, 0])
        }
        Command::SetPotRange { min_wpm, max_wpm } => {
            let range = PotRange::new(min_wpm, max_wpm)?;
            Frame::new(&[OP_POT_RANGE, range.min, range.span(), 0])
        }
    };
    Ok(frame)
}

/// What one inbound byte means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// `10xxxxxx`: speed pot position.
    Telemetry(u8),
    /// `11xxxxxx`: acknowledgement / status.
    Status(u8),
    /// Echoed character in 32..=126.
    Printable(char),
    Ignored(u8),
}

/// Classify a device byte by its two high bits.
pub fn classify(byte: u8) -> Inbound {
    match byte & 0xC0 {
        0x80 => Inbound::Telemetry(byte & 0x7F),
        0xC0 => Inbound::Status(byte),
        _ if (32..=126).contains(&byte) => Inbound::Printable(byte as char),
        _ => Inbound::Ignored(byte),
    }
}

/// Validated speed pot range in WPM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PotRange {
    min: u8,
    max: u8,
}

impl PotRange {
    pub fn new(min_wpm: u16, max_wpm: u16) -> Result<Self, ProtocolError> {
        if min_wpm < SPEED_RANGE.0 || max_wpm <= min_wpm || max_wpm > SPEED_RANGE.1 {
            return Err(ProtocolError::InvalidPotRange {
                min: min_wpm,
                max: max_wpm,
            });
        }
        Ok(Self {
            min: min_wpm as u8,
            max: max_wpm as u8,
        })
    }

    pub fn span(&self) -> u8 {
        self.max - self.min
    }

    /// Map a pot position (0..=127) linearly onto `[min, max]`, rounding to
    /// the nearest WPM.
    pub fn rescale(&self, position: u8) -> u16 {
        let position = u32::from(position.min(POT_POSITION_MAX));
        let max = u32::from(POT_POSITION_MAX);
        let offset = (position * u32::from(self.span()) + max / 2) / max;
        self.min as u16 + offset as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn two_byte_commands_carry_operand_second() {
        let cases = [
            (Command::SetSpeed { wpm: 25, buffered: false }, [OP_SPEED_DIRECT, 25]),
            (Command::SetSpeed { wpm: 25, buffered: true }, [OP_SPEED_BUFFERED, 25]),
            (Command::SetWeighting(50), [OP_WEIGHTING, 50]),
            (Command::SetFarnsworth(10), [OP_FARNSWORTH, 10]),
            (Command::SetRatio(66), [OP_RATIO, 66]),
            (Command::SetKeyCompensation(250), [OP_KEY_COMPENSATION, 250]),
            (Command::SetPinConfig(PIN_SPEAKER_OFF), [OP_PIN_CONFIG, 0x0D]),
            (Command::SetMode(KeyerMode::Ultimatic), [OP_MODE, 0xE4]),
            (Command::HostOpen, [OP_ADMIN, ADMIN_HOST_OPEN]),
        ];
        for (cmd, expected) in cases {
            let frame = encode(&cmd).unwrap();
            assert_eq!(frame.as_bytes(), &expected, "{cmd:?}");
        }
    }

    #[test]
    fn single_opcode_command_is_one_byte() {
        let frame = encode(&Command::ClearBuffer).unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.opcode(), OP_CLEAR_BUFFER);
    }

    #[test]
    fn speed_bounds_are_inclusive() {
        for wpm in SPEED_RANGE.0..=SPEED_RANGE.1 {
            let frame = encode(&Command::SetSpeed { wpm, buffered: false }).unwrap();
            assert_eq!(frame.as_bytes()[1] as u16, wpm);
        }
        assert_matches!(
            encode(&Command::SetSpeed { wpm: 4, buffered: false }),
            Err(ProtocolError::OutOfRange { value: 4, min: 5, max: 99, .. })
        );
        assert!(encode(&Command::SetSpeed { wpm: 100, buffered: true }).is_err());
    }

    #[test]
    fn out_of_range_operands_are_rejected() {
        assert!(encode(&Command::SetWeighting(9)).is_err());
        assert!(encode(&Command::SetWeighting(91)).is_err());
        assert!(encode(&Command::SetFarnsworth(9)).is_err());
        assert!(encode(&Command::SetRatio(32)).is_err());
        assert!(encode(&Command::SetRatio(67)).is_err());
        assert!(encode(&Command::SetKeyCompensation(251)).is_err());
        assert!(encode(&Command::SetPttTiming { lead_in_ms: 260, tail_ms: 0 }).is_err());
        assert!(encode(&Command::SetPttTiming { lead_in_ms: 0, tail_ms: 300 }).is_err());
    }

    #[test]
    fn ptt_frame_is_five_bytes_in_tens_of_ms() {
        let frame = encode(&Command::SetPttTiming {
            lead_in_ms: 120,
            tail_ms: 0,
        })
        .unwrap();
        assert_eq!(frame.as_bytes(), &[OP_PTT_TIMING, 12, 0, 0, 0]);

        let frame = encode(&Command::SetPttTiming {
            lead_in_ms: 0,
            tail_ms: 250,
        })
        .unwrap();
        assert_eq!(frame.as_bytes(), &[OP_PTT_TIMING, 0, 25, 0, 0]);
    }

    #[test]
    fn pot_range_frame_carries_min_and_span() {
        let frame = encode(&Command::SetPotRange {
            min_wpm: 10,
            max_wpm: 40,
        })
        .unwrap();
        assert_eq!(frame.as_bytes(), &[OP_POT_RANGE, 10, 30, 0]);
        assert_matches!(
            encode(&Command::SetPotRange { min_wpm: 30, max_wpm: 30 }),
            Err(ProtocolError::InvalidPotRange { .. })
        );
    }

    #[test]
    fn classify_by_high_bits() {
        assert_eq!(classify(0x80), Inbound::Telemetry(0));
        assert_eq!(classify(0x80 | 40), Inbound::Telemetry(40));
        assert_eq!(classify(0xC4), Inbound::Status(0xC4));
        assert_eq!(classify(b'A'), Inbound::Printable('A'));
        assert_eq!(classify(b' '), Inbound::Printable(' '));
        assert_eq!(classify(b'~'), Inbound::Printable('~'));
        assert_eq!(classify(0x7F), Inbound::Ignored(0x7F));
        assert_eq!(classify(b'\r'), Inbound::Ignored(b'\r'));
    }

    #[test]
    fn classify_is_stateless() {
        let first: Vec<Inbound> = (0..=255u8).map(classify).collect();
        let second: Vec<Inbound> = (0..=255u8).rev().map(classify).collect();
        let reversed: Vec<Inbound> = second.into_iter().rev().collect();
        assert_eq!(first, reversed);
    }

    #[test]
    fn rescale_hits_both_ends() {
        let range = PotRange::new(5, 35).unwrap();
        assert_eq!(range.rescale(0), 5);
        assert_eq!(range.rescale(127), 35);
        assert_eq!(range.rescale(65), 20);
    }

    #[test]
    fn rescale_is_monotonic() {
        let range = PotRange::new(5, 35).unwrap();
        let speeds: Vec<u16> = (0..=POT_POSITION_MAX).map(|p| range.rescale(p)).collect();
        assert!(speeds.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn misconfigured_pot_range_is_an_error() {
        assert!(PotRange::new(35, 5).is_err());
        assert!(PotRange::new(20, 20).is_err());
        assert!(PotRange::new(0, 20).is_err());
        assert!(PotRange::new(4, 20).is_err());
        assert!(PotRange::new(10, 120).is_err());
    }

    #[test]
    fn frame_debug_is_hex() {
        let frame = encode(&Command::SetSpeed { wpm: 20, buffered: true }).unwrap();
        assert_eq!(format!("{frame:?}"), "Frame[1C 14]");
    }
}
