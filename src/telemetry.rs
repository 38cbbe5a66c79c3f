use tracing::info;

use crate::protocol::{encode, Command, Frame, PotRange, ProtocolError};
use crate::session::SessionConfig;

/// A speed change caused by the pot, with the frame that re-issues it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedChange {
    pub previous_wpm: u16,
    pub wpm: u16,
    pub frame: Frame,
}

/// Turns speed-pot readings into speed-set commands.
#[derive(Debug, Clone, Copy)]
pub struct SpeedFeedback {
    range: PotRange,
}

impl SpeedFeedback {
    pub fn new(range: PotRange) -> Self {
        Self { range }
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self, ProtocolError> {
        Ok(Self::new(config.pot_range()?))
    }

    /// Rescale `position` and update `current_wpm`. Returns the change only
    /// when the speed actually moved.
    pub fn apply(
        &self,
        position: u8,
        config: &mut SessionConfig,
    ) -> Result<Option<SpeedChange>, ProtocolError> {
        let wpm = self.range.rescale(position);
        if wpm == config.current_wpm {
            return Ok(None);
        }
        let frame = encode(&Command::SetSpeed {
            wpm,
            buffered: config.use_buffered_speed_change,
        })?;
        let previous_wpm = config.current_wpm;
        config.current_wpm = wpm;
        info!(position, previous_wpm, wpm, "speed pot moved");
        Ok(Some(SpeedChange {
            previous_wpm,
            wpm,
            frame,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{OP_SPEED_BUFFERED, OP_SPEED_DIRECT};

    fn config() -> SessionConfig {
        SessionConfig {
            current_wpm: 12,
            pot_min_wpm: 5,
            pot_max_wpm: 35,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn pot_move_reissues_speed() {
        let mut cfg = config();
        let feedback = SpeedFeedback::from_config(&cfg).unwrap();

        let change = feedback.apply(65, &mut cfg).unwrap().unwrap();
        assert_eq!(change.previous_wpm, 12);
        assert_eq!(change.wpm, 20);
        assert_eq!(change.frame.as_bytes(), &[OP_SPEED_DIRECT, 20]);
        assert_eq!(cfg.current_wpm, 20);
    }

    #[test]
    fn unchanged_speed_sends_nothing() {
        let mut cfg = config();
        let feedback = SpeedFeedback::from_config(&cfg).unwrap();
        assert!(feedback.apply(65, &mut cfg).unwrap().is_some());
        assert!(feedback.apply(65, &mut cfg).unwrap().is_none());
        // 64 still rounds to 20
        assert!(feedback.apply(64, &mut cfg).unwrap().is_none());
        assert!(feedback.apply(66, &mut cfg).unwrap().is_some());
    }

    #[test]
    fn buffered_opcode_follows_config() {
        let mut cfg = SessionConfig {
            use_buffered_speed_change: true,
            ..config()
        };
        let feedback = SpeedFeedback::from_config(&cfg).unwrap();
        let change = feedback.apply(127, &mut cfg).unwrap().unwrap();
        assert_eq!(change.frame.as_bytes(), &[OP_SPEED_BUFFERED, 35]);
    }

    #[test]
    fn bad_pot_range_is_reported() {
        let cfg = SessionConfig {
            pot_min_wpm: 30,
            pot_max_wpm: 10,
            ..SessionConfig::default()
        };
        assert!(matches!(
            SpeedFeedback::from_config(&cfg),
            Err(ProtocolError::InvalidPotRange { min: 30, max: 10 })
        ));
    }
}
