//! One-shot keyer adjustments outside a practice session.
//!
//! Every operation encodes its frame first, so a rejected operand never
//! reaches the device or the stored configuration.

use tracing::info;

use crate::error::Result;
use crate::link::Link;
use crate::protocol::{encode, Command, KeyerMode, PIN_SPEAKER_OFF, PIN_SPEAKER_ON};
use crate::session::SessionConfig;

pub struct Settings<'a, L: Link> {
    link: &'a mut L,
    config: &'a mut SessionConfig,
}

impl<'a, L: Link> Settings<'a, L> {
    pub fn new(link: &'a mut L, config: &'a mut SessionConfig) -> Self {
        Self { link, config }
    }

    fn send(&mut self, command: Command) -> Result<()> {
        let frame = encode(&command)?;
        self.link.send(&frame)?;
        info!(?command, "keyer setting applied");
        Ok(())
    }

    pub fn set_speed(&mut self, wpm: u16) -> Result<()> {
        self.send(Command::SetSpeed {
            wpm,
            buffered: self.config.use_buffered_speed_change,
        })?;
        self.config.current_wpm = wpm;
        Ok(())
    }

    pub fn set_weighting(&mut self, percent: u16) -> Result<()> {
        self.send(Command::SetWeighting(percent))?;
        self.config.weighting = Some(percent);
        Ok(())
    }

    pub fn set_farnsworth(&mut self, wpm: u16) -> Result<()> {
        self.send(Command::SetFarnsworth(wpm))?;
        self.config.farnsworth_wpm = Some(wpm);
        Ok(())
    }

    pub fn set_ratio(&mut self, ratio: u16) -> Result<()> {
        self.send(Command::SetRatio(ratio))?;
        self.config.ratio = Some(ratio);
        Ok(())
    }

    pub fn set_key_compensation(&mut self, ms: u16) -> Result<()> {
        self.send(Command::SetKeyCompensation(ms))?;
        self.config.key_compensation_ms = Some(ms);
        Ok(())
    }

    pub fn set_ptt_lead_in(&mut self, ms: u16) -> Result<()> {
        self.send(Command::SetPttTiming {
            lead_in_ms: ms,
            tail_ms: self.config.ptt_tail_ms,
        })?;
        self.config.ptt_lead_in_ms = ms;
        Ok(())
    }

    pub fn set_ptt_tail(&mut self, ms: u16) -> Result<()> {
        self.send(Command::SetPttTiming {
            lead_in_ms: self.config.ptt_lead_in_ms,
            tail_ms: ms,
        })?;
        self.config.ptt_tail_ms = ms;
        Ok(())
    }

    pub fn set_pin_config(&mut self, pins: u8) -> Result<()> {
        self.send(Command::SetPinConfig(pins))?;
        self.config.pin_config = pins;
        Ok(())
    }

    /// Flip between the speaker-on and speaker-off presets. Any other pin
    /// setup counts as speaker off.
    pub fn toggle_speaker(&mut self) -> Result<bool> {
        let on = self.config.pin_config != PIN_SPEAKER_ON;
        self.set_pin_config(if on { PIN_SPEAKER_ON } else { PIN_SPEAKER_OFF })?;
        Ok(on)
    }

    pub fn set_pot_range(&mut self, min_wpm: u16, max_wpm: u16) -> Result<()> {
        self.send(Command::SetPotRange { min_wpm, max_wpm })?;
        self.config.pot_min_wpm = min_wpm;
        self.config.pot_max_wpm = max_wpm;
        Ok(())
    }

    pub fn set_mode(&mut self, mode: KeyerMode) -> Result<()> {
        self.send(Command::SetMode(mode))?;
        self.config.keyer_mode = mode;
        Ok(())
    }

    /// Host-side only: picks the opcode used by later speed changes.
    pub fn set_speed_command(&mut self, buffered: bool) {
        self.config.use_buffered_speed_change = buffered;
        info!(buffered, "speed command selected");
    }

    pub fn clear_buffer(&mut self) -> Result<()> {
        self.send(Command::ClearBuffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::link::TestLink;
    use crate::protocol::ProtocolError;
    use assert_matches::assert_matches;

    #[test]
    fn test_speed_uses_configured_opcode() {
        let (mut link, handle) = TestLink::new();
        let mut config = SessionConfig::default();
        let mut settings = Settings::new(&mut link, &mut config);
        settings.set_speed(25).unwrap();
        settings.set_speed_command(true);
        settings.set_speed(30).unwrap();
        assert_eq!(handle.written(), vec![0x02, 25, 0x1C, 30]);
        assert_eq!(config.current_wpm, 30);
        assert!(config.use_buffered_speed_change);
    }

    #[test]
    fn test_rejected_operand_changes_nothing() {
        let (mut link, handle) = TestLink::new();
        let mut config = SessionConfig::default();
        let mut settings = Settings::new(&mut link, &mut config);
        assert_matches!(
            settings.set_speed(3),
            Err(Error::Protocol(ProtocolError::OutOfRange { value: 3, .. }))
        );
        assert_matches!(settings.set_ratio(70), Err(Error::Protocol(_)));
        assert_matches!(settings.set_pot_range(30, 20), Err(Error::Protocol(_)));
        assert!(handle.written().is_empty());
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_ptt_keeps_other_field() {
        let (mut link, handle) = TestLink::new();
        let mut config = SessionConfig::default();
        let mut settings = Settings::new(&mut link, &mut config);
        settings.set_ptt_lead_in(50).unwrap();
        settings.set_ptt_tail(120).unwrap();
        assert_eq!(handle.written(), vec![0x04, 5, 0, 0, 0, 0x04, 5, 12, 0, 0]);
        assert_eq!(config.ptt_lead_in_ms, 50);
        assert_eq!(config.ptt_tail_ms, 120);
    }

    #[test]
    fn test_speaker_toggle() {
        let (mut link, handle) = TestLink::new();
        let mut config = SessionConfig::default();
        let mut settings = Settings::new(&mut link, &mut config);
        assert!(!settings.toggle_speaker().unwrap());
        assert!(settings.toggle_speaker().unwrap());
        assert_eq!(handle.written(), vec![0x09, 0x0D, 0x09, 0x0F]);
    }

    #[test]
    fn test_pot_range_and_mode() {
        let (mut link, handle) = TestLink::new();
        let mut config = SessionConfig::default();
        let mut settings = Settings::new(&mut link, &mut config);
        settings.set_pot_range(10, 40).unwrap();
        settings.set_mode(KeyerMode::Bug).unwrap();
        settings.clear_buffer().unwrap();
        assert_eq!(handle.written(), vec![0x05, 10, 30, 0, 0x0E, 0xF4, 0x0A]);
        assert_eq!((config.pot_min_wpm, config.pot_max_wpm), (10, 40));
        assert_eq!(config.keyer_mode, KeyerMode::Bug);
    }

    #[test]
    fn test_timing_settings() {
        let (mut link, handle) = TestLink::new();
        let mut config = SessionConfig::default();
        let mut settings = Settings::new(&mut link, &mut config);
        settings.set_weighting(55).unwrap();
        settings.set_farnsworth(12).unwrap();
        settings.set_ratio(40).unwrap();
        settings.set_key_compensation(8).unwrap();
        assert_eq!(config.weighting, Some(55));
        assert_eq!(config.farnsworth_wpm, Some(12));
        assert_eq!(config.ratio, Some(40));
        assert_eq!(config.key_compensation_ms, Some(8));
        assert_eq!(handle.written(), vec![0x03, 55, 0x0D, 12, 0x17, 40, 0x11, 8]);
    }

    #[test]
    fn test_write_failure_leaves_config() {
        let (mut link, handle) = TestLink::new();
        handle.fail_writes();
        let mut config = SessionConfig::default();
        let mut settings = Settings::new(&mut link, &mut config);
        assert_matches!(settings.set_speed(30), Err(Error::Link(_)));
        assert_eq!(config.current_wpm, 20);
    }
}
