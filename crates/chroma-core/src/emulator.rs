//! Synthetic status messages for exercising a receiver without a camera.

use crate::message::{validate_identifier, MessageError, StatusMessage};
use rand::seq::SliceRandom;
use rand::Rng;

/// Pure red, green and blue at full intensity.
pub const PALETTE: [(u8, u8, u8); 3] = [(255, 0, 0), (0, 255, 0), (0, 0, 255)];

/// Luminance reported by emulated messages; never computed.
pub const EMULATED_LUMINANCE: f64 = 0.5;

/// Position counter wraps at this value and is divided by it when sent.
const POSITION_MODULUS: u32 = 100;

pub struct EmulatorGenerator<R> {
    identifier: String,
    step: u32,
    position: u32,
    rng: R,
}

impl<R: Rng> EmulatorGenerator<R> {
    pub fn new(identifier: impl Into<String>, step: u32, rng: R) -> Result<Self, MessageError> {
        Ok(Self {
            identifier: validate_identifier(identifier.into())?,
            step: step % POSITION_MODULUS,
            position: 0,
            rng,
        })
    }

    /// Current position counter, 0..100.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Message for the current position, then advance the counter.
    pub fn next_message(&mut self) -> StatusMessage {
        let color = *PALETTE.choose(&mut self.rng).unwrap_or(&PALETTE[0]);
        let message = StatusMessage::with_checked_identifier(
            self.identifier.clone(),
            color,
            EMULATED_LUMINANCE,
            self.position as f64 / POSITION_MODULUS as f64,
        );
        self.position = (self.position + self.step) % POSITION_MODULUS;
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn generator(step: u32) -> EmulatorGenerator<StdRng> {
        EmulatorGenerator::new("1", step, StdRng::seed_from_u64(9)).unwrap()
    }

    #[test]
    fn test_first_message_at_zero() {
        let msg = generator(5).next_message();
        assert_eq!(msg.servo_position, 0.0);
        assert_eq!(msg.luminance, 0.5);
        assert_eq!(msg.identifier(), "1");
    }

    #[test]
    fn test_position_cycles_after_twenty_ticks() {
        let mut emu = generator(5);
        for _ in 0..20 {
            emu.next_message();
        }
        assert_eq!(emu.position(), 0);
    }

    #[test]
    fn test_position_sequence_and_range() {
        let mut emu = generator(5);
        let positions: Vec<f64> = (0..60).map(|_| emu.next_message().servo_position).collect();
        assert!((positions[1] - 0.05).abs() < 1e-12);
        assert!((positions[19] - 0.95).abs() < 1e-12);
        assert_eq!(positions[20], 0.0);
        assert!(positions.iter().all(|p| (0.0..=0.99).contains(p)));
    }

    #[test]
    fn test_large_step_wraps() {
        let mut emu = generator(130);
        emu.next_message();
        assert_eq!(emu.position(), 30);
    }

    #[test]
    fn test_colors_come_from_palette() {
        let mut emu = generator(5);
        let mut seen = [false; 3];
        for _ in 0..200 {
            let msg = emu.next_message();
            let idx = PALETTE
                .iter()
                .position(|c| *c == (msg.red, msg.green, msg.blue))
                .expect("color outside palette");
            seen[idx] = true;
        }
        assert_eq!(seen, [true; 3]);
    }

    #[test]
    fn test_wire_format() {
        let mut emu = generator(5);
        emu.next_message();
        let text = emu.next_message().to_string();
        let fields: Vec<&str> = text.split(':').collect();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[0], "1");
        assert_eq!(fields[4], "0.500");
        assert_eq!(fields[5], "0.050");
    }

    #[test]
    fn test_rejects_bad_identifier() {
        assert!(EmulatorGenerator::new("a:b", 5, StdRng::seed_from_u64(1)).is_err());
    }
}
