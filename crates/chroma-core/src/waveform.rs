//! Triangular duty-cycle waveform for the oscillating servo.
//!
//! Values are in tenths of a duty-cycle percent (the default 30..130
//! range drives a hobby servo at 3 %–13 % of a 100 Hz period).

use thiserror::Error;

pub const DEFAULT_LOW: u32 = 30;
pub const DEFAULT_HIGH: u32 = 130;
pub const DEFAULT_STEP: u32 = 2;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WaveformError {
    #[error("waveform low ({low}) must be below high ({high})")]
    EmptyRange { low: u32, high: u32 },
    #[error("waveform step must be non-zero")]
    ZeroStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoWaveform {
    low: u32,
    high: u32,
    step: u32,
}

impl Default for ServoWaveform {
    fn default() -> Self {
        Self {
            low: DEFAULT_LOW,
            high: DEFAULT_HIGH,
            step: DEFAULT_STEP,
        }
    }
}

impl ServoWaveform {
    pub fn new(low: u32, high: u32, step: u32) -> Result<Self, WaveformError> {
        if low >= high {
            return Err(WaveformError::EmptyRange { low, high });
        }
        if step == 0 {
            return Err(WaveformError::ZeroStep);
        }
        Ok(Self { low, high, step })
    }

    pub fn low(&self) -> u32 {
        self.low
    }

    pub fn high(&self) -> u32 {
        self.high
    }

    /// One full period: ramp up from `low` to the last step not above
    /// `high`, then back down, stopping one step short of `low` so the
    /// sequence can loop without repeating its endpoints.
    pub fn values(&self) -> Vec<u32> {
        let up: Vec<u32> = (self.low..=self.high).step_by(self.step as usize).collect();
        let down = up.iter().rev().skip(1).take(up.len().saturating_sub(2));
        up.iter().chain(down).copied().collect()
    }

    /// Position of `value` within the range, clamped to [0, 1].
    pub fn normalized(&self, value: u32) -> f64 {
        let span = (self.high - self.low) as f64;
        ((value as f64 - self.low as f64) / span).clamp(0.0, 1.0)
    }

    /// PWM duty cycle in percent for a waveform value.
    pub fn duty_percent(value: u32) -> f64 {
        value as f64 / 10.0
    }
}
