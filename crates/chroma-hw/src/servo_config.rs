//! Servo hardware profile.
//!
//! The default profile is embedded at compile time from
//! `contrib/servo/sg90.toml`; callers may override individual fields
//! (see the sampler's environment variables).

use crate::servo::ServoError;
use chroma_core::ServoWaveform;
use serde::Deserialize;
use std::time::Duration;

const SG90_PROFILE: &str = include_str!("../../../contrib/servo/sg90.toml");

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServoConfig {
    pub pwm: PwmSection,
    pub waveform: WaveformSection,
}

/// Which sysfs PWM channel drives the servo, and at what frequency.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PwmSection {
    pub chip: u32,
    pub channel: u32,
    pub frequency_hz: u32,
    pub initial_duty_percent: f64,
}

/// Sweep range in tenths of a duty-cycle percent, and the step cadence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WaveformSection {
    pub low: u32,
    pub high: u32,
    pub step: u32,
    pub tick_ms: u64,
}

impl ServoConfig {
    /// The embedded SG90 profile.
    pub fn embedded() -> Result<Self, ServoError> {
        Self::from_toml(SG90_PROFILE)
    }

    pub fn from_toml(src: &str) -> Result<Self, ServoError> {
        toml::from_str(src).map_err(|e| ServoError::Config(e.to_string()))
    }

    pub fn waveform(&self) -> Result<ServoWaveform, ServoError> {
        Ok(ServoWaveform::new(
            self.waveform.low,
            self.waveform.high,
            self.waveform.step,
        )?)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.waveform.tick_ms)
    }
}
