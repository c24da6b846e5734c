//! chroma-core — Color sampling and telemetry message logic.
//!
//! Pure functions and small state machines shared by the sampler and the
//! emulator: region-of-interest color sampling, relative luminance, the
//! servo duty-cycle waveform and the colon-delimited wire message.

pub mod color;
pub mod emulator;
pub mod message;
pub mod sampler;
pub mod waveform;

pub use color::{luminance, Color};
pub use emulator::EmulatorGenerator;
pub use message::{MessageError, StatusMessage};
pub use sampler::{Roi, RoiSampler, SampleStrategy, SamplerError};
pub use waveform::{ServoWaveform, WaveformError};
