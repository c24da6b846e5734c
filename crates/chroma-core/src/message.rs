//! Colon-delimited status message sent to the visualization receiver.
//!
//! Wire grammar (ASCII, one datagram per message):
//!
//! ```text
//! <identifier>:<red>:<green>:<blue>:<luminance .3>:<servo_position .3>
//! ```
//!
//! The receiver splits on `:` and drops anything that does not yield
//! exactly six fields, so identifiers may not contain a colon.

use crate::color::Color;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const FIELD_COUNT: usize = 6;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MessageError {
    #[error("invalid identifier {0:?}: must be non-empty and contain no ':'")]
    InvalidIdentifier(String),
    #[error("expected 6 colon-separated fields, got {0}")]
    FieldCount(usize),
    #[error("invalid {field} channel: {value:?}")]
    InvalidChannel { field: &'static str, value: String },
    #[error("invalid {field} value: {value:?}")]
    InvalidFloat { field: &'static str, value: String },
}

/// One telemetry sample: who sent it, the sampled color, and where the
/// servo was when it was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    identifier: String,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub luminance: f64,
    pub servo_position: f64,
}

impl StatusMessage {
    pub fn new(
        identifier: impl Into<String>,
        (red, green, blue): (u8, u8, u8),
        luminance: f64,
        servo_position: f64,
    ) -> Result<Self, MessageError> {
        let identifier = validate_identifier(identifier.into())?;
        Ok(Self {
            identifier,
            red,
            green,
            blue,
            luminance,
            servo_position,
        })
    }

    /// Message for a sampled color; luminance is derived from the
    /// unrounded channel means.
    pub fn from_color(
        identifier: impl Into<String>,
        color: &Color,
        servo_position: f64,
    ) -> Result<Self, MessageError> {
        Self::new(
            identifier,
            color.channels_u8(),
            color.luminance(),
            servo_position,
        )
    }

    /// For callers that validated the identifier once up front.
    pub(crate) fn with_checked_identifier(
        identifier: String,
        (red, green, blue): (u8, u8, u8),
        luminance: f64,
        servo_position: f64,
    ) -> Self {
        Self {
            identifier,
            red,
            green,
            blue,
            luminance,
            servo_position,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Serialized datagram payload.
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

/// Reject identifiers the receiver could not split back out.
pub fn validate_identifier(identifier: String) -> Result<String, MessageError> {
    if identifier.is_empty() || identifier.contains(':') {
        return Err(MessageError::InvalidIdentifier(identifier));
    }
    Ok(identifier)
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{:.3}:{:.3}",
            self.identifier, self.red, self.green, self.blue, self.luminance, self.servo_position
        )
    }
}

impl FromStr for StatusMessage {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim_end_matches(['\0', '\n', '\r']).split(':').collect();
        if fields.len() != FIELD_COUNT {
            return Err(MessageError::FieldCount(fields.len()));
        }

        let channel = |field: &'static str, value: &str| {
            value
                .parse::<u8>()
                .map_err(|_| MessageError::InvalidChannel {
                    field,
                    value: value.to_string(),
                })
        };
        let float = |field: &'static str, value: &str| {
            value
                .parse::<f64>()
                .map_err(|_| MessageError::InvalidFloat {
                    field,
                    value: value.to_string(),
                })
        };

        Self::new(
            fields[0],
            (
                channel("red", fields[1])?,
                channel("green", fields[2])?,
                channel("blue", fields[3])?,
            ),
            float("luminance", fields[4])?,
            float("servo position", fields[5])?,
        )
    }
}
