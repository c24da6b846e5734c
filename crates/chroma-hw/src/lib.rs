//! chroma-hw — Hardware abstraction for color capture and servo control.
//!
//! Provides V4L2-based RGB frame capture and a sysfs PWM actuator driven
//! by a background oscillator thread.

pub mod camera;
pub mod frame;
pub mod servo;
pub mod servo_config;

pub use camera::{Camera, CameraError, FrameSource, PixelFormat};
pub use frame::Frame;
pub use servo::{
    Actuator, RunFlag, ServoError, ServoHandle, ServoOscillator, ServoPosition, SysfsPwm,
};
pub use servo_config::ServoConfig;
