use anyhow::{bail, Context, Result};
use chroma_core::message::validate_identifier;
use chroma_hw::ServoConfig;
use clap::{ArgAction, Parser};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line flags.
#[derive(Parser, Debug)]
#[command(
    name = "chroma-sampler",
    about = "Sample the color at the center of a camera frame and stream it over UDP"
)]
pub struct Cli {
    /// Receiver address
    #[arg(long, default_value = "127.0.0.1")]
    pub ip: String,
    /// Receiver UDP port
    #[arg(long, default_value_t = 8000)]
    pub port: u16,
    /// Camera index (/dev/videoN)
    #[arg(long, default_value_t = 0)]
    pub capture: u32,
    /// Render the debug preview
    #[arg(long)]
    pub show: bool,
    /// ROI side length in pixels
    #[arg(long, default_value_t = 100)]
    pub roi: u32,
    /// Fraction of ROI pixels to sample (0 or 1 = every pixel)
    #[arg(long, default_value_t = 0.0)]
    pub sampling: f64,
    /// Seconds to wait between frames (0 = none)
    #[arg(long, default_value_t = 0.0)]
    pub delay: f64,
    /// Send the color to the receiver
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub send: bool,
    /// Identifier sent to the receiver (default: random UUID)
    #[arg(long)]
    pub identifier: Option<String>,
    /// Echo each sent message to stdout
    #[arg(long)]
    pub show_msg: bool,
    /// Drive the servo oscillator
    #[arg(long)]
    pub servo: bool,
    /// Where the debug preview image is written
    #[arg(long, default_value = "chroma-preview.png")]
    pub preview_path: PathBuf,
    /// Give up after this many consecutive failed captures (default: never)
    #[arg(long)]
    pub max_capture_failures: Option<u32>,
    /// List capture devices and exit
    #[arg(long)]
    pub list_cameras: bool,
}

/// Validated sampler configuration.
#[derive(Debug)]
pub struct Config {
    pub destination: SocketAddr,
    pub camera_index: u32,
    pub roi_size: u32,
    pub sampling: f64,
    pub delay: Option<Duration>,
    pub send: bool,
    /// Chosen once at startup, constant for the process lifetime.
    pub identifier: String,
    pub show_msg: bool,
    /// Debug preview output, when `--show` is set.
    pub preview_path: Option<PathBuf>,
    /// Servo profile, when `--servo` is set.
    pub servo: Option<ServoConfig>,
    pub max_capture_failures: Option<u32>,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        Self::from_cli_with_env(cli, |key| std::env::var(key).ok())
    }

    /// Like [`from_cli`](Self::from_cli) with an explicit environment lookup.
    pub fn from_cli_with_env(cli: Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if cli.port == 0 {
            bail!("--port must be non-zero");
        }
        if !cli.delay.is_finite() || cli.delay < 0.0 {
            bail!("--delay must be a non-negative number of seconds, got {}", cli.delay);
        }
        if cli.roi == 0 {
            bail!("--roi must be at least one pixel");
        }
        if cli.max_capture_failures == Some(0) {
            bail!("--max-capture-failures must be at least 1 when set");
        }

        let destination = (cli.ip.as_str(), cli.port)
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve {}:{}", cli.ip, cli.port))?
            .next()
            .with_context(|| format!("{}:{} resolved to no addresses", cli.ip, cli.port))?;

        let identifier = match cli.identifier.filter(|id| !id.is_empty()) {
            Some(id) => validate_identifier(id)?,
            None => uuid::Uuid::new_v4().to_string(),
        };

        let servo = if cli.servo {
            Some(servo_profile(&env)?)
        } else {
            None
        };

        Ok(Self {
            destination,
            camera_index: cli.capture,
            roi_size: cli.roi,
            sampling: cli.sampling,
            delay: (cli.delay > 0.0).then(|| Duration::from_secs_f64(cli.delay)),
            send: cli.send,
            identifier,
            show_msg: cli.show_msg,
            preview_path: cli.show.then_some(cli.preview_path),
            servo,
            max_capture_failures: cli.max_capture_failures,
        })
    }
}

/// Embedded servo profile with `CHROMA_SERVO_*` overrides applied.
fn servo_profile(env: &impl Fn(&str) -> Option<String>) -> Result<ServoConfig> {
    let mut cfg = ServoConfig::embedded()?;
    cfg.pwm.chip = env_parse(env, "CHROMA_SERVO_CHIP", cfg.pwm.chip);
    cfg.pwm.channel = env_parse(env, "CHROMA_SERVO_CHANNEL", cfg.pwm.channel);
    cfg.pwm.frequency_hz = env_parse(env, "CHROMA_SERVO_FREQUENCY_HZ", cfg.pwm.frequency_hz);
    cfg.waveform.low = env_parse(env, "CHROMA_SERVO_LOW", cfg.waveform.low);
    cfg.waveform.high = env_parse(env, "CHROMA_SERVO_HIGH", cfg.waveform.high);
    cfg.waveform.step = env_parse(env, "CHROMA_SERVO_STEP", cfg.waveform.step);
    cfg.waveform.tick_ms = env_parse(env, "CHROMA_SERVO_TICK_MS", cfg.waveform.tick_ms);
    // Surface a bad range at startup rather than in the servo thread.
    cfg.waveform()?;
    Ok(cfg)
}

fn env_parse<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
