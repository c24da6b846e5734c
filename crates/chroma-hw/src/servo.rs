//! Servo control over Linux sysfs PWM, plus the background oscillator.
//!
//! The oscillator walks a [`ServoWaveform`] on its own OS thread, one step
//! per tick, and publishes the normalized position through a lock-free
//! [`ServoPosition`]. The frame loop reads that value without blocking;
//! being one tick stale is fine for telemetry.

use chroma_core::ServoWaveform;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

const SYSFS_PWM_ROOT: &str = "/sys/class/pwm";

/// How long to wait for udev to materialize a freshly exported channel.
const EXPORT_POLL_ATTEMPTS: u32 = 20;
const EXPORT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Granularity at which [`RunFlag::sleep`] notices a stop request.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum ServoError {
    #[error("PWM chip not found: {0}")]
    ChipNotFound(String),
    #[error("PWM channel {channel} did not appear under {chip}")]
    ChannelUnavailable { chip: String, channel: u32 },
    #[error("sysfs write to {path} failed: {source}")]
    Sysfs {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid PWM frequency: {0} Hz")]
    InvalidFrequency(u32),
    #[error("bad servo config: {0}")]
    Config(String),
    #[error("waveform: {0}")]
    Waveform(#[from] chroma_core::WaveformError),
    #[error("failed to spawn servo thread: {0}")]
    Spawn(std::io::Error),
    #[error("servo thread panicked")]
    ThreadPanicked,
}

/// A PWM-driven actuator.
pub trait Actuator {
    /// Set the duty cycle, in percent of the period.
    fn set_duty_percent(&mut self, percent: f64) -> Result<(), ServoError>;

    /// Stop driving the output and hand the channel back to the system.
    fn release(&mut self) -> Result<(), ServoError>;
}

/// Shared run flag: the one coordination primitive between the frame loop
/// and the servo thread. Starts running; cleared exactly when shutting down.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Sleep for `duration`, waking early once the flag is cleared.
    ///
    /// Returns `true` if the full duration elapsed while still running.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
        }
        false
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalized servo position in [0, 1], stored as `f32` bits in one word.
#[derive(Debug, Clone, Default)]
pub struct ServoPosition(Arc<AtomicU32>);

impl ServoPosition {
    pub fn get(&self) -> f64 {
        f32::from_bits(self.0.load(Ordering::Relaxed)) as f64
    }

    pub fn set(&self, value: f64) {
        self.0.store((value as f32).to_bits(), Ordering::Relaxed);
    }
}

/// One channel of a sysfs PWM chip (`/sys/class/pwm/pwmchipN/pwmM`).
///
/// On a Raspberry Pi with the `pwm` overlay, BCM 18 is chip 0 channel 0.
#[derive(Debug)]
pub struct SysfsPwm {
    chip_dir: PathBuf,
    channel_dir: PathBuf,
    channel: u32,
    period_ns: u64,
    exported_here: bool,
    released: bool,
}

impl SysfsPwm {
    /// Export and configure `pwmchip{chip}/pwm{channel}` at `frequency_hz`.
    pub fn open(chip: u32, channel: u32, frequency_hz: u32) -> Result<Self, ServoError> {
        Self::open_at(SYSFS_PWM_ROOT, chip, channel, frequency_hz)
    }

    /// Like [`open`](Self::open) with an explicit sysfs root.
    pub fn open_at(
        root: impl AsRef<Path>,
        chip: u32,
        channel: u32,
        frequency_hz: u32,
    ) -> Result<Self, ServoError> {
        if frequency_hz == 0 {
            return Err(ServoError::InvalidFrequency(frequency_hz));
        }

        let chip_dir = root.as_ref().join(format!("pwmchip{chip}"));
        if !chip_dir.is_dir() {
            return Err(ServoError::ChipNotFound(chip_dir.display().to_string()));
        }

        let channel_dir = chip_dir.join(format!("pwm{channel}"));
        let mut exported_here = false;
        if !channel_dir.is_dir() {
            write_attr(&chip_dir.join("export"), channel)?;
            exported_here = true;
            wait_for_dir(&channel_dir).ok_or_else(|| ServoError::ChannelUnavailable {
                chip: chip_dir.display().to_string(),
                channel,
            })?;
        }

        let period_ns = 1_000_000_000 / frequency_hz as u64;
        // Zero the duty first: the kernel rejects a period shorter than the
        // current duty cycle.
        write_attr(&channel_dir.join("duty_cycle"), 0)?;
        write_attr(&channel_dir.join("period"), period_ns)?;

        tracing::info!(
            chip = %chip_dir.display(),
            channel,
            frequency_hz,
            period_ns,
            "PWM channel configured"
        );

        Ok(Self {
            chip_dir,
            channel_dir,
            channel,
            period_ns,
            exported_here,
            released: false,
        })
    }

    /// Set the initial duty cycle and enable the output.
    pub fn start(&mut self, duty_percent: f64) -> Result<(), ServoError> {
        self.set_duty_percent(duty_percent)?;
        write_attr(&self.channel_dir.join("enable"), 1)
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }
}

impl Actuator for SysfsPwm {
    fn set_duty_percent(&mut self, percent: f64) -> Result<(), ServoError> {
        let duty_ns = (self.period_ns as f64 * percent.clamp(0.0, 100.0) / 100.0).round() as u64;
        write_attr(&self.channel_dir.join("duty_cycle"), duty_ns)
    }

    fn release(&mut self) -> Result<(), ServoError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        tracing::debug!(channel_dir = %self.channel_dir.display(), "releasing PWM channel");
        write_attr(&self.channel_dir.join("enable"), 0)?;
        if self.exported_here {
            write_attr(&self.chip_dir.join("unexport"), self.channel)?;
        }
        Ok(())
    }
}

impl Drop for SysfsPwm {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(error = %err, "PWM release on drop failed");
        }
    }
}

fn write_attr(path: &Path, value: impl std::fmt::Display) -> Result<(), ServoError> {
    std::fs::write(path, value.to_string()).map_err(|source| ServoError::Sysfs {
        path: path.display().to_string(),
        source,
    })
}

fn wait_for_dir(dir: &Path) -> Option<()> {
    for _ in 0..EXPORT_POLL_ATTEMPTS {
        if dir.is_dir() {
            return Some(());
        }
        std::thread::sleep(EXPORT_POLL_INTERVAL);
    }
    dir.is_dir().then_some(())
}

/// Handle to a running oscillator thread.
pub struct ServoHandle {
    position: ServoPosition,
    thread: JoinHandle<()>,
}

impl ServoHandle {
    /// Reader for the published position.
    pub fn position(&self) -> ServoPosition {
        self.position.clone()
    }

    /// Wait for the thread to observe the cleared run flag and exit.
    pub fn join(self) -> Result<(), ServoError> {
        self.thread.join().map_err(|_| ServoError::ThreadPanicked)
    }
}

pub struct ServoOscillator;

impl ServoOscillator {
    /// Spawn the oscillator on a dedicated OS thread.
    ///
    /// The thread loops until `run` is cleared, then releases the actuator
    /// exactly once. A duty-cycle write failure also ends the loop.
    pub fn spawn<A>(
        mut actuator: A,
        waveform: ServoWaveform,
        tick: Duration,
        run: RunFlag,
    ) -> Result<ServoHandle, ServoError>
    where
        A: Actuator + Send + 'static,
    {
        let position = ServoPosition::default();
        let published = position.clone();
        let values = waveform.values();

        let thread = std::thread::Builder::new()
            .name("chroma-servo".into())
            .spawn(move || {
                tracing::info!(steps = values.len(), ?tick, "servo oscillator started");
                let mut idx = 0usize;
                while run.is_running() {
                    let value = values[idx];
                    if let Err(err) = actuator.set_duty_percent(ServoWaveform::duty_percent(value)) {
                        tracing::error!(error = %err, "servo duty write failed; stopping oscillator");
                        break;
                    }
                    published.set(waveform.normalized(value));
                    idx = (idx + 1) % values.len();
                    run.sleep(tick);
                }
                tracing::info!("stopping servo");
                if let Err(err) = actuator.release() {
                    tracing::warn!(error = %err, "servo release failed");
                }
            })
            .map_err(ServoError::Spawn)?;

        Ok(ServoHandle { position, thread })
    }
}
