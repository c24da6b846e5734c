use crate::preview::{Preview, PreviewError};
use chroma_core::{MessageError, RoiSampler, SamplerError, StatusMessage};
use chroma_hw::{CameraError, FrameSource, RunFlag, ServoPosition};
use rand::Rng;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use thiserror::Error;

/// After the first failure in a run, only every Nth consecutive capture
/// failure is logged at warn level.
const CAPTURE_WARN_EVERY: u32 = 100;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("giving up after {attempts} consecutive capture failures: {source}")]
    CaptureExhausted {
        attempts: u32,
        #[source]
        source: CameraError,
    },
    #[error("sampling error: {0}")]
    Sampler(#[from] SamplerError),
    #[error("message error: {0}")]
    Message(#[from] MessageError),
    #[error("preview error: {0}")]
    Preview(#[from] PreviewError),
    #[error("send failed: {0}")]
    Send(#[from] std::io::Error),
}

/// Best-effort datagram transport.
pub trait DatagramSink {
    fn send_datagram(&self, payload: &[u8]) -> std::io::Result<()>;
}

/// UDP socket bound to an ephemeral port, sending to one fixed receiver.
pub struct UdpSink {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpSink {
    pub fn bind(destination: SocketAddr) -> std::io::Result<Self> {
        let local: SocketAddr = if destination.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        Ok(Self {
            socket: UdpSocket::bind(local)?,
            destination,
        })
    }
}

impl DatagramSink for UdpSink {
    fn send_datagram(&self, payload: &[u8]) -> std::io::Result<()> {
        self.socket.send_to(payload, self.destination).map(|_| ())
    }
}

/// Per-run knobs for [`run`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub identifier: String,
    pub send: bool,
    pub show_msg: bool,
    pub delay: Option<Duration>,
    /// `None` retries failed captures forever, immediately.
    pub max_capture_failures: Option<u32>,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub frames: u64,
    pub sent: u64,
    pub capture_failures: u64,
}

/// Capture, sample, and send until `run` is cleared.
///
/// The flag is re-checked after every capture attempt and during the
/// inter-frame delay, so sources must return (frame or error) within a
/// bounded time. A failed capture skips the cycle. Sampling, preview, and send errors
/// end the loop and are returned to the caller.
pub fn run<S, R, K>(
    source: &mut S,
    sampler: &mut RoiSampler<R>,
    sink: &K,
    servo_position: Option<&ServoPosition>,
    mut preview: Option<&mut Preview>,
    opts: &PipelineOptions,
    run: &RunFlag,
) -> Result<CycleStats, PipelineError>
where
    S: FrameSource,
    R: Rng,
    K: DatagramSink,
{
    let mut stats = CycleStats::default();
    let mut consecutive_failures = 0u32;

    while run.is_running() {
        let frame = match source.next_frame() {
            Ok(frame) => {
                consecutive_failures = 0;
                frame
            }
            Err(err) => {
                stats.capture_failures += 1;
                consecutive_failures += 1;
                if should_warn(consecutive_failures) {
                    tracing::warn!(error = %err, consecutive = consecutive_failures, "capture failed");
                } else {
                    tracing::debug!(error = %err, consecutive = consecutive_failures, "capture failed");
                }
                if let Some(max) = opts.max_capture_failures {
                    if consecutive_failures >= max {
                        return Err(PipelineError::CaptureExhausted {
                            attempts: consecutive_failures,
                            source: err,
                        });
                    }
                }
                continue;
            }
        };
        stats.frames += 1;

        let color = sampler.sample(&frame.data, frame.width)?;

        if let Some(preview) = preview.as_deref_mut() {
            preview.render(&frame, sampler, &color)?;
        }

        if opts.send {
            let position = servo_position.map_or(0.0, ServoPosition::get);
            let message = StatusMessage::from_color(opts.identifier.as_str(), &color, position)?;
            sink.send_datagram(&message.encode())?;
            stats.sent += 1;
            if opts.show_msg {
                println!("{message}");
            }
        }
        tracing::trace!(seq = frame.sequence, ?color, "cycle complete");

        if let Some(delay) = opts.delay {
            run.sleep(delay);
        }
    }

    Ok(stats)
}

fn should_warn(consecutive_failures: u32) -> bool {
    consecutive_failures == 1 || consecutive_failures % CAPTURE_WARN_EVERY == 0
}
