use anyhow::{Context, Result};
use chroma_core::{Roi, RoiSampler};
use chroma_hw::{
    Actuator, Camera, FrameSource, RunFlag, ServoConfig, ServoHandle, ServoOscillator, SysfsPwm,
};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

mod config;
mod pipeline;
mod preview;

use config::{Cli, Config};
use pipeline::{CycleStats, DatagramSink, PipelineOptions, UdpSink};
use preview::Preview;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.list_cameras {
        for dev in Camera::list_devices() {
            println!("{}\t{}\t{}\t{}", dev.path, dev.name, dev.driver, dev.bus);
        }
        return Ok(());
    }

    let config = Config::from_cli(cli)?;
    let run = RunFlag::new();

    let mut sampler_task = {
        let run = run.clone();
        tokio::task::spawn_blocking(move || run_sampler(config, run))
    };

    tokio::select! {
        result = &mut sampler_task => {
            result.context("sampler thread panicked")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            tracing::info!("interrupt received, shutting down");
            run.stop();
            sampler_task.await.context("sampler thread panicked")??;
        }
    }

    tracing::info!("chroma-sampler stopped");
    Ok(())
}

/// Open the hardware named by `config` and run one capture session on it.
fn run_sampler(config: Config, run: RunFlag) -> Result<()> {
    let camera = Camera::open_index(config.camera_index)
        .with_context(|| format!("failed to open camera {}", config.camera_index))?;

    let servo = match &config.servo {
        Some(servo_cfg) => Some((open_servo(servo_cfg)?, servo_cfg)),
        None => None,
    };

    let sink = UdpSink::bind(config.destination).context("failed to bind UDP socket")?;

    let stats = run_session(camera, servo, &sink, &config, StdRng::from_entropy(), &run)?;
    tracing::info!(
        frames = stats.frames,
        sent = stats.sent,
        capture_failures = stats.capture_failures,
        "frame loop finished"
    );
    Ok(())
}

/// Run the frame loop, then shut down in order: clear `run`, join the
/// servo thread (which releases the actuator), drop the frame source.
///
/// The teardown happens whether the loop stopped on request or on a fatal
/// error; the loop's error is returned afterwards.
fn run_session<S, A, K>(
    mut source: S,
    servo: Option<(A, &ServoConfig)>,
    sink: &K,
    config: &Config,
    rng: StdRng,
    run: &RunFlag,
) -> Result<CycleStats>
where
    S: FrameSource,
    A: Actuator + Send + 'static,
    K: DatagramSink,
{
    let (width, height) = source.dimensions();

    let roi = Roi::centered(width, height, config.roi_size)?;
    let mut sampler = RoiSampler::new(roi, config.sampling, rng);

    let servo = match servo {
        Some((actuator, servo_cfg)) => Some(start_servo(actuator, servo_cfg, run)?),
        None => None,
    };

    let mut preview = config
        .preview_path
        .as_ref()
        .map(|path| Preview::new(path, width, height, sampler.roi()));

    tracing::info!(
        identifier = %config.identifier,
        width,
        height,
        roi = roi.size,
        destination = %config.destination,
        servo = servo.is_some(),
        preview = ?preview.as_ref().map(Preview::path),
        sampled_pixels = sampler.strategy().pixel_count(roi.area()),
        roi_pixels = roi.area(),
        delay = ?config.delay,
        send = config.send,
        "sampler started"
    );

    let opts = PipelineOptions {
        identifier: config.identifier.clone(),
        send: config.send,
        show_msg: config.show_msg,
        delay: config.delay,
        max_capture_failures: config.max_capture_failures,
    };
    let position = servo.as_ref().map(ServoHandle::position);

    let result = pipeline::run(
        &mut source,
        &mut sampler,
        sink,
        position.as_ref(),
        preview.as_mut(),
        &opts,
        run,
    );

    // The loop can end on its own (fatal error); make sure the servo sees it.
    run.stop();
    if let Some(servo) = servo {
        servo.join()?;
    }
    drop(source);

    Ok(result?)
}

/// Export and enable the PWM channel at its resting duty.
fn open_servo(cfg: &ServoConfig) -> Result<SysfsPwm> {
    let mut pwm = SysfsPwm::open(cfg.pwm.chip, cfg.pwm.channel, cfg.pwm.frequency_hz)
        .context("servo requested but PWM hardware is unavailable")?;
    pwm.start(cfg.pwm.initial_duty_percent)?;
    Ok(pwm)
}

fn start_servo<A>(actuator: A, cfg: &ServoConfig, run: &RunFlag) -> Result<ServoHandle>
where
    A: Actuator + Send + 'static,
{
    let waveform = cfg.waveform()?;
    tracing::info!(
        chip = cfg.pwm.chip,
        channel = cfg.pwm.channel,
        low = waveform.low(),
        high = waveform.high(),
        tick = ?cfg.tick(),
        "servo oscillator starting"
    );
    let handle = ServoOscillator::spawn(actuator, waveform, cfg.tick(), run.clone())?;
    Ok(handle)
}
