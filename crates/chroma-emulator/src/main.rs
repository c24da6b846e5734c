use anyhow::{bail, Context, Result};
use chroma_core::EmulatorGenerator;
use clap::{ArgAction, Parser};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Interval;

#[derive(Parser, Debug)]
#[command(
    name = "chroma-emulator",
    about = "Send synthetic color/position messages to a chroma receiver"
)]
struct Cli {
    /// Receiver address
    #[arg(long, default_value = "127.0.0.1")]
    ip: String,
    /// Receiver UDP port
    #[arg(long, default_value_t = 8000)]
    port: u16,
    /// Seconds between messages (0 = back-to-back)
    #[arg(long, default_value_t = 1.0)]
    seconds: f64,
    /// Position advance per message, modulo 100
    #[arg(long, default_value_t = 5)]
    steps: u32,
    /// Identifier sent to the receiver
    #[arg(long, default_value = "1")]
    id: String,
    /// Echo each message to stdout
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    show: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let period = send_period(cli.seconds)?;

    let destination = tokio::net::lookup_host((cli.ip.as_str(), cli.port))
        .await
        .with_context(|| format!("failed to resolve {}:{}", cli.ip, cli.port))?
        .next()
        .with_context(|| format!("{}:{} resolved to no addresses", cli.ip, cli.port))?;
    let socket = bind_for(destination).await?;
    let emulator = EmulatorGenerator::new(cli.id, cli.steps, StdRng::from_entropy())?;

    tracing::info!(%destination, ?period, steps = cli.steps, "emulator started");

    let sent = emit(&socket, destination, emulator, period, cli.show, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    })
    .await?;

    tracing::info!(sent, "emulator stopped");
    Ok(())
}

fn send_period(seconds: f64) -> Result<Duration> {
    if !seconds.is_finite() || seconds < 0.0 {
        bail!("--seconds must be a non-negative number, got {seconds}");
    }
    Ok(Duration::from_secs_f64(seconds))
}

async fn bind_for(destination: SocketAddr) -> Result<UdpSocket> {
    let local = if destination.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    UdpSocket::bind(local)
        .await
        .context("failed to bind UDP socket")
}

/// Send one message per `period` until `shutdown` resolves. A zero
/// period sends back-to-back, yielding to the runtime between messages.
///
/// Returns the number of messages sent.
async fn emit<R: Rng>(
    socket: &UdpSocket,
    destination: SocketAddr,
    mut emulator: EmulatorGenerator<R>,
    period: Duration,
    show: bool,
    shutdown: impl Future<Output = ()>,
) -> Result<u64> {
    let mut ticker = (!period.is_zero()).then(|| tokio::time::interval(period));
    let mut sent = 0u64;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = next_tick(&mut ticker) => {
                let message = emulator.next_message();
                socket
                    .send_to(&message.encode(), destination)
                    .await
                    .context("send failed")?;
                sent += 1;
                if show {
                    println!("{message}");
                }
            }
            _ = &mut shutdown => break,
        }
    }

    Ok(sent)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => tokio::task::yield_now().await,
    }
}
