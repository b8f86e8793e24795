// Pipe node service: runs a remote piping node on a dedicated thread
// until Ctrl-C. Wired against the in-process loopback transport; real
// deployments supply their own Subscription/Publication/ArchiveControl
// implementations and reuse the same node.
use anyhow::{Context, Result};
use clap::Parser;
use pacer_failover::config::parse_duration;
use pacer_node::{NodeConfig, PipeNode, DEFAULT_CONNECTION_TIMEOUT};
use pacer_transport::loopback::{LoopbackArchive, LoopbackChannel};
use pacer_transport::{OfferError, Publication, Subscription};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

const CONNECT_TIMEOUT_ENV: &str = "PACER_CONNECT_TIMEOUT";

#[derive(Parser, Debug)]
#[command(name = "pipe-node")]
#[command(about = "Remote piping node for transport benchmarks")]
struct Args {
    /// Outbound record channel
    #[arg(long, default_value = "pacer:loopback?endpoint=local")]
    record_channel: String,

    /// Outbound record stream id
    #[arg(long, default_value = "1001")]
    record_stream_id: i32,

    /// Loopback window, in messages, for both channel ends
    #[arg(long, default_value = "1024")]
    window: usize,

    /// Connection timeout literal (e.g. 10s); falls back to
    /// PACER_CONNECT_TIMEOUT, then 10s
    #[arg(long)]
    connect_timeout: Option<String>,

    /// Publish this many demo payloads into the inbound channel
    #[arg(long, default_value = "0")]
    demo_messages: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let connection_timeout = resolve_connect_timeout(&args)?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
            running.store(false, Ordering::Release);
        });
    }

    let inbound = LoopbackChannel::with_window(args.window);
    let outbound = LoopbackChannel::with_window(args.window);
    let archive = LoopbackArchive::new();

    let publication = outbound.publication();
    let session_id = publication.session_id();
    let mut node = PipeNode::start(
        inbound.subscription(),
        publication,
        archive.clone(),
        &args.record_channel,
        args.record_stream_id,
        Arc::clone(&running),
        NodeConfig { connection_timeout },
    )
    .context("register recording")?;
    // The loopback archive records as soon as it is asked to.
    archive.mark_started(session_id);

    // Keep the inbound end connected and optionally feed demo traffic.
    let mut feeder = inbound.publication();
    if args.demo_messages > 0 {
        let demo_messages = args.demo_messages;
        let running = Arc::clone(&running);
        tokio::task::spawn_blocking(move || {
            let fed = feed_demo(&mut feeder, &running, demo_messages);
            info!(count = fed, "demo feed complete");
        });
    }

    // Drain the outbound side so the node's window keeps opening.
    let sink_task = {
        let running = Arc::clone(&running);
        let mut sink = outbound.subscription();
        tokio::task::spawn_blocking(move || {
            let mut forwarded: u64 = 0;
            let mut count = |_: &[u8]| -> pacer_transport::Result<()> {
                forwarded += 1;
                Ok(())
            };
            while running.load(Ordering::Acquire) {
                if let Err(err) = sink.poll(&mut count, 64) {
                    warn!(error = %err, "sink poll failed");
                    break;
                }
                std::hint::spin_loop();
            }
            forwarded
        })
    };

    let node_task = tokio::task::spawn_blocking(move || {
        let result = node.run();
        node.close();
        result
    });

    // A startup timeout or a fatal transport error aborts the whole
    // process; no partially started node is left running.
    node_task
        .await
        .context("join pipe node thread")?
        .context("pipe node failed")?;

    let forwarded = sink_task.await.context("join sink thread")?;
    info!(forwarded, "pipe node exited cleanly");
    Ok(())
}

// Publishes `count` big-endian sequence numbers, retrying only on
// backpressure; any other refusal aborts the feed. Returns the number
// actually published.
fn feed_demo<P: Publication>(feeder: &mut P, running: &AtomicBool, count: u64) -> u64 {
    for i in 0..count {
        if !running.load(Ordering::Acquire) {
            return i;
        }
        loop {
            match feeder.offer(&i.to_be_bytes()) {
                Ok(_) => break,
                Err(OfferError::Backpressured) => {
                    if !running.load(Ordering::Acquire) {
                        return i;
                    }
                    std::hint::spin_loop();
                }
                Err(err) => {
                    warn!(error = %err, "demo feed aborted");
                    return i;
                }
            }
        }
    }
    count
}

fn resolve_connect_timeout(args: &Args) -> Result<Duration> {
    let literal = args
        .connect_timeout
        .clone()
        .or_else(|| std::env::var(CONNECT_TIMEOUT_ENV).ok());
    match literal {
        Some(value) => parse_duration(&value)
            .with_context(|| format!("parse connection timeout: {value}")),
        None => Ok(DEFAULT_CONNECTION_TIMEOUT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacer_transport::loopback::LoopbackChannel;

    #[test]
    fn demo_feed_publishes_the_full_sequence() {
        let channel = LoopbackChannel::with_window(8);
        let mut feeder = channel.publication();
        let running = AtomicBool::new(true);
        assert_eq!(feed_demo(&mut feeder, &running, 5), 5);
        assert_eq!(channel.queued(), 5);
    }

    #[test]
    fn demo_feed_bails_on_a_closed_channel() {
        let channel = LoopbackChannel::with_window(8);
        let mut feeder = channel.publication();
        channel.close();
        let running = AtomicBool::new(true);
        assert_eq!(feed_demo(&mut feeder, &running, 5), 0);
        assert_eq!(channel.queued(), 0);
    }
}
