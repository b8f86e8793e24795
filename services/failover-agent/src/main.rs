// Failover control agent: the receiving end of the control protocol.
// Decodes each datagram and logs what a cluster node would act on.
// Malformed payloads are logged and ignored; a bad sender must never
// take the agent down.
use anyhow::{Context, Result};
use clap::Parser;
use pacer_wire::Command;
use tokio::net::UdpSocket;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "failover-agent")]
#[command(about = "Receives failover control commands on a cluster node")]
struct Args {
    /// Bind address for control datagrams
    #[arg(long, default_value = "0.0.0.0:9010")]
    bind: String,
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
    let socket = UdpSocket::bind(&args.bind)
        .await
        .with_context(|| format!("bind control socket: {}", args.bind))?;
    info!(addr = %socket.local_addr()?, "control agent listening");

    let mut buf = [0u8; 64];
    loop {
        let (len, peer) = socket
            .recv_from(&mut buf)
            .await
            .context("receive control datagram")?;
        match Command::decode(&buf[..len]) {
            Ok(Command::StepDown) => info!(%peer, "step-down requested"),
            Ok(Command::Restart) => info!(%peer, "restart requested"),
            Ok(Command::CycleNode { node_id }) => info!(%peer, node_id, "cycle-node requested"),
            Err(err) => warn!(%peer, len, error = %err, "ignoring malformed control datagram"),
        }
    }
}
