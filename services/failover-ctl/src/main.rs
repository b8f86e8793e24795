// Failover control CLI: broadcasts a single control command to every
// configured cluster control endpoint. Delivery is fire-and-forget by
// design; watch the cluster (or the failover-agent logs) to see what
// actually arrived.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pacer_failover::{FailoverConfig, FailoverControlClient};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "failover-ctl")]
#[command(about = "Sends failover control commands to a running cluster")]
struct Args {
    /// Optional YAML config override (falls back to PACER_FAILOVER_CONFIG)
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Ask the current leader to step down
    StepDown,
    /// Ask every receiving node to restart
    Restart,
    /// Stop one node and bring it back
    CycleNode {
        /// Cluster member to cycle
        #[arg(long)]
        node_id: i32,
        /// Wait the configured failover delay before sending
        #[arg(long)]
        after_delay: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = FailoverConfig::from_env_or_yaml(args.config.as_deref())
        .context("load failover configuration")?;
    let mut client = FailoverControlClient::new(&config).context("open control client")?;

    match args.command {
        Cmd::StepDown => {
            client.send_step_down().context("send step-down")?;
            info!("step-down broadcast");
        }
        Cmd::Restart => {
            client.send_restart().context("send restart")?;
            info!("restart broadcast");
        }
        Cmd::CycleNode {
            node_id,
            after_delay,
        } => {
            if after_delay {
                info!(delay = ?config.failover_delay(), "waiting failover delay");
                std::thread::sleep(config.failover_delay());
            }
            client
                .send_cycle_node(node_id)
                .context("send cycle-node")?;
            info!(node_id, "cycle-node broadcast");
        }
    }

    info!(targets = config.control_endpoints().len(), "done");
    Ok(())
}
