// Out-of-band control client: encodes a command once and broadcasts it
// to every configured endpoint as one unicast datagram per target.
// There is no ack and no retry; the control path is meant to exhibit
// real delivery behavior, partial delivery included.
use crate::config::FailoverConfig;
use bytes::BytesMut;
use pacer_wire::Command;
use std::net::{SocketAddr, UdpSocket};

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("no control targets provided")]
    NoTargets,
    #[error("short send to {target}: {sent} of {len} bytes")]
    ShortSend {
        target: SocketAddr,
        sent: usize,
        len: usize,
    },
    #[error("control socket i/o")]
    Io(#[from] std::io::Error),
}

/// Client for the failover control side-channel.
///
/// Owns a non-blocking UDP socket for the lifetime of one control
/// session; dropping the client releases the socket.
pub struct FailoverControlClient {
    socket: UdpSocket,
    targets: Vec<SocketAddr>,
    buffer: BytesMut,
}

impl FailoverControlClient {
    pub fn new(config: &FailoverConfig) -> Result<Self> {
        let targets = config.control_endpoints().to_vec();
        // A validated config cannot be empty, but the client is also
        // constructible in tests with hand-built target lists.
        if targets.is_empty() {
            return Err(ClientError::NoTargets);
        }
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            targets,
            buffer: BytesMut::with_capacity(pacer_wire::MAX_COMMAND_LEN),
        })
    }

    pub fn send_step_down(&mut self) -> Result<()> {
        self.send_command(Command::StepDown)
    }

    pub fn send_restart(&mut self) -> Result<()> {
        self.send_command(Command::Restart)
    }

    pub fn send_cycle_node(&mut self, node_id: i32) -> Result<()> {
        self.send_command(Command::CycleNode { node_id })
    }

    fn send_command(&mut self, command: Command) -> Result<()> {
        // One encode per invocation; every target sees the same bytes.
        self.buffer.clear();
        command.encode(&mut self.buffer);
        for target in &self.targets {
            let sent = self.socket.send_to(&self.buffer, target)?;
            if sent != self.buffer.len() {
                // Control datagrams fit any conforming implementation in
                // one send; a short send means the socket is broken.
                return Err(ClientError::ShortSend {
                    target: *target,
                    sent,
                    len: self.buffer.len(),
                });
            }
            tracing::debug!(%target, ?command, "control command sent");
        }
        Ok(())
    }
}
