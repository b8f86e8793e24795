// Wire codec for the failover control protocol.
//
// A control command travels as a single UDP datagram of exactly 4 bytes
// (command code) or 8 bytes (code plus node id), big-endian. The command
// codes below are the protocol contract between sender and receiver;
// they are fixed constants agreed out of band, not negotiated.
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const STEP_DOWN_CODE: u32 = 0x5044_0001;
pub const RESTART_CODE: u32 = 0x5044_0002;
pub const CYCLE_NODE_CODE: u32 = 0x5044_0003;

/// Largest encoded command. Control datagrams never exceed this.
pub const MAX_COMMAND_LEN: usize = 8;

pub type Result<T> = std::result::Result<T, DecodeError>;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated command ({0} bytes)")]
    Truncated(usize),
    #[error("unknown command code {0:#010x}")]
    UnknownCode(u32),
    #[error("{0} trailing bytes after command")]
    TrailingBytes(usize),
}

/// Failover control command.
///
/// ```
/// use pacer_wire::Command;
///
/// let command = Command::CycleNode { node_id: 2 };
/// let encoded = command.encoded();
/// assert_eq!(encoded.len(), 8);
/// assert_eq!(Command::decode(&encoded).expect("decode"), command);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ask the current cluster leader to step down.
    StepDown,
    /// Ask every receiving node to restart.
    Restart,
    /// Stop one node and bring it back after the failover delay.
    CycleNode { node_id: i32 },
}

impl Command {
    /// Append the encoded command to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Command::StepDown => buf.put_u32(STEP_DOWN_CODE),
            Command::Restart => buf.put_u32(RESTART_CODE),
            Command::CycleNode { node_id } => {
                buf.put_u32(CYCLE_NODE_CODE);
                buf.put_i32(*node_id);
            }
        }
    }

    /// Encode into a freshly allocated buffer.
    pub fn encoded(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MAX_COMMAND_LEN);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Exact inverse of [`Command::encode`]. The protocol is strict:
    /// payloads longer than the declared layout are rejected.
    pub fn decode(input: &[u8]) -> Result<Self> {
        let mut buf = input;
        if buf.remaining() < 4 {
            return Err(DecodeError::Truncated(input.len()));
        }
        let code = buf.get_u32();
        let command = match code {
            STEP_DOWN_CODE => Command::StepDown,
            RESTART_CODE => Command::Restart,
            CYCLE_NODE_CODE => {
                if buf.remaining() < 4 {
                    return Err(DecodeError::Truncated(input.len()));
                }
                Command::CycleNode {
                    node_id: buf.get_i32(),
                }
            }
            other => return Err(DecodeError::UnknownCode(other)),
        };
        if buf.has_remaining() {
            return Err(DecodeError::TrailingBytes(buf.remaining()));
        }
        Ok(command)
    }
}
