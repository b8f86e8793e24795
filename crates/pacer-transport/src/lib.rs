// Data-plane contracts the piping node depends on.
//
// The real transport and durability service live outside this
// workspace; these traits capture the exact surface the node touches.
// The loopback module is an in-process implementation for tests and
// for running a pipe without external infrastructure.
pub mod loopback;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("channel closed: {0}")]
    Closed(String),
    #[error("archive request failed: {0}")]
    Archive(String),
    #[error("publication offer failed")]
    Offer(#[from] OfferError),
    #[error("transport i/o")]
    Io(#[from] std::io::Error),
}

/// Why an offer was refused. Backpressure is the only retryable case;
/// everything else is fatal to the piping loop.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferError {
    #[error("publication send window exhausted")]
    Backpressured,
    #[error("publication has no connected subscribers")]
    NotConnected,
    #[error("publication is closed")]
    Closed,
}

impl OfferError {
    pub fn is_backpressure(&self) -> bool {
        matches!(self, OfferError::Backpressured)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLocation {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordingId(pub u64);

/// Inbound end of a data-plane channel. `poll` drains up to `limit`
/// messages, invoking the handler once per message; the first handler
/// error aborts the drain.
pub trait Subscription {
    fn is_connected(&self) -> bool;
    fn poll(
        &mut self,
        handler: &mut dyn FnMut(&[u8]) -> Result<()>,
        limit: usize,
    ) -> Result<usize>;
}

/// Outbound end of a data-plane channel. `offer` is non-blocking and
/// returns the stream position on acceptance.
pub trait Publication {
    fn session_id(&self) -> i32;
    fn available_window(&self) -> i64;
    fn offer(&mut self, message: &[u8]) -> std::result::Result<u64, OfferError>;
}

/// Control surface of the durability service.
pub trait ArchiveControl {
    fn start_recording(
        &mut self,
        channel: &str,
        stream_id: i32,
        source: SourceLocation,
        auto_stop: bool,
    ) -> Result<RecordingId>;

    /// Readiness poll: has the archive begun recording the publication
    /// instance with this session id?
    fn recording_started(&self, session_id: i32) -> Result<bool>;
}

/// Scope a channel address to one publication instance. A channel may
/// be shared by unrelated sessions; recordings must not be.
///
/// ```
/// use pacer_transport::channel_with_session;
///
/// let channel = channel_with_session("pacer:udp?endpoint=host:4000", 7);
/// assert_eq!(channel, "pacer:udp?endpoint=host:4000|session-id=7");
/// ```
pub fn channel_with_session(channel: &str, session_id: i32) -> String {
    if channel.contains('?') {
        format!("{channel}|session-id={session_id}")
    } else {
        format!("{channel}?session-id={session_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_param_appended_after_existing_params() {
        let channel = channel_with_session("pacer:udp?endpoint=host:4000|mtu=1408", -3);
        assert_eq!(channel, "pacer:udp?endpoint=host:4000|mtu=1408|session-id=-3");
    }

    #[test]
    fn session_param_starts_param_list_when_absent() {
        let channel = channel_with_session("pacer:ipc", 11);
        assert_eq!(channel, "pacer:ipc?session-id=11");
    }

    #[test]
    fn only_backpressure_is_retryable() {
        assert!(OfferError::Backpressured.is_backpressure());
        assert!(!OfferError::NotConnected.is_backpressure());
        assert!(!OfferError::Closed.is_backpressure());
    }
}
