// The piping node: copies messages from an inbound subscription into an
// outbound publication whose stream is being recorded by the archive.
//
// Lifecycle: Initializing -> AwaitingConnection -> AwaitingRecordingStart
// -> Piping -> Closed. Timeouts in either awaiting phase are fatal; the
// operator restarts the process.
use crate::waiting::{await_condition, Clock, SystemClock, TimeoutError};
use pacer_transport::{
    ArchiveControl, OfferError, Publication, RecordingId, SourceLocation, Subscription,
    TransportError, channel_with_session,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

// Upper bound on messages drained per inbound poll. Backpressure from
// the outbound side throttles the drain, so a small bound keeps
// shutdown latency low without adding buffering.
const FRAGMENT_LIMIT: usize = 10;

pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(thiserror::Error, Debug)]
pub enum NodeError {
    #[error("timed out awaiting {phase}")]
    Timeout {
        phase: &'static str,
        #[source]
        source: TimeoutError,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Initializing,
    AwaitingConnection,
    AwaitingRecordingStart,
    Piping,
    Closed,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Bound on each of the two awaiting phases.
    pub connection_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }
}

/// A remote piping node over one inbound subscription, one outbound
/// publication and the archive recording that publication.
pub struct PipeNode<S, P, A> {
    subscription: S,
    publication: P,
    archive: A,
    running: Arc<AtomicBool>,
    config: NodeConfig,
    state: NodeState,
    recording_id: RecordingId,
}

impl<S, P, A> PipeNode<S, P, A>
where
    S: Subscription,
    P: Publication,
    A: ArchiveControl,
{
    /// Registers the outbound stream for recording and returns the node
    /// ready to run. The recording is scoped to this publication
    /// instance via its session id, not to the shared channel.
    pub fn start(
        subscription: S,
        publication: P,
        mut archive: A,
        record_channel: &str,
        record_stream_id: i32,
        running: Arc<AtomicBool>,
        config: NodeConfig,
    ) -> Result<Self> {
        let session_id = publication.session_id();
        let channel = channel_with_session(record_channel, session_id);
        let recording_id =
            archive.start_recording(&channel, record_stream_id, SourceLocation::Local, true)?;
        tracing::info!(
            session_id,
            %channel,
            stream_id = record_stream_id,
            recording_id = recording_id.0,
            "recording registered"
        );
        Ok(Self {
            subscription,
            publication,
            archive,
            running,
            config,
            state: NodeState::Initializing,
            recording_id,
        })
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn recording_id(&self) -> RecordingId {
        self.recording_id
    }

    /// Drives the node to completion on the calling thread: awaits both
    /// readiness conditions, then pipes until the running flag clears.
    pub fn run(&mut self) -> Result<()> {
        self.run_with_clock(&SystemClock)
    }

    pub fn run_with_clock<C: Clock>(&mut self, clock: &C) -> Result<()> {
        self.await_connected(clock)?;
        self.await_recording_started(clock)?;
        self.pipe()
    }

    /// Releases the channel handles. The recording stays with the
    /// archive; its lifecycle outlives this session so the captured
    /// stream can be replayed or dumped later.
    pub fn close(mut self) {
        self.state = NodeState::Closed;
        tracing::info!(recording_id = self.recording_id.0, "pipe node closed");
    }

    fn await_connected<C: Clock>(&mut self, clock: &C) -> Result<()> {
        self.state = NodeState::AwaitingConnection;
        tracing::info!("awaiting inbound and outbound connectivity");
        let subscription = &self.subscription;
        let publication = &self.publication;
        await_condition(
            || subscription.is_connected() && publication.available_window() > 0,
            self.config.connection_timeout,
            clock,
        )
        .map_err(|source| {
            tracing::warn!(timeout = ?source.timeout, "connection was not established");
            NodeError::Timeout {
                phase: "connection",
                source,
            }
        })
    }

    fn await_recording_started<C: Clock>(&mut self, clock: &C) -> Result<()> {
        self.state = NodeState::AwaitingRecordingStart;
        let session_id = self.publication.session_id();
        tracing::info!(session_id, "awaiting recording start confirmation");
        let archive = &self.archive;
        let mut poll_error = None;
        let result = await_condition(
            || match archive.recording_started(session_id) {
                Ok(started) => started,
                Err(err) => {
                    // Stop polling; the error is surfaced below.
                    poll_error = Some(err);
                    true
                }
            },
            self.config.connection_timeout,
            clock,
        );
        if let Some(err) = poll_error {
            return Err(err.into());
        }
        result.map_err(|source| {
            tracing::warn!(session_id, timeout = ?source.timeout, "recording did not start");
            NodeError::Timeout {
                phase: "recording start",
                source,
            }
        })
    }

    fn pipe(&mut self) -> Result<()> {
        self.state = NodeState::Piping;
        tracing::info!("piping started");
        let subscription = &mut self.subscription;
        let publication = &mut self.publication;
        let running = self.running.as_ref();
        while running.load(Ordering::Acquire) {
            let mut handler = |message: &[u8]| forward(publication, running, message);
            subscription.poll(&mut handler, FRAGMENT_LIMIT)?;
            // An empty poll is "did nothing this iteration", not an
            // invitation to sleep.
            std::hint::spin_loop();
        }
        tracing::info!("piping stopped");
        Ok(())
    }
}

/// Offer one message, retrying in place while the publication is
/// backpressured. The message is never dropped and never reordered; a
/// non-backpressure refusal is fatal. Shutdown interrupts a stuck
/// retry, abandoning the in-flight message with the session.
fn forward<P: Publication>(
    publication: &mut P,
    running: &AtomicBool,
    message: &[u8],
) -> pacer_transport::Result<()> {
    loop {
        match publication.offer(message) {
            Ok(_position) => return Ok(()),
            Err(OfferError::Backpressured) => {
                if !running.load(Ordering::Acquire) {
                    tracing::warn!(
                        len = message.len(),
                        "shutdown during backpressure retry, abandoning in-flight message"
                    );
                    return Ok(());
                }
                std::hint::spin_loop();
            }
            Err(err) => return Err(err.into()),
        }
    }
}
