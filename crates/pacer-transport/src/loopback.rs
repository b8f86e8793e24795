// In-process transport: a bounded queue standing in for a data-plane
// channel, and an archive whose confirmations arrive asynchronously.
// Used by tests and by the pipe-node service when no external media
// driver is wired in.
use crate::{
    ArchiveControl, OfferError, Publication, RecordingId, Result, SourceLocation, Subscription,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

static NEXT_SESSION_ID: AtomicI32 = AtomicI32::new(1);

#[derive(Debug)]
struct Shared {
    state: Mutex<ChannelState>,
    session_id: i32,
}

#[derive(Debug)]
struct ChannelState {
    queue: VecDeque<Bytes>,
    window: usize,
    position: u64,
    connected: bool,
    closed: bool,
}

/// One in-memory channel. The handle stays with the test or service
/// harness so connectivity and window can be changed while the
/// publication/subscription ends are owned by the node under test.
#[derive(Debug, Clone)]
pub struct LoopbackChannel {
    shared: Arc<Shared>,
}

impl LoopbackChannel {
    pub fn with_window(window: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ChannelState {
                    queue: VecDeque::new(),
                    window,
                    position: 0,
                    connected: true,
                    closed: false,
                }),
                session_id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            }),
        }
    }

    pub fn publication(&self) -> LoopbackPublication {
        LoopbackPublication {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn subscription(&self) -> LoopbackSubscription {
        LoopbackSubscription {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn set_window(&self, window: usize) {
        self.shared.state.lock().window = window;
    }

    pub fn set_connected(&self, connected: bool) {
        self.shared.state.lock().connected = connected;
    }

    pub fn close(&self) {
        self.shared.state.lock().closed = true;
    }

    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }
}

#[derive(Debug)]
pub struct LoopbackPublication {
    shared: Arc<Shared>,
}

impl Publication for LoopbackPublication {
    fn session_id(&self) -> i32 {
        self.shared.session_id
    }

    fn available_window(&self) -> i64 {
        let state = self.shared.state.lock();
        if state.closed || !state.connected {
            return 0;
        }
        state.window as i64 - state.queue.len() as i64
    }

    fn offer(&mut self, message: &[u8]) -> std::result::Result<u64, OfferError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(OfferError::Closed);
        }
        if !state.connected {
            return Err(OfferError::NotConnected);
        }
        if state.queue.len() >= state.window {
            return Err(OfferError::Backpressured);
        }
        state.queue.push_back(Bytes::copy_from_slice(message));
        state.position += message.len() as u64;
        Ok(state.position)
    }
}

#[derive(Debug)]
pub struct LoopbackSubscription {
    shared: Arc<Shared>,
}

impl Subscription for LoopbackSubscription {
    fn is_connected(&self) -> bool {
        let state = self.shared.state.lock();
        state.connected && !state.closed
    }

    fn poll(
        &mut self,
        handler: &mut dyn FnMut(&[u8]) -> Result<()>,
        limit: usize,
    ) -> Result<usize> {
        let mut count = 0;
        while count < limit {
            // Pop under the lock, invoke the handler outside it.
            let message = self.shared.state.lock().queue.pop_front();
            let Some(message) = message else {
                break;
            };
            handler(&message)?;
            count += 1;
        }
        Ok(count)
    }
}

#[derive(Debug, Default)]
struct ArchiveState {
    next_recording_id: u64,
    recordings: Vec<Recording>,
    started_sessions: HashSet<i32>,
}

/// Recording request as the archive observed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub id: RecordingId,
    pub channel: String,
    pub stream_id: i32,
    pub source: SourceLocation,
    pub auto_stop: bool,
}

/// Archive double. Registered recordings become visible to
/// `recording_started` only after `mark_started`, modelling the real
/// archive's asynchronous catch-up.
#[derive(Debug, Clone, Default)]
pub struct LoopbackArchive {
    state: Arc<Mutex<ArchiveState>>,
}

impl LoopbackArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_started(&self, session_id: i32) {
        self.state.lock().started_sessions.insert(session_id);
    }

    pub fn recordings(&self) -> Vec<Recording> {
        self.state.lock().recordings.clone()
    }
}

impl ArchiveControl for LoopbackArchive {
    fn start_recording(
        &mut self,
        channel: &str,
        stream_id: i32,
        source: SourceLocation,
        auto_stop: bool,
    ) -> Result<RecordingId> {
        let mut state = self.state.lock();
        let id = RecordingId(state.next_recording_id);
        state.next_recording_id += 1;
        state.recordings.push(Recording {
            id,
            channel: channel.to_string(),
            stream_id,
            source,
            auto_stop,
        });
        Ok(id)
    }

    fn recording_started(&self, session_id: i32) -> Result<bool> {
        Ok(self.state.lock().started_sessions.contains(&session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_respects_window() {
        let channel = LoopbackChannel::with_window(2);
        let mut publication = channel.publication();
        assert_eq!(publication.available_window(), 2);
        publication.offer(b"a").expect("first");
        publication.offer(b"b").expect("second");
        assert_eq!(publication.available_window(), 0);
        assert_eq!(publication.offer(b"c"), Err(OfferError::Backpressured));
    }

    #[test]
    fn poll_drains_in_order_up_to_limit() {
        let channel = LoopbackChannel::with_window(8);
        let mut publication = channel.publication();
        let mut subscription = channel.subscription();
        for payload in [b"1", b"2", b"3"] {
            publication.offer(payload).expect("offer");
        }
        let mut seen = Vec::new();
        let mut handler = |message: &[u8]| -> Result<()> {
            seen.push(message.to_vec());
            Ok(())
        };
        assert_eq!(subscription.poll(&mut handler, 2).expect("poll"), 2);
        assert_eq!(subscription.poll(&mut handler, 2).expect("poll"), 1);
        assert_eq!(seen, vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
    }

    #[test]
    fn draining_reopens_the_window() {
        let channel = LoopbackChannel::with_window(1);
        let mut publication = channel.publication();
        let mut subscription = channel.subscription();
        publication.offer(b"a").expect("offer");
        assert_eq!(publication.offer(b"b"), Err(OfferError::Backpressured));
        let mut discard = |_: &[u8]| -> Result<()> { Ok(()) };
        subscription.poll(&mut discard, 8).expect("poll");
        publication.offer(b"b").expect("after drain");
    }

    #[test]
    fn closed_channel_rejects_offers() {
        let channel = LoopbackChannel::with_window(4);
        let mut publication = channel.publication();
        channel.close();
        assert_eq!(publication.offer(b"a"), Err(OfferError::Closed));
        assert!(!channel.subscription().is_connected());
    }

    #[test]
    fn disconnected_channel_has_no_window() {
        let channel = LoopbackChannel::with_window(4);
        let mut publication = channel.publication();
        channel.set_connected(false);
        assert_eq!(publication.available_window(), 0);
        assert_eq!(publication.offer(b"a"), Err(OfferError::NotConnected));
    }

    #[test]
    fn sessions_are_unique_per_channel() {
        let a = LoopbackChannel::with_window(1);
        let b = LoopbackChannel::with_window(1);
        assert_ne!(a.publication().session_id(), b.publication().session_id());
    }

    #[test]
    fn archive_confirms_only_after_mark_started() {
        let mut archive = LoopbackArchive::new();
        let id = archive
            .start_recording("pacer:ipc?session-id=9", 100, SourceLocation::Local, true)
            .expect("start");
        assert_eq!(id, RecordingId(0));
        assert!(!archive.recording_started(9).expect("poll"));
        archive.mark_started(9);
        assert!(archive.recording_started(9).expect("poll"));
        let recordings = archive.recordings();
        assert_eq!(recordings.len(), 1);
        assert!(recordings[0].auto_stop);
    }
}
