//! The single observation point for a swipe session.
//!
//! Background work (resolution, playback start, album art) never touches the
//! observed state. It posts an [`Event`] here and the engine's coordinator
//! applies it. Callers read state through a `watch` snapshot and discrete
//! `broadcast` events.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::error::{PlaybackError, ResolveError, SessionError};
use crate::track::{Decision, Locator, Track};

/// Identifies one playback request: which session and which deck position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub session: u64,
    pub position: usize,
}

/// Caller requests, applied in arrival order
pub(crate) enum Command {
    Start {
        candidates: Vec<Track>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Swipe(Decision),
    Return {
        reply: oneshot::Sender<Vec<Track>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Results posted by background tasks and the playback worker
#[derive(Debug)]
pub(crate) enum Event {
    Resolved {
        session: u64,
        position: usize,
        result: Result<Locator, ResolveError>,
    },
    PlaybackStarted {
        ticket: Ticket,
    },
    PlaybackFailed {
        ticket: Ticket,
        error: PlaybackError,
    },
    Artwork {
        session: u64,
        position: usize,
        result: Result<Arc<[u8]>, String>,
    },
}

pub(crate) enum Message {
    Command(Command),
    Event(Event),
}

/// Handle given to background work for posting events.
///
/// Holds only a weak sender so stray tasks never keep a dropped engine alive.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    tx: mpsc::WeakUnboundedSender<Message>,
}

impl Dispatcher {
    pub(crate) fn new(tx: &mpsc::UnboundedSender<Message>) -> Self {
        Self { tx: tx.downgrade() }
    }

    /// Returns false once the coordinator is gone
    pub(crate) fn post(&self, event: Event) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx.send(Message::Event(event)).is_ok(),
            None => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// No deck
    Idle,
    /// Track shown; swipes are accepted whether or not its stream is live yet
    Presenting { position: usize },
    /// Prior playback being torn down and the next request set up
    Transitioning { position: usize },
    /// Every deck position has been decided
    Exhausted,
    /// Terminal
    Closed,
}

/// Everything a front-end renders, replaced atomically on every change
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub session: u64,
    pub state: EngineState,
    pub current: Option<Track>,
    pub position: Option<usize>,
    pub total: usize,
    pub accepted: Vec<Track>,
    /// Tracks skipped because no stream could be resolved or played
    pub skipped: Vec<Track>,
    pub rejected: usize,
    /// Stream for the presented track is live
    pub playing: bool,
}

impl SessionSnapshot {
    pub(crate) fn idle(session: u64) -> Self {
        Self {
            session,
            state: EngineState::Idle,
            current: None,
            position: None,
            total: 0,
            accepted: Vec::new(),
            skipped: Vec::new(),
            rejected: 0,
            playing: false,
        }
    }

    /// "3/20" style progress label
    pub fn progress(&self) -> String {
        match self.position {
            Some(p) => format!("{}/{}", p + 1, self.total),
            None => format!("0/{}", self.total),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == EngineState::Exhausted
    }
}

#[derive(Clone, Debug)]
pub enum SessionEvent {
    SessionStarted { session: u64, total: usize },
    TrackPresented { position: usize, total: usize, track: Track },
    PlaybackStarted { position: usize },
    /// Non-fatal: the track was skipped automatically
    Unavailable { position: usize, track: Track, reason: String },
    Artwork { position: usize, image: Arc<[u8]> },
    Exhausted { accepted: Vec<Track> },
    Returned { accepted: Vec<Track> },
    Closed,
}

/// Write side of the observation surface; owned by the coordinator only
pub(crate) struct Publisher {
    snapshot: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl Publisher {
    pub(crate) fn new(capacity: usize) -> (Self, watch::Receiver<SessionSnapshot>) {
        let (snapshot, snapshot_rx) = watch::channel(SessionSnapshot::idle(0));
        let (events, _) = broadcast::channel(capacity.max(1));
        (Self { snapshot, events }, snapshot_rx)
    }

    pub(crate) fn events(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    pub(crate) fn publish(&self, snapshot: SessionSnapshot) {
        self.snapshot.send_replace(snapshot);
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_label_is_one_based() {
        let mut s = SessionSnapshot::idle(1);
        s.total = 20;
        assert_eq!(s.progress(), "0/20");
        s.position = Some(2);
        assert_eq!(s.progress(), "3/20");
    }

    #[tokio::test]
    async fn post_fails_once_coordinator_is_gone() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(&tx);

        let ticket = Ticket { session: 1, position: 0 };
        assert!(dispatcher.post(Event::PlaybackStarted { ticket }));
        match rx.recv().await {
            Some(Message::Event(Event::PlaybackStarted { ticket: t })) => assert_eq!(t, ticket),
            _ => panic!("expected playback started event"),
        }

        drop(tx);
        assert!(!dispatcher.post(Event::PlaybackStarted { ticket }));
    }

    #[tokio::test]
    async fn publisher_replaces_snapshot_and_tolerates_no_subscribers() {
        let (publisher, rx) = Publisher::new(8);
        let mut s = SessionSnapshot::idle(4);
        s.total = 3;
        publisher.publish(s);
        publisher.emit(SessionEvent::Closed);

        assert_eq!(rx.borrow().session, 4);
        assert_eq!(rx.borrow().total, 3);
    }
}
