//! Session coordinator.
//!
//! One task owns the deck, the prefetch cache and the state machine. Caller
//! commands and background results arrive on the same queue and are applied
//! one at a time, so observers only ever see whole transitions.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::artwork::ArtworkFetcher;
use crate::deck::Deck;
use crate::dispatch::{
    Command, Dispatcher, EngineState, Event, Message, Publisher, SessionEvent, SessionSnapshot,
    Ticket,
};
use crate::error::{ResolveError, SessionError};
use crate::playback::{PlaybackService, PlaybackWorker};
use crate::prefetch::PrefetchCache;
use crate::resolver::StreamResolver;
use crate::settings::{EngineSettings, DEFAULT_PRELOAD_COUNT, MAX_PRELOAD_COUNT};
use crate::track::{Decision, Track};

const DEFAULT_EVENT_CAPACITY: usize = 256;

pub struct SwipeEngineBuilder {
    resolver: Arc<dyn StreamResolver>,
    playback: Arc<dyn PlaybackService>,
    preload_count: usize,
    artwork: Option<ArtworkFetcher>,
    rng_seed: Option<u64>,
    event_capacity: usize,
}

impl SwipeEngineBuilder {
    /// Positions resolved ahead of the presented one
    pub fn preload_count(mut self, count: usize) -> Self {
        self.preload_count = count.min(MAX_PRELOAD_COUNT);
        self
    }

    /// Apply persisted settings (lookahead and album art)
    pub fn settings(mut self, settings: &EngineSettings) -> Self {
        self.preload_count = settings.preload_count.min(MAX_PRELOAD_COUNT);
        self.artwork = ArtworkFetcher::from_settings(settings);
        self
    }

    pub fn artwork(mut self, fetcher: ArtworkFetcher) -> Self {
        self.artwork = Some(fetcher);
        self
    }

    /// Deterministic deck shuffles
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Start the coordinator. Must be called from within a tokio runtime.
    pub fn spawn(self) -> SwipeEngine {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(&tx);
        let (publisher, snapshot) = Publisher::new(self.event_capacity);
        let events = publisher.events();

        let rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let coordinator = Coordinator {
            rx,
            worker: PlaybackWorker::spawn(self.playback, dispatcher.clone()),
            dispatcher,
            publisher,
            resolver: self.resolver,
            artwork: self.artwork,
            preload_count: self.preload_count,
            rng,
            last_session: 0,
            state: EngineState::Idle,
            session: None,
        };
        tokio::spawn(coordinator.run());

        crate::log_info!("[engine] Swipe engine started (preload {})", self.preload_count);

        SwipeEngine {
            tx,
            snapshot,
            events,
        }
    }
}

/// Cloneable handle to a running engine.
///
/// The coordinator shuts down, releasing any playback, after `close()` or
/// once every handle has been dropped.
#[derive(Clone)]
pub struct SwipeEngine {
    tx: mpsc::UnboundedSender<Message>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SwipeEngine {
    pub fn builder(
        resolver: Arc<dyn StreamResolver>,
        playback: Arc<dyn PlaybackService>,
    ) -> SwipeEngineBuilder {
        SwipeEngineBuilder {
            resolver,
            playback,
            preload_count: DEFAULT_PRELOAD_COUNT,
            artwork: None,
            rng_seed: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Shuffle `candidates` into a new deck and present its first track.
    ///
    /// A running session is returned from first. Fails only for an empty
    /// selection or a closed engine.
    pub async fn start_session(&self, candidates: Vec<Track>) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { candidates, reply })
            .map_err(|_| SessionError::Closed)?;
        rx.await.unwrap_or(Err(SessionError::Closed))
    }

    /// Ignored unless a track is being presented
    pub fn swipe(&self, decision: Decision) {
        let _ = self.send(Command::Swipe(decision));
    }

    /// End the session and hand back its accepted tracks
    pub async fn return_to_selection(&self) -> Vec<Track> {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Return { reply }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Stop playback and shut the engine down. Safe to call repeatedly.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Close { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn send(&self, command: Command) -> Result<(), ()> {
        self.tx.send(Message::Command(command)).map_err(|_| ())
    }
}

struct Session {
    id: u64,
    deck: Deck,
    cache: Arc<PrefetchCache>,
    skipped: Vec<Track>,
    rejected: usize,
    playing: bool,
}

struct Coordinator {
    rx: mpsc::UnboundedReceiver<Message>,
    dispatcher: Dispatcher,
    publisher: Publisher,
    resolver: Arc<dyn StreamResolver>,
    worker: PlaybackWorker,
    artwork: Option<ArtworkFetcher>,
    preload_count: usize,
    rng: StdRng,
    last_session: u64,
    state: EngineState,
    session: Option<Session>,
}

impl Coordinator {
    async fn run(mut self) {
        while let Some(message) = self.rx.recv().await {
            let keep_running = match message {
                Message::Command(command) => self.handle_command(command).await,
                Message::Event(event) => {
                    self.handle_event(event);
                    true
                }
            };
            if !keep_running {
                return;
            }
        }

        // Every handle dropped without close()
        crate::log_info!("[engine] All handles dropped, shutting down");
        self.end_session().await;
        self.worker.shutdown().await;
    }

    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start { candidates, reply } => {
                let result = self.start(candidates).await;
                let _ = reply.send(result);
            }
            Command::Swipe(decision) => self.swipe(decision),
            Command::Return { reply } => {
                let accepted = self.return_to_selection().await;
                let _ = reply.send(accepted);
            }
            Command::Close { reply } => {
                self.end_session().await;
                self.worker.shutdown().await;
                self.state = EngineState::Closed;
                self.publish();
                self.publisher.emit(SessionEvent::Closed);
                crate::log_info!("[engine] Closed");
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn start(&mut self, candidates: Vec<Track>) -> Result<(), SessionError> {
        let mut deck = match Deck::build_with_rng(candidates, &mut self.rng) {
            Ok(deck) => deck,
            Err(e) => {
                crate::log_warn!("[engine] Cannot start session: {}", e);
                return Err(e);
            }
        };

        if self.session.is_some() {
            crate::log_info!("[engine] Restarting: returning from session {}", self.last_session);
            self.return_to_selection().await;
        }

        self.last_session += 1;
        let id = self.last_session;
        let queries = deck.tracks().iter().map(Track::query).collect();
        let cache = Arc::new(PrefetchCache::new(id, queries, Arc::clone(&self.resolver)));
        let total = deck.len();
        deck.advance();

        self.session = Some(Session {
            id,
            deck,
            cache,
            skipped: Vec::new(),
            rejected: 0,
            playing: false,
        });

        crate::log_info!("[engine] Session {} started with {} tracks", id, total);
        self.publisher.emit(SessionEvent::SessionStarted { session: id, total });
        self.present(0);
        Ok(())
    }

    fn swipe(&mut self, decision: Decision) {
        let position = match self.state {
            EngineState::Presenting { position } => position,
            other => {
                crate::log_debug!("[engine] Ignoring {:?} swipe while {:?}", decision, other);
                return;
            }
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.deck.record(decision);
        if decision == Decision::Reject {
            session.rejected += 1;
        }
        crate::log_debug!("[engine] {:?} at position {}", decision, position);
        self.advance();
    }

    /// Present the next deck position, or finish the session
    fn advance(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.deck.advance().is_none() {
            self.exhaust();
            return;
        }
        if let Some(position) = session.deck.current_position() {
            self.present(position);
        }
    }

    fn present(&mut self, position: usize) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(track) = session.deck.get(position).cloned() else {
            return;
        };
        session.playing = false;
        let ticket = Ticket {
            session: session.id,
            position,
        };
        let total = session.deck.len();
        let cache = Arc::clone(&session.cache);

        self.state = EngineState::Transitioning { position };
        self.publish();
        self.worker.stop();

        if let Some(locator) = cache.take(position) {
            crate::log_debug!("[engine] Using prefetched stream for position {}", position);
            self.worker.play(ticket, locator);
        } else {
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                let result = cache.acquire(position).await;
                dispatcher.post(Event::Resolved {
                    session: ticket.session,
                    position,
                    result,
                });
            });
        }
        self.spawn_artwork(ticket, &track);

        // Swipes count from here on, even before the stream is live
        self.state = EngineState::Presenting { position };
        self.publisher.emit(SessionEvent::TrackPresented {
            position,
            total,
            track,
        });
        self.publish();
    }

    fn spawn_artwork(&self, ticket: Ticket, track: &Track) {
        let (Some(fetcher), Some(url)) = (self.artwork.clone(), track.album_art.clone()) else {
            return;
        };
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let result = fetcher.fetch(&url).await.map_err(|e| e.to_string());
            dispatcher.post(Event::Artwork {
                session: ticket.session,
                position: ticket.position,
                result,
            });
        });
    }

    fn exhaust(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.playing = false;
        session.cache.shutdown();
        let accepted = session.deck.accepted().to_vec();

        self.worker.stop();
        self.state = EngineState::Exhausted;
        crate::log_info!(
            "[engine] Session {} exhausted: {} accepted, {} skipped",
            session.id,
            accepted.len(),
            session.skipped.len()
        );
        self.publisher.emit(SessionEvent::Exhausted { accepted });
        self.publish();
    }

    async fn return_to_selection(&mut self) -> Vec<Track> {
        let accepted = self.end_session().await;
        self.state = EngineState::Idle;
        self.publish();
        self.publisher.emit(SessionEvent::Returned {
            accepted: accepted.clone(),
        });
        accepted
    }

    /// Cancel background work and wait until playback is released
    async fn end_session(&mut self) -> Vec<Track> {
        let accepted = match self.session.take() {
            Some(session) => {
                session.cache.shutdown();
                session.deck.accepted().to_vec()
            }
            None => Vec::new(),
        };
        self.worker.stop_and_wait().await;
        accepted
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Resolved {
                session,
                position,
                result,
            } => {
                if !self.is_current(session, position) {
                    crate::log_debug!("[engine] Discarding stale resolution for {}:{}", session, position);
                    return;
                }
                match result {
                    Ok(locator) => self.worker.play(Ticket { session, position }, locator),
                    Err(ResolveError::Cancelled) => {}
                    Err(e) => self.skip_unavailable(position, e.to_string()),
                }
            }
            Event::PlaybackStarted { ticket } => {
                if !self.is_current(ticket.session, ticket.position) {
                    crate::log_debug!("[engine] Playback started for stale position {}", ticket.position);
                    return;
                }
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                session.playing = true;
                let scheduled = session
                    .cache
                    .schedule_prefetch(ticket.position + 1, self.preload_count);
                crate::log_debug!(
                    "[engine] Position {} live, {} prefetches scheduled",
                    ticket.position,
                    scheduled
                );
                self.publish();
                self.publisher.emit(SessionEvent::PlaybackStarted {
                    position: ticket.position,
                });
            }
            Event::PlaybackFailed { ticket, error } => {
                if self.is_current(ticket.session, ticket.position) {
                    self.skip_unavailable(ticket.position, error.to_string());
                }
            }
            Event::Artwork {
                session,
                position,
                result,
            } => {
                let shown = match self.state {
                    EngineState::Presenting { position: p } | EngineState::Transitioning { position: p } => p,
                    _ => return,
                };
                if self.current_id() != Some(session) || shown != position {
                    return;
                }
                match result {
                    Ok(image) => self.publisher.emit(SessionEvent::Artwork { position, image }),
                    Err(e) => crate::log_debug!("[artwork] No art for position {}: {}", position, e),
                }
            }
        }
    }

    /// Record the presented track as skipped and move on
    fn skip_unavailable(&mut self, position: usize, reason: String) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(track) = session.deck.get(position).cloned() else {
            return;
        };
        crate::log_warn!(
            "[engine] Skipping '{}' at position {}: {}",
            track.name,
            position,
            reason
        );
        session.skipped.push(track.clone());
        self.publisher.emit(SessionEvent::Unavailable {
            position,
            track,
            reason,
        });
        self.advance();
    }

    fn current_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Whether a background result targets the presented position, still waiting for playback
    fn is_current(&self, session: u64, position: usize) -> bool {
        match &self.session {
            Some(s) if s.id == session && !s.playing => {
                self.state == EngineState::Presenting { position }
            }
            _ => false,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot::idle(self.last_session);
        snapshot.state = self.state;

        if let Some(session) = &self.session {
            let position = match self.state {
                EngineState::Presenting { position } | EngineState::Transitioning { position } => {
                    Some(position)
                }
                _ => None,
            };
            snapshot.current = position.and_then(|p| session.deck.get(p).cloned());
            snapshot.position = position;
            snapshot.total = session.deck.len();
            snapshot.accepted = session.deck.accepted().to_vec();
            snapshot.skipped = session.skipped.clone();
            snapshot.rejected = session.rejected;
            snapshot.playing = session.playing;
        }

        snapshot
    }

    fn publish(&self) {
        self.publisher.publish(self.snapshot());
    }
}
