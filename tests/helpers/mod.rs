//! In-process stand-ins for the resolver and the audio backend, plus
//! snapshot-waiting helpers shared by the engine tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use swipe_deck::{
    EngineState, Locator, PlaybackError, PlaybackHandle, PlaybackService, ResolveError,
    SessionSnapshot, StreamResolver, SwipeEngine, Track,
};

const WAIT: Duration = Duration::from_secs(5);

pub fn track(id: &str) -> Track {
    Track::new(id, format!("Song {}", id), vec!["Artist".to_string()])
}

pub fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter().map(|id| track(id)).collect()
}

/// Stream URL the fake resolver hands out for a track
pub fn stream_url(track: &Track) -> String {
    url_for(&track.query())
}

fn url_for(query: &str) -> String {
    format!("https://stream.test/{}", query.replace(' ', "+"))
}

/// Resolver with injectable latency and per-track failures
#[derive(Default)]
pub struct FakeResolver {
    latency: Duration,
    fail_for: HashSet<String>,
    calls: Mutex<HashMap<String, usize>>,
    running: Mutex<HashMap<String, usize>>,
    max_same_query: AtomicUsize,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every resolution for this track
    pub fn failing(mut self, track: &Track) -> Self {
        self.fail_for.insert(track.query());
        self
    }

    pub fn calls_for(&self, track: &Track) -> usize {
        self.calls.lock().unwrap().get(&track.query()).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Highest number of concurrent resolutions seen for any one query
    pub fn max_same_query(&self) -> usize {
        self.max_same_query.load(Ordering::SeqCst)
    }
}

impl StreamResolver for FakeResolver {
    fn resolve(&self, query: &str) -> Result<Locator, ResolveError> {
        *self.calls.lock().unwrap().entry(query.to_string()).or_default() += 1;
        {
            let mut running = self.running.lock().unwrap();
            let n = running.entry(query.to_string()).or_default();
            *n += 1;
            self.max_same_query.fetch_max(*n, Ordering::SeqCst);
        }

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        if let Some(n) = self.running.lock().unwrap().get_mut(query) {
            *n -= 1;
        }

        if self.fail_for.contains(query) {
            return Err(ResolveError::NotFound(query.to_string()));
        }
        Ok(Locator::new(url_for(query)))
    }
}

#[derive(Default)]
struct PlaybackCounters {
    live: AtomicUsize,
    max_live: AtomicUsize,
    starts: AtomicUsize,
    releases: AtomicUsize,
    double_release: AtomicBool,
    started: Mutex<Vec<String>>,
}

/// Audio backend that only counts live streams
#[derive(Default)]
pub struct FakePlayback {
    counters: Arc<PlaybackCounters>,
    start_latency: Duration,
    fail_for: HashSet<String>,
}

impl FakePlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_latency(mut self, latency: Duration) -> Self {
        self.start_latency = latency;
        self
    }

    /// Refuse to start the stream of this track
    pub fn failing(mut self, track: &Track) -> Self {
        self.fail_for.insert(stream_url(track));
        self
    }

    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.counters.starts.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }

    pub fn double_released(&self) -> bool {
        self.counters.double_release.load(Ordering::SeqCst)
    }

    /// Locators in the order their streams were started
    pub fn started(&self) -> Vec<String> {
        self.counters.started.lock().unwrap().clone()
    }
}

impl PlaybackService for FakePlayback {
    fn start(&self, locator: &Locator) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
        if !self.start_latency.is_zero() {
            std::thread::sleep(self.start_latency);
        }
        if self.fail_for.contains(locator.as_str()) {
            return Err(PlaybackError::Stream(format!(
                "BASS_ERROR_FILEOPEN for {}",
                locator.as_str()
            )));
        }
        let now = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_live.fetch_max(now, Ordering::SeqCst);
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        self.counters.started.lock().unwrap().push(locator.as_str().to_string());
        Ok(Box::new(FakeHandle {
            counters: Arc::clone(&self.counters),
            released: 0,
        }))
    }
}

struct FakeHandle {
    counters: Arc<PlaybackCounters>,
    released: usize,
}

impl PlaybackHandle for FakeHandle {
    fn stop(&mut self) {}

    fn release(&mut self) {
        self.released += 1;
        if self.released > 1 {
            self.counters.double_release.store(true, Ordering::SeqCst);
            return;
        }
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wait until the published snapshot satisfies `pred`
pub async fn wait_until(
    engine: &SwipeEngine,
    what: &str,
    pred: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = engine.watch();
    let snapshot = tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", what))
        .expect("engine dropped");
    snapshot.clone()
}

pub async fn wait_presenting(engine: &SwipeEngine, position: usize) -> SessionSnapshot {
    wait_until(engine, &format!("presenting {}", position), move |s| {
        s.state == EngineState::Presenting { position }
    })
    .await
}

/// Wait until the stream for `position` is live
pub async fn wait_playing(engine: &SwipeEngine, position: usize) -> SessionSnapshot {
    wait_until(engine, &format!("playing {}", position), move |s| {
        s.state == EngineState::Presenting { position } && s.playing
    })
    .await
}

pub async fn wait_exhausted(engine: &SwipeEngine) -> SessionSnapshot {
    wait_until(engine, "exhausted", |s| s.is_exhausted()).await
}

/// Poll a condition that is not part of the snapshot
pub async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Serve one HTTP response on a local port and return its URL
pub async fn serve_once(body: &'static [u8]) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: image/jpeg\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{}/art.jpg", addr)
}
