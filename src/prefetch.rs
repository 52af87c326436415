//! Position-keyed lookahead of resolved stream locators for one session.
//!
//! Every position has at most one resolution in flight, whether it was
//! started by the prefetch sweep or by the playback trigger. Entries are
//! consumed exactly once and the whole cache is torn down with its session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::ResolveError;
use crate::resolver::StreamResolver;
use crate::track::Locator;

type Waiter = oneshot::Sender<Result<Locator, ResolveError>>;

enum Slot {
    InFlight { waiters: Vec<Waiter> },
    Ready(Locator),
}

#[derive(Default)]
struct Slots {
    entries: HashMap<usize, Slot>,
    closed: bool,
}

enum Claim {
    Ready(Locator),
    Wait(oneshot::Receiver<Result<Locator, ResolveError>>),
    Resolve,
}

pub struct PrefetchCache {
    session: u64,
    queries: Vec<String>,
    resolver: Arc<dyn StreamResolver>,
    slots: Mutex<Slots>,
    cancel: CancellationToken,
}

impl PrefetchCache {
    /// `queries[p]` is the resolver query for deck position `p`
    pub fn new(session: u64, queries: Vec<String>, resolver: Arc<dyn StreamResolver>) -> Self {
        Self {
            session,
            queries,
            resolver,
            slots: Mutex::new(Slots::default()),
            cancel: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Spawn one resolution task per position in `[from, from + count)` that is
    /// neither cached nor in flight. Returns how many tasks were spawned.
    pub fn schedule_prefetch(self: &Arc<Self>, from: usize, count: usize) -> usize {
        let end = from.saturating_add(count).min(self.queries.len());
        if from >= end {
            return 0;
        }

        let mut claimed = Vec::new();
        {
            let mut slots = self.lock();
            if slots.closed {
                return 0;
            }
            for position in from..end {
                if slots.entries.contains_key(&position) {
                    continue;
                }
                slots
                    .entries
                    .insert(position, Slot::InFlight { waiters: Vec::new() });
                claimed.push(position);
            }
        }

        for &position in &claimed {
            let cache = Arc::clone(self);
            tokio::spawn(async move {
                let result = cache.resolve(position).await;
                cache.complete_prefetch(position, result);
            });
        }

        if !claimed.is_empty() {
            crate::log_debug!(
                "[prefetch] session {} scheduled positions {:?}",
                self.session,
                claimed
            );
        }
        claimed.len()
    }

    /// Remove and return a resolved locator, if one is ready
    pub fn take(&self, position: usize) -> Option<Locator> {
        let mut slots = self.lock();
        match slots.entries.remove(&position) {
            Some(Slot::Ready(locator)) => Some(locator),
            Some(in_flight) => {
                slots.entries.insert(position, in_flight);
                None
            }
            None => None,
        }
    }

    /// Locator for `position`, resolving on demand if needed.
    ///
    /// Waits for an in-flight prefetch instead of starting a second
    /// resolution. Falls back to resolving itself when that prefetch fails.
    pub async fn acquire(&self, position: usize) -> Result<Locator, ResolveError> {
        match self.claim(position)? {
            Claim::Ready(locator) => return Ok(locator),
            Claim::Wait(rx) => match rx.await {
                Ok(Ok(locator)) => return Ok(locator),
                Ok(Err(ResolveError::Cancelled)) | Err(_) => return Err(ResolveError::Cancelled),
                Ok(Err(e)) => {
                    crate::log_info!(
                        "[prefetch] Prefetch of position {} failed ({}), resolving on demand",
                        position,
                        e
                    );
                    self.ensure_open()?;
                }
            },
            Claim::Resolve => {
                crate::log_info!(
                    "[prefetch] Fetching stream URL live for position {}",
                    position
                );
            }
        }

        let result = self.resolve(position).await;

        let mut slots = self.lock();
        if slots.closed {
            return Err(ResolveError::Cancelled);
        }
        slots.entries.remove(&position);
        result
    }

    fn claim(&self, position: usize) -> Result<Claim, ResolveError> {
        let mut slots = self.lock();
        if slots.closed {
            return Err(ResolveError::Cancelled);
        }

        // Nothing behind the cursor will ever be consumed
        slots
            .entries
            .retain(|&p, slot| p >= position || matches!(slot, Slot::InFlight { .. }));

        match slots.entries.remove(&position) {
            Some(Slot::Ready(locator)) => Ok(Claim::Ready(locator)),
            Some(Slot::InFlight { mut waiters }) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                slots.entries.insert(position, Slot::InFlight { waiters });
                Ok(Claim::Wait(rx))
            }
            None => {
                slots
                    .entries
                    .insert(position, Slot::InFlight { waiters: Vec::new() });
                Ok(Claim::Resolve)
            }
        }
    }

    fn ensure_open(&self) -> Result<(), ResolveError> {
        if self.lock().closed {
            return Err(ResolveError::Cancelled);
        }
        Ok(())
    }

    async fn resolve(&self, position: usize) -> Result<Locator, ResolveError> {
        if self.cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        let Some(query) = self.queries.get(position).cloned() else {
            return Err(ResolveError::NotFound(format!("deck position {}", position)));
        };
        let resolver = Arc::clone(&self.resolver);
        let task = tokio::task::spawn_blocking(move || resolver.resolve(&query));

        tokio::select! {
            _ = self.cancel.cancelled() => Err(ResolveError::Cancelled),
            joined = task => joined.unwrap_or_else(|e| Err(ResolveError::Panicked(e.to_string()))),
        }
    }

    fn complete_prefetch(&self, position: usize, result: Result<Locator, ResolveError>) {
        let mut slots = self.lock();
        if slots.closed {
            return;
        }

        let waiters = match slots.entries.remove(&position) {
            Some(Slot::InFlight { waiters }) => waiters,
            Some(ready) => {
                slots.entries.insert(position, ready);
                return;
            }
            None => return,
        };

        match result {
            Ok(locator) => {
                crate::log_info!(
                    "[prefetch] Preloaded track {}: {}",
                    position,
                    self.queries.get(position).map(String::as_str).unwrap_or("")
                );
                let mut pending = Some(locator);
                for waiter in waiters {
                    if let Some(locator) = pending.take() {
                        if let Err(Ok(locator)) = waiter.send(Ok(locator)) {
                            pending = Some(locator);
                        }
                    }
                }
                if let Some(locator) = pending {
                    slots.entries.insert(position, Slot::Ready(locator));
                }
            }
            Err(ResolveError::Cancelled) => {}
            Err(e) => {
                crate::log_warn!("[prefetch] Error preloading track {}: {}", position, e);
                // The waiting acquirer inherits the in-flight claim and retries itself
                let mut handed_off = false;
                for waiter in waiters {
                    if waiter.send(Err(e.clone())).is_ok() {
                        handed_off = true;
                    }
                }
                if handed_off {
                    slots
                        .entries
                        .insert(position, Slot::InFlight { waiters: Vec::new() });
                }
            }
        }
    }

    /// Cancel every task of this session and drop all entries; late results are discarded
    pub fn shutdown(&self) {
        let mut slots = self.lock();
        if slots.closed {
            return;
        }
        slots.closed = true;
        slots.entries.clear();
        drop(slots);
        self.cancel.cancel();
        crate::log_debug!("[prefetch] session {} cache shut down", self.session);
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().closed
    }

    /// Resolved entries waiting to be consumed
    pub fn ready_len(&self) -> usize {
        self.lock()
            .entries
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock()
            .entries
            .values()
            .filter(|s| matches!(s, Slot::InFlight { .. }))
            .count()
    }

    pub fn is_in_flight(&self, position: usize) -> bool {
        matches!(self.lock().entries.get(&position), Some(Slot::InFlight { .. }))
    }
}

impl Drop for PrefetchCache {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
