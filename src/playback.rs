use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};

use crate::dispatch::{Dispatcher, Event, Ticket};
use crate::error::PlaybackError;
use crate::track::Locator;

/// A live audio stream. Both calls must be idempotent.
pub trait PlaybackHandle: Send {
    fn stop(&mut self);
    fn release(&mut self);
}

/// Starts audio for a locator. May block (connecting, initial buffering).
pub trait PlaybackService: Send + Sync + 'static {
    fn start(&self, locator: &Locator) -> Result<Box<dyn PlaybackHandle>, PlaybackError>;
}

/// The one live handle the engine may own; stopped and released exactly once
pub struct ActivePlayback {
    ticket: Ticket,
    handle: Option<Box<dyn PlaybackHandle>>,
}

impl ActivePlayback {
    pub fn new(ticket: Ticket, handle: Box<dyn PlaybackHandle>) -> Self {
        Self {
            ticket,
            handle: Some(handle),
        }
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn teardown(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.stop();
            handle.release();
            crate::log_debug!(
                "[playback] Released stream for session {} position {}",
                self.ticket.session,
                self.ticket.position
            );
        }
    }
}

impl Drop for ActivePlayback {
    fn drop(&mut self) {
        self.teardown();
    }
}

pub(crate) enum PlaybackCommand {
    Play { ticket: Ticket, locator: Locator },
    Stop { ack: Option<oneshot::Sender<()>> },
    Shutdown { ack: Option<oneshot::Sender<()>> },
}

/// Dedicated thread owning the active playback slot.
///
/// Commands run strictly in order and the current stream is always torn
/// down before the next one is created.
pub(crate) struct PlaybackWorker {
    tx: mpsc::UnboundedSender<PlaybackCommand>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackWorker {
    pub(crate) fn spawn(service: std::sync::Arc<dyn PlaybackService>, dispatcher: Dispatcher) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = std::thread::Builder::new()
            .name("swipe-playback".into())
            .spawn(move || run_worker(service, dispatcher, rx))
            .map_err(|e| crate::log_error!("[playback] Failed to spawn playback thread: {}", e))
            .ok();
        Self { tx, thread }
    }

    pub(crate) fn play(&self, ticket: Ticket, locator: Locator) {
        if self.tx.send(PlaybackCommand::Play { ticket, locator }).is_err() {
            crate::log_warn!("[playback] Worker gone, dropping play request for position {}", ticket.position);
        }
    }

    /// Stop without waiting
    pub(crate) fn stop(&self) {
        let _ = self.tx.send(PlaybackCommand::Stop { ack: None });
    }

    /// Stop and wait until the current stream is released
    pub(crate) async fn stop_and_wait(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(PlaybackCommand::Stop { ack: Some(ack) }).is_ok() {
            let _ = done.await;
        }
    }

    pub(crate) async fn shutdown(&mut self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(PlaybackCommand::Shutdown { ack: Some(ack) }).is_ok() {
            let _ = done.await;
        }
        // The thread exits right after acknowledging
        self.thread.take();
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        let _ = self.tx.send(PlaybackCommand::Shutdown { ack: None });
    }
}

fn run_worker(
    service: std::sync::Arc<dyn PlaybackService>,
    dispatcher: Dispatcher,
    mut rx: mpsc::UnboundedReceiver<PlaybackCommand>,
) {
    let mut active: Option<ActivePlayback> = None;

    while let Some(command) = rx.blocking_recv() {
        match command {
            PlaybackCommand::Play { ticket, locator } => {
                if let Some(mut previous) = active.take() {
                    previous.teardown();
                }
                crate::log_info!("[playback] Playing position {}: {}", ticket.position, locator);
                match service.start(&locator) {
                    Ok(handle) => {
                        active = Some(ActivePlayback::new(ticket, handle));
                        dispatcher.post(Event::PlaybackStarted { ticket });
                    }
                    Err(error) => {
                        crate::log_error!("[playback] Error playing audio: {}", error);
                        dispatcher.post(Event::PlaybackFailed { ticket, error });
                    }
                }
            }
            PlaybackCommand::Stop { ack } => {
                if let Some(mut previous) = active.take() {
                    previous.teardown();
                }
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            PlaybackCommand::Shutdown { ack } => {
                if let Some(mut previous) = active.take() {
                    previous.teardown();
                }
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                break;
            }
        }
    }

    // Channel closed without a shutdown: the Drop of `active` still releases
    crate::log_debug!("[playback] Worker thread exiting");
}
