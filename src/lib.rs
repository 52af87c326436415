//! Swipe through a shuffled deck of tracks, hearing each one as it is shown.
//!
//! [`SwipeEngine`] owns the session: it shuffles the selection into a deck,
//! resolves upcoming tracks ahead of time, keeps exactly one stream playing and
//! collects accepted tracks. Stream resolution and audio output are pluggable
//! through [`StreamResolver`] and [`PlaybackService`]; `yt-dlp` and BASS
//! implementations are included.

pub mod logging;

pub mod artwork;
pub mod bass;
pub mod deck;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod library;
pub mod playback;
pub mod prefetch;
pub mod resolver;
pub mod settings;
pub mod track;

pub use artwork::ArtworkFetcher;
pub use bass::BassPlayback;
pub use deck::Deck;
pub use dispatch::{EngineState, SessionEvent, SessionSnapshot, Ticket};
pub use engine::{SwipeEngine, SwipeEngineBuilder};
pub use error::{LibraryError, PlaybackError, ResolveError, SessionError, SettingsError};
pub use library::GenreLibrary;
pub use playback::{ActivePlayback, PlaybackHandle, PlaybackService};
pub use prefetch::PrefetchCache;
pub use resolver::{StreamResolver, YtDlpResolver};
pub use settings::EngineSettings;
pub use track::{Decision, Locator, Track};
