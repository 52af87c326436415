use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::{self, error::RecvError};

use swipe_deck::logging::{self, SessionLogger};
use swipe_deck::{
    BassPlayback, Decision, EngineSettings, GenreLibrary, SessionError, SessionEvent, SwipeEngine,
    Track, YtDlpResolver,
};

/// Swipe through your library one track at a time
#[derive(Parser, Debug)]
#[command(name = "swipe-deck")]
#[command(about = "Listen to shuffled tracks from chosen genres and keep the ones you like")]
#[command(version)]
struct Cli {
    /// Genre library JSON (genre -> tracks)
    #[arg(short, long, env = "SWIPE_DECK_LIBRARY")]
    library: PathBuf,

    /// Genres to start with; prompts when omitted
    #[arg(short, long)]
    genre: Vec<String>,

    /// Settings file (defaults to the per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write the accepted tracks to this file as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print genres with their track counts and exit
    #[arg(long)]
    list_genres: bool,

    /// Directory for log files
    #[arg(long, env = "SWIPE_DECK_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Hide debug output
    #[arg(short, long)]
    quiet: bool,
}

type StdinLines = Lines<BufReader<Stdin>>;

enum SessionOutcome {
    BackToGenres,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::set_debug(!cli.quiet);
    if let Some(dir) = &cli.log_dir {
        SessionLogger::init(dir.join("swipe-deck.log"), dir.join("swipe-deck.err.log"))
            .map_err(anyhow::Error::msg)
            .context("Failed to initialize logging")?;
    }

    let library = GenreLibrary::load(&cli.library).context("Failed to load genre library")?;

    if cli.list_genres {
        for (genre, count) in library.genres_by_size() {
            println!("{} ({})", genre, count);
        }
        return Ok(());
    }

    let settings = match &cli.config {
        Some(path) => EngineSettings::load_from(path),
        None => EngineSettings::load(),
    };

    let resolver = Arc::new(YtDlpResolver::from_settings(&settings));
    let playback =
        Arc::new(BassPlayback::load(&settings).context("Failed to initialize audio output")?);
    let engine = SwipeEngine::builder(resolver, playback)
        .settings(&settings)
        .spawn();

    spawn_event_printer(engine.subscribe());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut accepted: Vec<Track> = Vec::new();
    let mut preselected = Some(cli.genre.clone()).filter(|g| !g.is_empty());

    loop {
        let genres = match preselected.take() {
            Some(genres) => genres,
            None => match prompt_genres(&library, &mut lines).await? {
                Some(genres) => genres,
                None => break,
            },
        };

        match engine.start_session(library.candidates(&genres)).await {
            Ok(()) => {}
            Err(SessionError::EmptySelection) => {
                println!("No songs found for those genres.");
                continue;
            }
            Err(e) => return Err(e).context("Failed to start session"),
        }
        println!("y/l = keep, n/h = skip, b = back to genres, q = quit");

        let outcome = run_session(&engine, &mut lines).await?;
        accepted.extend(engine.return_to_selection().await);
        if let SessionOutcome::Quit = outcome {
            break;
        }
        println!("{}", library.summary());
    }

    engine.close().await;

    let mut seen = HashSet::new();
    accepted.retain(|t| seen.insert(t.id.clone()));
    let json = serde_json::to_string_pretty(&accepted).context("Failed to serialize accepted tracks")?;
    println!("{}", json);

    if let Some(path) = &cli.output {
        std::fs::write(path, &json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        swipe_deck::log_info!("[cli] Wrote {} accepted tracks to {}", accepted.len(), path.display());
    }

    Ok(())
}

/// Feed key presses to the engine until the deck runs out or the user leaves
async fn run_session(engine: &SwipeEngine, lines: &mut StdinLines) -> Result<SessionOutcome> {
    let mut snapshots = engine.watch();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    return Ok(SessionOutcome::Quit);
                };
                match line.trim().to_lowercase().as_str() {
                    "y" | "l" => engine.swipe(Decision::Accept),
                    "n" | "h" => engine.swipe(Decision::Reject),
                    "b" => return Ok(SessionOutcome::BackToGenres),
                    "q" => return Ok(SessionOutcome::Quit),
                    "" => {}
                    other => println!("Unknown key '{}': y/l keep, n/h skip, b back, q quit", other),
                }
            }
            done = snapshots.wait_for(|s| s.is_exhausted()) => {
                if done.is_err() {
                    return Ok(SessionOutcome::Quit);
                }
                println!("No more songs to swipe!");
                return Ok(SessionOutcome::BackToGenres);
            }
        }
    }
}

async fn prompt_genres(library: &GenreLibrary, lines: &mut StdinLines) -> Result<Option<Vec<String>>> {
    let genres = library.genres_by_size();
    if genres.is_empty() {
        println!("The library has no genres.");
        return Ok(None);
    }

    loop {
        println!("{}", library.summary());
        for (i, (genre, count)) in genres.iter().enumerate() {
            println!("{:>3}. {} ({})", i + 1, genre, count);
        }
        println!("Select genres to swipe (numbers or names, comma separated; q to quit):");

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            return Ok(None);
        };
        let line = line.trim();
        if line.eq_ignore_ascii_case("q") {
            return Ok(None);
        }

        let selected = parse_selection(line, &genres);
        if selected.is_empty() {
            println!("Please select at least one genre.");
            continue;
        }
        return Ok(Some(selected));
    }
}

/// "1, 3, lo-fi" -> genre names; numbers index the listed genres
fn parse_selection(input: &str, genres: &[(&str, usize)]) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| match token.parse::<usize>() {
            Ok(n) if n >= 1 && n <= genres.len() => genres[n - 1].0.to_string(),
            _ => token.to_string(),
        })
        .collect()
}

fn spawn_event_printer(mut events: broadcast::Receiver<SessionEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    swipe_deck::log_warn!("[cli] Missed {} session events", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::SessionStarted { total, .. } => println!("Shuffled {} tracks", total),
        SessionEvent::TrackPresented { position, total, track } => {
            if track.artists.is_empty() {
                println!("[{}/{}] {}", position + 1, total, track.name);
            } else {
                println!("[{}/{}] {} by {}", position + 1, total, track.name, track.artist_line());
            }
        }
        SessionEvent::PlaybackStarted { .. } => println!("  playing"),
        SessionEvent::Unavailable { track, reason, .. } => {
            println!("  Could not play '{}', skipping ({})", track.name, reason)
        }
        SessionEvent::Artwork { image, .. } => {
            swipe_deck::log_debug!("[cli] Album art received ({} bytes)", image.len())
        }
        SessionEvent::Exhausted { accepted } => {
            println!("Deck finished: {} kept", accepted.len())
        }
        SessionEvent::Returned { accepted } => {
            println!("Back to genres with {} kept", accepted.len())
        }
        SessionEvent::Closed => {}
    }
}
