//! File sinks of the session logger. Kept in its own test binary because the
//! logger is process-global.

use swipe_deck::logging::{self, SessionLogger};
use swipe_deck::{log_debug, log_error, log_info, log_warn};

#[test]
fn lines_are_split_between_log_and_error_files() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("logs").join("swipe-deck.log");
    let err_path = dir.path().join("logs").join("swipe-deck.err.log");

    SessionLogger::init(log_path.clone(), err_path.clone()).unwrap();

    log_info!("[engine] Session {} started with {} tracks", 1, 3);
    log_warn!("[prefetch] Position {} failed", 2);
    log_error!("[playback] Error playing audio: {}", "boom");

    logging::set_debug(false);
    log_debug!("[engine] hidden debug line");
    logging::set_debug(true);
    log_debug!("[engine] visible debug line");

    let log = std::fs::read_to_string(&log_path).unwrap();
    let err = std::fs::read_to_string(&err_path).unwrap();

    assert!(log.contains("[INFO] Session logger initialized"));
    assert!(log.contains("[INFO] [engine] Session 1 started with 3 tracks"));
    assert!(log.contains("[DEBUG] [engine] visible debug line"));
    assert!(!log.contains("hidden debug line"));
    assert!(!log.contains("[WARN]"));

    assert!(err.contains("[WARN] [prefetch] Position 2 failed"));
    assert!(err.contains("[ERROR] [playback] Error playing audio: boom"));
    assert!(!err.contains("[INFO]"));
}
