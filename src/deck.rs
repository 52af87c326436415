use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::SessionError;
use crate::track::{Decision, Track};

/// Shuffled, deduplicated tracks for one session plus a monotonic cursor
#[derive(Debug, Clone)]
pub struct Deck {
    tracks: Vec<Track>,
    cursor: usize,
    accepted: Vec<Track>,
}

impl Deck {
    /// Dedupe by id (first occurrence wins) and shuffle uniformly
    pub fn build(candidates: Vec<Track>) -> Result<Self, SessionError> {
        Self::build_with_rng(candidates, &mut rand::thread_rng())
    }

    pub fn build_with_rng<R: Rng + ?Sized>(
        candidates: Vec<Track>,
        rng: &mut R,
    ) -> Result<Self, SessionError> {
        let mut seen = HashSet::new();
        let mut tracks: Vec<Track> = candidates
            .into_iter()
            .filter(|t| seen.insert(t.id.clone()))
            .collect();

        if tracks.is_empty() {
            return Err(SessionError::EmptySelection);
        }

        tracks.shuffle(rng);

        Ok(Self {
            tracks,
            cursor: 0,
            accepted: Vec::new(),
        })
    }

    /// Return the track at the cursor and move past it; `None` once exhausted
    pub fn advance(&mut self) -> Option<Track> {
        let track = self.tracks.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(track)
    }

    /// Apply a decision to the track returned by the last `advance`
    pub fn record(&mut self, decision: Decision) {
        if decision != Decision::Accept {
            return;
        }
        if let Some(track) = self.last_advanced() {
            let track = track.clone();
            self.accepted.push(track);
        }
    }

    /// Position of the track returned by the last `advance`
    pub fn current_position(&self) -> Option<usize> {
        self.cursor.checked_sub(1)
    }

    pub fn last_advanced(&self) -> Option<&Track> {
        self.current_position().and_then(|p| self.tracks.get(p))
    }

    pub fn get(&self, position: usize) -> Option<&Track> {
        self.tracks.get(position)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// No track left to advance to. Already true while the last track is presented.
    pub fn is_exhausted(&self) -> bool {
        self.cursor == self.tracks.len()
    }

    pub fn accepted(&self) -> &[Track] {
        &self.accepted
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}
