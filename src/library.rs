use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LibraryError;
use crate::track::Track;

/// Genre name -> tracks, as written by the library export
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenreLibrary {
    genres: BTreeMap<String, Vec<Track>>,
}

impl GenreLibrary {
    pub fn load(path: &Path) -> Result<Self, LibraryError> {
        let content = std::fs::read_to_string(path).map_err(|source| LibraryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let library: Self = serde_json::from_str(&content).map_err(|source| LibraryError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        crate::log_info!("[library] {} from {}", library.summary(), path.display());
        Ok(library)
    }

    pub fn from_map(genres: BTreeMap<String, Vec<Track>>) -> Self {
        Self { genres }
    }

    /// Non-empty genres, largest first; ties by name
    pub fn genres_by_size(&self) -> Vec<(&str, usize)> {
        let mut list: Vec<(&str, usize)> = self
            .genres
            .iter()
            .filter(|(_, tracks)| !tracks.is_empty())
            .map(|(name, tracks)| (name.as_str(), tracks.len()))
            .collect();
        list.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        list
    }

    pub fn contains(&self, genre: &str) -> bool {
        self.genres.contains_key(genre)
    }

    /// Distinct tracks across every genre
    pub fn total_tracks(&self) -> usize {
        self.genres
            .values()
            .flatten()
            .map(|t| t.id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn summary(&self) -> String {
        format!(
            "Found {} tracks across {} genres",
            self.total_tracks(),
            self.genres_by_size().len()
        )
    }

    /// Combine the selected genres into one candidate list.
    ///
    /// A track filed under several selected genres appears once, at its first
    /// occurrence. Unknown genres are logged and skipped.
    pub fn candidates(&self, selected: &[String]) -> Vec<Track> {
        let mut seen = HashSet::new();
        let mut combined = Vec::new();

        for genre in selected {
            match self.genres.get(genre) {
                Some(tracks) => {
                    for track in tracks {
                        if seen.insert(track.id.clone()) {
                            combined.push(track.clone());
                        }
                    }
                }
                None => crate::log_warn!("[library] Genre '{}' not found", genre),
            }
        }

        combined
    }
}
