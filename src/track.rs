use serde::{Deserialize, Serialize};

/// One library track as loaded from the genre library; immutable once loaded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<String>,
    /// Album art URL, if the library knows one
    #[serde(default)]
    pub album_art: Option<String>,
    /// External identifier handed off with the accepted list (e.g. a spotify: URI)
    #[serde(default)]
    pub uri: Option<String>,
}

impl Track {
    pub fn new(id: impl Into<String>, name: impl Into<String>, artists: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            artists,
            album_art: None,
            uri: None,
        }
    }

    pub fn with_album_art(mut self, url: impl Into<String>) -> Self {
        self.album_art = Some(url.into());
        self
    }

    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }

    /// Search query handed to the stream resolver: "<name> <artists>"
    pub fn query(&self) -> String {
        if self.artists.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.artist_line())
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

/// Opaque, time-limited reference to a playable audio stream
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Locator(String);

impl Locator {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Stream URLs are long and signed; keep log lines readable
        const MAX: usize = 80;
        if self.0.chars().count() > MAX {
            let head: String = self.0.chars().take(MAX).collect();
            write!(f, "{}…", head)
        } else {
            f.write_str(&self.0)
        }
    }
}
