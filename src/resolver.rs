use std::path::PathBuf;

use crate::error::ResolveError;
use crate::settings::EngineSettings;
use crate::track::Locator;

/// Turns a track search query into a playable stream locator.
///
/// Implementations block the calling thread; the engine only ever calls
/// them from `spawn_blocking`.
pub trait StreamResolver: Send + Sync + 'static {
    fn resolve(&self, query: &str) -> Result<Locator, ResolveError>;
}

/// Resolves queries by running `yt-dlp -g` against a one-result YouTube search
pub struct YtDlpResolver {
    exe: PathBuf,
    format: String,
}

impl YtDlpResolver {
    pub fn new(exe: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            exe: exe.into(),
            format: format.into(),
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        let exe = settings
            .ytdlp_path
            .clone()
            .unwrap_or_else(default_ytdlp_exe);
        Self::new(exe, settings.ytdlp_format.clone())
    }

    fn args(&self, query: &str) -> Vec<String> {
        vec![
            "-g".to_string(),
            "-f".to_string(),
            self.format.clone(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            format!("ytsearch1:{}", query),
        ]
    }

    fn execute(&self, args: &[String]) -> Result<String, ResolveError> {
        let mut cmd = std::process::Command::new(&self.exe);
        cmd.args(args);

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let output = cmd
            .output()
            .map_err(|e| ResolveError::Launch(format!("{}: {}", self.exe.display(), e)))?;

        if !output.status.success() {
            return Err(ResolveError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl StreamResolver for YtDlpResolver {
    fn resolve(&self, query: &str) -> Result<Locator, ResolveError> {
        crate::log_debug!("[yt-dlp] resolving '{}'", query);
        let stdout = self.execute(&self.args(query))?;
        parse_stream_url(&stdout)
            .map(Locator::new)
            .ok_or_else(|| ResolveError::NotFound(query.to_string()))
    }
}

fn default_ytdlp_exe() -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from("yt-dlp.exe")
    } else {
        PathBuf::from("yt-dlp")
    }
}

/// First URL line of `yt-dlp -g` output
pub fn parse_stream_url(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("http://") || line.starts_with("https://"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_picks_first_url_line() {
        let out = "\nhttps://rr1.googlevideo.com/videoplayback?id=abc&itag=251\nhttps://second\n";
        assert_eq!(
            parse_stream_url(out).as_deref(),
            Some("https://rr1.googlevideo.com/videoplayback?id=abc&itag=251")
        );
    }

    #[test]
    fn parse_ignores_noise() {
        assert_eq!(parse_stream_url(""), None);
        assert_eq!(parse_stream_url("WARNING: something\n"), None);
    }

    #[test]
    fn search_arguments_target_one_result() {
        let r = YtDlpResolver::new("yt-dlp", "bestaudio/best");
        let args = r.args("Hey Ya! OutKast");
        assert_eq!(args.last().map(String::as_str), Some("ytsearch1:Hey Ya! OutKast"));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "bestaudio/best"));
        assert!(args.contains(&"-g".to_string()));
    }

    #[test]
    fn missing_executable_is_a_launch_error() {
        let r = YtDlpResolver::new("/nonexistent/definitely-not-yt-dlp", "bestaudio");
        match r.resolve("anything") {
            Err(ResolveError::Launch(msg)) => assert!(msg.contains("definitely-not-yt-dlp")),
            other => panic!("expected launch error, got {:?}", other),
        }
    }
}
