use std::sync::Arc;
use std::time::Duration;

use crate::settings::EngineSettings;

/// Downloads album art for the presented track
#[derive(Clone)]
pub struct ArtworkFetcher {
    client: reqwest::Client,
}

impl ArtworkFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// `None` when artwork is disabled or the client cannot be built
    pub fn from_settings(settings: &EngineSettings) -> Option<Self> {
        if !settings.fetch_artwork {
            return None;
        }
        match Self::new(Duration::from_millis(settings.artwork_timeout_ms)) {
            Ok(fetcher) => Some(fetcher),
            Err(e) => {
                crate::log_warn!("[artwork] HTTP client unavailable, artwork disabled: {}", e);
                None
            }
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<Arc<[u8]>, reqwest::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        crate::log_debug!("[artwork] {} bytes from {}", bytes.len(), url);
        Ok(Arc::from(bytes.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP responder on a random local port
    async fn serve_once(status: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: image/jpeg\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(body).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/cover.jpg", addr)
    }

    fn local_fetcher() -> ArtworkFetcher {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        ArtworkFetcher::from_client(client)
    }

    #[tokio::test]
    async fn fetch_returns_image_bytes() {
        let url = serve_once("200 OK", b"\xff\xd8\xff\xe0jpeg").await;
        let fetcher = local_fetcher();
        let image = fetcher.fetch(&url).await.unwrap();
        assert_eq!(&image[..], b"\xff\xd8\xff\xe0jpeg");
    }

    #[tokio::test]
    async fn http_errors_are_reported() {
        let url = serve_once("404 Not Found", b"").await;
        let fetcher = local_fetcher();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert_eq!(err.status().map(|s| s.as_u16()), Some(404));
    }

    #[test]
    fn disabled_in_settings_yields_none() {
        let settings = EngineSettings { fetch_artwork: false, ..EngineSettings::default() };
        assert!(ArtworkFetcher::from_settings(&settings).is_none());
    }
}
