use anyhow::Result;
use std::time::{Duration, Instant};

use super::types::Observation;

/// Performs one probe against a URL
///
/// A probe never fails: transport errors end up in [`Observation::error`].
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &str) -> Observation;
}

/// HTTP GET prober
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// Without a timeout a hung remote keeps the job's task waiting
    /// for as long as the transport allows.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent("pinger/0.1");
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self { client: builder.build()? })
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> Observation {
        let observation = Observation::new(url);
        let start = Instant::now();

        match self.client.get(url).send().await {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let content_length = response.content_length();
                observation.response(status_code, content_length, start.elapsed())
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "probe failed");
                observation.failure(e.to_string(), start.elapsed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response and return the URL to hit
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });

        format!("http://{addr}/health")
    }

    #[tokio::test]
    async fn test_probe_records_response() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
        )
        .await;

        let prober = HttpProber::new(Some(Duration::from_secs(5))).unwrap();
        let obs = prober.probe(&url).await;

        assert_eq!(obs.url, url);
        assert_eq!(obs.status_code, 200);
        assert_eq!(obs.content_length, Some(2));
        assert!(obs.error.is_empty());
    }

    #[tokio::test]
    async fn test_probe_keeps_non_success_status() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let prober = HttpProber::new(None).unwrap();
        let obs = prober.probe(&url).await;

        assert_eq!(obs.status_code, 503);
        assert!(!obs.is_error());
    }

    #[tokio::test]
    async fn test_probe_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let prober = HttpProber::new(Some(Duration::from_secs(5))).unwrap();
        let obs = prober.probe(&format!("http://{addr}/")).await;

        assert_eq!(obs.status_code, 0);
        assert!(obs.is_error());
        assert_eq!(obs.content_length, None);
    }

    #[tokio::test]
    async fn test_probe_invalid_url() {
        let prober = HttpProber::new(None).unwrap();
        let obs = prober.probe("not a url").await;

        assert_eq!(obs.status_code, 0);
        assert!(obs.is_error());
    }
}
