use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use crate::alert::Alert;
use crate::channel::AlertChannel;
use crate::error::ChannelError;
use crate::metrics::AlertMetrics;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex>` when a signing secret is configured.
pub const SIGNATURE_HEADER: &str = "x-bastion-signature";

/// JSON body posted for every alert.
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    alert: &'a Alert,
    service: &'a str,
    metrics: &'a AlertMetrics,
}

/// Posts alerts as JSON to an HTTP endpoint.
///
/// Any non-2xx response counts as a delivery failure.
pub struct WebhookChannel {
    url: String,
    service: String,
    secret: Option<String>,
    client: Client,
}

impl WebhookChannel {
    /// Create a channel with its own client bounded by `timeout`.
    pub fn new(
        url: impl Into<String>,
        service: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ChannelError::Configuration(format!(
                "webhook url must be http(s): {url}"
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(url, service, client))
    }

    /// Create a channel sharing an existing client.
    pub fn with_client(url: impl Into<String>, service: impl Into<String>, client: Client) -> Self {
        Self {
            url: url.into(),
            service: service.into(),
            secret: None,
            client,
        }
    }

    /// Sign every body with HMAC-SHA256 under `secret`.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn sign(secret: &str, body: &[u8]) -> Result<String, ChannelError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ChannelError::Signing(format!("invalid HMAC key: {e}")))?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for WebhookChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookChannel")
            .field("url", &self.url)
            .field("service", &self.service)
            .field("signed", &self.secret.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip_all, fields(alert_id = %alert.id, url = %self.url))]
    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        let body = serde_json::to_vec(&Envelope {
            alert,
            service: &self.service,
            metrics: &alert.metrics,
        })?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.secret {
            let signature = Self::sign(secret, &body)?;
            request = request.header(SIGNATURE_HEADER, format!("sha256={signature}"));
        }

        debug!("dispatching alert webhook");
        let response = request.body(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "alert webhook rejected");
        Err(ChannelError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::alert::Severity;

    /// A minimal mock HTTP server that answers one request with a canned status.
    struct MockServer {
        listener: tokio::net::TcpListener,
        url: String,
    }

    impl MockServer {
        async fn start() -> Self {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            Self {
                listener,
                url: format!("http://127.0.0.1:{port}/hooks/alerts"),
            }
        }

        /// Accept one connection, read the full request and reply. Returns the
        /// raw request text.
        async fn respond_once(self, status: u16) -> String {
            let (mut stream, _) = self.listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                if request_complete(&raw) {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {status} X\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok"
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8(raw).unwrap()
        }
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(head_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..head_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= head_end + 4 + length
    }

    fn alert() -> Alert {
        Alert::new(
            Some("breaker-open".into()),
            Severity::Critical,
            "circuit open",
            AlertMetrics::default().with_value("calls", 3.0),
            Utc::now(),
        )
    }

    fn body_of(request: &str) -> serde_json::Value {
        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn posts_envelope_with_signature() {
        let server = MockServer::start().await;
        let channel = WebhookChannel::new(&server.url, "bastion-test", Duration::from_secs(5))
            .unwrap()
            .with_secret("s3cret");
        let handle = tokio::spawn(server.respond_once(200));

        channel.send(&alert()).await.unwrap();
        let request = handle.await.unwrap();

        assert!(request.starts_with("POST /hooks/alerts "));
        let body = body_of(&request);
        assert_eq!(body["service"], "bastion-test");
        assert_eq!(body["alert"]["ruleId"], "breaker-open");
        assert_eq!(body["metrics"]["values"]["calls"], 3.0);

        let (_, raw_body) = request.split_once("\r\n\r\n").unwrap();
        let expected = WebhookChannel::sign("s3cret", raw_body.as_bytes()).unwrap();
        assert!(
            request
                .to_ascii_lowercase()
                .contains(&format!("{SIGNATURE_HEADER}: sha256={expected}"))
        );
    }

    #[tokio::test]
    async fn non_success_status_is_a_failure() {
        let server = MockServer::start().await;
        let channel =
            WebhookChannel::new(&server.url, "bastion", Duration::from_secs(5)).unwrap();
        let handle = tokio::spawn(server.respond_once(500));

        let err = channel.send(&alert()).await.unwrap_err();
        handle.await.unwrap();
        assert!(matches!(err, ChannelError::Status { status: 500, .. }));
    }

    #[test]
    fn rejects_non_http_urls() {
        let err = WebhookChannel::new("ftp://example.com", "b", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ChannelError::Configuration(_)));
    }

    #[test]
    fn signature_is_stable_hex() {
        let a = WebhookChannel::sign("k", b"body").unwrap();
        assert_eq!(a, WebhookChannel::sign("k", b"body").unwrap());
        assert_eq!(a.len(), 64);
        assert_ne!(a, WebhookChannel::sign("k2", b"body").unwrap());
    }
}
