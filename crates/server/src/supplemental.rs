use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use bastion_reconcile::{SourceError, SupplementalRecord, SupplementalSource};

use crate::error::ServerError;
use crate::registry_client::parse_base_url;

/// Supplemental source that fetches a JSON array of records with one `GET`.
pub struct HttpSupplementalSource {
    url: Url,
    client: Client,
    token: Option<String>,
    timeout: Duration,
}

impl HttpSupplementalSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ServerError> {
        let url = parse_base_url("supplemental", url)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url,
            client,
            token: None,
            timeout,
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn unavailable(&self, error: &reqwest::Error) -> SourceError {
        if error.is_timeout() {
            SourceError::Timeout(self.timeout)
        } else {
            SourceError::Unavailable(error.to_string())
        }
    }
}

impl std::fmt::Debug for HttpSupplementalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSupplementalSource")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SupplementalSource for HttpSupplementalSource {
    fn name(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch(&self) -> Result<Vec<SupplementalRecord>, SourceError> {
        let mut request = self.client.get(self.url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| self.unavailable(&e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Unavailable(format!(
                "source returned {}",
                status.as_u16()
            )));
        }
        let body = response.bytes().await.map_err(|e| self.unavailable(&e))?;
        serde_json::from_slice(&body).map_err(|e| SourceError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    async fn reply_once(listener: TcpListener, status: u16, body: &'static str) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = stream.read(&mut buf).await.unwrap();
        let response = format!(
            "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
    }

    async fn source() -> (HttpSupplementalSource, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let source = HttpSupplementalSource::new(
            &format!("http://127.0.0.1:{port}/agents"),
            Duration::from_secs(5),
        )
        .unwrap();
        (source, listener)
    }

    #[tokio::test]
    async fn decodes_record_list() {
        let (source, listener) = source().await;
        let server = tokio::spawn(reply_once(
            listener,
            200,
            r#"[{"id":"0xabc","alias":"a1","name":"Alpha","status":"ACTIVE","creationCount":7,"metadata":{"chain":"base"}}]"#,
        ));

        let records = source.fetch().await.unwrap();
        server.await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].alias.as_deref(), Some("a1"));
        assert_eq!(records[0].creation_count, Some(7));
    }

    #[tokio::test]
    async fn error_status_is_unavailable() {
        let (source, listener) = source().await;
        let server = tokio::spawn(reply_once(listener, 502, "bad gateway"));
        let err = source.fetch().await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, SourceError::Unavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn non_list_body_is_a_decode_error() {
        let (source, listener) = source().await;
        let server = tokio::spawn(reply_once(listener, 200, r#"{"records":[]}"#));
        let err = source.fetch().await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, SourceError::Decode(_)));
    }
}
