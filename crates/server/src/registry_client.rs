use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use bastion_core::{AgentFilter, AgentRecord, Creation, NewCreation, RegistryClient, RegistryError};

use crate::error::{ConfigError, ServerError};

/// JSON-over-HTTP client for the Registry.
///
/// | operation | request |
/// |---|---|
/// | `get_agents` | `GET {base}/agents?status=&limit=` |
/// | `get_agent` | `GET {base}/agents/{id}?include=a,b` |
/// | `get_creations` | `GET {base}/agents/{id}/creations` |
/// | `create_creation` | `POST {base}/agents/{id}/creations` |
pub struct HttpRegistryClient {
    base: Url,
    client: Client,
    token: Option<String>,
    timeout: Duration,
}

impl HttpRegistryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServerError> {
        let base = parse_base_url("registry", base_url)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base,
            client,
            token: None,
            timeout,
        })
    }

    /// Send `Authorization: Bearer <token>` on every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `parse_base_url` rejects cannot-be-a-base URLs.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RegistryError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(&e))?;
        if !status.is_success() {
            debug!(status = status.as_u16(), "registry returned an error status");
            return Err(RegistryError::from_status(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }
        serde_json::from_slice(&body).map_err(|e| RegistryError::Decode(e.to_string()))
    }

    fn transport_error(&self, error: &reqwest::Error) -> RegistryError {
        if error.is_timeout() {
            RegistryError::Timeout(self.timeout)
        } else {
            RegistryError::Transport(error.to_string())
        }
    }
}

impl std::fmt::Debug for HttpRegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRegistryClient")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.token.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn get_agents(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>, RegistryError> {
        let request = self.client.get(self.endpoint(&["agents"])).query(filter);
        self.send(request).await
    }

    async fn get_agent(&self, id: &str, include: &[String]) -> Result<AgentRecord, RegistryError> {
        let mut request = self.client.get(self.endpoint(&["agents", id]));
        if !include.is_empty() {
            request = request.query(&[("include", include.join(","))]);
        }
        self.send(request).await
    }

    async fn get_creations(&self, agent_id: &str) -> Result<Vec<Creation>, RegistryError> {
        let request = self
            .client
            .get(self.endpoint(&["agents", agent_id, "creations"]));
        self.send(request).await
    }

    async fn create_creation(
        &self,
        agent_id: &str,
        body: &NewCreation,
    ) -> Result<Creation, RegistryError> {
        let request = self
            .client
            .post(self.endpoint(&["agents", agent_id, "creations"]))
            .json(body);
        self.send(request).await
    }
}

/// Parse an http(s) base URL usable as a path prefix.
pub(crate) fn parse_base_url(section: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid { section, reason };
    let url = Url::parse(raw).map_err(|e| invalid(format!("invalid url \"{raw}\": {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(invalid(format!("url must be http(s): {raw}")));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Accept one connection, reply with `status` and `body`, and return the
    /// raw request head.
    async fn serve_once(listener: TcpListener, status: u16, body: &'static str) -> String {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            raw.extend_from_slice(&buf[..n]);
            if n == 0 || request_complete(&raw) {
                break;
            }
        }
        let response = format!(
            "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
        String::from_utf8(raw).unwrap()
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

    async fn client_for(path: &str) -> (HttpRegistryClient, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client =
            HttpRegistryClient::new(&format!("http://127.0.0.1:{port}{path}"), Duration::from_secs(5))
                .unwrap();
        (client, listener)
    }

    #[tokio::test]
    async fn lists_agents_with_filter_and_token() {
        let (client, listener) = client_for("/api/").await;
        let client = client.with_token("svc-token");
        let server = tokio::spawn(serve_once(
            listener,
            200,
            r#"[{"id":"a1","name":"Alpha","status":"ACTIVE","creationCount":3,"tier":"gold"}]"#,
        ));

        let filter = AgentFilter {
            status: Some("ACTIVE".into()),
            limit: Some(10),
        };
        let agents = client.get_agents(&filter).await.unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("GET /api/agents?status=ACTIVE&limit=10 "));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer svc-token"));
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].creation_count, 3);
        assert_eq!(agents[0].attributes["tier"], "gold");
    }

    #[tokio::test]
    async fn agent_ids_are_path_escaped() {
        let (client, listener) = client_for("").await;
        let server = tokio::spawn(serve_once(
            listener,
            200,
            r#"{"id":"a/1","name":"Slash","status":"ACTIVE"}"#,
        ));

        let include = vec!["creations".to_owned(), "stats".to_owned()];
        let agent = client.get_agent("a/1", &include).await.unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("GET /agents/a%2F1?include=creations%2Cstats "));
        assert_eq!(agent.id, "a/1");
    }

    #[tokio::test]
    async fn posts_creation_as_json() {
        let (client, listener) = client_for("").await;
        let server = tokio::spawn(serve_once(
            listener,
            201,
            r#"{"id":"c1","agentId":"a1","title":"Sunrise","createdAt":"2026-01-01T00:00:00Z"}"#,
        ));

        let body = NewCreation {
            title: "Sunrise".into(),
            media_uri: None,
            metadata: serde_json::json!({}),
        };
        let created = client.create_creation("a1", &body).await.unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("POST /agents/a1/creations "));
        assert!(request.contains(r#""title":"Sunrise""#));
        assert_eq!(created.id, "c1");
    }

    #[tokio::test]
    async fn statuses_map_to_registry_errors() {
        let (client, listener) = client_for("").await;
        let server = tokio::spawn(serve_once(listener, 404, "no such agent"));
        let err = client.get_creations("ghost").await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, RegistryError::NotFound(ref m) if m == "no such agent"));
        assert!(!err.counts_against_breaker());

        let (client, listener) = client_for("").await;
        let server = tokio::spawn(serve_once(listener, 503, "down"));
        let err = client.get_creations("a1").await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, RegistryError::Status { status: 503, .. }));
        assert!(err.counts_against_breaker());
    }

    #[tokio::test]
    async fn undecodable_body_is_a_decode_error() {
        let (client, listener) = client_for("").await;
        let server = tokio::spawn(serve_once(listener, 200, "<html>"));
        let err = client.get_creations("a1").await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, RegistryError::Decode(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let client =
            HttpRegistryClient::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(1))
                .unwrap();
        let err = client.get_creations("a1").await.unwrap_err();
        assert!(matches!(err, RegistryError::Transport(_)));
    }

    #[test]
    fn rejects_non_http_base_urls() {
        assert!(HttpRegistryClient::new("mailto:ops@example.com", Duration::from_secs(1)).is_err());
        assert!(HttpRegistryClient::new("not a url", Duration::from_secs(1)).is_err());
    }
}
