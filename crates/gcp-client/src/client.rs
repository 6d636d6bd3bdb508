//! GCP Compute client
//!
//! Authenticates with the instance metadata server (workload identity or
//! node service account) and calls the Compute `globalAddresses.insert` API.

use crate::error::GcpError;
use crate::gcp_trait::GlobalAddressManager;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Tokens are refreshed this long before they expire
const TOKEN_EXPIRY_MARGIN_SECONDS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// GCP Compute API client
pub struct GcpClient {
    client: Client,
    project: String,
    compute_endpoint: String,
    metadata_endpoint: String,
    token: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for GcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpClient")
            .field("project", &self.project)
            .field("compute_endpoint", &self.compute_endpoint)
            .finish_non_exhaustive()
    }
}

impl GcpClient {
    /// Create a new GCP client
    ///
    /// # Arguments
    /// * `project` - GCP project that owns the addresses
    /// * `compute_endpoint` - Compute API base URL (e.g. "https://compute.googleapis.com")
    /// * `metadata_endpoint` - Metadata server base URL (e.g. "http://metadata.google.internal")
    pub fn new(
        project: String,
        compute_endpoint: String,
        metadata_endpoint: String,
    ) -> Result<Self, GcpError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(GcpError::Http)?;

        Ok(Self {
            client,
            project,
            compute_endpoint: compute_endpoint.trim_end_matches('/').to_string(),
            metadata_endpoint: metadata_endpoint.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        })
    }

    /// Project the client operates on
    pub fn project(&self) -> &str {
        &self.project
    }

    async fn access_token(&self) -> Result<String, GcpError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.access_token.clone());
            }
        }

        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.metadata_endpoint
        );
        debug!("Fetching access token from metadata server");

        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GcpError::Authentication(format!("{status} - {body}")));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = (token.expires_in - TOKEN_EXPIRY_MARGIN_SECONDS).max(0);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now() + ChronoDuration::seconds(lifetime),
        });
        Ok(token.access_token)
    }
}

#[async_trait::async_trait]
impl GlobalAddressManager for GcpClient {
    async fn ensure_ipv6(&self, name: &str) -> Result<(), GcpError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/compute/v1/projects/{}/global/addresses",
            self.compute_endpoint, self.project
        );
        let body = serde_json::json!({
            "name": name,
            "ipVersion": "IPV6",
            "addressType": "EXTERNAL",
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            debug!("Global address {} already exists", name);
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GcpError::Api(format!(
                "Failed to reserve global address {name}: {status} - {body}"
            )));
        }

        info!("Reserved global IPv6 address {} in project {}", name, self.project);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Reads headers plus a `Content-Length` body so the connection closes cleanly.
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    /// Serves canned responses: the metadata token endpoint and the
    /// addresses endpoint answering with `address_status`.
    async fn fake_gcp(address_status: u16) -> (String, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let token_calls = Arc::new(AtomicUsize::new(0));
        let insert_calls = Arc::new(AtomicUsize::new(0));
        let (tc, ic) = (Arc::clone(&token_calls), Arc::clone(&insert_calls));

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut socket).await;

                let (status, body) = if request.contains("/service-accounts/default/token") {
                    assert!(request.to_lowercase().contains("metadata-flavor: google"));
                    tc.fetch_add(1, Ordering::SeqCst);
                    (200, r#"{"access_token":"tok","expires_in":3600,"token_type":"Bearer"}"#)
                } else {
                    assert!(request.starts_with("POST /compute/v1/projects/proj/global/addresses"));
                    assert!(request.to_lowercase().contains("authorization: bearer tok"));
                    ic.fetch_add(1, Ordering::SeqCst);
                    (address_status, r#"{}"#)
                };
                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (base, token_calls, insert_calls)
    }

    #[tokio::test]
    async fn test_ensure_ipv6_reuses_cached_token() {
        let (base, token_calls, insert_calls) = fake_gcp(200).await;
        let client = GcpClient::new("proj".to_string(), base.clone(), base).unwrap();

        client.ensure_ipv6("ns-web-ipv6").await.unwrap();
        client.ensure_ipv6("ns-web-ipv6").await.unwrap();

        assert_eq!(token_calls.load(Ordering::SeqCst), 1);
        assert_eq!(insert_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ensure_ipv6_existing_address_is_ok() {
        let (base, _, _) = fake_gcp(409).await;
        let client = GcpClient::new("proj".to_string(), base.clone(), base).unwrap();
        assert!(client.ensure_ipv6("ns-web-ipv6").await.is_ok());
    }

    #[tokio::test]
    async fn test_ensure_ipv6_surfaces_api_errors() {
        let (base, _, _) = fake_gcp(403).await;
        let client = GcpClient::new("proj".to_string(), base.clone(), base).unwrap();
        let err = client.ensure_ipv6("ns-web-ipv6").await.unwrap_err();
        assert!(matches!(err, GcpError::Api(_)));
    }
}
