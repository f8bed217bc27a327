//! HTTP capability used by the fetcher.
//!
//! The fetcher only needs "GET this URL with these headers, this timeout and
//! this verification mode". [`HttpTransport`] captures exactly that so tests
//! can inject a scripted transport, while [`ReqwestTransport`] is the real one.

use futures::StreamExt;
use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors raised below the HTTP status level.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// TLS handshake rejected the server certificate (self-signed, expired, unknown issuer)
    #[error("certificate verification failed: {0}")]
    Certificate(String),
    /// Request did not complete within the configured timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// DNS failure, refused or reset connection
    #[error("connection failed: {0}")]
    Connect(String),
    /// Response body exceeded the configured size limit
    #[error("response too large (limit {0} bytes)")]
    TooLarge(usize),
    #[error("request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// True only for certificate-verification failures, the one class of
    /// error that may be retried without verification.
    pub fn is_certificate_error(&self) -> bool {
        matches!(self, TransportError::Certificate(_))
    }
}

/// A single GET as issued by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    /// Whether the server certificate must be validated.
    pub verify: bool,
    /// Set on the unverified attempt the caller has already accounted for,
    /// so the transport does not emit its own insecure-connection warning.
    pub suppress_insecure_warning: bool,
    /// Upper bound on the body size in bytes.
    pub max_body_bytes: usize,
}

/// Status and body of a completed GET. The body is only read for 2xx
/// responses and is empty otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal HTTP client capability.
pub trait HttpTransport: Send + Sync {
    fn get(
        &self,
        request: &HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// [`HttpTransport`] over two pooled `reqwest` clients, one verifying
/// certificates and one accepting any certificate.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    verified: reqwest::Client,
    unverified: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            verified: build_client(true)?,
            unverified: build_client(false)?,
        })
    }

    fn client(&self, verify: bool) -> &reqwest::Client {
        if verify {
            &self.verified
        } else {
            &self.unverified
        }
    }
}

fn build_client(verify: bool) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .danger_accept_invalid_certs(!verify)
        .build()
}

impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        if !request.verify {
            if request.suppress_insecure_warning {
                tracing::debug!(url = %request.url, "Issuing request without certificate verification");
            } else {
                tracing::warn!(url = %request.url, "Issuing request without certificate verification");
            }
        }

        let mut builder = self
            .client(request.verify)
            .get(&request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let send_and_read = async {
            let response = builder
                .send()
                .await
                .map_err(|e| classify(e, request.timeout))?;
            let status = response.status().as_u16();
            if !response.status().is_success() {
                // Error pages are never parsed; leave the body unread
                return Ok::<_, TransportError>(HttpResponse {
                    status,
                    body: Vec::new(),
                });
            }
            let body = read_limited_bytes(response, request).await?;
            Ok::<_, TransportError>(HttpResponse { status, body })
        };

        tokio::time::timeout(request.timeout, send_and_read)
            .await
            .map_err(|_| TransportError::Timeout(request.timeout))?
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    request: &HttpRequest,
) -> Result<Vec<u8>, TransportError> {
    let limit = request.max_body_bytes;

    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(TransportError::TooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| classify(e, request.timeout))?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(TransportError::TooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// Maps a `reqwest` error onto [`TransportError`], walking the source chain
/// to find the TLS layer's verdict.
fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout(timeout);
    }

    let detail = error_chain(&err);
    if is_certificate_failure(&err) {
        return TransportError::Certificate(detail);
    }
    if err.is_connect() {
        return TransportError::Connect(detail);
    }
    TransportError::Other(detail)
}

fn is_certificate_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(tls) = e.downcast_ref::<rustls::Error>() {
            return matches!(
                tls,
                rustls::Error::InvalidCertificate(_) | rustls::Error::NoCertificatesPresented
            );
        }
        if let Some(tls) = e
            .downcast_ref::<std::io::Error>()
            .and_then(|io| io.get_ref())
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        {
            return matches!(
                tls,
                rustls::Error::InvalidCertificate(_) | rustls::Error::NoCertificatesPresented
            );
        }
        // Fallback for TLS stacks whose error types are not exposed
        let msg = e.to_string().to_lowercase();
        if msg.contains("invalid peer certificate") || msg.contains("certificate verify failed") {
            return true;
        }
        current = e.source();
    }
    false
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(e) = current {
        parts.push(e.to_string());
        current = e.source();
    }
    parts.join(": ")
}
