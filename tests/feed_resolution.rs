//! Integration tests for resolving feeds end-to-end.
//!
//! HTTP-level behaviour runs the real `ReqwestTransport` against a local
//! `wiremock` server. Certificate failures cannot be produced by a plain-HTTP
//! mock; they run against a local rustls server presenting a self-signed
//! certificate, and a recording transport covers the retry bookkeeping.

use pretty_assertions::assert_eq;
use rss_reader::feed::{
    FeedCache, FeedResolver, FeedRsParser, FetchError, FetchOptions, Fetcher, HttpRequest,
    HttpResponse, HttpTransport, ReqwestTransport, ResolveError, TransportError, ValidationError,
};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Integration Feed</title>
    <item><guid>1</guid><title>One</title><link>https://example.com/1</link></item>
    <item><guid>2</guid><title>Two</title><link>https://example.com/2</link></item>
</channel></rss>"#;

fn reqwest_resolver(options: FetchOptions) -> FeedResolver<ReqwestTransport, FeedRsParser> {
    let transport = ReqwestTransport::new().unwrap();
    FeedResolver::new(
        Fetcher::new(transport, FeedRsParser, options),
        Arc::new(FeedCache::new()),
    )
}

async fn serve_rss(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(VALID_RSS)
                .insert_header("Content-Type", "application/rss+xml"),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

// ============================================================================
// Real transport against wiremock
// ============================================================================

#[tokio::test]
async fn test_resolve_parses_entries() {
    let server = MockServer::start().await;
    serve_rss(&server, 1).await;
    let resolver = reqwest_resolver(FetchOptions::default());

    let result = resolver
        .resolve(&format!("{}/feed", server.uri()))
        .await
        .unwrap();

    assert!(!result.used_insecure);
    assert!(!result.parsed_feed.malformed);
    assert_eq!(result.parsed_feed.title.as_deref(), Some("Integration Feed"));
    let titles: Vec<_> = result
        .parsed_feed
        .entries
        .iter()
        .map(|e| e.title.as_str())
        .collect();
    assert_eq!(titles, vec!["One", "Two"]);
}

#[tokio::test]
async fn test_user_agent_header_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("User-Agent", "rss-reader/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
        .expect(1)
        .mount(&server)
        .await;
    let resolver = reqwest_resolver(FetchOptions::default());

    let result = resolver.resolve(&format!("{}/feed", server.uri())).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_second_resolve_performs_no_network_io() {
    let server = MockServer::start().await;
    serve_rss(&server, 1).await; // verified on drop
    let resolver = reqwest_resolver(FetchOptions::default());
    let url = format!("{}/feed", server.uri());

    let first = resolver.resolve(&url).await.unwrap();
    let second = resolver.resolve(&url).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_schemeless_and_explicit_urls_cached_separately() {
    let server = MockServer::start().await;
    serve_rss(&server, 2).await;
    let resolver = reqwest_resolver(FetchOptions::default());

    let explicit = format!("{}/feed", server.uri());
    let schemeless = explicit.trim_start_matches("http://").to_string();

    let a = resolver.resolve(&schemeless).await.unwrap();
    let b = resolver.resolve(&explicit).await.unwrap();

    assert_eq!(a, b);
    assert_eq!(resolver.cache().len(), 2);
}

#[tokio::test]
async fn test_http_404_is_fetch_error_and_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;
    let resolver = reqwest_resolver(FetchOptions::default());
    let url = format!("{}/feed", server.uri());

    for _ in 0..2 {
        let err = resolver.resolve(&url).await.unwrap_err();
        assert_eq!(err, ResolveError::Fetch(FetchError::HttpStatus(404)));
    }
    assert!(resolver.cache().is_empty());
}

#[tokio::test]
async fn test_malformed_body_returns_flagged_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
        .mount(&server)
        .await;
    let resolver = reqwest_resolver(FetchOptions::default());

    let result = resolver
        .resolve(&format!("{}/feed", server.uri()))
        .await
        .unwrap();

    assert!(result.parsed_feed.malformed);
    assert!(!result.used_insecure);
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(VALID_RSS)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    let resolver = reqwest_resolver(FetchOptions {
        timeout: Duration::from_millis(200),
        ..FetchOptions::default()
    });

    let err = resolver
        .resolve(&format!("{}/feed", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResolveError::Fetch(FetchError::Transport(TransportError::Timeout(_)))
    ));
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let server = MockServer::start().await;
    serve_rss(&server, 1).await;
    let resolver = reqwest_resolver(FetchOptions {
        max_feed_size: 16,
        ..FetchOptions::default()
    });

    let err = resolver
        .resolve(&format!("{}/feed", server.uri()))
        .await
        .unwrap_err();

    assert_eq!(err, ResolveError::Fetch(FetchError::ResponseTooLarge(16)));
}

#[tokio::test]
async fn test_error_status_wins_over_body_size() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("x".repeat(100)))
        .expect(1)
        .mount(&server)
        .await;
    let resolver = reqwest_resolver(FetchOptions {
        max_feed_size: 16,
        ..FetchOptions::default()
    });

    let err = resolver
        .resolve(&format!("{}/feed", server.uri()))
        .await
        .unwrap_err();

    assert_eq!(err, ResolveError::Fetch(FetchError::HttpStatus(404)));
}

#[tokio::test]
async fn test_connection_refused_is_connect_error() {
    // Grab a free port, then close it so nothing is listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let resolver = reqwest_resolver(FetchOptions::default());
    let err = resolver
        .resolve(&format!("http://127.0.0.1:{port}/feed"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResolveError::Fetch(FetchError::Transport(TransportError::Connect(_)))
    ));
}

// ============================================================================
// Real transport against a self-signed TLS server
// ============================================================================

const SELF_SIGNED_CERT: &str = include_str!("fixtures/self_signed_cert.pem");
const SELF_SIGNED_KEY: &str = include_str!("fixtures/self_signed_key.pem");

/// Serves `VALID_RSS` over TLS on an ephemeral port with a certificate no
/// root store trusts. Returns the port.
fn spawn_self_signed_server() -> u16 {
    let mut cert_cursor = io::Cursor::new(SELF_SIGNED_CERT.as_bytes());
    let certs = rustls_pemfile::certs(&mut cert_cursor)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let mut key_cursor = io::Cursor::new(SELF_SIGNED_KEY.as_bytes());
    let key = rustls_pemfile::private_key(&mut key_cursor)
        .unwrap()
        .expect("fixture has a private key");

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = Arc::new(
        rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .unwrap(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    std::thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let config = Arc::clone(&config);
            std::thread::spawn(move || serve_tls_connection(config, stream));
        }
    });
    port
}

fn serve_tls_connection(config: Arc<rustls::ServerConfig>, stream: TcpStream) {
    let Ok(conn) = rustls::ServerConnection::new(config) else {
        return;
    };
    let mut tls = rustls::StreamOwned::new(conn, stream);

    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match tls.read(&mut buf) {
            // A client that rejects the certificate aborts the handshake here
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/rss+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        VALID_RSS.len(),
        VALID_RSS
    );
    let _ = tls.write_all(response.as_bytes());
    let _ = tls.flush();
    tls.conn.send_close_notify();
    let _ = tls.flush();
}

#[tokio::test]
async fn test_self_signed_certificate_is_certificate_error() {
    let port = spawn_self_signed_server();
    let transport = ReqwestTransport::new().unwrap();
    let request = HttpRequest {
        url: format!("https://127.0.0.1:{port}/feed"),
        headers: Vec::new(),
        timeout: Duration::from_secs(5),
        verify: true,
        suppress_insecure_warning: false,
        max_body_bytes: 1024 * 1024,
    };

    let err = transport.get(&request).await.unwrap_err();

    assert!(err.is_certificate_error(), "unexpected error: {err:?}");
    match err {
        TransportError::Certificate(detail) => {
            assert!(detail.to_lowercase().contains("certificate"), "{detail}")
        }
        other => panic!("expected certificate error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_self_signed_server_resolves_insecurely() {
    let port = spawn_self_signed_server();
    let resolver = reqwest_resolver(FetchOptions::default());

    let result = resolver
        .resolve(&format!("https://127.0.0.1:{port}/feed"))
        .await
        .unwrap();

    assert!(result.used_insecure);
    assert!(!result.parsed_feed.malformed);
    assert_eq!(result.parsed_feed.title.as_deref(), Some("Integration Feed"));
    assert_eq!(result.parsed_feed.entries.len(), 2);
}

#[tokio::test]
async fn test_self_signed_server_fails_without_fallback() {
    let port = spawn_self_signed_server();
    let resolver = reqwest_resolver(FetchOptions {
        allow_insecure_fallback: false,
        ..FetchOptions::default()
    });

    let err = resolver
        .resolve(&format!("https://127.0.0.1:{port}/feed"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResolveError::Fetch(FetchError::Transport(TransportError::Certificate(_)))
    ));
}

// ============================================================================
// Recording transport
// ============================================================================

/// Answers verified requests with `verified` and unverified ones with
/// `unverified`, recording every request.
#[derive(Clone)]
struct RecordingTransport {
    verified: Result<HttpResponse, TransportError>,
    unverified: Result<HttpResponse, TransportError>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl RecordingTransport {
    fn new(
        verified: Result<HttpResponse, TransportError>,
        unverified: Result<HttpResponse, TransportError>,
    ) -> Self {
        Self {
            verified,
            unverified,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn calls(&self, verify: bool) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.verify == verify)
            .count()
    }
}

impl HttpTransport for RecordingTransport {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        if request.verify {
            self.verified.clone()
        } else {
            self.unverified.clone()
        }
    }
}

fn rss_200() -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse {
        status: 200,
        body: VALID_RSS.as_bytes().to_vec(),
    })
}

fn recording_resolver(
    transport: &RecordingTransport,
) -> FeedResolver<RecordingTransport, FeedRsParser> {
    FeedResolver::new(
        Fetcher::new(transport.clone(), FeedRsParser, FetchOptions::default()),
        Arc::new(FeedCache::new()),
    )
}

#[tokio::test]
async fn test_certificate_failure_falls_back_to_insecure() {
    let transport = RecordingTransport::new(
        Err(TransportError::Certificate(
            "invalid peer certificate: UnknownIssuer".into(),
        )),
        rss_200(),
    );
    let resolver = recording_resolver(&transport);

    let result = resolver.resolve("https://self-signed.example/feed").await.unwrap();

    assert!(result.used_insecure);
    assert!(!result.parsed_feed.entries.is_empty());
    assert_eq!(transport.calls(true), 1);
    assert_eq!(transport.calls(false), 1);
}

#[tokio::test]
async fn test_connection_refused_never_tries_insecure() {
    let transport = RecordingTransport::new(
        Err(TransportError::Connect("connection refused".into())),
        rss_200(),
    );
    let resolver = recording_resolver(&transport);

    let err = resolver.resolve("https://example.com/feed").await.unwrap_err();

    assert!(matches!(err, ResolveError::Fetch(FetchError::Transport(_))));
    assert_eq!(transport.calls(false), 0);
}

#[tokio::test]
async fn test_empty_url_touches_nothing() {
    let transport = RecordingTransport::new(rss_200(), rss_200());
    let resolver = recording_resolver(&transport);

    let err = resolver.resolve("").await.unwrap_err();

    assert_eq!(err, ResolveError::Validation(ValidationError::UrlRequired));
    assert_eq!(transport.calls(true) + transport.calls(false), 0);
    assert!(resolver.cache().is_empty());
}

#[tokio::test]
async fn test_insecure_retry_failure_is_not_cached() {
    let transport = RecordingTransport::new(
        Err(TransportError::Certificate("expired".into())),
        Ok(HttpResponse {
            status: 500,
            body: Vec::new(),
        }),
    );
    let resolver = recording_resolver(&transport);

    let err = resolver.resolve("https://expired.example/feed").await.unwrap_err();

    assert_eq!(
        err,
        ResolveError::Fetch(FetchError::InsecureRetry(Box::new(FetchError::HttpStatus(
            500
        ))))
    );
    assert!(resolver.cache().is_empty());
    assert_eq!(transport.calls(false), 1);
}
