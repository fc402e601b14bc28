//! HTTP Peer Adapter
//!
//! Peer transport over plain HTTP/1.1.
//!
//! # Wire Format
//!
//! ```text
//! GET {base_path}{group}/{key}        segments percent-encoded
//!
//! 200  application/octet-stream       raw value bytes
//! 400  text/plain                     malformed path or empty key
//! 404  text/plain                     unknown group
//! 500  text/plain                     any other error (message in body)
//! ```
//!
//! [`HttpPool`] is both sides of a node: the [`PeerPicker`] for its groups
//! and the server answering other nodes. [`HttpGetter`] is the client for
//! one remote node.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use reqwest::Client;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{PeerSet, DEFAULT_REPLICAS};
use crate::consistenthash::HashFn;
use crate::domain::{PeerGetter, PeerPicker};
use crate::error::{Error, Result};
use crate::group::Registry;

/// Path prefix of peer requests
pub const DEFAULT_BASE_PATH: &str = "/_peercache/";

/// Deadline of one peer request
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Client
// =============================================================================

/// Client for one remote node.
pub struct HttpGetter {
    /// `{peer}{base_path}`, e.g. `http://localhost:8002/_peercache/`
    base_url: String,
    client: Client,
}

impl HttpGetter {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full request URL for `key` of `group`
    pub fn url(&self, group: &str, key: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            urlencoding::encode(group),
            urlencoding::encode(key)
        )
    }
}

#[async_trait]
impl PeerGetter for HttpGetter {
    #[instrument(skip(self), fields(peer = %self.base_url))]
    async fn get(&self, group: &str, key: &str) -> Result<Bytes> {
        let url = self.url(group, key);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::peer(&self.base_url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::peer(
                &self.base_url,
                format!("server returned {}: {}", status, body.trim()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::peer(&self.base_url, format!("reading response body: {}", e)))?;
        debug!(bytes = bytes.len(), "fetched from peer");
        Ok(bytes)
    }

    fn peer_id(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for HttpGetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGetter")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// =============================================================================
// Pool
// =============================================================================

/// HttpPool options
#[derive(Debug, Clone)]
pub struct HttpPoolOptions {
    /// Path prefix, must start and end with `/`
    pub base_path: String,
    /// Virtual nodes per peer
    pub replicas: usize,
    /// Ring hash; `None` selects CRC-32
    pub hash: Option<HashFn>,
    /// Per-request deadline for outbound fetches
    pub timeout: Duration,
}

impl Default for HttpPoolOptions {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            replicas: DEFAULT_REPLICAS,
            hash: None,
            timeout: DEFAULT_PEER_TIMEOUT,
        }
    }
}

/// HTTP peer picker and server for one node.
pub struct HttpPool {
    /// This node's base URL, e.g. `http://localhost:8001`
    self_url: String,
    options: HttpPoolOptions,
    client: Client,
    peers: Mutex<PeerSet>,
}

impl HttpPool {
    pub fn new(self_url: impl Into<String>) -> Result<Self> {
        Self::with_options(self_url, HttpPoolOptions::default())
    }

    pub fn with_options(self_url: impl Into<String>, options: HttpPoolOptions) -> Result<Self> {
        if !options.base_path.starts_with('/') || !options.base_path.ends_with('/') {
            return Err(Error::Config(format!(
                "base path must start and end with '/': {}",
                options.base_path
            )));
        }

        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let peers = Mutex::new(PeerSet::new(options.replicas, options.hash));
        Ok(Self {
            self_url: normalize(&self_url.into()),
            options,
            client,
            peers,
        })
    }

    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    pub fn base_path(&self) -> &str {
        &self.options.base_path
    }

    /// Replace membership. `peers` are base URLs and usually include this
    /// node; the previous ring and clients are discarded.
    pub fn set<S: AsRef<str>>(&self, peers: &[S]) {
        let mut next = PeerSet::new(self.options.replicas, self.options.hash);
        let mut urls: Vec<String> = peers.iter().map(|p| normalize(p.as_ref())).collect();
        urls.sort();
        urls.dedup();

        for url in &urls {
            let getter: Option<Arc<dyn PeerGetter>> = if *url == self.self_url {
                None
            } else {
                let base_url = format!("{}{}", url, self.options.base_path);
                Some(Arc::new(HttpGetter::new(self.client.clone(), base_url)))
            };
            next.insert(url, getter);
        }

        *self.peers.lock() = next;
        info!(node = %self.self_url, peers = ?urls, "peers set");
    }

    /// Ring member that owns `key`
    pub fn owner(&self, key: &str) -> Option<String> {
        self.peers.lock().owner(key).map(str::to_string)
    }

    /// Base URLs of the remote peers, sorted
    pub fn peers(&self) -> Vec<String> {
        self.peers.lock().members()
    }

    /// Answer peer requests on `listener` until `shutdown` fires.
    pub async fn serve(
        &self,
        registry: Arc<Registry>,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let base_path: Arc<str> = Arc::from(self.options.base_path.as_str());
        let local = listener.local_addr()?;
        info!("Peer server listening on {} ({})", local, self.self_url);

        loop {
            let (stream, remote) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Peer server on {} shutting down", local);
                    return Ok(());
                }
                accepted = listener.accept() => accepted
                    .map_err(|e| Error::Internal(format!("Peer server accept error: {}", e)))?,
            };

            let io = TokioIo::new(stream);
            let registry = Arc::clone(&registry);
            let base_path = Arc::clone(&base_path);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    handle_peer_request(Arc::clone(&registry), Arc::clone(&base_path), req)
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Peer connection from {} closed: {}", remote, e);
                }
            });
        }
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let peer = self.peers.lock().pick(&self.self_url, key)?;
        debug!(key, peer = peer.peer_id(), "picked peer");
        Some(peer)
    }
}

impl std::fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPool")
            .field("self_url", &self.self_url)
            .field("base_path", &self.options.base_path)
            .field("peers", &self.peers())
            .finish()
    }
}

fn normalize(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

// =============================================================================
// Server
// =============================================================================

/// Split `{base_path}{group}/{key}` into decoded group and key.
fn parse_peer_path(base_path: &str, path: &str) -> Option<(String, String)> {
    let rest = path.strip_prefix(base_path)?;
    let (group, key) = rest.split_once('/')?;
    let group = urlencoding::decode(group).ok()?;
    let key = urlencoding::decode(key).ok()?;
    if group.is_empty() {
        return None;
    }
    Some((group.into_owned(), key.into_owned()))
}

async fn handle_peer_request(
    registry: Arc<Registry>,
    base_path: Arc<str>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path();
    let Some((group, key)) = parse_peer_path(&base_path, path) else {
        debug!(path, "bad peer request");
        return Ok(text_response(StatusCode::BAD_REQUEST, "bad request"));
    };

    let response = match registry.serve(&group, &key).await {
        Ok(value) => {
            let mut response = Response::new(Full::new(value.to_bytes()));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            response
        }
        Err(e @ Error::GroupNotFound(_)) => text_response(StatusCode::NOT_FOUND, e.to_string()),
        Err(e @ Error::EmptyKey) => text_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            warn!(group = %group, key = %key, error = %e, "peer request failed");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    };
    Ok(response)
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

// =============================================================================
// Tests
// =============================================================================
