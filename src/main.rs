//! peercache node
//!
//! Runs one cluster member serving the demo `scores` group.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         peercache node                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  API Server  │───▶│    Group     │◀───│ Peer Server  │◀── peers
//! │  │  /api?key=   │    │   "scores"   │    │ /_peercache/ │       │
//! │  └──────────────┘    └──────┬───────┘    └──────────────┘       │
//! │                             │ HttpPool                          │
//! │                             ▼                                   │
//! │                       owning peer ──────────────────────────────────▶
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A three node demo cluster:
//!
//! ```text
//! peercache --port 8001 --peers http://localhost:8001,http://localhost:8002,http://localhost:8003
//! peercache --port 8002 --peers http://localhost:8001,http://localhost:8002,http://localhost:8003
//! peercache --port 8003 --peers http://localhost:8001,http://localhost:8002,http://localhost:8003 --api
//! curl "http://127.0.0.1:9999/api?key=Tom"
//! ```

use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use peercache::metrics::MetricsExporter;
use peercache::{Error, Group, GroupBuilder, HttpPool, Loader, NodeConfig, Registry};

// =============================================================================
// CLI Arguments
// =============================================================================

/// peercache - peer-aware distributed cache node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config file; flags below override it
    #[arg(long, env = "PEERCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Host peers use to reach this node
    #[arg(long, env = "PEERCACHE_HOST")]
    host: Option<String>,

    /// Peer server port
    #[arg(long, env = "PEERCACHE_PORT")]
    port: Option<u16>,

    /// Comma-separated base URLs of every cluster member
    #[arg(long, env = "PEERCACHE_PEERS", value_delimiter = ',')]
    peers: Option<Vec<String>>,

    /// Start the front-end API server
    #[arg(long, env = "PEERCACHE_API")]
    api: bool,

    /// Front-end API bind address
    #[arg(long, env = "PEERCACHE_API_ADDR")]
    api_addr: Option<String>,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_yaml_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => NodeConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(peers) = &self.peers {
            config.peers = peers.clone();
        }
        if self.api {
            config.api = true;
        }
        if let Some(addr) = &self.api_addr {
            config.api_addr = addr.clone();
        }
        if let Some(addr) = &self.metrics_addr {
            config.metrics_addr = addr.clone();
        }
        Ok(config)
    }
}

// =============================================================================
// Demo Data Source
// =============================================================================

/// Stand-in for a slow database
struct ScoresDb {
    rows: HashMap<&'static str, &'static str>,
}

impl ScoresDb {
    fn new() -> Self {
        Self {
            rows: HashMap::from([("Tom", "630"), ("Jack", "589"), ("Sam", "567")]),
        }
    }
}

#[async_trait]
impl Loader for ScoresDb {
    async fn load(&self, key: &str) -> peercache::Result<Vec<u8>> {
        info!("[SlowDB] search key {}", key);
        self.rows
            .get(key)
            .map(|v| v.as_bytes().to_vec())
            .ok_or_else(|| Error::not_exist(key))
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = args.node_config()?;

    info!("Starting peercache node");
    info!("  Self: {}", config.self_url());
    info!("  Peers: {:?}", config.members());
    info!("  Cache bytes: {}", config.cache.cache_bytes);
    info!("  Hot QPS threshold: {}", config.cache.hot_qps_threshold);

    let registry = Arc::new(Registry::new());
    let group = registry.register(
        GroupBuilder::new("scores")
            .config(config.cache.group_config())
            .loader(ScoresDb::new()),
    )?;

    let pool = Arc::new(HttpPool::with_options(
        config.self_url(),
        config.pool_options(),
    )?);
    pool.set(&config.members());
    group.register_peers(pool.clone())?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                shutdown.cancel();
            }
        });
    }

    // Start metrics server
    let exporter = Arc::new(MetricsExporter::new()?);
    {
        let addr = config.metrics_addr.clone();
        let registry = Arc::clone(&registry);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(&addr, registry, exporter, shutdown).await {
                error!("Metrics server error: {:#}", e);
            }
        });
    }

    // Start API server
    if config.api {
        let addr = config.api_addr.clone();
        let group = Arc::clone(&group);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = run_api_server(&addr, group, shutdown).await {
                error!("API server error: {:#}", e);
            }
        });
    }

    // Run the peer server
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding peer server on port {}", config.port))?;
    pool.serve(registry, listener, shutdown).await?;

    info!("peercache shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// HTTP Helpers
// =============================================================================

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn not_found() -> Response<Full<Bytes>> {
    respond(StatusCode::NOT_FOUND, "text/plain", "not found")
}

/// Decoded value of `name` in a query string
fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        if k != name {
            return None;
        }
        urlencoding::decode(&v.replace('+', " "))
            .ok()
            .map(|v| v.into_owned())
    })
}

// =============================================================================
// API Server
// =============================================================================

async fn run_api_server(
    addr: &str,
    group: Arc<Group>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    async fn api_handler(
        group: Arc<Group>,
        req: Request<Incoming>,
    ) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
        if req.uri().path() != "/api" {
            return Ok(not_found());
        }

        let key = req
            .uri()
            .query()
            .and_then(|q| query_param(q, "key"))
            .unwrap_or_default();

        let response = match group.get(&key).await {
            Ok(value) => respond(
                StatusCode::OK,
                "application/octet-stream",
                value.to_bytes(),
            ),
            Err(e) => respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                e.to_string(),
            ),
        };
        Ok(response)
    }

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", addr))?;

    info!("API server listening on {}", addr);

    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted.context("API server accept error")?,
        };

        let io = TokioIo::new(stream);
        let group = Arc::clone(&group);

        tokio::spawn(async move {
            let service = service_fn(move |req| api_handler(Arc::clone(&group), req));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::error!("API server connection error: {}", e);
            }
        });
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(
    addr: &str,
    registry: Arc<Registry>,
    exporter: Arc<MetricsExporter>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    async fn metrics_handler(
        registry: Arc<Registry>,
        exporter: Arc<MetricsExporter>,
        req: Request<Incoming>,
    ) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
        let response = match req.uri().path() {
            "/metrics" => match exporter.render(&registry) {
                Ok(text) => respond(StatusCode::OK, exporter.content_type(), text),
                Err(e) => respond(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    e.to_string(),
                ),
            },
            "/healthz" => respond(StatusCode::OK, "text/plain", "ok"),
            _ => not_found(),
        };
        Ok(response)
    }

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server on {}", addr))?;

    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted.context("Metrics server accept error")?,
        };

        let io = TokioIo::new(stream);
        let registry = Arc::clone(&registry);
        let exporter = Arc::clone(&exporter);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                metrics_handler(Arc::clone(&registry), Arc::clone(&exporter), req)
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::error!("Metrics server connection error: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param() {
        assert_eq!(query_param("key=Tom", "key").as_deref(), Some("Tom"));
        assert_eq!(query_param("a=1&key=J%C3%A4ck", "key").as_deref(), Some("Jäck"));
        assert_eq!(query_param("key=a+b", "key").as_deref(), Some("a b"));
        assert_eq!(query_param("other=1", "key"), None);
        assert_eq!(query_param("key", "key").as_deref(), Some(""));
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "peercache",
            "--port",
            "8003",
            "--peers",
            "http://localhost:8001,http://localhost:8003",
            "--api",
        ]);
        let config = args.node_config().unwrap();
        assert_eq!(config.port, 8003);
        assert_eq!(config.members().len(), 2);
        assert!(config.api);
        assert_eq!(config.api_addr, "127.0.0.1:9999");
    }

    #[tokio::test]
    async fn test_scores_db() {
        let db = ScoresDb::new();
        assert_eq!(db.load("Tom").await.unwrap(), b"630".to_vec());
        assert_eq!(db.load("kkk").await.unwrap_err().to_string(), "kkk not exist");
    }
}
