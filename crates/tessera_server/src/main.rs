// Tessera server binary entry point.
//
// Wires the engine to its boundary collaborators: the REST surface, the
// ingest bus consumer, and startup tenant/schema bootstrap. The bundled
// store session is the embedded in-memory implementation; a CQL wire
// driver adapter plugs in behind the same `StoreSession` trait.

use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tessera_engine::mem::MemorySession;
use tessera_engine::{EngineConfig, Engines};
use tessera_server::{bootstrap, consumer, http};

/// CLI options for running the server.
#[derive(Parser, Debug)]
#[command(name = "tessera-server")]
struct Args {
    /// HTTP listen address.
    #[arg(long, env = "TESSERA_LISTEN", default_value = "127.0.0.1:8081")]
    listen: SocketAddr,

    /// Store contact points, for the wire-driver session. The embedded
    /// memory store ignores them.
    #[arg(long, env = "TESSERA_CONTACT_POINTS", default_value = "127.0.0.1:9042")]
    contact_points: String,

    /// Local datacenter for the wire-driver session.
    #[arg(long, env = "TESSERA_LOCAL_DATACENTER", default_value = "datacenter1")]
    local_datacenter: String,

    /// Default keyspace for bootstrap schema and built-in tenants.
    #[arg(long, env = "TESSERA_KEYSPACE", default_value = "test_keyspace")]
    keyspace: String,

    /// Concurrent partition batches / bucket SELECTs. `0` picks twice the
    /// hardware parallelism.
    #[arg(long, env = "TESSERA_FANOUT", default_value_t = 0)]
    fanout: usize,

    /// Prepared-statement cache capacity.
    #[arg(long, env = "TESSERA_STATEMENT_CACHE", default_value_t = 1024)]
    statement_cache: usize,

    /// JSON tenants file. When absent, the built-in demo tenants are
    /// registered.
    #[arg(long, env = "TESSERA_TENANTS_FILE")]
    tenants_file: Option<PathBuf>,

    /// Per-request timeout (ms) at the HTTP boundary.
    #[arg(long, env = "TESSERA_REQUEST_TIMEOUT_MS", default_value_t = 30_000)]
    request_timeout_ms: u64,

    /// Queue depth of the ingest bus consumer.
    #[arg(long, env = "TESSERA_BUS_QUEUE_DEPTH", default_value_t = 64)]
    bus_queue_depth: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Enable ANSI colors only when stdout is a terminal and NO_COLOR is unset.
    let ansi = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hyper=warn".into()),
        )
        .init();

    let args = Args::parse();
    run(args).await
}

async fn run(args: Args) -> anyhow::Result<()> {
    tracing::info!(
        contact_points = %args.contact_points,
        local_datacenter = %args.local_datacenter,
        keyspace = %args.keyspace,
        "starting tessera server with embedded memory store"
    );

    let session = Arc::new(MemorySession::new());
    bootstrap::apply_demo_schema(&session, &args.keyspace);

    let mut engine_config = EngineConfig::default();
    if args.fanout > 0 {
        engine_config.fanout = args.fanout;
    }
    engine_config.statement_cache_capacity = args.statement_cache;

    let engines = Arc::new(Engines::new(session, engine_config));
    match &args.tenants_file {
        Some(path) => {
            let count = bootstrap::register_from_file(&engines.registry, path)?;
            tracing::info!(count, file = %path.display(), "registered tenants from file");
        }
        None => bootstrap::register_defaults(&engines.registry, &args.keyspace)?,
    }

    // The sender half is the attach point for a bus transport adapter; it
    // stays alive for the process lifetime.
    let _bus = consumer::spawn(engines.clone(), args.bus_queue_depth);

    let state = http::AppState {
        engines,
        request_timeout: Duration::from_millis(args.request_timeout_ms.max(1)),
    };
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("bind {}", args.listen))?;
    tracing::info!(listen = %args.listen, "serving HTTP");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .context("serve HTTP")?;

    Ok(())
}
