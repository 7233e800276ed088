//! routekit server binary.
//!
//! ```text
//! CLI args ─▶ config (file + overrides) ─▶ logging / metrics
//!                                        ─▶ StaticIndex::start
//!                                        ─▶ Dispatcher: PATH (/healthz, /_index)
//!                                                       PATTERN
//!                                                       STATIC
//!                                        ─▶ HttpServer::run until SIGINT/SIGTERM
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tokio::net::TcpListener;

use routekit::config::{load_config, validate_config, ConfigError, ServerConfig};
use routekit::http::{handler_fn, Method, RequestContext};
use routekit::lifecycle::{signals, Shutdown};
use routekit::observability::{logging, metrics};
use routekit::routing::{Dispatcher, ExactPathMatcher, PatternTrieMatcher, RouteRule, SetupError, StaticFileMatcher};
use routekit::static_files::StaticIndex;
use routekit::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "routekit", version, about = "HTTP routing core with static file serving")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve files from this directory (enables static serving).
    #[arg(long)]
    root: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:8080.
    #[arg(long)]
    bind: Option<String>,
}

fn build_dispatcher(config: &ServerConfig, index: Option<Arc<StaticIndex>>) -> Result<Dispatcher, SetupError> {
    let mut dispatcher = Dispatcher::new();
    dispatcher.set_body_limit(config.limits.max_body_bytes);
    dispatcher
        .use_type(ExactPathMatcher::new())?
        .use_type(PatternTrieMatcher::new())?;

    dispatcher.add_rule(
        RouteRule::path(
            "/healthz",
            handler_fn(|ctx: &mut RequestContext| Box::pin(async move { ctx.json(&json!({ "status": "ok" })) })),
        )
        .methods([Method::Get]),
    )?;

    if let Some(index) = index {
        let stats = index.clone();
        dispatcher.add_rule(
            RouteRule::path(
                "/_index",
                handler_fn(move |ctx: &mut RequestContext| {
                    let snapshot = stats.snapshot();
                    Box::pin(async move {
                        ctx.json(&json!({
                            "root": snapshot.root().display().to_string(),
                            "generation": snapshot.generation(),
                            "files": snapshot.files(),
                            "urls": snapshot.len(),
                            "truncated": snapshot.is_truncated(),
                        }))
                    })
                }),
            )
            .methods([Method::Get]),
        )?;

        dispatcher.use_type(StaticFileMatcher::new(index, &config.static_files.serve))?;
    }

    Ok(dispatcher)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(root) = args.root {
        config.static_files.enabled = true;
        config.static_files.root_dir = root;
    }
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "routekit starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        static_files = config.static_files.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let index = if config.static_files.enabled {
        let index = Arc::new(StaticIndex::new(&config.static_files));
        index.start().await?;
        Some(index)
    } else {
        None
    };

    let dispatcher = build_dispatcher(&config, index.clone())?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let stopped = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            signals::wait_for_signal().await;
            shutdown.trigger();
        }
    });

    HttpServer::new(config, dispatcher).run(listener, stopped).await?;

    if let Some(index) = index {
        index.stop();
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
