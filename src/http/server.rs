//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router whose fallback is the dispatcher
//! - Wire up middleware (body limit, timeout, request ID, tracing)
//! - Serve on a bound listener until shutdown is signalled

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::schema::ServerConfig;
use crate::http::context::Context;
use crate::routing::Dispatcher;

/// HTTP front end for a dispatcher.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    pub fn new<C: Context>(config: ServerConfig, dispatcher: Dispatcher<C>) -> Self {
        let router = Self::build_router(&config, Arc::new(dispatcher));
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router<C: Context>(config: &ServerConfig, dispatcher: Arc<Dispatcher<C>>) -> Router {
        Router::new()
            .fallback(dispatch::<C>)
            .with_state(dispatcher)
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, e.g. for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

async fn dispatch<C: Context>(State(dispatcher): State<Arc<Dispatcher<C>>>, request: Request<Body>) -> Response<Body> {
    dispatcher.handle(request).await
}
