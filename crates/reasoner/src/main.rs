//! PoliKG Reasoning Service
//!
//! HTTP front for the multi-hop reasoning core.
//! Handles:
//! - Question classification
//! - Reasoning turns over the Neo4j knowledge graph
//! - Rate limiting
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use polikg_common::{
    config::{AppConfig, ObservabilityConfig},
    llm::{LlmClient, LlmHopSummarizer, LlmReportComposer, LlmStopDecider},
    metrics,
    store::{GraphStore, Neo4jStore},
    Reasoner,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub reasoner: Arc<Reasoner>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;
    init_tracing(&config.observability);

    info!(
        service = %config.observability.service_name,
        "Starting PoliKG Reasoner v{}",
        polikg_common::VERSION
    );

    let config = Arc::new(config);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets_for_metric(
                Matcher::Suffix("graph_query_duration_seconds".to_string()),
                metrics::GRAPH_QUERY_BUCKETS,
            )?
            .set_buckets_for_metric(Matcher::Suffix("turn_hops".to_string()), metrics::HOP_BUCKETS)?
            .install()?;
        info!("Metrics exporter listening on {}", addr);
    }
    metrics::register_metrics();

    // Build dependencies
    let reasoner = Arc::new(build_reasoner(&config)?);

    let state = AppState {
        config: config.clone(),
        reasoner,
    };

    let app = create_router(state)?;

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .init();
    }
}

/// Graph store and collaborators, constructed once per process
fn build_reasoner(config: &AppConfig) -> polikg_common::Result<Reasoner> {
    info!(url = %config.graph_store.url, database = %config.graph_store.database, "Connecting to graph store");
    let store: Arc<dyn GraphStore> = Arc::new(Neo4jStore::new(&config.graph_store)?);

    let reasoner = Reasoner::new(store, config.reasoning.clone());
    if !config.llm.enabled {
        info!("LLM collaborators disabled, using heuristics");
        return Ok(reasoner);
    }

    info!(model = %config.llm.model, endpoint = %config.llm.endpoint, "Using LLM collaborators");
    let client = Arc::new(LlmClient::new(config.llm.clone())?);
    Ok(reasoner
        .with_decider(Arc::new(LlmStopDecider::new(client.clone())))
        .with_summarizer(Arc::new(LlmHopSummarizer::new(client.clone())))
        .with_composer(Arc::new(LlmReportComposer::new(client))))
}

/// Create the main application router
fn create_router(state: AppState) -> polikg_common::Result<Router> {
    state.config.validate()?;

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let limiter = middleware::rate_limit::create_rate_limiter(
        state.config.server.requests_per_second,
        state.config.server.burst,
    )?;

    // Reasoning routes are rate limited; probes are not
    let reasoning_routes = Router::new()
        .route("/classify", post(handlers::reasoning::classify))
        .route("/turns", post(handlers::reasoning::run_turn))
        .route_layer(from_fn_with_state(limiter, middleware::rate_limit::rate_limit_middleware));

    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .merge(reasoning_routes)
        .route_layer(from_fn(middleware::metrics::track_metrics));

    Ok(Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
