/// Server setup and initialization
///
/// Wires together all components: node type registry, graph engine, tick
/// scheduler and HTTP routes. Provides the application factory used by `main`.

use crate::{
    api::editor::{create_editor_routes, EditorState},
    config::Config,
    graph::registry::NodeTypeRegistry,
    runtime::{clock::MonotonicClock, engine::Engine, scheduler::TickSchedulerService},
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Running application: HTTP router plus the handles behind it
pub struct App {
    pub router: Router,
    pub engine: Arc<Engine>,
    pub scheduler: Arc<TickSchedulerService>,
}

/// Create the engine, start ticking it and build the router
pub async fn create_app(config: Config) -> Result<App> {
    tracing::info!("🧩 Initializing node type registry");
    let registry = Arc::new(NodeTypeRegistry::with_builtin_nodes());

    tracing::info!("🚀 Initializing graph engine");
    let engine = Arc::new(Engine::new(registry, Arc::new(MonotonicClock::new())));

    tracing::info!("⏰ Initializing tick scheduler");
    let scheduler = Arc::new(
        TickSchedulerService::new(Arc::clone(&engine), config.engine.tick_period())
            .map_err(|e| anyhow::anyhow!("Failed to initialize tick scheduler: {}", e))?,
    );
    scheduler.start().await?;

    let editor_state = EditorState {
        engine: Arc::clone(&engine),
        main_panel_id: config.engine.main_panel_id.clone(),
    };

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let router = Router::new()
        // Health check endpoint
        .route("/healthz", get(health_check))
        // Node editor API routes
        .merge(create_editor_routes().with_state(editor_state));

    tracing::info!("✅ Application initialized successfully");

    Ok(App {
        router,
        engine,
        scheduler,
    })
}

/// Start the HTTP server with the given configuration
///
/// Runs until Ctrl-C, then stops the tick scheduler.
pub async fn start_server(config: Config) -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Nodeloop server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.router.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    app.scheduler.stop().await?;
    tracing::info!("👋 Server stopped ({} nodes in graph)", app.engine.node_count());

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_app_starts_scheduler() {
        let app = create_app(Config::default()).await.unwrap();

        assert!(app.scheduler.is_running().await);
        assert_eq!(app.engine.registry().len(), 6);

        app.scheduler.stop().await.unwrap();
        assert!(!app.scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "ok");
    }
}
