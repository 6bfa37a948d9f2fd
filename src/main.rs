mod config;
mod dispatcher;
mod echo;
mod error;
mod events;
mod handlers;
mod messenger;
mod models;
mod platform;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::BridgeConfig;
use dispatcher::MethodDispatcher;
use echo::EchoHandler;
use events::{EventGenerator, EventStreamController};
use messenger::Messenger;
use platform::Collaborators;

#[derive(Clone)]
pub struct AppState {
    pub messenger: Arc<Messenger>,
    pub platform: String,
    pub event_buffer: usize,
}

/// Register the method, event and message channels under the configured namespace.
pub fn build_messenger(config: &BridgeConfig, collaborators: Collaborators) -> Messenger {
    let dispatcher = MethodDispatcher::with_device_methods(collaborators.clone());
    let echo = EchoHandler::new(config.platform_name.clone(), collaborators.clock.clone());
    let events = EventStreamController::new(
        EventGenerator::new(collaborators.clock, collaborators.random),
        config.event_interval,
    )
    .with_max_failures(config.max_sink_failures);

    let mut messenger = Messenger::new();
    messenger
        .set_method_call_handler(config.method_channel(), Arc::new(dispatcher))
        .set_stream_handler(config.event_channel(), Arc::new(events))
        .set_message_handler(config.message_channel(), Arc::new(echo));
    messenger
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/status", get(handlers::get_status))
        .route("/v1/channels/:channel/invoke", post(handlers::invoke_method))
        .route("/v1/channels/:channel/messages", post(handlers::send_message))
        .route(
            "/v1/channels/:channel/events",
            get(handlers::listen_events).delete(handlers::cancel_events),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal(messenger: Arc<Messenger>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down, cancelling event streams");
    messenger.cancel_all_streams();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "platform_channels_bridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BridgeConfig::from_env().context("Failed to load configuration")?;

    tracing::info!("Platform: {}", config.platform_name);
    tracing::info!("Method channel: {}", config.method_channel());
    tracing::info!("Event channel: {}", config.event_channel());
    tracing::info!("Message channel: {}", config.message_channel());

    let collaborators = Collaborators::system(&config.power_supply_path);
    let messenger = Arc::new(build_messenger(&config, collaborators));
    let state = AppState {
        messenger: messenger.clone(),
        platform: config.platform_name.clone(),
        event_buffer: config.event_buffer,
    };

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind to port {}", config.port))?;

    tracing::info!("Bridge listening on port {}", config.port);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(messenger))
        .await
        .context("Server failed")?;

    Ok(())
}
