use courier_ai::OpenAiBackend;
use courier_conversation::{Dispatcher, ToolCallingPipeline};
use courier_gmail::GmailToolkit;
use courier_server::{
    config::AssistantConfig,
    error::StartupError,
    routes::{self, AppState},
    startup,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> courier_core::Result<(), StartupError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AssistantConfig::load().map_err(|e| StartupError::Config {
        details: e.to_string(),
    })?;
    tracing::info!("Loaded configuration");

    // May block on the interactive consent flow
    let credential = startup::obtain_credential(&config.credential).await?;

    let toolkit = GmailToolkit::new(&credential).map_err(|e| StartupError::Toolkit {
        details: e.to_string(),
    })?;
    let tools = Arc::new(toolkit.tool_set());
    tracing::info!(tools = tools.len(), "Bound Gmail tools");

    let backend = OpenAiBackend::new(config.llm).map_err(|e| StartupError::Backend {
        details: e.to_string(),
    })?;
    let pipeline =
        ToolCallingPipeline::new(backend).with_max_iterations(config.assistant.max_iterations);
    let dispatcher = Dispatcher::new(Arc::new(pipeline), tools, config.assistant.instructions);

    let app = routes::router(Arc::new(AppState::new(dispatcher)));

    let addr = config.server.bind_addr;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| StartupError::Bind {
            addr: addr.clone(),
            details: e.to_string(),
        })?;

    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StartupError::Serve {
            details: e.to_string(),
        })?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
