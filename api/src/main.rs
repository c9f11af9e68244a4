use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use api::{AppState, build_router, config::AppConfig};
use application::SentimentAnalyzer;
use infrastructure::{HttpSentimentAnalyzer, LexiconSentimentAnalyzer};

/// Picks the external classifier when configured, otherwise the offline lexicon.
fn select_analyzer(config: &AppConfig) -> Arc<dyn SentimentAnalyzer> {
    match config.sentiment_api_url.as_deref() {
        Some(url) => match HttpSentimentAnalyzer::new(url, config.sentiment_timeout) {
            Ok(analyzer) => {
                info!(endpoint = %analyzer.endpoint(), "Using external sentiment service");
                Arc::new(analyzer)
            }
            Err(e) => {
                warn!("Could not build sentiment client ({}). Falling back to lexicon analyzer.", e);
                Arc::new(LexiconSentimentAnalyzer::new())
            }
        },
        None => {
            info!("SENTIMENT_API_URL not set. Using lexicon sentiment analyzer.");
            Arc::new(LexiconSentimentAnalyzer::new())
        }
    }
}

// Application entry point
#[tokio::main]
async fn main() {
    // --- Logger Initialization ---
    let filter: EnvFilter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    info!("Logger initialized successfully.");

    let config = AppConfig::from_env();

    // --- Dependency Injection ---
    let analyzer = select_analyzer(&config);
    let app_state = AppState::in_memory(analyzer);
    info!("Application state created.");

    let app = build_router(app_state);
    info!("API routes configured.");

    // --- Server Startup ---
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server starting on {}", addr);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
