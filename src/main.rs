use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use podium::config::ServerConfig;
use podium::state::AppState;
use podium::store;
use podium::types::{Question, Quiz};
use podium::ws;

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "podium=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Podium...");

    let config = ServerConfig::from_env();
    let quizzes = load_bank::<Quiz>(config.quiz_file.as_deref(), "quiz");
    let questions = load_bank::<Question>(config.question_file.as_deref(), "question");
    let state = Arc::new(AppState::with_banks(quizzes, questions));

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .fallback_service(ServeDir::new("static"))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // 8190 spells "QZ" in ascii
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");
    axum::serve(listener, app).await.expect("server error");
}

/// Load and validate a bank file; invalid entries are skipped with a
/// warning so one bad quiz cannot take the server down.
fn load_bank<T>(path: Option<&std::path::Path>, kind: &str) -> Vec<T>
where
    T: serde::de::DeserializeOwned + Validated,
{
    let Some(path) = path else {
        return Vec::new();
    };
    match store::load_elements::<T>(path) {
        Ok(elements) => {
            let (valid, invalid): (Vec<T>, Vec<T>) =
                elements.into_iter().partition(|e| e.check().is_ok());
            if !invalid.is_empty() {
                tracing::warn!("skipped {} invalid {} bank entries", invalid.len(), kind);
            }
            tracing::info!("loaded {} {} bank entries from {:?}", valid.len(), kind, path);
            valid
        }
        Err(e) => {
            tracing::error!("failed to load {} bank from {:?}: {}", kind, path, e);
            Vec::new()
        }
    }
}

trait Validated {
    fn check(&self) -> Result<(), String>;
}

impl Validated for Quiz {
    fn check(&self) -> Result<(), String> {
        self.validate()
    }
}

impl Validated for Question {
    fn check(&self) -> Result<(), String> {
        self.validate()
    }
}
