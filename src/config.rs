use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8190;

/// Server configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// JSON file seeding the quiz bank at boot.
    pub quiz_file: Option<PathBuf>,
    /// JSON file seeding the question bank (random mode) at boot.
    pub question_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Read PODIUM_PORT, PODIUM_QUIZ_FILE and PODIUM_QUESTION_FILE.
    /// Missing or empty variables fall back to defaults.
    pub fn from_env() -> Self {
        let port = match std::env::var("PODIUM_PORT") {
            Ok(raw) => match raw.trim().parse() {
                Ok(port) => port,
                Err(_) => {
                    tracing::warn!(
                        "PODIUM_PORT {:?} is not a valid port, using {}",
                        raw,
                        DEFAULT_PORT
                    );
                    DEFAULT_PORT
                }
            },
            Err(_) => DEFAULT_PORT,
        };

        let path_var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
        };

        Self {
            port,
            quiz_file: path_var("PODIUM_QUIZ_FILE"),
            question_file: path_var("PODIUM_QUESTION_FILE"),
        }
    }
}
