use std::env;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Adhera";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default per-request timeout for outbound provider calls, in seconds.
/// A slow provider surfaces as a retryable transport failure instead of a hang.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Get the application data directory
/// ~/Adhera/ on all platforms (user-visible, per design requirement)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Adhera")
}

/// Directory where synthesized speech artifacts are written.
pub fn audio_dir() -> PathBuf {
    app_data_dir().join("audio")
}

/// Default SQLite database path.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("adhera.db")
}

/// Default log filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("{}=info", env!("CARGO_PKG_NAME"))
}

/// Runtime settings loaded from environment variables.
///
/// Provider keys are optional: a backend without a key is simply not
/// configured, and the gateway reports that as a typed error instead of
/// failing deep inside a call chain.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: PathBuf,
    /// Fast-inference provider (OpenAI-compatible API).
    pub fast_api_key: Option<String>,
    pub fast_base_url: String,
    /// Default provider (OpenAI-compatible API).
    pub primary_api_key: Option<String>,
    pub primary_base_url: String,
    /// Local blocking-only inference endpoint.
    pub local_base_url: String,
    /// Voice vendor (conversation transcripts + speech synthesis).
    pub voice_api_key: Option<String>,
    pub voice_base_url: String,
    pub voice_id: String,
    pub voice_model_id: String,
    /// Comma-separated participant codes for the admin seed operation.
    pub seed_participant_codes: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            database_path: env::var("ADHERA_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_database_path()),
            fast_api_key: env_nonempty("GROQ_API_KEY"),
            fast_base_url: env::var("GROQ_BASE_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string()),
            primary_api_key: env_nonempty("OPENAI_API_KEY"),
            primary_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            local_base_url: env::var("LOCAL_MODEL_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            voice_api_key: env_nonempty("VOICE_API_KEY"),
            voice_base_url: env::var("VOICE_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.elevenlabs.io".to_string()),
            voice_id: env::var("VOICE_TTS_VOICE_ID")
                .unwrap_or_else(|_| "9BWtsMINqrJLrRacOk9x".to_string()),
            voice_model_id: env::var("VOICE_TTS_MODEL_ID")
                .unwrap_or_else(|_| "eleven_multilingual_v2".to_string()),
            seed_participant_codes: parse_code_list(
                &env::var("SEED_PARTICIPANT_CODES").unwrap_or_default(),
            ),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a comma-separated code list, trimming whitespace and dropping blanks.
pub fn parse_code_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| c.to_string())
        .collect()
}
