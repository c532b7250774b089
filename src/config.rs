use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings, environment-driven with defaults for everything.
/// The binary loads `.env` via dotenvy before reading these.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub data_dir: PathBuf,
    pub pdf_dir: PathBuf,
    pub recent_limit: usize,
    pub poll_interval: Duration,
    pub renderer_cmd: String,
}

impl Config {
    pub fn from_env() -> Self {
        let base_url =
            env::var("BIDFORGE_BASE_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
        let data_dir =
            PathBuf::from(env::var("BIDFORGE_DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
        let pdf_dir = env::var("BIDFORGE_PDF_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("pdf"));
        let recent_limit = env::var("BIDFORGE_RECENT_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::db::DEFAULT_RECENT_LIMIT);
        let poll_interval = env::var("BIDFORGE_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(crate::session::DEFAULT_POLL_INTERVAL);
        let renderer_cmd =
            env::var("BIDFORGE_RENDERER_CMD").unwrap_or_else(|_| "wkhtmltopdf".to_string());

        Self {
            base_url,
            data_dir,
            pdf_dir,
            recent_limit,
            poll_interval,
            renderer_cmd,
        }
    }
}
