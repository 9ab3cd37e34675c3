use condogate_core::{ATTENDANCE_EMBEDDING_DIM, DEFAULT_THRESHOLD, FACE_EMBEDDING_DIM};
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Root URL of the embedding service. Image decisions are disabled when unset.
    pub ml_base_url: Option<String>,
    pub ml_api_key: Option<String>,
    /// Cosine similarity threshold for the image path.
    pub similarity_threshold: f32,
    /// Length of vectors produced by the embedding service.
    pub embedding_dim: usize,
    /// Length of vectors posted by attendance terminals.
    pub attendance_dim: usize,
    pub attendance_threshold: f32,
    /// Embedding request timeout in seconds; 0 disables it.
    pub extract_timeout_secs: u64,
    /// Gallery rows fetched per query while matching.
    pub scan_page_size: usize,
    /// Serve on the session bus instead of the system bus.
    pub session_bus: bool,
    /// Engine worker threads; each runs one decision at a time.
    pub workers: usize,
}

impl Config {
    /// Load configuration from `CONDOGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("condogate");

        let db_path = std::env::var("CONDOGATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("condogate.db"));

        Self {
            db_path,
            ml_base_url: env_string("CONDOGATE_ML_BASE_URL"),
            ml_api_key: env_string("CONDOGATE_ML_API_KEY"),
            similarity_threshold: env_f32("CONDOGATE_SIMILARITY_THRESHOLD", DEFAULT_THRESHOLD),
            embedding_dim: env_usize("CONDOGATE_EMBEDDING_DIM", FACE_EMBEDDING_DIM),
            attendance_dim: env_usize("CONDOGATE_ATTENDANCE_DIM", ATTENDANCE_EMBEDDING_DIM),
            attendance_threshold: env_f32("CONDOGATE_ATTENDANCE_THRESHOLD", DEFAULT_THRESHOLD),
            extract_timeout_secs: env_u64("CONDOGATE_EXTRACT_TIMEOUT_SECS", 60),
            scan_page_size: env_usize("CONDOGATE_SCAN_PAGE_SIZE", 256).max(1),
            session_bus: std::env::var("CONDOGATE_BUS")
                .map(|v| v.eq_ignore_ascii_case("session"))
                .unwrap_or(false),
            workers: env_usize("CONDOGATE_WORKERS", 4).max(1),
        }
    }

    pub fn extract_timeout(&self) -> Option<Duration> {
        match self.extract_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_timeout_zero_disables() {
        let mut config = Config::from_env();
        config.extract_timeout_secs = 0;
        assert_eq!(config.extract_timeout(), None);
        config.extract_timeout_secs = 5;
        assert_eq!(config.extract_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        assert_eq!(env_f32("CONDOGATE_TEST_UNSET_F32", 0.75), 0.75);
        assert_eq!(env_usize("CONDOGATE_TEST_UNSET_USIZE", 7), 7);
        assert_eq!(env_string("CONDOGATE_TEST_UNSET_STRING"), None);
    }
}
