//! Runtime configuration, loaded once at boot from environment variables.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub vault_path: PathBuf,
    pub api_key: Option<String>,
    pub cors_origins: Vec<String>,
    pub max_message_bytes: usize,
    pub max_concurrent: usize,
    pub queue_capacity: usize,
    pub queue_terminal_retention: usize,
}

impl Config {
    /// Read configuration from the process environment, falling back to the
    /// documented defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            port: env_parsed("PORT", 3333),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            vault_path: std::env::var("VAULT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./vault")),
            api_key: std::env::var("API_KEY").ok().filter(|s| !s.is_empty()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            max_message_bytes: env_parsed("MAX_MESSAGE_BYTES", 102_400),
            max_concurrent: env_parsed("MAX_CONCURRENT", 1),
            queue_capacity: env_parsed("QUEUE_CAPACITY", 100),
            queue_terminal_retention: env_parsed("QUEUE_TERMINAL_RETENTION", 50),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        // Assumes a clean env in CI; don't assert on vars other tests may set.
        let cfg = Config {
            port: 3333,
            host: "0.0.0.0".into(),
            vault_path: PathBuf::from("./vault"),
            api_key: None,
            cors_origins: vec![],
            max_message_bytes: 102_400,
            max_concurrent: 1,
            queue_capacity: 100,
            queue_terminal_retention: 50,
        };
        assert_eq!(cfg.port, 3333);
        assert_eq!(cfg.max_message_bytes, 102_400);
    }
}
