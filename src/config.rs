//! Process configuration, read once from the environment (and `.env` if present).

use std::env;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    /// Cookie signing key material; must be at least 64 bytes to be used.
    pub session_key: Option<String>,
    pub max_connections: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// `DATABASE_URL` is required. `BIND_ADDR`, `SESSION_KEY` and
    /// `DB_MAX_CONNECTIONS` are optional.
    pub fn from_env() -> Result<Self, String> {
        if let Err(e) = dotenvy::dotenv() {
            log::debug!("No .env file loaded: {e}");
        }

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let session_key = env::var("SESSION_KEY").ok().filter(|k| !k.is_empty());
        let max_connections = match env::var("DB_MAX_CONNECTIONS") {
            Ok(raw) => raw
                .parse::<u32>()
                .map_err(|_| format!("DB_MAX_CONNECTIONS is not a number: {raw}"))?
                .max(1),
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(AppConfig {
            database_url,
            bind_addr,
            session_key,
            max_connections,
        })
    }
}
