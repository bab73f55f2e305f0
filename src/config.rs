//! Environment-derived configuration.
//!
//! Follows the corpus convention of reading individual `std::env::var`
//! entries with explicit fallbacks (see `local-agent-chat`'s
//! `rate_limit.rs`/`routes/discover.rs`) rather than a config-file crate.

use std::net::SocketAddr;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3030";

#[derive(Debug, Clone)]
pub struct Config {
    /// Empty means "allow any origin" — a permissive development default.
    pub allowed_origins: Vec<String>,
    pub auth0_domain: Option<String>,
    pub auth0_audience: Option<String>,
    pub skip_auth: bool,
    pub bind_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Self {
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let auth0_domain = std::env::var("AUTH0_DOMAIN").ok().filter(|s| !s.is_empty());
        let auth0_audience = std::env::var("AUTH0_AUDIENCE")
            .ok()
            .filter(|s| !s.is_empty());

        let skip_auth = std::env::var("SKIP_AUTH")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let bind_addr = std::env::var("BIND_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.parse().expect("default bind addr is valid"));

        Config {
            allowed_origins,
            auth0_domain,
            auth0_audience,
            skip_auth,
            bind_addr,
        }
    }

    /// Requests from origins outside the allow-list are refused before
    /// upgrade. An empty allow-list is treated as "allow any origin".
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        match origin {
            Some(origin) => self.allowed_origins.iter().any(|allowed| allowed == origin),
            None => false,
        }
    }
}
