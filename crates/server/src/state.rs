//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::claude::ClaudeClient;
use crate::config::ServerConfig;
use crate::flags::FlagCaches;
use crate::relay::RelayHub;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    claude: ClaudeClient,
    flag_caches: FlagCaches,
    relay: RelayHub,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: ServerConfig, pool: PgPool) -> Self {
        let claude = ClaudeClient::new(config.claude());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                claude,
                flag_caches: FlagCaches::new(),
                relay: RelayHub::new(),
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the Claude API client.
    #[must_use]
    pub fn claude(&self) -> &ClaudeClient {
        &self.inner.claude
    }

    /// Get a reference to the flag/permission caches.
    #[must_use]
    pub fn flag_caches(&self) -> &FlagCaches {
        &self.inner.flag_caches
    }

    /// Get a reference to the presence relay hub.
    #[must_use]
    pub fn relay(&self) -> &RelayHub {
        &self.inner.relay
    }
}
