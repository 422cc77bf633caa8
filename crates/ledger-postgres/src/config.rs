/// Configuration for the Postgres ledger backend.
pub struct PostgresLedgerConfig {
    /// Postgres connection URL.
    pub url: String,
    /// Table name prefix (e.g. `"watchloop_"`).
    pub prefix: String,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
}

impl PostgresLedgerConfig {
    /// Create a new configuration with the given URL and defaults.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), prefix: "watchloop_".to_owned(), max_connections: 10 }
    }

    /// Set the table prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the maximum pool size.
    #[must_use]
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}
