//! Database connection module for `ClickHouse`.
//!
//! Provides the client wrapper and connection configuration for the
//! relational store holding detector readings.

use anyhow::{Context, Result};
use clickhouse::Client;
use std::sync::Arc;

/// Database configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `ClickHouse` database URL (e.g., <http://localhost:8123>)
    pub url: String,
    /// Database name to use
    pub database: String,
    /// Username for authentication
    pub user: String,
    /// Password for authentication
    pub password: String,
}

impl DatabaseConfig {
    /// Load database configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TRAFFICWATCH_DB_URL`: Database URL (default: <http://localhost:8123>)
    /// - `TRAFFICWATCH_DB_NAME`: Database name (default: "trafficwatch")
    /// - `TRAFFICWATCH_DB_USER`: Database user (default: "trafficwatch")
    /// - `TRAFFICWATCH_DB_PASSWORD`: Database password (default: "`trafficwatch_dev`")
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables cannot be read.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: std::env::var("TRAFFICWATCH_DB_URL")
                .unwrap_or_else(|_| "http://localhost:8123".to_string()),
            database: std::env::var("TRAFFICWATCH_DB_NAME")
                .unwrap_or_else(|_| "trafficwatch".to_string()),
            user: std::env::var("TRAFFICWATCH_DB_USER")
                .unwrap_or_else(|_| "trafficwatch".to_string()),
            password: std::env::var("TRAFFICWATCH_DB_PASSWORD")
                .unwrap_or_else(|_| "trafficwatch_dev".to_string()),
        })
    }
}

/// Database client wrapper providing connection pooling.
#[derive(Clone)]
pub struct Database {
    client: Arc<Client>,
}

impl Database {
    /// Create a new database client from configuration.
    #[must_use]
    pub fn new(config: &DatabaseConfig) -> Self {
        let client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database)
            .with_user(&config.user)
            .with_password(&config.password);

        Self {
            client: Arc::new(client),
        }
    }

    /// Get a reference to the underlying `ClickHouse` client.
    #[must_use]
    pub fn client(&self) -> Arc<Client> {
        Arc::clone(&self.client)
    }

    /// Test database connectivity by executing a simple query.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached or the query fails.
    pub async fn ping(&self) -> Result<()> {
        self.client
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await
            .context("Failed to ping database")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_with_custom_values() {
        // Create config directly to avoid env var conflicts with other tests
        let config = DatabaseConfig {
            url: "http://custom:8123".to_string(),
            database: "test_db".to_string(),
            user: "test_user".to_string(),
            password: "test_pass".to_string(),
        };

        assert_eq!(config.url, "http://custom:8123");
        assert_eq!(config.database, "test_db");
        assert_eq!(config.user, "test_user");
        assert_eq!(config.password, "test_pass");
    }

    #[test]
    fn test_database_creation() {
        let config = DatabaseConfig {
            url: "http://localhost:8123".to_string(),
            database: "trafficwatch".to_string(),
            user: "trafficwatch".to_string(),
            password: "trafficwatch_dev".to_string(),
        };

        let _db = Database::new(&config);
        // If we get here without panicking, the database was created successfully
    }

    #[tokio::test]
    async fn test_ping_unreachable_database_fails() {
        // Port 9 (discard) is not listening, so the query cannot succeed.
        let config = DatabaseConfig {
            url: "http://127.0.0.1:9".to_string(),
            database: "trafficwatch".to_string(),
            user: "trafficwatch".to_string(),
            password: "trafficwatch_dev".to_string(),
        };

        let db = Database::new(&config);
        assert!(db.ping().await.is_err());
    }
}
