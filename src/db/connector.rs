use crate::config::{DatabaseConfig, TlsMode};
use crate::db::token::AuthToken;
use crate::utils::error::{RdsPoolError, Result};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::Connection;
use std::future::Future;
use tracing::warn;

/// Opens physical connections with a supplied token as the password.
pub trait Connector: Send + Sync + 'static {
    type Connection: DatabaseConnection;

    fn connect(
        &self,
        config: &DatabaseConfig,
        token: &AuthToken,
    ) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// The operations the pool and status route need from a physical connection.
pub trait DatabaseConnection: Send + 'static {
    /// Liveness query returning the server's version string.
    fn server_version(&mut self) -> impl Future<Output = Result<String>> + Send;

    fn close(self) -> impl Future<Output = ()> + Send;
}

impl From<TlsMode> for PgSslMode {
    fn from(mode: TlsMode) -> Self {
        match mode {
            TlsMode::Disable => PgSslMode::Disable,
            TlsMode::Allow => PgSslMode::Allow,
            TlsMode::Prefer => PgSslMode::Prefer,
            TlsMode::Require => PgSslMode::Require,
            TlsMode::VerifyCa => PgSslMode::VerifyCa,
            TlsMode::VerifyFull => PgSslMode::VerifyFull,
        }
    }
}

/// PostgreSQL over sqlx.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

impl PgConnector {
    pub fn connect_options(config: &DatabaseConfig, token: &AuthToken) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&token.username)
            .password(token.as_str())
            .ssl_mode(config.ssl_mode.into())
            .application_name(env!("CARGO_PKG_NAME"))
    }
}

impl Connector for PgConnector {
    type Connection = PgConnection;

    async fn connect(&self, config: &DatabaseConfig, token: &AuthToken) -> Result<PgConnection> {
        let options = Self::connect_options(config, token);
        PgConnection::connect_with(&options)
            .await
            .map_err(|e| RdsPoolError::ConnectionOpen(e.to_string()))
    }
}

impl DatabaseConnection for PgConnection {
    async fn server_version(&mut self) -> Result<String> {
        sqlx::query_scalar::<_, String>("SELECT version()")
            .fetch_one(&mut *self)
            .await
            .map_err(|e| RdsPoolError::Query(e.to_string()))
    }

    async fn close(self) {
        if let Err(e) = Connection::close(self).await {
            warn!("Failed to close connection cleanly: {}", e);
        }
    }
}
