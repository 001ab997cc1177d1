use crate::config::{Config, DatabaseConfig, PoolSettings};
use crate::db::connector::Connector;
use crate::db::pool::ConnectionPool;
use crate::db::token::TokenProvider;
use crate::utils::error::Result;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Owns the one connection pool of this execution environment.
///
/// The pool is built on the first `get_pool` call and shared by every later
/// invocation. A failed build leaves the holder empty so the next call retries.
pub struct PoolHolder<C: Connector> {
    config: DatabaseConfig,
    settings: PoolSettings,
    connector: C,
    token_provider: TokenProvider,
    pool: OnceCell<Arc<ConnectionPool<C>>>,
}

impl<C: Connector + Clone> PoolHolder<C> {
    pub fn new(config: &Config, connector: C, token_provider: TokenProvider) -> Self {
        Self {
            config: config.db.clone(),
            settings: config.pool.clone(),
            connector,
            token_provider,
            pool: OnceCell::new(),
        }
    }

    pub async fn get_pool(&self) -> Result<Arc<ConnectionPool<C>>> {
        let pool = self
            .pool
            .get_or_try_init(|| async {
                info!("Creating connection pool for {}", self.config.host);
                ConnectionPool::connect(
                    self.config.clone(),
                    self.settings.clone(),
                    self.connector.clone(),
                    Arc::clone(&self.token_provider),
                )
                .await
                .inspect_err(|e| warn!("Connection pool construction failed: {}", e))
            })
            .await?;

        Ok(Arc::clone(pool))
    }

    /// The pool, if one has been built.
    pub fn get(&self) -> Option<&Arc<ConnectionPool<C>>> {
        self.pool.get()
    }
}
