#![allow(dead_code)]

use rdspool::config::{Config, DatabaseConfig, LoggingConfig, PoolSettings, TlsMode};
use rdspool::db::{token_provider_fn, AuthToken, Connector, DatabaseConnection, TokenProvider};
use rdspool::{RdsPoolError, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FAKE_VERSION: &str = "PostgreSQL 16.4 on x86_64-pc-linux-gnu (fake)";

#[derive(Default)]
pub struct FakeDatabase {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub refuse_connections: AtomicBool,
    pub fail_queries: AtomicBool,
    pub connect_delay_ms: AtomicU64,
    pub close_delay_ms: AtomicU64,
    pub passwords: Mutex<Vec<String>>,
}

/// Stands in for PostgreSQL; records every open and the password used.
#[derive(Clone, Default)]
pub struct FakeConnector {
    pub db: Arc<FakeDatabase>,
}

pub struct FakeConnection {
    pub id: usize,
    db: Arc<FakeDatabase>,
}

impl FakeConnector {
    pub fn opened(&self) -> usize {
        self.db.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.db.closed.load(Ordering::SeqCst)
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.db.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.db.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn delay_close(&self, delay: Duration) {
        self.db
            .close_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn passwords(&self) -> Vec<String> {
        self.db.passwords.lock().unwrap().clone()
    }
}

impl Connector for FakeConnector {
    type Connection = FakeConnection;

    async fn connect(&self, _config: &DatabaseConfig, token: &AuthToken) -> Result<FakeConnection> {
        let delay = self.db.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.db.refuse_connections.load(Ordering::SeqCst) {
            return Err(RdsPoolError::ConnectionOpen(
                "connection refused".to_string(),
            ));
        }

        self.db.passwords.lock().unwrap().push(token.as_str().to_string());
        let id = self.db.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection {
            id,
            db: Arc::clone(&self.db),
        })
    }
}

impl DatabaseConnection for FakeConnection {
    async fn server_version(&mut self) -> Result<String> {
        if self.db.fail_queries.load(Ordering::SeqCst) {
            return Err(RdsPoolError::Query("server closed the connection".to_string()));
        }
        Ok(FAKE_VERSION.to_string())
    }

    async fn close(self) {
        let delay = self.db.close_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.db.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Token provider that hands out `token-0`, `token-1`, ... and counts calls.
pub fn counting_provider() -> (TokenProvider, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let provider = token_provider_fn(move |username, _host, _port| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(AuthToken::new(username, format!("token-{}", n))) }
    });
    (provider, calls)
}

pub fn denied_provider() -> (TokenProvider, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let provider = token_provider_fn(move |_username, _host, _port| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            Err(RdsPoolError::TokenGeneration(
                "AccessDenied: not authorized to perform rds-db:connect".to_string(),
            ))
        }
    });
    (provider, calls)
}

pub fn test_config(max_pool_size: usize, min_idle: usize) -> Config {
    Config {
        db: DatabaseConfig {
            host: "db.test.internal".to_string(),
            port: 5432,
            name: "app".to_string(),
            username: "svc_iam".to_string(),
            max_pool_size,
            min_idle,
            ssl_mode: TlsMode::Require,
        },
        pool: PoolSettings {
            acquire_timeout_ms: 200,
            connect_timeout_ms: 1_000,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1_800,
            maintenance_interval_secs: 3_600,
        },
        logging: LoggingConfig::default(),
    }
}
