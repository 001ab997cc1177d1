use crate::config::{DatabaseConfig, PoolSettings};
use crate::db::connector::{Connector, DatabaseConnection};
use crate::db::token::TokenProvider;
use crate::utils::error::{RdsPoolError, Result};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::Notify;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, trace, warn};

/// Instantaneous pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Connections currently checked out
    pub active: usize,
    /// Connections open and waiting in the idle set
    pub idle: usize,
    /// Physical connections open or being opened
    pub total: usize,
    /// Configured upper bound on `total`
    pub max_size: usize,
}

impl PoolMetrics {
    /// Share of the pool checked out (0.0 to 1.0).
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.active as f64 / self.max_size as f64
        }
    }
}

struct IdleConnection<T> {
    conn: T,
    created_at: Instant,
    last_used: Instant,
}

impl<T> IdleConnection<T> {
    /// Past its lifetime, or past the idle timeout while `idle_count`
    /// (this connection included) exceeds the `min_idle` floor.
    fn is_expired(&self, settings: &PoolSettings, idle_count: usize, min_idle: usize) -> bool {
        self.created_at.elapsed() > settings.max_lifetime()
            || (idle_count > min_idle && self.last_used.elapsed() > settings.idle_timeout())
    }
}

struct PoolState<T> {
    /// Front is least recently used
    idle: VecDeque<IdleConnection<T>>,
    active: usize,
    pending: usize,
}

impl<T> PoolState<T> {
    fn total(&self) -> usize {
        self.idle.len() + self.active + self.pending
    }
}

struct Shared<T> {
    state: Mutex<PoolState<T>>,
    available: Notify,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Copy)]
enum SlotKind {
    Pending,
    Active,
}

/// Holds one unit of pool capacity; frees it on drop unless disarmed.
struct Slot<T> {
    shared: Arc<Shared<T>>,
    kind: SlotKind,
    armed: bool,
}

impl<T> Slot<T> {
    fn new(shared: Arc<Shared<T>>, kind: SlotKind) -> Self {
        Self {
            shared,
            kind,
            armed: true,
        }
    }

    fn into_active(mut self) -> Slot<T> {
        let mut state = self.shared.lock();
        state.pending -= 1;
        state.active += 1;
        drop(state);

        self.armed = false;
        Slot::new(Arc::clone(&self.shared), SlotKind::Active)
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.shared.lock();
        match self.kind {
            SlotKind::Pending => state.pending -= 1,
            SlotKind::Active => state.active -= 1,
        }
        drop(state);
        self.shared.available.notify_one();
    }
}

/// A connection checked out of the pool.
///
/// Hand it back with [`ConnectionPool::release`] or [`ConnectionPool::discard`].
/// Dropping it closes the physical connection and frees its slot.
pub struct PooledConnection<T> {
    conn: T,
    created_at: Instant,
    slot: Slot<T>,
}

impl<T> Deref for PooledConnection<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.conn
    }
}

impl<T> DerefMut for PooledConnection<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.conn
    }
}

/// Bounded pool of token-authenticated database connections.
///
/// Every new physical connection gets a freshly generated token. At most
/// `max_pool_size` connections exist at once (checked out, idle, or opening).
pub struct ConnectionPool<C: Connector> {
    config: DatabaseConfig,
    settings: PoolSettings,
    connector: C,
    token_provider: TokenProvider,
    shared: Arc<Shared<C::Connection>>,
}

impl<C: Connector> ConnectionPool<C> {
    /// Build the pool, open `min_idle` connections, and start the maintenance task.
    pub async fn connect(
        config: DatabaseConfig,
        settings: PoolSettings,
        connector: C,
        token_provider: TokenProvider,
    ) -> Result<Arc<Self>> {
        let pool = Arc::new(Self {
            config,
            settings,
            connector,
            token_provider,
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    active: 0,
                    pending: 0,
                }),
                available: Notify::new(),
            }),
        });

        pool.fill_min_idle().await?;
        pool.start_maintenance_task();

        info!(
            host = %pool.config.host,
            database = %pool.config.name,
            max_pool_size = pool.config.max_pool_size,
            min_idle = pool.config.min_idle,
            "Connection pool ready"
        );

        Ok(pool)
    }

    /// Check out a connection, opening a new one if the pool has room.
    ///
    /// Waits at most `acquire_timeout` for a connection to come back when the
    /// pool is saturated. A failed open is returned immediately, not retried.
    pub async fn acquire(&self) -> Result<PooledConnection<C::Connection>> {
        let wait = self.settings.acquire_timeout();
        let deadline = Instant::now() + wait;

        loop {
            let notified = self.shared.available.notified();

            if let Some(conn) = self.try_checkout().await {
                return Ok(conn);
            }

            if let Some(slot) = self.reserve_slot() {
                debug!("Pool miss for {}, opening new connection", self.config.host);
                return self.open_checked_out(slot).await;
            }

            trace!("Pool saturated, waiting for a connection");
            if timeout_at(deadline, notified).await.is_err() {
                warn!(
                    max_pool_size = self.config.max_pool_size,
                    "Connection pool exhausted after {:?}", wait
                );
                return Err(RdsPoolError::PoolExhausted(wait));
            }
        }
    }

    /// Return a healthy connection to the idle set.
    pub fn release(&self, conn: PooledConnection<C::Connection>) {
        let PooledConnection {
            conn,
            created_at,
            slot,
        } = conn;
        slot.disarm();

        let mut state = self.shared.lock();
        state.active -= 1;
        state.idle.push_back(IdleConnection {
            conn,
            created_at,
            last_used: Instant::now(),
        });
        trace!("Returned connection to pool (idle: {})", state.idle.len());
        drop(state);

        self.shared.available.notify_one();
    }

    /// Close a connection that failed in use and free its slot.
    pub async fn discard(&self, conn: PooledConnection<C::Connection>) {
        let PooledConnection { conn, slot, .. } = conn;
        drop(slot);
        debug!("Discarding broken connection");
        conn.close().await;
    }

    pub fn metrics(&self) -> PoolMetrics {
        let state = self.shared.lock();
        PoolMetrics {
            active: state.active,
            idle: state.idle.len(),
            total: state.total(),
            max_size: self.config.max_pool_size,
        }
    }

    /// Open connections until `min_idle` are idle or the pool is full.
    pub async fn fill_min_idle(&self) -> Result<()> {
        let mut opened = 0;
        loop {
            let slot = {
                let mut state = self.shared.lock();
                if state.idle.len() >= self.config.min_idle
                    || state.total() >= self.config.max_pool_size
                {
                    break;
                }
                state.pending += 1;
                Slot::new(Arc::clone(&self.shared), SlotKind::Pending)
            };

            let conn = self.open_physical().await?;
            slot.disarm();

            {
                let now = Instant::now();
                let mut state = self.shared.lock();
                state.pending -= 1;
                state.idle.push_back(IdleConnection {
                    conn,
                    created_at: now,
                    last_used: now,
                });
            }

            self.shared.available.notify_one();
            opened += 1;
        }

        if opened > 0 {
            debug!("Opened {} idle connections", opened);
        }
        Ok(())
    }

    /// Close idle connections past their lifetime, or past the idle timeout
    /// while more than `min_idle` remain.
    pub async fn evict_expired(&self) -> usize {
        let mut expired = Vec::new();
        {
            let mut state = self.shared.lock();
            let mut idle_count = state.idle.len();
            let mut kept = VecDeque::with_capacity(idle_count);

            while let Some(conn) = state.idle.pop_front() {
                if conn.is_expired(&self.settings, idle_count, self.config.min_idle) {
                    idle_count -= 1;
                    expired.push(conn.conn);
                } else {
                    kept.push_back(conn);
                }
            }
            state.idle = kept;
        }

        let removed = expired.len();
        close_all(expired).await;
        if removed > 0 {
            debug!("Evicted {} expired connections", removed);
            self.shared.available.notify_one();
        }
        removed
    }

    /// Pop the most recently used live connection, closing expired ones.
    async fn try_checkout(&self) -> Option<PooledConnection<C::Connection>> {
        let mut expired = Vec::new();
        let checked_out = {
            let mut state = self.shared.lock();
            let mut found = None;

            while let Some(idle) = state.idle.pop_back() {
                let idle_count = state.idle.len() + 1;
                if idle.is_expired(&self.settings, idle_count, self.config.min_idle) {
                    trace!(
                        "Discarding expired connection (idle: {:?})",
                        idle.last_used.elapsed()
                    );
                    expired.push(idle.conn);
                    continue;
                }
                // The slot guard must exist before the next await point
                state.active += 1;
                found = Some(PooledConnection {
                    conn: idle.conn,
                    created_at: idle.created_at,
                    slot: Slot::new(Arc::clone(&self.shared), SlotKind::Active),
                });
                break;
            }

            if found.is_some() && !state.idle.is_empty() {
                self.shared.available.notify_one();
            }
            found
        };

        close_all(expired).await;

        if checked_out.is_some() {
            trace!("Reusing pooled connection to {}", self.config.host);
        }
        checked_out
    }

    fn reserve_slot(&self) -> Option<Slot<C::Connection>> {
        let mut state = self.shared.lock();
        if state.total() >= self.config.max_pool_size {
            return None;
        }
        state.pending += 1;
        Some(Slot::new(Arc::clone(&self.shared), SlotKind::Pending))
    }

    async fn open_checked_out(
        &self,
        slot: Slot<C::Connection>,
    ) -> Result<PooledConnection<C::Connection>> {
        match self.open_physical().await {
            Ok(conn) => Ok(PooledConnection {
                conn,
                created_at: Instant::now(),
                slot: slot.into_active(),
            }),
            Err(e) => {
                warn!("Failed to open connection to {}: {}", self.config.host, e);
                Err(e)
            }
        }
    }

    /// Generate a token and open one physical connection with it.
    async fn open_physical(&self) -> Result<C::Connection> {
        let connect_timeout = self.settings.connect_timeout();
        let open = async {
            let token = (self.token_provider)(
                &self.config.username,
                &self.config.host,
                self.config.port,
            )
            .await
            .map_err(|e| RdsPoolError::ConnectionOpen(e.to_string()))?;

            self.connector.connect(&self.config, &token).await
        };

        match timeout(connect_timeout, open).await {
            Ok(Ok(conn)) => {
                debug!("Opened new connection to {}:{}", self.config.host, self.config.port);
                Ok(conn)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RdsPoolError::ConnectionOpen(format!(
                "Connection to {}:{} timed out after {:?}",
                self.config.host, self.config.port, connect_timeout
            ))),
        }
    }

    /// Periodically evict expired idle connections and top up to `min_idle`.
    fn start_maintenance_task(self: &Arc<Self>) {
        let pool: Weak<Self> = Arc::downgrade(self);
        let period = self.settings.maintenance_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;

            loop {
                interval.tick().await;

                let Some(pool) = pool.upgrade() else {
                    break;
                };
                pool.evict_expired().await;
                if let Err(e) = pool.fill_min_idle().await {
                    warn!("Failed to refill idle connections: {}", e);
                }
            }
        });
    }
}

async fn close_all<T: DatabaseConnection>(conns: Vec<T>) {
    for conn in conns {
        conn.close().await;
    }
}
