//! Bounded connection pool for one logical endpoint
//!
//! Bounds the number of open physical connections, recycles idle ones and
//! evicts connections that outlived `max_lifetime` or sat idle longer than
//! `max_idle_time`. Callers that find the pool exhausted queue in FIFO order;
//! freed capacity is handed straight to the oldest waiter so late arrivals
//! cannot overtake it.
//!
//! All bookkeeping lives behind one mutex whose critical sections never span
//! an `.await`: connecting, probing and closing happen with the lock released.

mod connection;

pub use connection::{ConnectionId, ConnectionState, PooledConnection};

use crate::context::CallContext;
use crate::error::{BoxError, ResilienceError, Result};
use connection::IdleEntry;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Configuration for connection pool behavior
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of open connections (idle + in use), 0 = unbounded
    pub max_open: usize,
    /// Maximum number of idle connections kept for reuse, 0 = no reuse
    pub max_idle: usize,
    /// Idle connections `maintain_idle` tries to keep warm
    pub min_idle: usize,
    /// Maximum lifetime of a connection, `None` = unbounded
    pub max_lifetime: Option<Duration>,
    /// Maximum time a connection may sit idle, `None` = unbounded
    pub max_idle_time: Option<Duration>,
    /// Idle connections older than this are checked with `is_healthy` before reuse
    pub health_check_after: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: 10,
            max_idle: 5,
            min_idle: 0,
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
            max_idle_time: Some(Duration::from_secs(300)), // 5 minutes
            health_check_after: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Many short calls against a cheap-to-connect endpoint
    ///
    /// ```
    /// use tether_core_resilience::connection_pool::PoolConfig;
    ///
    /// let config = PoolConfig::high_concurrency();
    /// assert_eq!(config.max_open, 500);
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn high_concurrency() -> Self {
        Self {
            max_open: 500,
            max_idle: 50,
            min_idle: 10,
            max_lifetime: Some(Duration::from_secs(60)),
            max_idle_time: Some(Duration::from_secs(10)),
            health_check_after: Duration::from_secs(5),
        }
    }

    /// Few long-running sessions that must not be recycled mid-flight
    ///
    /// ```
    /// use tether_core_resilience::connection_pool::PoolConfig;
    ///
    /// let config = PoolConfig::long_lived();
    /// assert_eq!(config.max_open, 4);
    /// assert_eq!(config.max_lifetime, Some(std::time::Duration::from_secs(24 * 60 * 60)));
    /// ```
    pub fn long_lived() -> Self {
        Self {
            max_open: 4,
            max_idle: 2,
            min_idle: 1,
            // A single session can last hours.
            max_lifetime: Some(Duration::from_secs(24 * 60 * 60)),
            max_idle_time: Some(Duration::from_secs(300)),
            health_check_after: Duration::from_secs(60),
        }
    }

    /// Reject bounds that contradict each other
    pub fn validate(&self) -> Result<()> {
        if self.max_open > 0 && self.max_idle > self.max_open {
            return Err(ResilienceError::InvalidConfig(format!(
                "max_idle ({}) must not exceed max_open ({})",
                self.max_idle, self.max_open
            )));
        }
        if self.min_idle > self.max_idle {
            return Err(ResilienceError::InvalidConfig(format!(
                "min_idle ({}) must not exceed max_idle ({})",
                self.min_idle, self.max_idle
            )));
        }
        Ok(())
    }
}

/// Factory trait for creating, validating and closing physical connections
#[async_trait::async_trait]
pub trait ConnectionFactory<C: Send + 'static>: Send + Sync {
    /// Open a new physical connection
    async fn create(&self) -> std::result::Result<C, BoxError>;

    /// Close a physical connection
    async fn close(&self, conn: C) -> std::result::Result<(), BoxError> {
        drop(conn);
        Ok(())
    }

    /// Liveness check run before reusing a long-idle connection
    async fn is_healthy(&self, _conn: &mut C) -> bool {
        true
    }
}

/// What a queued waiter receives when capacity frees up
enum Handoff<C> {
    /// A released connection, already counted as in use for the waiter
    Connection(IdleEntry<C>),
    /// A reserved slot, the waiter opens the connection itself
    Slot,
}

struct Waiter<C> {
    id: u64,
    tx: oneshot::Sender<Handoff<C>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    created: u64,
    closed: u64,
    evicted: u64,
    waits: u64,
    timeouts: u64,
}

/// Internal pool state, guarded by `PoolShared::state`
struct PoolState<C> {
    idle: VecDeque<IdleEntry<C>>,
    in_use: usize,
    /// Slots reserved for connections being opened
    pending: usize,
    waiters: VecDeque<Waiter<C>>,
    closed: bool,
    max_open: usize,
    next_conn_id: u64,
    next_waiter_id: u64,
    counters: Counters,
}

impl<C> PoolState<C> {
    fn new(max_open: usize) -> Self {
        Self {
            idle: VecDeque::new(),
            in_use: 0,
            pending: 0,
            waiters: VecDeque::new(),
            closed: false,
            max_open,
            next_conn_id: 0,
            next_waiter_id: 0,
            counters: Counters::default(),
        }
    }

    fn open_count(&self) -> usize {
        self.idle.len() + self.in_use + self.pending
    }

    fn has_capacity(&self) -> bool {
        self.max_open == 0 || self.open_count() < self.max_open
    }

    fn next_id(&mut self) -> ConnectionId {
        self.next_conn_id += 1;
        ConnectionId(self.next_conn_id)
    }

    /// Turn free capacity into creation slots for queued waiters
    fn dispatch_slots(&mut self) {
        while self.has_capacity() {
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            self.pending += 1;
            if waiter.tx.send(Handoff::Slot).is_err() {
                self.pending -= 1;
            }
        }
    }

    /// Give a reusable connection to the oldest live waiter, or return it
    fn hand_off(&mut self, mut entry: IdleEntry<C>) -> Option<IdleEntry<C>> {
        while let Some(waiter) = self.waiters.pop_front() {
            self.in_use += 1;
            // A failed send hands back exactly what it was given.
            let Err(Handoff::Connection(returned)) = waiter.tx.send(Handoff::Connection(entry))
            else {
                return None;
            };
            self.in_use -= 1;
            entry = returned;
        }
        Some(entry)
    }

    /// Park a connection in the idle list, handing it to a waiter first.
    /// Returns the connection when the idle list is full.
    fn store(&mut self, entry: IdleEntry<C>, max_idle: usize) -> Option<IdleEntry<C>> {
        let entry = self.hand_off(entry)?;
        if !self.closed && self.idle.len() < max_idle {
            self.idle.push_back(entry);
            return None;
        }
        self.retire();
        Some(entry)
    }

    /// Account for a connection leaving the pool and pass its slot on
    fn retire(&mut self) {
        self.counters.closed += 1;
        self.dispatch_slots();
    }
}

/// State shared between the pool, its handles, waiters and the reaper task
pub(crate) struct PoolShared<C: Send + 'static> {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory<C>>,
    state: Mutex<PoolState<C>>,
}

impl<C: Send + 'static> PoolShared<C> {
    /// A checked-out handle was dropped without release
    pub(crate) fn reclaim_leaked(&self) {
        let mut state = self.state.lock();
        state.in_use -= 1;
        state.retire();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn is_expired(&self, entry: &IdleEntry<C>, now: Instant) -> bool {
        entry.lifetime_exceeded(self.config.max_lifetime, now)
            || entry.idle_exceeded(self.config.max_idle_time, now)
    }

    async fn close_raw(&self, id: ConnectionId, conn: C) {
        if let Err(e) = self.factory.close(conn).await {
            warn!(id = %id, error = %e, "Failed to close connection");
        }
    }

    async fn close_entries(&self, entries: Vec<IdleEntry<C>>) {
        for entry in entries {
            self.close_raw(entry.id, entry.conn).await;
        }
    }

    /// Close every idle connection past its lifetime or idle budget
    async fn sweep(&self) -> usize {
        let expired = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let drained: Vec<_> = state.idle.drain(..).collect();
            let mut expired = Vec::new();
            for entry in drained {
                if self.is_expired(&entry, now) {
                    expired.push(entry);
                } else {
                    state.idle.push_back(entry);
                }
            }
            if !expired.is_empty() {
                state.counters.evicted += expired.len() as u64;
                state.counters.closed += expired.len() as u64;
                state.dispatch_slots();
            }
            expired
        };

        let evicted = expired.len();
        if evicted > 0 {
            debug!(evicted, "Evicted expired idle connections");
        }
        self.close_entries(expired).await;
        evicted
    }
}

/// A slot counted in `pending`, returned to the pool unless fulfilled
struct SlotReservation<C: Send + 'static> {
    shared: Arc<PoolShared<C>>,
    armed: bool,
}

impl<C: Send + 'static> SlotReservation<C> {
    /// Wrap a slot already added to `pending`
    fn claimed(shared: Arc<PoolShared<C>>) -> Self {
        Self {
            shared,
            armed: true,
        }
    }

    /// Turn the slot into a checked-out connection.
    /// Hands the connection back when the pool closed meanwhile.
    fn fulfil(mut self, conn: C) -> std::result::Result<IdleEntry<C>, C> {
        self.armed = false;
        let mut state = self.shared.state.lock();
        state.pending -= 1;
        if state.closed {
            state.retire();
            return Err(conn);
        }
        state.in_use += 1;
        state.counters.created += 1;
        let id = state.next_id();
        Ok(IdleEntry::new(id, conn))
    }

    /// Turn the slot into an idle connection, returning what must be closed
    fn fulfil_idle(mut self, conn: C) -> Option<IdleEntry<C>> {
        self.armed = false;
        let mut state = self.shared.state.lock();
        state.pending -= 1;
        state.counters.created += 1;
        let id = state.next_id();
        state.store(IdleEntry::new(id, conn), self.shared.config.max_idle)
    }
}

impl<C: Send + 'static> Drop for SlotReservation<C> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.shared.state.lock();
            state.pending -= 1;
            state.dispatch_slots();
        }
    }
}

/// A registration in the waiter queue, removed on drop unless settled
struct WaitTicket<C: Send + 'static> {
    id: u64,
    rx: oneshot::Receiver<Handoff<C>>,
    shared: Arc<PoolShared<C>>,
    settled: bool,
}

impl<C: Send + 'static> Drop for WaitTicket<C> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.rx.close();
        let leftover = {
            let mut state = self.shared.state.lock();
            let id = self.id;
            state.waiters.retain(|w| w.id != id);
            // A hand-off may have landed between the wake-up and the cancellation.
            match self.rx.try_recv() {
                Ok(Handoff::Connection(entry)) => {
                    state.in_use -= 1;
                    state.store(entry, self.shared.config.max_idle)
                }
                Ok(Handoff::Slot) => {
                    state.pending -= 1;
                    state.dispatch_slots();
                    None
                }
                Err(_) => None,
            }
        };
        if let Some(entry) = leftover {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    debug!(id = %entry.id, "Closing connection handed to a cancelled waiter");
                    let shared = self.shared.clone();
                    handle.spawn(async move { shared.close_raw(entry.id, entry.conn).await });
                }
                Err(_) => {
                    warn!(id = %entry.id, "No runtime to close connection handed to a cancelled waiter");
                }
            }
        }
    }
}

enum Step<C: Send + 'static> {
    Reuse(IdleEntry<C>),
    Create(SlotReservation<C>),
    Wait(WaitTicket<C>),
}

/// A bounded pool of connections to one logical endpoint
///
/// # Example
/// ```no_run
/// use tether_core_resilience::{CallContext, ConnectionFactory, ConnectionPool, PoolConfig};
/// use tether_core_resilience::error::BoxError;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// struct MyConnection;
/// struct MyConnectionFactory;
///
/// #[async_trait::async_trait]
/// impl ConnectionFactory<MyConnection> for MyConnectionFactory {
///     async fn create(&self) -> Result<MyConnection, BoxError> {
///         Ok(MyConnection)
///     }
/// }
///
/// # async fn example() -> Result<(), tether_core_resilience::ResilienceError> {
/// let pool = ConnectionPool::new(Arc::new(MyConnectionFactory), PoolConfig::default());
/// let ctx = CallContext::new().with_timeout(Duration::from_secs(5));
///
/// let mut conn = pool.acquire(&ctx).await?;
/// // Use conn.get_mut()...
/// pool.release(&mut conn, true).await?;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionPool<C: Send + 'static> {
    shared: Arc<PoolShared<C>>,
}

impl<C: Send + 'static> ConnectionPool<C> {
    /// Create a new, empty connection pool
    pub fn new(factory: Arc<dyn ConnectionFactory<C>>, config: PoolConfig) -> Self {
        let max_open = config.max_open;
        Self {
            shared: Arc::new(PoolShared {
                config,
                factory,
                state: Mutex::new(PoolState::new(max_open)),
            }),
        }
    }

    /// Create a connection pool after validating its configuration
    pub fn try_new(factory: Arc<dyn ConnectionFactory<C>>, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(factory, config))
    }

    /// Create a connection pool with default configuration
    pub fn new_default(factory: Arc<dyn ConnectionFactory<C>>) -> Self {
        Self::new(factory, PoolConfig::default())
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Acquire a connection from the pool
    ///
    /// Reuses an idle connection when one is still within its lifetime and
    /// idle budget, opens a new one while below `max_open`, and otherwise
    /// queues until a connection is released or `ctx` finishes.
    pub async fn acquire(&self, ctx: &CallContext) -> Result<PooledConnection<C>> {
        loop {
            if let Err(err) = ctx.check() {
                self.shared.state.lock().counters.timeouts += 1;
                return Err(ResilienceError::AcquireTimeout(err));
            }

            let (step, expired) = self.next_step()?;
            if !expired.is_empty() {
                debug!(evicted = expired.len(), "Evicted expired idle connections on acquire");
                self.shared.close_entries(expired).await;
            }

            match step {
                Step::Reuse(entry) => {
                    let stale = entry.idle_for(Instant::now()) >= self.shared.config.health_check_after;
                    let mut conn = PooledConnection::checked_out(entry, Arc::downgrade(&self.shared));
                    if stale && !self.check_health(&mut conn).await {
                        self.discard(&mut conn, "failed health check").await;
                        continue;
                    }
                    debug!(id = %conn.id(), "Reusing idle connection");
                    return Ok(conn);
                }
                Step::Create(reservation) => return self.open(reservation, ctx).await,
                Step::Wait(ticket) => {
                    if let Some(conn) = self.wait(ticket, ctx).await? {
                        return Ok(conn);
                    }
                }
            }
        }
    }

    /// Decide how to satisfy an acquire, under one critical section
    fn next_step(&self) -> Result<(Step<C>, Vec<IdleEntry<C>>)> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(ResilienceError::PoolClosed);
        }

        let now = Instant::now();
        let mut expired = Vec::new();
        let mut reuse = None;
        while let Some(entry) = state.idle.pop_back() {
            if self.shared.is_expired(&entry, now) {
                expired.push(entry);
                continue;
            }
            state.in_use += 1;
            reuse = Some(entry);
            break;
        }
        if !expired.is_empty() {
            state.counters.evicted += expired.len() as u64;
            state.counters.closed += expired.len() as u64;
            state.dispatch_slots();
        }

        if let Some(entry) = reuse {
            return Ok((Step::Reuse(entry), expired));
        }

        if state.waiters.is_empty() && state.has_capacity() {
            state.pending += 1;
            let reservation = SlotReservation::claimed(Arc::clone(&self.shared));
            return Ok((Step::Create(reservation), expired));
        }

        state.next_waiter_id += 1;
        let id = state.next_waiter_id;
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(Waiter { id, tx });
        state.counters.waits += 1;
        let ticket = WaitTicket {
            id,
            rx,
            shared: Arc::clone(&self.shared),
            settled: false,
        };
        Ok((Step::Wait(ticket), expired))
    }

    /// Open a connection into a reserved slot
    async fn open(
        &self,
        reservation: SlotReservation<C>,
        ctx: &CallContext,
    ) -> Result<PooledConnection<C>> {
        let created = tokio::select! {
            biased;
            err = ctx.done() => {
                self.shared.state.lock().counters.timeouts += 1;
                return Err(ResilienceError::AcquireTimeout(err));
            }
            created = self.shared.factory.create() => created,
        };

        match created {
            Ok(conn) => match reservation.fulfil(conn) {
                Ok(entry) => {
                    debug!(id = %entry.id, "Opened new connection");
                    Ok(PooledConnection::checked_out(
                        entry,
                        Arc::downgrade(&self.shared),
                    ))
                }
                Err(conn) => {
                    if let Err(e) = self.shared.factory.close(conn).await {
                        warn!(error = %e, "Failed to close connection opened after pool close");
                    }
                    Err(ResilienceError::PoolClosed)
                }
            },
            Err(e) => {
                drop(reservation);
                warn!(error = %e, "Connection factory failed");
                Err(ResilienceError::ConnectFailed(e))
            }
        }
    }

    /// Wait in the queue; `None` means the queue was torn down and the caller should re-check
    async fn wait(
        &self,
        mut ticket: WaitTicket<C>,
        ctx: &CallContext,
    ) -> Result<Option<PooledConnection<C>>> {
        debug!(waiter = ticket.id, "Pool exhausted, waiting for a connection");
        let handoff = tokio::select! {
            biased;
            handoff = &mut ticket.rx => handoff,
            err = ctx.done() => {
                self.shared.state.lock().counters.timeouts += 1;
                return Err(ResilienceError::AcquireTimeout(err));
            }
        };
        ticket.settled = true;

        match handoff {
            Ok(Handoff::Connection(entry)) => Ok(Some(PooledConnection::checked_out(
                entry,
                Arc::downgrade(&self.shared),
            ))),
            Ok(Handoff::Slot) => {
                let reservation = SlotReservation::claimed(Arc::clone(&self.shared));
                self.open(reservation, ctx).await.map(Some)
            }
            Err(_) => Ok(None),
        }
    }

    async fn check_health(&self, conn: &mut PooledConnection<C>) -> bool {
        match conn.get_mut() {
            Some(raw) => self.shared.factory.is_healthy(raw).await,
            None => false,
        }
    }

    /// Close a checked-out connection and free its slot
    async fn discard(&self, conn: &mut PooledConnection<C>, reason: &'static str) {
        let entry = {
            let mut state = self.shared.state.lock();
            let Some(entry) = conn.take(ConnectionState::Closed) else {
                return;
            };
            state.in_use -= 1;
            state.retire();
            entry
        };
        warn!(id = %entry.id, reason, "Closing connection");
        self.shared.close_raw(entry.id, entry.conn).await;
    }

    /// Return a connection to the pool
    ///
    /// Healthy connections within their lifetime go to the oldest waiter or
    /// back to the idle list; everything else is closed and its slot freed.
    /// Releasing the same handle twice, or a handle from another pool, fails
    /// with [`ResilienceError::InvalidRelease`].
    pub async fn release(&self, conn: &mut PooledConnection<C>, healthy: bool) -> Result<()> {
        let id = conn.id();
        if !std::ptr::eq(conn.origin().as_ptr(), Arc::as_ptr(&self.shared)) {
            error!(id = %id, "Release of a connection from another pool");
            return Err(ResilienceError::InvalidRelease {
                id,
                reason: "connection belongs to another pool",
            });
        }

        let to_close = {
            let mut state = self.shared.state.lock();
            let Some(entry) = conn.take(ConnectionState::Idle) else {
                drop(state);
                error!(id = %id, "Release of a connection that is not checked out");
                return Err(ResilienceError::InvalidRelease {
                    id,
                    reason: "connection already released",
                });
            };
            state.in_use -= 1;

            let config = &self.shared.config;
            let discard = if !healthy {
                Some("unhealthy")
            } else if entry.lifetime_exceeded(config.max_lifetime, Instant::now()) {
                Some("max lifetime exceeded")
            } else if state.closed {
                Some("pool closed")
            } else if config.max_idle == 0 {
                Some("idle pooling disabled")
            } else {
                None
            };

            match discard {
                Some(reason) => {
                    state.retire();
                    Some((entry, reason))
                }
                None => state
                    .store(entry, config.max_idle)
                    .map(|entry| (entry, "idle limit reached")),
            }
        };

        match to_close {
            Some((entry, reason)) => {
                conn.set_state(ConnectionState::Closed);
                debug!(id = %id, reason, "Closing released connection");
                self.shared.close_raw(entry.id, entry.conn).await;
            }
            None => debug!(id = %id, "Connection returned to pool"),
        }
        Ok(())
    }

    /// Stop accepting acquisitions and close every idle connection
    ///
    /// Checked-out connections close themselves when released. Queued
    /// waiters fail with [`ResilienceError::PoolClosed`]. Idempotent.
    pub async fn close(&self) {
        let (idle, waiters) = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle: Vec<_> = state.idle.drain(..).collect();
            state.counters.closed += idle.len() as u64;
            (idle, std::mem::take(&mut state.waiters))
        };
        drop(waiters);

        info!(idle = idle.len(), "Connection pool closed");
        self.shared.close_entries(idle).await;
    }

    /// Close all idle connections, keeping the pool open
    pub async fn clear_idle(&self) -> usize {
        let idle: Vec<_> = {
            let mut state = self.shared.state.lock();
            let idle: Vec<_> = state.idle.drain(..).collect();
            state.counters.closed += idle.len() as u64;
            state.dispatch_slots();
            idle
        };
        let cleared = idle.len();
        self.shared.close_entries(idle).await;
        cleared
    }

    /// Close idle connections past `max_lifetime` or `max_idle_time`
    pub async fn evict_expired(&self) -> usize {
        self.shared.sweep().await
    }

    /// Run [`evict_expired`](Self::evict_expired) every `period` until the
    /// pool is closed or dropped
    pub fn spawn_reaper(&self, period: Duration) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                if shared.is_closed() {
                    break;
                }
                shared.sweep().await;
            }
            debug!("Pool reaper stopped");
        })
    }

    /// Open idle connections until `min(min_idle, max_idle)` are warm
    pub async fn maintain_idle(&self) -> Result<usize> {
        let target = self.shared.config.min_idle.min(self.shared.config.max_idle);
        let mut opened = 0;

        loop {
            let reservation = {
                let mut state = self.shared.state.lock();
                if state.closed {
                    return Err(ResilienceError::PoolClosed);
                }
                if state.idle.len() + state.pending >= target || !state.has_capacity() {
                    break;
                }
                state.pending += 1;
                SlotReservation::claimed(Arc::clone(&self.shared))
            };

            let conn = self
                .shared
                .factory
                .create()
                .await
                .map_err(ResilienceError::ConnectFailed)?;
            if let Some(entry) = reservation.fulfil_idle(conn) {
                self.shared.close_raw(entry.id, entry.conn).await;
                break;
            }
            opened += 1;
        }

        if opened > 0 {
            debug!(opened, "Pre-warmed idle connections");
        }
        Ok(opened)
    }

    /// Point-in-time snapshot of the pool
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            open: state.open_count(),
            idle: state.idle.len(),
            in_use: state.in_use,
            waiters: state.waiters.len(),
            max_open: state.max_open,
            total_created: state.counters.created,
            total_closed: state.counters.closed,
            total_evicted: state.counters.evicted,
            total_waits: state.counters.waits,
            total_timeouts: state.counters.timeouts,
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Occupied slots: idle, in use, and connections being opened
    pub open: usize,
    /// Number of idle connections
    pub idle: usize,
    /// Number of checked-out connections
    pub in_use: usize,
    /// Callers queued for a slot
    pub waiters: usize,
    /// Maximum open connections, 0 = unbounded
    pub max_open: usize,
    pub total_created: u64,
    pub total_closed: u64,
    pub total_evicted: u64,
    pub total_waits: u64,
    pub total_timeouts: u64,
}

impl PoolStats {
    /// Get pool utilization as a percentage of `max_open`
    pub fn utilization(&self) -> f64 {
        if self.max_open == 0 {
            0.0
        } else {
            (self.open as f64 / self.max_open as f64) * 100.0
        }
    }
}
