//! Pooled connection wrapper
//!
//! Tags a raw connection with the metadata the pool needs to enforce
//! lifetime and idle-time eviction, and records which pool checked it out.

use super::PoolShared;
use std::fmt;
use std::sync::Weak;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Identifier of one physical connection, unique within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle state of a pooled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Sitting in the pool, available for reuse
    Idle,
    /// Checked out by a caller
    InUse,
    /// Physically closed
    Closed,
}

/// A connection held in the idle list
#[derive(Debug)]
pub(crate) struct IdleEntry<C> {
    pub(crate) id: ConnectionId,
    pub(crate) conn: C,
    pub(crate) created_at: Instant,
    pub(crate) last_used_at: Instant,
}

impl<C> IdleEntry<C> {
    pub(crate) fn new(id: ConnectionId, conn: C) -> Self {
        let now = Instant::now();
        Self {
            id,
            conn,
            created_at: now,
            last_used_at: now,
        }
    }

    pub(crate) fn lifetime_exceeded(&self, max_lifetime: Option<Duration>, now: Instant) -> bool {
        matches!(max_lifetime, Some(max) if now.duration_since(self.created_at) > max)
    }

    pub(crate) fn idle_exceeded(&self, max_idle_time: Option<Duration>, now: Instant) -> bool {
        matches!(max_idle_time, Some(max) if now.duration_since(self.last_used_at) > max)
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.duration_since(self.last_used_at)
    }
}

/// A connection checked out of a [`ConnectionPool`](super::ConnectionPool)
///
/// The holder owns the physical connection exclusively until it hands the
/// wrapper back with [`ConnectionPool::release`](super::ConnectionPool::release).
/// Release empties the wrapper, so a second release of the same handle is
/// detected and rejected. Dropping a handle that was never released gives
/// its slot back to the pool and drops the physical connection.
pub struct PooledConnection<C: Send + 'static> {
    id: ConnectionId,
    conn: Option<C>,
    created_at: Instant,
    last_used_at: Instant,
    state: ConnectionState,
    origin: Weak<PoolShared<C>>,
}

impl<C: Send + 'static> PooledConnection<C> {
    pub(crate) fn checked_out(entry: IdleEntry<C>, origin: Weak<PoolShared<C>>) -> Self {
        Self {
            id: entry.id,
            conn: Some(entry.conn),
            created_at: entry.created_at,
            last_used_at: Instant::now(),
            state: ConnectionState::InUse,
            origin,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    /// Age of the physical connection
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// The underlying connection, `None` once released
    pub fn get(&self) -> Option<&C> {
        self.conn.as_ref()
    }

    /// Mutable access to the underlying connection, `None` once released
    pub fn get_mut(&mut self) -> Option<&mut C> {
        self.conn.as_mut()
    }

    pub(crate) fn origin(&self) -> &Weak<PoolShared<C>> {
        &self.origin
    }

    /// Move the physical connection out, leaving the handle in `state`
    pub(crate) fn take(&mut self, state: ConnectionState) -> Option<IdleEntry<C>> {
        let conn = self.conn.take()?;
        self.state = state;
        Some(IdleEntry {
            id: self.id,
            conn,
            created_at: self.created_at,
            last_used_at: Instant::now(),
        })
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }
}

impl<C: Send + 'static> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .finish()
    }
}

impl<C: Send + 'static> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if self.state != ConnectionState::InUse || self.conn.is_none() {
            return;
        }
        if let Some(shared) = self.origin.upgrade() {
            warn!(id = %self.id, "Connection dropped without release, reclaiming pool slot");
            shared.reclaim_leaked();
        }
    }
}
