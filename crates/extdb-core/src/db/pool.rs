//! Bounded session pool with ad-hoc overflow.
//!
//! The pool keeps between `min_sessions` and `max_sessions` live sessions of
//! a single kind. `acquire` prefers a parked idle session, opens a new one
//! while under the bound, and past the bound synthesizes an unpooled ad-hoc
//! session from the cached connection string, so a caller is never refused
//! for want of capacity. Idle sessions past their lifetime are closed on the
//! next acquire.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{ExtError, Result};

use super::session::DbSession;
use super::{DbKind, DbSettings};

struct IdleSession {
    session: DbSession,
    parked_at: Instant,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<IdleSession>,
    /// Pooled sessions, parked or checked out. Overflow sessions are not
    /// counted.
    open: usize,
}

/// Fixed-bound pool of database sessions of one kind.
pub struct DbPool {
    kind: DbKind,
    connection_str: String,
    max_sessions: usize,
    idle_lifetime: Duration,
    state: Mutex<PoolState>,
}

impl DbPool {
    /// Bring up a pool, pre-opening `min_sessions` and verifying the first
    /// of them answers a ping.
    pub fn connect(cfg: &DbSettings) -> Result<Arc<Self>> {
        if cfg.kind == DbKind::Sqlite {
            // the connection string is a file path under extDB/sqlite
            if let Some(parent) = std::path::Path::new(&cfg.connection_str).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ExtError::SessionPoolFailed(e.to_string()))?;
            }
        }

        let pool = Arc::new(Self {
            kind: cfg.kind,
            connection_str: cfg.connection_str.clone(),
            max_sessions: cfg.max_sessions.max(1),
            idle_lifetime: cfg.idle,
            state: Mutex::new(PoolState::default()),
        });

        for i in 0..cfg.min_sessions {
            let mut session = pool
                .open_session()
                .map_err(|e| ExtError::SessionPoolFailed(e.to_string()))?;
            if i == 0 && !session.ping() {
                return Err(ExtError::SessionPoolFailed(format!(
                    "{} session did not answer",
                    cfg.kind
                )));
            }
            let mut state = pool.state.lock();
            state.idle.push(IdleSession {
                session,
                parked_at: Instant::now(),
            });
            state.open += 1;
        }

        info!(
            kind = %cfg.kind,
            min = cfg.min_sessions,
            max = pool.max_sessions,
            "database session pool started"
        );
        Ok(pool)
    }

    pub fn kind(&self) -> DbKind {
        self.kind
    }

    /// Take a session. Falls back to an ad-hoc session when the pool is at
    /// its bound; exhaustion is never surfaced to the caller.
    pub fn acquire(self: &Arc<Self>) -> Result<PooledSession> {
        {
            let mut state = self.state.lock();
            let PoolState { idle, open } = &mut *state;
            idle.retain(|parked| {
                if parked.parked_at.elapsed() > self.idle_lifetime {
                    *open -= 1;
                    false
                } else {
                    true
                }
            });

            if let Some(parked) = idle.pop() {
                return Ok(PooledSession {
                    session: Some(parked.session),
                    pool: Arc::clone(self),
                    pooled: true,
                });
            }

            if *open < self.max_sessions {
                // reserve the slot before releasing the lock
                *open += 1;
            } else {
                drop(state);
                debug!(kind = %self.kind, "session pool exhausted, opening ad-hoc session");
                let session = self.open_session()?;
                return Ok(PooledSession {
                    session: Some(session),
                    pool: Arc::clone(self),
                    pooled: false,
                });
            }
        }

        match self.open_session() {
            Ok(session) => Ok(PooledSession {
                session: Some(session),
                pool: Arc::clone(self),
                pooled: true,
            }),
            Err(e) => {
                self.state.lock().open -= 1;
                Err(e)
            }
        }
    }

    fn open_session(&self) -> Result<DbSession> {
        let mut session = DbSession::connect(self.kind, &self.connection_str)?;
        session.customize();
        Ok(session)
    }

    fn release(&self, session: DbSession, pooled: bool) {
        if !pooled {
            // ad-hoc overflow session, just closed on drop
            return;
        }
        let mut state = self.state.lock();
        state.idle.push(IdleSession {
            session,
            parked_at: Instant::now(),
        });
    }

    /// Pooled sessions currently open (parked or checked out). Test hook.
    pub fn open_sessions(&self) -> usize {
        self.state.lock().open
    }
}

impl std::fmt::Debug for DbPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbPool")
            .field("kind", &self.kind)
            .field("max_sessions", &self.max_sessions)
            .field("open", &self.open_sessions())
            .finish()
    }
}

/// A session checked out of the pool; returned (or discarded, for overflow
/// sessions) on drop.
pub struct PooledSession {
    session: Option<DbSession>,
    pool: Arc<DbPool>,
    pooled: bool,
}

impl Deref for PooledSession {
    type Target = DbSession;

    fn deref(&self) -> &DbSession {
        self.session.as_ref().expect("session present until drop")
    }
}

impl DerefMut for PooledSession {
    fn deref_mut(&mut self) -> &mut DbSession {
        self.session.as_mut().expect("session present until drop")
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session, self.pooled);
        }
    }
}
