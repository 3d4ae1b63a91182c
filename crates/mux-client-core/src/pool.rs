//! Session pool keyed by authority.
//!
//! At most one session per authority. A new authority gets a session
//! registered immediately in the `Connecting` state; that entry doubles as
//! the single-flight record, so concurrent callers subscribe to the one
//! connection attempt instead of starting their own.
//!
//! Each session is driven by a spawned task that feeds its transport events
//! through [`SessionState::on_event`]. A terminal event removes the pool
//! entry first and only then publishes the failure to waiters, so a caller
//! that observes the failure never finds the dead entry in the pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::authority::Authority;
use crate::error::{ClientError, Result};
use crate::event::SessionEvents;
use crate::session::{SessionFailure, SessionState};
use crate::transport::{Connector, TransportSession};

/// Pool of sessions, one per authority.
///
/// Cloning is cheap and yields a handle to the same pool. When the last
/// handle drops, every tracked session is destroyed.
pub struct SessionPool<C: Connector> {
    connector: Arc<C>,
    inner: Arc<Mutex<PoolInner<C::Session>>>,
}

struct PoolInner<S: TransportSession> {
    entries: HashMap<Authority, Entry<S>>,
    next_generation: u64,
}

struct Entry<S: TransportSession> {
    /// Distinguishes successive sessions for the same authority.
    generation: u64,
    session: S,
    state: Arc<watch::Sender<SessionState>>,
    driver: JoinHandle<()>,
}

impl<S: TransportSession> Entry<S> {
    /// Stop the driver, tear the session down and fail any waiters.
    fn shutdown(self, failure: SessionFailure) {
        self.driver.abort();
        self.session.destroy();
        self.state.send_replace(SessionState::Closed(failure));
    }
}

impl<S: TransportSession> Drop for PoolInner<S> {
    fn drop(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.shutdown(SessionFailure::Destroyed);
        }
    }
}

impl<C: Connector> Clone for SessionPool<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> SessionPool<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            inner: Arc::new(Mutex::new(PoolInner {
                entries: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Return the pooled session for `authority`, connecting if needed.
    ///
    /// Resolves once the session is open. Fails with the session's
    /// [`SessionFailure`] if it closes before opening; every concurrent
    /// caller waiting on the same attempt sees the same failure.
    pub async fn get_or_create(&self, authority: &Authority) -> Result<C::Session> {
        let (session, mut state) = self.acquire(authority);

        let settled = match state.wait_for(|s| !s.is_connecting()).await {
            Ok(current) => current.clone(),
            Err(_) => SessionState::Closed(SessionFailure::Destroyed),
        };

        match settled {
            SessionState::Closed(failure) => {
                debug!(%authority, reason = %failure, "session acquisition failed");
                Err(ClientError::Session(failure))
            }
            SessionState::Open | SessionState::Connecting => Ok(session),
        }
    }

    /// Look up or register the entry for `authority` without waiting.
    fn acquire(&self, authority: &Authority) -> (C::Session, watch::Receiver<SessionState>) {
        let mut inner = self.lock();

        if let Some(entry) = inner.entries.get(authority) {
            if !entry.session.is_closed() {
                debug!(%authority, generation = entry.generation, "reusing pooled session");
                return (entry.session.clone(), entry.state.subscribe());
            }
            // Closed by the transport but its terminal event is still queued.
            if let Some(stale) = inner.entries.remove(authority) {
                debug!(%authority, generation = stale.generation, "dropping stale session");
                stale.shutdown(SessionFailure::Closed);
            }
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;

        debug!(%authority, generation, "opening session");
        let (session, events) = self.connector.connect(authority);

        let (state, _) = watch::channel(SessionState::Connecting);
        let state = Arc::new(state);
        let receiver = state.subscribe();

        let driver = tokio::spawn(drive_session(
            Arc::downgrade(&self.inner),
            authority.clone(),
            generation,
            session.clone(),
            events,
            Arc::clone(&state),
        ));

        inner.entries.insert(
            authority.clone(),
            Entry {
                generation,
                session: session.clone(),
                state,
                driver,
            },
        );

        (session, receiver)
    }

    /// Destroy every pooled session and clear the pool.
    ///
    /// Callers still waiting for a connecting session fail with
    /// [`SessionFailure::Destroyed`]. Calling this on an empty pool is a
    /// no-op.
    pub fn destroy(&self) {
        let mut inner = self.lock();
        if inner.entries.is_empty() {
            return;
        }

        info!(count = inner.entries.len(), "destroying pooled sessions");
        for (authority, entry) in inner.entries.drain() {
            debug!(%authority, generation = entry.generation, "destroying session");
            entry.shutdown(SessionFailure::Destroyed);
        }
    }

    /// Number of pooled (connecting or open) sessions.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn contains(&self, authority: &Authority) -> bool {
        self.lock().entries.contains_key(authority)
    }

    /// Current state of the pooled session for `authority`, if any.
    pub fn state(&self, authority: &Authority) -> Option<SessionState> {
        self.lock()
            .entries
            .get(authority)
            .map(|entry| entry.state.borrow().clone())
    }

    /// The pooled session for `authority`, if any, without connecting.
    pub fn session(&self, authority: &Authority) -> Option<C::Session> {
        self.lock()
            .entries
            .get(authority)
            .map(|entry| entry.session.clone())
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner<C::Session>> {
        lock(&self.inner)
    }
}

fn lock<S: TransportSession>(inner: &Mutex<PoolInner<S>>) -> MutexGuard<'_, PoolInner<S>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Consume one session's events until it reaches a terminal state.
async fn drive_session<S: TransportSession>(
    pool: Weak<Mutex<PoolInner<S>>>,
    authority: Authority,
    generation: u64,
    session: S,
    mut events: SessionEvents,
    state: Arc<watch::Sender<SessionState>>,
) {
    let mut current = SessionState::Connecting;

    while let Some(event) = events.recv().await {
        let next = current.on_event(event);
        if next == current {
            continue;
        }

        if let SessionState::Closed(failure) = &next {
            evict(&pool, &authority, generation);
            session.destroy();
            warn!(%authority, generation, reason = %failure, "session evicted");
            state.send_replace(next);
            return;
        }

        info!(%authority, generation, "session connected");
        state.send_replace(next.clone());
        current = next;
    }

    // The transport dropped its event sender without reporting why.
    evict(&pool, &authority, generation);
    session.destroy();
    warn!(%authority, generation, "session event channel closed");
    state.send_replace(SessionState::Closed(SessionFailure::Closed));
}

/// Remove the entry for `authority` if it still belongs to `generation`.
fn evict<S: TransportSession>(
    pool: &Weak<Mutex<PoolInner<S>>>,
    authority: &Authority,
    generation: u64,
) {
    let Some(inner) = pool.upgrade() else {
        return;
    };
    let mut inner = lock(&inner);
    if inner
        .entries
        .get(authority)
        .is_some_and(|entry| entry.generation == generation)
    {
        inner.entries.remove(authority);
    }
}
