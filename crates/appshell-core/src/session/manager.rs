//! SessionManager - the single owner of the process's authentication state.
//!
//! # Lifecycle
//!
//! ```text
//!   init() ──► { user: None, loading: true } ──reconcile──► { user: ?, loading: false }
//!                                                               │
//!                                         reconcile / sign_in / logout (any number)
//!                                                               │
//!                                                           dispose()
//! ```
//!
//! # Ordering
//!
//! Every reconcile, logout, and sign-in takes a ticket from a generation
//! counter when it is initiated. A reconcile only writes `user` if no newer
//! ticket was handed out while it waited on the identity service, so the
//! state reflects the most recently initiated operation.
//!
//! A logout clears the user when its remote call finishes, unless a
//! `sign_in` was initiated after it. A reconcile that overlaps a pending
//! logout cannot bring the user back.
//!
//! Remote calls run on spawned tasks. Dropping the future returned by
//! [`SessionManager::reconcile`] or [`SessionManager::logout`] does not
//! cancel the work.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinError;

use super::state::{Session, SessionEvent, SignOutReason};
use crate::event_bus::{BroadcastEvent, EventBus};
use crate::identity::{Identity, IdentityError, IdentityService};
use crate::logging::ErrorReporter;

/// What happens when `reconcile()` is called while another is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconcilePolicy {
    /// Every call queries the service; the latest initiated call wins.
    #[default]
    LastWriterWins,
    /// Calls made while one is in flight wait for it instead of issuing
    /// their own query.
    SingleFlight,
}

type Flight = Shared<BoxFuture<'static, ()>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    identity: Arc<dyn IdentityService>,
    reporter: Arc<dyn ErrorReporter>,
    event_bus: Arc<EventBus>,
    state: watch::Sender<Session>,
    generation: AtomicU64,
    policy: ReconcilePolicy,
    flight: Mutex<Option<(u64, Flight)>>,
    /// Ticket of the latest `sign_in`.
    last_sign_in: AtomicU64,
    disposed: AtomicBool,
}

/// Clears `loading` when dropped, on every exit path of a reconcile.
struct LoadingGuard<'a>(&'a Inner);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_loading();
    }
}

/// Ends a logout when dropped, whatever the remote call did.
struct SignOutGuard<'a> {
    inner: &'a Inner,
    ticket: u64,
}

impl Drop for SignOutGuard<'_> {
    fn drop(&mut self) {
        self.inner.finish_logout(self.ticket);
    }
}

/// Empties the single-flight slot when the flight's task ends, unless a
/// newer flight has taken it.
struct FlightSlotGuard {
    inner: Arc<Inner>,
    ticket: u64,
}

impl Drop for FlightSlotGuard {
    fn drop(&mut self) {
        let mut slot = lock(&self.inner.flight);
        if matches!(slot.as_ref(), Some((ticket, _)) if *ticket == self.ticket) {
            slot.take();
        }
    }
}

impl Inner {
    fn next_ticket(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }

    fn is_disposed(&self, operation: &str) -> bool {
        let disposed = self.disposed.load(Ordering::SeqCst);
        if disposed {
            log::warn!("Ignoring {} on disposed session manager", operation);
        }
        disposed
    }

    async fn reconcile_once(&self, ticket: u64) {
        let _loading = LoadingGuard(self);

        match self.identity.get_current_user().await {
            Ok(reply) => match reply.into_identity() {
                Some(identity) => {
                    if self.is_current(ticket) {
                        log::info!("Session reconciled for user {}", identity.id);
                        self.set_user(identity);
                    } else {
                        log::debug!("Discarding stale reconcile result (ticket {})", ticket);
                    }
                }
                None => {
                    log::info!("Identity service rejected the session");
                    self.clear_if_current(ticket);
                }
            },
            Err(err) if err.is_invalid_session() => {
                log::info!("Session invalidated: {}", err);
                self.clear_if_current(ticket);
            }
            Err(err) => {
                self.reporter.report("reconcile", &err);
                self.event_bus.emit(SessionEvent::ReconcileFailed {
                    message: err.to_string(),
                });
            }
        }
    }

    async fn logout_once(&self, ticket: u64) {
        let _cleanup = SignOutGuard {
            inner: self,
            ticket,
        };

        if let Err(err) = self.identity.logout().await {
            self.reporter.report("logout", &err);
        }
    }

    fn clear_if_current(&self, ticket: u64) {
        if self.is_current(ticket) {
            self.clear_user(SignOutReason::Invalidated);
        } else {
            log::debug!("Discarding stale invalidation (ticket {})", ticket);
        }
    }

    fn finish_logout(&self, ticket: u64) {
        if self.last_sign_in.load(Ordering::SeqCst) > ticket {
            log::debug!("Keeping user signed in after logout (ticket {})", ticket);
        } else {
            self.clear_user(SignOutReason::Logout);
        }
    }

    fn set_user(&self, identity: Identity) {
        let user_id = identity.id.clone();
        let changed = self.state.send_if_modified(|session| {
            if session.user.as_ref() == Some(&identity) {
                false
            } else {
                session.user = Some(identity);
                true
            }
        });
        if changed {
            self.event_bus.emit(SessionEvent::SignedIn { user_id });
        }
    }

    fn clear_user(&self, reason: SignOutReason) {
        let changed = self
            .state
            .send_if_modified(|session| session.user.take().is_some());
        if changed {
            self.event_bus.emit(SessionEvent::SignedOut { reason });
        }
    }

    fn finish_loading(&self) {
        let mut authenticated = false;
        let changed = self.state.send_if_modified(|session| {
            if !session.loading {
                return false;
            }
            session.loading = false;
            authenticated = session.user.is_some();
            true
        });
        if changed {
            self.event_bus.emit(SessionEvent::Loaded { authenticated });
        }
    }

    fn report_task_failure(&self, operation: &str, err: JoinError) {
        let err = IdentityError::Other(format!("{} task failed: {}", operation, err));
        self.reporter.report(operation, &err);
    }
}

/// Owns the process's [`Session`] and keeps it in step with the identity
/// service. Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create the manager and start the initial reconciliation.
    ///
    /// Returns immediately with `loading == true`. Must be called from within
    /// a tokio runtime.
    pub fn init(
        identity: Arc<dyn IdentityService>,
        reporter: Arc<dyn ErrorReporter>,
        event_bus: Arc<EventBus>,
        policy: ReconcilePolicy,
    ) -> Self {
        let (state, _) = watch::channel(Session::new());
        let manager = Self {
            inner: Arc::new(Inner {
                identity,
                reporter,
                event_bus,
                state,
                generation: AtomicU64::new(0),
                policy,
                flight: Mutex::new(None),
                last_sign_in: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        };

        log::debug!(
            "Session manager {} starting initial reconcile",
            manager.inner.event_bus.instance_id()
        );
        tokio::spawn(manager.start_reconcile());
        manager
    }

    /// Current `(user, loading)` snapshot.
    pub fn get_session(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.inner.policy
    }

    /// Watch the session; the receiver sees every mutation.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Broadcast stream of [`SessionEvent`]s.
    pub fn events(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.inner.event_bus.subscribe()
    }

    /// Resolve once the initial reconciliation has finished.
    pub async fn wait_until_loaded(&self) -> Session {
        let mut rx = self.inner.state.subscribe();
        let loaded = rx.wait_for(|session| !session.loading).await;
        match loaded {
            Ok(session) => session.clone(),
            Err(_) => self.get_session(),
        }
    }

    /// Sync `user` with the identity service.
    ///
    /// Never fails: invalid sessions clear `user`, other errors are reported
    /// and leave it unchanged.
    pub async fn reconcile(&self) {
        if self.inner.is_disposed("reconcile") {
            return;
        }
        self.start_reconcile().await;
    }

    /// Invalidate the remote session, then clear the local one.
    ///
    /// The local session is cleared even if the remote call fails.
    pub async fn logout(&self) {
        if self.inner.is_disposed("logout") {
            return;
        }

        let ticket = self.inner.next_ticket();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.logout_once(ticket).await });

        if let Err(err) = handle.await {
            self.inner.report_task_failure("logout", err);
            self.inner.finish_logout(ticket);
        }
    }

    /// Install an identity obtained elsewhere, e.g. right after login.
    ///
    /// Supersedes any reconcile or logout still waiting on the identity
    /// service.
    pub fn sign_in(&self, identity: Identity) {
        if self.inner.is_disposed("sign_in") {
            return;
        }
        let ticket = self.inner.next_ticket();
        self.inner.last_sign_in.store(ticket, Ordering::SeqCst);
        self.inner.set_user(identity);
    }

    /// End the manager's lifecycle. Later operations are ignored.
    pub fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::SeqCst) {
            log::info!("Session manager disposed");
            self.inner.event_bus.emit(SessionEvent::Disposed);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Take a ticket and spawn the reconcile now; the returned future only
    /// waits for it.
    fn start_reconcile(&self) -> Flight {
        match self.inner.policy {
            ReconcilePolicy::LastWriterWins => self.spawn_flight(),
            ReconcilePolicy::SingleFlight => {
                let mut slot = lock(&self.inner.flight);
                if let Some((ticket, flight)) = slot.as_ref() {
                    // A flight overtaken by sign_in or logout would discard
                    // its result, so it cannot answer this call.
                    if self.inner.is_current(*ticket) {
                        log::debug!("Joining in-flight reconcile (ticket {})", ticket);
                        return flight.clone();
                    }
                }
                // Holding the slot lock here keeps the task's FlightSlotGuard
                // from clearing the slot before it is filled.
                let (ticket, flight) = self.spawn_flight_with_slot();
                *slot = Some((ticket, flight.clone()));
                flight
            }
        }
    }

    fn spawn_flight(&self) -> Flight {
        let ticket = self.inner.next_ticket();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.reconcile_once(ticket).await });
        self.await_task(handle)
    }

    fn spawn_flight_with_slot(&self) -> (u64, Flight) {
        let ticket = self.inner.next_ticket();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let _slot = FlightSlotGuard {
                inner: Arc::clone(&inner),
                ticket,
            };
            inner.reconcile_once(ticket).await;
        });
        (ticket, self.await_task(handle))
    }

    fn await_task(&self, handle: tokio::task::JoinHandle<()>) -> Flight {
        let inner = Arc::clone(&self.inner);
        async move {
            if let Err(err) = handle.await {
                inner.report_task_failure("reconcile", err);
            }
        }
        .boxed()
        .shared()
    }
}
