//! Route guard state machine.
//!
//! Every change to the active segment list starts a new check:
//!
//! ```text
//!            segments changed
//!   any ───────────────────────▶ Checking
//!                                   │ session check
//!          ┌────────────────────────┼──────────────────────┐
//!          ▼                        ▼                      ▼
//!     Authorized              Unauthorized               Error
//! ```
//!
//! Checks cannot be cancelled. Each one takes a generation ticket and is
//! tagged with the segment list it evaluated. Its decision is only applied if
//! no newer check has started and navigation is still on that segment list.

use crate::credential_store::CredentialStore;
use crate::navigation::{AccessTier, Navigator, Route};
use crate::session::SessionManager;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

pub const GUARD_ERROR_MESSAGE: &str = "Failed to initialize app. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    Authorized,
    Unauthorized,
    Error(String),
}

/// What the guarded area may show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardView {
    /// Blocking loading indicator, nothing else.
    Loading,
    ErrorMessage(String),
    /// The matched route's content.
    Content,
}

impl GuardState {
    pub fn view(&self) -> GuardView {
        match self {
            GuardState::Checking => GuardView::Loading,
            GuardState::Error(message) => GuardView::ErrorMessage(message.clone()),
            GuardState::Authorized | GuardState::Unauthorized => GuardView::Content,
        }
    }
}

/// The last applied check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub ticket: u64,
    pub segments: Vec<String>,
    pub state: GuardState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Applied(GuardState),
    /// A newer check started, or navigation moved, before this one completed;
    /// its decision was dropped.
    Superseded,
    /// Empty segment list: nothing is matched yet.
    Skipped,
}

pub struct RouteGuard<S, N> {
    session: SessionManager<S>,
    navigator: Arc<N>,
    generation: AtomicU64,
    // Serializes the staleness check with applying the decision
    apply_lock: Mutex<()>,
    state: watch::Sender<GuardState>,
    decisions: watch::Sender<Option<Decision>>,
    refresh: Notify,
}

impl<S, N> RouteGuard<S, N>
where
    S: CredentialStore + 'static,
    N: Navigator + 'static,
{
    pub fn new(session: SessionManager<S>, navigator: Arc<N>) -> Self {
        let (state, _) = watch::channel(GuardState::Checking);
        let (decisions, _) = watch::channel(None);
        RouteGuard {
            session,
            navigator,
            generation: AtomicU64::new(0),
            apply_lock: Mutex::new(()),
            state,
            decisions,
            refresh: Notify::new(),
        }
    }

    pub fn state(&self) -> GuardState {
        self.state.borrow().clone()
    }

    pub fn view(&self) -> GuardView {
        self.state.borrow().view()
    }

    pub fn subscribe(&self) -> watch::Receiver<GuardState> {
        self.state.subscribe()
    }

    pub fn decisions(&self) -> watch::Receiver<Option<Decision>> {
        self.decisions.subscribe()
    }

    /// Asks the running watcher to check the current segment list again, for
    /// when the session changed without navigation.
    ///
    /// Returns the last ticket handed out; the requested check gets a newer one.
    pub fn request_check(&self) -> u64 {
        let seen = self.generation.load(Ordering::SeqCst);
        self.refresh.notify_one();
        seen
    }

    /// Runs one check for `segments` and applies the result unless superseded.
    pub async fn evaluate(&self, segments: Vec<String>) -> Evaluation {
        if segments.is_empty() {
            return Evaluation::Skipped;
        }

        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(GuardState::Checking);
        tracing::debug!("Route guard checking {:?} (check #{})", segments, ticket);

        let logged_in = self.session.check().await;

        let _apply = match self.apply_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.generation.load(Ordering::SeqCst) != ticket {
            tracing::debug!("Route guard check #{} superseded, discarding", ticket);
            return Evaluation::Superseded;
        }
        if *self.navigator.subscribe().borrow() != segments {
            tracing::debug!(
                "Route guard check #{} was for {:?}, navigation has moved on",
                ticket,
                segments
            );
            return Evaluation::Superseded;
        }

        let next = match logged_in {
            Ok(logged_in) => self.reconcile(logged_in, AccessTier::of(&segments)),
            Err(e) => {
                // No redirect: storage that can't be read would loop forever
                tracing::error!("Error checking authentication: {}", e);
                GuardState::Error(GUARD_ERROR_MESSAGE.to_string())
            }
        };

        tracing::debug!("Route guard check #{} -> {:?}", ticket, next);
        self.state.send_replace(next.clone());
        self.decisions.send_replace(Some(Decision {
            ticket,
            segments,
            state: next.clone(),
        }));
        Evaluation::Applied(next)
    }

    fn reconcile(&self, logged_in: bool, tier: AccessTier) -> GuardState {
        match (logged_in, tier) {
            (false, AccessTier::Protected) => {
                tracing::info!("Not logged in, redirecting to public entry");
                self.navigator.replace(&Route::public_entry());
                GuardState::Unauthorized
            }
            (true, AccessTier::Public) => {
                tracing::info!("Already logged in, redirecting to protected entry");
                self.navigator.replace(&Route::protected_entry());
                GuardState::Authorized
            }
            (true, AccessTier::Protected) => GuardState::Authorized,
            (false, AccessTier::Public) => GuardState::Unauthorized,
        }
    }

    /// Evaluates the current segment list, then again on every change or
    /// [`request_check`](Self::request_check), for as long as the sender side lives.
    pub fn watch(self: Arc<Self>, mut segments: watch::Receiver<Vec<String>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let current = segments.borrow_and_update().clone();
                let guard = Arc::clone(&self);
                // Checks overlap; staleness is resolved inside evaluate
                tokio::spawn(async move {
                    guard.evaluate(current).await;
                });
                tokio::select! {
                    changed = segments.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = self.refresh.notified() => {
                        tracing::debug!("Route guard re-check requested");
                    }
                }
            }
        })
    }
}
