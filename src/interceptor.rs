use crate::api_client::{OperationOutcome, OutcomeBus, OutcomeResult};
use crate::credential_store::CredentialStore;
use crate::navigation::{Navigator, PUBLIC_ENTRY_PATHNAME, Route};
use crate::session::SessionManager;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptAction {
    /// Not an authentication failure.
    Ignored,
    /// Already on the public entry route; nothing to do.
    AlreadyOnPublicEntry,
    /// Session cleared and navigation replaced with the public entry route.
    Redirected,
}

/// Reacts to 401/403 outcomes from any network operation by logging the
/// user out and sending them to the public entry route.
pub struct UnauthorizedInterceptor<S, N> {
    session: SessionManager<S>,
    navigator: Arc<N>,
    // Held across clear+redirect so near-simultaneous failures collapse into one
    gate: Mutex<()>,
}

impl<S, N> UnauthorizedInterceptor<S, N>
where
    S: CredentialStore + 'static,
    N: Navigator + 'static,
{
    pub fn new(session: SessionManager<S>, navigator: Arc<N>) -> Self {
        UnauthorizedInterceptor {
            session,
            navigator,
            gate: Mutex::new(()),
        }
    }

    pub async fn handle(&self, outcome: &OperationOutcome) -> InterceptAction {
        if !outcome.is_authentication_failure() {
            return InterceptAction::Ignored;
        }

        if let OutcomeResult::Failure {
            status, message, ..
        } = &outcome.result
        {
            tracing::error!(
                "Operation {} failed with an authentication error (status {:?}): {}",
                outcome.operation,
                status,
                message
            );
        }

        let _guard = self.gate.lock().await;

        // Whoever got here first has already moved us to the public entry route
        if self.navigator.current_pathname() == PUBLIC_ENTRY_PATHNAME {
            tracing::debug!("Already on {}, skipping redirect", PUBLIC_ENTRY_PATHNAME);
            return InterceptAction::AlreadyOnPublicEntry;
        }

        if let Err(e) = self.session.clear().await {
            tracing::error!("Error during logout process: {}", e);
        }

        tracing::info!("Session rejected by server, redirecting to {}", PUBLIC_ENTRY_PATHNAME);
        self.navigator.replace(&Route::public_entry());
        InterceptAction::Redirected
    }

    /// Subscribes to `bus` and handles every outcome until the bus closes.
    ///
    /// Call once during startup composition.
    pub fn register(self: Arc<Self>, bus: &OutcomeBus) -> JoinHandle<()> {
        let mut outcomes = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match outcomes.recv().await {
                    Ok(outcome) => {
                        self.handle(&outcome).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Unauthorized interceptor lagged, skipped {} outcomes", skipped);
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("Outcome bus closed, unauthorized interceptor stopping");
                        break;
                    }
                }
            }
        })
    }
}
