use crate::credential_store::CredentialStore;
use crate::navigation::Route;
use crate::session::SessionManager;
use std::future::Future;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialRoute {
    Public,
    Protected,
}

impl InitialRoute {
    pub fn route(&self) -> Route {
        match self {
            InitialRoute::Public => Route::public_entry(),
            InitialRoute::Protected => Route::protected_entry(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GateState {
    initial: Option<InitialRoute>,
    assets_ready: bool,
}

/// Holds the navigator back until the initial tier is known and startup
/// assets are loaded.
#[derive(Debug)]
pub struct BootstrapGate {
    state: watch::Sender<GateState>,
}

impl Default for BootstrapGate {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::default());
        BootstrapGate { state }
    }

    fn set_initial(&self, initial: InitialRoute) {
        self.state.send_modify(|s| s.initial = Some(initial));
    }

    fn mark_assets_ready(&self) {
        self.state.send_modify(|s| s.assets_ready = true);
    }

    /// `None` means render nothing yet.
    pub fn view(&self) -> Option<Route> {
        let state = *self.state.borrow();
        match state {
            GateState {
                initial: Some(initial),
                assets_ready: true,
            } => Some(initial.route()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.view().is_some()
    }
}

/// Picks the first route tier on cold start.
pub struct BootstrapResolver<S> {
    session: SessionManager<S>,
}

impl<S: CredentialStore> BootstrapResolver<S> {
    pub fn new(session: SessionManager<S>) -> Self {
        BootstrapResolver { session }
    }

    /// Read errors fall back to the public entry route.
    pub async fn resolve(&self) -> InitialRoute {
        match self.session.check().await {
            Ok(true) => InitialRoute::Protected,
            Ok(false) => InitialRoute::Public,
            Err(e) => {
                tracing::error!("Error checking auth: {}", e);
                InitialRoute::Public
            }
        }
    }

    /// Resolves the initial tier while `assets` loads, opening `gate` once both are done.
    pub async fn prepare<F>(&self, gate: &BootstrapGate, assets: F) -> InitialRoute
    where
        F: Future<Output = ()>,
    {
        let (initial, ()) = tokio::join!(
            async {
                let initial = self.resolve().await;
                gate.set_initial(initial);
                initial
            },
            async {
                assets.await;
                gate.mark_assets_ready();
            }
        );
        tracing::info!("Bootstrap resolved initial route {}", initial.route());
        initial
    }
}
