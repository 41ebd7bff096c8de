use crate::api_client::{ApiClient, OutcomeBus};
use crate::bootstrap::{BootstrapGate, BootstrapResolver, InitialRoute};
use crate::config::{Config, StorageBackend};
use crate::credential_store::{ConfiguredStore, FileStore, KeyringStore, MemoryStore};
use crate::errors::AppError;
use crate::guard::{GuardState, RouteGuard};
use crate::interceptor::UnauthorizedInterceptor;
use crate::login::LoginFlow;
use crate::navigation::{MemoryNavigator, Navigator, Route};
use crate::notifier::{ConsoleNotifier, DesktopNotifier, Notifier};
use crate::session::SessionManager;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

// A redirect settles in two checks; waiting longer than this means a loop
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

pub type AppSession = SessionManager<ConfiguredStore>;
pub type AppApi = ApiClient<ConfiguredStore>;
pub type AppGuard = RouteGuard<ConfiguredStore, MemoryNavigator>;
pub type AppInterceptor = UnauthorizedInterceptor<ConfiguredStore, MemoryNavigator>;
pub type AppLogin = LoginFlow<AppApi, ConfiguredStore, MemoryNavigator>;

/// Wired application: one of each component, composed explicitly.
pub struct App {
    pub session: AppSession,
    pub navigator: Arc<MemoryNavigator>,
    pub api: Arc<AppApi>,
    pub interceptor: Arc<AppInterceptor>,
    pub guard: Arc<AppGuard>,
    pub login: AppLogin,
    pub gate: BootstrapGate,
    pub initial_route: InitialRoute,
    tasks: Vec<JoinHandle<()>>,
}

pub fn build_store(config: &Config) -> ConfiguredStore {
    match config.storage.backend {
        StorageBackend::Keyring => ConfiguredStore::Keyring(KeyringStore::new(
            &config.storage.service_name,
            config.credentials_file_path(),
        )),
        StorageBackend::File => {
            ConfiguredStore::File(FileStore::new(config.credentials_file_path()))
        }
        StorageBackend::Memory => ConfiguredStore::Memory(MemoryStore::new()),
    }
}

impl App {
    /// Composes the application with no startup assets to wait for.
    pub async fn start(config: &Config) -> Result<App, AppError> {
        Self::start_with_assets(config, std::future::ready(())).await
    }

    pub async fn start_with_assets<F>(config: &Config, assets: F) -> Result<App, AppError>
    where
        F: Future<Output = ()>,
    {
        let store = Arc::new(build_store(config));
        let session = SessionManager::new(store);

        let gate = BootstrapGate::new();
        let initial_route = BootstrapResolver::new(session.clone())
            .prepare(&gate, assets)
            .await;
        let navigator = Arc::new(MemoryNavigator::new(initial_route.route()));

        let outcomes = OutcomeBus::new();
        let api = Arc::new(ApiClient::new(
            config.api_base_url(),
            config.request_timeout(),
            config.api.retry_count,
            session.clone(),
            outcomes.clone(),
        )?);

        let mut tasks = Vec::new();

        let interceptor = Arc::new(UnauthorizedInterceptor::new(
            session.clone(),
            Arc::clone(&navigator),
        ));
        tasks.push(Arc::clone(&interceptor).register(&outcomes));

        let guard = Arc::new(RouteGuard::new(session.clone(), Arc::clone(&navigator)));
        tasks.push(Arc::clone(&guard).watch(navigator.subscribe()));

        let notifier: Arc<dyn Notifier> = if config.notification.desktop {
            Arc::new(DesktopNotifier)
        } else {
            Arc::new(ConsoleNotifier)
        };
        let login = LoginFlow::new(
            Arc::clone(&api),
            session.clone(),
            Arc::clone(&navigator),
            notifier,
        );

        tracing::info!("Application composed, starting on {}", initial_route.route());

        Ok(App {
            session,
            navigator,
            api,
            interceptor,
            guard,
            login,
            gate,
            initial_route,
            tasks,
        })
    }

    /// Pushes `route` and waits for the guard to reach a stable decision.
    pub async fn navigate(&self, route: &Route) -> GuardState {
        self.navigator.push(route);
        self.settle().await
    }

    /// Replaces navigation with the public entry route after clearing the session.
    pub async fn logout(&self) -> Result<GuardState, AppError> {
        self.session.clear().await?;
        self.navigator.replace(&Route::public_entry());
        Ok(self.settle().await)
    }

    /// Asks the guard watcher for a fresh check and waits for a decision on
    /// the route navigation is still on.
    pub async fn settle(&self) -> GuardState {
        let mut decisions = self.guard.decisions();
        let segments = self.navigator.subscribe();
        let seen = self.guard.request_check();

        let settled = tokio::time::timeout(
            SETTLE_TIMEOUT,
            decisions.wait_for(|decision| {
                decision
                    .as_ref()
                    .is_some_and(|d| d.ticket > seen && d.segments == *segments.borrow())
            }),
        )
        .await;

        match settled {
            Ok(Ok(decision)) => match decision.as_ref() {
                Some(decision) => decision.state.clone(),
                None => self.guard.state(),
            },
            _ => {
                tracing::warn!("Route guard did not settle within {:?}", SETTLE_TIMEOUT);
                self.guard.state()
            }
        }
    }

    pub fn current_route(&self) -> Route {
        self.navigator
            .current_route()
            .unwrap_or_else(|| Route::from_segments(self.navigator.subscribe().borrow().clone()))
    }

    pub fn current_pathname(&self) -> String {
        self.navigator.current_pathname()
    }
}

impl Drop for App {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;
    use crate::guard::GuardView;
    use secrecy::SecretString;

    fn memory_config() -> Config {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        config
    }

    #[tokio::test]
    async fn test_cold_start_without_session_lands_on_public_entry() {
        let app = App::start(&memory_config()).await.unwrap();

        assert_eq!(app.initial_route, InitialRoute::Public);
        assert_eq!(app.gate.view(), Some(Route::public_entry()));
        assert_eq!(app.current_pathname(), "/login");
    }

    #[tokio::test]
    async fn test_navigate_to_protected_route_without_session() {
        let app = App::start(&memory_config()).await.unwrap();

        let state = app.navigate(&Route::parse("/(app)/projects")).await;

        assert_eq!(state, GuardState::Unauthorized);
        assert_eq!(app.current_pathname(), "/login");
        assert_eq!(app.guard.view(), GuardView::Content);
    }

    #[tokio::test]
    async fn test_navigate_redirects_once() {
        let app = App::start(&memory_config()).await.unwrap();

        app.navigate(&Route::parse("/(app)/projects")).await;
        app.navigate(&Route::parse("/(app)/reports")).await;

        assert_eq!(
            app.navigator.replacements(),
            vec![Route::public_entry(), Route::public_entry()]
        );
        assert_eq!(app.current_pathname(), "/login");
    }

    #[tokio::test]
    async fn test_logged_in_user_is_moved_off_public_entry() {
        let app = App::start(&memory_config()).await.unwrap();
        app.session
            .establish(
                &SecretString::new("abc".to_string()),
                &crate::models::UserProfile::new(false),
            )
            .await
            .unwrap();

        let state = app.settle().await;

        assert_eq!(state, GuardState::Authorized);
        assert_eq!(app.current_route(), Route::protected_entry());
    }

    #[tokio::test]
    async fn test_logout_returns_to_public_entry() {
        let app = App::start(&memory_config()).await.unwrap();
        app.session
            .establish(
                &SecretString::new("abc".to_string()),
                &crate::models::UserProfile::new(false),
            )
            .await
            .unwrap();
        app.navigate(&Route::parse("/(app)/projects")).await;

        let state = app.logout().await.unwrap();

        assert_eq!(state, GuardState::Unauthorized);
        assert!(!app.session.is_valid().await);
        assert!(!app.navigator.back());
    }
}
