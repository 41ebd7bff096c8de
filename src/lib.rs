pub mod api_client;
pub mod app;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod credential_store;
pub mod errors;
pub mod guard;
pub mod interceptor;
pub mod logger;
pub mod login;
pub mod models;
pub mod navigation;
pub mod notifier;
pub mod session;

pub use api_client::{ApiClient, AuthApi, OperationOutcome, OutcomeBus};
pub use app::App;
pub use config::Config;
pub use credential_store::{CredentialStore, FileStore, KeyringStore, MemoryStore};
pub use errors::{AppError, ApiError, ErrorClass, LoginError, StoreError};
pub use guard::{GuardState, GuardView, RouteGuard};
pub use interceptor::UnauthorizedInterceptor;
pub use models::{AuthResult, LoginCredentials, UserProfile};
pub use navigation::{AccessTier, MemoryNavigator, Navigator, Route};
pub use session::SessionManager;
