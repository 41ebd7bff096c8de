use crate::api_client::AuthApi;
use crate::credential_store::CredentialStore;
use crate::errors::{ApiError, LoginError, ValidationErrors};
use crate::models::LoginCredentials;
use crate::navigation::{Navigator, Route};
use crate::notifier::{NoticeLevel, Notifier, notify_quietly};
use crate::session::SessionManager;
use secrecy::ExposeSecret;
use std::sync::Arc;

pub const MIN_PASSWORD_LENGTH: usize = 6;

pub fn validate(credentials: &LoginCredentials) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if !is_valid_email(&credentials.email) {
        errors.add("email", "Invalid email address");
    }
    if credentials.password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
        errors.add("password", "Password must be at least 6 characters");
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|l| !l.is_empty() && !l.starts_with('-') && !l.ends_with('-'))
        && labels.last().is_some_and(|tld| tld.len() >= 2)
}

/// Login screen behavior minus the rendering.
pub struct LoginFlow<A, S, N> {
    api: Arc<A>,
    session: SessionManager<S>,
    navigator: Arc<N>,
    notifier: Arc<dyn Notifier>,
}

impl<A, S, N> LoginFlow<A, S, N>
where
    A: AuthApi,
    S: CredentialStore,
    N: Navigator,
{
    pub fn new(
        api: Arc<A>,
        session: SessionManager<S>,
        navigator: Arc<N>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        LoginFlow {
            api,
            session,
            navigator,
            notifier,
        }
    }

    /// Validates, logs in, stores the session and moves to the protected entry route.
    ///
    /// Validation errors are returned without touching the network. Any other
    /// failure is also shown as a transient notice and leaves the session as it was.
    pub async fn submit(&self, credentials: &LoginCredentials) -> Result<(), LoginError> {
        validate(credentials).map_err(LoginError::Validation)?;

        let auth = match self.api.login(credentials).await {
            Ok(auth) => auth,
            Err(e) => {
                tracing::error!("Login error: {}", e);
                notify_quietly(
                    self.notifier.as_ref(),
                    NoticeLevel::Error,
                    "Login failed",
                    &failure_message(&e),
                );
                return Err(e.into());
            }
        };

        // Navigation waits for every session write
        if let Err(e) = self.session.establish(&auth.token, &auth.user).await {
            tracing::error!("Failed to store session after login: {}", e);
            notify_quietly(
                self.notifier.as_ref(),
                NoticeLevel::Error,
                "Login failed",
                &e.to_string(),
            );
            return Err(e.into());
        }

        tracing::info!("Login succeeded for {}", credentials.email);
        self.navigator.replace(&Route::protected_entry());
        Ok(())
    }
}

fn failure_message(error: &ApiError) -> String {
    match error {
        ApiError::Status { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential_store::MemoryStore;
    use crate::models::{AuthResult, UserProfile};
    use crate::navigation::MemoryNavigator;
    use secrecy::SecretString;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeApi {
        calls: AtomicUsize,
        status: Option<u16>,
    }

    impl FakeApi {
        fn accepting() -> Self {
            FakeApi {
                calls: AtomicUsize::new(0),
                status: None,
            }
        }

        fn rejecting(status: u16) -> Self {
            FakeApi {
                calls: AtomicUsize::new(0),
                status: Some(status),
            }
        }
    }

    impl AuthApi for FakeApi {
        async fn login(&self, _credentials: &LoginCredentials) -> Result<AuthResult, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.status {
                None => Ok(AuthResult {
                    token: SecretString::new("Bearer t1".to_string()),
                    user: UserProfile::new(true),
                }),
                Some(status) => Err(ApiError::Status {
                    status,
                    message: "Invalid email or password".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<(NoticeLevel, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(
            &self,
            level: NoticeLevel,
            _title: &str,
            body: &str,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.notices.lock().unwrap().push((level, body.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        flow: LoginFlow<FakeApi, MemoryStore, MemoryNavigator>,
        api: Arc<FakeApi>,
        session: SessionManager<MemoryStore>,
        navigator: Arc<MemoryNavigator>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(api: FakeApi) -> Fixture {
        let api = Arc::new(api);
        let session = SessionManager::new(Arc::new(MemoryStore::new()));
        let navigator = Arc::new(MemoryNavigator::new(Route::public_entry()));
        let notifier = Arc::new(RecordingNotifier::default());
        let flow = LoginFlow::new(
            Arc::clone(&api),
            session.clone(),
            Arc::clone(&navigator),
            notifier.clone(),
        );
        Fixture {
            flow,
            api,
            session,
            navigator,
            notifier,
        }
    }

    #[test]
    fn test_validate_accepts_good_input() {
        assert!(validate(&LoginCredentials::new("eng@site.example.com", "secret1")).is_ok());
    }

    #[test]
    fn test_validate_reports_each_field() {
        let errors = validate(&LoginCredentials::new("not-an-email", "123")).unwrap_err();
        assert_eq!(errors.get("email"), Some("Invalid email address"));
        assert_eq!(
            errors.get("password"),
            Some("Password must be at least 6 characters")
        );
    }

    #[test]
    fn test_email_shapes() {
        for bad in ["", "a@", "@b.com", "a@b", "a b@c.com", "a@b@c.com", "a@.com", "a@b.c"] {
            assert!(!is_valid_email(bad), "{} should be rejected", bad);
        }
        assert!(is_valid_email("first.last+tag@example.co"));
    }

    #[tokio::test]
    async fn test_successful_login_stores_session_then_navigates() {
        let f = fixture(FakeApi::accepting());

        f.flow
            .submit(&LoginCredentials::new("eng@example.com", "secret1"))
            .await
            .unwrap();

        assert!(f.session.is_valid().await);
        assert!(f.session.is_auto_reference().await.unwrap());
        assert_eq!(f.navigator.replacements(), vec![Route::protected_entry()]);
        assert!(f.notifier.notices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_skips_network() {
        let f = fixture(FakeApi::accepting());

        let err = f
            .flow
            .submit(&LoginCredentials::new("eng", "secret1"))
            .await
            .unwrap_err();

        assert!(matches!(err, LoginError::Validation(_)));
        assert_eq!(f.api.calls.load(Ordering::SeqCst), 0);
        assert!(f.navigator.replacements().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_login_shows_server_message() {
        let f = fixture(FakeApi::rejecting(401));

        let err = f
            .flow
            .submit(&LoginCredentials::new("eng@example.com", "secret1"))
            .await
            .unwrap_err();

        assert!(matches!(err, LoginError::Api(_)));
        assert!(!f.session.is_valid().await);
        assert!(f.navigator.replacements().is_empty());
        assert_eq!(
            *f.notifier.notices.lock().unwrap(),
            vec![(NoticeLevel::Error, "Invalid email or password".to_string())]
        );
    }
}
