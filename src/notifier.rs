use notify_rust::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient, user-facing notice (toast).
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        level: NoticeLevel,
        title: &str,
        body: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Prints notices to stderr.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(
        &self,
        level: NoticeLevel,
        title: &str,
        body: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match level {
            NoticeLevel::Info => eprintln!("{}: {}", title, body),
            NoticeLevel::Error => eprintln!("error: {}: {}", title, body),
        }
        Ok(())
    }
}

/// Desktop notification that dismisses itself.
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(
        &self,
        level: NoticeLevel,
        title: &str,
        body: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let icon = match level {
            NoticeLevel::Info => "dialog-information",
            NoticeLevel::Error => "dialog-error",
        };

        let mut notification = Notification::new();
        notification.summary(title).body(body).icon(icon);

        #[cfg(all(unix, not(target_os = "macos")))]
        notification.hint(notify_rust::Hint::Transient(true));

        notification.show().map_err(std::io::Error::other)?;
        Ok(())
    }
}

/// Ignores notifier failures; a toast that can't be shown is only logged.
pub(crate) fn notify_quietly(notifier: &dyn Notifier, level: NoticeLevel, title: &str, body: &str) {
    if let Err(e) = notifier.notify(level, title, body) {
        tracing::warn!("Failed to show notification: {}", e);
    }
}
