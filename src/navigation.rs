//! Route model and the navigation layer seam.
//!
//! Routes are addressed by group-qualified hrefs such as `/(app)/projects/7`.
//! The first segment names the route group, which decides the access tier;
//! group segments are dropped from the pathname (`/projects/7`).

use std::fmt;
use std::sync::{Mutex, RwLock};
use tokio::sync::watch;

pub const PUBLIC_GROUP: &str = "(auth)";
pub const PROTECTED_GROUP: &str = "(app)";

pub const PUBLIC_ENTRY_HREF: &str = "/(auth)/login";
pub const PROTECTED_ENTRY_HREF: &str = "/(app)";
pub const PUBLIC_ENTRY_PATHNAME: &str = "/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTier {
    Public,
    Protected,
}

impl AccessTier {
    pub fn of(segments: &[String]) -> AccessTier {
        match segments.first() {
            Some(first) if first == PROTECTED_GROUP => AccessTier::Protected,
            _ => AccessTier::Public,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    segments: Vec<String>,
}

impl Route {
    pub fn parse(href: &str) -> Route {
        let segments = href
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Route { segments }
    }

    pub fn from_segments(segments: Vec<String>) -> Route {
        Route { segments }
    }

    pub fn public_entry() -> Route {
        Route::parse(PUBLIC_ENTRY_HREF)
    }

    pub fn protected_entry() -> Route {
        Route::parse(PROTECTED_ENTRY_HREF)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn tier(&self) -> AccessTier {
        AccessTier::of(&self.segments)
    }

    pub fn pathname(&self) -> String {
        let visible: Vec<&str> = self
            .segments
            .iter()
            .filter(|s| !is_group(s))
            .map(String::as_str)
            .collect();
        format!("/{}", visible.join("/"))
    }

    pub fn is_public_entry(&self) -> bool {
        self.pathname() == PUBLIC_ENTRY_PATHNAME
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

fn is_group(segment: &str) -> bool {
    segment.starts_with('(') && segment.ends_with(')')
}

/// Navigation layer the core drives.
pub trait Navigator: Send + Sync {
    /// Redirect without leaving the previous routes in back-history.
    ///
    /// Once this returns, [`current_pathname`](Self::current_pathname) must
    /// report the new route.
    fn replace(&self, route: &Route);

    /// Pathname of the last rendered route.
    fn current_pathname(&self) -> String;

    /// Fires on every change to the active segment list.
    fn subscribe(&self) -> watch::Receiver<Vec<String>>;
}

/// Single slot holding the active pathname.
///
/// Only the navigation-observation path writes it; everything else reads.
#[derive(Debug)]
pub struct PathnameTracker {
    current: RwLock<String>,
}

impl PathnameTracker {
    pub fn new(initial: &str) -> Self {
        PathnameTracker {
            current: RwLock::new(initial.to_string()),
        }
    }

    pub(crate) fn record(&self, pathname: String) {
        match self.current.write() {
            Ok(mut current) => *current = pathname,
            Err(poisoned) => *poisoned.into_inner() = pathname,
        }
    }

    pub fn get(&self) -> String {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationAction {
    Push(Route),
    Replace(Route),
}

/// In-process navigation stack.
#[derive(Debug)]
pub struct MemoryNavigator {
    stack: Mutex<Vec<Route>>,
    history: Mutex<Vec<NavigationAction>>,
    pathname: PathnameTracker,
    segments: watch::Sender<Vec<String>>,
}

impl MemoryNavigator {
    /// Starts on `initial` without emitting an action.
    pub fn new(initial: Route) -> Self {
        let (segments, _) = watch::channel(initial.segments().to_vec());
        MemoryNavigator {
            pathname: PathnameTracker::new(&initial.pathname()),
            stack: Mutex::new(vec![initial]),
            history: Mutex::new(Vec::new()),
            segments,
        }
    }

    /// User-initiated navigation; keeps the current route in back-history.
    pub fn push(&self, route: &Route) {
        if let Ok(mut stack) = self.stack.lock() {
            stack.push(route.clone());
        }
        self.record(NavigationAction::Push(route.clone()));
        self.observe(route);
    }

    /// Pops one route. Returns `false` at the bottom of the stack.
    pub fn back(&self) -> bool {
        let previous = match self.stack.lock() {
            Ok(mut stack) if stack.len() > 1 => {
                stack.pop();
                stack.last().cloned()
            }
            _ => None,
        };
        match previous {
            Some(route) => {
                self.observe(&route);
                true
            }
            None => false,
        }
    }

    pub fn current_route(&self) -> Option<Route> {
        self.stack.lock().ok().and_then(|s| s.last().cloned())
    }

    pub fn history(&self) -> Vec<NavigationAction> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn replacements(&self) -> Vec<Route> {
        self.history()
            .into_iter()
            .filter_map(|action| match action {
                NavigationAction::Replace(route) => Some(route),
                NavigationAction::Push(_) => None,
            })
            .collect()
    }

    fn record(&self, action: NavigationAction) {
        if let Ok(mut history) = self.history.lock() {
            history.push(action);
        }
    }

    fn observe(&self, route: &Route) {
        self.pathname.record(route.pathname());
        self.segments.send_replace(route.segments().to_vec());
    }
}

impl Navigator for MemoryNavigator {
    fn replace(&self, route: &Route) {
        if let Ok(mut stack) = self.stack.lock() {
            stack.clear();
            stack.push(route.clone());
        }
        tracing::debug!("Navigation replaced with {}", route);
        self.record(NavigationAction::Replace(route.clone()));
        self.observe(route);
    }

    fn current_pathname(&self) -> String {
        self.pathname.get()
    }

    fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.segments.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group_qualified_href() {
        let route = Route::parse("/(app)/projects/7");
        assert_eq!(route.segments(), &["(app)", "projects", "7"]);
        assert_eq!(route.pathname(), "/projects/7");
        assert_eq!(route.tier(), AccessTier::Protected);
    }

    #[test]
    fn test_entry_routes() {
        let public = Route::public_entry();
        assert_eq!(public.pathname(), PUBLIC_ENTRY_PATHNAME);
        assert_eq!(public.tier(), AccessTier::Public);
        assert!(public.is_public_entry());

        let protected = Route::protected_entry();
        assert_eq!(protected.pathname(), "/");
        assert_eq!(protected.tier(), AccessTier::Protected);
        assert!(!protected.is_public_entry());
    }

    #[test]
    fn test_tier_is_decided_by_first_segment_only() {
        assert_eq!(Route::parse("/(auth)/(app)").tier(), AccessTier::Public);
        assert_eq!(Route::parse("/settings").tier(), AccessTier::Public);
        assert_eq!(AccessTier::of(&[]), AccessTier::Public);
    }

    #[test]
    fn test_replace_drops_back_history() {
        let navigator = MemoryNavigator::new(Route::protected_entry());
        navigator.push(&Route::parse("/(app)/projects"));
        navigator.push(&Route::parse("/(app)/projects/7"));

        navigator.replace(&Route::public_entry());

        assert_eq!(navigator.current_pathname(), "/login");
        assert!(!navigator.back());
        assert_eq!(navigator.replacements(), vec![Route::public_entry()]);
    }

    #[test]
    fn test_push_and_back_update_pathname_and_segments() {
        let navigator = MemoryNavigator::new(Route::protected_entry());
        let rx = navigator.subscribe();

        navigator.push(&Route::parse("/(app)/reports"));
        assert_eq!(navigator.current_pathname(), "/reports");
        assert_eq!(*rx.borrow(), vec!["(app)", "reports"]);

        assert!(navigator.back());
        assert_eq!(navigator.current_pathname(), "/");
        assert_eq!(*rx.borrow(), vec!["(app)"]);
    }
}
