//! Client-side location handling and the central route protection table.

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    Auth,
    Protected,
}

#[derive(Debug, Clone)]
struct RouteRule {
    segments: Vec<String>,
    class: RouteClass,
}

/// Maps client route patterns to a protection class. Rules are consulted in
/// declaration order and the first match wins; unmatched paths are public.
///
/// Pattern segments are literals, `*` (exactly one segment) or `**` (any
/// number of segments, including none) in any position.
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
    login_path: String,
}

impl RouteTable {
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            login_path: login_path.into(),
        }
    }

    pub fn rule(mut self, pattern: &str, class: RouteClass) -> Self {
        self.rules.push(RouteRule {
            segments: segments(pattern).map(str::to_string).collect(),
            class,
        });
        self
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        let path: Vec<&str> = segments(strip_query(path)).collect();
        self.rules
            .iter()
            .find(|rule| matches(&rule.segments, &path))
            .map(|rule| rule.class)
            .unwrap_or(RouteClass::Public)
    }

    pub fn requires_session(&self, path: &str) -> bool {
        self.classify(path) == RouteClass::Protected
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        RouteTable::new("/login")
            .rule("/login", RouteClass::Auth)
            .rule("/register", RouteClass::Auth)
            .rule("/**/admin/**", RouteClass::Protected)
            .rule("/**/profile/**", RouteClass::Protected)
            .rule("/**/orders/**", RouteClass::Protected)
            .rule("/**/checkout/**", RouteClass::Protected)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

fn matches(pattern: &[String], path: &[&str]) -> bool {
    match (pattern.split_first(), path.split_first()) {
        (Some((head, rest)), _) if head == "**" => {
            matches(rest, path)
                || path
                    .split_first()
                    .is_some_and(|(_, path_rest)| matches(pattern, path_rest))
        }
        (Some((head, rest)), Some((segment, path_rest))) => {
            (head == "*" || head == segment) && matches(rest, path_rest)
        }
        (None, None) => true,
        _ => false,
    }
}

/// Current client location and the ability to force a full navigation.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;

    /// Replace the current location with a full (non in-app) navigation,
    /// discarding any in-memory client state.
    fn replace(&self, path: &str);
}

#[derive(Debug, Default)]
struct LocationState {
    path: String,
    forced: Vec<String>,
}

/// In-process location holder.
#[derive(Debug, Clone, Default)]
pub struct Location {
    inner: Arc<Mutex<LocationState>>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LocationState {
                path: path.into(),
                forced: Vec::new(),
            })),
        }
    }

    /// In-app navigation.
    pub fn set(&self, path: impl Into<String>) {
        self.state().path = path.into();
    }

    /// Full navigations forced through [`Navigator::replace`], oldest first.
    pub fn forced_navigations(&self) -> Vec<String> {
        self.state().forced.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LocationState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Navigator for Location {
    fn current_path(&self) -> String {
        let path = self.state().path.clone();
        if path.is_empty() {
            "/".to_string()
        } else {
            path
        }
    }

    fn replace(&self, path: &str) {
        let mut state = self.state();
        state.path = path.to_string();
        state.forced.push(path.to_string());
    }
}
