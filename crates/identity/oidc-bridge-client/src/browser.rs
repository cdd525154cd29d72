//! Browser collaborators: location/history and session storage.
//!
//! The controller and the OIDC client only talk to the page through these
//! traits. `wasm32` builds get `web-sys` implementations in the `web` module.

use dashmap::DashMap;

use crate::error::ClientResult;

/// The parts of `window.location` and `window.history` the bridge needs.
pub trait Browser: Send + Sync {
    /// Full current URL (`location.href`).
    fn href(&self) -> ClientResult<String>;

    /// Path of the current URL (`location.pathname`).
    fn pathname(&self) -> ClientResult<String>;

    /// Scheme, host and port of the current page (`location.origin`).
    fn origin(&self) -> ClientResult<String>;

    /// Replaces the current history entry without reloading (`history.replaceState`).
    fn replace_history(&self, url: &str) -> ClientResult<()>;

    /// Top-level navigation away from the page (`location.assign`).
    fn navigate(&self, url: &str) -> ClientResult<()>;
}

/// String key/value storage scoped to the browser tab (`sessionStorage`).
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> ClientResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> ClientResult<()>;

    fn remove(&self, key: &str) -> ClientResult<()>;

    fn keys(&self) -> ClientResult<Vec<String>>;
}

/// In-memory [`SessionStore`], for native hosts and tests.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: DashMap<String, String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.entries.get(key).map(|value| value.clone()))
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> ClientResult<Vec<String>> {
        Ok(self.entries.iter().map(|entry| entry.key().clone()).collect())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// A page that records history replacements and navigations instead of performing them.
    pub struct FakeBrowser {
        origin: String,
        href: Mutex<String>,
        replaced: Mutex<Vec<String>>,
        navigations: Mutex<Vec<String>>,
    }

    impl FakeBrowser {
        pub fn at(href: &str) -> Self {
            let url = url::Url::parse(href).unwrap();
            Self {
                origin: url.origin().ascii_serialization(),
                href: Mutex::new(href.to_string()),
                replaced: Mutex::new(Vec::new()),
                navigations: Mutex::new(Vec::new()),
            }
        }

        /// Simulates the provider sending the browser back to `href`.
        pub fn go_to(&self, href: &str) {
            *self.href.lock().unwrap() = href.to_string();
        }

        pub fn navigations(&self) -> Vec<String> {
            self.navigations.lock().unwrap().clone()
        }

        pub fn replaced(&self) -> Vec<String> {
            self.replaced.lock().unwrap().clone()
        }
    }

    impl Browser for FakeBrowser {
        fn href(&self) -> ClientResult<String> {
            Ok(self.href.lock().unwrap().clone())
        }

        fn pathname(&self) -> ClientResult<String> {
            let href = self.href()?;
            Ok(url::Url::parse(&href)?.path().to_string())
        }

        fn origin(&self) -> ClientResult<String> {
            Ok(self.origin.clone())
        }

        fn replace_history(&self, url: &str) -> ClientResult<()> {
            let resolved = url::Url::parse(&self.origin)?.join(url)?;
            *self.href.lock().unwrap() = resolved.to_string();
            self.replaced.lock().unwrap().push(url.to_string());
            Ok(())
        }

        fn navigate(&self, url: &str) -> ClientResult<()> {
            self.navigations.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }
}
