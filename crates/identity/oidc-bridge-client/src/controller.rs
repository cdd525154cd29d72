//! Redirect-login controller for a protected area of the application.
//!
//! On every auth-state notification the controller decides what the protected
//! area shows and whether a provider round trip has to start (unauthenticated)
//! or finish (the page is the redirect URI). A redirect is started at most once
//! per controller, however many notifications arrive while the browser is
//! leaving the page.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_signals::signal::{Mutable, MutableSignalCloned};
use oidc_bridge_core::ConfigurationError;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::adapter::IdentityClient;
use crate::browser::Browser;
use crate::error::ClientResult;
use crate::state::{AuthState, AuthStateListener, Subscription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Checking,
    Redirecting,
    CallbackHandling,
    Authenticated,
    Failed(String),
}

/// What the protected area renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Placeholder while the session is resolved or a redirect is under way
    Loading,
    Protected,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Redirect { original_uri: String },
    HandleCallback { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub view: View,
    pub action: Option<Action>,
}

impl Reaction {
    fn render(view: View) -> Self {
        Self { view, action: None }
    }
}

pub type Render = Arc<dyn Fn(View) + Send + Sync>;

/// Flips from unset to set exactly once.
#[derive(Debug, Default)]
struct OneShotLatch(AtomicBool);

impl OneShotLatch {
    /// Returns `true` only for the call that set the latch.
    fn set(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

pub struct RedirectAuthController {
    client: Arc<dyn IdentityClient>,
    browser: Arc<dyn Browser>,
    redirect_uri: String,
    default_original_uri: String,
    redirect_started: OneShotLatch,
    callback_started: OneShotLatch,
    phase: Mutable<Phase>,
}

impl RedirectAuthController {
    /// Fails when the client has no redirect URI configured.
    pub fn new(
        client: Arc<dyn IdentityClient>,
        browser: Arc<dyn Browser>,
    ) -> Result<Self, ConfigurationError> {
        let config = client.config();
        config.redirect_url()?;
        let redirect_uri = config.redirect_uri.clone().unwrap_or_default();
        let default_original_uri = config.default_original_uri.clone();

        Ok(Self {
            client,
            browser,
            redirect_uri,
            default_original_uri,
            redirect_started: OneShotLatch::default(),
            callback_started: OneShotLatch::default(),
            phase: Mutable::new(Phase::Uninitialized),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase.get_cloned()
    }

    pub fn phase_signal(&self) -> MutableSignalCloned<Phase> {
        self.phase.signal_cloned()
    }

    fn on_callback_page(&self) -> bool {
        match self.browser.href() {
            Ok(href) => href.starts_with(&self.redirect_uri),
            Err(e) => {
                warn!("Could not read current location: {}", e);
                false
            }
        }
    }

    fn current_relative_url(&self) -> String {
        let relative = self
            .browser
            .href()
            .ok()
            .zip(self.browser.origin().ok())
            .and_then(|(href, origin)| to_relative_url(&href, &origin));

        match relative {
            Some(relative) => relative,
            None => self
                .browser
                .pathname()
                .unwrap_or_else(|_| self.default_original_uri.clone()),
        }
    }

    /// Decides the view and the side effect for one auth-state notification.
    pub fn react(&self, state: Option<&AuthState>) -> Reaction {
        if let Phase::Failed(message) = self.phase() {
            return Reaction::render(View::Failed(message));
        }

        let Some(state) = state else {
            if self.phase() == Phase::Uninitialized {
                self.phase.set(Phase::Checking);
            }
            return Reaction::render(View::Loading);
        };

        if self.on_callback_page() {
            if self.callback_started.set() {
                self.phase.set(Phase::CallbackHandling);
                let url = self.browser.href().unwrap_or_else(|_| self.redirect_uri.clone());
                return Reaction {
                    view: View::Loading,
                    action: Some(Action::HandleCallback { url }),
                };
            }

            // The callback page stays hidden until the original URI is restored.
            let view = if state.is_authenticated && self.phase() == Phase::Authenticated {
                View::Protected
            } else {
                View::Loading
            };
            return Reaction::render(view);
        }

        if state.is_authenticated {
            self.phase.set(Phase::Authenticated);
            return Reaction::render(View::Protected);
        }

        if !self.redirect_started.set() {
            debug!("Redirect already in progress");
            return Reaction::render(View::Loading);
        }

        self.phase.set(Phase::Redirecting);
        Reaction {
            view: View::Loading,
            action: Some(Action::Redirect {
                original_uri: self.current_relative_url(),
            }),
        }
    }

    pub async fn perform(&self, action: Action) -> ClientResult<()> {
        match action {
            Action::Redirect { original_uri } => {
                info!("Not authenticated, redirecting to sign in");
                self.client.sign_in_with_redirect(Some(&original_uri)).await
            }
            Action::HandleCallback { url } => {
                let original_uri = self.client.handle_callback(&url).await?;
                let restored = restore_original_uri(
                    self.browser.as_ref(),
                    original_uri.as_deref(),
                    &self.default_original_uri,
                )?;
                info!("Sign-in complete, restored {}", restored);
                self.phase.set(Phase::Authenticated);
                Ok(())
            }
        }
    }

    /// Same as [`react`](Self::react) followed by rendering and running the action.
    pub fn handle(self: &Arc<Self>, state: Option<&AuthState>, render: &Render) {
        let reaction = self.react(state);
        render(reaction.view);

        let Some(action) = reaction.action else {
            return;
        };

        let controller = Arc::clone(self);
        let render = Arc::clone(render);
        spawn(async move {
            match controller.perform(action).await {
                Ok(()) => {
                    let state = controller.client.auth_state();
                    controller.handle(state.as_ref(), &render);
                }
                Err(e) => {
                    error!("Sign-in failed: {}", e);
                    controller.phase.set(Phase::Failed(e.to_string()));
                    render(View::Failed(e.to_string()));
                }
            }
        });
    }

    /// Subscribes to the client's auth state and starts it. Rendering follows
    /// until the returned subscription is dropped.
    ///
    /// Native hosts must call this inside a Tokio runtime.
    pub fn mount<F>(self: &Arc<Self>, render: F) -> Subscription
    where
        F: Fn(View) + Send + Sync + 'static,
    {
        if self.phase() == Phase::Uninitialized {
            self.phase.set(Phase::Checking);
        }
        let render: Render = Arc::new(render);

        let controller = Arc::clone(self);
        let listener: AuthStateListener =
            Arc::new(move |state| controller.handle(state.as_ref(), &render));

        let subscription = self.client.subscribe_auth_state(listener);
        self.client.start();
        subscription
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn spawn<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(future);
}

#[cfg(target_arch = "wasm32")]
fn spawn<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Same-origin path, query and fragment of `uri`, resolved against `origin`.
pub fn to_relative_url(uri: &str, origin: &str) -> Option<String> {
    let base = Url::parse(origin).ok()?;
    let url = base.join(uri).ok()?;
    if url.origin() != base.origin() {
        return None;
    }

    let mut relative = url.path().to_string();
    if let Some(query) = url.query() {
        relative.push('?');
        relative.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        relative.push('#');
        relative.push_str(fragment);
    }

    Some(relative)
}

/// Replaces the callback URL in history with the page the user started from.
///
/// An empty or missing `original_uri` restores `default_uri`; so does one on a
/// foreign origin.
pub fn restore_original_uri(
    browser: &dyn Browser,
    original_uri: Option<&str>,
    default_uri: &str,
) -> ClientResult<String> {
    let origin = browser.origin()?;
    let target = original_uri.filter(|uri| !uri.is_empty()).unwrap_or(default_uri);

    let relative = match to_relative_url(target, &origin) {
        Some(relative) => relative,
        None => {
            warn!("Refusing to restore {} outside {}", target, origin);
            to_relative_url(default_uri, &origin).unwrap_or_else(|| "/".to_string())
        }
    };

    browser.replace_history(&relative)?;
    Ok(relative)
}
