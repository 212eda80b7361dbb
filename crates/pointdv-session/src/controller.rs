//! [`AuthTransitionController`]: the session API consumed by navigation and
//! screens.
//!
//! Phases: `Booting → Restoring → {Authenticated | Unauthenticated}`, then
//! `Authenticated ↔ Unauthenticated` through login and logout.
//!
//! Every login, logout, restore and teardown is a transition that starts a
//! new generation. The previous identity's channel is cancelled at that
//! moment, before anything else happens, and any asynchronous result that was
//! issued under an older generation is discarded.

use std::sync::Arc;

use chrono::Duration;
use pointdv_core::{
  AuthError, Backend, EventId, IdentityId, PreferenceSet, ProfileUpdate, SignupRequest,
  TokenStore, Verified,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
  error::{Result, SessionError},
  session_store::SessionStore,
  state::{AuthPhase, LinkState, SessionState, StateContainer},
  subscription::SubscriptionManager,
  toggle::{PreferenceToggler, ToggleOutcome, ToggleStrategy},
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionConfig {
  /// Fixed for the controller's lifetime.
  pub toggle_strategy: ToggleStrategy,
  /// Persisted credentials older than this are not restored.
  pub session_max_age: Duration,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      toggle_strategy: ToggleStrategy::default(),
      session_max_age: Duration::days(7),
    }
  }
}

// ─── Controller ──────────────────────────────────────────────────────────────

pub struct AuthTransitionController<B: Backend, T: TokenStore> {
  backend:       Arc<B>,
  state:         StateContainer,
  session:       SessionStore<T>,
  subscriptions: SubscriptionManager<B>,
  toggler:       PreferenceToggler<B>,
}

impl<B: Backend, T: TokenStore> AuthTransitionController<B, T> {
  pub fn new(backend: Arc<B>, tokens: T, config: SessionConfig) -> Self {
    Self::with_container(StateContainer::new(), backend, tokens, config)
  }

  /// Build around an existing container, e.g. one already handed to the UI.
  pub fn with_container(
    state: StateContainer,
    backend: Arc<B>,
    tokens: T,
    config: SessionConfig,
  ) -> Self {
    Self {
      session: SessionStore::new(tokens, state.clone(), config.session_max_age),
      subscriptions: SubscriptionManager::new(backend.clone(), state.clone()),
      toggler: PreferenceToggler::new(backend.clone(), state.clone(), config.toggle_strategy),
      backend,
      state,
    }
  }

  // ── Reactive surface ──────────────────────────────────────────────────────

  pub fn container(&self) -> &StateContainer { &self.state }

  pub fn state(&self) -> watch::Receiver<SessionState> { self.state.subscribe() }

  pub fn snapshot(&self) -> SessionState { self.state.snapshot() }

  pub fn toggle_strategy(&self) -> ToggleStrategy { self.toggler.strategy() }

  pub fn subscriptions(&self) -> &SubscriptionManager<B> { &self.subscriptions }

  // ── Transitions ───────────────────────────────────────────────────────────

  /// Restore the persisted session, if any. Loading stays on until the live
  /// channel delivers a definitive profile (or definitive absence).
  pub async fn restore_session(&self) -> Option<IdentityId> {
    let generation = self.subscriptions.cancel();
    self.state.modify_at(generation, |s| {
      s.phase = AuthPhase::Restoring;
      s.identity = None;
      s.profile = None;
      s.link = LinkState::Idle;
      true
    });

    let Some(identity) = self.session.restore_session().await else {
      debug!("no persisted session");
      self.session.mark_signed_out(generation);
      return None;
    };

    let id = identity.id.clone();
    if !self.session.adopt(identity.clone(), generation) {
      debug!(identity = %id, "restore superseded");
      return None;
    }
    info!(identity = %id, "session restored");
    self.subscriptions.open(identity, generation).await;
    Some(id)
  }

  /// Sign in. Failures are returned to the caller and leave the current
  /// session exactly as it was.
  pub async fn login(&self, email: &str, secret: &str) -> Result<IdentityId, AuthError> {
    let observed = self.state.generation();

    let Verified { identity, account } = match self.backend.verify(email, secret).await {
      Ok(verified) => verified,
      Err(e) => {
        debug!(error = %e, "login rejected");
        return Err(e);
      }
    };

    // A logout, restore or other login started while we were verifying.
    let Some(generation) = self.subscriptions.cancel_from(observed) else {
      debug!(identity = %identity.id, "login superseded");
      return Err(AuthError::Superseded);
    };

    if !self.session.accept_credential(&identity, account, generation).await {
      return Err(AuthError::Superseded);
    }
    let id = identity.id.clone();
    info!(identity = %id, "signed in");
    self.subscriptions.open(identity, generation).await;
    Ok(id)
  }

  /// Sign out. Identity and profile are cleared before this returns.
  pub async fn logout(&self) {
    let generation = self.subscriptions.cancel();
    self.session.clear_session(generation).await;
    info!("signed out");
  }

  /// Tear down: cancel the channel and freeze the state. Idempotent.
  pub fn dispose(&self) {
    self.subscriptions.cancel();
    self.state.dispose();
  }

  // ── Preferences ───────────────────────────────────────────────────────────

  pub async fn toggle_favorite(&self, id: EventId) -> ToggleOutcome {
    self.toggler.toggle(PreferenceSet::Favorites, id).await
  }

  pub async fn toggle_confirmed(&self, id: EventId) -> ToggleOutcome {
    self.toggler.toggle(PreferenceSet::Confirmed, id).await
  }

  /// One-shot re-read of the profile, for deployments without push.
  pub async fn refresh_profile(&self) {
    let current = self.state.read(|s| s.identity.clone().map(|i| (i, s.generation)));
    if let Some((identity, generation)) = current {
      self.subscriptions.refresh(&identity, generation).await;
    }
  }

  // ── Account management ────────────────────────────────────────────────────

  /// Create an account. Does not sign in.
  pub async fn signup(&self, request: &SignupRequest) -> Result<IdentityId, AuthError> {
    match self.backend.signup(request).await {
      Ok(id) => {
        info!(identity = %id, kind = request.account_kind.as_str(), "account created");
        Ok(id)
      }
      Err(e) => {
        debug!(error = %e, "signup rejected");
        Err(e)
      }
    }
  }

  pub async fn change_password(&self, current: &str, new: &str) -> Result<(), AuthError> {
    let identity = self.state.read(|s| s.identity.clone()).ok_or(AuthError::NotSignedIn)?;
    self.backend.change_password(&identity, current, new).await
  }

  pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
    self.backend.request_password_reset(email).await
  }

  /// Write editable profile fields. The local profile is not touched; the
  /// change arrives through the live channel.
  pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<()> {
    if update.is_empty() {
      return Err(SessionError::EmptyUpdate);
    }
    let identity = self.state.read(|s| s.identity.clone()).ok_or(SessionError::NotSignedIn)?;
    self.backend.update(&identity, update).await.map_err(|e| {
      warn!(identity = %identity.id, error = %e, "profile update failed");
      SessionError::from(e)
    })
  }
}

impl<B: Backend, T: TokenStore> Drop for AuthTransitionController<B, T> {
  fn drop(&mut self) { self.dispose(); }
}
