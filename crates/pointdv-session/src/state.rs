//! The reactive session state and the container that owns it.
//!
//! [`StateContainer`] is created by the controller at app start and handed to
//! the UI tree explicitly; consumers subscribe through a
//! [`watch::Receiver`] and are notified on every visible change.
//!
//! Every write goes through [`StateContainer::modify`], which runs under the
//! watch lock. Writers that act on behalf of an asynchronous operation check
//! the `generation` they started with inside that closure, so the
//! check-then-apply step can never interleave with a session transition.

use std::{collections::BTreeSet, sync::Arc};

use pointdv_core::{AccountKind, EventId, Identity, Profile};
use tokio::sync::watch;

static NO_EVENTS: BTreeSet<EventId> = BTreeSet::new();

// ─── Phases ──────────────────────────────────────────────────────────────────

/// Authentication lifecycle of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
  /// Process started; no restore attempted yet.
  Booting,
  /// Reading the persisted credential or waiting for the first profile event.
  Restoring,
  Authenticated,
  Unauthenticated,
}

impl AuthPhase {
  pub fn is_loading(self) -> bool { matches!(self, Self::Booting | Self::Restoring) }
}

/// State of the live profile channel for the current identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
  Idle,
  Subscribing,
  Live,
  Cancelled,
  Errored,
}

/// What navigation should show for a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationGate {
  /// Still loading: render nothing, to avoid redirect flicker.
  Hold,
  /// No account kind known: the sign-in flow.
  SignIn,
  Home(AccountKind),
}

// ─── SessionState ────────────────────────────────────────────────────────────

/// The reactive tuple `{isAuthLoading, identity, accountKind, profile,
/// favoritedIds, confirmedIds}`.
///
/// Account kind and the preference sets are derived from the profile, so they
/// are never inconsistent with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
  pub phase:            AuthPhase,
  pub identity:         Option<Identity>,
  pub profile:          Option<Profile>,
  pub link:             LinkState,
  pub(crate) generation: u64,
  pub(crate) disposed:   bool,
}

impl SessionState {
  fn booting() -> Self {
    Self {
      phase:      AuthPhase::Booting,
      identity:   None,
      profile:    None,
      link:       LinkState::Idle,
      generation: 0,
      disposed:   false,
    }
  }

  pub fn is_auth_loading(&self) -> bool { self.phase.is_loading() }

  pub fn account_kind(&self) -> Option<AccountKind> {
    self.profile.as_ref().map(|p| p.account_kind)
  }

  pub fn favorited_ids(&self) -> &BTreeSet<EventId> {
    self.profile.as_ref().map_or(&NO_EVENTS, |p| &p.favorited_ids)
  }

  pub fn confirmed_ids(&self) -> &BTreeSet<EventId> {
    self.profile.as_ref().map_or(&NO_EVENTS, |p| &p.confirmed_ids)
  }

  pub fn is_disposed(&self) -> bool { self.disposed }

  /// Identity id, if signed in.
  pub fn identity_id(&self) -> Option<&pointdv_core::IdentityId> {
    self.identity.as_ref().map(|i| &i.id)
  }

  pub fn gate(&self) -> NavigationGate {
    if self.is_auth_loading() {
      return NavigationGate::Hold;
    }
    match self.account_kind() {
      Some(kind) => NavigationGate::Home(kind),
      None => NavigationGate::SignIn,
    }
  }

  /// Leave the loading phases: a definitive profile (or definitive absence)
  /// is now known.
  pub(crate) fn settle(&mut self) {
    if self.phase.is_loading() {
      self.phase = AuthPhase::Authenticated;
    }
  }

  /// Identity and profile cleared together, never one without the other.
  pub(crate) fn sign_out(&mut self) {
    self.identity = None;
    self.profile = None;
    self.link = LinkState::Idle;
    self.phase = AuthPhase::Unauthenticated;
  }
}

// ─── StateContainer ──────────────────────────────────────────────────────────

/// Owned, injectable holder of [`SessionState`] with subscribe/notify
/// semantics.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct StateContainer {
  tx: Arc<watch::Sender<SessionState>>,
}

impl StateContainer {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(SessionState::booting());
    Self { tx: Arc::new(tx) }
  }

  /// Receiver notified on every visible state change.
  pub fn subscribe(&self) -> watch::Receiver<SessionState> { self.tx.subscribe() }

  pub fn snapshot(&self) -> SessionState { self.tx.borrow().clone() }

  pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R { f(&self.tx.borrow()) }

  /// Apply `f` under the state lock. `f` returns whether consumers should be
  /// notified. Once disposed, nothing is applied.
  pub(crate) fn modify(&self, f: impl FnOnce(&mut SessionState) -> bool) -> bool {
    self.tx.send_if_modified(|state| if state.disposed { false } else { f(state) })
  }

  /// Apply `f` only if `generation` is still current.
  pub(crate) fn modify_at(
    &self,
    generation: u64,
    f: impl FnOnce(&mut SessionState) -> bool,
  ) -> bool {
    self.modify(|state| state.generation == generation && f(state))
  }

  /// Start a new generation; every write tagged with an older one is dropped
  /// from now on. Does not notify.
  pub(crate) fn advance(&self) -> u64 {
    let mut next = 0;
    self.tx.send_if_modified(|state| {
      state.generation += 1;
      next = state.generation;
      false
    });
    next
  }

  /// Advance only if the generation is still `expected`.
  pub(crate) fn advance_from(&self, expected: u64) -> Option<u64> {
    let mut next = None;
    self.tx.send_if_modified(|state| {
      if state.generation == expected && !state.disposed {
        state.generation += 1;
        next = Some(state.generation);
      }
      false
    });
    next
  }

  pub(crate) fn generation(&self) -> u64 { self.tx.borrow().generation }

  pub(crate) fn dispose(&self) {
    self.tx.send_if_modified(|state| {
      if state.disposed {
        return false;
      }
      state.generation += 1;
      state.disposed = true;
      state.link = LinkState::Cancelled;
      true
    });
  }
}

impl Default for StateContainer {
  fn default() -> Self { Self::new() }
}
