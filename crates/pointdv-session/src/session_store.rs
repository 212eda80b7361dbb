//! [`SessionStore`]: the persisted credential and the current identity.

use chrono::{DateTime, Duration, Utc};
use pointdv_core::{AuthToken, Identity, IdentityId, Profile, TokenStore};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::state::{AuthPhase, LinkState, StateContainer};

/// What is written into the token slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedCredential {
  pub identity_id: IdentityId,
  pub token:       AuthToken,
  pub issued_at:   DateTime<Utc>,
}

impl PersistedCredential {
  pub fn is_expired(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
    now - self.issued_at > max_age
  }
}

/// Owns the persisted credential and installs identities into the session
/// state.
///
/// Token slot I/O is serialised, and every write re-checks the generation it
/// was issued for, so a slow write can never resurrect a session that a later
/// transition already replaced.
pub struct SessionStore<T: TokenStore> {
  tokens:  T,
  state:   StateContainer,
  max_age: Duration,
  io:      Mutex<()>,
}

impl<T: TokenStore> SessionStore<T> {
  pub fn new(tokens: T, state: StateContainer, max_age: Duration) -> Self {
    Self { tokens, state, max_age, io: Mutex::new(()) }
  }

  /// Read the persisted credential. Absence, corruption, expiry and store
  /// failures all mean "no session"; the slot is cleared when unusable.
  pub async fn restore_session(&self) -> Option<Identity> {
    let _io = self.io.lock().await;

    let raw = match self.tokens.get().await {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(error = %e, "could not read persisted credential");
        return None;
      }
    };

    let credential: PersistedCredential = match serde_json::from_str(&raw) {
      Ok(c) => c,
      Err(e) => {
        warn!(error = %e, "discarding unreadable persisted credential");
        self.discard_slot().await;
        return None;
      }
    };

    if credential.is_expired(self.max_age, Utc::now()) {
      debug!(identity = %credential.identity_id, "persisted credential expired");
      self.discard_slot().await;
      return None;
    }

    Some(Identity::new(credential.identity_id, credential.token))
  }

  /// Install a restored identity. The profile stays unknown (and the phase
  /// loading) until the live channel delivers.
  pub fn adopt(&self, identity: Identity, generation: u64) -> bool {
    self.state.modify_at(generation, |s| {
      s.identity = Some(identity);
      s.profile = None;
      s.link = LinkState::Idle;
      true
    })
  }

  /// Install a freshly verified identity with its account record and persist
  /// the credential. Any previous profile is replaced in the same update.
  pub async fn accept_credential(
    &self,
    identity: &Identity,
    account: Profile,
    generation: u64,
  ) -> bool {
    let installed = self.state.modify_at(generation, |s| {
      s.identity = Some(identity.clone());
      s.profile = Some(account);
      s.link = LinkState::Idle;
      s.phase = AuthPhase::Authenticated;
      true
    });
    if !installed {
      return false;
    }

    let credential = PersistedCredential {
      identity_id: identity.id.clone(),
      token:       identity.token.clone(),
      issued_at:   Utc::now(),
    };
    let encoded = match serde_json::to_string(&credential) {
      Ok(s) => s,
      Err(e) => {
        warn!(error = %e, "could not encode credential; session will not survive restart");
        return true;
      }
    };

    let _io = self.io.lock().await;
    if self.state.generation() != generation {
      debug!(identity = %identity.id, "skipping persist for superseded session");
      return true;
    }
    if let Err(e) = self.tokens.set(&encoded).await {
      warn!(error = %e, "could not persist credential; session will not survive restart");
    }
    true
  }

  /// Mark the session signed out without touching the token slot.
  pub fn mark_signed_out(&self, generation: u64) -> bool {
    self.state.modify_at(generation, |s| {
      s.sign_out();
      true
    })
  }

  /// Clear identity and profile in one update, then remove the persisted
  /// credential.
  pub async fn clear_session(&self, generation: u64) {
    self.mark_signed_out(generation);

    let _io = self.io.lock().await;
    if self.state.generation() != generation {
      // A newer session owns the slot now.
      return;
    }
    if let Err(e) = self.tokens.clear().await {
      warn!(error = %e, "could not clear persisted credential");
    }
  }

  async fn discard_slot(&self) {
    if let Err(e) = self.tokens.clear().await {
      warn!(error = %e, "could not clear persisted credential");
    }
  }
}
