//! [`PreferenceToggler`]: flips membership of an event in a preference set.

use std::sync::Arc;

use pointdv_core::{EventId, Identity, Membership, MembershipEndpoint, PreferenceSet};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::state::StateContainer;

/// How a toggle reaches the local profile. Chosen once, at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleStrategy {
  /// Send the atomic toggle and leave local state alone; the next channel
  /// push carries the authoritative sets.
  #[default]
  PushReconciled,
  /// Flip local membership at once and send the toggle in the background.
  ///
  /// Weakly consistent: a failed remote toggle is logged and *not* rolled
  /// back, so local and remote sets can disagree until the next push
  /// replaces the profile.
  OptimisticLocal,
}

impl ToggleStrategy {
  /// Whether local state can show a membership the remote store never
  /// accepted.
  pub fn may_drift(self) -> bool {
    match self {
      Self::PushReconciled => false,
      Self::OptimisticLocal => true,
    }
  }
}

/// One toggle, as issued by the UI. Always carried out with the toggler's
/// configured strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleRequest {
  pub set:  PreferenceSet,
  pub item: EventId,
}

#[derive(Debug)]
pub enum ToggleOutcome {
  /// No identity; nothing was sent.
  NoSession,
  /// Optimistic toggle without a profile snapshot to flip; nothing was sent.
  NoSnapshot,
  /// The remote store applied the toggle; the local sets follow on the next
  /// push.
  Confirmed(Membership),
  /// The remote toggle failed. Logged; local state untouched.
  Unconfirmed,
  /// Local membership already flipped. `remote` completes when the
  /// background mutation has finished (or failed and been logged).
  Optimistic { membership: Membership, remote: JoinHandle<()> },
}

pub struct PreferenceToggler<M: MembershipEndpoint> {
  endpoint: Arc<M>,
  state:    StateContainer,
  strategy: ToggleStrategy,
}

impl<M: MembershipEndpoint + 'static> PreferenceToggler<M> {
  pub fn new(endpoint: Arc<M>, state: StateContainer, strategy: ToggleStrategy) -> Self {
    Self { endpoint, state, strategy }
  }

  pub fn strategy(&self) -> ToggleStrategy { self.strategy }

  /// Toggle `item` in `set` using the configured strategy.
  pub async fn toggle(&self, set: PreferenceSet, item: EventId) -> ToggleOutcome {
    self.execute(ToggleRequest { set, item }).await
  }

  pub async fn execute(&self, request: ToggleRequest) -> ToggleOutcome {
    let Some(identity) = self.state.read(|s| s.identity.clone().filter(|_| !s.is_disposed())) else {
      debug!(set = %request.set, item = %request.item, "toggle without identity ignored");
      return ToggleOutcome::NoSession;
    };

    match self.strategy {
      ToggleStrategy::PushReconciled => self.send(&identity, request).await,
      ToggleStrategy::OptimisticLocal => self.flip_then_send(identity, request),
    }
  }

  async fn send(&self, identity: &Identity, request: ToggleRequest) -> ToggleOutcome {
    match self.endpoint.toggle_membership(identity, request.set, &request.item).await {
      Ok(membership) => {
        debug!(set = %request.set, item = %request.item, ?membership, "toggle confirmed");
        ToggleOutcome::Confirmed(membership)
      }
      Err(e) => {
        warn!(set = %request.set, item = %request.item, error = %e, "toggle failed");
        ToggleOutcome::Unconfirmed
      }
    }
  }

  fn flip_then_send(&self, identity: Identity, request: ToggleRequest) -> ToggleOutcome {
    let ToggleRequest { set, item, .. } = request;

    // Read-modify-write on the latest snapshot, under the state lock.
    let mut flipped = None;
    let mut session_gone = false;
    self.state.modify(|s| {
      if s.identity.as_ref() != Some(&identity) {
        session_gone = true;
        return false;
      }
      match s.profile.as_mut() {
        Some(profile) => {
          flipped = Some(profile.toggle(set, &item));
          true
        }
        None => false,
      }
    });

    let Some(membership) = flipped else {
      if session_gone {
        return ToggleOutcome::NoSession;
      }
      debug!(%set, %item, "optimistic toggle without profile snapshot ignored");
      return ToggleOutcome::NoSnapshot;
    };

    let endpoint = self.endpoint.clone();
    let remote = tokio::spawn(async move {
      match endpoint.toggle_membership(&identity, set, &item).await {
        Ok(confirmed) if confirmed == membership => {
          debug!(%set, %item, ?membership, "optimistic toggle confirmed");
        }
        Ok(confirmed) => {
          warn!(%set, %item, local = ?membership, remote = ?confirmed, "optimistic toggle drifted from remote");
        }
        Err(e) => {
          // No rollback: the local flip stands until the next push.
          warn!(%set, %item, error = %e, "optimistic toggle failed remotely");
        }
      }
    });

    ToggleOutcome::Optimistic { membership, remote }
  }
}
