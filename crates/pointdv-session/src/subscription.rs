//! [`SubscriptionManager`]: at most one live profile channel per identity.
//!
//! Lifecycle of one channel: `Idle → Subscribing → Live → {Cancelled |
//! Errored}`. A new identity always starts a fresh cycle under a new
//! generation.
//!
//! Cancellation is synchronous: [`SubscriptionManager::cancel`] advances the
//! generation, cancels the handle and aborts the pump before returning. Every
//! inbound event is applied under the state lock only if its generation and
//! identity still match, so a late event from an old channel is dropped no
//! matter when it arrives.

use std::sync::Arc;

use parking_lot::Mutex;
use pointdv_core::{
  ChannelError, ChannelEvent, Identity, IdentityId, ProfileChannel, Subscription,
  SubscriptionHandle,
};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::state::{LinkState, StateContainer};

struct ActiveChannel {
  identity_id: IdentityId,
  generation:  u64,
  handle:      SubscriptionHandle,
  pump:        JoinHandle<()>,
}

impl ActiveChannel {
  fn shut(self) {
    self.handle.cancel();
    self.pump.abort();
    debug!(identity = %self.identity_id, generation = self.generation, "profile channel cancelled");
  }
}

pub struct SubscriptionManager<C: ProfileChannel> {
  channel: Arc<C>,
  state:   StateContainer,
  active:  Mutex<Option<ActiveChannel>>,
}

impl<C: ProfileChannel> SubscriptionManager<C> {
  pub fn new(channel: Arc<C>, state: StateContainer) -> Self {
    Self { channel, state, active: Mutex::new(None) }
  }

  /// Cancel the open channel, if any, and start a new generation. Returns the
  /// new generation.
  pub fn cancel(&self) -> u64 {
    let mut active = self.active.lock();
    let generation = self.state.advance();
    if let Some(channel) = active.take() {
      channel.shut();
      self.state.modify(|s| {
        s.link = LinkState::Cancelled;
        true
      });
    }
    generation
  }

  /// Like [`cancel`](Self::cancel), but only if no other transition has
  /// started since `expected` was observed.
  pub fn cancel_from(&self, expected: u64) -> Option<u64> {
    let mut active = self.active.lock();
    let generation = self.state.advance_from(expected)?;
    if let Some(channel) = active.take() {
      channel.shut();
    }
    Some(generation)
  }

  /// Open a channel for `identity` under `generation`. A no-op if the
  /// generation was superseded, before or during the subscribe round trip.
  pub async fn open(&self, identity: Identity, generation: u64) {
    let started = self.state.modify_at(generation, |s| {
      s.link = LinkState::Subscribing;
      true
    });
    if !started {
      return;
    }

    let result = self.channel.subscribe(&identity).await;

    let mut active = self.active.lock();
    if self.state.generation() != generation {
      // Dropping the subscription cancels it.
      trace!(identity = %identity.id, "discarding channel opened for superseded generation");
      return;
    }
    if let Some(previous) = active.take() {
      previous.shut();
    }

    match result {
      Ok(subscription) => {
        debug!(identity = %identity.id, generation, "profile channel subscribed");
        let handle = subscription.handle();
        let pump = tokio::spawn(pump(
          subscription,
          self.state.clone(),
          generation,
          identity.id.clone(),
        ));
        *active = Some(ActiveChannel { identity_id: identity.id, generation, handle, pump });
      }
      Err(e) => {
        apply(&self.state, generation, &identity.id, ChannelEvent::Failed(e));
      }
    }
  }

  /// One-shot read through the channel, replacing the profile wholesale.
  pub async fn refresh(&self, identity: &Identity, generation: u64) {
    let event = match self.channel.get(identity).await {
      Ok(Some(profile)) => ChannelEvent::Snapshot(profile),
      Ok(None) => ChannelEvent::Absent,
      Err(e) if e.is_permission_denied() => ChannelEvent::Absent,
      Err(e) => {
        warn!(identity = %identity.id, error = %e, "profile refresh failed");
        return;
      }
    };
    apply(&self.state, generation, &identity.id, event);
  }

  /// Whether a channel is currently open and still being drained.
  pub fn is_open(&self) -> bool {
    self.active.lock().as_ref().is_some_and(|c| !c.pump.is_finished())
  }

  pub fn link_state(&self) -> LinkState { self.state.read(|s| s.link) }
}

impl<C: ProfileChannel> Drop for SubscriptionManager<C> {
  fn drop(&mut self) {
    if let Some(channel) = self.active.get_mut().take() {
      channel.shut();
    }
  }
}

// ─── Pump ────────────────────────────────────────────────────────────────────

async fn pump(
  mut subscription: Subscription,
  state: StateContainer,
  generation: u64,
  identity_id: IdentityId,
) {
  while let Some(event) = subscription.next().await {
    if subscription.is_cancelled() {
      trace!(identity = %identity_id, "dropping event buffered before cancellation");
      return;
    }
    let terminal = matches!(event, ChannelEvent::Failed(_));
    apply(&state, generation, &identity_id, event);
    if terminal {
      return;
    }
  }
  // Producer hung up without a terminal event.
  if !subscription.is_cancelled() {
    let closed = ChannelError::Transient("channel closed".into());
    apply(&state, generation, &identity_id, ChannelEvent::Failed(closed));
  }
}

/// Apply one channel event if it still belongs to the current session.
/// Returns whether it was applied.
pub(crate) fn apply(
  state: &StateContainer,
  generation: u64,
  identity_id: &IdentityId,
  event: ChannelEvent,
) -> bool {
  let transient = match &event {
    ChannelEvent::Failed(ChannelError::Transient(msg)) => Some(msg.clone()),
    _ => None,
  };

  let applied = state.modify_at(generation, |s| {
    if s.identity_id() != Some(identity_id) {
      return false;
    }
    match event {
      ChannelEvent::Snapshot(profile) => {
        s.profile = Some(profile);
        s.link = LinkState::Live;
      }
      ChannelEvent::Absent => {
        // Identity stays: "exists but unreadable" is not "logged out".
        s.profile = None;
        s.link = LinkState::Live;
      }
      ChannelEvent::Failed(ChannelError::PermissionDenied) => {
        s.profile = None;
        s.link = LinkState::Errored;
      }
      ChannelEvent::Failed(ChannelError::Transient(_)) => {
        s.link = LinkState::Errored;
      }
    }
    s.settle();
    true
  });

  match (applied, transient) {
    (true, Some(msg)) => warn!(identity = %identity_id, error = %msg, "profile channel failed"),
    (false, _) => trace!(identity = %identity_id, "dropping event for superseded session"),
    (true, None) => {}
  }
  applied
}
