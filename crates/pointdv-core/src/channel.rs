//! Live profile feed: the push half of a [`ProfileChannel`] subscription.
//!
//! A subscription is a pair: the channel implementation keeps a
//! [`FeedSender`] and pushes [`ChannelEvent`]s into it; the session core owns
//! the [`Subscription`] and drains it. Both halves share one cancellation
//! token, so cancelling from either side is observed by the other without
//! waiting on any I/O.
//!
//! [`ProfileChannel`]: crate::backend::ProfileChannel

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{error::ChannelError, profile::Profile};

/// One inbound message on a live profile channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
  /// Full current record; replaces the local profile wholesale.
  Snapshot(Profile),
  /// The record does not exist (or is unreadable).
  Absent,
  /// The channel failed. No further events follow.
  Failed(ChannelError),
}

/// Create a connected sender / subscription pair.
pub fn feed() -> (FeedSender, Subscription) {
  let (tx, rx) = mpsc::unbounded_channel();
  let cancel = CancellationToken::new();
  (
    FeedSender { tx, cancel: cancel.clone() },
    Subscription { events: rx, cancel },
  )
}

// ─── Producer side ───────────────────────────────────────────────────────────

/// Channel-implementation side of a subscription.
#[derive(Debug, Clone)]
pub struct FeedSender {
  tx:     mpsc::UnboundedSender<ChannelEvent>,
  cancel: CancellationToken,
}

impl FeedSender {
  /// Push an event. Returns `false` once the subscription is cancelled or
  /// dropped; producers should stop at that point.
  pub fn send(&self, event: ChannelEvent) -> bool {
    if self.cancel.is_cancelled() {
      return false;
    }
    self.tx.send(event).is_ok()
  }

  pub fn is_cancelled(&self) -> bool { self.cancel.is_cancelled() || self.tx.is_closed() }

  /// Resolves when the consumer cancels.
  pub async fn cancelled(&self) { self.cancel.cancelled().await }
}

// ─── Consumer side ───────────────────────────────────────────────────────────

/// Session-core side of a subscription. Dropping it cancels the channel.
#[derive(Debug)]
pub struct Subscription {
  events: mpsc::UnboundedReceiver<ChannelEvent>,
  cancel: CancellationToken,
}

impl Subscription {
  /// Next inbound event; `None` once the producer is gone.
  pub async fn next(&mut self) -> Option<ChannelEvent> { self.events.recv().await }

  /// A cancellable handle sharing this subscription's token.
  pub fn handle(&self) -> SubscriptionHandle { SubscriptionHandle { cancel: self.cancel.clone() } }

  pub fn is_cancelled(&self) -> bool { self.cancel.is_cancelled() }
}

impl Drop for Subscription {
  fn drop(&mut self) { self.cancel.cancel(); }
}

/// Opaque cancellable token for one open live-update channel.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
  cancel: CancellationToken,
}

impl SubscriptionHandle {
  /// Cancel synchronously. Idempotent.
  pub fn cancel(&self) { self.cancel.cancel(); }

  pub fn is_cancelled(&self) -> bool { self.cancel.is_cancelled() }
}
