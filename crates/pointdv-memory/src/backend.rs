//! [`MemoryBackend`]: an in-process remote store with live push.

use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
};

use parking_lot::Mutex;
use pointdv_core::{
  AccountKind, AuthError, AuthToken, ChannelError, ChannelEvent, CredentialService, EventId,
  FeedSender, Identity, IdentityId, MIN_SECRET_LEN, Membership, MembershipEndpoint,
  PreferenceSet, Profile, ProfileChannel, ProfileUpdate, RemoteError, SignupRequest,
  Subscription, Verified, channel::feed, normalise_email,
};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

struct Account {
  email:    String,
  secret:   String,
  tokens:   HashSet<String>,
  profile:  Option<Profile>,
  readable: bool,
}

impl Account {
  fn current_event(&self) -> ChannelEvent {
    if !self.readable {
      return ChannelEvent::Failed(ChannelError::PermissionDenied);
    }
    match &self.profile {
      Some(profile) => ChannelEvent::Snapshot(profile.clone()),
      None => ChannelEvent::Absent,
    }
  }
}

#[derive(Default)]
struct Inner {
  accounts:       HashMap<IdentityId, Account>,
  by_email:       HashMap<String, IdentityId>,
  feeds:          HashMap<IdentityId, Vec<FeedSender>>,
  offline:        bool,
  toggle_calls:   usize,
  reset_requests: Vec<String>,
}

impl Inner {
  fn account_for(&self, identity: &Identity) -> Option<&Account> {
    self
      .accounts
      .get(&identity.id)
      .filter(|a| a.tokens.contains(identity.token.expose()))
  }

  fn account_for_mut(&mut self, identity: &Identity) -> Option<&mut Account> {
    self
      .accounts
      .get_mut(&identity.id)
      .filter(|a| a.tokens.contains(identity.token.expose()))
  }

  /// Re-deliver the current record to every live subscriber of `id`.
  /// Cancelled feeds, and feeds just sent a terminal event, are dropped.
  fn broadcast(&mut self, id: &IdentityId) {
    let Some(event) = self.accounts.get(id).map(Account::current_event) else {
      return;
    };
    let terminal = matches!(event, ChannelEvent::Failed(_));
    let Some(feeds) = self.feeds.get_mut(id) else {
      return;
    };
    feeds.retain(|tx| tx.send(event.clone()) && !terminal);
    if feeds.is_empty() {
      self.feeds.remove(id);
    }
  }
}

/// Cloning is cheap; clones share the same store.
#[derive(Clone)]
pub struct MemoryBackend {
  inner:       Arc<Mutex<Inner>>,
  verify_held: Arc<watch::Sender<bool>>,
}

impl Default for MemoryBackend {
  fn default() -> Self {
    let (verify_held, _) = watch::channel(false);
    Self { inner: Arc::default(), verify_held: Arc::new(verify_held) }
  }
}

impl MemoryBackend {
  pub fn new() -> Self { Self::default() }

  // ── Fixtures ──────────────────────────────────────────────────────────────

  /// Register an account with a fixed id.
  pub fn add_account(&self, id: &str, email: &str, secret: &str, profile: Option<Profile>) -> IdentityId {
    let id = IdentityId::new(id);
    let email = email.trim().to_lowercase();
    let mut inner = self.inner.lock();
    inner.by_email.insert(email.clone(), id.clone());
    inner.accounts.insert(id.clone(), Account {
      email,
      secret: secret.to_owned(),
      tokens: HashSet::new(),
      profile,
      readable: true,
    });
    id
  }

  /// Issue a valid token for `id` without going through `verify`, as if it
  /// had been issued in an earlier run.
  pub fn issue_token(&self, id: &IdentityId) -> Option<Identity> {
    let mut inner = self.inner.lock();
    let account = inner.accounts.get_mut(id)?;
    let token = format!("mem-{}", Uuid::new_v4());
    account.tokens.insert(token.clone());
    Some(Identity::new(id.clone(), AuthToken::new(token)))
  }

  pub fn revoke_tokens(&self, id: &IdentityId) {
    if let Some(account) = self.inner.lock().accounts.get_mut(id) {
      account.tokens.clear();
    }
  }

  pub fn profile(&self, id: &IdentityId) -> Option<Profile> {
    self.inner.lock().accounts.get(id).and_then(|a| a.profile.clone())
  }

  /// Replace the stored record (server-side change) and push it.
  pub fn set_profile(&self, id: &IdentityId, profile: Option<Profile>) {
    let mut inner = self.inner.lock();
    if let Some(account) = inner.accounts.get_mut(id) {
      account.profile = profile;
    }
    inner.broadcast(id);
  }

  /// Make the record unreadable; live channels fail with a permission error.
  pub fn deny_reads(&self, id: &IdentityId) {
    let mut inner = self.inner.lock();
    if let Some(account) = inner.accounts.get_mut(id) {
      account.readable = false;
    }
    inner.broadcast(id);
  }

  /// Fail every live channel of `id` with a transient error.
  pub fn fail_channels(&self, id: &IdentityId, reason: &str) {
    let mut inner = self.inner.lock();
    for tx in inner.feeds.remove(id).into_iter().flatten() {
      tx.send(ChannelEvent::Failed(ChannelError::Transient(reason.to_owned())));
    }
  }

  pub fn set_offline(&self, offline: bool) { self.inner.lock().offline = offline; }

  /// Park every `verify` call until released, to stage races against a
  /// credential round trip.
  pub fn hold_verify(&self, held: bool) { self.verify_held.send_replace(held); }

  // ── Inspection ────────────────────────────────────────────────────────────

  /// Channels for `id` that have not been cancelled.
  pub fn live_channels(&self, id: &IdentityId) -> usize {
    let inner = self.inner.lock();
    inner
      .feeds
      .get(id)
      .map_or(0, |feeds| feeds.iter().filter(|tx| !tx.is_cancelled()).count())
  }

  /// Senders currently held for `id`. Tests keep clones to replay a late
  /// event after the client has dropped the channel.
  pub fn senders(&self, id: &IdentityId) -> Vec<FeedSender> {
    self.inner.lock().feeds.get(id).cloned().unwrap_or_default()
  }

  pub fn toggle_calls(&self) -> usize { self.inner.lock().toggle_calls }

  pub fn reset_requests(&self) -> Vec<String> { self.inner.lock().reset_requests.clone() }

  pub fn secret(&self, id: &IdentityId) -> Option<String> {
    self.inner.lock().accounts.get(id).map(|a| a.secret.clone())
  }
}

// ─── CredentialService ───────────────────────────────────────────────────────

impl CredentialService for MemoryBackend {
  async fn verify(&self, email: &str, secret: &str) -> Result<Verified, AuthError> {
    let mut held = self.verify_held.subscribe();
    let _ = held.wait_for(|held| !*held).await;
    tokio::task::yield_now().await;
    let mut inner = self.inner.lock();
    if inner.offline {
      return Err(AuthError::Network("offline".into()));
    }
    let email = normalise_email(email)?;
    let id = inner.by_email.get(&email).cloned().ok_or(AuthError::InvalidCredentials)?;
    let account = inner.accounts.get_mut(&id).ok_or(AuthError::InvalidCredentials)?;
    if account.secret != secret {
      return Err(AuthError::InvalidCredentials);
    }
    let profile = account
      .profile
      .clone()
      .ok_or_else(|| AuthError::Rejected("profile record missing".into()))?;

    let token = format!("mem-{}", Uuid::new_v4());
    account.tokens.insert(token.clone());
    debug!(identity = %id, "memory backend verified credentials");
    Ok(Verified { identity: Identity::new(id, AuthToken::new(token)), account: profile })
  }

  async fn signup(&self, request: &SignupRequest) -> Result<IdentityId, AuthError> {
    tokio::task::yield_now().await;
    let mut inner = self.inner.lock();
    if inner.offline {
      return Err(AuthError::Network("offline".into()));
    }
    let email = normalise_email(&request.email)?;
    if request.secret.len() < MIN_SECRET_LEN {
      return Err(AuthError::WeakSecret);
    }
    if inner.by_email.contains_key(&email) {
      return Err(AuthError::EmailInUse);
    }

    let mut profile = Profile::new(request.display_name.clone(), request.account_kind);
    profile.email = Some(email.clone());
    profile.address = request.address.clone();
    if let AccountKind::Merchant = request.account_kind {
      profile.business_name = request.business_name.clone();
      profile.phone = request.phone.clone();
    }

    let id = IdentityId::new(Uuid::new_v4().to_string());
    inner.by_email.insert(email.clone(), id.clone());
    inner.accounts.insert(id.clone(), Account {
      email,
      secret: request.secret.clone(),
      tokens: HashSet::new(),
      profile: Some(profile),
      readable: true,
    });
    Ok(id)
  }

  async fn change_password(&self, identity: &Identity, current: &str, new: &str) -> Result<(), AuthError> {
    tokio::task::yield_now().await;
    let mut inner = self.inner.lock();
    if inner.offline {
      return Err(AuthError::Network("offline".into()));
    }
    let account = inner.account_for_mut(identity).ok_or(AuthError::Expired)?;
    if account.secret != current {
      return Err(AuthError::InvalidCredentials);
    }
    if new.len() < MIN_SECRET_LEN {
      return Err(AuthError::WeakSecret);
    }
    account.secret = new.to_owned();
    Ok(())
  }

  async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
    tokio::task::yield_now().await;
    let mut inner = self.inner.lock();
    if inner.offline {
      return Err(AuthError::Network("offline".into()));
    }
    let email = normalise_email(email)?;
    let known = inner.accounts.values().any(|a| a.email == email);
    if !known {
      return Err(AuthError::UnknownAccount);
    }
    inner.reset_requests.push(email);
    Ok(())
  }
}

// ─── ProfileChannel ──────────────────────────────────────────────────────────

impl ProfileChannel for MemoryBackend {
  async fn subscribe(&self, identity: &Identity) -> Result<Subscription, ChannelError> {
    tokio::task::yield_now().await;
    let mut inner = self.inner.lock();
    if inner.offline {
      return Err(ChannelError::Transient("offline".into()));
    }
    let event = inner
      .account_for(identity)
      .map(Account::current_event)
      .ok_or(ChannelError::PermissionDenied)?;

    let (tx, subscription) = feed();
    let terminal = matches!(event, ChannelEvent::Failed(_));
    tx.send(event);
    let feeds = inner.feeds.entry(identity.id.clone()).or_default();
    feeds.retain(|held| !held.is_cancelled());
    if !terminal {
      feeds.push(tx);
    }
    Ok(subscription)
  }

  async fn get(&self, identity: &Identity) -> Result<Option<Profile>, ChannelError> {
    tokio::task::yield_now().await;
    let inner = self.inner.lock();
    if inner.offline {
      return Err(ChannelError::Transient("offline".into()));
    }
    let account = inner.account_for(identity).ok_or(ChannelError::PermissionDenied)?;
    if !account.readable {
      return Err(ChannelError::PermissionDenied);
    }
    Ok(account.profile.clone())
  }

  async fn update(&self, identity: &Identity, update: &ProfileUpdate) -> Result<(), RemoteError> {
    tokio::task::yield_now().await;
    let mut inner = self.inner.lock();
    if inner.offline {
      return Err(RemoteError::Network("offline".into()));
    }
    let account = inner.account_for_mut(identity).ok_or(RemoteError::NotSignedIn)?;
    let profile = account
      .profile
      .as_mut()
      .ok_or_else(|| RemoteError::Rejected("profile record missing".into()))?;
    update.apply_to(profile);
    inner.broadcast(&identity.id);
    Ok(())
  }
}

// ─── MembershipEndpoint ──────────────────────────────────────────────────────

impl MembershipEndpoint for MemoryBackend {
  async fn toggle_membership(
    &self,
    identity: &Identity,
    set: PreferenceSet,
    item: &EventId,
  ) -> Result<Membership, RemoteError> {
    tokio::task::yield_now().await;
    let mut inner = self.inner.lock();
    inner.toggle_calls += 1;
    if inner.offline {
      return Err(RemoteError::Network("offline".into()));
    }
    let account = inner.account_for_mut(identity).ok_or(RemoteError::NotSignedIn)?;
    let profile = account
      .profile
      .as_mut()
      .ok_or_else(|| RemoteError::Rejected("profile record missing".into()))?;
    let membership = profile.toggle(set, item);
    inner.broadcast(&identity.id);
    Ok(membership)
  }
}
