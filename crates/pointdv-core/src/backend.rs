//! Traits for the external collaborators the session core consumes.
//!
//! Remote collaborators (credentials, live profile channel, set mutation) are
//! implemented by `pointdv-client` over HTTP and by `pointdv-memory`
//! in-process. The durable [`TokenStore`] is implemented by
//! `pointdv-store-sqlite`. The session core depends only on these traits.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  channel::Subscription,
  error::{AuthError, ChannelError, RemoteError},
  identity::{Identity, IdentityId},
  profile::{AccountKind, EventId, Membership, PreferenceSet, Profile, ProfileUpdate},
};

// ─── Request / response types ────────────────────────────────────────────────

/// Successful credential verification.
#[derive(Debug, Clone)]
pub struct Verified {
  pub identity: Identity,
  /// The account record as of sign-in; seeds the profile until the first push.
  pub account:  Profile,
}

/// Input to [`CredentialService::signup`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
  pub display_name:  String,
  pub email:         String,
  pub secret:        String,
  pub account_kind:  AccountKind,
  pub business_name: Option<String>,
  pub phone:         Option<String>,
  pub address:       Option<String>,
}

/// Shortest secret accepted for a new account or a password change.
pub const MIN_SECRET_LEN: usize = 6;

/// Trim and lowercase an e-mail address, rejecting ones without a local part
/// and a domain.
pub fn normalise_email(email: &str) -> Result<String, AuthError> {
  let email = email.trim().to_lowercase();
  match email.split_once('@') {
    Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
    _ => Err(AuthError::InvalidEmail),
  }
}

// ─── Remote collaborators ────────────────────────────────────────────────────

/// Verifies and manages account credentials.
pub trait CredentialService: Send + Sync {
  /// Exchange e-mail and secret for an identity, its token and account record.
  fn verify<'a>(
    &'a self,
    email: &'a str,
    secret: &'a str,
  ) -> impl Future<Output = Result<Verified, AuthError>> + Send + 'a;

  /// Create a new account. Does not sign in.
  fn signup<'a>(
    &'a self,
    request: &'a SignupRequest,
  ) -> impl Future<Output = Result<IdentityId, AuthError>> + Send + 'a;

  fn change_password<'a>(
    &'a self,
    identity: &'a Identity,
    current: &'a str,
    new: &'a str,
  ) -> impl Future<Output = Result<(), AuthError>> + Send + 'a;

  fn request_password_reset<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<(), AuthError>> + Send + 'a;
}

/// Delivers the signed-in account's profile.
pub trait ProfileChannel: Send + Sync {
  /// Open a live channel re-delivering the full profile on every change.
  ///
  /// Implementations should push the current state as the first event.
  fn subscribe<'a>(
    &'a self,
    identity: &'a Identity,
  ) -> impl Future<Output = Result<Subscription, ChannelError>> + Send + 'a;

  /// One-shot read; `None` if the record is absent.
  fn get<'a>(
    &'a self,
    identity: &'a Identity,
  ) -> impl Future<Output = Result<Option<Profile>, ChannelError>> + Send + 'a;

  /// Write editable profile fields. The change arrives back through the live
  /// channel.
  fn update<'a>(
    &'a self,
    identity: &'a Identity,
    update: &'a ProfileUpdate,
  ) -> impl Future<Output = Result<(), RemoteError>> + Send + 'a;
}

/// Atomic add/remove-from-set primitive on the remote store.
pub trait MembershipEndpoint: Send + Sync {
  /// Flip membership of `item` in `set`, atomically on the remote side, and
  /// report the resulting state.
  fn toggle_membership<'a>(
    &'a self,
    identity: &'a Identity,
    set: PreferenceSet,
    item: &'a EventId,
  ) -> impl Future<Output = Result<Membership, RemoteError>> + Send + 'a;
}

/// Everything the session core needs from the remote side.
pub trait Backend: CredentialService + ProfileChannel + MembershipEndpoint + 'static {}

impl<T> Backend for T where T: CredentialService + ProfileChannel + MembershipEndpoint + 'static {}

// ─── Local persistence ───────────────────────────────────────────────────────

/// Single-slot durable key-value store for the persisted credential.
pub trait TokenStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn get(&self) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  fn set<'a>(&'a self, value: &'a str) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn clear(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
