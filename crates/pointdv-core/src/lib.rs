//! Core types and trait definitions for the PointDV session core.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod backend;
pub mod channel;
pub mod error;
pub mod identity;
pub mod profile;

pub use backend::{
  Backend, CredentialService, MIN_SECRET_LEN, MembershipEndpoint, ProfileChannel, SignupRequest,
  TokenStore, Verified, normalise_email,
};
pub use channel::{ChannelEvent, FeedSender, Subscription, SubscriptionHandle};
pub use error::{AuthError, ChannelError, RemoteError};
pub use identity::{AuthToken, Identity, IdentityId};
pub use profile::{AccountKind, EventId, Membership, PreferenceSet, Profile, ProfileUpdate};
