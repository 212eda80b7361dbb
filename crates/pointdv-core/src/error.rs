//! Error types for `pointdv-core`.
//!
//! Only [`AuthError`] is ever surfaced to a caller of the session core. The
//! other kinds are absorbed into reactive state or logged.

use thiserror::Error;

/// Failure of an explicit authentication operation (login, signup, password
/// management). Carries enough detail to render a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
  #[error("invalid credentials")]
  InvalidCredentials,

  #[error("malformed e-mail address")]
  InvalidEmail,

  #[error("e-mail already registered")]
  EmailInUse,

  #[error("password too weak")]
  WeakSecret,

  #[error("no account for that e-mail")]
  UnknownAccount,

  #[error("session token expired")]
  Expired,

  #[error("not signed in")]
  NotSignedIn,

  /// A later login, logout or restore started while this one was in flight.
  #[error("superseded by a later session transition")]
  Superseded,

  #[error("network error: {0}")]
  Network(String),

  #[error("rejected by server: {0}")]
  Rejected(String),
}

impl AuthError {
  /// Message suitable for display on the login / signup screens.
  pub fn user_message(&self) -> &'static str {
    match self {
      Self::InvalidCredentials => "Invalid e-mail or password.",
      Self::InvalidEmail => "The e-mail format is invalid.",
      Self::EmailInUse => "This e-mail is already registered.",
      Self::WeakSecret => "The password must have at least 6 characters.",
      Self::UnknownAccount => "E-mail not found.",
      Self::Expired => "Your session expired. Please sign in again.",
      Self::NotSignedIn => "You need to be signed in.",
      Self::Superseded => "Sign-in was cancelled.",
      Self::Network(_) => "Check your internet connection.",
      Self::Rejected(_) => "Something went wrong. Please try again.",
    }
  }
}

/// Failure reported by a live profile channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
  /// Connectivity or server hiccup; logged, never surfaced.
  #[error("transient channel error: {0}")]
  Transient(String),

  /// The record exists but may not be read. Treated exactly like an absent
  /// record.
  #[error("permission denied")]
  PermissionDenied,
}

impl ChannelError {
  pub fn is_permission_denied(&self) -> bool { matches!(self, Self::PermissionDenied) }
}

/// Failure of a remote write (membership toggle, profile update).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
  #[error("network error: {0}")]
  Network(String),

  #[error("rejected by server: {0}")]
  Rejected(String),

  #[error("identity not accepted by remote store")]
  NotSignedIn,

  #[error("malformed response: {0}")]
  Decode(String),
}
