//! Identity: the authenticated subject a session represents.
//!
//! An identity pairs the server-assigned account id with the bearer token that
//! proves it. It is created on login acceptance or a successful session
//! restore and destroyed on logout.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-assigned account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for IdentityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Opaque bearer token issued by the credential service.
///
/// `Debug` output is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
  pub fn new(token: impl Into<String>) -> Self { Self(token.into()) }

  pub fn expose(&self) -> &str { &self.0 }
}

impl fmt::Debug for AuthToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("AuthToken(***)") }
}

/// The subject the session currently represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
  pub id:    IdentityId,
  pub token: AuthToken,
}

impl Identity {
  pub fn new(id: IdentityId, token: AuthToken) -> Self { Self { id, token } }
}
