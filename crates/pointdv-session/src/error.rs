//! Error type for `pointdv-session`.
//!
//! Sign-in operations return [`AuthError`] directly. [`SessionError`] is only
//! used by the profile-editing path, whose failures the editing screen shows.

use pointdv_core::{AuthError, RemoteError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
  #[error("not signed in")]
  NotSignedIn,

  #[error("nothing to update")]
  EmptyUpdate,

  #[error(transparent)]
  Auth(#[from] AuthError),

  #[error("remote store error: {0}")]
  Remote(#[from] RemoteError),
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
