//! In-process implementations of the PointDV collaborator traits.
//!
//! [`MemoryBackend`] behaves like the remote store: credentials, per-account
//! profiles, an atomic membership toggle and live channels that re-deliver
//! the full profile on every change. It also exposes fault injection so the
//! session core can be exercised against permission errors, channel failures
//! and an unreachable network.
//!
//! [`MemoryTokenStore`] is a volatile [`TokenStore`](pointdv_core::TokenStore).

mod backend;
mod tokens;

pub use backend::MemoryBackend;
pub use tokens::{MemoryTokenStore, TokenStoreError};
