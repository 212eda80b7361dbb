//! Client-side session and real-time synchronisation core for PointDV.
//!
//! Four components, leaves first:
//!
//! - [`SessionStore`]: the persisted credential and current identity.
//! - [`SubscriptionManager`]: at most one live profile channel per identity.
//! - [`PreferenceToggler`]: favorite / confirmed-attendance toggles.
//! - [`AuthTransitionController`]: orchestrates the three into the reactive
//!   [`SessionState`] and the imperative API the UI calls.
//!
//! Remote collaborators are injected through the traits in
//! [`pointdv_core::backend`].

pub mod controller;
pub mod error;
pub mod session_store;
pub mod state;
pub mod subscription;
pub mod toggle;

pub use controller::{AuthTransitionController, SessionConfig};
pub use error::{Result, SessionError};
pub use session_store::{PersistedCredential, SessionStore};
pub use state::{AuthPhase, LinkState, NavigationGate, SessionState, StateContainer};
pub use subscription::SubscriptionManager;
pub use toggle::{PreferenceToggler, ToggleOutcome, ToggleRequest, ToggleStrategy};

#[cfg(test)]
mod tests;
