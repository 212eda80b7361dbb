//! HTTP backend and configuration for the `pointdv` client.
//!
//! [`HttpBackend`] implements every remote collaborator the session core
//! needs over the PointDV REST API; [`ClientConfig`] carries the settings the
//! binary reads from its config file and environment.

pub mod http;
pub mod settings;
mod wire;

pub use http::HttpBackend;
pub use settings::{ClientConfig, expand_tilde};
