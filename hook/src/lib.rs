//! Client VPN pre-authentication hook.
//!
//! Receives gateway connection events, asks the backend for the user's 2FA
//! status and answers in the gateway posture schema.

pub mod adapter;
pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod state;

pub use adapter::HookAdapter;
pub use client::{BackendClient, StatusBackend};
pub use config::Config;
pub use error::ClientError;
pub use state::AppState;
