//! Sensortune Library
//!
//! Motion-triggered music playback orchestrator
//!
//! ## Architecture (Components)
//!
//! 1. IngressRouter - Broker event decode/validate/dispatch
//! 2. MotionOrchestrator - Admission policy + session open/extend +
//!    playback command
//! 3. TimeoutReaper - Inactivity session closure + retention purge
//! 4. TokenWarden - OAuth token freshness (lease + cache)
//! 5. DeviceProvisioner - Broker identity/certificate/policy lifecycle
//! 6. Registry - SSoT for sensors and users
//! 7. SessionStore - Session + audit persistence
//! 8. SecretStore - Token material
//! 9. MusicAdapter - Music service HTTP integration
//! 10. BrokerGate - Broker control-plane integration
//! 11. WebAPI - Ingest webhook + admin endpoints
//!
//! ## Design Principles
//!
//! - Session state is data: the "active session" fact is a row, not a
//!   variable
//! - Racing writers converge through conditional writes
//! - Every external call is retried within bounds and classified into a
//!   stable error taxonomy

pub mod broker_gate;
pub mod device_provisioner;
pub mod error;
pub mod ingress_router;
pub mod models;
pub mod motion_orchestrator;
pub mod music_adapter;
pub mod registry;
pub mod retry;
pub mod secret_store;
pub mod session_store;
pub mod state;
pub mod timeout_reaper;
pub mod token_warden;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
