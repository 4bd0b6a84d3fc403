//! Registry - Single Source of Truth (SSoT)
//!
//! ## Responsibilities
//!
//! - Sensor inventory and per-sensor playback configuration
//! - User accounts and preference defaults
//! - Monotonic last-motion watermark
//!
//! ## Design Principles
//!
//! - SSoT: all sensor/user reads and writes go through here
//! - Admission decisions (enabled, quiet hours, debounce) read persisted
//!   state, never process memory

mod repository;
mod service;
mod types;

pub use repository::RegistryRepository;
pub use service::{parse_hhmm, RegistryService};
pub use types::*;

use sqlx::MySqlPool;

/// Registry instance
pub struct Registry {
    service: RegistryService,
}

impl Registry {
    /// Create new Registry
    pub fn new(pool: MySqlPool) -> Self {
        let repo = RegistryRepository::new(pool);
        let service = RegistryService::new(repo);

        Self { service }
    }

    /// Get service reference
    pub fn service(&self) -> &RegistryService {
        &self.service
    }
}
