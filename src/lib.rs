//! Policy administration core for an insurance-agency CRM.
//!
//! The crate owns the policy template/instance engine: business-rule
//! validation, expiry-status derivation, the template and instance stores,
//! the legacy-shape compatibility layer, and the audit trail. Client
//! records, documents, and notifications live in external systems and are
//! reached through narrow traits.

pub mod config;
pub mod error;
pub mod policies;
pub mod telemetry;

pub use config::AppConfig;
pub use error::AppError;
