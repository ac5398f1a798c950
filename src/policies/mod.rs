//! Policy template and instance engine.
//!
//! Two data shapes coexist here while the rollout is in flight: the legacy
//! per-client policy row and the normalized template + instance pair. The
//! validation engine and the status derivation are pure so they run
//! identically on the write path and the pre-submit checks; the migration
//! layer decides, per configured phase, which shape serves reads and
//! receives writes.

pub mod audit;
pub mod domain;
pub mod expiry;
pub mod instances;
pub mod migration;
pub mod repository;
pub mod router;
pub mod templates;
pub mod validation;

#[cfg(test)]
mod tests;

pub use audit::{
    AuditAction, AuditEntityType, AuditEntry, AuditError, AuditReader, AuditRecorder, AuditStats,
    MemoryAuditLog,
};
pub use domain::{
    ClientId, ClientPolicyStats, DisplayStatus, InstanceDraft, InstanceId, InstancePatch,
    LegacyPolicy, PolicyInstance, PolicyStatus, PolicyTemplate, PolicyType, TemplateDraft,
    TemplateId,
};
pub use expiry::{
    days_until_expiry, display_status, expiry_warning_text, ExpirySummary, ExpiryWarning,
    SweepOutcome, EXPIRING_SOON_WINDOW_DAYS,
};
pub use instances::{InstanceView, PolicyInstanceService};
pub use migration::{
    select_gateway, BatchMigrator, MigrationError, MigrationPhase, MigrationReport, PhaseConfig,
    PolicyGateway, PolicyRecord,
};
pub use repository::{
    ClientDirectory, InstanceStore, LegacyStore, MemoryClientDirectory, MemoryLegacyStore,
    MemoryPolicyStore, OpenClientDirectory, RepositoryError, TemplateStore,
};
pub use router::{policy_router, PolicyRouterState};
pub use templates::{
    CascadeOutcome, PolicyServiceError, PolicyTemplateService, SortOrder, TemplatePage,
    TemplateQuery, TemplateSort, TemplateStats, TemplateView,
};
pub use validation::{
    resolve_expiry, InstanceValidation, ValidationConfig, ValidationEngine, ValidationReport,
};
