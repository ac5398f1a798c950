//! Coexistence of the legacy single-table shape and the template shape.
//!
//! A named phase picks one strategy object at startup; the strategy, not the
//! callers, knows which shape serves reads and receives writes. Bulk
//! conversion runs through the resumable batch migrator.

mod batch;
mod gateway;
mod phase;

pub use batch::{
    BatchMigrator, MigrationError, MigrationReport, MigrationSnapshot, SkippedRecord,
};
pub use gateway::{
    select_gateway, DualWriteGateway, LegacyOnlyGateway, MigrateOnReadGateway, PolicyGateway,
    PolicyRecord, TemplateOnlyGateway,
};
pub use phase::{BatchConfig, MigrationPhase, PhaseConfig};
