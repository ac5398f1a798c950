use std::env;

use serde::{Deserialize, Serialize};

use crate::policies::validation::ValidationConfig;

/// Named rollout stage. Read once at process start; changing phases requires
/// restarting any migration run in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    Preparation,
    Migration,
    Transition,
    Complete,
}

impl MigrationPhase {
    pub fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "migration" => Self::Migration,
            "transition" => Self::Transition,
            "complete" => Self::Complete,
            _ => Self::Preparation,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            MigrationPhase::Preparation => "preparation",
            MigrationPhase::Migration => "migration",
            MigrationPhase::Transition => "transition",
            MigrationPhase::Complete => "complete",
        }
    }
}

/// Batch-migration dials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub enable_auto_migration: bool,
    pub enable_rollback: bool,
    pub backup_retention_days: u32,
}

/// Full phase configuration: the three read/write knobs plus the batch and
/// validation bundles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub phase: MigrationPhase,
    pub use_template_system: bool,
    pub allow_fallback: bool,
    pub migrate_on_read: bool,
    pub batch: BatchConfig,
    pub validation: ValidationConfig,
}

impl PhaseConfig {
    pub fn for_phase(phase: MigrationPhase) -> Self {
        match phase {
            MigrationPhase::Preparation => Self {
                phase,
                use_template_system: false,
                allow_fallback: false,
                migrate_on_read: false,
                batch: BatchConfig {
                    batch_size: 100,
                    enable_auto_migration: false,
                    enable_rollback: true,
                    backup_retention_days: 30,
                },
                validation: ValidationConfig::strict(),
            },
            MigrationPhase::Migration => Self {
                phase,
                use_template_system: true,
                allow_fallback: true,
                migrate_on_read: false,
                batch: BatchConfig {
                    batch_size: 100,
                    enable_auto_migration: true,
                    enable_rollback: true,
                    backup_retention_days: 30,
                },
                validation: ValidationConfig {
                    strict_mode: true,
                    // Rows from both shapes may transiently collide during
                    // the bulk copy.
                    allow_duplicates: true,
                    validate_dates: true,
                    validate_amounts: true,
                },
            },
            MigrationPhase::Transition => Self {
                phase,
                use_template_system: true,
                allow_fallback: true,
                migrate_on_read: true,
                batch: BatchConfig {
                    batch_size: 100,
                    enable_auto_migration: true,
                    enable_rollback: true,
                    backup_retention_days: 30,
                },
                validation: ValidationConfig {
                    // Admit legacy records that would fail current format
                    // rules while keeping amount and date checks.
                    strict_mode: false,
                    allow_duplicates: true,
                    validate_dates: true,
                    validate_amounts: true,
                },
            },
            MigrationPhase::Complete => Self {
                phase,
                use_template_system: true,
                allow_fallback: false,
                migrate_on_read: false,
                batch: BatchConfig {
                    batch_size: 100,
                    enable_auto_migration: false,
                    enable_rollback: false,
                    backup_retention_days: 7,
                },
                validation: ValidationConfig::strict(),
            },
        }
    }

    /// Resolve the phase from `POLICY_MIGRATION_PHASE` and apply per-knob
    /// overrides. An unset or unparseable override falls back to the phase
    /// default.
    pub fn from_env() -> Self {
        let phase = MigrationPhase::from_str(
            &env::var("POLICY_MIGRATION_PHASE").unwrap_or_else(|_| "preparation".to_string()),
        );
        let mut config = Self::for_phase(phase);

        if let Some(value) = env_flag("USE_TEMPLATE_SYSTEM") {
            config.use_template_system = value;
        }
        if let Some(value) = env_flag("ALLOW_FALLBACK") {
            config.allow_fallback = value;
        }
        if let Some(value) = env_flag("MIGRATE_ON_READ") {
            config.migrate_on_read = value;
        }
        if let Some(value) = env_usize("MIGRATION_BATCH_SIZE") {
            config.batch.batch_size = value.max(1);
        }
        if let Some(value) = env_flag("ENABLE_AUTO_MIGRATION") {
            config.batch.enable_auto_migration = value;
        }
        if let Some(value) = env_flag("ENABLE_ROLLBACK") {
            config.batch.enable_rollback = value;
        }
        if let Some(value) = env_usize("BACKUP_RETENTION_DAYS") {
            config.batch.backup_retention_days = value as u32;
        }
        if let Some(value) = env_flag("STRICT_MODE") {
            config.validation.strict_mode = value;
        }
        if let Some(value) = env_flag("ALLOW_DUPLICATES") {
            config.validation.allow_duplicates = value;
        }
        if let Some(value) = env_flag("VALIDATE_DATES") {
            config.validation.validate_dates = value;
        }
        if let Some(value) = env_flag("VALIDATE_AMOUNTS") {
            config.validation.validate_amounts = value;
        }

        config
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = env::var(name).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok()?.trim().parse().ok()
}
