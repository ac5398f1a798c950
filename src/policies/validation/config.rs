use serde::{Deserialize, Serialize};

/// Strictness knobs applied by the rule engine. Passed in explicitly so rule
/// evaluation stays pure and independently testable; phase presets live in
/// the migration module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// When false, policy-number and provider format violations are reported
    /// as warnings instead of errors so legacy records can be admitted.
    pub strict_mode: bool,
    /// When true, the template uniqueness pre-check is skipped. The storage
    /// constraint still applies on insert.
    pub allow_duplicates: bool,
    /// Gates the start-date window and duration rules.
    pub validate_dates: bool,
    /// Gates the premium and commission range rules. The
    /// commission-not-above-premium invariant is never waived.
    pub validate_amounts: bool,
}

impl ValidationConfig {
    pub const fn strict() -> Self {
        Self {
            strict_mode: true,
            allow_duplicates: false,
            validate_dates: true,
            validate_amounts: true,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self::strict()
    }
}
