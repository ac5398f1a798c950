//! Field-level and cross-field business rules for templates and instances.
//!
//! Rule evaluation is pure: the same engine runs on the write path and on the
//! pre-submit check endpoints, so callers always see identical results.
//! Errors block a mutation; warnings are advisory and never do.

mod config;
mod rules;

pub use config::ValidationConfig;
pub use rules::resolve_expiry;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{ClientId, InstanceDraft, LegacyPolicy, TemplateDraft};

/// Outcome of a validation pass: field-keyed errors and warnings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: BTreeMap<String, String>,
    pub warnings: BTreeMap<String, String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub(crate) fn warn(&mut self, field: &str, message: impl Into<String>) {
        self.warnings.entry(field.to_string()).or_insert_with(|| message.into());
    }

    /// Report as an error under strict evaluation, otherwise as a warning.
    pub(crate) fn flag(&mut self, hard: bool, field: &str, message: impl Into<String>) {
        if hard {
            self.error(field, message);
        } else {
            self.warn(field, message);
        }
    }
}

/// Instance validation also resolves the effective expiry so callers do not
/// repeat the duration arithmetic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceValidation {
    pub report: ValidationReport,
    pub expiry_date: Option<NaiveDate>,
}

impl InstanceValidation {
    pub fn is_valid(&self) -> bool {
        self.report.is_valid()
    }
}

/// Stateless evaluator applying the configured strictness to payloads.
#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    config: ValidationConfig,
}

impl ValidationEngine {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn validate_template(&self, draft: &TemplateDraft) -> ValidationReport {
        let mut report = ValidationReport::default();
        rules::check_policy_number(&draft.policy_number, &self.config, &mut report);
        rules::check_provider(&draft.provider, &self.config, &mut report);
        rules::check_description(draft.description.as_deref(), &mut report);
        report
    }

    pub fn validate_instance(&self, draft: &InstanceDraft, today: NaiveDate) -> InstanceValidation {
        let mut report = ValidationReport::default();

        rules::check_premium(draft.premium_amount, &self.config, &mut report);
        rules::check_commission(
            draft.commission_amount,
            draft.premium_amount,
            &self.config,
            &mut report,
        );
        rules::check_start_date(draft.start_date, today, &self.config, &mut report);

        if let Some(months) = draft.duration_months {
            rules::check_duration(months, &self.config, &mut report);
        }

        let expiry = resolve_expiry(draft.start_date, draft.expiry_date, draft.duration_months);
        match expiry {
            Some(expiry_date) => rules::check_expiry(draft.start_date, expiry_date, &mut report),
            None => report.error("expiry_date", "Expiry date or duration is required"),
        }

        InstanceValidation {
            report,
            expiry_date: expiry,
        }
    }

    /// Shape check for an association request. Existence of the referenced
    /// template and client is the stores' concern.
    pub fn validate_association(
        &self,
        client_id: &ClientId,
        draft: &InstanceDraft,
        today: NaiveDate,
    ) -> InstanceValidation {
        let mut validation = self.validate_instance(draft, today);
        if client_id.0.trim().is_empty() {
            validation
                .report
                .error("client_id", "Client identifier is required");
        }
        validation
    }

    /// Validate a legacy row before conversion. Intake recency rules do not
    /// apply to historical records; everything else does.
    pub fn validate_legacy(&self, record: &LegacyPolicy) -> ValidationReport {
        let mut report = ValidationReport::default();
        rules::check_policy_number(&record.policy_number, &self.config, &mut report);
        rules::check_provider(&record.provider, &self.config, &mut report);
        rules::check_description(record.description.as_deref(), &mut report);
        rules::check_premium(record.premium_amount, &self.config, &mut report);
        rules::check_commission(
            record.commission_amount,
            record.premium_amount,
            &self.config,
            &mut report,
        );
        rules::check_expiry(record.start_date, record.expiry_date, &mut report);
        if record.client_id.0.trim().is_empty() {
            report.error("client_id", "Client identifier is required");
        }
        report
    }
}
