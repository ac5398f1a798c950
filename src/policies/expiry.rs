//! Read-time status derivation.
//!
//! The stored status flag lags the calendar until the sweep runs; display
//! status is therefore recomputed on every read and never persisted. The one
//! write-back path is [`crate::policies::instances::PolicyInstanceService::sweep`].

use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{ClientId, DisplayStatus, InstanceId, PolicyInstance, PolicyStatus, TemplateId};

/// Instances within this many days of expiry are surfaced as expiring soon.
pub const EXPIRING_SOON_WINDOW_DAYS: i64 = 30;

/// Whole days between today and the expiry date. Negative once lapsed.
pub fn days_until_expiry(expiry: NaiveDate, today: NaiveDate) -> i64 {
    (expiry - today).num_days()
}

/// Derive the status shown to callers. Date comparison is date-only; a
/// manual cancellation or administrative expiry always wins, and a lapsed
/// date is always shown as expired even while the stored flag still says
/// active.
pub fn display_status(status: PolicyStatus, expiry: NaiveDate, today: NaiveDate) -> DisplayStatus {
    match status {
        PolicyStatus::Cancelled => DisplayStatus::Cancelled,
        PolicyStatus::Expired => DisplayStatus::Expired,
        PolicyStatus::Active => {
            let remaining = days_until_expiry(expiry, today);
            if remaining <= 0 {
                DisplayStatus::Expired
            } else if remaining <= EXPIRING_SOON_WINDOW_DAYS {
                DisplayStatus::ExpiringSoon
            } else {
                DisplayStatus::Active
            }
        }
    }
}

/// Human-readable countdown consistent with [`display_status`]. `None` for
/// cancelled instances and for active instances with more than 30 days left.
pub fn expiry_warning_text(
    status: PolicyStatus,
    expiry: NaiveDate,
    today: NaiveDate,
) -> Option<String> {
    match display_status(status, expiry, today) {
        DisplayStatus::Cancelled | DisplayStatus::Active => None,
        DisplayStatus::Expired => Some("This policy has expired".to_string()),
        DisplayStatus::ExpiringSoon => {
            let remaining = days_until_expiry(expiry, today);
            if remaining == 1 {
                Some("Expires tomorrow".to_string())
            } else {
                Some(format!("Expires in {remaining} days"))
            }
        }
    }
}

/// One row of the expiry-warning report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpiryWarning {
    pub instance_id: InstanceId,
    pub template_id: TemplateId,
    pub client_id: ClientId,
    pub policy_number: String,
    pub expiry_date: NaiveDate,
    pub days_remaining: i64,
    pub display_status: DisplayStatus,
    pub message: String,
}

/// Display-status counts across a set of instances at a given date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpirySummary {
    pub total: usize,
    pub active: usize,
    pub expiring_soon: usize,
    pub expired: usize,
    pub cancelled: usize,
}

impl ExpirySummary {
    pub fn observe(&mut self, status: DisplayStatus) {
        self.total += 1;
        match status {
            DisplayStatus::Active => self.active += 1,
            DisplayStatus::ExpiringSoon => self.expiring_soon += 1,
            DisplayStatus::Expired => self.expired += 1,
            DisplayStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn for_instances(instances: &[PolicyInstance], today: NaiveDate) -> Self {
        let mut summary = Self::default();
        for instance in instances {
            summary.observe(display_status(instance.status, instance.expiry_date, today));
        }
        summary
    }
}

/// Result of one expiry sweep. Re-running against already-expired rows is a
/// no-op because the underlying update is conditional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    pub updated: usize,
}
