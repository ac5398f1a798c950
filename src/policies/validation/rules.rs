use chrono::{Days, Months, NaiveDate};
use rust_decimal::Decimal;

use super::config::ValidationConfig;
use super::ValidationReport;

pub(crate) const POLICY_NUMBER_MIN: usize = 3;
pub(crate) const POLICY_NUMBER_MAX: usize = 50;
pub(crate) const PROVIDER_MIN: usize = 2;
pub(crate) const PROVIDER_MAX: usize = 100;
pub(crate) const DESCRIPTION_MAX: usize = 500;
pub(crate) const MAX_TERM_MONTHS: u32 = 120;

const PLACEHOLDER_MARKERS: [&str; 2] = ["test", "example"];

fn premium_cap() -> Decimal {
    Decimal::from(10_000_000_u32)
}

fn commission_cap() -> Decimal {
    Decimal::from(1_000_000_u32)
}

fn low_premium_floor() -> Decimal {
    Decimal::from(100_u32)
}

fn approval_premium_ceiling() -> Decimal {
    Decimal::from(500_000_u32)
}

pub(crate) fn check_policy_number(value: &str, config: &ValidationConfig, report: &mut ValidationReport) {
    let value = value.trim();
    if value.is_empty() {
        report.error("policy_number", "Policy number is required");
        return;
    }

    if value.len() < POLICY_NUMBER_MIN {
        report.flag(
            config.strict_mode,
            "policy_number",
            "Policy number must be at least 3 characters",
        );
    } else if value.len() > POLICY_NUMBER_MAX {
        report.flag(
            config.strict_mode,
            "policy_number",
            "Policy number must be at most 50 characters",
        );
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        report.flag(
            config.strict_mode,
            "policy_number",
            "Policy number can only contain letters, numbers, hyphens, underscores",
        );
    }

    if has_repeated_run(value, 4) {
        report.warn(
            "policy_number",
            "Policy number contains 4 or more repeated identical characters",
        );
    }

    if contains_placeholder(value) {
        report.warn("policy_number", "Policy number looks like placeholder data");
    }
}

pub(crate) fn check_provider(value: &str, config: &ValidationConfig, report: &mut ValidationReport) {
    let value = value.trim();
    if value.is_empty() {
        report.error("provider", "Provider is required");
        return;
    }

    if value.len() < PROVIDER_MIN {
        report.flag(
            config.strict_mode,
            "provider",
            "Provider must be at least 2 characters",
        );
    } else if value.len() > PROVIDER_MAX {
        report.flag(
            config.strict_mode,
            "provider",
            "Provider must be at most 100 characters",
        );
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '&' | '.' | ',' | '(' | ')'))
    {
        report.flag(
            config.strict_mode,
            "provider",
            "Provider can only contain letters, numbers, spaces, and - & . , ( )",
        );
    }

    if contains_placeholder(value) {
        report.warn("provider", "Provider looks like placeholder data");
    }
}

pub(crate) fn check_description(value: Option<&str>, report: &mut ValidationReport) {
    if let Some(description) = value {
        if description.len() > DESCRIPTION_MAX {
            report.error(
                "description",
                "Description must be at most 500 characters",
            );
        }
    }
}

pub(crate) fn check_premium(premium: Decimal, config: &ValidationConfig, report: &mut ValidationReport) {
    if !config.validate_amounts {
        return;
    }

    if premium <= Decimal::ZERO {
        report.error("premium_amount", "Premium must be greater than zero");
        return;
    }
    if premium > premium_cap() {
        report.error("premium_amount", "Premium cannot exceed 10,000,000");
        return;
    }

    if premium < low_premium_floor() {
        report.warn("premium_amount", "Premium below 100 is unusually low");
    } else if premium > approval_premium_ceiling() {
        report.warn("premium_amount", "Premium above 500,000 may require approval");
    }
}

pub(crate) fn check_commission(
    commission: Decimal,
    premium: Decimal,
    config: &ValidationConfig,
    report: &mut ValidationReport,
) {
    // The commission-vs-premium invariant holds in every phase.
    if commission > premium {
        report.error(
            "commission_amount",
            "Commission cannot be greater than premium amount",
        );
    }

    if !config.validate_amounts {
        return;
    }

    if commission < Decimal::ZERO {
        report.error("commission_amount", "Commission cannot be negative");
        return;
    }
    if commission > commission_cap() {
        report.error("commission_amount", "Commission cannot exceed 1,000,000");
        return;
    }

    if premium > Decimal::ZERO {
        if commission * Decimal::TWO > premium {
            report.warn("commission_amount", "Commission exceeds 50% of premium");
        } else if commission > Decimal::ZERO && commission * Decimal::ONE_HUNDRED < premium {
            report.warn("commission_amount", "Commission is below 1% of premium");
        }
    }
}

pub(crate) fn check_start_date(
    start: NaiveDate,
    today: NaiveDate,
    config: &ValidationConfig,
    report: &mut ValidationReport,
) {
    if !config.validate_dates {
        return;
    }

    let future_limit = today.checked_add_months(Months::new(12));
    let past_limit = today.checked_sub_months(Months::new(24));

    if matches!(future_limit, Some(limit) if start > limit) {
        report.error(
            "start_date",
            "Start date cannot be more than 1 year in the future",
        );
        return;
    }
    if matches!(past_limit, Some(limit) if start < limit) {
        report.error(
            "start_date",
            "Start date cannot be more than 2 years in the past",
        );
        return;
    }

    if matches!(today.checked_add_days(Days::new(90)), Some(limit) if start > limit) {
        report.warn("start_date", "Start date is more than 90 days in the future");
    } else if matches!(today.checked_sub_days(Days::new(365)), Some(limit) if start < limit) {
        report.warn("start_date", "Start date is more than 365 days in the past");
    }
}

pub(crate) fn check_duration(months: u32, config: &ValidationConfig, report: &mut ValidationReport) {
    if !config.validate_dates {
        return;
    }

    if months == 0 || months > MAX_TERM_MONTHS {
        report.error(
            "duration_months",
            "Duration must be between 1 and 120 months",
        );
        return;
    }

    if months < 6 {
        report.warn("duration_months", "Terms under 6 months are unusually short");
    } else if months > 60 {
        report.warn("duration_months", "Terms over 60 months are unusually long");
    }
}

/// Resolve the effective expiry date: an explicit date wins, otherwise the
/// term is derived from `start_date + duration_months`.
pub fn resolve_expiry(
    start: NaiveDate,
    expiry: Option<NaiveDate>,
    duration_months: Option<u32>,
) -> Option<NaiveDate> {
    match (expiry, duration_months) {
        (Some(date), _) => Some(date),
        (None, Some(months)) => start.checked_add_months(Months::new(months)),
        (None, None) => None,
    }
}

pub(crate) fn check_expiry(start: NaiveDate, expiry: NaiveDate, report: &mut ValidationReport) {
    // Temporal ordering holds in every phase, like the amount invariant.
    if expiry <= start {
        report.error("expiry_date", "Expiry date must be after the start date");
        return;
    }

    if matches!(start.checked_add_months(Months::new(MAX_TERM_MONTHS)), Some(limit) if expiry > limit)
    {
        report.error(
            "expiry_date",
            "Expiry date cannot be more than 10 years after the start date",
        );
    }
}

fn has_repeated_run(value: &str, run: usize) -> bool {
    let mut previous = None;
    let mut count = 0;
    for c in value.chars() {
        if Some(c) == previous {
            count += 1;
            if count >= run {
                return true;
            }
        } else {
            previous = Some(c);
            count = 1;
        }
    }
    false
}

fn contains_placeholder(value: &str) -> bool {
    let lowered = value.to_lowercase();
    PLACEHOLDER_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}
