use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for policy templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateId(pub Uuid);

impl TemplateId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Identifier wrapper for policy instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Opaque client identifier issued by the CRM's client module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub String);

/// Line of business covered by a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    Life,
    Health,
    Auto,
    Home,
    Business,
}

impl PolicyType {
    pub const ALL: [PolicyType; 5] = [
        PolicyType::Life,
        PolicyType::Health,
        PolicyType::Auto,
        PolicyType::Home,
        PolicyType::Business,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            PolicyType::Life => "life",
            PolicyType::Health => "health",
            PolicyType::Auto => "auto",
            PolicyType::Home => "home",
            PolicyType::Business => "business",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "life" => Some(PolicyType::Life),
            "health" => Some(PolicyType::Health),
            "auto" => Some(PolicyType::Auto),
            "home" => Some(PolicyType::Home),
            "business" => Some(PolicyType::Business),
            _ => None,
        }
    }
}

/// Persisted instance status. Authoritative for states that are not derived
/// from dates; `Expired` lags behind the calendar until the sweep runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Active,
    Expired,
    Cancelled,
}

impl PolicyStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PolicyStatus::Active => "active",
            PolicyStatus::Expired => "expired",
            PolicyStatus::Cancelled => "cancelled",
        }
    }
}

/// Read-time status shown to callers. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Active,
    ExpiringSoon,
    Expired,
    Cancelled,
}

impl DisplayStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DisplayStatus::Active => "active",
            DisplayStatus::ExpiringSoon => "expiring_soon",
            DisplayStatus::Expired => "expired",
            DisplayStatus::Cancelled => "cancelled",
        }
    }
}

/// Reusable policy definition shared across clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTemplate {
    pub id: TemplateId,
    pub policy_number: String,
    pub policy_type: PolicyType,
    pub provider: String,
    pub description: Option<String>,
    pub created_on: NaiveDate,
}

/// Inbound payload for creating or replacing a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDraft {
    pub policy_number: String,
    pub policy_type: PolicyType,
    pub provider: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Concrete policy terms binding one client to one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyInstance {
    pub id: InstanceId,
    pub template_id: TemplateId,
    pub client_id: ClientId,
    pub premium_amount: Decimal,
    pub commission_amount: Decimal,
    pub start_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub status: PolicyStatus,
}

/// Inbound payload for attaching a template to a client. The expiry may be
/// given directly or derived from `start_date + duration_months`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDraft {
    pub premium_amount: Decimal,
    pub commission_amount: Decimal,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub duration_months: Option<u32>,
    #[serde(default)]
    pub status: Option<PolicyStatus>,
}

/// Partial update for an existing instance. Absent fields keep their stored
/// value; cross-field rules are re-checked against the merged record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstancePatch {
    #[serde(default)]
    pub premium_amount: Option<Decimal>,
    #[serde(default)]
    pub commission_amount: Option<Decimal>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub duration_months: Option<u32>,
}

/// Single-row legacy shape retained while the rollout is in flight. One row
/// per (client, policy number); nothing is shared across clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyPolicy {
    pub client_id: ClientId,
    pub policy_number: String,
    pub policy_type: PolicyType,
    pub provider: String,
    pub description: Option<String>,
    pub premium_amount: Decimal,
    pub commission_amount: Decimal,
    pub start_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub status: PolicyStatus,
}

impl LegacyPolicy {
    /// Stable ordering key used by batch migration high-water marks.
    pub fn watermark(&self) -> (ClientId, String) {
        (self.client_id.clone(), self.policy_number.to_lowercase())
    }
}

/// Per-client aggregates computed over display status, not stored status,
/// so lapsed-but-unswept instances never count as active.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientPolicyStats {
    pub total: usize,
    pub active: usize,
    pub premium_total: Decimal,
    pub commission_total: Decimal,
}
