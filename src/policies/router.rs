use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::audit::{AuditReader, AuditRecorder};
use super::domain::{
    ClientId, DisplayStatus, InstanceDraft, InstanceId, InstancePatch, PolicyStatus, PolicyType,
    TemplateDraft, TemplateId,
};
use super::expiry::{days_until_expiry, display_status, expiry_warning_text};
use super::instances::PolicyInstanceService;
use super::repository::{ClientDirectory, InstanceStore, RepositoryError, TemplateStore};
use super::templates::{
    PolicyServiceError, PolicyTemplateService, SortOrder, TemplateQuery, TemplateSort,
};
use super::validation::resolve_expiry;

/// Shared router state: the two services plus the audit read side.
pub struct PolicyRouterState<S, C, A> {
    pub templates: Arc<PolicyTemplateService<S, A>>,
    pub instances: Arc<PolicyInstanceService<S, C, A>>,
    pub audit: Arc<A>,
}

impl<S, C, A> Clone for PolicyRouterState<S, C, A> {
    fn clone(&self) -> Self {
        Self {
            templates: self.templates.clone(),
            instances: self.instances.clone(),
            audit: self.audit.clone(),
        }
    }
}

/// Router builder exposing the policy engine's HTTP surface.
pub fn policy_router<S, C, A>(state: PolicyRouterState<S, C, A>) -> Router
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    Router::new()
        .route(
            "/api/v1/policy-templates",
            get(list_templates::<S, C, A>).post(create_template::<S, C, A>),
        )
        .route(
            "/api/v1/policy-templates/search",
            get(search_templates::<S, C, A>),
        )
        .route(
            "/api/v1/policy-templates/expiry/warnings",
            get(expiry_warnings::<S, C, A>),
        )
        .route(
            "/api/v1/policy-templates/expiry/summary",
            get(expiry_summary::<S, C, A>),
        )
        .route(
            "/api/v1/policy-templates/expiry/update-expired",
            post(run_sweep::<S, C, A>),
        )
        .route(
            "/api/v1/policy-templates/:id",
            put(update_template::<S, C, A>).delete(delete_template::<S, C, A>),
        )
        .route(
            "/api/v1/policy-instances",
            post(create_instance::<S, C, A>),
        )
        .route(
            "/api/v1/policy-instances/validate-association",
            post(validate_association::<S, C, A>),
        )
        .route(
            "/api/v1/policy-instances/calculate-expiry",
            post(calculate_expiry),
        )
        .route(
            "/api/v1/policy-instances/:id",
            get(get_instance::<S, C, A>)
                .put(update_instance::<S, C, A>)
                .delete(delete_instance::<S, C, A>),
        )
        .route(
            "/api/v1/policy-instances/:id/status",
            patch(update_instance_status::<S, C, A>),
        )
        .route(
            "/api/v1/clients/:client_id/policy-stats",
            get(client_stats::<S, C, A>),
        )
        .route(
            "/api/v1/clients/:client_id/audit",
            get(client_audit::<S, C, A>),
        )
        .route("/api/v1/audit", get(audit_range::<S, C, A>))
        .with_state(state)
}

fn actor_from(headers: &HeaderMap) -> String {
    headers
        .get("x-actor-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("api")
        .to_string()
}

fn today_or(as_of: Option<NaiveDate>) -> NaiveDate {
    as_of.unwrap_or_else(|| Local::now().date_naive())
}

fn error_response(error: PolicyServiceError) -> Response {
    match error {
        PolicyServiceError::Validation(report) => {
            let payload = json!({
                "error": "validation_failed",
                "errors": report.errors,
                "warnings": report.warnings,
            });
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        }
        PolicyServiceError::Repository(RepositoryError::Conflict) => {
            let payload = json!({ "error": "policy number is already in use" });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        PolicyServiceError::Repository(RepositoryError::NotFound) => {
            let payload = json!({ "error": "record not found" });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        other => {
            let payload = json!({ "error": other.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TemplateListParams {
    search: Option<String>,
    /// Comma-separated policy type labels.
    policy_types: Option<String>,
    /// Comma-separated provider names.
    providers: Option<String>,
    has_instances: Option<bool>,
    sort: Option<TemplateSort>,
    order: Option<SortOrder>,
    page: Option<usize>,
    per_page: Option<usize>,
    #[serde(default)]
    include_stats: bool,
    as_of: Option<NaiveDate>,
}

async fn list_templates<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    Query(params): Query<TemplateListParams>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    let mut policy_types = Vec::new();
    if let Some(raw) = &params.policy_types {
        for label in raw.split(',').filter(|label| !label.trim().is_empty()) {
            match PolicyType::from_label(label) {
                Some(policy_type) => policy_types.push(policy_type),
                None => {
                    let payload = json!({
                        "error": "validation_failed",
                        "errors": { "policy_types": format!("unknown policy type '{}'", label.trim()) },
                    });
                    return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
                }
            }
        }
    }

    let providers = params
        .providers
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|provider| !provider.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    let query = TemplateQuery {
        search: params.search,
        policy_types,
        providers,
        has_instances: params.has_instances,
        sort: params.sort.unwrap_or_default(),
        order: params.order.unwrap_or_default(),
        page: params.page.unwrap_or(1),
        per_page: params.per_page.unwrap_or(25),
        include_stats: params.include_stats,
    };

    match state.templates.list(&query, today_or(params.as_of)) {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn create_template<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    headers: HeaderMap,
    Json(draft): Json<TemplateDraft>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    let actor = actor_from(&headers);
    match state
        .templates
        .create(&actor, &draft, Local::now().date_naive())
    {
        Ok(template) => (StatusCode::CREATED, Json(template)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn update_template<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(draft): Json<TemplateDraft>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    let actor = actor_from(&headers);
    match state.templates.update(&actor, TemplateId(id), &draft) {
        Ok(template) => (StatusCode::OK, Json(template)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn delete_template<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    let actor = actor_from(&headers);
    match state.templates.delete(&actor, TemplateId(id)) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn search_templates<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    Query(params): Query<SearchParams>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    match state.templates.search(&params.q) {
        Ok(templates) => (StatusCode::OK, Json(templates)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateInstanceRequest {
    pub client_id: String,
    pub template_id: TemplateId,
    #[serde(flatten)]
    pub draft: InstanceDraft,
    pub as_of: Option<NaiveDate>,
}

async fn create_instance<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    headers: HeaderMap,
    Json(request): Json<CreateInstanceRequest>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    let actor = actor_from(&headers);
    let today = today_or(request.as_of);
    match state.instances.create(
        &actor,
        ClientId(request.client_id),
        request.template_id,
        &request.draft,
        today,
    ) {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AsOfParams {
    as_of: Option<NaiveDate>,
}

async fn get_instance<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    Path(id): Path<Uuid>,
    Query(params): Query<AsOfParams>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    match state
        .instances
        .get(InstanceId(id), today_or(params.as_of))
    {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn update_instance<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(patch): Json<InstancePatch>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    let actor = actor_from(&headers);
    match state
        .instances
        .update(&actor, InstanceId(id), &patch, Local::now().date_naive())
    {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusChangeRequest {
    pub status: PolicyStatus,
}

async fn update_instance_status<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<StatusChangeRequest>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    let actor = actor_from(&headers);
    match state.instances.update_status(
        &actor,
        InstanceId(id),
        request.status,
        Local::now().date_naive(),
    ) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn delete_instance<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    let actor = actor_from(&headers);
    match state.instances.delete(&actor, InstanceId(id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssociationRequest {
    pub client_id: String,
    pub template_id: Option<TemplateId>,
    #[serde(flatten)]
    pub draft: InstanceDraft,
    pub as_of: Option<NaiveDate>,
}

/// Pure pre-submit check mirroring the create path, without persistence.
async fn validate_association<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    Json(request): Json<AssociationRequest>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    let today = today_or(request.as_of);
    let client_id = ClientId(request.client_id);
    let validation = state
        .instances
        .engine()
        .validate_association(&client_id, &request.draft, today);

    let template_found = match request.template_id {
        Some(id) => Some(state.templates.get(id).is_ok()),
        None => None,
    };

    let payload = json!({
        "valid": validation.is_valid(),
        "errors": validation.report.errors,
        "warnings": validation.report.warnings,
        "expiry_date": validation.expiry_date,
        "template_found": template_found,
    });
    (StatusCode::OK, Json(payload)).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct CalculateExpiryRequest {
    pub start_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub duration_months: Option<u32>,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CalculateExpiryResponse {
    pub expiry_date: NaiveDate,
    pub days_remaining: i64,
    pub display_status: DisplayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_warning: Option<String>,
}

/// Pure date computation mirroring the status engine, without persistence.
async fn calculate_expiry(Json(request): Json<CalculateExpiryRequest>) -> Response {
    let Some(expiry_date) = resolve_expiry(
        request.start_date,
        request.expiry_date,
        request.duration_months,
    ) else {
        let payload = json!({
            "error": "validation_failed",
            "errors": { "expiry_date": "Expiry date or duration is required" },
        });
        return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
    };

    let today = today_or(request.as_of);
    let response = CalculateExpiryResponse {
        expiry_date,
        days_remaining: days_until_expiry(expiry_date, today),
        display_status: display_status(PolicyStatus::Active, expiry_date, today),
        expiry_warning: expiry_warning_text(PolicyStatus::Active, expiry_date, today),
    };
    (StatusCode::OK, Json(response)).into_response()
}

async fn expiry_warnings<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    Query(params): Query<AsOfParams>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    match state.instances.expiry_warnings(today_or(params.as_of)) {
        Ok(warnings) => (StatusCode::OK, Json(warnings)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn expiry_summary<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    Query(params): Query<AsOfParams>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    match state.instances.expiry_summary(today_or(params.as_of)) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn run_sweep<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    headers: HeaderMap,
    Query(params): Query<AsOfParams>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    let actor = actor_from(&headers);
    match state.instances.sweep(&actor, today_or(params.as_of)) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn client_stats<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    Path(client_id): Path<String>,
    Query(params): Query<AsOfParams>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    match state
        .instances
        .stats_for_client(&ClientId(client_id), today_or(params.as_of))
    {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn client_audit<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    Path(client_id): Path<String>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    let client = ClientId(client_id);
    let payload = json!({
        "entries": state.audit.client_entries(&client),
        "stats": state.audit.client_stats(&client),
    });
    (StatusCode::OK, Json(payload)).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuditRangeParams {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

async fn audit_range<S, C, A>(
    State(state): State<PolicyRouterState<S, C, A>>,
    Query(params): Query<AuditRangeParams>,
) -> Response
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + AuditReader + 'static,
{
    let entries = state.audit.range_entries(params.from, params.to);
    (StatusCode::OK, Json(entries)).into_response()
}
