use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use policydesk::config::AppConfig;
use policydesk::error::AppError;
use policydesk::policies::{
    policy_router, MemoryAuditLog, MemoryPolicyStore, OpenClientDirectory, PolicyInstanceService,
    PolicyRouterState, PolicyTemplateService, ValidationEngine,
};
use policydesk::telemetry;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "policydesk",
    about = "Policy administration service for the agency CRM",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the effective migration phase configuration
    Phase,
    /// Validate a template or instance payload without persisting it
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Path to a JSON template draft
    #[arg(long, conflicts_with = "instance")]
    template: Option<PathBuf>,
    /// Path to a JSON instance draft
    #[arg(long)]
    instance: Option<PathBuf>,
    /// Evaluation date for date-window rules (defaults to today)
    #[arg(long, value_parser = parse_date)]
    as_of: Option<NaiveDate>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Phase => run_phase(),
        Command::Validate(args) => run_validate(args),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let store = Arc::new(MemoryPolicyStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let clients = Arc::new(OpenClientDirectory);
    let engine = ValidationEngine::new(config.migration.validation);

    let templates = Arc::new(PolicyTemplateService::new(
        store.clone(),
        audit.clone(),
        engine.clone(),
    ));
    let instances = Arc::new(PolicyInstanceService::new(
        store,
        clients,
        audit.clone(),
        engine,
    ));

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .layer(prometheus_layer)
        .with_state(state)
        .merge(policy_router(PolicyRouterState {
            templates,
            instances,
            audit,
        }));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        phase = config.migration.phase.label(),
        "policy administration service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

fn run_phase() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let rendered = serde_json::to_string_pretty(&config.migration)
        .unwrap_or_else(|_| "{}".to_string());
    println!("{rendered}");
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let engine = ValidationEngine::new(config.migration.validation);
    let as_of = args.as_of.unwrap_or_else(|| Local::now().date_naive());

    if let Some(path) = args.template {
        let raw = std::fs::read_to_string(path)?;
        let draft = serde_json::from_str(&raw)
            .map_err(|err| AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))?;
        let report = engine.validate_template(&draft);
        render_report(json!({
            "valid": report.is_valid(),
            "errors": report.errors,
            "warnings": report.warnings,
        }));
        return Ok(());
    }

    if let Some(path) = args.instance {
        let raw = std::fs::read_to_string(path)?;
        let draft = serde_json::from_str(&raw)
            .map_err(|err| AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))?;
        let validation = engine.validate_instance(&draft, as_of);
        render_report(json!({
            "valid": validation.is_valid(),
            "errors": validation.report.errors,
            "warnings": validation.report.warnings,
            "expiry_date": validation.expiry_date,
        }));
        return Ok(());
    }

    eprintln!("nothing to validate: pass --template or --instance");
    Ok(())
}

fn render_report(payload: serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
    );
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
