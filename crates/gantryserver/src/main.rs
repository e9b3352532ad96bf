use actix_cors::Cors;
use actix_web::{
    get, post, web, App, HttpResponse, HttpServer, Responder, Result as ActixResult,
};
use gantrycore::{EngineError, TaskDefinition, WorkflowDefinition};
use gantryruntime::{Engine, EngineConfig};
use gantrytasks::{BasicValidator, HttpTaskRunner, ReqwestTransport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Application state shared across handlers
struct AppState {
    engine: Arc<Engine>,
}

/// Request body for workflow execution and dry runs
#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    #[serde(default)]
    input: serde_json::Value,
}

/// Response for catalog registration
#[derive(Debug, Serialize)]
struct RegisterResponse {
    name: String,
    message: String,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "gantry"
    }))
}

/// List registered workflows
#[get("/api/workflows")]
async fn list_workflows(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    Ok(HttpResponse::Ok().json(data.engine.workflow_names().await))
}

/// Register a workflow definition
#[post("/api/workflows")]
async fn create_workflow(
    data: web::Data<AppState>,
    workflow: web::Json<WorkflowDefinition>,
) -> ActixResult<impl Responder> {
    let workflow = workflow.into_inner();
    let name = workflow.name.clone();

    info!("Registering workflow: {}", name);
    data.engine.register_workflow(workflow).await;

    Ok(HttpResponse::Created().json(RegisterResponse {
        name,
        message: "Workflow registered successfully".to_string(),
    }))
}

/// Get a specific workflow
#[get("/api/workflows/{name}")]
async fn get_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let name = path.into_inner();
    match data.engine.get_workflow(&name).await {
        Some(workflow) => Ok(HttpResponse::Ok().json(workflow)),
        None => Ok(HttpResponse::NotFound().json(ErrorResponse {
            error: format!("Workflow {} not found", name),
        })),
    }
}

/// List registered task definitions
#[get("/api/tasks")]
async fn list_tasks(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    Ok(HttpResponse::Ok().json(data.engine.task_names().await))
}

/// Register a task definition
#[post("/api/tasks")]
async fn create_task(
    data: web::Data<AppState>,
    task: web::Json<TaskDefinition>,
) -> ActixResult<impl Responder> {
    let task = task.into_inner();
    let name = task.name.clone();

    info!("Registering task: {}", name);
    data.engine.register_task(task).await;

    Ok(HttpResponse::Created().json(RegisterResponse {
        name,
        message: "Task registered successfully".to_string(),
    }))
}

/// Execute a workflow synchronously.
///
/// Always returns 200 with a structured result when the workflow ran;
/// the `success` flag inside carries the outcome, so callers can inspect
/// which specific tasks failed and why.
#[post("/api/workflows/{name}/execute")]
async fn execute_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<ExecuteRequest>,
) -> ActixResult<impl Responder> {
    let name = path.into_inner();
    let input = req.into_inner().input;

    match data.engine.execute_workflow(&name, input).await {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(EngineError::WorkflowNotFound(name)) => Ok(HttpResponse::NotFound().json(
            ErrorResponse {
                error: format!("Workflow {} not found", name),
            },
        )),
        Err(e) => Ok(HttpResponse::UnprocessableEntity().json(ErrorResponse {
            error: e.to_string(),
        })),
    }
}

/// Plan a workflow without executing anything: parallel groups, statically
/// resolved templates, and any issues found. Cycles come back as 422 with
/// the exact cycle path.
#[post("/api/workflows/{name}/dry-run")]
async fn dry_run_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<ExecuteRequest>,
) -> ActixResult<impl Responder> {
    let name = path.into_inner();
    let input = req.into_inner().input;

    match data.engine.dry_run(&name, input).await {
        Ok(plan) => Ok(HttpResponse::Ok().json(plan)),
        Err(EngineError::WorkflowNotFound(name)) => Ok(HttpResponse::NotFound().json(
            ErrorResponse {
                error: format!("Workflow {} not found", name),
            },
        )),
        Err(e) => Ok(HttpResponse::UnprocessableEntity().json(ErrorResponse {
            error: e.to_string(),
        })),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let runner = Arc::new(HttpTaskRunner::new(
        Arc::new(ReqwestTransport::new()),
        Arc::new(BasicValidator),
    ));
    let engine = Arc::new(Engine::new(runner, EngineConfig::default()));

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    info!("Starting gantry server on {}", bind_addr);

    let state = web::Data::new(AppState { engine });

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .service(health_check)
            .service(list_workflows)
            .service(create_workflow)
            .service(get_workflow)
            .service(list_tasks)
            .service(create_task)
            .service(execute_workflow)
            .service(dry_run_workflow)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
