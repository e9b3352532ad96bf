use anyhow::Result;
use clap::{Parser, Subcommand};
use gantrycore::{
    ExecutionEvent, HttpTaskSpec, TaskDefinition, TaskStep, WorkflowDefinition,
};
use gantryruntime::{Engine, EngineConfig, ExecutionGraph};
use gantrytasks::{BasicValidator, HttpTaskRunner, ReqwestTransport};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "Gantry workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        workflow: PathBuf,

        /// Path to task catalog JSON file (array of task definitions)
        #[arg(short, long)]
        tasks: PathBuf,

        /// Input data as JSON string
        #[arg(short, long)]
        input: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Plan a workflow without executing it
    Plan {
        #[arg(short, long)]
        workflow: PathBuf,

        #[arg(short, long)]
        tasks: PathBuf,

        /// Input data as JSON string
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Validate a workflow file against a task catalog
    Validate {
        #[arg(short, long)]
        workflow: PathBuf,

        #[arg(short, long)]
        tasks: PathBuf,
    },

    /// Create an example workflow and task catalog
    Init {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            workflow,
            tasks,
            input,
            verbose,
        } => {
            let level = if verbose { "debug" } else { "info" };
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(level))
                .init();

            run_workflow(workflow, tasks, input).await?;
        }

        Commands::Plan {
            workflow,
            tasks,
            input,
        } => {
            plan_workflow(workflow, tasks, input).await?;
        }

        Commands::Validate { workflow, tasks } => {
            validate_workflow(workflow, tasks)?;
        }

        Commands::Init { output } => {
            create_example(output)?;
        }
    }

    Ok(())
}

fn load_definitions(
    workflow_path: &PathBuf,
    tasks_path: &PathBuf,
) -> Result<(WorkflowDefinition, Vec<TaskDefinition>)> {
    let workflow: WorkflowDefinition =
        serde_json::from_str(&std::fs::read_to_string(workflow_path)?)?;
    let tasks: Vec<TaskDefinition> = serde_json::from_str(&std::fs::read_to_string(tasks_path)?)?;
    Ok((workflow, tasks))
}

fn parse_input(input: Option<String>) -> Result<serde_json::Value> {
    match input {
        Some(text) => {
            let value: serde_json::Value = serde_json::from_str(&text)?;
            if !value.is_object() {
                return Err(anyhow::anyhow!("Input must be a JSON object"));
            }
            Ok(value)
        }
        None => Ok(json!({})),
    }
}

async fn build_engine(tasks: Vec<TaskDefinition>, workflow: WorkflowDefinition) -> Arc<Engine> {
    let runner = Arc::new(HttpTaskRunner::new(
        Arc::new(ReqwestTransport::new()),
        Arc::new(BasicValidator),
    ));
    let engine = Arc::new(Engine::new(runner, EngineConfig::default()));
    for task in tasks {
        engine.register_task(task).await;
    }
    engine.register_workflow(workflow).await;
    engine
}

async fn run_workflow(
    workflow_path: PathBuf,
    tasks_path: PathBuf,
    input: Option<String>,
) -> Result<()> {
    let (workflow, tasks) = load_definitions(&workflow_path, &tasks_path)?;
    let name = workflow.name.clone();
    let input = parse_input(input)?;

    println!("🚀 Workflow: {}", name);
    println!("   Steps: {}", workflow.steps.len());
    println!("   Tasks in catalog: {}", tasks.len());
    println!();

    let engine = build_engine(tasks, workflow).await;

    // Subscribe to events for real-time output
    let mut events = engine.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::WorkflowStarted { .. } => {
                    println!("▶️  Workflow started");
                }
                ExecutionEvent::LevelStarted { level, steps, .. } => {
                    println!("  🧱 Level {}: {}", level, steps.join(", "));
                }
                ExecutionEvent::TaskStarted { step_id, .. } => {
                    println!("  ⚡ Starting step: {}", step_id);
                }
                ExecutionEvent::TaskCompleted {
                    step_id,
                    duration_ms,
                    ..
                } => {
                    println!("  ✅ Step {} completed in {}ms", step_id, duration_ms);
                }
                ExecutionEvent::TaskFailed { step_id, error, .. } => {
                    println!("  ❌ Step {} failed: {}", step_id, error);
                }
                ExecutionEvent::TaskSkipped {
                    step_id, reason, ..
                } => {
                    println!("  ⏭️  Step {} skipped: {}", step_id, reason);
                }
                ExecutionEvent::WorkflowCompleted {
                    success,
                    duration_ms,
                    ..
                } => {
                    if success {
                        println!("✨ Workflow completed successfully in {}ms", duration_ms);
                    } else {
                        println!("💥 Workflow failed after {}ms", duration_ms);
                    }
                }
            }
        }
    });

    let result = engine.execute_workflow(&name, input).await?;

    // Give the event listener a moment to drain
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    println!();
    println!("📊 Execution Summary:");
    println!("   Success: {}", result.success);
    println!("   Duration: {}ms", result.duration_ms);
    println!(
        "   Steps: {} total, {} succeeded",
        result.tasks.len(),
        result.tasks.values().filter(|t| t.success()).count()
    );

    if !result.output.is_empty() {
        println!();
        println!("📤 Output:");
        println!("{}", serde_json::to_string_pretty(&result.output)?);
    }

    if !result.errors.is_empty() {
        println!();
        println!("⚠️  Errors:");
        for error in &result.errors {
            println!("   • {}", error);
        }
    }

    Ok(())
}

async fn plan_workflow(
    workflow_path: PathBuf,
    tasks_path: PathBuf,
    input: Option<String>,
) -> Result<()> {
    let (workflow, tasks) = load_definitions(&workflow_path, &tasks_path)?;
    let name = workflow.name.clone();
    let input = parse_input(input)?;

    let engine = build_engine(tasks, workflow).await;
    let plan = engine.dry_run(&name, input).await?;

    println!("📋 Plan for workflow: {}", plan.workflow);
    println!();
    println!("Parallel groups:");
    for (index, level) in plan.levels.iter().enumerate() {
        println!("   {}: {}", index, level.join(", "));
    }

    if !plan.resolved.is_empty() {
        println!();
        println!("Statically resolved:");
        let mut keys: Vec<_> = plan.resolved.keys().collect();
        keys.sort();
        for key in keys {
            println!("   {} = {}", key, plan.resolved[key]);
        }
    }

    if !plan.deferred.is_empty() {
        println!();
        println!("Deferred until execution:");
        for key in &plan.deferred {
            println!("   {}", key);
        }
    }

    if plan.issues.is_empty() {
        println!();
        println!("✅ No issues found");
    } else {
        println!();
        println!("⚠️  Issues:");
        for issue in &plan.issues {
            match &issue.step_id {
                Some(step) => println!("   • [{} / {}] {}", step, issue.field, issue.message),
                None => println!("   • [output / {}] {}", issue.field, issue.message),
            }
        }
    }

    Ok(())
}

fn validate_workflow(workflow_path: PathBuf, tasks_path: PathBuf) -> Result<()> {
    println!("🔍 Validating workflow: {}", workflow_path.display());

    let (workflow, tasks) = load_definitions(&workflow_path, &tasks_path)?;

    let graph = ExecutionGraph::build(&workflow)?;

    let known: Vec<&str> = tasks.iter().map(|t| t.name.as_str()).collect();
    let mut missing = Vec::new();
    for step in &workflow.steps {
        if !known.contains(&step.task_ref.as_str()) {
            missing.push(format!("step '{}' references unknown task '{}'", step.id, step.task_ref));
        }
    }

    println!("✅ Workflow is valid:");
    println!("   Name: {}", workflow.name);
    println!("   Steps: {}", workflow.steps.len());
    println!("   Levels: {}", graph.levels().len());

    if !missing.is_empty() {
        println!();
        println!("⚠️  Unresolved task references:");
        for item in &missing {
            println!("   • {}", item);
        }
        return Err(anyhow::anyhow!("workflow references unknown tasks"));
    }

    Ok(())
}

fn create_example(output: PathBuf) -> Result<()> {
    let tasks = vec![
        TaskDefinition::http(
            "fetch-user",
            HttpTaskSpec::new("GET", "https://api.example.com/users/{{input.id}}")
                .with_output_schema(json!({
                    "type": "object",
                    "required": ["email"],
                    "properties": { "email": { "type": "string" } }
                })),
        )
        .with_timeout("10s"),
        TaskDefinition::http(
            "send-welcome",
            HttpTaskSpec::new("POST", "https://api.example.com/notifications"),
        )
        .with_timeout("10s"),
    ];

    let workflow = WorkflowDefinition::new("welcome-user")
        .with_step(TaskStep::new("user", "fetch-user").with_input("id", "{{input.userId}}"))
        .with_step(
            TaskStep::new("notify", "send-welcome")
                .with_input("recipient", "{{tasks.user.output.email}}")
                .with_input("template", "welcome"),
        )
        .with_output("email", "{{tasks.user.output.email}}")
        .with_output("delivered", "{{tasks.notify.output.sent}}");

    let workflow_path = output.join("workflow.json");
    let tasks_path = output.join("tasks.json");
    std::fs::write(&workflow_path, serde_json::to_string_pretty(&workflow)?)?;
    std::fs::write(&tasks_path, serde_json::to_string_pretty(&tasks)?)?;

    println!("✨ Created example files:");
    println!("   {}", workflow_path.display());
    println!("   {}", tasks_path.display());
    println!();
    println!("Run it with:");
    println!(
        "  gantry run --workflow {} --tasks {} --input '{{\"userId\": \"42\"}}'",
        workflow_path.display(),
        tasks_path.display()
    );

    Ok(())
}
