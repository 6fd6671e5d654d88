//! CLI binary for authoring, running, and reviewing conditional checklists.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use checklist_engine::{
    build_task, lint, Assignment, ChecklistPackage, Diagnostic, ExecutionSession, Priority,
    ReviewDecision, Severity, SystemClock, TaskDocument, TaskDraft,
};
use checklist_store::{ExecutionStore, FileStore};
use checklist_types::{ChecklistDocument, ChecklistError, FieldValidation};

#[derive(Parser)]
#[command(name = "checklist", version, about = "Conditional checklist runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding saved executions and assignments
    #[arg(long, global = true, env = "CHECKLIST_STORE", default_value = ".checklist")]
    store: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Where to read a checklist from: a document file, or a package plus a slug.
#[derive(Args)]
struct Source {
    /// Path to a checklist, task, or package JSON file
    document: PathBuf,

    /// Pick a checklist from a package by slug
    #[arg(long)]
    slug: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint a checklist document
    Validate {
        #[command(flatten)]
        source: Source,
    },

    /// Show the steps of a checklist
    Info {
        #[command(flatten)]
        source: Source,
    },

    /// Build a task document from an authoring draft
    Build {
        /// Path to the draft JSON file
        draft: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Author recorded in the task
        #[arg(long, default_value = "")]
        author: String,
    },

    /// Evaluate a response map against a checklist and print the result
    Evaluate {
        #[command(flatten)]
        source: Source,

        /// JSON object of answers keyed by step id
        #[arg(short, long)]
        responses: Option<PathBuf>,
    },

    /// Assign a checklist to a collaborator
    Assign {
        #[command(flatten)]
        source: Source,

        /// Collaborator email
        #[arg(long)]
        to: String,

        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: String,

        /// Alta, Media, or Baja
        #[arg(long, default_value = "Media")]
        priority: String,

        #[arg(long, default_value = "")]
        notes: String,

        /// Supervisor creating the assignment
        #[arg(long = "by", default_value = "")]
        created_by: String,
    },

    /// Fill in an assignment, saving progress or submitting it
    Exec {
        /// Assignment id
        assignment: String,

        #[command(flatten)]
        source: Source,

        /// JSON object of answers keyed by step id
        #[arg(short, long)]
        responses: Option<PathBuf>,

        /// Collaborator running the checklist
        #[arg(long)]
        user: String,

        /// Submit for review instead of saving progress
        #[arg(long)]
        submit: bool,
    },

    /// Approve or reject a submitted assignment
    Review {
        /// Assignment id
        assignment: String,

        #[arg(long, conflicts_with = "reject")]
        approve: bool,

        #[arg(long, conflicts_with = "approve")]
        reject: bool,

        /// Required when rejecting
        #[arg(long, default_value = "")]
        comments: String,

        /// Confirm the decision with a signature
        #[arg(long)]
        sign: bool,

        #[arg(long)]
        reviewer: String,
    },

    /// Show an assignment and its executions
    History {
        /// Assignment id
        assignment: String,
    },

    /// List all assignments
    Assignments,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        let code = err
            .downcast_ref::<ChecklistError>()
            .map(ChecklistError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let store = FileStore::new(&cli.store);
    tracing::debug!(root = %store.root().display(), "Using file store");

    match cli.command {
        Commands::Validate { source } => cmd_validate(&source)?,
        Commands::Info { source } => cmd_info(&source)?,
        Commands::Build {
            draft,
            output,
            author,
        } => cmd_build(&draft, output.as_deref(), &author)?,
        Commands::Evaluate { source, responses } => {
            cmd_evaluate(&source, responses.as_deref())?;
        }
        Commands::Assign {
            source,
            to,
            due,
            priority,
            notes,
            created_by,
        } => {
            cmd_assign(&store, &source, &to, &due, &priority, &notes, &created_by).await?;
        }
        Commands::Exec {
            assignment,
            source,
            responses,
            user,
            submit,
        } => {
            cmd_exec(&store, &assignment, &source, responses.as_deref(), &user, submit).await?;
        }
        Commands::Review {
            assignment,
            approve,
            reject,
            comments,
            sign,
            reviewer,
        } => {
            let decision = match (approve, reject) {
                (true, _) => Some(ReviewDecision::Approve),
                (_, true) => Some(ReviewDecision::Reject),
                _ => None,
            };
            cmd_review(&store, &assignment, decision, &comments, sign, &reviewer).await?;
        }
        Commands::History { assignment } => cmd_history(&store, &assignment).await?,
        Commands::Assignments => cmd_assignments(&store).await?,
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn load_checklist(source: &Source) -> anyhow::Result<ChecklistDocument> {
    let text = std::fs::read_to_string(&source.document)
        .with_context(|| format!("reading {}", source.document.display()))?;
    let raw: Value = serde_json::from_str(&text)?;

    if raw.get("checklists").is_some() {
        let package: ChecklistPackage = serde_json::from_value(raw)?;
        let Some(slug) = source.slug.as_deref() else {
            anyhow::bail!(
                "{} is a package; pick one with --slug ({})",
                source.document.display(),
                package.slugs().join(", ")
            );
        };
        return package
            .find_by_slug(slug)
            .or_else(|| package.find_by_name(slug))
            .cloned()
            .ok_or_else(|| {
                ChecklistError::NotFound {
                    kind: "checklist".into(),
                    id: slug.into(),
                }
                .into()
            });
    }

    if raw.get("creadoPor").is_some() {
        let task: TaskDocument = serde_json::from_value(raw)?;
        return Ok(task.to_checklist());
    }

    Ok(serde_json::from_value(raw)?)
}

/// Read a JSON object of answers keyed by step id.
fn load_responses(path: Option<&Path>) -> anyhow::Result<Vec<(u32, Value)>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let map: serde_json::Map<String, Value> = serde_json::from_str(&text)?;
    map.into_iter()
        .map(|(key, value)| {
            let id = key
                .trim()
                .parse::<u32>()
                .with_context(|| format!("response key '{key}' is not a step id"))?;
            Ok((id, value))
        })
        .collect()
}

fn print_diagnostics(diagnostics: &[Diagnostic]) -> bool {
    let mut has_error = false;
    for diag in diagnostics {
        if diag.severity == Severity::Error {
            has_error = true;
        }
        match diag.step_id {
            Some(id) => println!("[{}] {} (step {}): {}", diag.severity, diag.rule, id, diag.message),
            None => println!("[{}] {}: {}", diag.severity, diag.rule, diag.message),
        }
        if let Some(fix) = &diag.fix {
            println!("    fix: {fix}");
        }
    }
    has_error
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_validate(source: &Source) -> anyhow::Result<()> {
    let doc = load_checklist(source)?;
    let diagnostics = lint(&doc);

    if diagnostics.is_empty() {
        println!("Checklist is valid");
        return Ok(());
    }

    if print_diagnostics(&diagnostics) {
        std::process::exit(ChecklistError::InvalidDocument(String::new()).exit_code());
    }
    Ok(())
}

fn cmd_info(source: &Source) -> anyhow::Result<()> {
    let doc = load_checklist(source)?;

    println!("Checklist: {}", doc.name);
    println!("Slug: {}", doc.slug());
    if !doc.objective.is_empty() {
        println!("Objective: {}", doc.objective);
    }
    println!("Steps: {}", doc.steps.len());

    println!("\nSteps:");
    for step in &doc.steps {
        let required = if step.required { " *" } else { "" };
        print!("  {}. {} [{}]{}", step.id, step.description, step.kind.type_name(), required);
        if let Some(condition) = &step.condition {
            print!(" when step {} = \"{}\"", condition.step_id, condition.equals);
        }
        println!();
        let options = step.kind.options();
        if !options.is_empty() {
            println!("       options: {}", options.join(" | "));
        }
    }

    Ok(())
}

fn cmd_build(draft_path: &Path, output: Option<&Path>, author: &str) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(draft_path)
        .with_context(|| format!("reading {}", draft_path.display()))?;
    let draft: TaskDraft = serde_json::from_str(&text)?;
    let task = build_task(&draft, author, Utc::now())?;
    let json = serde_json::to_string_pretty(&task)?;

    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            println!("Task '{}' written to {}", task.slug, path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluationReport<'a> {
    checklist: &'a str,
    visibility: &'a std::collections::BTreeMap<u32, bool>,
    validation: &'a std::collections::BTreeMap<u32, FieldValidation>,
    responses: &'a std::collections::BTreeMap<u32, Value>,
    can_submit: bool,
    missing: Vec<u32>,
    invalid: Vec<u32>,
}

fn cmd_evaluate(source: &Source, responses: Option<&Path>) -> anyhow::Result<()> {
    let doc = load_checklist(source)?;
    let answers = load_responses(responses)?;

    let mut session = ExecutionSession::with_system_clock(doc);
    session.apply_responses(answers)?;

    let check = session.submit_check();
    let report = EvaluationReport {
        checklist: &session.document().name,
        visibility: session.visibility(),
        validation: session.validation(),
        responses: session.responses(),
        can_submit: check.can_submit,
        missing: check.missing,
        invalid: check.invalid,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_assign(
    store: &FileStore,
    source: &Source,
    to: &str,
    due: &str,
    priority: &str,
    notes: &str,
    created_by: &str,
) -> anyhow::Result<()> {
    let doc = load_checklist(source)?;
    let due = checklist_engine::validators::parse_date(due)
        .with_context(|| format!("'{due}' is not a valid due date"))?;
    let priority: Priority = serde_json::from_value(Value::String(priority.to_string()))
        .with_context(|| format!("'{priority}' is not a priority (Alta, Media, Baja)"))?;

    let mut assignment = Assignment::new(
        uuid::Uuid::new_v4().to_string(),
        &doc,
        to,
        due,
        priority,
        created_by,
        Utc::now(),
    );
    assignment.notas = notes.to_string();
    store.save_assignment(&assignment).await?;

    println!("Assignment {} created for {}", assignment.id, assignment.asignado_a);
    Ok(())
}

async fn cmd_exec(
    store: &FileStore,
    assignment_id: &str,
    source: &Source,
    responses: Option<&Path>,
    user: &str,
    submit: bool,
) -> anyhow::Result<()> {
    let mut assignment = store.require_assignment(assignment_id).await?;
    if !assignment.is_assigned_to(user) {
        anyhow::bail!(
            "assignment {} belongs to {}, not {}",
            assignment.id,
            assignment.asignado_a,
            user
        );
    }
    if !assignment.estado.is_executable() {
        return Err(ChecklistError::InvalidTransition {
            action: "execute".into(),
            status: assignment.estado.to_string(),
        }
        .into());
    }

    let doc = load_checklist(source)?;
    if doc.slug() != assignment.checklist_slug {
        tracing::warn!(
            expected = %assignment.checklist_slug,
            found = %doc.slug(),
            "Checklist does not match the assignment"
        );
    }

    let prior = match &assignment.last_execution_id {
        Some(id) => store.get_execution(id).await?,
        None => None,
    };
    let mut session = match prior {
        Some(prior) => ExecutionSession::resume(doc, &prior, Arc::new(SystemClock)),
        None => ExecutionSession::with_system_clock(doc),
    };
    session.apply_responses(load_responses(responses)?)?;

    let check = session.submit_check();
    let mut execution = session.snapshot(&assignment.id, user);
    let execution_id = store.save_execution(&mut execution).await?;

    if submit {
        if let Err(err) = assignment.submit(&execution_id, &check) {
            // Keep the answers even when the submission is refused.
            assignment.record_progress(&execution_id)?;
            store.save_assignment(&assignment).await?;
            return Err(err.into());
        }
        println!("Execution {execution_id} submitted for review");
    } else {
        assignment.record_progress(&execution_id)?;
        println!("Progress saved as execution {execution_id}");
        if !check.can_submit {
            println!("Still blocking: steps {:?}", check.blocking());
        }
    }
    store.save_assignment(&assignment).await?;
    Ok(())
}

async fn cmd_review(
    store: &FileStore,
    assignment_id: &str,
    decision: Option<ReviewDecision>,
    comments: &str,
    signature_confirmed: bool,
    reviewer: &str,
) -> anyhow::Result<()> {
    let mut assignment = store.require_assignment(assignment_id).await?;
    if let Some(id) = &assignment.last_execution_id {
        store.require_execution(id).await?;
    }
    assignment.review(decision, comments, signature_confirmed, reviewer, Utc::now())?;
    store.save_assignment(&assignment).await?;
    println!("Assignment {} is now {}", assignment.id, assignment.estado);
    Ok(())
}

async fn cmd_history(store: &FileStore, assignment_id: &str) -> anyhow::Result<()> {
    let assignment = store.require_assignment(assignment_id).await?;
    let now = Utc::now();

    println!("Assignment: {}", assignment.id);
    println!("Checklist: {}", assignment.checklist_nombre);
    println!("Assigned to: {}", assignment.asignado_a);
    println!("Priority: {}", assignment.prioridad);
    let overdue = if assignment.is_overdue(now) { " (overdue)" } else { "" };
    println!("Due: {}{}", assignment.fecha_vencimiento.format("%Y-%m-%d"), overdue);
    println!("Status: {}", assignment.estado);

    if !assignment.rechazos.is_empty() {
        println!("\nRejections:");
        for rejection in &assignment.rechazos {
            println!(
                "  {} by {}: {}",
                rejection.fecha.format("%Y-%m-%d %H:%M"),
                rejection.revisor,
                rejection.comentarios
            );
        }
    }

    let executions = store.list_executions_by_assignment(&assignment.id).await?;
    println!("\nExecutions: {}", executions.len());
    for execution in &executions {
        let when = execution
            .recorded_at()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| execution.timestamp.to_string());
        println!(
            "  {} {} by {} ({} invalid)",
            execution.id.as_deref().unwrap_or("-"),
            when,
            execution.user,
            execution.invalid_count()
        );
    }
    Ok(())
}

async fn cmd_assignments(store: &FileStore) -> anyhow::Result<()> {
    let assignments = store.list_assignments().await?;
    if assignments.is_empty() {
        println!("No assignments");
        return Ok(());
    }
    let now = Utc::now();
    for a in &assignments {
        let overdue = if a.is_overdue(now) { " overdue" } else { "" };
        println!(
            "{}  {:<14} {:<6} {}  {} -> {}{}",
            a.id,
            a.estado.to_string(),
            a.prioridad.to_string(),
            a.fecha_vencimiento.format("%Y-%m-%d"),
            a.checklist_nombre,
            a.asignado_a,
            overdue
        );
    }
    Ok(())
}
