//! `scanflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`     — start the API server.
//! - `templates` — list catalog templates.
//! - `validate`  — validate a template JSON file.
//! - `run`       — run a template against a target and print the result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use engine::{
    validate_template_document, Difficulty, EngineConfig, ExecutionEngine, TemplateCatalog, TracingSink,
};
use modules::{builtin, ModuleRegistry, RunOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scanflow", about = "Security-scanning workflow engine", version)]
struct Cli {
    /// Directory of extra template JSON files loaded into the catalog.
    #[arg(long, global = true, env = "SCANFLOW_TEMPLATES_DIR")]
    templates_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, env = "SCANFLOW_BIND", default_value = "0.0.0.0:8080")]
        bind: String,
        /// Refuse new executions beyond this many running at once.
        #[arg(long, env = "SCANFLOW_MAX_ACTIVE")]
        max_active: Option<usize>,
    },
    /// List templates, optionally filtered.
    Templates {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        difficulty: Option<Difficulty>,
        /// Match templates carrying any of these tags.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Validate a template definition JSON file.
    Validate {
        /// Path to the template JSON file.
        path: PathBuf,
    },
    /// Run a template to completion and print the result as JSON.
    Run {
        template_id: String,
        #[arg(long)]
        target: String,
        #[arg(long)]
        continue_on_error: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, max_active } => {
            let catalog = load_catalog(cli.templates_dir.as_deref())?;
            let config = EngineConfig {
                max_active_executions: max_active,
                ..EngineConfig::default()
            };
            let engine = build_engine(catalog, config);
            info!("Starting API server on {bind}");
            api::serve(&bind, api::AppState::new(Arc::new(engine)))
                .await
                .with_context(|| format!("server on {bind} stopped"))?;
        }
        Command::Templates { category, difficulty, tags } => {
            let catalog = load_catalog(cli.templates_dir.as_deref())?;
            let mut templates = catalog.get_all_templates();
            if let Some(category) = &category {
                templates.retain(|t| &t.category == category);
            }
            if let Some(difficulty) = difficulty {
                templates.retain(|t| t.difficulty == difficulty);
            }
            if !tags.is_empty() {
                templates.retain(|t| t.has_any_tag(&tags));
            }
            for t in templates {
                println!(
                    "{:<20} {:<16} {:<13} {} step(s)  {}",
                    t.id,
                    t.category,
                    t.difficulty.to_string(),
                    t.steps.len(),
                    t.name
                );
            }
        }
        Command::Validate { path } => {
            let raw = read_json(&path)?;
            match validate_template_document(&raw) {
                Ok(template) => {
                    println!("✅ Template '{}' is valid ({} steps).", template.id, template.steps.len());
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run { template_id, target, continue_on_error } => {
            let catalog = load_catalog(cli.templates_dir.as_deref())?;
            let engine = build_engine(catalog, EngineConfig::default());
            let options = RunOptions {
                continue_on_error,
                ..RunOptions::default()
            };
            let result = engine
                .execute_workflow_from_template(&template_id, target.into(), options)
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn build_engine(catalog: TemplateCatalog, config: EngineConfig) -> ExecutionEngine {
    let mut registry = ModuleRegistry::new();
    builtin::register_builtin(&mut registry);
    info!(modules = registry.len(), templates = catalog.len(), "engine ready");
    ExecutionEngine::new(Arc::new(registry), Arc::new(catalog), config).with_sink(Arc::new(TracingSink))
}

/// Built-in templates plus every `*.json` file in `dir`.
fn load_catalog(dir: Option<&Path>) -> Result<TemplateCatalog> {
    let mut catalog = TemplateCatalog::with_builtin_templates()?;
    let Some(dir) = dir else {
        return Ok(catalog);
    };

    let entries = std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    for path in paths {
        let raw = read_json(&path)?;
        let template = catalog
            .register_document(&raw)
            .with_context(|| format!("rejected template {}", path.display()))?;
        info!(template_id = %template.id, path = %path.display(), "template loaded");
    }
    Ok(catalog)
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("cannot read file {}", path.display()))?;
    let raw = serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))?;
    if !matches!(raw, serde_json::Value::Object(_)) {
        bail!("{} does not contain a JSON object", path.display());
    }
    Ok(raw)
}
