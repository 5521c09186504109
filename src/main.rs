use anyhow::{Context, Result};
use clap::Parser;
use codemnesis_rs::{Config, Diagnostic, Exclusion, Language, Pipeline};
use colored::*;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Command line interface configuration using `clap`.
/// This struct defines the arguments and flags accepted by the program.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root of the repository to analyze.
    path: PathBuf,

    /// Language of the sources: `python` or `csharp`.
    #[arg(short, long, default_value = "python")]
    language: Language,

    /// Extra exclusions: a name (`vendor`), a root-relative path (`src/gen`)
    /// or an extension (`*.pyi`). May be repeated.
    #[arg(short, long = "exclude")]
    exclude: Vec<String>,

    /// Directory where `entities.json`, `graph.json` and `metrics.json` are written.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of parse workers. Defaults to the number of CPUs.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Stop waiting for parse results after this many seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the entity model, graph, metrics and diagnostics as JSON.
    #[arg(long)]
    json: bool,

    /// Log phase timings and unresolved imports.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> Config {
        let exclusions: Vec<Exclusion> = self.exclude.iter().filter_map(|e| Exclusion::parse(e)).collect();
        let mut config = Config::new(self.language, self.path.clone()).with_exclusions(exclusions);
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(secs) = self.timeout {
            config = config.with_deadline(Duration::from_secs(secs));
        }
        if let Some(output) = &self.output {
            config = config.with_output(output.clone());
        }
        config
    }
}

/// Main entry point of the application.
///
/// Builds the run configuration from the arguments, runs every pipeline phase and
/// prints either a summary or the JSON surfaces.
fn main() -> Result<()> {
    let cli = Cli::parse();

    // Library code only emits events; the subscriber lives here.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.config();
    let mut pipeline = Pipeline::new(config).context("invalid configuration")?;

    if !cli.json {
        println!("Analyzing {} sources in {:?}", cli.language, cli.path);
    }

    pipeline.run();

    let model = pipeline.entity_model()?;
    let graph = pipeline.dependency_graph()?;
    let metrics = pipeline.metrics()?;

    if let Some(dir) = &pipeline.config().output {
        fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
        fs::write(dir.join("entities.json"), serde_json::to_string_pretty(model)?)?;
        fs::write(dir.join("graph.json"), serde_json::to_string_pretty(graph)?)?;
        fs::write(dir.join("metrics.json"), serde_json::to_string_pretty(metrics)?)?;
    }

    if cli.json {
        let report = serde_json::json!({
            "entities": model,
            "graph": graph,
            "metrics": metrics,
            "diagnostics": pipeline.diagnostics(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let repo = &metrics.repository;
    println!("\n{}", "Structural Analysis Results".bold());
    println!("===================================\n");

    println!("Summary:");
    println!(" * Modules: {} ({} parsed)", repo.modules, repo.parsed_modules);
    println!(" * Types: {}", repo.types);
    println!(" * Callables: {}", repo.callables);
    println!(" * Fields: {}", repo.fields);
    println!(
        " * Documented callables: {} ({:.1}%)",
        repo.documented,
        repo.documented_ratio * 100.0
    );
    println!(
        " * Documented by kind: types {:.1}%, functions {:.1}%, methods {:.1}%, fields {:.1}%",
        repo.type_documented_ratio * 100.0,
        repo.function_documented_ratio * 100.0,
        repo.method_documented_ratio * 100.0,
        repo.field_documented_ratio * 100.0
    );
    println!(" * Decorators: {}", repo.decorators);
    println!(" * Lines: {} ({} source)", repo.loc, repo.sloc);
    println!(
        " * Internal dependencies: {} (avg {} per module)",
        graph.summary.edge_count, graph.summary.avg_out_degree
    );
    println!(" * External imports: {}", graph.summary.external_count);

    if !graph.summary.core_modules.is_empty() {
        println!("\n - Core Modules");
        println!("===============");
        for (i, core) in graph.summary.core_modules.iter().enumerate() {
            println!(
                " {}. {} (referenced by ~{}% of modules)",
                i + 1,
                core.id,
                core.referenced_by
            );
        }
    }

    if !graph.cycles.is_empty() {
        println!("\n - {}", "Dependency Cycles".yellow());
        println!("===================");
        for (i, cycle) in graph.cycles.iter().enumerate() {
            println!(" {}. {}", i + 1, cycle.join(" <-> "));
        }
    }

    let magic: Vec<_> = metrics
        .modules
        .iter()
        .flat_map(|m| m.magic_functions.iter().map(move |f| (m, f)))
        .collect();
    if !magic.is_empty() {
        println!("\n - Magic Functions");
        println!("==================");
        for (i, (module, func)) in magic.iter().enumerate() {
            let name = match &func.owner {
                Some(owner) => format!("{}.{}", owner, func.name),
                None => func.name.clone(),
            };
            println!(" {}. {}", i + 1, name);
            println!("    └─ {}:{}", module.module, func.line);
        }
    }

    let problems: Vec<&Diagnostic> = pipeline
        .diagnostics()
        .items
        .iter()
        .filter(|d| !matches!(d, Diagnostic::Resolution(_)))
        .collect();
    if !problems.is_empty() {
        println!("\n - {}", "Problems".red());
        println!("==========");
        for (i, d) in problems.iter().enumerate() {
            println!(" {}. {}", i + 1, d);
        }
    }

    Ok(())
}
