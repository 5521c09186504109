use crate::analyzers::{analyzer_for, LanguageAnalyzer};
use crate::config::Config;
use crate::error::{ConfigError, Diagnostic, Diagnostics, ParseError, QueryError};
use crate::graph::{link_imports, DependencyGraph};
use crate::metrics::{self, Metrics};
use crate::model::{EntityModel, Module};
use crate::scanner::{PathScanner, SourceFile};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Instant;

/// Progress of a run. Each phase is total over its input before the next one starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Configured,
    Scanned,
    Parsed,
    Resolved,
    Measured,
}

/// One analysis run over one repository.
///
/// The run goes Scan → Parse → Resolve → Compute-Metrics. Calling a phase runs the
/// ones before it if they have not run yet; calling it again does nothing. Failures
/// of single files never stop a run: they are collected in [`Diagnostics`] next to
/// the partial results.
pub struct Pipeline {
    config: Config,
    analyzer: Arc<dyn LanguageAnalyzer>,
    pool: rayon::ThreadPool,
    phase: Phase,
    files: Vec<SourceFile>,
    modules: Vec<Module>,
    entity_model: Option<EntityModel>,
    graph: Option<DependencyGraph>,
    metrics: Option<Metrics>,
    diagnostics: Diagnostics,
}

impl Pipeline {
    /// Validates the configuration and starts the parse worker pool.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("parse-worker-{}", i))
            .panic_handler(|_| tracing::error!("a parse worker panicked outside of a parse"));
        if let Some(workers) = config.workers {
            builder = builder.num_threads(workers);
        }
        let pool = builder
            .build()
            .map_err(|e| ConfigError::WorkerPool(e.to_string()))?;

        Ok(Self {
            analyzer: analyzer_for(config.language),
            config,
            pool,
            phase: Phase::Configured,
            files: Vec::new(),
            modules: Vec::new(),
            entity_model: None,
            graph: None,
            metrics: None,
            diagnostics: Diagnostics::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Candidate files found by the scan, in walk order.
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Everything non-fatal recorded so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Runs every remaining phase.
    pub fn run(&mut self) -> &Diagnostics {
        self.compute_metrics();
        &self.diagnostics
    }

    /// Walks the repository and records the candidate files.
    pub fn scan(&mut self) {
        if self.phase >= Phase::Scanned {
            return;
        }
        let started = Instant::now();
        let scanner = PathScanner::from_config(&self.config);
        for item in scanner.scan() {
            match item {
                Ok(file) => self.files.push(file),
                Err(err) => self.diagnostics.push(Diagnostic::Scan(err)),
            }
        }
        tracing::debug!(
            files = self.files.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan complete"
        );
        self.phase = Phase::Scanned;
    }

    /// Parses every scanned file on the worker pool.
    ///
    /// Workers send `(index, outcome)` pairs back over a channel; this thread is the
    /// only one touching the module list. With a deadline configured, waiting stops
    /// when it passes and every file without a result is reported as skipped. A file
    /// whose analyzer panics is reported as a parse error.
    pub fn parse(&mut self) {
        if self.phase >= Phase::Parsed {
            return;
        }
        self.scan();

        let started = Instant::now();
        // A deadline too far away to represent is no deadline.
        let deadline = self.config.deadline.and_then(|d| started.checked_add(d));
        let (tx, rx) = mpsc::channel::<(usize, Result<Module, ParseError>)>();

        for (idx, file) in self.files.iter().enumerate() {
            let tx = tx.clone();
            let analyzer = Arc::clone(&self.analyzer);
            let file = file.clone();
            self.pool.spawn(move || {
                // Work queued behind the deadline is not started at all.
                if deadline.map_or(false, |d| Instant::now() >= d) {
                    return;
                }
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| parse_file(analyzer.as_ref(), &file)))
                    .unwrap_or_else(|payload| Err(ParseError::new(&file.id, 0, panic_message(payload.as_ref()))));
                // The receiver is gone once the deadline passed.
                let _ = tx.send((idx, outcome));
            });
        }
        drop(tx);

        let mut outcomes: Vec<Option<Result<Module, ParseError>>> =
            (0..self.files.len()).map(|_| None).collect();
        let mut timed_out = false;
        loop {
            let received = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        timed_out = true;
                        break;
                    }
                    rx.recv_timeout(d - now)
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((idx, outcome)) => outcomes[idx] = Some(outcome),
                Err(RecvTimeoutError::Timeout) => {
                    timed_out = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Workers that found the deadline passed hang up without a result.
                    timed_out = deadline.map_or(false, |d| Instant::now() >= d);
                    break;
                }
            }
        }
        if timed_out {
            tracing::warn!("parse deadline reached");
        }

        let language = self.config.language;
        for (file, outcome) in self.files.iter().zip(outcomes) {
            match outcome {
                Some(Ok(module)) => self.modules.push(module),
                Some(Err(err)) => {
                    self.modules.push(Module::unparsed(file.id.clone(), language));
                    self.diagnostics.push(Diagnostic::Parse(err));
                }
                None if timed_out => self.diagnostics.push(Diagnostic::Skipped {
                    path: file.path.clone(),
                }),
                // Every worker finished, but this one never reported.
                None => {
                    self.modules.push(Module::unparsed(file.id.clone(), language));
                    self.diagnostics.push(Diagnostic::Parse(ParseError::new(
                        &file.id,
                        0,
                        "the parse worker returned no result",
                    )));
                }
            }
        }

        tracing::debug!(
            modules = self.modules.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "parse complete"
        );
        self.phase = Phase::Parsed;
    }

    /// Freezes the entity model, links imports and builds the dependency graph.
    pub fn resolve(&mut self) {
        if self.phase >= Phase::Resolved {
            return;
        }
        self.parse();

        let mut model = EntityModel::new(
            self.config.root.clone(),
            self.config.language,
            self.config.effective_exclusions(),
            std::mem::take(&mut self.modules),
        );
        for warning in link_imports(&mut model.modules, self.config.language) {
            self.diagnostics.push(Diagnostic::Resolution(warning));
        }

        let graph = DependencyGraph::from_model(&model);
        tracing::debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            cycles = graph.cycles.len(),
            "dependency graph built"
        );

        self.entity_model = Some(model);
        self.graph = Some(graph);
        self.phase = Phase::Resolved;
    }

    pub fn compute_metrics(&mut self) {
        if self.phase >= Phase::Measured {
            return;
        }
        self.resolve();

        if let Some(model) = &self.entity_model {
            let metrics = metrics::compute(model, &self.config.magic);
            tracing::debug!(
                documented_ratio = metrics.repository.documented_ratio,
                magic_functions = metrics.repository.magic_functions,
                "metrics computed"
            );
            self.metrics = Some(metrics);
        }
        self.phase = Phase::Measured;
    }

    /// The frozen entity model. Ready once imports are resolved.
    pub fn entity_model(&self) -> Result<&EntityModel, QueryError> {
        self.entity_model
            .as_ref()
            .ok_or(QueryError::NotReady("entity model"))
    }

    pub fn dependency_graph(&self) -> Result<&DependencyGraph, QueryError> {
        self.graph
            .as_ref()
            .ok_or(QueryError::NotReady("dependency graph"))
    }

    pub fn metrics(&self) -> Result<&Metrics, QueryError> {
        self.metrics.as_ref().ok_or(QueryError::NotReady("metrics"))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("analyzer panicked: {}", detail)
}

/// Reads and parses one file. A read failure is reported like a parse failure.
fn parse_file(analyzer: &dyn LanguageAnalyzer, file: &SourceFile) -> Result<Module, ParseError> {
    let bytes = fs::read(&file.path).map_err(|e| ParseError::new(&file.id, 0, e.to_string()))?;
    let source = String::from_utf8_lossy(&bytes);
    let source = source.strip_prefix('\u{feff}').unwrap_or(&source);
    analyzer.parse(&file.id, source)
}
