use codemnesis_rs::error::ConfigError;
use codemnesis_rs::{Config, Diagnostic, Exclusion, Language, Phase, Pipeline, QueryError};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn run(config: Config) -> Pipeline {
    let mut pipeline = Pipeline::new(config).expect("valid config");
    pipeline.run();
    pipeline
}

#[test]
fn test_documented_ratio_and_decorators() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "views.py",
        r#""""Order views."""

@app.route("/a")
def list_orders():
    """Lists orders."""
    pass

@app.route("/b")
def show_order(order_id):
    pass
"#,
    );

    let pipeline = run(Config::new(Language::Python, dir.path()));
    let metrics = pipeline.metrics().unwrap();
    let views = metrics.module("views.py").unwrap();
    assert_eq!(views.callables, 2);
    assert_eq!(views.documented_ratio, 0.5);
    assert_eq!(views.decorators, 2);
    assert_eq!(metrics.repository.documented_ratio, 0.5);

    let model = pipeline.entity_model().unwrap();
    assert_eq!(model.modules[0].docstring.as_deref(), Some("Order views."));
    assert!(pipeline.diagnostics().is_empty());
}

#[test]
fn test_documented_ratio_counts_methods_of_a_class() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "orders.py",
        r#""""Order endpoints."""

class OrderView:
    @route("/a")
    def list_orders(self):
        """Lists orders."""
        pass

    @route("/b")
    def show_order(self, order_id):
        pass
"#,
    );

    let pipeline = run(Config::new(Language::Python, dir.path()));
    let metrics = pipeline.metrics().unwrap();
    let orders = metrics.module("orders.py").unwrap();
    assert_eq!((orders.types, orders.callables), (1, 2));
    assert_eq!(orders.documented_ratio, 0.5);
    assert_eq!(metrics.repository.documented_ratio, 0.5);
    assert_eq!(metrics.repository.method_documented_ratio, 0.5);
    assert_eq!(metrics.repository.type_documented_ratio, 0.0);
}

#[test]
fn test_csharp_documented_ratio_counts_methods() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "OrderController.cs",
        r#"/// <summary>Order endpoints.</summary>
using System;

namespace Shop.Web
{
    public class OrderController
    {
        /// <summary>Lists orders.</summary>
        [HttpGet]
        public IActionResult List()
        {
            return Ok();
        }

        [HttpPost]
        public IActionResult Create(Order order)
        {
            return Ok();
        }
    }
}
"#,
    );

    let pipeline = run(Config::new(Language::CSharp, dir.path()));
    let metrics = pipeline.metrics().unwrap();
    let controller = metrics.module("OrderController.cs").unwrap();
    assert_eq!(controller.callables, 2);
    assert_eq!(controller.decorators, 2);
    assert_eq!(controller.documented_ratio, 0.5);

    let model = pipeline.entity_model().unwrap();
    assert_eq!(model.modules[0].docstring.as_deref(), Some("Order endpoints."));
}

#[test]
fn test_class_attributes_are_measured() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "config.py",
        "class Config:\n    debug = False\n    \"\"\"Verbose errors.\"\"\"\n    port: int = 8080\n",
    );

    let pipeline = run(Config::new(Language::Python, dir.path()));
    let repo = &pipeline.metrics().unwrap().repository;
    assert_eq!(repo.fields, 2);
    assert_eq!(repo.field_documented_ratio, 0.5);
}

#[test]
fn test_unicode_indented_docstring_parses() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "notes.py",
        "def annotate():\n    \"\"\" x\n\u{a0}y\n    \"\"\"\n    pass\n",
    );

    let pipeline = run(Config::new(Language::Python, dir.path()));
    assert!(pipeline.diagnostics().is_empty());
    let model = pipeline.entity_model().unwrap();
    let notes = model.module("notes.py").unwrap();
    assert!(notes.parsed);
    assert_eq!(notes.callables[0].docstring.as_deref(), Some("x\ny"));
}

#[test]
fn test_import_cycle_is_flagged() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.py", "import b\n\ndef ping():\n    return b.pong()\n");
    write(dir.path(), "b.py", "import a\n\ndef pong():\n    return a.ping()\n");

    let pipeline = run(Config::new(Language::Python, dir.path()));
    let graph = pipeline.dependency_graph().unwrap();

    assert_eq!(graph.nodes.len(), 2);
    assert!(graph.edge("a.py", "b.py").is_some());
    assert!(graph.edge("b.py", "a.py").is_some());
    assert!(graph.nodes.iter().all(|n| n.in_cycle));
    assert_eq!(graph.cycles, vec![vec!["a.py".to_string(), "b.py".to_string()]]);
    assert!(graph.summary.independent_modules.is_empty());
    assert_eq!(graph.summary.avg_out_degree, 1.0);
}

#[test]
fn test_parse_error_keeps_run_going() {
    let dir = tempdir().unwrap();
    write(dir.path(), "broken.py", "def broken(:\n    pass\n");
    write(dir.path(), "fine.py", "def load_settings(path):\n    return path\n");

    let pipeline = run(Config::new(Language::Python, dir.path()));
    assert_eq!(pipeline.phase(), Phase::Measured);

    let errors: Vec<_> = pipeline.diagnostics().parse_errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path.to_str(), Some("broken.py"));

    let model = pipeline.entity_model().unwrap();
    let broken = model.module("broken.py").unwrap();
    assert!(!broken.parsed);
    assert!(broken.callables.is_empty() && broken.types.is_empty());
    assert!(model.module("fine.py").unwrap().parsed);

    let metrics = pipeline.metrics().unwrap();
    assert_eq!(metrics.repository.modules, 2);
    assert_eq!(metrics.repository.parsed_modules, 1);
}

#[test]
fn test_excluded_extension_produces_no_module() {
    let dir = tempdir().unwrap();
    write(dir.path(), "api.py", "def fetch_user(uid):\n    pass\n");
    write(dir.path(), "api.pyi", "def fetch_user(uid: int) -> dict: ...\n");

    let exclusions = vec![Exclusion::parse("*.pyi").unwrap()];
    let pipeline = run(Config::new(Language::Python, dir.path()).with_exclusions(exclusions));

    let model = pipeline.entity_model().unwrap();
    let ids: Vec<_> = model.modules.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(ids, vec!["api.py"]);
    assert!(model.exclusions.contains(&Exclusion::Extension("pyi".into())));
}

#[test]
fn test_edge_weight_counts_statements() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a/__init__.py", "");
    write(dir.path(), "a/y.py", "");
    write(
        dir.path(),
        "main.py",
        "import a\nfrom a import x\nimport a.y\nimport os\n",
    );

    let pipeline = run(Config::new(Language::Python, dir.path()));
    let graph = pipeline.dependency_graph().unwrap();

    assert_eq!(graph.edge("main.py", "a/__init__.py").unwrap().weight, 2);
    assert_eq!(graph.edge("main.py", "a/y.py").unwrap().weight, 1);
    assert_eq!(graph.external.len(), 1);
    assert_eq!(graph.external[0].reference, "os");

    let warnings: Vec<_> = pipeline.diagnostics().resolution_warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].line, 4);

    let core = &graph.summary.core_modules;
    assert_eq!(core.len(), 2);
    assert_eq!(core[0].id, "a/__init__.py");
    assert_eq!(core[0].referenced_by, 50.0);
}

#[test]
fn test_relative_imports_resolve_inside_package() {
    let dir = tempdir().unwrap();
    write(dir.path(), "shop/__init__.py", "");
    write(dir.path(), "shop/models.py", "class Order:\n    pass\n");
    write(dir.path(), "shop/views.py", "from .models import Order\nfrom . import models\n");

    let pipeline = run(Config::new(Language::Python, dir.path()));
    let graph = pipeline.dependency_graph().unwrap();

    assert_eq!(graph.edge("shop/views.py", "shop/models.py").unwrap().weight, 2);
    assert_eq!(
        graph.node("shop/__init__.py").map(|n| (n.in_degree, n.out_degree)),
        Some((0, 0))
    );
    assert_eq!(graph.summary.independent_modules, vec!["shop/__init__.py"]);
    assert_eq!(pipeline.diagnostics().resolution_warnings().count(), 0);
}

#[test]
fn test_csharp_using_links_namespaces() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "Core/Money.cs",
        "namespace Shop.Core\n{\n    public struct Money\n    {\n    }\n}\n",
    );
    write(
        dir.path(),
        "App/Checkout.cs",
        "using System;\nusing Shop.Core;\n\nnamespace Shop.App\n{\n    public class Checkout\n    {\n    }\n}\n",
    );

    let pipeline = run(Config::new(Language::CSharp, dir.path()));
    let graph = pipeline.dependency_graph().unwrap();

    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].source, "App/Checkout.cs");
    assert_eq!(graph.edges[0].target, "Core/Money.cs");

    let warnings: Vec<_> = pipeline.diagnostics().resolution_warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].reference, "System");
}

#[test]
fn test_using_own_namespace_is_not_external() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "Money.cs",
        "using Shop.Core;\n\nnamespace Shop.Core\n{\n    public struct Money\n    {\n    }\n}\n",
    );

    let pipeline = run(Config::new(Language::CSharp, dir.path()));
    let graph = pipeline.dependency_graph().unwrap();
    assert!(graph.external.is_empty());
    assert!(graph.edges.is_empty());
    assert_eq!(graph.summary.external_count, 0);
    assert_eq!(pipeline.diagnostics().resolution_warnings().count(), 0);
    assert!(!pipeline.entity_model().unwrap().modules[0].imports[0].is_external());
}

#[test]
fn test_magic_functions_are_reported() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "tasks.py",
        r#"
def foo():
    pass

def refresh_cache():
    pass

class Worker:
    def run(self):
        pass

    def __repr__(self):
        return "Worker"
"#,
    );

    let pipeline = run(Config::new(Language::Python, dir.path()));
    let tasks = pipeline.metrics().unwrap().module("tasks.py").unwrap().clone();
    let flagged: Vec<_> = tasks
        .magic_functions
        .iter()
        .map(|m| (m.name.as_str(), m.owner.as_deref()))
        .collect();
    assert_eq!(flagged, vec![("foo", None), ("run", Some("Worker"))]);
}

#[test]
fn test_queries_not_ready_before_their_phase() {
    let dir = tempdir().unwrap();
    write(dir.path(), "m.py", "x = 1\n");

    let mut pipeline = Pipeline::new(Config::new(Language::Python, dir.path())).unwrap();
    assert_eq!(pipeline.entity_model().unwrap_err(), QueryError::NotReady("entity model"));

    pipeline.scan();
    assert_eq!(pipeline.files().len(), 1);
    assert!(pipeline.dependency_graph().is_err());

    pipeline.parse();
    assert!(pipeline.entity_model().is_err());

    pipeline.resolve();
    assert!(pipeline.entity_model().is_ok());
    assert!(pipeline.dependency_graph().is_ok());
    assert_eq!(pipeline.metrics().unwrap_err(), QueryError::NotReady("metrics"));

    pipeline.compute_metrics();
    assert!(pipeline.metrics().is_ok());
}

#[test]
fn test_invalid_config_is_rejected() {
    let missing = Config::new(Language::Python, "/no/such/repository");
    assert!(matches!(Pipeline::new(missing), Err(ConfigError::MissingRoot(_))));

    let dir = tempdir().unwrap();
    let no_workers = Config::new(Language::Python, dir.path()).with_workers(0);
    assert!(matches!(Pipeline::new(no_workers), Err(ConfigError::NoWorkers)));

    write(dir.path(), "file.py", "");
    let not_dir = Config::new(Language::Python, dir.path().join("file.py"));
    assert!(matches!(Pipeline::new(not_dir), Err(ConfigError::RootNotDirectory(_))));
}

#[test]
fn test_expired_deadline_skips_every_file() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.py", "def alpha():\n    pass\n");
    write(dir.path(), "b.py", "def beta():\n    pass\n");

    let config = Config::new(Language::Python, dir.path())
        .with_workers(1)
        .with_deadline(Duration::ZERO);
    let pipeline = run(config);

    assert_eq!(pipeline.diagnostics().skipped().count(), 2);
    assert!(pipeline.entity_model().unwrap().modules.is_empty());
    assert_eq!(pipeline.metrics().unwrap().repository.modules, 0);
    assert!(pipeline
        .diagnostics()
        .items
        .iter()
        .all(|d| matches!(d, Diagnostic::Skipped { .. })));
}

#[test]
fn test_nothing_parses_still_completes() {
    let dir = tempdir().unwrap();
    write(dir.path(), "one.py", "def one(:\n");
    write(dir.path(), "two.py", "class Two(\n");

    let pipeline = run(Config::new(Language::Python, dir.path()));
    assert_eq!(pipeline.diagnostics().parse_errors().count(), 2);
    let metrics = pipeline.metrics().unwrap();
    assert_eq!(metrics.repository.parsed_modules, 0);
    assert_eq!(metrics.repository.documented_ratio, 0.0);
    assert!(pipeline.dependency_graph().unwrap().edges.is_empty());
}

#[test]
fn test_runs_are_deterministic() {
    let dir = tempdir().unwrap();
    for i in 0..12 {
        write(
            dir.path(),
            &format!("pkg/mod_{:02}.py", i),
            &format!(
                "from pkg import mod_{:02}\n\nclass Handler{}:\n    \"\"\"Doc.\"\"\"\n    def apply(self, event):\n        pass\n",
                (i + 1) % 12,
                i
            ),
        );
    }

    let snapshot = |workers: usize| {
        let pipeline = run(Config::new(Language::Python, dir.path()).with_workers(workers));
        (
            serde_json::to_string(pipeline.entity_model().unwrap()).unwrap(),
            serde_json::to_string(pipeline.dependency_graph().unwrap()).unwrap(),
            serde_json::to_string(pipeline.metrics().unwrap()).unwrap(),
        )
    };

    let first = snapshot(1);
    assert_eq!(first, snapshot(4));
    assert_eq!(first, snapshot(4));
}
