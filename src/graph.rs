use crate::config::Language;
use crate::error::ResolutionWarning;
use crate::model::{EntityModel, Module, ModuleId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// How many of the most imported modules are reported as core modules.
pub const CORE_MODULE_LIMIT: usize = 5;

/// A module of the graph with its connectivity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: ModuleId,
    /// Distinct modules importing this one.
    pub in_degree: usize,
    /// Distinct modules this one imports.
    pub out_degree: usize,
    /// Part of a strongly connected component with more than one module.
    pub in_cycle: bool,
}

/// One directed import relation. `weight` is the number of import statements behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub source: ModuleId,
    pub target: ModuleId,
    pub weight: usize,
}

/// A heavily imported module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoreModule {
    pub id: ModuleId,
    pub in_degree: usize,
    /// Share of the other modules that import it, in percent.
    pub referenced_by: f64,
}

/// Repository-wide reading of the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSummary {
    pub module_count: usize,
    pub edge_count: usize,
    pub external_count: usize,
    /// Edges per module.
    pub avg_out_degree: f64,
    /// Modules with no edge in either direction.
    pub independent_modules: Vec<ModuleId>,
    pub core_modules: Vec<CoreModule>,
}

/// An import that stayed outside the internal graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalDependency {
    pub module: ModuleId,
    pub reference: String,
    pub line: usize,
}

/// Directed graph of internal module-to-module imports.
///
/// Nodes and edges are sorted by module id, so the value only depends on the
/// parsed modules, never on the order they were produced in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub external: Vec<ExternalDependency>,
    /// Each cycle's members, sorted.
    pub cycles: Vec<Vec<ModuleId>>,
    pub summary: GraphSummary,
}

/// Fills `Import::targets` for every module and returns one warning per import that
/// matched nothing.
///
/// Python imports are looked up by dotted module name, C# `using` directives by
/// declared namespace. Either way the reference is tried from its full form down to
/// its first segment and the first known name wins. A module never targets itself:
/// an import of its own name or namespace is resolved but produces no target.
pub fn link_imports(modules: &mut [Module], language: Language) -> Vec<ResolutionWarning> {
    let index = match language {
        Language::Python => python_index(modules),
        Language::CSharp => namespace_index(modules),
    };

    let mut warnings = Vec::new();
    for module in modules.iter_mut() {
        let package = match language {
            Language::Python => python_package(&module.path),
            Language::CSharp => Vec::new(),
        };
        for import in module.imports.iter_mut() {
            let reference = match language {
                Language::Python => absolute_python_reference(&import.raw, &package),
                Language::CSharp => import.raw.split('<').next().map(|s| s.trim().to_string()),
            };

            let found = reference.as_deref().and_then(|r| lookup(&index, r));
            match found {
                Some(targets) => {
                    import.resolved = true;
                    import.targets = targets
                        .iter()
                        .filter(|t| **t != module.path)
                        .cloned()
                        .collect();
                }
                None => {
                    import.resolved = false;
                    import.targets.clear();
                    warnings.push(ResolutionWarning {
                        module: module.path.clone(),
                        reference: import.raw.clone(),
                        line: import.line,
                    });
                }
            }
        }
    }
    warnings
}

fn lookup<'a>(index: &'a BTreeMap<String, BTreeSet<ModuleId>>, reference: &str) -> Option<&'a BTreeSet<ModuleId>> {
    let mut parts: Vec<&str> = reference.split('.').filter(|p| !p.is_empty()).collect();
    while !parts.is_empty() {
        if let Some(targets) = index.get(&parts.join(".")) {
            return Some(targets);
        }
        parts.pop();
    }
    None
}

/// Dotted import name of a Python module id: `pkg/mod.py` is `pkg.mod`,
/// `pkg/__init__.py` is `pkg`.
pub fn python_module_name(id: &str) -> String {
    let stem = id
        .strip_suffix(".py")
        .or_else(|| id.strip_suffix(".pyi"))
        .unwrap_or(id);
    let dotted = stem.replace('/', ".");
    match dotted.strip_suffix("__init__") {
        Some(package) => package.trim_end_matches('.').to_string(),
        None => dotted,
    }
}

fn python_index(modules: &[Module]) -> BTreeMap<String, BTreeSet<ModuleId>> {
    let mut index: BTreeMap<String, BTreeSet<ModuleId>> = BTreeMap::new();
    for module in modules {
        let name = python_module_name(&module.path);
        if name.is_empty() {
            continue;
        }
        // Projects using a `src/` layout import without the `src.` segment.
        if let Some(stripped) = name.strip_prefix("src.") {
            index
                .entry(stripped.to_string())
                .or_default()
                .insert(module.path.clone());
        }
        index.entry(name).or_default().insert(module.path.clone());
    }
    index
}

fn namespace_index(modules: &[Module]) -> BTreeMap<String, BTreeSet<ModuleId>> {
    let mut index: BTreeMap<String, BTreeSet<ModuleId>> = BTreeMap::new();
    for module in modules {
        for namespace in &module.namespaces {
            index
                .entry(namespace.clone())
                .or_default()
                .insert(module.path.clone());
        }
    }
    index
}

/// Package segments a relative import in `id` is anchored on.
fn python_package(id: &str) -> Vec<String> {
    let mut parts: Vec<String> = python_module_name(id)
        .split('.')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    let is_package = id.ends_with("__init__.py") || id.ends_with("__init__.pyi");
    if !is_package {
        parts.pop();
    }
    parts
}

/// Turns `..models.User` into an absolute dotted reference. `None` when the dots
/// climb above the repository root.
fn absolute_python_reference(raw: &str, package: &[String]) -> Option<String> {
    let level = raw.chars().take_while(|c| *c == '.').count();
    if level == 0 {
        return Some(raw.to_string());
    }
    if level - 1 > package.len() {
        return None;
    }
    let mut parts: Vec<&str> = package[..package.len() - (level - 1)]
        .iter()
        .map(String::as_str)
        .collect();
    let rest = &raw[level..];
    if !rest.is_empty() {
        parts.push(rest);
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}

impl DependencyGraph {
    /// Builds the graph from an entity model whose imports are already linked.
    pub fn from_model(model: &EntityModel) -> Self {
        let ids: Vec<&str> = model.modules.iter().map(|m| m.path.as_str()).collect();
        let position: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut weights: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        let mut external = Vec::new();

        for (source, module) in model.modules.iter().enumerate() {
            for import in &module.imports {
                if import.is_external() {
                    external.push(ExternalDependency {
                        module: module.path.clone(),
                        reference: import.raw.clone(),
                        line: import.line,
                    });
                    continue;
                }
                for target in &import.targets {
                    let Some(&target) = position.get(target.as_str()) else {
                        continue;
                    };
                    if target != source {
                        *weights.entry((source, target)).or_insert(0) += 1;
                    }
                }
            }
        }

        let n = ids.len();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];
        for &(source, target) in weights.keys() {
            adjacency[source].push(target);
            in_degree[target] += 1;
        }

        let components = strongly_connected_components(&adjacency);
        let mut in_cycle = vec![false; n];
        let mut cycles: Vec<Vec<ModuleId>> = Vec::new();
        for component in components.iter().filter(|c| c.len() > 1) {
            let mut members: Vec<ModuleId> = component
                .iter()
                .map(|&i| {
                    in_cycle[i] = true;
                    ids[i].to_string()
                })
                .collect();
            members.sort();
            cycles.push(members);
        }
        cycles.sort();

        let nodes: Vec<Node> = (0..n)
            .map(|i| Node {
                id: ids[i].to_string(),
                in_degree: in_degree[i],
                out_degree: adjacency[i].len(),
                in_cycle: in_cycle[i],
            })
            .collect();

        let edges: Vec<Edge> = weights
            .iter()
            .map(|(&(source, target), &weight)| Edge {
                source: ids[source].to_string(),
                target: ids[target].to_string(),
                weight,
            })
            .collect();

        let summary = summarize(&nodes, edges.len(), external.len());
        Self {
            nodes,
            edges,
            external,
            cycles,
            summary,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|e| e.source == source && e.target == target)
    }
}

fn summarize(nodes: &[Node], edge_count: usize, external_count: usize) -> GraphSummary {
    let module_count = nodes.len();
    let avg_out_degree = if module_count == 0 {
        0.0
    } else {
        round2(edge_count as f64 / module_count as f64)
    };

    let independent_modules = nodes
        .iter()
        .filter(|n| n.in_degree == 0 && n.out_degree == 0)
        .map(|n| n.id.clone())
        .collect();

    let mut ranked: Vec<&Node> = nodes.iter().filter(|n| n.in_degree > 0).collect();
    ranked.sort_by(|a, b| b.in_degree.cmp(&a.in_degree).then_with(|| a.id.cmp(&b.id)));
    let others = module_count.saturating_sub(1).max(1) as f64;
    let core_modules = ranked
        .into_iter()
        .take(CORE_MODULE_LIMIT)
        .map(|n| CoreModule {
            id: n.id.clone(),
            in_degree: n.in_degree,
            referenced_by: round2(n.in_degree as f64 * 100.0 / others),
        })
        .collect();

    GraphSummary {
        module_count,
        edge_count,
        external_count,
        avg_out_degree,
        independent_modules,
        core_modules,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Tarjan's algorithm over an adjacency list. Returns every component, singletons
/// included.
pub fn strongly_connected_components(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    struct State {
        index: usize,
        indices: Vec<Option<usize>>,
        lowlinks: Vec<usize>,
        stack: Vec<usize>,
        on_stack: HashSet<usize>,
        components: Vec<Vec<usize>>,
    }

    fn strongconnect(v: usize, adjacency: &[Vec<usize>], state: &mut State) {
        state.indices[v] = Some(state.index);
        state.lowlinks[v] = state.index;
        state.index += 1;
        state.stack.push(v);
        state.on_stack.insert(v);

        for &w in &adjacency[v] {
            match state.indices[w] {
                None => {
                    strongconnect(w, adjacency, state);
                    state.lowlinks[v] = state.lowlinks[v].min(state.lowlinks[w]);
                }
                Some(w_index) if state.on_stack.contains(&w) => {
                    state.lowlinks[v] = state.lowlinks[v].min(w_index);
                }
                Some(_) => {}
            }
        }

        // v is the root of a component: pop it off the stack.
        if Some(state.lowlinks[v]) == state.indices[v] {
            let mut component = Vec::new();
            while let Some(w) = state.stack.pop() {
                state.on_stack.remove(&w);
                component.push(w);
                if w == v {
                    break;
                }
            }
            state.components.push(component);
        }
    }

    let n = adjacency.len();
    let mut state = State {
        index: 0,
        indices: vec![None; n],
        lowlinks: vec![0; n],
        stack: Vec::new(),
        on_stack: HashSet::new(),
        components: Vec::new(),
    };
    for v in 0..n {
        if state.indices[v].is_none() {
            strongconnect(v, adjacency, &mut state);
        }
    }
    state.components
}
