use crate::config::MagicPolicy;
use crate::model::{Callable, EntityModel, Field, Module, ModuleId};
use crate::utils::name_tokens;
use serde::Serialize;

/// A callable flagged by the magic-function heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MagicFunction {
    pub name: String,
    pub line: usize,
    /// Owning type, `None` for a free function.
    pub owner: Option<String>,
}

/// Indicators of one module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleMetrics {
    pub module: ModuleId,
    pub parsed: bool,
    /// Types, nested ones included.
    pub types: usize,
    /// Free functions, methods and properties.
    pub callables: usize,
    /// Class attributes and fields of every type.
    pub fields: usize,
    pub documented_types: usize,
    pub documented_callables: usize,
    pub documented_fields: usize,
    /// Documented callables over all callables; 0 when the module has none.
    pub documented_ratio: f64,
    /// Decorators and attributes on every entity of the module.
    pub decorators: usize,
    pub magic_functions: Vec<MagicFunction>,
    pub imports: usize,
    pub loc: usize,
    pub sloc: usize,
}

impl ModuleMetrics {
    pub fn entities(&self) -> usize {
        self.types + self.callables + self.fields
    }

    pub fn documented(&self) -> usize {
        self.documented_types + self.documented_callables + self.documented_fields
    }
}

/// Reductions over every module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositoryMetrics {
    pub modules: usize,
    pub parsed_modules: usize,
    pub types: usize,
    pub callables: usize,
    pub fields: usize,
    /// Documented callables.
    pub documented: usize,
    /// Sum of documented callables over sum of callables.
    pub documented_ratio: f64,
    /// Mean of the ratios of modules that have at least one callable.
    pub mean_module_ratio: f64,
    /// Documented types over types.
    pub type_documented_ratio: f64,
    /// Documented free functions over free functions.
    pub function_documented_ratio: f64,
    /// Documented methods and properties over methods and properties.
    pub method_documented_ratio: f64,
    /// Documented fields over fields.
    pub field_documented_ratio: f64,
    pub decorators: usize,
    pub magic_functions: usize,
    pub imports: usize,
    pub loc: usize,
    pub sloc: usize,
}

/// Output of the metrics phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    /// Sorted by module id.
    pub modules: Vec<ModuleMetrics>,
    pub repository: RepositoryMetrics,
}

impl Metrics {
    pub fn module(&self, id: &str) -> Option<&ModuleMetrics> {
        self.modules
            .binary_search_by(|m| m.module.as_str().cmp(id))
            .ok()
            .map(|idx| &self.modules[idx])
    }
}

/// Computes every indicator. Pure: the same model and policy always give the same value.
pub fn compute(model: &EntityModel, policy: &MagicPolicy) -> Metrics {
    let mut modules: Vec<ModuleMetrics> = model
        .modules
        .iter()
        .map(|m| module_metrics(m, policy))
        .collect();
    modules.sort_by(|a, b| a.module.cmp(&b.module));
    let repository = reduce(model, &modules);
    Metrics {
        modules,
        repository,
    }
}

pub fn module_metrics(module: &Module, policy: &MagicPolicy) -> ModuleMetrics {
    let types = module.all_types();
    let mut decorators: usize = types.iter().map(|t| t.decorators.len()).sum();

    let mut magic_functions = Vec::new();
    let mut callables = 0;
    let mut documented_callables = 0;

    let mut visit = |callable: &Callable, owner: Option<&str>| {
        callables += 1;
        if callable.documented() {
            documented_callables += 1;
        }
        decorators += callable.decorators.len();
        if is_magic(callable, policy) {
            magic_functions.push(MagicFunction {
                name: callable.name.clone(),
                line: callable.line,
                owner: owner.map(str::to_string),
            });
        }
    };
    for callable in &module.callables {
        visit(callable, None);
    }
    for t in &types {
        for callable in &t.callables {
            visit(callable, Some(&t.name));
        }
    }

    let fields: Vec<&Field> = types.iter().flat_map(|t| t.fields.iter()).collect();

    ModuleMetrics {
        module: module.path.clone(),
        parsed: module.parsed,
        types: types.len(),
        callables,
        fields: fields.len(),
        documented_types: types.iter().filter(|t| t.documented()).count(),
        documented_callables,
        documented_fields: fields.iter().filter(|f| f.documented()).count(),
        documented_ratio: ratio(documented_callables, callables),
        decorators,
        magic_functions,
        imports: module.imports.len(),
        loc: module.loc,
        sloc: module.sloc,
    }
}

fn reduce(model: &EntityModel, modules: &[ModuleMetrics]) -> RepositoryMetrics {
    let types: usize = modules.iter().map(|m| m.types).sum();
    let callables: usize = modules.iter().map(|m| m.callables).sum();
    let fields: usize = modules.iter().map(|m| m.fields).sum();
    let documented: usize = modules.iter().map(|m| m.documented_callables).sum();

    let with_callables: Vec<f64> = modules
        .iter()
        .filter(|m| m.callables > 0)
        .map(|m| m.documented_ratio)
        .collect();
    let mean_module_ratio = if with_callables.is_empty() {
        0.0
    } else {
        with_callables.iter().sum::<f64>() / with_callables.len() as f64
    };

    let functions: Vec<&Callable> = model.modules.iter().flat_map(|m| m.callables.iter()).collect();
    let methods = callables - functions.len();
    let documented_functions = functions.iter().filter(|c| c.documented()).count();

    RepositoryMetrics {
        modules: modules.len(),
        parsed_modules: modules.iter().filter(|m| m.parsed).count(),
        types,
        callables,
        fields,
        documented,
        documented_ratio: ratio(documented, callables),
        mean_module_ratio,
        type_documented_ratio: ratio(modules.iter().map(|m| m.documented_types).sum(), types),
        function_documented_ratio: ratio(documented_functions, functions.len()),
        method_documented_ratio: ratio(documented - documented_functions, methods),
        field_documented_ratio: ratio(modules.iter().map(|m| m.documented_fields).sum(), fields),
        decorators: modules.iter().map(|m| m.decorators).sum(),
        magic_functions: modules.iter().map(|m| m.magic_functions.len()).sum(),
        imports: modules.iter().map(|m| m.imports).sum(),
        loc: modules.iter().map(|m| m.loc).sum(),
        sloc: modules.iter().map(|m| m.sloc).sum(),
    }
}

/// `part / total`, or 0 for an empty total.
pub fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// A callable with no parameters, no documentation and no descriptive name.
///
/// Dunder names (`__str__`) are fixed by the language and never flagged.
pub fn is_magic(callable: &Callable, policy: &MagicPolicy) -> bool {
    let dunder = callable.name.len() > 4
        && callable.name.starts_with("__")
        && callable.name.ends_with("__");
    callable.params == 0 && !callable.documented() && !dunder && !is_descriptive(&callable.name, policy)
}

/// Whether at least one token of `name` is long enough and not a generic word.
pub fn is_descriptive(name: &str, policy: &MagicPolicy) -> bool {
    name_tokens(name).iter().any(|token| {
        token.chars().count() >= policy.min_token_len
            && !policy
                .generic_tokens
                .iter()
                .any(|generic| generic.eq_ignore_ascii_case(token))
    })
}
