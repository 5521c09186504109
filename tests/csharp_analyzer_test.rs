use codemnesis_rs::analyzers::csharp::CSharpAnalyzer;
use codemnesis_rs::analyzers::LanguageAnalyzer;
use codemnesis_rs::model::{CallableKind, TypeKind};

const SERVICE: &str = r#"/// <summary>Billing services.</summary>
using System;
using System.Collections.Generic;
using static System.Math;
using Json = Newtonsoft.Json;

namespace Shop.Billing
{
    /// <summary>
    /// Computes invoices.
    /// </summary>
    [Serializable]
    [Obsolete("use v2"), DebuggerDisplay("x")]
    public class InvoiceService : IInvoiceService
    {
        private readonly Dictionary<string, int> _cache = new();

        public InvoiceService(ILogger logger, IClock clock)
        {
            _logger = logger;
        }

        /// <summary>Total of the invoice.</summary>
        /// <param name="id">Invoice id.</param>
        /// <returns>The total.</returns>
        [HttpGet("{id}")]
        public async Task<decimal> GetTotalAsync(int id, CancellationToken ct = default)
        {
            var s = "not { a brace";
            return 0m;
        }

        public string Name { get; set; } = "";

        public int Count => _cache.Count;

        public decimal Rate
        {
            get { return 1m; }
        }

        private void Recalculate(
            int from,
            int to)
        {
        }

        public enum Status { Open, Closed }

        private class Line
        {
            public void Render() { }
        }
    }

    public interface IInvoiceService
    {
        Task<decimal> GetTotalAsync(int id, CancellationToken ct);
    }

    public record struct Money(decimal Amount, string Currency);
}
"#;

#[test]
fn test_module_level_facts() {
    let module = CSharpAnalyzer.parse("Billing/InvoiceService.cs", SERVICE).unwrap();

    assert!(module.parsed);
    assert_eq!(module.docstring.as_deref(), Some("Billing services."));
    assert_eq!(module.namespaces, vec!["Shop.Billing"]);

    let raws: Vec<_> = module.imports.iter().map(|i| i.raw.as_str()).collect();
    assert_eq!(
        raws,
        vec!["System", "System.Collections.Generic", "System.Math", "Newtonsoft.Json"]
    );
    assert_eq!(module.imports[3].alias.as_deref(), Some("Json"));
    assert_eq!(module.imports[0].line, 2);
    assert!(module.callables.is_empty());
}

#[test]
fn test_types_and_members() {
    let module = CSharpAnalyzer.parse("Billing/InvoiceService.cs", SERVICE).unwrap();

    let names: Vec<_> = module.types.iter().map(|t| (t.name.as_str(), t.kind)).collect();
    assert_eq!(
        names,
        vec![
            ("InvoiceService", TypeKind::Class),
            ("IInvoiceService", TypeKind::Interface),
            ("Money", TypeKind::Struct),
        ]
    );

    let service = &module.types[0];
    assert_eq!(service.docstring.as_deref(), Some("Computes invoices."));
    assert_eq!(
        service.decorators,
        vec!["Serializable", "Obsolete(\"use v2\")", "DebuggerDisplay(\"x\")"]
    );

    let members: Vec<_> = service
        .callables
        .iter()
        .map(|c| (c.name.as_str(), c.kind, c.params))
        .collect();
    assert_eq!(
        members,
        vec![
            ("InvoiceService", CallableKind::Method, 2),
            ("GetTotalAsync", CallableKind::Method, 2),
            ("Name", CallableKind::Property, 0),
            ("Count", CallableKind::Property, 0),
            ("Rate", CallableKind::Property, 0),
            ("Recalculate", CallableKind::Method, 2),
        ]
    );

    let total = &service.callables[1];
    assert_eq!(total.decorators, vec!["HttpGet(\"{id}\")"]);
    assert_eq!(
        total.docstring.as_deref(),
        Some("Total of the invoice.\n\n*Params:*\n- id: Invoice id.\n\n*Returns:*\n- The total.")
    );
    assert!(service.callables[0].docstring.is_none());
    assert_eq!(service.callables[5].line, 42);

    let fields: Vec<_> = service.fields.iter().map(|f| (f.name.as_str(), f.line)).collect();
    assert_eq!(fields, vec![("_cache", 20)]);

    let nested: Vec<_> = service.types.iter().map(|t| (t.name.as_str(), t.kind)).collect();
    assert_eq!(nested, vec![("Status", TypeKind::Enum), ("Line", TypeKind::Class)]);
    assert_eq!(service.types[1].callables[0].name, "Render");

    let contract = &module.types[1];
    assert_eq!(contract.callables.len(), 1);
    assert_eq!(contract.callables[0].name, "GetTotalAsync");
}

#[test]
fn test_file_scoped_namespace_and_expression_bodies() {
    let code = r#"namespace Shop.Core;

public static class Ext
{
    public static string Slug(this string s) => s.ToLower();

    private static readonly Regex Pattern = new Regex("[a-z]+");

    public static bool operator ==(Ext a, Ext b) => true;
}
"#;
    let module = CSharpAnalyzer.parse("Ext.cs", code).unwrap();

    assert_eq!(module.namespaces, vec!["Shop.Core"]);
    assert!(module.docstring.is_none());
    let ext = &module.types[0];
    assert_eq!(ext.callables.len(), 1);
    assert_eq!(ext.callables[0].name, "Slug");
    assert_eq!(ext.callables[0].params, 1);
    assert_eq!(ext.fields.len(), 1);
    assert_eq!(ext.fields[0].name, "Pattern");
}

#[test]
fn test_fields_take_doc_comments() {
    let code = r#"public class Limits
{
    /// <summary>Upper bound.</summary>
    public const int Max = 10;

    [NonSerialized]
    private int _count, _total;

    protected List<string> Names;

    public int Current => _count;
}

public enum Color
{
    Red,
    Green
}
"#;
    let module = CSharpAnalyzer.parse("Limits.cs", code).unwrap();

    let limits = &module.types[0];
    let fields: Vec<_> = limits
        .fields
        .iter()
        .map(|f| (f.name.as_str(), f.docstring.as_deref()))
        .collect();
    assert_eq!(
        fields,
        vec![("Max", Some("Upper bound.")), ("_count", None), ("Names", None)]
    );
    assert_eq!(limits.callables.len(), 1);
    assert_eq!(limits.callables[0].kind, CallableKind::Property);
    assert!(limits.callables[0].decorators.is_empty());
    assert!(module.types[1].fields.is_empty());
}

#[test]
fn test_nested_namespaces_are_qualified() {
    let code = "namespace Outer\n{\n    namespace Inner\n    {\n        class C { }\n    }\n}\n";
    let module = CSharpAnalyzer.parse("C.cs", code).unwrap();

    assert_eq!(module.namespaces, vec!["Outer", "Outer.Inner"]);
    assert_eq!(module.types.len(), 1);
    assert_eq!(module.types[0].name, "C");
}

#[test]
fn test_line_counts() {
    let code = "// header\nusing System;\n\n/* block\n * more\n */\nclass A\n{\n}\n";
    let module = CSharpAnalyzer.parse("A.cs", code).unwrap();
    assert_eq!(module.loc, 9);
    assert_eq!(module.sloc, 4);
}

#[test]
fn test_unclosed_brace_is_parse_error() {
    let err = CSharpAnalyzer
        .parse("Broken.cs", "class A\n{\n    void M() {\n}\n")
        .unwrap_err();
    assert_eq!(err.path.to_str(), Some("Broken.cs"));
    assert!(err.message.contains("unclosed"));
}

#[test]
fn test_stray_closing_brace_is_parse_error() {
    let err = CSharpAnalyzer.parse("Stray.cs", "class A { }\n}\n").unwrap_err();
    assert_eq!(err.line, 2);
}

#[test]
fn test_unterminated_comment_is_parse_error() {
    let err = CSharpAnalyzer
        .parse("Comment.cs", "class A { }\n/* never closed\n")
        .unwrap_err();
    assert_eq!(err.line, 2);
}
