//! Module import behavior: `use` re-enters the pipeline and evaluates
//! the imported source in the caller's context.

mod common;

use std::collections::HashMap;
use std::fs;

use common::binding;
use safyr::error::ErrorKind;
use safyr::interpreter::{global_context, FsResolver, Interpreter, ModuleResolver, Value};

/// In-memory resolver for tests that do not need a filesystem.
struct MemResolver {
    modules: HashMap<String, String>,
}

impl MemResolver {
    fn new(modules: &[(&str, &str)]) -> Self {
        Self {
            modules: modules
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl ModuleResolver for MemResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        self.modules.get(name).cloned()
    }
}

#[test]
fn test_imported_definitions_become_visible() {
    let ctx = global_context();
    let mut interpreter = Interpreter::with_resolver(Box::new(MemResolver::new(&[(
        "mathutils",
        ":add [a b] <~ a + b\n",
    )])));

    interpreter
        .run_source("<test>", "use mathutils\na = add(1 2)", &ctx)
        .unwrap();

    assert!(binding(&ctx, "a").strict_eq(&Value::int(3)));
}

#[test]
fn test_imports_evaluate_in_the_callers_context() {
    // the module rebinds an existing caller variable
    let ctx = global_context();
    let mut interpreter = Interpreter::with_resolver(Box::new(MemResolver::new(&[(
        "shadow",
        "a = 99\n",
    )])));

    interpreter
        .run_source("<test>", "a = 1\nuse shadow\nb = a", &ctx)
        .unwrap();

    assert!(binding(&ctx, "b").strict_eq(&Value::int(99)));
}

#[test]
fn test_missing_module_reports_module_not_found() {
    let ctx = global_context();
    let mut interpreter = Interpreter::with_resolver(Box::new(MemResolver::new(&[])));

    let err = interpreter
        .run_source("<test>", "use nowhere", &ctx)
        .unwrap_err();
    assert_eq!(ErrorKind::ModuleNotFound, err.kind);
}

#[test]
fn test_unparsable_module_reports_module_import() {
    let ctx = global_context();
    let mut interpreter = Interpreter::with_resolver(Box::new(MemResolver::new(&[(
        "broken",
        "a = [1 2\n",
    )])));

    let err = interpreter
        .run_source("<test>", "use broken", &ctx)
        .unwrap_err();
    assert_eq!(ErrorKind::ModuleImport, err.kind);
}

#[test]
fn test_fs_resolver_reads_sfr_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("helpers.sfr"), ":triple [x] <~ x * 3\n").unwrap();

    let ctx = global_context();
    let mut interpreter = Interpreter::with_resolver(Box::new(FsResolver {
        root: dir.path().to_path_buf(),
    }));

    interpreter
        .run_source("<test>", "use helpers\nn = triple(4)", &ctx)
        .unwrap();

    assert!(binding(&ctx, "n").strict_eq(&Value::int(12)));
}

#[test]
fn test_use_static_is_not_a_module() {
    let ctx = global_context();
    let mut interpreter = Interpreter::with_resolver(Box::new(MemResolver::new(&[])));

    interpreter
        .run_source("<test>", "use static\na = 1", &ctx)
        .unwrap();

    assert!(binding(&ctx, "static-typing").is_true());
    assert!(binding(&ctx, "a").meta.is_static);
}
