//! The built-in function registry.
//!
//! Each built-in is a `{name, parameter-names}` pair. Calls run in a
//! fresh child scope with the arguments bound to the parameter names,
//! and dispatch lands in [`call`]. [`install`] seeds the registry (plus
//! the `null`/`T`/`F` constants and the `static-typing` flag) into a
//! root symbol table and records everything in its `globals` set so
//! child scopes inherit them.

use std::cell::RefCell;
use std::io::{BufRead, Read, Write};
use std::rc::Rc;

use crate::error::{Error, ErrorKind};
use crate::parser::Span;

use super::context::{Context, SymbolTableRef};
use super::value::{BuiltInValue, FileValue, Number, Value, ValueData};

pub const BUILTINS: &[(&str, &[&str])] = &[
    ("print", &["value"]),
    ("rprint", &["value"]),
    ("input", &[]),
    ("input_int", &[]),
    ("clear", &[]),
    ("type", &["value"]),
    ("isnum", &["value"]),
    ("isstr", &["value"]),
    ("islst", &["value"]),
    ("isfun", &["value"]),
    ("pop", &["list", "index"]),
    ("append", &["list", "value"]),
    ("extend", &["listA", "listB"]),
    ("keys", &["map"]),
    ("values", &["map"]),
    ("open", &["value", "mode"]),
    ("read", &["value"]),
    ("write", &["value", "data"]),
    ("close", &["value"]),
    ("range", &["value"]),
    ("rand", &[]),
    ("len", &["container"]),
];

pub fn param_names(name: &str) -> Option<&'static [&'static str]> {
    BUILTINS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, params)| *params)
}

/// Seed a root symbol table with the language constants and every
/// built-in, all marked global.
pub fn install(table: &SymbolTableRef) {
    let mut t = table.borrow_mut();

    t.set("null", Value::int(0));
    t.set("T", Value::int(1));
    t.set("F", Value::int(0));
    t.set("static-typing", Value::int(0));

    for (name, _) in BUILTINS {
        t.set(
            name,
            Value::new(ValueData::BuiltIn(BuiltInValue {
                name: name.to_string(),
            })),
        );
    }

    let names: Vec<String> = t.symbols.keys().cloned().collect();
    t.globals.extend(names);
}

fn arg(ctx: &Context, name: &str) -> Value {
    ctx.table
        .borrow()
        .get(name)
        .expect("builtin argument missing after population")
}

fn runtime_err(span: &Span, message: impl Into<String>) -> Error {
    Error::new(
        ErrorKind::Runtime,
        span.start.clone(),
        span.end.clone(),
        message,
    )
}

/// Dispatch a built-in by name against its execution context.
pub fn call(name: &str, ctx: &Context, span: &Span) -> Result<Value, Error> {
    match name {
        "print" => {
            println!("{}", arg(ctx, "value"));
            Ok(Value::int(0))
        }
        "rprint" => Ok(Value::string(format!("{}", arg(ctx, "value")))),
        "input" => {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .map_err(|e| runtime_err(span, format!("Error reading input: {e}")))?;
            Ok(Value::string(line.trim_end_matches(['\n', '\r'])))
        }
        "input_int" => loop {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .map_err(|e| runtime_err(span, format!("Error reading input: {e}")))?;
            let text = line.trim();
            match text.parse::<i64>() {
                Ok(n) => return Ok(Value::int(n)),
                Err(_) => println!("'{text}' must be an integer. Try again!"),
            }
        },
        "clear" => {
            print!("\x1B[2J\x1B[1;1H");
            let _ = std::io::stdout().flush();
            Ok(Value::int(0))
        }
        "type" => Ok(Value::string(arg(ctx, "value").type_name())),
        "isnum" => Ok(Value::bool(matches!(
            arg(ctx, "value").data,
            ValueData::Number(_)
        ))),
        "isstr" => Ok(Value::bool(matches!(
            arg(ctx, "value").data,
            ValueData::Str(_)
        ))),
        "islst" => Ok(Value::bool(matches!(
            arg(ctx, "value").data,
            ValueData::List(_)
        ))),
        "isfun" => Ok(Value::bool(matches!(
            arg(ctx, "value").data,
            ValueData::Function(_) | ValueData::StructGen(_) | ValueData::BuiltIn(_)
        ))),
        "pop" => {
            let list = arg(ctx, "list");
            let index = arg(ctx, "index");
            let ValueData::List(h) = &list.data else {
                return Err(runtime_err(span, "First argument must be list"));
            };
            let Some(idx) = index.as_int() else {
                return Err(runtime_err(span, "Second argument must be number"));
            };
            let mut elements = h.borrow_mut();
            let len = elements.len() as i64;
            let idx = if idx < 0 { idx + len } else { idx };
            if idx < 0 || idx >= len {
                return Err(Error::new(
                    ErrorKind::OutOfBounds,
                    span.start.clone(),
                    span.end.clone(),
                    format!("Index {} out of bounds", index),
                ));
            }
            Ok(elements.remove(idx as usize))
        }
        "append" => {
            let list = arg(ctx, "list");
            let value = arg(ctx, "value");
            let ValueData::List(h) = &list.data else {
                return Err(runtime_err(span, "First argument must be list"));
            };
            h.borrow_mut().push(value);
            Ok(Value::int(0))
        }
        "extend" => {
            let list_a = arg(ctx, "listA");
            let list_b = arg(ctx, "listB");
            let ValueData::List(a) = &list_a.data else {
                return Err(runtime_err(span, "First argument must be list"));
            };
            let ValueData::List(b) = &list_b.data else {
                return Err(runtime_err(span, "Second argument must be list"));
            };
            let additions: Vec<Value> = b.borrow().iter().cloned().collect();
            a.borrow_mut().extend(additions);
            Ok(Value::int(0))
        }
        "keys" => {
            let map = arg(ctx, "map");
            let ValueData::Map(h) = &map.data else {
                return Err(runtime_err(span, "Invalid input to keys()"));
            };
            let keys = h.borrow().iter().map(|(k, _)| k.clone()).collect();
            Ok(Value::list(keys))
        }
        "values" => {
            let map = arg(ctx, "map");
            let ValueData::Map(h) = &map.data else {
                return Err(runtime_err(span, "Invalid input to values()"));
            };
            let values = h.borrow().iter().map(|(_, v)| v.clone()).collect();
            Ok(Value::list(values))
        }
        "open" => {
            let name = arg(ctx, "value");
            let mode = arg(ctx, "mode");
            let ValueData::Str(name) = &name.data else {
                return Err(runtime_err(span, "Filename must be of type STR"));
            };
            let ValueData::Str(mode) = &mode.data else {
                return Err(runtime_err(span, "File access mode must be of type STR"));
            };

            let file = match mode.as_str() {
                "r" => std::fs::File::open(name)
                    .map_err(|_| runtime_err(span, format!("File \"{name}\" not found")))?,
                "w" => std::fs::File::create(name)
                    .map_err(|_| runtime_err(span, format!("Error opening file \"{name}\"")))?,
                "a" => std::fs::OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(name)
                    .map_err(|_| runtime_err(span, format!("Error opening file \"{name}\"")))?,
                _ => return Err(runtime_err(span, format!("Error opening file \"{name}\""))),
            };

            Ok(Value::new(ValueData::File(FileValue {
                name: name.clone(),
                mode: mode.clone(),
                handle: Rc::new(RefCell::new(Some(file))),
            })))
        }
        "read" => {
            let value = arg(ctx, "value");
            let ValueData::File(file) = &value.data else {
                return Err(runtime_err(span, format!("{value} is not of type FILE")));
            };
            if file.mode != "r" {
                return Err(runtime_err(
                    span,
                    format!("{value} is not open in 'read' mode"),
                ));
            }
            let mut handle = file.handle.borrow_mut();
            let Some(f) = handle.as_mut() else {
                return Err(runtime_err(span, format!("Error reading file {value}")));
            };
            let mut text = String::new();
            f.read_to_string(&mut text)
                .map_err(|_| runtime_err(span, format!("Error reading file {value}")))?;
            Ok(Value::string(text))
        }
        "write" => {
            let value = arg(ctx, "value");
            let data = arg(ctx, "data");
            let ValueData::File(file) = &value.data else {
                return Err(runtime_err(span, format!("{value} is not of type FILE")));
            };
            let ValueData::Str(data) = &data.data else {
                return Err(runtime_err(span, "Data is not of type STR"));
            };
            if file.mode != "w" {
                return Err(runtime_err(
                    span,
                    format!("{value} is not open in 'write' mode"),
                ));
            }
            let mut handle = file.handle.borrow_mut();
            let Some(f) = handle.as_mut() else {
                return Err(runtime_err(span, format!("Error writing file {value}")));
            };
            f.write_all(data.as_bytes())
                .map_err(|_| runtime_err(span, format!("Error writing file {value}")))?;
            Ok(Value::int(0))
        }
        "close" => {
            let value = arg(ctx, "value");
            let ValueData::File(file) = &value.data else {
                return Err(runtime_err(span, format!("{value} is not of type FILE")));
            };
            file.handle.borrow_mut().take();
            Ok(Value::int(0))
        }
        "range" => {
            let value = arg(ctx, "value");
            let Some(n) = value.as_number() else {
                return Err(runtime_err(span, "Input to range must be INT"));
            };
            let count = n.as_f64() as i64;
            Ok(Value::list((0..count.max(0)).map(Value::int).collect()))
        }
        "rand" => Ok(Value::number(Number::Flt(rand::random::<f64>()))),
        "len" => {
            let container = arg(ctx, "container");
            match &container.data {
                ValueData::List(h) => Ok(Value::int(h.borrow().len() as i64)),
                ValueData::Map(h) => Ok(Value::int(h.borrow().len() as i64)),
                ValueData::Str(s) => Ok(Value::int(s.chars().count() as i64)),
                _ => Err(runtime_err(span, "Input to len must be container")),
            }
        }
        _ => Err(runtime_err(span, format!("No built-in named {name}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::context::SymbolTable;

    fn ctx_with(args: &[(&str, Value)]) -> Context {
        let table = SymbolTable::new();
        for (name, value) in args {
            table.borrow_mut().set(name, value.clone());
        }
        Context::new("<test>", table)
    }

    #[test]
    fn test_install_seeds_constants_and_globals() {
        let table = SymbolTable::new();
        install(&table);

        let t = table.borrow();
        assert!(t.get("T").unwrap().is_true());
        assert!(!t.get("F").unwrap().is_true());
        assert!(t.get("print").is_some());
        assert!(t.globals.contains("print"));
        assert!(t.globals.contains("static-typing"));
    }

    #[test]
    fn test_every_builtin_has_params() {
        for (name, _) in BUILTINS {
            assert!(param_names(name).is_some());
        }
        assert!(param_names("no_such_builtin").is_none());
    }

    #[test]
    fn test_type_builtin() {
        let ctx = ctx_with(&[("value", Value::float(1.5))]);
        let result = call("type", &ctx, &Span::default()).unwrap();
        assert!(result.strict_eq(&Value::string("FLT")));
    }

    #[test]
    fn test_predicates() {
        let ctx = ctx_with(&[("value", Value::string("x"))]);
        assert!(call("isstr", &ctx, &Span::default()).unwrap().is_true());
        assert!(!call("isnum", &ctx, &Span::default()).unwrap().is_true());
        assert!(!call("islst", &ctx, &Span::default()).unwrap().is_true());
        assert!(!call("isfun", &ctx, &Span::default()).unwrap().is_true());
    }

    #[test]
    fn test_append_mutates_through_the_binding() {
        let list = Value::list(vec![Value::int(1)]);
        let ctx = ctx_with(&[("list", list.clone()), ("value", Value::int(2))]);
        call("append", &ctx, &Span::default()).unwrap();

        assert!(list.strict_eq(&Value::list(vec![Value::int(1), Value::int(2)])));
    }

    #[test]
    fn test_pop_returns_element_and_checks_bounds() {
        let list = Value::list(vec![Value::int(1), Value::int(2)]);
        let ctx = ctx_with(&[("list", list.clone()), ("index", Value::int(0))]);
        let popped = call("pop", &ctx, &Span::default()).unwrap();

        assert!(popped.strict_eq(&Value::int(1)));
        assert!(list.strict_eq(&Value::list(vec![Value::int(2)])));

        let ctx = ctx_with(&[("list", list), ("index", Value::int(7))]);
        let err = call("pop", &ctx, &Span::default()).unwrap_err();
        assert_eq!(ErrorKind::OutOfBounds, err.kind);
    }

    #[test]
    fn test_extend() {
        let a = Value::list(vec![Value::int(1)]);
        let b = Value::list(vec![Value::int(2), Value::int(3)]);
        let ctx = ctx_with(&[("listA", a.clone()), ("listB", b)]);
        call("extend", &ctx, &Span::default()).unwrap();

        assert!(a.strict_eq(&Value::list(vec![
            Value::int(1),
            Value::int(2),
            Value::int(3)
        ])));
    }

    #[test]
    fn test_keys_and_values_preserve_insertion_order() {
        let map = Value::map(vec![
            (Value::string("b"), Value::int(2)),
            (Value::string("a"), Value::int(1)),
        ]);
        let ctx = ctx_with(&[("map", map)]);

        let keys = call("keys", &ctx, &Span::default()).unwrap();
        assert!(keys.strict_eq(&Value::list(vec![
            Value::string("b"),
            Value::string("a")
        ])));

        let values = call("values", &ctx, &Span::default()).unwrap();
        assert!(values.strict_eq(&Value::list(vec![Value::int(2), Value::int(1)])));
    }

    #[test]
    fn test_range_builds_a_list() {
        let ctx = ctx_with(&[("value", Value::int(3))]);
        let result = call("range", &ctx, &Span::default()).unwrap();
        assert!(result.strict_eq(&Value::list(vec![
            Value::int(0),
            Value::int(1),
            Value::int(2)
        ])));
    }

    #[test]
    fn test_len_covers_containers_only() {
        let ctx = ctx_with(&[("container", Value::string("abc"))]);
        assert!(call("len", &ctx, &Span::default())
            .unwrap()
            .strict_eq(&Value::int(3)));

        let ctx = ctx_with(&[("container", Value::int(3))]);
        assert_eq!(
            ErrorKind::Runtime,
            call("len", &ctx, &Span::default()).unwrap_err().kind
        );
    }

    #[test]
    fn test_rand_yields_flt() {
        let ctx = ctx_with(&[]);
        let result = call("rand", &ctx, &Span::default()).unwrap();
        assert_eq!("FLT", result.type_name());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let path_str = path.to_string_lossy().to_string();

        let ctx = ctx_with(&[
            ("value", Value::string(path_str.clone())),
            ("mode", Value::string("w")),
        ]);
        let file = call("open", &ctx, &Span::default()).unwrap();

        let ctx = ctx_with(&[("value", file.clone()), ("data", Value::string("hi"))]);
        call("write", &ctx, &Span::default()).unwrap();

        let ctx = ctx_with(&[("value", file)]);
        call("close", &ctx, &Span::default()).unwrap();

        let ctx = ctx_with(&[
            ("value", Value::string(path_str)),
            ("mode", Value::string("r")),
        ]);
        let file = call("open", &ctx, &Span::default()).unwrap();
        let ctx = ctx_with(&[("value", file)]);
        let text = call("read", &ctx, &Span::default()).unwrap();
        assert!(text.strict_eq(&Value::string("hi")));
    }

    #[test]
    fn test_open_missing_file_for_read_errors() {
        let ctx = ctx_with(&[
            ("value", Value::string("definitely/not/here.txt")),
            ("mode", Value::string("r")),
        ]);
        let err = call("open", &ctx, &Span::default()).unwrap_err();
        assert_eq!(ErrorKind::Runtime, err.kind);
    }
}
