//! End-to-end scenarios driving the full lex → parse → evaluate
//! pipeline.

mod common;

use common::{binding, run, run_ctx};
use safyr::interpreter::{Value, ValueData};
use safyr::lexer::Lexer;
use safyr::parser::Parser;

/// Multi-statement programs evaluate to the list of statement values;
/// the final entry is the program's answer.
fn last_value(value: Value) -> Value {
    match &value.data {
        ValueData::List(h) => h.borrow().last().cloned().unwrap_or_else(|| value.clone()),
        _ => value,
    }
}

#[test]
fn scenario_augmented_assignment_stays_dynamic() {
    let ctx = run_ctx("a=1\na+=1\na");
    let a = binding(&ctx, "a");
    assert!(a.strict_eq(&Value::int(2)));
    assert!(!a.meta.is_static);
}

#[test]
fn scenario_typed_binding_truncates_floats() {
    let ctx = run_ctx("int a=1\na=6.\na");
    assert!(binding(&ctx, "a").strict_eq(&Value::int(6)));
}

#[test]
fn scenario_nested_struct_chain_reads_through() {
    let src = "::u [a] {\nx = a\n}\nm = u(11)\nn = :: [b] {\ny = b\n}(m)\nn.y.x";
    assert!(last_value(run(src)).strict_eq(&Value::int(11)));
}

#[test]
fn scenario_nested_struct_chain_assignment() {
    let src = "::u [a] {\nx = a\n}\nm = u(11)\nn = :: [b] {\ny = b\n}(m)\nn.y.x = 99\nn.y.x";
    assert!(last_value(run(src)).strict_eq(&Value::int(99)));
}

#[test]
fn scenario_string_subtraction_and_splitting() {
    assert!(run("\"babcb\"-\"b\"").strict_eq(&Value::string("ac")));
    assert!(run("\"abc\"/\"b\"").strict_eq(&Value::list(vec![
        Value::string("a"),
        Value::string("c")
    ])));
}

#[test]
fn scenario_when_trigger_terminates_busy_loop() {
    let ctx = run_ctx("a=1\nb=0\nwhen a==10: b=57\nwhile b!=57: a+=1");
    assert!(binding(&ctx, "a").strict_eq(&Value::int(10)));
    assert!(binding(&ctx, "b").strict_eq(&Value::int(57)));
}

#[test]
fn scenario_try_catch_recovery() {
    let ctx = run_ctx("a=1\ntry: a=a/0\ncatch: a=3");
    assert!(binding(&ctx, "a").strict_eq(&Value::int(3)));

    let ctx = run_ctx("a=1\ntry: a=a/1\ncatch: a=3");
    assert!(binding(&ctx, "a").strict_eq(&Value::int(1)));
}

#[test]
fn parsing_is_deterministic_across_runs() {
    let src = "a = [1 2]\n? a @ 0 == 1 {\nb = \"one\"\n}\n! : b = \"other\"\n:f [x] <~ x ^ 2\nc = f(3)";
    let first = Parser::new(Lexer::new(src).tokenize().unwrap())
        .parse()
        .unwrap();
    let second = Parser::new(Lexer::new(src).tokenize().unwrap())
        .parse()
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn copies_compare_equal_to_their_source() {
    let value = run("[1 2.5 \"three\" {4: [5]}]");
    assert!(value.clone().strict_eq(&value));
    assert!(value.deep_copy().strict_eq(&value));
}

#[test]
fn number_identities_hold_end_to_end() {
    for n in ["0", "1", "7", "2.5", "-3", "-0.25"] {
        assert!(run(&format!("{n} + 0 == {n}")).is_true());
        assert!(run(&format!("{n} * 1 == {n}")).is_true());
        assert!(run(&format!("{n} - {n} == 0")).is_true());
        assert!(run(&format!("{n} / 1 == {n}")).is_true());
    }
}

#[test]
fn list_slices_partition_the_list() {
    // (L </ k) extended by the remainder rebuilds L
    let src = "L = [1 2 3 4 5]\nleft = L </ 2\nrest = L /> 3\nleft <~ rest\nleft == L";
    assert!(last_value(run(src)).is_true());
}

#[test]
fn map_key_removal_shrinks_by_one() {
    let ctx = run_ctx("M = {1: \"a\" 2: \"b\" 3: \"c\"}\nS = M - 2\nhas = S ~> 2\nn = len(S)");
    assert!(!binding(&ctx, "has").is_true());
    assert!(binding(&ctx, "n").strict_eq(&Value::int(2)));
}

#[test]
fn string_split_rejoins_to_source_without_empties() {
    let ctx = run_ctx(
        "s = \"a,b,,c\"\nparts = s / \",\"\nout = \"\"\nforeach p in parts: out += p",
    );
    assert!(binding(&ctx, "parts").strict_eq(&Value::list(vec![
        Value::string("a"),
        Value::string("b"),
        Value::string("c"),
    ])));
    assert!(binding(&ctx, "out").strict_eq(&Value::string("abc")));
}
