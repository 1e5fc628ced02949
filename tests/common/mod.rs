#![allow(dead_code)]

use safyr::error::Error;
use safyr::interpreter::{global_context, Context, Interpreter, Value};

/// Run a source snippet against a fresh global context and return the
/// program value together with the context it ran in.
pub fn eval(src: &str) -> Result<(Value, Context), Error> {
    let ctx = global_context();
    let mut interpreter = Interpreter::new();
    let outcome = interpreter.run_source("<test>", src, &ctx)?;
    let value = outcome.into_value().expect("program was interrupted");
    Ok((value, ctx))
}

pub fn run(src: &str) -> Value {
    eval(src).expect("program should run").0
}

pub fn run_ctx(src: &str) -> Context {
    eval(src).expect("program should run").1
}

pub fn run_err(src: &str) -> Error {
    eval(src).expect_err("program should fail")
}

pub fn binding(ctx: &Context, name: &str) -> Value {
    ctx.table
        .borrow()
        .get(name)
        .unwrap_or_else(|| panic!("no binding named {name}"))
}
