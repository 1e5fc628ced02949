//! The AST-walking evaluator.
//!
//! Every visit returns an [`Outcome`]: a plain value, or one of the
//! control-flow interrupts (`continue`, `break`, `return` with a
//! value). Statement-bearing constructs propagate interrupts outward;
//! loops absorb `continue`/`break`, calls absorb `return`.

pub mod builtins;
pub mod context;
pub mod value;

pub use context::*;
pub use value::*;

use std::path::PathBuf;
use std::rc::Rc;

use log::{debug, warn};

use crate::error::{Error, ErrorKind};
use crate::lexer::{Lexer, TokenKind, KEYWORDS};
use crate::parser::{AssignOp, IfCase, Node, NumberLit, Parser, Span, TypeTag};

pub type RunResult = Result<Outcome, Error>;

#[derive(Debug)]
pub enum Outcome {
    Value(Value),
    Return(Value),
    Continue,
    Break,
}

impl Outcome {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Outcome::Value(v) | Outcome::Return(v) => Some(v),
            _ => None,
        }
    }
}

/// Host-supplied module source lookup for `use`.
pub trait ModuleResolver {
    fn resolve(&self, name: &str) -> Option<String>;
}

/// Reads `<name>.sfr` below a root directory.
pub struct FsResolver {
    pub root: PathBuf,
}

impl ModuleResolver for FsResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(format!("{name}.sfr"))).ok()
    }
}

/// A root context with the built-in registry installed.
pub fn global_context() -> Context {
    let table = SymbolTable::new();
    builtins::install(&table);
    Context::new("<program>", table)
}

/// Evaluate `$node`, yielding its value; any interrupt propagates out
/// of the enclosing visit function.
macro_rules! eval {
    ($self:ident, $node:expr, $ctx:expr) => {
        match $self.visit($node, $ctx)? {
            Outcome::Value(value) => value,
            other => return Ok(other),
        }
    };
}

enum AccessKey {
    Name(String),
    Val(Value),
}

pub struct Interpreter {
    resolver: Box<dyn ModuleResolver>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            resolver: Box::new(FsResolver {
                root: PathBuf::from("."),
            }),
        }
    }

    pub fn with_resolver(resolver: Box<dyn ModuleResolver>) -> Self {
        Self { resolver }
    }

    /// Run a source string through the full pipeline in `ctx`.
    pub fn run_source(&mut self, name: &str, source: &str, ctx: &Context) -> RunResult {
        let static_mode = self.static_mode(ctx);

        let tokens = Lexer::named(name, source).tokenize()?;
        let mut parser = Parser::with_static_mode(tokens, static_mode);
        let ast = parser.parse()?;
        for w in &parser.warnings {
            warn!("{name}: {w}");
        }

        self.visit(&ast, ctx)
    }

    fn static_mode(&self, ctx: &Context) -> bool {
        ctx.table
            .borrow()
            .get("static-typing")
            .map(|v| v.is_true())
            .unwrap_or(false)
    }

    pub fn visit(&mut self, node: &Node, ctx: &Context) -> RunResult {
        match node {
            Node::Number { value, span } => {
                let v = match value {
                    NumberLit::Int(n) => Value::int(*n),
                    NumberLit::Flt(n) => Value::float(*n),
                };
                Ok(Outcome::Value(v.with_span(span.clone())))
            }
            Node::Str { value, span } => {
                Ok(Outcome::Value(Value::string(value.clone()).with_span(span.clone())))
            }
            Node::List { elements, span } => {
                let mut values = vec![];
                for element in elements {
                    values.push(eval!(self, element, ctx));
                }
                Ok(Outcome::Value(Value::list(values).with_span(span.clone())))
            }
            Node::Map { entries, span } => {
                let mut values: Vec<(Value, Value)> = vec![];
                for (key_node, value_node) in entries {
                    let key = eval!(self, key_node, ctx);
                    let value = eval!(self, value_node, ctx);
                    if let Some(slot) = values.iter_mut().find(|(k, _)| k.strict_eq(&key)) {
                        slot.1 = value;
                    } else {
                        values.push((key, value));
                    }
                }
                Ok(Outcome::Value(Value::map(values).with_span(span.clone())))
            }
            Node::Capsule { statements, span } => {
                let mut values = vec![];
                for statement in statements {
                    values.push(eval!(self, statement, ctx));
                }
                if values.len() == 1 {
                    return Ok(Outcome::Value(values.remove(0)));
                }
                Ok(Outcome::Value(Value::list(values).with_span(span.clone())))
            }
            Node::VarAccess { name, span } => {
                let value = ctx.table.borrow().get(name);
                let Some(value) = value else {
                    return Err(Error::new(
                        ErrorKind::VariableAccess,
                        span.start.clone(),
                        span.end.clone(),
                        format!("'{name}' is not defined"),
                    ));
                };
                Ok(Outcome::Value(value.with_span(span.clone())))
            }
            Node::VarAssign {
                name,
                op,
                value,
                constant,
                global,
                type_tag,
                span,
            } => self.visit_var_assign(name, *op, value, *constant, *global, *type_tag, span, ctx),
            Node::ReferenceAccess { head, .. } => self.visit(head, ctx),
            Node::ReferenceAssign {
                target,
                op,
                value,
                span,
            } => self.visit_reference_assign(target, *op, value, span, ctx),
            Node::BinOp {
                left, op, right, span,
            } => self.visit_bin_op(left, *op, right, span, ctx),
            Node::UnaryOp { op, operand, span } => {
                let value = eval!(self, operand, ctx);
                let result = match op {
                    TokenKind::Mns => value.mul(&Value::int(-1)),
                    TokenKind::Not => value.lognot(),
                    _ => Ok(value),
                };
                let result = result.map_err(|e| e.or_span(&span.start, &span.end))?;
                Ok(Outcome::Value(result.with_span(span.clone())))
            }
            Node::If {
                cases, else_case, ..
            } => self.visit_if(cases, else_case.as_deref(), ctx),
            Node::For {
                var,
                start,
                end,
                step,
                body,
                span,
                ..
            } => self.visit_for(var, start, end, step.as_deref(), body, span, ctx),
            Node::ForEach {
                var,
                container,
                body,
                span,
                ..
            } => self.visit_foreach(var, container, body, span, ctx),
            Node::While {
                condition,
                body,
                span,
                ..
            } => self.visit_while(condition, body, span, ctx),
            Node::When {
                condition,
                target,
                body,
                span,
                ..
            } => self.visit_when(condition, target, body, span, ctx),
            Node::Defer { span, .. } => Err(Error::new(
                ErrorKind::Runtime,
                span.start.clone(),
                span.end.clone(),
                "defer blocks are not supported",
            )),
            Node::Continue { .. } => Ok(Outcome::Continue),
            Node::Break { .. } => Ok(Outcome::Break),
            Node::Once { .. } => Ok(Outcome::Break),
            Node::Return { value, .. } => {
                let result = match value {
                    Some(node) => eval!(self, node, ctx),
                    None => Value::null(),
                };
                Ok(Outcome::Return(result))
            }
            Node::Use { name, span } => self.visit_use(name, span, ctx),
            Node::Delete { name, span } => {
                let known = ctx.table.borrow().symbols.contains_key(name);
                if !known {
                    return Err(Error::new(
                        ErrorKind::VariableAccess,
                        span.start.clone(),
                        span.end.clone(),
                        format!("Variable {name} does not exist"),
                    ));
                }
                ctx.table.borrow_mut().remove(name);
                Ok(Outcome::Value(Value::int(0)))
            }
            Node::FunctionDef {
                name,
                params,
                body,
                auto_return,
                span,
            } => {
                let func = Value::new(ValueData::Function(FunctionValue {
                    name: name.clone(),
                    params: params.clone(),
                    body: Rc::clone(body),
                    auto_return: *auto_return,
                    closure: Rc::clone(&ctx.table),
                }))
                .with_span(span.clone());

                if let Some(name) = name {
                    ctx.table.borrow_mut().set(name, func.clone());
                }
                Ok(Outcome::Value(func))
            }
            Node::InterfaceDef { name, body, span } => {
                let func = Value::new(ValueData::Function(FunctionValue {
                    name: Some(name.clone()),
                    params: vec![],
                    body: Rc::clone(body),
                    auto_return: true,
                    closure: Rc::clone(&ctx.table),
                }))
                .with_span(span.clone());

                ctx.table.borrow_mut().set(name, func.clone());
                Ok(Outcome::Value(func))
            }
            Node::StructDef {
                name, params, body, span,
            } => {
                let generator = Value::new(ValueData::StructGen(StructGenValue {
                    name: name.clone(),
                    params: params.clone(),
                    body: Rc::clone(body),
                    closure: Rc::clone(&ctx.table),
                }))
                .with_span(span.clone());

                if let Some(name) = name {
                    ctx.table.borrow_mut().set(name, generator.clone());
                }
                Ok(Outcome::Value(generator))
            }
            Node::Call { callee, args, span } => self.visit_call(callee, args, span, ctx),
            Node::ErrorHandler {
                try_body,
                catch_body,
                ..
            } => self.visit_error_handler(try_body, catch_body, ctx),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_var_assign(
        &mut self,
        name: &str,
        op: AssignOp,
        value_node: &Node,
        constant: bool,
        global: bool,
        type_tag: TypeTag,
        span: &Span,
        ctx: &Context,
    ) -> RunResult {
        if KEYWORDS.contains(&name) || name == "T" || name == "F" {
            return Err(Error::new(
                ErrorKind::BuiltinViolation,
                span.start.clone(),
                span.end.clone(),
                format!("Cannot overwrite keyword {name}."),
            ));
        }

        let mut value = eval!(self, value_node, ctx);
        let og = ctx.table.borrow().get(name);
        let static_mode = self.static_mode(ctx);

        let Some(og) = og else {
            // a new binding; only bare `=` may create one
            if let Some(wanted) = type_tag.declared_type() {
                if value.type_name() != wanted {
                    let coerced = match (&value.data, type_tag) {
                        (ValueData::Number(n), TypeTag::Int) => {
                            Some(Number::Int(n.as_f64() as i64))
                        }
                        (ValueData::Number(n), TypeTag::Flt) => Some(Number::Flt(n.as_f64())),
                        _ => None,
                    };
                    match coerced {
                        Some(n) => value.data = ValueData::Number(n),
                        None => {
                            return Err(Error::new(
                                ErrorKind::StaticViolation,
                                span.start.clone(),
                                span.end.clone(),
                                format!("Cannot convert {value} to {wanted}"),
                            ));
                        }
                    }
                }
            }

            value.meta.is_static = if static_mode {
                !matches!(type_tag, TypeTag::Var)
            } else {
                type_tag.declared_type().is_some()
            };
            if constant {
                value.meta.is_const = true;
            }

            if op != AssignOp::Set {
                return Err(Error::new(
                    ErrorKind::VariableAccess,
                    span.start.clone(),
                    span.end.clone(),
                    format!("Symbol {name} doesn't exist"),
                ));
            }

            if let ValueData::Struct(s) = &mut value.data {
                s.instance_name = name.to_string();
            }

            let mut table = ctx.table.borrow_mut();
            table.set(name, value.clone());
            if global {
                table.globals.insert(name.to_string());
            }
            return Ok(Outcome::Value(value));
        };

        // the binding already exists
        if og.meta.is_const {
            return Err(Error::new(
                ErrorKind::ConstantViolation,
                span.start.clone(),
                span.end.clone(),
                format!("Cannot change value of constant variable {name}"),
            ));
        }
        if type_tag != TypeTag::Default || constant {
            return Err(Error::new(
                ErrorKind::InvalidSpecifier,
                span.start.clone(),
                span.end.clone(),
                format!("Specifiers not allowed on existing variable {name}."),
            ));
        }

        if og.meta.is_static && value.type_name() != og.type_name() {
            let coerced = match (&value.data, &og.data) {
                (ValueData::Number(n), ValueData::Number(Number::Int(_))) => {
                    Some(Number::Int(n.as_f64() as i64))
                }
                (ValueData::Number(n), ValueData::Number(Number::Flt(_))) => {
                    Some(Number::Flt(n.as_f64()))
                }
                _ => None,
            };
            match coerced {
                Some(n) => value.data = ValueData::Number(n),
                None if matches!(value.data, ValueData::Number(_)) => {
                    return Err(Error::new(
                        ErrorKind::StaticViolation,
                        span.start.clone(),
                        span.end.clone(),
                        format!(
                            "Cannot convert static {} to {}",
                            og.type_name(),
                            value.type_name()
                        ),
                    ));
                }
                None => {
                    return Err(Error::new(
                        ErrorKind::StaticViolation,
                        span.start.clone(),
                        span.end.clone(),
                        format!(
                            "Cannot convert {name} [{}] to {}",
                            og.type_name(),
                            value.type_name()
                        ),
                    ));
                }
            }
        }
        if og.meta.is_static {
            value.meta.is_static = true;
        }

        let mut result = apply_assign_op(&og, op, value, span)?;
        if op != AssignOp::Set {
            result.meta.is_static = og.meta.is_static;
        }
        result.meta.is_const = og.meta.is_const;
        result.meta.triggers = og.meta.triggers.clone();

        ctx.table.borrow_mut().set(name, result.clone());

        if let Some(interrupt) = self.fire_triggers(name, ctx)? {
            return Ok(interrupt);
        }

        Ok(Outcome::Value(result))
    }

    /// Re-check every trigger attached to `name` after a successful
    /// rebinding. Removals requested by a `break`/`once` in a body are
    /// collected during the scan and applied afterwards.
    fn fire_triggers(&mut self, name: &str, ctx: &Context) -> Result<Option<Outcome>, Error> {
        let triggers: Vec<Trigger> = match ctx.table.borrow().symbols.get(name) {
            Some(binding) => binding.meta.triggers.clone(),
            None => return Ok(None),
        };
        if triggers.is_empty() {
            return Ok(None);
        }

        let mut keep = vec![true; triggers.len()];
        let mut interrupt = None;

        for (i, trigger) in triggers.iter().enumerate() {
            let condition = match self.visit(&trigger.condition, ctx)? {
                Outcome::Value(v) => v,
                other => {
                    interrupt = Some(other);
                    break;
                }
            };
            if !condition.is_true() {
                continue;
            }

            match self.visit(&trigger.body, ctx)? {
                Outcome::Value(_) | Outcome::Continue => {}
                Outcome::Break => keep[i] = false,
                Outcome::Return(v) => {
                    interrupt = Some(Outcome::Return(v));
                    break;
                }
            }
        }

        if keep.contains(&false) {
            if let Some(binding) = ctx.table.borrow_mut().symbols.get_mut(name) {
                let mut index = 0;
                binding.meta.triggers.retain(|_| {
                    let kept = keep.get(index).copied().unwrap_or(true);
                    index += 1;
                    kept
                });
            }
        }

        Ok(interrupt)
    }

    fn visit_reference_assign(
        &mut self,
        target: &Node,
        op: AssignOp,
        value_node: &Node,
        span: &Span,
        ctx: &Context,
    ) -> RunResult {
        let value = eval!(self, value_node, ctx);

        // walk down the left spine collecting accessors until the root
        // identifier appears
        let mut keys = vec![];
        let mut curr = target;
        let root_name = loop {
            let Node::BinOp {
                left, op: bin_op, right, ..
            } = curr
            else {
                return Err(Error::new(
                    ErrorKind::InvalidSyntax,
                    span.start.clone(),
                    span.end.clone(),
                    "Invalid assignment target",
                ));
            };

            if matches!(bin_op, TokenKind::Lslc | TokenKind::Rslc) {
                return Err(Error::new(
                    ErrorKind::InvalidSyntax,
                    span.start.clone(),
                    span.end.clone(),
                    "Slices not allowed on left of expression.",
                ));
            }

            let key = match right.as_ref() {
                Node::VarAccess { name, .. } => AccessKey::Name(name.clone()),
                other => AccessKey::Val(eval!(self, other, ctx)),
            };
            keys.push(key);

            match left.as_ref() {
                Node::VarAccess { name, .. } => break name.clone(),
                Node::BinOp { .. } => curr = left,
                _ => {
                    return Err(Error::new(
                        ErrorKind::InvalidSyntax,
                        span.start.clone(),
                        span.end.clone(),
                        "Invalid assignment target",
                    ));
                }
            }
        };
        keys.reverse();

        let Some(table) = owning_table(&ctx.table, &root_name) else {
            return Err(Error::new(
                ErrorKind::VariableAccess,
                span.start.clone(),
                span.end.clone(),
                format!("'{root_name}' is not defined"),
            ));
        };

        let mut table = table.borrow_mut();
        let Some(root) = table.symbols.get_mut(&root_name) else {
            return Err(Error::new(
                ErrorKind::VariableAccess,
                span.start.clone(),
                span.end.clone(),
                format!("'{root_name}' is not defined"),
            ));
        };

        let result = assign_chain(root, &keys, op, value, span)?;
        Ok(Outcome::Value(result))
    }

    fn visit_bin_op(
        &mut self,
        left: &Node,
        op: TokenKind,
        right: &Node,
        span: &Span,
        ctx: &Context,
    ) -> RunResult {
        let left_val = eval!(self, left, ctx);

        // struct field access resolves against the struct itself
        if op == TokenKind::Dot {
            if let ValueData::Struct(s) = &left_val.data {
                let Node::VarAccess { name, .. } = right else {
                    return Err(Error::new(
                        ErrorKind::VariableAccess,
                        span.start.clone(),
                        span.end.clone(),
                        "DOT operator must accept identifier as input",
                    ));
                };
                let member = s
                    .property(name)
                    .or_else(|| s.method(name))
                    .cloned()
                    .ok_or_else(|| {
                        Error::new(
                            ErrorKind::InvalidSyntax,
                            span.start.clone(),
                            span.end.clone(),
                            format!("Struct has no property '{name}'."),
                        )
                    })?;
                return Ok(Outcome::Value(member.with_span(span.clone())));
            }
        }

        let right_val = eval!(self, right, ctx);

        let result = match op {
            TokenKind::Pls => left_val.add(&right_val),
            TokenKind::Mns => left_val.sub(&right_val),
            TokenKind::Mul => left_val.mul(&right_val),
            TokenKind::Div => left_val.div(&right_val),
            TokenKind::Mod => left_val.modulo(&right_val),
            TokenKind::Pow => left_val.pow(&right_val),
            TokenKind::Eq => left_val.eq_op(&right_val),
            TokenKind::Ne => left_val.ne_op(&right_val),
            TokenKind::Lt => left_val.lt(&right_val),
            TokenKind::Gt => left_val.gt(&right_val),
            TokenKind::Le => left_val.le(&right_val),
            TokenKind::Ge => left_val.ge(&right_val),
            TokenKind::And => left_val.logand(&right_val),
            TokenKind::Or => left_val.logor(&right_val),
            TokenKind::Nand => left_val.lognand(&right_val),
            TokenKind::Nor => left_val.lognor(&right_val),
            TokenKind::Xor => left_val.logxor(&right_val),
            TokenKind::At => left_val.at(&right_val),
            TokenKind::Lslc => left_val.sliceleft(&right_val),
            TokenKind::Rslc => left_val.sliceright(&right_val),
            TokenKind::Inj => left_val.inj(&right_val),
            TokenKind::In => left_val.contains(&right_val),
            TokenKind::Dot => Ok(right_val),
            _ => Err(Error::new(
                ErrorKind::Runtime,
                span.start.clone(),
                span.end.clone(),
                format!("Unsupported binary operator {op:?}"),
            )),
        };

        let result = result.map_err(|e| e.or_span(&span.start, &span.end))?;
        Ok(Outcome::Value(result.with_span(span.clone())))
    }

    fn visit_if(
        &mut self,
        cases: &[IfCase],
        else_case: Option<&Node>,
        ctx: &Context,
    ) -> RunResult {
        for case in cases {
            let condition = eval!(self, &case.condition, ctx);
            if condition.is_true() {
                let value = eval!(self, &case.body, ctx);
                return Ok(Outcome::Value(value));
            }
        }

        if let Some(else_body) = else_case {
            let value = eval!(self, else_body, ctx);
            return Ok(Outcome::Value(value));
        }

        Ok(Outcome::Value(Value::null()))
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_for(
        &mut self,
        var: &str,
        start: &Node,
        end: &Node,
        step: Option<&Node>,
        body: &Node,
        span: &Span,
        ctx: &Context,
    ) -> RunResult {
        let start_val = eval!(self, start, ctx);
        let end_val = eval!(self, end, ctx);

        let (Some(start_num), Some(end_num)) = (start_val.as_number(), end_val.as_number())
        else {
            return Err(Error::new(
                ErrorKind::Runtime,
                span.start.clone(),
                span.end.clone(),
                "Loop bounds must be numbers",
            ));
        };

        let step_num = match step {
            Some(node) => {
                let step_val = eval!(self, node, ctx);
                let Some(n) = step_val.as_number() else {
                    return Err(Error::new(
                        ErrorKind::Runtime,
                        span.start.clone(),
                        span.end.clone(),
                        "Loop step must be a number",
                    ));
                };
                n
            }
            None => {
                if start_num.as_f64() < end_num.as_f64() {
                    Number::Int(1)
                } else {
                    Number::Int(-1)
                }
            }
        };

        let mut elements = vec![];
        let mut i = start_num;

        loop {
            let more = if step_num.as_f64() >= 0.0 {
                i.as_f64() < end_num.as_f64()
            } else {
                i.as_f64() > end_num.as_f64()
            };
            if !more {
                break;
            }

            ctx.table.borrow_mut().set(var, Value::number(i));
            i = i.add(step_num);

            match self.visit(body, ctx)? {
                Outcome::Value(v) => elements.push(v),
                Outcome::Continue => continue,
                Outcome::Break => break,
                other => return Ok(other),
            }
        }

        Ok(Outcome::Value(Value::list(elements).with_span(span.clone())))
    }

    fn visit_foreach(
        &mut self,
        var: &str,
        container: &Node,
        body: &Node,
        span: &Span,
        ctx: &Context,
    ) -> RunResult {
        let container_val = eval!(self, container, ctx);

        let items: Vec<Value> = match &container_val.data {
            ValueData::List(h) => h.borrow().clone(),
            ValueData::Str(s) => s.chars().map(|c| Value::string(c.to_string())).collect(),
            _ => {
                return Err(Error::new(
                    ErrorKind::Runtime,
                    span.start.clone(),
                    span.end.clone(),
                    "Can only iterate over lists and strings",
                ));
            }
        };

        let mut elements = vec![];
        for item in items {
            ctx.table.borrow_mut().set(var, item);

            match self.visit(body, ctx)? {
                Outcome::Value(v) => elements.push(v),
                Outcome::Continue => continue,
                Outcome::Break => break,
                other => return Ok(other),
            }
        }

        Ok(Outcome::Value(Value::list(elements).with_span(span.clone())))
    }

    fn visit_while(
        &mut self,
        condition: &Node,
        body: &Node,
        span: &Span,
        ctx: &Context,
    ) -> RunResult {
        let mut elements = vec![];

        loop {
            let cond = eval!(self, condition, ctx);
            if !cond.is_true() {
                break;
            }

            match self.visit(body, ctx)? {
                Outcome::Value(v) => elements.push(v),
                Outcome::Continue => continue,
                Outcome::Break => break,
                other => return Ok(other),
            }
        }

        Ok(Outcome::Value(Value::list(elements).with_span(span.clone())))
    }

    fn visit_when(
        &mut self,
        condition: &Rc<Node>,
        target: &str,
        body: &Rc<Node>,
        span: &Span,
        ctx: &Context,
    ) -> RunResult {
        let Some(table) = owning_table(&ctx.table, target) else {
            return Err(Error::new(
                ErrorKind::VariableAccess,
                span.start.clone(),
                span.end.clone(),
                format!("Variable {target} does not exist"),
            ));
        };

        if let Some(binding) = table.borrow_mut().symbols.get_mut(target) {
            binding.meta.triggers.push(Trigger {
                condition: Rc::clone(condition),
                body: Rc::clone(body),
            });
        }

        Ok(Outcome::Value(Value::list(vec![]).with_span(span.clone())))
    }

    fn visit_use(&mut self, name: &str, span: &Span, ctx: &Context) -> RunResult {
        if name == "static" {
            ctx.table.borrow_mut().set("static-typing", Value::int(1));
            return Ok(Outcome::Value(Value::null()));
        }

        let Some(source) = self.resolver.resolve(name) else {
            return Err(Error::new(
                ErrorKind::ModuleNotFound,
                span.start.clone(),
                span.end.clone(),
                format!("No module found: {name}"),
            ));
        };

        debug!("importing module {name}");

        let static_mode = self.static_mode(ctx);
        let import_err = || {
            Error::new(
                ErrorKind::ModuleImport,
                span.start.clone(),
                span.end.clone(),
                format!("Error parsing file {name}"),
            )
        };
        let tokens = Lexer::named(name, &source)
            .tokenize()
            .map_err(|_| import_err())?;
        let ast = Parser::with_static_mode(tokens, static_mode)
            .parse()
            .map_err(|_| import_err())?;

        // modules evaluate in the caller's context, so their definitions
        // (and shadowing) land here
        self.visit(&ast, ctx)
            .map_err(|e| e.in_context(&format!("module {name}")))
    }

    fn visit_call(
        &mut self,
        callee_node: &Node,
        arg_nodes: &[Node],
        span: &Span,
        ctx: &Context,
    ) -> RunResult {
        let callee = eval!(self, callee_node, ctx).with_span(span.clone());

        let callee_name = match &callee.data {
            ValueData::Function(f) => f.name.clone(),
            ValueData::StructGen(g) => g.name.clone(),
            ValueData::BuiltIn(b) => Some(b.name.clone()),
            _ => None,
        };

        let mut args = vec![];
        for arg_node in arg_nodes {
            let arg = eval!(self, arg_node, ctx);

            // a struct with an interface named after the callee is
            // replaced by that interface's result
            if let ValueData::Struct(s) = &arg.data {
                if let Some(name) = &callee_name {
                    if s.has_interface(name) {
                        let method = s.method(name).cloned();
                        if let Some(Value {
                            data: ValueData::Function(method),
                            ..
                        }) = method
                        {
                            let proxied = match self.run_interface(s, &method.body, ctx)? {
                                Outcome::Value(v) => v,
                                other => return Ok(other),
                            };
                            args.push(proxied);
                            continue;
                        }
                    }
                }
            }

            args.push(arg);
        }

        let result = match &callee.data {
            ValueData::Function(f) => match self.exec_function(f, args, span, ctx)? {
                Outcome::Value(v) => v,
                other => return Ok(other),
            },
            ValueData::StructGen(g) => match self.exec_struct_gen(g, args, span, ctx)? {
                Outcome::Value(v) => v,
                other => return Ok(other),
            },
            ValueData::BuiltIn(b) => self.exec_builtin(b, args, span, ctx)?,
            _ => {
                return Err(Error::new(
                    ErrorKind::Runtime,
                    span.start.clone(),
                    span.end.clone(),
                    format!("{callee} is not callable"),
                ));
            }
        };

        Ok(Outcome::Value(result.with_span(span.clone())))
    }

    fn check_arg_count(
        expected: usize,
        got: usize,
        display: &str,
        span: &Span,
    ) -> Result<(), Error> {
        if got > expected {
            return Err(Error::new(
                ErrorKind::InvalidArgumentSet,
                span.start.clone(),
                span.end.clone(),
                format!("{} too many args passed into {display}", got - expected),
            ));
        }
        if got < expected {
            return Err(Error::new(
                ErrorKind::InvalidArgumentSet,
                span.start.clone(),
                span.end.clone(),
                format!("{} too few args passed into {display}", expected - got),
            ));
        }
        Ok(())
    }

    fn exec_function(
        &mut self,
        func: &FunctionValue,
        args: Vec<Value>,
        span: &Span,
        ctx: &Context,
    ) -> RunResult {
        let display = func.display_name();
        Self::check_arg_count(
            func.params.len(),
            args.len(),
            &format!("<function {display}>"),
            span,
        )?;

        let table = SymbolTable::with_parent(&func.closure);
        let fctx = ctx.child(&display, Rc::clone(&table));

        // the function can refer to itself by name
        if let Some(name) = &func.name {
            let recursive = func.closure.borrow().get(name);
            if let Some(recursive) = recursive {
                table.borrow_mut().set(name, recursive);
            }
        }

        for (param, arg) in func.params.iter().zip(args) {
            table.borrow_mut().set(param, arg);
        }

        let outcome = self
            .visit(&func.body, &fctx)
            .map_err(|e| e.in_context(&display))?;

        let result = match outcome {
            Outcome::Return(v) => v,
            Outcome::Value(v) => {
                if func.auto_return {
                    v
                } else {
                    Value::null()
                }
            }
            // a stray continue/break unwinds through the call
            other => return Ok(other),
        };

        Ok(Outcome::Value(result))
    }

    fn exec_struct_gen(
        &mut self,
        generator: &StructGenValue,
        args: Vec<Value>,
        span: &Span,
        ctx: &Context,
    ) -> RunResult {
        let display = generator.display_name();
        Self::check_arg_count(
            generator.params.len(),
            args.len(),
            &format!("<struct {display}>"),
            span,
        )?;

        let table = SymbolTable::with_parent(&generator.closure);
        let sctx = ctx.child(&format!("struct:{display}"), Rc::clone(&table));

        for (param, arg) in generator.params.iter().zip(args) {
            table.borrow_mut().set(param, arg);
        }

        // properties are the names assigned at the top level of the body
        let property_names: Vec<String> = match generator.body.as_ref() {
            Node::Capsule { statements, .. } => statements
                .iter()
                .filter_map(|s| match s {
                    Node::VarAssign { name, .. } => Some(name.clone()),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        };

        match self.visit(&generator.body, &sctx)? {
            Outcome::Value(_) | Outcome::Return(_) => {}
            other => return Ok(other),
        }

        let t = table.borrow();
        let properties: Vec<(String, Value)> = property_names
            .iter()
            .filter_map(|n| t.symbols.get(n).map(|v| (n.clone(), v.clone())))
            .collect();
        let methods: Vec<(String, Value)> = t
            .symbols
            .iter()
            .filter(|(_, v)| matches!(v.data, ValueData::Function(_)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        drop(t);

        let value = Value::new(ValueData::Struct(StructValue {
            instance_name: String::new(),
            properties,
            methods: Rc::new(methods),
            closure: Rc::clone(&generator.closure),
        }))
        .with_span(span.clone());

        Ok(Outcome::Value(value))
    }

    /// Evaluate an interface body in a scope derived from the struct's
    /// canonical property store.
    fn run_interface(&mut self, s: &StructValue, body: &Rc<Node>, ctx: &Context) -> RunResult {
        let table = SymbolTable::with_parent(&s.closure);
        {
            let mut t = table.borrow_mut();
            for (name, value) in &s.properties {
                t.set(name, value.clone());
            }
            for (name, value) in s.methods.iter() {
                t.set(name, value.clone());
            }
        }

        let sctx = ctx.child(&format!("struct:{}", s.instance_name), table);
        self.visit(body, &sctx)
    }

    fn exec_builtin(
        &mut self,
        builtin: &BuiltInValue,
        args: Vec<Value>,
        span: &Span,
        ctx: &Context,
    ) -> Result<Value, Error> {
        let Some(params) = builtins::param_names(&builtin.name) else {
            return Err(Error::new(
                ErrorKind::Runtime,
                span.start.clone(),
                span.end.clone(),
                format!("No built-in named {}", builtin.name),
            ));
        };
        Self::check_arg_count(
            params.len(),
            args.len(),
            &format!("<built-in function {}>", builtin.name),
            span,
        )?;

        let table = SymbolTable::with_parent(&ctx.table);
        for (param, arg) in params.iter().zip(args) {
            table.borrow_mut().set(param, arg);
        }

        let bctx = ctx.child(&format!("<built-in function {}>", builtin.name), table);
        builtins::call(&builtin.name, &bctx, span)
    }

    fn visit_error_handler(
        &mut self,
        try_body: &Node,
        catch_body: &Node,
        ctx: &Context,
    ) -> RunResult {
        let inner_table = SymbolTable::with_parent(&ctx.table);

        // mirror the non-global outer bindings into the handler scope
        {
            let outer = ctx.table.borrow();
            let mut inner = inner_table.borrow_mut();
            for (name, value) in &outer.symbols {
                if outer.globals.contains(name) {
                    continue;
                }
                inner.symbols.insert(name.clone(), value.clone());
            }
        }

        // snapshot for rollback should the try block fail
        let restore: Vec<(String, Value)> = inner_table
            .borrow()
            .symbols
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let ictx = ctx.child("<errorhandler>", Rc::clone(&inner_table));

        let outcome = match self.visit(try_body, &ictx) {
            Ok(outcome) => outcome,
            Err(_) => {
                {
                    let mut inner = inner_table.borrow_mut();
                    for (name, value) in &restore {
                        if inner.symbols.contains_key(name) {
                            inner.symbols.insert(name.clone(), value.clone());
                        }
                    }
                }
                self.visit(catch_body, &ictx)?
            }
        };

        // changes to pre-existing names flow back out
        {
            let inner = inner_table.borrow();
            let mut outer = ctx.table.borrow_mut();
            for (name, value) in &inner.symbols {
                if outer.symbols.contains_key(name) {
                    outer.symbols.insert(name.clone(), value.clone());
                }
            }
        }

        match outcome {
            Outcome::Value(_) => Ok(Outcome::Value(Value::int(0))),
            other => Ok(other),
        }
    }
}

fn apply_assign_op(base: &Value, op: AssignOp, value: Value, span: &Span) -> Result<Value, Error> {
    match op {
        AssignOp::Set => Ok(value),
        AssignOp::Walrus => Err(Error::new(
            ErrorKind::InvalidSyntax,
            span.start.clone(),
            span.end.clone(),
            "Expected assignment operator, got :=",
        )),
        AssignOp::Add => base.add(&value),
        AssignOp::Sub => base.sub(&value),
        AssignOp::Mul => base.mul(&value),
        AssignOp::Div => base.div(&value),
        AssignOp::Mod => base.modulo(&value),
        AssignOp::Pow => base.pow(&value),
    }
}

/// Walk the collected accessor chain to the deepest slot and apply the
/// assignment there. The slot keeps its binding metadata; only its data
/// is replaced, so an augmented op can never leave a foreign payload
/// behind.
fn assign_chain(
    slot: &mut Value,
    keys: &[AccessKey],
    op: AssignOp,
    value: Value,
    span: &Span,
) -> Result<Value, Error> {
    let Some(key) = keys.first() else {
        let computed = apply_assign_op(slot, op, value, span)?;
        slot.data = computed.data.clone();
        return Ok(computed);
    };

    let positioned = |kind: ErrorKind, message: String| {
        Error::new(kind, span.start.clone(), span.end.clone(), message)
    };

    match &mut slot.data {
        ValueData::Struct(s) => {
            let name = match key {
                AccessKey::Name(name) => name.clone(),
                AccessKey::Val(v) => match &v.data {
                    ValueData::Str(s) => s.clone(),
                    _ => {
                        return Err(positioned(
                            ErrorKind::InvalidSyntax,
                            "Struct properties are accessed by name".into(),
                        ));
                    }
                },
            };
            let Some(property) = s.property_mut(&name) else {
                return Err(positioned(
                    ErrorKind::InvalidSyntax,
                    format!("Struct has no property '{name}'."),
                ));
            };
            assign_chain(property, &keys[1..], op, value, span)
        }
        ValueData::List(h) => {
            let AccessKey::Val(index) = key else {
                return Err(positioned(
                    ErrorKind::InvalidSyntax,
                    "Input to '@' must be INT".into(),
                ));
            };
            let Some(index) = index.as_int() else {
                return Err(positioned(
                    ErrorKind::InvalidSyntax,
                    "Input to '@' must be INT".into(),
                ));
            };

            let mut elements = h.borrow_mut();
            let len = elements.len() as i64;
            let idx = if index < 0 { index + len } else { index };
            if idx < 0 || idx >= len {
                return Err(positioned(ErrorKind::OutOfBounds, "Index out of range".into()));
            }
            assign_chain(&mut elements[idx as usize], &keys[1..], op, value, span)
        }
        ValueData::Map(h) => {
            let lookup = match key {
                AccessKey::Val(v) => v.clone(),
                AccessKey::Name(name) => Value::string(name.clone()),
            };
            let mut entries = h.borrow_mut();
            let Some(entry) = entries.iter_mut().find(|(k, _)| k.strict_eq(&lookup)) else {
                return Err(positioned(
                    ErrorKind::OutOfBounds,
                    format!("Key {lookup} not found"),
                ));
            };
            assign_chain(&mut entry.1, &keys[1..], op, value, span)
        }
        _ => Err(positioned(
            ErrorKind::Runtime,
            format!("Cannot assign into a value of type {}", slot.type_name()),
        )),
    }
}
