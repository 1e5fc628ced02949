//! The runtime value model.
//!
//! Values are a tagged variant with shared binding metadata (static and
//! const flags, attached triggers, source span). Binary operators are
//! dispatched through the left operand; variants that do not support an
//! operation report `NotImplemented`.
//!
//! Ownership: list and map element storage sits behind a shared handle,
//! so binding copies alias their elements and the mutating container
//! operations are visible through every copy, while structs own their
//! property store outright and are copied all the way down on every
//! read.

use std::cell::RefCell;
use std::fmt::Display;
use std::fs::File;
use std::rc::Rc;

use crate::error::{Error, ErrorKind};
use crate::lexer::Position;
use crate::parser::{Node, Span};

use super::context::SymbolTableRef;

pub type OpResult = Result<Value, Error>;

/// Numeric payload with its subtype tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Flt(f64),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(n) => *n as f64,
            Number::Flt(n) => *n,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::Int(n) => *n == 0,
            Number::Flt(n) => *n == 0.0,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Number::Int(_) => "INT",
            Number::Flt(_) => "FLT",
        }
    }

    pub fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_add(b)
                .map(Number::Int)
                .unwrap_or(Number::Flt(a as f64 + b as f64)),
            _ => Number::Flt(self.as_f64() + other.as_f64()),
        }
    }

    fn sub(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_sub(b)
                .map(Number::Int)
                .unwrap_or(Number::Flt(a as f64 - b as f64)),
            _ => Number::Flt(self.as_f64() - other.as_f64()),
        }
    }

    fn mul(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_mul(b)
                .map(Number::Int)
                .unwrap_or(Number::Flt(a as f64 * b as f64)),
            _ => Number::Flt(self.as_f64() * other.as_f64()),
        }
    }

    /// Division keeps the INT subtype when both operands are INT and the
    /// division is exact; everything else widens to FLT.
    fn div(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) if b != 0 && a % b == 0 => Number::Int(a / b),
            _ => Number::Flt(self.as_f64() / other.as_f64()),
        }
    }

    /// Modulo with the sign of the divisor.
    fn modulo(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => {
                let r = a % b;
                if r != 0 && (r < 0) != (b < 0) {
                    Number::Int(r + b)
                } else {
                    Number::Int(r)
                }
            }
            _ => {
                let (a, b) = (self.as_f64(), other.as_f64());
                let r = a % b;
                if r != 0.0 && (r < 0.0) != (b < 0.0) {
                    Number::Flt(r + b)
                } else {
                    Number::Flt(r)
                }
            }
        }
    }

    fn pow(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) if b >= 0 => u32::try_from(b)
                .ok()
                .and_then(|exp| a.checked_pow(exp))
                .map(Number::Int)
                .unwrap_or(Number::Flt((a as f64).powf(b as f64))),
            _ => Number::Flt(self.as_f64().powf(other.as_f64())),
        }
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{n}"),
            Number::Flt(n) => write!(f, "{n:?}"),
        }
    }
}

/// A reactive trigger attached to a binding; re-checked on every
/// successful rebinding of that name.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub condition: Rc<Node>,
    pub body: Rc<Node>,
}

/// Binding metadata carried alongside every value.
#[derive(Debug, Clone, Default)]
pub struct Meta {
    pub is_static: bool,
    pub is_const: bool,
    pub triggers: Vec<Trigger>,
    pub span: Option<Span>,
}

pub type ListHandle = Rc<RefCell<Vec<Value>>>;
pub type MapHandle = Rc<RefCell<Vec<(Value, Value)>>>;

/// A user-defined aggregate. The property vector is the single
/// canonical store; the evaluation context a method body runs in is
/// derived from it on demand.
pub struct StructValue {
    pub instance_name: String,
    pub properties: Vec<(String, Value)>,
    pub methods: Rc<Vec<(String, Value)>>,
    pub closure: SymbolTableRef,
}

impl StructValue {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.properties
            .iter_mut()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn method(&self, name: &str) -> Option<&Value> {
        self.methods
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn has_interface(&self, name: &str) -> bool {
        self.method(name).is_some()
    }
}

// The closure handle stays out of Debug output: a binding stored in its
// own defining table would otherwise recurse forever.
impl std::fmt::Debug for StructValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructValue")
            .field("instance_name", &self.instance_name)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

// Struct copies never alias: every property is copied all the way down.
impl Clone for StructValue {
    fn clone(&self) -> Self {
        Self {
            instance_name: self.instance_name.clone(),
            properties: self
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.deep_copy()))
                .collect(),
            methods: Rc::clone(&self.methods),
            closure: Rc::clone(&self.closure),
        }
    }
}

#[derive(Clone)]
pub struct FunctionValue {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Rc<Node>,
    pub auto_return: bool,
    pub closure: SymbolTableRef,
}

impl std::fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionValue")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("auto_return", &self.auto_return)
            .finish_non_exhaustive()
    }
}

impl FunctionValue {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<anonymous>".to_string())
    }
}

/// Like a function, but calling it produces a struct instance.
#[derive(Clone)]
pub struct StructGenValue {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Rc<Node>,
    pub closure: SymbolTableRef,
}

impl std::fmt::Debug for StructGenValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructGenValue")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl StructGenValue {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<anonymous>".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct BuiltInValue {
    pub name: String,
}

/// An open host file. The native handle is shared between copies and
/// released on `close` or when the last copy drops.
#[derive(Debug, Clone)]
pub struct FileValue {
    pub name: String,
    pub mode: String,
    pub handle: Rc<RefCell<Option<File>>>,
}

#[derive(Debug, Clone)]
pub enum ValueData {
    Number(Number),
    Str(String),
    List(ListHandle),
    Map(MapHandle),
    Struct(StructValue),
    Function(FunctionValue),
    StructGen(StructGenValue),
    BuiltIn(BuiltInValue),
    File(FileValue),
}

#[derive(Debug, Clone)]
pub struct Value {
    pub data: ValueData,
    pub meta: Meta,
}

impl Value {
    pub fn new(data: ValueData) -> Self {
        Self {
            data,
            meta: Meta::default(),
        }
    }

    pub fn int(n: i64) -> Self {
        Self::new(ValueData::Number(Number::Int(n)))
    }

    pub fn float(n: f64) -> Self {
        Self::new(ValueData::Number(Number::Flt(n)))
    }

    pub fn number(n: Number) -> Self {
        Self::new(ValueData::Number(n))
    }

    pub fn bool(b: bool) -> Self {
        Self::int(if b { 1 } else { 0 })
    }

    pub fn null() -> Self {
        Self::int(0)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::new(ValueData::Str(s.into()))
    }

    pub fn list(elements: Vec<Value>) -> Self {
        Self::new(ValueData::List(Rc::new(RefCell::new(elements))))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Self::new(ValueData::Map(Rc::new(RefCell::new(entries))))
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.meta.span = Some(span);
        self
    }

    pub fn type_name(&self) -> &'static str {
        match &self.data {
            ValueData::Number(n) => n.type_name(),
            ValueData::Str(_) => "STR",
            ValueData::List(_) => "LST",
            ValueData::Map(_) => "MAP",
            ValueData::Struct(_) => "STRC",
            ValueData::Function(_) | ValueData::StructGen(_) | ValueData::BuiltIn(_) => "FNC",
            ValueData::File(_) => "FILE",
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match &self.data {
            ValueData::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match &self.data {
            ValueData::Number(Number::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        match &self.data {
            ValueData::Number(n) => !n.is_zero(),
            ValueData::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// A copy that shares nothing with the original, used wherever a
    /// struct crosses a read boundary.
    pub fn deep_copy(&self) -> Value {
        let data = match &self.data {
            ValueData::List(h) => ValueData::List(Rc::new(RefCell::new(
                h.borrow().iter().map(Value::deep_copy).collect(),
            ))),
            ValueData::Map(h) => ValueData::Map(Rc::new(RefCell::new(
                h.borrow()
                    .iter()
                    .map(|(k, v)| (k.deep_copy(), v.deep_copy()))
                    .collect(),
            ))),
            other => other.clone(),
        };
        Value {
            data,
            meta: self.meta.clone(),
        }
    }

    /// Type-sensitive equality: the equality containers use for element
    /// membership and map keys. `INT 1` and `FLT 1.0` are different here.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (&self.data, &other.data) {
            (ValueData::Number(a), ValueData::Number(b)) => a == b,
            (ValueData::Str(a), ValueData::Str(b)) => a == b,
            (ValueData::List(a), ValueData::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.strict_eq(y))
            }
            (ValueData::Map(a), ValueData::Map(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter()
                            .any(|(k2, v2)| k.strict_eq(k2) && v.strict_eq(v2))
                    })
            }
            (ValueData::Struct(a), ValueData::Struct(b)) => {
                a.properties.len() == b.properties.len()
                    && a.properties.iter().zip(b.properties.iter()).all(
                        |((ka, va), (kb, vb))| ka == kb && va.strict_eq(vb),
                    )
            }
            (ValueData::Function(a), ValueData::Function(b)) => {
                Rc::ptr_eq(&a.body, &b.body) && a.name == b.name
            }
            (ValueData::StructGen(a), ValueData::StructGen(b)) => {
                Rc::ptr_eq(&a.body, &b.body) && a.name == b.name
            }
            (ValueData::BuiltIn(a), ValueData::BuiltIn(b)) => a.name == b.name,
            (ValueData::File(a), ValueData::File(b)) => a.name == b.name && a.mode == b.mode,
            _ => false,
        }
    }

    fn start_pos(&self) -> Position {
        self.meta
            .span
            .as_ref()
            .map(|s| s.start.clone())
            .unwrap_or_default()
    }

    fn end_pos(&self) -> Position {
        self.meta
            .span
            .as_ref()
            .map(|s| s.end.clone())
            .unwrap_or_default()
    }

    fn illegal_op(&self, other: &Value) -> Error {
        Error::new(
            ErrorKind::NotImplemented,
            self.start_pos(),
            other.end_pos(),
            "Illegal operation",
        )
    }

    fn type_err(&self, message: &str) -> Error {
        Error::new(
            ErrorKind::InvalidSyntax,
            self.start_pos(),
            self.end_pos(),
            message,
        )
    }

    // ---- operator dispatch -------------------------------------------------

    pub fn add(&self, other: &Value) -> OpResult {
        match (&self.data, &other.data) {
            (ValueData::Number(a), ValueData::Number(b)) => Ok(Value::number(a.add(*b))),
            (ValueData::Str(a), ValueData::Str(b)) => Ok(Value::string(format!("{a}{b}"))),
            (ValueData::List(h), _) => {
                h.borrow_mut().push(other.clone());
                Ok(self.clone())
            }
            (ValueData::Map(h), ValueData::Map(o)) => {
                let additions: Vec<(Value, Value)> = o
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                if !Rc::ptr_eq(h, o) {
                    let mut entries = h.borrow_mut();
                    for (k, v) in additions {
                        if let Some(slot) =
                            entries.iter_mut().find(|(ek, _)| ek.strict_eq(&k))
                        {
                            slot.1 = v;
                        } else {
                            entries.push((k, v));
                        }
                    }
                }
                Ok(self.clone())
            }
            (ValueData::Map(_), _) => Err(self.type_err("Input to MAP + must be MAP")),
            _ => Err(self.illegal_op(other)),
        }
    }

    pub fn sub(&self, other: &Value) -> OpResult {
        match (&self.data, &other.data) {
            (ValueData::Number(a), ValueData::Number(b)) => Ok(Value::number(a.sub(*b))),
            (ValueData::Str(a), ValueData::Str(b)) => {
                Ok(Value::string(a.replace(b.as_str(), "")))
            }
            (ValueData::List(h), _) => {
                h.borrow_mut().retain(|e| !e.strict_eq(other));
                Ok(self.clone())
            }
            (ValueData::Map(h), _) => {
                h.borrow_mut().retain(|(k, _)| !k.strict_eq(other));
                Ok(self.clone())
            }
            _ => Err(self.illegal_op(other)),
        }
    }

    pub fn mul(&self, other: &Value) -> OpResult {
        match (&self.data, &other.data) {
            (ValueData::Number(a), ValueData::Number(b)) => Ok(Value::number(a.mul(*b))),
            (ValueData::Str(s), ValueData::Number(Number::Int(n))) => {
                Ok(Value::string(s.repeat((*n).max(0) as usize)))
            }
            (ValueData::List(a), ValueData::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Err(Error::new(
                        ErrorKind::Runtime,
                        self.start_pos(),
                        self.end_pos(),
                        "Lists must be of the same size",
                    ));
                }
                let pairs = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| Value::list(vec![x.clone(), y.clone()]))
                    .collect();
                Ok(Value::list(pairs))
            }
            _ => Err(self.illegal_op(other)),
        }
    }

    pub fn div(&self, other: &Value) -> OpResult {
        match (&self.data, &other.data) {
            (ValueData::Number(a), ValueData::Number(b)) => {
                if b.is_zero() {
                    return Err(Error::new(
                        ErrorKind::Runtime,
                        other.start_pos(),
                        other.end_pos(),
                        "Division by zero",
                    ));
                }
                Ok(Value::number(a.div(*b)))
            }
            (ValueData::Str(s), ValueData::Str(sep)) => {
                let pieces = s
                    .split(sep.as_str())
                    .filter(|p| !p.is_empty())
                    .map(Value::string)
                    .collect();
                Ok(Value::list(pieces))
            }
            (ValueData::List(h), ValueData::Number(Number::Int(n))) => {
                if *n == 0 {
                    return Err(Error::new(
                        ErrorKind::Runtime,
                        other.start_pos(),
                        other.end_pos(),
                        "Division by zero",
                    ));
                }
                let elements = h.borrow();
                let mut chunks = vec![];
                let mut current = vec![];
                for (i, e) in elements.iter().enumerate() {
                    current.push(e.clone());
                    if (i as i64) % n == n - 1 {
                        chunks.push(Value::list(std::mem::take(&mut current)));
                    }
                }
                if !current.is_empty() {
                    chunks.push(Value::list(current));
                }
                Ok(Value::list(chunks))
            }
            _ => Err(self.illegal_op(other)),
        }
    }

    pub fn modulo(&self, other: &Value) -> OpResult {
        match (&self.data, &other.data) {
            (ValueData::Number(a), ValueData::Number(b)) => {
                if b.is_zero() {
                    return Err(Error::new(
                        ErrorKind::Runtime,
                        other.start_pos(),
                        other.end_pos(),
                        "Modulo by zero",
                    ));
                }
                Ok(Value::number(a.modulo(*b)))
            }
            _ => Err(self.illegal_op(other)),
        }
    }

    pub fn pow(&self, other: &Value) -> OpResult {
        match (&self.data, &other.data) {
            (ValueData::Number(a), ValueData::Number(b)) => Ok(Value::number(a.pow(*b))),
            (ValueData::List(a), ValueData::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                let mut pairs = vec![];
                for x in a.iter() {
                    for y in b.iter() {
                        pairs.push(Value::list(vec![x.clone(), y.clone()]));
                    }
                }
                Ok(Value::list(pairs))
            }
            _ => Err(self.illegal_op(other)),
        }
    }

    /// Language-level equality: Numbers compare by value across
    /// subtypes, mismatched variants are unequal rather than an error.
    pub fn eq_op(&self, other: &Value) -> OpResult {
        let equal = match (&self.data, &other.data) {
            (ValueData::Number(a), ValueData::Number(b)) => a.as_f64() == b.as_f64(),
            _ => self.strict_eq(other),
        };
        Ok(Value::bool(equal))
    }

    pub fn ne_op(&self, other: &Value) -> OpResult {
        let equal = self.eq_op(other)?;
        Ok(Value::bool(!equal.is_true()))
    }

    fn compare(&self, other: &Value) -> Result<std::cmp::Ordering, Error> {
        match (&self.data, &other.data) {
            (ValueData::Number(a), ValueData::Number(b)) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .ok_or_else(|| self.illegal_op(other)),
            (ValueData::Str(a), ValueData::Str(b)) => Ok(a.cmp(b)),
            _ => Err(self.illegal_op(other)),
        }
    }

    pub fn lt(&self, other: &Value) -> OpResult {
        Ok(Value::bool(self.compare(other)? == std::cmp::Ordering::Less))
    }

    pub fn gt(&self, other: &Value) -> OpResult {
        Ok(Value::bool(
            self.compare(other)? == std::cmp::Ordering::Greater,
        ))
    }

    pub fn le(&self, other: &Value) -> OpResult {
        Ok(Value::bool(
            self.compare(other)? != std::cmp::Ordering::Greater,
        ))
    }

    pub fn ge(&self, other: &Value) -> OpResult {
        Ok(Value::bool(self.compare(other)? != std::cmp::Ordering::Less))
    }

    fn supports_logic(&self) -> bool {
        matches!(self.data, ValueData::Number(_) | ValueData::Str(_))
    }

    pub fn logand(&self, other: &Value) -> OpResult {
        if !self.supports_logic() {
            return Err(self.illegal_op(other));
        }
        Ok(Value::bool(self.is_true() && other.is_true()))
    }

    pub fn logor(&self, other: &Value) -> OpResult {
        if !self.supports_logic() {
            return Err(self.illegal_op(other));
        }
        Ok(Value::bool(self.is_true() || other.is_true()))
    }

    pub fn lognand(&self, other: &Value) -> OpResult {
        if !self.supports_logic() {
            return Err(self.illegal_op(other));
        }
        Ok(Value::bool(!(self.is_true() && other.is_true())))
    }

    pub fn lognor(&self, other: &Value) -> OpResult {
        if !self.supports_logic() {
            return Err(self.illegal_op(other));
        }
        Ok(Value::bool(!(self.is_true() || other.is_true())))
    }

    pub fn logxor(&self, other: &Value) -> OpResult {
        if !self.supports_logic() {
            return Err(self.illegal_op(other));
        }
        Ok(Value::bool(self.is_true() != other.is_true()))
    }

    pub fn lognot(&self) -> OpResult {
        if !self.supports_logic() {
            return Err(self.illegal_op(self));
        }
        Ok(Value::bool(!self.is_true()))
    }

    /// Resolve a possibly negative index against a container length.
    fn resolve_index(&self, index: i64, len: usize) -> Result<usize, Error> {
        let idx = if index < 0 { index + len as i64 } else { index };
        if idx < 0 || idx >= len as i64 {
            return Err(Error::new(
                ErrorKind::OutOfBounds,
                self.start_pos(),
                self.end_pos(),
                "Index out of range",
            ));
        }
        Ok(idx as usize)
    }

    pub fn at(&self, other: &Value) -> OpResult {
        match &self.data {
            ValueData::Number(n) => {
                let Some(index) = other.as_int() else {
                    return Err(self.type_err("Input to '@' must be INT"));
                };
                let repr = format!("{n}");
                let chars: Vec<char> = repr.chars().collect();
                let idx = self.resolve_index(index, chars.len())?;
                let digit = chars[idx].to_digit(10).ok_or_else(|| {
                    Error::new(
                        ErrorKind::Runtime,
                        self.start_pos(),
                        self.end_pos(),
                        format!("Position {index} of {repr} is not a digit"),
                    )
                })?;
                Ok(Value::int(digit as i64))
            }
            ValueData::Str(s) => {
                let Some(index) = other.as_int() else {
                    return Err(self.type_err("Input to '@' must be INT"));
                };
                let chars: Vec<char> = s.chars().collect();
                let idx = self.resolve_index(index, chars.len())?;
                Ok(Value::string(chars[idx].to_string()))
            }
            ValueData::List(h) => {
                let Some(index) = other.as_int() else {
                    return Err(self.type_err("Input to '@' must be INT"));
                };
                let elements = h.borrow();
                let idx = self.resolve_index(index, elements.len())?;
                Ok(elements[idx].clone())
            }
            ValueData::Map(h) => {
                let entries = h.borrow();
                entries
                    .iter()
                    .find(|(k, _)| k.strict_eq(other))
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| {
                        Error::new(
                            ErrorKind::OutOfBounds,
                            self.start_pos(),
                            self.end_pos(),
                            format!("Key {other} not found"),
                        )
                    })
            }
            _ => Err(self.illegal_op(other)),
        }
    }

    /// Take `[..n]` with clamping; a negative length counts back from
    /// the end.
    fn left_count(len: usize, val: i64) -> usize {
        if val >= 0 {
            (val as usize).min(len)
        } else {
            len.saturating_sub((-val) as usize)
        }
    }

    /// Starting offset of `[len - n..]` with clamping.
    fn right_start(len: usize, val: i64) -> usize {
        if val > 0 {
            len.saturating_sub(val as usize)
        } else {
            ((-val) as usize).min(len)
        }
    }

    pub fn sliceleft(&self, other: &Value) -> OpResult {
        match &self.data {
            ValueData::Str(s) => {
                let Some(val) = other.as_int() else {
                    return Err(self.type_err("Input to STR </ must be INT"));
                };
                let chars: Vec<char> = s.chars().collect();
                let count = Self::left_count(chars.len(), val);
                Ok(Value::string(chars[..count].iter().collect::<String>()))
            }
            ValueData::List(h) => {
                let Some(val) = other.as_int() else {
                    return Err(self.type_err("Input to LST </ must be INT"));
                };
                let elements = h.borrow();
                let count = Self::left_count(elements.len(), val);
                Ok(Value::list(elements[..count].to_vec()))
            }
            _ => Err(self.illegal_op(other)),
        }
    }

    pub fn sliceright(&self, other: &Value) -> OpResult {
        match &self.data {
            ValueData::Str(s) => {
                let Some(val) = other.as_int() else {
                    return Err(self.type_err("Input to STR /> must be INT"));
                };
                let chars: Vec<char> = s.chars().collect();
                let start = Self::right_start(chars.len(), val);
                Ok(Value::string(chars[start..].iter().collect::<String>()))
            }
            ValueData::List(h) => {
                let Some(val) = other.as_int() else {
                    return Err(self.type_err("Input to LST /> must be INT"));
                };
                let elements = h.borrow();
                let start = Self::right_start(elements.len(), val);
                Ok(Value::list(elements[start..].to_vec()))
            }
            _ => Err(self.illegal_op(other)),
        }
    }

    /// The `~>` membership operator. Lists and map keys use language
    /// equality, so `1` finds `1.0`.
    pub fn contains(&self, other: &Value) -> OpResult {
        match &self.data {
            ValueData::Str(s) => match &other.data {
                ValueData::Str(needle) => Ok(Value::bool(s.contains(needle.as_str()))),
                _ => Err(self.type_err("Input to STR ~> must be STR")),
            },
            ValueData::List(h) => {
                for e in h.borrow().iter() {
                    if e.eq_op(other)?.is_true() {
                        return Ok(Value::bool(true));
                    }
                }
                Ok(Value::bool(false))
            }
            ValueData::Map(h) => {
                for (k, _) in h.borrow().iter() {
                    if k.eq_op(other)?.is_true() {
                        return Ok(Value::bool(true));
                    }
                }
                Ok(Value::bool(false))
            }
            _ => Err(self.illegal_op(other)),
        }
    }

    /// The `<~` extension operator on lists.
    pub fn inj(&self, other: &Value) -> OpResult {
        match (&self.data, &other.data) {
            (ValueData::List(h), ValueData::List(o)) => {
                let additions: Vec<Value> = o.borrow().iter().cloned().collect();
                h.borrow_mut().extend(additions);
                Ok(self.clone())
            }
            (ValueData::List(_), _) => Err(self.type_err("Input to LST <~ must be LST")),
            _ => Err(self.illegal_op(other)),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.data {
            ValueData::Number(n) => write!(f, "{n}"),
            ValueData::Str(s) => write!(f, "\"{s}\""),
            ValueData::List(h) => {
                let elements = h.borrow();
                let parts: Vec<String> = elements.iter().map(|e| format!("{e}")).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            ValueData::Map(h) => {
                let entries = h.borrow();
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            ValueData::Struct(s) => {
                let parts: Vec<String> = s
                    .properties
                    .iter()
                    .map(|(k, v)| format!("'{k}': {v}"))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            ValueData::Function(func) => write!(f, "<function {}>", func.display_name()),
            ValueData::StructGen(g) => write!(f, "<struct {}>", g.display_name()),
            ValueData::BuiltIn(b) => write!(f, "<built-in function {}>", b.name),
            ValueData::File(file) => write!(f, "<file> \"{}\"", file.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: &Value) -> Number {
        v.as_number().expect("expected a number")
    }

    #[test]
    fn test_number_addition_promotes_to_flt() {
        let result = Value::int(1).add(&Value::float(0.5)).unwrap();
        assert_eq!(Number::Flt(1.5), num(&result));

        let result = Value::int(1).add(&Value::int(2)).unwrap();
        assert_eq!(Number::Int(3), num(&result));
    }

    #[test]
    fn test_number_arithmetic_identities() {
        let n = Value::float(4.25);
        assert!(n.add(&Value::int(0)).unwrap().eq_op(&n).unwrap().is_true());
        assert!(n.mul(&Value::int(1)).unwrap().eq_op(&n).unwrap().is_true());
        assert!(n
            .sub(&n)
            .unwrap()
            .eq_op(&Value::int(0))
            .unwrap()
            .is_true());
        assert!(n.div(&Value::int(1)).unwrap().eq_op(&n).unwrap().is_true());
    }

    #[test]
    fn test_exact_int_division_stays_int() {
        let result = Value::int(20).div(&Value::int(4)).unwrap();
        assert_eq!(Number::Int(5), num(&result));

        let result = Value::int(5).div(&Value::int(2)).unwrap();
        assert_eq!(Number::Flt(2.5), num(&result));
    }

    #[test]
    fn test_division_by_zero_errors() {
        let err = Value::int(1).div(&Value::int(0)).unwrap_err();
        assert_eq!(ErrorKind::Runtime, err.kind);
        let err = Value::int(1).modulo(&Value::int(0)).unwrap_err();
        assert_eq!(ErrorKind::Runtime, err.kind);
    }

    #[test]
    fn test_modulo_follows_divisor_sign() {
        let result = Value::int(-7).modulo(&Value::int(3)).unwrap();
        assert_eq!(Number::Int(2), num(&result));
        let result = Value::int(7).modulo(&Value::int(-3)).unwrap();
        assert_eq!(Number::Int(-2), num(&result));
    }

    #[test]
    fn test_number_digit_indexing() {
        let result = Value::int(1234).at(&Value::int(2)).unwrap();
        assert_eq!(Number::Int(3), num(&result));
    }

    #[test]
    fn test_string_subtraction_removes_occurrences() {
        let result = Value::string("babcb").sub(&Value::string("b")).unwrap();
        assert!(result.strict_eq(&Value::string("ac")));
    }

    #[test]
    fn test_string_division_splits_dropping_empties() {
        let result = Value::string("abc").div(&Value::string("b")).unwrap();
        assert!(result.strict_eq(&Value::list(vec![
            Value::string("a"),
            Value::string("c")
        ])));

        let result = Value::string("bab").div(&Value::string("b")).unwrap();
        assert!(result.strict_eq(&Value::list(vec![Value::string("a")])));
    }

    #[test]
    fn test_string_repetition() {
        let result = Value::string("ab").mul(&Value::int(3)).unwrap();
        assert!(result.strict_eq(&Value::string("ababab")));
    }

    #[test]
    fn test_string_indexing_supports_negative() {
        let s = Value::string("abcde");
        assert!(s.at(&Value::int(1)).unwrap().strict_eq(&Value::string("b")));
        assert!(s
            .at(&Value::int(-1))
            .unwrap()
            .strict_eq(&Value::string("e")));
        assert_eq!(
            ErrorKind::OutOfBounds,
            s.at(&Value::int(9)).unwrap_err().kind
        );
    }

    #[test]
    fn test_list_addition_appends_through_the_shared_handle() {
        let a = Value::list(vec![Value::int(1)]);
        let alias = a.clone();
        a.add(&Value::int(2)).unwrap();

        assert!(alias.strict_eq(&Value::list(vec![Value::int(1), Value::int(2)])));
    }

    #[test]
    fn test_list_subtraction_removes_all_equal_elements() {
        let a = Value::list(vec![Value::int(1), Value::int(2), Value::int(1)]);
        let result = a.sub(&Value::int(1)).unwrap();
        assert!(result.strict_eq(&Value::list(vec![Value::int(2)])));
    }

    #[test]
    fn test_list_zip_requires_equal_lengths() {
        let a = Value::list(vec![Value::int(1), Value::int(2)]);
        let b = Value::list(vec![Value::int(3), Value::int(4)]);
        let zipped = a.mul(&b).unwrap();
        assert!(zipped.strict_eq(&Value::list(vec![
            Value::list(vec![Value::int(1), Value::int(3)]),
            Value::list(vec![Value::int(2), Value::int(4)]),
        ])));

        let short = Value::list(vec![Value::int(9)]);
        assert_eq!(ErrorKind::Runtime, a.mul(&short).unwrap_err().kind);
    }

    #[test]
    fn test_list_chunking() {
        let a = Value::list((1..=5).map(Value::int).collect());
        let chunks = a.div(&Value::int(2)).unwrap();
        assert!(chunks.strict_eq(&Value::list(vec![
            Value::list(vec![Value::int(1), Value::int(2)]),
            Value::list(vec![Value::int(3), Value::int(4)]),
            Value::list(vec![Value::int(5)]),
        ])));
    }

    #[test]
    fn test_list_cartesian_product() {
        let a = Value::list(vec![Value::int(1), Value::int(2)]);
        let b = Value::list(vec![Value::int(3)]);
        let product = a.pow(&b).unwrap();
        assert!(product.strict_eq(&Value::list(vec![
            Value::list(vec![Value::int(1), Value::int(3)]),
            Value::list(vec![Value::int(2), Value::int(3)]),
        ])));
    }

    #[test]
    fn test_list_slices_clamp_and_partition() {
        let a = Value::list((1..=4).map(Value::int).collect());
        let left = a.sliceleft(&Value::int(2)).unwrap();
        assert!(left.strict_eq(&Value::list(vec![Value::int(1), Value::int(2)])));

        let right = a.sliceright(&Value::int(2)).unwrap();
        assert!(right.strict_eq(&Value::list(vec![Value::int(3), Value::int(4)])));

        let all = a.sliceleft(&Value::int(99)).unwrap();
        assert!(all.strict_eq(&a));
    }

    #[test]
    fn test_list_extend_in_place() {
        let a = Value::list(vec![Value::int(1)]);
        let alias = a.clone();
        a.inj(&Value::list(vec![Value::int(2)])).unwrap();
        assert!(alias.strict_eq(&Value::list(vec![Value::int(1), Value::int(2)])));
    }

    #[test]
    fn test_map_merge_right_wins() {
        let a = Value::map(vec![
            (Value::int(1), Value::string("a")),
            (Value::int(2), Value::string("b")),
        ]);
        let b = Value::map(vec![(Value::int(2), Value::string("c"))]);
        let merged = a.add(&b).unwrap();
        assert!(merged
            .at(&Value::int(2))
            .unwrap()
            .strict_eq(&Value::string("c")));
    }

    #[test]
    fn test_map_subtraction_drops_key() {
        let a = Value::map(vec![
            (Value::int(1), Value::string("a")),
            (Value::int(2), Value::string("b")),
        ]);
        let smaller = a.sub(&Value::int(1)).unwrap();
        assert!(!smaller.contains(&Value::int(1)).unwrap().is_true());
        assert!(smaller.contains(&Value::int(2)).unwrap().is_true());

        // removing an absent key is a no-op
        let same = a.sub(&Value::int(9)).unwrap();
        assert!(same.contains(&Value::int(2)).unwrap().is_true());
    }

    #[test]
    fn test_map_missing_key_errors() {
        let a = Value::map(vec![(Value::int(1), Value::string("a"))]);
        assert_eq!(
            ErrorKind::OutOfBounds,
            a.at(&Value::int(9)).unwrap_err().kind
        );
    }

    #[test]
    fn test_equality_across_variants_is_false_not_an_error() {
        assert!(!Value::int(1).eq_op(&Value::string("1")).unwrap().is_true());
        assert!(Value::int(1).ne_op(&Value::string("1")).unwrap().is_true());
    }

    #[test]
    fn test_number_equality_ignores_subtype() {
        assert!(Value::int(1).eq_op(&Value::float(1.0)).unwrap().is_true());
        assert!(!Value::int(1).strict_eq(&Value::float(1.0)));
    }

    #[test]
    fn test_ordering_across_variants_errors() {
        assert_eq!(
            ErrorKind::NotImplemented,
            Value::int(1).lt(&Value::string("a")).unwrap_err().kind
        );
    }

    #[test]
    fn test_logical_operators() {
        assert!(Value::int(1).logand(&Value::int(2)).unwrap().is_true());
        assert!(!Value::int(0).logand(&Value::int(2)).unwrap().is_true());
        assert!(Value::int(0).logor(&Value::int(2)).unwrap().is_true());
        assert!(Value::int(0).lognand(&Value::int(0)).unwrap().is_true());
        assert!(Value::int(0).lognor(&Value::int(0)).unwrap().is_true());
        assert!(Value::int(1).logxor(&Value::int(0)).unwrap().is_true());
        assert!(!Value::int(1).logxor(&Value::int(1)).unwrap().is_true());
        assert!(Value::int(0).lognot().unwrap().is_true());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::int(0).is_true());
        assert!(Value::float(0.5).is_true());
        assert!(!Value::string("").is_true());
        assert!(Value::string("x").is_true());
        // containers are truthy even when empty
        assert!(Value::list(vec![]).is_true());
        assert!(Value::map(vec![]).is_true());
    }

    #[test]
    fn test_copy_equals_original() {
        let original = Value::list(vec![
            Value::int(1),
            Value::string("two"),
            Value::map(vec![(Value::int(3), Value::string("three"))]),
        ]);
        assert!(original.clone().strict_eq(&original));
        assert!(original.deep_copy().strict_eq(&original));
    }

    #[test]
    fn test_deep_copy_severs_the_element_handle() {
        let original = Value::list(vec![Value::int(1)]);
        let copy = original.deep_copy();
        original.add(&Value::int(2)).unwrap();

        assert!(copy.strict_eq(&Value::list(vec![Value::int(1)])));
    }

    #[test]
    fn test_string_contains() {
        let s = Value::string("hello");
        assert!(s.contains(&Value::string("ell")).unwrap().is_true());
        assert!(!s.contains(&Value::string("zz")).unwrap().is_true());
    }

    #[test]
    fn test_display_formats() {
        assert_eq!("6", format!("{}", Value::int(6)));
        assert_eq!("6.0", format!("{}", Value::float(6.0)));
        assert_eq!("\"hi\"", format!("{}", Value::string("hi")));
        assert_eq!(
            "[1, \"a\"]",
            format!("{}", Value::list(vec![Value::int(1), Value::string("a")]))
        );
        assert_eq!(
            "{1: \"a\"}",
            format!(
                "{}",
                Value::map(vec![(Value::int(1), Value::string("a"))])
            )
        );
    }
}
