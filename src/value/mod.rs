use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::chunk::Chunk;
use crate::module::{NativeContext, NativeError};

/// Host function callable from scripts. Receives the live argument window.
pub type NativeFn = fn(&mut NativeContext<'_>, &[Value]) -> Result<Value, NativeError>;

// ── Heap objects ─────────────────────────────────────────────────────

/// Interned string. Two `ObjString`s with equal content are never both
/// reachable through one `Interner`.
#[derive(Debug)]
pub struct ObjString {
    chars: Box<str>,
}

impl ObjString {
    pub fn as_str(&self) -> &str {
        &self.chars
    }
}

impl PartialEq for ObjString {
    fn eq(&self, other: &Self) -> bool {
        self.chars == other.chars
    }
}

impl Eq for ObjString {}

impl Hash for ObjString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chars.hash(state);
    }
}

impl fmt::Display for ObjString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.chars)
    }
}

#[derive(Debug)]
pub struct ObjFunction {
    pub arity: usize,
    pub chunk: Chunk,
    /// `None` for the implicit top-level script function.
    pub name: Option<Rc<ObjString>>,
}

impl ObjFunction {
    pub fn new(name: Option<Rc<ObjString>>) -> Self {
        ObjFunction { arity: 0, chunk: Chunk::new(), name }
    }

    /// Name used in disassembly headers and stack traces.
    pub fn display_name(&self) -> &str {
        self.name.as_ref().map_or("script", |n| n.as_str())
    }
}

impl fmt::Display for ObjFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "<fn {name}>"),
            None => f.write_str("<script>"),
        }
    }
}

pub struct ObjNative {
    pub name: Rc<ObjString>,
    pub function: NativeFn,
}

impl fmt::Debug for ObjNative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjNative").field("name", &self.name.as_str()).finish()
    }
}

#[derive(Debug, Clone)]
pub enum Obj {
    String(Rc<ObjString>),
    Function(Rc<ObjFunction>),
    Native(Rc<ObjNative>),
}

/// Strings compare by content; every other object by identity.
impl PartialEq for Obj {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Obj::String(a), Obj::String(b)) => Rc::ptr_eq(a, b) || a.chars == b.chars,
            (Obj::Function(a), Obj::Function(b)) => Rc::ptr_eq(a, b),
            (Obj::Native(a), Obj::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Obj::String(s) => s.fmt(f),
            Obj::Function(func) => func.fmt(f),
            Obj::Native(_) => f.write_str("<native fn>"),
        }
    }
}

// ── Values ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Data {
    Null,
    Bool(bool),
    Number(f64),
    Obj(Obj),
}

impl PartialEq for Data {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Data::Null, Data::Null) => true,
            (Data::Bool(a), Data::Bool(b)) => a == b,
            (Data::Number(a), Data::Number(b)) => a == b,
            (Data::Obj(a), Data::Obj(b)) => a == b,
            _ => false,
        }
    }
}

/// A runtime value. `assignable` is cleared for values bound by `const`;
/// it takes no part in equality.
#[derive(Debug, Clone)]
pub struct Value {
    pub data: Data,
    pub assignable: bool,
}

impl Value {
    pub const NULL: Value = Value { data: Data::Null, assignable: true };

    pub fn number(n: f64) -> Self {
        Value { data: Data::Number(n), assignable: true }
    }

    pub fn bool(b: bool) -> Self {
        Value { data: Data::Bool(b), assignable: true }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.data, Data::Null)
    }

    /// `null`, `false` and the number zero are falsey.
    pub fn is_falsey(&self) -> bool {
        match self.data {
            Data::Null => true,
            Data::Bool(b) => !b,
            Data::Number(n) => n == 0.0,
            Data::Obj(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.data {
            Data::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&Rc<ObjString>> {
        match &self.data {
            Data::Obj(Obj::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<ObjFunction>> {
        match &self.data {
            Data::Obj(Obj::Function(f)) => Some(f),
            _ => None,
        }
    }

    /// Copy with assignability cleared.
    pub fn into_const(mut self) -> Self {
        self.assignable = false;
        self
    }

    /// Copy handed out by a variable read: always assignable.
    pub fn to_assignable(&self) -> Self {
        Value { data: self.data.clone(), assignable: true }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::bool(b)
    }
}

impl From<Rc<ObjString>> for Value {
    fn from(s: Rc<ObjString>) -> Self {
        Value { data: Data::Obj(Obj::String(s)), assignable: true }
    }
}

impl From<Rc<ObjFunction>> for Value {
    fn from(f: Rc<ObjFunction>) -> Self {
        Value { data: Data::Obj(Obj::Function(f)), assignable: true }
    }
}

impl From<Rc<ObjNative>> for Value {
    fn from(n: Rc<ObjNative>) -> Self {
        Value { data: Data::Obj(Obj::Native(n)), assignable: true }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            Data::Null => f.write_str("null"),
            Data::Bool(b) => write!(f, "{b}"),
            Data::Number(n) => f.write_str(&format_number(*n)),
            Data::Obj(obj) => obj.fmt(f),
        }
    }
}

const SIGNIFICANT_DIGITS: i32 = 8;

/// Text form of a number: at most eight significant digits, trailing zeros
/// dropped, scientific notation outside `1e-4 <= |n| < 1e8`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let sci = format!("{:.*e}", (SIGNIFICANT_DIGITS - 1) as usize, n);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exp < -4 || exp >= SIGNIFICANT_DIGITS {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exp.abs())
    } else {
        let decimals = (SIGNIFICANT_DIGITS - 1 - exp) as usize;
        trim_fraction(&format!("{n:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

// ── Interning ────────────────────────────────────────────────────────

/// Canonical table of string objects. Owned by the VM and passed to the
/// compiler so both sides share one set of strings.
#[derive(Debug, Default)]
pub struct Interner {
    strings: HashMap<Box<str>, Rc<ObjString>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, text: &str) -> Rc<ObjString> {
        if let Some(existing) = self.strings.get(text) {
            return Rc::clone(existing);
        }
        let chars: Box<str> = text.into();
        let string = Rc::new(ObjString { chars: chars.clone() });
        self.strings.insert(chars, Rc::clone(&string));
        string
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
