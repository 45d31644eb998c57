//! Runtime values of the script interpreter.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::bindings::Primitive;
use super::interpreter::Closure;
use crate::kernel::{Profile, Solid};

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type ObjectRef = Rc<RefCell<Object>>;

/// Arrays nested deeper than this cannot be converted to text.
pub const MAX_TEXT_DEPTH: usize = 64;

/// Longest value text placed in an error message.
const MESSAGE_TEXT_LIMIT: usize = 200;

/// Why a value could not be converted to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOverflow {
    Length,
    Depth,
}

/// Insertion-ordered property bag.
#[derive(Debug, Clone, Default)]
pub struct Object {
    entries: IndexMap<String, Value>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sqrt,
    Abs,
    Min,
    Max,
    Floor,
    Ceil,
    Round,
    Pow,
    Hypot,
    Sign,
}

impl MathFn {
    pub const ALL: [MathFn; 17] = [
        MathFn::Sin,
        MathFn::Cos,
        MathFn::Tan,
        MathFn::Asin,
        MathFn::Acos,
        MathFn::Atan,
        MathFn::Atan2,
        MathFn::Sqrt,
        MathFn::Abs,
        MathFn::Min,
        MathFn::Max,
        MathFn::Floor,
        MathFn::Ceil,
        MathFn::Round,
        MathFn::Pow,
        MathFn::Hypot,
        MathFn::Sign,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
            MathFn::Tan => "tan",
            MathFn::Asin => "asin",
            MathFn::Acos => "acos",
            MathFn::Atan => "atan",
            MathFn::Atan2 => "atan2",
            MathFn::Sqrt => "sqrt",
            MathFn::Abs => "abs",
            MathFn::Min => "min",
            MathFn::Max => "max",
            MathFn::Floor => "floor",
            MathFn::Ceil => "ceil",
            MathFn::Round => "round",
            MathFn::Pow => "pow",
            MathFn::Hypot => "hypot",
            MathFn::Sign => "sign",
        }
    }

    pub fn apply(self, args: &[f64]) -> f64 {
        let arg = |i: usize| args.get(i).copied().unwrap_or(f64::NAN);
        match self {
            MathFn::Sin => arg(0).sin(),
            MathFn::Cos => arg(0).cos(),
            MathFn::Tan => arg(0).tan(),
            MathFn::Asin => arg(0).asin(),
            MathFn::Acos => arg(0).acos(),
            MathFn::Atan => arg(0).atan(),
            MathFn::Atan2 => arg(0).atan2(arg(1)),
            MathFn::Sqrt => arg(0).sqrt(),
            MathFn::Abs => arg(0).abs(),
            MathFn::Min => args.iter().fold(f64::INFINITY, |acc, &x| {
                if acc.is_nan() || x.is_nan() {
                    f64::NAN
                } else {
                    acc.min(x)
                }
            }),
            MathFn::Max => args.iter().fold(f64::NEG_INFINITY, |acc, &x| {
                if acc.is_nan() || x.is_nan() {
                    f64::NAN
                } else {
                    acc.max(x)
                }
            }),
            MathFn::Floor => arg(0).floor(),
            MathFn::Ceil => arg(0).ceil(),
            MathFn::Round => {
                let x = arg(0);
                if x.is_finite() {
                    (x + 0.5).floor()
                } else {
                    x
                }
            }
            MathFn::Pow => arg(0).powf(arg(1)),
            MathFn::Hypot => args.iter().map(|x| x * x).sum::<f64>().sqrt(),
            MathFn::Sign => {
                let x = arg(0);
                if x.is_nan() || x == 0.0 {
                    x
                } else {
                    x.signum()
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayMethod {
    Push,
    Map,
    ForEach,
    Filter,
    Reduce,
    Concat,
    Slice,
    Join,
}

impl ArrayMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "push" => ArrayMethod::Push,
            "map" => ArrayMethod::Map,
            "forEach" => ArrayMethod::ForEach,
            "filter" => ArrayMethod::Filter,
            "reduce" => ArrayMethod::Reduce,
            "concat" => ArrayMethod::Concat,
            "slice" => ArrayMethod::Slice,
            "join" => ArrayMethod::Join,
            _ => return None,
        })
    }
}

/// Host-implemented callables.
#[derive(Clone)]
pub enum NativeFn {
    Primitive(Primitive),
    Math(MathFn),
    Array(ArrayMethod, ArrayRef),
}

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<Closure>),
    Native(NativeFn),
    Profile(Rc<Profile>),
    Solid(Solid),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(object: Object) -> Self {
        Value::Object(Rc::new(RefCell::new(object)))
    }

    /// Result of `typeof`.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) | Value::Native(_) => "function",
            Value::Null
            | Value::Array(_)
            | Value::Object(_)
            | Value::Profile(_)
            | Value::Solid(_) => "object",
        }
    }

    /// Kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) | Value::Native(_) => "function",
            Value::Profile(_) => "profile",
            Value::Solid(_) => "solid",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_geometry(&self) -> bool {
        matches!(self, Value::Solid(_) | Value::Profile(_))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::Str(s) => parse_number(s),
            Value::Array(_) => match self.to_text(MESSAGE_TEXT_LIMIT) {
                Ok(text) => parse_number(&text),
                Err(_) => f64::NAN,
            },
            _ => f64::NAN,
        }
    }

    /// Text of the value as scripts see it, refused past `max_len` bytes.
    ///
    /// An array that contains itself contributes nothing at the point of the cycle.
    pub fn to_text(&self, max_len: usize) -> Result<String, TextOverflow> {
        let mut out = String::new();
        self.write_text(&mut out, max_len, &mut Vec::new())?;
        Ok(out)
    }

    /// Text for messages, cut short when long or deeply nested.
    pub fn to_display_string(&self) -> String {
        let mut out = String::new();
        if self.write_text(&mut out, MESSAGE_TEXT_LIMIT, &mut Vec::new()).is_err() {
            out.push_str("...");
        }
        out
    }

    fn write_text(
        &self,
        out: &mut String,
        max_len: usize,
        open: &mut Vec<*const RefCell<Vec<Value>>>,
    ) -> Result<(), TextOverflow> {
        match self {
            Value::Str(s) => push_bounded(out, s, max_len),
            Value::Array(items) => write_joined(items, ",", out, max_len, open),
            Value::Number(n) => push_bounded(out, &number_to_string(*n), max_len),
            Value::Function(closure) => {
                let text = match &closure.def.name {
                    Some(name) => format!("function {}() {{ ... }}", name),
                    None => "function () { ... }".to_string(),
                };
                push_bounded(out, &text, max_len)
            }
            Value::Native(NativeFn::Primitive(p)) => {
                push_bounded(out, &format!("function {}() {{ [native code] }}", p.name()), max_len)
            }
            other => push_bounded(out, other.fixed_text(), max_len),
        }
    }

    fn fixed_text(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(true) => "true",
            Value::Bool(false) => "false",
            Value::Object(_) => "[object Object]",
            Value::Profile(_) => "[object Profile]",
            Value::Solid(_) => "[object Solid]",
            _ => "function () { [native code] }",
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(NativeFn::Primitive(a)), Value::Native(NativeFn::Primitive(b))) => a == b,
            (Value::Native(NativeFn::Math(a)), Value::Native(NativeFn::Math(b))) => a == b,
            (Value::Profile(a), Value::Profile(b)) => Rc::ptr_eq(a, b),
            (Value::Solid(a), Value::Solid(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::Str(_))
            | (Value::Str(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                if matches!(self, Value::Number(_) | Value::Str(_) | Value::Bool(_))
                    && matches!(other, Value::Number(_) | Value::Str(_) | Value::Bool(_))
                {
                    self.to_number() == other.to_number()
                } else {
                    false
                }
            }
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Array(_) => write!(f, "[{}]", self.to_display_string()),
            Value::Object(object) => {
                // Keys only; values may refer back to the object
                let object = object.borrow();
                f.debug_set().entries(object.entries().map(|(k, _)| k)).finish()
            }
            Value::Solid(solid) => write!(f, "Solid({} polygons)", solid.polygon_count()),
            other => f.write_str(&other.to_display_string()),
        }
    }
}

/// `array.join(separator)`, refused past `max_len` bytes.
pub fn join_array(array: &ArrayRef, separator: &str, max_len: usize) -> Result<String, TextOverflow> {
    let mut out = String::new();
    write_joined(array, separator, &mut out, max_len, &mut Vec::new())?;
    Ok(out)
}

fn write_joined(
    array: &ArrayRef,
    separator: &str,
    out: &mut String,
    max_len: usize,
    open: &mut Vec<*const RefCell<Vec<Value>>>,
) -> Result<(), TextOverflow> {
    let ptr = Rc::as_ptr(array);
    if open.contains(&ptr) {
        return Ok(());
    }
    if open.len() >= MAX_TEXT_DEPTH {
        return Err(TextOverflow::Depth);
    }
    open.push(ptr);
    for (i, item) in array.borrow().iter().enumerate() {
        if i > 0 {
            push_bounded(out, separator, max_len)?;
        }
        if !item.is_nullish() {
            item.write_text(out, max_len, open)?;
        }
    }
    open.pop();
    Ok(())
}

/// Append as much of `text` as fits in `max_len` bytes.
fn push_bounded(out: &mut String, text: &str, max_len: usize) -> Result<(), TextOverflow> {
    if out.len().saturating_add(text.len()) <= max_len {
        out.push_str(text);
        return Ok(());
    }
    let mut end = max_len.saturating_sub(out.len()).min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    out.push_str(&text[..end]);
    Err(TextOverflow::Length)
}

fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        0.0
    } else {
        trimmed.parse().unwrap_or(f64::NAN)
    }
}

/// Render a number the way scripts expect to see it printed.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if (1e-7..1e21).contains(&magnitude) {
        format!("{}", n)
    } else {
        // 1.5e-9, 2e+21
        let s = format!("{:e}", n);
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        }
    }
}
