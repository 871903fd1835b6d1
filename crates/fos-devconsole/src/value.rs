//! Console values
//!
//! Arguments passed to the console surface. Objects and arrays are shared,
//! mutable references, so a value can point back at itself exactly as page
//! objects can.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Number, Value};

/// Shared object storage (insertion-ordered properties)
pub type ObjectRef = Rc<RefCell<Vec<(String, ConsoleValue)>>>;

/// Shared array storage
pub type ArrayRef = Rc<RefCell<Vec<ConsoleValue>>>;

/// Console value (for object inspection)
#[derive(Clone)]
pub enum ConsoleValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Object(ObjectRef),
    Array(ArrayRef),
    Function(String),
    Symbol(String),
    Error { name: String, message: String },
}

/// Value conversion errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("Converting circular structure to JSON")]
    Circular,
}

impl ConsoleValue {
    /// Build an object from key/value pairs
    pub fn object<K, I>(props: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ConsoleValue)>,
    {
        let props = props.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::Object(Rc::new(RefCell::new(props)))
    }

    /// Build an array
    pub fn array<I: IntoIterator<Item = ConsoleValue>>(items: I) -> Self {
        Self::Array(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    /// Build an error value
    pub fn error(name: &str, message: &str) -> Self {
        Self::Error { name: name.to_string(), message: message.to_string() }
    }

    /// Set a property on an object value. Returns false for non-objects.
    pub fn set(&self, key: &str, value: ConsoleValue) -> bool {
        let Self::Object(props) = self else {
            return false;
        };
        let mut props = props.borrow_mut();
        match props.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => props.push((key.to_string(), value)),
        }
        true
    }

    /// Push onto an array value. Returns false for non-arrays.
    pub fn push(&self, value: ConsoleValue) -> bool {
        let Self::Array(items) = self else {
            return false;
        };
        items.borrow_mut().push(value);
        true
    }

    /// Whether this is an object-like value (object, array or error)
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_) | Self::Error { .. })
    }

    /// Convert to JSON the way `JSON.stringify` would see it.
    ///
    /// Fails on self-referential structures.
    pub fn to_json(&self) -> Result<Value, ValueError> {
        let mut stack = Vec::new();
        self.json_in(&mut stack).map(|v| v.unwrap_or(Value::Null))
    }

    /// Serialize to a JSON string
    pub fn to_json_string(&self) -> Result<String, ValueError> {
        self.to_json().map(|v| v.to_string())
    }

    /// `None` means "omitted" (undefined, functions and symbols).
    fn json_in(&self, stack: &mut Vec<*const ()>) -> Result<Option<Value>, ValueError> {
        let value = match self {
            Self::Undefined | Self::Function(_) | Self::Symbol(_) => return Ok(None),
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => Value::String(s.clone()),
            Self::Error { name, message } => {
                let mut map = Map::new();
                map.insert("name".to_string(), Value::String(name.clone()));
                map.insert("message".to_string(), Value::String(message.clone()));
                Value::Object(map)
            }
            Self::Object(props) => {
                let ptr = Rc::as_ptr(props) as *const ();
                if stack.contains(&ptr) {
                    return Err(ValueError::Circular);
                }
                stack.push(ptr);
                let mut map = Map::new();
                for (key, value) in props.borrow().iter() {
                    if let Some(v) = value.json_in(stack)? {
                        map.insert(key.clone(), v);
                    }
                }
                stack.pop();
                Value::Object(map)
            }
            Self::Array(items) => {
                let ptr = Rc::as_ptr(items) as *const ();
                if stack.contains(&ptr) {
                    return Err(ValueError::Circular);
                }
                stack.push(ptr);
                let mut out = Vec::new();
                for item in items.borrow().iter() {
                    out.push(item.json_in(stack)?.unwrap_or(Value::Null));
                }
                stack.pop();
                Value::Array(out)
            }
        };
        Ok(Some(value))
    }

    /// Plain string conversion (`String(value)`), used for messages
    pub fn to_plain_string(&self) -> String {
        let mut stack = Vec::new();
        self.plain_in(&mut stack)
    }

    fn plain_in(&self, stack: &mut Vec<*const ()>) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Object(_) => "[object Object]".to_string(),
            Self::Array(items) => {
                // Cycles render as empty, like Array.prototype.join
                let ptr = Rc::as_ptr(items) as *const ();
                if stack.contains(&ptr) {
                    return String::new();
                }
                stack.push(ptr);
                let joined = items
                    .borrow()
                    .iter()
                    .map(|v| match v {
                        Self::Undefined | Self::Null => String::new(),
                        other => other.plain_in(stack),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                stack.pop();
                joined
            }
            other => other.to_string(),
        }
    }
}

/// Integral numbers serialize without a fraction, non-finite ones as null
fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

impl fmt::Display for ConsoleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
            Self::Object(_) | Self::Array(_) => match self.to_json_string() {
                Ok(json) => write!(f, "{}", json),
                Err(_) => write!(f, "[Circular]"),
            },
            Self::Function(name) => write!(f, "ƒ {}", name),
            Self::Symbol(s) => write!(f, "Symbol({})", s),
            Self::Error { name, message } => write!(f, "{}: {}", name, message),
        }
    }
}

// Derived Debug would recurse forever on cycles
impl fmt::Debug for ConsoleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "Undefined"),
            Self::Null => write!(f, "Null"),
            Self::Boolean(b) => write!(f, "Boolean({})", b),
            Self::Number(n) => write!(f, "Number({})", n),
            Self::String(s) => write!(f, "String({:?})", s),
            Self::Object(_) => write!(f, "Object({})", self),
            Self::Array(_) => write!(f, "Array({})", self),
            Self::Function(name) => write!(f, "Function({:?})", name),
            Self::Symbol(s) => write!(f, "Symbol({:?})", s),
            Self::Error { name, message } => write!(f, "Error({}: {})", name, message),
        }
    }
}

impl From<&str> for ConsoleValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ConsoleValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for ConsoleValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for ConsoleValue {
    fn from(n: i32) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for ConsoleValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&Value> for ConsoleValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(*b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::array(items.iter().map(Self::from)),
            Value::Object(map) => Self::object(map.iter().map(|(k, v)| (k.clone(), Self::from(v)))),
        }
    }
}
