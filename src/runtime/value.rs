//! Value types exchanged by deferred values and their handlers
//!
//! This module defines the dynamic representation of the values that flow
//! through the runtime: primitives, objects (with data and accessor
//! properties), native functions, arrays, error objects and deferred values.
//! Foreign thenables are ordinary objects whose `then` member is callable.

use super::promise::Deferred;
use crate::error::{messages, Error, Result};
use rustc_hash::FxHashMap as HashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Largest integer an f64 holds exactly (2^53)
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Type alias for native function implementations: `(this, args) -> result`
pub type NativeFn = Rc<dyn Fn(&Value, &[Value]) -> Result<Value>>;

/// Type alias for accessor property getters; receives the object being read
pub type Getter = Rc<dyn Fn(&Value) -> Result<Value>>;

/// A dynamic value
#[derive(Clone)]
pub enum Value {
    /// undefined
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// Object (includes arrays, functions and error objects)
    Object(Rc<RefCell<Object>>),
    /// A deferred value produced by this runtime
    Deferred(Deferred),
}

impl Value {
    /// Check if value is undefined
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Objects, functions and deferred values can carry a `then` member
    pub fn is_object_like(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Deferred(_))
    }

    /// Check if value can be invoked with [`Value::call`]
    pub fn is_callable(&self) -> bool {
        match self {
            Value::Object(obj) => matches!(obj.borrow().kind, ObjectKind::Function { .. }),
            _ => false,
        }
    }

    /// Get the typeof string
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object", // Historical quirk
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Deferred(_) => "object",
            Value::Object(obj) => match obj.borrow().kind {
                ObjectKind::Function { .. } => "function",
                _ => "object",
            },
        }
    }

    /// Convert to string representation
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(true) => "true".to_string(),
            Value::Boolean(false) => "false".to_string(),
            Value::Number(n) => {
                if n.is_nan() {
                    "NaN".to_string()
                } else if n.is_infinite() {
                    if *n > 0.0 {
                        "Infinity".to_string()
                    } else {
                        "-Infinity".to_string()
                    }
                } else if *n == 0.0 {
                    "0".to_string()
                } else {
                    format!("{}", n)
                }
            }
            Value::String(s) => s.clone(),
            Value::Deferred(_) => "[object Deferred]".to_string(),
            Value::Object(obj) => {
                let obj = obj.borrow();
                match &obj.kind {
                    ObjectKind::Array(arr) => {
                        let elements: Vec<String> = arr.iter().map(|v| v.to_js_string()).collect();
                        elements.join(",")
                    }
                    ObjectKind::Function { name, .. } => format!("[Native: {}]", name),
                    ObjectKind::Error { name, message } => format!("{}: {}", name, message),
                    ObjectKind::Ordinary => "[object Object]".to_string(),
                }
            }
        }
    }

    /// Strict equality (===): primitives by value, object-like values by identity
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                if a.is_nan() || b.is_nan() {
                    false
                } else {
                    a == b
                }
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Deferred(a), Value::Deferred(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Create a new object value
    pub fn new_object() -> Value {
        Value::Object(Rc::new(RefCell::new(Object::new())))
    }

    /// Create a new object value with data properties
    pub fn new_object_with_properties(properties: HashMap<String, Value>) -> Value {
        Value::Object(Rc::new(RefCell::new(Object {
            kind: ObjectKind::Ordinary,
            properties: properties
                .into_iter()
                .map(|(k, v)| (k, Property::Data(v)))
                .collect(),
        })))
    }

    /// Create a new array value
    pub fn new_array(elements: Vec<Value>) -> Value {
        Value::Object(Rc::new(RefCell::new(Object {
            kind: ObjectKind::Array(elements),
            properties: HashMap::default(),
        })))
    }

    /// Create a new error value
    pub fn new_error(error_type: &str, message: &str) -> Value {
        let mut properties = HashMap::default();
        properties.insert(
            "name".to_string(),
            Property::Data(Value::String(error_type.to_string())),
        );
        properties.insert(
            "message".to_string(),
            Property::Data(Value::String(message.to_string())),
        );
        Value::Object(Rc::new(RefCell::new(Object {
            kind: ObjectKind::Error {
                name: error_type.to_string(),
                message: message.to_string(),
            },
            properties,
        })))
    }

    /// Create a new native function value
    pub fn new_function<F>(name: &str, func: F) -> Value
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + 'static,
    {
        Value::Object(Rc::new(RefCell::new(Object {
            kind: ObjectKind::Function {
                name: name.to_string(),
                func: Rc::new(func),
            },
            properties: HashMap::default(),
        })))
    }

    /// Read a member, running accessor getters.
    ///
    /// Missing members read as `undefined`. Each call runs an accessor's
    /// getter exactly once, so callers that must not observe a member twice
    /// should read it once and keep the result.
    pub fn get(&self, key: &str) -> Result<Value> {
        match self {
            Value::Object(obj_rc) => {
                let getter = {
                    let obj = obj_rc.borrow();
                    match obj.properties.get(key) {
                        Some(Property::Data(value)) => return Ok(value.clone()),
                        Some(Property::Accessor(getter)) => getter.clone(),
                        None => {
                            return Ok(match (&obj.kind, key) {
                                (ObjectKind::Array(arr), "length") => Value::Number(arr.len() as f64),
                                (ObjectKind::Array(arr), _) => key
                                    .parse::<usize>()
                                    .ok()
                                    .and_then(|idx| arr.get(idx).cloned())
                                    .unwrap_or(Value::Undefined),
                                _ => Value::Undefined,
                            });
                        }
                    }
                };
                // The borrow is released before the getter runs; getters may
                // mutate their own object.
                getter(self)
            }
            Value::Deferred(deferred) => Ok(deferred.method(key).unwrap_or(Value::Undefined)),
            Value::String(s) if key == "length" => Ok(Value::Number(s.chars().count() as f64)),
            _ => Ok(Value::Undefined),
        }
    }

    /// Set a data property on an object
    pub fn set_property(&self, key: &str, value: Value) -> bool {
        match self {
            Value::Object(obj) => {
                obj.borrow_mut()
                    .properties
                    .insert(key.to_string(), Property::Data(value));
                true
            }
            _ => false,
        }
    }

    /// Define an accessor property whose getter runs on every read
    pub fn define_getter<F>(&self, key: &str, getter: F) -> bool
    where
        F: Fn(&Value) -> Result<Value> + 'static,
    {
        match self {
            Value::Object(obj) => {
                obj.borrow_mut()
                    .properties
                    .insert(key.to_string(), Property::Accessor(Rc::new(getter)));
                true
            }
            _ => false,
        }
    }

    /// Invoke a callable value with `this` as the receiver
    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
        let func = match self {
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Function { func, .. } => Some(func.clone()),
                _ => None,
            },
            _ => None,
        };
        match func {
            Some(func) => func(this, args),
            None => Err(Error::type_error(messages::not_a_function(
                &self.to_js_string(),
            ))),
        }
    }

    /// Borrow the deferred value, if this is one
    pub fn as_deferred(&self) -> Option<&Deferred> {
        match self {
            Value::Deferred(d) => Some(d),
            _ => None,
        }
    }

    /// Copy out the elements of an array
    pub fn as_array(&self) -> Option<Vec<Value>> {
        match self {
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Array(arr) => Some(arr.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// The number, if this is one
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The `name` of an error object (e.g. `"CycleError"`)
    pub fn error_name(&self) -> Option<String> {
        match self {
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Error { name, .. } => Some(name.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Convert a JSON document into a value
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(arr) => Value::new_array(arr.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => {
                let props: HashMap<String, Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect();
                Value::new_object_with_properties(props)
            }
        }
    }

    /// Convert a value into JSON. Functions, deferred values and accessor
    /// properties have no JSON form; they become `null` or are skipped.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Deferred(_) => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                if n.is_nan() || n.is_infinite() {
                    serde_json::Value::Null
                } else if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::json!(*n)
                }
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Object(obj) => {
                let obj = obj.borrow();
                match &obj.kind {
                    ObjectKind::Array(arr) => {
                        serde_json::Value::Array(arr.iter().map(Value::to_json).collect())
                    }
                    ObjectKind::Function { .. } => serde_json::Value::Null,
                    ObjectKind::Error { .. } | ObjectKind::Ordinary => {
                        let mut map = serde_json::Map::new();
                        for (k, prop) in &obj.properties {
                            if let Property::Data(v) = prop {
                                map.insert(k.clone(), v.to_json());
                            }
                        }
                        serde_json::Value::Object(map)
                    }
                }
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Deferred(d) => write!(f, "{:?}", d),
            Value::Object(obj) => {
                let obj = obj.borrow();
                match &obj.kind {
                    ObjectKind::Ordinary => write!(f, "{{...}}"),
                    ObjectKind::Array(arr) => write!(f, "{:?}", arr),
                    ObjectKind::Function { name, .. } => write!(f, "[Native: {}]", name),
                    ObjectKind::Error { name, message } => write!(f, "{}: {}", name, message),
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_js_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Deferred> for Value {
    fn from(d: Deferred) -> Self {
        Value::Deferred(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(elements: Vec<Value>) -> Self {
        Value::new_array(elements)
    }
}

/// An object property
#[derive(Clone)]
pub enum Property {
    /// A plain stored value
    Data(Value),
    /// A computed value; the getter runs on every read
    Accessor(Getter),
}

/// Kinds of object
#[derive(Clone)]
pub enum ObjectKind {
    /// A plain object
    Ordinary,
    /// An array with its elements
    Array(Vec<Value>),
    /// A native function
    Function { name: String, func: NativeFn },
    /// An error object
    Error { name: String, message: String },
}

/// A heap object
#[derive(Clone)]
pub struct Object {
    /// Object kind
    pub kind: ObjectKind,
    /// Properties
    pub properties: HashMap<String, Property>,
}

impl Object {
    /// Create a new ordinary object
    pub fn new() -> Self {
        Self {
            kind: ObjectKind::Ordinary,
            properties: HashMap::default(),
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}
