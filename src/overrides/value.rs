use super::Argument;
use crate::descriptor::Descriptor;
use std::sync::Arc;

/// A dynamically typed argument or result of a public entry point.
#[derive(Clone, Debug)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<Value>),
    Dtype(Descriptor),
    Object(Arc<dyn Argument>),
}

impl Value {
    pub fn object(arg: impl Argument + 'static) -> Value {
        Value::Object(Arc::new(arg))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_object(&self) -> Option<&Arc<dyn Argument>> {
        match self {
            Value::Object(arg) => Some(arg),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}

/// Objects compare by identity, everything else by value.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Dtype(a), Value::Dtype(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<Descriptor> for Value {
    fn from(value: Descriptor) -> Self {
        Value::Dtype(value)
    }
}

impl From<Arc<dyn Argument>> for Value {
    fn from(value: Arc<dyn Argument>) -> Self {
        Value::Object(value)
    }
}

/// Positional and keyword arguments of one call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Arguments {
    pub positional: Vec<Value>,
    pub keyword: Vec<(String, Value)>,
}

impl Arguments {
    pub fn new(positional: Vec<Value>) -> Self {
        Arguments {
            positional,
            keyword: Vec::new(),
        }
    }

    pub fn keyword_arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.keyword.push((name.to_string(), value.into()));
        self
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keyword
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// The value bound to a parameter: by keyword first, then by position.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.keyword(name).or_else(|| self.positional.get(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_take_precedence() {
        let args = Arguments::new(vec![Value::Int(1), Value::Int(2)]).keyword_arg("axis", 5i64);

        assert_eq!(args.get(0, "a"), Some(&Value::Int(1)));
        assert_eq!(args.get(1, "axis"), Some(&Value::Int(5)));
        assert_eq!(args.get(3, "out"), None);
    }

    #[test]
    fn values_compare_structurally() {
        assert_eq!(
            Value::Tuple(vec![Value::from("x"), Value::None]),
            Value::Tuple(vec![Value::from("x"), Value::None])
        );
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }
}
