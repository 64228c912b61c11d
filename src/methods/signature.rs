use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::core::{FieldMap, OrmError, Result, Value};
use crate::records::RecordCollection;

/// Shape of one method parameter or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Unit,
    Any,
    Boolean,
    Integer,
    Float,
    Text,
    Date,
    DateTime,
    List,
    Map,
    Records,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unit => "()",
            Self::Any => "Value",
            Self::Boolean => "bool",
            Self::Integer => "i64",
            Self::Float => "f64",
            Self::Text => "String",
            Self::Date => "NaiveDate",
            Self::DateTime => "NaiveDateTime",
            Self::List => "Vec<Value>",
            Self::Map => "FieldMap",
            Self::Records => "RecordCollection",
        };
        write!(f, "{}", name)
    }
}

/// Parameter and return shapes of a method, fixed by its first layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<ArgKind>,
    pub variadic: bool,
    pub returns: ArgKind,
}

impl Signature {
    pub fn of<A: MethodArgs, R: MethodArg>() -> Self {
        Self {
            params: A::params(),
            variadic: A::variadic(),
            returns: R::kind(),
        }
    }

    /// Check that `args` can be passed to a layer with this signature.
    pub fn check_arity(&self, args: &[Value]) -> Result<()> {
        let fixed = if self.variadic {
            self.params.len().saturating_sub(1)
        } else {
            self.params.len()
        };
        let ok = if self.variadic {
            args.len() >= fixed
        } else {
            args.len() == fixed
        };
        if ok {
            Ok(())
        } else {
            Err(OrmError::TypeMismatch(format!(
                "method {} called with {} argument(s)",
                self,
                args.len()
            )))
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params: Vec<String> = self.params.iter().map(ArgKind::to_string).collect();
        if self.variadic {
            if let Some(last) = params.last_mut() {
                *last = format!("...{}", last);
            }
        }
        write!(f, "({}) -> {}", params.join(", "), self.returns)
    }
}

/// A single typed method parameter or return value.
pub trait MethodArg: Sized {
    fn kind() -> ArgKind;
    fn from_value(value: Value) -> Result<Self>;
    fn into_value(self) -> Value;
}

fn mismatch<T>(expected: ArgKind, value: &Value) -> Result<T> {
    Err(OrmError::TypeMismatch(format!(
        "expected {} argument, got {}",
        expected,
        value.type_name()
    )))
}

impl MethodArg for () {
    fn kind() -> ArgKind {
        ArgKind::Unit
    }

    fn from_value(_value: Value) -> Result<Self> {
        Ok(())
    }

    fn into_value(self) -> Value {
        Value::Null
    }
}

impl MethodArg for Value {
    fn kind() -> ArgKind {
        ArgKind::Any
    }

    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }

    fn into_value(self) -> Value {
        self
    }
}

impl MethodArg for bool {
    fn kind() -> ArgKind {
        ArgKind::Boolean
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(b) => Ok(b),
            Value::Null => Ok(false),
            other => mismatch(ArgKind::Boolean, &other),
        }
    }

    fn into_value(self) -> Value {
        Value::Boolean(self)
    }
}

impl MethodArg for i64 {
    fn kind() -> ArgKind {
        ArgKind::Integer
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(i),
            other => mismatch(ArgKind::Integer, &other),
        }
    }

    fn into_value(self) -> Value {
        Value::Integer(self)
    }
}

impl MethodArg for f64 {
    fn kind() -> ArgKind {
        ArgKind::Float
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Integer(i) => Ok(i as f64),
            other => mismatch(ArgKind::Float, &other),
        }
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl MethodArg for String {
    fn kind() -> ArgKind {
        ArgKind::Text
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => mismatch(ArgKind::Text, &other),
        }
    }

    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

impl MethodArg for NaiveDate {
    fn kind() -> ArgKind {
        ArgKind::Date
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(d) => Ok(d),
            other => mismatch(ArgKind::Date, &other),
        }
    }

    fn into_value(self) -> Value {
        Value::Date(self)
    }
}

impl MethodArg for NaiveDateTime {
    fn kind() -> ArgKind {
        ArgKind::DateTime
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => mismatch(ArgKind::DateTime, &other),
        }
    }

    fn into_value(self) -> Value {
        Value::DateTime(self)
    }
}

impl MethodArg for Vec<Value> {
    fn kind() -> ArgKind {
        ArgKind::List
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => mismatch(ArgKind::List, &other),
        }
    }

    fn into_value(self) -> Value {
        Value::List(self)
    }
}

impl MethodArg for FieldMap {
    fn kind() -> ArgKind {
        ArgKind::Map
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Map(map) => Ok(map),
            Value::Null => Ok(FieldMap::new()),
            other => mismatch(ArgKind::Map, &other),
        }
    }

    fn into_value(self) -> Value {
        Value::Map(self)
    }
}

impl MethodArg for RecordCollection {
    fn kind() -> ArgKind {
        ArgKind::Records
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Records(rs) => Ok(rs),
            other => mismatch(ArgKind::Records, &other),
        }
    }

    fn into_value(self) -> Value {
        Value::Records(self)
    }
}

/// The full parameter list of a method, after the receiver.
pub trait MethodArgs: Sized {
    fn params() -> Vec<ArgKind>;

    fn variadic() -> bool {
        false
    }

    fn from_values(values: Vec<Value>) -> Result<Self>;

    fn into_values(self) -> Vec<Value>;
}

impl MethodArgs for () {
    fn params() -> Vec<ArgKind> {
        Vec::new()
    }

    fn from_values(_values: Vec<Value>) -> Result<Self> {
        Ok(())
    }

    fn into_values(self) -> Vec<Value> {
        Vec::new()
    }
}

macro_rules! impl_method_args {
    ($($name:ident),+) => {
        impl<$($name: MethodArg),+> MethodArgs for ($($name,)+) {
            fn params() -> Vec<ArgKind> {
                vec![$($name::kind()),+]
            }

            #[allow(non_snake_case)]
            fn from_values(values: Vec<Value>) -> Result<Self> {
                let mut iter = values.into_iter();
                $(
                    let $name = $name::from_value(iter.next().unwrap_or(Value::Null))?;
                )+
                Ok(($($name,)+))
            }

            #[allow(non_snake_case)]
            fn into_values(self) -> Vec<Value> {
                let ($($name,)+) = self;
                vec![$($name.into_value()),+]
            }
        }
    };
}

impl_method_args!(A);
impl_method_args!(A, B);
impl_method_args!(A, B, C);
impl_method_args!(A, B, C, D);

/// Trailing variadic parameter list of one element type.
#[derive(Debug, Clone, Default)]
pub struct Variadic<T>(pub Vec<T>);

impl<T: MethodArg> MethodArgs for Variadic<T> {
    fn params() -> Vec<ArgKind> {
        vec![T::kind()]
    }

    fn variadic() -> bool {
        true
    }

    fn from_values(values: Vec<Value>) -> Result<Self> {
        values
            .into_iter()
            .map(T::from_value)
            .collect::<Result<Vec<_>>>()
            .map(Variadic)
    }

    fn into_values(self) -> Vec<Value> {
        self.0.into_iter().map(MethodArg::into_value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_display() {
        let sig = Signature::of::<(String, i64), bool>();
        assert_eq!(sig.to_string(), "(String, i64) -> bool");

        let variadic = Signature::of::<Variadic<i64>, ()>();
        assert_eq!(variadic.to_string(), "(...i64) -> ()");
    }

    #[test]
    fn test_signatures_compare_exactly() {
        assert_eq!(Signature::of::<(String,), String>(), Signature::of::<(String,), String>());
        assert_ne!(Signature::of::<(String,), String>(), Signature::of::<(i64,), String>());
        assert_ne!(Signature::of::<(i64,), ()>(), Signature::of::<Variadic<i64>, ()>());
    }

    #[test]
    fn test_arity_check() {
        let sig = Signature::of::<(String, i64), ()>();
        assert!(sig.check_arity(&[Value::from("a"), Value::from(1i64)]).is_ok());
        assert!(sig.check_arity(&[Value::from("a")]).is_err());

        let variadic = Signature::of::<Variadic<i64>, ()>();
        assert!(variadic.check_arity(&[]).is_ok());
        assert!(variadic.check_arity(&[Value::from(1i64), Value::from(2i64)]).is_ok());
    }

    #[test]
    fn test_tuple_round_trip_through_values() {
        let values = ("x".to_string(), 3i64).into_values();
        let (s, i) = <(String, i64)>::from_values(values).unwrap();
        assert_eq!(s, "x");
        assert_eq!(i, 3);
        assert!(<(i64,)>::from_values(vec![Value::from("no")]).is_err());
    }
}
