//! A single result row as returned by a graph store.

use crate::model::{Node, Value};
use crate::{Error, Result};

/// One row of a query result: ordered column names with their values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    keys: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. A repeated key replaces the earlier value in place.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.keys.iter().position(|k| *k == key) {
            Some(idx) => self.values[idx] = value,
            None => {
                self.keys.push(key);
                self.values.push(value);
            }
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, value);
        self
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Raw value of a column.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.keys.iter().position(|k| k == key).map(|idx| &self.values[idx])
    }

    /// Typed value of a column.
    pub fn get<T: FromValue>(&self, key: &str) -> Result<T> {
        let val = self.value(key)
            .ok_or_else(|| Error::NotFound(format!("Column '{key}'")))?;
        T::from_value(val)
    }

    /// Columns in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.keys.iter().map(String::as_str).zip(self.values.iter())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.push(k, v);
        }
        record
    }
}

/// Convert from Value to concrete types.
pub trait FromValue: Sized {
    fn from_value(val: &Value) -> Result<Self>;
}

impl FromValue for Node {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Node(n) => Ok(*n.clone()),
            _ => Err(Error::TypeError {
                expected: "Node".into(),
                got: val.type_name().into(),
            }),
        }
    }
}

impl FromValue for String {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::String(s) => Ok(s.clone()),
            _ => Err(Error::TypeError {
                expected: "String".into(),
                got: val.type_name().into(),
            }),
        }
    }
}

impl FromValue for i64 {
    fn from_value(val: &Value) -> Result<Self> {
        val.as_int().ok_or_else(|| Error::TypeError {
            expected: "Integer".into(),
            got: val.type_name().into(),
        })
    }
}

impl FromValue for f64 {
    fn from_value(val: &Value) -> Result<Self> {
        val.as_float().ok_or_else(|| Error::TypeError {
            expected: "Float".into(),
            got: val.type_name().into(),
        })
    }
}

impl FromValue for Value {
    fn from_value(val: &Value) -> Result<Self> {
        Ok(val.clone())
    }
}
