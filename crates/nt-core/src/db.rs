//! Flat key/value store for solver options.
//!
//! Every layer of the stack reads its options from a [`SolverDb`] by key
//! (`pc_type`, `outer_tolerance`, ...). Values are loosely typed: integers
//! are accepted where reals are expected, and `0`/`1` where booleans are.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A single configuration value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DbValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Bool(v)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Int(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Int(v as i64)
    }
}

impl From<usize> for DbValue {
    fn from(v: usize) -> Self {
        DbValue::Int(v as i64)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        DbValue::Real(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Str(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Str(v)
    }
}

/// Flat solver configuration database.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SolverDb {
    entries: BTreeMap<String, DbValue>,
}

impl SolverDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML mapping of `key: value` pairs.
    pub fn from_yaml_str(text: &str) -> CoreResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn to_yaml_string(&self) -> CoreResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Insert or overwrite a value.
    pub fn put(&mut self, key: &str, value: impl Into<DbValue>) -> &mut Self {
        self.entries.insert(key.to_string(), value.into());
        self
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<DbValue>) -> Self {
        self.put(key, value);
        self
    }

    pub fn check(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&DbValue> {
        self.entries.get(key)
    }

    pub fn get_real(&self, key: &str) -> CoreResult<Option<f64>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(DbValue::Real(v)) => Ok(Some(*v)),
            Some(DbValue::Int(v)) => Ok(Some(*v as f64)),
            Some(_) => Err(wrong_type(key, "real")),
        }
    }

    pub fn get_int(&self, key: &str) -> CoreResult<Option<i64>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(DbValue::Int(v)) => Ok(Some(*v)),
            Some(_) => Err(wrong_type(key, "integer")),
        }
    }

    pub fn get_bool(&self, key: &str) -> CoreResult<Option<bool>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(DbValue::Bool(v)) => Ok(Some(*v)),
            Some(DbValue::Int(0)) => Ok(Some(false)),
            Some(DbValue::Int(1)) => Ok(Some(true)),
            Some(_) => Err(wrong_type(key, "bool")),
        }
    }

    pub fn get_str(&self, key: &str) -> CoreResult<Option<&str>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(DbValue::Str(v)) => Ok(Some(v.as_str())),
            Some(_) => Err(wrong_type(key, "string")),
        }
    }

    pub fn real_or(&self, key: &str, default: f64) -> CoreResult<f64> {
        Ok(self.get_real(key)?.unwrap_or(default))
    }

    pub fn bool_or(&self, key: &str, default: bool) -> CoreResult<bool> {
        Ok(self.get_bool(key)?.unwrap_or(default))
    }

    /// Strictly positive integer option.
    pub fn positive_or(&self, key: &str, default: usize) -> CoreResult<usize> {
        match self.get_int(key)? {
            None => Ok(default),
            Some(v) if v > 0 => Ok(v as usize),
            Some(v) => Err(CoreError::InvalidArg {
                what: format!("{key} must be a positive integer, got {v}"),
            }),
        }
    }

    /// Non-negative integer option.
    pub fn count_or(&self, key: &str, default: usize) -> CoreResult<usize> {
        match self.get_int(key)? {
            None => Ok(default),
            Some(v) if v >= 0 => Ok(v as usize),
            Some(v) => Err(CoreError::InvalidArg {
                what: format!("{key} must be non-negative, got {v}"),
            }),
        }
    }

    /// Integer option restricted to `0..=max`.
    pub fn bounded_or(&self, key: &str, default: usize, max: usize) -> CoreResult<usize> {
        let v = self.count_or(key, default)?;
        if v > max {
            return Err(CoreError::InvalidArg {
                what: format!("{key} must be at most {max}, got {v}"),
            });
        }
        Ok(v)
    }

    pub fn require_real(&self, key: &str) -> CoreResult<f64> {
        self.get_real(key)?
            .ok_or_else(|| CoreError::MissingKey { key: key.to_string() })
    }

    pub fn require_str(&self, key: &str) -> CoreResult<&str> {
        self.get_str(key)?
            .ok_or_else(|| CoreError::MissingKey { key: key.to_string() })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DbValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn wrong_type(key: &str, expected: &'static str) -> CoreError {
    CoreError::WrongType {
        key: key.to_string(),
        expected,
    }
}
