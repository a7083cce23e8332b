//! Filter registry and built-in filters
//!
//! A filter is a pure function over values. Arguments written in parentheses come
//! first, the piped value is always the last argument:
//! `{{ x | join(', ') }}` calls `join([", ", x])`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Local, TimeZone};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::value::{self, Num};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("expected {expected} argument(s), got {got}")]
    ArgCount { expected: usize, got: usize },

    #[error("{0}")]
    InvalidValue(String),
}

pub type FilterFn = Arc<dyn Fn(&[Value]) -> Result<Value, FilterError> + Send + Sync>;

/* ===================== Registry ===================== */

/// Name to filter function table, open to registration from outside the engine
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, FilterFn>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.filters.keys().collect();
        names.sort();
        f.debug_struct("FilterRegistry")
            .field("filters", &names)
            .finish()
    }
}

impl FilterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in filters
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("str", filter_str);
        registry.register("int", filter_int);
        registry.register("float", filter_float);
        registry.register("bool", filter_bool);
        registry.register("dict_keys", dict_keys);
        registry.register("dict_values", dict_values);
        registry.register("dict2item", dict2item);
        registry.register("join", join);
        registry.register("str_pvts", str_pvts);
        registry
    }

    /// Register a filter, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&[Value]) -> Result<Value, FilterError> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.filters.contains_key(&name) {
            warn!(filter = %name, "filter is already registered, replacing");
        } else {
            debug!(filter = %name, "filter registered");
        }
        self.filters.insert(name, Arc::new(filter));
    }

    pub fn get(&self, name: &str) -> Option<&FilterFn> {
        self.filters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/* ===================== Argument Helpers ===================== */

fn expect_args<const N: usize>(args: &[Value]) -> Result<&[Value; N], FilterError> {
    args.try_into().map_err(|_| FilterError::ArgCount {
        expected: N,
        got: args.len(),
    })
}

fn expect_str<'a>(value: &'a Value, what: &str) -> Result<&'a str, FilterError> {
    value.as_str().ok_or_else(|| {
        FilterError::InvalidValue(format!(
            "{} must be a string, not {}",
            what,
            value::type_name(value)
        ))
    })
}

fn expect_dict<'a>(value: &'a Value) -> Result<&'a Map<String, Value>, FilterError> {
    value.as_object().ok_or_else(|| {
        FilterError::InvalidValue(format!(
            "expected a dict, got {}",
            value::type_name(value)
        ))
    })
}

fn to_float(value: f64) -> Result<Value, FilterError> {
    value::float_value(value).map_err(|e| FilterError::InvalidValue(e.to_string()))
}

/* ===================== Cast Filters ===================== */

/// str - Convert the value into a string
pub fn filter_str(args: &[Value]) -> Result<Value, FilterError> {
    let [target] = expect_args::<1>(args)?;
    Ok(Value::String(value::to_display_string(target)))
}

/// int - Convert the value into an integer (floats truncate toward zero)
pub fn filter_int(args: &[Value]) -> Result<Value, FilterError> {
    let [target] = expect_args::<1>(args)?;
    match target {
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| {
                FilterError::InvalidValue(format!("invalid literal for int(): {}", value::repr(target)))
            }),
        other => match value::as_num(other) {
            Some(Num::Int(i)) => Ok(Value::from(i)),
            Some(Num::Float(f)) if f.is_finite() && f.abs() < i64::MAX as f64 => {
                Ok(Value::from(f.trunc() as i64))
            }
            _ => Err(FilterError::InvalidValue(format!(
                "cannot convert {} to int",
                value::type_name(other)
            ))),
        },
    }
}

/// float - Convert the value into a float
pub fn filter_float(args: &[Value]) -> Result<Value, FilterError> {
    let [target] = expect_args::<1>(args)?;
    match target {
        Value::String(s) => {
            let parsed = s.trim().parse::<f64>().map_err(|_| {
                FilterError::InvalidValue(format!(
                    "could not convert string to float: {}",
                    value::repr(target)
                ))
            })?;
            to_float(parsed)
        }
        other => match value::as_num(other) {
            Some(n) => to_float(n.as_f64()),
            None => Err(FilterError::InvalidValue(format!(
                "cannot convert {} to float",
                value::type_name(other)
            ))),
        },
    }
}

/// bool - Convert the value into a boolean using truthiness
pub fn filter_bool(args: &[Value]) -> Result<Value, FilterError> {
    let [target] = expect_args::<1>(args)?;
    Ok(Value::Bool(value::is_truthy(target)))
}

/* ===================== Mapping Filters ===================== */

/// dict_keys - Return a list of all the keys from the dictionary
pub fn dict_keys(args: &[Value]) -> Result<Value, FilterError> {
    let [target] = expect_args::<1>(args)?;
    let map = expect_dict(target)?;
    Ok(Value::Array(
        map.keys().map(|k| Value::String(k.clone())).collect(),
    ))
}

/// dict_values - Return a list of all the values from the dictionary
pub fn dict_values(args: &[Value]) -> Result<Value, FilterError> {
    let [target] = expect_args::<1>(args)?;
    let map = expect_dict(target)?;
    Ok(Value::Array(map.values().cloned().collect()))
}

/// dict2item(key_name, val_name) - Turn a dictionary into a list of
/// `{key_name: key, val_name: value}` entries
pub fn dict2item(args: &[Value]) -> Result<Value, FilterError> {
    let [key_name, val_name, target] = expect_args::<3>(args)?;
    let key_name = expect_str(key_name, "key_name")?;
    let val_name = expect_str(val_name, "val_name")?;
    let map = expect_dict(target)?;

    let items = map
        .iter()
        .map(|(k, v)| {
            let mut entry = Map::new();
            entry.insert(key_name.to_string(), Value::String(k.clone()));
            entry.insert(val_name.to_string(), v.clone());
            Value::Object(entry)
        })
        .collect();
    Ok(Value::Array(items))
}

/* ===================== String Filters ===================== */

/// join(separator) - Join a list of strings with a separator
pub fn join(args: &[Value]) -> Result<Value, FilterError> {
    let [separator, target] = expect_args::<2>(args)?;
    let separator = expect_str(separator, "separator")?;
    let items = target.as_array().ok_or_else(|| {
        FilterError::InvalidValue(format!(
            "expected a list, got {}",
            value::type_name(target)
        ))
    })?;

    let parts = items
        .iter()
        .map(|item| expect_str(item, "list item"))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::String(parts.join(separator)))
}

/// str_pvts - Format a float epoch timestamp as local
/// `YYYY-mm-dd HH:MM:SS.fffff`
pub fn str_pvts(args: &[Value]) -> Result<Value, FilterError> {
    let [target] = expect_args::<1>(args)?;
    let tstamp = value::as_num(target)
        .map(Num::as_f64)
        .filter(|t| t.is_finite())
        .ok_or_else(|| {
            FilterError::InvalidValue(format!(
                "expected a timestamp, got {}",
                value::type_name(target)
            ))
        })?;

    let secs = tstamp.floor();
    let frac = ((tstamp - secs) * 1.0e5).round() as i64;
    let local = Local
        .timestamp_opt(secs as i64, 0)
        .single()
        .ok_or_else(|| FilterError::InvalidValue(format!("timestamp out of range: {}", tstamp)))?;

    Ok(Value::String(format!(
        "{}.{:05}",
        local.format("%Y-%m-%d %H:%M:%S"),
        frac
    )))
}
