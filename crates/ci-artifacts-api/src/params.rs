//! Build parameter parsing and normalization
//!
//! Jenkins coerces the string `"false"` into a truthy boolean parameter, so
//! parameters have to be brought into a canonical typed form on the client
//! side before two parameter sets can be compared.

use std::collections::{
    BTreeMap,
    BTreeSet,
};
use std::fmt;

use serde::{
    Deserialize,
    Serialize,
};

use crate::error::{
    CiError,
    CiResult,
};

/// A normalized build parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl ParamValue {
    /// Normalizes a single raw value. `boolean_key` widens the accepted
    /// boolean spellings for parameters known to be boolean on the remote side.
    pub fn normalize(raw: &str, boolean_key: bool) -> Self {
        let lowered = raw.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "true" => return ParamValue::Bool(true),
            "false" => return ParamValue::Bool(false),
            _ => {}
        }
        if boolean_key {
            match lowered.as_str() {
                "1" | "yes" | "on" => return ParamValue::Bool(true),
                "0" | "no" | "off" => return ParamValue::Bool(false),
                _ => {}
            }
        }
        match raw.parse::<i64>() {
            // "007" or "+5" must survive as text, only canonical integers convert
            Ok(number) if number.to_string() == raw => ParamValue::Int(number),
            _ => ParamValue::Text(raw.to_string()),
        }
    }

    /// Maps a JSON value as returned by the Jenkins API
    pub fn from_json(value: &serde_json::Value, boolean_key: bool) -> Self {
        match value {
            serde_json::Value::Bool(b) => ParamValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ParamValue::Int(i),
                None => ParamValue::Text(n.to_string()),
            },
            serde_json::Value::String(s) => Self::normalize(s, boolean_key),
            serde_json::Value::Null => ParamValue::Text(String::new()),
            other => ParamValue::Text(other.to_string()),
        }
    }

    /// Value as submitted in a `buildWithParameters` form
    pub fn to_form_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

/// Normalized mapping from parameter name to value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, ParamValue>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) -> Option<ParamValue> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Returns a copy with the entries of `other` layered on top
    pub fn merged(&self, other: &ParameterSet) -> ParameterSet {
        let mut merged = self.clone();
        for (name, value) in other.iter() {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }

    /// Re-applies normalization to every value. A set produced by
    /// [`normalize`] with the same keys is a fixed point of this.
    pub fn normalized(&self, boolean_keys: &BTreeSet<String>) -> ParameterSet {
        self.0
            .iter()
            .map(|(name, value)| {
                let boolean_key = boolean_keys.contains(name);
                let value = match value {
                    ParamValue::Text(s) => ParamValue::normalize(s, boolean_key),
                    // `1`/`0` were read as integers before the key was known to be boolean
                    ParamValue::Int(i) if boolean_key => {
                        ParamValue::normalize(&i.to_string(), true)
                    }
                    other => other.clone(),
                };
                (name.clone(), value)
            })
            .collect()
    }

    /// True if `self` carries the same value as `required` for every required
    /// key not listed in `ignore`
    pub fn satisfies(&self, required: &ParameterSet, ignore: &BTreeSet<String>) -> bool {
        required
            .iter()
            .filter(|(name, _)| !ignore.contains(*name))
            .all(|(name, value)| self.get(name) == Some(value))
    }

    /// Form fields for `buildWithParameters`
    pub fn to_form(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(name, value)| (name.clone(), value.to_form_value()))
            .collect()
    }
}

impl FromIterator<(String, ParamValue)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&rendered)
    }
}

/// Splits a packed `key=value,key2=value2` string into its raw entries
pub fn parse_params(packed: &str) -> CiResult<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    for entry in packed.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            CiError::ParameterFormat(format!("'{entry}' is not of the form key=value"))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(CiError::ParameterFormat(format!(
                "'{entry}' has an empty parameter name"
            )));
        }
        params.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}

/// Normalizes raw string parameters into a [`ParameterSet`]
pub fn normalize(raw: &BTreeMap<String, String>, boolean_keys: &BTreeSet<String>) -> ParameterSet {
    raw.iter()
        .map(|(name, value)| {
            (
                name.clone(),
                ParamValue::normalize(value, boolean_keys.contains(name)),
            )
        })
        .collect()
}
