//! Scalar variables captured during an execution and text interpolation.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Variables of one execution; ordered so persisted records are stable
pub type Variables = BTreeMap<String, VariableValue>;

/// A variable value: string, number or boolean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    /// Boolean value
    Bool(bool),
    /// Numeric value
    Number(f64),
    /// Text value
    Text(String),
}

impl VariableValue {
    /// Numeric view of the value. Text is parsed after trimming; booleans are not numbers.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            VariableValue::Number(n) => Some(*n),
            VariableValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            VariableValue::Bool(_) => None,
        }
    }

    /// Textual view of the value, as it is rendered in messages
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::Bool(b) => write!(f, "{}", b),
            // Integral numbers render without a trailing ".0"
            VariableValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            VariableValue::Number(n) => write!(f, "{}", n),
            VariableValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::Text(value.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        VariableValue::Text(value)
    }
}

impl From<f64> for VariableValue {
    fn from(value: f64) -> Self {
        VariableValue::Number(value)
    }
}

impl From<i64> for VariableValue {
    fn from(value: i64) -> Self {
        VariableValue::Number(value as f64)
    }
}

impl From<bool> for VariableValue {
    fn from(value: bool) -> Self {
        VariableValue::Bool(value)
    }
}

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("placeholder pattern is valid");
}

/// Replace `{{ name }}` placeholders with variable values. Unknown names render empty.
pub fn interpolate(text: &str, variables: &Variables) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| {
            variables
                .get(&caps[1])
                .map(VariableValue::render)
                .unwrap_or_default()
        })
        .into_owned()
}
