//! Core Task trait and argument handling
//!
//! Tasks are invoked as `name[:arg,arg,key=value]`. Positional values bind to
//! the task's parameters in declaration order, `key=value` pairs bind by name.

use async_trait::async_trait;
use deploy_core::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::orchestrator::Orchestrator;

/// A declared task parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// `None` means the parameter is required
    pub default: Option<&'static str>,
}

impl ParamSpec {
    pub const fn required(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            default: None,
        }
    }

    pub const fn optional(
        name: &'static str,
        description: &'static str,
        default: &'static str,
    ) -> Self {
        Self {
            name,
            description,
            default: Some(default),
        }
    }

    /// Optional parameter with no value when omitted
    pub const fn unset(name: &'static str, description: &'static str) -> Self {
        Self::optional(name, description, "")
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Core trait for all tasks
#[async_trait]
pub trait Task: Send + Sync {
    /// Get the task name (unique identifier)
    fn name(&self) -> &str;

    /// Get human-readable description
    fn description(&self) -> &str;

    /// Alternative names resolving to this task
    fn aliases(&self) -> &[&'static str] {
        &[]
    }

    /// Declared parameters, in positional order
    fn params(&self) -> &[ParamSpec] {
        &[]
    }

    /// Execute the task
    async fn execute(&self, orchestrator: &Orchestrator, args: &TaskArgs) -> Result<()>;
}

/// Type alias for boxed tasks
pub type BoxedTask = Arc<dyn Task>;

/// A parsed `name[:args]` word from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCall {
    pub name: String,
    pub positional: Vec<String>,
    pub named: Vec<(String, String)>,
}

impl TaskCall {
    /// Call a task with no arguments
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            positional: Vec::new(),
            named: Vec::new(),
        }
    }

    /// Parse `name`, `name:a,b` or `name:a,key=value`.
    ///
    /// A backslash escapes the next character, so values can carry `,` or `=`.
    pub fn parse(word: &str) -> Result<Self> {
        let (name, rest) = match word.split_once(':') {
            Some((name, rest)) => (name, Some(rest)),
            None => (word, None),
        };
        if name.is_empty() {
            return Err(Error::invalid_argument(format!("missing task name in '{}'", word)));
        }

        let mut call = Self::bare(name);
        let Some(rest) = rest else {
            return Ok(call);
        };

        for (key, value) in split_args(rest) {
            match key {
                Some(key) if key.is_empty() => {
                    return Err(Error::invalid_argument(format!(
                        "empty parameter name in '{}'",
                        word
                    )));
                }
                Some(key) => call.named.push((key, value)),
                None => call.positional.push(value),
            }
        }
        Ok(call)
    }
}

impl fmt::Display for TaskCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        let args: Vec<String> = self
            .positional
            .iter()
            .cloned()
            .chain(self.named.iter().map(|(k, v)| format!("{}={}", k, v)))
            .collect();
        if !args.is_empty() {
            write!(f, ":{}", args.join(","))?;
        }
        Ok(())
    }
}

/// Escape a value so [`TaskCall::parse`] reads it back unchanged
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ',' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Split `a,b=c` into `(None, "a"), (Some("b"), "c")`, honoring backslash escapes
fn split_args(input: &str) -> Vec<(Option<String>, String)> {
    let mut parsed = Vec::new();
    let mut key: Option<String> = None;
    let mut current = String::new();
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '=' if key.is_none() => key = Some(std::mem::take(&mut current)),
            ',' => parsed.push((key.take(), std::mem::take(&mut current))),
            _ => current.push(c),
        }
    }
    if key.is_some() || !current.is_empty() || !parsed.is_empty() {
        parsed.push((key, current));
    }
    parsed
}

/// Arguments bound against a task's declared parameters
#[derive(Debug, Clone, Default)]
pub struct TaskArgs {
    values: HashMap<&'static str, String>,
}

impl TaskArgs {
    /// Bind a call's arguments to `params`.
    ///
    /// Fails on unknown names, surplus positional values, parameters bound twice
    /// and missing required parameters.
    pub fn bind(params: &[ParamSpec], call: &TaskCall) -> Result<Self> {
        if call.positional.len() > params.len() {
            return Err(Error::invalid_argument(format!(
                "task '{}' takes at most {} argument(s), got {}",
                call.name,
                params.len(),
                call.positional.len()
            )));
        }

        let mut values = HashMap::new();
        for (param, value) in params.iter().zip(&call.positional) {
            values.insert(param.name, value.clone());
        }

        for (key, value) in &call.named {
            let param = params
                .iter()
                .find(|p| p.name == key.as_str())
                .ok_or_else(|| {
                    Error::invalid_argument(format!(
                        "task '{}' has no parameter '{}'",
                        call.name, key
                    ))
                })?;
            if values.insert(param.name, value.clone()).is_some() {
                return Err(Error::invalid_argument(format!(
                    "parameter '{}' of task '{}' given more than once",
                    key, call.name
                )));
            }
        }

        for param in params {
            if values.contains_key(param.name) {
                continue;
            }
            match param.default {
                Some(default) => {
                    values.insert(param.name, default.to_string());
                }
                None => {
                    return Err(Error::invalid_argument(format!(
                        "task '{}' requires parameter '{}'",
                        call.name, param.name
                    )));
                }
            }
        }

        Ok(Self { values })
    }

    /// Raw value; empty strings count as unset
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Value of a required parameter
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| Error::invalid_argument(format!("parameter '{}' must not be empty", name)))
    }

    /// Boolean value: true/false, 1/0, yes/no, on/off
    pub fn get_bool(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => parse_bool(value).ok_or_else(|| {
                Error::invalid_argument(format!(
                    "parameter '{}' expects a boolean, got '{}'",
                    name, value
                ))
            }),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
