// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed parameter lookup keyed by dotted names
//!
//! Parameters come from a TOML file. A key such as
//! `swarm.gdplogd.log.dir` is looked up first as a literal top-level key and
//! then by walking nested tables, so both of these work:
//!
//! ```toml
//! "swarm.gdplogd.log.dir" = "/srv/gdp"
//!
//! [swarm.gdplogd]
//! log.dir = "/srv/gdp"
//! ```

use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use toml::{Table, Value};

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parse error in {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("parameter {key}: expected {expected}")]
    Type { key: String, expected: &'static str },
}

/// Parameter table with typed getters
#[derive(Debug, Clone, Default)]
pub struct Params {
    table: Table,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a file; a missing file yields an empty table
    pub fn load(path: &Path) -> Result<Self, ParamsError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(ParamsError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        Self::parse(&text).map_err(|source| ParamsError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        Ok(Self {
            table: text.parse::<Table>()?,
        })
    }

    /// Set a literal top-level key, overriding anything nested
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.table.insert(key.to_string(), value.into());
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        if let Some(v) = self.table.get(key) {
            return Some(v);
        }
        let mut parts = key.split('.');
        let mut cur = self.table.get(parts.next()?)?;
        for part in parts {
            cur = cur.as_table()?.get(part)?;
        }
        Some(cur)
    }

    pub fn get_str(&self, key: &str, default: &str) -> Result<String, ParamsError> {
        match self.lookup(key) {
            None => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(type_error(key, "string")),
        }
    }

    /// Optional string with no default
    pub fn get_opt_str(&self, key: &str) -> Result<Option<String>, ParamsError> {
        match self.lookup(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(type_error(key, "string")),
        }
    }

    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64, ParamsError> {
        match self.lookup(key) {
            None => Ok(default),
            Some(Value::Integer(i)) if *i >= 0 => Ok(*i as u64),
            Some(_) => Err(type_error(key, "non-negative integer")),
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, ParamsError> {
        match self.lookup(key) {
            None => Ok(default),
            Some(Value::Boolean(b)) => Ok(*b),
            Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(type_error(key, "boolean")),
            },
            Some(_) => Err(type_error(key, "boolean")),
        }
    }

    /// Duration given as humantime text (`"15s"`) or integer seconds
    pub fn get_duration(&self, key: &str, default: Duration) -> Result<Duration, ParamsError> {
        match self.lookup(key) {
            None => Ok(default),
            Some(Value::Integer(i)) if *i >= 0 => Ok(Duration::from_secs(*i as u64)),
            Some(Value::String(s)) => {
                humantime::parse_duration(s).map_err(|_| type_error(key, "duration"))
            }
            Some(_) => Err(type_error(key, "duration")),
        }
    }
}

fn type_error(key: &str, expected: &'static str) -> ParamsError {
    ParamsError::Type {
        key: key.to_string(),
        expected,
    }
}

#[cfg(test)]
#[path = "params_tests.rs"]
mod tests;
