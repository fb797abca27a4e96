use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use switchboard_core::{Error, Result};

use crate::pattern::{placeholder_name, split_path, Params, Pattern};

/// A registered pattern and the target it resolves to
#[derive(Debug, Clone)]
pub struct Route {
    pub pattern: Pattern,
    pub target: Value,
}

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Target with every bound `:name` placeholder substituted
    pub target: Value,
    pub params: Params,
}

/// Ordered table of path patterns
///
/// Lookups scan the table newest first, so a later route shadows an earlier
/// one that also matches. Registering a pattern again replaces its target
/// but keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

#[derive(Deserialize)]
struct RouteFile {
    #[serde(default, rename = "route")]
    routes: Vec<RouteEntry>,
}

#[derive(Deserialize)]
struct RouteEntry {
    pattern: String,
    target: Value,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a router from `[[route]]` tables with `pattern` and `target` keys
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RouteFile = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;

        let mut router = Self::new();
        for entry in file.routes {
            router.add(&entry.pattern, entry.target)?;
        }
        Ok(router)
    }

    /// Load a route table from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read routes file {path:?}: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Register `pattern`, resolving to `target`
    pub fn add(&mut self, pattern: &str, target: Value) -> Result<()> {
        let pattern = Pattern::parse(pattern).map_err(|err| {
            error!(pattern, error = %err, "Routing table is not set up correctly");
            err
        })?;

        match self.routes.iter_mut().find(|route| route.pattern == pattern) {
            Some(route) => route.target = target,
            None => self.routes.push(Route { pattern, target }),
        }
        Ok(())
    }

    /// Find the newest route matching `path`
    ///
    /// `None` means no route applies and the caller should fall back to
    /// positional parsing of the path.
    pub fn resolve(&self, path: &str) -> Option<Match> {
        let segments = split_path(path);

        self.routes.iter().rev().find_map(|route| {
            let params = route.pattern.bind(&segments)?;
            debug!(path, pattern = %route.pattern, "Route matched");
            Some(Match {
                target: substitute(&route.target, &params).unwrap_or(Value::Null),
                params,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes in registration order
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
}

/// Replace placeholders in `value`; `None` when `value` is an unbound placeholder
fn substitute(value: &Value, params: &Params) -> Option<Value> {
    match value {
        Value::String(text) => match placeholder_name(text) {
            Some(name) => params.get(name).cloned().map(Value::String),
            None => Some(value.clone()),
        },
        Value::Array(items) => Some(Value::Array(
            items.iter().filter_map(|item| substitute(item, params)).collect(),
        )),
        Value::Object(fields) => Some(Value::Object(
            fields
                .iter()
                .filter_map(|(key, item)| Some((key.clone(), substitute(item, params)?)))
                .collect(),
        )),
        other => Some(other.clone()),
    }
}
