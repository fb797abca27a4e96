use std::collections::BTreeMap;
use std::fmt;

use switchboard_core::{Error, Result};

/// Values bound to `:name` parameters, keyed by name without the colon
pub type Params = BTreeMap<String, String>;

/// One `/`-separated piece of a route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the path segment exactly
    Literal(String),
    /// `*`: any single segment, binds nothing
    Wildcard,
    /// `:name`: any single segment, bound to `name`
    Param(String),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(text) => f.write_str(text),
            Segment::Wildcard => f.write_str("*"),
            Segment::Param(name) => write!(f, ":{name}"),
        }
    }
}

/// `:name` placeholder text, if `text` is one
pub(crate) fn placeholder_name(text: &str) -> Option<&str> {
    let name = text.strip_prefix(':')?;
    is_param_name(name).then_some(name)
}

/// Names start with a letter or digit; the rest of the segment is kept as is
fn is_param_name(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_alphanumeric())
}

/// Split a path into its non-empty segments, ignoring one trailing slash
pub fn split_path(path: &str) -> Vec<&str> {
    let path = match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    };
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// A parsed route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(source: &str) -> Result<Self> {
        let reject = |reason: String| Error::RouteConfig {
            pattern: source.to_string(),
            reason,
        };

        if source.trim().is_empty() {
            return Err(reject("pattern is empty".into()));
        }

        let mut segments = Vec::new();
        let mut seen = Vec::new();
        for raw in split_path(source) {
            let segment = match raw {
                "*" => Segment::Wildcard,
                _ if placeholder_name(raw).is_some() => {
                    let name = &raw[1..];
                    if seen.contains(&name) {
                        return Err(reject(format!("parameter ':{name}' appears twice")));
                    }
                    seen.push(name);
                    Segment::Param(name.to_string())
                }
                _ => Segment::Literal(raw.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The pattern as it was registered
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether this is the lone `*` pattern that matches every path
    pub fn is_catch_all(&self) -> bool {
        matches!(self.segments.as_slice(), [Segment::Wildcard])
    }

    /// Match split path segments, returning the parameter bindings
    pub fn bind(&self, path: &[&str]) -> Option<Params> {
        if self.is_catch_all() {
            return Some(Params::new());
        }
        if self.segments.len() != path.len() {
            return None;
        }

        let mut params = Params::new();
        for (segment, part) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(text) if text == part => {}
                Segment::Literal(_) => return None,
                Segment::Wildcard => {}
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }
        Some(params)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
