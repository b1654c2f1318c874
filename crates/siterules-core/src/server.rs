//! Dev server header and redirect rules
//!
//! Header rules aggregate: every rule whose glob matches a request path
//! contributes all of its values. Redirect rules are first-match in
//! declaration order, except that a rule pointing at the request path itself
//! suppresses redirection for that path entirely.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::lower_case_keys;
use crate::error::{CompileError, ConfigError};
use crate::pattern::{CompileOnce, GlobPattern};

const INDEX_HTML: &str = "index.html";

/// Status code for the synthesized not-found redirect
pub const NOT_FOUND_STATUS: u16 = 404;

/// Headers to set for request paths matching a glob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Headers {
    #[serde(rename = "for")]
    pub for_pattern: String,
    #[serde(default)]
    pub values: Map<String, Value>,
}

/// A redirect (or rewrite) rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub from: String,
    pub to: String,
    /// HTTP status code to use for the redirect. A status code of 200
    /// triggers a URL rewrite.
    #[serde(default)]
    pub status: u16,
    /// Redirect even if the original request path exists
    #[serde(default)]
    pub force: bool,
}

impl Redirect {
    /// Catch-all rule serving the not-found page
    pub fn not_found() -> Self {
        Self {
            from: "**".to_string(),
            to: "/404.html".to_string(),
            status: NOT_FOUND_STATUS,
            force: false,
        }
    }
}

/// A header key and its stringified value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledServer {
    headers: Vec<GlobPattern>,
    redirects: Vec<GlobPattern>,
}

/// Config for the dev server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub headers: Vec<Headers>,
    #[serde(default)]
    pub redirects: Vec<Redirect>,
    #[serde(skip)]
    compiled: CompileOnce<CompiledServer>,
}

impl Default for ServerConfig {
    /// No headers and the catch-all not-found redirect, same as decoding an
    /// empty section
    fn default() -> Self {
        Self::new(Vec::new(), vec![Redirect::not_found()])
    }
}

impl ServerConfig {
    /// Rules as given, without decode-time validation or the synthesized
    /// not-found redirect
    pub fn new(headers: Vec<Headers>, redirects: Vec<Redirect>) -> Self {
        Self {
            headers,
            redirects,
            compiled: CompileOnce::new(),
        }
    }

    /// Decode and validate the `server` section.
    ///
    /// Non-404 redirect destinations have a trailing `index.html` stripped
    /// and must then be either remote (`https`) or end with a slash; a
    /// missing redirect list gets a catch-all 404 rule.
    pub fn decode(section: Option<&Value>) -> Result<Self, ConfigError> {
        let mut config = match section {
            Some(section) => Self::deserialize(&lower_case_keys(section, &["headers", "redirects"]))
                .map_err(|source| ConfigError::Decode {
                    section: "server",
                    source,
                })?,
            None => Self::default(),
        };

        for redirect in &mut config.redirects {
            // 404s are always "ugly", keep them as is.
            if redirect.status == NOT_FOUND_STATUS {
                continue;
            }
            if let Some(trimmed) = redirect.to.strip_suffix(INDEX_HTML) {
                redirect.to = trimmed.to_string();
            }
            // Targets without a trailing slash can redirect in a loop.
            if !redirect.to.starts_with("https") && !redirect.to.ends_with('/') {
                return Err(ConfigError::UnsupportedRedirect(redirect.to.clone()));
            }
        }

        if config.redirects.is_empty() {
            config.redirects.push(Redirect::not_found());
        }

        Ok(config)
    }

    /// Compile the header and redirect globs. A no-op once compiled.
    pub fn compile_config(&self) -> Result<(), CompileError> {
        self.compiled
            .get_or_compile(|| {
                let headers = self
                    .headers
                    .iter()
                    .map(|h| GlobPattern::compile(&h.for_pattern))
                    .collect::<Result<Vec<_>, _>>()?;
                let redirects = self
                    .redirects
                    .iter()
                    .map(|r| GlobPattern::compile(&r.from))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CompiledServer { headers, redirects })
            })
            .map(|_| ())
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_compiled()
    }

    /// All header values from every rule matching `path`, sorted by key.
    ///
    /// Duplicate keys from different rules are all kept. Empty until
    /// [`ServerConfig::compile_config`] has run.
    pub fn match_headers(&self, path: &str) -> Vec<KeyValue> {
        let Some(compiled) = self.compiled.get() else {
            return Vec::new();
        };

        let mut matches: Vec<KeyValue> = compiled
            .headers
            .iter()
            .zip(&self.headers)
            .filter(|(glob, _)| glob.is_match(path))
            .flat_map(|(_, h)| {
                h.values
                    .iter()
                    .map(|(k, v)| KeyValue::new(k.as_str(), value_to_string(v)))
            })
            .collect();

        matches.sort_by(|a, b| a.key.cmp(&b.key));
        matches
    }

    /// The first redirect rule matching `path`, if any.
    ///
    /// A trailing `index.html` is stripped from `path` first. If a rule's
    /// destination equals the path, no redirect is returned at all, even if a
    /// later rule would match. `None` until compiled.
    pub fn match_redirect(&self, path: &str) -> Option<&Redirect> {
        let compiled = self.compiled.get()?;
        let path = path.strip_suffix(INDEX_HTML).unwrap_or(path);

        for (glob, redirect) in compiled.redirects.iter().zip(&self.redirects) {
            // No redirect to self.
            if redirect.to == path {
                debug!("redirect: {:?} points to itself, not redirecting", path);
                return None;
            }

            if glob.is_match(path) {
                debug!(
                    "redirect: {:?} matched {:?} -> {:?} ({})",
                    path,
                    glob.as_str(),
                    redirect.to,
                    redirect.status
                );
                return Some(redirect);
            }
        }

        None
    }
}

/// Header values are free-form in config; the server needs strings.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
