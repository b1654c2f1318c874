//! Front matter date resolution
//!
//! Each of a page's four dates (date, lastmod, publishdate, expirydate) is
//! resolved through its own ordered chain of handlers. An identifier in the
//! configuration is either a front matter key or one of the reserved tokens
//! `:filename`, `:filemodtime`, `:git` and `:default`.
//!
//! `:default` expands in place to the field's built-in chain, and every
//! canonical key is followed by its aliases (`lastmod` -> `modified`, ...).

mod handlers;
mod parse;

pub use handlers::{
    DateChain, DateField, DateHandler, Dates, FM_FILENAME, FM_GIT_AUTHOR_DATE, FM_MODTIME,
    FrontMatterDescriptor, UrlPath, date_and_slug_from_base_filename,
};
pub use parse::{DateParser, DefaultDateParser, parse_str};

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ConfigError;

/// Expands to the field's built-in chain
pub const FM_DEFAULT: &str = ":default";

/// How each date is set from front matter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontmatterConfig {
    pub date: Vec<String>,
    pub lastmod: Vec<String>,
    pub publish_date: Vec<String>,
    pub expiry_date: Vec<String>,
}

impl Default for FrontmatterConfig {
    /// The config you get when doing nothing, with aliases expanded
    fn default() -> Self {
        let chain = |field| strings(default_identifiers(field));
        Self {
            date: chain(DateField::Date),
            lastmod: chain(DateField::Lastmod),
            publish_date: chain(DateField::PublishDate),
            expiry_date: chain(DateField::ExpiryDate),
        }
        .expanded()
    }
}

/// Built-in chain for a field, before alias expansion. Also what
/// `:default` expands to.
fn default_identifiers(field: DateField) -> &'static [&'static str] {
    match field {
        DateField::Date => &["date", "publishdate", "lastmod"],
        DateField::Lastmod => &[FM_GIT_AUTHOR_DATE, "lastmod", "date", "publishdate"],
        DateField::PublishDate => &["publishdate", "date"],
        DateField::ExpiryDate => &["expirydate"],
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl FrontmatterConfig {
    pub fn identifiers(&self, field: DateField) -> &[String] {
        match field {
            DateField::Date => &self.date,
            DateField::Lastmod => &self.lastmod,
            DateField::PublishDate => &self.publish_date,
            DateField::ExpiryDate => &self.expiry_date,
        }
    }

    fn identifiers_mut(&mut self, field: DateField) -> &mut Vec<String> {
        match field {
            DateField::Date => &mut self.date,
            DateField::Lastmod => &mut self.lastmod,
            DateField::PublishDate => &mut self.publish_date,
            DateField::ExpiryDate => &mut self.expiry_date,
        }
    }

    /// Decode the `frontmatter` section and expand defaults and aliases.
    ///
    /// Keys are case-insensitive; each value is a string (split on
    /// whitespace) or a list of strings. Identifiers are lower-cased.
    pub fn decode(section: Option<&Value>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match section {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (key, value) in map {
                    if let Some(field) = DateField::from_key(key) {
                        *config.identifiers_mut(field) = to_lower_list(key, value)?;
                    }
                }
            }
            Some(other) => {
                return Err(ConfigError::Frontmatter {
                    key: "frontmatter".to_string(),
                    kind: value_kind(other),
                });
            }
        }

        Ok(config.expanded())
    }

    /// Expand `:default` and add aliases to every chain. Idempotent.
    pub fn expanded(mut self) -> Self {
        for field in DateField::ALL {
            let values = std::mem::take(self.identifiers_mut(field));
            let values = expand_default_values(&values, default_identifiers(field));
            *self.identifiers_mut(field) = add_date_field_aliases(&values);
        }
        self
    }
}

fn expand_default_values(values: &[String], defaults: &[&str]) -> Vec<String> {
    let mut out = Vec::with_capacity(values.len() + defaults.len());
    for v in values {
        if v == FM_DEFAULT {
            out.extend(defaults.iter().map(|d| d.to_string()));
        } else {
            out.push(v.clone());
        }
    }
    out
}

/// Append aliases after each canonical key, keeping first occurrences only
fn add_date_field_aliases(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(values.len());
    let mut push = |v: &str| {
        if seen.insert(v.to_string()) {
            out.push(v.to_string());
        }
    };

    for v in values {
        push(v);
        if let Some(field) = DateField::from_key(v) {
            for alias in field.aliases() {
                push(alias);
            }
        }
    }
    out
}

fn to_lower_list(key: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    let invalid = |kind| ConfigError::Frontmatter {
        key: key.to_string(),
        kind,
    };

    match value {
        Value::String(s) => Ok(s.split_whitespace().map(str::to_lowercase).collect()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.to_lowercase()),
                Value::Number(n) => Ok(n.to_string()),
                Value::Bool(b) => Ok(b.to_string()),
                other => Err(invalid(value_kind(other))),
            })
            .collect(),
        other => Err(invalid(value_kind(other))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

#[derive(Debug, Clone)]
struct DateChains {
    date: DateChain,
    lastmod: DateChain,
    publish_date: DateChain,
    expiry_date: DateChain,
}

impl DateChains {
    fn in_order(&self) -> [&DateChain; 4] {
        [&self.date, &self.lastmod, &self.publish_date, &self.expiry_date]
    }
}

/// Maps front matter into page dates and params.
///
/// A default-constructed handler has no chains; resolving dates with it is a
/// bug and panics.
#[derive(Clone, Default)]
pub struct FrontMatterHandler {
    config: FrontmatterConfig,
    chains: Option<DateChains>,
    // All date keys configured, including any custom ones.
    all_date_keys: HashSet<String>,
    parser: Option<Arc<dyn DateParser>>,
}

impl std::fmt::Debug for FrontMatterHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontMatterHandler")
            .field("config", &self.config)
            .field("chains", &self.chains)
            .field("all_date_keys", &self.all_date_keys)
            .finish_non_exhaustive()
    }
}

impl FrontMatterHandler {
    /// Create a handler using the default date parser
    pub fn new(config: FrontmatterConfig) -> Self {
        Self::with_parser(config, Arc::new(DefaultDateParser))
    }

    /// `:default` and aliases in `config` are expanded before the chains are
    /// built.
    pub fn with_parser(config: FrontmatterConfig, parser: Arc<dyn DateParser>) -> Self {
        let config = config.expanded();
        let all_date_keys = DateField::ALL
            .into_iter()
            .flat_map(|field| config.identifiers(field).iter())
            .filter(|id| matches!(DateHandler::from_identifier(id), DateHandler::Field(_)))
            .cloned()
            .collect();

        let mut handler = Self {
            config,
            chains: None,
            all_date_keys,
            parser: Some(parser),
        };
        handler.create_handlers();
        handler
    }

    fn create_handlers(&mut self) {
        let chain = |field| DateChain::new(field, self.config.identifiers(field));
        self.chains = Some(DateChains {
            date: chain(DateField::Date),
            lastmod: chain(DateField::Lastmod),
            publish_date: chain(DateField::PublishDate),
            expiry_date: chain(DateField::ExpiryDate),
        });
    }

    pub fn config(&self) -> &FrontmatterConfig {
        &self.config
    }

    /// Whether the given front matter key holds a date under this config
    pub fn is_date_key(&self, key: &str) -> bool {
        self.all_date_keys.contains(key)
    }

    /// Resolve all four dates for a page. Requires lower-case front matter
    /// keys. Fields no handler can resolve are left unset.
    ///
    /// # Panics
    ///
    /// If the handler was default-constructed and has no chains.
    pub fn resolve_all(&self, d: &mut FrontMatterDescriptor<'_>) {
        let (Some(chains), Some(parser)) = (&self.chains, &self.parser) else {
            panic!("missing date handler: front matter handler used before its chains were built");
        };

        for chain in chains.in_order() {
            chain.resolve(d, parser.as_ref());
        }
    }
}
