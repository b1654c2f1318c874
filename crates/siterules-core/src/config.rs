//! Site-wide rule configuration
//!
//! Ties the `build`, `server` and `frontmatter` sections together. The bin
//! crate loads the file; this module only sees the generic value tree.

use serde_json::{Map, Value};
use tracing::debug;

use crate::build::BuildConfig;
use crate::error::ConfigError;
use crate::frontmatter::{FrontMatterHandler, FrontmatterConfig};
use crate::server::ServerConfig;

/// All decoded rule sections
#[derive(Debug, Clone, Default)]
pub struct SiteConfig {
    pub build: BuildConfig,
    pub server: ServerConfig,
    pub frontmatter: FrontmatterConfig,
}

impl SiteConfig {
    /// Decode from the root of the site configuration. Missing sections get
    /// their defaults.
    pub fn decode(root: &Value) -> Result<Self, ConfigError> {
        let empty = Map::new();
        let root = root.as_object().unwrap_or(&empty);

        let config = Self {
            build: BuildConfig::decode(section(root, "build")),
            server: ServerConfig::decode(section(root, "server"))?,
            frontmatter: FrontmatterConfig::decode(section(root, "frontmatter"))?,
        };
        debug!(
            cache_busters = config.build.cache_busters.len(),
            headers = config.server.headers.len(),
            redirects = config.server.redirects.len(),
            "Decoded site config"
        );
        Ok(config)
    }

    /// Compile every pattern so errors surface before the first match
    pub fn compile(&self) -> Result<(), ConfigError> {
        self.build.compile_config()?;
        self.server.compile_config().map_err(ConfigError::Server)?;
        Ok(())
    }

    /// A date handler with its chains built from the front matter section
    pub fn frontmatter_handler(&self) -> FrontMatterHandler {
        FrontMatterHandler::new(self.frontmatter.clone())
    }
}

/// Case-insensitive section lookup
fn section<'a>(root: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    root.get(name).or_else(|| {
        root.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

/// Lower-case the keys of a section, and of every object in the named lists.
///
/// Only the rule fields are folded; free-form maps such as header values keep
/// their case.
pub(crate) fn lower_case_keys(section: &Value, lists: &[&str]) -> Value {
    let Value::Object(map) = section else {
        return section.clone();
    };

    let folded = map
        .iter()
        .map(|(k, v)| {
            let key = k.to_lowercase();
            let value = match v {
                Value::Array(items) if lists.contains(&key.as_str()) => {
                    Value::Array(items.iter().map(|item| lower_case_keys(item, &[])).collect())
                }
                other => other.clone(),
            };
            (key, value)
        })
        .collect();
    Value::Object(folded)
}
