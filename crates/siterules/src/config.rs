//! Configuration loading

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::info;

use siterules_core::SiteConfig;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Main configuration: the `[logging]` table plus the raw site tree the
/// rule sections are decoded from.
#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub site: Value,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            site: Value::Object(Default::default()),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content)?;
        let site = serde_json::to_value(table)?;

        let logging = match site.get("logging") {
            Some(section) => LoggingConfig::deserialize(section)
                .context("Invalid [logging] section")?,
            None => LoggingConfig::default(),
        };

        Ok(Self { logging, site })
    }

    /// Decode and compile the rule sections
    pub fn site_config(&self) -> Result<SiteConfig> {
        let site = SiteConfig::decode(&self.site).context("Invalid site config")?;
        site.compile().context("Failed to compile site config")?;
        Ok(site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let config = Config::load(path.to_str().unwrap()).unwrap();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
        let site = config.site_config().unwrap();
        assert_eq!(site.build.cache_busters.len(), 4);
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[logging]
level = "debug"
format = "json"

[build]
useResourceCacheWhen = "always"

[[build.cacheBusters]]
source = "assets/(.*)\\.scss"
target = "$1"

[[server.headers]]
for = "/**"
[server.headers.values]
X-Frame-Options = "DENY"

[[server.redirects]]
from = "/old/**"
to = "/new/index.html"
status = 301

[frontmatter]
lastmod = ["lastmod", ":fileModTime"]
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");

        let site = config.site_config().unwrap();
        assert!(site.build.use_resource_cache(false));
        assert_eq!(site.build.cache_busters.len(), 1);
        assert_eq!(site.server.redirects[0].to, "/new/");
        assert_eq!(site.server.match_headers("/a/b").len(), 1);
        assert_eq!(
            site.frontmatter.lastmod,
            vec!["lastmod", "modified", ":filemodtime"]
        );
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[build\nbroken").unwrap();
        assert!(Config::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_site_config_reports_bad_redirect() {
        let config = Config::from_toml(
            r#"
[[server.redirects]]
from = "/a"
to = "/blog"
status = 301
"#,
        )
        .unwrap();
        let err = config.site_config().unwrap_err();
        assert!(format!("{:#}", err).contains("unsupported redirect"));
    }
}
