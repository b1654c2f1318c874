//! Build configuration and cache-buster matching
//!
//! A cache buster pairs a source regexp, tested against a changed asset
//! path, with a target regexp, tested against resource cache keys. Capture
//! groups from the source match are spliced into the target (`$1`, `$2`, ...)
//! before the target is compiled.
//!
//! Every configured buster whose source matches contributes its target; a
//! cache key is busted if it matches any of them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, warn};

use crate::config::lower_case_keys;
use crate::error::{CompileError, ConfigError};
use crate::pattern::{self, CompileOnce};

/// Keep this a little coarse grained, some false positives are OK.
pub const CSS_TARGET_CACHEBUSTER_RE: &str = "(css|styles|scss|sass)";

/// Target for JavaScript-like sources
pub const JS_TARGET_CACHEBUSTER_RE: &str = "(js|scripts|javascript)";

/// The built-in cache busters, in evaluation order.
pub const DEFAULT_CACHE_BUSTERS: [(&str, &str); 4] = [
    (r"assets/.*\.(js|ts|jsx|tsx)", JS_TARGET_CACHEBUSTER_RE),
    (r"assets/.*\.(css|sass|scss)$", CSS_TARGET_CACHEBUSTER_RE),
    (r"(postcss|tailwind)\.config\.js", CSS_TARGET_CACHEBUSTER_RE),
    // Deliberately coarse: a changed .js file also busts keys containing "json".
    (r"assets/.*\.(.*)$", "$1"),
];

/// Error type for parsing a resource cache mode
#[derive(Debug, Clone)]
pub struct ParseResourceCacheModeError(String);

impl fmt::Display for ParseResourceCacheModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid resource cache mode: {}", self.0)
    }
}

impl std::error::Error for ParseResourceCacheModeError {}

/// When to use the resource cache for resources that cannot be built locally
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCacheMode {
    Never,
    /// Only when the build feature is not available
    #[default]
    Fallback,
    Always,
}

impl ResourceCacheMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCacheMode::Never => "never",
            ResourceCacheMode::Fallback => "fallback",
            ResourceCacheMode::Always => "always",
        }
    }
}

impl FromStr for ResourceCacheMode {
    type Err = ParseResourceCacheModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "never" => Ok(ResourceCacheMode::Never),
            "fallback" => Ok(ResourceCacheMode::Fallback),
            "always" => Ok(ResourceCacheMode::Always),
            _ => Err(ParseResourceCacheModeError(s.to_string())),
        }
    }
}

/// Cache busting rule for assets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheBuster {
    /// Trigger for files matching this regexp
    pub source: String,
    /// Cache bust targets matching this regexp. May contain group
    /// references (`$1`) from the source regexp.
    pub target: String,
    #[serde(skip)]
    compiled: CompileOnce<Regex>,
}

impl CacheBuster {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            compiled: CompileOnce::new(),
        }
    }

    /// Compile the source regexp. A no-op once compiled.
    pub fn compile_config(&self) -> Result<(), CompileError> {
        self.source_regex().map(|_| ())
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_compiled()
    }

    fn source_regex(&self) -> Result<&Regex, CompileError> {
        self.compiled
            .get_or_compile(|| pattern::compile_source(&self.source))
    }

    /// If `path` matches the source, the target compiled with the source's
    /// capture groups substituted in.
    fn triggered_target(&self, path: &str) -> Result<Option<TargetMatcher>, CompileError> {
        let source_re = self.source_regex()?;
        let Some(groups) = pattern::capture_groups(source_re, path) else {
            debug!(
                "cachebuster: Matching {:?} with source {:?}: no match",
                path, self.source
            );
            return Ok(None);
        };
        debug!(
            "cachebuster: Matching {:?} with source {:?}: match!",
            path, self.source
        );

        let target = pattern::substitute_groups(&self.target, &groups);
        let re = pattern::compile_target(&target)?;
        Ok(Some(TargetMatcher { target, re }))
    }
}

#[derive(Debug, Clone)]
struct TargetMatcher {
    target: String,
    re: Regex,
}

impl TargetMatcher {
    fn is_match(&self, cache_key: &str) -> bool {
        let matched = self.re.is_match(cache_key);
        debug!(
            "cachebuster: Matching {:?} with target {:?}: {}",
            cache_key,
            self.target,
            if matched { "match!" } else { "no match" }
        );
        matched
    }
}

/// Decides whether a resource cache key must be invalidated after an asset
/// changed. Matches if any triggered target matches.
#[derive(Debug, Clone)]
pub struct CacheBusterPredicate {
    targets: Vec<TargetMatcher>,
}

impl CacheBusterPredicate {
    pub fn matches(&self, cache_key: &str) -> bool {
        self.targets.iter().any(|t| t.is_match(cache_key))
    }

    /// The substituted target patterns, in rule order
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.target.as_str())
    }
}

/// Build related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildConfig {
    /// never, fallback or always
    pub use_resource_cache_when: ResourceCacheMode,
    /// Collect and write aggregated build stats
    pub write_stats: bool,
    /// Toggle off writing of the assets jsconfig file
    #[serde(rename = "noJSConfigInAssets", alias = "noJsConfigInAssets")]
    pub no_js_config_in_assets: bool,
    /// How the resource cache gets evicted on rebuilds
    pub cache_busters: Vec<CacheBuster>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            use_resource_cache_when: ResourceCacheMode::Fallback,
            write_stats: false,
            no_js_config_in_assets: false,
            cache_busters: DEFAULT_CACHE_BUSTERS
                .iter()
                .map(|(source, target)| CacheBuster::new(*source, *target))
                .collect(),
        }
    }
}

/// Intermediate shape so an unknown `useResourceCacheWhen` falls back to the
/// default instead of failing the whole section. Keys are lower-cased before
/// decoding.
#[derive(Deserialize)]
struct RawBuildConfig {
    #[serde(rename = "useresourcecachewhen")]
    use_resource_cache_when: Option<String>,
    #[serde(rename = "writestats")]
    write_stats: Option<bool>,
    #[serde(rename = "nojsconfiginassets")]
    no_js_config_in_assets: Option<bool>,
    #[serde(rename = "cachebusters")]
    cache_busters: Option<Vec<CacheBuster>>,
}

impl BuildConfig {
    /// Decode the `build` section, starting from the defaults.
    ///
    /// A section that cannot be decoded yields the default configuration.
    pub fn decode(section: Option<&Value>) -> Self {
        let mut config = Self::default();
        let Some(section) = section else {
            return config;
        };

        let section = lower_case_keys(section, &["cachebusters"]);
        let raw: RawBuildConfig = match RawBuildConfig::deserialize(&section) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Invalid build config, using defaults: {}", e);
                return config;
            }
        };

        if let Some(when) = raw.use_resource_cache_when {
            config.use_resource_cache_when = when.parse().unwrap_or_else(|e| {
                warn!("{}, using fallback", e);
                ResourceCacheMode::Fallback
            });
        }
        if let Some(write_stats) = raw.write_stats {
            config.write_stats = write_stats;
        }
        if let Some(no_js_config) = raw.no_js_config_in_assets {
            config.no_js_config_in_assets = no_js_config;
        }
        if let Some(cache_busters) = raw.cache_busters {
            config.cache_busters = cache_busters;
        }
        config
    }

    /// Whether to fall back to the resource cache given why the local build
    /// failed.
    pub fn use_resource_cache(&self, feature_not_available: bool) -> bool {
        match self.use_resource_cache_when {
            ResourceCacheMode::Never => false,
            ResourceCacheMode::Fallback => feature_not_available,
            ResourceCacheMode::Always => true,
        }
    }

    /// Compile every cache buster source. Idempotent.
    pub fn compile_config(&self) -> Result<(), ConfigError> {
        for cb in &self.cache_busters {
            cb.compile_config()
                .map_err(|error| ConfigError::CacheBuster {
                    source_pattern: cb.source.clone(),
                    error,
                })?;
        }
        Ok(())
    }

    /// The cache buster predicate for a changed asset path, or `None` if no
    /// configured source matches it.
    ///
    /// A rule whose substituted target does not compile is logged and
    /// skipped; the other triggered rules still contribute. An invalid
    /// source is an error.
    pub fn match_cache_buster(
        &self,
        path: &str,
    ) -> Result<Option<CacheBusterPredicate>, CompileError> {
        let mut targets = Vec::new();
        for cb in &self.cache_busters {
            match cb.triggered_target(path) {
                Ok(Some(target)) => targets.push(target),
                Ok(None) => {}
                Err(e @ CompileError::CacheBusterTarget { .. }) => {
                    error!("cachebuster: source {:?} matched {:?}: {}", cb.source, path, e);
                }
                Err(e) => return Err(e),
            }
        }

        if targets.is_empty() {
            return Ok(None);
        }
        Ok(Some(CacheBusterPredicate { targets }))
    }
}
