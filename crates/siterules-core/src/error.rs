//! Core error types

use thiserror::Error;

/// A declared pattern that failed to compile.
///
/// Cloneable so a cached compile failure can be handed back on every later
/// compile call without re-running validation.
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("failed to compile cache buster source {pattern:?}: {source}")]
    CacheBusterSource {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to compile cache buster target {pattern:?}: {source}")]
    CacheBusterTarget {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to compile glob {pattern:?}: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

impl CompileError {
    /// The pattern text that failed to compile.
    pub fn pattern(&self) -> &str {
        match self {
            CompileError::CacheBusterSource { pattern, .. }
            | CompileError::CacheBusterTarget { pattern, .. }
            | CompileError::Glob { pattern, .. } => pattern,
        }
    }
}

/// Configuration decode and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to compile cache buster {source_pattern:?}: {error}")]
    CacheBuster {
        source_pattern: String,
        #[source]
        error: CompileError,
    },

    #[error("invalid server config: {0}")]
    Server(#[source] CompileError),

    #[error(
        "unsupported redirect to value {0:?} in server config; currently this must be either a remote destination or a local folder, e.g. \"/blog/\" or \"/blog/index.html\""
    )]
    UnsupportedRedirect(String),

    #[error("invalid front matter config for {key:?}: expected a string or a list of strings, got {kind}")]
    Frontmatter { key: String, kind: &'static str },

    #[error("invalid {section} section: {source}")]
    Decode {
        section: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Soft failure of the date parser
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateParseError {
    #[error("unable to parse date: {0:?}")]
    Unparseable(String),

    #[error("unsupported date value type: {0}")]
    UnsupportedType(&'static str),

    #[error("date is ambiguous or invalid in the given location: {0:?}")]
    InvalidLocalTime(String),
}

/// Handler-level failures inside a date chain
#[derive(Error, Debug)]
pub enum FrontMatterError {
    #[error("front matter field {key:?} holds a {kind}, expected a date")]
    NotADate { key: String, kind: &'static str },
}
