//! Site Rules Core
//!
//! This crate provides the declarative rule engines of a static site
//! builder: cache busting on asset changes, dev server headers and
//! redirects, and front matter date resolution.

pub mod build;
pub mod config;
pub mod error;
pub mod frontmatter;
pub mod pattern;
pub mod server;

pub use build::{BuildConfig, CacheBuster, CacheBusterPredicate, ResourceCacheMode};
pub use config::SiteConfig;
pub use error::{CompileError, ConfigError, DateParseError, FrontMatterError};
pub use frontmatter::{
    DateField, DateParser, Dates, DefaultDateParser, FrontMatterDescriptor, FrontMatterHandler,
    FrontmatterConfig, UrlPath,
};
pub use pattern::{CompileOnce, GlobPattern};
pub use server::{Headers, KeyValue, Redirect, ServerConfig};
