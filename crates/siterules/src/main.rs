//! siterules - inspect cache busting, dev server and front matter date rules

use anyhow::{Context, Result, bail};
use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value, json};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::{Config, LoggingConfig};
use siterules_core::{Dates, FrontMatterDescriptor, SiteConfig, UrlPath};

/// Evaluate a site's declarative rules against paths and pages
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "SITERULES_CONFIG", default_value = "config/site.toml")]
    config: String,

    /// Log level, overrides the config file
    #[arg(long, env = "SITERULES_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode and compile every rule section
    Check,

    /// Print the headers the dev server sets for a request path
    Headers { path: String },

    /// Print the redirect the dev server applies to a request path
    Redirect { path: String },

    /// Print the cache buster targets triggered by a changed asset and
    /// which of the given cache keys they bust
    Cachebust {
        path: String,
        /// Resource cache keys to test
        keys: Vec<String>,
    },

    /// Resolve a page's dates from its front matter
    Dates {
        /// The page's base filename, e.g. 2018-02-22-mypage.md
        #[arg(long, default_value = "index.md")]
        filename: String,

        /// Front matter as a JSON object
        #[arg(long, default_value = "{}")]
        frontmatter: String,

        /// File modification time (RFC 3339)
        #[arg(long)]
        modtime: Option<String>,

        /// Git author date (RFC 3339)
        #[arg(long)]
        git_author_date: Option<String>,

        /// Offset used for dates without zone information
        #[arg(long, default_value = "+00:00")]
        location: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_logging(&config.logging);

    debug!("siterules v{}", env!("CARGO_PKG_VERSION"));

    let site = config.site_config()?;

    match args.command {
        Command::Check => check(&site),
        Command::Headers { path } => headers(&site, &path),
        Command::Redirect { path } => redirect(&site, &path),
        Command::Cachebust { path, keys } => cachebust(&site, &path, &keys),
        Command::Dates {
            filename,
            frontmatter,
            modtime,
            git_author_date,
            location,
        } => dates(
            &site,
            &filename,
            &frontmatter,
            modtime.as_deref(),
            git_author_date.as_deref(),
            &location,
        ),
    }
}

/// Initialize logging
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn check(site: &SiteConfig) -> Result<()> {
    info!(
        cache_busters = site.build.cache_busters.len(),
        headers = site.server.headers.len(),
        redirects = site.server.redirects.len(),
        "Site config OK"
    );
    println!("ok");
    Ok(())
}

fn headers(site: &SiteConfig, path: &str) -> Result<()> {
    for header in site.server.match_headers(path) {
        println!("{}: {}", header.key, header.value);
    }
    Ok(())
}

fn redirect(site: &SiteConfig, path: &str) -> Result<()> {
    match site.server.match_redirect(path) {
        Some(r) => println!("{} {} (from {}, force: {})", r.status, r.to, r.from, r.force),
        None => println!("no redirect"),
    }
    Ok(())
}

fn cachebust(site: &SiteConfig, path: &str, keys: &[String]) -> Result<()> {
    let Some(predicate) = site.build.match_cache_buster(path)? else {
        println!("no cache buster matches {}", path);
        return Ok(());
    };

    for target in predicate.targets() {
        println!("target: {}", target);
    }
    for key in keys {
        let verdict = if predicate.matches(key) { "bust" } else { "keep" };
        println!("{}: {}", verdict, key);
    }
    Ok(())
}

fn dates(
    site: &SiteConfig,
    filename: &str,
    frontmatter: &str,
    modtime: Option<&str>,
    git_author_date: Option<&str>,
    location: &str,
) -> Result<()> {
    let location: FixedOffset = location
        .parse()
        .with_context(|| format!("Invalid location offset: {}", location))?;

    let frontmatter: Value =
        serde_json::from_str(frontmatter).context("Front matter must be valid JSON")?;
    let Value::Object(frontmatter) = frontmatter else {
        bail!("Front matter must be a JSON object");
    };
    // Date resolution expects lower-case keys.
    let frontmatter: Map<String, Value> = frontmatter
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect();

    let mut params = Map::new();
    let mut resolved = Dates::default();
    let mut urls = UrlPath::default();

    let mut d = FrontMatterDescriptor {
        frontmatter: &frontmatter,
        base_filename: filename,
        mod_time: parse_timestamp(modtime, "modtime")?,
        git_author_date: parse_timestamp(git_author_date, "git author date")?,
        location,
        params: &mut params,
        dates: &mut resolved,
        page_urls: &mut urls,
    };
    site.frontmatter_handler().resolve_all(&mut d);

    let rfc3339 = |t: Option<DateTime<FixedOffset>>| t.map(|t| t.to_rfc3339());
    let out = json!({
        "date": rfc3339(resolved.date),
        "lastmod": rfc3339(resolved.lastmod),
        "publishDate": rfc3339(resolved.publish_date),
        "expiryDate": rfc3339(resolved.expiry_date),
        "slug": urls.slug,
        "params": params,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn parse_timestamp(value: Option<&str>, what: &str) -> Result<Option<DateTime<FixedOffset>>> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(v).with_context(|| format!("Invalid {}: {}", what, v))
        })
        .transpose()
}
