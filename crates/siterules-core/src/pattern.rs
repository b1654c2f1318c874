//! Pattern compilation shared by cache busters and server rules
//!
//! Cache busters use regular expressions whose capture groups are spliced
//! into a second, target expression. Server rules use globs. Both compile
//! through a [`CompileOnce`] gate so a rule is validated exactly once no
//! matter how many callers race to compile it.

use std::sync::OnceLock;

use globset::{Glob, GlobMatcher};
use regex::Regex;

use crate::error::CompileError;

/// Compile-once cell for a rule's matcher.
///
/// The first call to [`CompileOnce::get_or_compile`] runs the compile
/// closure; every later call (from any thread) returns the cached outcome,
/// including a cached failure.
#[derive(Debug)]
pub struct CompileOnce<T> {
    cell: OnceLock<Result<T, CompileError>>,
}

impl<T> Default for CompileOnce<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CompileOnce<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Compile on first use, otherwise return the cached result
    pub fn get_or_compile<F>(&self, compile: F) -> Result<&T, CompileError>
    where
        F: FnOnce() -> Result<T, CompileError>,
    {
        self.cell.get_or_init(compile).as_ref().map_err(Clone::clone)
    }

    /// The compiled value, if compilation has run and succeeded
    pub fn get(&self) -> Option<&T> {
        self.cell.get().and_then(|r| r.as_ref().ok())
    }

    pub fn is_compiled(&self) -> bool {
        self.get().is_some()
    }
}

impl<T: Clone> Clone for CompileOnce<T> {
    fn clone(&self) -> Self {
        let cell = OnceLock::new();
        if let Some(result) = self.cell.get() {
            let _ = cell.set(result.clone());
        }
        Self { cell }
    }
}

/// A compiled glob together with the text it was compiled from
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
    matcher: GlobMatcher,
}

impl GlobPattern {
    /// Compile a glob expression (`*`, `**`, `?`, `[...]`, `{a,b}`).
    ///
    /// `*` is not bounded by `/`, so `/blog/*` also matches nested paths.
    pub fn compile(pattern: &str) -> Result<Self, CompileError> {
        let glob = Glob::new(pattern).map_err(|source| CompileError::Glob {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.matcher.is_match(candidate)
    }
}

/// Compile a cache buster source expression
pub fn compile_source(pattern: &str) -> Result<Regex, CompileError> {
    Regex::new(pattern).map_err(|source| CompileError::CacheBusterSource {
        pattern: pattern.to_string(),
        source,
    })
}

/// Compile a cache buster target expression after group substitution
pub fn compile_target(pattern: &str) -> Result<Regex, CompileError> {
    Regex::new(pattern).map_err(|source| CompileError::CacheBusterTarget {
        pattern: pattern.to_string(),
        source,
    })
}

/// Capture groups of `re` against `candidate`, in order, excluding the whole
/// match. Groups that did not participate become empty strings.
pub fn capture_groups<'h>(re: &Regex, candidate: &'h str) -> Option<Vec<&'h str>> {
    let caps = re.captures(candidate)?;
    Some(
        caps.iter()
            .skip(1)
            .map(|m| m.map_or("", |m| m.as_str()))
            .collect(),
    )
}

/// Replace `$1`, `$2`, ... in `template` with the given groups using plain
/// text replacement.
///
/// Higher-numbered placeholders are replaced first so `$1` never clobbers
/// the prefix of `$10`.
pub fn substitute_groups(template: &str, groups: &[&str]) -> String {
    let mut out = template.to_string();
    for (i, group) in groups.iter().enumerate().rev() {
        out = out.replace(&format!("${}", i + 1), group);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_substitute_groups() {
        assert_eq!(substitute_groups("$1", &["js"]), "js");
        assert_eq!(substitute_groups("($1|$2)", &["css", "scss"]), "(css|scss)");
        assert_eq!(substitute_groups("no placeholders", &["x"]), "no placeholders");
        // Placeholder without a group stays as written
        assert_eq!(substitute_groups("$1$2", &["a"]), "a$2");
    }

    #[test]
    fn test_substitute_groups_two_digit_placeholder() {
        let groups: Vec<String> = (1..=10).map(|i| format!("g{i}")).collect();
        let groups: Vec<&str> = groups.iter().map(String::as_str).collect();
        assert_eq!(substitute_groups("$10-$1", &groups), "g10-g1");
    }

    #[test]
    fn test_capture_groups() {
        let re = compile_source(r"assets/.*\.(js|ts)(x)?$").unwrap();
        assert_eq!(capture_groups(&re, "assets/app.ts"), Some(vec!["ts", ""]));
        assert_eq!(capture_groups(&re, "assets/app.tsx"), Some(vec!["ts", "x"]));
        assert_eq!(capture_groups(&re, "static/app.ts"), None);
    }

    #[test]
    fn test_invalid_regex_is_compile_error() {
        let err = compile_source("assets/(unclosed").unwrap_err();
        assert!(matches!(err, CompileError::CacheBusterSource { .. }));
        assert_eq!(err.pattern(), "assets/(unclosed");

        let err = compile_target("[").unwrap_err();
        assert!(matches!(err, CompileError::CacheBusterTarget { .. }));
    }

    #[test]
    fn test_glob_matching() {
        let g = GlobPattern::compile("/blog/**").unwrap();
        assert!(g.is_match("/blog/post/"));
        assert!(g.is_match("/blog/2020/01/post/"));
        assert!(!g.is_match("/docs/"));

        let g = GlobPattern::compile("/images/*.{png,jpg}").unwrap();
        assert!(g.is_match("/images/a.png"));
        assert!(g.is_match("/images/b.jpg"));
        assert!(!g.is_match("/images/c.gif"));

        let g = GlobPattern::compile("/v?/").unwrap();
        assert!(g.is_match("/v1/"));
        assert!(!g.is_match("/v10/"));

        let g = GlobPattern::compile("/[ab]/").unwrap();
        assert!(g.is_match("/a/"));
        assert!(!g.is_match("/c/"));

        let g = GlobPattern::compile("**").unwrap();
        assert!(g.is_match("/anything/at/all.html"));
    }

    #[test]
    fn test_invalid_glob_is_compile_error() {
        let err = GlobPattern::compile("/a/[unclosed").unwrap_err();
        assert!(matches!(err, CompileError::Glob { .. }));
        assert_eq!(err.pattern(), "/a/[unclosed");
    }

    #[test]
    fn test_compile_once_runs_closure_once() {
        let calls = AtomicUsize::new(0);
        let once: CompileOnce<Regex> = CompileOnce::new();
        assert!(!once.is_compiled());

        for _ in 0..3 {
            let re = once
                .get_or_compile(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    compile_source("a+")
                })
                .unwrap();
            assert!(re.is_match("aaa"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(once.is_compiled());
    }

    #[test]
    fn test_compile_once_caches_failure() {
        let calls = AtomicUsize::new(0);
        let once: CompileOnce<Regex> = CompileOnce::new();
        for _ in 0..2 {
            let result = once.get_or_compile(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                compile_source("(")
            });
            assert!(result.is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(once.get().is_none());
    }

    #[test]
    fn test_compile_once_racing_threads() {
        let calls = AtomicUsize::new(0);
        let once: CompileOnce<Regex> = CompileOnce::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let re = once
                        .get_or_compile(|| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            compile_source("b+")
                        })
                        .unwrap();
                    assert!(re.is_match("bb"));
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
