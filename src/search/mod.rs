//! Repository-wide text search capability.
//!
//! The scanner only needs "every line matching this regex, with file and line
//! number". [`TextSearch`] is that seam: [`RipgrepSearch`] shells out to `rg`,
//! [`BuiltinSearch`] runs the same kind of search in-process, and tests plug
//! in an in-memory fake.

use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod builtin;
pub mod ripgrep;

pub use builtin::BuiltinSearch;
pub use ripgrep::RipgrepSearch;

/// One matching line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch
{
    /// Path as reported by the backend (usually `root`-prefixed).
    pub path: PathBuf,
    /// 1-based line number.
    pub line: u64,
    /// Matched line without its terminator.
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError
{
    #[error("ripgrep ({0}) not found in PATH.")]
    ToolUnavailable(String),

    #[error("search timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("rg failed with code {code}: {stderr}")]
    Failed
    {
        code: i32,
        stderr: String,
    },

    #[error("invalid search pattern: {0}")]
    InvalidPattern(String),

    #[error("search I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Line-oriented regex search over a directory tree.
///
/// A search with no hits is `Ok(vec![])`, never an error. Implementations
/// must be callable from several threads at once.
pub trait TextSearch: Send + Sync
{
    fn search(
        &self,
        pattern: &str,
        root: &Path,
    ) -> Result<Vec<SearchMatch>, SearchError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Regex for a call of `func_name`: the whole-word name, optional
/// whitespace, then `(`.
///
/// Only the start of the name is word-bounded. A trailing word boundary
/// after `(` would reject `Foo(x)` and `Foo()` depending on what follows.
pub fn call_pattern(func_name: &str) -> String
{
    let escaped = regex::escape(func_name);
    let starts_with_word = func_name
        .chars()
        .next()
        .is_some_and(|c| c == '_' || c.is_alphanumeric());

    if starts_with_word
    {
        format!(r"\b{escaped}\s*\(")
    }
    else
    {
        format!(r"{escaped}\s*\(")
    }
}
