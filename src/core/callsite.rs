//! Call-site filtering and ranking.
//!
//! Raw search hits for `name(` are narrowed with line-local rules (other
//! definitions, other classes' methods) and scored by repository proximity
//! to the issue file. All functions here are pure.

use std::cmp::Reverse;

use aho_corasick::AhoCorasick;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::infra::paths::{self, HEADER_EXTENSIONS};

/// Base score for any surviving candidate.
pub const BASE_SCORE: i32 = 1;
/// Bonus for living in the issue file's directory.
pub const SAME_DIR_BONUS: i32 = 3;
/// Bonus for sharing only the top-level module (exclusive with `SAME_DIR_BONUS`).
pub const SAME_MODULE_BONUS: i32 = 1;
/// Bonus for including the issue file's header.
pub const HEADER_BONUS: i32 = 3;

/// One candidate invocation of an anchor's function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite
{
    pub file: String,
    pub line: u64,
    pub code: String,
    pub context_start: u64,
    pub context_end: u64,
    pub context: String,
    pub includes: Vec<String>,
    pub includes_bug_header: bool,
    pub same_dir: bool,
    pub same_top_module: bool,
    pub score: i32,
    /// Set on sentinel records (search failure, unreadable file).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallSite
{
    /// Sentinel standing in for a whole failed search.
    pub fn error_marker(message: impl Into<String>) -> Self
    {
        Self { error: Some(message.into()), ..Self::default() }
    }

    /// Hit whose file could not be read back for context.
    pub fn unloadable(
        file: &str,
        line: u64,
        code: &str,
    ) -> Self
    {
        Self {
            file: file.to_owned(),
            line,
            code: code.to_owned(),
            context_start: line,
            context_end: line,
            error: Some("Failed to load file for context.".to_owned()),
            score: 0,
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool
    {
        self.error
            .is_some()
    }
}

/// True if the list is a single search-failure sentinel.
pub fn is_search_failure(sites: &[CallSite]) -> bool
{
    matches!(sites, [only] if only.is_error() && only.file.is_empty())
}

/// Another definition of `func_name` (`Ret Other::Func(...)` without `;`).
pub fn looks_like_definition(
    code_line: &str,
    func_name: &str,
) -> bool
{
    let stripped = code_line.trim();
    if stripped.is_empty()
    {
        return false;
    }
    if !stripped.contains('(') || !stripped.contains(')')
    {
        return false;
    }
    if stripped.ends_with(';')
    {
        return false;
    }
    stripped.contains(&format!("::{func_name}"))
}

/// With a known anchor class, a line qualifying `func_name` by a different
/// class or namespace (`Other::Func`) refers to something else.
pub fn belongs_to_other_class(
    code_line: &str,
    func_name: &str,
    class_name: Option<&str>,
) -> bool
{
    let Some(class_name) = class_name.filter(|c| !c.is_empty())
    else
    {
        return false;
    };

    let stripped = code_line.trim();
    if stripped.contains(&format!("{class_name}::{func_name}"))
    {
        return false;
    }

    let marker = format!("::{func_name}");
    let Some(idx) = stripped.find(&marker)
    else
    {
        return false;
    };
    if idx == 0
    {
        return false;
    }

    let left = stripped[..idx].trim_end();
    let Some(token) = left
        .split_whitespace()
        .last()
    else
    {
        return false;
    };

    // `ns::Class::Func` -> `Class`
    let qualifier = token
        .rsplit("::")
        .next()
        .unwrap_or(token);

    qualifier != class_name
}

/// Leading block of blank, comment, and `#include` lines at the top of a file.
pub fn leading_includes<S: AsRef<str>>(lines: &[S]) -> Vec<String>
{
    lines
        .iter()
        .map(AsRef::as_ref)
        .take_while(|line| {
            let s = line.trim_start();
            s.is_empty() || s.starts_with("//") || s.starts_with("/*") || s.starts_with("#include")
        })
        .map(str::to_owned)
        .collect()
}

/// Matches include lines mentioning `<stem>.h`, `.hpp`, `.hh` or `.hxx`.
#[derive(Debug, Clone)]
pub struct HeaderMatcher
{
    ac: Option<AhoCorasick>,
}

impl HeaderMatcher
{
    pub fn new(header_stem: &str) -> Self
    {
        if header_stem.is_empty()
        {
            return Self { ac: None };
        }

        let patterns: Vec<String> = HEADER_EXTENSIONS
            .iter()
            .map(|ext| format!("{header_stem}.{ext}"))
            .collect();

        Self { ac: AhoCorasick::new(&patterns).ok() }
    }

    pub fn any_match<S: AsRef<str>>(
        &self,
        includes: &[S],
    ) -> bool
    {
        let Some(ac) = &self.ac
        else
        {
            return false;
        };
        includes
            .iter()
            .any(|line| ac.is_match(line.as_ref()))
    }
}

/// Where the issue lives, for proximity signals.
#[derive(Debug, Clone)]
pub struct IssueLocation
{
    dir: String,
    top_module: String,
    header: HeaderMatcher,
}

impl IssueLocation
{
    pub fn new(issue_file: &Utf8Path) -> Self
    {
        Self {
            dir: paths::rel_dir(issue_file).to_owned(),
            top_module: paths::top_module(issue_file).to_owned(),
            header: HeaderMatcher::new(paths::stem(issue_file)),
        }
    }

    pub fn signals<S: AsRef<str>>(
        &self,
        call_file: &Utf8Path,
        includes: &[S],
    ) -> Signals
    {
        // Root-level issue files never count as sharing a dir or module
        let same_dir = !self
            .dir
            .is_empty()
            && paths::rel_dir(call_file) == self.dir;
        let same_top_module = !self
            .top_module
            .is_empty()
            && paths::first_component(call_file) == self.top_module;

        Signals {
            includes_bug_header: self
                .header
                .any_match(includes),
            same_dir,
            same_top_module,
        }
    }
}

/// Ranking signals for one call site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals
{
    pub includes_bug_header: bool,
    pub same_dir: bool,
    pub same_top_module: bool,
}

impl Signals
{
    pub fn score(self) -> i32
    {
        let mut score = BASE_SCORE;
        if self.same_dir
        {
            score += SAME_DIR_BONUS;
        }
        else if self.same_top_module
        {
            score += SAME_MODULE_BONUS;
        }
        if self.includes_bug_header
        {
            score += HEADER_BONUS;
        }
        score
    }
}

/// 1-based window `[line - window, line + window]` clamped to the file, with
/// the covered lines joined by `\n`.
pub fn context_window<S: AsRef<str>>(
    file_lines: &[S],
    line: u64,
    window: usize,
) -> (u64, u64, String)
{
    if file_lines.is_empty()
    {
        return (line, line, String::new());
    }

    let last = file_lines.len() - 1;
    let idx = (line.saturating_sub(1) as usize).min(last);
    let start = idx.saturating_sub(window);
    let end = (idx + window).min(last);

    let text = file_lines[start..=end]
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n");

    (start as u64 + 1, end as u64 + 1, text)
}

/// Highest score first, discovery order on ties, then keep the top `limit`.
pub fn rank(
    mut sites: Vec<CallSite>,
    limit: Option<usize>,
) -> Vec<CallSite>
{
    sites.sort_by_key(|cs| Reverse(cs.score));
    if let Some(limit) = limit.filter(|&n| n > 0)
    {
        sites.truncate(limit);
    }
    sites
}
