//! Indentation-layered block extraction around an issue snippet.
//!
//! Starting from the snippet's minimal indentation, each step expands the
//! span outward until the nearest non-blank line with strictly smaller
//! indentation on either side, then continues from the smallest indentation
//! actually found there. Levels that do not exist in the source are never
//! visited, so no two emitted blocks share a span.
//!
//! Indentation is the count of leading ASCII spaces. Tabs are not expanded.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::issue::{Issue, IssueError, IssueRecord};
use crate::infra::io::{read_text, split_lines_keep_ends};

/// One indentation layer around an issue. Line numbers are 1-based and
/// inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block
{
    pub level: usize,
    pub indent: usize,
    #[serde(alias = "start")]
    pub start_line: usize,
    #[serde(alias = "end")]
    pub end_line: usize,
    pub code: String,
}

impl Block
{
    /// Number of lines covered by the block.
    pub fn len(&self) -> usize
    {
        self.end_line + 1 - self.start_line
    }

    pub fn is_empty(&self) -> bool
    {
        self.end_line < self.start_line
    }
}

/// Count of leading ASCII spaces.
#[inline]
pub fn indent_of(line: &str) -> usize
{
    line.bytes()
        .take_while(|&b| b == b' ')
        .count()
}

#[inline]
fn is_blank(line: &str) -> bool
{
    line.trim()
        .is_empty()
}

/// Expand outward from `core_start..=core_end` (0-based, clamped into the
/// file) and return the block hierarchy, innermost first.
///
/// `file_lines` may keep their terminators; `code` is the plain
/// concatenation of the covered lines.
pub fn extract_blocks<S: AsRef<str>>(
    file_lines: &[S],
    core_start: usize,
    core_end: usize,
) -> Vec<Block>
{
    if file_lines.is_empty()
    {
        return Vec::new();
    }

    let n = file_lines.len();
    let core_start = core_start.min(n - 1);
    let core_end = core_end
        .min(n - 1)
        .max(core_start);

    let line = |i: usize| file_lines[i].as_ref();

    let mut cur_indent = (core_start..=core_end)
        .map(line)
        .filter(|l| !is_blank(l))
        .map(indent_of)
        .min()
        .unwrap_or(0);

    let mut blocks = Vec::new();
    let mut cur_start = core_start;
    let mut cur_end = core_end;
    let mut level = 0;

    loop
    {
        let mut next_indent: Option<usize> = None;

        // Upward: stop at the first shallower non-blank line
        let mut new_start = 0;
        for i in (0..cur_start).rev()
        {
            let l = line(i);
            if is_blank(l)
            {
                continue;
            }
            let indent = indent_of(l);
            if indent < cur_indent
            {
                next_indent = Some(indent);
                new_start = i + 1;
                break;
            }
        }

        // Downward, keeping the outermost candidate of both sides
        let mut new_end = n - 1;
        for i in cur_end + 1..n
        {
            let l = line(i);
            if is_blank(l)
            {
                continue;
            }
            let indent = indent_of(l);
            if indent < cur_indent
            {
                next_indent = Some(next_indent.map_or(indent, |up| up.min(indent)));
                new_end = i - 1;
                break;
            }
        }

        let code: String = (new_start..=new_end)
            .map(line)
            .collect();

        blocks.push(Block {
            level,
            indent: cur_indent,
            start_line: new_start + 1,
            end_line: new_end + 1,
            code,
        });

        match next_indent
        {
            Some(indent) =>
            {
                cur_indent = indent;
                cur_start = new_start;
                cur_end = new_end;
                level += 1;
            }
            None => break,
        }
    }

    blocks
}

/// Per-issue block stage over a repository checkout.
#[derive(Debug, Clone)]
pub struct BlockExtractor
{
    repo_root: PathBuf,
}

impl BlockExtractor
{
    pub fn new(repo_root: impl Into<PathBuf>) -> Self
    {
        Self { repo_root: repo_root.into() }
    }

    /// Resolve the issue's file and attach its block hierarchy. Failures are
    /// recorded on the returned record.
    #[instrument(skip_all, fields(issue = issue.issue_key()))]
    pub fn extract_issue(
        &self,
        issue: Issue,
    ) -> IssueRecord
    {
        let rel = issue
            .file_path()
            .unwrap_or("")
            .to_owned();
        let record = IssueRecord::from_issue(issue);

        let path = self
            .repo_root
            .join(&rel);
        if rel.is_empty() || !path.is_file()
        {
            return record.fail(IssueError::SourceNotFound(rel));
        }

        let text = match read_text(&path)
        {
            Ok(text) => text,
            Err(e) =>
            {
                return record.fail(IssueError::Unreadable { path: rel, reason: format!("{e:#}") });
            }
        };

        let lines = split_lines_keep_ends(&text);
        let (core_start, core_end) = core_range(
            record
                .issue
                .start_line(),
            record
                .issue
                .end_line(),
            lines.len(),
        );

        let blocks = extract_blocks(&lines, core_start, core_end);
        debug!(file = %rel, levels = blocks.len(), "extracted blocks");

        IssueRecord { blocks, ..record }
    }
}

/// Convert a 1-based inclusive issue range into clamped 0-based indices.
fn core_range(
    start_line: i64,
    end_line: i64,
    total: usize,
) -> (usize, usize)
{
    let last = total.saturating_sub(1) as i64;
    let start = start_line
        .saturating_sub(1)
        .clamp(0, last) as usize;
    let end = (end_line
        .saturating_sub(1)
        .clamp(0, last) as usize)
        .max(start);
    (start, end)
}
