//! Anchor stage: enclosing function, bug context and ranked call sites.
//!
//! [`ReferenceScanner`] is the session object for one batch run. It owns the
//! file-content cache and the call-site cache, so separate scanners never
//! share state and tests can run side by side.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use moka::sync::Cache;
use tracing::{debug, instrument, warn};

use crate::core::anchor::{build_bug_context, find_enclosing_function};
use crate::core::callsite::{
    self, CallSite, IssueLocation, belongs_to_other_class, context_window, leading_includes, looks_like_definition,
};
use crate::core::issue::{IssueError, IssueRecord, IssueStatus};
use crate::infra::io::read_text;
use crate::infra::paths;
use crate::search::{TextSearch, call_pattern};

/// Directory names whose files never count as call sites.
pub const DEFAULT_EXCLUDED_DIRS: [&str; 9] =
    ["test", "tests", "testing", "example", "examples", "demo", "demos", "tool", "tools"];

const FILE_CACHE_CAPACITY: u64 = 50_000;
const CALL_SITE_CACHE_CAPACITY: u64 = 10_000;

type FileLines = Option<Arc<Vec<String>>>;
type CallSiteKey = (String, String);

/// Tunables for the anchor stage.
#[derive(Debug, Clone)]
pub struct ScanOptions
{
    /// Lines scanned upward from the issue for a function header.
    pub search_window: usize,
    /// Lines of context on each side of the issue and of each call site.
    pub context_window: usize,
    /// Keep at most this many call sites per anchor.
    pub max_call_sites: Option<usize>,
    /// Drop matches in `.h/.hpp/.hh/.hxx` files.
    pub ignore_headers: bool,
    /// Directory names excluded from call sites (any path component).
    pub excluded_dirs: Vec<String>,
}

impl Default for ScanOptions
{
    fn default() -> Self
    {
        Self {
            search_window: 200,
            context_window: 6,
            max_call_sites: None,
            ignore_headers: true,
            excluded_dirs: DEFAULT_EXCLUDED_DIRS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

pub struct ReferenceScanner
{
    repo_root: PathBuf,
    options: ScanOptions,
    search: Arc<dyn TextSearch>,
    /// Repo-relative path -> lines without terminators; `None` if unreadable.
    files: Cache<String, FileLines>,
    /// `(function name, defining file basename)` -> ranked call sites.
    call_sites: Cache<CallSiteKey, Arc<Vec<CallSite>>>,
    searches: AtomicUsize,
}

impl ReferenceScanner
{
    pub fn new(
        repo_root: impl Into<PathBuf>,
        mut options: ScanOptions,
        search: Arc<dyn TextSearch>,
    ) -> Self
    {
        options.search_window = options
            .search_window
            .max(1);
        options.context_window = options
            .context_window
            .max(1);
        for dir in &mut options.excluded_dirs
        {
            *dir = dir.to_ascii_lowercase();
        }

        Self {
            repo_root: repo_root.into(),
            options,
            search,
            files: Cache::new(FILE_CACHE_CAPACITY),
            call_sites: Cache::new(CALL_SITE_CACHE_CAPACITY),
            searches: AtomicUsize::new(0),
        }
    }

    /// Number of repository searches actually executed (cache misses).
    pub fn searches(&self) -> usize
    {
        self.searches
            .load(Ordering::Relaxed)
    }

    /// Attach the anchor for one issue. Never fails: problems are recorded
    /// as `context_status`/`context_error` on the returned record.
    #[instrument(skip_all, fields(issue = record.issue.issue_key()))]
    pub fn scan_issue(
        &self,
        mut record: IssueRecord,
    ) -> IssueRecord
    {
        // The block stage already explained why this issue has nothing to scan
        if record.blocks.is_empty() && record.is_error()
        {
            return record;
        }

        let Some(file_path) = record
            .issue
            .file_path()
            .map(str::to_owned)
        else
        {
            return record.fail(IssueError::MissingFilePath);
        };

        let Some(whole_file) = record
            .blocks
            .last()
        else
        {
            return record.fail(IssueError::MissingBlocks);
        };

        let bug_start = record
            .issue
            .start_line();
        let bug_end = record
            .issue
            .end_line();

        let Some(mut anchor) = find_enclosing_function(
            whole_file,
            bug_start,
            bug_end,
            &file_path,
            self.options
                .search_window,
        )
        else
        {
            debug!(file = %file_path, line = bug_start, "no enclosing function");
            return record.fail(IssueError::NoEnclosingFunction);
        };

        anchor.bug_context = build_bug_context(
            whole_file,
            bug_start,
            bug_end,
            self.options
                .context_window,
        );
        anchor.def_includes = self
            .file_lines(&file_path)
            .map(|lines| leading_includes(lines.as_slice()))
            .unwrap_or_default();

        let sites = self.call_sites_for(
            &anchor.name,
            &anchor.def_file,
            &file_path,
            anchor
                .class_name
                .as_deref(),
        );
        anchor.call_sites = sites
            .as_ref()
            .clone();

        debug!(
            function = %anchor.name,
            class = anchor.class_name.as_deref().unwrap_or(""),
            call_sites = anchor.call_sites.len(),
            "anchor resolved"
        );

        record.anchor = Some(anchor);
        record.status = Some(IssueStatus::Resolved);
        record.error = None;
        record
    }

    /// Cached call sites for `func_name` defined in `def_file`.
    ///
    /// The entry is keyed by function name and defining file basename; the
    /// proximity signals come from whichever issue populated it first.
    /// Concurrent callers for the same key wait for a single search.
    pub fn call_sites_for(
        &self,
        func_name: &str,
        def_file: &str,
        issue_file: &str,
        class_name: Option<&str>,
    ) -> Arc<Vec<CallSite>>
    {
        let key = (
            func_name.to_owned(),
            paths::basename(&paths::normalize(def_file)).to_owned(),
        );

        self.call_sites
            .get_with(key, || Arc::new(self.search_call_sites(func_name, issue_file, class_name)))
    }

    /// Uncached repository search, filter and rank.
    #[instrument(skip(self), fields(backend = self.search.name()))]
    pub fn search_call_sites(
        &self,
        func_name: &str,
        issue_file: &str,
        class_name: Option<&str>,
    ) -> Vec<CallSite>
    {
        self.searches
            .fetch_add(1, Ordering::Relaxed);

        let hits = match self
            .search
            .search(&call_pattern(func_name), &self.repo_root)
        {
            Ok(hits) => hits,
            Err(e) =>
            {
                warn!(function = func_name, error = %e, "call-site search failed");
                return vec![CallSite::error_marker(e.to_string())];
            }
        };

        let issue_rel = paths::normalize(issue_file);
        let location = IssueLocation::new(&issue_rel);
        let window = self
            .options
            .context_window;

        let mut sites = Vec::new();
        for hit in hits
        {
            let rel = paths::relative_to(&hit.path, &self.repo_root);

            if self
                .options
                .ignore_headers
                && paths::is_header(&rel)
            {
                continue;
            }
            if paths::is_in_excluded_dir(
                &rel,
                &self
                    .options
                    .excluded_dirs,
            )
            {
                continue;
            }
            if looks_like_definition(&hit.text, func_name)
                || belongs_to_other_class(&hit.text, func_name, class_name)
            {
                continue;
            }

            let Some(lines) = self.file_lines(rel.as_str())
            else
            {
                sites.push(CallSite::unloadable(rel.as_str(), hit.line, &hit.text));
                continue;
            };

            let (context_start, context_end, context) = context_window(lines.as_slice(), hit.line, window);
            let includes = leading_includes(lines.as_slice());
            let signals = location.signals(&rel, &includes);

            sites.push(CallSite {
                file: rel.into_string(),
                line: hit.line,
                code: hit.text,
                context_start,
                context_end,
                context,
                includes,
                includes_bug_header: signals.includes_bug_header,
                same_dir: signals.same_dir,
                same_top_module: signals.same_top_module,
                score: signals.score(),
                error: None,
            });
        }

        let ranked = callsite::rank(
            sites,
            self.options
                .max_call_sites,
        );
        debug!(function = func_name, kept = ranked.len(), "call sites ranked");
        ranked
    }

    /// Lines of a repo-relative file, read once per run.
    fn file_lines(
        &self,
        rel: &str,
    ) -> FileLines
    {
        self.files
            .get_with(rel.to_owned(), || {
                let path = self
                    .repo_root
                    .join(rel);
                match read_text(&path)
                {
                    Ok(text) => Some(Arc::new(
                        text.lines()
                            .map(str::to_owned)
                            .collect(),
                    )),
                    Err(e) =>
                    {
                        debug!(file = rel, error = %format!("{e:#}"), "file not loadable");
                        None
                    }
                }
            })
    }
}
