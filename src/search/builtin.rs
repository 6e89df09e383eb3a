//! In-process search backend: `ignore` walker + `grep-searcher`.
//!
//! Same contract as the `rg` backend (gitignore aware, hidden and binary
//! files skipped) without needing an external tool.

use std::path::Path;
use std::time::{Duration, Instant};

use grep_regex::RegexMatcherBuilder;
use grep_searcher::{BinaryDetection, SearcherBuilder, sinks::Lossy};
use tracing::{debug, instrument};

use super::{SearchError, SearchMatch, TextSearch};
use crate::infra::walk::FileWalker;

pub struct BuiltinSearch
{
    walker: FileWalker,
    timeout: Option<Duration>,
}

impl BuiltinSearch
{
    pub fn new(
        walker: FileWalker,
        timeout: Option<Duration>,
    ) -> Self
    {
        Self { walker, timeout }
    }
}

impl TextSearch for BuiltinSearch
{
    #[instrument(skip(self))]
    fn search(
        &self,
        pattern: &str,
        root: &Path,
    ) -> Result<Vec<SearchMatch>, SearchError>
    {
        let matcher = RegexMatcherBuilder::new()
            .build(pattern)
            .map_err(|e| SearchError::InvalidPattern(e.to_string()))?;

        let mut searcher = SearcherBuilder::new()
            .binary_detection(BinaryDetection::quit(b'\x00'))
            .line_number(true)
            .build();

        let deadline = self
            .timeout
            .map(|t| (Instant::now() + t, t));
        let mut out = Vec::new();

        for path in self
            .walker
            .walk_files(root)
        {
            if let Some((at, limit)) = deadline
                && Instant::now() > at
            {
                return Err(SearchError::Timeout(limit));
            }

            let result = searcher.search_path(
                &matcher,
                &path,
                Lossy(|line, text| {
                    out.push(SearchMatch {
                        path: path.clone(),
                        line,
                        text: text
                            .trim_end_matches(['\n', '\r'])
                            .to_owned(),
                    });
                    Ok(true)
                }),
            );

            // Unreadable files are skipped, the rest of the tree still counts
            if let Err(e) = result
            {
                debug!(path = %path.display(), error = %e, "skipping unreadable file");
            }
        }

        debug!(hits = out.len(), "builtin search finished");
        Ok(out)
    }

    fn name(&self) -> &'static str
    {
        "builtin"
    }
}
