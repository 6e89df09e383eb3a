//! Batch runners behind the `blocks`, `anchors` and `run` commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::{AnchorsArgs, AppContext, BlocksArgs, RunArgs, ScanArgs};
use crate::core::blocks::BlockExtractor;
use crate::core::issue::{Issue, IssueRecord, IssueStatus};
use crate::core::scanner::ReferenceScanner;
use crate::infra::config::{Config, ScanConfig, SearchBackend, load_config};
use crate::infra::io::{read_records, write_json};
use crate::infra::walk::FileWalker;
use crate::search::{BuiltinSearch, RipgrepSearch, TextSearch};

/// Counts reported after a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary
{
    pub total: usize,
    pub resolved: usize,
    pub no_anchor: usize,
    pub errors: usize,
    pub searches: usize,
}

impl Summary
{
    pub fn from_records(
        records: &[IssueRecord],
        searches: usize,
    ) -> Self
    {
        let mut summary = Self { total: records.len(), searches, ..Self::default() };
        for record in records
        {
            match record.status
            {
                Some(IssueStatus::Resolved) => summary.resolved += 1,
                Some(IssueStatus::NoAnchor) => summary.no_anchor += 1,
                Some(IssueStatus::Error) => summary.errors += 1,
                None if record.error.is_some() => summary.errors += 1,
                None => {}
            }
        }
        summary
    }

    fn print(
        &self,
        ctx: &AppContext,
    )
    {
        info!(
            total = self.total,
            resolved = self.resolved,
            no_anchor = self.no_anchor,
            errors = self.errors,
            searches = self.searches,
            "batch finished"
        );

        if ctx.quiet
        {
            return;
        }

        let line = format!(
            "{} issues: {} resolved, {} no anchor, {} errors, {} searches",
            self.total, self.resolved, self.no_anchor, self.errors, self.searches
        );
        if ctx.no_color
        {
            println!("{line}");
        }
        else if self.errors > 0
        {
            println!("{} {}", "!".yellow(), line);
        }
        else
        {
            println!("{} {}", "✓".green(), line);
        }
    }
}

/// `sqctx blocks`: issues in, issues with `blocks` out.
pub fn blocks_run(
    args: BlocksArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let cfg = load_config(
        ctx.config
            .as_deref(),
    )?;
    configure_threads(ctx, &cfg.scan);

    let repo = resolve_repo(args.repo, &cfg)?;
    let issues = load_issues(&args.issues, args.max_issues)?;
    info!(count = issues.len(), repo = %repo.display(), "block stage");

    let extractor = BlockExtractor::new(&repo);
    let records = extract_all(&extractor, issues, ctx);

    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(&cfg.blocks.output_file));
    finish(&records, &out, ctx, Summary::from_records(&records, 0))
}

/// `sqctx anchors`: issues with blocks in, issues with anchors out.
pub fn anchors_run(
    args: AnchorsArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let cfg = load_config(
        ctx.config
            .as_deref(),
    )?;
    let scan = merge_scan_args(cfg.scan.clone(), &args.scan);
    configure_threads(ctx, &scan);

    let repo = resolve_repo(args.repo, &cfg)?;
    let records: Vec<IssueRecord> = load_issues(&args.input, scan.max_issues)?
        .into_par_iter()
        .map(IssueRecord::from_value)
        .collect();
    info!(count = records.len(), repo = %repo.display(), "anchor stage");

    let scanner = build_scanner(&repo, &scan)?;
    let records = scan_all(&scanner, records, ctx);

    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(&scan.output_file));
    finish(&records, &out, ctx, Summary::from_records(&records, scanner.searches()))
}

/// `sqctx run`: both stages in memory.
pub fn run(
    args: RunArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let cfg = load_config(
        ctx.config
            .as_deref(),
    )?;
    let scan = merge_scan_args(cfg.scan.clone(), &args.scan);
    configure_threads(ctx, &scan);

    let repo = resolve_repo(args.repo, &cfg)?;
    let issues = load_issues(&args.issues, scan.max_issues)?;
    info!(count = issues.len(), repo = %repo.display(), "full pipeline");

    let extractor = BlockExtractor::new(&repo);
    let scanner = build_scanner(&repo, &scan)?;

    let records = extract_all(&extractor, issues, ctx);
    let records = scan_all(&scanner, records, ctx);

    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(&scan.output_file));
    finish(&records, &out, ctx, Summary::from_records(&records, scanner.searches()))
}

/// Block stage over a batch of raw issues, in input order.
pub fn extract_all(
    extractor: &BlockExtractor,
    issues: Vec<Value>,
    ctx: &AppContext,
) -> Vec<IssueRecord>
{
    let progress = progress_bar(issues.len(), ctx);
    let records: Vec<IssueRecord> = issues
        .into_par_iter()
        .map(|value| {
            let record = match Issue::from_value(value)
            {
                Ok(issue) => extractor.extract_issue(issue),
                Err(err) => IssueRecord::default().fail(err),
            };
            progress.inc(1);
            record
        })
        .collect();
    progress.finish_with_message("Blocks extracted");
    records
}

/// Anchor stage over a batch, in input order.
pub fn scan_all(
    scanner: &ReferenceScanner,
    records: Vec<IssueRecord>,
    ctx: &AppContext,
) -> Vec<IssueRecord>
{
    let progress = progress_bar(records.len(), ctx);
    let records: Vec<IssueRecord> = records
        .into_par_iter()
        .map(|record| {
            let record = scanner.scan_issue(record);
            progress.inc(1);
            record
        })
        .collect();
    progress.finish_with_message("Anchors resolved");
    records
}

/// Search backend selected by configuration.
pub fn build_search(scan: &ScanConfig) -> Result<Arc<dyn TextSearch>>
{
    let search: Arc<dyn TextSearch> = match scan.backend
    {
        SearchBackend::Ripgrep => Arc::new(RipgrepSearch::new(scan.rg_binary(), scan.search_timeout())),
        SearchBackend::Builtin =>
        {
            let walker = FileWalker::new(&scan.ignore_patterns).context("Invalid scan.ignore_patterns")?;
            Arc::new(BuiltinSearch::new(walker, scan.search_timeout()))
        }
    };
    Ok(search)
}

pub fn build_scanner(
    repo: &Path,
    scan: &ScanConfig,
) -> Result<ReferenceScanner>
{
    let search = build_search(scan)?;
    info!(backend = search.name(), "call-site search backend");
    Ok(ReferenceScanner::new(repo, scan.scan_options(), search))
}

/// CLI flags take precedence over the config file.
pub fn merge_scan_args(
    mut scan: ScanConfig,
    args: &ScanArgs,
) -> ScanConfig
{
    if let Some(n) = args.max_issues
    {
        scan.max_issues = Some(n);
    }
    if let Some(n) = args.max_call_sites
    {
        scan.max_call_sites = Some(n);
    }
    if let Some(n) = args.search_window
    {
        scan.search_window = n;
    }
    if let Some(n) = args.context_window
    {
        scan.context_window = n;
    }
    if let Some(backend) = args.backend
    {
        scan.backend = backend;
    }
    if args.include_headers
    {
        scan.ignore_headers = false;
    }
    if let Some(rg) = &args.rg_path
    {
        scan.rg_path = rg.clone();
    }
    if let Some(secs) = args.timeout
    {
        scan.search_timeout_secs = secs;
    }
    scan
}

/// `--repo`, else `repo_root` from config; must be an existing directory.
fn resolve_repo(
    cli: Option<PathBuf>,
    cfg: &Config,
) -> Result<PathBuf>
{
    let raw = cli
        .or_else(|| {
            cfg.repo_root
                .clone()
        })
        .context("No repository root: pass --repo or set repo_root in sqctx.toml")?;

    let expanded = PathBuf::from(
        shellexpand::tilde(&raw.to_string_lossy()).into_owned(),
    );
    let root = dunce::canonicalize(&expanded)
        .with_context(|| format!("Repository root not found: {}", expanded.display()))?;
    if !root.is_dir()
    {
        anyhow::bail!("Repository root is not a directory: {}", root.display());
    }
    Ok(root)
}

/// Raw records; each one is validated on its own so a bad entry only fails
/// itself.
fn load_issues(
    path: &Path,
    max_issues: Option<usize>,
) -> Result<Vec<Value>>
{
    let mut issues: Vec<Value> =
        read_records(path).with_context(|| format!("Failed to load issues from {}", path.display()))?;
    if let Some(max) = max_issues
    {
        issues.truncate(max);
    }
    Ok(issues)
}

fn configure_threads(
    ctx: &AppContext,
    scan: &ScanConfig,
)
{
    let threads = ctx
        .threads
        .unwrap_or(scan.threads);
    if threads > 0
        && rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .is_err()
    {
        warn!(threads, "thread pool already configured");
    }
}

fn progress_bar(
    len: usize,
    ctx: &AppContext,
) -> ProgressBar
{
    if ctx.quiet
    {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

fn finish(
    records: &[IssueRecord],
    out: &Path,
    ctx: &AppContext,
    summary: Summary,
) -> Result<()>
{
    if ctx.dry_run
    {
        if !ctx.quiet
        {
            let msg = format!("DRY RUN: would write {} records to {}", records.len(), out.display());
            if ctx.no_color
            {
                println!("{msg}");
            }
            else
            {
                println!("{}", msg.yellow());
            }
        }
    }
    else
    {
        write_json(records, out)?;
        info!(path = %out.display(), "output written");
    }

    // Keep stdout clean when it carries the JSON
    if out.as_os_str() != "-"
    {
        summary.print(ctx);
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn record(
        status: Option<IssueStatus>,
        error: Option<&str>,
    ) -> IssueRecord
    {
        IssueRecord { status, error: error.map(str::to_owned), ..IssueRecord::default() }
    }

    #[test]
    fn summary_counts_by_status()
    {
        let records = vec![
            record(Some(IssueStatus::Resolved), None),
            record(Some(IssueStatus::NoAnchor), Some("miss")),
            record(Some(IssueStatus::Error), Some("bad")),
            record(None, Some("Source file not found: x.cpp")),
            record(None, None),
        ];
        let s = Summary::from_records(&records, 3);
        assert_eq!(
            s,
            Summary { total: 5, resolved: 1, no_anchor: 1, errors: 2, searches: 3 }
        );
    }

    #[test]
    fn cli_flags_override_config()
    {
        let args = ScanArgs {
            max_call_sites: Some(4),
            backend: Some(SearchBackend::Builtin),
            include_headers: true,
            timeout: Some(0),
            ..ScanArgs::default()
        };
        let scan = merge_scan_args(ScanConfig::default(), &args);
        assert_eq!(scan.max_call_sites, Some(4));
        assert_eq!(scan.backend, SearchBackend::Builtin);
        assert!(!scan.ignore_headers);
        assert_eq!(scan.search_timeout(), None);
        assert_eq!(scan.search_window, 200);
    }

    #[test]
    fn missing_repo_is_a_hard_error()
    {
        let err = resolve_repo(None, &Config::default()).unwrap_err();
        assert!(err
            .to_string()
            .contains("No repository root"));

        assert!(resolve_repo(Some(PathBuf::from("/definitely/not/a/repo")), &Config::default()).is_err());
    }

    #[test]
    fn batches_keep_input_order()
    {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path()
                .join("a.cpp"),
            "void A::Run()\n{\n    go();\n}\n",
        )
        .unwrap();

        let issues: Vec<Value> = (0..20)
            .map(|i| {
                let path = if i % 3 == 0 { "missing.cpp" } else { "a.cpp" };
                serde_json::json!({
                    "issue_key": format!("K{i}"),
                    "file_path": path,
                    "start_line": 3,
                })
            })
            .collect();

        let ctx = AppContext { quiet: true, ..AppContext::default() };
        let records = extract_all(&BlockExtractor::new(tmp.path()), issues, &ctx);

        let keys: Vec<String> = records
            .iter()
            .map(|r| {
                r.issue
                    .issue_key()
                    .to_owned()
            })
            .collect();
        let expected: Vec<String> = (0..20)
            .map(|i| format!("K{i}"))
            .collect();
        assert_eq!(keys, expected);
        assert!(records[0].is_error());
        assert_eq!(records[1].blocks.len(), 2);
    }

    #[test]
    fn one_bad_record_does_not_fail_the_batch()
    {
        let tmp = tempfile::TempDir::new().unwrap();
        let input = tmp
            .path()
            .join("staged.json");
        std::fs::write(
            &input,
            r#"[
                {"issue_key": "A", "file_path": "a.cpp", "blocks": []},
                {"issue_key": "B", "file_path": "a.cpp", "blocks": null},
                {"issue_key": "C", "file_path": "a.cpp", "blocks": [{"level": 0, "start": 1, "end": 2, "code": ""}]},
                "not an issue"
            ]"#,
        )
        .unwrap();

        let records: Vec<IssueRecord> = load_issues(&input, None)
            .unwrap()
            .into_iter()
            .map(IssueRecord::from_value)
            .collect();
        assert_eq!(records.len(), 4);
        assert!(records[0].error.is_none());
        assert!(records[1].error.is_none());
        assert!(records[1].blocks.is_empty());
        assert!(records[2].is_error());
        assert_eq!(records[2].issue.issue_key(), "C");
        assert!(records[3].is_error());

        let ctx = AppContext { quiet: true, ..AppContext::default() };
        let extracted = extract_all(&BlockExtractor::new(tmp.path()), vec![serde_json::json!(42)], &ctx);
        assert_eq!(
            extracted[0].error.as_deref(),
            Some("Malformed issue record: expected a JSON object, found a number")
        );
    }
}
