//! **sqctx** - layered code context for static-analysis triage
//!
//! For each reported issue: enclosing indentation blocks, the heuristically
//! enclosing function ("anchor"), and ranked call sites of that function
//! across the repository. No parser involved; line heuristics only.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Context extraction engines and the batch pipeline
pub mod core {
    /// Issue records, status and per-issue error taxonomy
    pub mod issue;
    pub use issue::{Issue, IssueError, IssueRecord, IssueStatus};

    /// Indentation-driven block hierarchy around an issue
    pub mod blocks;
    pub use blocks::{Block, BlockExtractor, extract_blocks};

    /// Enclosing function detection and bug context
    pub mod anchor;
    pub use anchor::{Anchor, BugContext, extract_class_name, extract_function_name, find_enclosing_function};

    /// Call-site filters, proximity signals and ranking
    pub mod callsite;
    pub use callsite::CallSite;

    /// Anchor stage session with file and call-site caches
    pub mod scanner;
    pub use scanner::{ReferenceScanner, ScanOptions};

    /// Parallel batch runners for the CLI commands
    pub mod pipeline;
    pub use pipeline::{anchors_run, blocks_run, run as pipeline_run};
}

/// Repository-wide text search backends (ripgrep, in-process)
pub mod search;

/// Infrastructure - Configuration, I/O, and path helpers
pub mod infra {
    /// Layered configuration (file + SQCTX_* environment)
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Memory-mapped reads, line splitting, JSON/JSONL records
    pub mod io;

    /// Repo-relative path helpers
    pub mod paths;

    /// Gitignore-aware file walking
    pub mod walk;
    pub use walk::FileWalker;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use infra::{Config, FileWalker, load_config};

// Core types for external consumers
pub use crate::core::{Anchor, Block, CallSite, Issue, IssueRecord, IssueStatus, ReferenceScanner};
pub use search::{SearchError, SearchMatch, TextSearch};
