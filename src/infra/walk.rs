//! Gitignore-aware repository walker for the in-process search backend.
//! - Respects .gitignore, .git/info/exclude, and global gitignore
//! - Extra ignore globs (early directory prune + late file filter)
//! - Hidden files skipped and symlinks not followed, like `rg`
//! - Deterministic ordering so search hits come back in a stable order
//!
//! Backed by ripgrep's `ignore` crate and `globset`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};

pub struct FileWalker
{
    /// Compiled set of additional ignore patterns
    ignore_patterns: GlobSet,
}

impl FileWalker
{
    /// Build a walker with additional ignore patterns (e.g. "build/**",
    /// "third_party/**"). Patterns match on repo-relative paths.
    pub fn new(additional_ignores: &[String]) -> Result<Self>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in additional_ignores
        {
            builder.add(Glob::new(pattern).with_context(|| format!("invalid ignore glob `{pattern}`"))?);
        }

        Ok(Self { ignore_patterns: builder.build()? })
    }

    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // WalkBuilder::hidden(true) skips dotfiles
        b.hidden(true);

        b.git_ignore(true);
        b.git_global(true);
        b.git_exclude(true);
        b.follow_links(false);

        let extra = self
            .ignore_patterns
            .clone();
        let root_owned = root.to_path_buf();
        b.filter_entry(move |ent: &DirEntry| {
            let is_dir = ent
                .file_type()
                .is_some_and(|ft| ft.is_dir());
            if !is_dir
            {
                return true;
            }
            let rel = ent
                .path()
                .strip_prefix(&root_owned)
                .unwrap_or(ent.path());
            !extra.is_match(rel)
        });

        b
    }

    /// Regular files under `root`, sorted.
    pub fn walk_files<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<PathBuf>
    {
        let root_path = root.as_ref();

        let mut out: Vec<PathBuf> = self
            .build_walk(root_path)
            .build()
            .filter_map(|res| res.ok())
            .filter(|entry| {
                entry
                    .file_type()
                    .is_some_and(|ft| ft.is_file())
            })
            .map(|entry| entry.into_path())
            .filter(|abs| {
                let rel = abs
                    .strip_prefix(root_path)
                    .unwrap_or(abs);
                !self
                    .ignore_patterns
                    .is_match(rel)
            })
            .collect();

        out.sort();
        out
    }
}
