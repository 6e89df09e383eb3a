//! Repo-relative path helpers.
//!
//! Issue paths arrive as repo-relative strings (usually `/`-separated, but
//! exports produced on Windows carry `\`). Everything here normalises to `/`
//! first so directory and module comparisons are separator-agnostic.

use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};

/// Header file extensions recognised by the scanner (lower-case, no dot).
pub const HEADER_EXTENSIONS: [&str; 4] = ["h", "hpp", "hh", "hxx"];

/// Normalise a repo-relative path to forward slashes.
pub fn normalize(rel: &str) -> Utf8PathBuf
{
    Utf8PathBuf::from(rel.replace('\\', "/"))
}

/// Directory part of a repo-relative path, `""` for files at the root.
pub fn rel_dir(rel: &Utf8Path) -> &str
{
    rel.parent()
        .map(|p| p.as_str())
        .unwrap_or("")
}

/// First component of the directory of `rel`, `""` for files at the root.
pub fn top_module(rel: &Utf8Path) -> &str
{
    let dir = rel_dir(rel);
    dir.split('/')
        .next()
        .unwrap_or("")
}

/// First component of the full path (file name for root-level files).
pub fn first_component(rel: &Utf8Path) -> &str
{
    rel.as_str()
        .split('/')
        .next()
        .unwrap_or("")
}

/// File name without its final extension (`control` for `a/b/control.cpp`).
pub fn stem(rel: &Utf8Path) -> &str
{
    rel.file_stem()
        .unwrap_or("")
}

/// Base name of a path (`control.cpp` for `a/b/control.cpp`).
pub fn basename(rel: &Utf8Path) -> &str
{
    rel.file_name()
        .unwrap_or("")
}

/// True if the path has a C/C++ header extension. Case-sensitive, matching
/// how the search tool reports paths.
pub fn is_header(rel: &Utf8Path) -> bool
{
    rel.extension()
        .is_some_and(|ext| HEADER_EXTENSIONS.contains(&ext))
}

/// True if any component of `rel` equals one of `excluded` (case-insensitive).
/// `excluded` is expected to be lower-case already.
pub fn is_in_excluded_dir(
    rel: &Utf8Path,
    excluded: &[String],
) -> bool
{
    rel.as_str()
        .split('/')
        .map(str::to_ascii_lowercase)
        .any(|part| {
            excluded
                .iter()
                .any(|ex| *ex == part)
        })
}

/// Express `path` relative to `root` when it lies below it, else keep it as
/// reported. The result is always `/`-separated.
pub fn relative_to(
    path: &Path,
    root: &Path,
) -> Utf8PathBuf
{
    let rel = path
        .strip_prefix(root)
        .unwrap_or(path);
    normalize(&rel.to_string_lossy())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn dir_and_module_for_nested_file()
    {
        let p = normalize("cpp\\oper\\control\\control.cpp");
        assert_eq!(p.as_str(), "cpp/oper/control/control.cpp");
        assert_eq!(rel_dir(&p), "cpp/oper/control");
        assert_eq!(top_module(&p), "cpp");
        assert_eq!(first_component(&p), "cpp");
        assert_eq!(stem(&p), "control");
        assert_eq!(basename(&p), "control.cpp");
    }

    #[test]
    fn root_level_file_has_no_dir()
    {
        let p = normalize("main.cpp");
        assert_eq!(rel_dir(&p), "");
        assert_eq!(top_module(&p), "");
        assert_eq!(first_component(&p), "main.cpp");
    }

    #[test]
    fn header_detection()
    {
        for (path, expected) in [
            ("a/x.h", true),
            ("a/x.hpp", true),
            ("a/x.hh", true),
            ("a/x.hxx", true),
            ("a/x.cpp", false),
            ("a/x.H", false),
            ("a/h", false),
        ]
        {
            assert_eq!(is_header(Utf8Path::new(path)), expected, "{path}");
        }
    }

    #[test]
    fn excluded_dirs_match_any_component_case_insensitively()
    {
        let ex: Vec<String> = ["tests", "tools"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(is_in_excluded_dir(Utf8Path::new("core/Tests/a.cpp"), &ex));
        assert!(is_in_excluded_dir(Utf8Path::new("TOOLS/gen.cpp"), &ex));
        assert!(!is_in_excluded_dir(Utf8Path::new("core/testsuite/a.cpp"), &ex));
    }

    #[test]
    fn relative_to_strips_root()
    {
        let root = Path::new("/repo");
        assert_eq!(relative_to(Path::new("/repo/a/b.cpp"), root).as_str(), "a/b.cpp");
        assert_eq!(relative_to(Path::new("other/b.cpp"), root).as_str(), "other/b.cpp");
    }
}
