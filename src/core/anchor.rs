//! Enclosing-function ("anchor") detection from plain source lines.
//!
//! Line-local heuristics only: a candidate header contains `(` and `)`, does
//! not end with `;`, is not a control-flow statement, and sits strictly left
//! of the issue line. Multi-line signatures, trailing return types, lambdas
//! and macro-generated methods are known misses.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::core::blocks::Block;
use crate::core::callsite::CallSite;

/// Statements that carry parentheses but never start a function header.
const CONTROL_PREFIXES: [&str; 7] = ["if ", "for ", "while ", "switch ", "catch ", "else ", "do "];

/// Tokens rejected as function names.
const NON_FUNCTION_NAMES: [&str; 8] = ["if", "for", "while", "switch", "catch", "else", "do", "return"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind
{
    #[default]
    Function,
}

/// Line window around the issue inside its own file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugContext
{
    pub start_line: i64,
    pub end_line: i64,
    pub code: String,
}

/// The function definition heuristically enclosing an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor
{
    pub kind: AnchorKind,
    pub name: String,
    pub def_file: String,
    /// 1-based line of the header.
    pub def_line: usize,
    pub block_level: usize,
    pub block_indent: usize,
    pub signature: String,
    pub class_name: Option<String>,
    #[serde(default)]
    pub bug_context: BugContext,
    #[serde(default)]
    pub def_includes: Vec<String>,
    /// Ranked by score, highest first.
    #[serde(default)]
    pub call_sites: Vec<CallSite>,
}

/// Pull a function name out of a header-looking line.
///
/// `Boolean Controller::Foo(int a)` gives `Foo`; `*make(`, `&ref(` lose
/// their sigils. Control-flow keywords are rejected.
pub fn extract_function_name(line: &str) -> Option<String>
{
    let paren = line.find('(')?;
    let before = line[..paren].trim();

    let token = before
        .split_whitespace()
        .last()?;
    let unqualified = token
        .rsplit("::")
        .next()
        .unwrap_or(token);
    let name = unqualified.trim_start_matches(['*', '&']);

    if name.is_empty() || NON_FUNCTION_NAMES.contains(&name)
    {
        return None;
    }

    Some(name.to_owned())
}

/// Class qualifier of a signature, e.g. `Controller` for
/// `Boolean Controller::Foo()`. Needs at least `Class::name` right before
/// the first `(`.
pub fn extract_class_name(signature: &str) -> Option<String>
{
    if !signature.contains("::")
    {
        return None;
    }

    let before_paren = signature
        .split('(')
        .next()?;
    let token = before_paren
        .split_whitespace()
        .last()?;

    let segments: Vec<&str> = token
        .split("::")
        .collect();
    if segments.len() < 2
    {
        return None;
    }

    let class = segments[segments.len() - 2].trim();
    if class.is_empty()
    {
        return None;
    }

    Some(class.to_owned())
}

/// Leading whitespace width (any whitespace, counted in chars).
fn leading_ws(line: &str) -> usize
{
    line.chars()
        .take_while(|c| c.is_whitespace())
        .count()
}

fn is_control_flow(stripped: &str) -> bool
{
    let lower = stripped.to_lowercase();
    CONTROL_PREFIXES
        .iter()
        .any(|p| lower.starts_with(p))
}

/// Scan at most `search_window` lines of `block` backward from the issue
/// line and return the closest header that qualifies.
///
/// `bug_start`/`bug_end` are 1-based file lines; the block is normally the
/// whole-file (outermost) block.
pub fn find_enclosing_function(
    block: &Block,
    bug_start: i64,
    _bug_end: i64,
    file_path: &str,
    search_window: usize,
) -> Option<Anchor>
{
    let lines: Vec<&str> = block
        .code
        .lines()
        .collect();
    if lines.is_empty()
    {
        return None;
    }

    let block_start = block.start_line as i64;
    let block_end = block.end_line as i64;

    let bug_indent = (block_start <= bug_start && bug_start <= block_end)
        .then(|| (bug_start - block_start) as usize)
        .and_then(|idx| lines.get(idx))
        .map(|l| leading_ws(l));

    let window = i64::try_from(search_window.max(1)).unwrap_or(i64::MAX);
    let search_end = bug_start.min(block_end);
    let search_start = block_start.max(
        search_end
            .saturating_sub(window)
            .saturating_add(1),
    );

    let mut src_line = search_end;
    while src_line >= search_start
    {
        let current = src_line;
        src_line -= 1;

        let Some(line) = usize::try_from(current - block_start)
            .ok()
            .and_then(|idx| lines.get(idx))
        else
        {
            continue;
        };

        let stripped = line.trim();
        if stripped.is_empty() || is_control_flow(stripped)
        {
            continue;
        }

        if !(stripped.contains('(') && stripped.contains(')')) || stripped.ends_with(';')
        {
            continue;
        }

        // Same or deeper indentation than the issue line: a sibling statement
        if let Some(bug_indent) = bug_indent
            && leading_ws(line) >= bug_indent
        {
            continue;
        }

        let Some(name) = extract_function_name(stripped)
        else
        {
            continue;
        };

        trace!(line = current, %name, "anchor candidate accepted");

        return Some(Anchor {
            kind: AnchorKind::Function,
            name,
            def_file: file_path.to_owned(),
            def_line: current as usize,
            block_level: block.level,
            block_indent: block.indent,
            signature: stripped.to_owned(),
            class_name: extract_class_name(stripped),
            bug_context: BugContext::default(),
            def_includes: Vec::new(),
            call_sites: Vec::new(),
        });
    }

    None
}

/// Lines `[bug_start - window, bug_end + window]` of `block`, clamped to it.
pub fn build_bug_context(
    block: &Block,
    bug_start: i64,
    bug_end: i64,
    context_window: usize,
) -> BugContext
{
    let lines: Vec<&str> = block
        .code
        .lines()
        .collect();
    if lines.is_empty()
    {
        return BugContext { start_line: bug_start, end_line: bug_end, code: String::new() };
    }

    let window = i64::try_from(context_window).unwrap_or(i64::MAX);
    let block_start = block.start_line as i64;
    let block_end = block.end_line as i64;

    let ctx_start = block_start.max(bug_start.saturating_sub(window));
    let ctx_end = block_end.min(bug_end.saturating_add(window));

    let local_start = ctx_start
        .saturating_sub(block_start)
        .max(0);
    let local_end = ctx_end
        .saturating_sub(block_start)
        .min(lines.len() as i64 - 1);

    let code = if local_start <= local_end
    {
        lines[local_start as usize..=local_end as usize].join("\n")
    }
    else
    {
        String::new()
    };

    BugContext { start_line: ctx_start, end_line: ctx_end, code }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::blocks::extract_blocks;

    fn whole_file(src: &str) -> Block
    {
        let lines: Vec<&str> = src
            .split_inclusive('\n')
            .collect();
        extract_blocks(&lines, 0, 0)
            .pop()
            .expect("non-empty")
    }

    #[test]
    fn function_names_table()
    {
        let cases: &[(&str, Option<&str>)] = &[
            ("Boolean Controller::Foo()", Some("Foo")),
            ("void ns::Outer::Inner::run(int a, int b)", Some("run")),
            ("static int helper (void)", Some("helper")),
            ("Widget *Factory::*make(int)", Some("make")),
            ("const Foo &Bar::&get() const", Some("get")),
            ("int main(int argc, char** argv)", Some("main")),
            ("if(x)", None),
            ("} else if(y)", None),
            ("return(compute())", None),
            ("(void)cast;", None),
            ("no parens here", None),
            ("Foo::()", None),
        ];

        for (line, expected) in cases
        {
            assert_eq!(
                extract_function_name(line).as_deref(),
                *expected,
                "line: {line}"
            );
        }
    }

    #[test]
    fn class_names_table()
    {
        let cases: &[(&str, Option<&str>)] = &[
            ("Boolean Controller::AutoRegisterDll()", Some("Controller")),
            ("void App::Controller::Foo()", Some("Controller")),
            ("std::string Model::name() const", Some("Model")),
            ("void free_function(std::string s)", None),
            ("void ::Foo()", None),
            ("void plain()", None),
        ];

        for (sig, expected) in cases
        {
            assert_eq!(extract_class_name(sig).as_deref(), *expected, "sig: {sig}");
        }
    }

    #[test]
    fn finds_header_and_class()
    {
        let src = "namespace App {\n\
                   \n    Boolean Controller::Foo()\n    {\n        if (ready)\n        {\n            Bar();\n        }\n    }\n}\n";
        let block = whole_file(src);

        let anchor = find_enclosing_function(&block, 7, 7, "app/ctl.cpp", 200).expect("anchor");
        assert_eq!(anchor.name, "Foo");
        assert_eq!(anchor.class_name.as_deref(), Some("Controller"));
        assert_eq!(anchor.def_line, 3);
        assert_eq!(anchor.def_file, "app/ctl.cpp");
        assert_eq!(anchor.signature, "Boolean Controller::Foo()");
        assert_eq!(anchor.kind, AnchorKind::Function);
    }

    #[test]
    fn sibling_statement_at_same_indent_is_not_an_anchor()
    {
        let src = "void Real::run()\n{\n    setup(a, b)\n    process(x);\n}\n";
        let block = whole_file(src);

        // `setup(a, b)` has no trailing `;` but shares the issue indentation
        let anchor = find_enclosing_function(&block, 4, 4, "r.cpp", 50).expect("anchor");
        assert_eq!(anchor.name, "run");
        assert_eq!(anchor.def_line, 1);
    }

    #[test]
    fn declarations_and_control_flow_are_skipped()
    {
        let src = "int helper(int);\nvoid Outer::go()\n{\n  while (true)\n  {\n    for (;;)\n    {\n      tick();\n    }\n  }\n}\n";
        let block = whole_file(src);
        let anchor = find_enclosing_function(&block, 8, 8, "o.cpp", 200).expect("anchor");
        assert_eq!(anchor.name, "go");
        assert_eq!(anchor.def_line, 2);
    }

    #[test]
    fn window_limits_the_scan()
    {
        let mut src = String::from("void far()\n{\n");
        for _ in 0..10
        {
            src.push_str("    step();\n");
        }
        src.push_str("}\n");
        let block = whole_file(&src);

        // issue on line 12: header on line 1 is 12 lines up
        assert!(find_enclosing_function(&block, 12, 12, "f.cpp", 11).is_none());
        assert!(find_enclosing_function(&block, 12, 12, "f.cpp", 12).is_some());
    }

    #[test]
    fn unknown_issue_indent_accepts_any_header()
    {
        let src = "void top()\n{\n}\n";
        let block = whole_file(src);
        // issue line past the block: no indentation guard, scan from the end
        let anchor = find_enclosing_function(&block, 40, 40, "t.cpp", 200).expect("anchor");
        assert_eq!(anchor.name, "top");
    }

    #[test]
    fn empty_block_has_no_anchor()
    {
        let block = Block { level: 0, indent: 0, start_line: 1, end_line: 1, code: String::new() };
        assert!(find_enclosing_function(&block, 1, 1, "e.cpp", 10).is_none());
    }

    #[test]
    fn bug_context_is_clamped_to_block()
    {
        let src = "a\nb\nc\nd\ne\nf\ng\n";
        let block = whole_file(src);

        let ctx = build_bug_context(&block, 2, 3, 2);
        assert_eq!((ctx.start_line, ctx.end_line), (1, 5));
        assert_eq!(ctx.code, "a\nb\nc\nd\ne");

        let ctx = build_bug_context(&block, 7, 7, 1);
        assert_eq!((ctx.start_line, ctx.end_line), (6, 7));
        assert_eq!(ctx.code, "f\ng");
    }

    #[test]
    fn extreme_issue_lines_do_not_overflow()
    {
        let block = whole_file("void top()\n{\n    run();\n}\n");

        assert!(find_enclosing_function(&block, i64::MIN, i64::MIN, "t.cpp", 200).is_none());
        let anchor = find_enclosing_function(&block, i64::MAX, i64::MAX, "t.cpp", usize::MAX).expect("anchor");
        assert_eq!(anchor.def_line, 1);

        let ctx = build_bug_context(&block, i64::MIN, i64::MIN, 6);
        assert_eq!(ctx.start_line, 1);
        assert!(ctx.code.is_empty());

        let ctx = build_bug_context(&block, i64::MAX, i64::MAX, 6);
        assert_eq!(ctx.end_line, 4);
        assert!(ctx.code.is_empty());

        let ctx = build_bug_context(&block, i64::MIN, i64::MAX, usize::MAX);
        assert_eq!((ctx.start_line, ctx.end_line), (1, 4));
        assert_eq!(ctx.code, "void top()\n{\n    run();\n}");
    }
}
