//! Shared test utilities for integration tests
//!
//! Builds a small C++ repository plus an issues file so the CLI can be
//! exercised end to end without network or external tools.

use assert_fs::prelude::*;

pub const CONTROLLER: &str = "#include \"controller.h\"
namespace App {
    Boolean Controller::Foo()
    {
        if (ready)
        {
            doThing();
        }
    }
    void Controller::Bar()
    {
        Foo();
    }
}
";

/// Repository under `repo/`, issues as a JSON array in `issues.json` and as
/// JSON lines in `issues.jsonl`.
pub fn make_fixture() -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    let files: &[(&str, &str)] = &[
        ("repo/core/ctrl/controller.cpp", CONTROLLER),
        ("repo/core/ctrl/controller.h", "class Controller { Boolean Foo(); };\n"),
        ("repo/core/ctrl/other.cpp", "#include \"controller.h\"\nvoid X()\n{\n    Foo();\n}\n"),
        ("repo/core/net/net.cpp", "void Y()\n{\n    Foo();\n}\n"),
        ("repo/lib/b.cpp", "bool B::Foo()\n{\n    return other::Foo();\n}\n"),
        ("repo/tests/t.cpp", "void T() { Foo(); }\n"),
    ];
    for (rel, content) in files
    {
        tmp.child(rel)
            .write_str(content)
            .expect("write source");
    }

    let issues = [
        r#"{"issue_key":"K1","rule":"cpp:S1481","status":"OPEN","file_path":"core/ctrl/controller.cpp","start_line":7,"end_line":7}"#,
        r#"{"issue_key":"K2","rule":"cpp:S125","file_path":"missing.cpp","start_line":3}"#,
        r#"{"issue_key":"K3","rule":"cpp:S3806","error":"file_read_error","file_path":"core/ctrl/controller.cpp","start_line":2}"#,
    ];
    tmp.child("issues.json")
        .write_str(&format!("[{}]", issues.join(",")))
        .expect("write issues.json");
    tmp.child("issues.jsonl")
        .write_str(&format!("{}\n", issues.join("\n")))
        .expect("write issues.jsonl");

    tmp
}
