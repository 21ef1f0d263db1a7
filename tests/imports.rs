//=============================================
// tests/imports.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: Module resolution, caching, cycles, and duplicate detection
//=============================================

use std::fs;
use std::path::Path;

use emberscript::{ScriptError, ScriptRuntime, Value};
use tempfile::TempDir;

fn write_script(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create script dir");
    }
    fs::write(&path, content).expect("write script");
    path
}

fn run_file(runtime: &mut ScriptRuntime, path: &Path) -> Result<Option<Value>, ScriptError> {
    let source = fs::read_to_string(path).expect("read script");
    runtime.execute_source(&source, Some(path))
}

#[test]
fn circular_import_reports_the_full_chain() {
    let dir = TempDir::new().expect("tempdir");
    let a = write_script(&dir, "a.ebs", "import \"b.ebs\";");
    let b = write_script(&dir, "b.ebs", "import \"a.ebs\";");
    let main = write_script(&dir, "main.ebs", "import \"a.ebs\";");

    let mut runtime = ScriptRuntime::new();
    let err = run_file(&mut runtime, &main).expect_err("expected cycle");
    match err {
        ScriptError::CircularImport { chain } => {
            assert_eq!(chain.len(), 3);
            assert_eq!(chain[0], a);
            assert_eq!(chain[1], b);
            assert_eq!(chain[2], a);
        }
        other => panic!("expected circular import, got {:?}", other),
    }
    runtime.shutdown();
}

#[test]
fn failed_import_does_not_pollute_later_imports() {
    let dir = TempDir::new().expect("tempdir");
    write_script(&dir, "a.ebs", "import \"b.ebs\";");
    write_script(&dir, "b.ebs", "import \"a.ebs\";");
    let bad = write_script(&dir, "bad.ebs", "import \"a.ebs\";");
    write_script(&dir, "ok.ebs", "function fine() { return 5; }");
    let good = write_script(&dir, "good.ebs", "import \"ok.ebs\"; return fine();");

    let mut runtime = ScriptRuntime::new();
    run_file(&mut runtime, &bad).expect_err("cycle should fail");
    // The import stack was unwound; unrelated imports still resolve.
    let result = run_file(&mut runtime, &good).expect("second run succeeds");
    assert_eq!(result, Some(Value::Int(5)));
    runtime.shutdown();
}

#[test]
fn reimported_file_parses_and_executes_once() {
    let dir = TempDir::new().expect("tempdir");
    // The imported unit bumps a screen variable at its top level; if the
    // unit ran more than once the counter would show it.
    write_script(
        &dir,
        "lib.ebs",
        "screen.set(\"state\", \"count\", screen.get(\"state\", \"count\") + 1);\
         function stamp() { return 1; }",
    );
    write_script(&dir, "left.ebs", "import \"lib.ebs\";");
    write_script(&dir, "right.ebs", "import \"lib.ebs\";");
    let main = write_script(
        &dir,
        "main.ebs",
        "screen.set(\"state\", \"count\", 0);\
         import \"lib.ebs\";\
         import \"lib.ebs\";\
         import \"left.ebs\";\
         import \"right.ebs\";\
         return screen.get(\"state\", \"count\");",
    );

    let mut runtime = ScriptRuntime::new();
    let result = run_file(&mut runtime, &main).expect("execution");
    assert_eq!(result, Some(Value::Int(1)));
    runtime.shutdown();
}

#[test]
fn differently_written_paths_hit_the_same_cache_entry() {
    let dir = TempDir::new().expect("tempdir");
    write_script(
        &dir,
        "lib/util.ebs",
        "screen.set(\"state\", \"count\", screen.get(\"state\", \"count\") + 1);",
    );
    let main = write_script(
        &dir,
        "main.ebs",
        "screen.set(\"state\", \"count\", 0);\
         import \"lib/util.ebs\";\
         import 'lib/../lib/./util.ebs';\
         return screen.get(\"state\", \"count\");",
    );

    let mut runtime = ScriptRuntime::new();
    let result = run_file(&mut runtime, &main).expect("execution");
    assert_eq!(result, Some(Value::Int(1)));
    runtime.shutdown();
}

#[test]
fn duplicate_function_across_files_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let one = write_script(&dir, "one.ebs", "function foo() { return 1; }");
    let two = write_script(&dir, "two.ebs", "function Foo() { return 2; }");
    let main = write_script(&dir, "main.ebs", "import \"one.ebs\"; import \"two.ebs\";");

    let mut runtime = ScriptRuntime::new();
    let err = run_file(&mut runtime, &main).expect_err("expected duplicate");
    match err {
        ScriptError::DuplicateDeclaration { name, first, second } => {
            // Case differs only in letter-casing and is still a duplicate.
            assert_eq!(name, "foo");
            assert_eq!(first, one);
            assert_eq!(second, two);
        }
        other => panic!("expected duplicate declaration, got {:?}", other),
    }
    runtime.shutdown();
}

#[test]
fn duplicate_screen_names_are_rejected_too() {
    let dir = TempDir::new().expect("tempdir");
    write_script(&dir, "one.ebs", "screen Settings { var a: int = 1; }");
    write_script(&dir, "two.ebs", "screen settings { var b: int = 2; }");
    let main = write_script(&dir, "main.ebs", "import \"one.ebs\"; import \"two.ebs\";");

    let mut runtime = ScriptRuntime::new();
    let err = run_file(&mut runtime, &main).expect_err("expected duplicate");
    match err {
        ScriptError::DuplicateDeclaration { name, .. } => assert_eq!(name, "settings"),
        other => panic!("expected duplicate declaration, got {:?}", other),
    }
    runtime.shutdown();
}

#[test]
fn duplicate_against_the_root_script_is_detected() {
    let dir = TempDir::new().expect("tempdir");
    write_script(&dir, "one.ebs", "function helper() { return 1; }");
    let main = write_script(
        &dir,
        "main.ebs",
        "function helper() { return 0; } import \"one.ebs\";",
    );

    let mut runtime = ScriptRuntime::new();
    let err = run_file(&mut runtime, &main).expect_err("expected duplicate");
    assert!(matches!(err, ScriptError::DuplicateDeclaration { .. }));
    runtime.shutdown();
}

#[test]
fn cache_invalidation_picks_up_saved_content() {
    let dir = TempDir::new().expect("tempdir");
    let lib = write_script(&dir, "lib.ebs", "function version() { return 1; }");
    let use_a = write_script(&dir, "use_a.ebs", "import \"lib.ebs\"; return version();");
    let use_b = write_script(&dir, "use_b.ebs", "import \"lib.ebs\"; return version();");

    let mut runtime = ScriptRuntime::new();
    assert_eq!(
        run_file(&mut runtime, &use_a).expect("first run"),
        Some(Value::Int(1))
    );

    // Saved in the editor, but the cache still serves the old parse.
    fs::write(&lib, "function version() { return 2; }").expect("rewrite lib");
    assert_eq!(
        run_file(&mut runtime, &use_b).expect("cached run"),
        Some(Value::Int(1))
    );

    // After invalidation the next import reparses current content.
    runtime.invalidate_cache(&lib);
    assert_eq!(
        run_file(&mut runtime, &use_b).expect("fresh run"),
        Some(Value::Int(2))
    );
    runtime.shutdown();
}

#[test]
fn import_paths_may_contain_spaces() {
    let dir = TempDir::new().expect("tempdir");
    write_script(&dir, "my lib/util.ebs", "function spaced() { return 3; }");
    let main = write_script(&dir, "main.ebs", "import \"my lib/util.ebs\"; return spaced();");

    let mut runtime = ScriptRuntime::new();
    let result = run_file(&mut runtime, &main).expect("execution");
    assert_eq!(result, Some(Value::Int(3)));
    runtime.shutdown();
}

#[test]
fn missing_import_file_is_a_runtime_error_with_line() {
    let dir = TempDir::new().expect("tempdir");
    let main = write_script(&dir, "main.ebs", "var x = 1;\nimport \"ghost.ebs\";");

    let mut runtime = ScriptRuntime::new();
    let err = run_file(&mut runtime, &main).expect_err("expected failure");
    match err {
        ScriptError::Runtime { line, message } => {
            assert_eq!(line, 2);
            assert!(message.contains("ghost.ebs"));
        }
        other => panic!("expected runtime error, got {:?}", other),
    }
    runtime.shutdown();
}

#[test]
fn parse_error_in_import_names_the_line() {
    let dir = TempDir::new().expect("tempdir");
    write_script(&dir, "broken.ebs", "var x = ;");
    let main = write_script(&dir, "main.ebs", "import \"broken.ebs\";");

    let mut runtime = ScriptRuntime::new();
    let err = run_file(&mut runtime, &main).expect_err("expected failure");
    assert!(matches!(err, ScriptError::Parse { line: 1, .. }));
    runtime.shutdown();
}

#[test]
fn nested_imports_resolve_relative_to_their_own_file() {
    let dir = TempDir::new().expect("tempdir");
    write_script(&dir, "nested/inner.ebs", "function inner() { return 11; }");
    write_script(&dir, "nested/outer.ebs", "import \"inner.ebs\";");
    let main = write_script(
        &dir,
        "main.ebs",
        "import \"nested/outer.ebs\"; return inner();",
    );

    let mut runtime = ScriptRuntime::new();
    let result = run_file(&mut runtime, &main).expect("execution");
    assert_eq!(result, Some(Value::Int(11)));
    runtime.shutdown();
}
