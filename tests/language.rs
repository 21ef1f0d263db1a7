//=============================================
// tests/language.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: End-to-end language semantics
//=============================================

use emberscript::{OutputSink, ScriptError, ScriptRuntime, Value};

fn eval(source: &str) -> Value {
    let mut runtime = ScriptRuntime::new();
    runtime
        .execute_source(source, None)
        .expect("execution")
        .unwrap_or(Value::Null)
}

fn eval_err(source: &str) -> ScriptError {
    let mut runtime = ScriptRuntime::new();
    runtime
        .execute_source(source, None)
        .expect_err("expected failure")
}

#[test]
fn integer_modulo_sign_law_holds() {
    // (-a) % d == -(a % d) across a range of dividends and divisors.
    let result = eval(
        "function law() {\
             for var a = 0; a < 25; a += 1 {\
                 for var d = 1; d < 8; d += 1 {\
                     if (-a) % d != -(a % d) { return false; }\
                     if (-a) % (-d) != -(a % d) { return false; }\
                 }\
             }\
             return true;\
         }\
         return law();",
    );
    assert_eq!(result, Value::Bool(true));
}

#[test]
fn modulo_by_zero_fails_even_for_doubles() {
    let err = eval_err("var d: double = 0; return 1.5 % d;");
    assert!(matches!(err, ScriptError::ModuloByZero { .. }));
}

#[test]
fn set_of_read_back_element_is_type_stable() {
    let result = eval(
        "var xs: array.int[4];\
         xs[0] = 7;\
         xs[1] = xs[0];\
         xs[0] = xs[1];\
         return xs[0];",
    );
    assert_eq!(result, Value::Int(7));
}

#[test]
fn reverse_view_equals_reversed_forward_sequence() {
    let result = eval(
        "var xs: array.int[*] = [1, 2, 3, 4];\
         var forward: string = \"\";\
         var backward: string = \"\";\
         foreach x in xs { forward += x; }\
         foreach x in array.reverse(xs) { backward += x; }\
         return forward + \"|\" + backward;",
    );
    assert_eq!(result, Value::Str("1234|4321".into()));
}

#[test]
fn reverse_of_empty_and_single_element_arrays() {
    let result = eval(
        "var empty: array.int[*];\
         var single: array.int[*] = [9];\
         var seen: string = \"s\";\
         foreach x in array.reverse(empty) { seen += x; }\
         foreach x in array.reverse(single) { seen += x; }\
         return seen;",
    );
    assert_eq!(result, Value::Str("s9".into()));
}

#[test]
fn reverse_iteration_supports_break_and_continue() {
    let result = eval(
        "var xs: array.int[*] = [1, 2, 3, 4, 5];\
         var seen: string = \"\";\
         foreach x in array.reverse(xs) {\
             if x == 4 { continue; }\
             if x == 1 { break; }\
             seen += x;\
         }\
         return seen;",
    );
    assert_eq!(result, Value::Str("532".into()));
}

#[test]
fn bitmap_grid_round_trips_without_conversion_errors() {
    let result = eval(
        "var grid: array.bitmap[3, 3];\
         grid[0, 0] = 1;\
         grid[2, 2] = 9;\
         return grid[0, 0] + \"-\" + grid[2, 2] + \"-\" + grid[1][1];",
    );
    assert_eq!(result, Value::Str("1-9-0".into()));
}

#[test]
fn intmap_grid_holds_wide_values() {
    let result = eval(
        "var grid: array.intmap[2, 2];\
         grid[0][1] = 70000;\
         return grid[0][1];",
    );
    assert_eq!(result, Value::Int(70000));
}

#[test]
fn string_into_int_array_must_be_numeric() {
    let err = eval_err("var xs: array.int[3]; xs[0] = \"twelve\";");
    assert!(matches!(err, ScriptError::TypeConversion { .. }));
}

#[test]
fn array_index_out_of_bounds_reports_index_and_length() {
    let err = eval_err("var xs: array.int[2];\nreturn xs[5];");
    match err {
        ScriptError::ArrayIndex { line, index, length } => {
            assert_eq!(line, 2);
            assert_eq!(index, 5);
            assert_eq!(length, 2);
        }
        other => panic!("expected index error, got {:?}", other),
    }
}

#[test]
fn map_sorted_roundtrip_preserves_content() {
    let result = eval(
        "var m: map = { zulu: 1, alpha: 2, mike: 3 };\
         var rt: map = map.tounsorted(map.tosorted(m));\
         if map.length(rt) != map.length(m) { return false; }\
         foreach k in m {\
             if rt[k] != m[k] { return false; }\
         }\
         return true;",
    );
    assert_eq!(result, Value::Bool(true));
}

#[test]
fn map_conversions_never_mutate_the_source() {
    let result = eval(
        "var m: map = { b: 1, a: 2 };\
         var s: map = map.tosorted(m);\
         s[\"c\"] = 3;\
         return map.length(m) + \"|\" + map.has(m, \"c\") + \"|\" + map.issorted(s);",
    );
    assert_eq!(result, Value::Str("2|false|true".into()));
}

#[test]
fn record_constraints_enforced_end_to_end() {
    let header = "typeof person: record { id: int[mandatory], name: string[maxlength:5, default:\"none\"] };";

    let ok = eval(&format!("{} var p: person = {{ id: 1 }}; return p.name;", header));
    assert_eq!(ok, Value::Str("none".into()));

    let missing = eval_err(&format!("{} var p: person = {{}};", header));
    assert!(matches!(missing, ScriptError::RecordValidation { .. }));

    let toolong = eval_err(&format!(
        "{} var p: person = {{ id: 1, name: \"toolong\" }};",
        header
    ));
    assert!(matches!(toolong, ScriptError::RecordValidation { .. }));

    let unknown = eval_err(&format!(
        "{} var p: person = {{ id: 1, nick: \"x\" }};",
        header
    ));
    assert!(matches!(unknown, ScriptError::RecordValidation { .. }));
}

#[test]
fn record_field_assignment_revalidates() {
    let err = eval_err(
        "typeof person: record { name: string[maxlength:3] };\
         var p: person = { name: \"abc\" };\
         p.name = \"abcdef\";",
    );
    assert!(matches!(err, ScriptError::RecordValidation { .. }));
}

#[test]
fn string_builtins_cover_the_basics() {
    assert_eq!(
        eval("return string.upper(\"abc\");"),
        Value::Str("ABC".into())
    );
    assert_eq!(
        eval("return string.substr(\"hello\", 1, 3);"),
        Value::Str("ell".into())
    );
    assert_eq!(eval("return string.indexof(\"hello\", \"ll\");"), Value::Int(2));
    assert_eq!(
        eval("var parts = string.split(\"a,b,c\", \",\"); return parts.length;"),
        Value::Int(3)
    );
}

#[test]
fn json_round_trips_maps_and_arrays() {
    let result = eval(
        "var m: map = { name: \"ada\", tags: [1, 2] };\
         var decoded: map = json.decode(json.encode(m));\
         return decoded[\"name\"] + decoded[\"tags\"][1];",
    );
    assert_eq!(result, Value::Str("ada2".into()));
}

#[test]
fn date_literals_expose_components() {
    let result = eval(
        "var d: date = \"2024-03-01 10:30\";\
         return date.year(d) + \"-\" + date.month(d) + \"-\" + date.day(d) + \" \" + date.hour(d);",
    );
    assert_eq!(result, Value::Str("2024-3-1 10".into()));
}

#[test]
fn screens_declare_variables_readable_by_the_host() {
    let mut runtime = ScriptRuntime::new();
    runtime
        .execute_source(
            "screen main { var title: string = \"ready\"; var count: int = 2; }",
            None,
        )
        .expect("execution");
    assert_eq!(
        runtime.get_variable("main", "title"),
        Some(Value::Str("ready".into()))
    );
    assert_eq!(runtime.get_variable("main", "count"), Some(Value::Int(2)));
    runtime.set_variable("main", "count", Value::Int(7));
    assert_eq!(
        runtime
            .execute_source("return screen.get(\"main\", \"count\");", None)
            .expect("execution"),
        Some(Value::Int(7))
    );
    runtime.shutdown();
}

#[test]
fn invoke_runs_a_named_function() {
    let mut runtime = ScriptRuntime::new();
    runtime
        .execute_source("function double(n: int) { return n * 2; }", None)
        .expect("execution");
    let result = runtime.invoke("double", vec![Value::Int(21)]).expect("invoke");
    assert_eq!(result, Value::Int(42));
    runtime.shutdown();
}

#[test]
fn runtime_errors_do_not_poison_the_runtime() {
    let (sink, _buffer) = OutputSink::capture();
    let mut runtime = ScriptRuntime::with_output(sink);
    let err = runtime
        .execute_source("return 1 % 0;", None)
        .expect_err("expected failure");
    assert!(matches!(err, ScriptError::ModuloByZero { .. }));
    // The same runtime keeps executing afterwards.
    let ok = runtime
        .execute_source("return 2 + 2;", None)
        .expect("execution");
    assert_eq!(ok, Some(Value::Int(4)));
    runtime.shutdown();
}

#[test]
fn deep_call_chains_hit_the_depth_limit() {
    let err = eval_err("function down(n: int) { return down(n + 1); } return down(0);");
    match err {
        ScriptError::Runtime { message, .. } => {
            assert!(message.to_lowercase().contains("depth"))
        }
        other => panic!("expected depth error, got {:?}", other),
    }
}
