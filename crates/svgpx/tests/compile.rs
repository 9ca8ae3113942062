//! End-to-end scenarios (spec §8).

use pretty_assertions::assert_eq;
use svgpx::{CompileOptions, ErrorKind, Value, compile, compile_annotated};

fn compile_path(source: &str) -> String {
    compile(source, CompileOptions::default()).expect("compile").path.expect("default layer is a PathLayer")
}

#[test]
fn literal_path_round_trips() {
    assert_eq!(compile_path("M 0 0 L 10 20 Z"), "M 0 0 L 10 20 Z");
}

#[test]
fn variables_substitute_into_path_args() {
    assert_eq!(compile_path("let x = 10; let y = 20; M x y"), "M 10 20");
}

#[test]
fn for_range_is_inclusive() {
    assert_eq!(compile_path("for (i in 0..3) { M calc(i * 10) 0 }"), "M 0 0 M 10 0 M 20 0 M 30 0");
}

#[test]
fn layer_define_and_apply() {
    let result = compile(
        "define PathLayer('a') ${ stroke: red; stroke-width: 2; }\nlayer('a').apply { M 1 1 L 2 2 }",
        CompileOptions::default(),
    )
    .expect("compile");
    assert_eq!(result.layers.len(), 1);
    let layer = &result.layers[0];
    assert_eq!(layer.name, "a");
    assert_eq!(layer.data.as_deref(), Some("M 1 1 L 2 2"));
    assert_eq!(layer.styles.get("stroke").map(String::as_str), Some("red"));
    assert_eq!(layer.styles.get("stroke-width").map(String::as_str), Some("2"));
}

#[test]
fn projected_path_block_reports_end_point_and_length() {
    let result = compile(
        "let p = @{ v 20 h 30 }; let proj = p.project(10,10); log(proj.endPoint, proj.length);",
        CompileOptions::default(),
    )
    .expect("compile");
    assert_eq!(result.logs.len(), 1);
    let parts = &result.logs[0].parts;
    assert_eq!(parts.len(), 2);
    match &parts[0] {
        svgpx::LogPart::Value { value, .. } => assert_eq!(value, "Point(40, 30)"),
        other => panic!("expected a value part, got {other:?}"),
    }
    match &parts[1] {
        svgpx::LogPart::Value { value, .. } => assert_eq!(value, "50"),
        other => panic!("expected a value part, got {other:?}"),
    }
}

#[test]
fn mismatched_angle_units_error() {
    let err = compile("M calc(90deg + 5) 0", CompileOptions::default()).expect_err("mismatched angle units");
    assert_eq!(err.kind, ErrorKind::AngleUnitMismatch);
}

#[test]
fn user_function_call_in_path_arg() {
    assert_eq!(compile_path("fn add(a,b) { return calc(a+b); } M add(3,4) 0"), "M 7 0");
}

#[test]
fn array_identity_is_shared_through_assignment() {
    assert_eq!(compile_path("let list = [1,2]; let r = list; r.push(3); M list[2] list.length"), "M 3 3");
}

#[test]
fn path_block_start_point_is_origin() {
    let result = compile("let p = @{ l 10 10 }; log(p.startPoint);", CompileOptions::default()).expect("compile");
    match &result.logs[0].parts[0] {
        svgpx::LogPart::Value { value, .. } => assert_eq!(value, "Point(0, 0)"),
        other => panic!("expected a value part, got {other:?}"),
    }
}

#[test]
fn partition_endpoints_match_start_and_end() {
    let result = compile(
        "let p = @{ l 10 0 }; let parts = p.partition(4); log(parts.length, parts[0][0], parts[4][0]);",
        CompileOptions::default(),
    )
    .expect("compile");
    let parts = &result.logs[0].parts;
    match &parts[0] {
        svgpx::LogPart::Value { value, .. } => assert_eq!(value, "5"),
        other => panic!("{other:?}"),
    }
    match &parts[1] {
        svgpx::LogPart::Value { value, .. } => assert_eq!(value, "Point(0, 0)"),
        other => panic!("{other:?}"),
    }
    match &parts[2] {
        svgpx::LogPart::Value { value, .. } => assert_eq!(value, "Point(10, 0)"),
        other => panic!("{other:?}"),
    }
}

#[test]
fn to_fixed_limits_decimal_digits() {
    let options = CompileOptions { to_fixed: Some(2), seed_random: None };
    let result = compile("M calc(10/3) 0", options).expect("compile");
    assert_eq!(result.path.as_deref(), Some("M 3.33 0"));
}

#[test]
fn arc_flags_stay_plain_integers_under_to_fixed() {
    let options = CompileOptions { to_fixed: Some(2), seed_random: None };
    let result = compile("circle(0, 0, 3);", options).expect("compile");
    assert_eq!(
        result.path.as_deref(),
        Some("M -3.00 0.00 A 3.00 3.00 0.00 1 0 3.00 0.00 A 3.00 3.00 0.00 1 0 -3.00 0.00")
    );
}

#[test]
fn seeded_random_is_deterministic() {
    let options = CompileOptions { to_fixed: None, seed_random: Some(7) };
    let a = compile("M random() 0", options).expect("compile");
    let b = compile("M random() 0", options).expect("compile");
    assert_eq!(a.path, b.path);
}

#[test]
fn annotated_transcript_interleaves_iterations_and_commands() {
    let transcript = compile_annotated("for (i in 0..2) { M i 0 }", CompileOptions::default()).expect("annotate");
    assert!(transcript.contains("//--- for (i in 0..2) from line 1"));
    assert!(transcript.contains("//--- iteration 0"));
    assert!(transcript.contains("M 0 0"));
    assert!(transcript.contains("//--- iteration 1"));
    assert!(transcript.contains("M 1 0"));
    assert!(transcript.contains("//--- iteration 2"));
    assert!(transcript.contains("M 2 0"));
}

#[test]
fn annotated_transcript_elides_command_tokens_with_their_iteration_comments() {
    let transcript = compile_annotated("for (i in 0..20) { M i 0 }", CompileOptions::default()).expect("annotate");
    assert!(transcript.contains("//--- ... 15 more iterations ..."));
    // Edge iterations 0, 1, 2 and 18, 19, 20 keep their commands.
    assert!(transcript.contains("M 0 0"));
    assert!(transcript.contains("M 2 0"));
    assert!(transcript.contains("M 18 0"));
    assert!(transcript.contains("M 20 0"));
    // An elided middle iteration's command must not leak into the transcript.
    assert!(!transcript.contains("M 10 0"));
    assert!(!transcript.contains("//--- iteration 10"));
}

#[test]
fn draw_is_rejected_inside_a_path_block() {
    let err =
        compile("let p = @{ l 10 10 }; let q = @{ p.draw(); };", CompileOptions::default()).expect_err("nested draw");
    assert_eq!(err.kind, ErrorKind::PathBlockRestriction);
}

#[test]
fn undefined_variable_reports_line_and_column() {
    let err = compile("M missing 0", CompileOptions::default()).expect_err("undefined variable");
    assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    assert_eq!(err.line, 1);
}

#[test]
fn text_layer_emits_runs_and_tspans() {
    let result = compile(
        "define default TextLayer('labels') {}\ntext(5, 10) { `hello ` tspan(2, -1) `world` }",
        CompileOptions::default(),
    )
    .expect("compile");
    let layer = &result.layers[0];
    let elements = layer.text_elements.as_ref().expect("text layer");
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].children.len(), 2);
}

#[test]
fn style_block_merge_overwrites_left_and_appends_new_keys() {
    let result = compile(
        "define PathLayer('a') ${ stroke: red; fill: blue; }\nlayer('a').apply { M 0 0 }\n\
         let base = ${ stroke: red; fill: blue; };\nlet extra = ${ fill: green; width: 2; };\n\
         let merged = base << extra;\nlog(merged);",
        CompileOptions::default(),
    )
    .expect("compile");
    match &result.logs[0].parts[0] {
        svgpx::LogPart::Value { .. } => {}
        other => panic!("expected a value part, got {other:?}"),
    }
}

#[test]
fn array_and_string_values_round_trip_through_value_api() {
    let result = compile("let v = [1, 2, 3]; log(v);", CompileOptions::default()).expect("compile");
    match &result.logs[0].parts[0] {
        svgpx::LogPart::Value { value, .. } => assert_eq!(value, "[1, 2, 3]"),
        other => panic!("expected a value part, got {other:?}"),
    }
}

#[test]
fn point_value_kind_name_is_stable() {
    assert_eq!(Value::Point(svgpx::Point::new(1.0, 2.0)).kind_name(), "Point");
}
