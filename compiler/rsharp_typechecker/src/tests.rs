//! Semantic validator tests

use crate::{check, RsType, TExprKind, TProgram, TStmt};
use rsharp_common::Diagnostics;
use rsharp_lexer::Lexer;
use rsharp_parser::{Parser, ParsingCache};
use std::path::PathBuf;

fn check_source(source: &str) -> (TProgram, Diagnostics) {
    let mut sources = rsharp_common::SourceMap::new();
    let file_id = sources.add("test.rs", source);
    let mut lexer = Lexer::new(source, file_id);
    let tokens = lexer.tokenize();
    assert!(!lexer.diagnostics().has_errors());
    let mut parser = Parser::new(tokens, PathBuf::from("test.rs"), None);
    let mut cache = ParsingCache::new();
    let program = parser.parse_program(&mut cache, &mut sources);
    assert!(!parser.diagnostics().has_errors(), "{:?}", parser.diagnostics().messages);
    check(&program)
}

fn check_ok(source: &str) -> TProgram {
    let (program, diagnostics) = check_source(source);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages);
    program
}

fn check_err(source: &str) {
    let (_, diagnostics) = check_source(source);
    assert!(diagnostics.has_errors(), "expected a semantic error");
}

#[test]
fn accepts_basic_arithmetic() {
    let program = check_ok("main() : i32 { return 2 + 3 * 4; }");
    assert_eq!(program.functions.len(), 1);
}

#[test]
fn inserts_conversion_for_mixed_widths() {
    let program = check_ok("main() : i32 { a: i32 = 1; b: i64 = 2; c: i64 = a + b; return 0; }");
    let body = &program.functions[0].body;
    // `a + b` must widen `a` to i64
    let TStmt::VarDecl { init: Some(init), .. } = &body.items[2] else {
        panic!("expected declaration of c");
    };
    let TExprKind::Binary { left, .. } = &init.kind else { panic!("expected binary init") };
    assert!(matches!(left.kind, TExprKind::Convert(_)));
    assert_eq!(left.ty, RsType::I64);
}

#[test]
fn return_value_is_converted_to_function_type() {
    let program = check_ok("main() : i32 { return 1; }");
    let TStmt::Return(Some(value)) = &program.functions[0].body.items[0] else {
        panic!("expected return");
    };
    // the i64 literal narrows to the declared i32 return type
    assert_eq!(value.ty, RsType::I32);
}

#[test]
fn resolves_calls_to_later_functions() {
    check_ok("main() : i32 { return helper(); }\nhelper() : i32 { return 1; }");
}

#[test]
fn resolves_recursion() {
    check_ok(
        "fact(n: i32) : i32 { if (n <= 1) return 1; return n * fact(n - 1); }\nmain() : i32 { return fact(5); }",
    );
}

#[test]
fn rejects_unknown_variable() {
    check_err("main() : i32 { return x; }");
}

#[test]
fn rejects_unknown_function() {
    check_err("main() : i32 { return missing(); }");
}

#[test]
fn rejects_wrong_argument_count() {
    check_err("f(a: i32) : i32 { return a; }\nmain() : i32 { return f(1, 2); }");
}

#[test]
fn rejects_duplicate_declaration_in_same_scope() {
    check_err("main() : i32 { a: i32 = 1; a: i32 = 2; return a; }");
}

#[test]
fn allows_shadowing_in_inner_scope() {
    check_ok("main() : i32 { a: i32 = 1; { a: i32 = 2; } return a; }");
}

#[test]
fn rejects_break_outside_loop() {
    check_err("main() : i32 { break; return 0; }");
}

#[test]
fn accepts_break_and_skip_inside_loops() {
    check_ok(
        "main() : i32 { s: i32 = 0; for (i: i32 = 0; i < 10; i = i + 1) { if (i == 5) break; if (i == 2) skip; s = s + i; } return s; }",
    );
}

#[test]
fn rejects_missing_main() {
    check_err("helper() : i32 { return 1; }");
}

#[test]
fn pointer_flow_typechecks() {
    let program = check_ok("main() : i32 { x: i32 = 41; p: *i32 = $x; *p = *p + 1; return x; }");
    // $x marks x as address-taken
    let x = program
        .vars
        .iter_ids()
        .find(|id| program.vars.get(*id).name == "x")
        .expect("x exists");
    assert!(program.vars.get(x).address_taken);
}

#[test]
fn rejects_dereference_of_non_pointer() {
    check_err("main() : i32 { a: i32 = 1; return *a; }");
}

#[test]
fn rejects_address_of_expression() {
    check_err("main() : i32 { return $(1 + 2); }");
}

#[test]
fn rejects_address_of_global() {
    check_err("g: i32 = 1;\nmain() : i32 { p: *i32 = $g; return 0; }");
}

#[test]
fn pointer_arithmetic_keeps_pointer_type() {
    let program = check_ok("main() : i32 { x: i32 = 1; p: *i32 = $x; q: *i32 = p + 1; return 0; }");
    let TStmt::VarDecl { init: Some(init), .. } = &program.functions[0].body.items[2] else {
        panic!("expected declaration of q");
    };
    assert_eq!(init.ty, RsType::pointer_to(RsType::I32));
}

#[test]
fn rejects_pointer_plus_pointer() {
    check_err("main() : i32 { x: i32 = 1; p: *i32 = $x; q: *i32 = p + p; return 0; }");
}

#[test]
fn string_literal_is_i8_pointer() {
    let program = check_ok(
        "[extern] puts(s: *i8) : i32;\nmain() : i32 { puts(\"hi\"); return 0; }",
    );
    assert_eq!(program.functions.len(), 1); // extern functions carry no body
    assert!(program.funcs.find_by_name("puts").is_some());
}

#[test]
fn global_initializer_must_be_literal() {
    check_err("g: i32 = 1 + 2;\nmain() : i32 { return g; }");
    let program = check_ok("g: i32 = 3;\nmain() : i32 { return g; }");
    assert_eq!(program.globals.len(), 1);
    assert_eq!(program.globals[0].init, Some(3));
}

#[test]
fn rejects_array_locals_and_literals() {
    check_err("main() : i32 { a: [i32, 3] = [1, 2, 3]; return 0; }");
    check_err("main() : i32 { a: [i32, 3]; return 0; }");
}

#[test]
fn rejects_array_parameters() {
    check_err("f(a: [i32, 3]) : i32 { return 0; }\nmain() : i32 { return 0; }");
}

#[test]
fn rejects_duplicate_function() {
    check_err("f() : i32 { return 1; }\nf() : i32 { return 2; }\nmain() : i32 { return 0; }");
}

#[test]
fn allows_repeated_extern_declaration() {
    check_ok(
        "[extern] puts(s: *i8) : i32;\n[extern] puts(s: *i8) : i32;\nmain() : i32 { return 0; }",
    );
}

#[test]
fn condition_must_be_numeric() {
    check_err("f() : c_void { }\nmain() : i32 { while (f()) { } return 0; }");
}
