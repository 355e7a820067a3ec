//! End-to-end scenarios: source to assembly always, source to executable
//! when the host toolchain is available

use rsharp_common::SourceMap;
use rsharp_ir::emit::emit_translation_unit;
use rsharp_ir::{run_pipeline, Architecture, TargetArch};
use rsharp_lexer::Lexer;
use rsharp_parser::{imports, Parser, ParsingCache};
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

const SCENARIOS: &[(&str, &str)] = &[
    ("arith", "main() : i32 { return 2 + 3 * 4; }"),
    (
        "fact",
        "fact(n: i32) : i32 { if (n <= 1) return 1; return n * fact(n - 1); }\nmain() : i32 { return fact(5); }",
    ),
    (
        "globals",
        "counter: i32 = 0;\nbump() : c_void { counter = counter + 1; }\nmain() : i32 { bump(); bump(); bump(); return counter; }",
    ),
    (
        "pointers",
        "main() : i32 { x: i32 = 41; p: *i32 = $x; *p = *p + 1; return x; }",
    ),
    (
        "loop_break",
        "main() : i32 { s: i32 = 0; for (i: i32 = 0; i < 100; i = i + 1) { if (i == 10) break; s = s + i; } return s; }",
    ),
    (
        "extern_puts",
        "[extern] puts(s: *i8) : i32;\nmain() : i32 { puts(\"hi\"); return 0; }",
    ),
];

fn compile_to_assembly(source: &str, target: TargetArch) -> String {
    let mut sources = rsharp_common::SourceMap::new();
    let file_id = sources.add("test.rs", source);
    let mut lexer = Lexer::new(source, file_id);
    let tokens = lexer.tokenize();
    assert!(!lexer.diagnostics().has_errors());
    let mut parser = Parser::new(tokens, PathBuf::from("test.rs"), None);
    let mut cache = ParsingCache::new();
    let program = parser.parse_program(&mut cache, &mut sources);
    assert!(!parser.diagnostics().has_errors(), "{:?}", parser.diagnostics().messages);
    let (typed, diagnostics) = rsharp_typechecker::check(&program);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages);

    let mut tu = rsharp_ir::generate(&typed).unwrap();
    let arch = Architecture::for_target(target);
    run_pipeline(&mut tu, &arch).unwrap();
    emit_translation_unit(&tu, &arch).unwrap()
}

#[test]
fn every_scenario_lowers_to_both_targets() {
    for (name, source) in SCENARIOS {
        for target in [TargetArch::X86_64, TargetArch::Aarch64] {
            let asm = compile_to_assembly(source, target);
            assert!(asm.contains("main:"), "{}: no main label for {:?}", name, target);
            assert!(asm.contains("ret"), "{}: no return for {:?}", name, target);
        }
    }
}

#[test]
fn imported_functions_compile_across_files() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("util.rs"), "helper() : i32 { return 7; }").unwrap();
    let main = dir.path().join("main.rs");
    std::fs::write(&main, "helper @ util;\nmain() : i32 { return helper(); }").unwrap();

    let mut cache = ParsingCache::new();
    let mut sources = SourceMap::new();
    let (program, diagnostics) = imports::parse_file(&main, None, &mut cache, &mut sources).unwrap();
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages);
    let (typed, diagnostics) = rsharp_typechecker::check(&program);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages);

    let mut tu = rsharp_ir::generate(&typed).unwrap();
    let arch = Architecture::x86_64();
    run_pipeline(&mut tu, &arch).unwrap();
    let asm = emit_translation_unit(&tu, &arch).unwrap();
    assert!(asm.contains("call helper_"), "{}", asm);
}

fn rsharp_binary() -> &'static str {
    env!("CARGO_BIN_EXE_rsharp")
}

#[test]
fn syntax_errors_exit_with_code_2() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("broken.rs");
    std::fs::write(&input, "main() : i32 { return 1 }").unwrap();

    let status = Command::new(rsharp_binary())
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("out"))
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));
}

#[test]
fn semantic_errors_exit_with_code_3() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("broken.rs");
    std::fs::write(&input, "main() : i32 { return undefined_variable; }").unwrap();

    let status = Command::new(rsharp_binary())
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("out"))
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(3));
}

#[test]
fn errors_in_imported_files_are_reported_against_that_file() {
    let dir = TempDir::new().unwrap();
    // the syntax error sits on line 2 of helper.rs
    std::fs::write(
        dir.path().join("helper.rs"),
        "ok() : i32 { return 1; }\nbroken( : i32 {}",
    )
    .unwrap();
    let input = dir.path().join("main.rs");
    std::fs::write(&input, "* @ helper;\nmain() : i32 { return ok(); }").unwrap();

    let output = Command::new(rsharp_binary())
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("out"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("helper.rs:2:"),
        "diagnostic must name the imported file and its line:\n{}",
        stderr
    );
    // the echoed context comes from helper.rs, not main.rs
    assert!(stderr.contains("broken( : i32 {}"), "{}", stderr);
    assert!(!stderr.contains("main.rs:2:"), "{}", stderr);
}

#[test]
fn unknown_format_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("ok.rs");
    std::fs::write(&input, "main() : i32 { return 0; }").unwrap();

    let status = Command::new(rsharp_binary())
        .arg(&input)
        .arg("-f")
        .arg("wasm")
        .arg("-o")
        .arg(dir.path().join("out"))
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

/// Native execution needs nasm, a C compiler and an x86-64 Linux host
fn native_toolchain_available() -> bool {
    if !cfg!(all(target_arch = "x86_64", target_os = "linux")) {
        return false;
    }
    let have = |tool: &str| {
        Command::new(tool)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    };
    have("nasm") && have("gcc")
}

fn build_and_run(source: &str) -> (i32, String) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("program.rs");
    std::fs::write(&input, source).unwrap();
    let output = dir.path().join("program");

    let status = Command::new(rsharp_binary())
        .arg(&input)
        .arg("-f")
        .arg("nasm")
        .arg("-o")
        .arg(&output)
        .status()
        .unwrap();
    assert!(status.success(), "compilation failed for:\n{}", source);

    let run = Command::new(&output).output().unwrap();
    let exit = run.status.code().expect("program was killed by a signal");
    (exit, String::from_utf8_lossy(&run.stdout).to_string())
}

#[test]
fn native_scenarios_produce_the_specified_results() {
    if !native_toolchain_available() {
        eprintln!("skipping native execution: toolchain not available");
        return;
    }

    let expectations: &[(&str, i32, &str)] = &[
        (SCENARIOS[0].1, 14, ""),
        (SCENARIOS[1].1, 120, ""),
        (SCENARIOS[2].1, 3, ""),
        (SCENARIOS[3].1, 42, ""),
        (SCENARIOS[4].1, 45, ""),
        (SCENARIOS[5].1, 0, "hi\n"),
    ];
    for (source, exit, stdout) in expectations {
        let (got_exit, got_stdout) = build_and_run(source);
        assert_eq!(got_exit, *exit, "wrong exit code for:\n{}", source);
        if !stdout.is_empty() {
            assert_eq!(&got_stdout, stdout, "wrong output for:\n{}", source);
        }
    }
}

#[test]
fn native_division_truncates_toward_zero() {
    if !native_toolchain_available() {
        eprintln!("skipping native execution: toolchain not available");
        return;
    }

    // -9 / 2 == -4 and -9 % 2 == -1
    let (exit, _) = build_and_run("main() : i32 { return -9 / 2 + 10; }");
    assert_eq!(exit, 6);
    let (exit, _) = build_and_run("main() : i32 { return -9 % 2 + 10; }");
    assert_eq!(exit, 9);
}

#[test]
fn native_short_circuit_skips_side_effects() {
    if !native_toolchain_available() {
        eprintln!("skipping native execution: toolchain not available");
        return;
    }

    let source = "hits: i32 = 0;\nbump() : i32 { hits = hits + 1; return 1; }\nmain() : i32 { x: i32 = 0; if (x && bump()) { } if (1 || bump()) { } return hits; }";
    let (exit, _) = build_and_run(source);
    assert_eq!(exit, 0, "neither bump() call may run");
}

#[test]
fn native_while_and_do_while_loops() {
    if !native_toolchain_available() {
        eprintln!("skipping native execution: toolchain not available");
        return;
    }

    let source = "main() : i32 { n: i32 = 0; while (n < 5) { n = n + 1; } do { n = n + 1; } while (0); return n; }";
    let (exit, _) = build_and_run(source);
    assert_eq!(exit, 6);
}
