//! Structural checks over the emitted assembly of both back ends

use rsharp_ir::emit::emit_translation_unit;
use rsharp_ir::{run_pipeline, Architecture, TargetArch};
use rsharp_lexer::Lexer;
use rsharp_parser::{Parser, ParsingCache};
use std::path::PathBuf;

fn compile(source: &str, target: TargetArch) -> String {
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
fn nasm_output_has_the_expected_skeleton() {
    let asm = compile("main() : i32 { return 2 + 3 * 4; }", TargetArch::X86_64);
    assert!(asm.contains("BITS 64"));
    assert!(asm.contains("section .text"));
    assert!(asm.contains("global main"));
    assert!(asm.contains("main:"));
    assert!(asm.contains("push rbp"));
    assert!(asm.contains("mov rbp, rsp"));
    assert!(asm.contains("imul"));
    assert!(asm.contains("ret"));
}

#[test]
fn aarch64_output_has_the_expected_skeleton() {
    let asm = compile("main() : i32 { return 2 + 3 * 4; }", TargetArch::Aarch64);
    assert!(asm.contains(".text"));
    assert!(asm.contains(".global main"));
    assert!(asm.contains("main:"));
    assert!(asm.contains("stp x29, x30"));
    assert!(asm.contains("mul "));
    assert!(asm.contains("ret"));
}

#[test]
fn large_constant_decomposes_into_movz_and_movk_chain() {
    // 0x1234_5678_9ABC_DEF0
    let asm = compile(
        "main() : i64 { x: i64 = 1311768467463790320; return x; }",
        TargetArch::Aarch64,
    );
    assert!(asm.contains("movz"), "missing movz in:\n{}", asm);
    assert!(asm.contains("#57072"), "low 16 bits: {:#x}", 0xDEF0);
    assert!(asm.contains("#39612, lsl #16"));
    assert!(asm.contains("#22136, lsl #32"));
    assert!(asm.contains("#4660, lsl #48"));
}

#[test]
fn zero_constant_is_a_single_movz() {
    let asm = compile("main() : i64 { x: i64 = 0; return x; }", TargetArch::Aarch64);
    let movz_zero = asm.lines().filter(|l| l.trim().starts_with("movz") && l.contains("#0")).count();
    assert!(movz_zero >= 1, "zero should load with a single movz:\n{}", asm);
}

#[test]
fn division_emits_sign_extension_and_idiv() {
    let asm = compile(
        "main() : i32 { a: i32 = 0 - 9; return a / 2; }",
        TargetArch::X86_64,
    );
    assert!(asm.contains("cqo"));
    assert!(asm.contains("idiv"));
    // rdx is preserved around the division
    assert!(asm.contains("push rdx"));
    assert!(asm.contains("pop rdx"));
}

#[test]
fn aarch64_divides_with_sdiv_and_no_modulo() {
    let asm = compile(
        "main() : i32 { a: i32 = 9; return a % 2; }",
        TargetArch::Aarch64,
    );
    assert!(asm.contains("sdiv"));
    assert!(asm.contains("msub") || asm.contains("mul "), "mod lowers to div/mul/sub");
    assert!(asm.contains("sub "));
}

#[test]
fn comparisons_use_setcc_and_zero_extension_on_x86_64() {
    let asm = compile("main() : i32 { a: i32 = 1; return a < 2; }", TargetArch::X86_64);
    assert!(asm.contains("cmp "));
    assert!(asm.contains("setl "));
    assert!(asm.contains("movzx "));
}

#[test]
fn comparisons_use_cset_on_aarch64() {
    let asm = compile("main() : i32 { a: i32 = 1; return a < 2; }", TargetArch::Aarch64);
    assert!(asm.contains("cmp "));
    assert!(asm.contains("cset "));
    assert!(asm.contains(", lt"));
}

#[test]
fn conditional_jumps_lower_per_target() {
    let source = "main() : i32 { if (1) return 2; return 3; }";
    let nasm = compile(source, TargetArch::X86_64);
    assert!(nasm.contains("je .else_"));
    assert!(nasm.contains("jmp .end_"));

    let a64 = compile(source, TargetArch::Aarch64);
    assert!(a64.contains("cbz "));
    assert!(a64.contains("b .end_"));
}

#[test]
fn globals_land_in_data_and_bss_sections() {
    let source = "counter: i32 = 7;\nscratch: i32;\nmain() : i32 { scratch = counter; return scratch; }";
    let nasm = compile(source, TargetArch::X86_64);
    assert!(nasm.contains("section .data"));
    assert!(nasm.contains(": dq 7"));
    assert!(nasm.contains("section .bss"));
    assert!(nasm.contains(": resb 8"));

    let a64 = compile(source, TargetArch::Aarch64);
    assert!(a64.contains(".data"));
    assert!(a64.contains(": .quad 7"));
    assert!(a64.contains(".bss"));
    assert!(a64.contains(": .skip 8"));
}

#[test]
fn extern_functions_produce_extern_directives() {
    let source = "[extern] puts(s: *i8) : i32;\nmain() : i32 { puts(\"hi\"); return 0; }";
    let nasm = compile(source, TargetArch::X86_64);
    assert!(nasm.contains("extern puts"));
    assert!(nasm.contains("call puts"));
    // the string lands NUL-terminated in the data section
    assert!(nasm.contains("db 104, 105, 0"));

    let a64 = compile(source, TargetArch::Aarch64);
    assert!(a64.contains(".extern puts"));
    assert!(a64.contains("bl puts"));
    assert!(a64.contains(".byte 104, 105, 0"));
}

#[test]
fn internal_function_labels_are_suffixed_but_main_is_not() {
    let source = "helper() : i32 { return 1; }\nmain() : i32 { return helper(); }";
    let asm = compile(source, TargetArch::X86_64);
    assert!(asm.contains("global main\n"));
    assert!(!asm.contains("global helper\n"), "helper must get a unique suffix");
    assert!(asm.contains("global helper_"));
    assert!(asm.contains("call helper_"));
}

#[test]
fn address_of_uses_frame_relative_lea() {
    let asm = compile(
        "main() : i32 { x: i32 = 41; p: *i32 = $x; *p = *p + 1; return x; }",
        TargetArch::X86_64,
    );
    assert!(asm.contains("lea "), "address-of should lower to lea:\n{}", asm);
    assert!(asm.contains("rbp"));
}

#[test]
fn address_of_uses_frame_subtraction_on_aarch64() {
    let asm = compile(
        "main() : i32 { x: i32 = 41; p: *i32 = $x; *p = *p + 1; return x; }",
        TargetArch::Aarch64,
    );
    assert!(asm.contains("sub ") && asm.contains("x29"), "{}", asm);
    assert!(asm.contains("str "));
    assert!(asm.contains("ldr "));
}

#[test]
fn calls_save_and_restore_live_caller_saved_registers() {
    let source = "f(a: i32) : i32 { return a; }\nmain() : i32 { x: i32 = 3; return f(1) + x; }";
    let nasm = compile(source, TargetArch::X86_64);
    // arguments travel through a stack slot into rdi
    assert!(nasm.contains("mov rdi, [rsp"));
    let a64 = compile(source, TargetArch::Aarch64);
    assert!(a64.contains("ldr x0, [sp"));
    assert!(a64.contains("bl "));
}

#[test]
fn pointer_arithmetic_scales_by_the_pointee_size() {
    let source = "main() : i32 { x: i32 = 1; p: *i32 = $x; q: *i32 = p + 1; return 0; }";
    let nasm = compile(source, TargetArch::X86_64);
    // the index is multiplied by 4 before the add
    assert!(nasm.contains("imul"), "{}", nasm);
}
