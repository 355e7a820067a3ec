//! Benchmarks for the lowering pipeline

use criterion::{criterion_group, criterion_main, Criterion};
use rsharp_ir::{run_pipeline, Architecture, TargetArch};
use rsharp_lexer::Lexer;
use rsharp_parser::{Parser, ParsingCache};
use std::hint::black_box;
use std::path::PathBuf;

const PROGRAM: &str = r#"
fact(n: i32) : i32 { if (n <= 1) return 1; return n * fact(n - 1); }
sum(limit: i32) : i32 {
    s: i32 = 0;
    for (i: i32 = 0; i < limit; i = i + 1) {
        if (i % 3 == 0) skip;
        s = s + i * 2 - i / 2;
    }
    return s;
}
main() : i32 { return fact(10) + sum(100); }
"#;

fn typed_program() -> rsharp_typechecker::TProgram {
    let mut sources = rsharp_common::SourceMap::new();
    let file_id = sources.add("bench.rs", PROGRAM);
    let mut lexer = Lexer::new(PROGRAM, file_id);
    let tokens = lexer.tokenize();
    let mut parser = Parser::new(tokens, PathBuf::from("bench.rs"), None);
    let mut cache = ParsingCache::new();
    let program = parser.parse_program(&mut cache, &mut sources);
    let (typed, diagnostics) = rsharp_typechecker::check(&program);
    assert!(!diagnostics.has_errors());
    typed
}

fn bench_lowering(c: &mut Criterion) {
    let typed = typed_program();

    c.bench_function("ir_generation", |b| {
        b.iter(|| black_box(rsharp_ir::generate(black_box(&typed)).unwrap()))
    });

    for (name, target) in [("x86_64", TargetArch::X86_64), ("aarch64", TargetArch::Aarch64)] {
        c.bench_function(&format!("full_pipeline_{}", name), |b| {
            b.iter(|| {
                let mut tu = rsharp_ir::generate(&typed).unwrap();
                let arch = Architecture::for_target(target);
                run_pipeline(&mut tu, &arch).unwrap();
                black_box(rsharp_ir::emit::emit_translation_unit(&tu, &arch).unwrap())
            })
        });
    }
}

criterion_group!(benches, bench_lowering);
criterion_main!(benches);
