//! Pipeline-level invariants over fully lowered translation units

use rsharp_ir::{run_pipeline, Architecture, Opcode, Operand, TargetArch, TranslationUnit};
use rsharp_lexer::Lexer;
use rsharp_parser::{Parser, ParsingCache};
use std::collections::BTreeSet;
use std::path::PathBuf;

fn lower(source: &str, target: TargetArch) -> (TranslationUnit, Architecture) {
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
    (tu, arch)
}

const FACT: &str = "fact(n: i32) : i32 { if (n <= 1) return 1; return n * fact(n - 1); }\nmain() : i32 { return fact(5); }";

#[test]
fn two_operand_form_holds_after_lowering_on_x86_64() {
    let sources = [
        "main() : i32 { return 2 + 3 * 4; }",
        FACT,
        "main() : i32 { a: i32 = 9; b: i32 = 2; return a / b + a % b; }",
    ];
    for source in sources {
        let (tu, _) = lower(source, TargetArch::X86_64);
        for function in &tu.functions {
            for instr in &function.instructions {
                if instr.opcode.is_binary() && !instr.op2.is_none() {
                    // the address-of pattern keeps its dynamic-constant op1
                    if matches!(instr.op1, Operand::StackOffsetOf(_)) {
                        continue;
                    }
                    assert_eq!(
                        instr.result, instr.op1,
                        "{}: two-operand violation in {:?}",
                        function.name, instr
                    );
                }
            }
        }
    }
}

#[test]
fn divisions_are_pinned_to_the_quotient_register_on_x86_64() {
    let (tu, arch) = lower(
        "main() : i32 { a: i32 = 9; b: i32 = 2; return a / b + a % b; }",
        TargetArch::X86_64,
    );
    let mut seen = 0;
    for function in &tu.functions {
        for instr in &function.instructions {
            if matches!(instr.opcode, Opcode::Divide | Opcode::Modulo) {
                seen += 1;
                for operand in [&instr.result, &instr.op1] {
                    let id = operand.as_ref_id().expect("division operand is a reference");
                    assert_eq!(
                        tu.pool.register_of(id),
                        Some(arch.div_register),
                        "division not isolated: {:?}",
                        instr
                    );
                }
            }
        }
    }
    assert!(seen >= 2, "expected a division and a modulo to survive lowering");
}

#[test]
fn modulo_is_rewritten_away_on_aarch64() {
    let (tu, _) = lower(
        "main() : i32 { a: i32 = 9; b: i32 = 2; return a % b; }",
        TargetArch::Aarch64,
    );
    for function in &tu.functions {
        for instr in &function.instructions {
            assert_ne!(instr.opcode, Opcode::Modulo);
        }
    }
}

#[test]
fn global_accesses_become_memory_operations() {
    let source = "counter: i32 = 0;\nbump() : c_void { counter = counter + 1; }\nmain() : i32 { bump(); bump(); bump(); return counter; }";
    for target in [TargetArch::X86_64, TargetArch::Aarch64] {
        let (tu, _) = lower(source, target);
        for function in &tu.functions {
            for instr in &function.instructions {
                // after lowering, a global may only appear as the source of
                // an address-materializing move
                assert!(
                    !matches!(instr.result, Operand::Global(_)),
                    "global written directly: {:?}",
                    instr
                );
                assert!(!matches!(instr.op2, Operand::Global(_)));
                if matches!(instr.op1, Operand::Global(_)) {
                    assert_eq!(instr.opcode, Opcode::Move);
                }
            }
        }
    }
}

#[test]
fn interfering_references_never_share_a_register() {
    for target in [TargetArch::X86_64, TargetArch::Aarch64] {
        let (tu, _) = lower(FACT, target);
        for function in &tu.functions {
            for instr in &function.instructions {
                let live: Vec<_> = instr.meta.live_before.iter().copied().collect();
                for (i, a) in live.iter().enumerate() {
                    for b in &live[i + 1..] {
                        let reg_a = tu.pool.register_of(*a);
                        let reg_b = tu.pool.register_of(*b);
                        if reg_a.is_some() || reg_b.is_some() {
                            assert_ne!(
                                tu.pool.storage(*a),
                                tu.pool.storage(*b),
                                "{} and {} share storage while both live",
                                tu.pool.reference(*a).name,
                                tu.pool.reference(*b).name
                            );
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn liveness_never_exceeds_uses_plus_successor() {
    let (tu, _) = lower(FACT, TargetArch::X86_64);
    for function in &tu.functions {
        for (index, instr) in function.instructions.iter().enumerate() {
            let mut allowed: BTreeSet<_> = BTreeSet::new();
            if let Operand::Ref(op1) = instr.op1 {
                allowed.insert(op1);
            }
            if let Operand::Ref(op2) = instr.op2 {
                allowed.insert(op2);
            }
            if let Some(next) = function.instructions.get(index + 1) {
                allowed.extend(next.meta.live_before.iter().copied());
            }
            // jumps also admit liveness from their target label
            let is_jump = matches!(instr.opcode, Opcode::Jump | Opcode::JumpIfZero);
            if !is_jump {
                assert!(
                    instr.meta.live_before.is_subset(&allowed),
                    "{}: liveness beyond uses + successor at {}",
                    function.name,
                    index
                );
            }
        }
    }
}

#[test]
fn every_operand_reference_has_storage_after_allocation() {
    for target in [TargetArch::X86_64, TargetArch::Aarch64] {
        let sources = [
            FACT,
            "main() : i32 { x: i32 = 41; p: *i32 = $x; *p = *p + 1; return x; }",
            "g: i32 = 7;\nmain() : i32 { return g; }",
        ];
        for source in sources {
            let (tu, _) = lower(source, target);
            for function in &tu.functions {
                for instr in &function.instructions {
                    for operand in [&instr.result, &instr.op1, &instr.op2] {
                        if let Operand::Ref(id) = operand {
                            assert!(
                                tu.pool.storage(*id).is_some(),
                                "{}: unallocated reference {} in {:?}",
                                function.name,
                                tu.pool.reference(*id).name,
                                instr
                            );
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn address_taken_variables_live_on_the_stack() {
    let (tu, _) = lower(
        "main() : i32 { x: i32 = 41; p: *i32 = $x; *p = *p + 1; return x; }",
        TargetArch::X86_64,
    );
    let function = &tu.functions[0];
    assert!(function.meta.max_stack_usage >= 8, "x must occupy a stack slot");
    // the frame register participates in the function's register set
    let arch = Architecture::x86_64();
    assert!(function.meta.all_registers.contains(&arch.frame_pointer));
}

#[test]
fn lowering_is_idempotent_for_resolved_programs() {
    // no globals, no address-of: every pass should be at its fixpoint
    // after one run
    let (mut tu, arch) = lower(FACT, TargetArch::X86_64);
    let snapshot: Vec<Vec<_>> = tu.functions.iter().map(|f| f.instructions.clone()).collect();
    run_pipeline(&mut tu, &arch).unwrap();
    let again: Vec<Vec<_>> = tu.functions.iter().map(|f| f.instructions.clone()).collect();
    assert_eq!(snapshot, again);
}

#[test]
fn translation_unit_round_trips_through_serde() {
    let (tu, _) = lower(FACT, TargetArch::X86_64);
    let json = serde_json::to_string(&tu).unwrap();
    let back: TranslationUnit = serde_json::from_str(&json).unwrap();

    assert_eq!(tu.functions.len(), back.functions.len());
    for (original, reparsed) in tu.functions.iter().zip(&back.functions) {
        assert_eq!(original.instructions, reparsed.instructions);
        assert_eq!(original.name, reparsed.name);
    }
    assert_eq!(tu.pool.ref_count(), back.pool.ref_count());
}

#[test]
fn extern_functions_contribute_labels_not_bodies() {
    let (tu, _) = lower(
        "[extern] puts(s: *i8) : i32;\nmain() : i32 { puts(\"hi\"); return 0; }",
        TargetArch::X86_64,
    );
    assert_eq!(tu.functions.len(), 1);
    assert_eq!(tu.extern_labels.len(), 1);
    assert_eq!(tu.pool.label(tu.extern_labels[0]).name, "puts");
    assert_eq!(tu.strings.len(), 1);
    assert_eq!(tu.strings[0].1, b"hi\0".to_vec());
}

#[test]
fn call_results_and_parameters_keep_their_pinned_registers() {
    for target in [TargetArch::X86_64, TargetArch::Aarch64] {
        let (tu, arch) = lower(FACT, target);
        let mut calls = 0;
        let mut params = 0;
        for function in &tu.functions {
            for instr in &function.instructions {
                match instr.opcode {
                    Opcode::Call => {
                        calls += 1;
                        let id = instr.result.as_ref_id().unwrap();
                        assert_eq!(tu.pool.register_of(id), Some(arch.return_register));
                    }
                    Opcode::LoadParameter => {
                        params += 1;
                        let id = instr.result.as_ref_id().unwrap();
                        let Operand::Constant(index) = instr.op1 else { panic!() };
                        assert_eq!(
                            tu.pool.register_of(id),
                            Some(arch.parameter_registers[index as usize])
                        );
                    }
                    _ => {}
                }
            }
        }
        assert!(calls >= 1 && params >= 1);
    }
}

#[test]
fn too_many_call_arguments_fail_with_a_clear_error() {
    let params: Vec<String> = (0..9).map(|i| format!("p{}: i32", i)).collect();
    let args: Vec<String> = (0..9).map(|i| i.to_string()).collect();
    let source = format!(
        "f({}) : i32 {{ return p0; }}\nmain() : i32 {{ return f({}); }}",
        params.join(", "),
        args.join(", ")
    );

    let mut sources = rsharp_common::SourceMap::new();
    let file_id = sources.add("test.rs", source.clone());
    let mut lexer = Lexer::new(&source, file_id);
    let tokens = lexer.tokenize();
    let mut parser = Parser::new(tokens, PathBuf::from("test.rs"), None);
    let mut cache = ParsingCache::new();
    let program = parser.parse_program(&mut cache, &mut sources);
    let (typed, diagnostics) = rsharp_typechecker::check(&program);
    assert!(!diagnostics.has_errors());

    let mut tu = rsharp_ir::generate(&typed).unwrap();
    let arch = Architecture::aarch64();
    let result = run_pipeline(&mut tu, &arch);
    assert!(result.is_err(), "nine arguments cannot fit eight parameter registers");
}

#[test]
fn storage_none_only_for_dead_values() {
    // the dead call result move target: `bump()` discards its result
    let source = "bump() : i32 { return 1; }\nmain() : i32 { bump(); return 0; }";
    let (tu, _) = lower(source, TargetArch::X86_64);
    // every live-set member must have storage; checked indirectly by
    // every_operand_reference_has_storage_after_allocation, here we only
    // make sure the pipeline accepted the discarded result
    assert_eq!(tu.functions.len(), 2);
}
