//! The legalization pass pipeline, in its fixed order
//!
//! Each pass rewrites the IR towards a form where every instruction maps to
//! one assembly instruction (or a small fixed sequence) on the chosen
//! target. New references always come from the pool's naming authority.

use crate::arch::TargetArch;
use crate::ir::*;
use crate::liveness::analyze_live_variables;
use crate::pass::{accept_all, Pass, PassContext, PassKind};
use crate::regalloc::{assign_registers_graph_coloring, enumerate_registers};
use rsharp_common::{RsError, RsResult};

const BOTH_ARCHS: &[TargetArch] = &[TargetArch::X86_64, TargetArch::Aarch64];
const X86_64_ONLY: &[TargetArch] = &[TargetArch::X86_64];
const AARCH64_ONLY: &[TargetArch] = &[TargetArch::Aarch64];

/// The fixed pass order
pub fn pipeline() -> Vec<Pass> {
    vec![
        Pass {
            header: "Replace modulo with div, mul, sub",
            architectures: AARCH64_ONLY,
            positive: &[Opcode::Modulo],
            negative: &[],
            prefilter: accept_all,
            kind: PassKind::PerInstruction(replace_mod_with_div_mul_sub),
        },
        Pass {
            header: "Move constants to references",
            architectures: X86_64_ONLY,
            positive: &[
                Opcode::Divide,
                Opcode::Modulo,
                Opcode::StoreMemory,
                Opcode::LoadMemory,
                Opcode::Call,
                Opcode::Return,
                Opcode::JumpIfZero,
                Opcode::AddressOf,
                Opcode::SetLive,
            ],
            negative: &[],
            prefilter: accept_all,
            kind: PassKind::PerInstruction(move_constants_to_references),
        },
        Pass {
            header: "Move constants to references",
            architectures: AARCH64_ONLY,
            positive: &[],
            // A64 arithmetic, stores and branches want register operands;
            // only these opcodes take immediates (or carry metadata constants)
            negative: &[Opcode::Move, Opcode::DefineLabel, Opcode::Jump, Opcode::LoadParameter],
            prefilter: accept_all,
            kind: PassKind::PerInstruction(move_constants_to_references),
        },
        Pass {
            header: "Two operand compatibility",
            architectures: X86_64_ONLY,
            positive: &[],
            negative: &[],
            prefilter: two_operand_prefilter,
            kind: PassKind::PerInstruction(make_two_operand_compatible),
        },
        Pass {
            header: "Separate division references",
            architectures: X86_64_ONLY,
            positive: &[Opcode::Divide, Opcode::Modulo],
            negative: &[],
            prefilter: accept_all,
            kind: PassKind::PerInstruction(separate_div_references),
        },
        Pass {
            header: "Separate call results",
            architectures: BOTH_ARCHS,
            positive: &[Opcode::Call],
            negative: &[],
            prefilter: accept_all,
            kind: PassKind::PerInstruction(separate_call_results),
        },
        Pass {
            header: "Separate load parameters",
            architectures: BOTH_ARCHS,
            positive: &[Opcode::LoadParameter],
            negative: &[],
            prefilter: accept_all,
            kind: PassKind::PerInstruction(separate_load_parameters),
        },
        Pass {
            header: "Resolve address of",
            architectures: BOTH_ARCHS,
            positive: &[Opcode::AddressOf],
            negative: &[],
            prefilter: accept_all,
            kind: PassKind::PerInstruction(resolve_address_of),
        },
        Pass {
            header: "Separate global references",
            architectures: BOTH_ARCHS,
            positive: &[],
            negative: &[],
            prefilter: accept_all,
            kind: PassKind::PerInstruction(separate_global_references),
        },
        Pass {
            header: "Global references to memory access",
            architectures: BOTH_ARCHS,
            positive: &[Opcode::Move],
            negative: &[],
            prefilter: accept_all,
            kind: PassKind::PerInstruction(global_reference_to_memory_access),
        },
        Pass {
            header: "Separate stack variables",
            architectures: BOTH_ARCHS,
            positive: &[],
            negative: &[],
            prefilter: accept_all,
            kind: PassKind::PerInstruction(separate_stack_variables),
        },
        Pass {
            header: "Liveness analysis",
            architectures: BOTH_ARCHS,
            positive: &[],
            negative: &[],
            prefilter: accept_all,
            kind: PassKind::PerFunction(analyze_live_variables),
        },
        Pass {
            header: "Graph coloring register assignment",
            architectures: BOTH_ARCHS,
            positive: &[],
            negative: &[],
            prefilter: accept_all,
            kind: PassKind::PerFunction(assign_registers_graph_coloring),
        },
        Pass {
            header: "",
            architectures: BOTH_ARCHS,
            positive: &[],
            negative: &[],
            prefilter: accept_all,
            kind: PassKind::PerFunction(enumerate_registers),
        },
    ]
}

/// Run the whole pipeline over a translation unit
pub fn run_pipeline(tu: &mut TranslationUnit, arch: &crate::arch::Architecture) -> RsResult<()> {
    for pass in pipeline() {
        pass.run(tu, arch)?;
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Per-instruction transformers
// ----------------------------------------------------------------------

/// `r ← a % b` becomes `q ← a / b; t ← q * b; r ← a - t`
fn replace_mod_with_div_mul_sub(
    ctx: &mut PassContext,
    instr: &mut Instruction,
    _before: &mut Vec<Instruction>,
    after: &mut Vec<Instruction>,
) -> RsResult<()> {
    instr.opcode = Opcode::Divide;

    let final_result = instr.result;
    let quotient = ctx.pool.new_ref("tmp");
    instr.result = Operand::Ref(quotient);

    let product = ctx.pool.new_ref("tmp");
    after.push(
        Instruction::new(Opcode::Multiply)
            .with_result(Operand::Ref(product))
            .with_op1(Operand::Ref(quotient))
            .with_op2(instr.op2),
    );
    after.push(
        Instruction::new(Opcode::Subtract)
            .with_result(final_result)
            .with_op1(instr.op1)
            .with_op2(Operand::Ref(product)),
    );
    Ok(())
}

/// Promote constant operands the opcode cannot take to fresh references
fn move_constants_to_references(
    ctx: &mut PassContext,
    instr: &mut Instruction,
    before: &mut Vec<Instruction>,
    _after: &mut Vec<Instruction>,
) -> RsResult<()> {
    if instr.op1.is_constant() && instr.opcode != Opcode::LoadParameter {
        let tmp = ctx.pool.new_ref("constant");
        before.push(
            Instruction::new(Opcode::Move)
                .with_result(Operand::Ref(tmp))
                .with_op1(instr.op1),
        );
        instr.op1 = Operand::Ref(tmp);
    }
    // a CALL's op2 is its argument count, not a value
    if instr.op2.is_constant() && instr.opcode != Opcode::Call {
        let tmp = ctx.pool.new_ref("constant");
        before.push(
            Instruction::new(Opcode::Move)
                .with_result(Operand::Ref(tmp))
                .with_op1(instr.op2),
        );
        instr.op2 = Operand::Ref(tmp);
    }
    Ok(())
}

fn two_operand_prefilter(instr: &Instruction) -> bool {
    let result_is_ref = matches!(instr.result, Operand::Ref(_));
    match instr.opcode {
        // x86 neg/not are destructive just like the binary ops
        Opcode::Negate | Opcode::BinaryNot => result_is_ref && instr.result != instr.op1,
        op if op.is_binary() => {
            result_is_ref
                && !instr.op2.is_none()
                && matches!(
                    instr.op1,
                    Operand::Ref(_) | Operand::Constant(_) | Operand::Global(_)
                )
                && instr.result != instr.op1
        }
        _ => false,
    }
}

/// Insert `MOVE result, op1` and rewrite `op1 := result`
fn make_two_operand_compatible(
    _ctx: &mut PassContext,
    instr: &mut Instruction,
    before: &mut Vec<Instruction>,
    _after: &mut Vec<Instruction>,
) -> RsResult<()> {
    before.push(
        Instruction::new(Opcode::Move)
            .with_result(instr.result)
            .with_op1(instr.op1),
    );
    instr.op1 = instr.result;
    Ok(())
}

/// Pin a division's dividend and quotient to the architectural quotient
/// register, copying the result out through a trailing move
fn separate_div_references(
    ctx: &mut PassContext,
    instr: &mut Instruction,
    before: &mut Vec<Instruction>,
    after: &mut Vec<Instruction>,
) -> RsResult<()> {
    // already isolated divisions are left alone
    let pinned_to_div = |op: &Operand| {
        op.as_ref_id()
            .and_then(|id| match ctx.pool.reference(id).storage {
                Some(Storage::Register(register)) => Some(register == ctx.arch.div_register),
                _ => None,
            })
            .unwrap_or(false)
    };
    if pinned_to_div(&instr.op1) && pinned_to_div(&instr.result) {
        return Ok(());
    }

    let dividend = ctx.pool.new_pinned_ref("divtmp", ctx.arch.div_register);
    before.push(
        Instruction::new(Opcode::Move)
            .with_result(Operand::Ref(dividend))
            .with_op1(instr.op1),
    );

    let divisor = ctx.pool.new_ref("divtmp");
    before.push(
        Instruction::new(Opcode::Move)
            .with_result(Operand::Ref(divisor))
            .with_op1(instr.op2),
    );

    let quotient = ctx.pool.new_pinned_ref("divresult", ctx.arch.div_register);
    after.push(
        Instruction::new(Opcode::Move)
            .with_result(instr.result)
            .with_op1(Operand::Ref(quotient)),
    );

    instr.op1 = Operand::Ref(dividend);
    instr.op2 = Operand::Ref(divisor);
    instr.result = Operand::Ref(quotient);
    Ok(())
}

/// Pin every call's result to the return-value register; the caller-visible
/// result receives it through a trailing move. Also the first pass to see
/// every call with its arity, so the parameter-register limit is enforced
/// here.
fn separate_call_results(
    ctx: &mut PassContext,
    instr: &mut Instruction,
    _before: &mut Vec<Instruction>,
    after: &mut Vec<Instruction>,
) -> RsResult<()> {
    if let Operand::Constant(argc) = instr.op2 {
        let available = ctx.arch.parameter_registers.len() as u64;
        if argc > available {
            return Err(RsError::codegen_error(format!(
                "Call passes {} arguments but the target only has {} parameter registers",
                argc, available
            )));
        }
    }

    // already isolated calls are left alone
    let result_register = instr
        .result
        .as_ref_id()
        .and_then(|id| match ctx.pool.reference(id).storage {
            Some(Storage::Register(register)) => Some(register),
            _ => None,
        });
    if result_register == Some(ctx.arch.return_register) {
        return Ok(());
    }

    let call_result = ctx.pool.new_pinned_ref("callresult", ctx.arch.return_register);
    after.push(
        Instruction::new(Opcode::Move)
            .with_result(instr.result)
            .with_op1(Operand::Ref(call_result)),
    );
    instr.result = Operand::Ref(call_result);
    Ok(())
}

/// Rewrite `LOAD_PARAMETER dst, index` so the defined reference is the
/// positional parameter register, copied into `dst` by a trailing move
fn separate_load_parameters(
    ctx: &mut PassContext,
    instr: &mut Instruction,
    _before: &mut Vec<Instruction>,
    after: &mut Vec<Instruction>,
) -> RsResult<()> {
    let Operand::Constant(index) = instr.op1 else {
        return Err(RsError::codegen_error(
            "Internal error: LOAD_PARAMETER without a constant index",
        ));
    };
    if index as usize >= ctx.arch.parameter_registers.len() {
        return Err(RsError::codegen_error(
            "Function uses more parameters than are supported on this platform",
        ));
    }

    // already isolated parameter loads are left alone
    let result_register = instr
        .result
        .as_ref_id()
        .and_then(|id| match ctx.pool.reference(id).storage {
            Some(Storage::Register(register)) => Some(register),
            _ => None,
        });
    if result_register == Some(ctx.arch.parameter_registers[index as usize]) {
        return Ok(());
    }

    let param = ctx
        .pool
        .new_pinned_ref("param", ctx.arch.parameter_registers[index as usize]);
    after.push(
        Instruction::new(Opcode::Move)
            .with_result(instr.result)
            .with_op1(Operand::Ref(param)),
    );
    instr.result = Operand::Ref(param);
    Ok(())
}

/// `ADDRESS_OF dst, ref` becomes `ADD dst, &slot(ref), frame_pointer`,
/// preceded by a SET_LIVE definition of the pinned frame-pointer reference
fn resolve_address_of(
    ctx: &mut PassContext,
    instr: &mut Instruction,
    before: &mut Vec<Instruction>,
    _after: &mut Vec<Instruction>,
) -> RsResult<()> {
    let target = instr.op1.as_ref_id();
    let on_stack = target.is_some_and(|id| ctx.pool.stack_slot_of(id).is_some());
    if !on_stack {
        return Err(RsError::codegen_error(
            "Trying to take the address of a value not on the stack",
        ));
    }

    instr.opcode = Opcode::Add;
    instr.op1 = Operand::StackOffsetOf(target.expect("checked above"));
    let frame = ctx.pool.new_pinned_ref("fp", ctx.arch.frame_pointer);
    instr.op2 = Operand::Ref(frame);

    before.push(Instruction::new(Opcode::SetLive).with_result(Operand::Ref(frame)));
    Ok(())
}

/// Split global references out of every instruction into adjacent moves
fn separate_global_references(
    ctx: &mut PassContext,
    instr: &mut Instruction,
    before: &mut Vec<Instruction>,
    after: &mut Vec<Instruction>,
) -> RsResult<()> {
    if matches!(instr.result, Operand::Global(_)) {
        let tmp = ctx.pool.new_ref("tmp");
        after.push(
            Instruction::new(Opcode::Move)
                .with_result(instr.result)
                .with_op1(Operand::Ref(tmp)),
        );
        instr.result = Operand::Ref(tmp);
    }
    if matches!(instr.op1, Operand::Global(_)) && instr.opcode != Opcode::Move {
        let tmp = ctx.pool.new_ref("tmp");
        before.push(
            Instruction::new(Opcode::Move)
                .with_result(Operand::Ref(tmp))
                .with_op1(instr.op1),
        );
        instr.op1 = Operand::Ref(tmp);
    }
    if matches!(instr.op2, Operand::Global(_)) {
        let tmp = ctx.pool.new_ref("tmp");
        before.push(
            Instruction::new(Opcode::Move)
                .with_result(Operand::Ref(tmp))
                .with_op1(instr.op2),
        );
        instr.op2 = Operand::Ref(tmp);
    }
    Ok(())
}

/// Turn global-reference moves into address materialization plus an
/// explicit memory access
fn global_reference_to_memory_access(
    ctx: &mut PassContext,
    instr: &mut Instruction,
    _before: &mut Vec<Instruction>,
    after: &mut Vec<Instruction>,
) -> RsResult<()> {
    if matches!(instr.result, Operand::Global(_)) {
        // MOVE g, x  →  MOVE t, g (address); STORE_MEMORY [t], x
        let address = ctx.pool.new_ref("tmp");
        after.push(
            Instruction::new(Opcode::StoreMemory)
                .with_op1(Operand::Ref(address))
                .with_op2(instr.op1),
        );
        instr.op1 = instr.result;
        instr.result = Operand::Ref(address);
    } else if matches!(instr.op1, Operand::Global(_)) {
        // MOVE dst, g  →  MOVE t, g (address); LOAD_MEMORY dst, [t]
        let address = ctx.pool.new_ref("tmp");
        after.push(
            Instruction::new(Opcode::LoadMemory)
                .with_result(instr.result)
                .with_op1(Operand::Ref(address)),
        );
        instr.result = Operand::Ref(address);
    }
    Ok(())
}

/// Lower reads and writes of stack-homed references (address-taken
/// variables) to explicit memory accesses through their slot address,
/// materialized exactly like resolved address-of
fn separate_stack_variables(
    ctx: &mut PassContext,
    instr: &mut Instruction,
    before: &mut Vec<Instruction>,
    _after: &mut Vec<Instruction>,
) -> RsResult<()> {
    let stack_homed = |pool: &IrPool, op: &Operand| -> Option<RefId> {
        let id = op.as_ref_id()?;
        let reference = pool.reference(id);
        (reference.pinned && matches!(reference.storage, Some(Storage::Stack(_)))).then_some(id)
    };

    // slot address: SET_LIVE fp; ADD addr, &slot, fp
    let materialize_address =
        |pool: &mut IrPool, arch: &crate::arch::Architecture, target: RefId, before: &mut Vec<Instruction>| {
            let frame = pool.new_pinned_ref("fp", arch.frame_pointer);
            before.push(Instruction::new(Opcode::SetLive).with_result(Operand::Ref(frame)));
            let address = pool.new_ref("tmp");
            before.push(
                Instruction::new(Opcode::Add)
                    .with_result(Operand::Ref(address))
                    .with_op1(Operand::StackOffsetOf(target))
                    .with_op2(Operand::Ref(frame)),
            );
            address
        };

    // reads first: a stack-homed source is loaded from its slot
    if let Some(source) = stack_homed(ctx.pool, &instr.op1) {
        let address = materialize_address(ctx.pool, ctx.arch, source, before);
        let value = ctx.pool.new_ref("tmp");
        before.push(
            Instruction::new(Opcode::LoadMemory)
                .with_result(Operand::Ref(value))
                .with_op1(Operand::Ref(address)),
        );
        instr.op1 = Operand::Ref(value);
    }
    if let Some(source) = stack_homed(ctx.pool, &instr.op2) {
        let address = materialize_address(ctx.pool, ctx.arch, source, before);
        let value = ctx.pool.new_ref("tmp");
        before.push(
            Instruction::new(Opcode::LoadMemory)
                .with_result(Operand::Ref(value))
                .with_op1(Operand::Ref(address)),
        );
        instr.op2 = Operand::Ref(value);
    }

    // writes: only moves ever target a stack-homed reference
    if let Some(target) = stack_homed(ctx.pool, &instr.result) {
        if instr.opcode != Opcode::Move {
            return Err(RsError::codegen_error(
                "Internal error: non-move write to a stack-homed reference",
            ));
        }
        let value = ctx.pool.new_ref("tmp");
        before.push(
            Instruction::new(Opcode::Move)
                .with_result(Operand::Ref(value))
                .with_op1(instr.op1),
        );
        let address = materialize_address(ctx.pool, ctx.arch, target, before);
        instr.opcode = Opcode::StoreMemory;
        instr.result = Operand::None;
        instr.op1 = Operand::Ref(address);
        instr.op2 = Operand::Ref(value);
    }
    Ok(())
}
