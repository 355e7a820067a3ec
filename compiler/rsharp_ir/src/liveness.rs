//! Live-variable analysis over the linearized IR
//!
//! A reverse sweep propagates liveness from each instruction to its
//! predecessor; when a label definition is reached, its live set is merged
//! into every jump that targets the label, so liveness flows backwards
//! across non-fallthrough edges without an explicit CFG. The sweep repeats
//! until no live set changes.

use crate::ir::*;
use crate::pass::PassContext;
use rsharp_common::RsResult;
use std::collections::BTreeSet;

pub fn analyze_live_variables(_ctx: &mut PassContext, function: &mut Function) -> RsResult<()> {
    let mut changed = true;
    while changed {
        changed = false;

        // live set after the last instruction is empty
        let mut live_after: BTreeSet<RefId> = BTreeSet::new();

        for index in (0..function.instructions.len()).rev() {
            let instr = &function.instructions[index];
            let before_this_sweep = instr.meta.live_before.clone();

            let mut live = instr.meta.live_before.clone();
            live.extend(live_after.iter().copied());

            // def, then uses: a `MOVE r, r` keeps r live before itself
            if let Operand::Ref(result) = instr.result {
                live.remove(&result);
            }
            if let Operand::Ref(op1) = instr.op1 {
                live.insert(op1);
            }
            if let Operand::Ref(op2) = instr.op2 {
                live.insert(op2);
            }

            function.instructions[index].meta.live_before = live.clone();

            // everything live at a label is live before every jump to it
            if function.instructions[index].opcode == Opcode::DefineLabel {
                let target = function.instructions[index].op1;
                for jump_index in 0..function.instructions.len() {
                    let jump = &function.instructions[jump_index];
                    if !matches!(jump.opcode, Opcode::Jump | Opcode::JumpIfZero) {
                        continue;
                    }
                    if jump.op1 != target && jump.op2 != target {
                        continue;
                    }
                    let jump_live = &mut function.instructions[jump_index].meta.live_before;
                    let size_before = jump_live.len();
                    jump_live.extend(live.iter().copied());
                    if jump_live.len() != size_before {
                        changed = true;
                    }
                }
            }

            if before_this_sweep != live {
                changed = true;
            }
            live_after = live;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Architecture;

    fn run(function: &mut Function, pool: &mut IrPool) {
        let arch = Architecture::x86_64();
        let mut ctx = PassContext { pool, arch: &arch };
        analyze_live_variables(&mut ctx, function).unwrap();
    }

    fn function_with(instructions: Vec<Instruction>) -> Function {
        Function {
            name: "test".to_string(),
            label: LabelId(0),
            return_type: rsharp_typechecker::RsType::I32,
            instructions,
            meta: FunctionMeta::default(),
        }
    }

    #[test]
    fn straight_line_liveness() {
        let mut pool = IrPool::new();
        let label = pool.exact_label("f");
        let a = pool.new_ref("a");
        let b = pool.new_ref("b");
        let c = pool.new_ref("c");

        let instructions = vec![
            Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(label)),
            Instruction::new(Opcode::Move)
                .with_result(Operand::Ref(a))
                .with_op1(Operand::Constant(1)),
            Instruction::new(Opcode::Move)
                .with_result(Operand::Ref(b))
                .with_op1(Operand::Constant(2)),
            Instruction::new(Opcode::Add)
                .with_result(Operand::Ref(c))
                .with_op1(Operand::Ref(a))
                .with_op2(Operand::Ref(b)),
            Instruction::new(Opcode::Return).with_op1(Operand::Ref(c)),
        ];
        let mut function = function_with(instructions);
        run(&mut function, &mut pool);

        // before the add both operands are live; before the return only c
        let add_live = &function.instructions[3].meta.live_before;
        assert!(add_live.contains(&a) && add_live.contains(&b));
        assert!(!add_live.contains(&c));
        let ret_live = &function.instructions[4].meta.live_before;
        assert_eq!(ret_live.iter().copied().collect::<Vec<_>>(), vec![c]);
        // nothing is live before the first instruction
        assert!(function.instructions[0].meta.live_before.is_empty());
    }

    #[test]
    fn liveness_flows_through_backward_jumps() {
        // a loop: value defined before the loop is used inside it, so it
        // must stay live across the jump back to the loop head
        let mut pool = IrPool::new();
        let start = pool.exact_label("start");
        let end = pool.exact_label("end");
        let i = pool.new_ref("i");
        let cond = pool.new_ref("cond");

        let instructions = vec![
            Instruction::new(Opcode::Move)
                .with_result(Operand::Ref(i))
                .with_op1(Operand::Constant(0)),
            Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(start)),
            Instruction::new(Opcode::LessThan)
                .with_result(Operand::Ref(cond))
                .with_op1(Operand::Ref(i))
                .with_op2(Operand::Constant(10)),
            Instruction::new(Opcode::JumpIfZero)
                .with_op1(Operand::Ref(cond))
                .with_op2(Operand::Label(end)),
            Instruction::new(Opcode::Add)
                .with_result(Operand::Ref(i))
                .with_op1(Operand::Ref(i))
                .with_op2(Operand::Constant(1)),
            Instruction::new(Opcode::Jump).with_op1(Operand::Label(start)),
            Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(end)),
            Instruction::new(Opcode::Return).with_op1(Operand::Ref(i)),
        ];
        let mut function = function_with(instructions);
        run(&mut function, &mut pool);

        // i is live before the backward jump and before the comparison
        assert!(function.instructions[5].meta.live_before.contains(&i));
        assert!(function.instructions[2].meta.live_before.contains(&i));
        // and live before the conditional exit, since the loop may continue
        assert!(function.instructions[3].meta.live_before.contains(&i));
    }

    #[test]
    fn move_to_self_keeps_value_live() {
        let mut pool = IrPool::new();
        let r = pool.new_ref("r");
        let instructions = vec![
            Instruction::new(Opcode::Move)
                .with_result(Operand::Ref(r))
                .with_op1(Operand::Ref(r)),
            Instruction::new(Opcode::Return).with_op1(Operand::Ref(r)),
        ];
        let mut function = function_with(instructions);
        run(&mut function, &mut pool);

        assert!(function.instructions[0].meta.live_before.contains(&r));
    }

    #[test]
    fn subset_property_holds() {
        // live_before(I) ⊆ uses(I) ∪ live_before(successor(I))
        let mut pool = IrPool::new();
        let a = pool.new_ref("a");
        let b = pool.new_ref("b");
        let instructions = vec![
            Instruction::new(Opcode::Move)
                .with_result(Operand::Ref(a))
                .with_op1(Operand::Constant(1)),
            Instruction::new(Opcode::Move)
                .with_result(Operand::Ref(b))
                .with_op1(Operand::Ref(a)),
            Instruction::new(Opcode::Return).with_op1(Operand::Ref(b)),
        ];
        let mut function = function_with(instructions);
        run(&mut function, &mut pool);

        for index in 0..function.instructions.len() {
            let instr = &function.instructions[index];
            let mut allowed: BTreeSet<RefId> = BTreeSet::new();
            if let Operand::Ref(op1) = instr.op1 {
                allowed.insert(op1);
            }
            if let Operand::Ref(op2) = instr.op2 {
                allowed.insert(op2);
            }
            if let Some(next) = function.instructions.get(index + 1) {
                allowed.extend(next.meta.live_before.iter().copied());
            }
            assert!(
                instr.meta.live_before.is_subset(&allowed),
                "liveness grew beyond uses + successor at {}",
                index
            );
        }
    }
}
